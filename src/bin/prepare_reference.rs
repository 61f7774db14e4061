// src/bin/prepare_reference.rs - Regenerate the reference data artefacts

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use recipe_estimator::data::{ciqual, NutrientCatalogue};

#[derive(Parser, Debug)]
#[command(author, version, about = "Build and refresh the estimator's reference artefacts", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Convert the raw CIQUAL composition tables into the JSON asset the
    /// server loads at startup.
    BuildFoods {
        /// Constituent table (const_*.xml)
        #[arg(long)]
        const_table: PathBuf,
        /// Food list table (alim_*.xml)
        #[arg(long)]
        alim_table: PathBuf,
        /// Composition table (compo_*.xml)
        #[arg(long)]
        compo_table: PathBuf,
        /// Nutrient map CSV; the builtin catalogue is used when omitted
        #[arg(long)]
        nutrient_map: Option<PathBuf>,
        /// Where to write the JSON asset
        #[arg(long, default_value = "assets/ciqual_foods.json")]
        output: PathBuf,
    },
    /// Download a fresh ingredient taxonomy export.
    RefreshTaxonomy {
        /// Source URL of the taxonomy JSON
        #[arg(
            long,
            default_value = "https://static.openfoodfacts.org/data/taxonomies/ingredients.json"
        )]
        url: String,
        /// Where to write the taxonomy
        #[arg(long, default_value = "assets/ingredients.json")]
        output: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().init();
    let cli = Cli::parse();

    match cli.command {
        Command::BuildFoods {
            const_table,
            alim_table,
            compo_table,
            nutrient_map,
            output,
        } => {
            let catalogue = match nutrient_map {
                Some(path) => NutrientCatalogue::from_csv_path(&path)
                    .with_context(|| format!("failed to load nutrient map {}", path.display()))?,
                None => NutrientCatalogue::builtin(),
            };

            let foods =
                ciqual::build_foods_from_files(&const_table, &alim_table, &compo_table, &catalogue)
                    .context("failed to build the food composition map")?;

            if let Some(parent) = output.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let file = std::fs::File::create(&output)
                .with_context(|| format!("failed to create {}", output.display()))?;
            serde_json::to_writer(std::io::BufWriter::new(file), &foods)?;

            println!("Wrote {} foods to {}", foods.len(), output.display());
        }
        Command::RefreshTaxonomy { url, output } => {
            let body = reqwest::get(&url)
                .await
                .with_context(|| format!("failed to fetch {url}"))?
                .error_for_status()?
                .text()
                .await?;

            // Validate before writing so a bad download cannot clobber a
            // working taxonomy.
            let _: serde_json::Value =
                serde_json::from_str(&body).context("taxonomy download is not valid JSON")?;

            if let Some(parent) = output.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(&output, &body)
                .with_context(|| format!("failed to write {}", output.display()))?;

            println!("Wrote taxonomy to {}", output.display());
        }
    }

    Ok(())
}
