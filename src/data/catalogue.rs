// src/data/catalogue.rs - Nutrient catalogue mapping label keys to reference keys

use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;

use crate::core::{EstimatorError, Result};

/// Unit the reference database reports a nutrient in. Label panels are in
/// grams, so values are divided by the factor exactly once, at load time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NutrientUnit {
    Gram,
    Milligram,
    Microgram,
}

impl NutrientUnit {
    pub fn factor(&self) -> f64 {
        match self {
            Self::Gram => 1.0,
            Self::Milligram => 1_000.0,
            Self::Microgram => 1_000_000.0,
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim() {
            "g" | "kcal" | "kJ" => Some(Self::Gram),
            "mg" => Some(Self::Milligram),
            "µg" | "ug" | "Âµg" => Some(Self::Microgram),
            _ => None,
        }
    }
}

/// One catalogue entry: a label nutrient key, the reference-database
/// nutrient it maps to, and how it participates in fitting.
#[derive(Debug, Clone)]
pub struct NutrientSpec {
    pub off_id: String,
    /// English constituent name used by the reference composition tables.
    pub ciqual_id: String,
    pub unit: NutrientUnit,
    /// `None` excludes the nutrient from fitting; `comment` says why.
    pub weighting: Option<f64>,
    pub penalty_factor: f64,
    pub comment: Option<String>,
}

/// Fixed, process-wide nutrient catalogue.
#[derive(Debug, Clone)]
pub struct NutrientCatalogue {
    specs: Vec<NutrientSpec>,
    by_off_id: HashMap<String, usize>,
    by_ciqual_id: HashMap<String, usize>,
}

#[derive(Debug, Deserialize)]
struct CatalogueRow {
    off_id: String,
    ciqual_id: String,
    ciqual_unit: String,
    #[serde(default)]
    weighting: String,
    #[serde(default)]
    penalty_factor: String,
    #[serde(default)]
    comments: String,
}

impl NutrientCatalogue {
    pub fn new(specs: Vec<NutrientSpec>) -> Self {
        let by_off_id = specs
            .iter()
            .enumerate()
            .map(|(i, s)| (s.off_id.clone(), i))
            .collect();
        let by_ciqual_id = specs
            .iter()
            .enumerate()
            .map(|(i, s)| (s.ciqual_id.clone(), i))
            .collect();
        Self {
            specs,
            by_off_id,
            by_ciqual_id,
        }
    }

    /// Load the catalogue from a `nutrient_map.csv` artefact. Rows without
    /// a reference id are ignored, as are unknown units.
    pub fn from_csv_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut reader = csv::Reader::from_path(path.as_ref())?;
        let mut specs = Vec::new();
        for row in reader.deserialize::<CatalogueRow>() {
            let row = row?;
            if row.ciqual_id.trim().is_empty() {
                continue;
            }
            let Some(unit) = NutrientUnit::from_label(&row.ciqual_unit) else {
                continue;
            };
            let weighting = row.weighting.trim().parse::<f64>().ok();
            let penalty_factor = row.penalty_factor.trim().parse::<f64>().unwrap_or(1.0);
            let comment = match row.comments.trim() {
                "" => None,
                text => Some(text.to_string()),
            };
            specs.push(NutrientSpec {
                off_id: row.off_id.trim().to_string(),
                ciqual_id: row.ciqual_id.trim().to_string(),
                unit,
                weighting,
                penalty_factor,
                comment,
            });
        }
        if specs.is_empty() {
            return Err(EstimatorError::reference_data(
                "nutrient map contains no usable rows",
            ));
        }
        Ok(Self::new(specs))
    }

    /// Builtin table covering the common label nutrients, used by tests and
    /// as fallback when no CSV artefact is configured.
    pub fn builtin() -> Self {
        fn spec(
            off_id: &str,
            ciqual_id: &str,
            unit: NutrientUnit,
            weighting: Option<f64>,
            comment: Option<&str>,
        ) -> NutrientSpec {
            NutrientSpec {
                off_id: off_id.to_string(),
                ciqual_id: ciqual_id.to_string(),
                unit,
                weighting,
                penalty_factor: 1.0,
                comment: comment.map(str::to_string),
            }
        }

        use NutrientUnit::{Gram, Microgram, Milligram};
        Self::new(vec![
            spec(
                "energy",
                "Energy, Regulation EU No 1169/2011 (kJ/100g)",
                Gram,
                None,
                Some("Derived from other nutrients"),
            ),
            spec("fat", "Fat (g/100g)", Gram, Some(1.0), None),
            spec(
                "saturated-fat",
                "FA saturated (g/100g)",
                Gram,
                Some(1.0),
                None,
            ),
            spec(
                "carbohydrates",
                "Carbohydrate (g/100g)",
                Gram,
                Some(1.0),
                None,
            ),
            spec("sugars", "Sugars (g/100g)", Gram, Some(1.0), None),
            spec("fiber", "Fibres (g/100g)", Gram, Some(1.0), None),
            spec("proteins", "Protein (g/100g)", Gram, Some(1.0), None),
            spec("salt", "Salt (g/100g)", Gram, Some(10.0), None),
            spec(
                "sodium",
                "Sodium (mg/100g)",
                Milligram,
                None,
                Some("Covered by salt"),
            ),
            spec("alcohol", "Alcohol (g/100g)", Gram, Some(1.0), None),
            spec(
                "water",
                "Water (g/100g)",
                Gram,
                None,
                Some("Used for water-loss bounds only"),
            ),
            spec("calcium", "Calcium (mg/100g)", Milligram, Some(100.0), None),
            spec("iron", "Iron (mg/100g)", Milligram, Some(1_000.0), None),
            spec(
                "magnesium",
                "Magnesium (mg/100g)",
                Milligram,
                Some(100.0),
                None,
            ),
            spec(
                "potassium",
                "Potassium (mg/100g)",
                Milligram,
                Some(10.0),
                None,
            ),
            spec(
                "phosphorus",
                "Phosphorus (mg/100g)",
                Milligram,
                Some(100.0),
                None,
            ),
            spec("zinc", "Zinc (mg/100g)", Milligram, Some(1_000.0), None),
            spec(
                "vitamin-c",
                "Vitamin C (mg/100g)",
                Milligram,
                Some(100.0),
                None,
            ),
            spec(
                "vitamin-b9",
                "Folates, total (µg/100g)",
                Microgram,
                Some(10_000.0),
                None,
            ),
        ])
    }

    pub fn get(&self, off_id: &str) -> Option<&NutrientSpec> {
        self.by_off_id.get(off_id).map(|&i| &self.specs[i])
    }

    pub fn by_ciqual(&self, ciqual_id: &str) -> Option<&NutrientSpec> {
        self.by_ciqual_id.get(ciqual_id).map(|&i| &self.specs[i])
    }

    pub fn iter(&self) -> impl Iterator<Item = &NutrientSpec> {
        self.specs.iter()
    }

    pub fn len(&self) -> usize {
        self.specs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_builtin_exclusions() {
        let catalogue = NutrientCatalogue::builtin();

        let energy = catalogue.get("energy").unwrap();
        assert!(energy.weighting.is_none());
        assert_eq!(energy.comment.as_deref(), Some("Derived from other nutrients"));

        let sodium = catalogue.get("sodium").unwrap();
        assert!(sodium.weighting.is_none());

        assert_eq!(catalogue.get("fiber").unwrap().weighting, Some(1.0));
    }

    #[test]
    fn test_unit_factors() {
        assert_eq!(NutrientUnit::Gram.factor(), 1.0);
        assert_eq!(NutrientUnit::Milligram.factor(), 1_000.0);
        assert_eq!(NutrientUnit::Microgram.factor(), 1_000_000.0);
        assert_eq!(NutrientUnit::from_label("µg"), Some(NutrientUnit::Microgram));
    }

    #[test]
    fn test_from_csv() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nutrient_map.csv");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "off_id,ciqual_id,ciqual_unit,weighting,penalty_factor,comments").unwrap();
        writeln!(file, "fiber,Fibres (g/100g),g,1,1,").unwrap();
        writeln!(file, "calcium,Calcium (mg/100g),mg,100,1,").unwrap();
        writeln!(file, "energy,Energy (kJ/100g),kcal,,1,Derived from other nutrients").unwrap();
        writeln!(file, "unmapped,,g,1,1,").unwrap();
        drop(file);

        let catalogue = NutrientCatalogue::from_csv_path(&path).unwrap();
        assert_eq!(catalogue.len(), 3);
        assert_eq!(catalogue.get("calcium").unwrap().unit, NutrientUnit::Milligram);
        assert!(catalogue.get("energy").unwrap().weighting.is_none());
        assert!(catalogue.get("unmapped").is_none());
        assert!(catalogue.by_ciqual("Fibres (g/100g)").is_some());
    }
}
