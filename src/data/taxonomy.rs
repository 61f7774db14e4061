// src/data/taxonomy.rs - Ingredient taxonomy and food-code resolution

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::Path;

use crate::core::Result;

/// Language-tagged food code as stored in the taxonomy export.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalizedCode {
    pub en: String,
}

/// One taxonomy record. Parents are referenced by id; the parent graph is a
/// DAG, never an ownership tree.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaxonomyEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ciqual_food_code: Option<LocalizedCode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ciqual_proxy_food_code: Option<LocalizedCode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parents: Option<Vec<String>>,
}

pub type Taxonomy = HashMap<String, TaxonomyEntry>;

pub fn load_taxonomy<P: AsRef<Path>>(path: P) -> Result<Taxonomy> {
    let file = std::fs::File::open(path.as_ref())?;
    let taxonomy = serde_json::from_reader(std::io::BufReader::new(file))?;
    Ok(taxonomy)
}

/// Resolve `(direct, proxy)` food codes for an ingredient id. When the
/// entry has neither code, ancestors are searched depth-first in declared
/// order and the first one yielding any code wins.
pub fn resolve_food_codes(taxonomy: &Taxonomy, ingredient_id: &str) -> (Option<String>, Option<String>) {
    let mut visited = HashSet::new();
    resolve_recursive(taxonomy, ingredient_id, &mut visited)
}

fn resolve_recursive<'a>(
    taxonomy: &'a Taxonomy,
    ingredient_id: &'a str,
    visited: &mut HashSet<&'a str>,
) -> (Option<String>, Option<String>) {
    if !visited.insert(ingredient_id) {
        return (None, None);
    }

    let Some(entry) = taxonomy.get(ingredient_id) else {
        tracing::debug!("{} not found in taxonomy", ingredient_id);
        return (None, None);
    };

    let direct = entry.ciqual_food_code.as_ref().map(|c| c.en.clone());
    let proxy = entry.ciqual_proxy_food_code.as_ref().map(|c| c.en.clone());
    if direct.is_some() || proxy.is_some() {
        return (direct, proxy);
    }

    if let Some(parents) = &entry.parents {
        for parent_id in parents {
            let (direct, proxy) = resolve_recursive(taxonomy, parent_id, visited);
            if direct.is_some() || proxy.is_some() {
                tracing::debug!(
                    "obtained food code for {} from parent {}",
                    ingredient_id,
                    parent_id
                );
                return (direct, proxy);
            }
        }
    }

    (None, None)
}
