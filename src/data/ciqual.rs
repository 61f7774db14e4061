// src/data/ciqual.rs - CIQUAL food composition loaders

use quick_xml::events::Event;
use quick_xml::Reader;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use crate::core::Result;
use crate::data::catalogue::NutrientCatalogue;
use crate::models::{Confidence, FoodRecord, NutrientProfile};

/// Load the prepared composition asset (a JSON map of food code to record).
/// This is what the service reads at startup; the XML build path below
/// regenerates it.
pub fn load_foods<P: AsRef<Path>>(path: P) -> Result<HashMap<String, FoodRecord>> {
    let file = std::fs::File::open(path.as_ref())?;
    let foods = serde_json::from_reader(std::io::BufReader::new(file))?;
    Ok(foods)
}

/// Parse a flat CIQUAL table (root element containing one element per
/// record, each record containing one element per field).
fn parse_records(xml: &str) -> Result<Vec<HashMap<String, String>>> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    let mut records = Vec::new();
    let mut current: Option<HashMap<String, String>> = None;
    let mut field: Option<String> = None;
    let mut text = String::new();
    let mut depth = 0usize;

    loop {
        match reader.read_event()? {
            Event::Start(e) => {
                depth += 1;
                match depth {
                    2 => current = Some(HashMap::new()),
                    3 => {
                        field = Some(String::from_utf8_lossy(e.name().as_ref()).into_owned());
                        text.clear();
                    }
                    _ => {}
                }
            }
            Event::Text(e) => {
                if depth == 3 {
                    text.push_str(&e.unescape()?);
                }
            }
            Event::End(_) => {
                if depth == 3 {
                    if let (Some(record), Some(name)) = (current.as_mut(), field.take()) {
                        record.insert(name, text.trim().to_string());
                    }
                } else if depth == 2 {
                    if let Some(record) = current.take() {
                        records.push(record);
                    }
                }
                depth = depth.saturating_sub(1);
            }
            Event::Empty(e) => {
                if depth == 2 {
                    if let Some(record) = current.as_mut() {
                        let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                        record.insert(name, String::new());
                    }
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(records)
}

/// Composition values use comma decimals and carry `<` and `traces`
/// markers. Anything unparseable collapses to zero.
fn parse_value(raw: &str) -> f64 {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed == "-" {
        return 0.0;
    }
    trimmed
        .replace("traces", "0")
        .replace(['<', ' '], "")
        .replace(',', ".")
        .parse()
        .unwrap_or(0.0)
}

/// Build the food composition map from the raw CIQUAL tables: the
/// constituent list, the food list and the per-(food, constituent)
/// composition table. Units are normalized to grams here, exactly once.
pub fn build_foods_from_xml(
    const_xml: &str,
    alim_xml: &str,
    compo_xml: &str,
    catalogue: &NutrientCatalogue,
) -> Result<HashMap<String, FoodRecord>> {
    // const_code -> English constituent name
    let mut const_names: HashMap<String, String> = HashMap::new();
    for record in parse_records(const_xml)? {
        if let (Some(code), Some(name)) = (record.get("const_code"), record.get("const_nom_eng")) {
            const_names.insert(code.clone(), name.clone());
        }
    }

    // alim_code -> English food name
    let mut alim_names: HashMap<String, String> = HashMap::new();
    for record in parse_records(alim_xml)? {
        if let (Some(code), Some(name)) = (record.get("alim_code"), record.get("alim_nom_eng")) {
            alim_names.insert(code.clone(), name.clone());
        }
    }

    // The composition export is not valid XML: bare "less than" signs need
    // escaping before parsing.
    let compo_xml = compo_xml.replace(" < ", " &lt; ");

    let mut foods: HashMap<String, FoodRecord> = HashMap::new();
    for record in parse_records(&compo_xml)? {
        let Some(const_code) = record.get("const_code") else {
            continue;
        };
        let Some(spec) = const_names
            .get(const_code)
            .and_then(|name| catalogue.by_ciqual(name))
        else {
            continue;
        };
        let Some(alim_code) = record.get("alim_code") else {
            continue;
        };

        let teneur = record.get("teneur").map(String::as_str).unwrap_or("");
        let nom_value = parse_value(teneur);

        let min_value = match record.get("min").map(String::as_str) {
            Some(min) if !min.is_empty() => parse_value(min),
            // A "less than" nominal value only bounds from above.
            _ if teneur.contains('<') => 0.0,
            _ => nom_value,
        };
        let max_value = match record.get("max").map(String::as_str) {
            Some(max) if !max.is_empty() => parse_value(max),
            _ => nom_value,
        };

        let confidence = record
            .get("code_confiance")
            .and_then(|letter| Confidence::from_letter(letter));

        let factor = spec.unit.factor();
        let food = foods.entry(alim_code.clone()).or_insert_with(|| FoodRecord {
            ciqual_food_code: alim_code.clone(),
            alim_nom_eng: alim_names.get(alim_code).cloned().unwrap_or_default(),
            nutrients: BTreeMap::new(),
        });
        food.nutrients.insert(
            spec.off_id.clone(),
            NutrientProfile {
                percent_nom: nom_value / factor,
                percent_min: min_value / factor,
                percent_max: max_value / factor,
                confidence,
            },
        );
    }

    Ok(foods)
}

/// File-based wrapper around [`build_foods_from_xml`].
pub fn build_foods_from_files(
    const_path: &Path,
    alim_path: &Path,
    compo_path: &Path,
    catalogue: &NutrientCatalogue,
) -> Result<HashMap<String, FoodRecord>> {
    let const_xml = std::fs::read_to_string(const_path)?;
    let alim_xml = std::fs::read_to_string(alim_path)?;
    let compo_xml = std::fs::read_to_string(compo_path)?;
    build_foods_from_xml(&const_xml, &alim_xml, &compo_xml, catalogue)
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONST_XML: &str = r#"<TABLE>
        <CONST><const_code>34000</const_code><const_nom_eng>Fibres (g/100g)</const_nom_eng></CONST>
        <CONST><const_code>10110</const_code><const_nom_eng>Calcium (mg/100g)</const_nom_eng></CONST>
    </TABLE>"#;

    const ALIM_XML: &str = r#"<TABLE>
        <ALIM><alim_code>20047</alim_code><alim_nom_eng>Tomato, raw</alim_nom_eng></ALIM>
    </TABLE>"#;

    #[test]
    fn test_parse_value() {
        assert_eq!(parse_value("2,5"), 2.5);
        assert_eq!(parse_value("< 0,5"), 0.5);
        assert_eq!(parse_value("traces"), 0.0);
        assert_eq!(parse_value("-"), 0.0);
        assert_eq!(parse_value(""), 0.0);
    }

    #[test]
    fn test_build_foods_normalizes_units() {
        let compo = r#"<TABLE>
            <COMPO>
                <alim_code>20047</alim_code>
                <const_code>34000</const_code>
                <teneur>1,2</teneur>
                <min>0,9</min>
                <max>1,8</max>
                <code_confiance>A</code_confiance>
            </COMPO>
            <COMPO>
                <alim_code>20047</alim_code>
                <const_code>10110</const_code>
                <teneur>9,4</teneur>
                <min/>
                <max/>
                <code_confiance>B</code_confiance>
            </COMPO>
        </TABLE>"#;

        let catalogue = NutrientCatalogue::builtin();
        let foods = build_foods_from_xml(CONST_XML, ALIM_XML, compo, &catalogue).unwrap();

        let tomato = foods.get("20047").unwrap();
        assert_eq!(tomato.alim_nom_eng, "Tomato, raw");

        let fiber = tomato.nutrients.get("fiber").unwrap();
        assert_eq!(fiber.percent_nom, 1.2);
        assert_eq!(fiber.percent_min, 0.9);
        assert_eq!(fiber.percent_max, 1.8);
        assert_eq!(fiber.confidence, Some(Confidence::A));

        // mg values are converted to grams at load time
        let calcium = tomato.nutrients.get("calcium").unwrap();
        assert!((calcium.percent_nom - 0.0094).abs() < 1e-9);
        assert_eq!(calcium.percent_min, calcium.percent_nom);
    }

    #[test]
    fn test_less_than_marker_clears_minimum() {
        let compo = r#"<TABLE>
            <COMPO>
                <alim_code>20047</alim_code>
                <const_code>34000</const_code>
                <teneur> < 0,5</teneur>
                <code_confiance>C</code_confiance>
            </COMPO>
        </TABLE>"#;

        let catalogue = NutrientCatalogue::builtin();
        let foods = build_foods_from_xml(CONST_XML, ALIM_XML, compo, &catalogue).unwrap();
        let fiber = foods["20047"].nutrients.get("fiber").unwrap();
        assert_eq!(fiber.percent_min, 0.0);
        assert_eq!(fiber.percent_nom, 0.5);
        assert_eq!(fiber.percent_max, 0.5);
    }
}
