//! Nutrient merge
//!
//! Values, units and modifiers are resolved from several column spellings
//! per nutrient, normalized, written into the nutrient table and diffed
//! against what the product held before the row.

use tracing::{debug, warn};

use crate::{
    context::ImportContext,
    normalize::{normalize_number, normalize_nutrient_unit, parse_modifier},
    product::ProductEntity,
    row::ImportRow,
    stats::Category,
    warn_row,
};

use super::{RowMerge, stamp_owner_field, write_field};

/// Nutrient ids in table order.
///
/// `#` marks a section heading that is not a nutrient, leading `!` and `-`
/// mark display emphasis and nesting.
const NUTRIENTS: &[&str] = &[
    "!energy-kj",
    "!energy-kcal",
    "energy",
    "-energy-from-fat",
    "!fat",
    "-saturated-fat",
    "--butyric-acid",
    "--caproic-acid",
    "--lauric-acid",
    "--myristic-acid",
    "--palmitic-acid",
    "--stearic-acid",
    "-monounsaturated-fat",
    "--oleic-acid",
    "-polyunsaturated-fat",
    "--omega-3-fat",
    "---alpha-linolenic-acid",
    "---eicosapentaenoic-acid",
    "---docosahexaenoic-acid",
    "--omega-6-fat",
    "---linoleic-acid",
    "-trans-fat",
    "-cholesterol",
    "!carbohydrates",
    "-sugars",
    "--added-sugars",
    "-starch",
    "-polyols",
    "fiber",
    "-soluble-fiber",
    "-insoluble-fiber",
    "!proteins",
    "-casein",
    "-serum-proteins",
    "salt",
    "sodium",
    "alcohol",
    "#vitamins",
    "vitamin-a",
    "vitamin-d",
    "vitamin-e",
    "vitamin-k",
    "vitamin-c",
    "vitamin-b1",
    "vitamin-b2",
    "vitamin-pp",
    "vitamin-b6",
    "vitamin-b9",
    "folates",
    "vitamin-b12",
    "biotin",
    "pantothenic-acid",
    "#minerals",
    "silica",
    "bicarbonate",
    "potassium",
    "chloride",
    "calcium",
    "phosphorus",
    "iron",
    "magnesium",
    "zinc",
    "copper",
    "manganese",
    "fluoride",
    "selenium",
    "chromium",
    "molybdenum",
    "iodine",
    "caffeine",
    "taurine",
    "ph",
    "fruits-vegetables-nuts",
    "fruits-vegetables-nuts-estimate",
    "collagen-meat-protein-ratio",
    "cocoa",
    "carbon-footprint",
];

/// Nutrition score declared by the producer, merged like a nutrient.
const PRODUCER_SCORE: &str = "nutrition-score-fr-producer";

const VALUE_UNITS: &[&str] = &["kj", "kcal", "kg", "g", "mg", "mcg", "l", "dl", "cl", "ml"];

/// Sub-fields snapshotted per nutrient, in diff order.
const SUB_FIELDS: [&str; 5] = ["modifier", "modifierp", "value", "valuep", "unit"];

/// Canonical nutrient ids, comment entries skipped and markers stripped.
pub fn nutrient_ids() -> impl Iterator<Item = &'static str> {
    NUTRIENTS
        .iter()
        .filter(|entry| !entry.starts_with('#'))
        .map(|entry| entry.trim_start_matches(['!', '-']))
        .chain(std::iter::once(PRODUCER_SCORE))
}

fn default_unit(nid: &str) -> Option<&'static str> {
    match nid {
        "energy-kj" | "energy" => Some("kJ"),
        "energy-kcal" => Some("kcal"),
        PRODUCER_SCORE | "ph" => None,
        _ => Some("g"),
    }
}

/// First non-blank value column for `key`, with the unit a unit-suffixed column implies.
fn resolve_value<'r>(row: &'r ImportRow, key: &str) -> Option<(&'r str, Option<&'static str>)> {
    for column in [format!("{key}_value"), format!("{key}_100g_value")] {
        if let Some(value) = row.get(&column) {
            return Some((value, None));
        }
    }
    for unit in VALUE_UNITS {
        for column in [
            format!("{key}_value_in_{unit}"),
            format!("{key}_100g_value_in_{unit}"),
        ] {
            if let Some(value) = row.get(&column) {
                return Some((value, Some(unit)));
            }
        }
    }
    None
}

fn resolve_unit<'r>(row: &'r ImportRow, keys: &[&str]) -> Option<&'r str> {
    keys.iter().find_map(|key| {
        row.get(&format!("{key}_unit"))
            .or_else(|| row.get(&format!("{key}_100g_unit")))
    })
}

enum Assigned {
    Value,
    /// `-`: not on the packaging.
    Cleared,
    Invalid,
}

fn snapshot(product: &ProductEntity, nid: &str) -> [Option<String>; 5] {
    let regular = product.nutrient(nid);
    let prepared = product.nutrient(&format!("{nid}_prepared"));
    let non_blank = |value: Option<&String>| value.filter(|v| !v.trim().is_empty()).cloned();
    [
        non_blank(regular.and_then(|n| n.modifier.as_ref())),
        non_blank(prepared.and_then(|n| n.modifier.as_ref())),
        non_blank(regular.and_then(|n| n.value.as_ref())),
        non_blank(prepared.and_then(|n| n.value.as_ref())),
        non_blank(regular.and_then(|n| n.unit.as_ref()))
            .or_else(|| non_blank(prepared.and_then(|n| n.unit.as_ref()))),
    ]
}

pub struct NutrientMerger<'a> {
    pub ctx: &'a ImportContext,
}

impl NutrientMerger<'_> {
    pub fn merge(&self, row: &ImportRow, product: &mut ProductEntity, merge: &mut RowMerge) {
        let mut salt_assigned = false;
        let mut populated = false;
        let mut populated_prepared = false;

        for nid in nutrient_ids() {
            if nid == "sodium" && salt_assigned {
                debug!(code = %product.code, "salt given, skip sodium");
                continue;
            }
            let before = snapshot(product, nid);
            for prepared in [false, true] {
                let key = if prepared {
                    format!("{nid}_prepared")
                } else {
                    nid.to_owned()
                };
                let Some((raw, unit)) = resolve_value(row, &key) else {
                    continue;
                };
                match self.assign(row, nid, &key, raw, unit, product) {
                    Assigned::Invalid => continue,
                    Assigned::Value if nid == "salt" => salt_assigned = true,
                    _ => {}
                }
                if prepared {
                    populated_prepared = true;
                } else {
                    populated = true;
                }
            }
            let after = snapshot(product, nid);
            self.diff(nid, before, after, product, merge);
        }

        if populated || populated_prepared {
            merge.flag(Category::ProductsWithNutrition);
        }
        if populated {
            self.default_basis("nutrition_data_per", row, product, merge);
        }
        if populated_prepared {
            self.default_basis("nutrition_data_prepared_per", row, product, merge);
        }
    }

    fn assign(
        &self,
        row: &ImportRow,
        nid: &str,
        key: &str,
        raw: &str,
        unit: Option<&str>,
        product: &mut ProductEntity,
    ) -> Assigned {
        let (modifier, number) = parse_modifier(raw);
        if modifier == Some("-") {
            let entry = product.nutriments.entry(key.to_owned()).or_default();
            entry.value = None;
            entry.modifier = Some("-".to_owned());
            return Assigned::Cleared;
        }
        let Some(value) = normalize_number(number) else {
            warn!(code = %product.code, nutrient = key, value = raw, "Nutrient value is not a number");
            warn_row!("{key} value {raw:?} is not a number");
            return Assigned::Invalid;
        };
        let unit = if nid == "alcohol" {
            Some("% vol".to_owned())
        } else if let Some(unit) = unit {
            Some(normalize_nutrient_unit(unit))
        } else if let Some(unit) = resolve_unit(row, &[key, nid]) {
            Some(normalize_nutrient_unit(unit))
        } else {
            default_unit(nid).map(str::to_owned)
        };
        let entry = product.nutriments.entry(key.to_owned()).or_default();
        entry.value = Some(value);
        entry.modifier = modifier.map(str::to_owned);
        entry.unit = unit;
        Assigned::Value
    }

    fn diff(
        &self,
        nid: &str,
        before: [Option<String>; 5],
        after: [Option<String>; 5],
        product: &mut ProductEntity,
        merge: &mut RowMerge,
    ) {
        for ((sub, before), after) in SUB_FIELDS.iter().zip(before).zip(after) {
            let category = match (&before, &after) {
                (Some(before), Some(after)) if before != after => Category::ProductsNutritionChanged,
                (None, Some(_)) => Category::ProductsNutritionAdded,
                (Some(_), None) => Category::ProductsNutritionUpdated,
                _ => continue,
            };
            let field = format!("{nid}_{sub}");
            debug!(code = %product.code, %field, ?before, ?after, "nutrient changed");
            stamp_owner_field(self.ctx, &mut product.owner_fields, &field);
            merge.record_field(&field, category);
        }
    }

    fn default_basis(
        &self,
        field: &str,
        row: &ImportRow,
        product: &mut ProductEntity,
        merge: &mut RowMerge,
    ) {
        if row.get(field).is_some() || product.fields.get(field).is_some_and(|v| v == "100g") {
            return;
        }
        write_field(self.ctx, product, field, "100g".to_owned());
        merge.modified += 1;
        merge.modified_fields.insert(field.to_owned());
        merge.nutrition_basis_defaulted = true;
    }
}
