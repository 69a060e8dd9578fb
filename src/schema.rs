//! Field registry
//!
//! The ordered list of candidate fields merged for every row of a batch,
//! compiled once from the configuration and the header row.

use std::sync::LazyLock;

use indexmap::{IndexMap, IndexSet};

use crate::config::ImportConfig;

/// Fields that exist once per language (`<field>_<lc>`).
pub const LANGUAGE_FIELDS: &[&str] = &[
    "product_name",
    "abbreviated_product_name",
    "generic_name",
    "ingredients_text",
    "packaging_text",
    "conservation_conditions",
    "preparation",
    "warning",
    "recipe_idea",
    "other_information",
    "customer_service",
    "origin",
];

pub const SCALAR_FIELDS: &[&str] = &[
    "quantity",
    "serving_size",
    "link",
    "expiration_date",
    "producer_version_id",
    "nutrition_data_per",
    "nutrition_data_prepared_per",
];

/// Tag-set fields and whether a taxonomy backs them.
pub const TAG_FIELDS: &[(&str, bool)] = &[
    ("brands", false),
    ("categories", true),
    ("labels", true),
    ("origins", true),
    ("manufacturing_places", false),
    ("emb_codes", false),
    ("packaging", true),
    ("stores", false),
    ("countries", true),
    ("purchase_places", false),
    ("allergens", true),
    ("traces", true),
];

static LANGUAGE_SUFFIXED: LazyLock<regex::Regex> =
    LazyLock::new(|| regex::Regex::new(r"^(.+)_([a-z]{2})$").unwrap());

pub const IF_NOT_EXISTING: &str = "_if_not_existing";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldKind {
    Scalar,
    PerLanguage { lc: String },
    TagSet { taxonomy: bool },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDescriptor {
    /// Column and entity field name, e.g. `product_name_fr`.
    pub name: String,
    /// Field name without language suffix.
    pub base: String,
    pub kind: FieldKind,
}

impl FieldDescriptor {
    pub fn is_tag(&self) -> bool {
        matches!(self.kind, FieldKind::TagSet { .. })
    }

    pub fn is_quantity(&self) -> bool {
        matches!(self.name.as_str(), "quantity" | "serving_size")
    }

    pub fn is_ingredients_text(&self) -> bool {
        self.base == "ingredients_text" && matches!(self.kind, FieldKind::PerLanguage { .. })
    }
}

#[derive(Debug, Clone)]
pub struct FieldRegistry {
    fields: IndexMap<String, FieldDescriptor>,
}

impl FieldRegistry {
    /// Compile the candidate list: core scalars, extra fields, tag fields,
    /// then every language variant discovered in the header row.
    pub fn compile(config: &ImportConfig, headers: &[String]) -> Self {
        let mut fields = IndexMap::new();
        let mut push = |descriptor: FieldDescriptor| {
            fields.entry(descriptor.name.clone()).or_insert(descriptor);
        };
        for name in SCALAR_FIELDS
            .iter()
            .copied()
            .chain(config.extra_fields.iter().map(String::as_str))
        {
            push(FieldDescriptor {
                name: name.to_owned(),
                base: name.to_owned(),
                kind: FieldKind::Scalar,
            });
        }
        for (name, taxonomy) in TAG_FIELDS {
            push(FieldDescriptor {
                name: (*name).to_owned(),
                base: (*name).to_owned(),
                kind: FieldKind::TagSet {
                    taxonomy: *taxonomy,
                },
            });
        }
        let languages = discover_languages(headers);
        for base in LANGUAGE_FIELDS {
            for lc in &languages {
                push(FieldDescriptor {
                    name: format!("{base}_{lc}"),
                    base: (*base).to_owned(),
                    kind: FieldKind::PerLanguage { lc: lc.clone() },
                });
            }
        }
        Self { fields }
    }

    pub fn iter(&self) -> impl Iterator<Item = &FieldDescriptor> {
        self.fields.values()
    }

    pub fn get(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields.get(name)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Add the descriptors of one language, for rows whose language no header mentions.
    pub fn ensure_language(&mut self, lc: &str) {
        for base in LANGUAGE_FIELDS {
            let name = format!("{base}_{lc}");
            self.fields.entry(name.clone()).or_insert(FieldDescriptor {
                name,
                base: (*base).to_owned(),
                kind: FieldKind::PerLanguage { lc: lc.to_owned() },
            });
        }
    }
}

/// Language codes carried by per-language columns, in header order.
fn discover_languages(headers: &[String]) -> IndexSet<String> {
    headers
        .iter()
        .map(|header| header.strip_suffix(IF_NOT_EXISTING).unwrap_or(header))
        .filter_map(|header| {
            let caps = LANGUAGE_SUFFIXED.captures(header)?;
            LANGUAGE_FIELDS
                .contains(&&caps[1])
                .then(|| caps[2].to_owned())
        })
        .collect()
}
