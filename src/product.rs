use std::{collections::BTreeMap, sync::LazyLock};

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

static VALID_CODE: LazyLock<regex::Regex> =
    LazyLock::new(|| regex::Regex::new(r"^\d{8,}$").unwrap());

/// Normalize a raw product code.
///
/// Only digits are kept. Codes longer than 13 digits lose leading zeros
/// down to 13 digits, and 12-digit UPC-A codes get a leading zero.
pub fn normalize_code(raw: &str) -> String {
    let mut code: String = raw.chars().filter(char::is_ascii_digit).collect();
    while code.len() > 13 && code.starts_with('0') {
        code.remove(0);
    }
    if code.len() == 12 {
        code.insert(0, '0');
    }
    code
}

pub fn is_valid_code(code: &str) -> bool {
    VALID_CODE.is_match(code)
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProductId {
    pub owner: Option<String>,
    pub code: String,
}

impl ProductId {
    pub fn new(code: impl Into<String>, owner: Option<String>) -> Self {
        Self {
            owner,
            code: code.into(),
        }
    }
}

impl std::fmt::Display for ProductId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.owner {
            Some(owner) => write!(f, "{owner}/{}", self.code),
            None => f.write_str(&self.code),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Nutrient {
    pub value: Option<String>,
    pub unit: Option<String>,
    pub modifier: Option<String>,
}

impl Nutrient {
    pub fn is_empty(&self) -> bool {
        self.value.is_none() && self.unit.is_none() && self.modifier.is_none()
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvenanceRecord {
    pub source_id: String,
    pub source_name: String,
    pub source_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manufacturer: Option<bool>,
    pub imported_at: DateTime<Utc>,
    pub modified_fields: Vec<String>,
    pub image_ids: Vec<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub licence: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub licence_url: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadedImage {
    pub uploaded_at: DateTime<Utc>,
    pub uploader: String,
}

/// Images known for a product: every upload plus the crop selected per slot.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageSet {
    pub uploaded: BTreeMap<u64, UploadedImage>,
    pub selected: IndexMap<String, u64>,
}

impl ImageSet {
    pub fn max_image_id(&self) -> u64 {
        self.uploaded.keys().next_back().copied().unwrap_or(0)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProductEntity {
    pub id: ProductId,
    pub code: String,
    pub lc: Option<String>,
    /// Scalar, per-language and tag display strings, keyed by field name.
    #[serde(default)]
    pub fields: IndexMap<String, String>,
    /// Derived tag ids per tag-set field.
    #[serde(default)]
    pub tags: IndexMap<String, Vec<String>>,
    /// Keyed by nutrient id, `_prepared` suffixed for as-prepared values.
    #[serde(default)]
    pub nutriments: IndexMap<String, Nutrient>,
    #[serde(default)]
    pub owner_fields: IndexMap<String, DateTime<Utc>>,
    #[serde(default)]
    pub sources: Vec<ProvenanceRecord>,
    #[serde(default)]
    pub images: ImageSet,
}

impl ProductEntity {
    pub fn new(id: ProductId, lc: impl Into<String>) -> Self {
        Self {
            code: id.code.clone(),
            id,
            lc: Some(lc.into()),
            fields: IndexMap::new(),
            tags: IndexMap::new(),
            nutriments: IndexMap::new(),
            owner_fields: IndexMap::new(),
            sources: Vec::new(),
            images: ImageSet::default(),
        }
    }

    /// Field value, `None` when absent or blank.
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields
            .get(name)
            .map(String::as_str)
            .filter(|value| !value.trim().is_empty())
    }

    pub fn tag_ids(&self, field: &str) -> &[String] {
        self.tags.get(field).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn nutrient(&self, id: &str) -> Option<&Nutrient> {
        self.nutriments.get(id)
    }
}
