//! Statistics and provenance
//!
//! Every row leaves its code in a handful of named categories. Engines set
//! the primary flags, [`MergeStatistics::record_row`] derives the aggregates.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::{
    config::ImportConfig, context::ImportContext, merge::RowMerge, product::ProvenanceRecord,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    ProductsInFile,
    ProductsInvalidCode,
    ProductsInvalidLc,
    ProductsAlreadyExisting,
    ProductsCreated,
    ProductsSkipped,
    ProductsLoadFailed,
    ProductsStoreFailed,
    ProductsInfoAdded,
    ProductsInfoChanged,
    ProductsInfoUpdated,
    ProductsInfoNotUpdated,
    ProductsNutritionAdded,
    ProductsNutritionChanged,
    ProductsNutritionUpdated,
    ProductsNutritionNotUpdated,
    ProductsDataUpdated,
    ProductsDataNotUpdated,
    ProductsWithInfo,
    ProductsWithoutInfo,
    ProductsWithIngredients,
    ProductsWithoutIngredients,
    ProductsWithNutrition,
    ProductsWithoutNutrition,
    ProductsWithData,
    ProductsWithoutData,
    ProductsWithImages,
    ProductsWithoutImages,
    ProductsImagesAdded,
    ProductsUpdated,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ProductsInFile => "products_in_file",
            Self::ProductsInvalidCode => "products_invalid_code",
            Self::ProductsInvalidLc => "products_invalid_lc",
            Self::ProductsAlreadyExisting => "products_already_existing",
            Self::ProductsCreated => "products_created",
            Self::ProductsSkipped => "products_skipped",
            Self::ProductsLoadFailed => "products_load_failed",
            Self::ProductsStoreFailed => "products_store_failed",
            Self::ProductsInfoAdded => "products_info_added",
            Self::ProductsInfoChanged => "products_info_changed",
            Self::ProductsInfoUpdated => "products_info_updated",
            Self::ProductsInfoNotUpdated => "products_info_not_updated",
            Self::ProductsNutritionAdded => "products_nutrition_added",
            Self::ProductsNutritionChanged => "products_nutrition_changed",
            Self::ProductsNutritionUpdated => "products_nutrition_updated",
            Self::ProductsNutritionNotUpdated => "products_nutrition_not_updated",
            Self::ProductsDataUpdated => "products_data_updated",
            Self::ProductsDataNotUpdated => "products_data_not_updated",
            Self::ProductsWithInfo => "products_with_info",
            Self::ProductsWithoutInfo => "products_without_info",
            Self::ProductsWithIngredients => "products_with_ingredients",
            Self::ProductsWithoutIngredients => "products_without_ingredients",
            Self::ProductsWithNutrition => "products_with_nutrition",
            Self::ProductsWithoutNutrition => "products_without_nutrition",
            Self::ProductsWithData => "products_with_data",
            Self::ProductsWithoutData => "products_without_data",
            Self::ProductsWithImages => "products_with_images",
            Self::ProductsWithoutImages => "products_without_images",
            Self::ProductsImagesAdded => "products_images_added",
            Self::ProductsUpdated => "products_updated",
        }
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Category name to the set of codes in it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MergeStatistics {
    categories: BTreeMap<Category, BTreeSet<String>>,
}

impl MergeStatistics {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn mark(&mut self, category: Category, code: &str) {
        self.categories
            .entry(category)
            .or_default()
            .insert(code.to_owned());
    }

    pub fn contains(&self, category: Category, code: &str) -> bool {
        self.categories
            .get(&category)
            .is_some_and(|codes| codes.contains(code))
    }

    pub fn codes(&self, category: Category) -> impl Iterator<Item = &str> {
        self.categories
            .get(&category)
            .into_iter()
            .flatten()
            .map(String::as_str)
    }

    pub fn count(&self, category: Category) -> usize {
        self.categories.get(&category).map_or(0, BTreeSet::len)
    }

    /// Non-empty categories in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = (Category, &BTreeSet<String>)> {
        self.categories
            .iter()
            .filter(|(_, codes)| !codes.is_empty())
            .map(|(category, codes)| (*category, codes))
    }

    /// Record the primary flags of a merged row and derive the aggregates.
    ///
    /// A row lands in `products_data_updated` exactly when its modification
    /// counter is non-zero.
    pub fn record_row(&mut self, code: &str, merge: &RowMerge) {
        for category in &merge.flags {
            self.mark(*category, code);
        }
        let has = |category| merge.has(category);

        let info_updated = has(Category::ProductsInfoAdded) || has(Category::ProductsInfoChanged);
        let nutrition_updated = has(Category::ProductsNutritionAdded)
            || has(Category::ProductsNutritionChanged)
            || has(Category::ProductsNutritionUpdated);
        let data_updated = merge.modified > 0;
        debug_assert_eq!(
            data_updated,
            info_updated || nutrition_updated || merge.nutrition_basis_defaulted
        );

        let pairs = [
            (
                info_updated,
                Category::ProductsInfoUpdated,
                Category::ProductsInfoNotUpdated,
            ),
            (
                nutrition_updated,
                Category::ProductsNutritionUpdated,
                Category::ProductsNutritionNotUpdated,
            ),
            (
                data_updated,
                Category::ProductsDataUpdated,
                Category::ProductsDataNotUpdated,
            ),
            (
                has(Category::ProductsWithInfo),
                Category::ProductsWithInfo,
                Category::ProductsWithoutInfo,
            ),
            (
                has(Category::ProductsWithIngredients),
                Category::ProductsWithIngredients,
                Category::ProductsWithoutIngredients,
            ),
            (
                has(Category::ProductsWithNutrition),
                Category::ProductsWithNutrition,
                Category::ProductsWithoutNutrition,
            ),
            (
                has(Category::ProductsWithInfo) || has(Category::ProductsWithNutrition),
                Category::ProductsWithData,
                Category::ProductsWithoutData,
            ),
        ];
        for (holds, with, without) in pairs {
            self.mark(if holds { with } else { without }, code);
        }
    }
}

/// Provenance record for a persisted row, `None` when attribution is suppressed.
pub fn provenance(
    config: &ImportConfig,
    ctx: &ImportContext,
    modified_fields: impl IntoIterator<Item = String>,
    image_ids: impl IntoIterator<Item = u64>,
) -> Option<ProvenanceRecord> {
    if config.no_source {
        return None;
    }
    let source = config.source.as_ref()?;
    Some(ProvenanceRecord {
        source_id: source.id.clone(),
        source_name: source.name.clone(),
        source_url: source.url.clone(),
        manufacturer: source.manufacturer.then_some(true),
        imported_at: ctx.now,
        modified_fields: modified_fields.into_iter().collect(),
        image_ids: image_ids.into_iter().collect(),
        licence: source.licence.clone(),
        licence_url: source.licence_url.clone(),
    })
}
