//! Per-row merge engines
//!
//! Each engine mutates the product in place and records what it did in a
//! [`RowMerge`], which the statistics tracker later turns into categories.

use indexmap::{IndexMap, IndexSet};

use crate::{context::ImportContext, product::ProductEntity, stats::Category};

pub mod fields;
pub mod nutrients;
pub mod tags;

/// Bookkeeping of a single row's merge.
#[derive(Debug, Default, Clone)]
pub struct RowMerge {
    pub modified: usize,
    pub modified_fields: IndexSet<String>,
    pub flags: IndexSet<Category>,
    /// `nutrition_data_per` (or its prepared twin) was defaulted to `100g`.
    pub nutrition_basis_defaulted: bool,
}

impl RowMerge {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn flag(&mut self, category: Category) {
        self.flags.insert(category);
    }

    pub fn has(&self, category: Category) -> bool {
        self.flags.contains(&category)
    }

    /// Record a written field, counting it as one modification.
    pub(crate) fn record_field(&mut self, field: &str, category: Category) {
        self.modified += 1;
        self.modified_fields.insert(field.to_owned());
        self.flag(category);
    }
}

/// Write a field on the product, stamping owner fields when an organization is attributed.
pub(crate) fn write_field(
    ctx: &ImportContext,
    product: &mut ProductEntity,
    field: &str,
    value: String,
) {
    product.fields.insert(field.to_owned(), value);
    stamp_owner_field(ctx, &mut product.owner_fields, field);
}

pub(crate) fn stamp_owner_field(
    ctx: &ImportContext,
    owner_fields: &mut IndexMap<String, chrono::DateTime<chrono::Utc>>,
    field: &str,
) {
    if ctx.org_id.is_some() {
        owner_fields.insert(field.to_owned(), ctx.now);
    }
}
