//! Field merge
//!
//! Walks the candidate field list of the [`FieldRegistry`] and decides, per
//! field, whether the incoming value is new, a change or a no-op. Tag-typed
//! fields are handed over to the [`TagMerger`].

use tracing::debug;

use crate::{
    backend::{Enrichment, TaxonomyResolver},
    config::ImportConfig,
    context::ImportContext,
    normalize::canonicalize_quantity,
    product::ProductEntity,
    row::{ImportRow, is_affirmative, sanitize_cell},
    schema::{FieldDescriptor, FieldKind, FieldRegistry, IF_NOT_EXISTING},
    stats::Category,
};

use super::{RowMerge, tags::TagMerger, write_field};

pub struct FieldMerger<'a, T, E> {
    pub ctx: &'a ImportContext,
    pub config: &'a ImportConfig,
    pub registry: &'a FieldRegistry,
    pub taxonomy: &'a T,
    pub enrichment: &'a E,
}

impl<T: TaxonomyResolver, E: Enrichment> FieldMerger<'_, T, E> {
    /// Whether the row carries any descriptive field at all.
    pub fn row_has_info(&self, row: &ImportRow, lc: &str) -> bool {
        self.registry
            .iter()
            .any(|field| self.incoming(field, row, lc, None).is_some())
    }

    /// Merge every candidate field of the row into the product.
    pub fn merge(&self, row: &ImportRow, lc: &str, product: &mut ProductEntity, merge: &mut RowMerge) {
        let tags_lc = self
            .config
            .tags_lc
            .clone()
            .or_else(|| product.lc.clone())
            .unwrap_or_else(|| lc.to_owned());
        let tags = TagMerger {
            ctx: self.ctx,
            taxonomy: self.taxonomy,
            lc: &tags_lc,
        };

        for field in self.registry.iter() {
            let Some(incoming) = self.incoming(field, row, lc, Some(product)) else {
                continue;
            };
            merge.flag(Category::ProductsWithInfo);
            if field.is_ingredients_text() {
                merge.flag(Category::ProductsWithIngredients);
            }
            if field.is_tag() {
                tags.merge(field, &incoming, product, merge);
            } else {
                self.merge_scalar(field, incoming, product, merge);
            }
        }
    }

    /// Resolve the incoming value of one field, `None` when it is blank.
    ///
    /// Without a product the `_if_not_existing` fallback is always considered.
    fn incoming(
        &self,
        field: &FieldDescriptor,
        row: &ImportRow,
        lc: &str,
        product: Option<&ProductEntity>,
    ) -> Option<String> {
        let name = field.name.as_str();
        let mut value = row.get(name).map(str::to_owned);
        if value.is_none()
            && let FieldKind::PerLanguage { lc: field_lc } = &field.kind
            && field_lc == lc
        {
            value = row.get(&field.base).map(str::to_owned);
        }
        let existing = product.and_then(|product| product.field(name));
        if existing.is_none()
            && let Some(fallback) = row.get(&format!("{name}{IF_NOT_EXISTING}"))
        {
            value = Some(fallback.to_owned());
        }
        if field.is_tag() {
            let prefix = format!("{name}:");
            for (column, cell) in row.columns() {
                if let Some(tag) = column.strip_prefix(&prefix)
                    && is_affirmative(cell)
                {
                    value = Some(match value {
                        Some(value) => format!("{value}, {tag}"),
                        None => tag.to_owned(),
                    });
                }
            }
        }
        let value = sanitize_cell(&value?);
        (!value.is_empty()).then_some(value)
    }

    fn merge_scalar(
        &self,
        field: &FieldDescriptor,
        incoming: String,
        product: &mut ProductEntity,
        merge: &mut RowMerge,
    ) {
        let name = field.name.as_str();
        let mut value = incoming.trim().to_owned();
        if field.is_quantity() {
            value = canonicalize_quantity(&value);
        }
        if field.is_ingredients_text()
            && let FieldKind::PerLanguage { lc } = &field.kind
        {
            value = self.enrichment.clean_ingredients_text(lc, &value);
        }
        if value.is_empty() {
            return;
        }

        let Some(existing) = product.field(name) else {
            debug!(field = name, %value, "add field");
            write_field(self.ctx, product, name, value);
            merge.record_field(name, Category::ProductsInfoAdded);
            return;
        };

        let comparable = if field.is_quantity() {
            canonicalize_quantity(existing)
        } else {
            existing.to_owned()
        };
        if comparable.trim().to_lowercase() != value.to_lowercase() {
            if self.config.skip_existing_values {
                debug!(field = name, existing, %value, "keep existing value");
                return;
            }
            debug!(field = name, existing, %value, "change field");
            write_field(self.ctx, product, name, value);
            merge.record_field(name, Category::ProductsInfoChanged);
        } else if name == "quantity" && existing != value {
            debug!(field = name, existing, %value, "normalize quantity");
            write_field(self.ctx, product, name, value);
            merge.record_field(name, Category::ProductsInfoChanged);
        }
    }
}
