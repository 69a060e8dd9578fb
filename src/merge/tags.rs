//! Tag-set merge
//!
//! Incoming comma-separated tags are unioned into the product's display
//! string and derived id list. Existing tags are never removed.

use indexmap::IndexSet;
use tracing::debug;

use crate::{
    backend::TaxonomyResolver,
    context::ImportContext,
    normalize::{fold_tag_id, is_punctuation_only, normalize_packager_code},
    product::ProductEntity,
    schema::{FieldDescriptor, FieldKind},
    stats::Category,
};

use super::{RowMerge, write_field};

const PACKAGING_CODES: &str = "emb_codes";
const BRANDS: &str = "brands";

pub struct TagMerger<'a, T> {
    pub ctx: &'a ImportContext,
    pub taxonomy: &'a T,
    /// Language the tags are interpreted in.
    pub lc: &'a str,
}

impl<T: TaxonomyResolver> TagMerger<'_, T> {
    fn resolve(&self, field: &FieldDescriptor, token: &str) -> String {
        match field.kind {
            FieldKind::TagSet { taxonomy: true } => {
                self.taxonomy.canonicalize(self.lc, &field.name, token)
            }
            _ => fold_tag_id(token),
        }
    }

    fn display_ids<'s>(
        &'s self,
        field: &'s FieldDescriptor,
        display: &'s str,
    ) -> impl Iterator<Item = String> + 's {
        display
            .split(',')
            .filter(|token| !is_punctuation_only(token))
            .map(|token| self.resolve(field, token.trim()))
            .filter(|id| !id.is_empty())
    }

    pub fn merge(
        &self,
        field: &FieldDescriptor,
        incoming: &str,
        product: &mut ProductEntity,
        merge: &mut RowMerge,
    ) {
        let name = field.name.as_str();
        let packaging_codes = name == PACKAGING_CODES;
        let had_value = product.field(name).is_some();
        let previous = product.fields.get(name).cloned().unwrap_or_default();
        let orig_name = format!("{name}_orig");
        let previous_orig = product.fields.get(&orig_name).cloned().unwrap_or_default();

        // display tokens are resolved only when no ids were stored
        let mut seen = match product.tag_ids(name) {
            [] => self.display_ids(field, &previous).collect::<IndexSet<_>>(),
            stored => stored.iter().cloned().collect(),
        };
        let mut display = previous.clone();
        let mut orig = previous_orig.clone();
        let mut added = 0;

        for raw in incoming.split(',') {
            if is_punctuation_only(raw) {
                continue;
            }
            let raw = raw.trim();
            let token = if packaging_codes {
                normalize_packager_code(raw)
            } else {
                raw.to_owned()
            };
            let id = self.resolve(field, &token);
            if id.is_empty() {
                continue;
            }
            if seen.insert(id.clone()) {
                debug!(field = name, tag = %token, %id, "add tag");
                display = format!("{display}, {token}");
                if packaging_codes {
                    orig = format!("{orig}, {raw}");
                }
                added += 1;
            } else if name == BRANDS {
                display = recase(&display, &token);
            }
        }
        let display = display.strip_prefix(", ").unwrap_or(&display).to_owned();
        let orig = orig.strip_prefix(", ").unwrap_or(&orig).to_owned();

        let changed = display != previous;
        if changed {
            write_field(self.ctx, product, name, display.clone());
        }
        if added > 0 {
            let category = if had_value {
                Category::ProductsInfoChanged
            } else {
                Category::ProductsInfoAdded
            };
            for _ in 0..added {
                merge.record_field(name, category);
            }
        }
        if changed || name == BRANDS {
            product.tags.insert(name.to_owned(), seen.into_iter().collect());
        }
        if packaging_codes && orig != previous_orig {
            product.fields.insert(orig_name, orig);
        }
    }
}

/// Replace every whole-word, case-insensitive occurrence of `token` in
/// `display` with `token` itself. The token is matched literally.
fn recase(display: &str, token: &str) -> String {
    let pattern = format!(r"(?i)(^|[^\w])({})([^\w]|$)", regex::escape(token));
    let Ok(re) = regex::Regex::new(&pattern) else {
        return display.to_owned();
    };
    re.replace_all(display, |caps: &regex::Captures| {
        format!("{}{token}{}", &caps[1], &caps[3])
    })
    .into_owned()
}
