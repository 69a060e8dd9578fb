//! Collaborators the importer is handed rather than reaching for.

use std::path::Path;

use crate::product::{ProductEntity, ProductId};

pub mod memory;
pub mod sqlite;

pub trait ProductStore {
    type Error: std::error::Error + Send + Sync + 'static;

    fn load(
        &self,
        id: &ProductId,
    ) -> impl Future<Output = Result<Option<ProductEntity>, Self::Error>> + Send;

    fn store(
        &self,
        product: &ProductEntity,
        message: &str,
    ) -> impl Future<Output = Result<(), Self::Error>> + Send;
}

pub trait TaxonomyResolver {
    /// Canonical tag id of `text` in language `lc` for a taxonomy-backed field.
    fn canonicalize(&self, lc: &str, field: &str, text: &str) -> String;
}

pub trait ImageService {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Store an image for a product, returning its image id.
    /// Re-uploading a known image returns the existing id.
    fn upload(
        &self,
        id: &ProductId,
        file: &Path,
    ) -> impl Future<Output = Result<u64, Self::Error>> + Send;

    fn select_crop(
        &self,
        id: &ProductId,
        slot: &str,
        image_id: u64,
    ) -> impl Future<Output = Result<(), Self::Error>> + Send;
}

/// Downstream enrichment run on products before they are stored.
pub trait Enrichment {
    /// Language-specific clean up of an ingredient list.
    fn clean_ingredients_text(&self, _lc: &str, text: &str) -> String {
        text.to_owned()
    }

    fn enrich(&self, _product: &mut ProductEntity) {}
}

/// Enrichment that leaves products untouched.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoEnrichment;

impl Enrichment for NoEnrichment {}
