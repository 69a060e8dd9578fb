//! In-memory implementations of every collaborator.

use std::{
    collections::{HashMap, HashSet},
    path::Path,
};

use tracing::debug;

use crate::{
    normalize::fold_tag_id,
    product::{ProductEntity, ProductId},
};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("store rejected {0}")]
    Rejected(String),
    #[error("failed to read image {path:?}: {error}")]
    ReadImage {
        path: std::path::PathBuf,
        error: std::io::Error,
    },
    #[error("unknown image {image_id} for {product}")]
    UnknownImage { product: String, image_id: u64 },
}

#[derive(Default)]
pub struct MemoryStore {
    products: tokio::sync::Mutex<HashMap<String, ProductEntity>>,
    history: tokio::sync::Mutex<Vec<(String, String)>>,
    rejected: HashSet<String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Default::default()
    }

    /// A store that refuses writes for the given product ids.
    pub fn rejecting(ids: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            rejected: ids.into_iter().map(Into::into).collect(),
            ..Default::default()
        }
    }

    pub async fn insert(&self, product: ProductEntity) {
        self.products
            .lock()
            .await
            .insert(product.id.to_string(), product);
    }

    pub async fn get(&self, id: &str) -> Option<ProductEntity> {
        self.products.lock().await.get(id).cloned()
    }

    /// Every successful write as `(product id, message)`, oldest first.
    pub async fn history(&self) -> Vec<(String, String)> {
        self.history.lock().await.clone()
    }
}

impl super::ProductStore for MemoryStore {
    type Error = Error;

    async fn load(&self, id: &ProductId) -> Result<Option<ProductEntity>, Self::Error> {
        Ok(self.products.lock().await.get(&id.to_string()).cloned())
    }

    async fn store(&self, product: &ProductEntity, message: &str) -> Result<(), Self::Error> {
        let id = product.id.to_string();
        if self.rejected.contains(&id) {
            return Err(Error::Rejected(id));
        }
        debug!(%id, message, "store product");
        self.products.lock().await.insert(id.clone(), product.clone());
        self.history.lock().await.push((id, message.to_owned()));
        Ok(())
    }
}

/// Taxonomy that folds text into `<lc>:<id>`, with optional synonyms.
#[derive(Default, Clone)]
pub struct FoldingTaxonomy {
    synonyms: HashMap<String, String>,
}

impl FoldingTaxonomy {
    pub fn new() -> Self {
        Default::default()
    }

    /// Resolve `text` (in any language) to the canonical `tag_id`.
    pub fn with_synonym(mut self, text: &str, tag_id: impl Into<String>) -> Self {
        self.synonyms.insert(fold_tag_id(text), tag_id.into());
        self
    }
}

impl super::TaxonomyResolver for FoldingTaxonomy {
    fn canonicalize(&self, lc: &str, _field: &str, text: &str) -> String {
        let folded = fold_tag_id(text);
        match self.synonyms.get(&folded) {
            Some(tag_id) => tag_id.clone(),
            None => format!("{lc}:{folded}"),
        }
    }
}

#[derive(Default)]
struct ProductImages {
    bodies: Vec<(u64, Vec<u8>)>,
    selected: HashMap<String, u64>,
}

/// Image service keeping uploads in memory, deduplicated by content.
#[derive(Default)]
pub struct MemoryImageService {
    products: tokio::sync::Mutex<HashMap<String, ProductImages>>,
    reject_uploads: bool,
}

impl MemoryImageService {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn rejecting_uploads() -> Self {
        Self {
            reject_uploads: true,
            ..Default::default()
        }
    }

    /// Seed an already uploaded image, as if a previous run stored it.
    pub async fn seed(&self, id: &ProductId, image_id: u64, body: Vec<u8>) {
        self.products
            .lock()
            .await
            .entry(id.to_string())
            .or_default()
            .bodies
            .push((image_id, body));
    }

    pub async fn selected(&self, id: &ProductId, slot: &str) -> Option<u64> {
        self.products
            .lock()
            .await
            .get(&id.to_string())
            .and_then(|images| images.selected.get(slot).copied())
    }

    pub async fn upload_count(&self, id: &ProductId) -> usize {
        self.products
            .lock()
            .await
            .get(&id.to_string())
            .map_or(0, |images| images.bodies.len())
    }
}

impl super::ImageService for MemoryImageService {
    type Error = Error;

    async fn upload(&self, id: &ProductId, file: &Path) -> Result<u64, Self::Error> {
        if self.reject_uploads {
            return Err(Error::Rejected(id.to_string()));
        }
        let body = tokio::fs::read(file)
            .await
            .map_err(|error| Error::ReadImage {
                path: file.to_owned(),
                error,
            })?;
        let mut products = self.products.lock().await;
        let images = products.entry(id.to_string()).or_default();
        if let Some((image_id, _)) = images.bodies.iter().find(|(_, known)| *known == body) {
            return Ok(*image_id);
        }
        let image_id = images.bodies.iter().map(|(id, _)| *id).max().unwrap_or(0) + 1;
        images.bodies.push((image_id, body));
        Ok(image_id)
    }

    async fn select_crop(&self, id: &ProductId, slot: &str, image_id: u64) -> Result<(), Self::Error> {
        let mut products = self.products.lock().await;
        let images = products.entry(id.to_string()).or_default();
        if !images.bodies.iter().any(|(known, _)| *known == image_id) {
            return Err(Error::UnknownImage {
                product: id.to_string(),
                image_id,
            });
        }
        images.selected.insert(slot.to_owned(), image_id);
        Ok(())
    }
}
