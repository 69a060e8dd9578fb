//! Image association
//!
//! Directory images, declared file columns and declared url columns are
//! merged per slot, in that order of increasing priority. Every slot whose
//! file is on disk is then uploaded, and selected when it is one of the
//! slots a product displays.

use std::{
    path::{Path, PathBuf},
    sync::LazyLock,
};

use indexmap::IndexMap;
use tracing::{debug, info, warn};

use crate::{
    backend::ImageService,
    config::ImportConfig,
    context::ImportContext,
    product::{ProductEntity, UploadedImage},
    row::ImportRow,
    warn_row,
};

use super::{fetch::RemoteImageFetcher, locator::DirectoryImages};

static IMAGE_COLUMN: LazyLock<regex::Regex> =
    LazyLock::new(|| regex::Regex::new(r"^image_(.+?)_(file|url)(?:_(\d+))?$").unwrap());

static LANGUAGE_QUALIFIABLE: LazyLock<regex::Regex> =
    LazyLock::new(|| regex::Regex::new(r"^(?:front|ingredients|nutrition|packaging)$").unwrap());

static SELECTABLE: LazyLock<regex::Regex> =
    LazyLock::new(|| regex::Regex::new(r"^(?:front|ingredients|nutrition)(?:_[a-z]{2})?$").unwrap());

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageSource {
    File(PathBuf),
    Url(String),
}

/// Append the product language to a bare `front`/`ingredients`/`nutrition`/`packaging` slot.
pub fn qualify_slot(slot: &str, lc: &str) -> String {
    if !lc.is_empty() && LANGUAGE_QUALIFIABLE.is_match(slot) {
        format!("{slot}_{lc}")
    } else {
        slot.to_owned()
    }
}

/// File and url columns of a row, per slot, in column order.
fn declared_columns(
    row: &ImportRow,
    images_dir: Option<&Path>,
) -> (IndexMap<String, PathBuf>, IndexMap<String, String>) {
    let mut files = IndexMap::new();
    let mut urls = IndexMap::new();
    for (column, value) in row.columns() {
        if value.is_empty() {
            continue;
        }
        let Some(caps) = IMAGE_COLUMN.captures(column) else {
            continue;
        };
        let slot = match caps.get(3) {
            Some(index) => format!("{}_{}", &caps[1], index.as_str()),
            None => caps[1].to_owned(),
        };
        if &caps[2] == "url" {
            urls.insert(slot, value.to_owned());
        } else {
            let path = PathBuf::from(value);
            let path = match images_dir {
                Some(dir) if path.is_relative() => dir.join(path),
                _ => path,
            };
            files.insert(slot, path);
        }
    }
    (files, urls)
}

/// Image sources declared by the row's `image_<slot>_file` and `image_<slot>_url` columns.
/// A url takes the slot over from a file column.
pub fn declared_images(row: &ImportRow, images_dir: Option<&Path>) -> IndexMap<String, ImageSource> {
    let (files, urls) = declared_columns(row, images_dir);
    let mut images = files
        .into_iter()
        .map(|(slot, path)| (slot, ImageSource::File(path)))
        .collect::<IndexMap<_, _>>();
    images.extend(urls.into_iter().map(|(slot, url)| (slot, ImageSource::Url(url))));
    images
}

/// What the association did to a product.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImageOutcome {
    /// Ids minted by this row's uploads.
    pub new_image_ids: Vec<u64>,
    /// Uploaded images or selections were recorded on the product.
    pub changed: bool,
}

pub struct ImageAssociator<'a, S> {
    pub ctx: &'a ImportContext,
    pub config: &'a ImportConfig,
    pub service: &'a S,
    pub fetcher: &'a RemoteImageFetcher,
    pub directory: &'a DirectoryImages,
}

impl<S: ImageService> ImageAssociator<'_, S> {
    /// Merged image sources of a code, lowest priority first.
    pub fn sources(&self, code: &str, row: &ImportRow) -> IndexMap<String, ImageSource> {
        let mut sources = self
            .directory
            .get(code)
            .into_iter()
            .flatten()
            .map(|(slot, path)| (slot.clone(), ImageSource::File(path.clone())))
            .collect::<IndexMap<_, _>>();
        sources.extend(declared_images(row, self.config.images_dir.as_deref()));
        sources
    }

    /// Local files per slot. Remote sources are fetched; a failed fetch keeps
    /// whatever lower-priority file the slot had. Dry runs fetch nothing.
    pub async fn resolve(&self, code: &str, row: &ImportRow) -> IndexMap<String, PathBuf> {
        let mut resolved = self
            .directory
            .get(code)
            .cloned()
            .unwrap_or_default();
        let (files, urls) = declared_columns(row, self.config.images_dir.as_deref());
        resolved.extend(files);
        for (slot, url) in urls {
            if self.config.dry_run {
                debug!(code, %slot, %url, "dry run, skip fetch");
                continue;
            }
            if let Some(path) = self.fetcher.fetch(code, &url).await {
                resolved.insert(slot, path);
            }
        }
        resolved
    }

    /// Upload and select the resolved images of a product.
    pub async fn associate(
        &self,
        product: &mut ProductEntity,
        slots: &IndexMap<String, PathBuf>,
    ) -> ImageOutcome {
        let lc = product.lc.clone().unwrap_or_default();
        let max_before = product.images.max_image_id();
        let mut outcome = ImageOutcome::default();

        for (slot, path) in slots {
            if !tokio::fs::try_exists(path).await.unwrap_or(false) {
                info!(code = %product.code, %slot, path = %path.display(), "Image file not found, skip");
                continue;
            }
            let slot = qualify_slot(slot, &lc);
            if self.config.dry_run {
                debug!(code = %product.code, %slot, "dry run, skip upload");
                continue;
            }
            let image_id = match self.service.upload(&product.id, path).await {
                Ok(image_id) => image_id,
                Err(error) => {
                    warn!(%error, code = %product.code, %slot, "Failed to upload image");
                    warn_row!("failed to upload {slot} image: {error}");
                    continue;
                }
            };
            if image_id > max_before && !product.images.uploaded.contains_key(&image_id) {
                debug!(code = %product.code, %slot, image_id, "uploaded new image");
                product.images.uploaded.insert(
                    image_id,
                    UploadedImage {
                        uploaded_at: self.ctx.now,
                        uploader: self.ctx.user_id.clone(),
                    },
                );
                outcome.new_image_ids.push(image_id);
                outcome.changed = true;
            }

            if !SELECTABLE.is_match(&slot) {
                continue;
            }
            let current = product.images.selected.get(&slot).copied();
            if self.config.only_select_not_existing_images && current.is_some() {
                debug!(code = %product.code, %slot, "slot already selected");
                continue;
            }
            if current == Some(image_id) {
                continue;
            }
            match self.service.select_crop(&product.id, &slot, image_id).await {
                Ok(()) => {
                    debug!(code = %product.code, %slot, image_id, "selected image");
                    product.images.selected.insert(slot, image_id);
                    outcome.changed = true;
                }
                Err(error) => {
                    warn!(%error, code = %product.code, %slot, image_id, "Failed to select image");
                    warn_row!("failed to select {slot} image: {error}");
                }
            }
        }
        outcome
    }
}
