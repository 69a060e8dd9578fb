//! The row loop
//!
//! Rows are processed one at a time: code validation, load or create,
//! field, tag and nutrient merges, statistics, persistence, then image
//! association. A failing row is counted and logged, never fatal.

use indexmap::IndexMap;
use std::path::PathBuf;
use tracing::{debug, error, info, warn};

use crate::{
    Error, RowContext, RowError, RowErrorDetail,
    backend::{Enrichment, ImageService, NoEnrichment, ProductStore, TaxonomyResolver},
    config::ImportConfig,
    context::ImportContext,
    images::{
        associate::ImageAssociator,
        fetch::RemoteImageFetcher,
        locator::{DirectoryImages, load_rules},
    },
    merge::{RowMerge, fields::FieldMerger, nutrients::NutrientMerger},
    product::{ProductEntity, ProductId, is_valid_code, normalize_code},
    progress::{BatchPhase, NullReporter, ProgressReporter, RowStatus},
    row::{ImportRow, is_language_code},
    schema::{FieldRegistry, LANGUAGE_FIELDS},
    stats::{Category, MergeStatistics, provenance},
    warning::collect_warnings,
};

const STORE_MESSAGE: &str = "import";
const STORE_IMAGES_MESSAGE: &str = "import images";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Another code was selected with `skip_if_not_code`.
    NotSelectedCode,
    NotExisting,
    WithoutInfo,
    WithoutImages,
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::NotSelectedCode => "not the selected code",
            Self::NotExisting => "product does not exist",
            Self::WithoutInfo => "no product information",
            Self::WithoutImages => "no images",
        })
    }
}

#[derive(Debug)]
pub enum RowOutcome {
    Created,
    Updated,
    /// Nothing to store for this row.
    Unchanged,
    Skipped(SkipReason),
    Failed(RowError),
}

impl RowOutcome {
    fn status(&self) -> RowStatus {
        match self {
            Self::Created => RowStatus::Created,
            Self::Updated => RowStatus::Updated,
            Self::Unchanged => RowStatus::Unchanged,
            Self::Skipped(reason) => RowStatus::Skipped(reason.to_string()),
            Self::Failed(error) => RowStatus::Failed(error.detail.to_string()),
        }
    }
}

/// State shared by the rows of one batch.
pub struct ImportBatch<'a> {
    ctx: &'a ImportContext,
    config: &'a ImportConfig,
    registry: FieldRegistry,
    fetcher: RemoteImageFetcher,
    directory: DirectoryImages,
    stats: MergeStatistics,
}

impl<'a> ImportBatch<'a> {
    /// Validate the configuration, scan the images directory and compile the
    /// field registry. Any failure here aborts the batch.
    pub async fn prepare(
        ctx: &'a ImportContext,
        config: &'a ImportConfig,
        headers: &[String],
        reporter: &dyn ProgressReporter,
    ) -> Result<Self, Error> {
        config.validate()?;
        let directory = match &config.images_dir {
            Some(dir) => {
                reporter.set_phase(BatchPhase::ScanningImages);
                let rules = match &config.image_rules_file {
                    Some(path) => load_rules(path).await?,
                    None => Vec::new(),
                };
                DirectoryImages::scan(dir, &rules).await?
            }
            None => DirectoryImages::default(),
        };
        reporter.set_phase(BatchPhase::CompilingSchema);
        let registry = FieldRegistry::compile(config, headers);
        debug!(fields = registry.len(), "compiled field registry");
        Ok(Self {
            ctx,
            config,
            registry,
            fetcher: RemoteImageFetcher::new(config),
            directory,
            stats: MergeStatistics::new(),
        })
    }

    pub fn statistics(&self) -> &MergeStatistics {
        &self.stats
    }

    pub fn finish(self) -> MergeStatistics {
        self.stats
    }
}

pub struct Importer<S, T, I, E = NoEnrichment> {
    pub store: S,
    pub taxonomy: T,
    pub images: I,
    pub enrichment: E,
}

impl<S, T, I> Importer<S, T, I> {
    pub fn new(store: S, taxonomy: T, images: I) -> Self {
        Self {
            store,
            taxonomy,
            images,
            enrichment: NoEnrichment,
        }
    }
}

impl<S, T, I, E> Importer<S, T, I, E>
where
    S: ProductStore,
    T: TaxonomyResolver,
    I: ImageService,
    E: Enrichment,
{
    pub fn with_enrichment<E2: Enrichment>(self, enrichment: E2) -> Importer<S, T, I, E2> {
        Importer {
            store: self.store,
            taxonomy: self.taxonomy,
            images: self.images,
            enrichment,
        }
    }

    /// Import a batch of rows and return the statistics.
    pub async fn run(
        &self,
        ctx: &ImportContext,
        config: &ImportConfig,
        headers: &[String],
        rows: impl IntoIterator<Item = ImportRow>,
    ) -> Result<MergeStatistics, Error> {
        self.run_with_reporter(ctx, config, headers, rows, &NullReporter)
            .await
    }

    pub async fn run_with_reporter(
        &self,
        ctx: &ImportContext,
        config: &ImportConfig,
        headers: &[String],
        rows: impl IntoIterator<Item = ImportRow>,
        reporter: &dyn ProgressReporter,
    ) -> Result<MergeStatistics, Error> {
        let mut batch = ImportBatch::prepare(ctx, config, headers, reporter)
            .await
            .inspect_err(|error| reporter.set_phase(BatchPhase::Failed(error.to_string())))?;
        let rows = rows.into_iter().collect::<Vec<_>>();
        reporter.register_rows(rows.len());
        reporter.set_phase(BatchPhase::ProcessingRows);

        for row in rows {
            let line = row.line;
            let (outcome, warnings) = collect_warnings(self.import_row(&mut batch, row)).await;
            for warning in warnings {
                reporter.log_warn(&format!("line {line}: {warning}"));
            }
            let code = match &outcome {
                RowOutcome::Failed(error) => error.context.code.clone(),
                _ => None,
            };
            if let RowOutcome::Failed(error) = &outcome {
                warn!(%error, "Row failed");
            }
            reporter.row_finished(line, code.as_deref(), outcome.status());
        }

        let stats = batch.finish();
        info!(
            in_file = stats.count(Category::ProductsInFile),
            created = stats.count(Category::ProductsCreated),
            updated = stats.count(Category::ProductsUpdated),
            "import finished"
        );
        reporter.set_phase(BatchPhase::Completed);
        reporter.finish(&stats);
        Ok(stats)
    }

    /// Merge one row into its product.
    pub async fn import_row(&self, batch: &mut ImportBatch<'_>, mut row: ImportRow) -> RowOutcome {
        let ctx = batch.ctx;
        let config = batch.config;
        row.apply_defaults(&config.default_values);
        let context = RowContext::new(row.line);

        let Some(raw_code) = row.get("code") else {
            return RowOutcome::Failed(context.error(RowErrorDetail::EmptyCode));
        };
        let code = normalize_code(raw_code);
        if !is_valid_code(&code) {
            batch.stats.mark(Category::ProductsInvalidCode, raw_code);
            return RowOutcome::Failed(
                context.error(RowErrorDetail::InvalidCode(raw_code.to_owned())),
            );
        }
        let context = context.with_code(&code);
        if let Some(selected) = &config.skip_if_not_code
            && normalize_code(selected) != code
        {
            return RowOutcome::Skipped(SkipReason::NotSelectedCode);
        }
        batch.stats.mark(Category::ProductsInFile, &code);

        let lc = row.get("lc").unwrap_or_default().to_lowercase();
        if !is_language_code(&lc) {
            batch.stats.mark(Category::ProductsInvalidLc, &code);
            return RowOutcome::Failed(context.error(RowErrorDetail::InvalidLanguage(lc)));
        }

        let extended;
        let registry = if batch
            .registry
            .get(&format!("{}_{lc}", LANGUAGE_FIELDS[0]))
            .is_some()
        {
            &batch.registry
        } else {
            let mut registry = batch.registry.clone();
            registry.ensure_language(&lc);
            extended = registry;
            &extended
        };
        let fields = FieldMerger {
            ctx,
            config,
            registry,
            taxonomy: &self.taxonomy,
            enrichment: &self.enrichment,
        };
        let images = ImageAssociator {
            ctx,
            config,
            service: &self.images,
            fetcher: &batch.fetcher,
            directory: &batch.directory,
        };

        let has_images = !images.sources(&code, &row).is_empty();
        if config.skip_products_without_info && !fields.row_has_info(&row, &lc) {
            debug!(%code, "skip product without info");
            batch.stats.mark(Category::ProductsSkipped, &code);
            return RowOutcome::Skipped(SkipReason::WithoutInfo);
        }
        if config.skip_products_without_images && !has_images {
            debug!(%code, "skip product without images");
            batch.stats.mark(Category::ProductsSkipped, &code);
            return RowOutcome::Skipped(SkipReason::WithoutImages);
        }

        let id = ProductId::new(&code, ctx.owner());
        let existing = match self.store.load(&id).await {
            Ok(existing) => existing,
            Err(error) => {
                error!(%error, %id, "Failed to load product");
                batch.stats.mark(Category::ProductsLoadFailed, &code);
                return RowOutcome::Failed(context.error(RowErrorDetail::Load(error.to_string())));
            }
        };
        let (mut product, created) = match existing {
            Some(product) => {
                batch.stats.mark(Category::ProductsAlreadyExisting, &code);
                (product, false)
            }
            None if config.skip_not_existing_products => {
                debug!(%code, "skip product that does not exist");
                batch.stats.mark(Category::ProductsSkipped, &code);
                return RowOutcome::Skipped(SkipReason::NotExisting);
            }
            None => {
                info!(%code, %lc, "create product");
                batch.stats.mark(Category::ProductsCreated, &code);
                (ProductEntity::new(id, lc.clone()), true)
            }
        };

        let mut merge = RowMerge::new();
        fields.merge(&row, &lc, &mut product, &mut merge);
        NutrientMerger { ctx }.merge(&row, &mut product, &mut merge);
        if product.code != code {
            return RowOutcome::Failed(context.error(RowErrorDetail::CodeMismatch {
                expected: code,
                got: product.code,
            }));
        }
        batch.stats.record_row(&code, &merge);
        batch.stats.mark(
            if has_images {
                Category::ProductsWithImages
            } else {
                Category::ProductsWithoutImages
            },
            &code,
        );

        let stored = if created {
            RowOutcome::Created
        } else {
            RowOutcome::Updated
        };
        let mut outcome = RowOutcome::Unchanged;
        let mut record = None;
        if merge.modified > 0 {
            debug!(%code, modified = merge.modified, fields = ?merge.modified_fields, "row modified product");
            if config.dry_run {
                outcome = stored;
            } else {
                self.enrichment.enrich(&mut product);
                let source = provenance(
                    config,
                    ctx,
                    merge.modified_fields.iter().cloned(),
                    std::iter::empty(),
                );
                if let Some(source) = source {
                    product.sources.push(source);
                    record = Some(product.sources.len() - 1);
                }
                if let Err(error) = self.store.store(&product, STORE_MESSAGE).await {
                    error!(%error, %code, "Failed to store product");
                    batch.stats.mark(Category::ProductsStoreFailed, &code);
                    return RowOutcome::Failed(
                        context.error(RowErrorDetail::Store(error.to_string())),
                    );
                }
                info!(%code, modified = merge.modified, "stored product");
                batch.stats.mark(Category::ProductsUpdated, &code);
                outcome = stored;
            }
        }

        let slots: IndexMap<String, PathBuf> = images.resolve(&code, &row).await;
        let associated = images.associate(&mut product, &slots).await;
        if !associated.new_image_ids.is_empty() {
            batch.stats.mark(Category::ProductsImagesAdded, &code);
        }
        if associated.changed && !config.dry_run {
            match record {
                Some(index) => product.sources[index]
                    .image_ids
                    .extend(&associated.new_image_ids),
                None if !associated.new_image_ids.is_empty() => {
                    let source = provenance(
                        config,
                        ctx,
                        std::iter::empty(),
                        associated.new_image_ids.iter().copied(),
                    );
                    if let Some(source) = source {
                        product.sources.push(source);
                    }
                }
                None => {}
            }
            if let Err(error) = self.store.store(&product, STORE_IMAGES_MESSAGE).await {
                error!(%error, %code, "Failed to store product images");
                batch.stats.mark(Category::ProductsStoreFailed, &code);
                return RowOutcome::Failed(context.error(RowErrorDetail::Store(error.to_string())));
            }
            if matches!(outcome, RowOutcome::Unchanged) {
                outcome = if created {
                    RowOutcome::Created
                } else {
                    RowOutcome::Updated
                };
            }
        }
        outcome
    }
}
