use std::{path::Path, sync::Mutex};

use maplit::btreemap;

use crate::{
    Category, ImportBatch, ImportConfig, MergeStatistics, ProductEntity, ProductId, RowOutcome,
    SkipReason,
    context::ImportContext,
    progress::{BatchPhase, NullReporter, ProgressReporter, RowStatus},
};

use super::{config, headers, memory_importer, row};

/// Keeps everything it is told, for assertions.
#[derive(Default)]
struct RecordingReporter {
    phases: Mutex<Vec<BatchPhase>>,
    rows: Mutex<Vec<(usize, RowStatus)>>,
    warnings: Mutex<Vec<String>>,
}

impl ProgressReporter for RecordingReporter {
    fn set_phase(&self, phase: BatchPhase) {
        self.phases.lock().unwrap().push(phase);
    }
    fn register_rows(&self, _count: usize) {}
    fn row_finished(&self, line: usize, _code: Option<&str>, status: RowStatus) {
        self.rows.lock().unwrap().push((line, status));
    }
    fn log_info(&self, _message: &str) {}
    fn log_warn(&self, message: &str) {
        self.warnings.lock().unwrap().push(message.to_owned());
    }
    fn finish(&self, _stats: &MergeStatistics) {}
}

/// Write a file large enough to pass the directory scan's size filter.
async fn write_image(path: &Path, fill: u8) {
    tokio::fs::write(path, vec![fill; 12_000]).await.unwrap();
}

#[tokio::test]
async fn associates_directory_images() {
    let images = tempfile::tempdir().unwrap();
    let rules = tempfile::tempdir().unwrap();
    write_image(&images.path().join("IMG-8000000000001-front.jpg"), 1).await;
    write_image(&images.path().join("8000000000001_ingredients_fr.jpg"), 2).await;
    tokio::fs::write(images.path().join("8000000000001_2.jpg"), b"thumbnail")
        .await
        .unwrap();
    let rules_file = rules.path().join("rules.tsv");
    tokio::fs::write(&rules_file, "# vendor names\n^IMG-(\\d+)-(\\w+)\t$1_$2\n")
        .await
        .unwrap();

    let importer = memory_importer();
    let ctx = ImportContext::new("importer");
    let config = ImportConfig {
        images_dir: Some(images.path().to_owned()),
        image_rules_file: Some(rules_file),
        ..config()
    };
    let rows = [row(
        1,
        btreemap! { "code" => "8000000000001", "lc" => "en", "product_name_en" => "Choco" },
    )];
    let stats = importer
        .run(&ctx, &config, &headers(&rows), rows.clone())
        .await
        .unwrap();
    assert!(stats.contains(Category::ProductsWithImages, "8000000000001"));
    assert!(stats.contains(Category::ProductsImagesAdded, "8000000000001"));

    let product = importer.store.get("8000000000001").await.unwrap();
    assert_eq!(product.images.uploaded.len(), 2);
    let mut selected = product.images.selected.keys().cloned().collect::<Vec<_>>();
    selected.sort();
    assert_eq!(selected, ["front_en", "ingredients_fr"]);
    assert_eq!(product.sources.len(), 1);
    assert_eq!(product.sources[0].modified_fields, ["product_name_en"]);
    assert_eq!(product.sources[0].image_ids.len(), 2);
    assert_eq!(
        importer.store.history().await,
        [
            ("8000000000001".to_owned(), "import".to_owned()),
            ("8000000000001".to_owned(), "import images".to_owned()),
        ]
    );

    // known images are neither uploaded again nor re-selected
    let stats = importer
        .run(&ctx, &config, &headers(&rows), rows)
        .await
        .unwrap();
    assert!(!stats.contains(Category::ProductsImagesAdded, "8000000000001"));
    assert_eq!(importer.store.history().await.len(), 2);
    assert_eq!(
        importer
            .images
            .upload_count(&ProductId::new("8000000000001", None))
            .await,
        2
    );
}

#[tokio::test]
async fn stores_image_only_rows_with_their_own_provenance() {
    let images = tempfile::tempdir().unwrap();
    write_image(&images.path().join("nutrition.jpg"), 3).await;

    let importer = memory_importer();
    let mut existing = ProductEntity::new(ProductId::new("8000000000001", None), "fr");
    existing
        .fields
        .insert("product_name_fr".into(), "Barre".into());
    importer.store.insert(existing).await;

    let ctx = ImportContext::new("importer");
    let config = ImportConfig {
        images_dir: Some(images.path().to_owned()),
        ..config()
    };
    let rows = [row(
        1,
        btreemap! {
            "code" => "8000000000001",
            "lc" => "fr",
            "image_nutrition_file" => "nutrition.jpg",
        },
    )];
    let mut batch = ImportBatch::prepare(&ctx, &config, &headers(&rows), &NullReporter)
        .await
        .unwrap();
    let [first] = rows;
    let outcome = importer.import_row(&mut batch, first).await;
    assert!(matches!(outcome, RowOutcome::Updated), "{outcome:?}");

    let stats = batch.finish();
    assert!(stats.contains(Category::ProductsDataNotUpdated, "8000000000001"));
    assert!(stats.contains(Category::ProductsImagesAdded, "8000000000001"));
    let product = importer.store.get("8000000000001").await.unwrap();
    assert_eq!(product.images.selected.get("nutrition_fr"), Some(&1));
    assert_eq!(product.sources.len(), 1);
    assert!(product.sources[0].modified_fields.is_empty());
    assert_eq!(product.sources[0].image_ids, [1]);
    assert_eq!(
        importer.store.history().await,
        [("8000000000001".to_owned(), "import images".to_owned())]
    );
}

#[tokio::test]
async fn unreachable_urls_only_warn() {
    let importer = memory_importer();
    let ctx = ImportContext::new("importer");
    let config = config();
    let rows = [row(
        1,
        btreemap! {
            "code" => "8000000000001",
            "lc" => "en",
            "product_name_en" => "Choco",
            "image_front_url" => "https://images.example/8000000000001.jpg",
        },
    )];
    let reporter = RecordingReporter::default();
    let stats = importer
        .run_with_reporter(&ctx, &config, &headers(&rows), rows, &reporter)
        .await
        .unwrap();
    assert!(stats.contains(Category::ProductsUpdated, "8000000000001"));
    assert!(!stats.contains(Category::ProductsImagesAdded, "8000000000001"));

    let warnings = reporter.warnings.lock().unwrap().clone();
    assert_eq!(warnings.len(), 1);
    assert!(warnings[0].starts_with("line 1: no download directory"), "{warnings:?}");
    assert_eq!(
        reporter.rows.lock().unwrap().as_slice(),
        [(1, RowStatus::Created)]
    );
    let product = importer.store.get("8000000000001").await.unwrap();
    assert!(product.images.selected.is_empty());
}

#[tokio::test]
async fn missing_images_dir_aborts_the_batch() {
    let missing = tempfile::tempdir().unwrap().path().join("gone");
    let importer = memory_importer();
    let ctx = ImportContext::new("importer");
    let config = ImportConfig {
        images_dir: Some(missing),
        ..config()
    };
    let rows = [row(1, btreemap! { "code" => "8000000000001", "lc" => "en" })];
    let reporter = RecordingReporter::default();
    let error = importer
        .run_with_reporter(&ctx, &config, &headers(&rows), rows, &reporter)
        .await
        .unwrap_err();
    assert!(matches!(error, crate::Error::ImagesDir { .. }), "{error}");
    assert!(matches!(
        reporter.phases.lock().unwrap().last(),
        Some(BatchPhase::Failed(_))
    ));
    assert!(reporter.rows.lock().unwrap().is_empty());
}

#[tokio::test]
async fn skips_rows_without_images() {
    let images = tempfile::tempdir().unwrap();
    write_image(&images.path().join("8000000000002_front_en.jpg"), 4).await;

    let importer = memory_importer();
    let ctx = ImportContext::new("importer");
    let config = ImportConfig {
        images_dir: Some(images.path().to_owned()),
        skip_products_without_images: true,
        ..config()
    };
    let rows = [
        row(1, btreemap! { "code" => "8000000000001", "lc" => "en", "quantity" => "1 kg" }),
        row(2, btreemap! { "code" => "8000000000002", "lc" => "en", "quantity" => "1 kg" }),
    ];
    let mut batch = ImportBatch::prepare(&ctx, &config, &headers(&rows), &NullReporter)
        .await
        .unwrap();
    let [first, second] = rows;
    assert!(matches!(
        importer.import_row(&mut batch, first).await,
        RowOutcome::Skipped(SkipReason::WithoutImages)
    ));
    assert!(matches!(
        importer.import_row(&mut batch, second).await,
        RowOutcome::Created
    ));
    let stats = batch.finish();
    assert!(stats.contains(Category::ProductsSkipped, "8000000000001"));
    assert_eq!(
        importer
            .store
            .get("8000000000002")
            .await
            .unwrap()
            .images
            .selected
            .get("front_en"),
        Some(&1)
    );
}

#[tokio::test]
async fn dry_run_uploads_nothing() {
    let images = tempfile::tempdir().unwrap();
    write_image(&images.path().join("8000000000001.jpg"), 5).await;

    let importer = memory_importer();
    let ctx = ImportContext::new("importer");
    let config = ImportConfig {
        images_dir: Some(images.path().to_owned()),
        dry_run: true,
        ..config()
    };
    let rows = [row(
        1,
        btreemap! { "code" => "8000000000001", "lc" => "en", "product_name_en" => "Choco" },
    )];
    let stats = importer
        .run(&ctx, &config, &headers(&rows), rows)
        .await
        .unwrap();
    assert!(stats.contains(Category::ProductsWithImages, "8000000000001"));
    assert!(importer.store.history().await.is_empty());
    let id = ProductId::new("8000000000001", None);
    assert_eq!(importer.images.upload_count(&id).await, 0);
    assert_eq!(importer.images.selected(&id, "front_en").await, None);
}

#[tokio::test]
async fn file_column_backs_up_an_unreachable_url() {
    let images = tempfile::tempdir().unwrap();
    write_image(&images.path().join("front.jpg"), 6).await;

    let importer = memory_importer();
    let ctx = ImportContext::new("importer");
    let config = ImportConfig {
        images_dir: Some(images.path().to_owned()),
        ..config()
    };
    let rows = [row(
        1,
        btreemap! {
            "code" => "8000000000001",
            "lc" => "en",
            "image_front_file" => "front.jpg",
            "image_front_url" => "https://images.example/8000000000001.jpg",
        },
    )];
    let reporter = RecordingReporter::default();
    let stats = importer
        .run_with_reporter(&ctx, &config, &headers(&rows), rows, &reporter)
        .await
        .unwrap();
    assert!(stats.contains(Category::ProductsImagesAdded, "8000000000001"));
    assert_eq!(reporter.warnings.lock().unwrap().len(), 1);
    let product = importer.store.get("8000000000001").await.unwrap();
    assert_eq!(product.images.selected.get("front_en"), Some(&1));
}
