use maplit::btreemap;

use crate::{
    Category, ImportBatch, ImportConfig, Importer, ProductEntity, ProductId, RowOutcome,
    SkipReason,
    backend::{
        ProductStore as _,
        memory::{FoldingTaxonomy, MemoryImageService, MemoryStore},
    },
    context::ImportContext,
    progress::NullReporter,
};

use super::{config, headers, memory_importer, row};

#[tokio::test]
async fn creates_then_leaves_unchanged() {
    let importer = memory_importer();
    let ctx = ImportContext::new("importer");
    let config = config();
    let first = [row(
        1,
        btreemap! {
            "code" => "8000000000001",
            "lc" => "en",
            "product_name_en" => "Choco Bar",
            "quantity" => "100g",
        },
    )];
    let stats = importer
        .run(&ctx, &config, &headers(&first), first.clone())
        .await
        .unwrap();
    for category in [
        Category::ProductsCreated,
        Category::ProductsInfoAdded,
        Category::ProductsDataUpdated,
        Category::ProductsUpdated,
    ] {
        assert!(stats.contains(category, "8000000000001"), "{category}");
    }
    let product = importer.store.get("8000000000001").await.unwrap();
    assert_eq!(product.field("quantity"), Some("100 g"));
    assert_eq!(product.sources.len(), 1);
    assert_eq!(
        product.sources[0].modified_fields,
        ["quantity", "product_name_en"]
    );

    let second = [row(
        1,
        btreemap! {
            "code" => "8000000000001",
            "lc" => "en",
            "product_name_en" => "Choco Bar",
            "quantity" => "100 g",
        },
    )];
    let stats = importer
        .run(&ctx, &config, &headers(&second), second)
        .await
        .unwrap();
    assert!(stats.contains(Category::ProductsDataNotUpdated, "8000000000001"));
    assert!(stats.contains(Category::ProductsInfoNotUpdated, "8000000000001"));
    assert!(!stats.contains(Category::ProductsDataUpdated, "8000000000001"));
    assert_eq!(importer.store.history().await.len(), 1);
}

#[tokio::test]
async fn unions_categories_across_rows() {
    let importer = memory_importer();
    let ctx = ImportContext::new("importer");
    let config = config();
    let rows = [
        row(
            1,
            btreemap! { "code" => "8000000000001", "lc" => "en", "categories" => "Beverages" },
        ),
        row(
            2,
            btreemap! { "code" => "8000000000001", "lc" => "en", "categories" => "Beverages,Sodas" },
        ),
        row(
            3,
            btreemap! { "code" => "8000000000001", "lc" => "en", "categories" => "Soft drinks" },
        ),
    ];
    let stats = importer
        .run(&ctx, &config, &headers(&rows), rows)
        .await
        .unwrap();
    let product = importer.store.get("8000000000001").await.unwrap();
    assert_eq!(product.field("categories"), Some("Beverages, Sodas"));
    assert_eq!(product.tag_ids("categories"), ["en:beverages", "en:sodas"]);
    assert!(stats.contains(Category::ProductsInfoChanged, "8000000000001"));
    // one store for the creation, one for the added tag
    assert_eq!(importer.store.history().await.len(), 2);
}

#[tokio::test]
async fn salt_wins_over_sodium() {
    let importer = memory_importer();
    let ctx = ImportContext::new("importer");
    let rows = [row(
        1,
        btreemap! {
            "code" => "8000000000001",
            "lc" => "en",
            "salt_value" => "1.5",
            "sodium_value" => "0.6",
        },
    )];
    let stats = importer
        .run(&ctx, &config(), &headers(&rows), rows)
        .await
        .unwrap();
    let product = importer.store.get("8000000000001").await.unwrap();
    assert_eq!(
        product.nutrient("salt").unwrap().value.as_deref(),
        Some("1.5")
    );
    assert!(product.nutrient("sodium").is_none());
    assert!(stats.contains(Category::ProductsNutritionAdded, "8000000000001"));
    assert!(stats.contains(Category::ProductsNutritionUpdated, "8000000000001"));
    assert!(stats.contains(Category::ProductsInfoNotUpdated, "8000000000001"));
}

#[tokio::test]
async fn data_updated_tracks_modifications() {
    let importer = memory_importer();
    let ctx = ImportContext::new("importer");
    let config = config();
    let rows = [
        row(1, btreemap! { "code" => "11111111", "lc" => "en", "brands" => "Acme" }),
        row(2, btreemap! { "code" => "11111111", "lc" => "en", "brands" => "ACME" }),
        row(3, btreemap! { "code" => "22222222", "lc" => "en", "fat_value" => "3" }),
        row(4, btreemap! { "code" => "33333333", "lc" => "en" }),
    ];
    let mut batch = ImportBatch::prepare(&ctx, &config, &headers(&rows), &NullReporter)
        .await
        .unwrap();
    let mut outcomes = Vec::new();
    for row in rows {
        outcomes.push(importer.import_row(&mut batch, row).await);
    }
    assert!(matches!(outcomes[0], RowOutcome::Created));
    assert!(matches!(outcomes[1], RowOutcome::Unchanged));
    assert!(matches!(outcomes[2], RowOutcome::Created));
    assert!(matches!(outcomes[3], RowOutcome::Unchanged));

    let stats = batch.finish();
    let history = importer.store.history().await;
    for code in ["11111111", "22222222", "33333333"] {
        let stored = history.iter().any(|(id, _)| id == code);
        assert_eq!(stats.contains(Category::ProductsDataUpdated, code), stored, "{code}");
        assert_ne!(
            stats.contains(Category::ProductsDataUpdated, code),
            stats.contains(Category::ProductsDataNotUpdated, code),
            "{code}"
        );
    }
    // recasing a known brand is not a modification
    assert_eq!(
        importer.store.get("11111111").await.unwrap().field("brands"),
        Some("Acme")
    );
    assert!(stats.contains(Category::ProductsCreated, "33333333"));
    assert!(importer.store.get("33333333").await.is_none());
}

#[tokio::test]
async fn rejects_bad_codes_and_languages() {
    let importer = memory_importer();
    let ctx = ImportContext::new("importer");
    let config = config();
    let rows = [
        row(1, btreemap! { "code" => "", "lc" => "en" }),
        row(2, btreemap! { "code" => "12-34", "lc" => "en" }),
        row(3, btreemap! { "code" => "8000000000001", "lc" => "" }),
        row(4, btreemap! { "code" => "8000000000002", "lc" => "EN", "quantity" => "1 l" }),
    ];
    let mut batch = ImportBatch::prepare(&ctx, &config, &headers(&rows), &NullReporter)
        .await
        .unwrap();
    let mut outcomes = Vec::new();
    for row in rows {
        outcomes.push(importer.import_row(&mut batch, row).await);
    }
    let details = outcomes
        .iter()
        .map(|outcome| match outcome {
            RowOutcome::Failed(error) => error.to_string(),
            _ => "ok".to_string(),
        })
        .collect::<Vec<_>>();
    assert_eq!(
        details,
        [
            "line 1: Empty code",
            r#"line 2: Invalid code: "12-34""#,
            r#"line 3 (8000000000001): Missing or invalid language code: """#,
            "ok",
        ]
    );
    let stats = batch.finish();
    assert!(stats.contains(Category::ProductsInvalidCode, "12-34"));
    assert!(stats.contains(Category::ProductsInvalidLc, "8000000000001"));
    assert_eq!(
        importer
            .store
            .get("8000000000002")
            .await
            .unwrap()
            .lc
            .as_deref(),
        Some("en")
    );
}

#[tokio::test]
async fn honours_skip_filters() {
    let importer = memory_importer();
    importer
        .store
        .insert(ProductEntity::new(ProductId::new("11111111", None), "en"))
        .await;
    let ctx = ImportContext::new("importer");
    let filtered = ImportConfig {
        skip_not_existing_products: true,
        skip_products_without_info: true,
        ..config()
    };
    let rows = [
        row(1, btreemap! { "code" => "11111111", "lc" => "en", "quantity" => "1 kg" }),
        row(2, btreemap! { "code" => "22222222", "lc" => "en", "quantity" => "1 kg" }),
        row(3, btreemap! { "code" => "11111111", "lc" => "en", "fat_value" => "1" }),
    ];
    let mut batch = ImportBatch::prepare(&ctx, &filtered, &headers(&rows), &NullReporter)
        .await
        .unwrap();
    let mut outcomes = Vec::new();
    for row in rows {
        outcomes.push(importer.import_row(&mut batch, row).await);
    }
    assert!(matches!(outcomes[0], RowOutcome::Updated));
    assert!(matches!(
        outcomes[1],
        RowOutcome::Skipped(SkipReason::NotExisting)
    ));
    assert!(matches!(
        outcomes[2],
        RowOutcome::Skipped(SkipReason::WithoutInfo)
    ));
    let stats = batch.finish();
    assert!(stats.contains(Category::ProductsSkipped, "22222222"));
    assert!(importer.store.get("22222222").await.is_none());

    let only = ImportConfig {
        skip_if_not_code: Some("22222222".into()),
        ..config()
    };
    let rows = [row(1, btreemap! { "code" => "11111111", "lc" => "en", "quantity" => "2 kg" })];
    let stats = importer
        .run(&ctx, &only, &headers(&rows), rows)
        .await
        .unwrap();
    assert_eq!(stats, Default::default());
    assert_eq!(
        importer.store.get("11111111").await.unwrap().field("quantity"),
        Some("1 kg")
    );
}

#[tokio::test]
async fn dry_run_stores_nothing() {
    let importer = memory_importer();
    let ctx = ImportContext::new("importer");
    let config = ImportConfig {
        dry_run: true,
        ..config()
    };
    let rows = [row(1, btreemap! { "code" => "11111111", "lc" => "en", "quantity" => "1 kg" })];
    let stats = importer
        .run(&ctx, &config, &headers(&rows), rows)
        .await
        .unwrap();
    assert!(stats.contains(Category::ProductsDataUpdated, "11111111"));
    assert!(!stats.contains(Category::ProductsUpdated, "11111111"));
    assert!(importer.store.history().await.is_empty());
}

#[tokio::test]
async fn store_failures_stay_in_their_row() {
    let importer = Importer::new(
        MemoryStore::rejecting(["11111111"]),
        FoldingTaxonomy::new(),
        MemoryImageService::new(),
    );
    let ctx = ImportContext::new("importer");
    let rows = [
        row(1, btreemap! { "code" => "11111111", "lc" => "en", "quantity" => "1 kg" }),
        row(2, btreemap! { "code" => "22222222", "lc" => "en", "quantity" => "1 kg" }),
    ];
    let stats = importer
        .run(&ctx, &config(), &headers(&rows), rows)
        .await
        .unwrap();
    assert!(stats.contains(Category::ProductsStoreFailed, "11111111"));
    assert!(stats.contains(Category::ProductsUpdated, "22222222"));
    assert!(
        importer
            .store
            .load(&ProductId::new("22222222", None))
            .await
            .unwrap()
            .is_some()
    );
}

#[tokio::test]
async fn organizations_own_their_products() {
    let importer = memory_importer();
    let ctx = ImportContext::new("importer").with_org("acme");
    let config = ImportConfig {
        no_source: true,
        source: None,
        ..Default::default()
    };
    let rows = [row(1, btreemap! { "code" => "11111111", "lc" => "en", "quantity" => "1 kg" })];
    importer
        .run(&ctx, &config, &headers(&rows), rows)
        .await
        .unwrap();
    let product = importer.store.get("org-acme/11111111").await.unwrap();
    assert_eq!(product.owner_fields.get("quantity"), Some(&ctx.now));
    assert!(product.sources.is_empty());
}

#[tokio::test]
async fn missing_attribution_is_fatal() {
    let importer = memory_importer();
    let ctx = ImportContext::new("importer");
    let error = importer
        .run(&ctx, &ImportConfig::default(), &[], Vec::new())
        .await
        .unwrap_err();
    assert!(matches!(error, crate::Error::Config(_)), "{error}");
}

#[tokio::test]
async fn interprets_tags_in_the_configured_language() {
    let importer = memory_importer();
    let ctx = ImportContext::new("importer");
    let first = [row(
        1,
        btreemap! { "code" => "8000000000001", "lc" => "en", "categories" => "Beverages" },
    )];
    importer
        .run(&ctx, &config(), &headers(&first), first)
        .await
        .unwrap();

    let french = ImportConfig {
        tags_lc: Some("fr".into()),
        ..config()
    };
    let second = [row(
        1,
        btreemap! {
            "code" => "8000000000001",
            "lc" => "en",
            "categories" => "Boissons",
            "labels" => "Bio",
        },
    )];
    let stats = importer
        .run(&ctx, &french, &headers(&second), second.clone())
        .await
        .unwrap();
    assert!(stats.contains(Category::ProductsInfoChanged, "8000000000001"));
    let product = importer.store.get("8000000000001").await.unwrap();
    assert_eq!(product.field("categories"), Some("Beverages, Boissons"));
    assert_eq!(product.tag_ids("categories"), ["en:beverages", "fr:boissons"]);
    assert_eq!(product.field("labels"), Some("Bio"));
    assert_eq!(product.tag_ids("labels"), ["fr:bio"]);

    // the same row again adds nothing under the same language
    let stats = importer
        .run(&ctx, &french, &headers(&second), second)
        .await
        .unwrap();
    assert!(stats.contains(Category::ProductsDataNotUpdated, "8000000000001"));
    let product = importer.store.get("8000000000001").await.unwrap();
    assert_eq!(product.tag_ids("categories"), ["en:beverages", "fr:boissons"]);
}
