use std::collections::BTreeMap;

use crate::{
    ImportConfig, ImportRow, Importer,
    backend::memory::{FoldingTaxonomy, MemoryImageService, MemoryStore},
    config::SourceAttribution,
    row,
};

mod images;
mod reimport;

type MemoryImporter = Importer<MemoryStore, FoldingTaxonomy, MemoryImageService>;

fn memory_importer() -> MemoryImporter {
    Importer::new(
        MemoryStore::new(),
        FoldingTaxonomy::new().with_synonym("Soft drinks", "en:sodas"),
        MemoryImageService::new(),
    )
}

fn config() -> ImportConfig {
    ImportConfig {
        source: Some(SourceAttribution {
            id: "acme-feed".into(),
            name: "Acme feed".into(),
            url: "https://acme.example/feed".into(),
            licence: Some("ODbL".into()),
            licence_url: None,
            manufacturer: true,
        }),
        ..Default::default()
    }
}

fn row(line: usize, cells: BTreeMap<&str, &str>) -> ImportRow {
    ImportRow::new(line, cells)
}

/// Header row covering every column of `rows`, in first-seen order.
fn headers(rows: &[ImportRow]) -> Vec<String> {
    let mut headers = Vec::<String>::new();
    for row in rows {
        for (column, _) in row.columns() {
            if !headers.iter().any(|header| header == column) {
                headers.push(column.to_owned());
            }
        }
    }
    headers
}

async fn load_fixture(dir: &str) -> Result<(ImportConfig, Vec<String>, Vec<ImportRow>), crate::Error> {
    let config = ImportConfig::load(format!("{dir}/config.yaml")).await?;
    let file = std::fs::File::open(format!("{dir}/products.tsv")).map_err(|error| {
        crate::Error::ReadConfig {
            path: format!("{dir}/products.tsv").into(),
            error,
        }
    })?;
    let (headers, rows) = row::read_rows(file)?;
    Ok((config, headers, rows))
}
