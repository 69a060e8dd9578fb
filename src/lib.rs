use std::path::PathBuf;

pub mod backend;
pub mod config;
pub mod context;
pub mod images;
pub mod import;
pub mod merge;
pub mod normalize;
pub mod product;
pub mod progress;
pub mod row;
pub mod schema;
pub mod stats;
pub mod warning;

#[cfg(test)]
mod tests;

pub use config::ImportConfig;
pub use context::ImportContext;
pub use import::{ImportBatch, Importer, RowOutcome, SkipReason};
pub use product::{ProductEntity, ProductId};
pub use row::ImportRow;
pub use stats::{Category, MergeStatistics};

/// Setup failures. Any of these aborts the batch before a row is read.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Failed to open images directory {path:?}: {error}")]
    ImagesDir {
        path: PathBuf,
        error: std::io::Error,
    },
    #[error("Failed to read image rules {path:?}: {error}")]
    ReadRules {
        path: PathBuf,
        error: std::io::Error,
    },
    #[error("Malformed image rule {path:?}:{line}: {text:?}")]
    MalformedRule {
        path: PathBuf,
        line: usize,
        text: String,
    },
    #[error("Invalid image rule pattern {pattern:?}: {error}")]
    RulePattern {
        pattern: String,
        error: regex::Error,
    },
    #[error("Invalid configuration: {0}")]
    Config(String),
    #[error("Failed to read configuration {path:?}: {error}")]
    ReadConfig {
        path: PathBuf,
        error: std::io::Error,
    },
    #[error("Failed to parse YAML configuration: {0}")]
    ParseYaml(serde_yaml::Error),
    #[error("Failed to parse TOML configuration: {0}")]
    ParseToml(toml::de::Error),
    #[error("Failed to read input: {0}")]
    Input(csv::Error),
}

/// A failure confined to one input row.
#[derive(Debug, thiserror::Error)]
#[error("{context}: {detail}")]
pub struct RowError {
    pub context: Box<RowContext>,
    pub detail: Box<RowErrorDetail>,
}

#[derive(Debug, Clone)]
pub struct RowContext {
    pub line: usize,
    pub code: Option<String>,
}

impl RowContext {
    fn new(line: usize) -> Self {
        Self { line, code: None }
    }

    fn with_code(&self, code: impl Into<String>) -> Self {
        Self {
            line: self.line,
            code: Some(code.into()),
        }
    }

    fn error(&self, detail: RowErrorDetail) -> RowError {
        RowError {
            context: Box::new(self.clone()),
            detail: Box::new(detail),
        }
    }
}

impl std::fmt::Display for RowContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.code {
            Some(code) => write!(f, "line {} ({code})", self.line),
            None => write!(f, "line {}", self.line),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RowErrorDetail {
    #[error("Empty code")]
    EmptyCode,
    #[error("Invalid code: {0:?}")]
    InvalidCode(String),
    #[error("Missing or invalid language code: {0:?}")]
    InvalidLanguage(String),
    #[error("Code mismatch after merge: expected {expected}, got {got}")]
    CodeMismatch { expected: String, got: String },
    #[error("Failed to load product: {0}")]
    Load(String),
    #[error("Failed to store product: {0}")]
    Store(String),
}
