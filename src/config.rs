use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use serde::Deserialize;

use crate::Error;

/// Who the imported data is attributed to.
#[derive(Deserialize, Clone, Debug, Default)]
pub struct SourceAttribution {
    pub id: String,
    pub name: String,
    pub url: String,
    #[serde(default)]
    pub licence: Option<String>,
    #[serde(default)]
    pub licence_url: Option<String>,
    /// The source is the manufacturer of the products it describes.
    #[serde(default)]
    pub manufacturer: bool,
}

fn default_fetch_timeout() -> u64 {
    10
}

#[derive(Deserialize, Clone, Debug)]
pub struct ImportConfig {
    #[serde(default)]
    pub source: Option<SourceAttribution>,
    /// Suppress provenance records for the whole run.
    #[serde(default)]
    pub no_source: bool,
    /// Values used for blank (or missing) cells, keyed by column name.
    #[serde(default)]
    pub default_values: IndexMap<String, String>,
    /// Extra scalar product fields merged after the core ones.
    #[serde(default)]
    pub extra_fields: Vec<String>,
    #[serde(default)]
    pub images_dir: Option<PathBuf>,
    #[serde(default)]
    pub image_rules_file: Option<PathBuf>,
    #[serde(default)]
    pub images_download_dir: Option<PathBuf>,
    #[serde(default = "default_fetch_timeout")]
    pub image_fetch_timeout_secs: u64,
    #[serde(default)]
    pub dry_run: bool,
    #[serde(default)]
    pub skip_if_not_code: Option<String>,
    #[serde(default)]
    pub skip_not_existing_products: bool,
    #[serde(default)]
    pub skip_products_without_info: bool,
    #[serde(default)]
    pub skip_products_without_images: bool,
    #[serde(default)]
    pub skip_existing_values: bool,
    #[serde(default)]
    pub only_select_not_existing_images: bool,
    /// Language used to interpret tags instead of each product's own.
    #[serde(default)]
    pub tags_lc: Option<String>,
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            source: None,
            no_source: false,
            default_values: IndexMap::new(),
            extra_fields: Vec::new(),
            images_dir: None,
            image_rules_file: None,
            images_download_dir: None,
            image_fetch_timeout_secs: default_fetch_timeout(),
            dry_run: false,
            skip_if_not_code: None,
            skip_not_existing_products: false,
            skip_products_without_info: false,
            skip_products_without_images: false,
            skip_existing_values: false,
            only_select_not_existing_images: false,
            tags_lc: None,
        }
    }
}

impl ImportConfig {
    /// Load a configuration file, YAML unless the extension says TOML.
    pub async fn load<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let path = path.as_ref();
        let src = tokio::fs::read_to_string(path)
            .await
            .map_err(|error| Error::ReadConfig {
                path: path.to_owned(),
                error,
            })?;
        let config: Self = match path.extension().and_then(|ext| ext.to_str()) {
            Some("toml") => toml::de::from_str(&src).map_err(Error::ParseToml)?,
            _ => serde_yaml::from_str(&src).map_err(Error::ParseYaml)?,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), Error> {
        match &self.source {
            None if !self.no_source => Err(Error::Config(
                "source attribution is required unless no_source is set".into(),
            )),
            Some(source) if !self.no_source && source.id.trim().is_empty() => {
                Err(Error::Config("source id must not be empty".into()))
            }
            _ => Ok(()),
        }?;
        if let Some(lc) = &self.tags_lc
            && !crate::row::is_language_code(lc)
        {
            return Err(Error::Config(format!("invalid tags_lc: {lc:?}")));
        }
        if self.image_rules_file.is_some() && self.images_dir.is_none() {
            return Err(Error::Config("image_rules_file requires images_dir".into()));
        }
        Ok(())
    }

    pub fn fetch_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.image_fetch_timeout_secs)
    }
}
