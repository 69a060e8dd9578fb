//! Directory image discovery
//!
//! Files are matched to `(code, slot)` pairs by name. Rewrite rules read from
//! a tab-separated rule file turn arbitrary vendor naming schemes into the
//! `<code>_<slot>_<lc>.jpg` shape before matching.

use std::{
    path::{Path, PathBuf},
    sync::LazyLock,
};

use indexmap::IndexMap;
use itertools::Itertools as _;
use tracing::{debug, info};

use crate::{Error, product::normalize_code};

/// Smaller files are thumbnails or placeholders.
pub const MIN_IMAGE_SIZE: u64 = 10_000;

static IMAGE_NAME: LazyLock<regex::Regex> = LazyLock::new(|| {
    regex::Regex::new(
        r"(?i)^(\d{8,})(?:[_\-. ]?(front|ingredients|nutrition|packaging|other(?:_\d+)?|\d+))?(?:[_\-. ]([a-z]{2}))?(?:[_\-. ][a-z0-9]+)*\.(?:jpe?g|png)$",
    )
    .unwrap()
});

static TEMPLATE_TOKEN: LazyLock<regex::Regex> =
    LazyLock::new(|| regex::Regex::new(r"\$\$|\$\{(\d+)\}|\$(\d+)|\\(\d)").unwrap());

#[derive(Debug, Clone, PartialEq, Eq)]
enum Part {
    Literal(String),
    Group(usize),
}

/// Replacement text with capture-group references.
///
/// `$1`, `${1}` and `\1` interpolate a group, `$$` is a literal dollar.
/// Nothing else is interpreted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    parts: Vec<Part>,
}

impl Template {
    pub fn parse(text: &str) -> Self {
        let mut parts = Vec::new();
        let mut last = 0;
        for caps in TEMPLATE_TOKEN.captures_iter(text) {
            let Some(token) = caps.get(0) else {
                continue;
            };
            if token.start() > last {
                parts.push(Part::Literal(text[last..token.start()].to_owned()));
            }
            let group = caps
                .get(1)
                .or_else(|| caps.get(2))
                .or_else(|| caps.get(3))
                .and_then(|group| group.as_str().parse().ok());
            parts.push(match group {
                Some(group) => Part::Group(group),
                None => Part::Literal("$".to_owned()),
            });
            last = token.end();
        }
        if last < text.len() {
            parts.push(Part::Literal(text[last..].to_owned()));
        }
        Self { parts }
    }

    /// Expand against a match. Unmatched or missing groups expand to nothing.
    pub fn expand(&self, caps: &regex::Captures) -> String {
        self.parts
            .iter()
            .map(|part| match part {
                Part::Literal(text) => text.as_str(),
                Part::Group(group) => caps.get(*group).map_or("", |m| m.as_str()),
            })
            .collect()
    }
}

#[derive(Debug, Clone)]
pub struct RewriteRule {
    find: regex::Regex,
    replace: Template,
}

impl RewriteRule {
    pub fn new(find: &str, replace: &str) -> Result<Self, Error> {
        let find = regex::Regex::new(find).map_err(|error| Error::RulePattern {
            pattern: find.to_owned(),
            error,
        })?;
        Ok(Self {
            find,
            replace: Template::parse(replace),
        })
    }

    /// Rewrite the first match in `name`.
    pub fn apply(&self, name: &str) -> String {
        self.find
            .replace(name, |caps: &regex::Captures| self.replace.expand(caps))
            .into_owned()
    }
}

/// Parse a rule file. Blank lines and `#` comments are ignored, every other
/// line must be `find<TAB>replace`.
pub fn parse_rules(path: &Path, text: &str) -> Result<Vec<RewriteRule>, Error> {
    text.lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty() && !line.starts_with('#'))
        .map(|(index, line)| {
            let malformed = || Error::MalformedRule {
                path: path.to_owned(),
                line: index + 1,
                text: line.to_owned(),
            };
            let (find, replace) = line.split_once('\t').ok_or_else(malformed)?;
            if find.is_empty() || replace.contains('\t') {
                return Err(malformed());
            }
            RewriteRule::new(find, replace)
        })
        .collect()
}

pub async fn load_rules(path: &Path) -> Result<Vec<RewriteRule>, Error> {
    let text = tokio::fs::read_to_string(path)
        .await
        .map_err(|error| Error::ReadRules {
            path: path.to_owned(),
            error,
        })?;
    parse_rules(path, &text)
}

/// Derive `(code, slot)` from a file name, after rewriting.
pub fn match_file_name(rules: &[RewriteRule], name: &str) -> Option<(String, String)> {
    let rewritten = rules
        .iter()
        .fold(name.to_owned(), |name, rule| rule.apply(&name));
    let caps = IMAGE_NAME.captures(&rewritten)?;
    let code = normalize_code(&caps[1]);
    let slot = match caps.get(2).map(|m| m.as_str().to_lowercase()) {
        None => "front".to_owned(),
        Some(slot) if slot.chars().all(|c| c.is_ascii_digit()) => format!("other_{slot}"),
        Some(slot) => slot,
    };
    let slot = match caps.get(3) {
        Some(lc) => format!("{slot}_{}", lc.as_str().to_lowercase()),
        None => slot,
    };
    Some((code, slot))
}

/// Images found in a directory, per code and slot.
#[derive(Debug, Clone, Default)]
pub struct DirectoryImages {
    by_code: IndexMap<String, IndexMap<String, PathBuf>>,
}

impl DirectoryImages {
    pub fn get(&self, code: &str) -> Option<&IndexMap<String, PathBuf>> {
        self.by_code.get(code)
    }

    pub fn contains(&self, code: &str) -> bool {
        self.by_code.get(code).is_some_and(|slots| !slots.is_empty())
    }

    pub fn len(&self) -> usize {
        self.by_code.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_code.is_empty()
    }

    /// Scan a directory in file name order. The first file wins per `(code, slot)`.
    pub async fn scan(dir: &Path, rules: &[RewriteRule]) -> Result<Self, Error> {
        let dir_error = |error| Error::ImagesDir {
            path: dir.to_owned(),
            error,
        };
        let mut entries = tokio::fs::read_dir(dir).await.map_err(dir_error)?;
        let mut files = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(dir_error)? {
            let Ok(metadata) = entry.metadata().await else {
                continue;
            };
            if metadata.is_file() {
                files.push((entry.file_name(), metadata.len(), entry.path()));
            }
        }

        let mut images = Self::default();
        for (name, size, path) in files.into_iter().sorted_by(|a, b| a.0.cmp(&b.0)) {
            let name = name.to_string_lossy();
            if size < MIN_IMAGE_SIZE {
                debug!(file = %name, size, "skip small image");
                continue;
            }
            let Some((code, slot)) = match_file_name(rules, &name) else {
                debug!(file = %name, "no code in image name");
                continue;
            };
            let slots = images.by_code.entry(code.clone()).or_default();
            if slots.contains_key(&slot) {
                debug!(file = %name, %code, %slot, "slot already taken");
                continue;
            }
            debug!(file = %name, %code, %slot, "found image");
            slots.insert(slot, path);
        }
        info!(dir = %dir.display(), products = images.len(), "scanned images directory");
        Ok(images)
    }
}
