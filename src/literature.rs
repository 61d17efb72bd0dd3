use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

pub const CDE_REGISTRY_LABEL: &str = "CDE同类品种-临床备案公示平台试验信息";
pub const FOREIGN_TRIAL_LABEL: &str = "国外试验文献调研";
pub const GUIDELINES_LABEL: &str = "法规_指导原则_用药指南";
pub const PACKAGE_INSERT_LABEL: &str = "说明书";

/// Literature categories that have an extraction schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Section {
    /// Domestic registry disclosures (CDE clinical trial platform).
    CdeRegistry,
    /// Foreign trial publications.
    ForeignTrial,
}

impl Section {
    pub const ALL: [Section; 2] = [Section::CdeRegistry, Section::ForeignTrial];

    pub fn label(self) -> &'static str {
        match self {
            Section::CdeRegistry => CDE_REGISTRY_LABEL,
            Section::ForeignTrial => FOREIGN_TRIAL_LABEL,
        }
    }

    /// Strict lookup: only the two extractable labels match.
    pub fn from_label(label: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.label() == label)
    }

    /// Lenient lookup used when picking a schema: anything that is not the
    /// foreign-trial label gets the registry schema.
    pub fn for_category(label: &str) -> Self {
        if label == FOREIGN_TRIAL_LABEL {
            Section::ForeignTrial
        } else {
            Section::CdeRegistry
        }
    }
}

impl std::fmt::Display for Section {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Every section shown by the folder overview, in display order.
pub fn default_listing_sections() -> Vec<String> {
    [
        CDE_REGISTRY_LABEL,
        FOREIGN_TRIAL_LABEL,
        GUIDELINES_LABEL,
        PACKAGE_INSERT_LABEL,
    ]
    .into_iter()
    .map(str::to_owned)
    .collect()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiteratureItem {
    pub section: Section,
    pub name: String,
}

impl LiteratureItem {
    pub fn folder(&self, base_path: &Path) -> PathBuf {
        base_path.join(self.section.label()).join(&self.name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SelectorError {
    #[error("selector is missing the '/' separator: {0}")]
    Malformed(String),

    #[error("unsupported section: {0}")]
    UnsupportedSection(String),
}

/// Parse a `section/literature_name` selector. The split happens at the
/// first `/`, so literature names may themselves contain slashes.
pub fn parse_selector(raw: &str) -> Result<LiteratureItem, SelectorError> {
    let Some((section, name)) = raw.split_once('/') else {
        return Err(SelectorError::Malformed(raw.to_owned()));
    };
    let section = Section::from_label(section)
        .ok_or_else(|| SelectorError::UnsupportedSection(section.to_owned()))?;
    Ok(LiteratureItem {
        section,
        name: name.to_owned(),
    })
}

#[derive(Debug, thiserror::Error)]
pub enum LocateError {
    #[error("document not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("read document {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

pub fn document_path(folder: &Path, name: &str) -> PathBuf {
    folder.join("auto").join(format!("{name}.md"))
}

/// Resolve `<folder>/auto/<name>.md`, failing if that exact file is absent.
pub async fn locate_document(folder: &Path, name: &str) -> Result<PathBuf, LocateError> {
    let path = document_path(folder, name);
    match tokio::fs::metadata(&path).await {
        Ok(meta) if meta.is_file() => Ok(path),
        Ok(_) => Err(LocateError::NotFound(path)),
        Err(err) if err.kind() == ErrorKind::NotFound => Err(LocateError::NotFound(path)),
        Err(source) => Err(LocateError::Io { path, source }),
    }
}

pub async fn read_document(path: &Path) -> Result<String, LocateError> {
    tokio::fs::read_to_string(path)
        .await
        .map_err(|source| match source.kind() {
            ErrorKind::NotFound => LocateError::NotFound(path.to_path_buf()),
            _ => LocateError::Io {
                path: path.to_path_buf(),
                source,
            },
        })
}
