use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::ser::{Serialize, Serializer};
use tokio::fs;

use crate::path_guard::AllowList;

#[derive(Debug, thiserror::Error)]
pub enum FolderError {
    #[error("path is not a directory: {}", .0.display())]
    NotADirectory(PathBuf),

    #[error("permission denied: {}", .0.display())]
    PermissionDenied(PathBuf),

    #[error("read dir {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl FolderError {
    fn from_io(path: &Path, err: std::io::Error) -> Self {
        match err.kind() {
            ErrorKind::PermissionDenied => Self::PermissionDenied(path.to_path_buf()),
            _ => Self::Io {
                path: path.to_path_buf(),
                source: err,
            },
        }
    }
}

/// Names of the immediate subdirectories of `dir`, sorted by code point.
///
/// A missing `dir` yields an empty list so callers probing optional
/// locations do not need to special-case it.
pub async fn list_subfolders(dir: &Path) -> Result<Vec<String>, FolderError> {
    let meta = match fs::metadata(dir).await {
        Ok(meta) => meta,
        Err(err) if err.kind() == ErrorKind::NotFound => {
            tracing::warn!(path = %dir.display(), "folder does not exist");
            return Ok(Vec::new());
        }
        Err(err) => return Err(FolderError::from_io(dir, err)),
    };
    if !meta.is_dir() {
        return Err(FolderError::NotADirectory(dir.to_path_buf()));
    }

    let mut entries = fs::read_dir(dir)
        .await
        .map_err(|err| FolderError::from_io(dir, err))?;

    let mut names = Vec::new();
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|err| FolderError::from_io(dir, err))?
    {
        // Follows symlinks, so a link to a directory counts as one.
        let is_dir = fs::metadata(entry.path())
            .await
            .map(|m| m.is_dir())
            .unwrap_or(false);
        if !is_dir {
            continue;
        }
        names.push(entry.file_name().to_string_lossy().into_owned());
    }

    names.sort();
    names.dedup();
    tracing::info!(path = %dir.display(), count = names.len(), "listed subfolders");
    Ok(names)
}

pub async fn directory_exists(path: &Path) -> bool {
    fs::metadata(path)
        .await
        .map(|m| m.is_dir())
        .unwrap_or(false)
}

/// Section label to subfolder names, in configured section order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SectionListing(pub Vec<(String, Vec<String>)>);

impl SectionListing {
    pub fn get(&self, label: &str) -> Option<&[String]> {
        self.0
            .iter()
            .find(|(l, _)| l == label)
            .map(|(_, names)| names.as_slice())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Serialize for SectionListing {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_map(self.0.iter().map(|(label, names)| (label, names)))
    }
}

/// List every section folder under `base`. A failing section yields an
/// empty list instead of failing the whole listing.
pub async fn list_sections(base: &Path, labels: &[String], guard: &AllowList) -> SectionListing {
    let mut out = Vec::with_capacity(labels.len());
    for label in labels {
        let dir = base.join(label);
        let names = list_section(&dir, guard).await;
        out.push((label.clone(), names));
    }
    tracing::info!(sections = out.len(), "listed all sections");
    SectionListing(out)
}

async fn list_section(dir: &Path, guard: &AllowList) -> Vec<String> {
    if !guard.is_allowed(&dir.to_string_lossy()) {
        tracing::warn!(path = %dir.display(), "section folder outside allow-list");
        return Vec::new();
    }
    match list_subfolders(dir).await {
        Ok(names) => names,
        Err(err) => {
            tracing::warn!(path = %dir.display(), error = %err, "section listing failed");
            Vec::new()
        }
    }
}
