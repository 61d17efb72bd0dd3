//! Selector batches: resolve, read, extract, one item at a time.

use std::path::Path;

use serde::Serialize;
use serde_json::{Map, Value};

use crate::completion::CompletionBackend;
use crate::contract;
use crate::literature::{self, LiteratureItem, SelectorError};
use crate::path_guard::AllowList;

#[derive(Debug, Clone, Serialize)]
pub struct ExtractionReport {
    pub success: bool,
    /// One entry per well-formed selector, in request order.
    pub results: Vec<Value>,
    pub total_processed: usize,
    /// Selectors dropped before processing.
    pub skipped: Vec<SkippedSelector>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct SkippedSelector {
    pub selector: String,
    pub reason: String,
}

/// Run the extraction contract for every selector.
///
/// Malformed selectors and sections without a schema are skipped and
/// listed in `skipped`. Any failure after that point is recorded in the
/// item's own slot and the batch continues.
pub async fn extract_selected(
    backend: &dyn CompletionBackend,
    base_path: &Path,
    guard: &AllowList,
    selectors: &[String],
) -> ExtractionReport {
    let mut results = Vec::with_capacity(selectors.len());
    let mut skipped = Vec::new();

    for selector in selectors {
        let item = match literature::parse_selector(selector) {
            Ok(item) => item,
            Err(err) => {
                tracing::warn!(selector = %selector, reason = %err, "skipping selector");
                skipped.push(SkippedSelector {
                    selector: selector.clone(),
                    reason: match err {
                        SelectorError::Malformed(_) => "malformed".to_owned(),
                        SelectorError::UnsupportedSection(_) => "unsupported_section".to_owned(),
                    },
                });
                continue;
            }
        };

        match extract_one(backend, base_path, guard, &item).await {
            Ok(value) => {
                tracing::info!(
                    section = %item.section,
                    literature = %item.name,
                    "extracted literature"
                );
                results.push(value);
            }
            Err(err) => {
                let message = format!("failed to process {selector}: {err:#}");
                tracing::error!(selector = %selector, error = %format!("{err:#}"), "literature failed");
                results.push(serde_json::json!({
                    "literature_name": selector,
                    "error": message,
                }));
            }
        }
    }

    ExtractionReport {
        success: true,
        total_processed: results.len(),
        results,
        skipped,
    }
}

async fn extract_one(
    backend: &dyn CompletionBackend,
    base_path: &Path,
    guard: &AllowList,
    item: &LiteratureItem,
) -> anyhow::Result<Value> {
    let joined = item.folder(base_path);
    let Some(folder) = guard.resolve(&joined.to_string_lossy()) else {
        anyhow::bail!("path is outside the allowed directories: {}", joined.display());
    };
    let md_path = literature::locate_document(&folder, &item.name).await?;
    let content = literature::read_document(&md_path).await?;
    let mut extracted = contract::extract_key_info(backend, &content, item.section).await?;

    annotate(
        &mut extracted,
        &item.name,
        item.section.label(),
        Some(&md_path.to_string_lossy()),
    );
    Ok(Value::Object(extracted))
}

/// Add caller-side identification next to the model's fields.
pub fn annotate(
    map: &mut Map<String, Value>,
    literature_name: &str,
    section_name: &str,
    md_file_path: Option<&str>,
) {
    map.insert("literature_name".to_owned(), Value::from(literature_name));
    map.insert("section_name".to_owned(), Value::from(section_name));
    if let Some(path) = md_file_path {
        map.insert("md_file_path".to_owned(), Value::from(path));
    }
}
