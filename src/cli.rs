use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context as _;
use clap::{Args, Parser, Subcommand};
use serde_json::Value;

use crate::batch;
use crate::completion::{ClientSettings, CompletionBackend, LazyCompletion};
use crate::config::AppConfig;
use crate::contract;
use crate::folders;
use crate::literature::{self, CDE_REGISTRY_LABEL, Section};
use crate::render::{self, SummaryDocument};

#[derive(Debug, Parser)]
#[command(author, version, about)]
pub struct Cli {
    /// YAML config file (falls back to $TRIALDIGEST_CONFIG, then defaults).
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    Folders(FoldersArgs),
    Extract(ExtractArgs),
    ExtractFile(ExtractFileArgs),
    Summarize(SummarizeArgs),
    Render(RenderArgs),
}

#[derive(Debug, Args)]
pub struct FoldersArgs {
    /// Directory to list. Without it, every configured section is listed as JSON.
    #[arg(long)]
    pub path: Option<String>,
}

#[derive(Debug, Args)]
pub struct ExtractArgs {
    /// Literature selector `section/name`; repeatable.
    #[arg(long = "item", required = true)]
    pub items: Vec<String>,
}

#[derive(Debug, Args)]
pub struct ExtractFileArgs {
    /// Markdown document to extract from.
    #[arg(long)]
    pub file: String,

    /// Section label picking the schema; anything but the foreign-trial
    /// label uses the registry schema.
    #[arg(long, default_value = CDE_REGISTRY_LABEL)]
    pub category: String,
}

#[derive(Debug, Args)]
pub struct SummarizeArgs {
    /// Markdown document to summarize.
    #[arg(long)]
    pub file: String,

    #[arg(long)]
    pub literature_name: Option<String>,

    #[arg(long)]
    pub section_name: Option<String>,
}

#[derive(Debug, Args)]
pub struct RenderArgs {
    /// Summary JSON: the bare object or a response carrying a `summary` key.
    #[arg(long)]
    pub summary: PathBuf,

    /// Output `.docx` path.
    #[arg(long)]
    pub out: PathBuf,

    /// Overwrite the output if it exists.
    #[arg(long, default_value_t = false)]
    pub force: bool,
}

pub async fn folders(config: &AppConfig, args: FoldersArgs) -> anyhow::Result<()> {
    let guard = config.allow_list();
    let Some(raw) = args.path else {
        let listing = folders::list_sections(&config.base_path, &config.sections, &guard).await;
        return print_json(&serde_json::to_value(&listing)?);
    };

    let Some(path) = guard.resolve(&raw) else {
        anyhow::bail!("path is outside the allowed directories: {raw}");
    };
    let names = folders::list_subfolders(&path)
        .await
        .with_context(|| format!("list {raw}"))?;

    let mut stdout = std::io::stdout().lock();
    for name in names {
        writeln!(stdout, "{name}")?;
    }
    Ok(())
}

async fn backend(config: &AppConfig) -> anyhow::Result<Arc<dyn CompletionBackend>> {
    LazyCompletion::new(ClientSettings::from(config))
        .ensure_initialized()
        .await
        .context("initialize completion client")
}

pub async fn extract(config: &AppConfig, args: ExtractArgs) -> anyhow::Result<()> {
    let backend = backend(config).await?;
    let report = batch::extract_selected(
        backend.as_ref(),
        &config.base_path,
        &config.allow_list(),
        &args.items,
    )
    .await;
    print_json(&serde_json::to_value(&report)?)
}

/// Extract key information from one document outside the section layout.
pub async fn extract_file(config: &AppConfig, args: ExtractFileArgs) -> anyhow::Result<()> {
    let Some(path) = config.allow_list().resolve(&args.file) else {
        anyhow::bail!("path is outside the allowed directories: {}", args.file);
    };
    let content = literature::read_document(&path).await?;
    let section = Section::for_category(args.category.trim());

    let backend = backend(config).await?;
    let mut extracted = contract::extract_key_info(backend.as_ref(), &content, section).await?;
    let name = path
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default();
    batch::annotate(
        &mut extracted,
        &name,
        section.label(),
        Some(&path.to_string_lossy()),
    );
    print_json(&Value::Object(extracted))
}

pub async fn summarize(config: &AppConfig, args: SummarizeArgs) -> anyhow::Result<()> {
    let Some(path) = config.allow_list().resolve(&args.file) else {
        anyhow::bail!("path is outside the allowed directories: {}", args.file);
    };
    let content = literature::read_document(&path).await?;

    let backend = backend(config).await?;
    let mut summary = contract::generate_summary(backend.as_ref(), &content).await?;
    batch::annotate(
        &mut summary,
        args.literature_name.as_deref().unwrap_or_default(),
        args.section_name.as_deref().unwrap_or_default(),
        None,
    );
    print_json(&Value::Object(summary))
}

pub fn render(args: RenderArgs) -> anyhow::Result<()> {
    if args.out.exists() && !args.force {
        anyhow::bail!(
            "output already exists: {} (use --force to overwrite)",
            args.out.display()
        );
    }

    let raw = std::fs::read_to_string(&args.summary)
        .with_context(|| format!("read summary: {}", args.summary.display()))?;
    let value: Value = serde_json::from_str(&raw)
        .with_context(|| format!("parse summary: {}", args.summary.display()))?;
    let summary: SummaryDocument =
        serde_json::from_value(unwrap_summary(value)).context("decode summary")?;

    let bytes = render::render_docx(&summary).context("render docx")?;
    write_output(&args.out, &bytes, args.force)?;
    tracing::info!(out = %args.out.display(), bytes = bytes.len(), "wrote summary document");
    Ok(())
}

/// Accept both `{...summary fields}` and `{"summary": {...}}`.
fn unwrap_summary(value: Value) -> Value {
    match value {
        Value::Object(mut map) if map.get("summary").is_some_and(Value::is_object) => {
            map.remove("summary").unwrap_or_default()
        }
        other => other,
    }
}

fn write_output(out: &Path, bytes: &[u8], force: bool) -> anyhow::Result<()> {
    if let Some(parent) = out.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create output dir: {}", parent.display()))?;
    }

    if !force {
        let mut file = std::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(out)
            .with_context(|| format!("open output: {}", out.display()))?;
        file.write_all(bytes)
            .with_context(|| format!("write output: {}", out.display()))?;
        return Ok(());
    }

    // Replace atomically so a failed write never leaves a truncated document.
    let tmp = out.with_extension(format!("{}.tmp", uuid::Uuid::new_v4()));
    std::fs::write(&tmp, bytes).with_context(|| format!("write temp: {}", tmp.display()))?;
    std::fs::rename(&tmp, out).with_context(|| format!("replace output: {}", out.display()))?;
    Ok(())
}

fn print_json(value: &Value) -> anyhow::Result<()> {
    let mut stdout = std::io::stdout().lock();
    serde_json::to_writer_pretty(&mut stdout, value).context("write json")?;
    writeln!(stdout)?;
    Ok(())
}
