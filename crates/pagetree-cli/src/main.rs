use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use futures::StreamExt;
use pagetree::pipeline::{self, Processed};
use pagetree::{confidence, tree, ConfidenceResult, NodeKind, SourceDocument, TreeNode, TreeStore};
use pagetree_local::{FsStore, LocalExtractor};
use std::path::{Path, PathBuf};
use std::time::Instant;

mod envelope;

use envelope::{add_envelope_fields, error_envelope, warning_hints_from, ErrorCode};

pub(crate) const SCHEMA_VERSION: u64 = 1;

#[derive(Parser, Debug)]
#[command(name = "pagetree")]
#[command(
    about = "Turn OCR / PDF text into a document → page → section → paragraph tree with confidence scores",
    long_about = None
)]
struct Cli {
    /// Log at debug level (PAGETREE_LOG takes precedence when set).
    #[arg(long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Build a tree from already-extracted text.
    Tree(TreeCmd),
    /// Score the quality of a span of extracted text.
    Score(ScoreCmd),
    /// Extract, build and store trees for PDFs, images, or text files.
    Ingest(IngestCmd),
    /// Print a stored record by original filename.
    Show(ShowCmd),
    /// Print version info.
    Version(VersionCmd),
}

#[derive(clap::Args, Debug)]
struct TreeCmd {
    /// Text file to read, or `-` for stdin.
    #[arg(long, default_value = "-")]
    input: String,
    /// Document title (default: "Document").
    #[arg(long)]
    title: Option<String>,
    /// Output format: json|text
    #[arg(long = "output", alias = "format", default_value = "json")]
    output: String,
}

#[derive(clap::Args, Debug)]
struct ScoreCmd {
    /// Text file to read, or `-` for stdin.
    #[arg(long, default_value = "-")]
    input: String,
    /// Output format: json|text
    #[arg(long = "output", alias = "format", default_value = "json")]
    output: String,
}

#[derive(clap::Args, Debug)]
struct IngestCmd {
    /// Files to ingest (PDF, image, or text).
    #[arg(required = true)]
    files: Vec<PathBuf>,
    /// Override the mimetype for every file (otherwise guessed from the extension).
    #[arg(long)]
    mimetype: Option<String>,
    /// Store directory (default: <user cache dir>/pagetree-store).
    #[arg(long, env = "PAGETREE_STORE_DIR")]
    store_dir: Option<PathBuf>,
    /// Build trees without persisting them.
    #[arg(long, action = clap::ArgAction::SetTrue)]
    no_store: bool,
    /// Files processed concurrently.
    #[arg(long, default_value_t = 4)]
    parallelism: usize,
    /// Include the full extracted text in each result.
    #[arg(long, action = clap::ArgAction::SetTrue)]
    include_text: bool,
    /// Output format: json|text
    #[arg(long = "output", alias = "format", default_value = "json")]
    output: String,
}

#[derive(clap::Args, Debug)]
struct ShowCmd {
    /// Original filename the record was stored under.
    name: String,
    /// Store directory (default: <user cache dir>/pagetree-store).
    #[arg(long, env = "PAGETREE_STORE_DIR")]
    store_dir: Option<PathBuf>,
    /// Output format: json|text
    #[arg(long = "output", alias = "format", default_value = "json")]
    output: String,
}

#[derive(clap::Args, Debug)]
struct VersionCmd {
    /// Output format: json|text
    #[arg(long = "output", alias = "format", default_value = "json")]
    output: String,
}

fn is_text_output(output: &str) -> bool {
    output.trim().eq_ignore_ascii_case("text")
}

fn default_store_dir() -> PathBuf {
    // Persistent per-user location, with a temp-dir fallback.
    dirs::cache_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("pagetree-store")
}

fn now_epoch_s() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// Optional `KEY=VALUE` file named by PAGETREE_ENV_FILE. Never overrides
/// variables already present in the process environment.
fn load_env_file() {
    let Ok(p) = std::env::var("PAGETREE_ENV_FILE") else {
        return;
    };
    let p = p.trim();
    if p.is_empty() {
        return;
    }
    let Ok(txt) = std::fs::read_to_string(p) else {
        return;
    };
    for raw in txt.lines() {
        let s = raw.trim();
        if s.is_empty() || s.starts_with('#') {
            continue;
        }
        let Some((k, v)) = s.split_once('=') else {
            continue;
        };
        let k = k.trim();
        if k.is_empty() {
            continue;
        }
        if std::env::var_os(k).is_none() {
            std::env::set_var(k, v.trim());
        }
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = tracing_subscriber::EnvFilter::try_from_env("PAGETREE_LOG")
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default));
    // stdout carries JSON; logs go to stderr.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

fn read_input(input: &str) -> Result<String> {
    let bytes = if input == "-" {
        use std::io::Read;
        let mut buf = Vec::new();
        std::io::stdin()
            .read_to_end(&mut buf)
            .context("read stdin")?;
        buf
    } else {
        std::fs::read(input).with_context(|| format!("read {input}"))?
    };
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

fn summary(root: &TreeNode) -> serde_json::Value {
    serde_json::json!({
        "pages": root.pages().count(),
        "sections": root.count(NodeKind::Section),
        "paragraphs": root.paragraphs().count(),
    })
}

fn confidence_suffix(c: Option<&ConfidenceResult>) -> String {
    match c {
        Some(c) => format!("  [{} {}]", c.label.badge(), c.score),
        None => String::new(),
    }
}

/// Indented outline: pages and document carry their confidence badge,
/// sections are `#` lines, paragraphs are plain lines.
fn render_outline(node: &TreeNode, depth: usize, out: &mut String) {
    let indent = "  ".repeat(depth);
    match node.kind {
        NodeKind::Document | NodeKind::Page => {
            out.push_str(&format!(
                "{indent}{}{}\n",
                node.title.as_deref().unwrap_or(node.kind.as_str()),
                confidence_suffix(node.confidence.as_ref())
            ));
        }
        NodeKind::Section => {
            out.push_str(&format!(
                "{indent}# {}\n",
                node.title.as_deref().unwrap_or_default()
            ));
        }
        NodeKind::Paragraph => {
            out.push_str(&format!(
                "{indent}{}\n",
                node.content.as_deref().unwrap_or_default()
            ));
        }
    }
    for child in &node.children {
        render_outline(child, depth + 1, out);
    }
}

fn outline(root: &TreeNode) -> String {
    let mut out = String::new();
    render_outline(root, 0, &mut out);
    out
}

struct Ingested {
    processed: Processed,
    stored_path: Option<PathBuf>,
}

fn ingest_one(
    path: &Path,
    mimetype: Option<&str>,
    store: Option<&FsStore>,
    now_s: u64,
) -> pagetree::Result<Ingested> {
    let original_name = path
        .file_name()
        .map(|s| s.to_string_lossy().into_owned())
        .ok_or_else(|| pagetree::Error::InvalidInput(format!("not a file: {}", path.display())))?;
    let bytes = std::fs::read(path)
        .map_err(|e| pagetree::Error::InvalidInput(format!("read {}: {e}", path.display())))?;
    let source = SourceDocument {
        original_name,
        mimetype: mimetype.map(str::to_string),
        bytes,
    };
    let mut processed = pipeline::process(&LocalExtractor::from_env(), &source, now_s)?;
    if processed.record.structure.children.is_empty() {
        processed.warnings.push("no_pages");
    }
    let stored_path = match store {
        Some(store) => {
            store.put(&processed.record)?;
            Some(store.path_for_name(&processed.record.original_name))
        }
        None => None,
    };
    Ok(Ingested {
        processed,
        stored_path,
    })
}

fn ingest_payload(path: &Path, ingested: &Ingested, include_text: bool) -> serde_json::Value {
    let rec = &ingested.processed.record;
    let warnings = &ingested.processed.warnings;
    let mut v = serde_json::json!({
        "ok": true,
        "request": { "path": path.display().to_string(), "mimetype": rec.mimetype },
        "original_name": rec.original_name,
        "pipeline": rec.pipeline,
        "page_count": ingested.processed.page_count,
        "stored": ingested.stored_path.is_some(),
        "store_path": ingested.stored_path.as_ref().map(|p| p.display().to_string()),
        "summary": summary(&rec.structure),
        "confidence": rec.structure.confidence,
        "warnings": warnings,
        "warning_hints": warning_hints_from(warnings),
        "tree": rec.structure,
    });
    if include_text {
        v["text"] = serde_json::json!(rec.extracted_text);
    }
    v
}

async fn run_ingest(args: IngestCmd) -> Result<()> {
    let store = if args.no_store {
        None
    } else {
        let dir = args.store_dir.clone().unwrap_or_else(default_store_dir);
        Some(FsStore::new(dir))
    };
    let now_s = now_epoch_s();
    let text_output = is_text_output(&args.output);
    let total = args.files.len();

    let jobs = args.files.iter().cloned().map(|path| {
        let store = store.clone();
        let mimetype = args.mimetype.clone();
        async move {
            let t0 = Instant::now();
            let p = path.clone();
            let r = tokio::task::spawn_blocking(move || {
                ingest_one(&p, mimetype.as_deref(), store.as_ref(), now_s)
            })
            .await;
            (path, t0.elapsed().as_millis(), r)
        }
    });
    // `buffered` keeps argument order while bounding how many run at once.
    let mut results = futures::stream::iter(jobs).buffered(args.parallelism.max(1));

    let mut failures = 0usize;
    while let Some((path, elapsed_ms, r)) = results.next().await {
        let payload = match r {
            Ok(Ok(ingested)) => {
                tracing::info!(path = %path.display(), "ingested");
                if text_output {
                    let rec = &ingested.processed.record;
                    let c = rec.structure.confidence.as_ref();
                    println!(
                        "{}: {} pages via {}{}",
                        rec.original_name,
                        rec.structure.count(NodeKind::Page),
                        rec.pipeline.as_str(),
                        confidence_suffix(c)
                    );
                    continue;
                }
                let mut v = ingest_payload(&path, &ingested, args.include_text);
                add_envelope_fields(&mut v, "ingest", elapsed_ms);
                v
            }
            Ok(Err(e)) => {
                failures += 1;
                tracing::warn!(path = %path.display(), error = %e, "ingest failed");
                let mut v = error_envelope("ingest", ErrorCode::from(&e), &e, elapsed_ms);
                v["request"] = serde_json::json!({ "path": path.display().to_string() });
                v
            }
            Err(join_err) => {
                failures += 1;
                error_envelope("ingest", ErrorCode::UnexpectedError, join_err, elapsed_ms)
            }
        };
        if text_output {
            println!(
                "{}: error: {}",
                path.display(),
                payload["error"]["message"].as_str().unwrap_or_default()
            );
        } else {
            println!("{payload}");
        }
    }

    if failures > 0 {
        anyhow::bail!("{failures} of {total} files failed to ingest");
    }
    Ok(())
}

fn run_show(args: ShowCmd) -> Result<()> {
    let t0 = Instant::now();
    let dir = args.store_dir.unwrap_or_else(default_store_dir);
    let store = FsStore::new(dir);
    let looked_up = store.get(&args.name);
    let elapsed_ms = t0.elapsed().as_millis();

    let (code, message) = match looked_up {
        Ok(Some(record)) => {
            if is_text_output(&args.output) {
                print!("{}", outline(&record.structure));
            } else {
                let mut v = serde_json::json!({
                    "ok": true,
                    "request": { "name": args.name },
                    "summary": summary(&record.structure),
                    "record": record,
                });
                add_envelope_fields(&mut v, "show", elapsed_ms);
                println!("{v}");
            }
            return Ok(());
        }
        Ok(None) => (
            ErrorCode::NotFound,
            format!("no record stored for {:?}", args.name),
        ),
        Err(e) => (ErrorCode::from(&e), e.to_string()),
    };

    let mut v = error_envelope("show", code, &message, elapsed_ms);
    v["request"] = serde_json::json!({ "name": args.name });
    println!("{v}");
    anyhow::bail!(message)
}

#[tokio::main]
async fn main() -> Result<()> {
    load_env_file();
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::Tree(args) => {
            let t0 = Instant::now();
            let text = read_input(&args.input)?;
            let root = match args.title.as_deref() {
                Some(title) => tree::build_titled(&text, title),
                None => tree::build(&text),
            };
            if is_text_output(&args.output) {
                print!("{}", outline(&root));
            } else {
                let mut v = serde_json::json!({
                    "ok": true,
                    "summary": summary(&root),
                    "tree": root,
                });
                add_envelope_fields(&mut v, "tree", t0.elapsed().as_millis());
                println!("{v}");
            }
        }
        Commands::Score(args) => {
            let t0 = Instant::now();
            let text = read_input(&args.input)?;
            let c = confidence::score(&text);
            if is_text_output(&args.output) {
                println!(
                    "{} {} (words: {}, real: {}, junk: {})",
                    c.score,
                    c.label.badge(),
                    c.total_words,
                    c.real_words,
                    c.junk_words
                );
            } else {
                let mut v = serde_json::json!({ "ok": true, "confidence": c });
                add_envelope_fields(&mut v, "score", t0.elapsed().as_millis());
                println!("{v}");
            }
        }
        Commands::Ingest(args) => run_ingest(args).await?,
        Commands::Show(args) => run_show(args)?,
        Commands::Version(args) => {
            let v = serde_json::json!({
                "schema_version": SCHEMA_VERSION,
                "kind": "version",
                "ok": true,
                "name": "pagetree",
                "version": env!("CARGO_PKG_VERSION"),
            });
            if is_text_output(&args.output) {
                println!("pagetree {}", env!("CARGO_PKG_VERSION"));
            } else {
                println!("{v}");
            }
        }
    }
    Ok(())
}
