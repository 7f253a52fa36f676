use anyhow::{Context, Result};
use clap::Parser;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::PathBuf;
use textmirror_config::Config;
use textmirror_engine::editing::Editor;
use textmirror_engine::model::{NodeKey, NodeKind, Snapshot, snapshot_from_markdown};
use textmirror_engine::reconcile::{
    DivergenceReport, MetricsLog, MetricsSink, ReconcilerMetric, validate_pairing,
};
use textmirror_engine::{FeatureFlags, TextFormat};

/// Replay simulated typing into a Markdown document and report how the
/// reconciler handled each keystroke
#[derive(Parser, Debug)]
#[command(name = "textmirror")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Markdown file to load
    file: PathBuf,

    /// Config file (defaults to ~/.config/textmirror/config.toml)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Number of characters to type
    #[arg(short, long, default_value_t = 200)]
    keystrokes: usize,

    /// Cross-check every fast-path run against a full reconcile
    #[arg(long)]
    shadow: bool,

    /// Verify the range cache after every fast-path run
    #[arg(long)]
    strict: bool,

    /// Render without anchor markers (forces the full path)
    #[arg(long)]
    no_anchors: bool,

    /// Disable the fast path
    #[arg(long)]
    full_only: bool,
}

/// Records into a shared log and optionally appends each run to a file.
struct ReplaySink {
    log: MetricsLog,
    file: Option<File>,
}

impl MetricsSink for ReplaySink {
    fn record(&mut self, metric: &ReconcilerMetric) {
        self.log.record(metric);
        if let Some(file) = self.file.as_mut() {
            let reason = metric
                .fallback_reason
                .map_or("-", |reason| reason.as_str());
            if let Err(e) = writeln!(
                file,
                "{}\t{:?}\t{}\t{}\t{}",
                metric.version,
                metric.path,
                metric.duration.as_micros(),
                metric.replaced_len,
                reason
            ) {
                log::warn!("Failed to write metrics line: {e}");
            }
        }
    }

    fn divergence(&mut self, report: &DivergenceReport) {
        self.log.divergence(report);
    }
}

fn load_config(cli: &Cli) -> Result<Config> {
    let config = match &cli.config {
        Some(path) => Config::load_from_path(path)?,
        None => Config::load()?,
    };
    Ok(config.unwrap_or_default())
}

fn apply_overrides(cli: &Cli, mut flags: FeatureFlags) -> FeatureFlags {
    flags.shadow_compare |= cli.shadow;
    flags.strict_mode |= cli.strict;
    if cli.no_anchors {
        flags.anchors_enabled = false;
    }
    if cli.full_only {
        flags.fast_path = false;
    }
    flags
}

/// The last text run of `block`, appending an empty one if it has none.
fn typing_target(editor: &mut Editor, block: NodeKey) -> Result<NodeKey> {
    let existing = editor.snapshot().node(block).and_then(|node| {
        node.children.iter().rev().copied().find(|&child| {
            editor
                .snapshot()
                .node(child)
                .is_some_and(|child| child.kind == NodeKind::Text)
        })
    });
    match existing {
        Some(run) => Ok(run),
        None => Ok(editor.update(|tx| tx.append_text(block, "", TextFormat::default()))?),
    }
}

fn blocks(snapshot: &Snapshot) -> Vec<NodeKey> {
    snapshot
        .document_order()
        .filter(|node| node.kind.is_block())
        .map(|node| node.key)
        .collect()
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli)?;

    let mut logger = env_logger::Builder::from_default_env();
    if std::env::var_os("RUST_LOG").is_none() {
        logger.parse_filters(config.log_level.as_deref().unwrap_or("info"));
    }
    logger.init();

    let flags = apply_overrides(&cli, config.flags.clone());
    log::info!("Loading {}", cli.file.display());
    let markdown = std::fs::read_to_string(&cli.file)
        .with_context(|| format!("Failed to read {}", cli.file.display()))?;
    let snapshot = snapshot_from_markdown(&markdown)?;

    let log = MetricsLog::new();
    let file = match &config.metrics_log {
        Some(path) => Some(
            OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open metrics log {}", path.display()))?,
        ),
        None => None,
    };
    let mut editor = Editor::from_snapshot(snapshot, flags);
    editor.set_metrics_sink(ReplaySink {
        log: log.clone(),
        file,
    });

    let blocks = blocks(editor.snapshot());
    let (Some(&last), Some(&middle)) = (blocks.last(), blocks.get(blocks.len() / 2)) else {
        println!("{} has no blocks to type into", cli.file.display());
        return Ok(());
    };
    log::info!(
        "Typing {} characters into {} blocks",
        cli.keystrokes,
        blocks.len()
    );

    let targets = [typing_target(&mut editor, last)?, typing_target(&mut editor, middle)?];
    log.clear();
    for i in 0..cli.keystrokes {
        let run = targets[i % targets.len()];
        let len = editor
            .snapshot()
            .node(run)
            .map_or(0, |node| node.text.len());
        editor.update(|tx| tx.insert_text(run, len, "x"))?;
    }

    let summary = log.summary();
    println!("runs:        {}", summary.runs);
    println!("fast path:   {}", summary.fast_runs);
    println!("full path:   {}", summary.full_runs);
    if let Some(mean) = summary.mean_fast() {
        println!("mean fast:   {mean:?}");
    }
    if let Some(mean) = summary.mean_full() {
        println!("mean full:   {mean:?}");
    }
    println!(
        "chars:       +{} -{}",
        summary.chars_inserted, summary.chars_deleted
    );
    for (reason, count) in &summary.fallbacks {
        println!("fallback:    {reason} x{count}");
    }
    println!("divergences: {}", summary.divergences);
    if editor.flags().anchors_enabled {
        match validate_pairing(&editor.text()) {
            Ok(pairs) => println!("anchors:     {pairs} pairs intact"),
            Err(e) => println!("anchors:     damaged ({e})"),
        }
    }
    Ok(())
}
