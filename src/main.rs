use anyhow::Context;
use clap::{Parser, ValueEnum};
use std::fs::File;
use std::io::BufWriter;
use std::path::PathBuf;
use taskexport::config::DEFAULT_ROW_COUNT;
use taskexport::{ExportConfig, ExportMode, ExportRequest, Exporter, RowSource, SyntheticRowSource};
use tracing::info;

#[derive(Parser)]
#[command(name = "taskexport")]
#[command(about = "Export unit tasks to an .xlsx workbook, in memory or streamed through disk")]
#[command(version)]
struct Cli {
    /// memory: build the workbook in RAM; disk: bounded window with disk staging
    #[arg(short, long, default_value = "disk")]
    mode: ExportMode,

    /// Maximum number of rows to export
    #[arg(short, long, default_value_t = DEFAULT_ROW_COUNT)]
    rows: u64,

    /// Output file (defaults to HighMemoryMode.xlsx / LowMemoryMode.xlsx)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Rows held in memory before a flush in disk mode
    #[arg(long)]
    flush_size: Option<usize>,

    /// Directory for staging files
    #[arg(long)]
    staging_dir: Option<PathBuf>,

    /// Where rows come from
    #[arg(long, value_enum, default_value = "synthetic")]
    source: SourceKind,

    /// PostgreSQL connection URL for --source postgres
    #[arg(long, env = "DATABASE_URL", hide_env_values = true)]
    database_url: Option<String>,
}

#[derive(Clone, Copy, ValueEnum)]
enum SourceKind {
    Synthetic,
    Postgres,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "taskexport=info".into()),
        )
        .init();

    let cli = Cli::parse();

    let mut config = ExportConfig::from_env().context("invalid TASKEXPORT_* environment")?;
    if let Some(flush_size) = cli.flush_size {
        config = config.with_flush_size(flush_size);
    }
    if let Some(dir) = &cli.staging_dir {
        config = config.with_staging_dir(dir);
    }

    let source = open_source(cli.source, cli.database_url.as_deref())?;
    let mut exporter = Exporter::new(source, config)?;

    let mode = exporter.resolve_mode(&ExportRequest::new(cli.rows, cli.mode));
    let output = cli.output.unwrap_or_else(|| {
        let config = exporter.config();
        PathBuf::from(match mode {
            ExportMode::Memory => &config.memory_file_name,
            ExportMode::Disk => &config.disk_file_name,
        })
    });

    let file = File::create(&output)
        .with_context(|| format!("cannot create {}", output.display()))?;
    let summary = exporter
        .export(&ExportRequest::new(cli.rows, cli.mode), BufWriter::new(file))
        .with_context(|| format!("export to {} failed", output.display()))?;

    info!(
        path = %output.display(),
        mode = %summary.mode,
        rows = summary.data_rows,
        flushes = summary.flushes,
        bytes = summary.bytes_written,
        "workbook written"
    );
    Ok(())
}

fn open_source(kind: SourceKind, database_url: Option<&str>) -> anyhow::Result<Box<dyn RowSource>> {
    match kind {
        SourceKind::Synthetic => Ok(Box::new(SyntheticRowSource::new())),
        SourceKind::Postgres => open_postgres(database_url),
    }
}

#[cfg(feature = "postgres")]
fn open_postgres(database_url: Option<&str>) -> anyhow::Result<Box<dyn RowSource>> {
    let url = database_url.context("--database-url or DATABASE_URL is required for postgres")?;
    let source = taskexport::PostgresRowSource::connect(url)?;
    Ok(Box::new(source))
}

#[cfg(not(feature = "postgres"))]
fn open_postgres(_database_url: Option<&str>) -> anyhow::Result<Box<dyn RowSource>> {
    anyhow::bail!("this build has no PostgreSQL support; rebuild with --features postgres")
}
