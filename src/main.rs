//! CLI entry point for `mailjot`.

use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::Context;
use clap::{CommandFactory, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};

use mailjot::config::Config;
use mailjot::import::{resolve_folder, ImportSummary, Importer, NoteStore};
use mailjot::joplin::{DryRunStore, JoplinClient};
use mailjot::parser::mime::parse_message;
use mailjot::source;
use mailjot::transcode::sink::{ResourceStore, Sink};
use mailjot::transcode::Transcoder;

#[derive(Parser)]
#[command(name = "mailjot", version, about = "Turn email messages into Joplin notes")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbose logging (-v info, -vv debug, -vvv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Joplin API token
    #[arg(long, global = true, env = "JOPLIN_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Joplin clipper service port
    #[arg(long, global = true, env = "JOPLIN_PORT")]
    port: Option<u16>,

    /// Joplin clipper service URL (scheme and host)
    #[arg(long, global = true, env = "JOPLIN_URL")]
    url: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Import .eml files, directories of .eml files, or MBOX files as notes
    Import {
        #[arg(required = true, value_name = "PATH")]
        paths: Vec<PathBuf>,
        /// Parent notebook (id or title)
        #[arg(short, long, env = "JOPLIN_FOLDER")]
        folder: Option<String>,
        /// Transcode without uploading anything
        #[arg(long)]
        dry_run: bool,
    },
    /// Transcode one message and print the resulting note
    Transcode {
        file: PathBuf,
        #[arg(long)]
        json: bool,
    },
    /// List Joplin notebooks
    Folders {
        #[arg(long)]
        json: bool,
    },
    /// Check that the Joplin clipper service is reachable
    Ping,
    /// Generate shell completions
    Completions {
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
    /// Generate a man page
    Manpage,
}

impl Cli {
    /// Command-line flags win over the config file and environment.
    fn apply_overrides(&self, config: &mut Config) {
        if let Some(ref token) = self.token {
            config.joplin.token = token.clone();
        }
        if let Some(port) = self.port {
            config.joplin.port = port;
        }
        if let Some(ref url) = self.url {
            config.joplin.url = url.clone();
        }
    }
}

fn main() -> anyhow::Result<()> {
    // .env must be loaded before clap reads `env = ...` defaults
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    let mut config = mailjot::config::load_config();
    config.apply_env();
    cli.apply_overrides(&mut config);

    // Configure logging: stderr + optional log file
    let log_level = match cli.verbose {
        0 => config.general.log_level.as_str(),
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    setup_logging(log_level, &config);

    match cli.command {
        Commands::Import {
            paths,
            folder,
            dry_run,
        } => cmd_import(&paths, folder.as_deref(), dry_run, &config),
        Commands::Transcode { file, json } => cmd_transcode(&file, json, &config),
        Commands::Folders { json } => cmd_folders(json, &config),
        Commands::Ping => cmd_ping(&config),
        Commands::Completions { shell } => cmd_completions(shell),
        Commands::Manpage => cmd_manpage(),
    }
}

/// Set up tracing with stderr output and optional file logging.
fn setup_logging(level: &str, config: &Config) {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    let stderr_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    // Try to set up file logging
    let log_dir = mailjot::config::cache_dir(config);
    if std::fs::create_dir_all(&log_dir).is_ok() {
        let file_appender = tracing_appender::rolling::never(&log_dir, "mailjot.log");
        let file_layer = tracing_subscriber::fmt::layer()
            .with_ansi(false)
            .with_writer(file_appender);

        tracing_subscriber::registry()
            .with(env_filter)
            .with(stderr_layer)
            .with(file_layer)
            .init();
    } else {
        // Fall back to stderr only
        tracing_subscriber::registry()
            .with(env_filter)
            .with(stderr_layer)
            .init();
    }
}

/// Generate shell completions and print to stdout.
fn cmd_completions(shell: clap_complete::Shell) -> anyhow::Result<()> {
    let mut cmd = Cli::command();
    clap_complete::generate(shell, &mut cmd, "mailjot", &mut std::io::stdout());
    Ok(())
}

/// Generate a man page and print to stdout.
fn cmd_manpage() -> anyhow::Result<()> {
    let cmd = Cli::command();
    let man = clap_mangen::Man::new(cmd);
    let mut buf = Vec::new();
    man.render(&mut buf)?;
    std::io::Write::write_all(&mut std::io::stdout(), &buf)?;
    Ok(())
}

/// Import every message under `paths`.
fn cmd_import(
    paths: &[PathBuf],
    folder: Option<&str>,
    dry_run: bool,
    config: &Config,
) -> anyhow::Result<()> {
    let folder = folder.or(config.joplin.folder());
    let start = Instant::now();

    let summary = if dry_run {
        let sink = Sink::new(DryRunStore);
        let importer =
            Importer::new(&sink, &DryRunStore).parent_id(folder.map(str::to_string));
        import_paths(&importer, paths, config)?
    } else {
        let client = JoplinClient::new(&config.joplin)?;
        client.ping().with_context(|| {
            format!(
                "Joplin clipper service is not reachable at {}",
                config.joplin.base_url()
            )
        })?;
        let parent_id = resolve_folder(&client, folder)?;
        let sink = Sink::new(client.clone());
        let importer = Importer::new(&sink, &client).parent_id(parent_id);
        import_paths(&importer, paths, config)?
    };

    print_summary(&summary, start.elapsed(), dry_run);

    if summary.failed > 0 {
        anyhow::bail!("{} message(s) failed to import", summary.failed);
    }
    Ok(())
}

fn import_paths<R: ResourceStore, N: NoteStore>(
    importer: &Importer<'_, R, N>,
    paths: &[PathBuf],
    config: &Config,
) -> anyhow::Result<ImportSummary> {
    let mut total = ImportSummary::default();

    for path in paths {
        let mut source = source::open(path, config.import.max_message_size)
            .with_context(|| format!("cannot open {}", path.display()))?;

        let pb = match source.remaining_hint() {
            Some(count) => {
                let pb = ProgressBar::new(count as u64);
                pb.set_style(
                    ProgressStyle::default_bar()
                        .template("{spinner:.green} Importing [{bar:40.cyan/blue}] {pos}/{len} {msg}")
                        .expect("valid template")
                        .progress_chars("#>-"),
                );
                pb
            }
            None => {
                let pb = ProgressBar::new_spinner();
                pb.set_style(
                    ProgressStyle::default_spinner()
                        .template("{spinner:.green} Importing {pos} message(s) {msg}")
                        .expect("valid template"),
                );
                pb
            }
        };
        pb.set_message(path.display().to_string());

        let summary = importer.run(source.as_mut(), Some(&|_origin: &str| pb.inc(1)));
        pb.finish_and_clear();

        tracing::info!(
            path = %path.display(),
            imported = summary.imported,
            failed = summary.failed,
            "Finished source"
        );
        total.merge(summary);
    }

    Ok(total)
}

fn print_summary(summary: &ImportSummary, elapsed: std::time::Duration, dry_run: bool) {
    println!();
    if dry_run {
        println!("  Dry run: nothing was uploaded");
    }
    println!("  {:<12} {}", "Imported", summary.imported);
    println!("  {:<12} {}", "Resources", summary.resources);
    println!("  {:<12} {}", "Failed", summary.failed);
    println!("  {:<12} {:.2?}", "Time", elapsed);
    println!();
}

/// Transcode the first message of `path` with the dry-run store and print it.
fn cmd_transcode(path: &Path, json: bool, config: &Config) -> anyhow::Result<()> {
    let mut source = source::open(path, config.import.max_message_size)?;
    let raw = source
        .next_message()
        .with_context(|| format!("{}: no message found", path.display()))??;

    let message = parse_message(&raw.bytes)?;
    let sink = Sink::new(DryRunStore);
    let (document, stats) = Transcoder::new(&sink).transcode_with_stats(&message);

    if json {
        let resources: Vec<serde_json::Value> = document
            .resources
            .iter()
            .map(|r| {
                serde_json::json!({
                    "name": r.name,
                    "token": r.token,
                    "mime_type": r.mime_type,
                    "image": r.render_as_image,
                })
            })
            .collect();

        let output = serde_json::json!({
            "origin": raw.origin,
            "title": document.title,
            "author": document.author,
            "created": document.created.map(|d| d.to_rfc3339()),
            "message_id": message.message_id,
            "body": document.body,
            "resources": resources,
            "stats": {
                "text_parts": stats.text_parts,
                "inline_resources": stats.inline_resources,
                "attachments": stats.attachments,
                "skipped_parts": stats.skipped_parts,
                "failed_uploads": stats.failed_uploads,
            },
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        println!("# {}", document.title);
        println!();
        println!("{}", document.body);
    }

    Ok(())
}

/// List notebooks on the Joplin side.
fn cmd_folders(json: bool, config: &Config) -> anyhow::Result<()> {
    let client = JoplinClient::new(&config.joplin)?;
    let mut folders = client.folders()?;
    folders.sort_by_key(|f| f.title.to_lowercase());

    if json {
        println!("{}", serde_json::to_string_pretty(&folders)?);
        return Ok(());
    }

    println!();
    println!("  {} folder(s)", folders.len());
    println!();
    if folders.is_empty() {
        return Ok(());
    }

    println!("  {:<32}  {:<40}", "Id", "Title");
    println!("  {}", "-".repeat(74));
    for folder in &folders {
        let title: String = folder.title.chars().take(40).collect();
        println!("  {:<32}  {:<40}", folder.id, title);
    }
    println!();
    Ok(())
}

fn cmd_ping(config: &Config) -> anyhow::Result<()> {
    let base_url = config.joplin.base_url();
    JoplinClient::anonymous(&config.joplin)?
        .ping()
        .with_context(|| format!("Joplin clipper service is not reachable at {base_url}"))?;
    println!("  Joplin clipper service is running at {base_url}");
    Ok(())
}
