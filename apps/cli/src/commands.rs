//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use digestmerge_core::pipeline::{self, Delivery, ProgressReporter, RunReport};
use digestmerge_mailbox::{CommandSink, MaildirArchiver, MaildirSource};
use digestmerge_shared::{
    AppConfig, DateRange, Document, DocumentMeta, RunConfig, config_file_path, init_config,
    load_config,
};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// digestmerge: one deduplicated compendium from many newsletter digests.
#[derive(Parser)]
#[command(
    name = "digestmerge",
    version,
    about = "Merge newsletter digests into a single deduplicated compendium.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Config file to use instead of ~/.digestmerge/digestmerge.toml.
    #[arg(long, global = true, env = "DIGESTMERGE_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Build, send, and archive the compendium for a date range.
    Run {
        /// Date range: START..END with YYYY-MM-DD, today, yesterday, or Nd bounds.
        #[arg(short, long, default_value = "yesterday..today")]
        range: String,

        /// Print the compendium instead of sending; archive nothing.
        #[arg(long)]
        dry_run: bool,

        /// Skip sending but still archive the processed digests.
        #[arg(long, conflicts_with = "dry_run")]
        no_send: bool,

        /// Maildir to read from (overrides config).
        #[arg(long)]
        maildir: Option<String>,

        /// Recipient address (overrides config).
        #[arg(long)]
        to: Option<String>,

        /// Print the run statistics as JSON.
        #[arg(long)]
        stats_json: bool,
    },

    /// Show how a single message is segmented.
    Inspect {
        /// Path to a raw message file.
        file: PathBuf,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags. Logs go to stderr so the
/// compendium can be piped from stdout.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "digestmerge=info",
        1 => "digestmerge=debug",
        _ => "digestmerge=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .with_target(false)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    let config_path = cli.config.as_deref();
    match cli.command {
        Command::Run {
            range,
            dry_run,
            no_send,
            maildir,
            to,
            stats_json,
        } => {
            let overrides = RunOverrides {
                maildir,
                to,
                dry_run,
                no_send,
            };
            cmd_run(config_path, &range, overrides, stats_json).await
        }
        Command::Inspect { file } => cmd_inspect(&file).await,
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init(config_path).await,
            ConfigAction::Show => cmd_config_show(config_path).await,
        },
    }
}

/// CLI flags layered over the config file.
struct RunOverrides {
    maildir: Option<String>,
    to: Option<String>,
    dry_run: bool,
    no_send: bool,
}

impl RunOverrides {
    fn apply(self, config: &mut RunConfig) {
        if let Some(dir) = self.maildir {
            config.maildir = digestmerge_shared::expand_home(&dir);
        }
        if let Some(to) = self.to {
            config.recipient = to;
        }
        config.dry_run = self.dry_run;
        config.skip_send = self.no_send;
    }
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

async fn cmd_run(
    config_path: Option<&Path>,
    range: &str,
    overrides: RunOverrides,
    stats_json: bool,
) -> Result<()> {
    let app = load_config(config_path)?;
    let mut config = RunConfig::from(&app);
    overrides.apply(&mut config);
    config.validate()?;

    let selector: DateRange = range.parse()?;

    let source = MaildirSource::new(&config.maildir, config.senders.clone());
    let sink = CommandSink::new(config.command.clone(), config.args.clone(), config.timeout)
        .with_sender(config.sender.clone());
    let mover = MaildirArchiver::new(&config.archive_dir);

    info!(
        range = %selector,
        maildir = %config.maildir.display(),
        dry_run = config.dry_run,
        "starting digest run"
    );

    let reporter = CliProgress::new();
    let report = pipeline::run_digest(&config, &selector, &source, &sink, &mover, &reporter).await?;

    if config.dry_run {
        if let Some(text) = &report.compendium {
            println!("{text}");
        }
    }

    print_summary(&report);

    if stats_json {
        println!("{}", serde_json::to_string_pretty(&report.stats)?);
    }

    Ok(())
}

fn print_summary(report: &RunReport) {
    let stats = &report.stats;
    println!();
    match &report.delivery {
        Delivery::NotAttempted => println!("  No digests to merge."),
        Delivery::DryRun => println!("  Dry run: nothing sent or archived."),
        Delivery::Skipped => println!("  Compendium built; sending skipped."),
        Delivery::Sent => println!("  Compendium sent."),
        Delivery::Fallback { path, error } => {
            println!("  Sending failed: {error}");
            println!("  Compendium saved to {}", path.display());
        }
    }
    println!("  Emails:     {}", stats.total_emails);
    println!("  Paragraphs: {}", stats.total_paragraphs);
    println!("  Unique:     {}", stats.unique_paragraphs);
    println!("  Duplicates: {}", stats.duplicate_paragraphs);
    println!("  Dup. rate:  {:.1}%", stats.duplicate_rate());
    if !report.skipped.is_empty() {
        println!("  Skipped:    {} malformed", report.skipped.len());
    }
    if report.archived + report.archive_failures > 0 {
        println!(
            "  Archived:   {} ({} failed)",
            report.archived, report.archive_failures
        );
    }
    println!("  Time:       {:.1}s", report.elapsed.as_secs_f64());
    println!();
}

async fn cmd_inspect(file: &Path) -> Result<()> {
    let bytes = std::fs::read(file).map_err(|e| eyre!("cannot read '{}': {e}", file.display()))?;
    let source_id = file.to_string_lossy().to_string();
    let document = Document {
        raw_body: digestmerge_text::decode_text(&bytes, &source_id),
        meta: DocumentMeta {
            received_at: chrono::Utc::now(),
            source_id,
        },
    };

    let sections = pipeline::document_sections(&document)?;
    if sections.is_empty() {
        println!("(no sections)");
    }

    for (path, paragraphs) in &sections {
        println!("{path}  [{} paragraphs]", paragraphs.len());
        for paragraph in paragraphs {
            println!("    - {}", preview(paragraph, 72));
        }
    }

    Ok(())
}

/// First `max` characters of a paragraph on one line.
fn preview(paragraph: &str, max: usize) -> String {
    let flat = paragraph.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() <= max {
        flat
    } else {
        let cut: String = flat.chars().take(max).collect();
        format!("{cut}…")
    }
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif spinner.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]);
        spinner.set_style(style);
        spinner.enable_steady_tick(std::time::Duration::from_millis(80));
        Self { spinner }
    }
}

impl ProgressReporter for CliProgress {
    fn phase(&self, name: &str) {
        self.spinner.set_message(name.to_string());
    }

    fn document_processed(&self, source_id: &str, current: usize, total: usize) {
        self.spinner
            .set_message(format!("Merging [{current}/{total}] {source_id}"));
    }

    fn done(&self, _report: &RunReport) {
        self.spinner.finish_and_clear();
    }
}

async fn cmd_config_init(config_path: Option<&Path>) -> Result<()> {
    let path = init_config(config_path)?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

async fn cmd_config_show(config_path: Option<&Path>) -> Result<()> {
    let source = match config_path {
        Some(path) => path.to_path_buf(),
        None => config_file_path()?,
    };
    let config: AppConfig = load_config(config_path)?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("# {}", source.display());
    println!("{toml_str}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_parses_run_flags() {
        let cli = Cli::try_parse_from([
            "digestmerge",
            "run",
            "--range",
            "7d..today",
            "--dry-run",
            "--to",
            "me@example.com",
        ])
        .unwrap();
        match cli.command {
            Command::Run {
                range, dry_run, to, ..
            } => {
                assert_eq!(range, "7d..today");
                assert!(dry_run);
                assert_eq!(to.as_deref(), Some("me@example.com"));
            }
            _ => panic!("expected run"),
        }
    }

    #[test]
    fn config_flag_is_global() {
        let cli =
            Cli::try_parse_from(["digestmerge", "config", "show", "--config", "/etc/dm.toml"])
                .unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("/etc/dm.toml")));
    }

    #[test]
    fn dry_run_and_no_send_conflict() {
        let parsed = Cli::try_parse_from(["digestmerge", "run", "--dry-run", "--no-send"]);
        assert!(parsed.is_err());
    }

    #[test]
    fn overrides_replace_config_values() {
        let mut config = RunConfig::from(&AppConfig::default());
        RunOverrides {
            maildir: Some("/srv/mail".into()),
            to: Some("team@example.com".into()),
            dry_run: false,
            no_send: true,
        }
        .apply(&mut config);
        assert_eq!(config.maildir, PathBuf::from("/srv/mail"));
        assert_eq!(config.recipient, "team@example.com");
        assert!(config.skip_send);
    }

    #[test]
    fn preview_truncates_on_char_boundary() {
        assert_eq!(preview("short\ntext", 72), "short text");
        assert_eq!(preview("ééééé", 3), "ééé…");
    }
}
