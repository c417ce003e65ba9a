//! Application configuration for digestmerge.
//!
//! User config lives at `~/.digestmerge/digestmerge.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{DigestError, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "digestmerge.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".digestmerge";

/// Section names rendered first, in this order, when present.
pub const DEFAULT_SECTION_PRIORITY: &[&str] = &[
    "TOP STORIES",
    "GENERAL",
    "MARKETS",
    "TECHNOLOGY",
    "STARTUPS",
    "FUNDING",
    "POLICY",
];

// ---------------------------------------------------------------------------
// Config structs (matching digestmerge.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Mailbox locations and compendium labels.
    #[serde(default)]
    pub defaults: DefaultsConfig,

    /// Mail submission command.
    #[serde(default)]
    pub transport: TransportConfig,

    /// Compendium section ordering.
    #[serde(default)]
    pub sections: SectionsConfig,

    /// Document selection filters.
    #[serde(default)]
    pub filters: FiltersConfig,
}

/// `[defaults]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultsConfig {
    /// Maildir holding the incoming digests.
    #[serde(default = "default_maildir")]
    pub maildir: String,

    /// Maildir processed digests are moved into.
    #[serde(default = "default_archive_dir")]
    pub archive_dir: String,

    /// Directory the compendium is written to when sending fails.
    #[serde(default = "default_fallback_dir")]
    pub fallback_dir: String,

    /// Compendium recipient address.
    #[serde(default)]
    pub recipient: String,

    /// `From:` address of the compendium. Empty means the recipient.
    #[serde(default)]
    pub sender: String,

    /// Subject line of the outgoing compendium.
    #[serde(default = "default_subject")]
    pub subject: String,

    /// Title line at the top of the compendium.
    #[serde(default = "default_title")]
    pub title: String,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            maildir: default_maildir(),
            archive_dir: default_archive_dir(),
            fallback_dir: default_fallback_dir(),
            recipient: String::new(),
            sender: String::new(),
            subject: default_subject(),
            title: default_title(),
        }
    }
}

fn default_maildir() -> String {
    "~/Mail/newsletters".into()
}
fn default_archive_dir() -> String {
    "~/Mail/newsletters-archive".into()
}
fn default_fallback_dir() -> String {
    "~/.digestmerge/outbox".into()
}
fn default_subject() -> String {
    "Newsletter compendium".into()
}
fn default_title() -> String {
    "NEWSLETTER COMPENDIUM".into()
}

/// `[transport]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportConfig {
    /// Program that accepts an RFC 822 message on stdin.
    #[serde(default = "default_command")]
    pub command: String,

    /// Arguments passed to the program.
    #[serde(default = "default_args")]
    pub args: Vec<String>,

    /// Upper bound for any collaborator call (list, send, archive).
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            command: default_command(),
            args: default_args(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_command() -> String {
    "msmtp".into()
}
fn default_args() -> Vec<String> {
    vec!["-t".into()]
}
fn default_timeout_secs() -> u64 {
    30
}

/// `[sections]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SectionsConfig {
    /// Section keys emitted first, in order.
    #[serde(default = "default_priority")]
    pub priority: Vec<String>,
}

impl Default for SectionsConfig {
    fn default() -> Self {
        Self {
            priority: default_priority(),
        }
    }
}

fn default_priority() -> Vec<String> {
    DEFAULT_SECTION_PRIORITY.iter().map(|s| s.to_string()).collect()
}

/// `[filters]` section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FiltersConfig {
    /// Sender substrings; a document is selected if its `From:` contains any.
    /// Empty selects every document in range.
    #[serde(default)]
    pub senders: Vec<String>,
}

// ---------------------------------------------------------------------------
// Run config (runtime, merged from config + CLI flags)
// ---------------------------------------------------------------------------

/// Runtime configuration for one pipeline run.
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Maildir holding the incoming digests.
    pub maildir: PathBuf,
    /// Maildir processed digests are moved into.
    pub archive_dir: PathBuf,
    /// Directory for the fallback copy of an undeliverable compendium.
    pub fallback_dir: PathBuf,
    /// Compendium recipient.
    pub recipient: String,
    /// `From:` address; empty means the recipient.
    pub sender: String,
    /// Outgoing subject line.
    pub subject: String,
    /// Compendium title line.
    pub title: String,
    /// Section priority list.
    pub priority: Vec<String>,
    /// Sender substrings used to select documents.
    pub senders: Vec<String>,
    /// Mail submission program.
    pub command: String,
    /// Mail submission arguments.
    pub args: Vec<String>,
    /// Bound on each collaborator call.
    pub timeout: Duration,
    /// Suppress both sending and archiving.
    pub dry_run: bool,
    /// Skip sending but still archive.
    pub skip_send: bool,
}

impl From<&AppConfig> for RunConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            maildir: expand_home(&config.defaults.maildir),
            archive_dir: expand_home(&config.defaults.archive_dir),
            fallback_dir: expand_home(&config.defaults.fallback_dir),
            recipient: config.defaults.recipient.clone(),
            sender: config.defaults.sender.clone(),
            subject: config.defaults.subject.clone(),
            title: config.defaults.title.clone(),
            priority: config.sections.priority.clone(),
            senders: config.filters.senders.clone(),
            command: config.transport.command.clone(),
            args: config.transport.args.clone(),
            timeout: Duration::from_secs(config.transport.timeout_secs),
            dry_run: false,
            skip_send: false,
        }
    }
}

impl RunConfig {
    /// Check that the settings needed by this run are present.
    pub fn validate(&self) -> Result<()> {
        if self.timeout.is_zero() {
            return Err(DigestError::config("transport.timeout_secs must be positive"));
        }
        if !self.dry_run && !self.skip_send && self.recipient.trim().is_empty() {
            return Err(DigestError::config(
                "no recipient configured. Set defaults.recipient or pass --to",
            ));
        }
        for (field, value) in [
            ("recipient", &self.recipient),
            ("sender", &self.sender),
            ("subject", &self.subject),
        ] {
            if value.contains(['\r', '\n']) {
                return Err(DigestError::config(format!("{field} must be a single line")));
            }
        }
        Ok(())
    }
}

/// Expand a leading `~/` to the user's home directory.
pub fn expand_home(path: &str) -> PathBuf {
    match path.strip_prefix("~/") {
        Some(rest) => match dirs::home_dir() {
            Some(home) => home.join(rest),
            None => PathBuf::from(path),
        },
        None => PathBuf::from(path),
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.digestmerge/`).
fn config_dir() -> Result<PathBuf> {
    let home =
        dirs::home_dir().ok_or_else(|| DigestError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.digestmerge/digestmerge.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config.
///
/// With an explicit path the file must exist. Without one the default
/// location is used, and a missing file there means defaults.
pub fn load_config(explicit: Option<&Path>) -> Result<AppConfig> {
    let path = match explicit {
        Some(path) => return read_config(path),
        None => config_file_path()?,
    };

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    read_config(&path)
}

fn read_config(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| DigestError::io(path, e))?;

    toml::from_str(&content)
        .map_err(|e| DigestError::config(format!("failed to parse {}: {e}", path.display())))
}

/// Write a default config file to `target`, or to the default location.
/// Parent directories are created. Returns the path written.
pub fn init_config(target: Option<&Path>) -> Result<PathBuf> {
    let path = match target {
        Some(path) => path.to_path_buf(),
        None => config_file_path()?,
    };
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir).map_err(|e| DigestError::io(dir, e))?;
    }

    let content = toml::to_string_pretty(&AppConfig::default())
        .map_err(|e| DigestError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| DigestError::io(&path, e))?;
    tracing::info!(?path, "wrote default config file");

    Ok(path)
}
