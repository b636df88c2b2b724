//! Configuration loading and root folder resolution
//!
//! Bootstrap settings come from a TOML file; the root folder, host and port can
//! be overridden per the usual priority order:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable
//! 3. TOML config file
//! 4. OS-dependent compiled default (fallback)

use crate::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable overriding the root folder
pub const ENV_ROOT_FOLDER: &str = "MOTILITY_ROOT_FOLDER";
/// Environment variable pointing at an explicit config file
pub const ENV_CONFIG: &str = "MOTILITY_CONFIG";

pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 5000;

/// Bootstrap configuration loaded from TOML
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TomlConfig {
    /// Folder holding `uploads/` and `sessions/`
    #[serde(default)]
    pub root_folder: Option<PathBuf>,

    #[serde(default)]
    pub host: Option<String>,

    #[serde(default)]
    pub port: Option<u16>,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub storage: StorageSection,

    #[serde(default)]
    pub workers: WorkerSection,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// `[storage]` table
#[derive(Debug, Clone, Deserialize)]
pub struct StorageSection {
    #[serde(default = "default_allowed_extensions")]
    pub allowed_extensions: Vec<String>,

    #[serde(default = "default_archive_extensions")]
    pub archive_extensions: Vec<String>,

    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,
}

impl Default for StorageSection {
    fn default() -> Self {
        Self {
            allowed_extensions: default_allowed_extensions(),
            archive_extensions: default_archive_extensions(),
            max_upload_bytes: default_max_upload_bytes(),
        }
    }
}

/// `[workers]` table
#[derive(Debug, Clone, Deserialize)]
pub struct WorkerSection {
    /// Interpreter used for analysis and plotting scripts
    #[serde(default = "default_interpreter")]
    pub interpreter: String,

    /// Directory containing the per-mode worker scripts
    #[serde(default = "default_scripts_dir")]
    pub scripts_dir: PathBuf,

    /// Plotting script used by the graph regenerator
    #[serde(default = "default_graph_script")]
    pub graph_script: PathBuf,

    /// Transcoding tool used for fast-start normalization
    #[serde(default = "default_transcoder")]
    pub transcoder: String,

    /// Per-job timeout in seconds (0 = none)
    #[serde(default)]
    pub timeout_secs: u64,

    /// Concurrent external jobs (0 = available parallelism)
    #[serde(default)]
    pub max_concurrent_jobs: usize,
}

impl Default for WorkerSection {
    fn default() -> Self {
        Self {
            interpreter: default_interpreter(),
            scripts_dir: default_scripts_dir(),
            graph_script: default_graph_script(),
            transcoder: default_transcoder(),
            timeout_secs: 0,
            max_concurrent_jobs: 0,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_allowed_extensions() -> Vec<String> {
    ["lsm", "mp4", "webm", "ogg"].iter().map(|s| s.to_string()).collect()
}

fn default_archive_extensions() -> Vec<String> {
    ["mp4", "csv", "png"].iter().map(|s| s.to_string()).collect()
}

fn default_max_upload_bytes() -> usize {
    2 * 1024 * 1024 * 1024
}

fn default_interpreter() -> String {
    "python".to_string()
}

fn default_scripts_dir() -> PathBuf {
    PathBuf::from("server")
}

fn default_graph_script() -> PathBuf {
    PathBuf::from("python_code").join("graph_of_sperm_tracks.py")
}

fn default_transcoder() -> String {
    "ffmpeg".to_string()
}

/// Storage roots and file-type gates handed to every component
#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// Raw uploads, never mutated after ingest
    pub uploads_root: PathBuf,
    /// One directory per session
    pub sessions_root: PathBuf,
    /// Accepted upload extensions (lowercase, no dot)
    pub allowed_extensions: Vec<String>,
    /// Extensions bundled into the results archive (lowercase, no dot)
    pub archive_extensions: Vec<String>,
    pub max_upload_bytes: usize,
}

impl StorageConfig {
    /// Lay out `uploads/` and `sessions/` under a root folder
    pub fn from_root(root: &Path, section: &StorageSection) -> Self {
        Self {
            uploads_root: root.join("uploads"),
            sessions_root: root.join("sessions"),
            allowed_extensions: normalize_extensions(&section.allowed_extensions),
            archive_extensions: normalize_extensions(&section.archive_extensions),
            max_upload_bytes: section.max_upload_bytes,
        }
    }

    /// Create both storage roots if missing
    pub fn ensure_directories(&self) -> Result<()> {
        for dir in [&self.uploads_root, &self.sessions_root] {
            std::fs::create_dir_all(dir).map_err(|e| {
                Error::Config(format!("Cannot create {}: {}", dir.display(), e))
            })?;
        }
        Ok(())
    }

    /// Whether an uploaded file name carries an accepted extension
    pub fn is_allowed_upload(&self, file_name: &str) -> bool {
        has_extension_in(file_name, &self.allowed_extensions)
    }

    /// Whether a session file belongs in the results archive
    pub fn is_archivable(&self, file_name: &str) -> bool {
        has_extension_in(file_name, &self.archive_extensions)
    }
}

/// External worker invocation settings
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub interpreter: String,
    pub scripts_dir: PathBuf,
    pub graph_script: PathBuf,
    pub transcoder: String,
    pub timeout: Option<Duration>,
    pub max_concurrent_jobs: usize,
}

impl From<&WorkerSection> for WorkerConfig {
    fn from(section: &WorkerSection) -> Self {
        let max_concurrent_jobs = if section.max_concurrent_jobs == 0 {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        } else {
            section.max_concurrent_jobs
        };

        Self {
            interpreter: section.interpreter.clone(),
            scripts_dir: section.scripts_dir.clone(),
            graph_script: section.graph_script.clone(),
            transcoder: section.transcoder.clone(),
            timeout: crate::time::secs_to_timeout(section.timeout_secs),
            max_concurrent_jobs,
        }
    }
}

fn normalize_extensions(extensions: &[String]) -> Vec<String> {
    extensions
        .iter()
        .map(|ext| ext.trim().trim_start_matches('.').to_ascii_lowercase())
        .filter(|ext| !ext.is_empty())
        .collect()
}

/// Case-insensitive suffix check; does not look at file contents
pub fn has_extension_in(file_name: &str, extensions: &[String]) -> bool {
    Path::new(file_name)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            let ext = ext.to_ascii_lowercase();
            extensions.iter().any(|allowed| *allowed == ext)
        })
        .unwrap_or(false)
}

/// Load the TOML config
///
/// An explicit path (CLI or `MOTILITY_CONFIG`) must exist. Without one, the
/// platform config file is used if present, otherwise compiled defaults.
pub fn load_toml_config(explicit: Option<&Path>) -> Result<TomlConfig> {
    let env_path = std::env::var_os(ENV_CONFIG).map(PathBuf::from);
    let path = match explicit.map(Path::to_path_buf).or(env_path) {
        Some(path) => {
            if !path.exists() {
                return Err(Error::Config(format!(
                    "Config file not found: {}",
                    path.display()
                )));
            }
            path
        }
        None => match default_config_path() {
            Some(path) if path.exists() => path,
            _ => {
                tracing::warn!("No config file found, using built-in defaults");
                return Ok(TomlConfig::default());
            }
        },
    };

    let content = std::fs::read_to_string(&path)
        .map_err(|e| Error::Config(format!("Read {} failed: {}", path.display(), e)))?;
    let config = parse_toml_config(&content)?;
    tracing::info!(path = %path.display(), "Loaded config file");
    Ok(config)
}

/// Parse config text
pub fn parse_toml_config(content: &str) -> Result<TomlConfig> {
    toml::from_str(content).map_err(|e| Error::Config(format!("Parse TOML failed: {}", e)))
}

/// Platform config file location: `<config_dir>/motility/config.toml`
fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("motility").join("config.toml"))
}

/// Resolve the root folder following the priority order in the module docs
pub fn resolve_root_folder(cli_arg: Option<&Path>, toml: &TomlConfig) -> PathBuf {
    // Priority 1: Command-line argument
    if let Some(path) = cli_arg {
        return path.to_path_buf();
    }

    // Priority 2: Environment variable
    if let Some(path) = std::env::var_os(ENV_ROOT_FOLDER) {
        if !path.is_empty() {
            return PathBuf::from(path);
        }
    }

    // Priority 3: TOML config file
    if let Some(path) = &toml.root_folder {
        return path.clone();
    }

    // Priority 4: OS-dependent compiled default
    get_default_root_folder()
}

/// Get OS-dependent default root folder path
fn get_default_root_folder() -> PathBuf {
    if cfg!(target_os = "linux") {
        // ~/.local/share/motility (or /var/lib/motility for system-wide)
        dirs::data_local_dir()
            .map(|d| d.join("motility"))
            .unwrap_or_else(|| PathBuf::from("/var/lib/motility"))
    } else if cfg!(target_os = "macos") {
        dirs::data_dir()
            .map(|d| d.join("motility"))
            .unwrap_or_else(|| PathBuf::from("/Library/Application Support/motility"))
    } else if cfg!(target_os = "windows") {
        dirs::data_local_dir()
            .map(|d| d.join("motility"))
            .unwrap_or_else(|| PathBuf::from("C:\\ProgramData\\motility"))
    } else {
        PathBuf::from("./motility_data")
    }
}
