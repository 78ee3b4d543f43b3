use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub general: GeneralConfig,

    pub server: ServerConfig,

    pub transfer: TransferConfig,

    pub inspect: InspectConfig,

    pub security: SecurityConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    pub database_path: String,

    pub log_level: String,

    /// Root under which per-request batch directories are created.
    pub staging_path: String,

    /// Number of tokio worker threads (default: 2)
    /// Set to 0 to use the number of CPU cores
    pub worker_threads: usize,

    /// Maximum database connections (default: 5)
    pub max_db_connections: u32,

    /// Minimum database connections (default: 1)
    pub min_db_connections: u32,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            database_path: "sqlite:data/dcmrelay.db".to_string(),
            log_level: "info".to_string(),
            staging_path: "./staging".to_string(),
            worker_threads: 2,
            max_db_connections: 5,
            min_db_connections: 1,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub port: u16,

    pub cors_allowed_origins: Vec<String>,

    /// Whether to set the Secure flag on session cookies.
    /// Default: true for production safety. Set to false for local development without HTTPS.
    pub secure_cookies: bool,

    /// Session inactivity expiry in minutes.
    pub session_expiry_minutes: i64,

    /// Request body cap for the upload and analyze routes, in bytes.
    /// DICOM batches run large; the default allows 512 MiB per request.
    pub max_upload_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 5050,
            cors_allowed_origins: vec![
                "http://localhost:5050".to_string(),
                "http://127.0.0.1:5050".to_string(),
            ],
            secure_cookies: true,
            session_expiry_minutes: 60,
            max_upload_bytes: 512 * 1024 * 1024,
        }
    }
}

/// Settings for the external `dcmsend` transfer tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransferConfig {
    /// Absolute path to the dcmsend executable.
    pub dcmsend_path: String,

    /// Calling application entity title (sender).
    pub calling_aet: String,

    /// Called application entity title (receiver).
    pub called_aet: String,

    pub host: String,

    pub port: u16,

    /// The transfer is aborted and reported as failed once this expires.
    pub timeout_seconds: u64,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            dcmsend_path: "/usr/bin/dcmsend".to_string(),
            calling_aet: "SENDER".to_string(),
            called_aet: "DCM4CHEE".to_string(),
            host: "127.0.0.1".to_string(),
            port: 11112,
            timeout_seconds: 300,
        }
    }
}

/// Settings for the external `dcmdump` inspection tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InspectConfig {
    /// Absolute path to the dcmdump executable.
    pub dcmdump_path: String,

    /// DICOM header fields extracted by the probe, one tool run per field.
    pub fields: Vec<String>,

    pub timeout_seconds: u64,
}

impl Default for InspectConfig {
    fn default() -> Self {
        Self {
            dcmdump_path: "/usr/bin/dcmdump".to_string(),
            fields: vec![
                "PatientName".to_string(),
                "PatientID".to_string(),
                "StudyDate".to_string(),
                "Modality".to_string(),
                "StudyDescription".to_string(),
            ],
            timeout_seconds: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// Argon2 memory cost in KiB (default: 8192 = 8MB)
    pub argon2_memory_cost_kib: u32,

    /// Argon2 time cost (iterations)
    pub argon2_time_cost: u32,

    /// Argon2 parallelism (default: 1)
    pub argon2_parallelism: u32,

    /// Minimum accepted password length for create/change/reset.
    pub min_password_length: usize,

    /// Password for the admin account created when the users table is empty.
    /// Never shipped with a default: it must come from config.toml or the
    /// DCMRELAY_ADMIN_PASSWORD environment variable, and startup fails without
    /// it on an empty database.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bootstrap_admin_password: Option<String>,

    /// Email recorded on the bootstrap admin account.
    pub bootstrap_admin_email: String,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            argon2_memory_cost_kib: 8192,
            argon2_time_cost: 3,
            argon2_parallelism: 1,
            min_password_length: 6,
            bootstrap_admin_password: None,
            bootstrap_admin_email: "admin@localhost".to_string(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            general: GeneralConfig::default(),
            server: ServerConfig::default(),
            transfer: TransferConfig::default(),
            inspect: InspectConfig::default(),
            security: SecurityConfig::default(),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let paths = Self::config_paths();

        for path in &paths {
            if path.exists() {
                info!("Loading config from: {}", path.display());
                let mut config = Self::load_from_path(path)?;
                config.apply_env_overrides();
                return Ok(config);
            }
        }

        info!("No config file found, using defaults");
        let mut config = Self::default();
        config.apply_env_overrides();
        Ok(config)
    }

    pub fn load_from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Secrets may be supplied through the environment instead of config.toml.
    fn apply_env_overrides(&mut self) {
        if let Ok(password) = std::env::var("DCMRELAY_ADMIN_PASSWORD")
            && !password.is_empty()
        {
            self.security.bootstrap_admin_password = Some(password);
        }
    }

    fn config_paths() -> Vec<PathBuf> {
        let mut paths = vec![PathBuf::from("config.toml")];

        if let Some(config_dir) = dirs::config_dir() {
            paths.push(config_dir.join("dcmrelay").join("config.toml"));
        }

        if let Some(home) = dirs::home_dir() {
            paths.push(home.join(".dcmrelay").join("config.toml"));
        }

        paths
    }

    pub fn validate(&self) -> Result<()> {
        if self.transfer.dcmsend_path.is_empty() {
            anyhow::bail!("transfer.dcmsend_path cannot be empty");
        }

        if self.transfer.host.is_empty() {
            anyhow::bail!("transfer.host cannot be empty");
        }

        if self.inspect.dcmdump_path.is_empty() {
            anyhow::bail!("inspect.dcmdump_path cannot be empty");
        }

        if self.inspect.fields.is_empty() {
            anyhow::bail!("inspect.fields cannot be empty");
        }

        if self.transfer.timeout_seconds == 0 || self.inspect.timeout_seconds == 0 {
            anyhow::bail!("Tool timeouts must be > 0");
        }

        if self.security.min_password_length == 0 {
            anyhow::bail!("security.min_password_length must be > 0");
        }

        if self.server.max_upload_bytes == 0 {
            anyhow::bail!("server.max_upload_bytes must be > 0");
        }

        Ok(())
    }
}
