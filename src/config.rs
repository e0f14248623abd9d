//! ==============================================================================
//! config.rs - dashboard client configuration loader
//! ==============================================================================
//!
//! ```text
//! purpose:
//!     defines the schema for `airplug.toml`.
//!     loads configuration from file or falls back to defaults.
//!
//! structure:
//!     - ApiConfig: base url of the protected backend.
//!     - AuthConfig: cognito region / app client (and an optional endpoint).
//!     - SessionConfig: where the session credential is kept between runs.
//!     - UserConfig: user id the list / map commands act for.
//!     - LoggingConfig: default log filter when RUST_LOG is unset.
//! ```
//!
//! ==============================================================================

use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Root configuration structure
#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct DashboardConfig {
    pub api: ApiConfig,
    pub auth: AuthConfig,
    pub session: SessionConfig,
    pub user: UserConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ApiConfig {
    pub base_url: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct AuthConfig {
    pub region: String,
    pub client_id: String,
    pub endpoint: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct SessionConfig {
    pub token_file: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct UserConfig {
    pub id: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self { base_url: "http://localhost:3000".to_string() }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            region: "us-east-1".to_string(),
            client_id: String::new(),
            endpoint: None,
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self { token_file: PathBuf::from(".airplug-session.json") }
    }
}

impl Default for UserConfig {
    fn default() -> Self {
        Self { id: "qingping_shared".to_string() }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: "info".to_string() }
    }
}

/// outcome of config discovery. tracing is not up yet while this runs, so
/// anything worth logging is carried back to the caller.
#[derive(Debug)]
pub struct LoadedConfig {
    pub config: DashboardConfig,
    pub source: Option<PathBuf>,
    pub warnings: Vec<String>,
}

impl DashboardConfig {
    /// Load configuration from file
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| anyhow::anyhow!("Failed to read config file: {}", e))?;

        let config: DashboardConfig = toml::from_str(&content)
            .map_err(|e| anyhow::anyhow!("Failed to parse config: {}", e))?;

        Ok(config)
    }

    /// Load an explicit file, or search the usual places with default fallback.
    /// an explicit path that fails to load is an error; a discovered one is skipped.
    pub fn load_or_default(explicit: Option<&Path>) -> anyhow::Result<LoadedConfig> {
        if let Some(path) = explicit {
            let config = Self::load(path)?;
            return Ok(LoadedConfig { config, source: Some(path.to_path_buf()), warnings: Vec::new() });
        }

        let paths = [
            PathBuf::from("config").join("airplug.toml"),
            PathBuf::from("..").join("config").join("airplug.toml"),
        ];

        let mut warnings = Vec::new();
        for path in &paths {
            if path.exists() {
                match Self::load(path) {
                    Ok(config) => {
                        return Ok(LoadedConfig { config, source: Some(path.clone()), warnings });
                    }
                    Err(e) => {
                        warnings.push(format!("Failed to load {}: {}", path.display(), e));
                    }
                }
            }
        }

        Ok(LoadedConfig { config: Self::default(), source: None, warnings })
    }

    /// Print configuration summary
    pub fn print_summary(&self) {
        println!("┌─────────────────────────────────────────┐");
        println!("│          AIRPLUG CONFIGURATION          │");
        println!("├─────────────────────────────────────────┤");
        println!("│ API: {}", self.api.base_url);
        println!("│ Cognito Region: {}", self.auth.region);
        println!("│ Cognito Client: {}", if self.auth.client_id.is_empty() { "(unset)" } else { self.auth.client_id.as_str() });
        if let Some(endpoint) = &self.auth.endpoint {
            println!("│ Cognito Endpoint: {}", endpoint);
        }
        println!("│ Session File: {}", self.session.token_file.display());
        println!("│ User ID: {}", self.user.id);
        println!("│ Log Level: {}", self.logging.level);
        println!("└─────────────────────────────────────────┘");
    }
}
