//! command line surface: global flags + one subcommand per dashboard action

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use airplug::domain::normalize_sensor_mac;
use airplug::DashboardConfig;

#[derive(Parser, Debug)]
#[command(name = "airplug", version, about = "Manage air-quality sensor to smart-plug automation")]
pub struct Cli {
    /// config file (default: config/airplug.toml, then ../config/airplug.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// base url of the dashboard backend
    #[arg(long, global = true, env = "API_BASE_URL")]
    pub api_base_url: Option<String>,

    /// cognito app client id
    #[arg(long, global = true, env = "COGNITO_CLIENT_ID")]
    pub client_id: Option<String>,

    /// cognito region
    #[arg(long, global = true, env = "COGNITO_REGION")]
    pub region: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Sign in and keep the session for later commands
    Login {
        #[arg(long)]
        email: String,
        #[arg(long, env = "AIRPLUG_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// Forget the stored session
    Logout,
    /// List smart plugs
    Plugs,
    /// List sensors bound to the user
    Sensors {
        #[arg(long)]
        user: Option<String>,
    },
    /// List sensor -> plug mappings
    Mappings {
        #[arg(long)]
        user: Option<String>,
    },
    /// Create or update the mapping for a sensor
    Map {
        #[arg(long, value_parser = parse_sensor_mac)]
        sensor: String,
        #[arg(long)]
        plug: String,
        /// save the mapping with automation switched off
        #[arg(long)]
        disabled: bool,
        #[arg(long)]
        user: Option<String>,
    },
    /// Delete the mapping for a sensor
    Unmap {
        #[arg(long, value_parser = parse_sensor_mac)]
        sensor: String,
    },
    /// Switch a sensor's automation on or off
    Toggle {
        #[arg(long, value_parser = parse_sensor_mac)]
        sensor: String,
        #[arg(long)]
        user: Option<String>,
    },
    /// Download historical readings as CSV
    Download {
        #[arg(long, value_parser = parse_sensor_mac)]
        sensor: String,
        /// epoch seconds, YYYY-MM-DD or ISO-8601
        #[arg(long)]
        start: String,
        #[arg(long)]
        end: String,
        /// output path (default: the filename the backend suggests)
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Show the effective configuration
    Config,
}

impl Cli {
    /// flags and env vars win over the config file
    pub fn apply_to(&self, config: &mut DashboardConfig) {
        if let Some(url) = &self.api_base_url {
            config.api.base_url = url.clone();
        }
        if let Some(client_id) = &self.client_id {
            config.auth.client_id = client_id.clone();
        }
        if let Some(region) = &self.region {
            config.auth.region = region.clone();
        }
    }
}

fn parse_sensor_mac(raw: &str) -> Result<String, String> {
    let mac = normalize_sensor_mac(raw);
    if mac.is_empty() {
        return Err("sensor mac must not be empty".to_string());
    }
    Ok(mac)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn sensor_argument_is_normalized() {
        let cli = Cli::try_parse_from(["airplug", "unmap", "--sensor", "aa:11"]).unwrap();
        match cli.command {
            Command::Unmap { sensor } => assert_eq!(sensor, "AA11"),
            other => panic!("parsed {other:?}"),
        }
    }

    #[test]
    fn empty_sensor_is_rejected() {
        assert!(Cli::try_parse_from(["airplug", "toggle", "--sensor", " - "]).is_err());
    }

    #[test]
    fn flags_override_config() {
        let cli = Cli::try_parse_from([
            "airplug",
            "--api-base-url",
            "http://127.0.0.1:9",
            "--client-id",
            "abc",
            "plugs",
        ])
        .unwrap();
        let mut config = DashboardConfig::default();
        cli.apply_to(&mut config);
        assert_eq!(config.api.base_url, "http://127.0.0.1:9");
        assert_eq!(config.auth.client_id, "abc");
        assert_eq!(config.auth.region, "us-east-1");
    }
}
