use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use serde::Deserialize;

#[derive(Parser)]
#[command(name = "runbox", version = "0.1", about, long_about = None)]
pub struct CliArgs {
    /// Path to the configuration file
    #[arg(long = "config", short = 'c')]
    pub config_path: Option<String>,

    /// Whether to flush the existing history database
    #[arg(long = "flush-data", short = 'f', default_value_t = false)]
    pub flush_data: bool,

    /// Address to bind, overrides the configuration file
    #[arg(long = "bind-address")]
    pub bind_address: Option<String>,

    /// Port to bind, overrides the configuration file
    #[arg(long = "bind-port")]
    pub bind_port: Option<u16>,
}

impl CliArgs {
    /// Load the configuration from the specified file, falling back to defaults
    pub fn to_config(&self) -> std::io::Result<Config> {
        let mut config = match &self.config_path {
            Some(path) => {
                let file = std::fs::File::open(path)?;
                let reader = std::io::BufReader::new(file);
                serde_json::from_reader(reader)?
            }
            None => Config::default(),
        };

        if let Some(address) = &self.bind_address {
            config.server.bind_address = Some(address.clone());
        }
        if let Some(port) = self.bind_port {
            config.server.bind_port = Some(port);
        }

        Ok(config)
    }
}

#[derive(Deserialize, Debug, Default)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub engine: EngineConfig,
}

#[derive(Deserialize, Debug, Default)]
pub struct ServerConfig {
    pub bind_address: Option<String>,
    pub bind_port: Option<u16>,
    pub max_concurrent_jobs: Option<usize>,
}

impl ServerConfig {
    pub const DEFAULT_ADDRESS: &'static str = "127.0.0.1";
    pub const DEFAULT_PORT: u16 = 5000;
    pub const DEFAULT_CONCURRENT_JOBS: usize = 4;
}

#[derive(Deserialize, Debug, Default, Clone)]
#[serde(default)]
pub struct EngineConfig {
    /// Parent directory of per-request workspaces; OS temp dir when absent
    pub workspace_root: Option<PathBuf>,
    pub limits: Limits,
    pub toolchains: Toolchains,
}

impl EngineConfig {
    pub fn workspace_root(&self) -> PathBuf {
        self.workspace_root
            .clone()
            .unwrap_or_else(|| std::env::temp_dir().join("runbox"))
    }
}

#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct MilliSecond(pub u64);

impl From<MilliSecond> for Duration {
    fn from(value: MilliSecond) -> Self {
        Duration::from_millis(value.0)
    }
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct Limits {
    /// Wall time for a single-file compile
    pub compile_timeout_ms: MilliSecond,
    /// Wall time for a cargo project build, dependency resolution included
    pub project_build_timeout_ms: MilliSecond,
    pub run_timeout_ms: MilliSecond,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            compile_timeout_ms: MilliSecond(30_000),
            project_build_timeout_ms: MilliSecond(300_000),
            run_timeout_ms: MilliSecond(5_000),
        }
    }
}

/// Programs invoked for each language
#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct Toolchains {
    pub python: String,
    pub c: String,
    pub cpp: String,
    pub rustc: String,
    pub cargo: String,
    pub rust_edition: String,
}

impl Default for Toolchains {
    fn default() -> Self {
        Self {
            python: "python3".to_string(),
            c: "gcc".to_string(),
            cpp: "g++".to_string(),
            rustc: "rustc".to_string(),
            cargo: "cargo".to_string(),
            rust_edition: "2021".to_string(),
        }
    }
}
