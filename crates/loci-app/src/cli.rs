//! CLI argument definitions for the Loci server.
//!
//! Uses `clap` with derive macros. Priority resolution: CLI args > env
//! vars > config file > defaults.

use clap::Parser;
use std::path::PathBuf;

/// Loci, a multi-tenant personal-knowledge-management backend.
#[derive(Parser, Debug)]
#[command(name = "loci", version, about)]
pub struct CliArgs {
    /// Path to the configuration file.
    #[arg(short = 'c', long = "config")]
    pub config: Option<PathBuf>,

    /// API server port.
    #[arg(short = 'p', long = "port")]
    pub port: Option<u16>,

    /// Data directory for the SQLite database and the API token.
    #[arg(short = 'd', long = "data-dir")]
    pub data_dir: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short = 'l', long = "log-level")]
    pub log_level: Option<String>,
}

impl CliArgs {
    /// Resolve the configuration file path.
    ///
    /// Priority: --config flag > LOCI_CONFIG env var > ~/.loci/config.toml.
    pub fn resolve_config_path(&self) -> PathBuf {
        if let Some(ref p) = self.config {
            return p.clone();
        }
        if let Ok(p) = std::env::var("LOCI_CONFIG") {
            return PathBuf::from(p);
        }
        default_data_dir().join("config.toml")
    }

    /// Resolve the API server port.
    ///
    /// Priority: --port flag > LOCI_PORT env var > config file value.
    pub fn resolve_port(&self, config_port: u16) -> u16 {
        if let Some(p) = self.port {
            return p;
        }
        if let Ok(val) = std::env::var("LOCI_PORT") {
            if let Ok(p) = val.parse::<u16>() {
                return p;
            }
        }
        config_port
    }

    /// Resolve the data directory.
    pub fn resolve_data_dir(&self, config_dir: &str) -> PathBuf {
        if let Some(ref d) = self.data_dir {
            return d.clone();
        }
        if let Ok(d) = std::env::var("LOCI_DATA_DIR") {
            return PathBuf::from(d);
        }
        expand_home(config_dir)
    }
}

/// Default data directory: ~/.loci (falls back to the current dir).
pub fn default_data_dir() -> PathBuf {
    std::env::var("HOME")
        .map(|home| PathBuf::from(home).join(".loci"))
        .unwrap_or_else(|_| PathBuf::from(".loci"))
}

fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Ok(home) = std::env::var("HOME") {
            return PathBuf::from(home).join(rest);
        }
    }
    PathBuf::from(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flag_beats_config_port() {
        let args = CliArgs {
            config: None,
            port: Some(9000),
            data_dir: None,
            log_level: None,
        };
        assert_eq!(args.resolve_port(3050), 9000);
    }

    #[test]
    fn test_config_port_without_flag() {
        let args = CliArgs {
            config: None,
            port: None,
            data_dir: None,
            log_level: None,
        };
        assert_eq!(args.resolve_port(3050), 3050);
    }

    #[test]
    fn test_explicit_config_path() {
        let args = CliArgs {
            config: Some(PathBuf::from("/etc/loci.toml")),
            port: None,
            data_dir: None,
            log_level: None,
        };
        assert_eq!(args.resolve_config_path(), PathBuf::from("/etc/loci.toml"));
    }
}
