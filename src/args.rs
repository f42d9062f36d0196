//! Command-line arguments for the `oppy` binary.

use crate::config::{expand_home, Overrides, DEFAULT_CONFIG_PATH};
use clap::Parser;
use std::path::PathBuf;

/// Environment variable that overrides the `op` binary.
pub const OP_PATH_ENV: &str = "OPPY_OP_PATH";

#[derive(Parser, Debug, Clone)]
#[command(name = "oppy", version, about = "Interactive shell for the 1Password CLI", long_about = None)]
pub struct CliArgs {
    /// Profile section to load from the config file
    pub profile: String,

    /// Path to the INI config file
    #[arg(short = 'c', long, default_value = DEFAULT_CONFIG_PATH)]
    pub config: String,

    /// Enable debug logging regardless of the profile
    #[arg(short = 'd', long)]
    pub debug: bool,

    /// Vault to use instead of the profile's
    #[arg(long)]
    pub vault: Option<String>,

    /// The `op` binary to run
    #[arg(long, env = OP_PATH_ENV)]
    pub op_path: Option<String>,
}

impl CliArgs {
    /// Config path with `~` expanded.
    pub fn config_path(&self) -> PathBuf {
        expand_home(&self.config)
    }

    /// Values that take precedence over the profile.
    pub fn overrides(&self) -> Overrides {
        Overrides {
            vault: self.vault.clone(),
            debug: self.debug,
            op_path: self.op_path.clone(),
        }
    }
}
