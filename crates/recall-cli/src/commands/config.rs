//! Engine configuration command.

use std::path::{Path, PathBuf};

use anyhow::bail;
use clap::{Args, Subcommand};
use recall_config::paths::CONFIG_FILE;
use recall_config::{EngineConfig, default_config_path, ensure_user_config_dir};

use super::common::load_config;

#[derive(Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    command: Option<ConfigCommand>,
}

#[derive(Subcommand)]
enum ConfigCommand {
    /// Print the effective configuration
    Show,

    /// Write a default configuration file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Print the configuration file path
    Path,
}

pub fn run(args: ConfigArgs, config_path: Option<&Path>) -> anyhow::Result<()> {
    match args.command.unwrap_or(ConfigCommand::Show) {
        ConfigCommand::Show => {
            let path = resolved_path(config_path);
            let config = load_config(config_path)?;
            config.validate()?;
            if path.is_file() {
                println!("# {}", path.display());
            } else {
                println!("# {} (not found, showing defaults)", path.display());
            }
            print!("{}", config.to_toml()?);
        }

        ConfigCommand::Init { force } => {
            let path = match config_path {
                Some(path) => path.to_path_buf(),
                None => ensure_user_config_dir()?.join(CONFIG_FILE),
            };
            if path.exists() && !force {
                bail!(
                    "{} already exists (use --force to overwrite)",
                    path.display()
                );
            }
            EngineConfig::default().save(&path)?;
            println!("Wrote {}", path.display());
        }

        ConfigCommand::Path => println!("{}", resolved_path(config_path).display()),
    }

    Ok(())
}

fn resolved_path(config_path: Option<&Path>) -> PathBuf {
    config_path.map_or_else(default_config_path, Path::to_path_buf)
}
