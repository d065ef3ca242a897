use std::path::Path;

use anyhow::Result;

use crate::config::Config;

const CONFIG_PATH_ENV: &str = "GOSTREAM_CONFIG_PATH";
const CANDIDATES: [&str; 2] = ["gostream.yaml", "gostream.toml"];

/// Pick the configuration file: env var > command line > working directory.
///
/// Paths that do not exist are skipped.
#[must_use]
pub fn resolve_config_path(env_path: Option<String>, cli_path: Option<&str>) -> Option<String> {
    env_path
        .filter(|p| Path::new(p).exists())
        .or_else(|| {
            cli_path
                .filter(|p| Path::new(p).exists())
                .map(str::to_string)
        })
        .or_else(|| {
            CANDIDATES
                .iter()
                .find(|p| Path::new(p).exists())
                .map(|p| (*p).to_string())
        })
}

/// Load and validate the configuration.
///
/// Runs before logging is set up, so progress goes to stderr.
pub fn load_config(cli_path: Option<&str>) -> Result<Config> {
    let config_path = resolve_config_path(std::env::var(CONFIG_PATH_ENV).ok(), cli_path);

    let config = if let Some(path) = config_path {
        eprintln!("Loading config from {path}");
        match Config::from_file(&path) {
            Ok(cfg) => cfg,
            Err(e) => {
                eprintln!("Failed to load {path}: {e}");
                eprintln!("Falling back to environment variables");
                Config::from_env().unwrap_or_default()
            }
        }
    } else {
        Config::from_env().unwrap_or_else(|e| {
            eprintln!("Failed to load config: {e}");
            eprintln!("Using default configuration");
            Config::default()
        })
    };

    if let Err(errors) = config.validate() {
        for error in &errors {
            eprintln!("Config validation error: {error}");
        }
        return Err(anyhow::anyhow!(
            "Configuration validation failed with {} error(s): {}",
            errors.len(),
            errors.join("; ")
        ));
    }

    Ok(config)
}
