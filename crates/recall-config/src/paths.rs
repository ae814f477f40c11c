//! Platform-specific paths for configuration and renders.
//!
//! # Directory Structure
//!
//! - **User config**: `~/.config/recall/` (Linux), `~/Library/Application Support/recall/` (macOS), `%APPDATA%\recall\` (Windows)
//! - **Engine config**: `engine.toml` inside the user config directory
//!
//! # Example
//!
//! ```rust,no_run
//! use recall_config::paths;
//!
//! let path = paths::default_config_path();
//! println!("Engine config: {:?}", path);
//! ```

use std::path::PathBuf;

/// Application name used for directory paths.
const APP_NAME: &str = "recall";

/// File name of the engine configuration.
pub const CONFIG_FILE: &str = "engine.toml";

/// Returns the user-specific configuration directory.
///
/// # Platform Paths
///
/// - Linux: `~/.config/recall/`
/// - macOS: `~/Library/Application Support/recall/`
/// - Windows: `%APPDATA%\recall\`
///
/// Returns a fallback path if the config directory cannot be determined.
pub fn user_config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_NAME)
}

/// Returns the path of the user's engine configuration file.
pub fn default_config_path() -> PathBuf {
    user_config_dir().join(CONFIG_FILE)
}

/// Returns the directory renders are written to when no output is given.
///
/// Falls back to the current directory.
pub fn default_render_dir() -> PathBuf {
    dirs::audio_dir().unwrap_or_else(|| PathBuf::from("."))
}

/// Ensure the user config directory exists.
///
/// Creates the directory and any parent directories if they don't exist.
///
/// # Errors
///
/// Returns an error if the directory cannot be created.
pub fn ensure_user_config_dir() -> Result<PathBuf, crate::ConfigError> {
    let dir = user_config_dir();

    if !dir.exists() {
        std::fs::create_dir_all(&dir).map_err(|e| crate::ConfigError::create_dir(&dir, e))?;
    }

    Ok(dir)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_config_dir() {
        let dir = user_config_dir();
        assert!(dir.to_string_lossy().contains("recall"));
    }

    #[test]
    fn test_default_config_path() {
        let path = default_config_path();
        assert_eq!(path.file_name().unwrap(), CONFIG_FILE);
        assert_eq!(path.parent().unwrap(), user_config_dir());
    }

    #[test]
    fn test_ensure_user_config_dir() {
        // depends on system permissions; only checks for panics
        let _ = ensure_user_config_dir();
    }
}
