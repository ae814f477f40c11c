//! Engine configuration for the recall rendering core.
//!
//! # Features
//!
//! - **Engine config**: samplerate, buffer geometry, timing and device
//!   settings stored as TOML ([`EngineConfig`])
//! - **Validation**: field checks with the offending field named
//!   ([`ValidationError`])
//! - **Paths**: platform-specific config directory ([`paths`])
//!
//! # Example
//!
//! ```rust
//! use recall_config::{DeviceKind, EngineConfig};
//!
//! let config = EngineConfig::from_toml(r#"
//!     samplerate = 48000
//!     buffer_size = 256
//!     device = "wav"
//!     output = "take1.wav"
//! "#)?;
//! assert_eq!(config.device, DeviceKind::Wav);
//!
//! let context = config.to_context()?;
//! assert_eq!(context.geometry().buffer_size(), 256);
//! # Ok::<(), recall_config::ConfigError>(())
//! ```

mod engine_config;
mod error;

/// Platform-specific paths for configuration.
pub mod paths;

/// Field validation.
pub mod validation;

pub use engine_config::{DeviceKind, EngineConfig};
pub use error::ConfigError;
pub use paths::{default_config_path, default_render_dir, ensure_user_config_dir, user_config_dir};
pub use validation::{ValidationError, ValidationResult};
