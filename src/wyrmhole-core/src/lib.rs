pub mod config;
pub mod logging;
pub mod paths;

pub use config::{
    Config, ConfigError, LogLevel, LoggingConfig, PluginConfig, ProtocolConfig, ValidationError,
};
pub use logging::{init_logging, LoggingError, LoggingGuard};
pub use paths::{AppDirs, DirsError};

pub const APP_NAME: &str = "wyrmhole";
pub const APP_AUTHOR: &str = "Wyrmhole";
pub const APP_QUALIFIER: &str = "io";

/// Largest fragment carried by a single outbound chunk, and the ceiling for
/// `protocol.max_chunk_size`.
///
/// Browsers cap host-to-extension messages at 1 MiB; 768 KiB leaves room for
/// the JSON envelope and escaping.
pub const MAX_CHUNK_SIZE: usize = 768 * 1024;
