//! IRP Runtime: configuração, logging e composição
//!
//! ```no_run
//! use irp_runtime::{init_logging, RuntimeConfig};
//!
//! let mut config = RuntimeConfig::from_file("irp.yaml")?;
//! config.apply_env_overrides()?;
//! init_logging(&config.logging);
//! # Ok::<(), irp_runtime::ConfigError>(())
//! ```

pub mod config;
pub mod error;
pub mod logging;
pub mod runtime;

pub use config::{LoggingConfig, PolicyConfig, RuntimeConfig, WorkflowConfig};
pub use error::ConfigError;
pub use logging::init_logging;
pub use runtime::Runtime;
