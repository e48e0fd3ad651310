//! Kernel utilities shared by the Amora applications.
//! Keep this crate lightweight: typed configuration and the loader that fills it.
//!
//! ## Config loading
//! ```rust,no_run
//! use amora_kernel::config::{AppConfig, load_config};
//!
//! let cfg: AppConfig = load_config(Some("server.toml")).unwrap_or_default();
//! assert!(cfg.media.max_files > 0);
//! ```
pub mod config;
