//! Shared utilities for demos.
//!
//! Provides common functionality used across the demos:
//! - Command-line argument parsing
//! - Logging initialization

#![allow(dead_code)]

// ============================================================================
// Imports
// ============================================================================

use tracing_subscriber::EnvFilter;

// ============================================================================
// Constants
// ============================================================================

/// Default listen/dial address.
pub const DEFAULT_ADDR: &str = "127.0.0.1:9001";

/// Request path served by the echo server.
pub const ECHO_PATH: &str = "/echo";

// ============================================================================
// Types
// ============================================================================

/// Command-line arguments for demos.
#[derive(Debug, Clone)]
pub struct Args {
    pub debug: bool,
    pub addr: String,
}

impl Args {
    /// Parse command-line arguments.
    ///
    /// The first argument not starting with `--` is taken as the address.
    pub fn parse() -> Self {
        let args: Vec<String> = std::env::args().skip(1).collect();
        Self {
            debug: args.iter().any(|a| a == "--debug"),
            addr: args
                .iter()
                .find(|a| !a.starts_with("--"))
                .cloned()
                .unwrap_or_else(|| DEFAULT_ADDR.to_string()),
        }
    }
}

// ============================================================================
// Functions
// ============================================================================

/// Initialize tracing/logging. `RUST_LOG` wins when set.
pub fn init_logging(debug: bool) {
    let default = if debug { "wsline=trace" } else { "wsline=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}
