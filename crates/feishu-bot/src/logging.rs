use crate::{errors::Error, Result};

/// Initialize tracing output for host binaries.
///
/// The library itself only emits events and never installs a
/// subscriber on its own; call this (or bring your own subscriber)
/// from the application entry point.
pub fn init(service_name: &str) -> Result<()> {
    use tracing_subscriber::{fmt, EnvFilter};

    // Default: info for our crate, warn for everything else.
    // Can be overridden with `RUST_LOG`.
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("warn,feishu_bot=info,{service_name}=info")));

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_ansi(true)
        .try_init()
        .map_err(|e| Error::Config(format!("tracing init: {e}")))
}
