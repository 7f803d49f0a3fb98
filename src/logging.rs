// 📜 Logging - tracing subscriber setup shared by the CLI and the server

use anyhow::{Context, Result};
use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::Mutex;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub enum LogTarget {
    Stderr,
    /// Append to a file; used while the terminal UI owns the screen
    File(PathBuf),
}

/// RUST_LOG wins over the configured directive. Calling twice is a no-op.
pub fn init(filter: &str, target: LogTarget) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(filter))
        .with_context(|| format!("Invalid log filter '{}'", filter))?;

    let result = match target {
        LogTarget::Stderr => tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .try_init(),
        LogTarget::File(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .with_context(|| format!("Failed to open log file {}", path.display()))?;
            tracing_subscriber::registry()
                .with(env_filter)
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_ansi(false)
                        .with_writer(Mutex::new(file)),
                )
                .try_init()
        }
    };

    if result.is_err() {
        tracing::debug!("tracing subscriber already installed");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_twice_is_harmless() {
        assert!(init("warn", LogTarget::Stderr).is_ok());
        assert!(init("warn", LogTarget::Stderr).is_ok());
    }
}
