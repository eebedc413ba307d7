// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Logging setup for hosts embedding the pattern cortex

use anyhow::{Context, Result};

/// Install a compact `tracing` subscriber. `RUST_LOG` wins over `level`.
///
/// Fails if a global subscriber is already installed, so callers that may
/// initialize more than once can ignore the error.
pub fn init_logging(level: &str) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(level))
        .context("Failed to create log filter")?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to install tracing subscriber: {}", e))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_init_is_reported_not_fatal() {
        let _ = init_logging("debug");
        assert!(init_logging("info").is_err());
    }
}
