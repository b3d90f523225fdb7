//! # Ember Sim
//!
//! Headless driver for the Ember simulation core.
//!
//! Loads an arena from `ember.toml` (or the path given as the first
//! argument), spawns the roster, engages the configured fights and ticks the
//! world until they are over. `ember-sim --init` writes the default arena to
//! `ember.toml`.
//!
//! Set `EMBER_LOG=json` for JSON log lines.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(clippy::unwrap_used)]

mod arena;
mod config;
mod timing;

use anyhow::{Context, Result};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::arena::Arena;
use crate::config::SimConfig;

/// Main entry point.
fn main() -> Result<()> {
    let filter = EnvFilter::from_default_env().add_directive("ember=info".parse()?);
    if std::env::var("EMBER_LOG").is_ok_and(|format| format == "json") {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(fmt::layer())
            .with(filter)
            .init();
    }

    info!("Ember simulation starting...");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let arg = std::env::args().nth(1);
    if arg.as_deref() == Some("--init") {
        SimConfig::default()
            .save_to(SimConfig::config_path())
            .context("writing default config")?;
        return Ok(());
    }

    let config = match arg {
        Some(path) => SimConfig::load_from(path),
        None => SimConfig::load(),
    };

    let mut arena = Arena::new(&config).context("building arena")?;
    arena.run();
    arena.report();

    info!("Ember simulation finished");
    Ok(())
}
