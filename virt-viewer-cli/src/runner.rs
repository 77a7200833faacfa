//! Event-loop driver
//!
//! The App is single-threaded; it is iterated from a current-thread Tokio
//! runtime on a fixed tick until it quits or the user presses Ctrl+C.

use std::time::{Duration, Instant};

use tokio::runtime::Runtime;
use tokio::time::MissedTickBehavior;
use virt_viewer_core::app::App;

use crate::error::CliError;

/// Interval between two App iterations
pub const ITERATION_INTERVAL: Duration = Duration::from_millis(20);

/// Runs the first connection attempt
///
/// # Errors
///
/// Returns `Reported` when the attempt cannot start; the App has already
/// shown the reason.
pub fn start(app: &mut App) -> Result<(), CliError> {
    app.start(Instant::now()).map_err(|e| {
        tracing::debug!(error = %e, "Startup failed");
        CliError::Reported
    })
}

/// Iterates the App until it quits
pub fn drive(runtime: &Runtime, app: &mut App) {
    runtime.block_on(async {
        let mut ticker = tokio::time::interval(ITERATION_INTERVAL);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let ctrl_c = tokio::signal::ctrl_c();
        tokio::pin!(ctrl_c);

        loop {
            tokio::select! {
                _ = &mut ctrl_c => {
                    tracing::info!("Interrupted, shutting down");
                    app.quit();
                    break;
                }
                _ = ticker.tick() => {}
            }
            if !app.iterate(Instant::now()) {
                break;
            }
        }
    });
    tracing::debug!("Event loop finished");
}
