//! Run one panorama grid capture from the command line.
//!
//! Ctrl-C stops the run after the current shot.

use anyhow::Context;
use clap::Parser;
use rig_server::rig_init::{initialize_rig, load_config, release_gpio, Rig, RigArgs};
use rig_server::status_layer::init_tracing;
use shared::cancellation::CancelSource;
use shared::capture::CaptureError;
use shared::config::CaptureOverrides;
use shared::orchestrator::CaptureRunner;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(author, version, about = "Capture one pan/tilt panorama grid")]
struct Args {
    #[command(flatten)]
    rig: RigArgs,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let config = load_config(&args.rig)?;
    init_tracing(config.verbosity(), None);

    info!("Initializing rig...");
    let Rig { capture, gpio } = initialize_rig(&config)?;

    let cancel = CancelSource::new();
    let token = cancel.token();
    // Overrides from the command line are already folded into the config
    let mut run =
        tokio::task::spawn_blocking(move || capture.run(&CaptureOverrides::default(), &token));

    let joined = tokio::select! {
        joined = &mut run => joined,
        Ok(()) = tokio::signal::ctrl_c() => {
            warn!("Interrupt received, stopping after the current shot");
            cancel.cancel();
            run.await
        }
    };
    release_gpio(&gpio);

    match joined.context("Capture thread panicked")? {
        Ok(summary) => {
            info!(
                "Capture complete: {} shots ({} columns x {} rows)",
                summary.shots, summary.columns, summary.rows
            );
            Ok(())
        }
        Err(CaptureError::Cancelled { shots_taken }) => {
            warn!("Capture cancelled after {shots_taken} shots");
            Ok(())
        }
        Err(e) => Err(e).context("Capture failed"),
    }
}
