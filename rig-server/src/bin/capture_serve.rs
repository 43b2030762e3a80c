//! HTTP control server for the pan/tilt rig.

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use rig_server::capture_server::{run_server, FormDefaults, ServerArgs, ServerState};
use rig_server::rig_init::{initialize_rig, load_config, release_gpio, RigArgs};
use rig_server::status_layer::init_tracing;
use shared::orchestrator::{CaptureOrchestrator, CaptureRunner};
use shared::status::StatusBroadcaster;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(author, version, about = "HTTP server for pan/tilt panorama captures")]
struct Args {
    #[command(flatten)]
    rig: RigArgs,

    #[command(flatten)]
    server: ServerArgs,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let config = load_config(&args.rig)?;

    let broadcaster = StatusBroadcaster::default();
    init_tracing(config.verbosity(), Some(broadcaster.clone()));

    info!("Initializing rig...");
    let (runner, gpio): (Option<Arc<dyn CaptureRunner>>, _) = match initialize_rig(&config) {
        Ok(rig) => {
            let runner: Arc<dyn CaptureRunner> = Arc::new(rig.capture);
            (Some(runner), Some(rig.gpio))
        }
        Err(e) => {
            warn!("Rig unavailable, captures will be refused: {e:#}");
            (None, None)
        }
    };

    let orchestrator =
        CaptureOrchestrator::new(runner, broadcaster, config.min_capture_interval());
    info!(
        "Minimum interval between captures: {:.1}s",
        orchestrator.min_interval().as_secs_f64()
    );
    let state = Arc::new(ServerState::new(
        orchestrator.clone(),
        FormDefaults::from_config(&config),
    ));

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl-C: {e}");
            std::future::pending::<()>().await;
        }
    };
    let served = run_server(state, &args.server, shutdown).await;

    if orchestrator.cancel_run().is_ok() {
        info!("Waiting for the capture in progress to stop");
        while orchestrator.is_running() {
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }
    if let Some(gpio) = gpio {
        release_gpio(&gpio);
    }
    served
}
