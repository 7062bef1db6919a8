use std::{path::PathBuf, sync::Arc};

use detect_trigger::{
    cameras::CameraRegistry,
    config,
    engine::{DecisionEngine, FileTriggerStore},
    pipeline::Pipeline,
    server,
    services::{DeepStack, HttpTriggerAction, SurveillanceStation},
};
use structopt::StructOpt;
use tracing::{error, info, trace};

#[derive(Debug, StructOpt)]
#[structopt(
    name = "detect_trigger",
    about = "Filters camera motion events through object detection before triggering."
)]
struct CliArgs {
    #[structopt(
        parse(from_os_str),
        short = "c",
        long = "config",
        default_value = "config.toml",
        help = "Path to configuration file. See sample_config.toml for format.",
        env = "DETECT_TRIGGER_CONFIG"
    )]
    config: PathBuf,
}

#[tokio::main]
async fn main() {
    let args = CliArgs::from_args();
    let cfg = match config::load_config(&args.config) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Unable to load configuration {}: {}", args.config.display(), e);
            std::process::exit(1);
        }
    };

    let filter = tracing_subscriber::EnvFilter::new(&cfg.system.log_level);
    let stdout_subscriber = tracing_subscriber::fmt()
        // Filter from user
        .with_env_filter(filter)
        .finish();
    tracing::subscriber::set_global_default(stdout_subscriber)
        .expect("tracing subscriber installed twice");

    info!("Detection trigger service starting");
    trace!("Config: {:?}", cfg);

    if let Err(e) = run(cfg).await {
        error!("{}", e);
        std::process::exit(1);
    }
}

async fn run(cfg: config::Config) -> Result<(), String> {
    let cameras = CameraRegistry::from_config(&cfg.camera);
    info!(
        enabled = cameras.enabled_count(),
        disabled = cameras.disabled_count(),
        "Cameras loaded"
    );

    let store = FileTriggerStore::open(&cfg.trigger.state_dir).map_err(|e| e.to_string())?;
    let snapshots = SurveillanceStation::connect(cfg.surveillance.clone())
        .await
        .map_err(|e| format!("Surveillance Station login failed: {}", e))?;
    let detector = DeepStack::new(&cfg.detector).map_err(|e| e.to_string())?;
    let action = HttpTriggerAction::new(cfg.trigger.homebridge_webhook_url.clone())
        .map_err(|e| e.to_string())?;

    let interval = chrono::Duration::seconds(cfg.trigger.interval_secs as i64);
    let pipeline = Pipeline::new(
        cameras,
        DecisionEngine::new(Arc::new(store)),
        Arc::new(snapshots),
        Arc::new(detector),
        Arc::new(action),
        interval,
    );

    server::serve(cfg.system.listen, Arc::new(pipeline))
        .await
        .map_err(|e| format!("HTTP server failed: {}", e))
}
