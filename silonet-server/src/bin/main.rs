use std::{path::PathBuf, process, sync::Arc};

use structopt::StructOpt;
use tokio::signal;
use tracing::{error, warn};
use tracing_subscriber::*;

use silonet_server::{
    lifecycle::Lifecycle,
    metrics::{GlobalRecorder, Recorder},
    rest,
    services::PipelineRegistry,
    settings::Settings,
    storage::redis::Client,
    trainer::ChannelTrainer,
};

#[derive(Debug, StructOpt)]
#[structopt(name = "Coordinator")]
struct Opt {
    /// Path of the configuration file
    #[structopt(short, parse(from_os_str))]
    config_path: PathBuf,
}

#[tokio::main]
async fn main() {
    let opt = Opt::from_args();

    let settings = Settings::new(opt.config_path).unwrap_or_else(|err| {
        eprintln!("{}", err);
        process::exit(1);
    });
    let Settings {
        api: api_settings,
        pipeline: pipeline_settings,
        privacy: privacy_settings,
        trainer: trainer_settings,
        log: log_settings,
        metrics: metrics_settings,
        redis: redis_settings,
    } = settings;

    let _fmt_subscriber = FmtSubscriber::builder()
        .with_env_filter(log_settings.filter)
        .with_ansi(true)
        .init();

    // This is already called internally when instantiating the pipelines but it doesn't hurt
    // making sure the crypto layer is correctly initialized
    sodiumoxide::init().unwrap();

    if GlobalRecorder::install(Recorder::new(metrics_settings.influxdb)).is_err() {
        warn!("a global metrics recorder is already installed");
    }

    let store = Client::new(redis_settings.url)
        .await
        .expect("failed to initialize storage");

    let epochs = trainer_settings.epochs;
    let registry = Arc::new(PipelineRegistry::new(
        pipeline_settings,
        privacy_settings,
        trainer_settings,
        store.clone(),
    ));

    let (trainer, job_rx) = ChannelTrainer::new();
    let lifecycle = Lifecycle::new(store.clone(), trainer, epochs);
    let jobs = rest::JobBoard::new();
    tokio::spawn(rest::forward_jobs(jobs.clone(), job_rx));

    tokio::select! {
        result = rest::serve(api_settings, registry, lifecycle, jobs, store) => {
            match result {
                Ok(()) => warn!("shutting down: REST server terminated"),
                Err(err) => error!("shutting down: REST server failed: {}", err),
            }
        }
        _ = signal::ctrl_c() => {}
    }
}
