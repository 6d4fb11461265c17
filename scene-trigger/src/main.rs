//! Scene trigger service binary
//!
//! Usage: `scene-trigger <single|term>`

use anyhow::Context;
use clap::Parser;
use scene_trigger::{
    init_logging, AppConfig, CpalSource, Monitor, RollingLogger, SwitchBotActuator,
    TriggerEngine, TriggerPolicy,
};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "scene-trigger")]
#[command(about = "Execute a SwitchBot scene when the microphone gets loud", long_about = None)]
struct Cli {
    /// Trigger policy
    #[arg(value_enum)]
    policy: TriggerPolicy,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    init_logging();

    if let Err(e) = run(cli.policy).await {
        error!("{:#}", e);
        std::process::exit(1);
    }
}

async fn run(policy: TriggerPolicy) -> anyhow::Result<()> {
    info!("Starting scene trigger v{} ({} policy)", scene_trigger::VERSION, policy);

    let config = AppConfig::load().context("failed to load configuration")?;

    let engine = TriggerEngine::new(config.trigger.clone(), policy)?;
    let logger = RollingLogger::new(&config.log);
    let actuator = SwitchBotActuator::new(config.switchbot.clone())
        .context("failed to create SwitchBot client")?;

    let mut monitor = Monitor::new(engine, logger, Arc::new(actuator), config.audio.frame_size)
        .with_cue(config.cue_wav.clone());

    let cancel = CancellationToken::new();
    let ctrl_c_token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupt received");
            ctrl_c_token.cancel();
        }
    });

    let source = CpalSource::open(&config.audio).context("failed to open microphone")?;
    info!("Listening (Ctrl+C to stop)...");

    let stats = monitor.run(source, cancel).await.context("audio capture failed")?;

    println!(
        "Processed {} frames, fired {} times, wrote {} summaries",
        stats.frames_processed, stats.fires, stats.summaries
    );
    Ok(())
}
