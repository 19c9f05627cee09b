use anyhow::{Context, Result};
use clap::Parser;
use log::info;
use std::io;
use tokio::runtime::Builder;

use push_mtr::config::{AgentConfig, Cli, DispatchMode};
use push_mtr::dispatch::Dispatcher;
use push_mtr::geo::{Geolocator, HttpGeolocator, NoGeolocation};
use push_mtr::probe::MtrProbe;
use push_mtr::report::ReportBuilder;
use push_mtr::scheduler::Scheduler;
use push_mtr::transport::MqttPublisher;

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let config = AgentConfig::from_cli(cli)?;
    info!(
        "Starting push-mtr toward {} ({} cycles, {:?})",
        config.target, config.cycles, config.schedule
    );

    let rt = Builder::new_multi_thread().enable_all().build()?;

    rt.block_on(async {
        match config.geoip_url.as_deref() {
            Some(url) => run(&config, HttpGeolocator::new(url)?).await,
            None => run(&config, NoGeolocation).await,
        }
    })
}

async fn run<G: Geolocator>(config: &AgentConfig, geo: G) -> Result<()> {
    let probe = match &config.mtr_search_path {
        Some(dirs) => MtrProbe::new(dirs.clone()),
        None => MtrProbe::from_env(),
    };
    // numeric hop addresses
    let builder = ReportBuilder::new(probe, geo).with_extra_flags(vec!["-n".to_string()]);

    let dispatcher = match &config.mode {
        DispatchMode::Console => Dispatcher::Console(io::stdout()),
        DispatchMode::Transport(transport) => {
            info!(
                "Publishing to {} via {} broker(s)",
                transport.topic,
                transport.brokers.len()
            );
            Dispatcher::Transport(MqttPublisher::new(transport.clone()))
        }
    };

    let mut scheduler = Scheduler::new(builder, dispatcher, config.target.clone(), config.cycles);
    scheduler
        .run(config.schedule)
        .await
        .with_context(|| format!("report for {} failed", config.target))
}
