use std::path::Path;
use std::time::Duration;

use anyhow::Context;
use tracing::info;

use matchcue_core::{ActionScheduler, ActionSet, Config, SchedulerConfig};
use matchcue_osc::OscTransport;
use srcomp_client::SrcompClient;

use crate::sim::{self, SimConfig};

pub async fn run(config_path: &Path, simulate: bool) -> anyhow::Result<()> {
    let config = Config::load(config_path).context("failed to load config")?;
    let actions = ActionSet::compile(&config).context("invalid action configuration")?;

    let api_url = if simulate {
        let listener = tokio::net::TcpListener::bind(("127.0.0.1", 0))
            .await
            .context("failed to bind simulator")?;
        let addr = listener.local_addr()?;
        tokio::spawn(sim::serve(listener, SimConfig::starting_now(config.slot)));
        info!(%addr, "running against a built-in simulated competition");
        format!("http://{addr}")
    } else {
        config.api_url.clone()
    };

    // The slot stays "current" from game start until the post segment ends.
    let active_window = config.slot.match_len + config.slot.post;
    let source = SrcompClient::new(
        &api_url,
        active_window,
        Duration::from_secs_f64(config.request_timeout_secs),
    )
    .context("failed to build competition API client")?;
    let transport = OscTransport::bind()
        .await
        .context("failed to bind OSC socket")?;

    let scheduler = ActionScheduler::new(
        source,
        transport,
        actions,
        SchedulerConfig {
            poll_interval: Duration::from_secs_f64(config.poll_interval_secs),
            fine_interval: Duration::from_secs_f64(config.fine_interval_secs),
            tolerance_secs: config.time_regression_tolerance_secs,
            match_len_secs: config.slot.match_len,
        },
    );

    // Ctrl-c abandons any unfired cues without dispatching them.
    tokio::select! {
        _ = scheduler.run() => {}
        _ = tokio::signal::ctrl_c() => info!("shutting down"),
    }
    Ok(())
}
