use anyhow::Context;
use tracing::info;

use matchcue_core::SlotLengths;

use crate::sim::{self, SimConfig};

pub async fn run(
    port: u16,
    start_delay: f64,
    start_match: u32,
    end_match: Option<u32>,
) -> anyhow::Result<()> {
    let config = SimConfig::new(SlotLengths::default(), start_delay, start_match, end_match);
    let listener = tokio::net::TcpListener::bind(("127.0.0.1", port))
        .await
        .with_context(|| format!("failed to bind port {port}"))?;

    info!(addr = %listener.local_addr()?, "simulated competition API listening");
    sim::serve(listener, config)
        .await
        .context("simulator failed")?;
    Ok(())
}
