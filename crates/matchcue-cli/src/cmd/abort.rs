use std::path::Path;

use anyhow::Context;
use tracing::info;

use matchcue_core::{dispatch, ActionSet, Config};
use matchcue_osc::OscTransport;

/// Fire the abort set once, outside any match. Used to rehearse the abort
/// cues; `{match_num}` substitutes as 0.
pub async fn run(config_path: &Path) -> anyhow::Result<()> {
    let config = Config::load(config_path).context("failed to load config")?;
    let actions = ActionSet::compile(&config).context("invalid action configuration")?;
    let transport = OscTransport::bind()
        .await
        .context("failed to bind OSC socket")?;

    info!(count = actions.abort.len(), "firing abort actions");
    for action in &actions.abort {
        dispatch(&transport, action, 0).await;
    }
    Ok(())
}
