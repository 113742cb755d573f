use std::path::Path;

use anyhow::Context;

use matchcue_core::{ActionSet, Config};

pub fn run(config_path: &Path) -> anyhow::Result<()> {
    let config = Config::load(config_path).context("failed to load config")?;
    let actions = ActionSet::compile(&config).context("invalid action configuration")?;

    println!(
        "Config is valid: {} actions, {} abort actions, {} devices.",
        actions.timed.len(),
        actions.abort.len(),
        config.devices.len()
    );
    Ok(())
}
