//! `toolsync init [--force]`

use anyhow::{Context, Result};
use clap::Args;

use toolsync_core::{
    config::{save_config, ToolSyncConfig},
    SyncRoot,
};

/// Create the sync root layout and write a default config.
#[derive(Args, Debug)]
pub struct InitArgs {
    /// Overwrite an existing config.json with defaults.
    #[arg(long)]
    pub force: bool,
}

impl InitArgs {
    pub fn run(self, root: &SyncRoot) -> Result<()> {
        root.ensure()
            .with_context(|| format!("failed to create sync root '{}'", root.path().display()))?;

        let config_path = root.config_path();
        if config_path.exists() && !self.force {
            println!("✓ Sync root already initialized at {}", root.path().display());
            println!("  Config kept: {}", config_path.display());
            return Ok(());
        }

        let config = ToolSyncConfig::default();
        save_config(root, &config)
            .with_context(|| format!("failed to write '{}'", config_path.display()))?;

        let tools: Vec<String> = config.tools.iter().map(|t| t.to_string()).collect();
        println!("✓ Initialized sync root at {}", root.path().display());
        println!("  Tools: {}", tools.join(", "));
        println!("  Config: {}", config_path.display());
        Ok(())
    }
}
