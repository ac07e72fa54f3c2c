//! `toolsync report`: write a diagnostic bundle.

use anyhow::{Context, Result};
use clap::Args;

use toolsync_core::{config::load_config, SyncRoot};
use toolsync_daemon::{request_report, DaemonError};
use toolsync_engine::write_report;

#[derive(Args, Debug)]
pub struct ReportArgs {}

impl ReportArgs {
    pub fn run(self, root: &SyncRoot) -> Result<()> {
        let (via, path) = match request_report(root) {
            Ok(data) => {
                let path = data["path"]
                    .as_str()
                    .context("daemon report response is missing a path")?
                    .to_string();
                ("daemon", path)
            }
            Err(DaemonError::DaemonNotRunning { .. }) => {
                root.ensure().context("failed to prepare sync root")?;
                let config = load_config(root);
                let path =
                    write_report(root, &config).context("failed to write diagnostic report")?;
                ("local", path.display().to_string())
            }
            Err(err) => return Err(err).context("failed to request report from daemon"),
        };
        println!("✓ Diagnostic report written to {path} ({via})");
        Ok(())
    }
}
