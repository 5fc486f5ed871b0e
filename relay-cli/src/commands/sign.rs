//! `relay sign <file> --platform-token <token> [--sync-token <token>]`

use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;

use relay_core::SyncSettings;
use relay_sync::signature;

/// Compute the `X-Webhook-Signature` header value for a body file.
#[derive(Args, Debug)]
pub struct SignArgs {
    /// File holding the exact request body.
    pub file: PathBuf,

    /// API token of the receiving platform; empty for shared-token requests.
    #[arg(long, default_value = "")]
    pub platform_token: String,

    /// Shared sync token. Defaults to the configured one.
    #[arg(long)]
    pub sync_token: Option<String>,
}

impl SignArgs {
    pub fn run(self) -> Result<()> {
        let body = fs::read(&self.file)
            .with_context(|| format!("cannot read '{}'", self.file.display()))?;
        let sync_token = match self.sync_token {
            Some(token) => token,
            None => {
                SyncSettings::load()
                    .context("no --sync-token given and config could not be loaded; run `relay init` first")?
                    .sync_token
            }
        };
        println!("{}", signature::sign(&body, &self.platform_token, &sync_token));
        Ok(())
    }
}
