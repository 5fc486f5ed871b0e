//! `relay serve`

use anyhow::{Context, Result};

pub fn run() -> Result<()> {
    let home = dirs::home_dir().context("could not determine home directory")?;
    relay_daemon::start_blocking(&home).context("relay daemon exited with error")
}
