use anyhow::{Context, Result};
use clap::Parser;
use std::net::SocketAddr;
use std::time::Duration;

use crate::service_configuration::ServiceConfiguration;

#[derive(Debug, Clone, Parser)]
#[command(name = "stockroom-server", version, about = "Stockroom records API server")]
pub struct Args {
    /// Path to the YAML configuration file
    #[arg(long, env = "STOCKROOM_CONFIG")]
    pub config_file: String,

    /// Address to listen on, overrides server.host and server.port
    #[arg(long, env = "STOCKROOM_LISTEN_ADDR")]
    pub listen_addr: Option<String>,

    /// Per-call backend timeout in milliseconds, overrides timeouts.operation_ms
    #[arg(long)]
    pub operation_timeout_ms: Option<u64>,
}

impl Args {
    /// Apply command-line overrides on top of the file configuration.
    pub fn apply(&self, config: &mut ServiceConfiguration) -> Result<()> {
        if let Some(listen_addr) = &self.listen_addr {
            let addr: SocketAddr = listen_addr.parse().context(format!(
                "Failed to parse into Socket address: {}",
                listen_addr
            ))?;
            config.listen_addr = addr;
        }

        if let Some(ms) = self.operation_timeout_ms {
            if ms == 0 {
                anyhow::bail!("--operation-timeout-ms must be greater than zero");
            }
            config.operation_timeout = Duration::from_millis(ms);
        }
        Ok(())
    }
}
