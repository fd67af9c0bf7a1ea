//! Launch a kernel and report its connection parameters.
//!
//! Prints one JSON line on stdout:
//!
//! ```text
//! {"key": "<session key>", "ports": {"shell": .., "stdin": .., "iopub": .., "hb": .., "control": ..}}
//! ```
//!
//! The kernel is left running; its connection file stays on disk for other
//! clients to attach with.

use anyhow::Result;

use kernelet::{KernelManager, LaunchConfig};

#[tokio::main]
async fn main() -> Result<()> {
    kernelet_cli::init_tracing();

    let manager = KernelManager::start(LaunchConfig::new()).await?;
    println!("{}", serde_json::to_string(&manager.summary())?);

    Ok(())
}
