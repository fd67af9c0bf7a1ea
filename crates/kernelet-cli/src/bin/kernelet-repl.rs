//! Interactive REPL against a Jupyter kernel.

use std::path::PathBuf;
use std::process;
use std::time::Duration;

use anyhow::Result;

use kernelet::client::KernelClient;
use kernelet::kernelspec::DEFAULT_KERNEL;
use kernelet::{ConnectionInfo, KernelManager, LaunchConfig, KERNELET_VERSION};
use kernelet_cli::repl::Repl;

struct Args {
    kernel: String,
    existing: Option<PathBuf>,
}

fn main() {
    let args: Vec<String> = std::env::args().collect();

    let args = match parse_args(&args) {
        Ok(args) => args,
        Err(msg) => {
            if !msg.is_empty() {
                eprintln!("error: {msg}");
                eprintln!();
            }
            eprintln!("Usage: kernelet-repl [--kernel <name>] [--existing <connection-file>]");
            eprintln!();
            eprintln!("Options:");
            eprintln!("  --kernel <name>      Kernel spec to launch [default: {DEFAULT_KERNEL}]");
            eprintln!("  --existing <file>    Attach to a running kernel instead of launching");
            process::exit(2);
        }
    };

    if let Err(e) = run(args) {
        eprintln!("error: {e:#}");
        process::exit(1);
    }
}

fn parse_args(args: &[String]) -> Result<Args, String> {
    let mut kernel = DEFAULT_KERNEL.to_string();
    let mut existing: Option<PathBuf> = None;

    let mut i = 1; // skip argv[0]
    while i < args.len() {
        match args[i].as_str() {
            "--kernel" => {
                i += 1;
                kernel = args.get(i).ok_or("--kernel requires a value")?.clone();
            }
            "--existing" => {
                i += 1;
                existing = Some(PathBuf::from(
                    args.get(i).ok_or("--existing requires a value")?,
                ));
            }
            "--help" | "-h" => return Err("".to_string()),
            arg => return Err(format!("unexpected argument: {arg}")),
        }
        i += 1;
    }

    Ok(Args { kernel, existing })
}

#[tokio::main]
async fn run(args: Args) -> Result<()> {
    kernelet_cli::init_tracing();

    match args.existing {
        Some(path) => {
            // Attaching: the kernel belongs to someone else, leave it running.
            let info = ConnectionInfo::read(&path)?;
            let mut client = KernelClient::connect(&info).await?;
            banner(&mut client).await;
            Repl::new(client).run().await?;
            Ok(())
        }
        None => {
            let mut manager =
                KernelManager::start(LaunchConfig::new().with_kernel(args.kernel.as_str())).await?;
            let startup = manager.wait_ready().await?;
            tracing::info!(?startup, "Kernel ready");

            let mut client = KernelClient::connect(manager.connection_info()).await?;
            banner(&mut client).await;
            Repl::new(client).run().await?;

            manager.shutdown(Duration::from_secs(5)).await?;
            Ok(())
        }
    }
}

async fn banner(client: &mut KernelClient) {
    eprintln!("kernelet {KERNELET_VERSION}");
    match client.handshake(Duration::from_secs(5)).await {
        Ok(reply) if !reply.banner.is_empty() => eprintln!("{}", reply.banner.trim_end()),
        Ok(_) => {}
        Err(e) => tracing::warn!(error = %e, "Kernel info handshake failed"),
    }
}
