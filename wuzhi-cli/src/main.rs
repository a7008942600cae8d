use anyhow::{Context, Result};
use clap::Parser;
use std::collections::BTreeMap;
use std::process::ExitCode;
use tracing::error;
use tracing_subscriber::EnvFilter;

use wuzhi::{Device, Reply, UdpTransport};
use wuzhi_core::frame::nice_hex;

mod commandline;
mod hook;

use commandline::CliArgs;
use hook::CommandHook;

/// Exit status when at least one command exhausted its attempts
const EXIT_COMMAND_FAILED: u8 = 2;

fn logging_init(debug: bool) {
    let default_level = if debug { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    if debug {
        builder.with_target(true).init();
    } else {
        builder.with_target(false).without_time().init();
    }
}

/// Render a reply the way it is printed on stdout
fn render(reply: &Reply) -> Result<String> {
    match reply {
        Reply::Report(report) => {
            // Serialized directly so fields keep schema order
            let root = BTreeMap::from([(report.kind.name(), report)]);
            Ok(serde_json::to_string_pretty(&root)?)
        }
        Reply::Raw(bytes) => Ok(format!("Result: {}", nice_hex(bytes))),
    }
}

async fn run(args: CliArgs) -> Result<ExitCode> {
    let transport = UdpTransport::new(args.bridge.as_str());
    let mut device = Device::new(transport)
        .with_timeout(args.reply_timeout)
        .with_retries(args.retries)
        .with_backoff(args.backoff);
    if let Some(program) = &args.pre_connect {
        device = device.with_pre_connect(CommandHook::new(program.as_str(), args.address.as_str()));
    }

    device
        .connect()
        .await
        .with_context(|| format!("Cannot connect to {} via {}", args.address, args.bridge))?;

    let mut failed = false;
    for command in args.commands() {
        match device.query(command).await {
            Ok(reply) => println!("{}", render(&reply)?),
            Err(err) => {
                error!("{} failed: {}", command, err);
                failed = true;
            }
        }
    }

    device.disconnect().await.context("Cannot disconnect")?;

    Ok(if failed {
        ExitCode::from(EXIT_COMMAND_FAILED)
    } else {
        ExitCode::SUCCESS
    })
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = CliArgs::parse();
    logging_init(args.debug);

    match run(args).await {
        Ok(code) => code,
        Err(err) => {
            eprintln!("Error: {:#}", err);
            ExitCode::FAILURE
        }
    }
}
