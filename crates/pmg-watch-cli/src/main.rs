//! # pmg-watch CLI
//!
//! One-shot commands against a PMG appliance: check the version, pull a
//! full snapshot, or dispatch an administrative node command.

use anyhow::{Context, Result};
use pmg_watch_client::{PmgClient, PmgClientConfig};
use pmg_watch_poller::{NodeCommand, PmgPoller, PollerConfig};
use std::env;
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<()> {
    let args: Vec<String> = env::args().collect();

    if args.len() < 2 {
        print_help();
        return Ok(());
    }

    match args[1].as_str() {
        "version" => {
            let client = connect()?;
            let version = client
                .get("/version", &[])
                .await
                .context("version query failed")?;
            match version {
                Some(version) => println!("{}", serde_json::to_string_pretty(&version)?),
                None => println!("null"),
            }
        }
        "snapshot" => {
            let poller = build_poller()?;
            let snapshot = poller.refresh_now().await.context("refresh failed")?;
            println!("{}", serde_json::to_string_pretty(&*snapshot)?);
        }
        "node" => {
            if args.len() < 4 {
                eprintln!("Usage: pmg-watch node <name> <reboot|shutdown>");
                std::process::exit(1);
            }
            let node = &args[2];
            let command: NodeCommand = args[3].parse()?;
            let poller = build_poller()?;
            poller
                .execute_node_command(node, command)
                .await
                .context("node command failed")?;
            println!("{} dispatched to {node}", command.as_str());
        }
        "help" | "--help" | "-h" => {
            print_help();
        }
        cmd => {
            eprintln!("Unknown command: {cmd}");
            print_help();
            std::process::exit(1);
        }
    }

    Ok(())
}

fn connect() -> Result<PmgClient> {
    let config = PmgClientConfig::from_env().context("invalid connection settings")?;
    PmgClient::new(config).context("failed to create API client")
}

fn build_poller() -> Result<PmgPoller<PmgClient>> {
    let config = PollerConfig::from_env().context("invalid poller settings")?;
    Ok(PmgPoller::new(Arc::new(connect()?), config))
}

fn print_help() {
    println!(
        r#"pmg-watch CLI

USAGE:
    pmg-watch <COMMAND> [ARGS]

COMMANDS:
    version                        Show the appliance version envelope
    snapshot                       Run one refresh cycle and print it as JSON
    node <name> <reboot|shutdown>  Dispatch an administrative node command
    help                           Show this help message

Connection settings come from the PMGWATCH_HOST, PMGWATCH_PORT,
PMGWATCH_USERNAME, PMGWATCH_PASSWORD, PMGWATCH_REALM, PMGWATCH_VERIFY_TLS,
PMGWATCH_INTERVAL_SECS and PMGWATCH_STATS_DAYS environment variables.

EXAMPLES:
    PMGWATCH_HOST=pmg.example.com PMGWATCH_USERNAME=monitor \
        PMGWATCH_PASSWORD=... pmg-watch snapshot
"#
    );
}
