//! quorum: interactive command-line client
//!
//! Reads operator commands from stdin, forwards them to the session engine,
//! and prints results and session events. All protocol logic lives in
//! quorum-client; this binary is a thin command loop.

use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use quorum_client::{Client, ClientConfig, ClientError};
use quorum_protocol::{acl, CreateMode, EventType};

#[derive(Parser)]
#[command(name = "quorum")]
#[command(about = "Interactive client for a quorum coordination service")]
#[command(version)]
struct Args {
    /// Server addresses (host or host:port)
    #[arg(required_unless_present = "config")]
    servers: Vec<String>,

    /// Session timeout in milliseconds
    #[arg(long, default_value_t = 30_000)]
    session_timeout_ms: u64,

    /// Path to a TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "warn")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| args.log_level.clone()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let mut config = match &args.config {
        Some(path) => {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            toml::from_str::<ClientConfig>(&raw).context("invalid configuration")?
        }
        None => ClientConfig::default(),
    };
    if !args.servers.is_empty() {
        config.servers = args.servers.clone();
    }
    if config.servers.is_empty() {
        anyhow::bail!("no servers given on the command line or in the configuration file");
    }
    config.session_timeout = Duration::from_millis(args.session_timeout_ms);

    let (client, mut events) = Client::connect(config);

    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            match event.event_type {
                EventType::Session => println!("* session {}", event.state),
                other => println!("* {:?} at {}", other, event.path),
            }
        }
    });

    println!("quorum shell; type 'help' for commands");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("> ");
        std::io::stdout().flush().ok();
        let Ok(Some(line)) = lines.next_line().await else {
            break;
        };
        let parts: Vec<&str> = line.split_whitespace().collect();
        match parts.as_slice() {
            [] => {}
            ["quit"] | ["exit"] => break,
            ["help"] => print_help(),
            ["state"] => println!("{}", client.state()),
            ["exists", path] => match client.exists(path).await {
                Ok(Some(stat)) => println!("yes (version {})", stat.version),
                Ok(None) => println!("no"),
                Err(err) => print_error(&err),
            },
            ["get", path] => match client.get(path).await {
                Ok((data, stat)) => print_data(data, stat.version),
                Err(err) => print_error(&err),
            },
            ["set", path, value] => {
                match client.set(path, Some(value.as_bytes().to_vec()), -1).await {
                    Ok(stat) => println!("ok (version {})", stat.version),
                    Err(err) => print_error(&err),
                }
            }
            ["create", path, value] => {
                let data = Some(value.as_bytes().to_vec());
                let entries = acl::world_acl(acl::perms::ALL);
                match client
                    .create(path, data, entries, CreateMode::Persistent)
                    .await
                {
                    Ok(created) => println!("created {created}"),
                    Err(err) => print_error(&err),
                }
            }
            ["delete", path] => match client.delete(path, -1).await {
                Ok(()) => println!("ok"),
                Err(err) => print_error(&err),
            },
            ["rmr", path] => match client.delete_recursive(path).await {
                Ok(()) => println!("ok"),
                Err(err) => print_error(&err),
            },
            ["ls", path] => match client.children(path).await {
                Ok((children, _)) => {
                    for child in children {
                        println!("{child}");
                    }
                }
                Err(err) => print_error(&err),
            },
            ["stat", path] => match client.exists(path).await {
                Ok(Some(stat)) => {
                    println!("czxid {} mzxid {}", stat.czxid, stat.mzxid);
                    println!(
                        "version {} cversion {} children {}",
                        stat.version, stat.cversion, stat.num_children
                    );
                    println!("data length {}", stat.data_length);
                }
                Ok(None) => println!("no such node"),
                Err(err) => print_error(&err),
            },
            ["watch", path] => match client.get_watch(path).await {
                Ok((data, stat, watch)) => {
                    print_data(data, stat.version);
                    tokio::spawn(async move {
                        if let Some(event) = watch.wait().await {
                            println!("* watch fired: {:?} at {}", event.event_type, event.path);
                        }
                    });
                }
                Err(err) => print_error(&err),
            },
            _ => println!("unrecognized command; type 'help'"),
        }
    }

    client.close().await;
    Ok(())
}

fn print_help() {
    println!("commands:");
    println!("  exists <path>          check whether a node exists");
    println!("  get <path>             print node data");
    println!("  set <path> <value>     write node data");
    println!("  create <path> <value>  create a persistent node (world ACL)");
    println!("  delete <path>          delete a node");
    println!("  rmr <path>             delete a subtree recursively");
    println!("  ls <path>              list children");
    println!("  stat <path>            print node metadata");
    println!("  watch <path>           print data and arm a one-shot data watch");
    println!("  state                  print the session state");
    println!("  quit                   close the session and exit");
}

fn print_data(data: Option<Vec<u8>>, version: i32) {
    match data {
        Some(bytes) => match String::from_utf8(bytes) {
            Ok(text) => println!("{text} (version {version})"),
            Err(raw) => println!("{:02x?} (version {version})", raw.as_bytes()),
        },
        None => println!("(null) (version {version})"),
    }
}

fn print_error(err: &ClientError) {
    println!("error: {err}");
}
