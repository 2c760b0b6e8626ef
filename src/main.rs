// src/main.rs

//! A small command-line client: sends one command and prints the reply, or
//! stays subscribed and prints messages until interrupted.

use anyhow::{Context, Result, anyhow};
use spineldb_client::core::protocol::PushMessage;
use spineldb_client::core::pubsub::Subscription;
use spineldb_client::{ClientConfig, ClusterClient, Command, RespFrame, SpinelClient};
use std::env;
use tracing::{debug, error};
use tracing_subscriber::filter::EnvFilter;

const USAGE: &str = "Usage: spineldb-cli [--config FILE] [--host HOST] [--port PORT] <command> [args...]
       spineldb-cli [options] subscribe <channel>...
       spineldb-cli [options] psubscribe <pattern>...";

#[tokio::main]
async fn main() -> Result<()> {
    // Define version information.
    const VERSION: &str = env!("CARGO_PKG_VERSION");

    let args: Vec<String> = env::args().skip(1).collect();
    if args.iter().any(|a| a == "--version") {
        println!("spineldb-cli version {VERSION}");
        return Ok(());
    }

    let (mut config, command) = parse_args(&args)?;
    if command.is_empty() {
        eprintln!("{USAGE}");
        std::process::exit(1);
    }
    config.validate()?;

    // Logs go to stderr so that replies on stdout stay machine-readable.
    let log_level = env::var("RUST_LOG").unwrap_or_else(|_| config.log_level.clone());
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(log_level))
        .with_writer(std::io::stderr)
        .compact()
        .with_ansi(true)
        .init();

    if let Err(e) = run(config, command).await {
        error!("{:#}", e);
        std::process::exit(1);
    }
    Ok(())
}

/// Separates client options from the command to run.
fn parse_args(args: &[String]) -> Result<(ClientConfig, Vec<String>)> {
    let mut config_path: Option<&str> = None;
    let mut host: Option<&str> = None;
    let mut port: Option<u16> = None;
    let mut i = 0;
    while i < args.len() {
        let value = || {
            args.get(i + 1)
                .map(String::as_str)
                .ok_or_else(|| anyhow!("{} flag requires a value", args[i]))
        };
        match args[i].as_str() {
            "--config" => config_path = Some(value()?),
            "--host" => host = Some(value()?),
            "--port" => {
                let raw = value()?;
                port = Some(
                    raw.parse::<u16>()
                        .with_context(|| format!("Invalid port number: {raw}"))?,
                );
            }
            _ => break,
        }
        i += 2;
    }

    let mut config = match config_path {
        Some(path) => ClientConfig::from_file(path)?,
        None => ClientConfig::default(),
    };
    if let Some(host) = host {
        config.host = host.to_string();
    }
    if let Some(port) = port {
        config.port = port;
    }
    Ok((config, args[i.min(args.len())..].to_vec()))
}

async fn run(config: ClientConfig, command: Vec<String>) -> Result<()> {
    let name = command[0].to_ascii_lowercase();

    if config.cluster.enabled {
        if name == "subscribe" || name == "psubscribe" {
            return Err(anyhow!("{name} is not supported in cluster mode"));
        }
        let cluster = ClusterClient::connect(config).await?;
        let mut cmd = Command::new(&command[0]);
        // Without a command table the first argument is taken as the routing key.
        if let Some(key) = command.get(1) {
            cmd = cmd.key(key);
        }
        let reply = cluster.execute::<RespFrame>(cmd.args(&command[2.min(command.len())..])).await;
        cluster.close().await;
        println!("{}", format_reply(&reply?, 0));
        return Ok(());
    }

    let client = SpinelClient::connect(config).await?;
    match name.as_str() {
        "subscribe" | "psubscribe" => {
            let names = &command[1..];
            let subscription = if name == "subscribe" {
                client.subscribe(names).await?
            } else {
                client.psubscribe(names).await?
            };
            print_messages(subscription).await;
        }
        _ => {
            let reply = client
                .execute::<RespFrame>(Command::new(&command[0]).args(&command[1..]))
                .await;
            match reply {
                Ok(frame) => println!("{}", format_reply(&frame, 0)),
                Err(e) => println!("(error) {e}"),
            }
        }
    }
    client.close().await;
    Ok(())
}

async fn print_messages(mut subscription: Subscription) {
    loop {
        tokio::select! {
            message = subscription.recv() => match message {
                Some(message) => println!("{}", format_message(&message)),
                None => break,
            },
            _ = tokio::signal::ctrl_c() => {
                debug!("Interrupted; leaving subscription.");
                break;
            }
        }
    }
}

fn format_message(message: &PushMessage) -> String {
    let channel = String::from_utf8_lossy(&message.channel);
    let payload = String::from_utf8_lossy(&message.payload);
    match &message.pattern {
        Some(pattern) => format!("{} {channel} {payload}", String::from_utf8_lossy(pattern)),
        None => format!("{channel} {payload}"),
    }
}

/// Renders a reply the way interactive Redis-compatible clients do.
fn format_reply(frame: &RespFrame, indent: usize) -> String {
    match frame {
        RespFrame::SimpleString(s) => s.clone(),
        RespFrame::Error(e) => format!("(error) {e}"),
        RespFrame::Integer(i) => format!("(integer) {i}"),
        RespFrame::BulkString(b) => format!("\"{}\"", String::from_utf8_lossy(b)),
        RespFrame::Null | RespFrame::NullArray => "(nil)".to_string(),
        RespFrame::Array(items) if items.is_empty() => "(empty array)".to_string(),
        RespFrame::Array(items) => {
            let width = items.len().to_string().len();
            items
                .iter()
                .enumerate()
                .map(|(i, item)| {
                    let prefix = format!("{:>width$}) ", i + 1);
                    let pad = if i == 0 { String::new() } else { " ".repeat(indent) };
                    format!("{pad}{prefix}{}", format_reply(item, indent + prefix.len()))
                })
                .collect::<Vec<_>>()
                .join("\n")
        }
    }
}
