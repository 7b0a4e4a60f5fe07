//! CLI for the PopSub connector
//!
//! Subcommands:
//! - `node`: join a cluster, print messages received on the given topics and
//!   publish `<topic> <json-object>` lines read from stdin

use clap::Parser;
use popsub_connector::{Connector, ConnectorEvent, handler, load_config, utils};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "popsub-connector", version)]
enum Command {
    /// Join the cluster described by the configuration
    Node {
        /// Topic to print messages for; may be repeated
        #[arg(long = "topic", short = 't')]
        topics: Vec<String>,
    },
}

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();
    let cmd = Command::parse();

    match cmd {
        Command::Node { topics } => {
            if let Err(e) = run_node(topics).await {
                eprintln!("Node failed: {e}");
                std::process::exit(1);
            }
        }
    }
}

async fn run_node(topics: Vec<String>) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config()?;
    utils::logging::init(&config.logging.level);

    let connector = Connector::new(config.connector)?;
    let mut events = connector
        .take_events()
        .ok_or("connector events already taken")?;

    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            match event {
                ConnectorEvent::Ready => info!("connector ready"),
                ConnectorEvent::Error(e) => warn!("{e}"),
            }
        }
    });

    for topic in &topics {
        let name = topic.clone();
        connector.subscribe(
            topic,
            handler(move |envelope| println!("[{name}] {}", envelope.clone().into_value())),
        );
    }

    connector.ready().await;
    info!(
        "{} {} running as {} on {}",
        connector.name(),
        connector.version(),
        connector.sender_id(),
        connector.local_addr()
    );

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => match line? {
                Some(line) => publish_line(&connector, &line),
                None => break,
            },
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown signal received. Exiting gracefully.");
                break;
            }
        }
    }

    connector.close();
    Ok(())
}

fn publish_line(connector: &Connector, line: &str) {
    let line = line.trim();
    if line.is_empty() {
        return;
    }
    let Some((topic, body)) = line.split_once(char::is_whitespace) else {
        warn!("expected '<topic> <json-object>', got '{line}'");
        return;
    };
    match serde_json::from_str::<serde_json::Value>(body.trim()) {
        Ok(message) => connector.publish(topic, &message),
        Err(e) => warn!("invalid JSON for {topic}: {e}"),
    }
}
