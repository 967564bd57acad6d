//! Peril server: pause control and game log collection.

use std::io::Write;
use std::sync::Arc;

use peril::command::{SERVER_HELP, ServerCommand};
use peril::prelude::*;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::prelude::*;

#[tokio::main]
async fn main() -> Result<(), PerilError> {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = PerilConfig::from_env()?;
    let broker = Arc::new(AmqpBroker::connect(&config.broker_url).await?);
    let server = PerilServer::start(Arc::clone(&broker), &config).await?;

    println!("Starting Peril server...");
    println!("{SERVER_HELP}");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        print!("> ");
        std::io::stdout().flush()?;
        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = tokio::signal::ctrl_c() => None,
        };
        let Some(line) = line else { break };
        if line.trim().is_empty() {
            continue;
        }

        let result = match line.parse::<ServerCommand>() {
            Ok(ServerCommand::Pause) => {
                println!("Sending pause message");
                server.pause().await
            }
            Ok(ServerCommand::Resume) => {
                println!("Sending resume message");
                server.resume().await
            }
            Ok(ServerCommand::Help) => {
                println!("{SERVER_HELP}");
                Ok(())
            }
            Ok(ServerCommand::Quit) => break,
            Err(e) => Err(e),
        };
        if let Err(e) = result {
            println!("{e}");
        }
    }

    println!("Shutting down...");
    server.shutdown().await?;
    broker.close().await?;
    Ok(())
}
