//! Interactive Peril player.

use std::io::Write;
use std::sync::Arc;

use peril::command::{CLIENT_HELP, ClientCommand};
use peril::prelude::*;
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tracing_subscriber::prelude::*;

fn init_tracing() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

async fn prompt(lines: &mut Lines<BufReader<Stdin>>, text: &str) -> Result<Option<String>, PerilError> {
    print!("{text}");
    std::io::stdout().flush()?;
    Ok(lines.next_line().await?)
}

async fn run_command(
    client: &PerilClient<AmqpBroker>,
    command: ClientCommand,
) -> Result<bool, PerilError> {
    match command {
        ClientCommand::Spawn { location, units } => {
            client.spawn(location, units).await?;
            println!("Spawned {units} units in {location}");
        }
        ClientCommand::Move { from, to, units } => {
            client.move_units(from, to, units).await?;
            println!("Moving {units} units from {from} to {to}");
        }
        ClientCommand::Status => print!("{}", client.status().await),
        ClientCommand::Spam(n) => client.spam(n).await?,
        ClientCommand::Help => println!("{CLIENT_HELP}"),
        ClientCommand::Quit => return Ok(false),
    }
    Ok(true)
}

#[tokio::main]
async fn main() -> Result<(), PerilError> {
    init_tracing();
    let config = PerilConfig::from_env()?;

    let broker = Arc::new(AmqpBroker::connect(&config.broker_url).await?);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    let username = loop {
        match prompt(&mut lines, "Please enter your username: ").await? {
            Some(name) if !name.trim().is_empty() => break name.trim().to_string(),
            Some(_) => continue,
            None => return Ok(()),
        }
    };

    let client = PerilClient::start(Arc::clone(&broker), &username, &config).await?;
    println!("Welcome, {username}!");
    println!("{CLIENT_HELP}");

    loop {
        let line = tokio::select! {
            line = prompt(&mut lines, "> ") => line?,
            _ = tokio::signal::ctrl_c() => None,
        };
        let Some(line) = line else { break };
        if line.trim().is_empty() {
            continue;
        }
        let command = match line.parse::<ClientCommand>() {
            Ok(command) => command,
            Err(e) => {
                println!("{e}");
                continue;
            }
        };
        match run_command(&client, command).await {
            Ok(true) => {}
            Ok(false) => break,
            Err(e) => println!("{e}"),
        }
    }

    println!("Exiting...");
    client.shutdown().await?;
    broker.close().await?;
    Ok(())
}
