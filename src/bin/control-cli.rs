//! Operator tool for the enclosure control service.
//!
//! Usage:
//!   cargo run --bin control-cli -- status
//!   cargo run --bin control-cli -- set light FORCE_ON
//!   cargo run --bin control-cli -- set pressure_washer FORCE_ON --timer 120
//!   cargo run --bin control-cli -- health

use clap::{Parser, Subcommand};
use enclosure_control::api::protocol::{CMD_GET_STATE, CMD_HEALTH, CMD_SET_MODE};
use enclosure_control::api::{WsRequest, WsResponse};
use enclosure_control::command::CommandRequest;
use futures_util::{SinkExt, StreamExt};
use std::time::Duration;
use tokio_tungstenite::{connect_async, tungstenite::Message};

/// Default control service WebSocket URL
const DEFAULT_SERVER_URL: &str = "ws://localhost:8765";

#[derive(Parser)]
#[command(name = "control-cli")]
#[command(about = "Inspect and command the enclosure actuators")]
struct Cli {
    /// Control service WebSocket URL
    #[arg(long, env = "CONTROL_SERVER_URL", default_value = DEFAULT_SERVER_URL)]
    server: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the current control document
    Status,
    /// Set a device mode
    Set {
        /// light, fan_positive, fan_negative or pressure_washer
        device: String,
        /// AUTO, FORCE_ON or FORCE_OFF
        mode: String,
        /// Pressure washer run time in seconds
        #[arg(long)]
        timer: Option<u64>,
    },
    /// Print cache and store diagnostics
    Health,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let request = match cli.command {
        Commands::Status => WsRequest::new(new_message_id(), CMD_GET_STATE),
        Commands::Health => WsRequest::new(new_message_id(), CMD_HEALTH),
        Commands::Set {
            device,
            mode,
            timer,
        } => {
            let mut command = CommandRequest::new(device, mode);
            command.timer_duration = timer;
            WsRequest::new(new_message_id(), CMD_SET_MODE).with_args(serde_json::to_value(command)?)
        }
    };

    let (ws_stream, _) = connect_async(&cli.server).await.map_err(|e| {
        eprintln!("Failed to connect to {}", cli.server);
        eprintln!("Make sure the enclosure control service is running.");
        eprintln!("Error: {}", e);
        e
    })?;
    let (mut write, mut read) = ws_stream.split();

    write
        .send(Message::Text(serde_json::to_string(&request)?.into()))
        .await?;

    let response = tokio::time::timeout(Duration::from_secs(10), async {
        while let Some(msg) = read.next().await {
            if let Ok(Message::Text(text)) = msg {
                let text_str: &str = &text;
                if let Ok(response) = serde_json::from_str::<WsResponse>(text_str)
                    && response.message_id == request.message_id
                {
                    return Some(response);
                }
            }
        }
        None
    })
    .await;

    let _ = write.send(Message::Close(None)).await;

    match response {
        Ok(Some(response)) => {
            if let Some(code) = response.error_code {
                eprintln!(
                    "Error {}: {}",
                    code,
                    response.details.unwrap_or_default()
                );
                std::process::exit(2);
            }
            if let Some(result) = response.result {
                if let Some(message) = result.get("message").and_then(|m| m.as_str()) {
                    println!("{}", message);
                }
                println!("{}", serde_json::to_string_pretty(&result)?);
            }
            Ok(())
        }
        Ok(None) => Err("Connection closed before receiving response".into()),
        Err(_) => Err("Timed out waiting for response".into()),
    }
}

fn new_message_id() -> String {
    uuid::Uuid::new_v4().to_string()
}
