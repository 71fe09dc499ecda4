//! Console chat client
//!
//! Reads slash-commands and messages from stdin and prints every line the
//! server queues for this session.

use std::env;

use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use chat_rooms::client::RpcClient;
use chat_rooms::commands::HELP;
use chat_rooms::config::DEFAULT_ADDR;
use chat_rooms::{AppError, Call, Command, ErrorCode, Outcome};

const DISCONNECTED: &str = "Disconnected from the server.";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("chat_rooms=warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let addr = env::args()
        .nth(1)
        .unwrap_or_else(|| DEFAULT_ADDR.to_string());

    let client = RpcClient::connect(&addr).await?;
    let token = match client.call(Call::Connect).await? {
        Outcome::Ok { value: Some(token) } => token,
        Outcome::Ok { value: None } => return Err("server returned no token".into()),
        Outcome::Error { message, .. } => return Err(message.into()),
    };

    tokio::select! {
        result = input(&client, &token) => {
            if let Err(e) = result {
                debug!("Input ended: {}", e);
            }
        }
        _ = output(&client, &token) => {}
    }

    println!("{}", DISCONNECTED);
    Ok(())
}

/// Forward stdin lines to the server until EOF or `/quit`
async fn input(client: &RpcClient, token: &str) -> Result<(), AppError> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    while let Some(line) = lines.next_line().await? {
        let command = match Command::parse(&line) {
            Ok(command) => command,
            Err(e) => {
                println!("{}", e);
                continue;
            }
        };

        let quit = command == Command::Quit;
        match command.into_call(token) {
            Some(call) => {
                // Room errors are echoed to the outbox; only a lost session ends input
                if let Outcome::Error {
                    code: ErrorCode::UnknownToken,
                    message,
                } = client.call(call).await?
                {
                    println!("{}", message);
                    return Ok(());
                }
            }
            None => print!("{}", HELP),
        }

        if quit {
            return Ok(());
        }
    }
    Ok(())
}

/// Long-poll the server and print each line as it arrives
async fn output(client: &RpcClient, token: &str) {
    loop {
        let call = Call::ReceiveMessage {
            token: token.to_string(),
        };
        match client.call(call).await {
            Ok(Outcome::Ok { value: Some(line) }) => println!("{}", line),
            Ok(Outcome::Ok { value: None }) => {}
            Ok(Outcome::Error { message, .. }) => {
                debug!("Receive failed: {}", message);
                return;
            }
            Err(e) => {
                debug!("Receive failed: {}", e);
                return;
            }
        }
    }
}
