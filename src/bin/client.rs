//! Standalone client binary for talking to a SeriesVault server
//!
//! Provides a command-line interface for recording and querying samples

use clap::Parser;
use seriesvault::{Client, QueryResult};
use std::io::{self, Write};
use std::time::Duration;

/// SeriesVault interactive client
#[derive(Parser, Debug)]
#[command(name = "seriesvault-client")]
#[command(version)]
struct Args {
    /// Server address (host:port)
    #[arg(short, long, default_value = "127.0.0.1:10001")]
    addr: String,

    /// Per-request timeout in seconds
    #[arg(short, long)]
    timeout_secs: Option<u64>,

    /// Print query results as JSON
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    println!("Connecting to SeriesVault server at {}...", args.addr);
    let mut client = match args.timeout_secs {
        Some(secs) => Client::connect_timeout(&args.addr, Duration::from_secs(secs)).await?,
        None => Client::connect(&args.addr).await?,
    };
    println!("Connected! Type 'help' for available commands or 'quit' to exit.");

    loop {
        print!("> ");
        io::stdout().flush()?;

        let mut input = String::new();
        if io::stdin().read_line(&mut input)? == 0 {
            break;
        }
        let input = input.trim();

        if input.is_empty() {
            continue;
        }

        match input {
            "quit" | "exit" => {
                println!("Goodbye!");
                break;
            }
            "help" => {
                print_help();
            }
            _ => {
                if let Err(e) = handle_command(&mut client, input, args.json).await {
                    println!("Error: {}", e);
                }
            }
        }
    }

    client.close().await?;
    Ok(())
}

async fn handle_command(
    client: &mut Client,
    input: &str,
    json: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let parts: Vec<&str> = input.split_whitespace().collect();

    match parts.as_slice() {
        ["put", key, value, rest @ ..] if rest.len() <= 1 => {
            let value: f64 = value.parse()?;
            match rest.first() {
                Some(timestamp) => client.put(key, value, timestamp.parse()?).await?,
                None => client.put_now(key, value).await?,
            }
            println!("OK");
        }
        ["get", key] => {
            let result = client.get(key).await?;
            print_result(&result, json)?;
        }
        ["put", ..] => println!("Usage: put <key> <value> [timestamp]"),
        ["get", ..] => println!("Usage: get <key>"),
        _ => {
            println!(
                "Unknown command: {}. Type 'help' for available commands.",
                parts[0]
            );
        }
    }

    Ok(())
}

fn print_result(result: &QueryResult, json: bool) -> Result<(), Box<dyn std::error::Error>> {
    if json {
        println!("{}", serde_json::to_string_pretty(result)?);
        return Ok(());
    }

    let mut empty = true;
    for (key, samples) in result {
        for sample in samples {
            println!("{} {} {}", key, sample.value, sample.timestamp);
            empty = false;
        }
    }
    if empty {
        println!("(empty)");
    }
    Ok(())
}

fn print_help() {
    println!("Available commands:");
    println!("  put <key> <value> [ts]  - Record a sample (ts defaults to now)");
    println!("  get <key>               - Show samples for a key, '*' for all");
    println!("  help                    - Show this help message");
    println!("  quit                    - Exit the client");
}
