use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use kevo_client::{BatchOperation, Client, ClientOptions, ScanOptions, DEFAULT_ENDPOINT};
use std::time::Duration;
use tracing::debug;
use tracing_subscriber::EnvFilter;

mod table;

#[derive(Clone, Copy, Debug, ValueEnum)]
enum OutputFormat {
    /// Table format (default)
    Table,
    /// Pretty JSON
    Json,
}

#[derive(Parser)]
#[command(name = "kevo")]
#[command(about = "Kevo key-value store CLI", long_about = None)]
struct Cli {
    /// Server address
    #[arg(short, long, default_value = DEFAULT_ENDPOINT, global = true)]
    endpoint: String,

    /// Connection timeout in seconds
    #[arg(long, default_value_t = 5, global = true)]
    connect_timeout: u64,

    /// Per-request timeout in seconds
    #[arg(long, default_value_t = 10, global = true)]
    request_timeout: u64,

    /// Connect over TLS
    #[arg(long, global = true)]
    tls: bool,

    /// Output format (table, json)
    #[arg(short, long, value_enum, default_value = "table", global = true)]
    output: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Get the value of a key
    Get {
        key: String,
    },
    /// Store a value under a key
    Put {
        key: String,
        value: String,
        /// Wait for durable persistence
        #[arg(long)]
        sync: bool,
    },
    /// Delete a key
    Delete {
        key: String,
        /// Wait for durable persistence
        #[arg(long)]
        sync: bool,
    },
    /// Scan keys by prefix, suffix or range
    Scan {
        #[arg(long)]
        prefix: Option<String>,
        #[arg(long)]
        suffix: Option<String>,
        /// Inclusive lower bound
        #[arg(long)]
        start: Option<String>,
        /// Exclusive upper bound
        #[arg(long)]
        end: Option<String>,
        /// Maximum number of entries to return
        #[arg(short, long)]
        limit: Option<usize>,
    },
    /// Show storage statistics
    Stats,
    /// Show node role and replicas
    NodeInfo,
    /// Apply puts and deletes atomically (puts first, then deletes)
    Batch {
        /// Put operation, repeatable
        #[arg(long = "put", value_name = "KEY=VALUE")]
        puts: Vec<String>,
        /// Delete operation, repeatable
        #[arg(long = "delete", value_name = "KEY")]
        deletes: Vec<String>,
        /// Wait for durable persistence
        #[arg(long)]
        sync: bool,
    },
}

fn parse_put(arg: &str) -> Result<BatchOperation> {
    let Some((key, value)) = arg.split_once('=') else {
        bail!("Invalid put '{}', expected KEY=VALUE", arg);
    };
    if key.is_empty() {
        bail!("Invalid put '{}', key is empty", arg);
    }
    Ok(BatchOperation::put(key.to_string(), value.to_string()))
}

fn options(cli: &Cli) -> ClientOptions {
    let mut options = ClientOptions::new(cli.endpoint.clone())
        .with_connect_timeout(Duration::from_secs(cli.connect_timeout))
        .with_request_timeout(Duration::from_secs(cli.request_timeout));
    if options.sync_write_timeout < options.request_timeout {
        options.sync_write_timeout = options.request_timeout;
    }
    if cli.tls {
        options = options.with_tls();
    }
    options
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let client = Client::new(options(&cli)).context("Invalid client options")?;
    client
        .connect()
        .await
        .with_context(|| format!("Failed to connect to {}", cli.endpoint))?;

    debug!(endpoint = %cli.endpoint, output = ?cli.output, "running command");
    let result = run(&client, &cli).await;
    client.close().await?;
    result
}

async fn run(client: &Client, cli: &Cli) -> Result<()> {
    let output = cli.output;
    match &cli.command {
        Commands::Get { key } => match client.get(key.as_bytes()).await? {
            Some(value) => match output {
                OutputFormat::Table => println!("{}", table::display_bytes(&value)),
                OutputFormat::Json => println!(
                    "{}",
                    serde_json::json!({ "key": key, "value": table::display_bytes(&value) })
                ),
            },
            None => println!("Key not found"),
        },

        Commands::Put { key, value, sync } => {
            client.put(key.as_bytes(), value.as_bytes(), *sync).await?;
            println!("Value stored");
        }

        Commands::Delete { key, sync } => {
            client.delete(key.as_bytes(), *sync).await?;
            println!("Key deleted");
        }

        Commands::Scan {
            prefix,
            suffix,
            start,
            end,
            limit,
        } => {
            let mut scan = ScanOptions::new();
            if let Some(prefix) = prefix {
                scan = scan.prefix(prefix);
            }
            if let Some(suffix) = suffix {
                scan = scan.suffix(suffix);
            }
            if let Some(start) = start {
                scan = scan.start_key(start);
            }
            if let Some(end) = end {
                scan = scan.end_key(end);
            }
            if let Some(limit) = limit {
                scan = scan.limit(*limit);
            }

            let entries = client.scan(scan)?.collect().await?;
            match output {
                OutputFormat::Table => {
                    println!("{}", table::format_entries_table(&entries));
                    println!();
                    println!("Count: {}", entries.len());
                }
                OutputFormat::Json => {
                    println!("{}", serde_json::to_string_pretty(&table::entries_json(&entries))?)
                }
            }
        }

        Commands::Stats => {
            let stats = client.get_stats().await?;
            match output {
                OutputFormat::Table => println!("{}", table::format_stats_table(&stats)),
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&stats)?),
            }
        }

        Commands::NodeInfo => match client.get_node_info().await? {
            Some(info) => match output {
                OutputFormat::Table => println!("{}", table::format_node_info(&info)),
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&info)?),
            },
            None => println!("Server does not report topology (standalone)"),
        },

        Commands::Batch {
            puts,
            deletes,
            sync,
        } => {
            let mut operations = puts
                .iter()
                .map(|arg| parse_put(arg))
                .collect::<Result<Vec<_>>>()?;
            operations.extend(
                deletes
                    .iter()
                    .map(|key| BatchOperation::delete(key.clone())),
            );

            if operations.is_empty() {
                bail!("Batch needs at least one --put or --delete");
            }
            let count = operations.len();
            client.batch_write(operations, *sync).await?;
            println!("Applied {} operations", count);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_put() {
        let op = parse_put("user:1=alice=admin").unwrap();
        assert_eq!(op, BatchOperation::put("user:1", "alice=admin"));
        assert!(parse_put("novalue").is_err());
        assert!(parse_put("=v").is_err());
    }

    #[test]
    fn test_cli_parses_batch() {
        let cli = Cli::try_parse_from([
            "kevo", "--endpoint", "db:50051", "batch", "--put", "a=1", "--put", "b=2",
            "--delete", "c", "--sync",
        ])
        .unwrap();

        assert_eq!(cli.endpoint, "db:50051");
        match cli.command {
            Commands::Batch { puts, deletes, sync } => {
                assert_eq!(puts, vec!["a=1", "b=2"]);
                assert_eq!(deletes, vec!["c"]);
                assert!(sync);
            }
            _ => panic!("Expected batch command"),
        }
    }

    #[test]
    fn test_options_from_flags() {
        let cli = Cli::try_parse_from(["kevo", "--request-timeout", "60", "--tls", "stats"]).unwrap();
        let options = options(&cli);

        assert!(options.tls_enabled);
        assert_eq!(options.request_timeout, Duration::from_secs(60));
        assert!(options.sync_write_timeout >= options.request_timeout);
        assert!(options.validate().is_ok());
    }
}
