use std::{path::PathBuf, process::ExitCode};

use clap::{Parser, Subcommand};
use serde::Serialize;
use ticket_store::{
    checkout::lookup, config::StoreConfig, StoreError, TicketDraft, TicketStore,
};

/// Operator tool for the ticket store.
#[derive(Parser, Debug)]
#[command(name = "ticketd")]
#[command(about = "Create, inspect and settle event tickets on disk")]
struct Args {
    /// Directory holding the pending/ and paid/ ticket folders
    #[arg(long, env = "TICKETD_DATA_DIR")]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create a pending ticket
    Order {
        #[arg(long)]
        email: String,
        /// Attendee and amount as NAME=AMOUNT, repeatable
        #[arg(long = "item", value_parser = parse_item, required = true)]
        items: Vec<(String, u64)>,
    },
    /// Show a ticket and whether it is paid
    Show { id: String },
    /// Mark a pending ticket as paid (payment taken at the door)
    MarkPaid { id: String },
    /// Issued and paid counts
    Stats,
}

fn parse_item(value: &str) -> Result<(String, u64), String> {
    let (name, amount) = value
        .rsplit_once('=')
        .ok_or_else(|| format!("expected NAME=AMOUNT, got `{value}`"))?;
    let amount = amount
        .trim()
        .parse()
        .map_err(|e| format!("bad amount in `{value}`: {e}"))?;
    Ok((name.trim().to_string(), amount))
}

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let mut config = StoreConfig::from_env();
    if let Some(data_dir) = args.data_dir {
        config = config.with_data_dir(data_dir);
    }

    match run(args.command, config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{e}");
            if e.is_client_error() {
                ExitCode::from(2)
            } else {
                ExitCode::FAILURE
            }
        }
    }
}

async fn run(command: Command, config: StoreConfig) -> Result<(), StoreError> {
    let store = TicketStore::open(config).await?;
    match command {
        Command::Order { email, items } => {
            let draft = items
                .into_iter()
                .fold(TicketDraft::new(email), |draft, (name, amount)| {
                    draft.item(name, amount)
                });
            print_json(&store.create_ticket(draft).await?)
        }
        Command::Show { id } => print_json(&lookup(&store, &id).await?),
        Command::MarkPaid { id } => {
            let info = lookup(&store, &id).await?;
            store.promote_to_paid(&info.ticket).await?;
            println!("{} marked as paid", info.ticket.id);
            Ok(())
        }
        Command::Stats => print_json(&store.stats().await?),
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<(), StoreError> {
    let text = serde_json::to_string_pretty(value)
        .map_err(|e| StoreError::Persist(e.into()))?;
    println!("{text}");
    Ok(())
}
