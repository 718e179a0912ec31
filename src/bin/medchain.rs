#![forbid(unsafe_code)]
//! Command-line front end for the MedChain ledger

use clap::{Parser, Subcommand};
use colored::*;
use comfy_table::presets::UTF8_FULL;
use comfy_table::{Attribute, Cell, Color as TableColor, ContentArrangement, Table};
use indicatif::{ProgressBar, ProgressStyle};
use medchain::cli::{format_hash, init_tracing, open_ledger, parse_field};
use medchain::config::{load_config, DEFAULT_CONFIG_PATH};
use medchain::transaction::{payload_from, HealthRecord};
use medchain::{BlockSummary, LedgerService};
use std::time::{Duration, Instant};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the configuration file
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    config: String,
    /// Log at debug level
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Queues a transaction with arbitrary payload fields
    Add {
        #[arg(long)]
        sender: String,
        #[arg(long)]
        recipient: String,
        /// Payload entry as key=value; repeat for more
        #[arg(long = "field", value_parser = parse_field)]
        fields: Vec<(String, String)>,
        /// Seal the pending pool right after queuing
        #[arg(long)]
        seal: bool,
    },
    /// Files a health record for a patient and seals it
    Record {
        #[arg(long)]
        doctor: String,
        #[arg(long)]
        patient: String,
        #[arg(long)]
        diagnosis: String,
        #[arg(long)]
        treatment: String,
        #[arg(long, default_value = "")]
        notes: String,
    },
    /// Seals all pending transactions into a new block
    Seal,
    /// Lists every record addressed to a recipient
    Records { recipient: String },
    /// Checks the integrity of the whole chain
    Validate,
    /// Shows chain statistics and blocks
    Show,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = load_config(&cli.config)?;
    init_tracing(&config.logging.level, cli.verbose);
    let service = open_ledger(&config)?;

    match cli.command {
        Commands::Add {
            sender,
            recipient,
            fields,
            seal,
        } => {
            service.add_transaction(&sender, &recipient, payload_from(fields));
            println!(
                "{} {} → {}",
                "📝 Queued transaction".bright_green(),
                sender.bright_white(),
                recipient.bright_white()
            );
            if seal {
                seal_with_spinner(&service).await?;
            }
        }
        Commands::Record {
            doctor,
            patient,
            diagnosis,
            treatment,
            notes,
        } => {
            let record = HealthRecord::new(diagnosis, treatment).with_notes(notes);
            service.add_transaction(doctor, patient, record.into_payload());
            seal_with_spinner(&service).await?;
        }
        Commands::Seal => {
            seal_with_spinner(&service).await?;
        }
        Commands::Records { recipient } => print_records(&service, &recipient),
        Commands::Validate => {
            let issues = service.validation_report();
            if issues.is_empty() {
                println!("{}", "✅ Chain is valid".bright_green().bold());
            } else {
                println!("{}", "❌ Chain failed validation".red().bold());
                for issue in &issues {
                    println!("   • {}", issue.to_string().red());
                }
                std::process::exit(1);
            }
        }
        Commands::Show => print_chain(&service),
    }

    Ok(())
}

async fn seal_with_spinner(service: &LedgerService) -> Result<(), Box<dyn std::error::Error>> {
    let stats = service.stats();
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(ProgressStyle::with_template("{spinner:.cyan} {msg}")?);
    spinner.set_message(format!(
        "Sealing block {} ({} pending, difficulty {})",
        stats.height + 1,
        stats.pending_transactions,
        stats.difficulty
    ));
    spinner.enable_steady_tick(Duration::from_millis(100));

    let start = Instant::now();
    let result = service.seal_pending_block_async().await;
    spinner.finish_and_clear();
    let block = result?;

    print_sealed(&block.summary(), start.elapsed(), block.nonce);
    Ok(())
}

fn print_sealed(summary: &BlockSummary, elapsed: Duration, nonce: u64) {
    println!("{}", "⛏️  Block sealed".bright_green().bold());
    println!("   Index:        #{}", summary.index);
    println!("   Hash:         {}", summary.hash.bright_yellow());
    println!("   Previous:     {}", summary.previous_hash);
    println!("   Nonce:        {}", nonce);
    println!("   Transactions: {}", summary.transaction_count);
    println!("   Seal time:    {:.3}s", elapsed.as_secs_f64());
}

fn print_records(service: &LedgerService, recipient: &str) {
    let records = service.records_for(recipient);
    if records.is_empty() {
        println!("{}", format!("No records for {}", recipient).yellow());
        return;
    }

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new("Sender").add_attribute(Attribute::Bold),
            Cell::new("Recorded").add_attribute(Attribute::Bold),
            Cell::new("Payload").add_attribute(Attribute::Bold),
        ]);

    for record in &records {
        let recorded = chrono::DateTime::from_timestamp_micros((record.timestamp * 1_000_000.0) as i64)
            .map(|t| t.format("%Y-%m-%d %H:%M:%S UTC").to_string())
            .unwrap_or_else(|| record.timestamp.to_string());
        let payload = record
            .payload
            .iter()
            .map(|(k, v)| format!("{}: {}", k, v))
            .collect::<Vec<_>>()
            .join("\n");
        table.add_row(vec![
            Cell::new(&record.sender).fg(TableColor::Cyan),
            Cell::new(recorded),
            Cell::new(payload),
        ]);
    }

    println!("{}", format!("📋 Records for {}", recipient).bright_cyan().bold());
    println!("{table}");
}

fn print_chain(service: &LedgerService) {
    let stats = service.stats();
    println!("{}", "⛓️  MedChain ledger".bright_cyan().bold());
    println!("   Height:               {}", stats.height);
    println!("   Blocks:               {}", stats.blocks);
    println!("   Sealed transactions:  {}", stats.sealed_transactions);
    println!("   Pending transactions: {}", stats.pending_transactions);
    println!("   Difficulty:           {}", stats.difficulty);
    println!();

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new("#").add_attribute(Attribute::Bold),
            Cell::new("Hash").add_attribute(Attribute::Bold),
            Cell::new("Previous").add_attribute(Attribute::Bold),
            Cell::new("Txs").add_attribute(Attribute::Bold),
        ]);
    for summary in service.block_summaries() {
        table.add_row(vec![
            Cell::new(summary.index),
            Cell::new(format_hash(&summary.hash)).fg(TableColor::Green),
            Cell::new(format_hash(&summary.previous_hash)),
            Cell::new(summary.transaction_count),
        ]);
    }
    println!("{table}");
}
