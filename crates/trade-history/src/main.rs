//! trade-history CLI
//!
//! Analyze a wallet's recent transactions, sync trades into the local
//! history database, enrich pending rows with prices, and export results.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use csv::Writer;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

use trade_history::{
    Analyzer, Config, Enricher, FileConfig, JupiterPriceProvider, MetadataCache, Overrides, RpcTransactionSource,
    SqliteStore, TransactionSource, constants, metadata_provider, parse_timestamp, pending_record, validate_address,
};

#[derive(Parser)]
#[command(name = "trade-history")]
#[command(about = "Reconcile, classify and value Solana wallet trades")]
#[command(version)]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "config.toml", global = true)]
    config: PathBuf,

    /// Data directory for the trading history database
    #[arg(long, env = "DATA_DIR", global = true)]
    data_dir: Option<PathBuf>,

    /// Solana RPC URL (overrides the dRPC / public endpoint)
    #[arg(long, env = "RPC_URL", global = true)]
    rpc_url: Option<String>,

    /// dRPC API key
    #[arg(long, env = "DRPC_API_KEY", hide_env_values = true, global = true)]
    drpc_api_key: Option<String>,

    /// Helius API key for token metadata
    #[arg(long, env = "HELIUS_API_KEY", hide_env_values = true, global = true)]
    helius_api_key: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print analyzed transactions for an address
    Analyze {
        #[arg(short, long)]
        address: String,

        #[arg(short, long, default_value_t = constants::DEFAULT_TX_LIMIT)]
        limit: usize,

        /// Only transactions older than this signature
        #[arg(long)]
        before: Option<String>,

        /// Only transactions at or after this time (YYYY-MM-DD, RFC 3339, or epoch ms)
        #[arg(long)]
        after: Option<String>,

        /// Print JSON instead of a summary
        #[arg(long)]
        json: bool,
    },

    /// Analyze an address and record its trades as pending rows
    Sync {
        #[arg(short, long)]
        address: String,

        #[arg(short, long)]
        user_id: String,

        #[arg(short, long, default_value_t = constants::DEFAULT_TX_LIMIT)]
        limit: usize,
    },

    /// Enrich pending rows with metadata and prices
    Enrich {
        #[arg(short, long)]
        user_id: Option<String>,

        /// Maximum rows to enrich in this run
        #[arg(short, long, default_value_t = 100)]
        limit: u32,
    },

    /// Write a user's enriched rows to CSV
    Export {
        #[arg(short, long)]
        user_id: String,

        #[arg(short, long, default_value = "trades.csv")]
        output: PathBuf,
    },

    /// Show database row counts
    Stats,
}

#[tokio::main]
async fn main() -> Result<()> {
    trade_history::init_tracing();

    let cli = Cli::parse();

    let file_config = FileConfig::load_or_default(&cli.config)?;
    let overrides = Overrides {
        rpc_url: cli.rpc_url,
        drpc_api_key: cli.drpc_api_key,
        helius_api_key: cli.helius_api_key,
        server_addr: None,
        data_dir: cli.data_dir,
    };
    let config = Config::from_file(&file_config, overrides)?;

    match cli.command {
        Command::Analyze {
            address,
            limit,
            before,
            after,
            json,
        } => {
            let after = after.as_deref().map(parse_timestamp).transpose()?;
            analyze(&config, &address, limit, before.as_deref(), after, json).await
        }
        Command::Sync {
            address,
            user_id,
            limit,
        } => sync(&config, &address, &user_id, limit).await,
        Command::Enrich { user_id, limit } => enrich(&config, user_id.as_deref(), limit).await,
        Command::Export { user_id, output } => export(&config, &user_id, &output).await,
        Command::Stats => {
            let store = open_store(&config).await?;
            println!("{}", store.stats().await?);
            Ok(())
        }
    }
}

fn analyzer(config: &Config) -> Result<Analyzer> {
    let provider = metadata_provider(config.helius_api_key.as_deref())?;
    Ok(Analyzer::new(Arc::new(MetadataCache::new(provider))))
}

async fn open_store(config: &Config) -> Result<SqliteStore> {
    let path = config.database_path();
    SqliteStore::open(&path)
        .await
        .with_context(|| format!("Failed to open database: {}", path.display()))
}

async fn analyze(
    config: &Config,
    address: &str,
    limit: usize,
    before: Option<&str>,
    after: Option<chrono::DateTime<chrono::Utc>>,
    json: bool,
) -> Result<()> {
    validate_address(address)?;
    let source = RpcTransactionSource::new(&config.rpc_url)?;
    let page = source.get_transactions(address, limit, before, after).await?;
    let analyzed = analyzer(config)?.analyze_page(&page.transactions).await;

    if json {
        let body = serde_json::json!({
            "transactions": analyzed,
            "lastSignature": page.last_signature,
        });
        println!("{}", serde_json::to_string_pretty(&body)?);
        return Ok(());
    }

    for tx in &analyzed {
        let when = tx
            .block_time
            .and_then(|t| chrono::DateTime::from_timestamp(t, 0))
            .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_else(|| "-".to_string());
        let status = if tx.failed { " (failed)" } else { "" };
        println!("{} {:<7} {}{}", when, tx.tx_type, tx.signature, status);
        for change in &tx.token_changes {
            let marker = if change.delta.is_primary_account { "*" } else { " " };
            println!(
                "    {} {:>20.6} {:<10} {}",
                marker, change.delta.display_amount_delta, change.symbol, change.delta.asset_id
            );
        }
    }
    if let Some(last) = page.last_signature {
        println!("\nNext page: --before {}", last);
    }
    Ok(())
}

async fn sync(config: &Config, address: &str, user_id: &str, limit: usize) -> Result<()> {
    validate_address(address)?;
    let source = RpcTransactionSource::new(&config.rpc_url)?;
    let page = source.get_transactions(address, limit, None, None).await?;
    let analyzed = analyzer(config)?.analyze_page(&page.transactions).await;

    let records: Vec<_> = analyzed.iter().filter_map(|tx| pending_record(user_id, tx)).collect();
    let store = open_store(config).await?;
    let inserted = store.insert_pending(&records).await?;

    info!(
        address,
        user_id,
        transactions = analyzed.len(),
        trades = records.len(),
        inserted,
        "sync complete"
    );
    println!(
        "Analyzed {} transactions, {} trades, {} new rows",
        analyzed.len(),
        records.len(),
        inserted
    );
    Ok(())
}

async fn enrich(config: &Config, user_id: Option<&str>, limit: u32) -> Result<()> {
    let store = Arc::new(open_store(config).await?);
    let pending = store.pending_records(user_id, limit).await?;
    if pending.is_empty() {
        println!("No pending records");
        return Ok(());
    }

    let cache = Arc::new(MetadataCache::new(metadata_provider(config.helius_api_key.as_deref())?));
    let prices = Arc::new(JupiterPriceProvider::new()?);
    let enricher = Enricher::new(cache, prices, store.clone());

    let report = enricher.enrich_batch(&pending, &config.batch).await;
    for (record, result) in pending.iter().zip(&report.results) {
        if let Err(e) = result {
            eprintln!("  {} failed: {}", record.signature, e);
        }
    }
    println!("Enriched {} records, {} failed", report.succeeded(), report.failed());
    Ok(())
}

async fn export(config: &Config, user_id: &str, output: &Path) -> Result<()> {
    let store = open_store(config).await?;
    let records = store.enriched_records(user_id).await?;

    let mut wtr =
        Writer::from_path(output).with_context(|| format!("Failed to create {}", output.display()))?;
    wtr.write_record([
        "Signature",
        "Type",
        "Token",
        "Symbol",
        "Price_USD",
        "Price_SOL",
        "Value_USD",
        "Value_SOL",
        "Realized_PnL_USD",
    ])?;
    for r in &records {
        wtr.write_record([
            r.signature.clone(),
            r.tx_type.to_string(),
            r.asset_id.clone(),
            r.symbol.clone(),
            format!("{:.6}", r.price_in_fiat),
            format!("{:.9}", r.price_in_base),
            format!("{:.2}", r.value_in_fiat),
            format!("{:.6}", r.value_in_base),
            format!("{:.2}", r.realized_pnl),
        ])?;
    }
    wtr.flush()?;

    println!("Wrote {} rows to {}", records.len(), output.display());
    Ok(())
}
