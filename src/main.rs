use clap::{Parser, Subcommand};
use miette::{IntoDiagnostic, Result};
use purchase_coordinator::application::coordinator::PurchaseCoordinator;
use purchase_coordinator::application::delivery::DeliveryContext;
use purchase_coordinator::config::CoordinatorConfig;
use purchase_coordinator::domain::options::PurchaseOptions;
use purchase_coordinator::domain::ports::{SharedStoreBackend, SharedTransactionStore};
use purchase_coordinator::domain::product::Product;
use purchase_coordinator::domain::transaction::Transaction;
use purchase_coordinator::infrastructure::in_memory::InMemoryTransactionStore;
use purchase_coordinator::infrastructure::local_store::{LocalStoreBackend, StoreFixture};
use purchase_coordinator::interfaces::bridge::{BridgeResult, PluginBridge};
use purchase_coordinator::interfaces::json::transaction_writer::TransactionWriter;
use serde::Serialize;
use serde_json::Value;
use std::fs::File;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::info;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Store fixture describing products, subscription statuses and simulation settings
    #[arg(long)]
    fixture: PathBuf,

    /// Coordinator configuration file (optional)
    #[arg(long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Fetch product metadata; unknown ids are omitted
    Products {
        #[arg(required = true)]
        ids: Vec<String>,
    },
    /// Purchase one or more products concurrently
    Purchase {
        #[arg(required = true)]
        product_ids: Vec<String>,
        #[arg(long)]
        win_back_offer: Option<String>,
        #[arg(long)]
        account_token: Option<Uuid>,
        /// Finish each successful transaction after purchase
        #[arg(long)]
        finish: bool,
        /// Write the unfinished transactions, with raw payloads, as JSON lines
        #[arg(long)]
        export: Option<PathBuf>,
    },
    /// Ask the store to redeliver previous purchases
    Restore,
    /// Check win-back offer eligibility for a subscription
    Eligibility { product_id: String, offer_id: String },
    /// Report whether the store accepts payments
    CanMakePayments,
}

/// A bridge callback forwarding the result message to a receiver.
fn reply<T: Serialize + Send + 'static>() -> (
    impl FnOnce(BridgeResult<T>) + Send + 'static,
    oneshot::Receiver<Value>,
) {
    let (tx, rx) = oneshot::channel();
    let callback = move |result: BridgeResult<T>| {
        let _ = tx.send(result.to_message());
    };
    (callback, rx)
}

fn is_failure(message: &Value) -> bool {
    message["status"] == "failure"
}

async fn purchase_one(
    bridge: PluginBridge,
    product_id: String,
    options: PurchaseOptions,
    finish: bool,
) -> Result<Value> {
    let (callback, rx) = reply::<Transaction>();
    bridge.purchase(product_id, options, callback);
    let mut message = rx.await.into_diagnostic()?;

    if finish && !is_failure(&message) {
        let Some(tx_id) = message["value"]["id"].as_u64() else {
            return Ok(message);
        };
        let (callback, rx) = reply::<()>();
        bridge.finish(tx_id, callback);
        let finished = rx.await.into_diagnostic()?;
        if is_failure(&finished) {
            return Ok(finished);
        }
        message["value"]["finished"] = Value::Bool(true);
    }
    Ok(message)
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => {
            CoordinatorConfig::from_reader(File::open(path).into_diagnostic()?).into_diagnostic()?
        }
        None => CoordinatorConfig::default(),
    };
    let fixture = StoreFixture::from_reader(File::open(&cli.fixture).into_diagnostic()?)
        .into_diagnostic()?;

    let backend: SharedStoreBackend =
        Arc::new(LocalStoreBackend::new(fixture).with_buffer(config.update_buffer));
    let store: SharedTransactionStore = Arc::new(InMemoryTransactionStore::new());
    let delivery = DeliveryContext::new(&config.delivery_thread_name).into_diagnostic()?;

    let coordinator = Arc::new(PurchaseCoordinator::new(backend, store, delivery, &config));
    let _listener = coordinator.start_listener().await.into_diagnostic()?;
    let bridge = PluginBridge::new(coordinator.clone());

    let messages = match cli.command {
        Command::Products { ids } => {
            let (callback, rx) = reply::<Vec<Product>>();
            bridge.products(ids.into_iter().collect(), callback);
            vec![rx.await.into_diagnostic()?]
        }
        Command::Purchase {
            product_ids,
            win_back_offer,
            account_token,
            finish,
            export,
        } => {
            let options = PurchaseOptions {
                app_account_token: account_token,
                win_back_offer_id: win_back_offer,
                ..Default::default()
            };
            let handles: Vec<_> = product_ids
                .into_iter()
                .map(|id| tokio::spawn(purchase_one(bridge.clone(), id, options.clone(), finish)))
                .collect();

            let mut messages = Vec::with_capacity(handles.len());
            for handle in handles {
                messages.push(handle.await.into_diagnostic()??);
            }

            if let Some(path) = export {
                let unfinished = coordinator.transactions().await.into_diagnostic()?;
                let mut writer = TransactionWriter::new(File::create(&path).into_diagnostic()?);
                writer.write_transactions(unfinished).into_diagnostic()?;
                info!(path = %path.display(), "exported unfinished transactions");
            }
            messages
        }
        Command::Restore => {
            let (callback, rx) = reply::<()>();
            bridge.restore_purchases(callback);
            vec![rx.await.into_diagnostic()?]
        }
        Command::Eligibility {
            product_id,
            offer_id,
        } => {
            let (callback, rx) = reply::<bool>();
            bridge.is_win_back_offer_eligible(product_id, offer_id, callback);
            vec![rx.await.into_diagnostic()?]
        }
        Command::CanMakePayments => {
            let (callback, rx) = reply::<bool>();
            bridge.can_make_payments(callback);
            vec![rx.await.into_diagnostic()?]
        }
    };

    let stdout = io::stdout();
    let mut writer = TransactionWriter::new(stdout.lock());
    for message in &messages {
        writer.write_line(message).into_diagnostic()?;
    }

    if let Some(failure) = messages.iter().find(|m| is_failure(m)) {
        return Err(miette::miette!(
            "{}: {}",
            failure["code"].as_str().unwrap_or("Unknown"),
            failure["message"].as_str().unwrap_or_default()
        ));
    }
    Ok(())
}
