use anyhow::{Context, Result};
use hap_core::BridgeConfig;
use hap_discovery::{local_ipv4, HapZone, MulticastSocket, Responder};
use hap_model::{Catalog, Loader};
use hap_pairing::{AccessoryIdentity, MemoryPairingStore, PairingStore};
use hap_server::{EventWriter, MemoryExchange, PeriodicWriter, Router, Server, Subscriber, Writer};
use std::cell::RefCell;
use std::net::{Ipv4Addr, SocketAddr};
use std::rc::Rc;
use std::sync::Arc;
use tokio::runtime::Builder;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = match std::env::args().nth(1) {
        Some(path) => BridgeConfig::load(&path).with_context(|| format!("Loading {}", path))?,
        None => {
            warn!("No configuration given, starting an empty bridge");
            BridgeConfig::default()
        }
    };

    // The object graph is shared through Rc, so everything runs on one
    // thread inside a LocalSet.
    let rt = Builder::new_current_thread().enable_all().build()?;
    let handle = std::thread::spawn(move || {
        let local = tokio::task::LocalSet::new();
        local.block_on(&rt, run(config))
    });

    match handle.join() {
        Ok(result) => result,
        Err(_) => anyhow::bail!("Bridge thread panicked"),
    }
}

async fn run(config: BridgeConfig) -> Result<()> {
    let catalog = Arc::new(Catalog::bundled()?);
    let bridge = Rc::new(RefCell::new(Loader::new(catalog).load(&config)?));
    info!(
        name = %config.name,
        accessories = bridge.borrow().accessories().len(),
        "Object graph loaded"
    );

    let device_id = config.device_id()?;
    let identity = match &config.identity_file {
        Some(path) => AccessoryIdentity::load_or_generate(device_id, path)?,
        None => AccessoryIdentity::generate(device_id),
    };

    let store = Arc::new(MemoryPairingStore::new());
    let exchange = Arc::new(MemoryExchange::new());
    let subscriber = Rc::new(RefCell::new(Subscriber::new()));
    let (paired_tx, mut paired_rx) = watch::channel(store.is_paired().await?);

    let router = Rc::new(Router::new(
        bridge.clone(),
        subscriber.clone(),
        identity,
        store,
        exchange.clone(),
        &config.pin_code,
        paired_tx,
    ));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let server = Server::bind(SocketAddr::from((Ipv4Addr::UNSPECIFIED, config.port)), router).await?;
    let server_task = tokio::task::spawn_local(server.run(shutdown_rx.clone()));

    let address = local_ipv4()?;
    let zone = HapZone::build(&config, address, *paired_rx.borrow())?;
    let responder = Rc::new(Responder::new(MulticastSocket::bind()?, zone, address));
    let responder_task = {
        let responder = responder.clone();
        let shutdown = shutdown_rx.clone();
        tokio::task::spawn_local(async move { responder.run(shutdown).await })
    };

    {
        let responder = responder.clone();
        tokio::task::spawn_local(async move {
            while paired_rx.changed().await.is_ok() {
                let paired = *paired_rx.borrow();
                if let Err(e) = responder.set_paired(paired).await {
                    warn!(paired, error = %e, "Failed to refresh advertisement");
                }
            }
        });
    }

    let mut periodic = PeriodicWriter::new(bridge.clone(), subscriber.clone(), exchange.clone());
    let mut events = EventWriter::new(bridge, subscriber, exchange.subscribe());
    periodic.connect();
    events.connect();

    tokio::signal::ctrl_c().await?;
    info!("Shutting down");

    periodic.disconnect();
    events.disconnect();
    let _ = shutdown_tx.send(true);

    if let Ok(Err(e)) = server_task.await {
        error!(error = %e, "HAP server failed");
    }
    if let Ok(Err(e)) = responder_task.await {
        error!(error = %e, "mDNS responder failed");
    }
    Ok(())
}
