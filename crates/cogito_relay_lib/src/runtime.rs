use crate::chain_events::ContractSide;
use crate::error::RelayError;
use crate::eth::Web3IngressReader;
use crate::indexer::{run_indexer, ChainIndexer, Web3LogSource};
use crate::reconcile::ReconcileEngine;
use crate::resolver::IdentifierResolver;
use crate::settlement::{
    run_processor, InFlightRegistry, SettlementProcessor, Web3SettlementContract,
};
use crate::setup::{ChainSetup, RelaySetup};
use crate::signer::PrivateKeySigner;
use crate::err_custom_create;
use cogito_relay_common::RelayEvent;
use sqlx::SqlitePool;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

#[derive(Debug, Clone, Copy)]
pub struct RuntimeOptions {
    pub run_indexers: bool,
    pub run_processor: bool,
}

impl Default for RuntimeOptions {
    fn default() -> Self {
        RuntimeOptions {
            run_indexers: true,
            run_processor: true,
        }
    }
}

pub struct RelayRuntime {
    pub setup: RelaySetup,
    pub conn: SqlitePool,
    pub engine: Arc<ReconcileEngine>,
    pub processor: Option<Arc<SettlementProcessor>>,
    handles: Vec<JoinHandle<()>>,
    shutdown: watch::Sender<bool>,
}

impl RelayRuntime {
    pub fn registry(&self) -> Option<Arc<InFlightRegistry>> {
        self.processor.as_ref().map(|processor| processor.registry())
    }

    /// Stops the periodic triggers, running work is allowed to finish
    pub fn shutdown(&self) {
        log::info!("Stopping relay tasks");
        if self.shutdown.send(true).is_err() {
            log::debug!("All relay tasks already finished");
        }
    }

    pub async fn join(self) {
        for handle in self.handles {
            if let Err(err) = handle.await {
                log::error!("Relay task failed: {}", err);
            }
        }
    }
}

pub fn create_reconcile_engine(
    setup: &RelaySetup,
    conn: SqlitePool,
    event_sender: Option<mpsc::Sender<RelayEvent>>,
) -> Arc<ReconcileEngine> {
    let reader = Arc::new(Web3IngressReader::new(
        setup.source.web3.clone(),
        setup.source.contract_address,
    ));
    let domain = setup.engine.default_destination_domain;
    Arc::new(ReconcileEngine::new(
        conn,
        IdentifierResolver::new(reader, domain),
        domain,
        event_sender,
    ))
}

pub fn create_indexer(
    side: ContractSide,
    setup: &RelaySetup,
    engine: Arc<ReconcileEngine>,
    conn: SqlitePool,
    event_sender: Option<mpsc::Sender<RelayEvent>>,
) -> Arc<ChainIndexer> {
    let chain: &ChainSetup = match side {
        ContractSide::Ingress => &setup.source,
        ContractSide::Vault => &setup.destination,
    };
    Arc::new(ChainIndexer::new(
        side,
        chain,
        setup.engine.max_deferred_attempts,
        Arc::new(Web3LogSource::new(chain.web3.clone())),
        engine,
        conn,
        event_sender,
    ))
}

pub fn create_settlement_processor(
    setup: &RelaySetup,
    conn: SqlitePool,
    event_sender: Option<mpsc::Sender<RelayEvent>>,
) -> Result<Arc<SettlementProcessor>, RelayError> {
    let secret_key = setup
        .secret_key
        .ok_or_else(|| err_custom_create!("Settlement requires a signing key"))?;
    let signer = PrivateKeySigner::new(secret_key);
    let from = signer.address();
    let contract = Web3SettlementContract::new(setup.destination.clone(), Arc::new(signer), from);
    Ok(Arc::new(SettlementProcessor::new(
        conn,
        Arc::new(contract),
        &setup.engine,
        event_sender,
    )))
}

pub async fn start_relay_engine(
    setup: RelaySetup,
    conn: SqlitePool,
    options: RuntimeOptions,
    event_sender: Option<mpsc::Sender<RelayEvent>>,
) -> Result<RelayRuntime, RelayError> {
    log::debug!(
        "Starting relay engine: {}",
        serde_json::to_string_pretty(&setup).unwrap_or_default()
    );
    let (shutdown, shutdown_rx) = watch::channel(false);
    let engine = create_reconcile_engine(&setup, conn.clone(), event_sender.clone());
    let mut handles = Vec::new();

    if options.run_indexers {
        for side in [ContractSide::Ingress, ContractSide::Vault] {
            let indexer = create_indexer(
                side,
                &setup,
                engine.clone(),
                conn.clone(),
                event_sender.clone(),
            );
            handles.push(tokio::spawn(run_indexer(
                indexer,
                setup.engine.index_interval,
                shutdown_rx.clone(),
            )));
        }
    } else {
        log::warn!("Indexers disabled, transfers will not be updated");
    }

    let processor = if options.run_processor {
        let processor = create_settlement_processor(&setup, conn.clone(), event_sender)?;
        handles.push(tokio::spawn(run_processor(
            processor.clone(),
            setup.engine.poll_interval,
            shutdown_rx,
        )));
        Some(processor)
    } else {
        log::warn!("Settlement processor disabled");
        None
    };

    Ok(RelayRuntime {
        setup,
        conn,
        engine,
        processor,
        handles,
        shutdown,
    })
}

/// Resolves on Ctrl-C, or SIGTERM on unix
pub async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(err) => {
                log::warn!("Cannot listen for SIGTERM: {}", err);
                if let Err(err) = tokio::signal::ctrl_c().await {
                    log::error!("Cannot listen for Ctrl-C: {}", err);
                }
            }
        }
    }
    #[cfg(not(unix))]
    {
        if let Err(err) = tokio::signal::ctrl_c().await {
            log::error!("Cannot listen for Ctrl-C: {}", err);
        }
    }
}
