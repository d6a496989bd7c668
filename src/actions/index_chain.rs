use crate::options::IndexOptions;
use cogito_relay_lib::chain_events::ContractSide;
use cogito_relay_lib::{err_custom_create, err_from};
use cogito_relay_lib::error::RelayError;
use cogito_relay_lib::indexer::run_indexer;
use cogito_relay_lib::runtime::{create_indexer, create_reconcile_engine, shutdown_signal};
use cogito_relay_lib::setup::RelaySetup;
use sqlx::SqlitePool;
use tokio::sync::watch;

pub async fn index_chain(
    conn: SqlitePool,
    setup: RelaySetup,
    index_options: IndexOptions,
) -> Result<(), RelayError> {
    let side = match index_options.chain.as_str() {
        "source" => ContractSide::Ingress,
        "destination" => ContractSide::Vault,
        other => return Err(err_custom_create!("Unknown chain {}", other)),
    };
    let engine = create_reconcile_engine(&setup, conn.clone(), None);
    let indexer = create_indexer(side, &setup, engine, conn, None);

    if index_options.once {
        let windows = indexer.index_to_head().await?;
        let applied: usize = windows.iter().map(|w| w.applied).sum();
        let deferred: usize = windows.iter().map(|w| w.deferred).sum();
        log::info!(
            "Indexed {} windows on chain {}, {} events applied, {} deferred",
            windows.len(),
            indexer.chain_id,
            applied,
            deferred
        );
        println!(
            "{}",
            serde_json::to_string_pretty(&windows).map_err(err_from!())?
        );
        return Ok(());
    }

    let (shutdown, shutdown_rx) = watch::channel(false);
    let handle = tokio::spawn(run_indexer(
        indexer,
        setup.engine.index_interval,
        shutdown_rx,
    ));
    shutdown_signal().await;
    log::info!("Shutdown requested, finishing current window");
    let _ = shutdown.send(true);
    handle
        .await
        .map_err(|e| err_custom_create!("Indexer task failed: {}", e))?;
    Ok(())
}
