use crate::options::SettleOptions;
use cogito_relay_lib::error::RelayError;
use cogito_relay_lib::runtime::create_settlement_processor;
use cogito_relay_lib::setup::RelaySetup;
use cogito_relay_lib::utils::parse_id;
use cogito_relay_lib::{err_custom_create, err_from};
use sqlx::SqlitePool;

pub async fn settle_transfer(
    conn: SqlitePool,
    setup: RelaySetup,
    settle_options: SettleOptions,
) -> Result<(), RelayError> {
    let transfer_id = parse_id(&settle_options.transfer_id).map_err(err_from!())?;
    let processor = create_settlement_processor(&setup, conn, None)?;

    let outcome = processor.settle_one(transfer_id).await?;
    println!(
        "{}",
        serde_json::to_string_pretty(&outcome).map_err(err_from!())?
    );
    if !outcome.success {
        return Err(err_custom_create!(
            "Settlement of {} failed after {} attempts",
            outcome.transfer_id,
            outcome.attempts
        ));
    }
    Ok(())
}

pub async fn process_once(conn: SqlitePool, setup: RelaySetup) -> Result<(), RelayError> {
    let processor = create_settlement_processor(&setup, conn, None)?;

    match processor.run_cycle().await? {
        Some(report) => {
            println!(
                "{}",
                serde_json::to_string_pretty(&report).map_err(err_from!())?
            );
            if report.failed > 0 {
                log::warn!("{} transfers failed to settle", report.failed);
            }
        }
        None => log::warn!("Another settlement cycle is running, nothing done"),
    }
    Ok(())
}
