mod deferred_event_ops;
mod deposit_ops;
mod scan_ops;
mod settlement_tx_ops;
mod transfer_ops;
mod user_activity_ops;

use super::model;
pub use deferred_event_ops::*;
pub use deposit_ops::*;
pub use scan_ops::*;
pub use settlement_tx_ops::*;
use std::future::Future;
use std::time::Duration;
pub use transfer_ops::*;
pub use user_activity_ops::*;

const LOCKED_TIMEOUT: Duration = std::time::Duration::from_secs(300);

///Usage example:
/// do_db_operation(|| get_transfers_by_status(&conn, TransferStatus::Stored, None)).await?;
/// Sqlite returns "database is locked" when the file is shared with read clients,
/// retry until success or LOCKED_TIMEOUT.
pub async fn do_db_operation<R, Fun, Fut>(operation: Fun) -> Result<R, sqlx::Error>
where
    Fun: Fn() -> Fut,
    Fut: Future<Output = Result<R, sqlx::Error>>,
{
    let instant = std::time::Instant::now();
    loop {
        let res = operation().await;
        if res.is_err() && instant.elapsed() > LOCKED_TIMEOUT {
            log::error!(
                "Database is locked for {} seconds. Aborting...",
                LOCKED_TIMEOUT.as_secs()
            );
        } else if let Err(err) = &res {
            if let Some(db) = err.as_database_error() {
                if db.message() == "database is locked" {
                    log::warn!(
                        "Database is locked for {:.1} seconds. Trying again...",
                        instant.elapsed().as_secs_f64()
                    );
                    tokio::time::sleep(std::time::Duration::from_millis(100)).await;
                    continue;
                }
            }
        }
        break res;
    }
}
