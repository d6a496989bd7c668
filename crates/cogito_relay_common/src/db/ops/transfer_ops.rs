use super::model::{TransferDbObj, TransferStatus};
use sqlx::{Executor, Sqlite};

pub const TRANSFER_COLUMNS: &str = "transfer_id, deposit_id, sender, destination_domain, encrypted_data_hash, \
initiated_at, initiated_at_block, initiated_tx_hash, receiver, token, amount, is_native, status, \
stored_at, stored_at_block, acknowledged_at, acknowledged_at_block, processed_at, processed_at_block, \
completed_at, completed_at_block, completed_tx_hash, deposit_debited";

/// Writes the whole merged record, the caller computes it inside the same transaction
pub async fn upsert_transfer<'c, E>(
    executor: E,
    transfer: &TransferDbObj,
) -> Result<TransferDbObj, sqlx::Error>
where
    E: Executor<'c, Database = Sqlite>,
{
    let res = sqlx::query_as::<_, TransferDbObj>(&format!(
        r"INSERT OR REPLACE INTO transfer ({TRANSFER_COLUMNS})
VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19, $20, $21, $22, $23)
RETURNING *;
"
    ))
    .bind(&transfer.transfer_id)
    .bind(&transfer.deposit_id)
    .bind(&transfer.sender)
    .bind(transfer.destination_domain)
    .bind(&transfer.encrypted_data_hash)
    .bind(transfer.initiated_at)
    .bind(transfer.initiated_at_block)
    .bind(&transfer.initiated_tx_hash)
    .bind(&transfer.receiver)
    .bind(&transfer.token)
    .bind(&transfer.amount)
    .bind(transfer.is_native)
    .bind(&transfer.status)
    .bind(transfer.stored_at)
    .bind(transfer.stored_at_block)
    .bind(transfer.acknowledged_at)
    .bind(transfer.acknowledged_at_block)
    .bind(transfer.processed_at)
    .bind(transfer.processed_at_block)
    .bind(transfer.completed_at)
    .bind(transfer.completed_at_block)
    .bind(&transfer.completed_tx_hash)
    .bind(transfer.deposit_debited)
    .fetch_one(executor)
    .await?;
    Ok(res)
}

pub async fn get_transfer<'c, E>(
    executor: E,
    transfer_id: &str,
) -> Result<Option<TransferDbObj>, sqlx::Error>
where
    E: Executor<'c, Database = Sqlite>,
{
    let row = sqlx::query_as::<_, TransferDbObj>(r"SELECT * FROM transfer WHERE transfer_id = $1")
        .bind(transfer_id)
        .fetch_optional(executor)
        .await?;
    Ok(row)
}

pub async fn get_transfers_by_status<'c, E>(
    executor: E,
    status: TransferStatus,
    limit: Option<i64>,
) -> Result<Vec<TransferDbObj>, sqlx::Error>
where
    E: Executor<'c, Database = Sqlite>,
{
    let limit = limit.unwrap_or(i64::MAX);
    let rows = sqlx::query_as::<_, TransferDbObj>(
        r"SELECT * FROM transfer WHERE status = $1 ORDER BY initiated_at_block, transfer_id LIMIT $2",
    )
    .bind(status.as_str())
    .bind(limit)
    .fetch_all(executor)
    .await?;
    Ok(rows)
}

pub async fn get_transfers<'c, E>(
    executor: E,
    limit: Option<i64>,
) -> Result<Vec<TransferDbObj>, sqlx::Error>
where
    E: Executor<'c, Database = Sqlite>,
{
    let limit = limit.unwrap_or(i64::MAX);
    let rows = sqlx::query_as::<_, TransferDbObj>(
        r"SELECT * FROM transfer ORDER BY initiated_at_block DESC LIMIT $1",
    )
    .bind(limit)
    .fetch_all(executor)
    .await?;
    Ok(rows)
}

pub async fn get_transfers_by_deposit<'c, E>(
    executor: E,
    deposit_id: &str,
) -> Result<Vec<TransferDbObj>, sqlx::Error>
where
    E: Executor<'c, Database = Sqlite>,
{
    let rows = sqlx::query_as::<_, TransferDbObj>(
        r"SELECT * FROM transfer WHERE deposit_id = $1 ORDER BY initiated_at_block",
    )
    .bind(deposit_id)
    .fetch_all(executor)
    .await?;
    Ok(rows)
}

pub async fn get_transfers_by_sender<'c, E>(
    executor: E,
    sender: &str,
    limit: Option<i64>,
) -> Result<Vec<TransferDbObj>, sqlx::Error>
where
    E: Executor<'c, Database = Sqlite>,
{
    let limit = limit.unwrap_or(i64::MAX);
    let rows = sqlx::query_as::<_, TransferDbObj>(
        r"SELECT * FROM transfer WHERE sender = $1 ORDER BY initiated_at_block DESC LIMIT $2",
    )
    .bind(sender)
    .bind(limit)
    .fetch_all(executor)
    .await?;
    Ok(rows)
}

#[derive(sqlx::FromRow, serde::Serialize, Debug, Clone, PartialEq, Eq)]
pub struct TransferStatusCount {
    pub status: String,
    pub count: i64,
}

pub async fn get_transfer_count_by_status<'c, E>(
    executor: E,
) -> Result<Vec<TransferStatusCount>, sqlx::Error>
where
    E: Executor<'c, Database = Sqlite>,
{
    let rows = sqlx::query_as::<_, TransferStatusCount>(
        r"SELECT status, COUNT(*) as count FROM transfer GROUP BY status ORDER BY status",
    )
    .fetch_all(executor)
    .await?;
    Ok(rows)
}
