use super::model::DepositDbObj;
use sqlx::{Executor, Sqlite};

/// Plain insert, a second deposit with the same id is rejected by the primary key
pub async fn insert_deposit<'c, E>(
    executor: E,
    deposit: &DepositDbObj,
) -> Result<DepositDbObj, sqlx::Error>
where
    E: Executor<'c, Database = Sqlite>,
{
    let res = sqlx::query_as::<_, DepositDbObj>(
        r"INSERT INTO deposit
(deposit_id, depositor, token, initial_amount, remaining_amount, is_native, released, created_at, created_at_block, tx_hash, last_used_at)
VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11) RETURNING *;
",
    )
    .bind(&deposit.deposit_id)
    .bind(&deposit.depositor)
    .bind(&deposit.token)
    .bind(&deposit.initial_amount)
    .bind(&deposit.remaining_amount)
    .bind(deposit.is_native)
    .bind(deposit.released)
    .bind(deposit.created_at)
    .bind(deposit.created_at_block)
    .bind(&deposit.tx_hash)
    .bind(deposit.last_used_at)
    .fetch_one(executor)
    .await?;
    Ok(res)
}

/// Only the mutable part of a deposit is written
pub async fn update_deposit<'c, E>(executor: E, deposit: &DepositDbObj) -> Result<(), sqlx::Error>
where
    E: Executor<'c, Database = Sqlite>,
{
    let _res = sqlx::query(
        r"UPDATE deposit SET
remaining_amount = $2,
released = $3,
last_used_at = $4
WHERE deposit_id = $1
",
    )
    .bind(&deposit.deposit_id)
    .bind(&deposit.remaining_amount)
    .bind(deposit.released)
    .bind(deposit.last_used_at)
    .execute(executor)
    .await?;
    Ok(())
}

pub async fn get_deposit<'c, E>(
    executor: E,
    deposit_id: &str,
) -> Result<Option<DepositDbObj>, sqlx::Error>
where
    E: Executor<'c, Database = Sqlite>,
{
    let row = sqlx::query_as::<_, DepositDbObj>(r"SELECT * FROM deposit WHERE deposit_id = $1")
        .bind(deposit_id)
        .fetch_optional(executor)
        .await?;
    Ok(row)
}

pub async fn get_deposits_by_depositor<'c, E>(
    executor: E,
    depositor: &str,
    limit: Option<i64>,
) -> Result<Vec<DepositDbObj>, sqlx::Error>
where
    E: Executor<'c, Database = Sqlite>,
{
    let limit = limit.unwrap_or(i64::MAX);
    let rows = sqlx::query_as::<_, DepositDbObj>(
        r"SELECT * FROM deposit WHERE depositor = $1 ORDER BY created_at_block DESC LIMIT $2",
    )
    .bind(depositor)
    .bind(limit)
    .fetch_all(executor)
    .await?;
    Ok(rows)
}
