use super::model::SettlementTxDbObj;
use sqlx::{Executor, Sqlite};

pub async fn insert_settlement_tx<'c, E>(
    executor: E,
    settlement_tx: &SettlementTxDbObj,
) -> Result<SettlementTxDbObj, sqlx::Error>
where
    E: Executor<'c, Database = Sqlite>,
{
    let res = sqlx::query_as::<_, SettlementTxDbObj>(
        r"INSERT INTO settlement_tx
(transfer_id, attempt, chain_id, from_addr, tx_hash, block_number, chain_status, error, created_date, confirm_date)
VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10) RETURNING *;
",
    )
    .bind(&settlement_tx.transfer_id)
    .bind(settlement_tx.attempt)
    .bind(settlement_tx.chain_id)
    .bind(&settlement_tx.from_addr)
    .bind(&settlement_tx.tx_hash)
    .bind(settlement_tx.block_number)
    .bind(settlement_tx.chain_status)
    .bind(&settlement_tx.error)
    .bind(settlement_tx.created_date)
    .bind(settlement_tx.confirm_date)
    .fetch_one(executor)
    .await?;
    Ok(res)
}

pub async fn get_settlement_txs_by_transfer<'c, E>(
    executor: E,
    transfer_id: &str,
) -> Result<Vec<SettlementTxDbObj>, sqlx::Error>
where
    E: Executor<'c, Database = Sqlite>,
{
    let rows = sqlx::query_as::<_, SettlementTxDbObj>(
        r"SELECT * FROM settlement_tx WHERE transfer_id = $1 ORDER BY id",
    )
    .bind(transfer_id)
    .fetch_all(executor)
    .await?;
    Ok(rows)
}

pub async fn get_last_settlement_txs<'c, E>(
    executor: E,
    limit: i64,
) -> Result<Vec<SettlementTxDbObj>, sqlx::Error>
where
    E: Executor<'c, Database = Sqlite>,
{
    let rows = sqlx::query_as::<_, SettlementTxDbObj>(
        r"SELECT * FROM settlement_tx ORDER BY id DESC LIMIT $1",
    )
    .bind(limit)
    .fetch_all(executor)
    .await?;
    Ok(rows)
}

#[tokio::test]
async fn settlement_tx_test() -> sqlx::Result<()> {
    use crate::setup_random_memory_sqlite_conn;
    let conn = setup_random_memory_sqlite_conn().await;

    let settlement_tx = SettlementTxDbObj {
        id: -1,
        transfer_id: "0xt1".to_string(),
        attempt: 3,
        chain_id: 23295,
        from_addr: "0x1111111111111111111111111111111111111111".to_string(),
        tx_hash: "0xbb".to_string(),
        block_number: Some(77),
        chain_status: Some(1),
        error: None,
        created_date: chrono::Utc::now(),
        confirm_date: Some(chrono::Utc::now()),
    };
    let inserted = insert_settlement_tx(&conn, &settlement_tx).await?;
    assert_eq!(inserted.id, 1);
    assert_eq!(inserted.tx_hash, "0xbb");

    let rows = get_settlement_txs_by_transfer(&conn, "0xt1").await?;
    assert_eq!(rows, vec![inserted]);
    assert!(get_settlement_txs_by_transfer(&conn, "0xt2").await?.is_empty());
    assert_eq!(get_last_settlement_txs(&conn, 10).await?.len(), 1);
    Ok(())
}
