use super::model::DeferredEventDbObj;
use sqlx::{Executor, Sqlite};

/// The same log deferred twice keeps its first row
pub async fn insert_deferred_event<'c, E>(
    executor: E,
    deferred: &DeferredEventDbObj,
) -> Result<(), sqlx::Error>
where
    E: Executor<'c, Database = Sqlite>,
{
    sqlx::query(
        r"INSERT INTO deferred_event
(chain_id, tx_hash, log_index, block_number, event_json, reason, attempts, created_date, last_attempt_date)
VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
ON CONFLICT(chain_id, tx_hash, log_index) DO NOTHING
",
    )
    .bind(deferred.chain_id)
    .bind(&deferred.tx_hash)
    .bind(deferred.log_index)
    .bind(deferred.block_number)
    .bind(&deferred.event_json)
    .bind(&deferred.reason)
    .bind(deferred.attempts)
    .bind(deferred.created_date)
    .bind(deferred.last_attempt_date)
    .execute(executor)
    .await?;
    Ok(())
}

pub async fn get_deferred_events<'c, E>(
    executor: E,
    chain_id: i64,
) -> Result<Vec<DeferredEventDbObj>, sqlx::Error>
where
    E: Executor<'c, Database = Sqlite>,
{
    let rows = sqlx::query_as::<_, DeferredEventDbObj>(
        r"SELECT * FROM deferred_event WHERE chain_id = $1 ORDER BY block_number, log_index",
    )
    .bind(chain_id)
    .fetch_all(executor)
    .await?;
    Ok(rows)
}

pub async fn update_deferred_event_attempt<'c, E>(
    executor: E,
    deferred: &DeferredEventDbObj,
) -> Result<(), sqlx::Error>
where
    E: Executor<'c, Database = Sqlite>,
{
    sqlx::query(
        r"UPDATE deferred_event SET attempts = $2, reason = $3, last_attempt_date = $4 WHERE id = $1",
    )
    .bind(deferred.id)
    .bind(deferred.attempts)
    .bind(&deferred.reason)
    .bind(deferred.last_attempt_date)
    .execute(executor)
    .await?;
    Ok(())
}

pub async fn delete_deferred_event<'c, E>(executor: E, id: i64) -> Result<(), sqlx::Error>
where
    E: Executor<'c, Database = Sqlite>,
{
    sqlx::query(r"DELETE FROM deferred_event WHERE id = $1")
        .bind(id)
        .execute(executor)
        .await?;
    Ok(())
}

#[tokio::test]
async fn deferred_event_test() -> sqlx::Result<()> {
    use crate::setup_random_memory_sqlite_conn;
    let conn = setup_random_memory_sqlite_conn().await;

    let deferred = DeferredEventDbObj {
        id: -1,
        chain_id: 5003,
        tx_hash: "0xaa".to_string(),
        log_index: 3,
        block_number: 42,
        event_json: "{}".to_string(),
        reason: "commitment not mapped".to_string(),
        attempts: 0,
        created_date: chrono::Utc::now(),
        last_attempt_date: None,
    };
    insert_deferred_event(&conn, &deferred).await?;
    insert_deferred_event(&conn, &deferred).await?;

    let mut rows = get_deferred_events(&conn, 5003).await?;
    assert_eq!(rows.len(), 1);
    assert!(get_deferred_events(&conn, 23295).await?.is_empty());

    let mut row = rows.remove(0);
    row.attempts += 1;
    row.last_attempt_date = Some(chrono::Utc::now());
    update_deferred_event_attempt(&conn, &row).await?;
    assert_eq!(get_deferred_events(&conn, 5003).await?[0].attempts, 1);

    delete_deferred_event(&conn, row.id).await?;
    assert!(get_deferred_events(&conn, 5003).await?.is_empty());
    Ok(())
}
