use super::model::ScanDaoDbObj;
use sqlx::{Executor, Sqlite};

pub async fn get_scan_info<'c, E>(
    executor: E,
    chain_id: i64,
    filter: &str,
) -> Result<Option<ScanDaoDbObj>, sqlx::Error>
where
    E: Executor<'c, Database = Sqlite>,
{
    let row = sqlx::query_as::<_, ScanDaoDbObj>(
        r"SELECT * FROM scan_info WHERE chain_id = $1 AND filter = $2",
    )
    .bind(chain_id)
    .bind(filter)
    .fetch_optional(executor)
    .await?;
    Ok(row)
}

pub async fn get_all_scan_info<'c, E>(executor: E) -> Result<Vec<ScanDaoDbObj>, sqlx::Error>
where
    E: Executor<'c, Database = Sqlite>,
{
    let rows = sqlx::query_as::<_, ScanDaoDbObj>(r"SELECT * FROM scan_info ORDER BY chain_id")
        .fetch_all(executor)
        .await?;
    Ok(rows)
}

pub async fn delete_scan_info<'c, E>(
    executor: E,
    chain_id: i64,
    filter: &str,
) -> Result<(), sqlx::Error>
where
    E: Executor<'c, Database = Sqlite>,
{
    sqlx::query(r"DELETE FROM scan_info WHERE chain_id = $1 AND filter = $2")
        .bind(chain_id)
        .bind(filter)
        .execute(executor)
        .await?;
    Ok(())
}

pub async fn upsert_scan_info<'c, E>(
    executor: E,
    scan_dao: &ScanDaoDbObj,
) -> Result<ScanDaoDbObj, sqlx::Error>
where
    E: Executor<'c, Database = Sqlite>,
{
    let res = sqlx::query_as::<_, ScanDaoDbObj>(
        r"INSERT INTO scan_info
(chain_id, filter, start_block, last_block)
VALUES ($1, $2, $3, $4)
ON CONFLICT(chain_id, filter) DO UPDATE SET last_block = excluded.last_block
RETURNING *;
",
    )
    .bind(scan_dao.chain_id)
    .bind(&scan_dao.filter)
    .bind(scan_dao.start_block)
    .bind(scan_dao.last_block)
    .fetch_one(executor)
    .await?;
    Ok(res)
}

#[tokio::test]
async fn scan_info_test() -> sqlx::Result<()> {
    use crate::setup_random_memory_sqlite_conn;
    let conn = setup_random_memory_sqlite_conn().await;

    let scan_info_to_insert = ScanDaoDbObj {
        id: -1,
        chain_id: 5003,
        filter: "ingress".to_string(),
        start_block: 77,
        last_block: 6666,
    };

    let scan_info_from_insert = upsert_scan_info(&conn, &scan_info_to_insert).await?;
    assert_eq!(scan_info_from_insert.id, 1);
    let scan_info_from_dao = get_scan_info(&conn, 5003, "ingress").await?.unwrap();
    assert_eq!(scan_info_from_insert, scan_info_from_dao);

    assert_eq!(None, get_scan_info(&conn, 5003, "vault").await?);
    assert_eq!(None, get_scan_info(&conn, 23295, "ingress").await?);

    //cursor moves, start block and row id stay
    let moved = upsert_scan_info(
        &conn,
        &ScanDaoDbObj {
            last_block: 7000,
            start_block: 1,
            ..scan_info_to_insert.clone()
        },
    )
    .await?;
    assert_eq!(moved.id, 1);
    assert_eq!(moved.start_block, 77);
    assert_eq!(moved.last_block, 7000);
    assert_eq!(get_all_scan_info(&conn).await?.len(), 1);

    delete_scan_info(&conn, 5003, "ingress").await?;
    assert_eq!(None, get_scan_info(&conn, 5003, "ingress").await?);

    Ok(())
}
