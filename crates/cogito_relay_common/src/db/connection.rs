use crate::err_from;
use crate::error::RelayError;
use sqlx::migrate::Migrator;
use sqlx::sqlite::SqliteConnectOptions;
use sqlx::SqlitePool;
use std::env;
use std::str::FromStr;

static MIGRATOR: Migrator = sqlx::migrate!();

/// Opens the record store. Without `file_name` an in-memory database named `memory_name`
/// is created, the pool holds a single connection so the database lives as long as the pool.
pub async fn create_sqlite_connection(
    file_name: Option<&str>,
    memory_name: Option<&str>,
    read_only: bool,
    run_migrations: bool,
) -> Result<SqlitePool, RelayError> {
    let url = if let Some(file_name) = file_name {
        format!("sqlite://{file_name}")
    } else {
        format!("file:{}?mode=memory", memory_name.unwrap_or("mem"))
    };

    let mut journal_mode = match env::var("RELAY_SQLITE_JOURNAL_MODE") {
        Ok(val) => sqlx::sqlite::SqliteJournalMode::from_str(&val).map_err(err_from!())?,
        Err(_) => sqlx::sqlite::SqliteJournalMode::Wal,
    };
    if read_only {
        journal_mode = sqlx::sqlite::SqliteJournalMode::Off;
    }

    let conn_opt = SqliteConnectOptions::from_str(&url)
        .map_err(err_from!())?
        .journal_mode(journal_mode)
        .read_only(read_only)
        .create_if_missing(!read_only);

    let pool = sqlx::sqlite::SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(conn_opt)
        .await
        .map_err(err_from!())?;

    if run_migrations {
        log::debug!("Running record store migrations");
        MIGRATOR.run(&pool).await.map_err(err_from!())?;
    }

    Ok(pool)
}

/// In-memory store with migrations applied, used by tests
pub async fn setup_random_memory_sqlite_conn() -> SqlitePool {
    create_sqlite_connection(None, None, false, true)
        .await
        .expect("in-memory sqlite")
}
