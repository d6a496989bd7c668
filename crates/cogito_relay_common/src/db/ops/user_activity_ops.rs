use super::model::{ActivityType, UserActivityDbObj};
use sqlx::{Executor, Sqlite};

/// Idempotent insert, returns false when a row with the same id already exists
pub async fn insert_user_activity_ignore<'c, E>(
    executor: E,
    activity: &UserActivityDbObj,
) -> Result<bool, sqlx::Error>
where
    E: Executor<'c, Database = Sqlite>,
{
    let res = sqlx::query(
        r"INSERT INTO user_activity
(id, user_addr, activity_type, deposit_id, transfer_id, amount, token, is_native, occurred_at, block_number, tx_hash, receiver, sender)
VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
ON CONFLICT(id) DO NOTHING
",
    )
    .bind(&activity.id)
    .bind(&activity.user_addr)
    .bind(&activity.activity_type)
    .bind(&activity.deposit_id)
    .bind(&activity.transfer_id)
    .bind(&activity.amount)
    .bind(&activity.token)
    .bind(activity.is_native)
    .bind(activity.occurred_at)
    .bind(activity.block_number)
    .bind(&activity.tx_hash)
    .bind(&activity.receiver)
    .bind(&activity.sender)
    .execute(executor)
    .await?;
    Ok(res.rows_affected() == 1)
}

pub async fn update_user_activity<'c, E>(
    executor: E,
    activity: &UserActivityDbObj,
) -> Result<(), sqlx::Error>
where
    E: Executor<'c, Database = Sqlite>,
{
    let _res = sqlx::query(
        r"UPDATE user_activity SET
amount = $2,
token = $3,
is_native = $4,
receiver = $5,
sender = $6
WHERE id = $1
",
    )
    .bind(&activity.id)
    .bind(&activity.amount)
    .bind(&activity.token)
    .bind(activity.is_native)
    .bind(&activity.receiver)
    .bind(&activity.sender)
    .execute(executor)
    .await?;
    Ok(())
}

pub async fn get_user_activity<'c, E>(
    executor: E,
    id: &str,
) -> Result<Option<UserActivityDbObj>, sqlx::Error>
where
    E: Executor<'c, Database = Sqlite>,
{
    let row =
        sqlx::query_as::<_, UserActivityDbObj>(r"SELECT * FROM user_activity WHERE id = $1")
            .bind(id)
            .fetch_optional(executor)
            .await?;
    Ok(row)
}

/// SEND and RECEIVE rows exist at most once per user and transfer
pub async fn find_transfer_activity<'c, E>(
    executor: E,
    transfer_id: &str,
    activity_type: ActivityType,
) -> Result<Option<UserActivityDbObj>, sqlx::Error>
where
    E: Executor<'c, Database = Sqlite>,
{
    let row = sqlx::query_as::<_, UserActivityDbObj>(
        r"SELECT * FROM user_activity WHERE transfer_id = $1 AND activity_type = $2 ORDER BY occurred_at LIMIT 1",
    )
    .bind(transfer_id)
    .bind(activity_type.as_str())
    .fetch_optional(executor)
    .await?;
    Ok(row)
}

pub async fn get_user_activities<'c, E>(
    executor: E,
    user_addr: &str,
    limit: Option<i64>,
) -> Result<Vec<UserActivityDbObj>, sqlx::Error>
where
    E: Executor<'c, Database = Sqlite>,
{
    let limit = limit.unwrap_or(i64::MAX);
    let rows = sqlx::query_as::<_, UserActivityDbObj>(
        r"SELECT * FROM user_activity WHERE user_addr = $1 ORDER BY occurred_at DESC, id LIMIT $2",
    )
    .bind(user_addr)
    .bind(limit)
    .fetch_all(executor)
    .await?;
    Ok(rows)
}
