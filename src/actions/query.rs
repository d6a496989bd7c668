use crate::options::{ActivityOptions, DepositOptions, TransfersOptions};
use cogito_relay_lib::db::model::TransferStatus;
use cogito_relay_lib::db::ops::{
    get_deposit, get_deposits_by_depositor, get_transfers, get_transfers_by_deposit,
    get_transfers_by_status, get_user_activities,
};
use cogito_relay_lib::error::RelayError;
use cogito_relay_lib::utils::{format_addr, format_id, parse_addr, parse_id};
use cogito_relay_lib::{err_custom_create, err_from};
use serde_json::json;
use sqlx::SqlitePool;
use std::str::FromStr;

fn print_json(value: &serde_json::Value) -> Result<(), RelayError> {
    println!(
        "{}",
        serde_json::to_string_pretty(value).map_err(err_from!())?
    );
    Ok(())
}

pub async fn transfers_list(
    conn: &SqlitePool,
    transfers_options: TransfersOptions,
) -> Result<(), RelayError> {
    let limit = Some(transfers_options.limit);
    let transfers = match &transfers_options.status {
        Some(status) => {
            let status = TransferStatus::from_str(status).map_err(|e| err_custom_create!("{}", e))?;
            get_transfers_by_status(conn, status, limit)
                .await
                .map_err(err_from!())?
        }
        None => get_transfers(conn, limit).await.map_err(err_from!())?,
    };
    log::info!("Found {} transfers", transfers.len());
    print_json(&json!({ "transfers": transfers }))
}

pub async fn deposit_details(
    conn: &SqlitePool,
    deposit_options: DepositOptions,
) -> Result<(), RelayError> {
    let deposit_id = format_id(parse_id(&deposit_options.deposit_id).map_err(err_from!())?);
    let deposit = get_deposit(conn, &deposit_id)
        .await
        .map_err(err_from!())?
        .ok_or_else(|| err_custom_create!("Deposit {} not found", deposit_id))?;
    let transfers = get_transfers_by_deposit(conn, &deposit_id)
        .await
        .map_err(err_from!())?;
    print_json(&json!({
        "deposit": deposit,
        "transfers": transfers,
    }))
}

pub async fn user_activity(
    conn: &SqlitePool,
    activity_options: ActivityOptions,
) -> Result<(), RelayError> {
    let user = format_addr(parse_addr(&activity_options.user).map_err(err_from!())?);
    let activities = get_user_activities(conn, &user, activity_options.limit)
        .await
        .map_err(err_from!())?;
    let deposits = get_deposits_by_depositor(conn, &user, None)
        .await
        .map_err(err_from!())?;
    print_json(&json!({
        "user": user,
        "activities": activities,
        "deposits": deposits,
    }))
}
