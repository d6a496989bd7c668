use crate::db::model::TransferStatus;
use crate::db::ops::*;
use crate::settlement::InFlightRegistry;
use crate::setup::RelaySetup;
use crate::utils::{format_addr, format_id, parse_addr, parse_id};
use actix_web::web::Data;
use actix_web::{web, HttpRequest, Responder, Scope};
use serde::Deserialize;
use serde_json::json;
use sqlx::SqlitePool;
use std::str::FromStr;
use std::sync::Arc;

pub struct ServerData {
    pub db_connection: SqlitePool,
    pub setup: RelaySetup,
    /// present when the settlement processor runs in this process
    pub registry: Option<Arc<InFlightRegistry>>,
}

macro_rules! return_on_error {
    ( $e:expr ) => {
        match $e {
            Ok(x) => x,
            Err(err) => {
                return web::Json(json!({
                    "error": err.to_string()
                }))
            },
        }
    }
}

fn path_id(req: &HttpRequest, name: &str) -> Result<String, String> {
    let raw = req.match_info().get(name).unwrap_or("");
    parse_id(raw)
        .map(format_id)
        .map_err(|err| format!("failed to parse {name}: {err}"))
}

#[derive(Deserialize)]
pub struct TransfersQuery {
    pub status: Option<String>,
    pub limit: Option<i64>,
}

pub async fn transfers(
    data: Data<Box<ServerData>>,
    query: web::Query<TransfersQuery>,
) -> impl Responder {
    let transfers = match &query.status {
        Some(status) => {
            let status = return_on_error!(TransferStatus::from_str(status));
            return_on_error!(
                do_db_operation(|| get_transfers_by_status(&data.db_connection, status, query.limit))
                    .await
            )
        }
        None => return_on_error!(
            do_db_operation(|| get_transfers(&data.db_connection, query.limit)).await
        ),
    };

    web::Json(json!({
        "transfers": transfers,
    }))
}

pub async fn transfer_details(data: Data<Box<ServerData>>, req: HttpRequest) -> impl Responder {
    let transfer_id = return_on_error!(path_id(&req, "transfer_id"));
    let transfer = return_on_error!(get_transfer(&data.db_connection, &transfer_id).await);
    let in_flight = match (&data.registry, &transfer) {
        (Some(registry), Some(transfer)) => registry.contains(&transfer.transfer_id),
        _ => false,
    };

    web::Json(json!({
        "transfer": transfer,
        "inFlight": in_flight,
    }))
}

pub async fn transfer_settlements(
    data: Data<Box<ServerData>>,
    req: HttpRequest,
) -> impl Responder {
    let transfer_id = return_on_error!(path_id(&req, "transfer_id"));
    let settlements =
        return_on_error!(get_settlement_txs_by_transfer(&data.db_connection, &transfer_id).await);

    web::Json(json!({
        "settlements": settlements,
    }))
}

pub async fn deposit_details(data: Data<Box<ServerData>>, req: HttpRequest) -> impl Responder {
    let deposit_id = return_on_error!(path_id(&req, "deposit_id"));
    let deposit = return_on_error!(get_deposit(&data.db_connection, &deposit_id).await);

    web::Json(json!({
        "deposit": deposit,
    }))
}

pub async fn deposit_transfers(data: Data<Box<ServerData>>, req: HttpRequest) -> impl Responder {
    let deposit_id = return_on_error!(path_id(&req, "deposit_id"));
    let transfers =
        return_on_error!(get_transfers_by_deposit(&data.db_connection, &deposit_id).await);

    web::Json(json!({
        "transfers": transfers,
    }))
}

pub async fn user_activity(data: Data<Box<ServerData>>, req: HttpRequest) -> impl Responder {
    let user = req.match_info().get("user").unwrap_or("");
    let user = return_on_error!(parse_addr(user).map(format_addr));
    let activities = return_on_error!(get_user_activities(&data.db_connection, &user, None).await);
    let deposits =
        return_on_error!(get_deposits_by_depositor(&data.db_connection, &user, None).await);
    let sent = return_on_error!(get_transfers_by_sender(&data.db_connection, &user, None).await);

    web::Json(json!({
        "user": user,
        "activities": activities,
        "deposits": deposits,
        "sentTransfers": sent,
    }))
}

pub async fn stats(data: Data<Box<ServerData>>) -> impl Responder {
    let counts =
        return_on_error!(do_db_operation(|| get_transfer_count_by_status(&data.db_connection)).await);
    let last_settlements = return_on_error!(get_last_settlement_txs(&data.db_connection, 10).await);
    let scan_info = return_on_error!(get_all_scan_info(&data.db_connection).await);
    let (in_flight, cycle_active) = match &data.registry {
        Some(registry) => (registry.len(), registry.is_cycle_active()),
        None => (0, false),
    };

    web::Json(json!({
        "transfers": counts,
        "inFlight": in_flight,
        "cycleActive": cycle_active,
        "lastSettlements": last_settlements,
        "scanInfo": scan_info,
    }))
}

pub async fn config_endpoint(data: Data<Box<ServerData>>) -> impl Responder {
    web::Json(json!({
        "config": data.setup,
    }))
}

pub async fn greet(_req: HttpRequest) -> impl Responder {
    const VERSION: &str = env!("CARGO_PKG_VERSION");
    web::Json(json!({
        "name": "cogito_relayer",
        "version": VERSION,
    }))
}

pub fn runtime_web_scope(scope: Scope, server_data: Data<Box<ServerData>>) -> Scope {
    let api_scope = Scope::new("/api")
        .app_data(server_data)
        .route("/config", web::get().to(config_endpoint))
        .route("/transfers", web::get().to(transfers))
        .route("/transfers/{transfer_id}", web::get().to(transfer_details))
        .route(
            "/transfers/{transfer_id}/settlements",
            web::get().to(transfer_settlements),
        )
        .route("/deposits/{deposit_id}", web::get().to(deposit_details))
        .route(
            "/deposits/{deposit_id}/transfers",
            web::get().to(deposit_transfers),
        )
        .route("/activity/{user}", web::get().to(user_activity))
        .route("/stats", web::get().to(stats))
        .route("/", web::get().to(greet))
        .route("/version", web::get().to(greet));

    scope.service(api_scope)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::tests::TEST_CONFIG;
    use crate::config::Config;
    use crate::db::setup_random_memory_sqlite_conn;
    use crate::reconcile::{apply_transfer_event, StepInfo, TransferEvent, TransferUpdate};
    use actix_web::{test, App};
    use chrono::{DateTime, Utc};
    use web3::types::H256;

    #[actix_web::test]
    async fn test_transfer_routes() -> anyhow::Result<()> {
        let conn = setup_random_memory_sqlite_conn().await;
        let transfer_id = H256::repeat_byte(0xab);
        let stored = apply_transfer_event(
            None,
            &TransferEvent {
                transfer_id,
                step: StepInfo {
                    at: DateTime::<Utc>::from_timestamp(1_700_000_000, 0).unwrap(),
                    block: 7,
                    tx_hash: H256::repeat_byte(0x01),
                },
                update: TransferUpdate::Stored {
                    origin_domain: 5003,
                },
            },
            23295,
        );
        upsert_transfer(&conn, &stored).await?;

        let registry = InFlightRegistry::new(4);
        let _guard = registry.try_acquire(&format_id(transfer_id))?;
        let config = Config::load_from_str(TEST_CONFIG)?;
        let server_data = Data::new(Box::new(ServerData {
            db_connection: conn,
            setup: RelaySetup::new(&config, None, false)?,
            registry: Some(registry),
        }));
        let app = test::init_service(App::new().service(runtime_web_scope(
            Scope::new(""),
            server_data,
        )))
        .await;

        let req = test::TestRequest::get()
            .uri("/api/transfers?status=stored")
            .to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["transfers"].as_array().map(|t| t.len()), Some(1));

        let req = test::TestRequest::get()
            .uri(&format!("/api/transfers/0x{}", "AB".repeat(32)))
            .to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["transfer"]["status"], "STORED");
        assert_eq!(body["inFlight"], true);

        let req = test::TestRequest::get().uri("/api/stats").to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["inFlight"], 1);

        let req = test::TestRequest::get()
            .uri("/api/transfers?status=unknown")
            .to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert!(body["error"].is_string());
        Ok(())
    }
}
