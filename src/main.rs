mod actions;
mod options;

use crate::actions::{
    deposit_details, index_chain, process_once, settle_transfer, transfers_list, user_activity,
};
use crate::options::{RelayCommands, RelayOptions};
use actix_web::{web, App, HttpServer, Scope};
use cogito_relay_lib::config::Config;
use cogito_relay_lib::db::create_sqlite_connection;
use cogito_relay_lib::error::RelayError;
use cogito_relay_lib::misc::{display_settler_account, load_private_key_from_env};
use cogito_relay_lib::runtime::{shutdown_signal, start_relay_engine, RuntimeOptions};
use cogito_relay_lib::server::{runtime_web_scope, ServerData};
use cogito_relay_lib::setup::RelaySetup;
use cogito_relay_lib::err_from;
use std::env;
use structopt::StructOpt;

async fn main_internal() -> Result<(), RelayError> {
    dotenv::dotenv().ok();
    env::set_var(
        "RUST_LOG",
        env::var("RUST_LOG").unwrap_or("info,sqlx::query=warn,web3=warn".to_string()),
    );

    env_logger::init();
    let cli: RelayOptions = RelayOptions::from_args();

    let mut config = Config::load(cli.config.to_string_lossy().to_string()).await?;
    config.apply_env_overrides()?;

    let require_signer = match &cli.commands {
        RelayCommands::Run { run_options } => !run_options.skip_processor,
        RelayCommands::Settle { .. } | RelayCommands::ProcessOnce => true,
        _ => false,
    };
    let key = load_private_key_from_env("OWNER_PRIVATE_KEY")?;
    if require_signer {
        display_settler_account(key.as_ref());
    }
    let setup = RelaySetup::new(&config, key.map(|(secret, _)| secret), require_signer)?;

    let db_filename = env::var("DB_SQLITE_FILENAME")
        .unwrap_or(cli.sqlite_db_file.to_string_lossy().to_string());
    log::info!("connecting to sqlite file db: {}", db_filename);
    let conn = create_sqlite_connection(
        Some(&db_filename),
        None,
        cli.sqlite_read_only,
        !cli.skip_migrations,
    )
    .await?;

    match cli.commands {
        RelayCommands::Run { run_options } => {
            let options = RuntimeOptions {
                run_indexers: !run_options.skip_indexer,
                run_processor: !run_options.skip_processor,
            };
            let runtime = start_relay_engine(setup, conn.clone(), options, None).await?;

            if run_options.http {
                let server_data = web::Data::new(Box::new(ServerData {
                    db_connection: conn,
                    setup: runtime.setup.clone(),
                    registry: runtime.registry(),
                }));
                let server = HttpServer::new(move || {
                    let cors = actix_cors::Cors::default()
                        .allow_any_origin()
                        .allow_any_method()
                        .allow_any_header()
                        .max_age(3600);

                    let scope = runtime_web_scope(Scope::new(""), server_data.clone());

                    App::new().wrap(cors).service(scope)
                })
                .workers(run_options.http_threads as usize)
                .bind((run_options.http_addr.as_str(), run_options.http_port))
                .map_err(err_from!())?
                .run();

                log::info!(
                    "http server starting on {}:{}",
                    run_options.http_addr,
                    run_options.http_port
                );
                //the server stops on Ctrl-C or SIGTERM
                server.await.map_err(err_from!())?;
                runtime.shutdown();
            } else {
                shutdown_signal().await;
                runtime.shutdown();
            }
            runtime.join().await;
            log::info!("Relayer stopped");
        }
        RelayCommands::Index { index_options } => {
            index_chain(conn, setup, index_options).await?;
        }
        RelayCommands::Settle { settle_options } => {
            settle_transfer(conn, setup, settle_options).await?;
        }
        RelayCommands::ProcessOnce => {
            process_once(conn, setup).await?;
        }
        RelayCommands::Transfers { transfers_options } => {
            transfers_list(&conn, transfers_options).await?;
        }
        RelayCommands::Deposit { deposit_options } => {
            deposit_details(&conn, deposit_options).await?;
        }
        RelayCommands::Activity { activity_options } => {
            user_activity(&conn, activity_options).await?;
        }
    }
    Ok(())
}

#[actix_web::main]
async fn main() -> Result<(), RelayError> {
    match main_internal().await {
        Ok(_) => Ok(()),
        Err(e) => {
            log::error!("Error: {}", e);
            Err(e)
        }
    }
}
