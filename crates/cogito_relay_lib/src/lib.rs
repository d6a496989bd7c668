pub mod config;
pub mod chain_events;
pub mod contracts;
pub mod eth;
pub mod indexer;
pub mod misc;
pub mod reconcile;
pub mod resolver;
pub mod runtime;
pub mod server;
pub mod settlement;
pub mod setup;
pub mod signer;
pub mod transaction;

pub use cogito_relay_common::{err_create, err_custom_create, err_from, err_from_msg};
pub use cogito_relay_common::{error, utils};

pub mod db {
    pub use cogito_relay_common::{
        create_sqlite_connection, model, ops, setup_random_memory_sqlite_conn,
    };
}
