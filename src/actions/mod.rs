mod index_chain;
mod query;
mod settle;

pub use index_chain::index_chain;
pub use query::{deposit_details, transfers_list, user_activity};
pub use settle::{process_once, settle_transfer};
