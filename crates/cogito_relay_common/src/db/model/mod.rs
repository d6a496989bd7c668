mod deferred_event_dao;
mod deposit_dao;
mod scan_dao;
mod settlement_tx_dao;
mod transfer_dao;
mod user_activity_dao;

pub use deferred_event_dao::DeferredEventDbObj;
pub use deposit_dao::DepositDbObj;
pub use scan_dao::ScanDaoDbObj;
pub use settlement_tx_dao::SettlementTxDbObj;
pub use transfer_dao::{TransferDbObj, TransferStatus};
pub use user_activity_dao::{ActivityType, UserActivityDbObj};
