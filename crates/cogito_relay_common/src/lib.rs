mod db;
pub mod error;
mod events;
pub mod utils;

pub use db::*;
pub use events::*;
