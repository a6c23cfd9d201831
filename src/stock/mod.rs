pub mod handlers;
pub mod ledger;
pub mod models;

pub use handlers::*;
pub use ledger::*;
pub use models::*;
