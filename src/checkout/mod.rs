pub mod error;
pub mod handlers;
pub mod models;
pub mod orchestrator;
pub mod retry;
pub mod state_machine;

pub use error::*;
pub use handlers::*;
pub use models::*;
pub use orchestrator::*;
pub use retry::*;
pub use state_machine::*;
