pub mod error;
pub mod models;
pub mod price_calculator;
pub mod repository;
pub mod status_machine;

pub use error::*;
pub use models::*;
pub use price_calculator::*;
pub use repository::*;
pub use status_machine::*;
