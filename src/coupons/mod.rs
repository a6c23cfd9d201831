pub mod error;
pub mod evaluator;
pub mod models;
pub mod redemption;
pub mod repository;
pub mod rule;

pub use error::*;
pub use evaluator::*;
pub use models::*;
pub use redemption::*;
pub use repository::*;
pub use rule::*;
