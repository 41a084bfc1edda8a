pub mod messages;
pub mod repositories;
pub mod use_cases;

pub use repositories::Repositories;
pub use use_cases::*;
