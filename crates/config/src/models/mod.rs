pub mod api_observability;
pub mod app_config;
pub mod database;
pub mod mail;
pub mod scheduler;

pub use api_observability::*;
pub use app_config::*;
pub use database::*;
pub use mail::*;
pub use scheduler::*;
