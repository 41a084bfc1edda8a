pub mod database;
pub mod error_handling;
pub mod mail;

pub use database::*;
pub use mail::{build_mailer, LogMailer, SmtpMailer};
