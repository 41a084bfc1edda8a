mod messaging;
mod time;

pub use messaging::{Mailer, OutgoingMail};
pub use time::{SystemTimeProvider, TimeProvider};
