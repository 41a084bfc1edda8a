pub mod entities;
pub mod ports;
pub mod repositories;
pub mod services;
pub mod value_objects;

pub use entities::*;
pub use ports::*;
pub use repositories::*;
pub use rotation_errors::{RotationError, RotationResult};
pub use services::*;
pub use value_objects::*;
