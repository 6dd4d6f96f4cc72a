pub mod address;
pub mod config;
pub mod error;
pub mod telemetry;

pub use address::{ZERO_ADDRESS, normalize_address};
pub use config::Settings;
pub use error::AppError;
