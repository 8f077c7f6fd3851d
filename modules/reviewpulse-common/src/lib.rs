pub mod config;
pub mod entities;
pub mod error;
pub mod types;

pub use config::Config;
pub use entities::EntityRegistry;
pub use error::ReviewPulseError;
pub use types::*;
