pub mod config;
pub mod error;
pub mod types;

pub use config::SbinConfig;
pub use error::{SbinError, SbinResult};
pub use types::{Expires, ResolvedOptions, SubmitOptions};
