pub mod config;
pub mod error;
pub mod fingerprint;
pub mod reasons;
pub mod security;
pub mod stream;
pub mod types;

pub use config::Config;
pub use error::{RadarError, RadarResult};
pub use fingerprint::content_hash;
pub use security::UrlValidator;
pub use types::*;
