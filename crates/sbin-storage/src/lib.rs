//! sbin-storage: OpenDAL-backed secret store and the submit/retrieve client

pub mod client;
pub mod health;
pub mod operator;
pub mod store;

pub use client::SecretClient;
pub use health::check_health;
pub use operator::{build_from_config, build_s3_operator, S3Config};
pub use store::{OpendalStore, SecretStore, StoredMeta};
