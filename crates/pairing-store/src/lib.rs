//! SQLite persistence for the founder profile: one versioned JSON document
//! per database, plus file export/import.

pub mod data_dir;
pub mod error;
pub mod json_bridge;
pub mod schema;
pub mod store;

pub use data_dir::DataDir;
pub use error::{Result, StoreError};
pub use json_bridge::parse_profile;
pub use store::Store;
