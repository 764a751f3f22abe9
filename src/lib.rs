pub mod cli;
pub mod config;
pub mod error;
pub mod import;
pub mod provider;
pub mod store;

pub use config::Config;
pub use error::ArchiveError;
pub use provider::{Provider, Role};
pub use store::Store;
