//! Command implementations behind the CLI.

pub mod config;
mod errors;
mod packages;
mod repo;
mod track;

pub use config::Config;
pub use errors::errors;
pub use packages::packages;
pub use repo::{repo_add, repo_list, repo_remove};
pub use track::track;
