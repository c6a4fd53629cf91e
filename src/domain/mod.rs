//! Domain types shared by the tracker, the catalog and the CLI.

pub mod model;

pub use model::*;
