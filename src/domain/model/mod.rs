pub mod chart;
pub mod job;
pub mod package;
pub mod repository;

pub use chart::*;
pub use job::*;
pub use package::*;
pub use repository::*;
