pub mod catalog;
pub mod chart;
pub mod commands;
pub mod domain;
pub mod http;
pub mod images;
pub mod index;
pub mod license;
pub mod logging;
pub mod runtime;
pub mod tracker;
