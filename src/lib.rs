pub mod app;
pub mod config;
pub mod domain;
pub mod ena;
pub mod error;
pub mod mgx;
pub mod model;
pub mod output;
pub mod populate;
pub mod store;
pub mod suppression;
pub mod sync;
pub mod visibility;
