pub mod config;
pub mod context;
pub mod core;
pub mod devices;
pub mod error;
pub mod logging;
pub mod sink;
