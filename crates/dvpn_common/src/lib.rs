pub mod config;
pub mod db;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
