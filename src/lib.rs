pub mod config;
pub mod passwd;

pub use config::Config;
