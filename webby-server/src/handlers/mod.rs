pub mod files;
pub mod service;
pub mod tree;
pub mod utils;
