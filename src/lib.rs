pub mod approval;
pub mod builder;
pub mod cascade;
pub mod config;
pub mod document;
pub mod error;
pub mod file_store;
pub mod hierarchy;
pub mod logging;
pub mod role;
pub mod service;
pub mod stage;
pub mod store;
pub mod timestamp;
pub mod utils;
