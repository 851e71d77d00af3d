pub mod config;
pub mod connection;
pub mod endpoint;
pub mod repair;
