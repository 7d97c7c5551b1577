pub mod commands;
pub mod config;
pub mod errors;
pub mod gateway;
pub mod handlers;
pub mod reconciliation_worker;
pub mod server;
