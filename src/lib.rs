pub mod auth;
pub mod config;
pub mod engine;
pub mod error;
pub mod oracle;
pub mod routes;
pub mod server;
pub mod swap;
