pub mod config;
pub mod handlers;
pub mod hooks;
pub mod language;
pub mod middleware;
pub mod models;
pub mod server;
pub mod state;
pub mod storage;
pub mod templates;
pub mod tls;
pub mod upload;
pub mod utils;
