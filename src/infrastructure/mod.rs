//! Infrastructure layer - storage adapters, HTTP server and configuration

pub mod config;
pub mod http;
pub mod persistence;
pub mod state;
