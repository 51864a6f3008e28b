pub mod chain;
pub mod combat;
pub mod config;
pub mod constants;
pub mod crypto;
pub mod error;
pub mod models;
pub mod services;
