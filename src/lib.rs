pub mod cli;
pub mod config;
pub mod embed;
pub mod engine;
pub mod error;
pub mod index;
pub mod ledger;
pub mod logger;
pub mod mcp;
pub mod models;
pub mod service;
pub mod session;
