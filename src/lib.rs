pub mod backend;
pub mod chat;
pub mod cli;
pub mod config;
pub mod context;
pub mod models;
pub mod retrieval;
pub mod server;
pub mod storage;
