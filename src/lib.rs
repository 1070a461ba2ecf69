//! Procurement Agent: commodity analytics and a tool-calling assistant
//!
//! Library crate exposing all modules for use by integration tests
//! and the binary entry point.

pub mod config;
pub mod types;
pub mod data;
pub mod query;
pub mod tools;
pub mod llm;
pub mod agent;
pub mod server;
