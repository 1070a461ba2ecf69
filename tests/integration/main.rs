//! End-to-end tests over on-disk fixture datasets.
//!
//! Each test writes its own data root under the system temp dir and
//! drives the crate through its public API: loader, query engine, tool
//! adapter, agent loop, and HTTP router.

mod agent;
mod fixtures;
mod queries;
mod tools;
