//! vestwatch: admits token-vesting stream addresses and keeps their on-chain
//! state in sync.
//!
//! Candidate addresses are checked against a chain indexer ([`provider`]),
//! sanitized ([`sanitize`]) and stored in SQLite ([`store`]). [`refresh`]
//! re-reads every stored stream on demand, and [`server`] exposes the HTTP
//! API plus a server-rendered page ([`view`]).

pub mod admission;
pub mod config;
pub mod provider;
pub mod refresh;
pub mod sanitize;
pub mod server;
pub mod store;
pub mod stream;
pub mod telemetry;
pub mod view;
