//! toolgate: a transparent security gateway for MCP tool traffic.
//!
//! toolgate sits between AI coding-assistant clients and the tool servers
//! they call. Every tool invocation and every tool result is intercepted,
//! verified against a set of security signatures through a pluggable judge
//! backend, and forwarded, blocked, or escalated to a human decision. Every
//! outcome lands in a durable scan ledger.

pub mod alert;
pub mod api;
pub mod config;
pub mod core;
pub mod correlator;
pub mod engine;
pub mod ledger;
pub mod loader;
pub mod upstream;
