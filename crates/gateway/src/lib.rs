//! `tg-gateway` — the ToolGate server binary's library surface.
//!
//! Wires the catalog, action pipeline, and upstream gateway into a
//! JSON-RPC dispatcher, and exposes it over HTTP (axum) and STDIO.

pub mod api;
pub mod bootstrap;
pub mod cli;
pub mod handlers;
pub mod rpc;
pub mod state;
