//! waive - HTTP gateway for the Waive sample server
//!
//! This library provides:
//! - `assets`: asset reference → file path resolution
//! - `gateway`: axum router for work requests and asset streaming
//! - `library`: lookup-only worker over the sample library
//! - `serve`: server lifecycle (bind, worker task, graceful shutdown)
//! - `telemetry`: tracing and OpenTelemetry setup

pub mod assets;
pub mod gateway;
pub mod library;
pub mod serve;
pub mod telemetry;
