//! Structured logging, with optional span export over OTLP/gRPC.
//!
//! # Telemetry invariants
//!
//! - **No key material** may appear in any span attribute or log field. Log
//!   key names, counts, ids of encryption keys and file paths only.
//! - Log level is configurable via `LOG_LEVEL` (default: `info`).

pub mod init;

pub use init::{init_telemetry, shutdown_telemetry};
