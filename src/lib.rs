//! DG-200 Library
//!
//! A Rust library for driving the GlobalSat DG-200 GPS datalogger over its
//! serial link: read and write the logger configuration, list the recorded
//! sessions, download track data and export it as GPX.
//!
//! # Features
//!
//! - **`csv`** (default): Enable CSV export of the session listing
//! - **`cli`** (default): Build the `dg200` command-line binary
//! - **`json`**: Enable JSON output in the CLI
//! - **`serde`**: Enable serialization/deserialization of types
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use dg200::connect;
//! use std::path::Path;
//!
//! let mut session = connect("/dev/ttyUSB0").unwrap();
//! let config = session.configuration().unwrap();
//! println!("Memory usage: {}%", config.memory_usage_percent);
//!
//! let tracks: Vec<Vec<u32>> = session
//!     .sessions()
//!     .unwrap()
//!     .into_iter()
//!     .map(|s| s.indices)
//!     .collect();
//! let report = session
//!     .download(&tracks, Path::new("tracks"), |p| {
//!         println!("{:.0}%", p.fraction() * 100.0)
//!     })
//!     .unwrap();
//! println!("Wrote {} GPX files", report.files_written());
//! ```
//!
//! # Layers
//!
//! - [`transport`] - byte channel to the device ([`SerialTransport`], [`MemoryTransport`])
//! - [`protocol`] - frame codec and one function per device command
//! - [`parser`] - raw track block to [`TrackPoint`] decoding
//! - [`export`] - GPX and CSV output
//! - [`session`] - the [`Session`] API tying them together
//!
//! Logging goes through `tracing`; install a subscriber to see frame traces,
//! retries and per-component decode failures.

pub mod conversion;
pub mod error;
pub mod export;
pub mod parser;
pub mod protocol;
pub mod session;
pub mod transport;
pub mod types;

pub use conversion::*;
pub use error::*;
pub use export::*;
pub use parser::*;
pub use protocol::*;
pub use session::*;
pub use transport::*;
pub use types::*;
