#![doc(html_root_url = "https://docs.rs/tsprobe/0.1.0")]

//! # tsprobe - MPEG transport stream capture inspector
//!
//! `tsprobe` decodes a finite MPEG-2 transport stream capture into a
//! structured, typed representation: packets are demultiplexed per PID,
//! PSI/SI sections and PES units are reassembled and validated, DVB
//! descriptors are decoded against their tables, and elementary streams
//! (H.264, HEVC, MPEG audio, AAC, DVB subtitles, teletext, RDS/UECP)
//! are opened up to frame level.
//!
//! Malformed input is the normal case, not the exception: a corrupt CRC,
//! a continuity gap or a truncated unit is flagged as an [`node::Anomaly`]
//! on the node where it occurred, and decoding continues. Hard errors
//! ([`TsError`]) are reserved for input that cannot be framed at all.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use tsprobe::{DemuxConfig, TsDemuxer};
//!
//! fn main() -> tsprobe::Result<()> {
//!     let capture = std::fs::read("capture.ts")?;
//!     let report = TsDemuxer::new(DemuxConfig::new()).parse(&capture)?;
//!
//!     for pmt in &report.pmts {
//!         println!("program {}: {} streams", pmt.program_number, pmt.streams.len());
//!     }
//!     let tree = report.to_node();
//!     println!("anomalies: {}", tree.has_anomalies());
//!     Ok(())
//! }
//! ```
//!
//! ## Module Overview
//!
//! - `ts`: packet framing, PID demultiplexing and continuity checking
//! - `psi`: section reassembly, CRC validation and table decoders
//!   (PAT, PMT, SDT, EIT, NIT, TDT/TOT, SCTE-35) plus the descriptor
//!   dispatch engine
//! - `pes`: PES unit reassembly and header decoding
//! - `codec`: per-stream elementary decoders
//! - `node`: the decoded output tree every layer produces
//! - `error`: error types and the crate-wide `Result`
//! - `utils`: bit-level reading and CRC-32 (MPEG-2)

/// Elementary-stream decoders
pub mod codec;

/// Demuxer configuration
pub mod config;

/// Error types and utilities
pub mod error;

/// Decoded output tree
pub mod node;

/// PES reassembly and header decoding
pub mod pes;

/// PSI/SI sections, tables and descriptors
pub mod psi;

/// Transport packet framing and demultiplexing
pub mod ts;

/// Bit reader and CRC helpers
pub mod utils;

pub use config::DemuxConfig;
pub use error::{Result, TsError};
pub use node::{Anomaly, Node};
pub use ts::{Channel, ChannelClass, DemuxReport, StreamType, TsDemuxer};
