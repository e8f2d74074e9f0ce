//! Demuxer configuration.
//!
//! A re-parse after changing any of these values is a fresh pass over
//! the same bytes with fresh state; nothing is re-used incrementally.

use std::collections::HashMap;

use crate::ts::StreamType;

/// Configuration consumed by [`crate::ts::TsDemuxer`].
#[derive(Debug, Clone, Default)]
pub struct DemuxConfig {
    /// Retain the raw bytes of every packet on its decoded node.
    /// Costs memory proportional to the capture size.
    pub keep_raw_packets: bool,

    /// Forced private-data-specifier. When set, private descriptor
    /// dispatch uses this value instead of any specifier seen in the
    /// table itself.
    pub pds_override: Option<u32>,

    /// PID → expected stream type, for elementary streams that cannot
    /// be classified from table data alone.
    pub subscriptions: HashMap<u16, StreamType>,
}

impl DemuxConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn keep_raw_packets(mut self, keep: bool) -> Self {
        self.keep_raw_packets = keep;
        self
    }

    pub fn pds_override(mut self, pds: u32) -> Self {
        self.pds_override = Some(pds);
        self
    }

    pub fn subscribe(mut self, pid: u16, stream_type: StreamType) -> Self {
        self.subscriptions.insert(pid, stream_type);
        self
    }
}
