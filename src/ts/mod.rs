//! Transport-stream framing: packet parsing and PID demultiplexing.

mod demuxer;
mod packet;

pub use demuxer::{Channel, ChannelClass, DemuxReport, TsDemuxer};
pub use packet::{AdaptationField, Pcr, TsHeader, TsPacket};

// Packet framings. 188 is canonical; 192 carries a 4-byte timestamp
// prefix per packet (M2TS), 204 a trailing Reed-Solomon parity block.
pub const TS_PACKET_SIZE: usize = 188;
pub const TS_PACKET_SIZE_TIMESTAMPED: usize = 192;
pub const TS_PACKET_SIZE_FEC: usize = 204;
pub const TS_HEADER_SIZE: usize = 4;
pub const SYNC_BYTE: u8 = 0x47;

// Well-known PIDs
pub const PID_PAT: u16 = 0x0000;
pub const PID_CAT: u16 = 0x0001;
pub const PID_NIT: u16 = 0x0010;
pub const PID_SDT: u16 = 0x0011;
pub const PID_EIT: u16 = 0x0012;
pub const PID_TDT: u16 = 0x0014;
pub const PID_NULL: u16 = 0x1FFF;

/// Elementary-stream payload kind bound to a PID.
///
/// Derived from the PMT `stream_type` byte, refined by descriptors
/// (teletext/subtitling on private stream type 0x06), or forced by a
/// [`crate::config::DemuxConfig`] subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamType {
    Mpeg1Video,
    Mpeg2Video,
    Mpeg1Audio,
    Mpeg2Audio,
    AdtsAac,
    LatmAac,
    H264,
    H265,
    DvbSubtitles,
    Teletext,
    Rds,
    Scte35,
    PrivateData,
    Other(u8),
}

impl StreamType {
    /// Maps a PMT `stream_type` byte to a payload kind. 0x06 (PES
    /// private data) stays [`StreamType::PrivateData`] until a
    /// teletext/subtitling descriptor refines it.
    pub fn from_pmt(stream_type: u8) -> Self {
        match stream_type {
            0x01 => StreamType::Mpeg1Video,
            0x02 => StreamType::Mpeg2Video,
            0x03 => StreamType::Mpeg1Audio,
            0x04 => StreamType::Mpeg2Audio,
            0x06 => StreamType::PrivateData,
            0x0F => StreamType::AdtsAac,
            0x11 => StreamType::LatmAac,
            0x1B => StreamType::H264,
            0x24 => StreamType::H265,
            0x86 => StreamType::Scte35,
            other => StreamType::Other(other),
        }
    }

    /// Human-readable annotation used in node trees.
    pub fn describe(&self) -> &'static str {
        match self {
            StreamType::Mpeg1Video => "MPEG-1 video",
            StreamType::Mpeg2Video => "MPEG-2 video",
            StreamType::Mpeg1Audio => "MPEG-1 audio",
            StreamType::Mpeg2Audio => "MPEG-2 audio",
            StreamType::AdtsAac => "AAC (ADTS)",
            StreamType::LatmAac => "AAC (LOAS/LATM)",
            StreamType::H264 => "H.264 video",
            StreamType::H265 => "HEVC video",
            StreamType::DvbSubtitles => "DVB subtitles",
            StreamType::Teletext => "EBU teletext",
            StreamType::Rds => "RDS/UECP data",
            StreamType::Scte35 => "SCTE-35 splice information",
            StreamType::PrivateData => "PES private data",
            StreamType::Other(_) => "unhandled stream type",
        }
    }
}
