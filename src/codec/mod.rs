//! Elementary-stream decoders, one per PMT stream kind.
//!
//! Each decoder owns the cumulative state for one PID (parameter sets,
//! partial frames at PES boundaries) and turns reassembled PES units
//! into annotation nodes.

pub mod audio;
pub mod h264;
pub mod h265;
pub mod rds;
pub mod subtitles;
pub mod teletext;

pub use audio::{AdtsDecoder, LatmDecoder, MpegAudioDecoder};
pub use h264::H264Decoder;
pub use h265::H265Decoder;
pub use rds::UecpDecoder;
pub use subtitles::DvbSubtitleDecoder;
pub use teletext::TeletextDecoder;

use bytes::{Bytes, BytesMut};

use crate::node::Node;
use crate::pes::PesUnit;
use crate::ts::StreamType;

/// Consumes the PES units of one channel in arrival order.
pub trait EsDecoder {
    fn feed(&mut self, pes: &PesUnit) -> Vec<Node>;

    /// Called once at end of input to surface carried fragments.
    fn finish(&mut self) -> Vec<Node> {
        Vec::new()
    }
}

/// Binds a decoder to a stream kind. `None` for kinds decoded at the
/// section layer (SCTE-35) or not decoded at all.
pub fn decoder_for(kind: StreamType) -> Option<Box<dyn EsDecoder + Send>> {
    match kind {
        StreamType::Mpeg1Audio | StreamType::Mpeg2Audio => {
            Some(Box::new(MpegAudioDecoder::new()))
        }
        StreamType::AdtsAac => Some(Box::new(AdtsDecoder::new())),
        StreamType::LatmAac => Some(Box::new(LatmDecoder::new())),
        StreamType::H264 => Some(Box::new(H264Decoder::new())),
        StreamType::H265 => Some(Box::new(H265Decoder::new())),
        StreamType::DvbSubtitles => Some(Box::new(DvbSubtitleDecoder::new())),
        StreamType::Teletext => Some(Box::new(TeletextDecoder::new())),
        StreamType::Rds => Some(Box::new(UecpDecoder::new())),
        _ => None,
    }
}

/// Annex-B byte-stream splitter shared by the H.264/H.265 decoders.
///
/// A NAL unit routinely spans several PES units; the bytes after the
/// last start code stay carried until the next feed (or `flush`).
#[derive(Default)]
pub(crate) struct AnnexBSplitter {
    buf: BytesMut,
    synced: bool,
}

impl AnnexBSplitter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends bytes and returns every NAL unit completed by them.
    pub fn push(&mut self, data: &[u8]) -> Vec<Bytes> {
        self.buf.extend_from_slice(data);
        let mut out = Vec::new();

        loop {
            let Some(start) = find_start_code(&self.buf) else {
                if !self.synced {
                    // No start code yet: nothing in the buffer can ever
                    // become a NAL unit. Keep a prefix of zeros in case
                    // a start code straddles the feed boundary.
                    let keep = self.buf.len().min(3);
                    let drop = self.buf.len() - keep;
                    if drop > 0 {
                        log::debug!("discarding {} bytes before first start code", drop);
                        let _ = self.buf.split_to(drop);
                    }
                }
                return out;
            };

            if !self.synced {
                let _ = self.buf.split_to(start + 3);
                self.synced = true;
                continue;
            }

            if start == 0 {
                // Empty unit between adjacent start codes.
                let _ = self.buf.split_to(3);
                continue;
            }

            let mut nal = self.buf.split_to(start);
            let _ = self.buf.split_to(3);
            trim_trailing_zeros(&mut nal);
            if !nal.is_empty() {
                out.push(nal.freeze());
            }
        }
    }

    /// Emits the carried tail as the final NAL unit.
    pub fn flush(&mut self) -> Option<Bytes> {
        if !self.synced {
            self.buf.clear();
            return None;
        }
        let mut nal = self.buf.split();
        trim_trailing_zeros(&mut nal);
        self.synced = false;
        if nal.is_empty() {
            None
        } else {
            Some(nal.freeze())
        }
    }
}

fn find_start_code(data: &[u8]) -> Option<usize> {
    data.windows(3).position(|w| w == [0x00, 0x00, 0x01])
}

// Drops trailing_zero_8bits and the spare zero of 4-byte start codes.
fn trim_trailing_zeros(buf: &mut BytesMut) {
    while buf.last() == Some(&0x00) {
        buf.truncate(buf.len() - 1);
    }
}
