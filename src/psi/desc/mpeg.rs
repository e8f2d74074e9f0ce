//! Descriptor decoders defined by ISO/IEC 13818-1.

use super::{lang_code, DescriptorBody, LanguageEntry};
use crate::error::{Result, TsError};

fn need(data: &[u8], n: usize) -> Result<()> {
    if data.len() < n {
        return Err(TsError::Truncated {
            needed: n * 8,
            remaining: data.len() * 8,
        });
    }
    Ok(())
}

pub(super) fn video_stream(d: &[u8]) -> Result<(DescriptorBody, usize)> {
    need(d, 1)?;
    let mpeg1_only = (d[0] & 0x04) != 0;
    let body = DescriptorBody::VideoStream {
        multiple_frame_rate: (d[0] & 0x80) != 0,
        frame_rate_code: (d[0] >> 3) & 0x0F,
        mpeg1_only,
        constrained_parameter: (d[0] & 0x02) != 0,
        still_picture: (d[0] & 0x01) != 0,
    };
    // Non-MPEG-1 streams carry profile/level and chroma bytes.
    let consumed = if mpeg1_only { 1 } else { 3 };
    need(d, consumed)?;
    Ok((body, consumed))
}

pub(super) fn audio_stream(d: &[u8]) -> Result<(DescriptorBody, usize)> {
    need(d, 1)?;
    Ok((
        DescriptorBody::AudioStream {
            free_format: (d[0] & 0x80) != 0,
            id: (d[0] >> 6) & 0x01,
            layer: (d[0] >> 4) & 0x03,
            variable_rate: (d[0] & 0x08) != 0,
        },
        1,
    ))
}

pub(super) fn registration(d: &[u8]) -> Result<(DescriptorBody, usize)> {
    need(d, 4)?;
    Ok((
        DescriptorBody::Registration {
            format_identifier: u32::from_be_bytes([d[0], d[1], d[2], d[3]]),
            additional: d[4..].to_vec(),
        },
        d.len(),
    ))
}

pub(super) fn data_stream_alignment(d: &[u8]) -> Result<(DescriptorBody, usize)> {
    need(d, 1)?;
    Ok((
        DescriptorBody::DataStreamAlignment {
            alignment_type: d[0],
        },
        1,
    ))
}

pub(super) fn conditional_access(d: &[u8]) -> Result<(DescriptorBody, usize)> {
    need(d, 4)?;
    Ok((
        DescriptorBody::ConditionalAccess {
            ca_system_id: u16::from_be_bytes([d[0], d[1]]),
            ca_pid: (((d[2] & 0x1F) as u16) << 8) | d[3] as u16,
            private_data: d[4..].to_vec(),
        },
        d.len(),
    ))
}

pub(super) fn iso639_language(d: &[u8]) -> Result<(DescriptorBody, usize)> {
    let mut entries = Vec::new();
    let mut pos = 0;
    while pos + 4 <= d.len() {
        entries.push(LanguageEntry {
            language: lang_code(&d[pos..]),
            audio_type: d[pos + 3],
        });
        pos += 4;
    }
    Ok((DescriptorBody::Iso639Language { entries }, pos))
}

pub(super) fn system_clock(d: &[u8]) -> Result<(DescriptorBody, usize)> {
    need(d, 2)?;
    Ok((
        DescriptorBody::SystemClock {
            external_clock_reference: (d[0] & 0x80) != 0,
            accuracy_integer: d[0] & 0x3F,
            accuracy_exponent: d[1] >> 5,
        },
        2,
    ))
}

pub(super) fn maximum_bitrate(d: &[u8]) -> Result<(DescriptorBody, usize)> {
    need(d, 3)?;
    Ok((
        DescriptorBody::MaximumBitrate {
            bitrate: (((d[0] & 0x3F) as u32) << 16) | ((d[1] as u32) << 8) | d[2] as u32,
        },
        3,
    ))
}

/// MPEG extension descriptor (0x3F): one extra tag byte selects the
/// sub-namespace; kept generic.
pub(super) fn extension(d: &[u8]) -> Result<(DescriptorBody, usize)> {
    need(d, 1)?;
    Ok((
        DescriptorBody::MpegExtension {
            extension_tag: d[0],
            data: d[1..].to_vec(),
        },
        d.len(),
    ))
}
