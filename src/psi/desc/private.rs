//! Descriptor decoders for the DSM-CC, UNT and AIT namespaces, plus
//! vendor families selected by a private data specifier.

use super::{dvb_string, lang_code, DescriptorBody, LogicalChannelEntry};
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

/// DSM-CC module info, tag 0x09.
pub(super) fn compressed_module(d: &[u8]) -> Result<(DescriptorBody, usize)> {
    need(d, 5)?;
    Ok((
        DescriptorBody::CompressedModule {
            compression_method: d[0],
            original_size: u32::from_be_bytes([d[1], d[2], d[3], d[4]]),
        },
        5,
    ))
}

/// UNT, tag 0x09: 40-bit subgroup tag.
pub(super) fn ssu_subgroup_association(d: &[u8]) -> Result<(DescriptorBody, usize)> {
    need(d, 5)?;
    let mut tag = 0u64;
    for &b in &d[..5] {
        tag = (tag << 8) | b as u64;
    }
    Ok((DescriptorBody::SsuSubgroupAssociation { subgroup_tag: tag }, 5))
}

/// AIT, tag 0x01.
pub(super) fn application_name(d: &[u8]) -> Result<(DescriptorBody, usize)> {
    let mut entries = Vec::new();
    let mut pos = 0;
    while pos + 4 <= d.len() {
        let lang = lang_code(&d[pos..]);
        let len = d[pos + 3] as usize;
        if pos + 4 + len > d.len() {
            break;
        }
        entries.push((lang, dvb_string(&d[pos + 4..pos + 4 + len])));
        pos += 4 + len;
    }
    Ok((DescriptorBody::ApplicationName { entries }, pos))
}

/// AIT, tag 0x02.
pub(super) fn transport_protocol(d: &[u8]) -> Result<(DescriptorBody, usize)> {
    need(d, 3)?;
    Ok((
        DescriptorBody::TransportProtocol {
            protocol_id: u16::from_be_bytes([d[0], d[1]]),
            transport_protocol_label: d[2],
            selector: d[3..].to_vec(),
        },
        d.len(),
    ))
}

/// EACEM/NorDig logical channel descriptor, tag 0x83 under the
/// matching private data specifier.
pub(super) fn logical_channel(d: &[u8]) -> Result<(DescriptorBody, usize)> {
    let mut entries = Vec::new();
    let mut pos = 0;
    while pos + 4 <= d.len() {
        entries.push(LogicalChannelEntry {
            service_id: u16::from_be_bytes([d[pos], d[pos + 1]]),
            visible: (d[pos + 2] & 0x80) != 0,
            logical_channel_number: (((d[pos + 2] & 0x03) as u16) << 8) | d[pos + 3] as u16,
        });
        pos += 4;
    }
    Ok((DescriptorBody::LogicalChannel { entries }, pos))
}
