//! Descriptor decoders defined by ETSI EN 300 468.

use super::{
    bcd, dvb_string, lang_code, ApplicationSignallingEntry, ContentEntry, DescriptorBody,
    ExtendedEventItem, LocalTimeOffsetEntry, ParentalRatingEntry, ServiceListEntry,
    SubtitlingEntry, TeletextEntry,
};
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

pub(super) fn network_name(d: &[u8]) -> Result<(DescriptorBody, usize)> {
    Ok((
        DescriptorBody::NetworkName {
            name: dvb_string(d),
        },
        d.len(),
    ))
}

pub(super) fn service_list(d: &[u8]) -> Result<(DescriptorBody, usize)> {
    let mut services = Vec::new();
    let mut pos = 0;
    while pos + 3 <= d.len() {
        services.push(ServiceListEntry {
            service_id: u16::from_be_bytes([d[pos], d[pos + 1]]),
            service_type: d[pos + 2],
        });
        pos += 3;
    }
    Ok((DescriptorBody::ServiceList { services }, pos))
}

pub(super) fn satellite_delivery(d: &[u8]) -> Result<(DescriptorBody, usize)> {
    need(d, 11)?;
    Ok((
        DescriptorBody::SatelliteDelivery {
            frequency_ghz: bcd(&d[0..4], 8) as f64 / 100_000.0,
            orbital_position: bcd(&d[4..6], 4) as f64 / 10.0,
            west_east: (d[6] & 0x80) != 0,
            polarization: (d[6] >> 5) & 0x03,
            modulation: d[6] & 0x1F,
            symbol_rate: bcd(&d[7..11], 7) as f64 / 10_000.0,
            fec_inner: d[10] & 0x0F,
        },
        11,
    ))
}

pub(super) fn cable_delivery(d: &[u8]) -> Result<(DescriptorBody, usize)> {
    need(d, 11)?;
    Ok((
        DescriptorBody::CableDelivery {
            frequency_mhz: bcd(&d[0..4], 8) as f64 / 10_000.0,
            fec_outer: d[5] & 0x0F,
            modulation: d[6],
            symbol_rate: bcd(&d[7..11], 7) as f64 / 10_000.0,
            fec_inner: d[10] & 0x0F,
        },
        11,
    ))
}

pub(super) fn terrestrial_delivery(d: &[u8]) -> Result<(DescriptorBody, usize)> {
    need(d, 11)?;
    Ok((
        DescriptorBody::TerrestrialDelivery {
            centre_frequency_hz: u32::from_be_bytes([d[0], d[1], d[2], d[3]]) as u64 * 10,
            bandwidth: d[4] >> 5,
            constellation: d[5] >> 6,
            hierarchy: (d[5] >> 3) & 0x07,
            code_rate_hp: d[5] & 0x07,
            code_rate_lp: d[6] >> 5,
            guard_interval: (d[6] >> 3) & 0x03,
            transmission_mode: (d[6] >> 1) & 0x03,
            other_frequency: (d[6] & 0x01) != 0,
        },
        11,
    ))
}

pub(super) fn service(d: &[u8]) -> Result<(DescriptorBody, usize)> {
    need(d, 3)?;
    let service_type = d[0];
    let provider_len = d[1] as usize;
    need(d, 2 + provider_len + 1)?;
    let provider = dvb_string(&d[2..2 + provider_len]);
    let name_pos = 2 + provider_len;
    let name_len = d[name_pos] as usize;
    need(d, name_pos + 1 + name_len)?;
    let name = dvb_string(&d[name_pos + 1..name_pos + 1 + name_len]);
    Ok((
        DescriptorBody::Service {
            service_type,
            provider,
            name,
        },
        name_pos + 1 + name_len,
    ))
}

pub(super) fn linkage(d: &[u8]) -> Result<(DescriptorBody, usize)> {
    need(d, 7)?;
    Ok((
        DescriptorBody::Linkage {
            transport_stream_id: u16::from_be_bytes([d[0], d[1]]),
            original_network_id: u16::from_be_bytes([d[2], d[3]]),
            service_id: u16::from_be_bytes([d[4], d[5]]),
            linkage_type: d[6],
            private_data: d[7..].to_vec(),
        },
        d.len(),
    ))
}

pub(super) fn short_event(d: &[u8]) -> Result<(DescriptorBody, usize)> {
    need(d, 5)?;
    let language = lang_code(d);
    let name_len = d[3] as usize;
    need(d, 4 + name_len + 1)?;
    let event_name = dvb_string(&d[4..4 + name_len]);
    let text_pos = 4 + name_len;
    let text_len = d[text_pos] as usize;
    need(d, text_pos + 1 + text_len)?;
    let text = dvb_string(&d[text_pos + 1..text_pos + 1 + text_len]);
    Ok((
        DescriptorBody::ShortEvent {
            language,
            event_name,
            text,
        },
        text_pos + 1 + text_len,
    ))
}

pub(super) fn extended_event(d: &[u8]) -> Result<(DescriptorBody, usize)> {
    need(d, 6)?;
    let descriptor_number = d[0] >> 4;
    let last_descriptor_number = d[0] & 0x0F;
    let language = lang_code(&d[1..]);
    let items_len = d[4] as usize;
    need(d, 5 + items_len + 1)?;

    let mut items = Vec::new();
    let items_end = 5 + items_len;
    let mut pos = 5;
    while pos + 1 <= items_end {
        let desc_len = d[pos] as usize;
        if pos + 1 + desc_len + 1 > items_end {
            break;
        }
        let description = dvb_string(&d[pos + 1..pos + 1 + desc_len]);
        pos += 1 + desc_len;
        let item_len = d[pos] as usize;
        if pos + 1 + item_len > items_end {
            break;
        }
        let item = dvb_string(&d[pos + 1..pos + 1 + item_len]);
        pos += 1 + item_len;
        items.push(ExtendedEventItem { description, item });
    }

    let text_len = d[items_end] as usize;
    need(d, items_end + 1 + text_len)?;
    let text = dvb_string(&d[items_end + 1..items_end + 1 + text_len]);
    Ok((
        DescriptorBody::ExtendedEvent {
            descriptor_number,
            last_descriptor_number,
            language,
            items,
            text,
        },
        items_end + 1 + text_len,
    ))
}

pub(super) fn component(d: &[u8]) -> Result<(DescriptorBody, usize)> {
    need(d, 6)?;
    Ok((
        DescriptorBody::Component {
            stream_content: d[0] & 0x0F,
            component_type: d[1],
            component_tag: d[2],
            language: lang_code(&d[3..]),
            text: dvb_string(&d[6..]),
        },
        d.len(),
    ))
}

pub(super) fn stream_identifier(d: &[u8]) -> Result<(DescriptorBody, usize)> {
    need(d, 1)?;
    Ok((
        DescriptorBody::StreamIdentifier {
            component_tag: d[0],
        },
        1,
    ))
}

pub(super) fn content(d: &[u8]) -> Result<(DescriptorBody, usize)> {
    let mut entries = Vec::new();
    let mut pos = 0;
    while pos + 2 <= d.len() {
        entries.push(ContentEntry {
            content_nibble_level_1: d[pos] >> 4,
            content_nibble_level_2: d[pos] & 0x0F,
            user_byte: d[pos + 1],
        });
        pos += 2;
    }
    Ok((DescriptorBody::Content { entries }, pos))
}

pub(super) fn parental_rating(d: &[u8]) -> Result<(DescriptorBody, usize)> {
    let mut entries = Vec::new();
    let mut pos = 0;
    while pos + 4 <= d.len() {
        entries.push(ParentalRatingEntry {
            country_code: lang_code(&d[pos..]),
            rating: d[pos + 3],
        });
        pos += 4;
    }
    Ok((DescriptorBody::ParentalRating { entries }, pos))
}

pub(super) fn teletext(d: &[u8]) -> Result<(DescriptorBody, usize)> {
    let mut entries = Vec::new();
    let mut pos = 0;
    while pos + 5 <= d.len() {
        entries.push(TeletextEntry {
            language: lang_code(&d[pos..]),
            teletext_type: d[pos + 3] >> 3,
            magazine_number: d[pos + 3] & 0x07,
            page_number: d[pos + 4],
        });
        pos += 5;
    }
    Ok((DescriptorBody::Teletext { entries }, pos))
}

pub(super) fn subtitling(d: &[u8]) -> Result<(DescriptorBody, usize)> {
    let mut entries = Vec::new();
    let mut pos = 0;
    while pos + 8 <= d.len() {
        entries.push(SubtitlingEntry {
            language: lang_code(&d[pos..]),
            subtitling_type: d[pos + 3],
            composition_page_id: u16::from_be_bytes([d[pos + 4], d[pos + 5]]),
            ancillary_page_id: u16::from_be_bytes([d[pos + 6], d[pos + 7]]),
        });
        pos += 8;
    }
    Ok((DescriptorBody::Subtitling { entries }, pos))
}

pub(super) fn local_time_offset(d: &[u8]) -> Result<(DescriptorBody, usize)> {
    let mut entries = Vec::new();
    let mut pos = 0;
    while pos + 13 <= d.len() {
        let hours = bcd(&d[pos + 4..], 2);
        let minutes = bcd(&d[pos + 4..], 4) % 100;
        entries.push(LocalTimeOffsetEntry {
            country_code: lang_code(&d[pos..]),
            country_region_id: d[pos + 3] >> 2,
            polarity: (d[pos + 3] & 0x01) != 0,
            local_time_offset: (hours * 60 + minutes) as u32,
        });
        pos += 13;
    }
    Ok((DescriptorBody::LocalTimeOffset { entries }, pos))
}

pub(super) fn private_data_specifier(d: &[u8]) -> Result<(DescriptorBody, usize)> {
    need(d, 4)?;
    Ok((
        DescriptorBody::PrivateDataSpecifier {
            specifier: u32::from_be_bytes([d[0], d[1], d[2], d[3]]),
        },
        4,
    ))
}

pub(super) fn data_broadcast_id(d: &[u8]) -> Result<(DescriptorBody, usize)> {
    need(d, 2)?;
    Ok((
        DescriptorBody::DataBroadcastId {
            data_broadcast_id: u16::from_be_bytes([d[0], d[1]]),
            selector: d[2..].to_vec(),
        },
        d.len(),
    ))
}

pub(super) fn ac3(d: &[u8]) -> Result<(DescriptorBody, usize)> {
    need(d, 1)?;
    let flags = d[0];
    let mut pos = 1;
    let mut take = |present: bool| -> Result<Option<u8>> {
        if !present {
            return Ok(None);
        }
        need(d, pos + 1)?;
        let v = d[pos];
        pos += 1;
        Ok(Some(v))
    };
    let component_type = take((flags & 0x80) != 0)?;
    let bsid = take((flags & 0x40) != 0)?;
    let mainid = take((flags & 0x20) != 0)?;
    let asvc = take((flags & 0x10) != 0)?;
    Ok((
        DescriptorBody::Ac3 {
            component_type,
            bsid,
            mainid,
            asvc,
        },
        pos,
    ))
}

pub(super) fn enhanced_ac3(d: &[u8]) -> Result<(DescriptorBody, usize)> {
    need(d, 1)?;
    let flags = d[0];
    let mut pos = 1;
    let mut take = |present: bool| -> Result<Option<u8>> {
        if !present {
            return Ok(None);
        }
        need(d, pos + 1)?;
        let v = d[pos];
        pos += 1;
        Ok(Some(v))
    };
    let component_type = take((flags & 0x80) != 0)?;
    let bsid = take((flags & 0x40) != 0)?;
    take((flags & 0x20) != 0)?; // mainid
    take((flags & 0x10) != 0)?; // asvc
    // substream bytes follow when flagged
    take((flags & 0x04) != 0)?;
    take((flags & 0x02) != 0)?;
    take((flags & 0x01) != 0)?;
    Ok((
        DescriptorBody::EnhancedAc3 {
            component_type,
            bsid,
            mixinfoexists: (flags & 0x08) != 0,
        },
        pos,
    ))
}

pub(super) fn application_signalling(d: &[u8]) -> Result<(DescriptorBody, usize)> {
    let mut entries = Vec::new();
    let mut pos = 0;
    while pos + 3 <= d.len() {
        entries.push(ApplicationSignallingEntry {
            application_type: (((d[pos] & 0x7F) as u16) << 8) | d[pos + 1] as u16,
            ait_version_number: d[pos + 2] & 0x1F,
        });
        pos += 3;
    }
    Ok((DescriptorBody::ApplicationSignalling { entries }, pos))
}

pub(super) fn supplementary_audio(d: &[u8]) -> Result<(DescriptorBody, usize)> {
    need(d, 1)?;
    let lang_present = (d[0] & 0x01) != 0;
    let language = if lang_present {
        need(d, 4)?;
        Some(lang_code(&d[1..]))
    } else {
        None
    };
    Ok((
        DescriptorBody::SupplementaryAudio {
            mix_type: d[0] >> 7,
            editorial_classification: (d[0] >> 2) & 0x1F,
            language,
        },
        if lang_present { 4 } else { 1 },
    ))
}

pub(super) fn t2_delivery_system(d: &[u8]) -> Result<(DescriptorBody, usize)> {
    need(d, 3)?;
    Ok((
        DescriptorBody::T2DeliverySystem {
            plp_id: d[0],
            t2_system_id: u16::from_be_bytes([d[1], d[2]]),
        },
        // Cell/frequency loops may follow; they belong to the declared
        // length either way.
        d.len().max(3),
    ))
}
