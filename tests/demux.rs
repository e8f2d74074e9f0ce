//! End-to-end demuxing over hand-built captures.

use pretty_assertions::assert_eq;
use tsprobe::utils::Crc32Mpeg2;
use tsprobe::{Anomaly, ChannelClass, DemuxConfig, StreamType, TsDemuxer};

const PACKET_SIZE: usize = 188;

fn build_packet(pid: u16, cc: u8, pusi: bool, payload: &[u8]) -> Vec<u8> {
    assert!(payload.len() <= PACKET_SIZE - 4);
    let mut packet = vec![
        0x47,
        ((pid >> 8) as u8 & 0x1F) | if pusi { 0x40 } else { 0x00 },
        pid as u8,
        0x10 | (cc & 0x0F),
    ];
    packet.extend_from_slice(payload);
    packet.resize(PACKET_SIZE, 0xFF);
    packet
}

fn build_section(table_id: u8, ext: u16, body: &[u8]) -> Vec<u8> {
    let section_length = 5 + body.len() + 4;
    let mut s = vec![
        table_id,
        0xB0 | ((section_length >> 8) as u8 & 0x0F),
        (section_length & 0xFF) as u8,
        (ext >> 8) as u8,
        (ext & 0xFF) as u8,
        0xC1, // version 0, current
        0x00,
        0x00,
    ];
    s.extend_from_slice(body);
    let crc = Crc32Mpeg2::new().calculate(&s);
    s.extend_from_slice(&crc.to_be_bytes());
    s
}

/// Packs a section behind a zero pointer field.
fn section_payload(section: &[u8]) -> Vec<u8> {
    let mut payload = vec![0u8];
    payload.extend_from_slice(section);
    payload
}

fn build_pes(stream_id: u8, pts: u64, payload: &[u8], bounded: bool) -> Vec<u8> {
    let mut pes = vec![0x00, 0x00, 0x01, stream_id];
    let length = if bounded { 3 + 5 + payload.len() } else { 0 };
    pes.extend_from_slice(&(length as u16).to_be_bytes());
    pes.push(0x80);
    pes.push(0x80); // PTS only
    pes.push(5);
    pes.push(0x21 | (((pts >> 30) & 0x07) as u8) << 1);
    pes.push((pts >> 22) as u8);
    pes.push(0x01 | (((pts >> 15) & 0x7F) as u8) << 1);
    pes.push((pts >> 7) as u8);
    pes.push(0x01 | ((pts & 0x7F) as u8) << 1);
    pes.extend_from_slice(payload);
    pes
}

fn pat_program_1(pmt_pid: u16) -> Vec<u8> {
    let body = [
        0x00,
        0x01,
        0xE0 | (pmt_pid >> 8) as u8,
        pmt_pid as u8,
    ];
    build_section(0x00, 0x0001, &body)
}

/// PMT for program 1: one stream per `(stream_type, pid)` pair.
fn pmt_program_1(pcr_pid: u16, streams: &[(u8, u16)]) -> Vec<u8> {
    let mut body = vec![
        0xE0 | (pcr_pid >> 8) as u8,
        pcr_pid as u8,
        0xF0,
        0x00, // no program descriptors
    ];
    for &(stream_type, pid) in streams {
        body.extend_from_slice(&[
            stream_type,
            0xE0 | (pid >> 8) as u8,
            pid as u8,
            0xF0,
            0x00,
        ]);
    }
    build_section(0x02, 0x0001, &body)
}

#[test]
fn test_pat_classifies_pmt_pid() {
    let mut data = Vec::new();
    data.extend_from_slice(&build_packet(
        0,
        0,
        true,
        &section_payload(&pat_program_1(4096)),
    ));
    data.extend_from_slice(&build_packet(
        4096,
        0,
        true,
        &section_payload(&pmt_program_1(0x101, &[(0x1B, 0x101)])),
    ));

    let report = TsDemuxer::new(DemuxConfig::new()).parse(&data).unwrap();

    let pat = report.pat.as_ref().unwrap();
    assert_eq!(pat.entries[0].program_number, 1);
    assert_eq!(pat.entries[0].program_map_pid, 4096);

    let pmt_channel = report.channels.iter().find(|c| c.pid == 4096).unwrap();
    assert_eq!(pmt_channel.class, ChannelClass::Psi);

    assert_eq!(report.pmts.len(), 1);
    assert_eq!(report.pmts[0].streams[0].elementary_pid, 0x101);
}

#[test]
fn test_pes_reassembly_across_three_packets() {
    let video_pid = 0x101u16;
    let mut data = Vec::new();
    data.extend_from_slice(&build_packet(
        0,
        0,
        true,
        &section_payload(&pat_program_1(0x100)),
    ));
    data.extend_from_slice(&build_packet(
        0x100,
        0,
        true,
        &section_payload(&pmt_program_1(video_pid, &[(0x1B, video_pid)])),
    ));

    let es: Vec<u8> = (0..450u32).map(|i| (i % 251) as u8).collect();
    let pes = build_pes(0xE0, 90_000, &es, true);
    assert!(pes.len() > 2 * 184);
    data.extend_from_slice(&build_packet(video_pid, 0, true, &pes[..184]));
    data.extend_from_slice(&build_packet(video_pid, 1, false, &pes[184..368]));
    data.extend_from_slice(&build_packet(video_pid, 2, false, &pes[368..]));

    let report = TsDemuxer::new(DemuxConfig::new()).parse(&data).unwrap();
    let channel = report.channels.iter().find(|c| c.pid == video_pid).unwrap();
    assert_eq!(channel.class, ChannelClass::Pes(StreamType::H264));
    assert_eq!(channel.continuity_errors, 0);

    let units: Vec<_> = channel
        .nodes
        .iter()
        .filter(|n| n.label == "PES_unit")
        .collect();
    assert_eq!(units.len(), 1);
    assert!(units[0].anomalies.is_empty());
    let pts = units[0].find("PTS").unwrap();
    assert_eq!(pts.value, Some(tsprobe::node::Value::Unsigned(90_000)));
}

#[test]
fn test_trailing_pes_unit_surfaced_as_truncated() {
    let audio_pid = 0x102u16;
    let mut data = Vec::new();
    data.extend_from_slice(&build_packet(
        0,
        0,
        true,
        &section_payload(&pat_program_1(0x100)),
    ));
    data.extend_from_slice(&build_packet(
        0x100,
        0,
        true,
        &section_payload(&pmt_program_1(audio_pid, &[(0x03, audio_pid)])),
    ));

    // First unit complete in one packet, second bounded unit cut off
    // by end of input.
    let first = build_pes(0xC0, 1000, &[0x11; 40], true);
    let second = build_pes(0xC0, 2000, &[0x22; 400], true);
    data.extend_from_slice(&build_packet(audio_pid, 0, true, &first));
    data.extend_from_slice(&build_packet(audio_pid, 1, true, &second[..184]));

    let report = TsDemuxer::new(DemuxConfig::new()).parse(&data).unwrap();
    let channel = report.channels.iter().find(|c| c.pid == audio_pid).unwrap();

    let units: Vec<_> = channel
        .nodes
        .iter()
        .filter(|n| n.label == "PES_unit")
        .collect();
    assert_eq!(units.len(), 2);
    assert!(units[0].anomalies.is_empty());
    assert_eq!(units[1].anomalies, vec![Anomaly::Truncated]);
}

#[test]
fn test_subscription_classifies_unlisted_pid() {
    let pid = 0x300u16;
    let frame = {
        // Minimal ADTS frame, AAC LC, 48 kHz.
        let mut f = vec![0xFF, 0xF1, 0x4C, 0x80, 16 >> 3, (16 & 0x07) << 5, 0xFC];
        f.resize(16, 0xAA);
        f
    };
    let pes = build_pes(0xC0, 500, &frame, true);

    let mut data = Vec::new();
    data.extend_from_slice(&build_packet(pid, 0, true, &pes));

    let config = DemuxConfig::new().subscribe(pid, StreamType::AdtsAac);
    let report = TsDemuxer::new(config).parse(&data).unwrap();
    let channel = report.channels.iter().find(|c| c.pid == pid).unwrap();
    assert_eq!(channel.class, ChannelClass::Pes(StreamType::AdtsAac));

    let unit = channel.nodes.iter().find(|n| n.label == "PES_unit").unwrap();
    assert!(unit.find("adts_frame").is_some());
}

#[test]
fn test_scte35_splice_annotated_with_service_name() {
    let splice_pid = 0x500u16;

    // SDT: service 1 named "News".
    let sdt_body = {
        let mut b = vec![0x00, 0x2A, 0xFF, 0x00, 0x01, 0xFC];
        let service_desc = [0x48, 0x08, 0x01, 0x01, b'P', 0x04, b'N', b'e', b'w', b's'];
        b.push(0x80);
        b.push(service_desc.len() as u8);
        b.extend_from_slice(&service_desc);
        b
    };
    let sdt = build_section(0x42, 0x0001, &sdt_body);

    // SCTE-35 time_signal section (short header, no syntax).
    let splice = {
        let body = [
            0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, //
            0xFF, 0xF0, 0x05, 0x06, 0xFE, 0x00, 0x00, 0x00, 0x64,
        ];
        let section_length = body.len() + 4;
        let mut s = vec![
            0xFC,
            0x30 | ((section_length >> 8) as u8 & 0x0F),
            (section_length & 0xFF) as u8,
        ];
        s.extend_from_slice(&body);
        let crc = Crc32Mpeg2::new().calculate(&s);
        s.extend_from_slice(&crc.to_be_bytes());
        s
    };

    let mut data = Vec::new();
    data.extend_from_slice(&build_packet(
        0,
        0,
        true,
        &section_payload(&pat_program_1(0x100)),
    ));
    data.extend_from_slice(&build_packet(
        0x100,
        0,
        true,
        &section_payload(&pmt_program_1(0x101, &[(0x86, splice_pid)])),
    ));
    data.extend_from_slice(&build_packet(0x11, 0, true, &section_payload(&sdt)));
    data.extend_from_slice(&build_packet(
        splice_pid,
        0,
        true,
        &section_payload(&splice),
    ));

    let report = TsDemuxer::new(DemuxConfig::new()).parse(&data).unwrap();

    let channel = report.channels.iter().find(|c| c.pid == splice_pid).unwrap();
    assert_eq!(channel.class, ChannelClass::Psi);

    let splice_node = channel
        .nodes
        .iter()
        .find(|n| n.label == "splice_information")
        .unwrap();
    assert_eq!(splice_node.note.as_deref(), Some("News"));
    assert!(splice_node.find("time_signal").is_some());
}

#[test]
fn test_report_tree_renders_all_pids() {
    let mut data = Vec::new();
    data.extend_from_slice(&build_packet(
        0,
        0,
        true,
        &section_payload(&pat_program_1(0x100)),
    ));
    data.extend_from_slice(&build_packet(0x1FFF, 0, false, &[]));

    let report = TsDemuxer::new(DemuxConfig::new()).parse(&data).unwrap();
    let tree = report.to_node();
    assert_eq!(tree.label, "transport_stream");
    let pids: Vec<_> = tree.children.iter().filter(|c| c.label == "PID").collect();
    assert_eq!(pids.len(), 2);
    assert!(!tree.has_anomalies());
}
