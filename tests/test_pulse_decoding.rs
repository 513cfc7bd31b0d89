mod common;

use common::init_logging;
use std::io::Write;
use tempfile::NamedTempFile;
use uavsar::io::pulse_reader::{
    DecoderParams, ProtocolVersion, PulseFrameDecoder, RangeBinSource, COMPACT_HEADER_SIZE,
    LEGACY_HEADER_SIZE, PACKET_SIZE,
};
use uavsar::types::SarError;

const BINS: usize = 500;
const PER_SCAN: u16 = 2;

fn compact_header() -> Vec<u8> {
    let mut bytes = Vec::with_capacity(COMPACT_HEADER_SIZE);
    bytes.extend_from_slice(&101u32.to_be_bytes());
    bytes.extend_from_slice(&20_000i32.to_be_bytes());
    bytes.extend_from_slice(&50_000i32.to_be_bytes());
    bytes.extend_from_slice(&32u16.to_be_bytes());
    bytes.extend_from_slice(&12u16.to_be_bytes());
    bytes.extend_from_slice(&[0u8; 8]);
    bytes.extend_from_slice(&[1, 1, 1, 1, 3, 63, 0, 1]);
    assert_eq!(bytes.len(), COMPACT_HEADER_SIZE);
    bytes
}

fn legacy_header(scan_start: i32, scan_stop: i32) -> Vec<u8> {
    let mut bytes = vec![0u8; LEGACY_HEADER_SIZE];
    bytes[4..8].copy_from_slice(&202u32.to_be_bytes());
    bytes[8..12].copy_from_slice(&scan_start.to_be_bytes());
    bytes[12..16].copy_from_slice(&scan_stop.to_be_bytes());
    bytes[16..18].copy_from_slice(&32u16.to_be_bytes());
    bytes[18..20].copy_from_slice(&10u16.to_be_bytes());
    bytes
}

fn packet(timestamp: u32, samples: &[i32], bins: u32, index: u16, per_scan: u16) -> Vec<u8> {
    let mut frame = vec![0u8; PACKET_SIZE];
    frame[8..12].copy_from_slice(&timestamp.to_be_bytes());
    frame[42..44].copy_from_slice(&(samples.len() as u16).to_be_bytes());
    frame[44..48].copy_from_slice(&bins.to_be_bytes());
    frame[48..50].copy_from_slice(&index.to_be_bytes());
    frame[50..52].copy_from_slice(&per_scan.to_be_bytes());
    for (i, s) in samples.iter().enumerate() {
        frame[52 + 4 * i..56 + 4 * i].copy_from_slice(&s.to_be_bytes());
    }
    frame
}

fn sample(scan: usize, bin: usize) -> i32 {
    (scan as i32 + 1) * 1000 - bin as i32
}

/// `scans` complete scans of `BINS` samples, two packets each
fn scan_packets(scans: usize) -> Vec<Vec<u8>> {
    let mut packets = Vec::new();
    let mut index = 0u16;
    for scan in 0..scans {
        let values: Vec<i32> = (0..BINS).map(|bin| sample(scan, bin)).collect();
        let timestamp = 5_000 + 8 * scan as u32;
        for chunk in values.chunks(350) {
            packets.push(packet(timestamp, chunk, BINS as u32, index, PER_SCAN));
            index = index.wrapping_add(1);
        }
    }
    packets
}

fn write_stream(header: &[u8], packets: &[Vec<u8>], tail: &[u8]) -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("Failed to create temp file");
    file.write_all(header).expect("Failed to write header");
    for p in packets {
        file.write_all(p).expect("Failed to write packet");
    }
    file.write_all(tail).expect("Failed to write tail");
    file.flush().expect("Failed to flush");
    file
}

#[test]
fn test_decode_full_scans_from_file() {
    init_logging();
    let file = write_stream(&compact_header(), &scan_packets(4), &[]);

    let decoder = PulseFrameDecoder::new(DecoderParams::default());
    let data = decoder.decode_file(file.path()).expect("Failed to decode stream");

    assert_eq!(data.scans.dim(), (4, BINS));
    assert_eq!(data.range_axis.len, BINS);
    assert_eq!(data.timestamps, vec![5_000, 5_008, 5_016, 5_024]);
    assert_eq!(data.packet_indices, (0..8).collect::<Vec<u16>>());
    assert!(!data.last_scan_partial);
    assert_eq!(data.header.node_id, 101);

    for scan in 0..4 {
        for bin in [0, 349, 350, BINS - 1] {
            assert_eq!(data.scans[[scan, bin]], sample(scan, bin) as f64);
        }
    }

    // 20 ns scan start minus 10 ns offset, halved for the two-way path
    let c = decoder.params().speed_of_light;
    approx::assert_relative_eq!(data.range_axis.start, c * 10e-9 / 2.0, max_relative = 1e-12);
    approx::assert_relative_eq!(
        data.range_axis.spacing,
        c * 0.061035e-9 / 2.0,
        max_relative = 1e-12
    );
}

#[test]
fn test_stream_ending_mid_scan_is_padded() {
    let mut packets = scan_packets(4);
    packets.truncate(7);
    let file = write_stream(&compact_header(), &packets, &[]);

    let data = PulseFrameDecoder::new(DecoderParams::default())
        .decode_file(file.path())
        .expect("Failed to decode stream");

    assert_eq!(data.scans.dim(), (4, BINS));
    assert!(data.last_scan_partial);
    assert_eq!(data.timestamps.len(), 4);
    assert_eq!(data.timestamps[3], 5_024);

    let last = data.scans.row(3);
    assert_eq!(last[0], sample(3, 0) as f64);
    assert_eq!(last[349], sample(3, 349) as f64);
    assert!(last.iter().skip(350).all(|&v| v == 0.0));
}

#[test]
fn test_trailing_partial_frame_is_an_error() {
    let file = write_stream(&compact_header(), &scan_packets(2), &[0u8; 600]);

    let result = PulseFrameDecoder::new(DecoderParams::default()).decode_file(file.path());
    match result {
        Err(SarError::TruncatedStream { offset, length }) => {
            assert_eq!(offset, (COMPACT_HEADER_SIZE + 4 * PACKET_SIZE) as u64);
            assert_eq!(length, 600);
        }
        other => panic!("expected truncated stream, got {:?}", other.map(|d| d.num_scans())),
    }
}

#[test]
fn test_legacy_scan_window_stream() {
    // Four groups of 96 bins: 384 samples in packets of 350 and 34
    let header = legacy_header(10_000, 10_000 + 4 * 5_859);
    let bins = 384;
    let mut packets = Vec::new();
    for scan in 0..3usize {
        let values: Vec<i32> = (0..bins).map(|bin| sample(scan, bin)).collect();
        // Packet header fields are ignored when the window sets the layout
        packets.push(packet(70 + scan as u32, &values[..350], 0, 2 * scan as u16, 0));
        packets.push(packet(70 + scan as u32, &values[350..], 0, 2 * scan as u16 + 1, 0));
    }
    let file = write_stream(&header, &packets, &[]);

    let decoder = PulseFrameDecoder::new(DecoderParams {
        protocol: ProtocolVersion::Legacy,
        range_bin_source: RangeBinSource::ScanWindow,
        ..DecoderParams::default()
    });
    let data = decoder.decode_file(file.path()).expect("Failed to decode legacy stream");

    assert_eq!(data.scans.dim(), (3, bins));
    assert_eq!(data.header.node_id, 202);
    assert_eq!(data.timestamps, vec![70, 71, 72]);
    assert_eq!(data.scans[[2, 383]], sample(2, 383) as f64);
}

#[test]
fn test_analytic_pulses_from_decoded_stream() {
    let file = write_stream(&compact_header(), &scan_packets(3), &[]);
    let data = PulseFrameDecoder::new(DecoderParams::default())
        .decode_file(file.path())
        .expect("Failed to decode stream");

    let radar = data.to_radar_pulses().expect("Failed to build analytic pulses");
    assert_eq!(radar.pulses.dim(), (3, BINS));
    assert_eq!(radar.timestamps, vec![5_000.0, 5_008.0, 5_016.0]);
    assert_eq!(radar.range_axis, data.range_axis);

    for ((r, c), z) in radar.pulses.indexed_iter() {
        assert!((z.re - data.scans[[r, c]]).abs() < 1e-6);
    }
}

#[test]
fn test_missing_file_reports_io_error() {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let result = PulseFrameDecoder::new(DecoderParams::default())
        .decode_file(dir.path().join("absent.bin"));
    assert!(matches!(result, Err(SarError::Io(_))));
}
