use crate::core::analytic::analytic_signal_rows;
use crate::types::{RadarPulses, RangeAxis, SarError, SarResult};
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, ErrorKind, Read};
use std::path::Path;

/// Size of one data packet on the wire
pub const PACKET_SIZE: usize = 1452;

/// Size of the legacy configuration message
pub const LEGACY_HEADER_SIZE: usize = 44;

/// Size of the compact configuration message
pub const COMPACT_HEADER_SIZE: usize = 32;

// Packet field offsets (all big-endian)
const TIMESTAMP_OFFSET: usize = 8;
const NUM_SAMPLES_OFFSET: usize = 42;
const NUM_RANGE_BINS_OFFSET: usize = 44;
const PACKET_INDEX_OFFSET: usize = 48;
const PACKETS_PER_SCAN_OFFSET: usize = 50;
const SAMPLES_OFFSET: usize = 52;

/// Most samples a single packet can carry
pub const MAX_SAMPLES_PER_PACKET: usize = (PACKET_SIZE - SAMPLES_OFFSET) / 4;

/// Configuration message layout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProtocolVersion {
    /// 44-byte message with fixed field offsets
    Legacy,
    /// 32-byte packed message
    Compact,
}

impl ProtocolVersion {
    pub fn header_size(&self) -> usize {
        match self {
            ProtocolVersion::Legacy => LEGACY_HEADER_SIZE,
            ProtocolVersion::Compact => COMPACT_HEADER_SIZE,
        }
    }
}

/// Where the number of range bins per scan comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RangeBinSource {
    /// Range bin and packet counts read from the first packet
    PacketHeader,
    /// Range bin count computed from the header's scan window
    ScanWindow,
}

/// Decoder constants for the radar
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecoderParams {
    pub protocol: ProtocolVersion,
    pub range_bin_source: RangeBinSource,
    /// Duration of one range bin (ns)
    pub bin_duration_ns: f64,
    /// Range bins are collected in groups of this size
    pub bin_group: usize,
    /// Fixed delay subtracted from the scan start (ns)
    pub dt0_ns: f64,
    /// Samples carried by a full packet
    pub samples_per_packet: usize,
    /// Speed of light (m/s)
    pub speed_of_light: f64,
}

impl Default for DecoderParams {
    fn default() -> Self {
        Self {
            protocol: ProtocolVersion::Compact,
            range_bin_source: RangeBinSource::PacketHeader,
            bin_duration_ns: 0.061035,
            bin_group: 96,
            dt0_ns: 10.0,
            samples_per_packet: MAX_SAMPLES_PER_PACKET,
            speed_of_light: 299_792_458.0,
        }
    }
}

/// Radar configuration message preceding the packet stream
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigHeader {
    pub node_id: u32,
    /// Scan start time (ps)
    pub scan_start: i32,
    /// Scan stop time (ps)
    pub scan_stop: i32,
    pub scan_resolution: u16,
    /// Pulse integration index
    pub pii: u16,
    pub segment_samples: [u16; 4],
    pub segment_integration: [u8; 4],
    pub antenna_mode: u8,
    pub tx_gain_index: u8,
    pub code_channel: u8,
    pub persist_flag: u8,
}

impl ConfigHeader {
    /// Decode a configuration message of the given layout
    pub fn parse(bytes: &[u8], protocol: ProtocolVersion) -> SarResult<Self> {
        let needed = protocol.header_size();
        if bytes.len() < needed {
            return Err(SarError::HeaderDecode {
                needed,
                available: bytes.len(),
            });
        }

        let header = match protocol {
            ProtocolVersion::Legacy => Self {
                node_id: be_u32(bytes, 4),
                scan_start: be_i32(bytes, 8),
                scan_stop: be_i32(bytes, 12),
                scan_resolution: be_u16(bytes, 16),
                pii: be_u16(bytes, 18),
                antenna_mode: bytes[32],
                tx_gain_index: bytes[33],
                code_channel: bytes[34],
                persist_flag: bytes[35],
                ..Self::default()
            },
            // Packed fields in declaration order; each field is byte-swapped
            // from the wire, i.e. read big-endian.
            ProtocolVersion::Compact => Self {
                node_id: be_u32(bytes, 0),
                scan_start: be_i32(bytes, 4),
                scan_stop: be_i32(bytes, 8),
                scan_resolution: be_u16(bytes, 12),
                pii: be_u16(bytes, 14),
                segment_samples: [
                    be_u16(bytes, 16),
                    be_u16(bytes, 18),
                    be_u16(bytes, 20),
                    be_u16(bytes, 22),
                ],
                segment_integration: [bytes[24], bytes[25], bytes[26], bytes[27]],
                antenna_mode: bytes[28],
                tx_gain_index: bytes[29],
                code_channel: bytes[30],
                persist_flag: bytes[31],
            },
        };

        Ok(header)
    }
}

/// One fixed-size data packet
#[derive(Debug, Clone, PartialEq)]
pub struct Packet {
    pub timestamp: u32,
    pub num_samples: u16,
    pub num_range_bins: u32,
    pub packet_index: u16,
    pub packets_per_scan: u16,
    frame: Vec<u8>,
}

impl Packet {
    pub fn parse(frame: &[u8]) -> SarResult<Self> {
        if frame.len() != PACKET_SIZE {
            return Err(SarError::Shape(format!(
                "packet must be {} bytes, got {}",
                PACKET_SIZE,
                frame.len()
            )));
        }

        Ok(Self {
            timestamp: be_u32(frame, TIMESTAMP_OFFSET),
            num_samples: be_u16(frame, NUM_SAMPLES_OFFSET),
            num_range_bins: be_u32(frame, NUM_RANGE_BINS_OFFSET),
            packet_index: be_u16(frame, PACKET_INDEX_OFFSET),
            packets_per_scan: be_u16(frame, PACKETS_PER_SCAN_OFFSET),
            frame: frame.to_vec(),
        })
    }

    /// First `count` range-bin samples of the payload
    pub fn samples(&self, count: usize) -> impl Iterator<Item = i32> + '_ {
        let count = count.min(MAX_SAMPLES_PER_PACKET);
        self.frame[SAMPLES_OFFSET..SAMPLES_OFFSET + 4 * count]
            .chunks_exact(4)
            .map(|b| i32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }
}

/// Decoded pulse stream
#[derive(Debug, Clone)]
pub struct PulseData {
    pub header: ConfigHeader,
    /// Real range-bin samples (scan x range bin)
    pub scans: Array2<f64>,
    /// Radar timestamp of each scan
    pub timestamps: Vec<u32>,
    /// Packet index of every packet read, in stream order
    pub packet_indices: Vec<u16>,
    pub range_axis: RangeAxis,
    /// True when the last row was zero-padded from an incomplete scan
    pub last_scan_partial: bool,
}

impl PulseData {
    pub fn num_scans(&self) -> usize {
        self.scans.nrows()
    }

    /// Analytic-signal pulses paired with their timestamps and range axis
    pub fn to_radar_pulses(&self) -> SarResult<RadarPulses> {
        let pulses = analytic_signal_rows(&self.scans);
        let timestamps = self.timestamps.iter().map(|&t| t as f64).collect();
        RadarPulses::new(pulses, timestamps, self.range_axis)
    }
}

/// Scan layout derived from the header or the first packet
#[derive(Debug, Clone, Copy)]
struct ScanLayout {
    num_range_bins: usize,
    packets_per_scan: usize,
}

/// Decoder for the binary pulse stream
pub struct PulseFrameDecoder {
    params: DecoderParams,
}

impl PulseFrameDecoder {
    pub fn new(params: DecoderParams) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &DecoderParams {
        &self.params
    }

    /// Decode a pulse stream file
    pub fn decode_file<P: AsRef<Path>>(&self, path: P) -> SarResult<PulseData> {
        log::info!("Decoding pulse stream: {}", path.as_ref().display());
        let file = File::open(path.as_ref())?;
        self.decode(BufReader::new(file))
    }

    /// Decode a complete pulse stream, consuming the reader
    pub fn decode<R: Read>(&self, mut reader: R) -> SarResult<PulseData> {
        let header_size = self.params.protocol.header_size();
        let mut header_bytes = vec![0u8; header_size];
        let available = read_frame(&mut reader, &mut header_bytes)?;
        let header = ConfigHeader::parse(&header_bytes[..available], self.params.protocol)?;

        log::debug!("Config header: {:?}", header);

        let start_range = self.params.speed_of_light
            * ((header.scan_start as f64 * 1e-12) - self.params.dt0_ns * 1e-9)
            / 2.0;
        let range_spacing = self.params.speed_of_light * self.params.bin_duration_ns * 1e-9 / 2.0;

        let mut layout = match self.params.range_bin_source {
            RangeBinSource::ScanWindow => Some(self.layout_from_window(&header)?),
            RangeBinSource::PacketHeader => None,
        };

        let mut rows: Vec<Vec<i32>> = Vec::new();
        let mut timestamps = Vec::new();
        let mut packet_indices = Vec::new();
        let mut current_scan: Vec<i32> = Vec::new();
        let mut packets_in_scan = 0usize;
        let mut last_timestamp = 0u32;

        let mut offset = header_size as u64;
        let mut frame = vec![0u8; PACKET_SIZE];

        loop {
            let length = read_frame(&mut reader, &mut frame)?;
            if length == 0 {
                break;
            }
            if length < PACKET_SIZE {
                return Err(SarError::TruncatedStream { offset, length });
            }

            let packet = Packet::parse(&frame)?;
            let scan_layout = match layout {
                Some(known) => known,
                None => {
                    let first = self.layout_from_packet(&packet, offset)?;
                    layout = Some(first);
                    first
                }
            };

            packets_in_scan += 1;
            let count = self.samples_in_packet(&packet, &scan_layout, packets_in_scan, offset)?;
            current_scan.extend(packet.samples(count));
            packet_indices.push(packet.packet_index);
            last_timestamp = packet.timestamp;

            if packets_in_scan == scan_layout.packets_per_scan {
                if current_scan.len() != scan_layout.num_range_bins {
                    return Err(SarError::ProtocolConfig {
                        offset,
                        message: format!(
                            "scan {} has {} samples, expected {}",
                            rows.len(),
                            current_scan.len(),
                            scan_layout.num_range_bins
                        ),
                    });
                }
                rows.push(std::mem::take(&mut current_scan));
                timestamps.push(packet.timestamp);
                packets_in_scan = 0;
            }

            offset += PACKET_SIZE as u64;
        }

        let num_range_bins = layout.map(|l| l.num_range_bins).unwrap_or(0);

        let mut last_scan_partial = false;
        if !current_scan.is_empty() {
            log::warn!(
                "Stream ended mid-scan after {} of {} samples; zero-padding final scan",
                current_scan.len(),
                num_range_bins
            );
            current_scan.resize(num_range_bins, 0);
            rows.push(current_scan);
            timestamps.push(last_timestamp);
            last_scan_partial = true;
        }

        let mut scans = Array2::<f64>::zeros((rows.len(), num_range_bins));
        for (mut dst, src) in scans.outer_iter_mut().zip(rows.iter()) {
            for (d, &s) in dst.iter_mut().zip(src.iter()) {
                *d = s as f64;
            }
        }

        log::info!(
            "Decoded {} packets into {} scans of {} range bins",
            packet_indices.len(),
            scans.nrows(),
            num_range_bins
        );

        Ok(PulseData {
            header,
            scans,
            timestamps,
            packet_indices,
            range_axis: RangeAxis::new(start_range, range_spacing, num_range_bins),
            last_scan_partial,
        })
    }

    fn layout_from_window(&self, header: &ConfigHeader) -> SarResult<ScanLayout> {
        let group = self.params.bin_group as f64;
        let window_ps = header.scan_stop as f64 - header.scan_start as f64;
        let groups = (window_ps / (self.params.bin_duration_ns * 1000.0 * group)).ceil();
        let num_range_bins = if groups.is_finite() && groups > 0.0 {
            self.params.bin_group * groups as usize
        } else {
            0
        };

        let packets_per_scan = if self.params.samples_per_packet == 0 {
            0
        } else {
            (num_range_bins + self.params.samples_per_packet - 1) / self.params.samples_per_packet
        };

        self.check_layout(num_range_bins, packets_per_scan, 0)
    }

    fn layout_from_packet(&self, packet: &Packet, offset: u64) -> SarResult<ScanLayout> {
        self.check_layout(
            packet.num_range_bins as usize,
            packet.packets_per_scan as usize,
            offset,
        )
    }

    fn check_layout(
        &self,
        num_range_bins: usize,
        packets_per_scan: usize,
        offset: u64,
    ) -> SarResult<ScanLayout> {
        let samples_per_packet = self.params.samples_per_packet;
        if samples_per_packet == 0 || samples_per_packet > MAX_SAMPLES_PER_PACKET {
            return Err(SarError::ProtocolConfig {
                offset,
                message: format!(
                    "samples per packet {} outside 1..={}",
                    samples_per_packet, MAX_SAMPLES_PER_PACKET
                ),
            });
        }
        if packets_per_scan == 0 {
            return Err(SarError::ProtocolConfig {
                offset,
                message: format!("zero packets per scan ({} range bins)", num_range_bins),
            });
        }
        if num_range_bins == 0 {
            return Err(SarError::ProtocolConfig {
                offset,
                message: format!("zero range bins in {} packets per scan", packets_per_scan),
            });
        }

        // Packet headers may claim up to a full frame per packet
        let per_packet = match self.params.range_bin_source {
            RangeBinSource::PacketHeader => MAX_SAMPLES_PER_PACKET,
            RangeBinSource::ScanWindow => samples_per_packet,
        };
        let capacity = packets_per_scan.saturating_mul(per_packet);
        if num_range_bins > capacity {
            return Err(SarError::ProtocolConfig {
                offset,
                message: format!(
                    "{} range bins do not fit in {} packets of {} samples",
                    num_range_bins, packets_per_scan, per_packet
                ),
            });
        }

        log::debug!(
            "Scan layout: {} range bins in {} packets",
            num_range_bins,
            packets_per_scan
        );

        Ok(ScanLayout {
            num_range_bins,
            packets_per_scan,
        })
    }

    /// Samples to take from the `position`-th (1-based) packet of a scan
    fn samples_in_packet(
        &self,
        packet: &Packet,
        layout: &ScanLayout,
        position: usize,
        offset: u64,
    ) -> SarResult<usize> {
        let count = match self.params.range_bin_source {
            RangeBinSource::PacketHeader => packet.num_samples as usize,
            RangeBinSource::ScanWindow => {
                let full = self.params.samples_per_packet;
                if position == layout.packets_per_scan {
                    match layout.num_range_bins % full {
                        0 => full,
                        remainder => remainder,
                    }
                } else {
                    full
                }
            }
        };

        if count > MAX_SAMPLES_PER_PACKET {
            return Err(SarError::ProtocolConfig {
                offset,
                message: format!(
                    "packet claims {} samples, frame holds {}",
                    count, MAX_SAMPLES_PER_PACKET
                ),
            });
        }
        Ok(count)
    }
}

/// Fill `buf` from the reader, returning how many bytes arrived before EOF
fn read_frame<R: Read>(reader: &mut R, buf: &mut [u8]) -> SarResult<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }
    Ok(filled)
}

fn be_u16(bytes: &[u8], at: usize) -> u16 {
    u16::from_be_bytes([bytes[at], bytes[at + 1]])
}

fn be_u32(bytes: &[u8], at: usize) -> u32 {
    u32::from_be_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]])
}

fn be_i32(bytes: &[u8], at: usize) -> i32 {
    i32::from_be_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]])
}
