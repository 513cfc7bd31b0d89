//! Input readers

pub mod pulse_reader;

pub use pulse_reader::{
    ConfigHeader, DecoderParams, Packet, ProtocolVersion, PulseData, PulseFrameDecoder,
    RangeBinSource,
};
