use crate::profile::{L3Protocol, L4Protocol};

#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// The flow table names an L3 or L4 protocol number the generator does
    /// not implement. Fatal to the flow, not to the run.
    #[error("unknown {layer} protocol number {number}")]
    UnknownProtocol { layer: &'static str, number: u64 },
    /// Impossible protocol combination (e.g. ICMP over IPv6).
    #[error("L4 protocol is {l4} but L3 protocol is {l3}")]
    ProtocolMismatch { l3: L3Protocol, l4: L4Protocol },
    /// Address generator seed outside the Lehmer range.
    #[error("invalid seed value, seed must be in range 1 - 2147483646")]
    InvalidSeed,
    /// Rejected configuration value.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    /// A flow was asked for a packet after its plan was drained.
    #[error("no more packets to generate in flow")]
    NoMorePackets,
    /// Malformed record in the flow table.
    #[error("flow table line {line}: {reason}")]
    Profile { line: usize, reason: String },
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("pcap error: {0}")]
    Pcap(#[from] pcap_file::PcapError),
}

pub type Result<T> = std::result::Result<T, Error>;
