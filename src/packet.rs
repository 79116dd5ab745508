use crate::layers::LayerParams;
use pnet_packet::icmp::IcmpPacket;
use pnet_packet::icmpv6::Icmpv6Packet;
use pnet_packet::ipv4::{self, Ipv4Packet, MutableIpv4Packet};
use pnet_packet::ipv6::{Ipv6Packet, MutableIpv6Packet};
use pnet_packet::tcp::{self, MutableTcpPacket};
use pnet_packet::udp::{self, MutableUdpPacket};
use std::cmp::Ordering;
use std::net::{Ipv4Addr, Ipv6Addr};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Forward,
    Reverse,
    Unknown,
}

/// Per-packet state carried across the planning phases, before any bytes
/// exist. `size` counts L3 and above; the Ethernet header is accounted for
/// separately. A layer that commits a structural size during the first
/// planning pass marks the plan `is_finished` so the size distributor
/// reserves budget for it instead of assigning one.
#[derive(Debug, Clone)]
pub struct PacketPlan {
    pub direction: Direction,
    pub timestamp: Duration,
    pub size: u64,
    pub is_finished: bool,
    /// One entry per layer of the owning flow's stack, in stack order.
    pub params: Vec<LayerParams>,
}

impl PacketPlan {
    pub fn new() -> Self {
        PacketPlan {
            direction: Direction::Unknown,
            timestamp: Duration::ZERO,
            size: 0,
            is_finished: false,
            params: Vec::new(),
        }
    }
}

impl Default for PacketPlan {
    fn default() -> Self {
        Self::new()
    }
}

/// The protocol a built region of bytes belongs to. Recorded while layers
/// append their headers so the finalization pass can locate what to fix up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireLayer {
    Ethernet,
    Vlan,
    Mpls,
    Ipv4,
    Ipv6,
    Tcp,
    Udp,
    Icmp,
    Icmpv6,
    Payload,
}

/// A frame under construction. Layers append their bytes in stack order;
/// [`finalize`] then walks the recorded regions and computes lengths and
/// checksums. A post-build hook that splits the frame (fragmentation) parks
/// the additional frames in `extra_frames` and sets `fragmented`, which
/// makes the second finalization a no-op (the fragments were already fixed
/// up at split time).
#[derive(Debug, Default)]
pub struct PacketBytes {
    pub data: Vec<u8>,
    bounds: Vec<(WireLayer, usize)>,
    pub extra_frames: Vec<Vec<u8>>,
    pub fragmented: bool,
}

impl PacketBytes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `size` zeroed bytes for `layer` and return their offset.
    pub fn begin_layer(&mut self, layer: WireLayer, size: usize) -> usize {
        let offset = self.data.len();
        self.bounds.push((layer, offset));
        self.data.resize(offset + size, 0);
        offset
    }

    pub fn layer_offset(&self, layer: WireLayer) -> Option<usize> {
        self.bounds
            .iter()
            .find(|(kind, _)| *kind == layer)
            .map(|(_, offset)| *offset)
    }
}

fn ipv4_addresses(data: &[u8], ip_offset: usize) -> Option<(Ipv4Addr, Ipv4Addr)> {
    let ip = Ipv4Packet::new(&data[ip_offset..])?;
    Some((ip.get_source(), ip.get_destination()))
}

fn ipv6_addresses(data: &[u8], ip_offset: usize) -> Option<(Ipv6Addr, Ipv6Addr)> {
    let ip = Ipv6Packet::new(&data[ip_offset..])?;
    Some((ip.get_source(), ip.get_destination()))
}

/// Compute every derived field of the frame: L4 checksums over their
/// pseudo-headers, then IP length fields and the IPv4 header checksum.
///
/// Called twice per packet: once after the build pass so post-build hooks
/// see a complete frame, and once more after them to repair anything they
/// changed.
pub fn finalize(packet: &mut PacketBytes) -> Option<()> {
    if packet.fragmented {
        return Some(());
    }

    let mut ip: Option<(WireLayer, usize)> = None;
    let mut l4: Option<(WireLayer, usize)> = None;
    for &(kind, offset) in &packet.bounds {
        match kind {
            WireLayer::Ipv4 | WireLayer::Ipv6 => ip = Some((kind, offset)),
            WireLayer::Tcp | WireLayer::Udp | WireLayer::Icmp | WireLayer::Icmpv6 => {
                l4 = Some((kind, offset))
            }
            _ => {}
        }
    }
    let (ip_kind, ip_offset) = ip?;
    let data = &mut packet.data;
    let total_len = data.len();

    if let Some((l4_kind, l4_offset)) = l4 {
        match l4_kind {
            WireLayer::Tcp => {
                if ip_kind == WireLayer::Ipv4 {
                    let (src, dst) = ipv4_addresses(data, ip_offset)?;
                    let mut segment = MutableTcpPacket::new(&mut data[l4_offset..])?;
                    let checksum = tcp::ipv4_checksum(&segment.to_immutable(), &src, &dst);
                    segment.set_checksum(checksum);
                } else {
                    let (src, dst) = ipv6_addresses(data, ip_offset)?;
                    let mut segment = MutableTcpPacket::new(&mut data[l4_offset..])?;
                    let checksum = tcp::ipv6_checksum(&segment.to_immutable(), &src, &dst);
                    segment.set_checksum(checksum);
                }
            }
            WireLayer::Udp => {
                let length = (total_len - l4_offset) as u16;
                if ip_kind == WireLayer::Ipv4 {
                    let (src, dst) = ipv4_addresses(data, ip_offset)?;
                    let mut datagram = MutableUdpPacket::new(&mut data[l4_offset..])?;
                    datagram.set_length(length);
                    let checksum = udp::ipv4_checksum(&datagram.to_immutable(), &src, &dst);
                    datagram.set_checksum(checksum);
                } else {
                    let (src, dst) = ipv6_addresses(data, ip_offset)?;
                    let mut datagram = MutableUdpPacket::new(&mut data[l4_offset..])?;
                    datagram.set_length(length);
                    let checksum = udp::ipv6_checksum(&datagram.to_immutable(), &src, &dst);
                    datagram.set_checksum(checksum);
                }
            }
            WireLayer::Icmp => {
                let checksum = {
                    let message = IcmpPacket::new(&data[l4_offset..])?;
                    pnet_packet::icmp::checksum(&message)
                };
                data[l4_offset + 2..l4_offset + 4].copy_from_slice(&checksum.to_be_bytes());
            }
            WireLayer::Icmpv6 => {
                let (src, dst) = ipv6_addresses(data, ip_offset)?;
                let checksum = {
                    let message = Icmpv6Packet::new(&data[l4_offset..])?;
                    pnet_packet::icmpv6::checksum(&message, &src, &dst)
                };
                data[l4_offset + 2..l4_offset + 4].copy_from_slice(&checksum.to_be_bytes());
            }
            _ => unreachable!(),
        }
    }

    match ip_kind {
        WireLayer::Ipv4 => {
            let mut header = MutableIpv4Packet::new(&mut data[ip_offset..])?;
            header.set_total_length((total_len - ip_offset) as u16);
            let checksum = ipv4::checksum(&header.to_immutable());
            header.set_checksum(checksum);
        }
        WireLayer::Ipv6 => {
            let mut header = MutableIpv6Packet::new(&mut data[ip_offset..])?;
            header.set_payload_length((total_len - ip_offset - 40) as u16);
        }
        _ => unreachable!(),
    }

    Some(())
}

/// A finished frame handed to the sink.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Packet {
    pub timestamp: Duration,
    pub direction: Direction,
    pub data: Vec<u8>,
}

/// Used for packet ordering before pcap export.
impl Ord for Packet {
    fn cmp(&self, other: &Self) -> Ordering {
        if self.timestamp == other.timestamp {
            self.data.cmp(&other.data)
        } else {
            self.timestamp.cmp(&other.timestamp)
        }
    }
}

impl PartialOrd for Packet {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
