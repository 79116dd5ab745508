use super::{LayerHooks, LayerParams, ICMP_HDR_SIZE, ICMP_UNREACH_PKT_SIZE, IPV4_HDR_SIZE, UDP_HDR_SIZE};
use crate::flow::Flow;
use crate::packet::{PacketBytes, PacketPlan, WireLayer};
use crate::random::RandomGenerator;
use pnet_packet::icmp::{IcmpCode, IcmpType, MutableIcmpPacket};
use pnet_packet::ip::IpNextHeaderProtocols;
use pnet_packet::ipv4::{self, Ipv4Packet, MutableIpv4Packet};
use pnet_packet::udp::MutableUdpPacket;

// Error messages a middlebox plausibly emits about UDP traffic:
// destination unreachable (net, host, port) and TTL exceeded.
const MESSAGE_KINDS: [(u8, u8); 4] = [(3, 0), (3, 1), (3, 3), (11, 0)];

/// Unreachable-style error messages with a fixed structural layout: the
/// 8-byte ICMP header followed by the offending datagram's IPv4 and UDP
/// headers. Every packet's size is pinned during the first planning pass.
pub struct IcmpRandom {
    pub(crate) layer_number: usize,
}

impl IcmpRandom {
    pub fn new() -> Self {
        IcmpRandom { layer_number: 0 }
    }
}

impl Default for IcmpRandom {
    fn default() -> Self {
        Self::new()
    }
}

impl LayerHooks for IcmpRandom {
    fn plan_flow(&mut self, flow: &mut Flow, _rng: &mut RandomGenerator) {
        for plan in flow.packets.iter_mut() {
            plan.params.push(LayerParams::None);
            plan.size += ICMP_UNREACH_PKT_SIZE;
            plan.is_finished = true;
        }
    }

    fn build(&mut self, packet: &mut PacketBytes, _plan: &PacketPlan, rng: &mut RandomGenerator) {
        // The outer IPv4 header is already built; the embedded offender
        // travels the opposite way.
        let (outer_src, outer_dst) = packet
            .layer_offset(WireLayer::Ipv4)
            .and_then(|ip_offset| {
                let header = Ipv4Packet::new(&packet.data[ip_offset..])?;
                Some((header.get_source(), header.get_destination()))
            })
            .expect("incorrect IPv4 packet");

        let offset = packet.begin_layer(WireLayer::Icmp, ICMP_UNREACH_PKT_SIZE as usize);
        let (kind, code) =
            MESSAGE_KINDS[rng.random_uint(0, MESSAGE_KINDS.len() as u64 - 1) as usize];
        {
            let mut message = MutableIcmpPacket::new(&mut packet.data[offset..])
                .expect("incorrect ICMP packet");
            message.set_icmp_type(IcmpType::new(kind));
            message.set_icmp_code(IcmpCode::new(code));
        }

        let embedded_ip = offset + ICMP_HDR_SIZE as usize;
        let embedded_udp = embedded_ip + IPV4_HDR_SIZE as usize;
        {
            let mut header = MutableIpv4Packet::new(&mut packet.data[embedded_ip..])
                .expect("incorrect IPv4 packet");
            header.set_version(4);
            header.set_header_length(5);
            header.set_total_length((IPV4_HDR_SIZE + UDP_HDR_SIZE) as u16);
            header.set_identification(rng.random_uint(0, u16::MAX as u64) as u16);
            header.set_ttl(1);
            header.set_next_level_protocol(IpNextHeaderProtocols::Udp);
            header.set_source(outer_dst);
            header.set_destination(outer_src);
            let checksum = ipv4::checksum(&header.to_immutable());
            header.set_checksum(checksum);
        }
        {
            let mut datagram = MutableUdpPacket::new(&mut packet.data[embedded_udp..])
                .expect("incorrect UDP packet");
            datagram.set_source(rng.random_uint(1024, u16::MAX as u64) as u16);
            datagram.set_destination(rng.random_uint(1, u16::MAX as u64) as u16);
            datagram.set_length(UDP_HDR_SIZE as u16);
        }
        // Outer checksum is computed by finalization.
    }
}
