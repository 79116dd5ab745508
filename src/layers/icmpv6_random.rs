use super::{
    LayerHooks, LayerParams, ICMPV6_HDR_SIZE, ICMPV6_UNREACH_PKT_SIZE, IPV6_HDR_SIZE, UDP_HDR_SIZE,
};
use crate::flow::Flow;
use crate::packet::{PacketBytes, PacketPlan, WireLayer};
use crate::random::RandomGenerator;
use pnet_packet::icmpv6::{Icmpv6Code, Icmpv6Type, MutableIcmpv6Packet};
use pnet_packet::ip::IpNextHeaderProtocols;
use pnet_packet::ipv6::{Ipv6Packet, MutableIpv6Packet};
use pnet_packet::udp::MutableUdpPacket;

// Destination unreachable (no route, admin prohibited, port) and hop limit
// exceeded.
const MESSAGE_KINDS: [(u8, u8); 4] = [(1, 0), (1, 1), (1, 4), (3, 0)];

/// Unreachable-style ICMPv6 error messages: header, 4 reserved bytes, then
/// the offending datagram's IPv6 and UDP headers. Sizes are pinned during
/// the first planning pass.
pub struct Icmpv6Random {
    pub(crate) layer_number: usize,
}

impl Icmpv6Random {
    pub fn new() -> Self {
        Icmpv6Random { layer_number: 0 }
    }
}

impl Default for Icmpv6Random {
    fn default() -> Self {
        Self::new()
    }
}

impl LayerHooks for Icmpv6Random {
    fn plan_flow(&mut self, flow: &mut Flow, _rng: &mut RandomGenerator) {
        for plan in flow.packets.iter_mut() {
            plan.params.push(LayerParams::None);
            plan.size += ICMPV6_UNREACH_PKT_SIZE;
            plan.is_finished = true;
        }
    }

    fn build(&mut self, packet: &mut PacketBytes, _plan: &PacketPlan, rng: &mut RandomGenerator) {
        let (outer_src, outer_dst) = packet
            .layer_offset(WireLayer::Ipv6)
            .and_then(|ip_offset| {
                let header = Ipv6Packet::new(&packet.data[ip_offset..])?;
                Some((header.get_source(), header.get_destination()))
            })
            .expect("incorrect IPv6 packet");

        let offset = packet.begin_layer(WireLayer::Icmpv6, ICMPV6_UNREACH_PKT_SIZE as usize);
        let (kind, code) =
            MESSAGE_KINDS[rng.random_uint(0, MESSAGE_KINDS.len() as u64 - 1) as usize];
        {
            let mut message = MutableIcmpv6Packet::new(&mut packet.data[offset..])
                .expect("incorrect ICMPv6 packet");
            message.set_icmpv6_type(Icmpv6Type::new(kind));
            message.set_icmpv6_code(Icmpv6Code::new(code));
        }

        // 4 reserved bytes stay zero, then the embedded offender, which
        // travels the opposite way.
        let embedded_ip = offset + ICMPV6_HDR_SIZE as usize + 4;
        let embedded_udp = embedded_ip + IPV6_HDR_SIZE as usize;
        {
            let mut header = MutableIpv6Packet::new(&mut packet.data[embedded_ip..])
                .expect("incorrect IPv6 packet");
            header.set_version(6);
            header.set_payload_length(UDP_HDR_SIZE as u16);
            header.set_next_header(IpNextHeaderProtocols::Udp);
            header.set_hop_limit(1);
            header.set_source(outer_dst);
            header.set_destination(outer_src);
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
