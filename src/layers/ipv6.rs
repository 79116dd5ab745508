use super::{layer_params, layer_params_mut, LayerHooks, LayerParams, IPV6_FRAG_HDR_SIZE, IPV6_HDR_SIZE};
use crate::flow::Flow;
use crate::packet::{Direction, PacketBytes, PacketPlan, WireLayer};
use crate::random::RandomGenerator;
use pnet_packet::ip::{IpNextHeaderProtocol, IpNextHeaderProtocols};
use pnet_packet::ipv6::MutableIpv6Packet;
use std::net::Ipv6Addr;

const DEFAULT_HOP_LIMIT: u8 = 64;

pub struct Ipv6 {
    pub(crate) layer_number: usize,
    ip_src: Ipv6Addr,
    ip_dst: Ipv6Addr,
    fragment_probability: f64,
    min_packet_size_to_fragment: u64,
    next_header: IpNextHeaderProtocol,
    flow_label: u32,
}

impl Ipv6 {
    pub fn new(
        ip_src: Ipv6Addr,
        ip_dst: Ipv6Addr,
        fragment_probability: f64,
        min_packet_size_to_fragment: u64,
    ) -> Self {
        Ipv6 {
            layer_number: 0,
            ip_src,
            ip_dst,
            fragment_probability,
            min_packet_size_to_fragment,
            next_header: IpNextHeaderProtocol::new(0),
            flow_label: 0,
        }
    }

    pub(crate) fn set_next_header(&mut self, protocol: IpNextHeaderProtocol) {
        self.next_header = protocol;
    }
}

impl LayerHooks for Ipv6 {
    fn plan_flow(&mut self, flow: &mut Flow, rng: &mut RandomGenerator) {
        self.flow_label = rng.random_uint(0, 0xfffff) as u32;
        for plan in flow.packets.iter_mut() {
            plan.params.push(LayerParams::Ipv6 { fragment: false });
            plan.size += IPV6_HDR_SIZE;
        }
    }

    fn post_plan_flow(&mut self, flow: &mut Flow, rng: &mut RandomGenerator) {
        if self.fragment_probability <= 0.0 {
            return;
        }
        let layer_number = self.layer_number;
        for plan in flow.packets.iter_mut() {
            if plan.size >= self.min_packet_size_to_fragment
                && rng.random_double() < self.fragment_probability
            {
                if let LayerParams::Ipv6 { fragment } = layer_params_mut(plan, layer_number) {
                    *fragment = true;
                }
            }
        }
    }

    fn build(&mut self, packet: &mut PacketBytes, plan: &PacketPlan, _rng: &mut RandomGenerator) {
        let offset = packet.begin_layer(WireLayer::Ipv6, IPV6_HDR_SIZE as usize);
        let mut header =
            MutableIpv6Packet::new(&mut packet.data[offset..]).expect("incorrect IPv6 packet");
        header.set_version(6);
        header.set_traffic_class(0);
        header.set_flow_label(self.flow_label);
        header.set_next_header(self.next_header);
        header.set_hop_limit(DEFAULT_HOP_LIMIT);
        match plan.direction {
            Direction::Reverse => {
                header.set_source(self.ip_dst);
                header.set_destination(self.ip_src);
            }
            _ => {
                header.set_source(self.ip_src);
                header.set_destination(self.ip_dst);
            }
        }
        // Payload length is computed by finalization.
    }

    /// Split the finished datagram per RFC 8200 §4.5: each fragment keeps
    /// the base header with next-header 44 and gets its own fragment
    /// extension header. `pnet_packet` has no view for the extension, so
    /// its 8 bytes are written directly.
    fn post_build(&mut self, packet: &mut PacketBytes, plan: &PacketPlan, rng: &mut RandomGenerator) {
        match layer_params(plan, self.layer_number) {
            LayerParams::Ipv6 { fragment: true } => {}
            _ => return,
        }
        let Some(ip_offset) = packet.layer_offset(WireLayer::Ipv6) else {
            return;
        };
        let header_end = ip_offset + IPV6_HDR_SIZE as usize;
        let payload = packet.data.split_off(header_end);
        if payload.len() < 16 {
            packet.data.extend_from_slice(&payload);
            return;
        }
        let first_len = (payload.len() / 2 + 7) & !7;
        let identification = rng.random_uint(0, u32::MAX as u64) as u32;
        let orig_next_header = packet.data[ip_offset + 6];

        let unfragmentable = packet.data.clone();
        let mut frames = Vec::with_capacity(2);
        for (chunk, fragment_offset, more) in [
            (&payload[..first_len], 0usize, true),
            (&payload[first_len..], first_len, false),
        ] {
            let mut frame = unfragmentable.clone();
            frame.push(orig_next_header);
            frame.push(0);
            // 13-bit offset in 8-octet units, M flag in the lowest bit.
            let offset_field = ((fragment_offset / 8) as u16) << 3 | more as u16;
            frame.extend_from_slice(&offset_field.to_be_bytes());
            frame.extend_from_slice(&identification.to_be_bytes());
            frame.extend_from_slice(chunk);

            let mut header =
                MutableIpv6Packet::new(&mut frame[ip_offset..]).expect("incorrect IPv6 packet");
            header.set_next_header(IpNextHeaderProtocols::Ipv6Frag);
            header.set_payload_length((IPV6_FRAG_HDR_SIZE as usize + chunk.len()) as u16);
            frames.push(frame);
        }

        packet.data = frames.remove(0);
        packet.extra_frames.append(&mut frames);
        packet.fragmented = true;
    }
}
