use super::{layer_params, layer_params_mut, LayerHooks, LayerParams, IPV4_HDR_SIZE};
use crate::flow::Flow;
use crate::packet::{Direction, PacketBytes, PacketPlan, WireLayer};
use crate::random::RandomGenerator;
use pnet_packet::ip::IpNextHeaderProtocol;
use pnet_packet::ipv4::{self, Ipv4Flags, MutableIpv4Packet};
use std::net::Ipv4Addr;

const DEFAULT_TTL: u8 = 64;

pub struct Ipv4 {
    pub(crate) layer_number: usize,
    ip_src: Ipv4Addr,
    ip_dst: Ipv4Addr,
    fragment_probability: f64,
    min_packet_size_to_fragment: u64,
    next_protocol: IpNextHeaderProtocol,
}

impl Ipv4 {
    pub fn new(
        ip_src: Ipv4Addr,
        ip_dst: Ipv4Addr,
        fragment_probability: f64,
        min_packet_size_to_fragment: u64,
    ) -> Self {
        Ipv4 {
            layer_number: 0,
            ip_src,
            ip_dst,
            fragment_probability,
            min_packet_size_to_fragment,
            next_protocol: IpNextHeaderProtocol::new(0),
        }
    }

    pub(crate) fn set_next_protocol(&mut self, protocol: IpNextHeaderProtocol) {
        self.next_protocol = protocol;
    }
}

impl LayerHooks for Ipv4 {
    fn plan_flow(&mut self, flow: &mut Flow, _rng: &mut RandomGenerator) {
        for plan in flow.packets.iter_mut() {
            plan.params.push(LayerParams::Ipv4 { fragment: false });
            plan.size += IPV4_HDR_SIZE;
        }
    }

    // Fragmentation is decided only once the sizes are final.
    fn post_plan_flow(&mut self, flow: &mut Flow, rng: &mut RandomGenerator) {
        if self.fragment_probability <= 0.0 {
            return;
        }
        let layer_number = self.layer_number;
        for plan in flow.packets.iter_mut() {
            if plan.size >= self.min_packet_size_to_fragment
                && rng.random_double() < self.fragment_probability
            {
                if let LayerParams::Ipv4 { fragment } = layer_params_mut(plan, layer_number) {
                    *fragment = true;
                }
            }
        }
    }

    fn build(&mut self, packet: &mut PacketBytes, plan: &PacketPlan, rng: &mut RandomGenerator) {
        let offset = packet.begin_layer(WireLayer::Ipv4, IPV4_HDR_SIZE as usize);
        let mut header =
            MutableIpv4Packet::new(&mut packet.data[offset..]).expect("incorrect IPv4 packet");
        header.set_version(4);
        header.set_header_length(5);
        header.set_identification(rng.random_uint(0, u16::MAX as u64) as u16);
        header.set_ttl(DEFAULT_TTL);
        header.set_next_level_protocol(self.next_protocol);
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
        // Total length and checksum are computed by finalization.
    }

    /// Split the finished datagram into two fragments. The L4 checksum was
    /// already computed over the whole datagram, which is exactly what
    /// reassembly expects.
    fn post_build(&mut self, packet: &mut PacketBytes, plan: &PacketPlan, _rng: &mut RandomGenerator) {
        match layer_params(plan, self.layer_number) {
            LayerParams::Ipv4 { fragment: true } => {}
            _ => return,
        }
        let Some(ip_offset) = packet.layer_offset(WireLayer::Ipv4) else {
            return;
        };
        let header_end = ip_offset + IPV4_HDR_SIZE as usize;
        let payload_len = packet.data.len() - header_end;
        if payload_len < 16 {
            return;
        }
        // Non-final fragments must carry a multiple of 8 payload bytes.
        let first_len = (payload_len / 2 + 7) & !7;

        let mut tail = packet.data.split_off(header_end + first_len);

        let mut first =
            MutableIpv4Packet::new(&mut packet.data[ip_offset..]).expect("incorrect IPv4 packet");
        first.set_flags(Ipv4Flags::MoreFragments);
        first.set_fragment_offset(0);
        first.set_total_length((IPV4_HDR_SIZE as usize + first_len) as u16);
        let checksum = ipv4::checksum(&first.to_immutable());
        first.set_checksum(checksum);

        let mut frame = packet.data[..header_end].to_vec();
        frame.append(&mut tail);
        let tail_len = frame.len() - header_end;
        let mut second =
            MutableIpv4Packet::new(&mut frame[ip_offset..]).expect("incorrect IPv4 packet");
        second.set_flags(0);
        second.set_fragment_offset((first_len / 8) as u16);
        second.set_total_length((IPV4_HDR_SIZE as usize + tail_len) as u16);
        let checksum = ipv4::checksum(&second.to_immutable());
        second.set_checksum(checksum);

        packet.extra_frames.push(frame);
        packet.fragmented = true;
    }
}
