use super::{LayerHooks, LayerParams, ICMP_HDR_SIZE};
use crate::flow::Flow;
use crate::packet::{Direction, PacketBytes, PacketPlan, WireLayer};
use crate::random::RandomGenerator;
use pnet_packet::icmp::echo_reply::MutableEchoReplyPacket;
use pnet_packet::icmp::echo_request::MutableEchoRequestPacket;
use pnet_packet::icmp::{IcmpCode, IcmpTypes};

/// Echo request/reply traffic: forward packets are requests, reverse
/// packets replies, sharing one identifier with per-direction sequence
/// counters. Payload fills whatever the planned size left above the
/// headers.
pub struct IcmpEcho {
    pub(crate) layer_number: usize,
    identifier: u16,
    seq_fwd: u16,
    seq_rev: u16,
}

impl IcmpEcho {
    pub fn new() -> Self {
        IcmpEcho {
            layer_number: 0,
            identifier: 0,
            seq_fwd: 0,
            seq_rev: 0,
        }
    }
}

impl Default for IcmpEcho {
    fn default() -> Self {
        Self::new()
    }
}

impl LayerHooks for IcmpEcho {
    fn plan_flow(&mut self, flow: &mut Flow, rng: &mut RandomGenerator) {
        self.identifier = rng.random_uint(0, u16::MAX as u64) as u16;
        for plan in flow.packets.iter_mut() {
            plan.size += ICMP_HDR_SIZE;
            plan.params.push(LayerParams::Echo {
                header_end: plan.size,
            });
        }
    }

    fn build(&mut self, packet: &mut PacketBytes, plan: &PacketPlan, rng: &mut RandomGenerator) {
        let LayerParams::Echo { header_end } = *super::layer_params(plan, self.layer_number) else {
            return;
        };
        let payload_size = plan.size.saturating_sub(header_end) as usize;
        let offset = packet.begin_layer(WireLayer::Icmp, ICMP_HDR_SIZE as usize + payload_size);

        match plan.direction {
            Direction::Reverse => {
                let mut message = MutableEchoReplyPacket::new(&mut packet.data[offset..])
                    .expect("incorrect ICMP packet");
                message.set_icmp_type(IcmpTypes::EchoReply);
                message.set_icmp_code(IcmpCode::new(0));
                message.set_identifier(self.identifier);
                message.set_sequence_number(self.seq_rev);
                self.seq_rev = self.seq_rev.wrapping_add(1);
            }
            _ => {
                let mut message = MutableEchoRequestPacket::new(&mut packet.data[offset..])
                    .expect("incorrect ICMP packet");
                message.set_icmp_type(IcmpTypes::EchoRequest);
                message.set_icmp_code(IcmpCode::new(0));
                message.set_identifier(self.identifier);
                message.set_sequence_number(self.seq_fwd);
                self.seq_fwd = self.seq_fwd.wrapping_add(1);
            }
        }

        let payload_start = offset + ICMP_HDR_SIZE as usize;
        rng.fill_bytes(&mut packet.data[payload_start..]);
        // Checksum is computed by finalization.
    }
}
