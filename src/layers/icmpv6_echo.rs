use super::{LayerHooks, LayerParams, ICMPV6_HDR_SIZE};
use crate::flow::Flow;
use crate::packet::{Direction, PacketBytes, PacketPlan, WireLayer};
use crate::random::RandomGenerator;
use pnet_packet::icmpv6::{Icmpv6Code, Icmpv6Types, MutableIcmpv6Packet};

// Type, code, checksum, identifier and sequence number.
const ECHO_HDR_SIZE: u64 = ICMPV6_HDR_SIZE + 4;

/// ICMPv6 echo request/reply traffic, mirroring the IPv4 echo layer.
/// `pnet_packet` has no typed echo view for ICMPv6, so the identifier and
/// sequence number are written into the message body directly.
pub struct Icmpv6Echo {
    pub(crate) layer_number: usize,
    identifier: u16,
    seq_fwd: u16,
    seq_rev: u16,
}

impl Icmpv6Echo {
    pub fn new() -> Self {
        Icmpv6Echo {
            layer_number: 0,
            identifier: 0,
            seq_fwd: 0,
            seq_rev: 0,
        }
    }
}

impl Default for Icmpv6Echo {
    fn default() -> Self {
        Self::new()
    }
}

impl LayerHooks for Icmpv6Echo {
    fn plan_flow(&mut self, flow: &mut Flow, rng: &mut RandomGenerator) {
        self.identifier = rng.random_uint(0, u16::MAX as u64) as u16;
        for plan in flow.packets.iter_mut() {
            plan.size += ECHO_HDR_SIZE;
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
        let offset = packet.begin_layer(WireLayer::Icmpv6, ECHO_HDR_SIZE as usize + payload_size);

        let sequence = match plan.direction {
            Direction::Reverse => {
                let seq = self.seq_rev;
                self.seq_rev = self.seq_rev.wrapping_add(1);
                seq
            }
            _ => {
                let seq = self.seq_fwd;
                self.seq_fwd = self.seq_fwd.wrapping_add(1);
                seq
            }
        };
        {
            let mut message = MutableIcmpv6Packet::new(&mut packet.data[offset..])
                .expect("incorrect ICMPv6 packet");
            message.set_icmpv6_type(match plan.direction {
                Direction::Reverse => Icmpv6Types::EchoReply,
                _ => Icmpv6Types::EchoRequest,
            });
            message.set_icmpv6_code(Icmpv6Code::new(0));
        }
        let body = offset + ICMPV6_HDR_SIZE as usize;
        packet.data[body..body + 2].copy_from_slice(&self.identifier.to_be_bytes());
        packet.data[body + 2..body + 4].copy_from_slice(&sequence.to_be_bytes());

        let payload_start = offset + ECHO_HDR_SIZE as usize;
        rng.fill_bytes(&mut packet.data[payload_start..]);
        // Checksum is computed by finalization.
    }
}
