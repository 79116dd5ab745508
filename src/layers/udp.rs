use super::{LayerHooks, LayerParams, UDP_HDR_SIZE};
use crate::flow::Flow;
use crate::packet::{Direction, PacketBytes, PacketPlan, WireLayer};
use crate::random::RandomGenerator;
use pnet_packet::udp::MutableUdpPacket;

pub struct Udp {
    pub(crate) layer_number: usize,
    port_src: u16,
    port_dst: u16,
}

impl Udp {
    pub fn new(port_src: u16, port_dst: u16) -> Self {
        Udp {
            layer_number: 0,
            port_src,
            port_dst,
        }
    }
}

impl LayerHooks for Udp {
    fn plan_flow(&mut self, flow: &mut Flow, _rng: &mut RandomGenerator) {
        for plan in flow.packets.iter_mut() {
            plan.params.push(LayerParams::None);
            plan.size += UDP_HDR_SIZE;
        }
    }

    fn build(&mut self, packet: &mut PacketBytes, plan: &PacketPlan, _rng: &mut RandomGenerator) {
        let offset = packet.begin_layer(WireLayer::Udp, UDP_HDR_SIZE as usize);
        let mut datagram =
            MutableUdpPacket::new(&mut packet.data[offset..]).expect("incorrect UDP packet");
        match plan.direction {
            Direction::Reverse => {
                datagram.set_source(self.port_dst);
                datagram.set_destination(self.port_src);
            }
            _ => {
                datagram.set_source(self.port_src);
                datagram.set_destination(self.port_dst);
            }
        }
        // Length and checksum are computed by finalization.
    }
}
