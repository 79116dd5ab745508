use super::{LayerHooks, LayerParams};
use crate::flow::Flow;
use crate::packet::{Direction, PacketBytes, PacketPlan, WireLayer};
use crate::random::RandomGenerator;
use pnet::util::MacAddr;
use pnet_packet::ethernet::{EtherType, EtherTypes, MutableEthernetPacket};

pub struct Ethernet {
    pub(crate) layer_number: usize,
    mac_src: MacAddr,
    mac_dst: MacAddr,
    ethertype: EtherType,
}

impl Ethernet {
    pub fn new(mac_src: MacAddr, mac_dst: MacAddr) -> Self {
        Ethernet {
            layer_number: 0,
            mac_src,
            mac_dst,
            ethertype: EtherTypes::Ipv4,
        }
    }

    pub(crate) fn set_next_ethertype(&mut self, ethertype: EtherType) {
        self.ethertype = ethertype;
    }
}

impl LayerHooks for Ethernet {
    fn plan_flow(&mut self, flow: &mut Flow, _rng: &mut RandomGenerator) {
        // The Ethernet header is not part of the planned size: flow byte
        // budgets count L3 and above.
        for plan in flow.packets.iter_mut() {
            plan.params.push(LayerParams::None);
        }
    }

    fn build(&mut self, packet: &mut PacketBytes, plan: &PacketPlan, _rng: &mut RandomGenerator) {
        let offset = packet.begin_layer(WireLayer::Ethernet, 14);
        let mut frame = MutableEthernetPacket::new(&mut packet.data[offset..])
            .expect("incorrect Ethernet frame");
        let (src, dst) = match plan.direction {
            Direction::Reverse => (self.mac_dst, self.mac_src),
            _ => (self.mac_src, self.mac_dst),
        };
        frame.set_destination(dst);
        frame.set_source(src);
        frame.set_ethertype(self.ethertype);
    }
}
