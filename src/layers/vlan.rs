use super::{LayerHooks, LayerParams, VLAN_HDR_SIZE};
use crate::flow::Flow;
use crate::packet::{PacketBytes, PacketPlan, WireLayer};
use crate::random::RandomGenerator;
use pnet_packet::ethernet::{EtherType, EtherTypes};
use pnet_packet::vlan::{ClassOfService, MutableVlanPacket};

pub struct Vlan {
    pub(crate) layer_number: usize,
    id: u16,
    ethertype: EtherType,
}

impl Vlan {
    pub fn new(id: u16) -> Self {
        Vlan {
            layer_number: 0,
            id,
            ethertype: EtherTypes::Ipv4,
        }
    }

    pub(crate) fn set_next_ethertype(&mut self, ethertype: EtherType) {
        self.ethertype = ethertype;
    }
}

impl LayerHooks for Vlan {
    fn plan_flow(&mut self, flow: &mut Flow, _rng: &mut RandomGenerator) {
        for plan in flow.packets.iter_mut() {
            plan.params.push(LayerParams::None);
            plan.size += VLAN_HDR_SIZE;
        }
    }

    fn build(&mut self, packet: &mut PacketBytes, _plan: &PacketPlan, _rng: &mut RandomGenerator) {
        let offset = packet.begin_layer(WireLayer::Vlan, VLAN_HDR_SIZE as usize);
        let mut tag =
            MutableVlanPacket::new(&mut packet.data[offset..]).expect("incorrect VLAN tag");
        tag.set_priority_code_point(ClassOfService::new(0));
        tag.set_drop_eligible_indicator(0);
        tag.set_vlan_identifier(self.id);
        tag.set_ethertype(self.ethertype);
    }
}
