use super::{LayerHooks, LayerParams, MPLS_HDR_SIZE};
use crate::flow::Flow;
use crate::packet::{PacketBytes, PacketPlan, WireLayer};
use crate::random::RandomGenerator;

const MPLS_TTL: u8 = 64;

/// A single MPLS shim entry. `pnet_packet` has no MPLS support, so the
/// 4-byte label stack entry is written directly: label (20 bits), traffic
/// class (3), bottom-of-stack (1), TTL (8).
pub struct Mpls {
    pub(crate) layer_number: usize,
    label: u32,
    bottom_of_stack: bool,
}

impl Mpls {
    pub fn new(label: u32) -> Self {
        Mpls {
            layer_number: 0,
            label,
            bottom_of_stack: true,
        }
    }

    pub(crate) fn set_bottom_of_stack(&mut self, bottom: bool) {
        self.bottom_of_stack = bottom;
    }
}

impl LayerHooks for Mpls {
    fn plan_flow(&mut self, flow: &mut Flow, _rng: &mut RandomGenerator) {
        for plan in flow.packets.iter_mut() {
            plan.params.push(LayerParams::None);
            plan.size += MPLS_HDR_SIZE;
        }
    }

    fn build(&mut self, packet: &mut PacketBytes, _plan: &PacketPlan, _rng: &mut RandomGenerator) {
        let offset = packet.begin_layer(WireLayer::Mpls, MPLS_HDR_SIZE as usize);
        let entry = self.label << 12 | (self.bottom_of_stack as u32) << 8 | MPLS_TTL as u32;
        packet.data[offset..offset + 4].copy_from_slice(&entry.to_be_bytes());
    }
}
