use super::{layer_params, layer_params_mut, LayerHooks, LayerParams};
use crate::flow::Flow;
use crate::packet::{PacketBytes, PacketPlan, WireLayer};
use crate::random::RandomGenerator;

/// Random application payload filling each packet up to its planned size.
pub struct Payload {
    pub(crate) layer_number: usize,
}

impl Payload {
    pub fn new() -> Self {
        Payload { layer_number: 0 }
    }
}

impl Default for Payload {
    fn default() -> Self {
        Self::new()
    }
}

impl LayerHooks for Payload {
    fn plan_flow(&mut self, flow: &mut Flow, _rng: &mut RandomGenerator) {
        // All preceding layers have added their header sizes by now; what
        // the size distributor adds on top becomes payload.
        for plan in flow.packets.iter_mut() {
            plan.params.push(LayerParams::Payload {
                header_end: plan.size,
                size: 0,
            });
        }
    }

    fn post_plan_flow(&mut self, flow: &mut Flow, _rng: &mut RandomGenerator) {
        let layer_number = self.layer_number;
        for plan in flow.packets.iter_mut() {
            let total = plan.size;
            if let LayerParams::Payload { header_end, size } = layer_params_mut(plan, layer_number)
            {
                *size = total.saturating_sub(*header_end);
            }
        }
    }

    fn build(&mut self, packet: &mut PacketBytes, plan: &PacketPlan, rng: &mut RandomGenerator) {
        let LayerParams::Payload { size, .. } = *layer_params(plan, self.layer_number) else {
            return;
        };
        let offset = packet.begin_layer(WireLayer::Payload, size as usize);
        rng.fill_bytes(&mut packet.data[offset..]);
    }
}
