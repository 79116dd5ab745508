use crate::flow::Flow;
use crate::packet::{PacketBytes, PacketPlan};
use crate::random::RandomGenerator;
use pnet_packet::ethernet::{EtherType, EtherTypes};

mod ethernet;
mod icmp_echo;
mod icmp_random;
mod icmpv6_echo;
mod icmpv6_random;
mod ipv4;
mod ipv6;
mod mpls;
mod payload;
mod tcp;
mod udp;
mod vlan;

pub use ethernet::Ethernet;
pub use icmp_echo::IcmpEcho;
pub use icmp_random::IcmpRandom;
pub use icmpv6_echo::Icmpv6Echo;
pub use icmpv6_random::Icmpv6Random;
pub use ipv4::Ipv4;
pub use ipv6::Ipv6;
pub use mpls::Mpls;
pub use payload::Payload;
pub use tcp::Tcp;
pub use udp::Udp;
pub use vlan::Vlan;

pub const ETHER_HDR_SIZE: u64 = 14;
pub const VLAN_HDR_SIZE: u64 = 4;
pub const MPLS_HDR_SIZE: u64 = 4;
pub const IPV4_HDR_SIZE: u64 = 20;
pub const IPV6_HDR_SIZE: u64 = 40;
pub const IPV6_FRAG_HDR_SIZE: u64 = 8;
pub const TCP_HDR_SIZE: u64 = 20;
pub const UDP_HDR_SIZE: u64 = 8;
// Type, code, checksum and the rest-of-header word.
pub const ICMP_HDR_SIZE: u64 = 8;
// Type, code and checksum only; error messages add their reserved word below.
pub const ICMPV6_HDR_SIZE: u64 = 4;

/// Structural size of a destination-unreachable message: the ICMP header
/// plus the embedded offender's IP and UDP headers.
pub const ICMP_UNREACH_PKT_SIZE: u64 = ICMP_HDR_SIZE + IPV4_HDR_SIZE + UDP_HDR_SIZE;
// The unreachable ICMPv6 message includes 4 reserved bytes after the header.
pub const ICMPV6_UNREACH_PKT_SIZE: u64 = ICMPV6_HDR_SIZE + 4 + IPV6_HDR_SIZE + UDP_HDR_SIZE;

/// Per-layer, per-packet parameters decided while planning and consumed
/// while building. Stored on each [`PacketPlan`] as one entry per layer of
/// the stack, in stack order.
#[derive(Debug, Clone, Copy)]
pub enum LayerParams {
    /// The layer needs no per-packet state.
    None,
    Ipv4 { fragment: bool },
    Ipv6 { fragment: bool },
    Tcp { flags: u8, header_end: u64 },
    Echo { header_end: u64 },
    Payload { header_end: u64, size: u64 },
}

pub(crate) fn layer_params(plan: &PacketPlan, layer_number: usize) -> &LayerParams {
    &plan.params[layer_number]
}

pub(crate) fn layer_params_mut(plan: &mut PacketPlan, layer_number: usize) -> &mut LayerParams {
    &mut plan.params[layer_number]
}

/// A protocol layer of a flow's stack.
///
/// Planning runs in three waves over the whole flow: `plan_flow` (may pin
/// sizes and directions and must push one params entry per packet),
/// `post_plan_flow` (directions and sizes are final) and `plan_extra`.
/// Building runs per packet in two waves around checksum finalization:
/// `build` emits the layer's bytes, `post_build` may adjust the finished
/// frame (fragmentation).
pub enum Layer {
    Ethernet(Ethernet),
    Vlan(Vlan),
    Mpls(Mpls),
    Ipv4(Ipv4),
    Ipv6(Ipv6),
    Tcp(Tcp),
    Udp(Udp),
    IcmpEcho(IcmpEcho),
    IcmpRandom(IcmpRandom),
    Icmpv6Echo(Icmpv6Echo),
    Icmpv6Random(Icmpv6Random),
    Payload(Payload),
}

macro_rules! dispatch {
    ($value:expr, $layer:ident => $call:expr) => {
        match $value {
            Layer::Ethernet($layer) => $call,
            Layer::Vlan($layer) => $call,
            Layer::Mpls($layer) => $call,
            Layer::Ipv4($layer) => $call,
            Layer::Ipv6($layer) => $call,
            Layer::Tcp($layer) => $call,
            Layer::Udp($layer) => $call,
            Layer::IcmpEcho($layer) => $call,
            Layer::IcmpRandom($layer) => $call,
            Layer::Icmpv6Echo($layer) => $call,
            Layer::Icmpv6Random($layer) => $call,
            Layer::Payload($layer) => $call,
        }
    };
}

impl Layer {
    pub(crate) fn added_to_flow(&mut self, layer_number: usize) {
        dispatch!(self, layer => layer.layer_number = layer_number)
    }

    pub(crate) fn plan_flow(&mut self, flow: &mut Flow, rng: &mut RandomGenerator) {
        dispatch!(self, layer => layer.plan_flow(flow, rng))
    }

    pub(crate) fn post_plan_flow(&mut self, flow: &mut Flow, rng: &mut RandomGenerator) {
        dispatch!(self, layer => layer.post_plan_flow(flow, rng))
    }

    pub(crate) fn plan_extra(&mut self, flow: &mut Flow, rng: &mut RandomGenerator) {
        dispatch!(self, layer => layer.plan_extra(flow, rng))
    }

    pub(crate) fn build(
        &mut self,
        packet: &mut PacketBytes,
        plan: &PacketPlan,
        rng: &mut RandomGenerator,
    ) {
        dispatch!(self, layer => layer.build(packet, plan, rng))
    }

    pub(crate) fn post_build(
        &mut self,
        packet: &mut PacketBytes,
        plan: &PacketPlan,
        rng: &mut RandomGenerator,
    ) {
        dispatch!(self, layer => layer.post_build(packet, plan, rng))
    }

    /// The EtherType an enclosing L2 layer announces for this layer, if any.
    pub(crate) fn ether_type(&self) -> Option<EtherType> {
        match self {
            Layer::Vlan(_) => Some(EtherTypes::Vlan),
            Layer::Mpls(_) => Some(EtherTypes::Mpls),
            Layer::Ipv4(_) => Some(EtherTypes::Ipv4),
            Layer::Ipv6(_) => Some(EtherTypes::Ipv6),
            _ => None,
        }
    }
}

/// Hooks shared by all layer variants. `plan_flow` and `build` are
/// mandatory; the rest default to no-ops.
pub(crate) trait LayerHooks {
    fn plan_flow(&mut self, flow: &mut Flow, rng: &mut RandomGenerator);

    fn post_plan_flow(&mut self, _flow: &mut Flow, _rng: &mut RandomGenerator) {}

    fn plan_extra(&mut self, _flow: &mut Flow, _rng: &mut RandomGenerator) {}

    fn build(&mut self, packet: &mut PacketBytes, plan: &PacketPlan, rng: &mut RandomGenerator);

    fn post_build(
        &mut self,
        _packet: &mut PacketBytes,
        _plan: &PacketPlan,
        _rng: &mut RandomGenerator,
    ) {
    }
}
