use crate::addressgen::AddressGenerators;
use crate::config::{Configuration, EncapsulationLayer, EncapsulationVariant};
use crate::error::{Error, Result};
use crate::layers::{
    Ethernet, IcmpEcho, IcmpRandom, Icmpv6Echo, Icmpv6Random, Ipv4, Ipv6, Layer, Mpls, Payload,
    Tcp, Udp, Vlan, ETHER_HDR_SIZE, ICMPV6_UNREACH_PKT_SIZE, ICMP_UNREACH_PKT_SIZE,
};
use crate::packet::{finalize, Direction, Packet, PacketBytes, PacketPlan};
use crate::profile::{FlowProfile, L3Protocol, L4Protocol};
use crate::random::RandomGenerator;
use crate::valuegen::{IntervalInfo, PacketSizeGenerator};
use pnet_packet::ip::IpNextHeaderProtocol;
use rand::prelude::*;
use rand_pcg::Pcg32;
use std::collections::VecDeque;
use std::mem;
use std::net::IpAddr;
use std::time::Duration;

// Distribution of frame sizes observed on real traffic, shifted down by the
// L2 header so it describes L3-and-above sizes.
const PACKET_SIZE_PROBABILITIES: [(u64, u64, f64); 6] = [
    (64, 79, 0.2824),
    (80, 159, 0.073),
    (160, 319, 0.0115),
    (320, 639, 0.012),
    (640, 1279, 0.0092),
    (1280, 1500, 0.6119),
];

fn packet_size_intervals() -> Result<Vec<IntervalInfo>> {
    PACKET_SIZE_PROBABILITIES
        .iter()
        .map(|&(from, to, probability)| {
            if from < ETHER_HDR_SIZE || to < ETHER_HDR_SIZE {
                return Err(Error::InvalidConfig(
                    "packet size must be at least the size of an L2 header".into(),
                ));
            }
            Ok(IntervalInfo {
                from: from - ETHER_HDR_SIZE,
                to: to - ETHER_HDR_SIZE,
                probability,
            })
        })
        .collect()
}

/// Pick the variant whose cumulative probability covers `rand`.
pub(crate) fn select_variant(
    variants: &[EncapsulationVariant],
    rand: f64,
) -> Option<&EncapsulationVariant> {
    let mut accum = 0.0;
    for variant in variants {
        accum += variant.probability;
        if rand <= accum {
            return Some(variant);
        }
    }
    None
}

fn choose_encapsulation<'a>(
    variants: &'a [EncapsulationVariant],
    rng: &mut RandomGenerator,
) -> &'a [EncapsulationLayer] {
    if variants.is_empty() {
        return &[];
    }
    select_variant(variants, rng.random_double())
        .map(|variant| variant.layers.as_slice())
        .unwrap_or(&[])
}

/// A simple heuristic choosing the ICMP generation strategy from the flow
/// characteristics: few or lopsided and small packets look like error
/// messages, everything else like an echo session.
fn make_icmp_layer(
    l3_proto: L3Protocol,
    fwd_packets: u64,
    rev_packets: u64,
    fwd_bytes: u64,
    rev_bytes: u64,
) -> Layer {
    let mut fwd_rev_ratio_diff = 1.0;
    let mut bytes_per_pkt = 0.0;
    if fwd_packets + rev_packets > 0 {
        let min = fwd_packets.min(rev_packets) as f64;
        let max = fwd_packets.max(rev_packets) as f64;
        fwd_rev_ratio_diff = 1.0 - min / max;
        bytes_per_pkt = ((fwd_bytes + rev_bytes) / (fwd_packets + rev_packets)) as f64;
    }

    let unreach_size = match l3_proto {
        L3Protocol::Ipv4 => ICMP_UNREACH_PKT_SIZE,
        L3Protocol::Ipv6 => ICMPV6_UNREACH_PKT_SIZE,
    } as f64;
    let small = bytes_per_pkt <= 1.10 * unreach_size;
    let random = ((fwd_packets <= 3 || rev_packets <= 3) && small)
        || (fwd_rev_ratio_diff > 0.2 && small);

    match (l3_proto, random) {
        (L3Protocol::Ipv4, true) => Layer::IcmpRandom(IcmpRandom::new()),
        (L3Protocol::Ipv4, false) => Layer::IcmpEcho(IcmpEcho::new()),
        (L3Protocol::Ipv6, true) => Layer::Icmpv6Random(Icmpv6Random::new()),
        (L3Protocol::Ipv6, false) => Layer::Icmpv6Echo(Icmpv6Echo::new()),
    }
}

/// A flow being generated: the layer stack built from one profile, the
/// planned packets, and the frames still waiting to be handed out.
///
/// Construction runs the whole planning pipeline; afterwards
/// [`generate_next_packet`](Self::generate_next_packet) drains the plan in
/// timestamp order.
pub struct Flow {
    pub id: u64,
    layers: Vec<Layer>,
    pub(crate) packets: VecDeque<PacketPlan>,
    pending: VecDeque<Packet>,
    pub(crate) fwd_packets: u64,
    pub(crate) rev_packets: u64,
    pub(crate) fwd_bytes: u64,
    pub(crate) rev_bytes: u64,
    pub(crate) ts_first: Duration,
    pub(crate) ts_last: Duration,
}

impl Flow {
    pub fn new(
        id: u64,
        profile: &FlowProfile,
        address_generators: &mut AddressGenerators,
        config: &Configuration,
        rng: &mut RandomGenerator,
    ) -> Result<Self> {
        let mut flow = Flow {
            id,
            layers: Vec::new(),
            packets: VecDeque::new(),
            pending: VecDeque::new(),
            fwd_packets: profile.packets,
            rev_packets: profile.packets_rev,
            fwd_bytes: profile.bytes,
            rev_bytes: profile.bytes_rev,
            ts_first: profile.start_time,
            ts_last: profile.end_time,
        };

        let mac_src = address_generators.generate_mac();
        let mac_dst = address_generators.generate_mac();
        flow.add_layer(Layer::Ethernet(Ethernet::new(mac_src, mac_dst)));

        for layer in choose_encapsulation(&config.encapsulation, rng) {
            match layer {
                EncapsulationLayer::Vlan { id } => flow.add_layer(Layer::Vlan(Vlan::new(*id))),
                EncapsulationLayer::Mpls { label } => {
                    flow.add_layer(Layer::Mpls(Mpls::new(*label)))
                }
            }
        }

        match profile.l3_proto {
            L3Protocol::Ipv4 => {
                let ip_src = match profile.src_ip {
                    Some(IpAddr::V4(ip)) => ip,
                    _ => address_generators.generate_ipv4(),
                };
                let ip_dst = match profile.dst_ip {
                    Some(IpAddr::V4(ip)) => ip,
                    _ => address_generators.generate_ipv4(),
                };
                flow.add_layer(Layer::Ipv4(Ipv4::new(
                    ip_src,
                    ip_dst,
                    config.ipv4.fragmentation_probability,
                    config.ipv4.min_packet_size_to_fragment,
                )));
            }
            L3Protocol::Ipv6 => {
                let ip_src = match profile.src_ip {
                    Some(IpAddr::V6(ip)) => ip,
                    _ => address_generators.generate_ipv6(),
                };
                let ip_dst = match profile.dst_ip {
                    Some(IpAddr::V6(ip)) => ip,
                    _ => address_generators.generate_ipv6(),
                };
                flow.add_layer(Layer::Ipv6(Ipv6::new(
                    ip_src,
                    ip_dst,
                    config.ipv6.fragmentation_probability,
                    config.ipv6.min_packet_size_to_fragment,
                )));
            }
        }

        match profile.l4_proto {
            L4Protocol::Tcp => {
                flow.add_layer(Layer::Tcp(Tcp::new(profile.src_port, profile.dst_port)));
            }
            L4Protocol::Udp => {
                flow.add_layer(Layer::Udp(Udp::new(profile.src_port, profile.dst_port)));
            }
            L4Protocol::Icmp => {
                if profile.l3_proto != L3Protocol::Ipv4 {
                    return Err(Error::ProtocolMismatch {
                        l3: profile.l3_proto,
                        l4: profile.l4_proto,
                    });
                }
                flow.add_layer(make_icmp_layer(
                    profile.l3_proto,
                    flow.fwd_packets,
                    flow.rev_packets,
                    flow.fwd_bytes,
                    flow.rev_bytes,
                ));
            }
            L4Protocol::Icmpv6 => {
                if profile.l3_proto != L3Protocol::Ipv6 {
                    return Err(Error::ProtocolMismatch {
                        l3: profile.l3_proto,
                        l4: profile.l4_proto,
                    });
                }
                flow.add_layer(make_icmp_layer(
                    profile.l3_proto,
                    flow.fwd_packets,
                    flow.rev_packets,
                    flow.fwd_bytes,
                    flow.rev_bytes,
                ));
            }
        }

        if matches!(profile.l4_proto, L4Protocol::Tcp | L4Protocol::Udp) {
            flow.add_layer(Layer::Payload(Payload::new()));
        }

        flow.wire_stack(profile.l4_proto);
        flow.plan(rng)?;
        Ok(flow)
    }

    fn add_layer(&mut self, mut layer: Layer) {
        layer.added_to_flow(self.layers.len());
        self.layers.push(layer);
    }

    /// Resolve the cross-layer facts that only the finished stack knows:
    /// which EtherType each L2 layer announces, which IP protocol number
    /// the IP layer carries, and which MPLS entry is the bottom of stack.
    fn wire_stack(&mut self, l4_proto: L4Protocol) {
        let next_ether_types: Vec<_> = self
            .layers
            .iter()
            .skip(1)
            .map(|layer| layer.ether_type())
            .collect();
        let mpls_bottom: Vec<bool> = self
            .layers
            .iter()
            .skip(1)
            .map(|layer| !matches!(layer, Layer::Mpls(_)))
            .collect();
        let protocol = IpNextHeaderProtocol::new(l4_proto.number());

        for (index, layer) in self.layers.iter_mut().enumerate() {
            match layer {
                Layer::Ethernet(ethernet) => {
                    if let Some(Some(ethertype)) = next_ether_types.get(index) {
                        ethernet.set_next_ethertype(*ethertype);
                    }
                }
                Layer::Vlan(vlan) => {
                    if let Some(Some(ethertype)) = next_ether_types.get(index) {
                        vlan.set_next_ethertype(*ethertype);
                    }
                }
                Layer::Mpls(mpls) => {
                    if let Some(bottom) = mpls_bottom.get(index) {
                        mpls.set_bottom_of_stack(*bottom);
                    }
                }
                Layer::Ipv4(ipv4) => ipv4.set_next_protocol(protocol),
                Layer::Ipv6(ipv6) => ipv6.set_next_header(protocol),
                _ => {}
            }
        }
    }

    /// Run every planning phase in order. Once this returns, all packet
    /// plans have a direction, a size and a timestamp.
    fn plan(&mut self, rng: &mut RandomGenerator) -> Result<()> {
        self.packets = (0..self.fwd_packets + self.rev_packets)
            .map(|_| PacketPlan::new())
            .collect();

        let mut layers = mem::take(&mut self.layers);
        for layer in layers.iter_mut() {
            layer.plan_flow(self, rng);
        }

        self.plan_packets_directions();
        self.plan_packets_sizes(rng)?;

        for layer in layers.iter_mut() {
            layer.post_plan_flow(self, rng);
        }
        for layer in layers.iter_mut() {
            layer.plan_extra(self, rng);
        }

        self.plan_packets_timestamps(rng);
        self.layers = layers;
        Ok(())
    }

    fn available_directions(&self) -> (usize, usize) {
        let mut assigned_fwd = 0u64;
        let mut assigned_rev = 0u64;
        for plan in &self.packets {
            match plan.direction {
                Direction::Forward => assigned_fwd += 1,
                Direction::Reverse => assigned_rev += 1,
                Direction::Unknown => {}
            }
        }
        (
            self.fwd_packets.saturating_sub(assigned_fwd) as usize,
            self.rev_packets.saturating_sub(assigned_rev) as usize,
        )
    }

    fn plan_packets_directions(&mut self) {
        let (fwd, rev) = self.available_directions();
        let mut directions = vec![Direction::Forward; fwd];
        directions.extend(std::iter::repeat_n(Direction::Reverse, rev));

        // A freshly default-seeded engine, so the direction pattern does
        // not depend on the run seed. Default stream values from the Pcg32
        // documentation.
        let mut shuffler = Pcg32::new(0xcafef00dd15ea5e5, 0xa02bdbf7bb3c0a7);
        directions.shuffle(&mut shuffler);

        let mut next = directions.into_iter();
        for plan in self.packets.iter_mut() {
            if plan.direction == Direction::Unknown {
                if let Some(direction) = next.next() {
                    plan.direction = direction;
                }
            }
        }
    }

    fn plan_packets_sizes(&mut self, rng: &mut RandomGenerator) -> Result<()> {
        let intervals = packet_size_intervals()?;
        let mut fwd_generator =
            PacketSizeGenerator::new(intervals.clone(), self.fwd_packets, self.fwd_bytes);
        let mut rev_generator =
            PacketSizeGenerator::new(intervals, self.rev_packets, self.rev_bytes);

        for plan in &self.packets {
            if plan.is_finished {
                let generator = match plan.direction {
                    Direction::Forward => &mut fwd_generator,
                    _ => &mut rev_generator,
                };
                generator.get_value_exact(plan.size, rng);
            }
        }

        fwd_generator.plan_remaining(rng);
        rev_generator.plan_remaining(rng);

        for plan in self.packets.iter_mut() {
            if !plan.is_finished {
                let generator = match plan.direction {
                    Direction::Forward => &mut fwd_generator,
                    _ => &mut rev_generator,
                };
                plan.size = plan.size.max(generator.get_value(rng));
            }
        }

        fwd_generator.print_report();
        rev_generator.print_report();
        Ok(())
    }

    /// Draw the inner timestamps uniformly from `[ts_first, ts_last]`,
    /// keeping the boundary packets exactly on the boundaries. Seconds and
    /// microseconds are drawn separately because the boundaries have mixed
    /// granularity.
    fn plan_packets_timestamps(&mut self, rng: &mut RandomGenerator) {
        let first_sec = self.ts_first.as_secs();
        let first_usec = self.ts_first.subsec_micros() as u64;
        let last_sec = self.ts_last.as_secs();
        let last_usec = self.ts_last.subsec_micros() as u64;

        let mut timestamps = vec![self.ts_first, self.ts_last];
        let timestamps_to_gen = self.packets.len().saturating_sub(2);
        for _ in 0..timestamps_to_gen {
            let sec = rng.random_uint(first_sec, last_sec);
            let usec = if sec == first_sec {
                if first_sec == last_sec {
                    rng.random_uint(first_usec, last_usec)
                } else {
                    rng.random_uint(first_usec, 999_999)
                }
            } else if sec == last_sec {
                rng.random_uint(0, last_usec)
            } else {
                rng.random_uint(0, 999_999)
            };
            timestamps.push(Duration::new(sec, usec as u32 * 1000));
        }
        timestamps.sort();

        for (plan, timestamp) in self.packets.iter_mut().zip(timestamps) {
            plan.timestamp = timestamp;
        }
    }

    /// The timestamp of the next frame this flow will emit.
    pub fn next_packet_time(&self) -> Option<Duration> {
        self.pending
            .front()
            .map(|packet| packet.timestamp)
            .or_else(|| self.packets.front().map(|plan| plan.timestamp))
    }

    pub fn is_finished(&self) -> bool {
        self.pending.is_empty() && self.packets.is_empty()
    }

    /// Planned packets not yet built. Fragmentation may emit more frames
    /// than this.
    pub fn planned_packets(&self) -> usize {
        self.packets.len()
    }

    /// Build the next frame: walk the layer stack, finalize computed
    /// fields, walk the post-build hooks, finalize again. A plan that was
    /// fragmented emits its remaining fragments on the following calls.
    pub fn generate_next_packet(&mut self, rng: &mut RandomGenerator) -> Result<Packet> {
        if let Some(packet) = self.pending.pop_front() {
            return Ok(packet);
        }

        let plan = self.packets.pop_front().ok_or(Error::NoMorePackets)?;

        let mut packet = PacketBytes::new();
        let mut layers = mem::take(&mut self.layers);
        for layer in layers.iter_mut() {
            layer.build(&mut packet, &plan, rng);
        }
        finalize(&mut packet).expect("packet finalization failed");
        for layer in layers.iter_mut() {
            layer.post_build(&mut packet, &plan, rng);
        }
        finalize(&mut packet).expect("packet finalization failed");
        self.layers = layers;

        for frame in packet.extra_frames.drain(..) {
            self.pending.push_back(Packet {
                timestamp: plan.timestamp,
                direction: plan.direction,
                data: frame,
            });
        }

        Ok(Packet {
            timestamp: plan.timestamp,
            direction: plan.direction,
            data: packet.data,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layers::{IPV4_HDR_SIZE, TCP_HDR_SIZE, UDP_HDR_SIZE};
    use pnet_packet::ethernet::{EtherTypes, EthernetPacket};
    use pnet_packet::ipv4::Ipv4Packet;
    use pnet_packet::ipv6::Ipv6Packet;
    use pnet_packet::tcp::TcpPacket;
    use pnet_packet::udp::UdpPacket;
    use pnet_packet::Packet as _;
    use std::net::Ipv4Addr;

    const IPV6_HDR_SIZE_USIZE: usize = 40;

    fn profile(
        l3: L3Protocol,
        l4: L4Protocol,
        packets: (u64, u64),
        bytes: (u64, u64),
    ) -> FlowProfile {
        FlowProfile {
            packets: packets.0,
            packets_rev: packets.1,
            bytes: bytes.0,
            bytes_rev: bytes.1,
            start_time: Duration::from_secs(1),
            end_time: Duration::from_secs(1),
            l3_proto: l3,
            l4_proto: l4,
            src_ip: None,
            dst_ip: None,
            src_port: 1234,
            dst_port: 80,
        }
    }

    fn build_flow(profile: &FlowProfile, seed: u32) -> (Flow, RandomGenerator) {
        let mut rng = RandomGenerator::new(seed);
        let mut generators = AddressGenerators::new(1, vec![], vec![]).unwrap();
        let config = Configuration::default();
        let flow = Flow::new(0, profile, &mut generators, &config, &mut rng).unwrap();
        (flow, rng)
    }

    fn drain(flow: &mut Flow, rng: &mut RandomGenerator) -> Vec<Packet> {
        let mut packets = Vec::new();
        while !flow.is_finished() {
            packets.push(flow.generate_next_packet(rng).unwrap());
        }
        packets
    }

    #[test]
    fn udp_flow_satisfies_the_profile_marginals() {
        let profile = profile(L3Protocol::Ipv4, L4Protocol::Udp, (10, 0), (1500, 0));
        let (mut flow, mut rng) = build_flow(&profile, 42);
        let packets = drain(&mut flow, &mut rng);

        assert_eq!(packets.len(), 10);
        assert!(packets.iter().all(|p| p.direction == Direction::Forward));
        assert!(packets.iter().all(|p| p.timestamp == Duration::from_secs(1)));

        // The distributor tolerates max(0.01 * 1500, 50) bytes of drift.
        let total: u64 = packets.iter().map(|p| p.data.len() as u64 - 14).sum();
        assert!((1450..=1550).contains(&total), "total={total}");
    }

    #[test]
    fn two_packet_flow_sits_on_the_boundaries() {
        let mut profile = profile(L3Protocol::Ipv6, L4Protocol::Tcp, (1, 1), (60, 60));
        profile.start_time = Duration::from_micros(1_000_000);
        profile.end_time = Duration::from_micros(2_500_000);
        let (mut flow, mut rng) = build_flow(&profile, 7);
        let packets = drain(&mut flow, &mut rng);

        assert_eq!(packets.len(), 2);
        assert_eq!(packets[0].timestamp, profile.start_time);
        assert_eq!(packets[1].timestamp, profile.end_time);
        let fwd = packets.iter().filter(|p| p.direction == Direction::Forward);
        assert_eq!(fwd.count(), 1);
    }

    #[test]
    fn direction_counts_match_the_profile() {
        let profile = profile(L3Protocol::Ipv4, L4Protocol::Udp, (7, 5), (4000, 3000));
        let (flow, _) = build_flow(&profile, 11);
        let fwd = flow
            .packets
            .iter()
            .filter(|p| p.direction == Direction::Forward)
            .count();
        let rev = flow
            .packets
            .iter()
            .filter(|p| p.direction == Direction::Reverse)
            .count();
        assert_eq!((fwd, rev), (7, 5));
    }

    #[test]
    fn timestamps_are_sorted_and_bounded() {
        let mut profile = profile(L3Protocol::Ipv4, L4Protocol::Udp, (20, 10), (9000, 5000));
        profile.start_time = Duration::new(100, 250_000_000);
        profile.end_time = Duration::new(103, 750_000_000);
        let (flow, _) = build_flow(&profile, 3);

        let timestamps: Vec<_> = flow.packets.iter().map(|p| p.timestamp).collect();
        assert_eq!(timestamps[0], profile.start_time);
        assert_eq!(*timestamps.last().unwrap(), profile.end_time);
        for pair in timestamps.windows(2) {
            assert!(pair[0] <= pair[1]);
        }
        for timestamp in timestamps {
            assert!(timestamp >= profile.start_time && timestamp <= profile.end_time);
        }
    }

    #[test]
    fn icmp_over_ipv6_is_rejected() {
        let profile = profile(L3Protocol::Ipv6, L4Protocol::Icmp, (3, 3), (200, 200));
        let mut rng = RandomGenerator::new(1);
        let mut generators = AddressGenerators::new(1, vec![], vec![]).unwrap();
        let result = Flow::new(0, &profile, &mut generators, &Configuration::default(), &mut rng);
        assert!(matches!(result, Err(Error::ProtocolMismatch { .. })));
    }

    #[test]
    fn small_icmp_flow_pins_every_packet() {
        // bytes/packet = 33 <= 1.10 * 36, so the unreachable-style layer is
        // chosen and every plan is pinned at its structural size.
        let profile = profile(L3Protocol::Ipv4, L4Protocol::Icmp, (3, 3), (100, 100));
        let (flow, _) = build_flow(&profile, 5);
        assert_eq!(flow.packets.len(), 6);
        for plan in &flow.packets {
            assert!(plan.is_finished);
            assert_eq!(plan.size, IPV4_HDR_SIZE + ICMP_UNREACH_PKT_SIZE);
        }
    }

    #[test]
    fn balanced_icmp_flow_echoes() {
        let profile = profile(L3Protocol::Ipv4, L4Protocol::Icmp, (10, 10), (12_000, 12_000));
        let (mut flow, mut rng) = build_flow(&profile, 5);
        assert!(flow.packets.iter().all(|plan| !plan.is_finished));
        let packets = drain(&mut flow, &mut rng);
        let frame = EthernetPacket::new(&packets[0].data).unwrap();
        let ip = Ipv4Packet::new(frame.payload()).unwrap();
        assert_eq!(ip.get_next_level_protocol().0, 1);
        let kind = ip.payload()[0];
        assert!(kind == 0 || kind == 8, "echo type, got {kind}");
    }

    #[test]
    fn emitted_udp_packet_parses_back() {
        let profile = profile(L3Protocol::Ipv4, L4Protocol::Udp, (4, 2), (2000, 1000));
        let (mut flow, mut rng) = build_flow(&profile, 21);
        let packets = drain(&mut flow, &mut rng);

        for packet in &packets {
            let frame = EthernetPacket::new(&packet.data).unwrap();
            assert_eq!(frame.get_ethertype(), EtherTypes::Ipv4);
            let ip = Ipv4Packet::new(frame.payload()).unwrap();
            assert_eq!(ip.get_version(), 4);
            assert_eq!(ip.get_total_length() as usize, packet.data.len() - 14);
            let datagram = UdpPacket::new(ip.payload()).unwrap();
            let (src, dst) = match packet.direction {
                Direction::Reverse => (80, 1234),
                _ => (1234, 80),
            };
            assert_eq!(datagram.get_source(), src);
            assert_eq!(datagram.get_destination(), dst);
        }
    }

    #[test]
    fn tcp_flow_opens_with_a_handshake() {
        let profile = profile(L3Protocol::Ipv4, L4Protocol::Tcp, (6, 4), (3000, 2000));
        let (mut flow, mut rng) = build_flow(&profile, 13);
        let directions: Vec<_> = flow.packets.iter().map(|p| p.direction).collect();
        assert_eq!(directions[0], Direction::Forward);
        assert_eq!(directions[1], Direction::Reverse);
        assert_eq!(directions[2], Direction::Forward);
        assert_eq!(flow.packets[0].size, IPV4_HDR_SIZE + TCP_HDR_SIZE);

        let packets = drain(&mut flow, &mut rng);
        let frame = EthernetPacket::new(&packets[0].data).unwrap();
        let ip = Ipv4Packet::new(frame.payload()).unwrap();
        let segment = TcpPacket::new(ip.payload()).unwrap();
        assert_eq!(segment.get_flags() & 0x02, 0x02, "first packet carries SYN");
    }

    #[test]
    fn identical_seeds_give_identical_bytes() {
        let profile = profile(L3Protocol::Ipv6, L4Protocol::Udp, (5, 5), (3000, 3000));
        let (mut a, mut rng_a) = build_flow(&profile, 99);
        let (mut b, mut rng_b) = build_flow(&profile, 99);
        let packets_a = drain(&mut a, &mut rng_a);
        let packets_b = drain(&mut b, &mut rng_b);
        assert_eq!(packets_a, packets_b);
    }

    #[test]
    fn ipv6_udp_packet_parses_back() {
        let profile = profile(L3Protocol::Ipv6, L4Protocol::Udp, (3, 0), (1200, 0));
        let (mut flow, mut rng) = build_flow(&profile, 17);
        let packets = drain(&mut flow, &mut rng);
        for packet in &packets {
            let frame = EthernetPacket::new(&packet.data).unwrap();
            assert_eq!(frame.get_ethertype(), EtherTypes::Ipv6);
            let ip = Ipv6Packet::new(frame.payload()).unwrap();
            assert_eq!(ip.get_version(), 6);
            assert_eq!(
                ip.get_payload_length() as usize,
                packet.data.len() - 14 - IPV6_HDR_SIZE_USIZE
            );
            let datagram = UdpPacket::new(ip.payload()).unwrap();
            assert_eq!(
                datagram.get_length() as usize,
                packet.data.len() - 14 - IPV6_HDR_SIZE_USIZE
            );
        }
    }

    #[test]
    fn sizes_respect_structural_minimums() {
        let profile = profile(L3Protocol::Ipv4, L4Protocol::Udp, (40, 0), (3000, 0));
        let (flow, _) = build_flow(&profile, 23);
        for plan in &flow.packets {
            assert!(plan.size >= IPV4_HDR_SIZE + UDP_HDR_SIZE);
        }
    }

    #[test]
    fn vlan_encapsulation_is_honored() {
        let config = crate::config::import_config(
            "encapsulation:\n  - probability: 1.0\n    layers:\n      - vlan:\n          id: 42\n",
        )
        .unwrap();
        let profile = profile(L3Protocol::Ipv4, L4Protocol::Udp, (2, 0), (400, 0));
        let mut rng = RandomGenerator::new(1);
        let mut generators = AddressGenerators::new(1, vec![], vec![]).unwrap();
        let mut flow = Flow::new(0, &profile, &mut generators, &config, &mut rng).unwrap();
        let packets = drain(&mut flow, &mut rng);

        let frame = EthernetPacket::new(&packets[0].data).unwrap();
        assert_eq!(frame.get_ethertype(), EtherTypes::Vlan);
        let tag = pnet_packet::vlan::VlanPacket::new(frame.payload()).unwrap();
        assert_eq!(tag.get_vlan_identifier(), 42);
        assert_eq!(tag.get_ethertype(), EtherTypes::Ipv4);
    }

    #[test]
    fn probability_draw_selects_by_cumulative_weight() {
        let variants = vec![
            EncapsulationVariant { probability: 0.3, layers: vec![] },
            EncapsulationVariant {
                probability: 0.7,
                layers: vec![EncapsulationLayer::Vlan { id: 1 }],
            },
        ];
        let chosen = select_variant(&variants, 0.5).unwrap();
        assert_eq!(chosen.layers.len(), 1);
        let chosen = select_variant(&variants, 0.2).unwrap();
        assert!(chosen.layers.is_empty());
    }

    #[test]
    fn fragmentation_splits_into_valid_fragments() {
        let config = crate::config::import_config(
            "ipv4:\n  fragmentation_probability: 1.0\n  min_packet_size_to_fragment: 100\n",
        )
        .unwrap();
        let mut profile = profile(L3Protocol::Ipv4, L4Protocol::Udp, (4, 0), (4000, 0));
        profile.src_ip = Some(IpAddr::V4(Ipv4Addr::new(192, 0, 2, 1)));
        let mut rng = RandomGenerator::new(31);
        let mut generators = AddressGenerators::new(1, vec![], vec![]).unwrap();
        let mut flow = Flow::new(0, &profile, &mut generators, &config, &mut rng).unwrap();
        let packets = drain(&mut flow, &mut rng);
        assert!(packets.len() > 4, "large packets must have been fragmented");

        let mut reassembled = 0usize;
        let mut expected = 0usize;
        for packet in &packets {
            let frame = EthernetPacket::new(&packet.data).unwrap();
            let ip = Ipv4Packet::new(frame.payload()).unwrap();
            assert_eq!(ip.get_total_length() as usize, packet.data.len() - 14);
            let more = ip.get_flags() & 0b001 != 0;
            let offset = ip.get_fragment_offset() as usize * 8;
            if more {
                // Non-final fragment payloads are 8-byte aligned.
                assert_eq!(ip.payload().len() % 8, 0);
                expected += 1;
            }
            if offset > 0 {
                reassembled += 1;
            }
        }
        assert_eq!(reassembled, expected);
    }
}
