use crate::error::Result;
use crate::packet::{Direction, Packet};
use crate::profile::{FlowProfile, L3Protocol, L4Protocol};
use pnet_packet::ethernet::{EtherTypes, EthernetPacket};
use pnet_packet::ip::IpNextHeaderProtocols;
use pnet_packet::ipv4::Ipv4Packet;
use pnet_packet::ipv6::Ipv6Packet;
use pnet_packet::tcp::TcpPacket;
use pnet_packet::udp::UdpPacket;
use pnet_packet::vlan::VlanPacket;
use pnet_packet::Packet as _;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::net::IpAddr;
use std::time::Duration;

const ETHER_HEADER_LEN: usize = 14;

#[derive(Debug, Default, Clone)]
struct FlowRecord {
    l3_proto: Option<L3Protocol>,
    l4_proto: Option<L4Protocol>,
    first_ts: Option<Duration>,
    last_ts: Duration,
    fwd_pkts: u64,
    fwd_bytes: u64,
    rev_pkts: u64,
    rev_bytes: u64,
    fwd_ip: Option<IpAddr>,
    rev_ip: Option<IpAddr>,
    fwd_port: u16,
    rev_port: u16,
}

/// The endpoints a frame claims on the wire, recovered by parsing it back.
#[derive(Debug, PartialEq, Eq)]
pub struct PacketEndpoints {
    pub src_ip: IpAddr,
    pub dst_ip: IpAddr,
    pub src_port: u16,
    pub dst_port: u16,
}

/// Walk the L2 encapsulation of a frame and return its IP endpoints and
/// ports (zero for port-less protocols and non-first fragments).
pub fn parse_packet_endpoints(data: &[u8]) -> Option<PacketEndpoints> {
    let frame = EthernetPacket::new(data)?;
    let mut ethertype = frame.get_ethertype();
    let mut offset = ETHER_HEADER_LEN;

    loop {
        match ethertype {
            EtherTypes::Vlan => {
                let tag = VlanPacket::new(data.get(offset..)?)?;
                ethertype = tag.get_ethertype();
                offset += 4;
            }
            EtherTypes::Mpls | EtherTypes::MplsMcast => {
                // Pop shim entries until the bottom of stack, then peek at
                // the IP version nibble.
                loop {
                    let entry = data.get(offset..offset + 4)?;
                    offset += 4;
                    if entry[2] & 1 != 0 {
                        break;
                    }
                }
                ethertype = match data.get(offset)? >> 4 {
                    4 => EtherTypes::Ipv4,
                    6 => EtherTypes::Ipv6,
                    _ => return None,
                };
            }
            EtherTypes::Ipv4 => {
                let header = Ipv4Packet::new(data.get(offset..)?)?;
                let (src_port, dst_port) = if header.get_fragment_offset() > 0 {
                    (0, 0)
                } else {
                    l4_ports(
                        header.get_next_level_protocol().0,
                        header.payload(),
                    )
                };
                return Some(PacketEndpoints {
                    src_ip: IpAddr::V4(header.get_source()),
                    dst_ip: IpAddr::V4(header.get_destination()),
                    src_port,
                    dst_port,
                });
            }
            EtherTypes::Ipv6 => {
                let header = Ipv6Packet::new(data.get(offset..)?)?;
                let mut next = header.get_next_header().0;
                let mut l4_offset = offset + 40;
                if next == IpNextHeaderProtocols::Ipv6Frag.0 {
                    let fragment = data.get(l4_offset..l4_offset + 8)?;
                    let frag_offset = u16::from_be_bytes([fragment[2], fragment[3]]) >> 3;
                    next = fragment[0];
                    l4_offset += 8;
                    if frag_offset > 0 {
                        next = 0;
                    }
                }
                let (src_port, dst_port) = l4_ports(next, data.get(l4_offset..)?);
                return Some(PacketEndpoints {
                    src_ip: IpAddr::V6(header.get_source()),
                    dst_ip: IpAddr::V6(header.get_destination()),
                    src_port,
                    dst_port,
                });
            }
            _ => return None,
        }
    }
}

fn l4_ports(protocol: u8, data: &[u8]) -> (u16, u16) {
    if protocol == IpNextHeaderProtocols::Tcp.0 {
        if let Some(segment) = TcpPacket::new(data) {
            return (segment.get_source(), segment.get_destination());
        }
    } else if protocol == IpNextHeaderProtocols::Udp.0 {
        if let Some(datagram) = UdpPacket::new(data) {
            return (datagram.get_source(), datagram.get_destination());
        }
    }
    (0, 0)
}

/// Accounts the traffic actually emitted per flow and reports it in the
/// same CSV shape the flow table uses, so generated output can be compared
/// back against the input profiles.
#[derive(Debug, Default)]
pub struct TrafficMeter {
    records: Vec<FlowRecord>,
}

impl TrafficMeter {
    pub fn new() -> Self {
        TrafficMeter::default()
    }

    pub fn open_flow(&mut self, flow_id: u64, profile: &FlowProfile) {
        // Flow ids are issued in order, so a vector is enough.
        assert_eq!(flow_id as usize, self.records.len(), "unexpected flow ID");
        self.records.push(FlowRecord {
            l3_proto: Some(profile.l3_proto),
            l4_proto: Some(profile.l4_proto),
            ..FlowRecord::default()
        });
    }

    pub fn record_packet(&mut self, flow_id: u64, packet: &Packet) {
        let rec = &mut self.records[flow_id as usize];
        if rec.first_ts.is_none() {
            rec.first_ts = Some(packet.timestamp);
        }
        rec.last_ts = packet.timestamp;

        let bytes = packet.data.len().saturating_sub(ETHER_HEADER_LEN) as u64;
        if rec.fwd_pkts == 0 && rec.rev_pkts == 0 {
            if let Some(endpoints) = parse_packet_endpoints(&packet.data) {
                match packet.direction {
                    Direction::Reverse => {
                        rec.rev_ip = Some(endpoints.src_ip);
                        rec.fwd_ip = Some(endpoints.dst_ip);
                        rec.rev_port = endpoints.src_port;
                        rec.fwd_port = endpoints.dst_port;
                    }
                    _ => {
                        rec.fwd_ip = Some(endpoints.src_ip);
                        rec.rev_ip = Some(endpoints.dst_ip);
                        rec.fwd_port = endpoints.src_port;
                        rec.rev_port = endpoints.dst_port;
                    }
                }
            }
        }
        match packet.direction {
            Direction::Reverse => {
                rec.rev_pkts += 1;
                rec.rev_bytes += bytes;
            }
            _ => {
                rec.fwd_pkts += 1;
                rec.fwd_bytes += bytes;
            }
        }
    }

    pub fn close_flow(&mut self, _flow_id: u64) {
        // Nothing to do for now.
    }

    pub fn flow_count(&self) -> usize {
        self.records.len()
    }

    pub fn packet_count(&self) -> u64 {
        self.records
            .iter()
            .map(|rec| rec.fwd_pkts + rec.rev_pkts)
            .sum()
    }

    pub fn write_report_csv(&self, path: &str) -> Result<()> {
        let file = File::create(path)?;
        let mut output = BufWriter::new(file);
        writeln!(output, "{}", crate::profile::HEADER)?;
        for rec in &self.records {
            let first = rec.first_ts.unwrap_or_default().as_micros();
            let last = rec.last_ts.as_micros();
            writeln!(
                output,
                "{},{},{}.{:03},{}.{:03},{},{},{},{},{},{},{},{}",
                rec.fwd_ip.map(|ip| ip.to_string()).unwrap_or_default(),
                rec.rev_ip.map(|ip| ip.to_string()).unwrap_or_default(),
                first / 1000,
                first % 1000,
                last / 1000,
                last % 1000,
                rec.l3_proto.map(|p| p.number()).unwrap_or_default(),
                rec.l4_proto.map(|p| p.number()).unwrap_or_default(),
                rec.fwd_port,
                rec.rev_port,
                rec.fwd_pkts,
                rec.fwd_bytes,
                rec.rev_pkts,
                rec.rev_bytes,
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::addressgen::AddressGenerators;
    use crate::config::Configuration;
    use crate::flow::Flow;
    use crate::random::RandomGenerator;
    use std::net::Ipv4Addr;

    fn run_flow(profile: &FlowProfile) -> (TrafficMeter, Vec<Packet>) {
        let mut rng = RandomGenerator::new(4);
        let mut generators = AddressGenerators::new(1, vec![], vec![]).unwrap();
        let mut flow =
            Flow::new(0, profile, &mut generators, &Configuration::default(), &mut rng).unwrap();
        let mut meter = TrafficMeter::new();
        meter.open_flow(0, profile);
        let mut packets = Vec::new();
        while !flow.is_finished() {
            let packet = flow.generate_next_packet(&mut rng).unwrap();
            meter.record_packet(0, &packet);
            packets.push(packet);
        }
        meter.close_flow(0);
        (meter, packets)
    }

    fn profile() -> FlowProfile {
        FlowProfile {
            packets: 5,
            packets_rev: 3,
            bytes: 2500,
            bytes_rev: 1200,
            start_time: Duration::from_secs(10),
            end_time: Duration::from_secs(12),
            l3_proto: L3Protocol::Ipv4,
            l4_proto: L4Protocol::Udp,
            src_ip: Some(IpAddr::V4(Ipv4Addr::new(192, 0, 2, 7))),
            dst_ip: Some(IpAddr::V4(Ipv4Addr::new(192, 0, 2, 9))),
            src_port: 5353,
            dst_port: 53,
        }
    }

    #[test]
    fn meter_counts_match_emitted_traffic() {
        let (meter, packets) = run_flow(&profile());
        let rec = &meter.records[0];
        assert_eq!(rec.fwd_pkts + rec.rev_pkts, packets.len() as u64);
        let total: u64 = packets.iter().map(|p| p.data.len() as u64 - 14).sum();
        assert_eq!(rec.fwd_bytes + rec.rev_bytes, total);
        assert_eq!(rec.first_ts, Some(Duration::from_secs(10)));
        assert_eq!(rec.last_ts, Duration::from_secs(12));
    }

    #[test]
    fn recovered_endpoints_round_trip() {
        let (meter, _) = run_flow(&profile());
        let rec = &meter.records[0];
        assert_eq!(rec.fwd_ip, Some(IpAddr::V4(Ipv4Addr::new(192, 0, 2, 7))));
        assert_eq!(rec.rev_ip, Some(IpAddr::V4(Ipv4Addr::new(192, 0, 2, 9))));
        assert_eq!(rec.fwd_port, 5353);
        assert_eq!(rec.rev_port, 53);
    }
}
