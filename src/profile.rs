use crate::error::{Error, Result};
use std::fmt::{self, Display};
use std::fs;
use std::net::IpAddr;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum L3Protocol {
    Ipv4,
    Ipv6,
}

impl L3Protocol {
    fn from_number(number: u64) -> Result<Self> {
        match number {
            4 => Ok(L3Protocol::Ipv4),
            6 => Ok(L3Protocol::Ipv6),
            _ => Err(Error::UnknownProtocol { layer: "L3", number }),
        }
    }

    pub fn number(&self) -> u8 {
        match self {
            L3Protocol::Ipv4 => 4,
            L3Protocol::Ipv6 => 6,
        }
    }
}

impl Display for L3Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            L3Protocol::Ipv4 => write!(f, "IPv4"),
            L3Protocol::Ipv6 => write!(f, "IPv6"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum L4Protocol {
    Tcp,
    Udp,
    Icmp,
    Icmpv6,
}

impl L4Protocol {
    fn from_number(number: u64) -> Result<Self> {
        match number {
            6 => Ok(L4Protocol::Tcp),
            17 => Ok(L4Protocol::Udp),
            1 => Ok(L4Protocol::Icmp),
            58 => Ok(L4Protocol::Icmpv6),
            _ => Err(Error::UnknownProtocol { layer: "L4", number }),
        }
    }

    /// The IP protocol number carried in the enclosing IP header.
    pub fn number(&self) -> u8 {
        match self {
            L4Protocol::Tcp => 6,
            L4Protocol::Udp => 17,
            L4Protocol::Icmp => 1,
            L4Protocol::Icmpv6 => 58,
        }
    }
}

impl Display for L4Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            L4Protocol::Tcp => write!(f, "TCP"),
            L4Protocol::Udp => write!(f, "UDP"),
            L4Protocol::Icmp => write!(f, "ICMP"),
            L4Protocol::Icmpv6 => write!(f, "ICMPv6"),
        }
    }
}

/// One record of the input flow table: the statistical constraints a
/// generated flow has to satisfy.
#[derive(Debug, Clone)]
pub struct FlowProfile {
    pub packets: u64,
    pub packets_rev: u64,
    pub bytes: u64,
    pub bytes_rev: u64,
    pub start_time: Duration,
    pub end_time: Duration,
    pub l3_proto: L3Protocol,
    pub l4_proto: L4Protocol,
    pub src_ip: Option<IpAddr>,
    pub dst_ip: Option<IpAddr>,
    pub src_port: u16,
    pub dst_port: u16,
}

const COLUMNS: usize = 12;
pub(crate) const HEADER: &str = "SRC_IP,DST_IP,START_TIME,END_TIME,L3_PROTO,L4_PROTO,\
                                 SRC_PORT,DST_PORT,PACKETS,BYTES,PACKETS_REV,BYTES_REV";

fn profile_error(line: usize, reason: impl Into<String>) -> Error {
    Error::Profile {
        line,
        reason: reason.into(),
    }
}

/// Parse a millisecond timestamp with up to three fractional digits
/// (microsecond resolution), e.g. `1438603883123.386`.
fn parse_msec_time(field: &str, line: usize) -> Result<Duration> {
    let (msec_part, frac_part) = match field.split_once('.') {
        Some((msec, frac)) => (msec, frac),
        None => (field, ""),
    };
    let msec: u64 = msec_part
        .parse()
        .map_err(|_| profile_error(line, format!("invalid timestamp \"{field}\"")))?;
    let mut usec = 0u64;
    if !frac_part.is_empty() {
        if frac_part.len() > 3 || !frac_part.bytes().all(|b| b.is_ascii_digit()) {
            return Err(profile_error(line, format!("invalid timestamp \"{field}\"")));
        }
        let frac: u64 = frac_part.parse().unwrap_or(0);
        usec = frac * 10u64.pow(3 - frac_part.len() as u32);
    }
    Ok(Duration::from_micros(msec * 1000 + usec))
}

fn parse_ip(field: &str, line: usize) -> Result<Option<IpAddr>> {
    if field.is_empty() {
        return Ok(None);
    }
    field
        .parse()
        .map(Some)
        .map_err(|_| profile_error(line, format!("invalid IP address \"{field}\"")))
}

fn parse_record(record: &str, line: usize) -> Result<FlowProfile> {
    let fields: Vec<&str> = record.split(',').map(str::trim).collect();
    if fields.len() != COLUMNS {
        return Err(profile_error(
            line,
            format!("expected {COLUMNS} columns, got {}", fields.len()),
        ));
    }
    let uint = |index: usize| -> Result<u64> {
        fields[index]
            .parse()
            .map_err(|_| profile_error(line, format!("invalid number \"{}\"", fields[index])))
    };

    let profile = FlowProfile {
        src_ip: parse_ip(fields[0], line)?,
        dst_ip: parse_ip(fields[1], line)?,
        start_time: parse_msec_time(fields[2], line)?,
        end_time: parse_msec_time(fields[3], line)?,
        l3_proto: L3Protocol::from_number(uint(4)?)?,
        l4_proto: L4Protocol::from_number(uint(5)?)?,
        src_port: uint(6)? as u16,
        dst_port: uint(7)? as u16,
        packets: uint(8)?,
        bytes: uint(9)?,
        packets_rev: uint(10)?,
        bytes_rev: uint(11)?,
    };

    if profile.start_time > profile.end_time {
        return Err(profile_error(line, "start time is after end time"));
    }
    for (name, ip) in [("source", profile.src_ip), ("destination", profile.dst_ip)] {
        let matches = match (ip, profile.l3_proto) {
            (None, _) => true,
            (Some(IpAddr::V4(_)), L3Protocol::Ipv4) => true,
            (Some(IpAddr::V6(_)), L3Protocol::Ipv6) => true,
            _ => false,
        };
        if !matches {
            return Err(profile_error(
                line,
                format!("{name} IP does not match the L3 protocol"),
            ));
        }
    }
    Ok(profile)
}

/// Parse the whole flow table and sort it by start time.
pub fn parse_profiles(content: &str) -> Result<Vec<FlowProfile>> {
    let mut profiles = Vec::new();
    for (index, record) in content.lines().enumerate() {
        let record = record.trim();
        if record.is_empty() || (index == 0 && record.starts_with("SRC_IP")) {
            continue;
        }
        profiles.push(parse_record(record, index + 1)?);
    }
    profiles.sort_by_key(|profile| profile.start_time);
    Ok(profiles)
}

pub fn load_profiles(path: &str) -> Result<Vec<FlowProfile>> {
    parse_profiles(&fs::read_to_string(path)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    const RECORD: &str = "10.0.0.1,10.0.0.2,1000.000,2000.500,4,6,1234,80,10,1500,8,900";

    #[test]
    fn parses_a_full_record() {
        let profile = parse_record(RECORD, 1).unwrap();
        assert_eq!(profile.src_ip, Some(IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1))));
        assert_eq!(profile.start_time, Duration::from_millis(1000));
        assert_eq!(profile.end_time, Duration::from_micros(2_000_500));
        assert_eq!(profile.l3_proto, L3Protocol::Ipv4);
        assert_eq!(profile.l4_proto, L4Protocol::Tcp);
        assert_eq!(profile.packets, 10);
        assert_eq!(profile.bytes_rev, 900);
    }

    #[test]
    fn empty_addresses_mean_generated_ones() {
        let profile = parse_record(",,0.000,0.000,4,17,53,53,1,100,0,0", 1).unwrap();
        assert_eq!(profile.src_ip, None);
        assert_eq!(profile.dst_ip, None);
    }

    #[test]
    fn rejects_unknown_protocols() {
        let result = parse_record(",,0.000,0.000,5,6,0,0,1,1,1,1", 3);
        assert!(matches!(
            result,
            Err(Error::UnknownProtocol { layer: "L3", number: 5 })
        ));
        let result = parse_record(",,0.000,0.000,4,99,0,0,1,1,1,1", 3);
        assert!(matches!(
            result,
            Err(Error::UnknownProtocol { layer: "L4", number: 99 })
        ));
    }

    #[test]
    fn rejects_address_family_mismatch() {
        let result = parse_record("2001:db8::1,,0.000,0.000,4,6,0,0,1,1,1,1", 2);
        assert!(matches!(result, Err(Error::Profile { line: 2, .. })));
    }

    #[test]
    fn rejects_reversed_time_span() {
        let result = parse_record(",,2000.000,1000.000,4,6,0,0,1,1,1,1", 1);
        assert!(matches!(result, Err(Error::Profile { .. })));
    }

    #[test]
    fn sorts_by_start_time_and_skips_the_header() {
        let table = format!(
            "{HEADER}\n\
             ,,3000.000,4000.000,4,17,1,1,1,10,0,0\n\
             ,,1000.000,2000.000,4,17,1,1,1,10,0,0\n"
        );
        let profiles = parse_profiles(&table).unwrap();
        assert_eq!(profiles.len(), 2);
        assert_eq!(profiles[0].start_time, Duration::from_millis(1000));
    }

    #[test]
    fn fractional_milliseconds_become_microseconds() {
        assert_eq!(
            parse_msec_time("1438603883123.386", 1).unwrap(),
            Duration::from_micros(1_438_603_883_123_386)
        );
        assert_eq!(parse_msec_time("5.4", 1).unwrap(), Duration::from_micros(5400));
    }
}
