use crate::config::{Ipv4AddressRange, Ipv6AddressRange};
use crate::error::{Error, Result};
use pnet::util::MacAddr;
use std::net::{Ipv4Addr, Ipv6Addr};

const LEHMER_MULTIPLIER: u64 = 48271;
const LEHMER_MODULUS: u64 = 0x7fff_ffff;
// Full period of the multiplicative congruential generator.
const LEHMER_PERIOD: u32 = 0x7fff_ffff - 1;

/// Deterministic generator of MAC, IPv4 and IPv6 addresses.
///
/// All three address kinds draw from a single Lehmer stream, isolated from
/// the run-wide [`RandomGenerator`](crate::random::RandomGenerator): address
/// sequences must not shift when unrelated components change how often they
/// draw. Once the stream has produced its full period of values, a second
/// stream (`seed_state`) is advanced by one step and reseeds the first, so
/// the sequence never repeats from the original seed.
#[derive(Debug, Clone)]
pub struct AddressGenerators {
    state: u32,
    seed_state: u32,
    capacity: u32,
    ipv4_ranges: Vec<Ipv4AddressRange>,
    ipv6_ranges: Vec<Ipv6AddressRange>,
}

impl AddressGenerators {
    /// Seed must lie in `[1, 2^31 - 2]`, i.e. be a valid nonzero Lehmer state.
    pub fn new(
        seed: u32,
        ipv4_ranges: Vec<Ipv4AddressRange>,
        ipv6_ranges: Vec<Ipv6AddressRange>,
    ) -> Result<Self> {
        if seed == 0 || seed as u64 >= LEHMER_MODULUS {
            return Err(Error::InvalidSeed);
        }
        Ok(AddressGenerators {
            state: seed,
            seed_state: seed,
            capacity: LEHMER_PERIOD,
            ipv4_ranges,
            ipv6_ranges,
        })
    }

    pub fn generate_mac(&mut self) -> MacAddr {
        let value0 = self.next_value().to_be_bytes();
        let value1 = self.next_value().to_be_bytes();
        MacAddr::new(value0[0], value0[1], value0[2], value0[3], value1[0], value1[1])
    }

    pub fn generate_ipv4(&mut self) -> Ipv4Addr {
        let value = self.next_value();
        if self.ipv4_ranges.is_empty() {
            return Ipv4Addr::from(value);
        }
        let range = &self.ipv4_ranges[value as usize % self.ipv4_ranges.len()];
        let host_mask = if range.prefix_len == 0 {
            u32::MAX
        } else {
            u32::MAX >> range.prefix_len
        };
        let base = u32::from(range.base_addr);
        Ipv4Addr::from((base & !host_mask) | (value & host_mask))
    }

    pub fn generate_ipv6(&mut self) -> Ipv6Addr {
        let mut value: u128 = 0;
        for _ in 0..4 {
            value = value << 32 | self.next_value() as u128;
        }
        if self.ipv6_ranges.is_empty() {
            return Ipv6Addr::from(value);
        }
        let range = &self.ipv6_ranges[value as usize % self.ipv6_ranges.len()];
        let host_mask = if range.prefix_len == 0 {
            u128::MAX
        } else if range.prefix_len >= 128 {
            0
        } else {
            u128::MAX >> range.prefix_len
        };
        let base = u128::from(range.base_addr);
        Ipv6Addr::from((base & !host_mask) | (value & host_mask))
    }

    fn next_value(&mut self) -> u32 {
        if self.capacity == 0 {
            self.next_seed();
        }
        self.capacity -= 1;

        self.state = (self.state as u64 * LEHMER_MULTIPLIER % LEHMER_MODULUS) as u32;
        self.state
    }

    fn next_seed(&mut self) {
        self.capacity = LEHMER_PERIOD;
        self.seed_state = (self.seed_state as u64 * LEHMER_MULTIPLIER % LEHMER_MODULUS) as u32;
        self.state = self.seed_state;
    }

    #[cfg(test)]
    fn set_capacity(&mut self, capacity: u32) {
        self.capacity = capacity;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plain(seed: u32) -> AddressGenerators {
        AddressGenerators::new(seed, vec![], vec![]).unwrap()
    }

    #[test]
    fn rejects_out_of_range_seeds() {
        assert!(matches!(
            AddressGenerators::new(0, vec![], vec![]),
            Err(Error::InvalidSeed)
        ));
        assert!(matches!(
            AddressGenerators::new(0x7fff_ffff, vec![], vec![]),
            Err(Error::InvalidSeed)
        ));
        assert!(AddressGenerators::new(1, vec![], vec![]).is_ok());
        assert!(AddressGenerators::new(0x7fff_fffe, vec![], vec![]).is_ok());
    }

    #[test]
    fn first_ipv4_is_one_lehmer_step() {
        // 1 * 48271 mod (2^31 - 1) = 48271 = 0x0000BC8F
        let mut generators = plain(1);
        assert_eq!(generators.generate_ipv4(), Ipv4Addr::new(0, 0, 188, 143));
    }

    #[test]
    fn mac_consumes_two_values() {
        let mut reference = plain(1);
        let v1 = reference.next_value();
        let v2 = reference.next_value();
        let v3 = reference.next_value();

        let mut generators = plain(1);
        let mac = generators.generate_mac();
        let b1 = v1.to_be_bytes();
        let b2 = v2.to_be_bytes();
        assert_eq!(mac, MacAddr::new(b1[0], b1[1], b1[2], b1[3], b2[0], b2[1]));
        // The discarded half of the second draw is really consumed.
        assert_eq!(generators.generate_ipv4(), Ipv4Addr::from(v3));
    }

    #[test]
    fn ipv6_consumes_four_values() {
        let mut reference = plain(7);
        for _ in 0..4 {
            reference.next_value();
        }
        let fifth = reference.next_value();

        let mut generators = plain(7);
        generators.generate_ipv6();
        assert_eq!(generators.generate_ipv4(), Ipv4Addr::from(fifth));
    }

    #[test]
    fn reseed_switches_to_the_second_stream() {
        let mut generators = plain(1);
        generators.set_capacity(1);
        generators.generate_ipv4();
        // Capacity exhausted: the next draw must restart from the advanced
        // seed stream, i.e. lehmer(lehmer(1)).
        let expected = 48271u64 * 48271 % LEHMER_MODULUS;
        let addr = generators.generate_ipv4();
        assert_eq!(addr, Ipv4Addr::from(expected as u32));
        assert_eq!(generators.capacity, LEHMER_PERIOD - 1);
    }

    #[test]
    fn ipv4_range_constrains_prefix() {
        let range = "10.128.0.0/9".parse::<Ipv4AddressRange>().unwrap();
        let mut generators = AddressGenerators::new(12345, vec![range], vec![]).unwrap();
        for _ in 0..64 {
            let addr = generators.generate_ipv4();
            let bits = u32::from(addr);
            assert_eq!(bits >> 23, u32::from(Ipv4Addr::new(10, 128, 0, 0)) >> 23);
        }
    }

    #[test]
    fn ipv6_range_constrains_prefix() {
        let range = "2001:db8::/32".parse::<Ipv6AddressRange>().unwrap();
        let mut generators = AddressGenerators::new(999, vec![], vec![range]).unwrap();
        for _ in 0..16 {
            let addr = generators.generate_ipv6();
            assert_eq!(addr.segments()[0], 0x2001);
            assert_eq!(addr.segments()[1], 0x0db8);
        }
    }
}
