use crate::error::{Error, Result};
use serde::Deserialize;
use std::net::{Ipv4Addr, Ipv6Addr};
use std::str::FromStr;

/// The generator configuration file: optional encapsulation variants and
/// per-family IP settings.
#[derive(Deserialize, Debug, Default)]
#[serde(deny_unknown_fields)]
pub struct Configuration {
    #[serde(default)]
    pub encapsulation: Vec<EncapsulationVariant>,
    #[serde(default)]
    pub ipv4: Ipv4Config,
    #[serde(default)]
    pub ipv6: Ipv6Config,
}

/// One possible encapsulation: the listed layers are applied together with
/// the given probability.
#[derive(Deserialize, Debug, Clone)]
#[serde(deny_unknown_fields)]
pub struct EncapsulationVariant {
    pub probability: f64,
    pub layers: Vec<EncapsulationLayer>,
}

#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "lowercase", deny_unknown_fields)]
pub enum EncapsulationLayer {
    Vlan { id: u16 },
    Mpls { label: u32 },
}

#[derive(Deserialize, Debug, Default, Clone)]
#[serde(deny_unknown_fields)]
pub struct Ipv4Config {
    #[serde(default)]
    pub ip_range: Vec<Ipv4AddressRange>,
    #[serde(default)]
    pub fragmentation_probability: f64,
    #[serde(default = "default_min_packet_size_to_fragment")]
    pub min_packet_size_to_fragment: u64,
}

#[derive(Deserialize, Debug, Default, Clone)]
#[serde(deny_unknown_fields)]
pub struct Ipv6Config {
    #[serde(default)]
    pub ip_range: Vec<Ipv6AddressRange>,
    #[serde(default)]
    pub fragmentation_probability: f64,
    #[serde(default = "default_min_packet_size_to_fragment")]
    pub min_packet_size_to_fragment: u64,
}

fn default_min_packet_size_to_fragment() -> u64 {
    512
}

/// An IPv4 prefix such as `10.0.0.0/8`; generated addresses keep the
/// prefix bits.
#[derive(Deserialize, Debug, Clone, Copy)]
#[serde(try_from = "String")]
pub struct Ipv4AddressRange {
    pub base_addr: Ipv4Addr,
    pub prefix_len: u8,
}

impl FromStr for Ipv4AddressRange {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self> {
        let (addr, prefix) = value
            .split_once('/')
            .ok_or_else(|| Error::InvalidConfig(format!("invalid IPv4 range \"{value}\"")))?;
        let base_addr = addr
            .parse()
            .map_err(|_| Error::InvalidConfig(format!("invalid IPv4 range \"{value}\"")))?;
        let prefix_len: u8 = prefix
            .parse()
            .map_err(|_| Error::InvalidConfig(format!("invalid IPv4 range \"{value}\"")))?;
        if prefix_len > 32 {
            return Err(Error::InvalidConfig(format!(
                "IPv4 prefix length out of range in \"{value}\""
            )));
        }
        Ok(Ipv4AddressRange { base_addr, prefix_len })
    }
}

impl TryFrom<String> for Ipv4AddressRange {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

/// An IPv6 prefix such as `2001:db8::/32`.
#[derive(Deserialize, Debug, Clone, Copy)]
#[serde(try_from = "String")]
pub struct Ipv6AddressRange {
    pub base_addr: Ipv6Addr,
    pub prefix_len: u8,
}

impl FromStr for Ipv6AddressRange {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self> {
        let (addr, prefix) = value
            .split_once('/')
            .ok_or_else(|| Error::InvalidConfig(format!("invalid IPv6 range \"{value}\"")))?;
        let base_addr = addr
            .parse()
            .map_err(|_| Error::InvalidConfig(format!("invalid IPv6 range \"{value}\"")))?;
        let prefix_len: u8 = prefix
            .parse()
            .map_err(|_| Error::InvalidConfig(format!("invalid IPv6 range \"{value}\"")))?;
        if prefix_len > 128 {
            return Err(Error::InvalidConfig(format!(
                "IPv6 prefix length out of range in \"{value}\""
            )));
        }
        Ok(Ipv6AddressRange { base_addr, prefix_len })
    }
}

impl TryFrom<String> for Ipv6AddressRange {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

fn validate_probability(value: f64, what: &str) -> Result<()> {
    if !(0.0..=1.0).contains(&value) {
        return Err(Error::InvalidConfig(format!(
            "{what} must lie in [0, 1], got {value}"
        )));
    }
    Ok(())
}

pub fn import_config(content: &str) -> Result<Configuration> {
    let config: Configuration = serde_yaml::from_str(content)
        .map_err(|e| Error::InvalidConfig(format!("cannot parse the configuration file: {e}")))?;

    for variant in &config.encapsulation {
        validate_probability(variant.probability, "encapsulation probability")?;
    }
    validate_probability(
        config.ipv4.fragmentation_probability,
        "ipv4 fragmentation probability",
    )?;
    validate_probability(
        config.ipv6.fragmentation_probability,
        "ipv6 fragmentation probability",
    )?;

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_complete_configuration() {
        let config = import_config(
            r#"
encapsulation:
  - probability: 0.2
    layers:
      - vlan:
          id: 10
  - probability: 0.1
    layers:
      - mpls:
          label: 333
      - vlan:
          id: 20
ipv4:
  ip_range:
    - 10.0.0.0/8
  fragmentation_probability: 0.3
  min_packet_size_to_fragment: 600
ipv6:
  ip_range:
    - 2001:db8::/32
"#,
        )
        .unwrap();
        assert_eq!(config.encapsulation.len(), 2);
        assert_eq!(
            config.encapsulation[0].layers,
            vec![EncapsulationLayer::Vlan { id: 10 }]
        );
        assert_eq!(
            config.encapsulation[1].layers,
            vec![
                EncapsulationLayer::Mpls { label: 333 },
                EncapsulationLayer::Vlan { id: 20 },
            ]
        );
        assert_eq!(config.ipv4.ip_range[0].prefix_len, 8);
        assert_eq!(config.ipv4.min_packet_size_to_fragment, 600);
        assert_eq!(config.ipv6.fragmentation_probability, 0.0);
    }

    #[test]
    fn empty_configuration_uses_defaults() {
        let config = import_config("{}").unwrap();
        assert!(config.encapsulation.is_empty());
        assert_eq!(config.ipv4.fragmentation_probability, 0.0);
        assert_eq!(config.ipv4.min_packet_size_to_fragment, 512);
    }

    #[test]
    fn rejects_unknown_encapsulation_layers() {
        let result = import_config(
            r#"
encapsulation:
  - probability: 1.0
    layers:
      - gre:
          key: 1
"#,
        );
        assert!(matches!(result, Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn rejects_out_of_range_probability() {
        let result = import_config("ipv4:\n  fragmentation_probability: 1.5\n");
        assert!(matches!(result, Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn rejects_malformed_ranges() {
        assert!("10.0.0.0".parse::<Ipv4AddressRange>().is_err());
        assert!("10.0.0.0/33".parse::<Ipv4AddressRange>().is_err());
        assert!("2001:db8::/129".parse::<Ipv6AddressRange>().is_err());
        assert!("10.0.0.0/8".parse::<Ipv4AddressRange>().is_ok());
    }
}
