//! Interface enumeration and resolution.
//!
//! Resolution is pure: it either finds the configured interface or asks the
//! caller to prompt the operator. The blocking read lives in `main`.

use std::net::{IpAddr, Ipv4Addr};

use tracing::debug;

use crate::error::DeviceError;

/// A capture-capable interface with at least one IPv4 address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Device {
    /// Name the capture library opens the interface by
    pub name: String,
    pub friendly_name: String,
    pub description: String,
    pub addresses: Vec<IpAddr>,
}

impl Device {
    pub fn first_ipv4(&self) -> Option<Ipv4Addr> {
        self.addresses.iter().find_map(|addr| match addr {
            IpAddr::V4(v4) => Some(*v4),
            IpAddr::V6(_) => None,
        })
    }

    /// `<index>) <friendlyName> <description> (<addresses>)`
    pub fn listing_line(&self, index: usize) -> String {
        let addresses = self
            .addresses
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(", ");
        format!(
            "{index}) {} {} ({addresses})",
            self.friendly_name, self.description
        )
    }
}

impl From<pcap::Device> for Device {
    fn from(device: pcap::Device) -> Self {
        Self {
            friendly_name: device.name.clone(),
            description: device.desc.unwrap_or_default(),
            addresses: device.addresses.iter().map(|a| a.addr).collect(),
            name: device.name,
        }
    }
}

/// Outcome of resolving the configured device address.
#[derive(Debug, PartialEq, Eq)]
pub enum Resolution<'a> {
    Resolved(&'a Device),
    /// No address configured; the operator must choose by index
    Prompt,
}

/// List capture interfaces, keeping only those that offer an IPv4 address.
pub fn enumerate() -> Result<Vec<Device>, DeviceError> {
    let devices = pcap::Device::list().map_err(|e| DeviceError::Enumerate(e.to_string()))?;
    let devices = ipv4_only(devices.into_iter().map(Device::from));
    debug!(count = devices.len(), "enumerated IPv4 devices");
    Ok(devices)
}

pub fn ipv4_only(devices: impl IntoIterator<Item = Device>) -> Vec<Device> {
    devices
        .into_iter()
        .filter(|d| d.first_ipv4().is_some())
        .collect()
}

/// Match `configured` against each device's first IPv4 address.
pub fn resolve(
    devices: &[Device],
    configured: Option<Ipv4Addr>,
) -> Result<Resolution<'_>, DeviceError> {
    let Some(target) = configured else {
        return Ok(Resolution::Prompt);
    };
    devices
        .iter()
        .find(|d| d.first_ipv4() == Some(target))
        .map(Resolution::Resolved)
        .ok_or(DeviceError::NotFound(target))
}

/// Interpret the operator's answer to the device prompt.
pub fn select<'a>(devices: &'a [Device], input: &str) -> Result<&'a Device, DeviceError> {
    let input = input.trim();
    input
        .parse::<usize>()
        .ok()
        .and_then(|index| devices.get(index))
        .ok_or_else(|| DeviceError::InvalidSelection(input.to_owned()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn device(name: &str, addresses: &[&str]) -> Device {
        Device {
            name: name.to_owned(),
            friendly_name: name.to_owned(),
            description: format!("{name} adapter"),
            addresses: addresses.iter().map(|a| a.parse().unwrap()).collect(),
        }
    }

    fn devices() -> Vec<Device> {
        vec![
            device("eth0", &["fe80::1", "192.168.1.20"]),
            device("wlan0", &["10.0.0.7", "10.0.0.8"]),
        ]
    }

    #[test]
    fn configured_address_resolves_without_prompt() {
        let devices = devices();
        let resolved = resolve(&devices, Some(Ipv4Addr::new(10, 0, 0, 7))).unwrap();
        assert_eq!(resolved, Resolution::Resolved(&devices[1]));
    }

    #[test]
    fn only_first_ipv4_address_is_compared() {
        let devices = devices();
        let err = resolve(&devices, Some(Ipv4Addr::new(10, 0, 0, 8))).unwrap_err();
        assert!(matches!(err, DeviceError::NotFound(addr) if addr == Ipv4Addr::new(10, 0, 0, 8)));
    }

    #[test]
    fn ipv6_addresses_are_skipped_when_finding_first_ipv4() {
        let devices = devices();
        let resolved = resolve(&devices, Some(Ipv4Addr::new(192, 168, 1, 20))).unwrap();
        assert_eq!(resolved, Resolution::Resolved(&devices[0]));
    }

    #[test]
    fn unknown_address_is_not_found() {
        let devices = devices();
        assert!(matches!(
            resolve(&devices, Some(Ipv4Addr::new(172, 16, 0, 1))),
            Err(DeviceError::NotFound(_))
        ));
    }

    #[test]
    fn no_address_requests_prompt() {
        assert_eq!(resolve(&devices(), None).unwrap(), Resolution::Prompt);
    }

    #[test]
    fn selection_accepts_only_valid_indices() {
        let devices = devices();
        assert_eq!(select(&devices, "0").unwrap(), &devices[0]);
        assert_eq!(select(&devices, " 1\n").unwrap(), &devices[1]);
        assert!(matches!(
            select(&devices, "2"),
            Err(DeviceError::InvalidSelection(s)) if s == "2"
        ));
        assert!(select(&devices, "-1").is_err());
        assert!(select(&devices, "eth0").is_err());
        assert!(select(&devices, "").is_err());
    }

    #[test]
    fn devices_without_ipv4_are_excluded() {
        let filtered = ipv4_only(vec![
            device("lo6", &["::1"]),
            device("eth0", &["192.168.1.20"]),
            device("down", &[]),
        ]);
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].name, "eth0");
    }

    #[test]
    fn listing_line_joins_addresses() {
        let line = devices()[1].listing_line(1);
        assert_eq!(line, "1) wlan0 wlan0 adapter (10.0.0.7, 10.0.0.8)");
    }
}
