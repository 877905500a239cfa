//! Choosing a device from scan results

use crate::transport::DiscoveredDevice;

/// First device whose name or address contains `pattern` (case-sensitive)
pub fn select_target<'a>(
    devices: &'a [DiscoveredDevice],
    pattern: &str,
) -> Option<&'a DiscoveredDevice> {
    devices.iter().find(|device| {
        device.address.contains(pattern)
            || device
                .name
                .as_deref()
                .is_some_and(|name| name.contains(pattern))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn device(address: &str, name: Option<&str>) -> DiscoveredDevice {
        DiscoveredDevice {
            address: address.to_string(),
            name: name.map(str::to_string),
            rssi: None,
        }
    }

    #[test]
    fn test_first_match_wins() {
        let devices = vec![
            device("AA:AA:AA:AA:AA:01", Some("Thermostat")),
            device("AA:AA:AA:AA:AA:02", Some("FM-BL 1")),
            device("AA:AA:AA:AA:AA:03", Some("FM-BL 2")),
        ];

        let target = select_target(&devices, "BL").unwrap();
        assert_eq!(target.address, "AA:AA:AA:AA:AA:02");
    }

    #[test]
    fn test_matches_address_and_unnamed_devices() {
        let devices = vec![device("C0:FF:EE:00:00:01", None)];

        assert!(select_target(&devices, "C0:FF").is_some());
        assert!(select_target(&devices, "BL").is_none());
    }

    #[test]
    fn test_match_is_case_sensitive() {
        let devices = vec![device("AA:AA:AA:AA:AA:01", Some("fm-bl"))];
        assert!(select_target(&devices, "BL").is_none());
    }
}
