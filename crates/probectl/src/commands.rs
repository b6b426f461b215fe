//! Command implementations.
//!
//! Each command takes an already constructed session so the same code runs
//! against the native backend and against in-memory devices.

use anyhow::{Context, Result};
use hidlink::{DeviceAccessProvider, DeviceInfo, ProbeSession};

/// Text printed by `probectl check`.
pub fn render_check(available: bool) -> String {
    if available {
        "HID device access: available".to_string()
    } else {
        "HID device access: unavailable".to_string()
    }
}

/// Requests a grant and returns the descriptors of every opened device.
pub async fn list_devices<P: DeviceAccessProvider>(
    session: &ProbeSession<P>,
) -> hidlink::Result<Vec<DeviceInfo>> {
    session.refresh_devices().await?;
    Ok(session.debuggers().await)
}

/// Formats device descriptors as a table or as JSON.
pub fn render_devices(devices: &[DeviceInfo], json: bool) -> Result<String> {
    if json {
        return serde_json::to_string_pretty(devices).context("Failed to encode device list");
    }

    if devices.is_empty() {
        return Ok("No devices granted".to_string());
    }

    let mut out = format!(
        "{:<4} {:<9} {:<24} {:<20} {}\n",
        "IDX", "VID:PID", "NAME", "SERIAL", "PATH"
    );
    for (index, info) in devices.iter().enumerate() {
        out.push_str(&format!(
            "{:<4} {:04x}:{:04x} {:<24} {:<20} {}\n",
            index,
            info.vendor_id,
            info.product_id,
            info.display_name(),
            info.serial.as_deref().unwrap_or("-"),
            info.id
        ));
    }
    Ok(out.trim_end().to_string())
}

/// Grants, selects the device at `index` and runs one report exchange.
pub async fn transact<P: DeviceAccessProvider>(
    session: &ProbeSession<P>,
    index: usize,
    request: &[u8],
) -> hidlink::Result<Vec<u8>> {
    session.refresh_devices().await?;
    session.select(index).await?;
    session.transact(request).await
}

/// Parses a hex byte string. Whitespace, `:` separators and `0x` prefixes are
/// accepted.
pub fn parse_hex(input: &str) -> Result<Vec<u8>> {
    let digits: String = input
        .split(|c: char| c.is_whitespace() || c == ':' || c == ',')
        .filter(|token| !token.is_empty())
        .map(|token| token.trim_start_matches("0x").trim_start_matches("0X"))
        .collect();

    if digits.is_empty() {
        anyhow::bail!("Request is empty");
    }

    hex::decode(&digits).with_context(|| format!("Invalid hex request: {}", input))
}

/// Formats bytes as space separated hex pairs.
pub fn format_hex(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_check() {
        assert!(render_check(true).ends_with("available"));
        assert!(render_check(false).ends_with("unavailable"));
    }

    #[test]
    fn test_parse_hex_variants() {
        assert_eq!(parse_hex("00fe").unwrap(), vec![0x00, 0xfe]);
        assert_eq!(parse_hex("00 fe").unwrap(), vec![0x00, 0xfe]);
        assert_eq!(parse_hex("0x00 0xFE").unwrap(), vec![0x00, 0xfe]);
        assert_eq!(parse_hex("00:fe,01").unwrap(), vec![0x00, 0xfe, 0x01]);
    }

    #[test]
    fn test_parse_hex_rejects_bad_input() {
        assert!(parse_hex("").is_err());
        assert!(parse_hex("   ").is_err());
        assert!(parse_hex("0").is_err());
        assert!(parse_hex("zz").is_err());
    }

    #[test]
    fn test_format_hex() {
        assert_eq!(format_hex(&[0x00, 0x02, 0x40]), "00 02 40");
        assert_eq!(format_hex(&[]), "");
    }

    #[test]
    fn test_render_devices_table() {
        let devices = vec![DeviceInfo::new("/dev/hidraw0")
            .with_ids(0x03eb, 0x2141)
            .with_product("EDBG CMSIS-DAP")
            .with_serial("ATML0001")];

        let table = render_devices(&devices, false).unwrap();
        let lines: Vec<_> = table.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("IDX"));
        assert!(lines[1].contains("03eb:2141"));
        assert!(lines[1].contains("EDBG CMSIS-DAP"));
        assert!(lines[1].contains("ATML0001"));
        assert!(lines[1].ends_with("/dev/hidraw0"));
    }

    #[test]
    fn test_render_devices_empty() {
        assert_eq!(render_devices(&[], false).unwrap(), "No devices granted");
    }

    #[test]
    fn test_render_devices_json() {
        let devices = vec![DeviceInfo::new("/dev/hidraw0").with_ids(0x0d28, 0x0204)];

        let json = render_devices(&devices, true).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();

        assert_eq!(value[0]["id"], "/dev/hidraw0");
        assert_eq!(value[0]["vendor_id"], 0x0d28);
        assert_eq!(value[0]["product_id"], 0x0204);
    }
}
