//! Host identity discovery.
//!
//! The collector keys clients by a stable machine identifier plus a human
//! readable hostname. Interface enumeration order is not stable across
//! reboots, so the identifier is the lowest-valued non-loopback MAC address,
//! which is the same answer no matter how the interface list is ordered.

use std::{fs, path::Path};

use crate::{internal, protocol};

const NET_CLASS: &str = "/sys/class/net";
const ZERO_MAC: &str = "00:00:00:00:00:00";

/// A stable identity for this host.
#[derive(Debug, Clone)]
pub struct Identity {
    pub machine_id: String,
    pub host_name: String,
}

impl Identity {
    /// Discover the local identity.
    ///
    /// Never fails: a host with no usable interface reports the zero MAC, and
    /// a hostname lookup failure reports `"unknown"`. The agent is not worth
    /// halting over either.
    #[must_use]
    pub fn discover() -> Self {
        let machine_id = lowest_mac(Path::new(NET_CLASS)).unwrap_or_else(|| {
            internal!(level = WARN, "No usable network interface, using zero MAC");
            ZERO_MAC.to_string()
        });

        let host_name = hostname::get()
            .map(|h| h.to_string_lossy().into_owned())
            .unwrap_or_else(|_| "unknown".to_string());

        Self {
            machine_id,
            host_name,
        }
    }

    /// The identity handshake payload sent first on every fresh connection.
    #[must_use]
    pub fn auth_payload(&self) -> Vec<u8> {
        protocol::Message::new(protocol::MessageKind::Auth)
            .field(&self.machine_id)
            .field(&self.host_name)
            .into_bytes()
    }
}

/// Lowest-valued MAC address across non-loopback interfaces.
fn lowest_mac(class_dir: &Path) -> Option<String> {
    let entries = fs::read_dir(class_dir).ok()?;

    let mut lowest: Option<String> = None;
    for entry in entries.flatten() {
        let name = entry.file_name();
        if name.to_string_lossy() == "lo" {
            continue;
        }

        let Ok(raw) = fs::read_to_string(entry.path().join("address")) else {
            continue;
        };

        let mac = raw.trim().to_ascii_lowercase();
        if mac.is_empty() || mac == ZERO_MAC {
            continue;
        }

        if lowest.as_ref().is_none_or(|l| mac < *l) {
            lowest = Some(mac);
        }
    }

    lowest
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auth_payload_layout() {
        let identity = Identity {
            machine_id: "aa:bb:cc:dd:ee:ff".to_string(),
            host_name: "workstation".to_string(),
        };

        assert_eq!(
            identity.auth_payload(),
            b"CAU\x1faa:bb:cc:dd:ee:ff\x1fworkstation"
        );
    }

    #[test]
    fn lowest_mac_skips_loopback_and_zero() {
        let dir = tempfile::TempDir::new().unwrap();
        for (iface, mac) in [
            ("lo", "00:00:00:00:00:00"),
            ("eth0", "52:54:00:12:34:56"),
            ("wlan0", "0a:11:22:33:44:55"),
            ("dummy0", "00:00:00:00:00:00"),
        ] {
            fs::create_dir_all(dir.path().join(iface)).unwrap();
            fs::write(dir.path().join(iface).join("address"), format!("{mac}\n")).unwrap();
        }

        assert_eq!(lowest_mac(dir.path()), Some("0a:11:22:33:44:55".to_string()));
    }
}
