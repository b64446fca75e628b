//! Cast device discovery via mDNS
//!
//! Devices advertise `_googlecast._tcp.local.`; the TXT record carries the
//! device id (`id`) and friendly name (`fn`). Discovery is best-effort: a
//! scan returns whatever resolved within the window and never fails the
//! caller. Descriptors are ephemeral and rebuilt on every scan, but resolved
//! socket addresses stay cached so the transport can connect to a device
//! selected during an earlier scan.

use mdns_sd::{ServiceDaemon, ServiceEvent};
use serde::Serialize;
use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::{debug, error, info};

use crate::error::{Error, Result};

/// Service name for cast device mDNS discovery
pub const CAST_SERVICE_TYPE: &str = "_googlecast._tcp.local.";

/// A discovered playback device, as shown to clients
#[derive(Debug, Clone, Serialize)]
pub struct DeviceDescriptor {
    pub name: String,
    pub uuid: String,
}

/// Internal resolution of a device uuid to a reachable address
#[derive(Debug, Clone)]
pub(crate) struct ResolvedDevice {
    pub name: String,
    pub uuid: String,
    pub addr: IpAddr,
    pub port: u16,
}

/// Tracks discovered devices across scans
pub struct DeviceRegistry {
    devices: Mutex<HashMap<String, ResolvedDevice>>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self {
            devices: Mutex::new(HashMap::new()),
        }
    }

    /// Run a bounded discovery pass off the async runtime
    ///
    /// Always succeeds; discovery failure logs and yields an empty list.
    pub async fn scan(self: &Arc<Self>, timeout: Duration) -> Vec<DeviceDescriptor> {
        let registry = Arc::clone(self);
        tokio::task::spawn_blocking(move || registry.scan_blocking(timeout))
            .await
            .unwrap_or_else(|e| {
                error!("Discovery task panicked: {}", e);
                Vec::new()
            })
    }

    /// Blocking discovery pass; used directly by the playback worker thread
    pub fn scan_blocking(&self, timeout: Duration) -> Vec<DeviceDescriptor> {
        info!("Scanning for cast devices ({}s window)...", timeout.as_secs());
        let found = match discover_blocking(timeout) {
            Ok(found) => found,
            Err(e) => {
                error!("Cast device discovery failed: {}", e);
                return Vec::new();
            }
        };

        let mut descriptors: Vec<DeviceDescriptor> = found
            .values()
            .map(|d| DeviceDescriptor {
                name: d.name.clone(),
                uuid: d.uuid.clone(),
            })
            .collect();
        descriptors.sort_by(|a, b| a.name.cmp(&b.name));

        let mut devices = self.devices.lock().unwrap();
        devices.extend(found);
        info!("Found {} cast device(s)", descriptors.len());

        descriptors
    }

    /// Look up the cached address for a device uuid
    pub(crate) fn resolve(&self, uuid: &str) -> Option<ResolvedDevice> {
        self.devices.lock().unwrap().get(uuid).cloned()
    }
}

impl Default for DeviceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn discover_blocking(timeout: Duration) -> Result<HashMap<String, ResolvedDevice>> {
    let daemon = ServiceDaemon::new()
        .map_err(|e| Error::Device(format!("failed to create mDNS daemon: {}", e)))?;
    let receiver = daemon
        .browse(CAST_SERVICE_TYPE)
        .map_err(|e| Error::Device(format!("failed to browse for cast devices: {}", e)))?;

    let deadline = Instant::now() + timeout;
    let mut found = HashMap::new();

    loop {
        let now = Instant::now();
        if now >= deadline {
            break;
        }
        match receiver.recv_timeout(deadline - now) {
            Ok(ServiceEvent::ServiceResolved(info)) => {
                let uuid = match info.get_properties().get("id") {
                    Some(prop) => prop.val_str().to_string(),
                    None => {
                        debug!("Resolved cast service without id TXT record: {}", info.get_fullname());
                        continue;
                    }
                };
                let name = info
                    .get_properties()
                    .get("fn")
                    .map(|p| p.val_str().to_string())
                    .unwrap_or_else(|| info.get_fullname().to_string());
                let Some(addr) = info.get_addresses().iter().next().map(|ip| ip.to_ip_addr()) else {
                    continue;
                };

                debug!("Discovered cast device: {} at {}:{}", name, addr, info.get_port());
                found.insert(
                    uuid.clone(),
                    ResolvedDevice {
                        name,
                        uuid,
                        addr,
                        port: info.get_port(),
                    },
                );
            }
            Ok(ServiceEvent::ServiceRemoved(_, fullname)) => {
                debug!("Cast device removed: {}", fullname);
            }
            Ok(_) => {}
            // Timeout or daemon gone; either way the window is over
            Err(_) => break,
        }
    }

    let _ = daemon.shutdown();
    Ok(found)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_unknown_uuid() {
        let registry = DeviceRegistry::new();
        assert!(registry.resolve("nope").is_none());
    }

    #[test]
    fn test_resolve_after_insert() {
        let registry = DeviceRegistry::new();
        registry.devices.lock().unwrap().insert(
            "abc".to_string(),
            ResolvedDevice {
                name: "Living Room TV".to_string(),
                uuid: "abc".to_string(),
                addr: "192.168.1.20".parse().unwrap(),
                port: 8009,
            },
        );
        let resolved = registry.resolve("abc").unwrap();
        assert_eq!(resolved.name, "Living Room TV");
        assert_eq!(resolved.port, 8009);
    }
}
