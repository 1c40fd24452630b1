//! Cache de découverte indexé par (ip, port)

use std::collections::HashMap;

use parking_lot::RwLock;

use crate::description::DeviceDescription;

/// Collaborateur de cache alimenté à la fin de chaque scan
pub trait DeviceCache: Send + Sync {
    /// Insère ou remplace le device connu à `ip:port`
    fn upsert(&self, ip: &str, port: u16, device: &DeviceDescription);
}

/// Implémentation en mémoire, sans persistance
#[derive(Debug, Default)]
pub struct MemoryDeviceCache {
    devices: RwLock<HashMap<(String, u16), DeviceDescription>>,
}

impl MemoryDeviceCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, ip: &str, port: u16) -> Option<DeviceDescription> {
        self.devices.read().get(&(ip.to_string(), port)).cloned()
    }

    pub fn len(&self) -> usize {
        self.devices.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.read().is_empty()
    }

    /// Copie de tous les devices, triée par (ip, port)
    pub fn devices(&self) -> Vec<DeviceDescription> {
        let guard = self.devices.read();
        let mut keys: Vec<&(String, u16)> = guard.keys().collect();
        keys.sort();
        keys.into_iter().filter_map(|k| guard.get(k).cloned()).collect()
    }
}

impl DeviceCache for MemoryDeviceCache {
    fn upsert(&self, ip: &str, port: u16, device: &DeviceDescription) {
        self.devices
            .write()
            .insert((ip.to_string(), port), device.clone());
    }
}
