//! Identité canonique des devices et fusion multi-sources.
//!
//! Un même device peut être vu par SSDP et par le scan de ports ; l'identité
//! permet de ne garder qu'un enregistrement.

use std::collections::HashMap;

use md5::{Digest, Md5};
use tracing::{debug, trace};

use crate::description::{DeviceDescription, DiscoveryMethod};

/// Dérive l'identité canonique d'un device. La première règle applicable gagne :
///
/// 1. `udn:<UDN>`
/// 2. `endpoint:<ip>:<port>`
/// 3. `device:<friendlyName>:<manufacturer>:<modelName>` (minuscules, espaces → `_`)
/// 4. `location:<locationURL>`
/// 5. `hash:<8 premiers hex du MD5 du JSON canonique>`
pub fn device_identity(device: &DeviceDescription) -> String {
    if let Some(udn) = non_empty(&device.udn) {
        return format!("udn:{}", udn);
    }

    if let (Some(ip), Some(port)) = (non_empty(&device.ip), device.port) {
        return format!("endpoint:{}:{}", ip, port);
    }

    let names = [&device.friendly_name, &device.manufacturer, &device.model_name];
    if names.iter().any(|name| non_empty(name).is_some()) {
        let parts: Vec<String> = names
            .iter()
            .map(|name| normalize_name(non_empty(name).unwrap_or_default()))
            .collect();
        return format!("device:{}", parts.join(":"));
    }

    if let Some(location) = non_empty(&device.location_url) {
        return format!("location:{}", location);
    }

    format!("hash:{}", content_hash(device))
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

fn normalize_name(value: &str) -> String {
    value.to_lowercase().replace(' ', "_")
}

fn content_hash(device: &DeviceDescription) -> String {
    // serde_json::Value trie les clés : sérialisation canonique
    let canonical = serde_json::to_value(device)
        .map(|value| value.to_string())
        .unwrap_or_default();
    let digest = Md5::digest(canonical.as_bytes());
    hex::encode(digest)[..8].to_string()
}

/// Fusionne les enregistrements de même identité, dans l'ordre de première apparition.
///
/// Un enregistrement `port_scan` est remplacé par un enregistrement `ssdp` de
/// même identité ; sinon le premier est gardé et ses champs `ssdp_*` absents
/// sont complétés. Idempotent.
pub fn deduplicate(devices: Vec<DeviceDescription>) -> Vec<DeviceDescription> {
    let input = devices.len();
    let mut order: Vec<String> = Vec::new();
    let mut by_identity: HashMap<String, DeviceDescription> = HashMap::new();

    for device in devices {
        let identity = device_identity(&device);
        match by_identity.get_mut(&identity) {
            Some(existing) => {
                trace!("Merging duplicate {}", identity);
                merge_into(existing, device);
            }
            None => {
                order.push(identity.clone());
                by_identity.insert(identity, device);
            }
        }
    }

    let result: Vec<DeviceDescription> = order
        .into_iter()
        .filter_map(|identity| by_identity.remove(&identity))
        .collect();

    debug!("Deduplicated {} records into {}", input, result.len());
    result
}

fn merge_into(existing: &mut DeviceDescription, incoming: DeviceDescription) {
    if existing.discovery_method == Some(DiscoveryMethod::PortScan)
        && incoming.discovery_method == Some(DiscoveryMethod::Ssdp)
    {
        *existing = incoming;
        return;
    }

    if existing.ssdp_st.is_none() {
        existing.ssdp_st = incoming.ssdp_st;
    }
    if existing.ssdp_usn.is_none() {
        existing.ssdp_usn = incoming.ssdp_usn;
    }
    if existing.ssdp_server.is_none() {
        existing.ssdp_server = incoming.ssdp_server;
    }
}
