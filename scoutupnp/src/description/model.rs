use serde::{Deserialize, Serialize};
use url::Url;

/// Comment un device a été trouvé
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscoveryMethod {
    Ssdp,
    PortScan,
}

/// Service annoncé dans `serviceList`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceDescriptor {
    pub service_type: Option<String>,
    pub service_id: Option<String>,
    #[serde(rename = "SCPDURL")]
    pub scpd_url: Option<String>,
    #[serde(rename = "controlURL")]
    pub control_url: Option<String>,
    #[serde(rename = "eventSubURL")]
    pub event_sub_url: Option<String>,
}

impl ServiceDescriptor {
    /// Résout les URL relatives contre `base` ; les valeurs illisibles restent telles quelles.
    pub fn resolve_urls(&mut self, base: &Url) {
        for field in [
            &mut self.scpd_url,
            &mut self.control_url,
            &mut self.event_sub_url,
        ] {
            if let Some(value) = field.as_deref() {
                if let Ok(resolved) = base.join(value) {
                    *field = Some(resolved.to_string());
                }
            }
        }
    }
}

/// Icône de `iconList`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IconDescriptor {
    pub mimetype: Option<String>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub depth: Option<u32>,
    pub url: Option<String>,
}

/// Description d'un device UPnP, telle que résolue depuis son XML.
///
/// Tous les champs sont optionnels : les devices réels omettent à peu près
/// n'importe quoi. `ip`, `port`, `location_url` et les champs `ssdp_*` sont
/// ajoutés par la découverte, pas par le parseur.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceDescription {
    pub device_type: Option<String>,
    pub friendly_name: Option<String>,
    pub manufacturer: Option<String>,
    #[serde(rename = "manufacturerURL")]
    pub manufacturer_url: Option<String>,
    pub model_name: Option<String>,
    pub model_number: Option<String>,
    pub model_description: Option<String>,
    #[serde(rename = "modelURL")]
    pub model_url: Option<String>,
    pub serial_number: Option<String>,
    #[serde(rename = "UDN")]
    pub udn: Option<String>,
    #[serde(rename = "presentationURL")]
    pub presentation_url: Option<String>,
    #[serde(rename = "URLBase")]
    pub url_base: Option<String>,

    pub services: Vec<ServiceDescriptor>,
    pub icons: Vec<IconDescriptor>,
    pub embedded_devices: Vec<DeviceDescription>,

    pub ip: Option<String>,
    pub port: Option<u16>,
    #[serde(rename = "locationURL")]
    pub location_url: Option<String>,
    pub discovery_method: Option<DiscoveryMethod>,

    #[serde(rename = "ssdp_st")]
    pub ssdp_st: Option<String>,
    #[serde(rename = "ssdp_usn")]
    pub ssdp_usn: Option<String>,
    #[serde(rename = "ssdp_server")]
    pub ssdp_server: Option<String>,
}

impl DeviceDescription {
    /// Base de résolution des URL relatives : `URLBase`, sinon `locationURL`.
    pub fn base_url(&self) -> Option<Url> {
        self.url_base
            .as_deref()
            .and_then(|base| Url::parse(base).ok())
            .or_else(|| self.location_url.as_deref().and_then(|loc| Url::parse(loc).ok()))
    }

    /// Services du device et de tous ses devices embarqués, en profondeur d'abord.
    pub fn all_services(&self) -> Vec<&ServiceDescriptor> {
        let mut services: Vec<&ServiceDescriptor> = self.services.iter().collect();
        for embedded in &self.embedded_devices {
            services.extend(embedded.all_services());
        }
        services
    }

    /// Nom lisible : friendlyName, sinon modelName, sinon l'adresse.
    pub fn display_name(&self) -> String {
        self.friendly_name
            .clone()
            .or_else(|| self.model_name.clone())
            .or_else(|| self.ip.clone())
            .unwrap_or_else(|| "Unknown device".to_string())
    }
}
