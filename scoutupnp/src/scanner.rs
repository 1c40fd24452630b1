//! Orchestrateur de scan réseau.
//!
//! Phases : SSDP → fusion par LOCATION → téléchargement concurrent des
//! descriptions → cibles ARP et/ou CIDR → scan de ports borné → sonde HTTP
//! des couples (ip, port) non couverts par SSDP → déduplication → cache.

use std::collections::{BTreeSet, HashSet};
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, StreamExt};
use scoutconfig::Config;
use tracing::{debug, info, warn};

use crate::cache::DeviceCache;
use crate::description::{DescriptionFetcher, DeviceDescription, DiscoveryMethod};
use crate::errors::ScanError;
use crate::identity::deduplicate;
use crate::ssdp::{DEFAULT_SEARCH_TARGETS, SsdpClient, SsdpResponse};

/// Chemins de description courants, essayés sur les ports ouverts
pub const COMMON_DESCRIPTION_PATHS: &[&str] = &[
    "/description.xml",
    "/rootDesc.xml",
    "/device.xml",
    "/upnp/description.xml",
    "/DeviceDescription.xml",
    "/dmr/description.xml",
    "/xml/device_description.xml",
    "/setup.xml",
];

/// Ports sondés par défaut
pub const DEFAULT_SCAN_PORTS: &[u16] = &[80, 443, 1400, 1900, 8008, 8080, 8443, 49152, 49153, 49154];

#[derive(Debug, Clone)]
pub struct ScanOptions {
    /// Fenêtre d'écoute SSDP unique
    pub ssdp_timeout: Duration,
    pub mx: u8,
    pub search_targets: Vec<String>,
    pub http_timeout: Duration,
    pub ports: Vec<u16>,
    pub probe_timeout: Duration,
    pub max_workers: usize,
    pub use_cache: bool,
    /// Nombre de chemins de [`COMMON_DESCRIPTION_PATHS`] essayés par port ouvert
    pub description_paths: usize,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            ssdp_timeout: Duration::from_secs(5),
            mx: 3,
            search_targets: DEFAULT_SEARCH_TARGETS.iter().map(|s| s.to_string()).collect(),
            http_timeout: Duration::from_secs(5),
            ports: DEFAULT_SCAN_PORTS.to_vec(),
            probe_timeout: Duration::from_millis(1000),
            max_workers: 64,
            use_cache: true,
            description_paths: 1,
        }
    }
}

impl ScanOptions {
    pub fn from_config(config: &Config) -> Result<Self, ScanError> {
        let ports = config
            .get_scan_ports()
            .map_err(|e| ScanError::InvalidConfig(e.to_string()))?;
        if ports.is_empty() {
            return Err(ScanError::InvalidConfig("scan.ports is empty".to_string()));
        }

        let ssdp_timeout = config.get_ssdp_timeout_secs();
        if ssdp_timeout == 0 {
            return Err(ScanError::InvalidConfig(
                "ssdp.timeout_secs must be positive".to_string(),
            ));
        }

        let probe_timeout = config.get_probe_timeout_ms();
        if probe_timeout == 0 {
            return Err(ScanError::InvalidConfig(
                "scan.probe_timeout_ms must be positive".to_string(),
            ));
        }

        Ok(Self {
            ssdp_timeout: Duration::from_secs(ssdp_timeout),
            mx: config.get_ssdp_mx().clamp(1, 5) as u8,
            search_targets: config.get_ssdp_search_targets(),
            http_timeout: Duration::from_secs(config.get_http_timeout_secs().max(1)),
            ports,
            probe_timeout: Duration::from_millis(probe_timeout),
            max_workers: config.get_scan_max_workers(),
            use_cache: config.get_use_cache(),
            description_paths: 1,
        })
    }
}

/// Scanner réseau : découverte SSDP et scan de ports, fusionnés en une liste
/// de devices dédupliquée.
pub struct NetworkScanner {
    options: ScanOptions,
    fetcher: DescriptionFetcher,
    cache: Option<Arc<dyn DeviceCache>>,
}

impl NetworkScanner {
    pub fn new(options: ScanOptions) -> Result<Self, ScanError> {
        let fetcher = DescriptionFetcher::new().map_err(|e| match e {
            crate::errors::DescriptionError::Http(e) => ScanError::HttpClient(e),
            other => ScanError::InvalidConfig(other.to_string()),
        })?;

        Ok(Self {
            options,
            fetcher,
            cache: None,
        })
    }

    /// Attache un cache alimenté en fin de scan
    pub fn with_cache(mut self, cache: Arc<dyn DeviceCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn options(&self) -> &ScanOptions {
        &self.options
    }

    /// Lance un scan complet.
    ///
    /// Sans `network_range`, les cibles du scan de ports viennent de la table
    /// ARP. `ports` remplace la liste configurée. Seules les erreurs de niveau
    /// scan remontent : plage invalide, socket SSDP impossible à lier.
    pub async fn scan(
        &self,
        network_range: Option<&str>,
        ports: Option<&[u16]>,
        use_cache: bool,
    ) -> Result<Vec<DeviceDescription>, ScanError> {
        if let Some(range) = network_range {
            scoututils::parse_cidr(range).map_err(|_| ScanError::InvalidRange(range.to_string()))?;
        }

        info!("🔍 Starting network scan");

        // Phase 1 : SSDP
        let client = SsdpClient::new().map_err(ScanError::Bind)?;
        let responses = client
            .discover(
                self.options.ssdp_timeout,
                &self.options.search_targets,
                self.options.mx,
            )
            .await;

        self.scan_with_responses(responses, network_range, ports, use_cache)
            .await
    }

    /// Suite du scan à partir de réponses SSDP déjà collectées.
    ///
    /// Les endpoints déjà résolus par SSDP ne sont pas sondés à nouveau : le
    /// device garde sa méthode `ssdp` et ses champs `ssdp_*`.
    pub async fn scan_with_responses(
        &self,
        responses: Vec<SsdpResponse>,
        network_range: Option<&str>,
        ports: Option<&[u16]>,
        use_cache: bool,
    ) -> Result<Vec<DeviceDescription>, ScanError> {
        let range = match network_range {
            Some(range) => Some(
                scoututils::parse_cidr(range)
                    .map_err(|_| ScanError::InvalidRange(range.to_string()))?,
            ),
            None => None,
        };
        let ports = ports.unwrap_or(self.options.ports.as_slice());

        let responses = dedup_by_location(responses);
        info!("SSDP: {} unique locations", responses.len());

        let ssdp_devices = self.fetch_ssdp_descriptions(&responses).await;

        // Phase 2 : cibles du scan de ports
        let mut targets: BTreeSet<IpAddr> = BTreeSet::new();
        targets.extend(responses.iter().map(advertised_ip));

        match range {
            Some(net) => {
                let hosts = scoututils::expand_cidr(&net.to_string());
                debug!("Range {} expands to {} hosts", net, hosts.len());
                targets.extend(hosts.into_iter().map(IpAddr::V4));
            }
            None => match scoututils::read_arp_table().await {
                Ok(entries) => targets.extend(entries.into_iter().map(|e| IpAddr::V4(e.ip))),
                Err(e) => warn!("ARP table unavailable, port scan limited to SSDP hosts: {}", e),
            },
        }

        let targets: Vec<IpAddr> = targets.into_iter().collect();
        let open = scoututils::scan_ports(
            &targets,
            ports,
            self.options.probe_timeout,
            self.options.max_workers,
        )
        .await;
        info!(
            "Port scan: {} responsive hosts out of {}",
            open.len(),
            targets.len()
        );

        // Phase 3 : sonde HTTP des endpoints non couverts par SSDP
        let covered: HashSet<(String, u16)> = ssdp_devices
            .iter()
            .filter_map(|d| Some((d.ip.clone()?, d.port?)))
            .collect();

        let candidates: Vec<SocketAddr> = open
            .iter()
            .flat_map(|(ip, ports)| ports.iter().map(move |port| SocketAddr::new(*ip, *port)))
            .filter(|addr| !covered.contains(&(addr.ip().to_string(), addr.port())))
            .collect();

        let port_devices = self.probe_endpoints(candidates).await;

        // Phase 4 : fusion et cache
        let mut all = ssdp_devices;
        all.extend(port_devices);
        let devices = deduplicate(all);

        if use_cache {
            self.update_cache(&devices);
        }

        info!("✅ Scan complete: {} devices", devices.len());
        Ok(devices)
    }

    async fn fetch_ssdp_descriptions(&self, responses: &[SsdpResponse]) -> Vec<DeviceDescription> {
        let timeout = self.options.http_timeout;
        stream::iter(responses)
            .map(|response| async move {
                let mut device = self.fetcher.fetch(&response.location, timeout).await?;
                device.discovery_method = Some(DiscoveryMethod::Ssdp);
                device.ssdp_st = response.st.clone();
                device.ssdp_usn = response.usn.clone();
                device.ssdp_server = response.server.clone();
                Some(device)
            })
            .buffered(self.options.max_workers.max(1))
            .filter_map(|device| async move { device })
            .collect()
            .await
    }

    async fn probe_endpoints(&self, endpoints: Vec<SocketAddr>) -> Vec<DeviceDescription> {
        let timeout = self.options.http_timeout;
        let paths = self.options.description_paths.clamp(1, COMMON_DESCRIPTION_PATHS.len());

        stream::iter(endpoints)
            .map(|addr| async move {
                for path in &COMMON_DESCRIPTION_PATHS[..paths] {
                    let url = format!("http://{}{}", addr, path);
                    if let Some(mut device) = self.fetcher.fetch(&url, timeout).await {
                        device.discovery_method = Some(DiscoveryMethod::PortScan);
                        return Some(device);
                    }
                }
                None
            })
            .buffered(self.options.max_workers.max(1))
            .filter_map(|device| async move { device })
            .collect()
            .await
    }

    fn update_cache(&self, devices: &[DeviceDescription]) {
        let Some(cache) = &self.cache else {
            debug!("No device cache attached");
            return;
        };

        for device in devices {
            match (device.ip.as_deref(), device.port) {
                (Some(ip), Some(port)) => cache.upsert(ip, port, device),
                _ => debug!("Not caching {} (no endpoint)", device.display_name()),
            }
        }
    }
}

/// Adresse annoncée par le LOCATION, ou à défaut la source du datagramme.
///
/// Un device multi-interfaces peut répondre depuis une adresse et annoncer
/// sa description sur une autre.
fn advertised_ip(response: &SsdpResponse) -> IpAddr {
    url::Url::parse(&response.location)
        .ok()
        .and_then(|url| {
            url.host_str()
                .map(|h| h.trim_matches(|c| c == '[' || c == ']').to_string())
        })
        .and_then(|host| host.parse::<IpAddr>().ok())
        .unwrap_or_else(|| response.source.ip())
}

/// Ne garde que la première réponse de chaque LOCATION, dans l'ordre d'arrivée.
pub fn dedup_by_location(responses: Vec<SsdpResponse>) -> Vec<SsdpResponse> {
    let mut seen = HashSet::new();
    responses
        .into_iter()
        .filter(|r| seen.insert(r.location.clone()))
        .collect()
}
