//! Tests d'intégration : descriptions servies par un petit serveur HTTP local

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use scoutupnp::{
    DescriptionError, DescriptionFetcher, DeviceCache, DiscoveryMethod, MemoryDeviceCache,
    NetworkScanner, ScanOptions, SsdpResponse,
};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

const DESCRIPTION: &str = r#"<?xml version="1.0"?>
<root xmlns="urn:schemas-upnp-org:device-1-0">
  <device>
    <deviceType>urn:schemas-upnp-org:device:MediaRenderer:1</deviceType>
    <friendlyName>Test Renderer</friendlyName>
    <manufacturer>UpnpScout</manufacturer>
    <modelName>Loopback</modelName>
    <UDN>uuid:loopback-renderer</UDN>
  </device>
</root>"#;

/// Serveur HTTP minimal : `path` → 200 avec `body`, tout le reste → 404.
async fn serve(path: &'static str, body: &'static str) -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    tokio::spawn(async move {
        loop {
            let Ok((mut stream, _)) = listener.accept().await else {
                break;
            };
            tokio::spawn(async move {
                let mut request = Vec::new();
                let mut buf = [0u8; 1024];
                while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                    match stream.read(&mut buf).await {
                        Ok(0) | Err(_) => return,
                        Ok(n) => request.extend_from_slice(&buf[..n]),
                    }
                }

                let request = String::from_utf8_lossy(&request);
                let requested = request.split_whitespace().nth(1).unwrap_or("/");
                let (status, content) = if requested == path {
                    ("200 OK", body)
                } else {
                    ("404 Not Found", "not found")
                };

                let response = format!(
                    "HTTP/1.1 {}\r\nContent-Type: text/xml\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    status,
                    content.len(),
                    content
                );
                let _ = stream.write_all(response.as_bytes()).await;
                let _ = stream.shutdown().await;
            });
        }
    });

    port
}

async fn closed_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap().port()
}

fn quick_options(port: u16) -> ScanOptions {
    ScanOptions {
        ssdp_timeout: Duration::from_millis(300),
        http_timeout: Duration::from_secs(2),
        ports: vec![port],
        probe_timeout: Duration::from_millis(500),
        max_workers: 4,
        ..ScanOptions::default()
    }
}

#[tokio::test]
async fn test_fetch_attaches_endpoint() {
    let port = serve("/description.xml", DESCRIPTION).await;
    let fetcher = DescriptionFetcher::new().unwrap();
    let url = format!("http://127.0.0.1:{}/description.xml", port);

    let device = fetcher
        .fetch(&url, Duration::from_secs(2))
        .await
        .expect("description should resolve");

    assert_eq!(device.friendly_name.as_deref(), Some("Test Renderer"));
    assert_eq!(device.udn.as_deref(), Some("uuid:loopback-renderer"));
    assert_eq!(device.ip.as_deref(), Some("127.0.0.1"));
    assert_eq!(device.port, Some(port));
    assert_eq!(device.location_url.as_deref(), Some(url.as_str()));
    // La méthode de découverte est posée par l'orchestrateur, pas par le fetch
    assert_eq!(device.discovery_method, None);
}

#[tokio::test]
async fn test_fetch_non_200_and_closed_port() {
    let port = serve("/description.xml", DESCRIPTION).await;
    let fetcher = DescriptionFetcher::new().unwrap();

    let missing = format!("http://127.0.0.1:{}/rootDesc.xml", port);
    assert!(fetcher.fetch(&missing, Duration::from_secs(2)).await.is_none());
    assert!(matches!(
        fetcher.fetch_strict(&missing, Duration::from_secs(2)).await,
        Err(DescriptionError::Status(404))
    ));

    let closed = format!("http://127.0.0.1:{}/description.xml", closed_port().await);
    assert!(fetcher.fetch(&closed, Duration::from_secs(2)).await.is_none());
}

#[tokio::test]
async fn test_fetch_strict_rejects_what_resolver_repairs() {
    let port = serve(
        "/description.xml",
        "<root><device><friendlyName>Tom & Jerry</friendlyName></device></root>",
    )
    .await;
    let fetcher = DescriptionFetcher::new().unwrap();
    let url = format!("http://127.0.0.1:{}/description.xml", port);

    assert!(matches!(
        fetcher.fetch_strict(&url, Duration::from_secs(2)).await,
        Err(DescriptionError::InvalidXml(_))
    ));

    let device = fetcher.fetch(&url, Duration::from_secs(2)).await.unwrap();
    assert_eq!(device.friendly_name.as_deref(), Some("Tom & Jerry"));
}

#[tokio::test]
async fn test_scan_finds_device_by_port_scan_and_fills_cache() {
    let port = serve("/description.xml", DESCRIPTION).await;
    let cache = Arc::new(MemoryDeviceCache::new());
    let scanner = NetworkScanner::new(quick_options(port))
        .unwrap()
        .with_cache(cache.clone() as Arc<dyn DeviceCache>);

    let devices = scanner
        .scan(Some("127.0.0.1/32"), None, true)
        .await
        .expect("scan should succeed");

    let device = devices
        .iter()
        .find(|d| d.udn.as_deref() == Some("uuid:loopback-renderer"))
        .expect("loopback device should be found");
    assert_eq!(device.discovery_method, Some(DiscoveryMethod::PortScan));
    assert_eq!(device.port, Some(port));

    let cached = cache.get("127.0.0.1", port).expect("device should be cached");
    assert_eq!(cached.friendly_name.as_deref(), Some("Test Renderer"));
}

#[tokio::test]
async fn test_scan_without_cache_and_closed_ports() {
    let cache = Arc::new(MemoryDeviceCache::new());
    let port = closed_port().await;
    let scanner = NetworkScanner::new(quick_options(port))
        .unwrap()
        .with_cache(cache.clone() as Arc<dyn DeviceCache>);

    let devices = scanner
        .scan(Some("127.0.0.1"), Some(&[port]), false)
        .await
        .expect("scan should succeed");

    assert!(
        devices
            .iter()
            .all(|d| d.discovery_method != Some(DiscoveryMethod::PortScan)
                || d.ip.as_deref() != Some("127.0.0.1"))
    );
    assert!(cache.is_empty());
}

#[tokio::test]
async fn test_ssdp_device_and_open_port_merge_into_one_record() {
    let port = serve("/description.xml", DESCRIPTION).await;
    let location = format!("http://127.0.0.1:{}/description.xml", port);
    let response = SsdpResponse {
        location: location.clone(),
        st: Some("urn:schemas-upnp-org:device:MediaRenderer:1".to_string()),
        usn: Some("uuid:loopback-renderer::urn:schemas-upnp-org:device:MediaRenderer:1".to_string()),
        server: Some("Linux/6.1 UPnP/1.0 Scout/0.1".to_string()),
        cache_control: Some("max-age=1800".to_string()),
        source: "127.0.0.1:1900".parse().unwrap(),
        headers: HashMap::new(),
    };

    let scanner = NetworkScanner::new(quick_options(port)).unwrap();
    let devices = scanner
        .scan_with_responses(
            vec![response.clone(), response],
            Some("127.0.0.1/32"),
            None,
            false,
        )
        .await
        .expect("scan should succeed");

    assert_eq!(devices.len(), 1);
    let device = &devices[0];
    assert_eq!(device.discovery_method, Some(DiscoveryMethod::Ssdp));
    assert_eq!(device.udn.as_deref(), Some("uuid:loopback-renderer"));
    assert_eq!(device.port, Some(port));
    assert_eq!(device.location_url.as_deref(), Some(location.as_str()));
    assert_eq!(
        device.ssdp_st.as_deref(),
        Some("urn:schemas-upnp-org:device:MediaRenderer:1")
    );
    assert_eq!(
        device.ssdp_usn.as_deref(),
        Some("uuid:loopback-renderer::urn:schemas-upnp-org:device:MediaRenderer:1")
    );
    assert_eq!(
        device.ssdp_server.as_deref(),
        Some("Linux/6.1 UPnP/1.0 Scout/0.1")
    );
}
