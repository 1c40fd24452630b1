//! Sonde RTSP : une requête `OPTIONS` par chemin du catalogue.

use std::io::{Read, Write};
use std::net::TcpStream;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::pool::BlockingPool;
use crate::tls::handshake::resolve_socket_addr;

/// Chemins de flux courants des caméras et équipements multimédia
pub const DEFAULT_RTSP_PATHS: &[&str] = &[
    "/",
    "/stream",
    "/live",
    "/live.sdp",
    "/stream1",
    "/stream2",
    "/h264",
    "/h264_stream",
    "/cam/realmonitor",
    "/Streaming/Channels/101",
    "/videoMain",
    "/axis-media/media.amp",
    "/onvif1",
    "/11",
    "/media/video1",
];

/// Taille maximale de la réponse brute conservée
const MAX_RAW_RESPONSE: usize = 512;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RtspStatus {
    Available,
    AuthRequired,
    NotFound,
    Error,
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RtspStreamProbe {
    pub url: String,
    pub path: String,
    pub status: RtspStatus,
    /// En-tête `Public` d'une réponse 200
    pub methods: Option<String>,
    pub server: Option<String>,
    /// En-tête `WWW-Authenticate` d'une réponse 401
    pub auth_method: Option<String>,
    pub response: Option<String>,
    pub error: Option<String>,
}

/// Flux classés d'un port RTSP. Les chemins introuvables ne sont pas conservés.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RtspProbeResult {
    pub available: Vec<RtspStreamProbe>,
    pub auth_required: Vec<RtspStreamProbe>,
    pub errors: Vec<RtspStreamProbe>,
}

fn header_value(response: &str, name: &str) -> Option<String> {
    response.lines().find_map(|line| {
        let (key, value) = line.split_once(':')?;
        key.trim()
            .eq_ignore_ascii_case(name)
            .then(|| value.trim().to_string())
    })
}

/// Classe une réponse RTSP brute.
pub fn classify_response(url: &str, path: &str, response: &str) -> RtspStreamProbe {
    let status_line = response.lines().next().unwrap_or("");

    let status = if status_line.contains("200 OK") {
        RtspStatus::Available
    } else if status_line.contains("401") {
        RtspStatus::AuthRequired
    } else if status_line.contains("404") {
        RtspStatus::NotFound
    } else if status_line.starts_with("RTSP/") {
        RtspStatus::Error
    } else {
        RtspStatus::Unknown
    };

    let mut probe = RtspStreamProbe {
        url: url.to_string(),
        path: path.to_string(),
        status,
        methods: None,
        server: header_value(response, "Server"),
        auth_method: None,
        response: Some(truncate(response, MAX_RAW_RESPONSE)),
        error: None,
    };

    match status {
        RtspStatus::Available => probe.methods = header_value(response, "Public"),
        RtspStatus::AuthRequired => probe.auth_method = header_value(response, "WWW-Authenticate"),
        RtspStatus::Error => probe.error = Some(status_line.trim().to_string()),
        _ => {}
    }

    probe
}

fn truncate(s: &str, max: usize) -> String {
    if s.len() <= max {
        return s.to_string();
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    s[..end].to_string()
}

fn transport_failure(url: &str, path: &str, error: impl ToString) -> RtspStreamProbe {
    RtspStreamProbe {
        url: url.to_string(),
        path: path.to_string(),
        status: RtspStatus::Error,
        methods: None,
        server: None,
        auth_method: None,
        response: None,
        error: Some(error.to_string()),
    }
}

/// Envoie un `OPTIONS` pour `path` et lit une réponse. Bloquant.
pub fn probe_path(host: &str, port: u16, path: &str, timeout: Duration) -> RtspStreamProbe {
    let url = format!("rtsp://{}:{}{}", host, port, path);

    let addr = match resolve_socket_addr(host, port) {
        Ok(addr) => addr,
        Err(e) => return transport_failure(&url, path, e),
    };

    let exchange = || -> std::io::Result<String> {
        let mut stream = TcpStream::connect_timeout(&addr, timeout)?;
        stream.set_read_timeout(Some(timeout))?;
        stream.set_write_timeout(Some(timeout))?;

        let request = format!(
            "OPTIONS {} RTSP/1.0\r\nCSeq: 1\r\nUser-Agent: UpnpScout/0.1\r\n\r\n",
            url
        );
        stream.write_all(request.as_bytes())?;

        let mut buf = [0u8; 4096];
        let n = stream.read(&mut buf)?;
        Ok(String::from_utf8_lossy(&buf[..n]).into_owned())
    };

    match exchange() {
        Ok(response) if response.is_empty() => {
            transport_failure(&url, path, "Connection closed without response")
        }
        Ok(response) => classify_response(&url, path, &response),
        Err(e) => {
            debug!("RTSP probe {} failed: {}", url, e);
            transport_failure(&url, path, e)
        }
    }
}

/// Sonde chaque chemin de `paths` sur `host:port`, dans le pool.
pub async fn probe(
    host: &str,
    port: u16,
    paths: &[&str],
    timeout: Duration,
    pool: &BlockingPool,
) -> RtspProbeResult {
    let jobs: Vec<String> = paths.iter().map(|p| p.to_string()).collect();
    let job_host = host.to_string();

    let probes = pool
        .run_all(jobs, move |path| probe_path(&job_host, port, &path, timeout))
        .await;

    let mut result = RtspProbeResult::default();
    for (path, outcome) in paths.iter().zip(probes) {
        let probe = outcome.unwrap_or_else(|e| {
            transport_failure(&format!("rtsp://{}:{}{}", host, port, path), path, e)
        });
        match probe.status {
            RtspStatus::Available => result.available.push(probe),
            RtspStatus::AuthRequired => result.auth_required.push(probe),
            RtspStatus::NotFound => {}
            RtspStatus::Error | RtspStatus::Unknown => result.errors.push(probe),
        }
    }

    info!(
        "📹 RTSP {}:{} : {} open stream(s), {} protected",
        host,
        port,
        result.available.len(),
        result.auth_required.len()
    );

    result
}
