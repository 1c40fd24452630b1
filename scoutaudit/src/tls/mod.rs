//! Audit TLS : certificat présenté et protocoles / suites acceptés.

pub mod certificate;
pub mod client_hello;
pub mod handshake;
pub mod suites;

use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::net::TcpStream;
use tracing::{debug, info};

pub use certificate::{CertificateAnalysis, KeySizeSource, analyze_certificate_der, scan_certificate};
pub use client_hello::{ServerChoice, fetch_certificate, probe_protocol};
pub use handshake::{HandshakeInfo, default_handshake};
pub use suites::{TlsProtocol, is_weak_cipher};

use crate::pool::BlockingPool;
use handshake::{resolve_socket_addr, sni_name};

/// Protocole accepté par le serveur
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtocolSupport {
    pub protocol: TlsProtocol,
    /// Version annoncée dans le ServerHello
    pub negotiated_version: String,
    pub cipher: String,
}

/// Résultat de l'énumération des protocoles et suites sur `host:port`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CipherScanResult {
    pub host: String,
    pub port: u16,
    pub scan_time: String,
    pub supported_protocols: Vec<ProtocolSupport>,
    pub supported_ciphers: Vec<String>,
    pub weak_ciphers: Vec<String>,
    pub default_protocol: Option<TlsProtocol>,
    pub default_cipher: Option<String>,
    pub vulnerabilities: Vec<String>,
    pub error: Option<String>,
}

/// Énumère les protocoles acceptés par `host:port` puis fait un handshake
/// sous la politique par défaut.
///
/// Chaque protocole est essayé sur sa propre connexion, dans le pool : un
/// refus ou une panne n'interrompt pas les autres essais.
pub async fn scan_ciphers(
    host: &str,
    port: u16,
    timeout: Duration,
    pool: &BlockingPool,
) -> CipherScanResult {
    let mut result = CipherScanResult {
        host: host.to_string(),
        port,
        scan_time: Utc::now().to_rfc3339(),
        ..Default::default()
    };

    let resolve_host = host.to_string();
    let addr = match pool
        .run(move || resolve_socket_addr(&resolve_host, port))
        .await
        .and_then(|r| r)
    {
        Ok(addr) => addr,
        Err(e) => {
            result.error = Some(e.to_string());
            return result;
        }
    };

    match tokio::time::timeout(timeout, TcpStream::connect(addr)).await {
        Ok(Ok(_)) => {}
        Ok(Err(e)) => {
            result.error = Some(format!("Connection failed: {}", e));
            return result;
        }
        Err(_) => {
            result.error = Some("Connection timed out".to_string());
            return result;
        }
    }

    let sni = sni_name(host);
    let attempts = pool
        .run_all(TlsProtocol::ALL.to_vec(), move |protocol| {
            (protocol, probe_protocol(addr, sni.as_deref(), protocol, timeout))
        })
        .await;

    for attempt in attempts {
        match attempt {
            Ok((protocol, Ok(ServerChoice::Accepted { version, cipher }))) => {
                debug!("{}:{} accepts {} with {}", host, port, protocol, cipher);
                let negotiated_version = TlsProtocol::from_wire(version)
                    .map(|p| p.to_string())
                    .unwrap_or_else(|| format!("0x{:04X}", version));
                result.supported_protocols.push(ProtocolSupport {
                    protocol,
                    negotiated_version,
                    cipher: cipher.clone(),
                });
                push_unique(&mut result.supported_ciphers, cipher);
            }
            Ok((protocol, Ok(ServerChoice::Rejected))) => {
                debug!("{}:{} rejects {}", host, port, protocol);
            }
            Ok((protocol, Err(e))) => {
                debug!("{} probe on {}:{} failed: {}", protocol, host, port, e);
            }
            Err(e) => debug!("Protocol probe on {}:{} aborted: {}", host, port, e),
        }
    }

    let handshake_host = host.to_string();
    match pool
        .run(move || default_handshake(&handshake_host, port, timeout))
        .await
        .and_then(|r| r)
    {
        Ok(info) => {
            result.default_protocol = info.protocol;
            if let Some(cipher) = info.cipher {
                push_unique(&mut result.supported_ciphers, cipher.clone());
                result.default_cipher = Some(cipher);
            }
        }
        Err(e) => debug!("Default TLS handshake with {}:{} failed: {}", host, port, e),
    }

    for support in &result.supported_protocols {
        if support.protocol.is_insecure() {
            result
                .vulnerabilities
                .push(format!("{} supported", support.protocol));
        }
    }

    result.weak_ciphers = result
        .supported_ciphers
        .iter()
        .filter(|c| is_weak_cipher(c))
        .cloned()
        .collect();
    for cipher in &result.weak_ciphers {
        result
            .vulnerabilities
            .push(format!("Weak cipher supported: {}", cipher));
    }

    info!(
        "🔐 {}:{} : {} protocol(s), {} weak cipher(s)",
        host,
        port,
        result.supported_protocols.len(),
        result.weak_ciphers.len()
    );

    result
}

fn push_unique(list: &mut Vec<String>, value: String) {
    if !list.contains(&value) {
        list.push(value);
    }
}
