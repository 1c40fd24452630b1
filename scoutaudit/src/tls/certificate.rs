use std::collections::BTreeMap;
use std::net::{Ipv4Addr, Ipv6Addr};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use x509_parser::prelude::*;
use x509_parser::public_key::PublicKey;

use super::client_hello::fetch_certificate;
use super::handshake::{default_handshake, resolve_socket_addr, sni_name};
use super::suites::TlsProtocol;

/// Versions essayées en handshake brut quand rustls échoue, dans l'ordre
const LEGACY_CERTIFICATE_PROTOCOLS: &[TlsProtocol] =
    &[TlsProtocol::TlsV1_2, TlsProtocol::TlsV1_0, TlsProtocol::SslV3];

/// Taille minimale acceptable d'une clé RSA
const MIN_RSA_BITS: u32 = 2048;

/// Origine de [`CertificateAnalysis::key_size`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeySizeSource {
    /// Lue dans le SubjectPublicKeyInfo
    Parsed,
    /// Déduite de la taille du certificat : approximative
    Estimated,
}

/// Analyse du certificat présenté sur `host:port`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CertificateAnalysis {
    pub host: String,
    pub port: u16,
    pub scan_time: String,
    /// Attributs du DN (`commonName`, `organizationName`, ...)
    pub subject: BTreeMap<String, String>,
    pub issuer: BTreeMap<String, String>,
    pub not_before: Option<String>,
    pub not_after: Option<String>,
    pub serial_number: Option<String>,
    pub subject_alt_names: Vec<String>,
    pub signature_algorithm: Option<String>,
    pub public_key_algorithm: Option<String>,
    pub is_expired: bool,
    pub is_self_signed: bool,
    pub key_size: Option<u32>,
    pub key_size_source: Option<KeySizeSource>,
    pub vulnerabilities: Vec<String>,
    pub error: Option<String>,
}

impl CertificateAnalysis {
    fn empty(host: &str, port: u16, now: DateTime<Utc>) -> Self {
        Self {
            host: host.to_string(),
            port,
            scan_time: now.to_rfc3339(),
            ..Default::default()
        }
    }

    /// Résultat d'échec : hôte, port et date renseignés, rien d'autre
    pub fn failed(host: &str, port: u16, error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            ..Self::empty(host, port, Utc::now())
        }
    }
}

/// Récupère le certificat de `host:port` et l'analyse.
///
/// Si le handshake rustls échoue, le certificat est lu par un ClientHello brut
/// offrant les versions et suites anciennes.
///
/// Bloquant. Ne retourne jamais d'erreur : un échec de connexion ou de
/// décodage est porté par le champ `error`.
pub fn scan_certificate(host: &str, port: u16, timeout: Duration) -> CertificateAnalysis {
    match default_handshake(host, port, timeout) {
        Ok(info) => match info.peer_certificate {
            Some(der) => analyze_certificate_der(host, port, &der, Utc::now()),
            None => CertificateAnalysis::failed(host, port, "No peer certificate"),
        },
        Err(e) => {
            debug!("Default TLS handshake with {}:{} failed: {}", host, port, e);
            match legacy_certificate(host, port, timeout) {
                Some(der) => analyze_certificate_der(host, port, &der, Utc::now()),
                None => CertificateAnalysis::failed(host, port, e.to_string()),
            }
        }
    }
}

/// Certificat terminal obtenu par handshake brut, première version qui répond.
fn legacy_certificate(host: &str, port: u16, timeout: Duration) -> Option<Vec<u8>> {
    let addr = resolve_socket_addr(host, port).ok()?;
    let server_name = sni_name(host);

    for &protocol in LEGACY_CERTIFICATE_PROTOCOLS {
        match fetch_certificate(addr, server_name.as_deref(), protocol, timeout) {
            Ok(Some(der)) => {
                info!(
                    "🔓 Certificate of {}:{} read through a {} handshake",
                    host, port, protocol
                );
                return Some(der);
            }
            Ok(None) => debug!("{}:{} gave no certificate to a {} hello", host, port, protocol),
            Err(e) => {
                debug!("Cannot reach {}:{} for certificate: {}", host, port, e);
                return None;
            }
        }
    }
    None
}

/// Analyse un certificat DER, `now` servant au calcul d'expiration.
pub fn analyze_certificate_der(
    host: &str,
    port: u16,
    der: &[u8],
    now: DateTime<Utc>,
) -> CertificateAnalysis {
    let mut analysis = CertificateAnalysis::empty(host, port, now);

    let cert = match X509Certificate::from_der(der) {
        Ok((_, cert)) => cert,
        Err(e) => {
            warn!("Cannot decode certificate from {}:{}: {}", host, port, e);
            analysis.error = Some(format!("Cannot decode certificate: {}", e));
            let (bits, source) = estimate_key_size(der.len());
            analysis.key_size = Some(bits);
            analysis.key_size_source = Some(source);
            return analysis;
        }
    };

    analysis.subject = name_map(cert.subject());
    analysis.issuer = name_map(cert.issuer());
    analysis.is_self_signed = cert.subject() == cert.issuer();
    analysis.serial_number = Some(
        cert.raw_serial()
            .iter()
            .map(|b| format!("{b:02x}"))
            .collect::<Vec<_>>()
            .join(":"),
    );

    let not_before = DateTime::from_timestamp(cert.validity().not_before.timestamp(), 0);
    let not_after = DateTime::from_timestamp(cert.validity().not_after.timestamp(), 0);
    analysis.not_before = not_before.map(|d| d.to_rfc3339());
    analysis.not_after = not_after.map(|d| d.to_rfc3339());
    match not_after {
        Some(expiry) => analysis.is_expired = expiry < now,
        None => warn!("Unusable notAfter in certificate from {}:{}", host, port),
    }

    analysis.subject_alt_names = subject_alt_names(&cert);
    analysis.signature_algorithm = Some(signature_algorithm_name(
        &cert.signature_algorithm.algorithm.to_id_string(),
    ));

    let (algorithm, parsed_bits) = public_key_info(&cert);
    analysis.public_key_algorithm = algorithm;
    let (bits, source) = match parsed_bits {
        Some(bits) => (bits, KeySizeSource::Parsed),
        None => estimate_key_size(der.len()),
    };
    analysis.key_size = Some(bits);
    analysis.key_size_source = Some(source);

    analysis.vulnerabilities = classify(&analysis);
    analysis
}

fn classify(analysis: &CertificateAnalysis) -> Vec<String> {
    let mut vulns = Vec::new();

    if analysis.is_expired {
        vulns.push(format!(
            "Certificate expired ({})",
            analysis.not_after.as_deref().unwrap_or("unknown date")
        ));
    }
    if analysis.is_self_signed {
        vulns.push("Self-signed certificate".to_string());
    }
    if let Some(sig) = &analysis.signature_algorithm {
        let lower = sig.to_ascii_lowercase();
        if lower.contains("md5") || lower.contains("sha1") {
            vulns.push(format!("Weak signature algorithm: {}", sig));
        }
    }
    // Une taille estimée n'est pas assez fiable pour être signalée
    if analysis.public_key_algorithm.as_deref() == Some("RSA")
        && analysis.key_size_source == Some(KeySizeSource::Parsed)
    {
        if let Some(bits) = analysis.key_size.filter(|b| *b < MIN_RSA_BITS) {
            vulns.push(format!("Weak RSA key size: {} bits", bits));
        }
    }

    vulns
}

fn attribute_name(oid: &str) -> String {
    match oid {
        "2.5.4.3" => "commonName".into(),
        "2.5.4.5" => "serialNumber".into(),
        "2.5.4.6" => "countryName".into(),
        "2.5.4.7" => "localityName".into(),
        "2.5.4.8" => "stateOrProvinceName".into(),
        "2.5.4.10" => "organizationName".into(),
        "2.5.4.11" => "organizationalUnitName".into(),
        "1.2.840.113549.1.9.1" => "emailAddress".into(),
        other => other.into(),
    }
}

fn name_map(name: &X509Name<'_>) -> BTreeMap<String, String> {
    name.iter_attributes()
        .filter_map(|attr| {
            let value = attr.as_str().ok()?;
            Some((attribute_name(&attr.attr_type().to_id_string()), value.to_string()))
        })
        .collect()
}

fn subject_alt_names(cert: &X509Certificate<'_>) -> Vec<String> {
    cert.extensions()
        .iter()
        .filter_map(|ext| match ext.parsed_extension() {
            ParsedExtension::SubjectAlternativeName(san) => Some(san),
            _ => None,
        })
        .flat_map(|san| san.general_names.iter())
        .filter_map(|name| match name {
            GeneralName::DNSName(dns) => Some(dns.to_string()),
            GeneralName::IPAddress(bytes) => match bytes.len() {
                4 => Some(Ipv4Addr::new(bytes[0], bytes[1], bytes[2], bytes[3]).to_string()),
                16 => {
                    let mut octets = [0u8; 16];
                    octets.copy_from_slice(bytes);
                    Some(Ipv6Addr::from(octets).to_string())
                }
                _ => None,
            },
            _ => None,
        })
        .collect()
}

fn signature_algorithm_name(oid: &str) -> String {
    match oid {
        "1.2.840.113549.1.1.4" => "md5WithRSAEncryption".into(),
        "1.2.840.113549.1.1.5" => "sha1WithRSAEncryption".into(),
        "1.2.840.113549.1.1.11" => "sha256WithRSAEncryption".into(),
        "1.2.840.113549.1.1.12" => "sha384WithRSAEncryption".into(),
        "1.2.840.113549.1.1.13" => "sha512WithRSAEncryption".into(),
        "1.2.840.113549.1.1.10" => "RSASSA-PSS".into(),
        "1.2.840.10040.4.3" => "dsa-with-sha1".into(),
        "1.2.840.10045.4.1" => "ecdsa-with-SHA1".into(),
        "1.2.840.10045.4.3.2" => "ecdsa-with-SHA256".into(),
        "1.2.840.10045.4.3.3" => "ecdsa-with-SHA384".into(),
        "1.2.840.10045.4.3.4" => "ecdsa-with-SHA512".into(),
        "1.3.101.112" => "Ed25519".into(),
        "1.3.101.113" => "Ed448".into(),
        other => other.into(),
    }
}

/// Algorithme de clé et taille lue, quand x509-parser sait la décoder
fn public_key_info(cert: &X509Certificate<'_>) -> (Option<String>, Option<u32>) {
    let spki = cert.public_key();
    match spki.parsed() {
        Ok(PublicKey::RSA(rsa)) => (Some("RSA".into()), Some(rsa.key_size() as u32)),
        Ok(PublicKey::EC(_)) => {
            let bits = spki
                .algorithm
                .parameters
                .as_ref()
                .and_then(|p| p.as_oid().ok())
                .and_then(|oid| match oid.to_id_string().as_str() {
                    "1.2.840.10045.3.1.7" => Some(256),
                    "1.3.132.0.34" => Some(384),
                    "1.3.132.0.35" => Some(521),
                    _ => None,
                });
            (Some("EC".into()), bits)
        }
        Ok(PublicKey::DSA(y)) => (Some("DSA".into()), Some((y.len() * 8) as u32)),
        _ => match spki.algorithm.algorithm.to_id_string().as_str() {
            "1.3.101.112" => (Some("Ed25519".into()), Some(256)),
            "1.3.101.113" => (Some("Ed448".into()), Some(456)),
            other => (Some(other.to_string()), None),
        },
    }
}

/// Estimation grossière d'après la taille DER du certificat.
///
/// Approximative : un certificat RSA 2048 bits chargé d'extensions peut
/// dépasser le seuil 4096. Ne sert qu'en dernier recours.
fn estimate_key_size(der_len: usize) -> (u32, KeySizeSource) {
    let bits = match der_len {
        len if len >= 1400 => 4096,
        len if len >= 900 => 2048,
        _ => 1024,
    };
    (bits, KeySizeSource::Estimated)
}
