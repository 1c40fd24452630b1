//! Handshake rustls avec la politique par défaut (TLS 1.2 / 1.3).
//!
//! Le certificat du pair n'est jamais vérifié : on audite des équipements qui
//! présentent presque toujours un certificat auto-signé.

use std::io;
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::sync::Arc;
use std::time::Duration;

use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::{CryptoProvider, aws_lc_rs};
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{ClientConfig, ClientConnection, DigitallySignedStruct, SignatureScheme};
use tracing::debug;

use super::suites::{TlsProtocol, suite_name};
use crate::errors::AuditError;

/// Ce que le handshake par défaut a négocié
#[derive(Debug, Clone)]
pub struct HandshakeInfo {
    pub protocol: Option<TlsProtocol>,
    pub cipher: Option<String>,
    /// Certificat terminal (DER)
    pub peer_certificate: Option<Vec<u8>>,
}

#[derive(Debug)]
struct AcceptAnyCertificate {
    provider: Arc<CryptoProvider>,
}

impl ServerCertVerifier for AcceptAnyCertificate {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.provider
            .signature_verification_algorithms
            .supported_schemes()
    }
}

fn client_config() -> Result<ClientConfig, AuditError> {
    let provider = Arc::new(aws_lc_rs::default_provider());
    let config = ClientConfig::builder_with_provider(provider.clone())
        .with_safe_default_protocol_versions()
        .map_err(|e| AuditError::Transport(e.to_string()))?
        .dangerous()
        .with_custom_certificate_verifier(Arc::new(AcceptAnyCertificate { provider }))
        .with_no_client_auth();
    Ok(config)
}

/// Résout `host:port` en première adresse utilisable.
pub fn resolve_socket_addr(host: &str, port: u16) -> Result<SocketAddr, AuditError> {
    (host, port)
        .to_socket_addrs()
        .map_err(|e| AuditError::Transport(format!("{}: {}", host, e)))?
        .next()
        .ok_or_else(|| AuditError::Transport(format!("{}: no address", host)))
}

/// Nom envoyé en SNI : jamais pour une adresse IP littérale
pub fn sni_name(host: &str) -> Option<String> {
    let bare = host.trim_matches(|c| c == '[' || c == ']');
    if bare.parse::<std::net::IpAddr>().is_ok() {
        None
    } else {
        Some(host.to_string())
    }
}

/// Handshake bloquant sous la politique par défaut de rustls.
pub fn default_handshake(
    host: &str,
    port: u16,
    timeout: Duration,
) -> Result<HandshakeInfo, AuditError> {
    let addr = resolve_socket_addr(host, port)?;
    let server_name = ServerName::try_from(host.trim_matches(|c| c == '[' || c == ']').to_string())
        .map_err(|e| AuditError::Transport(format!("Invalid server name {}: {}", host, e)))?;

    let mut conn = ClientConnection::new(Arc::new(client_config()?), server_name)
        .map_err(|e| AuditError::Transport(e.to_string()))?;

    let mut sock = TcpStream::connect_timeout(&addr, timeout).map_err(transport)?;
    sock.set_read_timeout(Some(timeout)).map_err(transport)?;
    sock.set_write_timeout(Some(timeout)).map_err(transport)?;

    while conn.is_handshaking() {
        conn.complete_io(&mut sock).map_err(transport)?;
    }

    let protocol = conn
        .protocol_version()
        .and_then(|v| TlsProtocol::from_wire(u16::from(v)));
    let cipher = conn
        .negotiated_cipher_suite()
        .map(|suite| suite_name(u16::from(suite.suite())));
    let peer_certificate = conn
        .peer_certificates()
        .and_then(|chain| chain.first())
        .map(|cert| cert.as_ref().to_vec());

    debug!(
        "TLS handshake with {}:{} negotiated {:?} / {:?}",
        host, port, protocol, cipher
    );

    Ok(HandshakeInfo {
        protocol,
        cipher,
        peer_certificate,
    })
}

fn transport(e: io::Error) -> AuditError {
    AuditError::Transport(e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sni_skips_ip_literals() {
        assert_eq!(sni_name("192.168.1.20"), None);
        assert_eq!(sni_name("[::1]"), None);
        assert_eq!(sni_name("camera.local").as_deref(), Some("camera.local"));
    }

    #[test]
    fn test_client_config_builds() {
        assert!(client_config().is_ok());
    }

    #[test]
    fn test_handshake_on_closed_port_is_transport_error() {
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let result = default_handshake("127.0.0.1", port, Duration::from_millis(500));
        assert!(matches!(result, Err(AuditError::Transport(_))));
    }
}
