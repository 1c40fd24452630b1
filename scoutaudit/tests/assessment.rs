//! Tests d'intégration sur la boucle locale : faux serveur RTSP, faux serveurs
//! TLS n'acceptant que TLS 1.0, port fermé.

use std::io::{Read, Write};
use std::time::Duration;

use scoutaudit::{
    AuditOptions, BlockingPool, RtspStatus, TlsProtocol, assess, rtsp, scan_certificate,
    scan_ciphers,
};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

/// Serveur RTSP : `/live` ouvert, `/stream1` protégé, le reste introuvable.
async fn rtsp_server() -> u16 {
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
                let url = request.split_whitespace().nth(1).unwrap_or("");
                let path = url
                    .trim_start_matches("rtsp://")
                    .find('/')
                    .map(|i| &url["rtsp://".len() + i..])
                    .unwrap_or("/");

                let response = match path {
                    "/live" => "RTSP/1.0 200 OK\r\nCSeq: 1\r\nPublic: OPTIONS, DESCRIBE, PLAY\r\nServer: FakeCam\r\n\r\n",
                    "/stream1" => "RTSP/1.0 401 Unauthorized\r\nCSeq: 1\r\nWWW-Authenticate: Basic realm=\"cam\"\r\n\r\n",
                    _ => "RTSP/1.0 404 Not Found\r\nCSeq: 1\r\n\r\n",
                };
                let _ = stream.write_all(response.as_bytes()).await;
                let _ = stream.shutdown().await;
            });
        }
    });

    port
}

fn closed_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

fn server_hello_tls10_rc4() -> Vec<u8> {
    let mut body = vec![0x03, 0x01];
    body.extend_from_slice(&[0x42; 32]);
    body.push(0);
    body.extend_from_slice(&[0x00, 0x05]);
    body.push(0);

    let mut handshake = vec![0x02, 0x00, 0x00, body.len() as u8];
    handshake.extend_from_slice(&body);

    let mut record = vec![0x16, 0x03, 0x01, 0x00, handshake.len() as u8];
    record.extend_from_slice(&handshake);
    record
}

/// Serveur TLS minimal : ServerHello TLS 1.0 / RC4 aux hellos TLS 1.0, alerte sinon.
fn legacy_tls_server() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();

    std::thread::spawn(move || {
        for stream in listener.incoming() {
            let Ok(mut stream) = stream else { break };
            std::thread::spawn(move || {
                let _ = stream.set_read_timeout(Some(Duration::from_secs(2)));
                let mut hello = Vec::new();
                let mut buf = [0u8; 2048];
                while hello.len() < 11 {
                    match stream.read(&mut buf) {
                        Ok(0) | Err(_) => return,
                        Ok(n) => hello.extend_from_slice(&buf[..n]),
                    }
                }

                let reply = if hello[0] == 0x16 && hello[9..11] == [0x03, 0x01] {
                    server_hello_tls10_rc4()
                } else {
                    vec![0x15, 0x03, 0x01, 0x00, 0x02, 0x02, 0x46]
                };
                let _ = stream.write_all(&reply);
                std::thread::sleep(Duration::from_millis(100));
            });
        }
    });

    port
}

// RSA 1024, sha1, auto-signé, CN=ipcam.local
const WEAK_RSA_DER: &[u8] = include_bytes!("fixtures/weak_rsa_selfsigned.der");

fn handshake_message(kind: u8, body: &[u8]) -> Vec<u8> {
    let len = body.len() as u32;
    let mut message = vec![kind, (len >> 16) as u8, (len >> 8) as u8, len as u8];
    message.extend_from_slice(body);
    message
}

/// Volée serveur TLS 1.0 complète : ServerHello, Certificate, ServerHelloDone.
fn tls10_certificate_flight() -> Vec<u8> {
    let mut hello = vec![0x03, 0x01];
    hello.extend_from_slice(&[0x42; 32]);
    hello.push(0);
    hello.extend_from_slice(&[0x00, 0x2F]);
    hello.push(0);

    let cert_len = WEAK_RSA_DER.len() as u32;
    let list_len = cert_len + 3;
    let mut certificate = vec![(list_len >> 16) as u8, (list_len >> 8) as u8, list_len as u8];
    certificate.extend_from_slice(&[(cert_len >> 16) as u8, (cert_len >> 8) as u8, cert_len as u8]);
    certificate.extend_from_slice(WEAK_RSA_DER);

    let mut handshake = handshake_message(0x02, &hello);
    handshake.extend_from_slice(&handshake_message(0x0B, &certificate));
    handshake.extend_from_slice(&handshake_message(0x0E, &[]));

    let mut record = vec![0x16, 0x03, 0x01];
    record.extend_from_slice(&(handshake.len() as u16).to_be_bytes());
    record.extend_from_slice(&handshake);
    record
}

/// Serveur TLS 1.0 seulement : répond à tout ClientHello TLS par une volée
/// TLS 1.0 avec son certificat, quelle que soit la version demandée.
fn tls10_only_server() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();

    std::thread::spawn(move || {
        for stream in listener.incoming() {
            let Ok(mut stream) = stream else { break };
            std::thread::spawn(move || {
                let _ = stream.set_read_timeout(Some(Duration::from_secs(2)));
                let mut hello = Vec::new();
                let mut buf = [0u8; 2048];
                loop {
                    if hello.len() >= 5 {
                        let record_len = u16::from_be_bytes([hello[3], hello[4]]) as usize;
                        if hello.len() >= 5 + record_len {
                            break;
                        }
                    }
                    match stream.read(&mut buf) {
                        Ok(0) | Err(_) => return,
                        Ok(n) => hello.extend_from_slice(&buf[..n]),
                    }
                }

                if hello[0] != 0x16 {
                    return;
                }
                let _ = stream.write_all(&tls10_certificate_flight());
                // Attend que le client ferme
                let _ = stream.read(&mut buf);
            });
        }
    });

    port
}

#[test]
fn test_certificate_of_tls10_only_server_is_analyzed() {
    let port = tls10_only_server();

    let analysis = scan_certificate("127.0.0.1", port, Duration::from_secs(2));

    assert!(analysis.error.is_none(), "unexpected error: {:?}", analysis.error);
    assert!(analysis.is_self_signed);
    assert_eq!(
        analysis.subject.get("commonName").map(String::as_str),
        Some("ipcam.local")
    );
    assert!(analysis.key_size.unwrap() < 2048);
    assert!(
        analysis
            .vulnerabilities
            .contains(&"Self-signed certificate".to_string())
    );
    assert!(
        analysis
            .vulnerabilities
            .iter()
            .any(|v| v.starts_with("Weak RSA key size"))
    );
}

#[test]
fn test_certificate_of_closed_port_keeps_error() {
    let analysis = scan_certificate("127.0.0.1", closed_port(), Duration::from_millis(500));

    assert!(analysis.error.is_some());
    assert!(analysis.subject.is_empty());
    assert!(!analysis.is_self_signed);
}

#[tokio::test]
async fn test_rtsp_probe_classifies_catalogue() {
    let port = rtsp_server().await;
    let pool = BlockingPool::new(4);

    let result = rtsp::probe(
        "127.0.0.1",
        port,
        rtsp::DEFAULT_RTSP_PATHS,
        Duration::from_secs(2),
        &pool,
    )
    .await;

    assert_eq!(result.available.len(), 1);
    assert_eq!(result.available[0].path, "/live");
    assert_eq!(result.available[0].status, RtspStatus::Available);
    assert_eq!(result.available[0].server.as_deref(), Some("FakeCam"));
    assert_eq!(result.auth_required.len(), 1);
    assert!(
        result.auth_required[0]
            .auth_method
            .as_deref()
            .unwrap()
            .contains("Basic")
    );
    assert!(result.errors.is_empty());
}

#[tokio::test]
async fn test_rtsp_probe_on_closed_port_records_errors() {
    let port = closed_port();
    let pool = BlockingPool::new(2);

    let result = rtsp::probe(
        "127.0.0.1",
        port,
        &["/", "/live"],
        Duration::from_millis(500),
        &pool,
    )
    .await;

    assert!(result.available.is_empty());
    assert_eq!(result.errors.len(), 2);
    assert!(result.errors.iter().all(|p| p.error.is_some()));
}

#[tokio::test]
async fn test_assess_host_with_open_rtsp_stream() {
    let rtsp_port = rtsp_server().await;
    let options = AuditOptions {
        ports: vec![rtsp_port, closed_port()],
        https_ports: vec![],
        rtsp_ports: vec![rtsp_port],
        timeout: Duration::from_secs(2),
        max_workers: 4,
    };

    let assessment = assess("127.0.0.1", &options).await;

    assert!(assessment.error.is_none());
    assert_eq!(assessment.open_ports, vec![rtsp_port]);
    assert!(assessment.https.is_empty());
    assert_eq!(assessment.rtsp[&rtsp_port].available.len(), 1);
    assert_eq!(
        assessment.rtsp[&rtsp_port].available[0].url,
        format!("rtsp://127.0.0.1:{}/live", rtsp_port)
    );
    // Un flux ouvert ne coûte que sa déduction propre
    assert!(assessment.vulnerabilities.is_empty());
    assert_eq!(assessment.score, Some(90));

    let json = serde_json::to_value(&assessment).unwrap();
    assert_eq!(json["score"], 90);
}

#[tokio::test]
async fn test_assess_unreachable_host_is_complete_and_empty() {
    let options = AuditOptions {
        ports: vec![closed_port()],
        timeout: Duration::from_millis(500),
        ..Default::default()
    };

    let assessment = assess("127.0.0.1", &options).await;

    assert!(assessment.error.is_none());
    assert!(assessment.open_ports.is_empty());
    assert!(assessment.vulnerabilities.is_empty());
    assert_eq!(assessment.score, Some(100));
}

#[tokio::test]
async fn test_scan_ciphers_detects_legacy_protocol() {
    let port = legacy_tls_server();
    let pool = BlockingPool::new(4);

    let result = scan_ciphers("127.0.0.1", port, Duration::from_secs(2), &pool).await;

    assert!(result.error.is_none());
    assert_eq!(result.supported_protocols.len(), 1);
    assert_eq!(result.supported_protocols[0].protocol, TlsProtocol::TlsV1_0);
    assert_eq!(result.supported_protocols[0].negotiated_version, "TLSv1.0");
    assert_eq!(result.default_protocol, None);
    assert_eq!(result.weak_ciphers, vec!["TLS_RSA_WITH_RC4_128_SHA"]);
    assert_eq!(
        result.vulnerabilities,
        vec![
            "TLSv1.0 supported".to_string(),
            "Weak cipher supported: TLS_RSA_WITH_RC4_128_SHA".to_string(),
        ]
    );
}
