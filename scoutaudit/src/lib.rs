//! # scoutaudit - Audit de sécurité non authentifié d'un hôte
//!
//! Pour chaque hôte : surface de ports ouverts, certificat et protocoles TLS
//! des ports HTTPS, flux RTSP accessibles sans authentification. Le tout est
//! résumé par un score de 0 à 100 et un rapport texte.
//!
//! Les sondes sur sockets bloquants (handshakes TLS, RTSP) passent par un
//! [`BlockingPool`] borné.
//!
//! ```no_run
//! use scoutaudit::{AuditOptions, assess, generate_report};
//!
//! # async fn run() {
//! let assessment = assess("192.168.1.20", &AuditOptions::default()).await;
//! println!("{}", generate_report(&assessment));
//! # }
//! ```

pub mod assessment;
pub mod errors;
pub mod pool;
pub mod report;
pub mod rtsp;
pub mod score;
pub mod tls;

pub use assessment::{AuditOptions, HttpsFindings, SecurityAssessment, assess, assess_many};
pub use errors::AuditError;
pub use pool::BlockingPool;
pub use report::generate_report;
pub use rtsp::{DEFAULT_RTSP_PATHS, RtspProbeResult, RtspStatus, RtspStreamProbe};
pub use score::{score_band, security_score};
pub use tls::{
    CertificateAnalysis, CipherScanResult, KeySizeSource, ProtocolSupport, TlsProtocol,
    scan_certificate, scan_ciphers,
};
