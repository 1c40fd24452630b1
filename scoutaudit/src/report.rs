//! Rapport texte d'un [`SecurityAssessment`]. Même bilan, même texte.

use std::collections::BTreeMap;

use crate::assessment::SecurityAssessment;
use crate::score::score_band;

const RULE: &str = "============================================================";
const MAX_LISTED_VULNERABILITIES: usize = 10;
const MAX_LISTED_STREAMS: usize = 3;

fn name_summary(name: &BTreeMap<String, String>) -> String {
    name.get("commonName")
        .or_else(|| name.get("organizationName"))
        .or_else(|| name.values().next())
        .cloned()
        .unwrap_or_else(|| "unknown".to_string())
}

fn yes_no(flag: bool) -> &'static str {
    if flag { "yes" } else { "no" }
}

pub fn generate_report(assessment: &SecurityAssessment) -> String {
    let mut lines: Vec<String> = Vec::new();

    lines.push(RULE.to_string());
    lines.push(format!("Security assessment: {}", assessment.host));
    lines.push(format!("Scan time: {}", assessment.scan_time));
    match assessment.score {
        Some(score) => lines.push(format!(
            "Security score: {}/100 ({})",
            score,
            score_band(score)
        )),
        None => lines.push("Security score: n/a".to_string()),
    }
    lines.push(RULE.to_string());

    if let Some(error) = &assessment.error {
        lines.push(String::new());
        lines.push(format!("Assessment failed: {}", error));
        return lines.join("\n");
    }

    lines.push(String::new());
    if assessment.open_ports.is_empty() {
        lines.push("Open ports: none".to_string());
    } else {
        let ports: Vec<String> = assessment.open_ports.iter().map(u16::to_string).collect();
        lines.push(format!("Open ports: {}", ports.join(", ")));
    }

    for (port, findings) in &assessment.https {
        let cert = &findings.certificate;
        lines.push(String::new());
        lines.push(format!("HTTPS port {}:", port));
        match &cert.error {
            Some(error) => lines.push(format!("  Certificate error: {}", error)),
            None => {
                lines.push(format!("  Subject: {}", name_summary(&cert.subject)));
                lines.push(format!("  Issuer: {}", name_summary(&cert.issuer)));
                lines.push(format!(
                    "  Expires: {}",
                    cert.not_after.as_deref().unwrap_or("unknown")
                ));
                lines.push(format!("  Self-signed: {}", yes_no(cert.is_self_signed)));
                lines.push(format!("  Expired: {}", yes_no(cert.is_expired)));
            }
        }

        let ciphers = &findings.ciphers;
        if let Some(error) = &ciphers.error {
            lines.push(format!("  Cipher scan error: {}", error));
            continue;
        }
        let protocols: Vec<String> = ciphers
            .supported_protocols
            .iter()
            .map(|p| p.protocol.to_string())
            .collect();
        lines.push(format!(
            "  Protocols: {}",
            if protocols.is_empty() {
                "none detected".to_string()
            } else {
                protocols.join(", ")
            }
        ));
        lines.push(format!("  Weak ciphers: {}", ciphers.weak_ciphers.len()));
        for cipher in &ciphers.weak_ciphers {
            lines.push(format!("    - {}", cipher));
        }
    }

    for (port, result) in &assessment.rtsp {
        lines.push(String::new());
        lines.push(format!("RTSP port {}:", port));
        lines.push(format!("  Unprotected streams: {}", result.available.len()));
        lines.push(format!("  Protected streams: {}", result.auth_required.len()));
        for stream in result.available.iter().take(MAX_LISTED_STREAMS) {
            lines.push(format!("    - {}", stream.path));
        }
    }

    lines.push(String::new());
    if assessment.vulnerabilities.is_empty() {
        lines.push("No major vulnerabilities detected.".to_string());
    } else {
        lines.push(format!(
            "Vulnerabilities ({}):",
            assessment.vulnerabilities.len()
        ));
        for (i, vuln) in assessment
            .vulnerabilities
            .iter()
            .take(MAX_LISTED_VULNERABILITIES)
            .enumerate()
        {
            lines.push(format!("  {}. {}", i + 1, vuln));
        }
        let hidden = assessment
            .vulnerabilities
            .len()
            .saturating_sub(MAX_LISTED_VULNERABILITIES);
        if hidden > 0 {
            lines.push(format!("  ... and {} more", hidden));
        }
    }

    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assessment::HttpsFindings;
    use crate::rtsp::{RtspProbeResult, RtspStatus, RtspStreamProbe};
    use crate::tls::{CertificateAnalysis, CipherScanResult};

    fn stream(path: &str) -> RtspStreamProbe {
        RtspStreamProbe {
            url: format!("rtsp://cam:554{}", path),
            path: path.to_string(),
            status: RtspStatus::Available,
            methods: None,
            server: None,
            auth_method: None,
            response: None,
            error: None,
        }
    }

    #[test]
    fn test_clean_report() {
        let assessment = SecurityAssessment {
            host: "192.168.1.20".into(),
            scan_time: "2026-10-19T10:00:00+00:00".into(),
            open_ports: vec![80, 1400],
            score: Some(100),
            ..Default::default()
        };
        let report = generate_report(&assessment);
        assert!(report.contains("Security assessment: 192.168.1.20"));
        assert!(report.contains("Security score: 100/100 (good)"));
        assert!(report.contains("Open ports: 80, 1400"));
        assert!(report.ends_with("No major vulnerabilities detected."));
    }

    #[test]
    fn test_report_sections() {
        let mut subject = BTreeMap::new();
        subject.insert("commonName".to_string(), "cam.local".to_string());

        let mut assessment = SecurityAssessment {
            host: "cam".into(),
            open_ports: vec![443, 554],
            vulnerabilities: (1..=13).map(|i| format!("issue {}", i)).collect(),
            score: Some(35),
            ..Default::default()
        };
        assessment.https.insert(
            443,
            HttpsFindings {
                certificate: CertificateAnalysis {
                    issuer: subject.clone(),
                    subject,
                    not_after: Some("2020-01-01T00:00:00+00:00".into()),
                    is_expired: true,
                    is_self_signed: true,
                    ..Default::default()
                },
                ciphers: CipherScanResult {
                    weak_ciphers: vec!["TLS_RSA_WITH_RC4_128_SHA".into()],
                    ..Default::default()
                },
            },
        );
        assessment.rtsp.insert(
            554,
            RtspProbeResult {
                available: ["/", "/live", "/stream1", "/stream2"]
                    .iter()
                    .map(|p| stream(p))
                    .collect(),
                ..Default::default()
            },
        );

        let report = generate_report(&assessment);
        assert!(report.contains("Security score: 35/100 (critical)"));
        assert!(report.contains("Subject: cam.local"));
        assert!(report.contains("Self-signed: yes"));
        assert!(report.contains("Expired: yes"));
        assert!(report.contains("    - TLS_RSA_WITH_RC4_128_SHA"));
        assert!(report.contains("Unprotected streams: 4"));
        assert!(report.contains("    - /stream1"));
        assert!(!report.contains("    - /stream2"));
        assert!(report.contains("  10. issue 10"));
        assert!(!report.contains("issue 11"));
        assert!(report.contains("... and 3 more"));
    }

    #[test]
    fn test_failed_assessment_report() {
        let assessment = SecurityAssessment {
            host: "nowhere".into(),
            error: Some("Cannot resolve host nowhere".into()),
            ..Default::default()
        };
        let report = generate_report(&assessment);
        assert!(report.contains("Security score: n/a"));
        assert!(report.contains("Assessment failed: Cannot resolve host nowhere"));
    }

    #[test]
    fn test_report_is_deterministic() {
        let assessment = SecurityAssessment {
            host: "h".into(),
            open_ports: vec![22],
            vulnerabilities: vec!["x".into()],
            score: Some(90),
            ..Default::default()
        };
        assert_eq!(generate_report(&assessment), generate_report(&assessment));
    }
}
