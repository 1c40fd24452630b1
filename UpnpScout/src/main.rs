use std::collections::BTreeSet;
use std::sync::Arc;

use scoutaudit::{AuditOptions, assess_many, generate_report};
use scoutconfig::get_config;
use scoutupnp::{MemoryDeviceCache, NetworkScanner, ScanOptions};
use tracing::info;
use tracing_subscriber::EnvFilter;

fn init_logging(min_level: &str) {
    // RUST_LOG prend le pas sur log.min_level
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(min_level.to_lowercase()));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = get_config();
    init_logging(&config.get_log_min_level());

    info!("⚙️ Configuration loaded from {}", config.config_dir());

    let scan_options = ScanOptions::from_config(&config)?;
    let audit_options = AuditOptions::from_config(&config)?;

    // ========== PHASE 1 : Découverte ==========
    info!("📡 Discovering UPnP devices...");
    let cache = Arc::new(MemoryDeviceCache::new());
    let use_cache = scan_options.use_cache;
    let scanner = NetworkScanner::new(scan_options)?.with_cache(cache.clone());
    let devices = scanner.scan(None, None, use_cache).await?;

    info!("✅ {} device(s) discovered", devices.len());
    for device in &devices {
        info!(
            "  - {} ({})",
            device.display_name(),
            device.location_url.as_deref().unwrap_or("no location")
        );
    }
    if use_cache {
        info!("💾 {} endpoint(s) in cache", cache.len());
    }

    // ========== PHASE 2 : Audit ==========
    let hosts: Vec<String> = devices
        .iter()
        .filter_map(|d| d.ip.clone())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();

    info!("🔍 Assessing {} host(s)...", hosts.len());
    let assessments = assess_many(&hosts, &audit_options).await;

    for assessment in &assessments {
        println!("{}\n", generate_report(assessment));
    }

    let dump = serde_json::json!({
        "devices": devices,
        "assessments": assessments,
    });
    println!("{}", serde_json::to_string_pretty(&dump)?);

    Ok(())
}
