use std::fs;
use std::io::Write;
use std::path::Path;

use crate::config::{InstallerConfig, MIN_MEMORY_LIMIT, MIN_UPLOAD_LIMIT, WORK_DIRS};

/// Oldest installer build the provisioned schema is compatible with.
const MIN_SUPPORTED_VERSION: &str = "0.1.0";

/// Result of probing the hosting environment. All failures are collected so
/// the user sees the complete list at once.
#[derive(Debug, Default)]
pub struct RequirementReport {
    pub errors: Vec<String>,
}

impl RequirementReport {
    pub fn passed(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Runtime capabilities the platform depends on, each with its own probe.
/// Probes are cheap and side-effect free.
fn runtime_capabilities() -> Vec<(&'static str, bool)> {
    vec![
        ("MySQL database driver", probe_database_driver()),
        ("Multibyte string handling", probe_multibyte()),
        ("JSON serialization", probe_json()),
        ("HTTP client", probe_http_client()),
        ("TLS support", probe_tls()),
        ("SMTP mail transport", probe_mail_transport()),
        ("File metadata access", probe_file_metadata()),
        ("Gzip compression", probe_compression()),
    ]
}

fn probe_database_driver() -> bool {
    // The driver is linked in; constructing connect options proves the
    // feature made it into the build.
    let _ = sqlx::mysql::MySqlConnectOptions::new();
    true
}

fn probe_multibyte() -> bool {
    let sample = "héllo wörld ü";
    sample.chars().count() == 13 && sample.to_uppercase().contains('Ö')
}

fn probe_json() -> bool {
    serde_json::to_string(&serde_json::json!({"ok": true})).is_ok()
}

fn probe_http_client() -> bool {
    reqwest::Client::builder().build().is_ok()
}

fn probe_tls() -> bool {
    native_tls::TlsConnector::new().is_ok()
}

fn probe_mail_transport() -> bool {
    lettre::Message::builder()
        .from("GameDev Academy <no-reply@localhost>".parse().unwrap())
        .to("probe@localhost".parse().unwrap())
        .subject("probe")
        .body(String::from("probe"))
        .is_ok()
}

fn probe_file_metadata() -> bool {
    fs::metadata(".").is_ok()
}

fn probe_compression() -> bool {
    use flate2::write::GzEncoder;
    use flate2::Compression;

    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(b"probe").is_ok() && encoder.finish().is_ok()
}

/// Parse a human-readable size limit ("128M", "8m", "1G", "512k", "65536").
/// "-1" means unlimited. Returns `None` for unparseable input.
pub fn parse_size_limit(value: &str) -> Option<u64> {
    let v = value.trim();
    if v.is_empty() {
        return None;
    }
    if v == "-1" {
        return Some(u64::MAX);
    }

    let lower = v.to_ascii_lowercase();
    let (digits, multiplier) = if let Some(n) = lower.strip_suffix('g') {
        (n, 1024 * 1024 * 1024)
    } else if let Some(n) = lower.strip_suffix('m') {
        (n, 1024 * 1024)
    } else if let Some(n) = lower.strip_suffix('k') {
        (n, 1024)
    } else {
        (lower.as_str(), 1)
    };

    digits.trim().parse::<u64>().ok().map(|n| n * multiplier)
}

/// Probe a directory for writability, creating it best-effort if missing.
fn check_dir_writable(path: &Path) -> std::result::Result<(), String> {
    if !path.exists() {
        if let Err(e) = fs::create_dir_all(path) {
            return Err(format!("cannot be created: {}", e));
        }
    }

    let probe = path.join(".write_test");
    match fs::write(&probe, b"test") {
        Ok(()) => {
            let _ = fs::remove_file(&probe);
            Ok(())
        }
        Err(e) => Err(format!("is not writable: {}", e)),
    }
}

fn version_at_least(version: &str, minimum: &str) -> bool {
    let parse = |v: &str| -> Vec<u64> {
        v.split('.')
            .map(|p| p.trim().parse().unwrap_or(0))
            .collect()
    };
    parse(version) >= parse(minimum)
}

/// Inspect the hosting environment and report every unmet requirement.
pub fn check_requirements(config: &InstallerConfig) -> RequirementReport {
    let mut report = RequirementReport::default();

    if !version_at_least(&config.version, MIN_SUPPORTED_VERSION) {
        report.errors.push(format!(
            "Installer version {} is older than the minimum supported {}",
            config.version, MIN_SUPPORTED_VERSION
        ));
    }

    for (name, available) in runtime_capabilities() {
        if !available {
            report
                .errors
                .push(format!("Required runtime capability missing: {}", name));
        }
    }

    for dir in WORK_DIRS {
        let path = config.data_dir.join(dir);
        if let Err(reason) = check_dir_writable(&path) {
            report
                .errors
                .push(format!("Directory {} {}", path.display(), reason));
        }
    }

    check_limit(
        &mut report,
        "Memory limit",
        &config.memory_limit,
        MIN_MEMORY_LIMIT,
    );
    check_limit(
        &mut report,
        "Upload size limit",
        &config.upload_limit,
        MIN_UPLOAD_LIMIT,
    );

    report
}

fn check_limit(report: &mut RequirementReport, label: &str, value: &str, minimum: u64) {
    match parse_size_limit(value) {
        Some(actual) if actual >= minimum => {}
        Some(actual) => report.errors.push(format!(
            "{} too low: {} bytes required, {} bytes configured ({})",
            label, minimum, actual, value
        )),
        None => report.errors.push(format!(
            "{} is not a recognized size value: {}",
            label, value
        )),
    }
}
