use std::fs;
use std::io;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::config::{InstallerConfig, WORK_DIRS};
use crate::services::database::DatabaseConfig;
use crate::services::security;

/// Site-level settings collected in step 3.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SiteConfig {
    pub site_name: String,
    pub site_url: String,
    pub environment: String,
    pub debug: bool,
}

/// Raw step-3 form fields.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SiteForm {
    pub site_name: String,
    pub site_url: String,
    pub environment: String,
    pub debug: Option<String>,
}

/// Validate the step-3 form. All problems are collected.
pub fn validate_site_form(form: &SiteForm) -> std::result::Result<SiteConfig, Vec<String>> {
    let mut errors = Vec::new();

    let site_name = form.site_name.trim().to_string();
    if site_name.chars().count() < 2 {
        errors.push("Site name must be at least 2 characters".to_string());
    }

    let site_url = form.site_url.trim().trim_end_matches('/').to_string();
    if !(site_url.starts_with("http://") || site_url.starts_with("https://")) {
        errors.push("Site URL must start with http:// or https://".to_string());
    }

    let environment = match form.environment.trim() {
        "" => "production".to_string(),
        env @ ("production" | "development") => env.to_string(),
        _ => {
            errors.push("Environment must be 'production' or 'development'".to_string());
            "production".to_string()
        }
    };

    if !errors.is_empty() {
        return Err(errors);
    }

    Ok(SiteConfig {
        site_name,
        site_url,
        environment,
        debug: matches!(form.debug.as_deref(), Some("on") | Some("true") | Some("1")),
    })
}

/// Persisted connection artifact, serialized as TOML.
#[derive(Debug, Serialize)]
struct DatabaseArtifact<'a> {
    database: DatabaseSection<'a>,
}

#[derive(Debug, Serialize)]
struct DatabaseSection<'a> {
    host: &'a str,
    port: u16,
    name: &'a str,
    user: &'a str,
    password: &'a str,
    charset: &'a str,
    prefix: &'a str,
    options: ClientOptions,
}

#[derive(Debug, Serialize)]
struct ClientOptions {
    connect_timeout_secs: u64,
    pool_max_connections: u32,
    ssl: bool,
}

#[derive(Debug, Default)]
pub struct FinalizeReport {
    pub success: bool,
    pub errors: Vec<String>,
}

/// Write a file readable and writable by the owner only.
fn write_restricted(path: &Path, content: &str) -> io::Result<()> {
    fs::write(path, content)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(0o600))?;
    }
    Ok(())
}

const HTACCESS_POLICY: &str = r#"# Generated by the GameDev Academy installer
Options -Indexes

# Deny dotfiles and sensitive extensions
<FilesMatch "^\.|\.(env|sql|log|lock|ya?ml|toml)$">
    Require all denied
</FilesMatch>

# Suppress technology disclosure
<IfModule mod_headers.c>
    Header unset X-Powered-By
    Header unset Server
</IfModule>
"#;

const DENY_ALL_POLICY: &str = "Require all denied\n";

const ROBOTS_POLICY: &str = "User-agent: *\nDisallow: /admin\nDisallow: /config\nDisallow: /install\n";

/// Write every configuration artifact and, strictly last, the installed
/// marker. Any earlier failure aborts with no marker written, so an
/// interrupted finalization leaves the system un-installed.
pub fn finalize(
    config: &InstallerConfig,
    db: &DatabaseConfig,
    site: &SiteConfig,
) -> FinalizeReport {
    match try_finalize(config, db, site) {
        Ok(()) => FinalizeReport {
            success: true,
            errors: Vec::new(),
        },
        Err(e) => FinalizeReport {
            success: false,
            errors: vec![format!("Finalization failed: {}", e)],
        },
    }
}

fn try_finalize(
    config: &InstallerConfig,
    db: &DatabaseConfig,
    site: &SiteConfig,
) -> io::Result<()> {
    fs::create_dir_all(&config.config_dir)?;
    fs::create_dir_all(&config.public_dir)?;
    fs::create_dir_all(&config.data_dir)?;

    let app_key = security::generate_secret_key();
    let session_secret = security::generate_secret_key();

    // Connection artifact with client-option block
    let artifact = DatabaseArtifact {
        database: DatabaseSection {
            host: &db.host,
            port: db.port,
            name: &db.name,
            user: &db.user,
            password: &db.password,
            charset: &db.charset,
            prefix: &db.prefix,
            options: ClientOptions {
                connect_timeout_secs: 10,
                pool_max_connections: 10,
                ssl: false,
            },
        },
    };
    let rendered = toml::to_string_pretty(&artifact)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    write_restricted(&config.database_config_path(), &rendered)?;

    // Flat environment artifact
    let env_content = format!(
        "APP_NAME={}\nAPP_URL={}\nAPP_ENV={}\nAPP_DEBUG={}\nAPP_KEY={}\nSESSION_SECRET={}\nDB_HOST={}\nDB_PORT={}\nDB_NAME={}\nDB_USER={}\nDB_PASSWORD={}\nDB_PREFIX={}\n",
        site.site_name,
        site.site_url,
        site.environment,
        site.debug,
        app_key,
        session_secret,
        db.host,
        db.port,
        db.name,
        db.user,
        db.password,
        db.prefix,
    );
    write_restricted(&config.env_file_path(), &env_content)?;

    // Access-control and crawler policies
    fs::write(config.public_dir.join(".htaccess"), HTACCESS_POLICY)?;
    fs::write(config.public_dir.join("robots.txt"), ROBOTS_POLICY)?;
    fs::write(config.config_dir.join(".htaccess"), DENY_ALL_POLICY)?;
    fs::write(config.data_dir.join(".htaccess"), DENY_ALL_POLICY)?;

    // Working directories, each non-browsable
    for dir in WORK_DIRS {
        let path = config.data_dir.join(dir);
        fs::create_dir_all(&path)?;
        fs::write(path.join("index.html"), "")?;
    }

    // The marker is the last write; everything above must already be on disk.
    let marker = format!("installed_at={}\n", chrono::Utc::now().to_rfc3339());
    fs::write(config.installed_marker_path(), marker)?;

    tracing::info!("Installation finalized; marker written");
    Ok(())
}
