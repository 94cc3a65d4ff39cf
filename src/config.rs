use std::env;
use std::path::PathBuf;

/// Working directories created under the data dir. The Requirement Prober
/// checks these for writability and the Configuration Finalizer marks each
/// one non-browsable.
pub const WORK_DIRS: &[&str] = &[
    "uploads/courses",
    "uploads/avatars",
    "uploads/news",
    "cache",
    "logs",
    "sessions",
    "backups",
];

/// Minimum memory limit accepted by the Requirement Prober (64 MiB).
pub const MIN_MEMORY_LIMIT: u64 = 64 * 1024 * 1024;

/// Minimum upload size limit accepted by the Requirement Prober (8 MiB).
pub const MIN_UPLOAD_LIMIT: u64 = 8 * 1024 * 1024;

/// Argon2 cost parameters for password hashing. Tunable via environment so
/// deployments can raise them without a rebuild.
#[derive(Debug, Clone, Copy)]
pub struct HashingCosts {
    pub time_cost: u32,
    pub memory_cost_kib: u32,
    pub parallelism: u32,
}

/// Installer configuration loaded from environment variables.
///
/// Built once in `main` and carried through `AppState`; components never
/// reach for ambient globals.
#[derive(Debug, Clone)]
pub struct InstallerConfig {
    // Server
    pub host: String,
    pub port: u16,

    // Filesystem layout
    pub data_dir: PathBuf,
    pub config_dir: PathBuf,
    pub public_dir: PathBuf,
    pub env_file: PathBuf,

    // Environment limits, human-readable ("128M", "1G")
    pub memory_limit: String,
    pub upload_limit: String,

    // Password hashing costs
    pub hashing: HashingCosts,

    // Site defaults echoed into the step-3 form
    pub default_site_name: String,
    pub default_site_url: String,

    // Build info
    pub version: String,
}

impl InstallerConfig {
    pub fn from_env() -> Self {
        Self {
            host: env::var("ACADEMY_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: env::var("ACADEMY_PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(8080),

            data_dir: PathBuf::from(
                env::var("ACADEMY_DATA_DIR").unwrap_or_else(|_| "data".to_string()),
            ),
            config_dir: PathBuf::from(
                env::var("ACADEMY_CONFIG_DIR").unwrap_or_else(|_| "config".to_string()),
            ),
            public_dir: PathBuf::from(
                env::var("ACADEMY_PUBLIC_DIR").unwrap_or_else(|_| "public".to_string()),
            ),
            env_file: PathBuf::from(
                env::var("ACADEMY_ENV_FILE").unwrap_or_else(|_| ".env".to_string()),
            ),

            memory_limit: env::var("ACADEMY_MEMORY_LIMIT").unwrap_or_else(|_| "128M".to_string()),
            upload_limit: env::var("ACADEMY_UPLOAD_LIMIT").unwrap_or_else(|_| "32M".to_string()),

            hashing: HashingCosts {
                time_cost: env::var("ACADEMY_ARGON2_TIME")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(3),
                memory_cost_kib: env::var("ACADEMY_ARGON2_MEMORY_KIB")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(65536),
                parallelism: env::var("ACADEMY_ARGON2_PARALLELISM")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(1),
            },

            default_site_name: env::var("ACADEMY_SITE_NAME")
                .unwrap_or_else(|_| "GameDev Academy".to_string()),
            default_site_url: env::var("ACADEMY_SITE_URL")
                .unwrap_or_else(|_| "http://localhost:8080".to_string()),

            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    /// The presence-only sentinel whose existence gates every installer route.
    pub fn installed_marker_path(&self) -> PathBuf {
        self.data_dir.join("installed.lock")
    }

    pub fn env_file_path(&self) -> PathBuf {
        self.env_file.clone()
    }

    pub fn database_config_path(&self) -> PathBuf {
        self.config_dir.join("database.toml")
    }
}
