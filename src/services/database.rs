use std::collections::BTreeSet;
use std::time::Duration;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use sqlx::mysql::{MySqlConnectOptions, MySqlPool, MySqlPoolOptions};
use sqlx::Row;

/// Privileges the schema provisioner needs. Anything missing is surfaced as a
/// warning, never a hard failure.
pub const REQUIRED_PRIVILEGES: &[&str] = &["SELECT", "INSERT", "UPDATE", "DELETE", "CREATE"];

/// Validated connection parameters accumulated in step 2. Held in the session
/// only; written to durable storage by the Configuration Finalizer.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub host: String,
    pub port: u16,
    pub name: String,
    pub user: String,
    pub password: String,
    pub charset: String,
    pub prefix: String,
}

/// Raw step-2 form fields, validated before any component sees them.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DatabaseForm {
    pub host: String,
    pub port: String,
    pub name: String,
    pub user: String,
    pub password: String,
    pub prefix: String,
}

static DB_NAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("valid regex"));
static PREFIX_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9_]*$").expect("valid regex"));

/// Validate the raw form, applying defaults. All problems are collected.
pub fn validate_form(form: &DatabaseForm) -> std::result::Result<DatabaseConfig, Vec<String>> {
    let mut errors = Vec::new();

    let host = if form.host.trim().is_empty() {
        "localhost".to_string()
    } else {
        form.host.trim().to_string()
    };

    let port = if form.port.trim().is_empty() {
        3306
    } else {
        match form.port.trim().parse::<u32>() {
            Ok(p) => p.clamp(1, 65535) as u16,
            Err(_) => {
                errors.push("Database port must be a number".to_string());
                3306
            }
        }
    };

    let name = form.name.trim().to_string();
    if name.is_empty() {
        errors.push("Database name is required".to_string());
    } else if name.len() > 64 || !DB_NAME_RE.is_match(&name) {
        errors.push(
            "Database name must start with a letter or underscore and contain only letters, numbers, and underscores"
                .to_string(),
        );
    }

    let user = form.user.trim().to_string();
    if user.is_empty() {
        errors.push("Database user is required".to_string());
    }

    let prefix = if form.prefix.trim().is_empty() {
        "gda_".to_string()
    } else {
        form.prefix.trim().to_string()
    };
    if !PREFIX_RE.is_match(&prefix) {
        errors.push(
            "Table prefix may only contain letters, numbers, and underscores".to_string(),
        );
    }

    if !errors.is_empty() {
        return Err(errors);
    }

    Ok(DatabaseConfig {
        host,
        port,
        name,
        user,
        password: form.password.clone(),
        charset: "utf8mb4".to_string(),
        prefix,
    })
}

/// Recognized connection-failure causes, mapped to user-facing messages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectFailure {
    AuthRejected,
    Unreachable,
    Unresolvable,
    Other { code: String, detail: String },
}

impl ConnectFailure {
    /// The user-facing message. Never contains the password.
    pub fn message(&self, host: &str, port: u16) -> String {
        match self {
            ConnectFailure::AuthRejected => {
                "Access denied: the database server rejected the supplied username or password"
                    .to_string()
            }
            ConnectFailure::Unreachable => {
                format!("Could not reach the database server at {}:{}", host, port)
            }
            ConnectFailure::Unresolvable => {
                format!("Database host '{}' could not be resolved", host)
            }
            ConnectFailure::Other { code, detail } => {
                format!("Database connection failed (code {}): {}", code, detail)
            }
        }
    }
}

/// Map the driver's error onto a recognized cause.
fn classify(
    mysql_errno: Option<u32>,
    io: Option<(std::io::ErrorKind, &str)>,
    fallback: &str,
) -> ConnectFailure {
    if let Some(code) = mysql_errno {
        return match code {
            1044 | 1045 => ConnectFailure::AuthRejected,
            other => ConnectFailure::Other {
                code: other.to_string(),
                detail: fallback.to_string(),
            },
        };
    }

    if let Some((kind, message)) = io {
        let lowered = message.to_ascii_lowercase();
        if lowered.contains("lookup") || lowered.contains("resolve") {
            return ConnectFailure::Unresolvable;
        }
        return match kind {
            std::io::ErrorKind::ConnectionRefused | std::io::ErrorKind::TimedOut => {
                ConnectFailure::Unreachable
            }
            std::io::ErrorKind::NotFound => ConnectFailure::Unresolvable,
            _ => ConnectFailure::Unreachable,
        };
    }

    ConnectFailure::Other {
        code: "unknown".to_string(),
        detail: fallback.to_string(),
    }
}

fn classify_sqlx(err: &sqlx::Error) -> ConnectFailure {
    match err {
        sqlx::Error::Database(db) => {
            let errno = db
                .try_downcast_ref::<sqlx::mysql::MySqlDatabaseError>()
                .map(|e| u32::from(e.number()));
            classify(errno, None, db.message())
        }
        sqlx::Error::Io(io) => classify(None, Some((io.kind(), &io.to_string())), "io error"),
        other => classify(None, None, &other.to_string()),
    }
}

/// Whether the target database pre-existed or had to be created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DatabaseState {
    Existing,
    Created,
    CreateFailed,
}

/// Effective privileges of the connecting credential, parsed from its grants.
#[derive(Debug, Clone, Default)]
pub struct PrivilegeReport {
    pub all_privileges: bool,
    pub granted: BTreeSet<String>,
}

impl PrivilegeReport {
    /// Required privileges the credential lacks, in declaration order.
    pub fn missing(&self) -> Vec<&'static str> {
        if self.all_privileges {
            return Vec::new();
        }
        REQUIRED_PRIVILEGES
            .iter()
            .filter(|p| !self.granted.contains(**p))
            .copied()
            .collect()
    }
}

static GRANT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^GRANT\s+(.+?)\s+ON\s").expect("valid regex"));

/// Parse `SHOW GRANTS` output into a privilege report.
pub fn parse_grants<S: AsRef<str>>(grants: &[S]) -> PrivilegeReport {
    let mut report = PrivilegeReport::default();

    for grant in grants {
        let Some(caps) = GRANT_RE.captures(grant.as_ref()) else {
            continue;
        };
        let list = caps[1].to_ascii_uppercase();

        if list.contains("ALL PRIVILEGES") || list.trim() == "ALL" {
            report.all_privileges = true;
            continue;
        }

        for token in list.split(',') {
            // Column-level grants look like "SELECT (`col`)"; keep the verb.
            let privilege = token
                .split('(')
                .next()
                .unwrap_or("")
                .trim()
                .to_string();
            if !privilege.is_empty() {
                report.granted.insert(privilege);
            }
        }
    }

    report
}

/// Outcome of a step-2 connection test.
#[derive(Debug, Clone, Serialize)]
pub struct ConnectionTest {
    pub success: bool,
    pub message: String,
    pub server_info: Option<String>,
    pub database_state: Option<DatabaseState>,
    pub privileges: Vec<String>,
    pub warning: Option<String>,
}

impl ConnectionTest {
    fn failure(message: String) -> Self {
        Self {
            success: false,
            message,
            server_info: None,
            database_state: None,
            privileges: Vec::new(),
            warning: None,
        }
    }
}

fn server_options(config: &DatabaseConfig) -> MySqlConnectOptions {
    // Deliberately no database: the target may not exist yet.
    MySqlConnectOptions::new()
        .host(&config.host)
        .port(config.port)
        .username(&config.user)
        .password(&config.password)
}

/// Test connectivity, ensure the target database exists, and enumerate
/// privileges. On success returns a pool bound to the target database for the
/// provisioning steps.
pub async fn test_connection(
    config: &DatabaseConfig,
) -> (ConnectionTest, Option<MySqlPool>) {
    let server_pool = match MySqlPoolOptions::new()
        .max_connections(2)
        .acquire_timeout(Duration::from_secs(10))
        .connect_with(server_options(config))
        .await
    {
        Ok(pool) => pool,
        Err(e) => {
            let failure = classify_sqlx(&e);
            tracing::warn!("Connection test failed: {}", e);
            return (
                ConnectionTest::failure(failure.message(&config.host, config.port)),
                None,
            );
        }
    };

    let server_info = sqlx::query("SELECT VERSION()")
        .fetch_one(&server_pool)
        .await
        .ok()
        .and_then(|row| row.try_get::<String, _>(0).ok());

    let exists = match sqlx::query(
        "SELECT SCHEMA_NAME FROM information_schema.SCHEMATA WHERE SCHEMA_NAME = ?",
    )
    .bind(&config.name)
    .fetch_optional(&server_pool)
    .await
    {
        Ok(row) => row.is_some(),
        Err(e) => {
            return (
                ConnectionTest::failure(format!(
                    "Could not inspect existing databases: {}",
                    e
                )),
                None,
            );
        }
    };

    let mut warnings = Vec::new();
    let database_state = if exists {
        DatabaseState::Existing
    } else {
        // Name is pattern-validated, so identifier interpolation is safe.
        let create = format!(
            "CREATE DATABASE IF NOT EXISTS `{}` CHARACTER SET utf8mb4 COLLATE utf8mb4_unicode_ci",
            config.name
        );
        match sqlx::query(&create).execute(&server_pool).await {
            Ok(_) => DatabaseState::Created,
            Err(e) => {
                warnings.push(format!(
                    "Database '{}' does not exist and could not be created: {}. Create it manually before provisioning.",
                    config.name, e
                ));
                DatabaseState::CreateFailed
            }
        }
    };

    let privilege_report = match sqlx::query("SHOW GRANTS FOR CURRENT_USER()")
        .fetch_all(&server_pool)
        .await
    {
        Ok(rows) => {
            let grants: Vec<String> = rows
                .iter()
                .filter_map(|row| row.try_get::<String, _>(0).ok())
                .collect();
            parse_grants(&grants)
        }
        Err(e) => {
            warnings.push(format!("Could not enumerate privileges: {}", e));
            PrivilegeReport {
                all_privileges: true,
                granted: BTreeSet::new(),
            }
        }
    };

    let missing = privilege_report.missing();
    if !missing.is_empty() {
        warnings.push(format!(
            "The database user is missing privileges: {}. Installation can proceed but may fail later.",
            missing.join(", ")
        ));
    }

    // Bind a pool to the target database for the provisioning steps.
    let db_pool = if database_state != DatabaseState::CreateFailed {
        MySqlPoolOptions::new()
            .max_connections(4)
            .acquire_timeout(Duration::from_secs(10))
            .connect_with(server_options(config).database(&config.name))
            .await
            .ok()
    } else {
        None
    };

    let privileges = if privilege_report.all_privileges {
        vec!["ALL PRIVILEGES".to_string()]
    } else {
        privilege_report.granted.iter().cloned().collect()
    };

    let test = ConnectionTest {
        success: true,
        message: format!(
            "Connected to {}:{} successfully",
            config.host, config.port
        ),
        server_info,
        database_state: Some(database_state),
        privileges,
        warning: if warnings.is_empty() {
            None
        } else {
            Some(warnings.join(" "))
        },
    };

    (test, db_pool)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn form(host: &str, port: &str, name: &str, user: &str) -> DatabaseForm {
        DatabaseForm {
            host: host.to_string(),
            port: port.to_string(),
            name: name.to_string(),
            user: user.to_string(),
            password: "hunter2secret".to_string(),
            prefix: String::new(),
        }
    }

    #[test]
    fn test_validate_applies_defaults() {
        let config = validate_form(&form("", "", "academy", "root")).unwrap();
        assert_eq!(config.host, "localhost");
        assert_eq!(config.port, 3306);
        assert_eq!(config.prefix, "gda_");
        assert_eq!(config.charset, "utf8mb4");
    }

    #[test]
    fn test_validate_clamps_port() {
        let config = validate_form(&form("db", "70000", "academy", "root")).unwrap();
        assert_eq!(config.port, 65535);

        let config = validate_form(&form("db", "0", "academy", "root")).unwrap();
        assert_eq!(config.port, 1);
    }

    #[test]
    fn test_validate_collects_all_errors() {
        let errors = validate_form(&form("db", "abc", "", "")).unwrap_err();
        assert_eq!(errors.len(), 3, "{:?}", errors);
    }

    #[test]
    fn test_validate_rejects_bad_identifiers() {
        assert!(validate_form(&form("db", "", "my-db", "root")).is_err());
        assert!(validate_form(&form("db", "", "1starts_with_digit", "root")).is_err());

        let mut f = form("db", "", "academy", "root");
        f.prefix = "bad-prefix!".to_string();
        assert!(validate_form(&f).is_err());
    }

    #[test]
    fn test_classify_auth_rejected() {
        assert_eq!(classify(Some(1045), None, "denied"), ConnectFailure::AuthRejected);
        assert_eq!(classify(Some(1044), None, "denied"), ConnectFailure::AuthRejected);
    }

    #[test]
    fn test_classify_unreachable_and_unresolvable() {
        assert_eq!(
            classify(
                None,
                Some((std::io::ErrorKind::ConnectionRefused, "refused")),
                ""
            ),
            ConnectFailure::Unreachable
        );
        assert_eq!(
            classify(
                None,
                Some((
                    std::io::ErrorKind::Other,
                    "failed to lookup address information"
                )),
                ""
            ),
            ConnectFailure::Unresolvable
        );
    }

    #[test]
    fn test_classify_generic_keeps_code() {
        let failure = classify(Some(1130), None, "host not allowed");
        match failure {
            ConnectFailure::Other { code, detail } => {
                assert_eq!(code, "1130");
                assert_eq!(detail, "host not allowed");
            }
            other => panic!("unexpected classification: {:?}", other),
        }
    }

    #[test]
    fn test_failure_messages_never_include_password() {
        let password = "hunter2secret";
        for failure in [
            ConnectFailure::AuthRejected,
            ConnectFailure::Unreachable,
            ConnectFailure::Unresolvable,
            ConnectFailure::Other {
                code: "2013".to_string(),
                detail: "lost connection".to_string(),
            },
        ] {
            assert!(!failure.message("dbhost", 3306).contains(password));
        }
    }

    #[test]
    fn test_parse_grants_all_privileges() {
        let grants = ["GRANT ALL PRIVILEGES ON *.* TO `root`@`%` WITH GRANT OPTION"];
        let report = parse_grants(&grants);
        assert!(report.all_privileges);
        assert!(report.missing().is_empty());
    }

    #[test]
    fn test_parse_grants_exact_required_set_has_no_missing() {
        let grants = ["GRANT SELECT, INSERT, UPDATE, DELETE, CREATE ON `academy`.* TO `app`@`%`"];
        let report = parse_grants(&grants);
        assert!(!report.all_privileges);
        assert!(report.missing().is_empty());
    }

    #[test]
    fn test_parse_grants_reports_missing_in_order() {
        let grants = ["GRANT SELECT, INSERT ON `academy`.* TO `app`@`%`"];
        let report = parse_grants(&grants);
        assert_eq!(report.missing(), vec!["UPDATE", "DELETE", "CREATE"]);
    }

    #[test]
    fn test_parse_grants_handles_column_level_and_case() {
        let grants = [
            "grant select (`id`), update on `academy`.`users` to `app`@`%`",
            "GRANT USAGE ON *.* TO `app`@`%`",
        ];
        let report = parse_grants(&grants);
        assert!(report.granted.contains("SELECT"));
        assert!(report.granted.contains("UPDATE"));
        assert!(report.granted.contains("USAGE"));
        assert_eq!(report.missing(), vec!["INSERT", "DELETE", "CREATE"]);
    }

    #[test]
    fn test_parse_grants_ignores_unparseable_rows() {
        let grants = ["not a grant statement"];
        let report = parse_grants(&grants);
        assert!(!report.all_privileges);
        assert!(report.granted.is_empty());
        assert_eq!(report.missing().len(), REQUIRED_PRIVILEGES.len());
    }
}
