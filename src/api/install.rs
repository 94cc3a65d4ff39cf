use axum::{
    extract::{Query, State},
    response::{Html, IntoResponse, Redirect, Response},
    routing::{get, post},
    Form, Json, Router,
};
use axum_extra::extract::cookie::{Cookie, CookieJar};
use serde::Deserialize;
use sqlx::mysql::{MySqlConnectOptions, MySqlPool, MySqlPoolOptions};

use crate::error::{AppError, Result};
use crate::session::{InstallSession, SESSION_COOKIE};
use crate::services::admin::{self, AdminAccountDraft};
use crate::services::database::{self, DatabaseConfig, DatabaseForm};
use crate::services::finalize::{self, SiteForm};
use crate::services::requirements;
use crate::services::schema;
use crate::state::AppState;

pub fn install_routes(state: AppState) -> Router {
    Router::new()
        .route("/", get(show_step).post(submit_step))
        .route("/api/status", get(setup_status))
        .route("/api/create-tables", post(create_tables))
        .with_state(state)
}

#[derive(Debug, Deserialize)]
struct StepQuery {
    step: Option<u8>,
}

/// Umbrella form covering every step's fields. Typed per-step structs are
/// built from it before any component runs.
#[derive(Debug, Default, Deserialize)]
struct WizardForm {
    #[serde(default)]
    db_host: String,
    #[serde(default)]
    db_port: String,
    #[serde(default)]
    db_name: String,
    #[serde(default)]
    db_user: String,
    #[serde(default)]
    db_pass: String,
    #[serde(default)]
    db_prefix: String,

    #[serde(default)]
    site_name: String,
    #[serde(default)]
    site_url: String,
    #[serde(default)]
    environment: String,
    #[serde(default)]
    debug: Option<String>,

    #[serde(default)]
    admin_name: String,
    #[serde(default)]
    admin_username: String,
    #[serde(default)]
    admin_email: String,
    #[serde(default)]
    admin_password: String,
    #[serde(default)]
    admin_password_confirm: String,
}

impl WizardForm {
    fn database_form(&self) -> DatabaseForm {
        DatabaseForm {
            host: self.db_host.clone(),
            port: self.db_port.clone(),
            name: self.db_name.clone(),
            user: self.db_user.clone(),
            password: self.db_pass.clone(),
            prefix: self.db_prefix.clone(),
        }
    }

    fn site_form(&self) -> SiteForm {
        SiteForm {
            site_name: self.site_name.clone(),
            site_url: self.site_url.clone(),
            environment: self.environment.clone(),
            debug: self.debug.clone(),
        }
    }

    fn admin_draft(&self) -> AdminAccountDraft {
        AdminAccountDraft {
            full_name: self.admin_name.clone(),
            username: self.admin_username.clone(),
            email: self.admin_email.clone(),
            password: self.admin_password.clone(),
            password_confirm: self.admin_password_confirm.clone(),
        }
    }
}

fn installed(state: &AppState) -> bool {
    state.config.installed_marker_path().exists()
}

/// Find or create the wizard session for this browser.
async fn load_session(state: &AppState, jar: CookieJar) -> (CookieJar, String, InstallSession) {
    if let Some(cookie) = jar.get(SESSION_COOKIE) {
        let id = cookie.value().to_string();
        if let Some(session) = state.sessions.get(&id).await {
            return (jar, id, session);
        }
    }

    let id = state.sessions.create().await;
    let session = state.sessions.get(&id).await.unwrap_or_default();
    let cookie = Cookie::build((SESSION_COOKIE, id.clone()))
        .path("/")
        .http_only(true)
        .build();
    (jar.add(cookie), id, session)
}

/// `GET /install?step=N` — render a step. Requests past the session's
/// progress are clamped back; a completed installation redirects away.
async fn show_step(
    State(state): State<AppState>,
    Query(query): Query<StepQuery>,
    jar: CookieJar,
) -> Response {
    if installed(&state) {
        return Redirect::to("/").into_response();
    }

    let (jar, id, mut session) = load_session(&state, jar).await;
    let step = session.resolve_step(query.step);
    let (mut errors, warnings) = session.take_messages();

    let body = match step {
        1 => {
            // Live preview of the current environment status.
            let report = requirements::check_requirements(&state.config);
            page_step1(&report.errors, &errors, &warnings)
        }
        2 => page_step2(&echo_database(&session), &errors, &warnings),
        3 => page_step3(&echo_site(&state, &session), &errors, &warnings),
        4 => page_step4(&AdminAccountDraft::default(), &errors, &warnings),
        _ => {
            errors.push("Installation is not finished yet".to_string());
            page_step4(&AdminAccountDraft::default(), &errors, &warnings)
        }
    };

    state.sessions.save(&id, session).await;
    (jar, Html(body)).into_response()
}

/// `POST /install?step=N` — run a step's component. Zero errors advances the
/// wizard; otherwise the same step is re-rendered with submitted values
/// echoed back.
async fn submit_step(
    State(state): State<AppState>,
    Query(query): Query<StepQuery>,
    jar: CookieJar,
    Form(form): Form<WizardForm>,
) -> Response {
    if installed(&state) {
        return Redirect::to("/").into_response();
    }

    let (jar, id, mut session) = load_session(&state, jar).await;
    let step = session.resolve_step(query.step);

    match step {
        1 => {
            let report = requirements::check_requirements(&state.config);
            if report.passed() {
                session.requirements_passed = true;
                session.advance_from(1);
                state.sessions.save(&id, session).await;
                (jar, Redirect::to("/install?step=2")).into_response()
            } else {
                state.sessions.save(&id, session).await;
                (jar, Html(page_step1(&report.errors, &[], &[]))).into_response()
            }
        }
        2 => submit_database(state, jar, id, session, form).await,
        3 => {
            match finalize::validate_site_form(&form.site_form()) {
                Ok(site) => {
                    session.config.put_site(site);
                    session.advance_from(3);
                    state.sessions.save(&id, session).await;
                    (jar, Redirect::to("/install?step=4")).into_response()
                }
                Err(errors) => {
                    state.sessions.save(&id, session).await;
                    (jar, Html(page_step3(&form.site_form(), &errors, &[]))).into_response()
                }
            }
        }
        4 => submit_install(state, jar, id, session, form).await,
        _ => (jar, Redirect::to("/install")).into_response(),
    }
}

async fn submit_database(
    state: AppState,
    jar: CookieJar,
    id: String,
    mut session: InstallSession,
    form: WizardForm,
) -> Response {
    if !session.requirements_passed {
        state.sessions.save(&id, session).await;
        return (jar, Redirect::to("/install?step=1")).into_response();
    }

    let db_form = form.database_form();
    let config = match database::validate_form(&db_form) {
        Ok(config) => config,
        Err(errors) => {
            state.sessions.save(&id, session).await;
            return (jar, Html(page_step2(&db_form, &errors, &[]))).into_response();
        }
    };

    let (test, pool) = database::test_connection(&config).await;
    if !test.success {
        state.sessions.save(&id, session).await;
        return (jar, Html(page_step2(&db_form, &[test.message], &[]))).into_response();
    }

    if let Some(pool) = pool {
        *state.db.write().await = Some(pool);
    }

    if let Some(warning) = test.warning {
        session.warnings.push(warning);
    }
    session.config.put_database(config);
    session.db_connection_tested = true;
    session.advance_from(2);
    state.sessions.save(&id, session).await;
    (jar, Redirect::to("/install?step=3")).into_response()
}

/// Step 4: provision schema, create the admin account, then finalize.
/// Provisioning is idempotent, so a failure after it is retried by simply
/// resubmitting this step.
async fn submit_install(
    state: AppState,
    jar: CookieJar,
    id: String,
    mut session: InstallSession,
    form: WizardForm,
) -> Response {
    let draft = form.admin_draft();

    let validation_errors = admin::validate_draft(&draft);
    if !validation_errors.is_empty() {
        state.sessions.save(&id, session).await;
        return (jar, Html(page_step4(&draft, &validation_errors, &[]))).into_response();
    }

    if !session.db_connection_tested {
        let errors =
            vec!["The database connection has not been tested; complete step 2 first".to_string()];
        state.sessions.save(&id, session).await;
        return (jar, Html(page_step4(&draft, &errors, &[]))).into_response();
    }
    let Some(db_config) = session.config.database.clone() else {
        let errors = vec!["Database settings are missing; return to step 2".to_string()];
        state.sessions.save(&id, session).await;
        return (jar, Html(page_step4(&draft, &errors, &[]))).into_response();
    };
    let Some(site_config) = session.config.site.clone() else {
        let errors = vec!["Site settings are missing; return to step 3".to_string()];
        state.sessions.save(&id, session).await;
        return (jar, Html(page_step4(&draft, &errors, &[]))).into_response();
    };

    let Some(pool) = acquire_pool(&state, &db_config).await else {
        let errors =
            vec!["The database connection was lost; return to step 2 and test it again".to_string()];
        state.sessions.save(&id, session).await;
        return (jar, Html(page_step4(&draft, &errors, &[]))).into_response();
    };

    let provision = schema::provision_schema(&pool, &db_config.prefix).await;
    if !provision.success {
        state.sessions.save(&id, session).await;
        return (jar, Html(page_step4(&draft, &provision.errors, &provision.warnings)))
            .into_response();
    }

    let created = admin::create_admin(&pool, &db_config.prefix, &draft, &state.config.hashing).await;
    if !created.success {
        // Tables stay in place; resubmitting re-runs the idempotent DDL.
        state.sessions.save(&id, session).await;
        return (jar, Html(page_step4(&draft, &created.errors, &[]))).into_response();
    }

    let finalized = finalize::finalize(&state.config, &db_config, &site_config);
    if !finalized.success {
        state.sessions.save(&id, session).await;
        return (jar, Html(page_step4(&draft, &finalized.errors, &[]))).into_response();
    }

    session.advance_from(4);
    state.sessions.remove(&id).await;
    (jar, Html(page_step5(&site_config.site_url))).into_response()
}

/// Reuse the pool parked by step 2, or reconnect from the session's config.
async fn acquire_pool(state: &AppState, db: &DatabaseConfig) -> Option<MySqlPool> {
    if let Some(pool) = state.db.read().await.clone() {
        return Some(pool);
    }

    let options = MySqlConnectOptions::new()
        .host(&db.host)
        .port(db.port)
        .username(&db.user)
        .password(&db.password)
        .database(&db.name);
    let pool = MySqlPoolOptions::new()
        .max_connections(4)
        .connect_with(options)
        .await
        .ok()?;
    *state.db.write().await = Some(pool.clone());
    Some(pool)
}

/// `GET /install/api/status` — whether installation is still required.
async fn setup_status(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "setup_required": !installed(&state),
    }))
}

/// `POST /install/api/create-tables` — AJAX variant of schema provisioning.
async fn create_tables(
    State(state): State<AppState>,
    jar: CookieJar,
) -> Result<Json<serde_json::Value>> {
    if installed(&state) {
        return Err(AppError::Forbidden(
            "Installation has already been completed".to_string(),
        ));
    }

    let (_, _, session) = load_session(&state, jar).await;
    let prefix = session
        .config
        .database
        .as_ref()
        .map(|db| db.prefix.clone())
        .unwrap_or_else(|| "gda_".to_string());

    let Some(pool) = state.db.read().await.clone() else {
        return Ok(Json(serde_json::json!({
            "success": false,
            "message": "No tested database connection; complete step 2 first",
            "tables_created": 0,
            "data_inserted": 0,
            "errors": ["No tested database connection"],
        })));
    };

    let report = schema::provision_schema(&pool, &prefix).await;
    Ok(Json(serde_json::json!({
        "success": report.success,
        "message": if report.success {
            "Database tables created".to_string()
        } else {
            "Schema provisioning failed".to_string()
        },
        "tables_created": report.tables_created,
        "data_inserted": report.data_inserted,
        "errors": report.errors,
    })))
}

// ---------------------------------------------------------------------------
// Rendering
// ---------------------------------------------------------------------------

fn echo_database(session: &InstallSession) -> DatabaseForm {
    match &session.config.database {
        Some(db) => DatabaseForm {
            host: db.host.clone(),
            port: db.port.to_string(),
            name: db.name.clone(),
            user: db.user.clone(),
            password: String::new(),
            prefix: db.prefix.clone(),
        },
        None => DatabaseForm::default(),
    }
}

fn echo_site(state: &AppState, session: &InstallSession) -> SiteForm {
    match &session.config.site {
        Some(site) => SiteForm {
            site_name: site.site_name.clone(),
            site_url: site.site_url.clone(),
            environment: site.environment.clone(),
            debug: if site.debug {
                Some("on".to_string())
            } else {
                None
            },
        },
        None => SiteForm {
            site_name: state.config.default_site_name.clone(),
            site_url: state.config.default_site_url.clone(),
            environment: "production".to_string(),
            debug: None,
        },
    }
}

fn html_escape(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}

const STEP_TITLES: &[&str] = &[
    "Requirements",
    "Database",
    "Site Settings",
    "Admin Account",
    "Finish",
];

fn layout(step: u8, body: &str) -> String {
    let title = STEP_TITLES
        .get((step as usize).saturating_sub(1))
        .unwrap_or(&"Install");
    let breadcrumbs: String = STEP_TITLES
        .iter()
        .enumerate()
        .map(|(i, name)| {
            let class = if (i + 1) as u8 == step { "current" } else { "" };
            format!("<li class=\"{}\">{}. {}</li>", class, i + 1, name)
        })
        .collect();

    format!(
        "<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n<meta charset=\"utf-8\">\n\
         <title>GameDev Academy Installer — Step {step}: {title}</title>\n</head>\n<body>\n\
         <h1>GameDev Academy Installer</h1>\n<ol class=\"steps\">{breadcrumbs}</ol>\n\
         <h2>Step {step}: {title}</h2>\n{body}\n</body>\n</html>\n"
    )
}

fn render_messages(errors: &[String], warnings: &[String]) -> String {
    let mut out = String::new();
    if !errors.is_empty() {
        out.push_str("<ul class=\"errors\">");
        for error in errors {
            out.push_str(&format!("<li>{}</li>", html_escape(error)));
        }
        out.push_str("</ul>");
    }
    if !warnings.is_empty() {
        out.push_str("<ul class=\"warnings\">");
        for warning in warnings {
            out.push_str(&format!("<li>{}</li>", html_escape(warning)));
        }
        out.push_str("</ul>");
    }
    out
}

fn text_input(label: &str, name: &str, value: &str) -> String {
    format!(
        "<label>{label}<input type=\"text\" name=\"{name}\" value=\"{}\"></label>",
        html_escape(value)
    )
}

fn password_input(label: &str, name: &str) -> String {
    format!("<label>{label}<input type=\"password\" name=\"{name}\" value=\"\"></label>")
}

fn page_step1(requirement_errors: &[String], errors: &[String], warnings: &[String]) -> String {
    let status = if requirement_errors.is_empty() {
        "<p class=\"ok\">The environment meets every requirement.</p>".to_string()
    } else {
        render_messages(requirement_errors, &[])
    };

    let body = format!(
        "{}{}<form method=\"post\" action=\"/install?step=1\">\
         <button type=\"submit\">Check requirements and continue</button></form>",
        render_messages(errors, warnings),
        status
    );
    layout(1, &body)
}

fn page_step2(values: &DatabaseForm, errors: &[String], warnings: &[String]) -> String {
    let body = format!(
        "{}<form method=\"post\" action=\"/install?step=2\">{}{}{}{}{}{}\
         <button type=\"submit\">Test connection and continue</button></form>\
         <p><a href=\"/install?step=1\">Back</a></p>",
        render_messages(errors, warnings),
        text_input("Database host", "db_host", &values.host),
        text_input("Port", "db_port", &values.port),
        text_input("Database name", "db_name", &values.name),
        text_input("User", "db_user", &values.user),
        password_input("Password", "db_pass"),
        text_input("Table prefix", "db_prefix", &values.prefix),
    );
    layout(2, &body)
}

fn page_step3(values: &SiteForm, errors: &[String], warnings: &[String]) -> String {
    let debug_checked = if values.debug.is_some() { " checked" } else { "" };
    let body = format!(
        "{}<form method=\"post\" action=\"/install?step=3\">{}{}{}\
         <label>Debug mode<input type=\"checkbox\" name=\"debug\"{}></label>\
         <button type=\"submit\">Save and continue</button></form>\
         <p><a href=\"/install?step=2\">Back</a></p>",
        render_messages(errors, warnings),
        text_input("Site name", "site_name", &values.site_name),
        text_input("Site URL", "site_url", &values.site_url),
        text_input("Environment (production/development)", "environment", &values.environment),
        debug_checked,
    );
    layout(3, &body)
}

fn page_step4(values: &AdminAccountDraft, errors: &[String], warnings: &[String]) -> String {
    let body = format!(
        "{}<form method=\"post\" action=\"/install?step=4\">{}{}{}{}{}\
         <button type=\"submit\">Create account and install</button></form>\
         <p><a href=\"/install?step=3\">Back</a></p>",
        render_messages(errors, warnings),
        text_input("Full name", "admin_name", &values.full_name),
        text_input("Username", "admin_username", &values.username),
        text_input("Email", "admin_email", &values.email),
        password_input("Password", "admin_password"),
        password_input("Confirm password", "admin_password_confirm"),
    );
    layout(4, &body)
}

fn page_step5(site_url: &str) -> String {
    let body = format!(
        "<p>Installation is complete. For security, the installer is now locked.</p>\
         <p><a href=\"{0}\">Visit your site</a> or <a href=\"{0}/admin\">open the admin panel</a>.</p>",
        html_escape(site_url)
    );
    layout(5, &body)
}
