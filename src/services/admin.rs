use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use sqlx::MySqlPool;
use validator::ValidateEmail;

use crate::config::HashingCosts;
use crate::services::security;

/// First administrative account, as submitted in step 4. The password exists
/// in plaintext only in transit; persistence always goes through argon2.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AdminAccountDraft {
    pub full_name: String,
    pub username: String,
    pub email: String,
    pub password: String,
    pub password_confirm: String,
}

//// Canonical username rule: 3-20 alphanumeric/underscore characters.
static USERNAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9_]{3,20}$").expect("valid regex"));

/// Run every check and collect every failure; nothing short-circuits.
pub fn validate_draft(draft: &AdminAccountDraft) -> Vec<String> {
    let mut errors = Vec::new();

    if draft.full_name.trim().chars().count() < 3 {
        errors.push("Full name must be at least 3 characters".to_string());
    }

    if !USERNAME_RE.is_match(draft.username.trim()) {
        errors.push(
            "Username must be 3-20 characters using only letters, numbers, and underscores"
                .to_string(),
        );
    }

    if !draft.email.trim().validate_email() {
        errors.push("Email address is not valid".to_string());
    }

    if draft.password.chars().count() < 8 {
        errors.push("Password must be at least 8 characters".to_string());
    }

    if draft.password != draft.password_confirm {
        errors.push("Password confirmation does not match".to_string());
    }

    let has_lower = draft.password.chars().any(|c| c.is_ascii_lowercase());
    let has_upper = draft.password.chars().any(|c| c.is_ascii_uppercase());
    let has_digit = draft.password.chars().any(|c| c.is_ascii_digit());
    if !(has_lower && has_upper && has_digit) {
        errors.push(
            "Password must contain at least one lowercase letter, one uppercase letter, and one digit"
                .to_string(),
        );
    }

    errors
}

/// Outcome of admin-account creation.
#[derive(Debug, Default)]
pub struct AdminCreated {
    pub success: bool,
    pub user_id: Option<u64>,
    pub errors: Vec<String>,
}

/// Validate the draft and persist the first admin account plus its profile
/// row. Single-admin uniqueness is the wizard's InstalledMarker gate; this
/// component makes no uniqueness claim of its own beyond the table's unique
/// keys.
pub async fn create_admin(
    pool: &MySqlPool,
    prefix: &str,
    draft: &AdminAccountDraft,
    costs: &HashingCosts,
) -> AdminCreated {
    let errors = validate_draft(draft);
    if !errors.is_empty() {
        return AdminCreated {
            success: false,
            user_id: None,
            errors,
        };
    }

    let hash = match security::hash_password(&draft.password, costs) {
        Ok(hash) => hash,
        Err(e) => {
            return AdminCreated {
                success: false,
                user_id: None,
                errors: vec![format!("Could not hash the password: {}", e)],
            };
        }
    };

    let insert_user = format!(
        "INSERT INTO `{}users` (username, email, password_hash, full_name, role, is_active) \
         VALUES (?, ?, ?, ?, 'admin', 1)",
        prefix
    );
    let user_id = match sqlx::query(&insert_user)
        .bind(draft.username.trim())
        .bind(draft.email.trim())
        .bind(&hash)
        .bind(draft.full_name.trim())
        .execute(pool)
        .await
    {
        Ok(done) => done.last_insert_id(),
        Err(e) => {
            tracing::error!("Admin account insert failed: {}", e);
            return AdminCreated {
                success: false,
                user_id: None,
                errors: vec![format!("Failed to create the admin account: {}", e)],
            };
        }
    };

    let insert_profile = format!(
        "INSERT INTO `{}user_profiles` (user_id) VALUES (?)",
        prefix
    );
    if let Err(e) = sqlx::query(&insert_profile).bind(user_id).execute(pool).await {
        tracing::error!("Admin profile insert failed: {}", e);
        return AdminCreated {
            success: false,
            user_id: Some(user_id),
            errors: vec![format!("Failed to create the admin profile: {}", e)],
        };
    }

    tracing::info!("Admin account created with id {}", user_id);
    AdminCreated {
        success: true,
        user_id: Some(user_id),
        errors: Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_draft() -> AdminAccountDraft {
        AdminAccountDraft {
            full_name: "Ada Lovelace".to_string(),
            username: "ada_admin".to_string(),
            email: "ada@example.com".to_string(),
            password: "Abc12345".to_string(),
            password_confirm: "Abc12345".to_string(),
        }
    }

    #[test]
    fn test_valid_draft_passes() {
        assert!(validate_draft(&valid_draft()).is_empty());
    }

    #[test]
    fn test_password_without_uppercase_fails_complexity() {
        let mut draft = valid_draft();
        draft.password = "abc12345".to_string();
        draft.password_confirm = "abc12345".to_string();

        let errors = validate_draft(&draft);
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("uppercase"));
    }

    #[test]
    fn test_short_password_collects_both_length_and_complexity() {
        let mut draft = valid_draft();
        draft.password = "ab1".to_string();
        draft.password_confirm = "ab1".to_string();

        let errors = validate_draft(&draft);
        assert!(errors.iter().any(|e| e.contains("at least 8")));
        assert!(errors.iter().any(|e| e.contains("uppercase")));
    }

    #[test]
    fn test_confirmation_mismatch() {
        let mut draft = valid_draft();
        draft.password_confirm = "Abc123456".to_string();

        let errors = validate_draft(&draft);
        assert_eq!(errors, vec!["Password confirmation does not match"]);
    }

    #[test]
    fn test_username_rule_is_3_to_20_word_chars() {
        let mut draft = valid_draft();

        draft.username = "ab".to_string();
        assert!(!validate_draft(&draft).is_empty());

        draft.username = "abc".to_string();
        assert!(validate_draft(&draft).is_empty());

        draft.username = "a".repeat(21);
        assert!(!validate_draft(&draft).is_empty());

        draft.username = "has space".to_string();
        assert!(!validate_draft(&draft).is_empty());

        draft.username = "ok_name_123".to_string();
        assert!(validate_draft(&draft).is_empty());
    }

    #[test]
    fn test_invalid_email() {
        let mut draft = valid_draft();
        draft.email = "not-an-email".to_string();

        let errors = validate_draft(&draft);
        assert_eq!(errors, vec!["Email address is not valid"]);
    }

    #[test]
    fn test_all_failures_collected_exhaustively() {
        let draft = AdminAccountDraft {
            full_name: "ab".to_string(),
            username: "!".to_string(),
            email: "nope".to_string(),
            password: "short".to_string(),
            password_confirm: "different".to_string(),
        };

        let errors = validate_draft(&draft);
        // name, username, email, length, confirmation, complexity
        assert_eq!(errors.len(), 6, "{:?}", errors);
    }
}
