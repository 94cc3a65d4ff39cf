use serde::Serialize;
use sqlx::MySqlPool;

/// Ordered table definitions for the platform core. Parents precede children
/// so foreign keys resolve during sequential execution. Every statement is
/// idempotent; re-running the provisioner is the documented recovery path.
///
/// `{prefix}` is substituted uniformly at render time.
pub const TABLE_DEFINITIONS: &[(&str, &str)] = &[
    (
        "users",
        r"CREATE TABLE IF NOT EXISTS `{prefix}users` (
    id BIGINT UNSIGNED NOT NULL AUTO_INCREMENT,
    username VARCHAR(20) NOT NULL,
    email VARCHAR(190) NOT NULL,
    password_hash VARCHAR(255) NOT NULL,
    full_name VARCHAR(100) NOT NULL,
    role ENUM('student','instructor','admin') NOT NULL DEFAULT 'student',
    is_active TINYINT(1) NOT NULL DEFAULT 1,
    xp INT UNSIGNED NOT NULL DEFAULT 0,
    level SMALLINT UNSIGNED NOT NULL DEFAULT 1,
    created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
    updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP ON UPDATE CURRENT_TIMESTAMP,
    PRIMARY KEY (id),
    UNIQUE KEY uq_users_username (username),
    UNIQUE KEY uq_users_email (email)
) ENGINE=InnoDB DEFAULT CHARSET=utf8mb4 COLLATE=utf8mb4_unicode_ci",
    ),
    (
        "user_profiles",
        r"CREATE TABLE IF NOT EXISTS `{prefix}user_profiles` (
    user_id BIGINT UNSIGNED NOT NULL,
    bio TEXT,
    avatar_path VARCHAR(255),
    website VARCHAR(255),
    created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
    PRIMARY KEY (user_id),
    CONSTRAINT fk_profiles_user FOREIGN KEY (user_id)
        REFERENCES `{prefix}users` (id) ON DELETE CASCADE
) ENGINE=InnoDB DEFAULT CHARSET=utf8mb4 COLLATE=utf8mb4_unicode_ci",
    ),
    (
        "categories",
        r"CREATE TABLE IF NOT EXISTS `{prefix}categories` (
    id INT UNSIGNED NOT NULL AUTO_INCREMENT,
    name VARCHAR(100) NOT NULL,
    slug VARCHAR(100) NOT NULL,
    description TEXT,
    position INT NOT NULL DEFAULT 0,
    PRIMARY KEY (id),
    UNIQUE KEY uq_categories_slug (slug)
) ENGINE=InnoDB DEFAULT CHARSET=utf8mb4 COLLATE=utf8mb4_unicode_ci",
    ),
    (
        "courses",
        r"CREATE TABLE IF NOT EXISTS `{prefix}courses` (
    id BIGINT UNSIGNED NOT NULL AUTO_INCREMENT,
    category_id INT UNSIGNED,
    instructor_id BIGINT UNSIGNED,
    title VARCHAR(190) NOT NULL,
    slug VARCHAR(190) NOT NULL,
    description MEDIUMTEXT,
    cover_path VARCHAR(255),
    is_published TINYINT(1) NOT NULL DEFAULT 0,
    price DECIMAL(8,2) NOT NULL DEFAULT 0,
    created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
    updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP ON UPDATE CURRENT_TIMESTAMP,
    PRIMARY KEY (id),
    UNIQUE KEY uq_courses_slug (slug),
    CONSTRAINT fk_courses_category FOREIGN KEY (category_id)
        REFERENCES `{prefix}categories` (id) ON DELETE SET NULL,
    CONSTRAINT fk_courses_instructor FOREIGN KEY (instructor_id)
        REFERENCES `{prefix}users` (id) ON DELETE SET NULL
) ENGINE=InnoDB DEFAULT CHARSET=utf8mb4 COLLATE=utf8mb4_unicode_ci",
    ),
    (
        "course_modules",
        r"CREATE TABLE IF NOT EXISTS `{prefix}course_modules` (
    id BIGINT UNSIGNED NOT NULL AUTO_INCREMENT,
    course_id BIGINT UNSIGNED NOT NULL,
    title VARCHAR(190) NOT NULL,
    position INT NOT NULL DEFAULT 0,
    PRIMARY KEY (id),
    CONSTRAINT fk_modules_course FOREIGN KEY (course_id)
        REFERENCES `{prefix}courses` (id) ON DELETE CASCADE
) ENGINE=InnoDB DEFAULT CHARSET=utf8mb4 COLLATE=utf8mb4_unicode_ci",
    ),
    (
        "lessons",
        r"CREATE TABLE IF NOT EXISTS `{prefix}lessons` (
    id BIGINT UNSIGNED NOT NULL AUTO_INCREMENT,
    module_id BIGINT UNSIGNED NOT NULL,
    title VARCHAR(190) NOT NULL,
    content MEDIUMTEXT,
    video_url VARCHAR(255),
    duration_minutes INT UNSIGNED NOT NULL DEFAULT 0,
    xp_reward INT UNSIGNED NOT NULL DEFAULT 10,
    position INT NOT NULL DEFAULT 0,
    PRIMARY KEY (id),
    CONSTRAINT fk_lessons_module FOREIGN KEY (module_id)
        REFERENCES `{prefix}course_modules` (id) ON DELETE CASCADE
) ENGINE=InnoDB DEFAULT CHARSET=utf8mb4 COLLATE=utf8mb4_unicode_ci",
    ),
    (
        "enrollments",
        r"CREATE TABLE IF NOT EXISTS `{prefix}enrollments` (
    id BIGINT UNSIGNED NOT NULL AUTO_INCREMENT,
    user_id BIGINT UNSIGNED NOT NULL,
    course_id BIGINT UNSIGNED NOT NULL,
    enrolled_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
    completed_at TIMESTAMP NULL DEFAULT NULL,
    PRIMARY KEY (id),
    UNIQUE KEY uq_enrollments_user_course (user_id, course_id),
    CONSTRAINT fk_enrollments_user FOREIGN KEY (user_id)
        REFERENCES `{prefix}users` (id) ON DELETE CASCADE,
    CONSTRAINT fk_enrollments_course FOREIGN KEY (course_id)
        REFERENCES `{prefix}courses` (id) ON DELETE CASCADE
) ENGINE=InnoDB DEFAULT CHARSET=utf8mb4 COLLATE=utf8mb4_unicode_ci",
    ),
    (
        "lesson_progress",
        r"CREATE TABLE IF NOT EXISTS `{prefix}lesson_progress` (
    id BIGINT UNSIGNED NOT NULL AUTO_INCREMENT,
    user_id BIGINT UNSIGNED NOT NULL,
    lesson_id BIGINT UNSIGNED NOT NULL,
    completed_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
    PRIMARY KEY (id),
    UNIQUE KEY uq_progress_user_lesson (user_id, lesson_id),
    CONSTRAINT fk_progress_user FOREIGN KEY (user_id)
        REFERENCES `{prefix}users` (id) ON DELETE CASCADE,
    CONSTRAINT fk_progress_lesson FOREIGN KEY (lesson_id)
        REFERENCES `{prefix}lessons` (id) ON DELETE CASCADE
) ENGINE=InnoDB DEFAULT CHARSET=utf8mb4 COLLATE=utf8mb4_unicode_ci",
    ),
    (
        "news",
        r"CREATE TABLE IF NOT EXISTS `{prefix}news` (
    id BIGINT UNSIGNED NOT NULL AUTO_INCREMENT,
    author_id BIGINT UNSIGNED,
    title VARCHAR(190) NOT NULL,
    slug VARCHAR(190) NOT NULL,
    body MEDIUMTEXT,
    published_at TIMESTAMP NULL DEFAULT NULL,
    created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
    PRIMARY KEY (id),
    UNIQUE KEY uq_news_slug (slug),
    CONSTRAINT fk_news_author FOREIGN KEY (author_id)
        REFERENCES `{prefix}users` (id) ON DELETE SET NULL
) ENGINE=InnoDB DEFAULT CHARSET=utf8mb4 COLLATE=utf8mb4_unicode_ci",
    ),
    (
        "news_comments",
        r"CREATE TABLE IF NOT EXISTS `{prefix}news_comments` (
    id BIGINT UNSIGNED NOT NULL AUTO_INCREMENT,
    news_id BIGINT UNSIGNED NOT NULL,
    user_id BIGINT UNSIGNED NOT NULL,
    body TEXT NOT NULL,
    created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
    PRIMARY KEY (id),
    CONSTRAINT fk_comments_news FOREIGN KEY (news_id)
        REFERENCES `{prefix}news` (id) ON DELETE CASCADE,
    CONSTRAINT fk_comments_user FOREIGN KEY (user_id)
        REFERENCES `{prefix}users` (id) ON DELETE CASCADE
) ENGINE=InnoDB DEFAULT CHARSET=utf8mb4 COLLATE=utf8mb4_unicode_ci",
    ),
    (
        "achievements",
        r"CREATE TABLE IF NOT EXISTS `{prefix}achievements` (
    id INT UNSIGNED NOT NULL AUTO_INCREMENT,
    code VARCHAR(50) NOT NULL,
    name VARCHAR(100) NOT NULL,
    description TEXT,
    icon_path VARCHAR(255),
    xp_reward INT UNSIGNED NOT NULL DEFAULT 0,
    PRIMARY KEY (id),
    UNIQUE KEY uq_achievements_code (code)
) ENGINE=InnoDB DEFAULT CHARSET=utf8mb4 COLLATE=utf8mb4_unicode_ci",
    ),
    (
        "user_achievements",
        r"CREATE TABLE IF NOT EXISTS `{prefix}user_achievements` (
    user_id BIGINT UNSIGNED NOT NULL,
    achievement_id INT UNSIGNED NOT NULL,
    earned_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
    PRIMARY KEY (user_id, achievement_id),
    CONSTRAINT fk_user_achievements_user FOREIGN KEY (user_id)
        REFERENCES `{prefix}users` (id) ON DELETE CASCADE,
    CONSTRAINT fk_user_achievements_achievement FOREIGN KEY (achievement_id)
        REFERENCES `{prefix}achievements` (id) ON DELETE CASCADE
) ENGINE=InnoDB DEFAULT CHARSET=utf8mb4 COLLATE=utf8mb4_unicode_ci",
    ),
    (
        "settings",
        r"CREATE TABLE IF NOT EXISTS `{prefix}settings` (
    name VARCHAR(100) NOT NULL,
    value TEXT NOT NULL,
    description VARCHAR(255),
    updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP ON UPDATE CURRENT_TIMESTAMP,
    PRIMARY KEY (name)
) ENGINE=InnoDB DEFAULT CHARSET=utf8mb4 COLLATE=utf8mb4_unicode_ci",
    ),
    (
        "password_resets",
        r"CREATE TABLE IF NOT EXISTS `{prefix}password_resets` (
    id BIGINT UNSIGNED NOT NULL AUTO_INCREMENT,
    user_id BIGINT UNSIGNED NOT NULL,
    token VARCHAR(64) NOT NULL,
    expires_at TIMESTAMP NOT NULL,
    created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
    PRIMARY KEY (id),
    UNIQUE KEY uq_password_resets_token (token),
    CONSTRAINT fk_password_resets_user FOREIGN KEY (user_id)
        REFERENCES `{prefix}users` (id) ON DELETE CASCADE
) ENGINE=InnoDB DEFAULT CHARSET=utf8mb4 COLLATE=utf8mb4_unicode_ci",
    ),
];

/// Reference-data seeds. INSERT IGNORE keeps repeated runs from duplicating
/// rows (every seeded table carries a unique key on the natural identifier).
pub const SEED_STATEMENTS: &[(&str, &str)] = &[
    (
        "starter categories",
        r"INSERT IGNORE INTO `{prefix}categories` (name, slug, description, position) VALUES
    ('Game Design', 'game-design', 'Mechanics, systems, and level design', 1),
    ('Programming', 'programming', 'Gameplay code, engines, and tools', 2),
    ('2D Art', '2d-art', 'Sprites, UI, and concept art', 3),
    ('3D Art', '3d-art', 'Modeling, texturing, and animation', 4),
    ('Audio', 'audio', 'Music and sound effects for games', 5)",
    ),
    (
        "starter achievements",
        r"INSERT IGNORE INTO `{prefix}achievements` (code, name, description, xp_reward) VALUES
    ('first-steps', 'First Steps', 'Complete your first lesson', 25),
    ('course-complete', 'Course Complete', 'Finish every lesson in a course', 100),
    ('community-voice', 'Community Voice', 'Post your first news comment', 10)",
    ),
    (
        "default settings",
        r"INSERT IGNORE INTO `{prefix}settings` (name, value, description) VALUES
    ('registration_enabled', 'true', 'Allow new student registration'),
    ('xp_per_level', '1000', 'Experience points required per level'),
    ('news_per_page', '10', 'News items per public page')",
    ),
];

/// Substitute the table-name prefix into a statement.
pub fn render_statement(sql: &str, prefix: &str) -> String {
    sql.replace("{prefix}", prefix)
}

/// Outcome of one provisioning run. Counts are advisory, for user-facing
/// reporting only.
#[derive(Debug, Default, Serialize)]
pub struct ProvisionReport {
    pub success: bool,
    pub tables_created: u32,
    pub data_inserted: u64,
    pub messages: Vec<String>,
    pub warnings: Vec<String>,
    pub errors: Vec<String>,
}

/// Execute the table definitions and seeds sequentially. The first DDL
/// failure aborts the remaining table statements; already-applied tables stay
/// in place (recovery is an idempotent re-run, not a rollback).
pub async fn provision_schema(pool: &MySqlPool, prefix: &str) -> ProvisionReport {
    let mut report = ProvisionReport::default();

    for (table, ddl) in TABLE_DEFINITIONS {
        let statement = render_statement(ddl, prefix);
        match sqlx::query(&statement).execute(pool).await {
            Ok(_) => {
                report.tables_created += 1;
                report
                    .messages
                    .push(format!("Table {}{} is ready", prefix, table));
            }
            Err(e) => {
                tracing::error!("DDL failed for {}{}: {}", prefix, table, e);
                report.errors.push(format!(
                    "Failed creating table {}{}: {}",
                    prefix, table, e
                ));
                break;
            }
        }
    }

    if report.errors.is_empty() {
        for (label, sql) in SEED_STATEMENTS {
            let statement = render_statement(sql, prefix);
            match sqlx::query(&statement).execute(pool).await {
                Ok(done) => {
                    report.data_inserted += done.rows_affected();
                    report.messages.push(format!("Seeded {}", label));
                }
                Err(e) => {
                    tracing::error!("Seed failed for {}: {}", label, e);
                    report.errors.push(format!("Failed seeding {}: {}", label, e));
                }
            }
        }
    }

    report.success = report.errors.is_empty();
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use regex::Regex;

    #[test]
    fn test_prefix_substitution_is_uniform() {
        for (table, ddl) in TABLE_DEFINITIONS {
            let rendered = render_statement(ddl, "gda_");
            assert!(
                !rendered.contains("{prefix}"),
                "unsubstituted prefix in {}",
                table
            );
            assert!(rendered.contains(&format!("`gda_{}`", table)));
        }
        for (label, sql) in SEED_STATEMENTS {
            let rendered = render_statement(sql, "gda_");
            assert!(!rendered.contains("{prefix}"), "unsubstituted prefix in {}", label);
        }
    }

    #[test]
    fn test_all_ddl_is_idempotent() {
        for (table, ddl) in TABLE_DEFINITIONS {
            assert!(
                ddl.trim_start().starts_with("CREATE TABLE IF NOT EXISTS"),
                "{} is not idempotent",
                table
            );
        }
    }

    #[test]
    fn test_all_seeds_are_insert_if_absent() {
        for (label, sql) in SEED_STATEMENTS {
            assert!(
                sql.trim_start().starts_with("INSERT IGNORE"),
                "{} would duplicate on re-run",
                label
            );
        }
    }

    #[test]
    fn test_foreign_keys_declare_on_delete_policy() {
        let fk = Regex::new(r"FOREIGN KEY[^,]+?REFERENCES[^,]+?\)").unwrap();
        for (table, ddl) in TABLE_DEFINITIONS {
            for m in fk.find_iter(ddl) {
                assert!(
                    m.as_str().contains("ON DELETE"),
                    "FK without on-delete policy in {}",
                    table
                );
            }
        }
    }

    #[test]
    fn test_optional_parents_use_set_null() {
        let courses = TABLE_DEFINITIONS
            .iter()
            .find(|(t, _)| *t == "courses")
            .unwrap()
            .1;
        assert!(courses.contains("ON DELETE SET NULL"));

        let news = TABLE_DEFINITIONS
            .iter()
            .find(|(t, _)| *t == "news")
            .unwrap()
            .1;
        assert!(news.contains("ON DELETE SET NULL"));
    }

    #[test]
    fn test_parents_precede_children() {
        let order: Vec<&str> = TABLE_DEFINITIONS.iter().map(|(t, _)| *t).collect();
        let reference = Regex::new(r"REFERENCES `\{prefix\}(\w+)`").unwrap();

        for (index, (table, ddl)) in TABLE_DEFINITIONS.iter().enumerate() {
            for caps in reference.captures_iter(ddl) {
                let parent = caps.get(1).unwrap().as_str();
                let parent_index = order
                    .iter()
                    .position(|t| *t == parent)
                    .unwrap_or_else(|| panic!("{} references unknown table {}", table, parent));
                assert!(
                    parent_index < index,
                    "{} references {} before it is defined",
                    table,
                    parent
                );
            }
        }
    }

    #[test]
    fn test_core_entities_present() {
        let names: Vec<&str> = TABLE_DEFINITIONS.iter().map(|(t, _)| *t).collect();
        for required in [
            "users",
            "user_profiles",
            "categories",
            "courses",
            "course_modules",
            "lessons",
            "enrollments",
            "news",
            "achievements",
            "settings",
        ] {
            assert!(names.contains(&required), "missing table {}", required);
        }
        assert!(names.len() >= 14);
    }

    #[test]
    fn test_statements_use_utf8mb4() {
        for (table, ddl) in TABLE_DEFINITIONS {
            assert!(ddl.contains("utf8mb4"), "{} missing utf8mb4 charset", table);
        }
    }
}
