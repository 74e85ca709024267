//! Database migrations
//!
//! The schema is embedded in the binary as versioned SQL scripts and applied
//! in order on startup. Applied versions are recorded in `_migrations`.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};

/// A schema migration
#[derive(Debug, Clone)]
pub struct Migration {
    /// Migration version number (must be unique and sequential)
    pub version: i32,
    /// Human-readable migration name
    pub name: &'static str,
    /// SQL statements, separated by semicolons
    pub up: &'static str,
}

/// Migration record stored in the database
#[derive(Debug, Clone)]
pub struct MigrationRecord {
    pub version: i64,
    pub name: String,
    pub applied_at: DateTime<Utc>,
}

pub const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        name: "create_identity",
        up: r#"
            CREATE TABLE IF NOT EXISTS users (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                email VARCHAR(254) NOT NULL UNIQUE,
                first_name VARCHAR(150) NOT NULL DEFAULT '',
                last_name VARCHAR(150) NOT NULL DEFAULT '',
                password_hash VARCHAR(255) NOT NULL,
                role VARCHAR(10) NOT NULL DEFAULT 'student'
                    CHECK (role IN ('student', 'teacher', 'admin')),
                is_email_verified INTEGER NOT NULL DEFAULT 0,
                is_active INTEGER NOT NULL DEFAULT 1,
                last_login TIMESTAMP,
                created_at TIMESTAMP NOT NULL,
                updated_at TIMESTAMP NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_users_role ON users(role);

            CREATE TABLE IF NOT EXISTS user_profiles (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL UNIQUE,
                bio TEXT NOT NULL DEFAULT '',
                date_of_birth DATE,
                phone VARCHAR(17) NOT NULL DEFAULT '',
                grade_level INTEGER CHECK (grade_level IS NULL OR grade_level BETWEEN 6 AND 12),
                school_name VARCHAR(200) NOT NULL DEFAULT '',
                city VARCHAR(100) NOT NULL DEFAULT '',
                country VARCHAR(100) NOT NULL DEFAULT '',
                total_points INTEGER NOT NULL DEFAULT 0 CHECK (total_points >= 0),
                level INTEGER NOT NULL DEFAULT 1 CHECK (level >= 1),
                experience_points INTEGER NOT NULL DEFAULT 0,
                streak_days INTEGER NOT NULL DEFAULT 0,
                longest_streak INTEGER NOT NULL DEFAULT 0,
                last_activity_date DATE,
                email_notifications INTEGER NOT NULL DEFAULT 1,
                push_notifications INTEGER NOT NULL DEFAULT 1,
                privacy_public_profile INTEGER NOT NULL DEFAULT 0,
                created_at TIMESTAMP NOT NULL,
                updated_at TIMESTAMP NOT NULL,
                FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
            );
            CREATE INDEX IF NOT EXISTS idx_user_profiles_points ON user_profiles(total_points);

            CREATE TABLE IF NOT EXISTS teacher_profiles (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL UNIQUE,
                employee_id VARCHAR(50) UNIQUE,
                department VARCHAR(100) NOT NULL DEFAULT '',
                subjects TEXT NOT NULL DEFAULT '[]',
                years_of_experience INTEGER NOT NULL DEFAULT 0,
                qualifications TEXT NOT NULL DEFAULT '',
                is_verified INTEGER NOT NULL DEFAULT 0,
                verification_date TIMESTAMP,
                created_at TIMESTAMP NOT NULL,
                updated_at TIMESTAMP NOT NULL,
                FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
            );

            CREATE TABLE IF NOT EXISTS student_classes (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name VARCHAR(100) NOT NULL,
                description TEXT NOT NULL DEFAULT '',
                teacher_id INTEGER NOT NULL,
                class_code VARCHAR(8) NOT NULL UNIQUE,
                is_active INTEGER NOT NULL DEFAULT 1,
                created_at TIMESTAMP NOT NULL,
                updated_at TIMESTAMP NOT NULL,
                FOREIGN KEY (teacher_id) REFERENCES users(id) ON DELETE CASCADE
            );
            CREATE INDEX IF NOT EXISTS idx_student_classes_teacher ON student_classes(teacher_id);

            CREATE TABLE IF NOT EXISTS class_enrollments (
                class_id INTEGER NOT NULL,
                student_id INTEGER NOT NULL,
                enrolled_at TIMESTAMP NOT NULL,
                PRIMARY KEY (class_id, student_id),
                FOREIGN KEY (class_id) REFERENCES student_classes(id) ON DELETE CASCADE,
                FOREIGN KEY (student_id) REFERENCES users(id) ON DELETE CASCADE
            );
            CREATE INDEX IF NOT EXISTS idx_class_enrollments_student ON class_enrollments(student_id);
        "#,
    },
    Migration {
        version: 2,
        name: "create_content",
        up: r#"
            CREATE TABLE IF NOT EXISTS categories (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name VARCHAR(100) NOT NULL UNIQUE,
                slug VARCHAR(100) NOT NULL UNIQUE,
                description TEXT NOT NULL DEFAULT '',
                icon VARCHAR(50) NOT NULL DEFAULT '',
                color VARCHAR(7) NOT NULL DEFAULT '#007bff',
                is_active INTEGER NOT NULL DEFAULT 1,
                created_at TIMESTAMP NOT NULL,
                updated_at TIMESTAMP NOT NULL
            );

            CREATE TABLE IF NOT EXISTS tags (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name VARCHAR(50) NOT NULL UNIQUE,
                slug VARCHAR(50) NOT NULL UNIQUE,
                created_at TIMESTAMP NOT NULL
            );

            CREATE TABLE IF NOT EXISTS lessons (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                title VARCHAR(200) NOT NULL,
                slug VARCHAR(200) NOT NULL UNIQUE,
                description TEXT NOT NULL DEFAULT '',
                content TEXT NOT NULL DEFAULT '',
                category_id INTEGER NOT NULL,
                content_type VARCHAR(20) NOT NULL DEFAULT 'text',
                difficulty_level VARCHAR(20) NOT NULL DEFAULT 'beginner',
                estimated_duration INTEGER NOT NULL DEFAULT 10
                    CHECK (estimated_duration BETWEEN 1 AND 300),
                thumbnail VARCHAR(500) NOT NULL DEFAULT '',
                video_url VARCHAR(500) NOT NULL DEFAULT '',
                points_reward INTEGER NOT NULL DEFAULT 10 CHECK (points_reward BETWEEN 1 AND 100),
                author_id INTEGER NOT NULL,
                is_published INTEGER NOT NULL DEFAULT 0,
                is_featured INTEGER NOT NULL DEFAULT 0,
                sort_order INTEGER NOT NULL DEFAULT 0,
                published_at TIMESTAMP,
                created_at TIMESTAMP NOT NULL,
                updated_at TIMESTAMP NOT NULL,
                FOREIGN KEY (category_id) REFERENCES categories(id) ON DELETE CASCADE,
                FOREIGN KEY (author_id) REFERENCES users(id) ON DELETE CASCADE
            );
            CREATE INDEX IF NOT EXISTS idx_lessons_category ON lessons(category_id);
            CREATE INDEX IF NOT EXISTS idx_lessons_published ON lessons(is_published);

            CREATE TABLE IF NOT EXISTS lesson_tags (
                lesson_id INTEGER NOT NULL,
                tag_id INTEGER NOT NULL,
                PRIMARY KEY (lesson_id, tag_id),
                FOREIGN KEY (lesson_id) REFERENCES lessons(id) ON DELETE CASCADE,
                FOREIGN KEY (tag_id) REFERENCES tags(id) ON DELETE CASCADE
            );

            CREATE TABLE IF NOT EXISTS lesson_prerequisites (
                lesson_id INTEGER NOT NULL,
                prerequisite_id INTEGER NOT NULL,
                PRIMARY KEY (lesson_id, prerequisite_id),
                FOREIGN KEY (lesson_id) REFERENCES lessons(id) ON DELETE CASCADE,
                FOREIGN KEY (prerequisite_id) REFERENCES lessons(id) ON DELETE CASCADE
            );

            CREATE TABLE IF NOT EXISTS quizzes (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                title VARCHAR(200) NOT NULL,
                slug VARCHAR(200) NOT NULL UNIQUE,
                description TEXT NOT NULL DEFAULT '',
                instructions TEXT NOT NULL DEFAULT '',
                lesson_id INTEGER,
                category_id INTEGER NOT NULL,
                author_id INTEGER NOT NULL,
                quiz_type VARCHAR(20) NOT NULL DEFAULT 'practice',
                time_limit INTEGER,
                max_attempts INTEGER NOT NULL DEFAULT 3 CHECK (max_attempts BETWEEN 1 AND 10),
                passing_score INTEGER NOT NULL DEFAULT 70 CHECK (passing_score BETWEEN 1 AND 100),
                points_reward INTEGER NOT NULL DEFAULT 20 CHECK (points_reward BETWEEN 1 AND 200),
                shuffle_questions INTEGER NOT NULL DEFAULT 1,
                shuffle_answers INTEGER NOT NULL DEFAULT 1,
                show_correct_answers INTEGER NOT NULL DEFAULT 1,
                allow_review INTEGER NOT NULL DEFAULT 1,
                is_published INTEGER NOT NULL DEFAULT 0,
                is_featured INTEGER NOT NULL DEFAULT 0,
                published_at TIMESTAMP,
                created_at TIMESTAMP NOT NULL,
                updated_at TIMESTAMP NOT NULL,
                FOREIGN KEY (lesson_id) REFERENCES lessons(id) ON DELETE SET NULL,
                FOREIGN KEY (category_id) REFERENCES categories(id) ON DELETE CASCADE,
                FOREIGN KEY (author_id) REFERENCES users(id) ON DELETE CASCADE
            );
            CREATE INDEX IF NOT EXISTS idx_quizzes_category ON quizzes(category_id);

            CREATE TABLE IF NOT EXISTS quiz_tags (
                quiz_id INTEGER NOT NULL,
                tag_id INTEGER NOT NULL,
                PRIMARY KEY (quiz_id, tag_id),
                FOREIGN KEY (quiz_id) REFERENCES quizzes(id) ON DELETE CASCADE,
                FOREIGN KEY (tag_id) REFERENCES tags(id) ON DELETE CASCADE
            );

            CREATE TABLE IF NOT EXISTS questions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                quiz_id INTEGER NOT NULL,
                question_text TEXT NOT NULL,
                question_type VARCHAR(20) NOT NULL DEFAULT 'multiple_choice',
                explanation TEXT NOT NULL DEFAULT '',
                points INTEGER NOT NULL DEFAULT 1 CHECK (points BETWEEN 1 AND 10),
                sort_order INTEGER NOT NULL DEFAULT 0,
                created_at TIMESTAMP NOT NULL,
                FOREIGN KEY (quiz_id) REFERENCES quizzes(id) ON DELETE CASCADE
            );
            CREATE INDEX IF NOT EXISTS idx_questions_quiz ON questions(quiz_id);

            CREATE TABLE IF NOT EXISTS answers (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                question_id INTEGER NOT NULL,
                answer_text VARCHAR(500) NOT NULL,
                is_correct INTEGER NOT NULL DEFAULT 0,
                sort_order INTEGER NOT NULL DEFAULT 0,
                FOREIGN KEY (question_id) REFERENCES questions(id) ON DELETE CASCADE
            );
            CREATE INDEX IF NOT EXISTS idx_answers_question ON answers(question_id);

            CREATE TABLE IF NOT EXISTS lesson_completions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL,
                lesson_id INTEGER NOT NULL,
                completed_at TIMESTAMP NOT NULL,
                time_spent INTEGER NOT NULL DEFAULT 0,
                UNIQUE (user_id, lesson_id),
                FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE,
                FOREIGN KEY (lesson_id) REFERENCES lessons(id) ON DELETE CASCADE
            );

            CREATE TABLE IF NOT EXISTS quiz_attempts (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL,
                quiz_id INTEGER NOT NULL,
                score INTEGER NOT NULL DEFAULT 0 CHECK (score BETWEEN 0 AND 100),
                total_questions INTEGER NOT NULL DEFAULT 0,
                correct_answers INTEGER NOT NULL DEFAULT 0,
                time_taken INTEGER NOT NULL DEFAULT 0,
                is_passed INTEGER NOT NULL DEFAULT 0,
                attempt_number INTEGER NOT NULL DEFAULT 1,
                started_at TIMESTAMP NOT NULL,
                completed_at TIMESTAMP,
                FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE,
                FOREIGN KEY (quiz_id) REFERENCES quizzes(id) ON DELETE CASCADE
            );
            CREATE INDEX IF NOT EXISTS idx_quiz_attempts_user_quiz ON quiz_attempts(user_id, quiz_id);

            CREATE TABLE IF NOT EXISTS user_answers (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                attempt_id INTEGER NOT NULL,
                question_id INTEGER NOT NULL,
                selected_answer_id INTEGER,
                text_answer TEXT NOT NULL DEFAULT '',
                is_correct INTEGER NOT NULL DEFAULT 0,
                points_earned INTEGER NOT NULL DEFAULT 0,
                UNIQUE (attempt_id, question_id),
                FOREIGN KEY (attempt_id) REFERENCES quiz_attempts(id) ON DELETE CASCADE,
                FOREIGN KEY (question_id) REFERENCES questions(id) ON DELETE CASCADE,
                FOREIGN KEY (selected_answer_id) REFERENCES answers(id) ON DELETE SET NULL
            );

            CREATE TABLE IF NOT EXISTS content_ratings (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL,
                lesson_id INTEGER,
                quiz_id INTEGER,
                rating INTEGER NOT NULL CHECK (rating BETWEEN 1 AND 5),
                review TEXT NOT NULL DEFAULT '',
                created_at TIMESTAMP NOT NULL,
                updated_at TIMESTAMP NOT NULL,
                CHECK ((lesson_id IS NULL) <> (quiz_id IS NULL)),
                UNIQUE (user_id, lesson_id),
                UNIQUE (user_id, quiz_id),
                FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE,
                FOREIGN KEY (lesson_id) REFERENCES lessons(id) ON DELETE CASCADE,
                FOREIGN KEY (quiz_id) REFERENCES quizzes(id) ON DELETE CASCADE
            );
        "#,
    },
    Migration {
        version: 3,
        name: "create_challenges",
        up: r#"
            CREATE TABLE IF NOT EXISTS challenges (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                title VARCHAR(200) NOT NULL,
                slug VARCHAR(200) NOT NULL UNIQUE,
                description TEXT NOT NULL DEFAULT '',
                problem_statement TEXT NOT NULL DEFAULT '',
                difficulty_level VARCHAR(20) NOT NULL DEFAULT 'beginner',
                challenge_type VARCHAR(30) NOT NULL DEFAULT 'climate_action',
                category_id INTEGER,
                input_format TEXT NOT NULL DEFAULT '',
                output_format TEXT NOT NULL DEFAULT '',
                constraints TEXT NOT NULL DEFAULT '',
                examples TEXT NOT NULL DEFAULT '[]',
                hints TEXT NOT NULL DEFAULT '[]',
                test_cases TEXT NOT NULL DEFAULT '[]',
                hidden_test_cases TEXT NOT NULL DEFAULT '[]',
                solution_code TEXT NOT NULL DEFAULT '',
                solution_explanation TEXT NOT NULL DEFAULT '',
                time_limit INTEGER NOT NULL DEFAULT 1000,
                memory_limit INTEGER NOT NULL DEFAULT 256,
                points_reward INTEGER NOT NULL DEFAULT 100 CHECK (points_reward BETWEEN 1 AND 1000),
                xp_reward INTEGER NOT NULL DEFAULT 50 CHECK (xp_reward BETWEEN 1 AND 500),
                status VARCHAR(10) NOT NULL DEFAULT 'draft',
                is_featured INTEGER NOT NULL DEFAULT 0,
                author_id INTEGER NOT NULL,
                submission_count INTEGER NOT NULL DEFAULT 0,
                solved_count INTEGER NOT NULL DEFAULT 0,
                average_rating REAL NOT NULL DEFAULT 0,
                published_at TIMESTAMP,
                created_at TIMESTAMP NOT NULL,
                updated_at TIMESTAMP NOT NULL,
                FOREIGN KEY (category_id) REFERENCES categories(id) ON DELETE SET NULL,
                FOREIGN KEY (author_id) REFERENCES users(id) ON DELETE CASCADE
            );
            CREATE INDEX IF NOT EXISTS idx_challenges_status ON challenges(status);
            CREATE INDEX IF NOT EXISTS idx_challenges_difficulty ON challenges(difficulty_level);

            CREATE TABLE IF NOT EXISTS challenge_tags (
                challenge_id INTEGER NOT NULL,
                tag_id INTEGER NOT NULL,
                PRIMARY KEY (challenge_id, tag_id),
                FOREIGN KEY (challenge_id) REFERENCES challenges(id) ON DELETE CASCADE,
                FOREIGN KEY (tag_id) REFERENCES tags(id) ON DELETE CASCADE
            );

            CREATE TABLE IF NOT EXISTS submissions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL,
                challenge_id INTEGER NOT NULL,
                code TEXT NOT NULL,
                language VARCHAR(20) NOT NULL,
                status VARCHAR(30) NOT NULL DEFAULT 'pending',
                score INTEGER NOT NULL DEFAULT 0 CHECK (score BETWEEN 0 AND 100),
                execution_time INTEGER,
                memory_used INTEGER,
                test_results TEXT NOT NULL DEFAULT '{}',
                passed_test_cases INTEGER NOT NULL DEFAULT 0,
                total_test_cases INTEGER NOT NULL DEFAULT 0,
                error_message TEXT NOT NULL DEFAULT '',
                compilation_output TEXT NOT NULL DEFAULT '',
                points_earned INTEGER NOT NULL DEFAULT 0,
                xp_earned INTEGER NOT NULL DEFAULT 0,
                submitted_at TIMESTAMP NOT NULL,
                evaluated_at TIMESTAMP,
                FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE,
                FOREIGN KEY (challenge_id) REFERENCES challenges(id) ON DELETE CASCADE
            );
            CREATE INDEX IF NOT EXISTS idx_submissions_user_challenge ON submissions(user_id, challenge_id);
            CREATE INDEX IF NOT EXISTS idx_submissions_status ON submissions(status);

            CREATE TABLE IF NOT EXISTS challenge_ratings (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL,
                challenge_id INTEGER NOT NULL,
                rating INTEGER NOT NULL CHECK (rating BETWEEN 1 AND 5),
                difficulty_rating INTEGER NOT NULL CHECK (difficulty_rating BETWEEN 1 AND 5),
                clarity_rating INTEGER NOT NULL CHECK (clarity_rating BETWEEN 1 AND 5),
                review TEXT NOT NULL DEFAULT '',
                created_at TIMESTAMP NOT NULL,
                updated_at TIMESTAMP NOT NULL,
                UNIQUE (user_id, challenge_id),
                FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE,
                FOREIGN KEY (challenge_id) REFERENCES challenges(id) ON DELETE CASCADE
            );

            CREATE TABLE IF NOT EXISTS challenge_favorites (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL,
                challenge_id INTEGER NOT NULL,
                created_at TIMESTAMP NOT NULL,
                UNIQUE (user_id, challenge_id),
                FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE,
                FOREIGN KEY (challenge_id) REFERENCES challenges(id) ON DELETE CASCADE
            );

            CREATE TABLE IF NOT EXISTS challenge_discussions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                challenge_id INTEGER NOT NULL,
                user_id INTEGER NOT NULL,
                parent_id INTEGER,
                content TEXT NOT NULL,
                is_solution INTEGER NOT NULL DEFAULT 0,
                is_spoiler INTEGER NOT NULL DEFAULT 0,
                is_approved INTEGER NOT NULL DEFAULT 1,
                is_flagged INTEGER NOT NULL DEFAULT 0,
                created_at TIMESTAMP NOT NULL,
                updated_at TIMESTAMP NOT NULL,
                FOREIGN KEY (challenge_id) REFERENCES challenges(id) ON DELETE CASCADE,
                FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE,
                FOREIGN KEY (parent_id) REFERENCES challenge_discussions(id) ON DELETE CASCADE
            );
            CREATE INDEX IF NOT EXISTS idx_discussions_challenge ON challenge_discussions(challenge_id);

            CREATE TABLE IF NOT EXISTS carbon_footprints (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL,
                challenge_id INTEGER,
                car_distance REAL NOT NULL DEFAULT 0,
                car_efficiency REAL NOT NULL DEFAULT 0,
                public_transport_distance REAL NOT NULL DEFAULT 0,
                flights_short INTEGER NOT NULL DEFAULT 0,
                flights_long INTEGER NOT NULL DEFAULT 0,
                electricity_usage REAL NOT NULL DEFAULT 0,
                heating_gas REAL NOT NULL DEFAULT 0,
                renewable_energy REAL NOT NULL DEFAULT 0,
                meat_consumption REAL NOT NULL DEFAULT 0,
                local_food REAL NOT NULL DEFAULT 0,
                waste_recycling REAL NOT NULL DEFAULT 0,
                transport_emissions REAL NOT NULL DEFAULT 0,
                energy_emissions REAL NOT NULL DEFAULT 0,
                lifestyle_emissions REAL NOT NULL DEFAULT 0,
                total_emissions REAL NOT NULL DEFAULT 0,
                eco_score INTEGER NOT NULL DEFAULT 0,
                recommendations TEXT NOT NULL DEFAULT '[]',
                created_at TIMESTAMP NOT NULL,
                updated_at TIMESTAMP NOT NULL,
                FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE,
                FOREIGN KEY (challenge_id) REFERENCES challenges(id) ON DELETE SET NULL
            );
            CREATE INDEX IF NOT EXISTS idx_carbon_footprints_user ON carbon_footprints(user_id);
        "#,
    },
    Migration {
        version: 4,
        name: "create_gamification",
        up: r#"
            CREATE TABLE IF NOT EXISTS badges (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name VARCHAR(100) NOT NULL UNIQUE,
                description TEXT NOT NULL DEFAULT '',
                icon VARCHAR(50) NOT NULL DEFAULT '',
                badge_type VARCHAR(20) NOT NULL DEFAULT 'achievement',
                rarity VARCHAR(20) NOT NULL DEFAULT 'common',
                points_required INTEGER NOT NULL DEFAULT 0 CHECK (points_required >= 0),
                criteria TEXT NOT NULL DEFAULT '{}',
                is_active INTEGER NOT NULL DEFAULT 1,
                is_hidden INTEGER NOT NULL DEFAULT 0,
                earned_count INTEGER NOT NULL DEFAULT 0,
                created_at TIMESTAMP NOT NULL,
                updated_at TIMESTAMP NOT NULL
            );

            CREATE TABLE IF NOT EXISTS point_transactions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL,
                points INTEGER NOT NULL CHECK (points BETWEEN -10000 AND 10000),
                transaction_type VARCHAR(30) NOT NULL,
                description VARCHAR(255) NOT NULL DEFAULT '',
                reference_id VARCHAR(100) NOT NULL DEFAULT '',
                metadata TEXT NOT NULL DEFAULT '{}',
                created_at TIMESTAMP NOT NULL,
                FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
            );
            CREATE INDEX IF NOT EXISTS idx_point_transactions_user ON point_transactions(user_id, created_at);
            CREATE INDEX IF NOT EXISTS idx_point_transactions_type ON point_transactions(transaction_type);

            CREATE TABLE IF NOT EXISTS user_badges (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL,
                badge_id INTEGER NOT NULL,
                earned_at TIMESTAMP NOT NULL,
                is_displayed INTEGER NOT NULL DEFAULT 1,
                UNIQUE (user_id, badge_id),
                FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE,
                FOREIGN KEY (badge_id) REFERENCES badges(id) ON DELETE CASCADE
            );

            CREATE TABLE IF NOT EXISTS leaderboards (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name VARCHAR(100) NOT NULL,
                leaderboard_type VARCHAR(30) NOT NULL,
                description TEXT NOT NULL DEFAULT '',
                is_active INTEGER NOT NULL DEFAULT 1,
                start_date TIMESTAMP,
                end_date TIMESTAMP,
                student_class_id INTEGER,
                cached_data TEXT NOT NULL DEFAULT '[]',
                last_updated TIMESTAMP,
                created_at TIMESTAMP NOT NULL,
                updated_at TIMESTAMP NOT NULL,
                FOREIGN KEY (student_class_id) REFERENCES student_classes(id) ON DELETE CASCADE
            );

            CREATE TABLE IF NOT EXISTS achievements (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL,
                achievement_type VARCHAR(30) NOT NULL,
                title VARCHAR(200) NOT NULL,
                description TEXT NOT NULL DEFAULT '',
                points_awarded INTEGER NOT NULL DEFAULT 0,
                reference_id VARCHAR(100) NOT NULL DEFAULT '',
                metadata TEXT NOT NULL DEFAULT '{}',
                achieved_at TIMESTAMP NOT NULL,
                UNIQUE (user_id, achievement_type, reference_id),
                FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
            );
            CREATE INDEX IF NOT EXISTS idx_achievements_user ON achievements(user_id);
        "#,
    },
    Migration {
        version: 5,
        name: "seed_default_badges",
        up: r#"
            INSERT OR IGNORE INTO badges (name, description, icon, badge_type, rarity, points_required, criteria, created_at, updated_at)
            VALUES ('First Steps', 'Complete your first lesson', 'target', 'achievement', 'common', 0,
                    '{"lessons_completed": 1}', '2024-01-01T00:00:00+00:00', '2024-01-01T00:00:00+00:00');
            INSERT OR IGNORE INTO badges (name, description, icon, badge_type, rarity, points_required, criteria, created_at, updated_at)
            VALUES ('Quiz Master', 'Complete 10 quizzes', 'brain', 'achievement', 'uncommon', 100,
                    '{"quizzes_completed": 10}', '2024-01-01T00:00:00+00:00', '2024-01-01T00:00:00+00:00');
            INSERT OR IGNORE INTO badges (name, description, icon, badge_type, rarity, points_required, criteria, created_at, updated_at)
            VALUES ('Problem Solver', 'Solve your first coding challenge', 'lightbulb', 'achievement', 'common', 0,
                    '{"challenges_solved": 1}', '2024-01-01T00:00:00+00:00', '2024-01-01T00:00:00+00:00');
            INSERT OR IGNORE INTO badges (name, description, icon, badge_type, rarity, points_required, criteria, created_at, updated_at)
            VALUES ('Streak Warrior', 'Maintain a 7-day learning streak', 'flame', 'milestone', 'rare', 50,
                    '{"streak_days": 7}', '2024-01-01T00:00:00+00:00', '2024-01-01T00:00:00+00:00');
            INSERT OR IGNORE INTO badges (name, description, icon, badge_type, rarity, points_required, criteria, created_at, updated_at)
            VALUES ('Point Collector', 'Earn 1000 total points', 'gem', 'milestone', 'epic', 1000,
                    '{}', '2024-01-01T00:00:00+00:00', '2024-01-01T00:00:00+00:00');
            INSERT OR IGNORE INTO badges (name, description, icon, badge_type, rarity, points_required, criteria, created_at, updated_at)
            VALUES ('Challenge Champion', 'Solve 50 coding challenges', 'trophy', 'achievement', 'legendary', 500,
                    '{"challenges_solved": 50}', '2024-01-01T00:00:00+00:00', '2024-01-01T00:00:00+00:00');
            INSERT OR IGNORE INTO badges (name, description, icon, badge_type, rarity, points_required, criteria, created_at, updated_at)
            VALUES ('Perfectionist', 'Get perfect scores on 5 quizzes', 'star', 'achievement', 'epic', 200,
                    '{"perfect_quizzes": 5}', '2024-01-01T00:00:00+00:00', '2024-01-01T00:00:00+00:00');
            INSERT OR IGNORE INTO badges (name, description, icon, badge_type, rarity, points_required, criteria, created_at, updated_at)
            VALUES ('Speed Demon', 'Solve challenges with lightning speed', 'zap', 'special', 'rare', 100,
                    '{"fast_solutions": 3}', '2024-01-01T00:00:00+00:00', '2024-01-01T00:00:00+00:00');
        "#,
    },
];

/// Run all pending migrations, returning how many were applied
pub async fn run_migrations(pool: &SqlitePool) -> Result<usize> {
    create_migrations_table(pool).await?;

    let applied = get_applied_migrations(pool).await?;
    let applied_versions: Vec<i32> = applied.iter().map(|m| m.version as i32).collect();

    let mut count = 0;

    for migration in MIGRATIONS {
        if !applied_versions.contains(&migration.version) {
            tracing::info!(
                "Applying migration {}: {}",
                migration.version,
                migration.name
            );
            apply_migration(pool, migration)
                .await
                .with_context(|| format!("Failed to apply migration: {}", migration.name))?;
            count += 1;
        }
    }

    if count > 0 {
        tracing::info!("Applied {} migration(s)", count);
    } else {
        tracing::debug!("No pending migrations");
    }

    Ok(count)
}

async fn create_migrations_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS _migrations (
            version INTEGER PRIMARY KEY,
            name VARCHAR(255) NOT NULL UNIQUE,
            applied_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await
    .context("Failed to create migrations table")?;
    Ok(())
}

async fn get_applied_migrations(pool: &SqlitePool) -> Result<Vec<MigrationRecord>> {
    let rows = sqlx::query("SELECT version, name, applied_at FROM _migrations ORDER BY version")
        .fetch_all(pool)
        .await
        .context("Failed to read applied migrations")?;

    Ok(rows
        .iter()
        .map(|row| MigrationRecord {
            version: row.get("version"),
            name: row.get("name"),
            applied_at: row.get("applied_at"),
        })
        .collect())
}

/// Apply one migration and its bookkeeping row atomically
async fn apply_migration(pool: &SqlitePool, migration: &Migration) -> Result<()> {
    let mut tx = pool.begin().await?;

    for statement in split_sql_statements(migration.up) {
        sqlx::query(statement)
            .execute(&mut *tx)
            .await
            .with_context(|| format!("Failed to execute: {}", truncate_sql(statement)))?;
    }

    sqlx::query("INSERT INTO _migrations (version, name) VALUES (?, ?)")
        .bind(migration.version)
        .bind(migration.name)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;
    Ok(())
}

/// Truncate SQL for error messages
fn truncate_sql(sql: &str) -> String {
    match sql.char_indices().nth(100) {
        Some((idx, _)) => format!("{}...", &sql[..idx]),
        None => sql.to_string(),
    }
}

/// Split SQL into individual statements, skipping comment-only fragments.
///
/// Semicolons inside single-quoted literals do not end a statement.
fn split_sql_statements(sql: &str) -> Vec<&str> {
    let mut statements = Vec::new();
    let mut current_start = 0;
    let mut in_quote = false;

    for (i, c) in sql.char_indices() {
        match c {
            '\'' => in_quote = !in_quote,
            ';' if !in_quote => {
                let stmt = sql[current_start..i].trim();
                if !stmt.is_empty() && !is_comment_only(stmt) {
                    statements.push(stmt);
                }
                current_start = i + 1;
            }
            _ => {}
        }
    }

    let tail = sql[current_start..].trim();
    if !tail.is_empty() && !is_comment_only(tail) {
        statements.push(tail);
    }

    statements
}

/// Check if a string contains only SQL comments
fn is_comment_only(s: &str) -> bool {
    s.lines()
        .map(str::trim)
        .all(|line| line.is_empty() || line.starts_with("--"))
}

/// Check if migrations are up to date
pub async fn is_up_to_date(pool: &SqlitePool) -> Result<bool> {
    create_migrations_table(pool).await?;
    let applied = get_applied_migrations(pool).await?;
    Ok(applied.len() == MIGRATIONS.len())
}

/// Get pending migrations count
pub async fn pending_count(pool: &SqlitePool) -> Result<usize> {
    create_migrations_table(pool).await?;
    let applied = get_applied_migrations(pool).await?;
    Ok(MIGRATIONS.len().saturating_sub(applied.len()))
}

/// Get the total number of migrations defined
pub fn total_migrations() -> usize {
    MIGRATIONS.len()
}

/// Get migration by version
pub fn get_migration(version: i32) -> Option<&'static Migration> {
    MIGRATIONS.iter().find(|m| m.version == version)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::create_test_pool;

    async fn migrated_pool() -> SqlitePool {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        run_migrations(&pool).await.expect("Failed to run migrations");
        pool
    }

    async fn insert_user(pool: &SqlitePool, email: &str) -> i64 {
        sqlx::query(
            "INSERT INTO users (email, password_hash, created_at, updated_at) VALUES (?, 'hash', ?, ?)",
        )
        .bind(email)
        .bind(Utc::now())
        .bind(Utc::now())
        .execute(pool)
        .await
        .expect("Failed to create user")
        .last_insert_rowid()
    }

    #[tokio::test]
    async fn test_run_migrations() {
        let pool = create_test_pool().await.expect("Failed to create test pool");

        let count = run_migrations(&pool).await.expect("Failed to run migrations");
        assert_eq!(count, MIGRATIONS.len());

        let count = run_migrations(&pool).await.expect("Failed to run migrations");
        assert_eq!(count, 0);
    }

    #[tokio::test]
    async fn test_is_up_to_date_and_pending_count() {
        let pool = create_test_pool().await.expect("Failed to create test pool");

        assert!(!is_up_to_date(&pool).await.unwrap());
        assert_eq!(pending_count(&pool).await.unwrap(), MIGRATIONS.len());

        run_migrations(&pool).await.expect("Failed to run migrations");

        assert!(is_up_to_date(&pool).await.unwrap());
        assert_eq!(pending_count(&pool).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_default_badges_seeded() {
        let pool = migrated_pool().await;

        let row = sqlx::query("SELECT COUNT(*) AS count FROM badges")
            .fetch_one(&pool)
            .await
            .expect("Failed to count badges");
        let count: i64 = row.get("count");
        assert_eq!(count, 8);

        let row = sqlx::query("SELECT points_required FROM badges WHERE name = 'Point Collector'")
            .fetch_one(&pool)
            .await
            .expect("Failed to load badge");
        let points: i64 = row.get("points_required");
        assert_eq!(points, 1000);
    }

    #[tokio::test]
    async fn test_unique_email() {
        let pool = migrated_pool().await;
        insert_user(&pool, "a@example.com").await;

        let result = sqlx::query(
            "INSERT INTO users (email, password_hash, created_at, updated_at) VALUES ('a@example.com', 'x', ?, ?)",
        )
        .bind(Utc::now())
        .bind(Utc::now())
        .execute(&pool)
        .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_foreign_key_constraints() {
        let pool = migrated_pool().await;

        let result = sqlx::query(
            "INSERT INTO point_transactions (user_id, points, transaction_type, created_at) VALUES (999, 10, 'admin_adjustment', ?)",
        )
        .bind(Utc::now())
        .execute(&pool)
        .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_rating_targets_exactly_one_content_item() {
        let pool = migrated_pool().await;
        let user_id = insert_user(&pool, "r@example.com").await;

        let result = sqlx::query(
            "INSERT INTO content_ratings (user_id, rating, created_at, updated_at) VALUES (?, 4, ?, ?)",
        )
        .bind(user_id)
        .bind(Utc::now())
        .bind(Utc::now())
        .execute(&pool)
        .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_point_range_check() {
        let pool = migrated_pool().await;
        let user_id = insert_user(&pool, "p@example.com").await;

        let result = sqlx::query(
            "INSERT INTO point_transactions (user_id, points, transaction_type, created_at) VALUES (?, 20000, 'admin_adjustment', ?)",
        )
        .bind(user_id)
        .bind(Utc::now())
        .execute(&pool)
        .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_achievement_uniqueness() {
        let pool = migrated_pool().await;
        let user_id = insert_user(&pool, "u@example.com").await;

        let insert = || {
            sqlx::query(
                "INSERT INTO achievements (user_id, achievement_type, title, achieved_at) VALUES (?, 'first_lesson', 'First Steps', ?)",
            )
            .bind(user_id)
            .bind(Utc::now())
        };
        assert!(insert().execute(&pool).await.is_ok());
        assert!(insert().execute(&pool).await.is_err());
    }

    #[test]
    fn test_get_migration() {
        assert_eq!(get_migration(1).map(|m| m.name), Some("create_identity"));
        assert!(get_migration(999).is_none());
        assert_eq!(total_migrations(), 5);
    }

    #[test]
    fn test_split_sql_statements() {
        let sql = "CREATE TABLE a (id INT); CREATE TABLE b (id INT);";
        assert_eq!(split_sql_statements(sql).len(), 2);

        let sql_with_comments = "-- Comment\nCREATE TABLE a (id INT);\n-- trailing";
        assert_eq!(split_sql_statements(sql_with_comments).len(), 1);

        let quoted = "INSERT INTO t VALUES ('a;b'); SELECT 1";
        assert_eq!(split_sql_statements(quoted).len(), 2);
    }

    #[test]
    fn test_is_comment_only() {
        assert!(is_comment_only("-- This is a comment"));
        assert!(is_comment_only("-- Line 1\n-- Line 2"));
        assert!(!is_comment_only("CREATE TABLE test"));
        assert!(!is_comment_only("-- Comment\nCREATE TABLE test"));
    }
}
