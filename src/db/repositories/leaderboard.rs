//! Leaderboard repository
//!
//! Configured boards plus the ranking queries behind each board type.
//! Computed rankings are written back into `cached_data` so the last result
//! survives a cache eviction.

use crate::models::{Leaderboard, LeaderboardEntry, LeaderboardType, User, UserRole};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool};
use std::sync::Arc;

use super::parse_enum;
use super::user::rank_rows;

/// What to rank and over which users
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RankQuery {
    pub kind: LeaderboardType,
    /// Ledger window for point-sum boards
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
    /// Restrict to students enrolled in this class
    pub class_id: Option<i64>,
    pub limit: i64,
}

/// Leaderboard repository trait
#[async_trait]
pub trait LeaderboardRepository: Send + Sync {
    async fn create(&self, board: &Leaderboard) -> Result<Leaderboard>;

    async fn get_by_id(&self, id: i64) -> Result<Option<Leaderboard>>;

    /// Active boards visible to the viewer. Admins see every active board,
    /// others see global boards and those of their own classes.
    async fn list_visible(&self, viewer: &User, offset: i64, limit: i64) -> Result<(Vec<Leaderboard>, i64)>;

    async fn update(&self, board: &Leaderboard) -> Result<Leaderboard>;

    async fn delete(&self, id: i64) -> Result<()>;

    /// Run the ranking query for a board type
    async fn rank(&self, query: &RankQuery) -> Result<Vec<LeaderboardEntry>>;

    /// Persist computed entries and stamp `last_updated`
    async fn save_cached(&self, id: i64, entries: &[LeaderboardEntry]) -> Result<()>;
}

/// SQLx-based leaderboard repository implementation
pub struct SqlxLeaderboardRepository {
    pool: SqlitePool,
}

impl SqlxLeaderboardRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: SqlitePool) -> Arc<dyn LeaderboardRepository> {
        Arc::new(Self::new(pool))
    }
}

const BOARD_COLUMNS: &str = "id, name, leaderboard_type, description, is_active, start_date, end_date, \
     student_class_id, cached_data, last_updated, created_at, updated_at";

fn push_class_scope(qb: &mut QueryBuilder<'_, Sqlite>, class_id: Option<i64>) {
    if let Some(class_id) = class_id {
        qb.push(" AND u.id IN (SELECT student_id FROM class_enrollments WHERE class_id = ")
            .push_bind(class_id)
            .push(")");
    }
}

fn build_rank_query(query: &RankQuery) -> QueryBuilder<'static, Sqlite> {
    let mut qb = QueryBuilder::<Sqlite>::new("SELECT u.id, u.first_name, u.last_name, u.email, ");

    match query.kind {
        LeaderboardType::GlobalPoints | LeaderboardType::ClassPoints => {
            qb.push("p.total_points AS value FROM users u JOIN user_profiles p ON p.user_id = u.id WHERE u.is_active = 1");
            push_class_scope(&mut qb, query.class_id);
        }
        LeaderboardType::CurrentStreak => {
            qb.push(
                "p.streak_days AS value FROM users u JOIN user_profiles p ON p.user_id = u.id \
                 WHERE u.is_active = 1 AND p.streak_days > 0",
            );
            push_class_scope(&mut qb, query.class_id);
        }
        LeaderboardType::WeeklyPoints | LeaderboardType::MonthlyPoints => {
            qb.push("SUM(t.points) AS value FROM users u JOIN point_transactions t ON t.user_id = u.id WHERE u.is_active = 1");
            if let Some(since) = query.since {
                qb.push(" AND t.created_at >= ").push_bind(since);
            }
            if let Some(until) = query.until {
                qb.push(" AND t.created_at < ").push_bind(until);
            }
            push_class_scope(&mut qb, query.class_id);
            qb.push(" GROUP BY u.id HAVING value > 0");
        }
        LeaderboardType::ChallengesSolved => {
            qb.push(
                "COUNT(DISTINCT s.challenge_id) AS value FROM users u JOIN submissions s ON s.user_id = u.id \
                 WHERE u.is_active = 1 AND s.status = 'accepted'",
            );
            push_class_scope(&mut qb, query.class_id);
            qb.push(" GROUP BY u.id");
        }
        LeaderboardType::LessonsCompleted => {
            qb.push(
                "COUNT(lc.id) AS value FROM users u JOIN lesson_completions lc ON lc.user_id = u.id \
                 WHERE u.is_active = 1",
            );
            push_class_scope(&mut qb, query.class_id);
            qb.push(" GROUP BY u.id");
        }
    }

    qb.push(" ORDER BY value DESC, u.id ASC LIMIT ").push_bind(query.limit);
    qb
}

#[async_trait]
impl LeaderboardRepository for SqlxLeaderboardRepository {
    async fn create(&self, board: &Leaderboard) -> Result<Leaderboard> {
        let now = Utc::now();
        let result = sqlx::query(
            r#"
            INSERT INTO leaderboards (name, leaderboard_type, description, is_active, start_date,
                                      end_date, student_class_id, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&board.name)
        .bind(board.leaderboard_type.as_str())
        .bind(&board.description)
        .bind(board.is_active)
        .bind(board.start_date)
        .bind(board.end_date)
        .bind(board.student_class_id)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await
        .context("Failed to create leaderboard")?;

        self.get_by_id(result.last_insert_rowid())
            .await?
            .ok_or_else(|| anyhow::anyhow!("Leaderboard not found after insert"))
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<Leaderboard>> {
        let row = sqlx::query(&format!("SELECT {} FROM leaderboards WHERE id = ?", BOARD_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to get leaderboard")?;

        row.as_ref().map(row_to_board).transpose()
    }

    async fn list_visible(&self, viewer: &User, offset: i64, limit: i64) -> Result<(Vec<Leaderboard>, i64)> {
        let scope = match viewer.role {
            UserRole::Admin => "WHERE is_active = 1 AND (? IS NOT NULL OR ? IS NOT NULL)",
            UserRole::Teacher => {
                "WHERE is_active = 1 AND (student_class_id IS NULL OR student_class_id IN \
                 (SELECT id FROM student_classes WHERE teacher_id = ? OR teacher_id = ?))"
            }
            UserRole::Student => {
                "WHERE is_active = 1 AND (student_class_id IS NULL OR student_class_id IN \
                 (SELECT class_id FROM class_enrollments WHERE student_id = ? OR student_id = ?))"
            }
        };

        let count_row = sqlx::query(&format!("SELECT COUNT(*) AS count FROM leaderboards {}", scope))
            .bind(viewer.id)
            .bind(viewer.id)
            .fetch_one(&self.pool)
            .await
            .context("Failed to count leaderboards")?;
        let total: i64 = count_row.get("count");

        let rows = sqlx::query(&format!(
            "SELECT {} FROM leaderboards {} ORDER BY name ASC, id ASC LIMIT ? OFFSET ?",
            BOARD_COLUMNS, scope
        ))
        .bind(viewer.id)
        .bind(viewer.id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
        .context("Failed to list leaderboards")?;

        let boards = rows.iter().map(row_to_board).collect::<Result<Vec<_>>>()?;
        Ok((boards, total))
    }

    async fn update(&self, board: &Leaderboard) -> Result<Leaderboard> {
        sqlx::query(
            r#"
            UPDATE leaderboards
            SET name = ?, leaderboard_type = ?, description = ?, is_active = ?, start_date = ?,
                end_date = ?, student_class_id = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&board.name)
        .bind(board.leaderboard_type.as_str())
        .bind(&board.description)
        .bind(board.is_active)
        .bind(board.start_date)
        .bind(board.end_date)
        .bind(board.student_class_id)
        .bind(Utc::now())
        .bind(board.id)
        .execute(&self.pool)
        .await
        .context("Failed to update leaderboard")?;

        self.get_by_id(board.id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("Leaderboard not found after update"))
    }

    async fn delete(&self, id: i64) -> Result<()> {
        sqlx::query("DELETE FROM leaderboards WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .context("Failed to delete leaderboard")?;
        Ok(())
    }

    async fn rank(&self, query: &RankQuery) -> Result<Vec<LeaderboardEntry>> {
        let rows = build_rank_query(query)
            .build()
            .fetch_all(&self.pool)
            .await
            .with_context(|| format!("Failed to rank {}", query.kind))?;

        Ok(rank_rows(&rows))
    }

    async fn save_cached(&self, id: i64, entries: &[LeaderboardEntry]) -> Result<()> {
        let data = serde_json::to_string(entries).context("Failed to encode leaderboard data")?;
        sqlx::query("UPDATE leaderboards SET cached_data = ?, last_updated = ? WHERE id = ?")
            .bind(data)
            .bind(Utc::now())
            .bind(id)
            .execute(&self.pool)
            .await
            .context("Failed to save leaderboard data")?;
        Ok(())
    }
}

fn row_to_board(row: &SqliteRow) -> Result<Leaderboard> {
    let cached: String = row.get("cached_data");
    Ok(Leaderboard {
        id: row.get("id"),
        name: row.get("name"),
        leaderboard_type: parse_enum(row, "leaderboard_type")?,
        description: row.get("description"),
        is_active: row.get("is_active"),
        start_date: row.get("start_date"),
        end_date: row.get("end_date"),
        student_class_id: row.get("student_class_id"),
        cached_data: serde_json::from_str(&cached).unwrap_or_default(),
        last_updated: row.get("last_updated"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}
