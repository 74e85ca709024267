//! Gamification repository
//!
//! Badges, the point ledger, user badges and achievements.
//!
//! The write half (ledger rows, profile totals, achievements, badge awards)
//! is exposed as free functions on `&mut SqliteConnection` so the award
//! cascade can run inside the transaction of the event that triggered it.
//! The trait covers reads and catalog maintenance.

use crate::models::{
    Achievement, AchievementType, ActivityCounts, Badge, BadgeType, LeaderboardEntry, NewAchievement,
    NewTransaction, PointTransaction, Rarity, RecentBadgeEarner, SystemTotals, TransactionType,
    TypeTotal, UserBadge,
};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row, Sqlite, SqliteConnection, SqlitePool};
use std::sync::Arc;

use super::user::{display_name, rank_rows};
use super::{parse_enum, parse_json};

/// Badge catalog filter
#[derive(Debug, Clone, Copy, Default)]
pub struct BadgeFilter {
    pub badge_type: Option<BadgeType>,
    pub rarity: Option<Rarity>,
    /// Hidden badges are shown only when this user holds them; `None` shows all
    pub holder_id: Option<i64>,
}

/// Gamification repository trait
#[async_trait]
pub trait GamificationRepository: Send + Sync {
    // Badges

    async fn create_badge(&self, badge: &Badge) -> Result<Badge>;

    async fn get_badge(&self, id: i64) -> Result<Option<Badge>>;

    /// Active badges matching the filter, by rarity then name
    async fn list_badges(&self, filter: &BadgeFilter, offset: i64, limit: i64) -> Result<(Vec<Badge>, i64)>;

    async fn update_badge(&self, badge: &Badge) -> Result<Badge>;

    async fn delete_badge(&self, id: i64) -> Result<()>;

    /// Check if a badge name is taken by a badge other than `exclude_id`
    async fn badge_name_exists(&self, name: &str, exclude_id: i64) -> Result<bool>;

    // User badges

    /// Badges held by a user, newest first, with the badge attached
    async fn user_badges(&self, user_id: i64) -> Result<Vec<UserBadge>>;

    async fn list_user_badges(&self, user_id: Option<i64>, offset: i64, limit: i64) -> Result<(Vec<UserBadge>, i64)>;

    async fn get_user_badge(&self, id: i64) -> Result<Option<UserBadge>>;

    async fn set_badge_displayed(&self, id: i64, displayed: bool) -> Result<UserBadge>;

    async fn holds_badge(&self, user_id: i64, badge_id: i64) -> Result<bool>;

    /// Users by number of badges held
    async fn badge_leaderboard(&self, limit: i64) -> Result<Vec<LeaderboardEntry>>;

    /// Latest badge awards across all users
    async fn recent_badge_earners(&self, limit: i64) -> Result<Vec<RecentBadgeEarner>>;

    // Ledger

    async fn list_transactions(
        &self,
        user_id: Option<i64>,
        transaction_type: Option<TransactionType>,
        offset: i64,
        limit: i64,
    ) -> Result<(Vec<PointTransaction>, i64)>;

    async fn get_transaction(&self, id: i64) -> Result<Option<PointTransaction>>;

    async fn recent_transactions(&self, user_id: i64, limit: i64) -> Result<Vec<PointTransaction>>;

    /// Count and sum per transaction type, for one user or everyone
    async fn points_by_type(&self, user_id: Option<i64>) -> Result<Vec<TypeTotal>>;

    /// Sum of a user's ledger rows inside `[since, until)`
    async fn points_between(&self, user_id: i64, since: DateTime<Utc>, until: Option<DateTime<Utc>>) -> Result<i64>;

    /// Sum of a user's positive rows and absolute sum of the negative ones
    async fn earned_and_spent(&self, user_id: i64) -> Result<(i64, i64)>;

    /// Users by ledger sum, positive sums only
    async fn ledger_leaderboard(&self, limit: i64) -> Result<Vec<LeaderboardEntry>>;

    // Achievements

    async fn list_achievements(&self, user_id: Option<i64>, offset: i64, limit: i64) -> Result<(Vec<Achievement>, i64)>;

    async fn get_achievement(&self, id: i64) -> Result<Option<Achievement>>;

    async fn recent_achievements(&self, user_id: Option<i64>, limit: i64) -> Result<Vec<Achievement>>;

    /// Count and points per achievement type, for one user or everyone
    async fn achievements_by_type(&self, user_id: Option<i64>) -> Result<Vec<TypeTotal>>;

    // Stats

    async fn activity_counts(&self, user_id: i64) -> Result<ActivityCounts>;

    /// Number of users with strictly more points
    async fn users_ahead(&self, total_points: i64) -> Result<i64>;

    async fn badges_by_rarity(&self) -> Result<Vec<TypeTotal>>;

    async fn system_totals(&self) -> Result<SystemTotals>;
}

/// SQLx-based gamification repository implementation
pub struct SqlxGamificationRepository {
    pool: SqlitePool,
}

impl SqlxGamificationRepository {
    /// Create a new SQLx gamification repository
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create a boxed repository for use with dependency injection
    pub fn boxed(pool: SqlitePool) -> Arc<dyn GamificationRepository> {
        Arc::new(Self::new(pool))
    }
}

const BADGE_COLUMNS: &str = "b.id, b.name, b.description, b.icon, b.badge_type, b.rarity, \
     b.points_required, b.criteria, b.is_active, b.is_hidden, b.earned_count, b.created_at, b.updated_at";

const TRANSACTION_COLUMNS: &str =
    "id, user_id, points, transaction_type, description, reference_id, metadata, created_at";

const ACHIEVEMENT_COLUMNS: &str = "id, user_id, achievement_type, title, description, points_awarded, \
     reference_id, metadata, achieved_at";

const USER_BADGE_SELECT: &str = r#"
    SELECT ub.id AS user_badge_id, ub.user_id, ub.badge_id, ub.earned_at, ub.is_displayed,
           b.id, b.name, b.description, b.icon, b.badge_type, b.rarity, b.points_required,
           b.criteria, b.is_active, b.is_hidden, b.earned_count, b.created_at, b.updated_at
    FROM user_badges ub
    JOIN badges b ON b.id = ub.badge_id
"#;

fn push_badge_filter(qb: &mut QueryBuilder<'_, Sqlite>, filter: &BadgeFilter) {
    qb.push(" WHERE b.is_active = 1");
    if let Some(badge_type) = filter.badge_type {
        qb.push(" AND b.badge_type = ").push_bind(badge_type.as_str());
    }
    if let Some(rarity) = filter.rarity {
        qb.push(" AND b.rarity = ").push_bind(rarity.as_str());
    }
    if let Some(holder_id) = filter.holder_id {
        qb.push(" AND (b.is_hidden = 0 OR b.id IN (SELECT badge_id FROM user_badges WHERE user_id = ")
            .push_bind(holder_id)
            .push("))");
    }
}

const RARITY_ORDER: &str = "CASE b.rarity WHEN 'common' THEN 1 WHEN 'uncommon' THEN 2 \
     WHEN 'rare' THEN 3 WHEN 'epic' THEN 4 WHEN 'legendary' THEN 5 ELSE 6 END";

#[async_trait]
impl GamificationRepository for SqlxGamificationRepository {
    // ========================================================================
    // Badges
    // ========================================================================

    async fn create_badge(&self, badge: &Badge) -> Result<Badge> {
        let now = Utc::now();
        let result = sqlx::query(
            r#"
            INSERT INTO badges (name, description, icon, badge_type, rarity, points_required,
                                criteria, is_active, is_hidden, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&badge.name)
        .bind(&badge.description)
        .bind(&badge.icon)
        .bind(badge.badge_type.as_str())
        .bind(badge.rarity.as_str())
        .bind(badge.points_required)
        .bind(badge.criteria.to_string())
        .bind(badge.is_active)
        .bind(badge.is_hidden)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await
        .context("Failed to create badge")?;

        self.get_badge(result.last_insert_rowid())
            .await?
            .ok_or_else(|| anyhow::anyhow!("Badge not found after insert"))
    }

    async fn get_badge(&self, id: i64) -> Result<Option<Badge>> {
        let row = sqlx::query(&format!("SELECT {} FROM badges b WHERE b.id = ?", BADGE_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to get badge")?;

        row.as_ref().map(row_to_badge).transpose()
    }

    async fn list_badges(&self, filter: &BadgeFilter, offset: i64, limit: i64) -> Result<(Vec<Badge>, i64)> {
        let mut count = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) AS count FROM badges b");
        push_badge_filter(&mut count, filter);
        let total: i64 = count
            .build()
            .fetch_one(&self.pool)
            .await
            .context("Failed to count badges")?
            .get("count");

        let mut query = QueryBuilder::<Sqlite>::new(format!("SELECT {} FROM badges b", BADGE_COLUMNS));
        push_badge_filter(&mut query, filter);
        query
            .push(format!(" ORDER BY {}, b.name ASC LIMIT ", RARITY_ORDER))
            .push_bind(limit)
            .push(" OFFSET ")
            .push_bind(offset);

        let rows = query
            .build()
            .fetch_all(&self.pool)
            .await
            .context("Failed to list badges")?;

        let badges = rows.iter().map(row_to_badge).collect::<Result<Vec<_>>>()?;
        Ok((badges, total))
    }

    async fn update_badge(&self, badge: &Badge) -> Result<Badge> {
        sqlx::query(
            r#"
            UPDATE badges
            SET name = ?, description = ?, icon = ?, badge_type = ?, rarity = ?,
                points_required = ?, criteria = ?, is_active = ?, is_hidden = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&badge.name)
        .bind(&badge.description)
        .bind(&badge.icon)
        .bind(badge.badge_type.as_str())
        .bind(badge.rarity.as_str())
        .bind(badge.points_required)
        .bind(badge.criteria.to_string())
        .bind(badge.is_active)
        .bind(badge.is_hidden)
        .bind(Utc::now())
        .bind(badge.id)
        .execute(&self.pool)
        .await
        .context("Failed to update badge")?;

        self.get_badge(badge.id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("Badge not found after update"))
    }

    async fn delete_badge(&self, id: i64) -> Result<()> {
        sqlx::query("DELETE FROM badges WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .context("Failed to delete badge")?;
        Ok(())
    }

    async fn badge_name_exists(&self, name: &str, exclude_id: i64) -> Result<bool> {
        let row = sqlx::query("SELECT COUNT(*) AS count FROM badges WHERE LOWER(name) = LOWER(?) AND id != ?")
            .bind(name)
            .bind(exclude_id)
            .fetch_one(&self.pool)
            .await
            .context("Failed to check badge name")?;
        let count: i64 = row.get("count");
        Ok(count > 0)
    }

    // ========================================================================
    // User badges
    // ========================================================================

    async fn user_badges(&self, user_id: i64) -> Result<Vec<UserBadge>> {
        let rows = sqlx::query(&format!(
            "{} WHERE ub.user_id = ? ORDER BY ub.earned_at DESC, ub.id DESC",
            USER_BADGE_SELECT
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .context("Failed to load user badges")?;

        rows.iter().map(row_to_user_badge).collect()
    }

    async fn list_user_badges(&self, user_id: Option<i64>, offset: i64, limit: i64) -> Result<(Vec<UserBadge>, i64)> {
        let scope = if user_id.is_some() { "WHERE ub.user_id = ?" } else { "WHERE ? IS NULL" };

        let count_row = sqlx::query(&format!("SELECT COUNT(*) AS count FROM user_badges ub {}", scope))
            .bind(user_id)
            .fetch_one(&self.pool)
            .await
            .context("Failed to count user badges")?;
        let total: i64 = count_row.get("count");

        let rows = sqlx::query(&format!(
            "{} {} ORDER BY ub.earned_at DESC, ub.id DESC LIMIT ? OFFSET ?",
            USER_BADGE_SELECT, scope
        ))
        .bind(user_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
        .context("Failed to list user badges")?;

        let badges = rows.iter().map(row_to_user_badge).collect::<Result<Vec<_>>>()?;
        Ok((badges, total))
    }

    async fn get_user_badge(&self, id: i64) -> Result<Option<UserBadge>> {
        let row = sqlx::query(&format!("{} WHERE ub.id = ?", USER_BADGE_SELECT))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to get user badge")?;

        row.as_ref().map(row_to_user_badge).transpose()
    }

    async fn set_badge_displayed(&self, id: i64, displayed: bool) -> Result<UserBadge> {
        sqlx::query("UPDATE user_badges SET is_displayed = ? WHERE id = ?")
            .bind(displayed)
            .bind(id)
            .execute(&self.pool)
            .await
            .context("Failed to update badge display")?;

        self.get_user_badge(id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("User badge not found after update"))
    }

    async fn holds_badge(&self, user_id: i64, badge_id: i64) -> Result<bool> {
        let row = sqlx::query("SELECT COUNT(*) AS count FROM user_badges WHERE user_id = ? AND badge_id = ?")
            .bind(user_id)
            .bind(badge_id)
            .fetch_one(&self.pool)
            .await
            .context("Failed to check user badge")?;
        let count: i64 = row.get("count");
        Ok(count > 0)
    }

    async fn badge_leaderboard(&self, limit: i64) -> Result<Vec<LeaderboardEntry>> {
        let rows = sqlx::query(
            r#"
            SELECT u.id, u.first_name, u.last_name, u.email, COUNT(ub.id) AS value
            FROM users u
            JOIN user_badges ub ON ub.user_id = u.id
            WHERE u.is_active = 1
            GROUP BY u.id
            ORDER BY value DESC, u.id ASC
            LIMIT ?
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .context("Failed to load badge leaderboard")?;

        Ok(rank_rows(&rows))
    }

    async fn recent_badge_earners(&self, limit: i64) -> Result<Vec<RecentBadgeEarner>> {
        let rows = sqlx::query(
            r#"
            SELECT u.id, u.first_name, u.last_name, u.email, b.id AS badge_id, b.name AS badge_name,
                   b.rarity, ub.earned_at
            FROM user_badges ub
            JOIN users u ON u.id = ub.user_id
            JOIN badges b ON b.id = ub.badge_id
            ORDER BY ub.earned_at DESC, ub.id DESC
            LIMIT ?
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .context("Failed to load recent badge earners")?;

        rows.iter()
            .map(|row| {
                Ok(RecentBadgeEarner {
                    user_id: row.get("id"),
                    name: display_name(row),
                    badge_id: row.get("badge_id"),
                    badge_name: row.get("badge_name"),
                    rarity: parse_enum(row, "rarity")?,
                    earned_at: row.get("earned_at"),
                })
            })
            .collect()
    }

    // ========================================================================
    // Ledger
    // ========================================================================

    async fn list_transactions(
        &self,
        user_id: Option<i64>,
        transaction_type: Option<TransactionType>,
        offset: i64,
        limit: i64,
    ) -> Result<(Vec<PointTransaction>, i64)> {
        let scope = "WHERE (? IS NULL OR user_id = ?) AND (? IS NULL OR transaction_type = ?)";
        let type_text = transaction_type.map(|t| t.as_str());

        let count_row = sqlx::query(&format!("SELECT COUNT(*) AS count FROM point_transactions {}", scope))
            .bind(user_id)
            .bind(user_id)
            .bind(type_text)
            .bind(type_text)
            .fetch_one(&self.pool)
            .await
            .context("Failed to count transactions")?;
        let total: i64 = count_row.get("count");

        let rows = sqlx::query(&format!(
            "SELECT {} FROM point_transactions {} ORDER BY created_at DESC, id DESC LIMIT ? OFFSET ?",
            TRANSACTION_COLUMNS, scope
        ))
        .bind(user_id)
        .bind(user_id)
        .bind(type_text)
        .bind(type_text)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
        .context("Failed to list transactions")?;

        let transactions = rows.iter().map(row_to_transaction).collect::<Result<Vec<_>>>()?;
        Ok((transactions, total))
    }

    async fn get_transaction(&self, id: i64) -> Result<Option<PointTransaction>> {
        let row = sqlx::query(&format!("SELECT {} FROM point_transactions WHERE id = ?", TRANSACTION_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to get transaction")?;

        row.as_ref().map(row_to_transaction).transpose()
    }

    async fn recent_transactions(&self, user_id: i64, limit: i64) -> Result<Vec<PointTransaction>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM point_transactions WHERE user_id = ? ORDER BY created_at DESC, id DESC LIMIT ?",
            TRANSACTION_COLUMNS
        ))
        .bind(user_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .context("Failed to load recent transactions")?;

        rows.iter().map(row_to_transaction).collect()
    }

    async fn points_by_type(&self, user_id: Option<i64>) -> Result<Vec<TypeTotal>> {
        let rows = sqlx::query(
            r#"
            SELECT transaction_type AS label, COUNT(*) AS count, COALESCE(SUM(points), 0) AS points
            FROM point_transactions
            WHERE ? IS NULL OR user_id = ?
            GROUP BY transaction_type
            ORDER BY points DESC, label ASC
            "#,
        )
        .bind(user_id)
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .context("Failed to group transactions")?;

        Ok(rows.iter().map(row_to_type_total).collect())
    }

    async fn points_between(&self, user_id: i64, since: DateTime<Utc>, until: Option<DateTime<Utc>>) -> Result<i64> {
        let row = sqlx::query(
            r#"
            SELECT COALESCE(SUM(points), 0) AS total
            FROM point_transactions
            WHERE user_id = ? AND created_at >= ? AND (? IS NULL OR created_at < ?)
            "#,
        )
        .bind(user_id)
        .bind(since)
        .bind(until)
        .bind(until)
        .fetch_one(&self.pool)
        .await
        .context("Failed to sum points in window")?;
        Ok(row.get("total"))
    }

    async fn earned_and_spent(&self, user_id: i64) -> Result<(i64, i64)> {
        let row = sqlx::query(
            r#"
            SELECT COALESCE(SUM(CASE WHEN points > 0 THEN points ELSE 0 END), 0) AS earned,
                   COALESCE(SUM(CASE WHEN points < 0 THEN -points ELSE 0 END), 0) AS spent
            FROM point_transactions
            WHERE user_id = ?
            "#,
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await
        .context("Failed to sum earned and spent points")?;
        Ok((row.get("earned"), row.get("spent")))
    }

    async fn ledger_leaderboard(&self, limit: i64) -> Result<Vec<LeaderboardEntry>> {
        let rows = sqlx::query(
            r#"
            SELECT u.id, u.first_name, u.last_name, u.email, SUM(t.points) AS value
            FROM users u
            JOIN point_transactions t ON t.user_id = u.id
            WHERE u.is_active = 1
            GROUP BY u.id
            HAVING value > 0
            ORDER BY value DESC, u.id ASC
            LIMIT ?
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .context("Failed to load points leaderboard")?;

        Ok(rank_rows(&rows))
    }

    // ========================================================================
    // Achievements
    // ========================================================================

    async fn list_achievements(&self, user_id: Option<i64>, offset: i64, limit: i64) -> Result<(Vec<Achievement>, i64)> {
        let scope = "WHERE ? IS NULL OR user_id = ?";

        let count_row = sqlx::query(&format!("SELECT COUNT(*) AS count FROM achievements {}", scope))
            .bind(user_id)
            .bind(user_id)
            .fetch_one(&self.pool)
            .await
            .context("Failed to count achievements")?;
        let total: i64 = count_row.get("count");

        let rows = sqlx::query(&format!(
            "SELECT {} FROM achievements {} ORDER BY achieved_at DESC, id DESC LIMIT ? OFFSET ?",
            ACHIEVEMENT_COLUMNS, scope
        ))
        .bind(user_id)
        .bind(user_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
        .context("Failed to list achievements")?;

        let achievements = rows.iter().map(row_to_achievement).collect::<Result<Vec<_>>>()?;
        Ok((achievements, total))
    }

    async fn get_achievement(&self, id: i64) -> Result<Option<Achievement>> {
        let row = sqlx::query(&format!("SELECT {} FROM achievements WHERE id = ?", ACHIEVEMENT_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to get achievement")?;

        row.as_ref().map(row_to_achievement).transpose()
    }

    async fn recent_achievements(&self, user_id: Option<i64>, limit: i64) -> Result<Vec<Achievement>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM achievements WHERE ? IS NULL OR user_id = ? ORDER BY achieved_at DESC, id DESC LIMIT ?",
            ACHIEVEMENT_COLUMNS
        ))
        .bind(user_id)
        .bind(user_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .context("Failed to load recent achievements")?;

        rows.iter().map(row_to_achievement).collect()
    }

    async fn achievements_by_type(&self, user_id: Option<i64>) -> Result<Vec<TypeTotal>> {
        let rows = sqlx::query(
            r#"
            SELECT achievement_type AS label, COUNT(*) AS count, COALESCE(SUM(points_awarded), 0) AS points
            FROM achievements
            WHERE ? IS NULL OR user_id = ?
            GROUP BY achievement_type
            ORDER BY count DESC, label ASC
            "#,
        )
        .bind(user_id)
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .context("Failed to group achievements")?;

        Ok(rows.iter().map(row_to_type_total).collect())
    }

    // ========================================================================
    // Stats
    // ========================================================================

    async fn activity_counts(&self, user_id: i64) -> Result<ActivityCounts> {
        let mut conn = self.pool.acquire().await.context("Failed to acquire connection")?;
        activity_counts(&mut conn, user_id).await
    }

    async fn users_ahead(&self, total_points: i64) -> Result<i64> {
        let row = sqlx::query("SELECT COUNT(*) AS count FROM user_profiles WHERE total_points > ?")
            .bind(total_points)
            .fetch_one(&self.pool)
            .await
            .context("Failed to compute rank")?;
        Ok(row.get("count"))
    }

    async fn badges_by_rarity(&self) -> Result<Vec<TypeTotal>> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT b.rarity AS label, COUNT(ub.id) AS count, 0 AS points
            FROM badges b
            LEFT JOIN user_badges ub ON ub.badge_id = b.id
            GROUP BY b.rarity
            ORDER BY MIN({}) ASC
            "#,
            RARITY_ORDER
        ))
        .fetch_all(&self.pool)
        .await
        .context("Failed to group badges by rarity")?;

        Ok(rows.iter().map(row_to_type_total).collect())
    }

    async fn system_totals(&self) -> Result<SystemTotals> {
        let row = sqlx::query(
            r#"
            SELECT
                (SELECT COUNT(*) FROM users) AS total_users,
                (SELECT COALESCE(SUM(points), 0) FROM point_transactions WHERE points > 0) AS total_points_awarded,
                (SELECT COUNT(*) FROM point_transactions) AS total_transactions,
                (SELECT COUNT(*) FROM user_badges) AS total_badges_earned,
                (SELECT COUNT(*) FROM achievements) AS total_achievements
            "#,
        )
        .fetch_one(&self.pool)
        .await
        .context("Failed to load system totals")?;

        Ok(SystemTotals {
            total_users: row.get("total_users"),
            total_points_awarded: row.get("total_points_awarded"),
            total_transactions: row.get("total_transactions"),
            total_badges_earned: row.get("total_badges_earned"),
            total_achievements: row.get("total_achievements"),
        })
    }
}

// ============================================================================
// Cascade writes (connection-level)
// ============================================================================

/// Append a ledger row
pub async fn insert_transaction(conn: &mut SqliteConnection, entry: &NewTransaction) -> Result<PointTransaction> {
    let now = Utc::now();
    let result = sqlx::query(
        r#"
        INSERT INTO point_transactions (user_id, points, transaction_type, description,
                                        reference_id, metadata, created_at)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(entry.user_id)
    .bind(entry.points)
    .bind(entry.transaction_type.as_str())
    .bind(&entry.description)
    .bind(&entry.reference_id)
    .bind(entry.metadata.to_string())
    .bind(now)
    .execute(&mut *conn)
    .await
    .context("Failed to insert point transaction")?;

    Ok(PointTransaction {
        id: result.last_insert_rowid(),
        user_id: entry.user_id,
        points: entry.points,
        transaction_type: entry.transaction_type,
        description: entry.description.clone(),
        reference_id: entry.reference_id.clone(),
        metadata: entry.metadata.clone(),
        created_at: now,
    })
}

/// Sum of all ledger rows of a user
pub async fn ledger_sum(conn: &mut SqliteConnection, user_id: i64) -> Result<i64> {
    let row = sqlx::query("SELECT COALESCE(SUM(points), 0) AS total FROM point_transactions WHERE user_id = ?")
        .bind(user_id)
        .fetch_one(&mut *conn)
        .await
        .context("Failed to sum ledger")?;
    Ok(row.get("total"))
}

/// Store a user's point total and level
pub async fn set_points(conn: &mut SqliteConnection, user_id: i64, total_points: i64, level: i64) -> Result<()> {
    sqlx::query("UPDATE user_profiles SET total_points = ?, level = ?, updated_at = ? WHERE user_id = ?")
        .bind(total_points)
        .bind(level)
        .bind(Utc::now())
        .bind(user_id)
        .execute(&mut *conn)
        .await
        .context("Failed to update profile points")?;
    Ok(())
}

pub async fn add_experience(conn: &mut SqliteConnection, user_id: i64, xp: i64) -> Result<()> {
    sqlx::query(
        "UPDATE user_profiles SET experience_points = experience_points + ?, updated_at = ? WHERE user_id = ?",
    )
    .bind(xp)
    .bind(Utc::now())
    .bind(user_id)
    .execute(&mut *conn)
    .await
    .context("Failed to add experience")?;
    Ok(())
}

/// Store streak counters and the day they were last touched
pub async fn set_streak(
    conn: &mut SqliteConnection,
    user_id: i64,
    streak_days: i64,
    longest_streak: i64,
    activity_date: NaiveDate,
) -> Result<()> {
    sqlx::query(
        r#"
        UPDATE user_profiles
        SET streak_days = ?, longest_streak = ?, last_activity_date = ?, updated_at = ?
        WHERE user_id = ?
        "#,
    )
    .bind(streak_days)
    .bind(longest_streak)
    .bind(activity_date)
    .bind(Utc::now())
    .bind(user_id)
    .execute(&mut *conn)
    .await
    .context("Failed to update streak")?;
    Ok(())
}

/// Insert an achievement unless the user already has one with the same
/// type and reference. Returns `None` when it already existed.
pub async fn insert_achievement(conn: &mut SqliteConnection, achievement: &NewAchievement) -> Result<Option<Achievement>> {
    let now = Utc::now();
    let result = sqlx::query(
        r#"
        INSERT OR IGNORE INTO achievements (user_id, achievement_type, title, description,
                                            points_awarded, reference_id, metadata, achieved_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(achievement.user_id)
    .bind(achievement.achievement_type.as_str())
    .bind(&achievement.title)
    .bind(&achievement.description)
    .bind(achievement.points)
    .bind(&achievement.reference_id)
    .bind(achievement.metadata.to_string())
    .bind(now)
    .execute(&mut *conn)
    .await
    .context("Failed to insert achievement")?;

    if result.rows_affected() == 0 {
        return Ok(None);
    }

    Ok(Some(Achievement {
        id: result.last_insert_rowid(),
        user_id: achievement.user_id,
        achievement_type: achievement.achievement_type,
        title: achievement.title.clone(),
        description: achievement.description.clone(),
        points_awarded: achievement.points,
        reference_id: achievement.reference_id.clone(),
        metadata: achievement.metadata.clone(),
        achieved_at: now,
    }))
}

/// Number of achievements of one type a user holds
pub async fn count_achievements(
    conn: &mut SqliteConnection,
    user_id: i64,
    achievement_type: AchievementType,
) -> Result<i64> {
    let row = sqlx::query("SELECT COUNT(*) AS count FROM achievements WHERE user_id = ? AND achievement_type = ?")
        .bind(user_id)
        .bind(achievement_type.as_str())
        .fetch_one(&mut *conn)
        .await
        .context("Failed to count achievements")?;
    Ok(row.get("count"))
}

/// Whether the user has a ledger row of this type at or after `since`
pub async fn has_transaction_since(
    conn: &mut SqliteConnection,
    user_id: i64,
    transaction_type: TransactionType,
    since: DateTime<Utc>,
) -> Result<bool> {
    let row = sqlx::query(
        "SELECT COUNT(*) AS count FROM point_transactions WHERE user_id = ? AND transaction_type = ? AND created_at >= ?",
    )
    .bind(user_id)
    .bind(transaction_type.as_str())
    .bind(since)
    .fetch_one(&mut *conn)
    .await
    .context("Failed to check recent transactions")?;
    let count: i64 = row.get("count");
    Ok(count > 0)
}

/// Whether the user already has a ledger row of this type for `reference_id`
pub async fn has_transaction_for(
    conn: &mut SqliteConnection,
    user_id: i64,
    transaction_type: TransactionType,
    reference_id: &str,
) -> Result<bool> {
    let row = sqlx::query(
        "SELECT COUNT(*) AS count FROM point_transactions WHERE user_id = ? AND transaction_type = ? AND reference_id = ?",
    )
    .bind(user_id)
    .bind(transaction_type.as_str())
    .bind(reference_id)
    .fetch_one(&mut *conn)
    .await
    .context("Failed to check existing transactions")?;
    let count: i64 = row.get("count");
    Ok(count > 0)
}

/// Active badges the user does not hold yet
pub async fn unheld_active_badges(conn: &mut SqliteConnection, user_id: i64) -> Result<Vec<Badge>> {
    let rows = sqlx::query(&format!(
        r#"
        SELECT {}
        FROM badges b
        WHERE b.is_active = 1
          AND b.id NOT IN (SELECT badge_id FROM user_badges WHERE user_id = ?)
        ORDER BY b.id ASC
        "#,
        BADGE_COLUMNS
    ))
    .bind(user_id)
    .fetch_all(&mut *conn)
    .await
    .context("Failed to load candidate badges")?;

    rows.iter().map(row_to_badge).collect()
}

/// Record a badge award and bump its earned count. Returns false when the
/// user already held it.
pub async fn insert_user_badge(conn: &mut SqliteConnection, user_id: i64, badge_id: i64) -> Result<bool> {
    let result = sqlx::query(
        "INSERT OR IGNORE INTO user_badges (user_id, badge_id, earned_at, is_displayed) VALUES (?, ?, ?, 1)",
    )
    .bind(user_id)
    .bind(badge_id)
    .bind(Utc::now())
    .execute(&mut *conn)
    .await
    .context("Failed to award badge")?;

    if result.rows_affected() == 0 {
        return Ok(false);
    }

    sqlx::query("UPDATE badges SET earned_count = earned_count + 1 WHERE id = ?")
        .bind(badge_id)
        .execute(&mut *conn)
        .await
        .context("Failed to update earned count")?;
    Ok(true)
}

/// Activity totals that badge criteria are evaluated against
pub async fn activity_counts(conn: &mut SqliteConnection, user_id: i64) -> Result<ActivityCounts> {
    let row = sqlx::query(
        r#"
        SELECT
            COALESCE((SELECT total_points FROM user_profiles WHERE user_id = ?1), 0) AS total_points,
            COALESCE((SELECT streak_days FROM user_profiles WHERE user_id = ?1), 0) AS streak_days,
            (SELECT COUNT(*) FROM lesson_completions WHERE user_id = ?1) AS lessons_completed,
            (SELECT COUNT(*) FROM quiz_attempts WHERE user_id = ?1 AND completed_at IS NOT NULL) AS quizzes_completed,
            (SELECT COUNT(*) FROM quiz_attempts WHERE user_id = ?1 AND score = 100) AS perfect_quizzes,
            (SELECT COUNT(DISTINCT challenge_id) FROM submissions
                WHERE user_id = ?1 AND status = 'accepted') AS challenges_solved,
            (SELECT COUNT(*) FROM submissions
                WHERE user_id = ?1 AND status = 'accepted' AND execution_time < 500) AS fast_solutions
        "#,
    )
    .bind(user_id)
    .fetch_one(&mut *conn)
    .await
    .context("Failed to count activity")?;

    let difficulty_rows = sqlx::query(
        r#"
        SELECT c.difficulty_level, COUNT(DISTINCT c.id) AS solved
        FROM submissions s
        JOIN challenges c ON c.id = s.challenge_id
        WHERE s.user_id = ? AND s.status = 'accepted'
        GROUP BY c.difficulty_level
        "#,
    )
    .bind(user_id)
    .fetch_all(&mut *conn)
    .await
    .context("Failed to count solved challenges by difficulty")?;

    Ok(ActivityCounts {
        total_points: row.get("total_points"),
        lessons_completed: row.get("lessons_completed"),
        quizzes_completed: row.get("quizzes_completed"),
        challenges_solved: row.get("challenges_solved"),
        streak_days: row.get("streak_days"),
        perfect_quizzes: row.get("perfect_quizzes"),
        fast_solutions: row.get("fast_solutions"),
        solved_by_difficulty: difficulty_rows
            .iter()
            .map(|r| (r.get::<String, _>("difficulty_level"), r.get::<i64, _>("solved")))
            .collect(),
    })
}

// ============================================================================
// Row mapping
// ============================================================================

fn row_to_badge(row: &SqliteRow) -> Result<Badge> {
    let rarity: Rarity = parse_enum(row, "rarity")?;
    Ok(Badge {
        id: row.get("id"),
        name: row.get("name"),
        description: row.get("description"),
        icon: row.get("icon"),
        badge_type: parse_enum(row, "badge_type")?,
        rarity,
        rarity_color: rarity.color().to_string(),
        points_required: row.get("points_required"),
        criteria: parse_json(row, "criteria"),
        is_active: row.get("is_active"),
        is_hidden: row.get("is_hidden"),
        earned_count: row.get("earned_count"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

fn row_to_user_badge(row: &SqliteRow) -> Result<UserBadge> {
    Ok(UserBadge {
        id: row.get("user_badge_id"),
        user_id: row.get("user_id"),
        badge_id: row.get("badge_id"),
        earned_at: row.get("earned_at"),
        is_displayed: row.get("is_displayed"),
        badge: Some(row_to_badge(row)?),
    })
}

fn row_to_transaction(row: &SqliteRow) -> Result<PointTransaction> {
    Ok(PointTransaction {
        id: row.get("id"),
        user_id: row.get("user_id"),
        points: row.get("points"),
        transaction_type: parse_enum(row, "transaction_type")?,
        description: row.get("description"),
        reference_id: row.get("reference_id"),
        metadata: parse_json(row, "metadata"),
        created_at: row.get("created_at"),
    })
}

fn row_to_achievement(row: &SqliteRow) -> Result<Achievement> {
    Ok(Achievement {
        id: row.get("id"),
        user_id: row.get("user_id"),
        achievement_type: parse_enum(row, "achievement_type")?,
        title: row.get("title"),
        description: row.get("description"),
        points_awarded: row.get("points_awarded"),
        reference_id: row.get("reference_id"),
        metadata: parse_json(row, "metadata"),
        achieved_at: row.get("achieved_at"),
    })
}

fn row_to_type_total(row: &SqliteRow) -> TypeTotal {
    TypeTotal {
        key: row.get("label"),
        count: row.get("count"),
        points: row.get("points"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::test_support;
    use crate::models::UserRole;

    #[tokio::test]
    async fn test_seeded_badges_listed_by_rarity() {
        let pool = test_support::pool().await;
        let repo = SqlxGamificationRepository::new(pool);

        let (badges, total) = repo.list_badges(&BadgeFilter::default(), 0, 20).await.unwrap();
        assert_eq!(total, 8);
        assert_eq!(badges[0].rarity, Rarity::Common);
        assert_eq!(badges.last().unwrap().name, "Challenge Champion");

        let filter = BadgeFilter {
            rarity: Some(Rarity::Epic),
            ..Default::default()
        };
        assert_eq!(repo.list_badges(&filter, 0, 20).await.unwrap().1, 2);
    }

    #[tokio::test]
    async fn test_hidden_badges_need_holding() {
        let pool = test_support::pool().await;
        let student = test_support::user(&pool, "s@example.com", UserRole::Student).await;
        let repo = SqlxGamificationRepository::new(pool.clone());

        let (mut badge, _) = repo.list_badges(&BadgeFilter::default(), 0, 1).await.unwrap();
        let mut secret = badge.remove(0);
        secret.is_hidden = true;
        repo.update_badge(&secret).await.unwrap();

        let filter = BadgeFilter {
            holder_id: Some(student.id),
            ..Default::default()
        };
        assert_eq!(repo.list_badges(&filter, 0, 20).await.unwrap().1, 7);

        let mut conn = pool.acquire().await.unwrap();
        assert!(insert_user_badge(&mut conn, student.id, secret.id).await.unwrap());
        assert!(!insert_user_badge(&mut conn, student.id, secret.id).await.unwrap());
        drop(conn);

        assert_eq!(repo.list_badges(&filter, 0, 20).await.unwrap().1, 8);
        assert_eq!(repo.get_badge(secret.id).await.unwrap().unwrap().earned_count, 1);
        assert!(repo.holds_badge(student.id, secret.id).await.unwrap());
    }

    #[tokio::test]
    async fn test_ledger_and_achievements() {
        let pool = test_support::pool().await;
        let student = test_support::user(&pool, "s@example.com", UserRole::Student).await;
        let repo = SqlxGamificationRepository::new(pool.clone());

        let mut conn = pool.acquire().await.unwrap();
        insert_transaction(
            &mut conn,
            &NewTransaction::new(student.id, 40, TransactionType::LessonCompleted, "Lesson", "1"),
        )
        .await
        .unwrap();
        insert_transaction(
            &mut conn,
            &NewTransaction::new(student.id, -15, TransactionType::Penalty, "Oops", ""),
        )
        .await
        .unwrap();
        assert_eq!(ledger_sum(&mut conn, student.id).await.unwrap(), 25);

        let first = NewAchievement::new(student.id, AchievementType::FirstLesson, "First Steps", "", 25);
        assert!(insert_achievement(&mut conn, &first).await.unwrap().is_some());
        assert!(insert_achievement(&mut conn, &first).await.unwrap().is_none());
        assert_eq!(
            count_achievements(&mut conn, student.id, AchievementType::FirstLesson).await.unwrap(),
            1
        );
        assert!(
            has_transaction_since(&mut conn, student.id, TransactionType::Penalty, Utc::now() - chrono::Duration::hours(1))
                .await
                .unwrap()
        );
        drop(conn);

        let (_, total) = repo
            .list_transactions(Some(student.id), Some(TransactionType::Penalty), 0, 20)
            .await
            .unwrap();
        assert_eq!(total, 1);

        let by_type = repo.points_by_type(Some(student.id)).await.unwrap();
        assert_eq!(by_type[0].key, "lesson_completed");
        assert_eq!(by_type[0].points, 40);

        let board = repo.ledger_leaderboard(50).await.unwrap();
        assert_eq!(board[0].value, 25);

        let since = Utc::now() - chrono::Duration::days(7);
        assert_eq!(repo.points_between(student.id, since, None).await.unwrap(), 25);

        let totals = repo.system_totals().await.unwrap();
        assert_eq!(totals.total_points_awarded, 40);
        assert_eq!(totals.total_achievements, 1);
    }

    #[tokio::test]
    async fn test_activity_counts_from_empty() {
        let pool = test_support::pool().await;
        let student = test_support::user(&pool, "s@example.com", UserRole::Student).await;
        let repo = SqlxGamificationRepository::new(pool);

        let counts = repo.activity_counts(student.id).await.unwrap();
        assert_eq!(counts, ActivityCounts::default());
    }
}
