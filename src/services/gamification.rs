//! Gamification service
//!
//! Every point, achievement and badge award goes through the cascade in this
//! module. Callers open a transaction, perform their own write, hand the
//! connection to one of the event functions (`lesson_completed`,
//! `quiz_finished`, `challenge_solved`, ...) and commit. The returned
//! `CascadeOutcome` is passed to `GamificationService::invalidate` after the
//! commit so cached rankings are dropped.
//!
//! Awards produced while processing an award (milestones, badges, the
//! points attached to achievements) go onto a work queue that runs until it
//! drains. Achievements and badges are unique per user, so it always does.

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, NaiveDate, Timelike, Utc};
use serde::Serialize;
use serde_json::json;
use sqlx::{SqliteConnection, SqlitePool};
use std::collections::{BTreeSet, VecDeque};
use std::sync::Arc;

use crate::cache::{keys, Cache, CacheLayer};
use crate::db::repositories::gamification::{
    activity_counts, add_experience, count_achievements, has_transaction_for, has_transaction_since,
    insert_achievement, insert_transaction, insert_user_badge, ledger_sum, set_points, set_streak,
    unheld_active_badges,
};
use crate::db::repositories::user::get_profile;
use crate::db::repositories::{GamificationRepository, UserRepository};
use crate::models::{
    criteria_met, level_for_points, Achievement, AchievementType, Badge, Challenge, Lesson, ListParams,
    NewAchievement, NewTransaction, PagedResult, PointTransaction, Quiz, QuizAttempt, Submission,
    TransactionType, TypeTotal, User, MAX_TRANSACTION_POINTS,
};

/// Point totals that earn a `points_milestone` achievement worth a tenth of the total
pub const POINTS_MILESTONES: [i64; 10] = [100, 250, 500, 1000, 2500, 5000, 10000, 25000, 50000, 100000];

/// Streak lengths that earn a `streak_milestone` achievement worth twice the length
pub const STREAK_MILESTONES: [i64; 7] = [3, 7, 14, 30, 60, 100, 365];

const PERFECT_QUIZ_LIMIT: i64 = 5;
const SPEED_DEMON_LIMIT: i64 = 3;
const LOGIN_ACHIEVEMENT_LIMIT: i64 = 10;
/// Accepted runs faster than this count as fast solutions
pub const FAST_SOLUTION_MS: i64 = 500;

const DAILY_LOGIN_BASE: i64 = 10;
const DAILY_LOGIN_STREAK_CAP: i64 = 50;

service_error!(
    /// Error types for gamification operations
    GamificationServiceError
);

// ============================================================================
// Cascade
// ============================================================================

/// Everything one cascade wrote
#[derive(Debug, Clone, Default, Serialize)]
pub struct CascadeOutcome {
    pub transactions: Vec<PointTransaction>,
    pub achievements: Vec<Achievement>,
    pub badges: Vec<Badge>,
}

impl CascadeOutcome {
    /// Users whose ledger changed
    pub fn user_ids(&self) -> BTreeSet<i64> {
        self.transactions.iter().map(|t| t.user_id).collect()
    }

    pub fn merge(&mut self, other: CascadeOutcome) {
        self.transactions.extend(other.transactions);
        self.achievements.extend(other.achievements);
        self.badges.extend(other.badges);
    }

    pub fn is_empty(&self) -> bool {
        self.transactions.is_empty() && self.achievements.is_empty() && self.badges.is_empty()
    }
}

enum Award {
    Points(NewTransaction),
    Achievement(NewAchievement),
    Badge(i64, Badge),
}

/// Work queue of pending awards
#[derive(Default)]
pub struct Cascade {
    queue: VecDeque<Award>,
    outcome: CascadeOutcome,
}

impl Cascade {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, entry: NewTransaction) {
        self.queue.push_back(Award::Points(entry));
    }

    pub fn achieve(&mut self, achievement: NewAchievement) {
        self.queue.push_back(Award::Achievement(achievement));
    }

    /// Grant a badge regardless of its criteria
    pub fn grant(&mut self, user_id: i64, badge: Badge) {
        self.queue.push_back(Award::Badge(user_id, badge));
    }

    /// Process the queue until it is empty
    pub async fn run(mut self, conn: &mut SqliteConnection) -> Result<CascadeOutcome> {
        while let Some(award) = self.queue.pop_front() {
            match award {
                Award::Points(entry) => self.apply_points(conn, entry).await?,
                Award::Achievement(achievement) => self.apply_achievement(conn, achievement).await?,
                Award::Badge(user_id, badge) => self.apply_badge(conn, user_id, badge).await?,
            }
        }
        Ok(self.outcome)
    }

    async fn apply_points(&mut self, conn: &mut SqliteConnection, entry: NewTransaction) -> Result<()> {
        let user_id = entry.user_id;
        let row = insert_transaction(conn, &entry).await?;
        let total = ledger_sum(conn, user_id).await?.max(0);
        set_points(conn, user_id, total, level_for_points(total)).await?;
        tracing::debug!(
            "Recorded {} points ({}) for user {}, total {}",
            entry.points,
            entry.transaction_type,
            user_id,
            total
        );
        self.outcome.transactions.push(row);

        if entry.points <= 0 {
            return Ok(());
        }

        for milestone in POINTS_MILESTONES.iter().copied().filter(|m| total >= *m) {
            self.achieve(
                NewAchievement::new(
                    user_id,
                    AchievementType::PointsMilestone,
                    format!("{} Points!", milestone),
                    format!("Reached {} total points", milestone),
                    milestone / 10,
                )
                .with_reference(milestone.to_string())
                .with_metadata(json!({ "milestone": milestone })),
            );
        }

        let counts = activity_counts(conn, user_id).await?;
        for badge in unheld_active_badges(conn, user_id).await? {
            if criteria_met(&badge, &counts) {
                self.apply_badge(conn, user_id, badge).await?;
            }
        }
        Ok(())
    }

    async fn apply_badge(&mut self, conn: &mut SqliteConnection, user_id: i64, badge: Badge) -> Result<()> {
        if !insert_user_badge(conn, user_id, badge.id).await? {
            return Ok(());
        }
        tracing::info!("User {} earned badge '{}'", user_id, badge.name);
        let bonus = (badge.points_required / 10).min(MAX_TRANSACTION_POINTS);
        if bonus > 0 {
            self.record(
                NewTransaction::new(
                    user_id,
                    bonus,
                    TransactionType::BadgeEarned,
                    format!("Earned badge: {}", badge.name),
                    badge.id.to_string(),
                )
                .with_metadata(json!({ "badge_id": badge.id, "rarity": badge.rarity })),
            );
        }
        self.outcome.badges.push(badge);
        Ok(())
    }

    async fn apply_achievement(&mut self, conn: &mut SqliteConnection, achievement: NewAchievement) -> Result<()> {
        let Some(saved) = insert_achievement(conn, &achievement).await? else {
            return Ok(());
        };

        if saved.points_awarded > 0 {
            self.record(
                NewTransaction::new(
                    saved.user_id,
                    saved.points_awarded,
                    TransactionType::Achievement,
                    format!("Achievement: {}", saved.title),
                    saved.id.to_string(),
                )
                .with_metadata(json!({ "achievement_type": saved.achievement_type })),
            );
        }
        self.outcome.achievements.push(saved);
        Ok(())
    }
}

/// Record a ledger row and everything it unlocks
pub async fn record(conn: &mut SqliteConnection, entry: NewTransaction) -> Result<CascadeOutcome> {
    let mut cascade = Cascade::new();
    cascade.record(entry);
    cascade.run(conn).await
}

/// Grant an achievement (once per user, type and reference) and everything it unlocks
pub async fn achieve(conn: &mut SqliteConnection, achievement: NewAchievement) -> Result<CascadeOutcome> {
    let mut cascade = Cascade::new();
    cascade.achieve(achievement);
    cascade.run(conn).await
}

/// Hand out a badge directly, with its bonus points
pub async fn award_badge(conn: &mut SqliteConnection, user_id: i64, badge: Badge) -> Result<CascadeOutcome> {
    let mut cascade = Cascade::new();
    cascade.grant(user_id, badge);
    cascade.run(conn).await
}

// ============================================================================
// Streaks
// ============================================================================

/// Result of touching a user's streak
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StreakUpdate {
    pub streak_days: i64,
    pub longest_streak: i64,
    /// False when the streak was already touched today
    pub updated: bool,
}

/// New streak length, or `None` when `today` was already counted
pub fn next_streak(last_activity: Option<NaiveDate>, current: i64, today: NaiveDate) -> Option<i64> {
    match last_activity {
        Some(last) if last == today => None,
        Some(last) if last + Duration::days(1) == today => Some(current + 1),
        _ => Some(1),
    }
}

/// Advance the streak for `today` and queue any streak milestones reached
async fn touch_streak(
    conn: &mut SqliteConnection,
    cascade: &mut Cascade,
    user_id: i64,
    today: NaiveDate,
) -> Result<StreakUpdate> {
    let profile = get_profile(conn, user_id)
        .await?
        .ok_or_else(|| anyhow::anyhow!("Profile not found for user {}", user_id))?;

    let Some(streak) = next_streak(profile.last_activity_date, profile.streak_days, today) else {
        return Ok(StreakUpdate {
            streak_days: profile.streak_days,
            longest_streak: profile.longest_streak,
            updated: false,
        });
    };

    let longest = profile.longest_streak.max(streak);
    set_streak(conn, user_id, streak, longest, today).await?;

    for milestone in STREAK_MILESTONES.iter().copied().filter(|m| streak >= *m) {
        cascade.achieve(
            NewAchievement::new(
                user_id,
                AchievementType::StreakMilestone,
                format!("{} Day Streak!", milestone),
                format!("Kept learning {} days in a row", milestone),
                milestone * 2,
            )
            .with_reference(milestone.to_string())
            .with_metadata(json!({ "streak_days": streak })),
        );
    }

    Ok(StreakUpdate {
        streak_days: streak,
        longest_streak: longest,
        updated: true,
    })
}

/// Explicit streak update for a profile owner
pub async fn streak_updated(
    conn: &mut SqliteConnection,
    user_id: i64,
    today: NaiveDate,
) -> Result<(StreakUpdate, CascadeOutcome)> {
    let mut cascade = Cascade::new();
    let update = touch_streak(conn, &mut cascade, user_id, today).await?;
    let outcome = cascade.run(conn).await?;
    Ok((update, outcome))
}

// ============================================================================
// Learning events
// ============================================================================

/// A lesson was completed for the first time
pub async fn lesson_completed(
    conn: &mut SqliteConnection,
    user_id: i64,
    lesson: &Lesson,
    today: NaiveDate,
) -> Result<CascadeOutcome> {
    let mut cascade = Cascade::new();
    cascade.record(NewTransaction::new(
        user_id,
        lesson.points_reward,
        TransactionType::LessonCompleted,
        format!("Completed lesson: {}", lesson.title),
        lesson.id.to_string(),
    ));
    touch_streak(conn, &mut cascade, user_id, today).await?;
    cascade.achieve(NewAchievement::new(
        user_id,
        AchievementType::FirstLesson,
        "First Steps",
        "Completed your first lesson",
        25,
    ));
    cascade.run(conn).await
}

/// Points for a finished quiz attempt.
///
/// The reward is scaled by 1.5 for scores of 90 and above, 1.2 for 80 and
/// above, with another 0.1 on the first attempt. Fractions are dropped.
pub fn quiz_points(points_reward: i64, score: i64, attempt_number: i64) -> i64 {
    let mut tenths = if score >= 90 {
        15
    } else if score >= 80 {
        12
    } else {
        10
    };
    if attempt_number == 1 {
        tenths += 1;
    }
    points_reward.max(0) * tenths / 10
}

/// A quiz attempt was completed. Returns the points credited for the attempt itself.
pub async fn quiz_finished(
    conn: &mut SqliteConnection,
    quiz: &Quiz,
    attempt: &QuizAttempt,
) -> Result<(i64, CascadeOutcome)> {
    let user_id = attempt.user_id;
    let points = quiz_points(quiz.points_reward, attempt.score, attempt.attempt_number);

    let mut cascade = Cascade::new();
    if points > 0 {
        cascade.record(
            NewTransaction::new(
                user_id,
                points,
                TransactionType::QuizCompleted,
                format!("Completed quiz: {} ({}%)", quiz.title, attempt.score),
                attempt.id.to_string(),
            )
            .with_metadata(json!({ "quiz_id": quiz.id, "score": attempt.score })),
        );
    }
    if attempt.is_passed {
        cascade.record(NewTransaction::new(
            user_id,
            10,
            TransactionType::QuizPassed,
            format!("Passed quiz: {}", quiz.title),
            attempt.id.to_string(),
        ));
    }
    cascade.achieve(NewAchievement::new(
        user_id,
        AchievementType::FirstQuiz,
        "Quiz Master",
        "Completed your first quiz",
        25,
    ));

    if attempt.score == 100 {
        let held = count_achievements(conn, user_id, AchievementType::PerfectQuiz).await?;
        if held < PERFECT_QUIZ_LIMIT {
            cascade.achieve(
                NewAchievement::new(
                    user_id,
                    AchievementType::PerfectQuiz,
                    format!("Perfect Score #{}", held + 1),
                    format!("Scored 100% on {}", quiz.title),
                    15,
                )
                .with_reference(attempt.id.to_string()),
            );
        }
    }

    let outcome = cascade.run(conn).await?;
    Ok((points, outcome))
}

/// First accepted submission of a user for a challenge
///
/// A challenge pays out once per user: when the ledger already holds a
/// `challenge_solved` row for it, nothing is awarded.
pub async fn challenge_solved(
    conn: &mut SqliteConnection,
    challenge: &Challenge,
    submission: &Submission,
) -> Result<CascadeOutcome> {
    let user_id = submission.user_id;
    let reference = challenge.id.to_string();
    if has_transaction_for(conn, user_id, TransactionType::ChallengeSolved, &reference).await? {
        tracing::debug!("User {} was already rewarded for challenge {}", user_id, challenge.id);
        return Ok(CascadeOutcome::default());
    }
    let mut cascade = Cascade::new();

    if submission.points_earned > 0 {
        cascade.record(
            NewTransaction::new(
                user_id,
                submission.points_earned,
                TransactionType::ChallengeSolved,
                format!("Solved challenge: {}", challenge.title),
                reference,
            )
            .with_metadata(json!({ "submission_id": submission.id })),
        );
    }
    if submission.xp_earned > 0 {
        add_experience(conn, user_id, submission.xp_earned).await?;
    }
    cascade.achieve(NewAchievement::new(
        user_id,
        AchievementType::FirstChallenge,
        "Problem Solver",
        "Solved your first coding challenge",
        50,
    ));

    if submission.execution_time.is_some_and(|ms| ms < FAST_SOLUTION_MS) {
        let held = count_achievements(conn, user_id, AchievementType::SpeedDemon).await?;
        if held < SPEED_DEMON_LIMIT {
            cascade.achieve(
                NewAchievement::new(
                    user_id,
                    AchievementType::SpeedDemon,
                    format!("Speed Demon #{}", held + 1),
                    format!("Solved {} in under {} ms", challenge.title, FAST_SOLUTION_MS),
                    20,
                )
                .with_reference(submission.id.to_string()),
            );
        }
    }

    cascade.run(conn).await
}

/// Outcome of a daily login claim
#[derive(Debug, Clone, Serialize)]
pub struct DailyLoginBonus {
    pub detail: String,
    pub points_awarded: i64,
    pub base_points: i64,
    pub streak_bonus: i64,
    pub current_streak: i64,
    #[serde(skip)]
    pub outcome: CascadeOutcome,
}

/// Start of the UTC day containing `now`
fn day_start(now: DateTime<Utc>) -> DateTime<Utc> {
    now.date_naive().and_time(chrono::NaiveTime::MIN).and_utc()
}

/// Claim the once-per-UTC-day login bonus
pub async fn daily_login(conn: &mut SqliteConnection, user_id: i64, now: DateTime<Utc>) -> Result<DailyLoginBonus> {
    let profile = get_profile(conn, user_id)
        .await?
        .ok_or_else(|| anyhow::anyhow!("Profile not found for user {}", user_id))?;

    if has_transaction_since(conn, user_id, TransactionType::DailyLogin, day_start(now)).await? {
        return Ok(DailyLoginBonus {
            detail: "Daily login bonus already claimed today.".to_string(),
            points_awarded: 0,
            base_points: 0,
            streak_bonus: 0,
            current_streak: profile.streak_days,
            outcome: CascadeOutcome::default(),
        });
    }

    let streak_bonus = (profile.streak_days * 2).min(DAILY_LOGIN_STREAK_CAP);
    let points = DAILY_LOGIN_BASE + streak_bonus;
    let date = now.date_naive().to_string();

    let mut cascade = Cascade::new();
    cascade.record(
        NewTransaction::new(
            user_id,
            points,
            TransactionType::DailyLogin,
            format!("Daily login bonus (streak: {})", profile.streak_days),
            date.clone(),
        )
        .with_metadata(json!({ "login_date": date })),
    );

    let hour = now.hour();
    let timed = if (5..=8).contains(&hour) {
        Some((AchievementType::EarlyBird, "Early Bird", "early"))
    } else if (22..=23).contains(&hour) || hour <= 2 {
        Some((AchievementType::NightOwl, "Night Owl", "late"))
    } else {
        None
    };
    if let Some((kind, title, when)) = timed {
        let held = count_achievements(conn, user_id, kind).await?;
        if held < LOGIN_ACHIEVEMENT_LIMIT {
            cascade.achieve(
                NewAchievement::new(
                    user_id,
                    kind,
                    format!("{} #{}", title, held + 1),
                    format!("Logged in {} at {}:00", when, hour),
                    10,
                )
                .with_reference(date.clone())
                .with_metadata(json!({ "login_hour": hour })),
            );
        }
    }

    let outcome = cascade.run(conn).await?;
    Ok(DailyLoginBonus {
        detail: "Daily login bonus awarded!".to_string(),
        points_awarded: points,
        base_points: DAILY_LOGIN_BASE,
        streak_bonus,
        current_streak: profile.streak_days,
        outcome,
    })
}

// ============================================================================
// Service
// ============================================================================

/// Ledger summary for one user
#[derive(Debug, Clone, Serialize)]
pub struct PointsSummary {
    pub total_earned: i64,
    pub total_spent: i64,
    pub current_balance: i64,
    pub recent_transactions: Vec<PointTransaction>,
    pub transactions_by_type: Vec<TypeTotal>,
}

/// Achievement summary for one user
#[derive(Debug, Clone, Serialize)]
pub struct AchievementSummary {
    pub total_achievements: i64,
    pub total_points_from_achievements: i64,
    pub achievements_by_type: Vec<TypeTotal>,
    pub recent_achievements: Vec<Achievement>,
}

/// Ledger, achievements and the transactional entry points of the cascade
pub struct GamificationService {
    pool: SqlitePool,
    repo: Arc<dyn GamificationRepository>,
    user_repo: Arc<dyn UserRepository>,
    cache: Arc<Cache>,
}

impl GamificationService {
    pub fn new(
        pool: SqlitePool,
        repo: Arc<dyn GamificationRepository>,
        user_repo: Arc<dyn UserRepository>,
        cache: Arc<Cache>,
    ) -> Self {
        Self {
            pool,
            repo,
            user_repo,
            cache,
        }
    }

    /// Drop cached rankings touched by a committed cascade
    pub async fn invalidate(&self, outcome: &CascadeOutcome) {
        invalidate_rankings(&self.cache, outcome).await;
    }

    // ========================================================================
    // Point transactions
    // ========================================================================

    /// Own transactions, or everyone's for admins
    pub async fn list_transactions(
        &self,
        viewer: &User,
        transaction_type: Option<TransactionType>,
        params: &ListParams,
    ) -> Result<PagedResult<PointTransaction>, GamificationServiceError> {
        let scope = (!viewer.is_admin()).then_some(viewer.id);
        let (items, total) = self
            .repo
            .list_transactions(scope, transaction_type, params.offset(), params.limit())
            .await
            .context("Failed to list point transactions")?;
        Ok(PagedResult::new(items, total, params))
    }

    pub async fn get_transaction(&self, viewer: &User, id: i64) -> Result<PointTransaction, GamificationServiceError> {
        self.repo
            .get_transaction(id)
            .await
            .context("Failed to get point transaction")?
            .filter(|t| viewer.can_modify(t.user_id))
            .ok_or_else(|| GamificationServiceError::not_found("Point transaction", id))
    }

    /// Manual ledger entry by an admin, run through the cascade
    pub async fn create_transaction(
        &self,
        admin: &User,
        entry: NewTransaction,
    ) -> Result<PointTransaction, GamificationServiceError> {
        super::require_admin(admin).map_err(GamificationServiceError::Forbidden)?;

        if entry.points == 0 || entry.points.abs() > MAX_TRANSACTION_POINTS {
            return Err(GamificationServiceError::validation(format!(
                "Points must be non-zero and at most {} in absolute value",
                MAX_TRANSACTION_POINTS
            )));
        }
        self.user_repo
            .get_by_id(entry.user_id)
            .await
            .context("Failed to load user")?
            .ok_or_else(|| GamificationServiceError::not_found("User", entry.user_id))?;

        let mut tx = self.pool.begin().await.context("Failed to begin transaction")?;
        let outcome = record(&mut *tx, entry).await?;
        tx.commit().await.context("Failed to commit transaction")?;

        self.invalidate(&outcome).await;
        outcome
            .transactions
            .into_iter()
            .next()
            .ok_or_else(|| anyhow::anyhow!("Cascade recorded no transaction").into())
    }

    pub async fn points_summary(&self, user: &User) -> Result<PointsSummary, GamificationServiceError> {
        let (total_earned, total_spent) = self
            .repo
            .earned_and_spent(user.id)
            .await
            .context("Failed to sum ledger")?;
        let current_balance = self
            .user_repo
            .get_profile(user.id)
            .await
            .context("Failed to load profile")?
            .map(|p| p.total_points)
            .unwrap_or(0);

        Ok(PointsSummary {
            total_earned,
            total_spent,
            current_balance,
            recent_transactions: self
                .repo
                .recent_transactions(user.id, 10)
                .await
                .context("Failed to load recent transactions")?,
            transactions_by_type: self
                .repo
                .points_by_type(Some(user.id))
                .await
                .context("Failed to group transactions")?,
        })
    }

    pub async fn points_leaderboard(&self) -> Result<Vec<crate::models::LeaderboardEntry>, GamificationServiceError> {
        Ok(self
            .repo
            .ledger_leaderboard(50)
            .await
            .context("Failed to rank ledger totals")?)
    }

    // ========================================================================
    // Achievements
    // ========================================================================

    pub async fn list_achievements(
        &self,
        viewer: &User,
        params: &ListParams,
    ) -> Result<PagedResult<Achievement>, GamificationServiceError> {
        let scope = (!viewer.is_admin()).then_some(viewer.id);
        let (items, total) = self
            .repo
            .list_achievements(scope, params.offset(), params.limit())
            .await
            .context("Failed to list achievements")?;
        Ok(PagedResult::new(items, total, params))
    }

    pub async fn get_achievement(&self, viewer: &User, id: i64) -> Result<Achievement, GamificationServiceError> {
        self.repo
            .get_achievement(id)
            .await
            .context("Failed to get achievement")?
            .filter(|a| viewer.can_modify(a.user_id))
            .ok_or_else(|| GamificationServiceError::not_found("Achievement", id))
    }

    /// Latest achievements across all users
    pub async fn recent_achievements(&self) -> Result<Vec<Achievement>, GamificationServiceError> {
        Ok(self
            .repo
            .recent_achievements(None, 20)
            .await
            .context("Failed to load recent achievements")?)
    }

    pub async fn achievement_summary(&self, user: &User) -> Result<AchievementSummary, GamificationServiceError> {
        let by_type = self
            .repo
            .achievements_by_type(Some(user.id))
            .await
            .context("Failed to group achievements")?;

        Ok(AchievementSummary {
            total_achievements: by_type.iter().map(|t| t.count).sum(),
            total_points_from_achievements: by_type.iter().map(|t| t.points).sum(),
            achievements_by_type: by_type,
            recent_achievements: self
                .repo
                .recent_achievements(Some(user.id), 5)
                .await
                .context("Failed to load recent achievements")?,
        })
    }

    // ========================================================================
    // Daily login
    // ========================================================================

    pub async fn daily_login_bonus(&self, user: &User) -> Result<DailyLoginBonus, GamificationServiceError> {
        let mut tx = self.pool.begin().await.context("Failed to begin transaction")?;
        let bonus = daily_login(&mut *tx, user.id, Utc::now()).await?;
        tx.commit().await.context("Failed to commit transaction")?;

        self.invalidate(&bonus.outcome).await;
        Ok(bonus)
    }
}

/// Evict `leaderboard:*` and the per-user rank keys after a committed cascade
pub async fn invalidate_rankings(cache: &Cache, outcome: &CascadeOutcome) {
    if outcome.transactions.is_empty() {
        return;
    }
    if let Err(e) = cache.delete_pattern(keys::LEADERBOARD_PATTERN).await {
        tracing::warn!("Failed to evict leaderboard cache: {:#}", e);
    }
    for user_id in outcome.user_ids() {
        if let Err(e) = cache.delete_pattern(&keys::user_rank_pattern(user_id)).await {
            tracing::warn!("Failed to evict rank cache for user {}: {:#}", user_id, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::create_cache;
    use crate::config::CacheConfig;
    use crate::db::repositories::test_support;
    use crate::db::repositories::{SqlxGamificationRepository, SqlxUserRepository};
    use crate::models::UserRole;
    use proptest::prelude::*;

    fn service(pool: &SqlitePool) -> GamificationService {
        GamificationService::new(
            pool.clone(),
            SqlxGamificationRepository::boxed(pool.clone()),
            SqlxUserRepository::boxed(pool.clone()),
            create_cache(&CacheConfig::default()),
        )
    }

    async fn profile_points(pool: &SqlitePool, user_id: i64) -> (i64, i64) {
        let profile = SqlxUserRepository::new(pool.clone())
            .get_profile(user_id)
            .await
            .unwrap()
            .unwrap();
        (profile.total_points, profile.level)
    }

    async fn ledger(pool: &SqlitePool, user_id: i64) -> i64 {
        let mut conn = pool.acquire().await.unwrap();
        ledger_sum(&mut conn, user_id).await.unwrap()
    }

    #[test]
    fn test_quiz_points_multipliers() {
        assert_eq!(quiz_points(20, 95, 1), 32);
        assert_eq!(quiz_points(20, 95, 2), 30);
        assert_eq!(quiz_points(20, 85, 1), 26);
        assert_eq!(quiz_points(20, 85, 3), 24);
        assert_eq!(quiz_points(20, 50, 1), 22);
        assert_eq!(quiz_points(20, 50, 2), 20);
        assert_eq!(quiz_points(0, 100, 1), 0);
    }

    #[test]
    fn test_next_streak() {
        let today = NaiveDate::from_ymd_opt(2024, 3, 10).unwrap();
        let yesterday = NaiveDate::from_ymd_opt(2024, 3, 9).unwrap();
        let last_week = NaiveDate::from_ymd_opt(2024, 3, 3).unwrap();

        assert_eq!(next_streak(None, 0, today), Some(1));
        assert_eq!(next_streak(Some(today), 4, today), None);
        assert_eq!(next_streak(Some(yesterday), 4, today), Some(5));
        assert_eq!(next_streak(Some(last_week), 4, today), Some(1));
    }

    proptest! {
        #[test]
        fn prop_quiz_points_bounded(reward in 0i64..1000, score in 0i64..=100, attempt in 1i64..10) {
            let points = quiz_points(reward, score, attempt);
            prop_assert!(points >= reward);
            prop_assert!(points <= reward * 16 / 10);
        }
    }

    #[tokio::test]
    async fn test_record_runs_milestones_and_badges() {
        let pool = test_support::pool().await;
        let user = test_support::user(&pool, "eco@example.com", UserRole::Student).await;

        let mut conn = pool.acquire().await.unwrap();
        let outcome = record(
            &mut conn,
            NewTransaction::new(user.id, 150, TransactionType::AdminAdjustment, "bonus", ""),
        )
        .await
        .unwrap();
        drop(conn);

        // 150 plus the 100-point milestone worth 10
        assert_eq!(outcome.transactions.len(), 2);
        assert_eq!(outcome.achievements.len(), 1);
        assert_eq!(profile_points(&pool, user.id).await, (160, 1));

        let mut conn = pool.acquire().await.unwrap();
        let outcome = record(
            &mut conn,
            NewTransaction::new(user.id, 1000, TransactionType::AdminAdjustment, "bonus", ""),
        )
        .await
        .unwrap();
        drop(conn);

        // milestones 250, 500, 1000 and the Point Collector badge (bonus 100)
        assert_eq!(outcome.achievements.len(), 3);
        assert_eq!(outcome.badges.len(), 1);
        assert_eq!(outcome.badges[0].name, "Point Collector");

        let (total, level) = profile_points(&pool, user.id).await;
        assert_eq!(total, 1160 + 25 + 50 + 100 + 100);
        assert_eq!(total, ledger(&pool, user.id).await);
        assert_eq!(level, 2);
    }

    #[tokio::test]
    async fn test_negative_balance_clamps_to_zero() {
        let pool = test_support::pool().await;
        let user = test_support::user(&pool, "eco@example.com", UserRole::Student).await;

        let mut conn = pool.acquire().await.unwrap();
        let outcome = record(
            &mut conn,
            NewTransaction::new(user.id, -500, TransactionType::Penalty, "penalty", ""),
        )
        .await
        .unwrap();
        drop(conn);

        assert!(outcome.achievements.is_empty());
        assert_eq!(profile_points(&pool, user.id).await, (0, 1));
        assert_eq!(ledger(&pool, user.id).await, -500);
    }

    #[tokio::test]
    async fn test_achievement_is_granted_once() {
        let pool = test_support::pool().await;
        let user = test_support::user(&pool, "eco@example.com", UserRole::Student).await;

        let mut conn = pool.acquire().await.unwrap();
        let first = achieve(
            &mut conn,
            NewAchievement::new(user.id, AchievementType::HelpingHand, "Helper", "", 30),
        )
        .await
        .unwrap();
        let second = achieve(
            &mut conn,
            NewAchievement::new(user.id, AchievementType::HelpingHand, "Helper", "", 30),
        )
        .await
        .unwrap();
        drop(conn);

        assert_eq!(first.achievements.len(), 1);
        assert_eq!(first.transactions.len(), 1);
        assert!(second.is_empty());
        assert_eq!(profile_points(&pool, user.id).await.0, 30);
    }

    #[tokio::test]
    async fn test_streak_update_and_milestones() {
        let pool = test_support::pool().await;
        let user = test_support::user(&pool, "eco@example.com", UserRole::Student).await;
        let start = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap();

        let mut conn = pool.acquire().await.unwrap();
        for offset in 0..3 {
            let (update, _) = streak_updated(&mut conn, user.id, start + Duration::days(offset))
                .await
                .unwrap();
            assert!(update.updated);
            assert_eq!(update.streak_days, offset + 1);
        }

        let (again, outcome) = streak_updated(&mut conn, user.id, start + Duration::days(2))
            .await
            .unwrap();
        assert!(!again.updated);
        assert!(outcome.is_empty());

        let (reset, _) = streak_updated(&mut conn, user.id, start + Duration::days(10))
            .await
            .unwrap();
        drop(conn);

        assert_eq!(reset.streak_days, 1);
        assert_eq!(reset.longest_streak, 3);
        // the 3-day milestone is worth 6
        assert_eq!(profile_points(&pool, user.id).await.0, 6);
    }

    #[tokio::test]
    async fn test_invalidate_rankings_evicts_touched_users_only() {
        let cache = create_cache(&CacheConfig::default());
        let ttl = std::time::Duration::from_secs(300);
        cache.set(keys::GLOBAL_RANKINGS, &vec![1_i64], ttl).await.unwrap();
        cache.set(&keys::user_rank(7), &3_i64, ttl).await.unwrap();
        cache.set(&keys::user_rank(8), &4_i64, ttl).await.unwrap();

        // nothing recorded, nothing evicted
        invalidate_rankings(&cache, &CascadeOutcome::default()).await;
        assert_eq!(cache.get::<Vec<i64>>(keys::GLOBAL_RANKINGS).await.unwrap(), Some(vec![1]));

        let outcome = CascadeOutcome {
            transactions: vec![PointTransaction {
                id: 1,
                user_id: 7,
                points: 5,
                transaction_type: TransactionType::DailyLogin,
                description: "Daily login bonus".to_string(),
                reference_id: String::new(),
                metadata: json!({}),
                created_at: Utc::now(),
            }],
            ..Default::default()
        };
        invalidate_rankings(&cache, &outcome).await;
        assert_eq!(cache.get::<Vec<i64>>(keys::GLOBAL_RANKINGS).await.unwrap(), None);
        assert_eq!(cache.get::<i64>(&keys::user_rank(7)).await.unwrap(), None);
        assert_eq!(cache.get::<i64>(&keys::user_rank(8)).await.unwrap(), Some(4));
    }

    #[tokio::test]
    async fn test_daily_login_once_per_day() {
        let pool = test_support::pool().await;
        let user = test_support::user(&pool, "eco@example.com", UserRole::Student).await;
        let morning = Utc::now()
            .date_naive()
            .and_hms_opt(6, 0, 0)
            .unwrap()
            .and_utc();

        let mut conn = pool.acquire().await.unwrap();
        let bonus = daily_login(&mut conn, user.id, morning).await.unwrap();
        assert_eq!(bonus.points_awarded, 10);
        assert_eq!(bonus.streak_bonus, 0);
        assert_eq!(bonus.outcome.achievements.len(), 1);
        assert_eq!(
            bonus.outcome.achievements[0].achievement_type,
            AchievementType::EarlyBird
        );

        let again = daily_login(&mut conn, user.id, morning).await.unwrap();
        drop(conn);
        assert_eq!(again.points_awarded, 0);
        assert_eq!(profile_points(&pool, user.id).await.0, 20);
    }

    #[tokio::test]
    async fn test_admin_transaction_and_summary() {
        let pool = test_support::pool().await;
        let admin = test_support::user(&pool, "admin@example.com", UserRole::Admin).await;
        let student = test_support::user(&pool, "s@example.com", UserRole::Student).await;
        let service = service(&pool);

        let entry = NewTransaction::new(student.id, 40, TransactionType::AdminAdjustment, "welcome", "");
        assert!(matches!(
            service.create_transaction(&student, entry.clone()).await,
            Err(GamificationServiceError::Forbidden(_))
        ));
        let created = service.create_transaction(&admin, entry).await.unwrap();
        assert_eq!(created.points, 40);

        let mut penalty = NewTransaction::new(student.id, -15, TransactionType::Penalty, "late", "");
        service.create_transaction(&admin, penalty.clone()).await.unwrap();
        penalty.points = MAX_TRANSACTION_POINTS + 1;
        assert!(matches!(
            service.create_transaction(&admin, penalty).await,
            Err(GamificationServiceError::ValidationError(_))
        ));

        let summary = service.points_summary(&student).await.unwrap();
        assert_eq!(summary.total_earned, 40);
        assert_eq!(summary.total_spent, 15);
        assert_eq!(summary.current_balance, 25);
        assert_eq!(summary.recent_transactions.len(), 2);

        let own = service
            .list_transactions(&student, None, &ListParams::default())
            .await
            .unwrap();
        assert_eq!(own.total, 2);
        assert!(matches!(
            service.get_transaction(&admin, created.id).await,
            Ok(t) if t.id == created.id
        ));
        let other = test_support::user(&pool, "o@example.com", UserRole::Student).await;
        assert!(matches!(
            service.get_transaction(&other, created.id).await,
            Err(GamificationServiceError::NotFound(_))
        ));
    }
}
