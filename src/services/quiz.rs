//! Quiz service
//!
//! Quiz authoring plus the learner flow: `start` hands out the questions
//! without revealing which answers are correct, `take` scores a submission,
//! stores the attempt and runs the quiz award cascade in one transaction.

use crate::cache::Cache;
use crate::db::repositories::quiz::{count_attempts, insert_attempt, insert_user_answer};
use crate::db::repositories::{
    CategoryRepository, LessonRepository, QuizRepository, RatingRepository, TagRepository,
};
use crate::models::{
    ContentRating, ListParams, PagedResult, Question, QuestionType, Quiz, QuizAttempt, QuizFilter, QuizInput,
    RatingTarget, SubmittedAnswer, UpdateQuizInput, User, UserAnswer,
};
use crate::services::gamification::{self, invalidate_rankings};
use crate::services::lesson::RateInput;
use crate::services::slug::unique_slug;
use crate::services::tag::ensure_tags_exist;
use anyhow::Context;
use argon2::password_hash::rand_core::{OsRng, RngCore};
use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

service_error!(
    /// Error types for quiz operations
    QuizServiceError
);

/// Answer option as shown to a learner
#[derive(Debug, Clone, Serialize)]
pub struct PublicAnswer {
    pub id: i64,
    pub answer_text: String,
}

/// Question as shown to a learner, without correctness
#[derive(Debug, Clone, Serialize)]
pub struct PublicQuestion {
    pub id: i64,
    pub question_text: String,
    pub question_type: QuestionType,
    pub points: i64,
    pub answers: Vec<PublicAnswer>,
}

impl From<&Question> for PublicQuestion {
    fn from(q: &Question) -> Self {
        Self {
            id: q.id,
            question_text: q.question_text.clone(),
            question_type: q.question_type,
            points: q.points,
            answers: q
                .answers
                .iter()
                .map(|a| PublicAnswer {
                    id: a.id,
                    answer_text: a.answer_text.clone(),
                })
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct QuizSession {
    pub quiz: Quiz,
    pub questions: Vec<PublicQuestion>,
    pub attempts_used: i64,
    pub remaining_attempts: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TakeQuizInput {
    pub answers: Vec<SubmittedAnswer>,
    /// Seconds
    pub time_taken: i64,
}

/// Outcome for one submitted answer
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnswerResult {
    pub question_id: i64,
    pub is_correct: bool,
    pub points_earned: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correct_answer_ids: Option<Vec<i64>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TakeQuizResponse {
    pub attempt: QuizAttempt,
    pub results: Vec<AnswerResult>,
    pub points_earned: i64,
}

/// A stored attempt with the answers given
#[derive(Debug, Clone, Serialize)]
pub struct AttemptReview {
    pub attempt: QuizAttempt,
    pub answers: Vec<UserAnswer>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AttemptHistory {
    pub attempts: Vec<QuizAttempt>,
    pub remaining_attempts: i64,
}

/// Scored submission before it is stored
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredAnswers {
    pub answers: Vec<(SubmittedAnswer, bool, i64)>,
    pub earned: i64,
    pub max_points: i64,
    pub correct: i64,
}

impl ScoredAnswers {
    /// Whole percent of the available points, rounded down
    pub fn score(&self) -> i64 {
        if self.max_points <= 0 {
            0
        } else {
            self.earned * 100 / self.max_points
        }
    }
}

/// Whether one submitted answer is correct for its question
pub fn is_correct(question: &Question, answer: &SubmittedAnswer) -> bool {
    if question.question_type.is_choice() {
        answer
            .answer_id
            .and_then(|id| question.answers.iter().find(|a| a.id == id))
            .map(|a| a.is_correct)
            .unwrap_or(false)
    } else if question.question_type.is_text_match() {
        let given = answer.text_answer.as_deref().unwrap_or("").trim().to_lowercase();
        !given.is_empty()
            && question
                .answers
                .iter()
                .filter(|a| a.is_correct)
                .any(|a| a.answer_text.trim().to_lowercase() == given)
    } else {
        false
    }
}

/// Score a submission. Only the first answer per question counts.
pub fn score_answers(questions: &[Question], submitted: &[SubmittedAnswer]) -> ScoredAnswers {
    let by_id: HashMap<i64, &Question> = questions.iter().map(|q| (q.id, q)).collect();
    let mut seen = HashSet::new();
    let mut answers = Vec::new();
    let mut earned = 0;
    let mut correct = 0;

    for answer in submitted {
        let Some(question) = by_id.get(&answer.question_id) else {
            continue;
        };
        if !seen.insert(answer.question_id) {
            continue;
        }
        let ok = is_correct(question, answer);
        let points = if ok { question.points } else { 0 };
        if ok {
            correct += 1;
            earned += points;
        }
        answers.push((answer.clone(), ok, points));
    }

    ScoredAnswers {
        answers,
        earned,
        max_points: questions.iter().map(|q| q.points).sum(),
        correct,
    }
}

/// Fisher-Yates shuffle using the OS random source
pub(crate) fn shuffle<T>(items: &mut [T]) {
    for i in (1..items.len()).rev() {
        let j = (OsRng.next_u64() % (i as u64 + 1)) as usize;
        items.swap(i, j);
    }
}

pub struct QuizService {
    pool: SqlitePool,
    repo: Arc<dyn QuizRepository>,
    lesson_repo: Arc<dyn LessonRepository>,
    category_repo: Arc<dyn CategoryRepository>,
    tag_repo: Arc<dyn TagRepository>,
    rating_repo: Arc<dyn RatingRepository>,
    cache: Arc<Cache>,
}

impl QuizService {
    pub fn new(
        pool: SqlitePool,
        repo: Arc<dyn QuizRepository>,
        lesson_repo: Arc<dyn LessonRepository>,
        category_repo: Arc<dyn CategoryRepository>,
        tag_repo: Arc<dyn TagRepository>,
        rating_repo: Arc<dyn RatingRepository>,
        cache: Arc<Cache>,
    ) -> Self {
        Self {
            pool,
            repo,
            lesson_repo,
            category_repo,
            tag_repo,
            rating_repo,
            cache,
        }
    }

    // ========================================================================
    // Authoring
    // ========================================================================

    pub async fn list(
        &self,
        viewer: Option<&User>,
        mut filter: QuizFilter,
        params: &ListParams,
    ) -> Result<PagedResult<Quiz>, QuizServiceError> {
        filter.published_only = !super::sees_drafts(viewer);
        let (items, total) = self
            .repo
            .list(&filter, params.offset(), params.limit())
            .await
            .context("Failed to list quizzes")?;
        Ok(PagedResult::new(items, total, params))
    }

    pub async fn get(&self, viewer: Option<&User>, id: i64) -> Result<Quiz, QuizServiceError> {
        self.repo
            .get_by_id(id)
            .await
            .context("Failed to get quiz")?
            .filter(|q| q.is_published || super::sees_drafts(viewer))
            .ok_or_else(|| QuizServiceError::not_found("Quiz", id))
    }

    pub async fn create(&self, author: &User, input: QuizInput) -> Result<Quiz, QuizServiceError> {
        super::require_staff(author).map_err(QuizServiceError::Forbidden)?;

        let title = input.title.trim().to_string();
        if title.is_empty() {
            return Err(QuizServiceError::validation("Title is required"));
        }
        check_settings(input.max_attempts, input.passing_score, input.points_reward, input.time_limit)?;
        self.ensure_category(input.category_id).await?;
        if let Some(lesson_id) = input.lesson_id {
            self.ensure_lesson(lesson_id).await?;
        }
        ensure_tags_exist(self.tag_repo.as_ref(), &input.tag_ids)
            .await
            .map_err(QuizServiceError::ValidationError)?;

        let repo = &self.repo;
        let slug = unique_slug(&title, "quiz", |s| async move { repo.slug_exists(&s, 0).await })
            .await
            .context("Failed to generate slug")?;

        let now = Utc::now();
        let quiz = Quiz {
            id: 0,
            title,
            slug,
            description: input.description,
            instructions: input.instructions,
            lesson_id: input.lesson_id,
            category_id: input.category_id,
            tags: Vec::new(),
            author_id: author.id,
            quiz_type: input.quiz_type,
            time_limit: input.time_limit,
            max_attempts: input.max_attempts,
            passing_score: input.passing_score,
            points_reward: input.points_reward,
            shuffle_questions: input.shuffle_questions,
            shuffle_answers: input.shuffle_answers,
            show_correct_answers: input.show_correct_answers,
            allow_review: input.allow_review,
            is_published: input.is_published,
            is_featured: input.is_featured,
            published_at: input.is_published.then_some(now),
            question_count: 0,
            attempt_count: 0,
            average_score: None,
            created_at: now,
            updated_at: now,
        };

        Ok(self
            .repo
            .create(&quiz, &input.tag_ids)
            .await
            .context("Failed to create quiz")?)
    }

    pub async fn update(&self, user: &User, id: i64, input: UpdateQuizInput) -> Result<Quiz, QuizServiceError> {
        let mut quiz = self.authored(user, id).await?;

        if let Some(title) = input.title {
            let title = title.trim().to_string();
            if title.is_empty() {
                return Err(QuizServiceError::validation("Title is required"));
            }
            if title != quiz.title {
                let repo = &self.repo;
                quiz.slug = unique_slug(&title, "quiz", |s| async move { repo.slug_exists(&s, id).await })
                    .await
                    .context("Failed to generate slug")?;
                quiz.title = title;
            }
        }
        if let Some(category_id) = input.category_id {
            self.ensure_category(category_id).await?;
            quiz.category_id = category_id;
        }
        if let Some(lesson_id) = input.lesson_id {
            self.ensure_lesson(lesson_id).await?;
            quiz.lesson_id = Some(lesson_id);
        }
        if let Some(tag_ids) = &input.tag_ids {
            ensure_tags_exist(self.tag_repo.as_ref(), tag_ids)
                .await
                .map_err(QuizServiceError::ValidationError)?;
        }
        if let Some(v) = input.description {
            quiz.description = v;
        }
        if let Some(v) = input.instructions {
            quiz.instructions = v;
        }
        if let Some(v) = input.quiz_type {
            quiz.quiz_type = v;
        }
        if let Some(v) = input.time_limit {
            quiz.time_limit = (v != 0).then_some(v);
        }
        if let Some(v) = input.max_attempts {
            quiz.max_attempts = v;
        }
        if let Some(v) = input.passing_score {
            quiz.passing_score = v;
        }
        if let Some(v) = input.points_reward {
            quiz.points_reward = v;
        }
        if let Some(v) = input.shuffle_questions {
            quiz.shuffle_questions = v;
        }
        if let Some(v) = input.shuffle_answers {
            quiz.shuffle_answers = v;
        }
        if let Some(v) = input.show_correct_answers {
            quiz.show_correct_answers = v;
        }
        if let Some(v) = input.allow_review {
            quiz.allow_review = v;
        }
        if let Some(v) = input.is_featured {
            quiz.is_featured = v;
        }
        if let Some(v) = input.is_published {
            quiz.is_published = v;
        }
        check_settings(quiz.max_attempts, quiz.passing_score, quiz.points_reward, quiz.time_limit)?;

        if quiz.is_published && quiz.published_at.is_none() {
            quiz.published_at = Some(Utc::now());
        }

        Ok(self
            .repo
            .update(&quiz, input.tag_ids.as_deref())
            .await
            .context("Failed to update quiz")?)
    }

    pub async fn delete(&self, user: &User, id: i64) -> Result<(), QuizServiceError> {
        self.authored(user, id).await?;
        self.repo.delete(id).await.context("Failed to delete quiz")?;
        Ok(())
    }

    // ========================================================================
    // Taking quizzes
    // ========================================================================

    pub async fn start(&self, user: &User, id: i64) -> Result<QuizSession, QuizServiceError> {
        let quiz = self.get(Some(user), id).await?;
        let attempts_used = self
            .repo
            .count_attempts(user.id, id)
            .await
            .context("Failed to count attempts")?;
        if attempts_used >= quiz.max_attempts {
            return Err(QuizServiceError::validation(
                "Maximum number of attempts reached",
            ));
        }

        let mut questions: Vec<PublicQuestion> = self
            .repo
            .questions_for_quiz(id)
            .await
            .context("Failed to load questions")?
            .iter()
            .map(PublicQuestion::from)
            .collect();

        if quiz.shuffle_questions {
            shuffle(&mut questions);
        }
        if quiz.shuffle_answers {
            for question in questions.iter_mut() {
                shuffle(&mut question.answers);
            }
        }

        Ok(QuizSession {
            remaining_attempts: quiz.max_attempts - attempts_used,
            quiz,
            questions,
            attempts_used,
        })
    }

    /// Score and store an attempt, then run the award cascade
    pub async fn take(&self, user: &User, id: i64, input: TakeQuizInput) -> Result<TakeQuizResponse, QuizServiceError> {
        let quiz = self.get(Some(user), id).await?;

        if input.time_taken < 1 {
            return Err(QuizServiceError::validation("time_taken must be at least 1 second"));
        }
        if input.answers.is_empty() {
            return Err(QuizServiceError::validation("At least one answer is required"));
        }

        let questions = self
            .repo
            .questions_for_quiz(id)
            .await
            .context("Failed to load questions")?;
        let known: HashSet<i64> = questions.iter().map(|q| q.id).collect();
        if let Some(stray) = input.answers.iter().find(|a| !known.contains(&a.question_id)) {
            return Err(QuizServiceError::validation(format!(
                "Question {} does not belong to this quiz",
                stray.question_id
            )));
        }

        let scored = score_answers(&questions, &input.answers);
        let score = scored.score();
        let now = Utc::now();

        let mut tx = self.pool.begin().await.context("Failed to begin transaction")?;
        let used = count_attempts(&mut *tx, user.id, id).await?;
        if used >= quiz.max_attempts {
            return Err(QuizServiceError::validation(
                "Maximum number of attempts reached",
            ));
        }

        let attempt = insert_attempt(
            &mut *tx,
            &QuizAttempt {
                id: 0,
                user_id: user.id,
                quiz_id: id,
                score,
                total_questions: questions.len() as i64,
                correct_answers: scored.correct,
                time_taken: input.time_taken,
                is_passed: score >= quiz.passing_score,
                attempt_number: used + 1,
                started_at: now - Duration::seconds(input.time_taken),
                completed_at: Some(now),
            },
        )
        .await?;

        let by_id: HashMap<i64, &Question> = questions.iter().map(|q| (q.id, q)).collect();
        for (answer, ok, points) in &scored.answers {
            // Ids outside the question's own options are stored as NULL
            let selected_answer_id = answer.answer_id.filter(|aid| {
                by_id
                    .get(&answer.question_id)
                    .is_some_and(|q| q.answers.iter().any(|a| a.id == *aid))
            });
            insert_user_answer(
                &mut *tx,
                &UserAnswer {
                    id: 0,
                    attempt_id: attempt.id,
                    question_id: answer.question_id,
                    selected_answer_id,
                    text_answer: answer.text_answer.clone().unwrap_or_default(),
                    is_correct: *ok,
                    points_earned: *points,
                },
            )
            .await?;
        }

        let (points_earned, outcome) = gamification::quiz_finished(&mut *tx, &quiz, &attempt).await?;
        tx.commit().await.context("Failed to commit transaction")?;
        invalidate_rankings(&self.cache, &outcome).await;

        let results = scored
            .answers
            .iter()
            .map(|(answer, ok, points)| {
                let question = by_id.get(&answer.question_id);
                AnswerResult {
                    question_id: answer.question_id,
                    is_correct: *ok,
                    points_earned: *points,
                    correct_answer_ids: quiz
                        .show_correct_answers
                        .then(|| question.map(|q| q.correct_answer_ids()).unwrap_or_default()),
                    explanation: quiz
                        .show_correct_answers
                        .then(|| question.map(|q| q.explanation.clone()).unwrap_or_default()),
                }
            })
            .collect();

        tracing::debug!(
            "User {} scored {} on quiz {} (attempt {})",
            user.id,
            score,
            id,
            attempt.attempt_number
        );
        Ok(TakeQuizResponse {
            attempt,
            results,
            points_earned,
        })
    }

    pub async fn attempts(&self, user: &User, id: i64) -> Result<AttemptHistory, QuizServiceError> {
        let quiz = self.get(Some(user), id).await?;
        let attempts = self
            .repo
            .attempts_for_user(user.id, id)
            .await
            .context("Failed to load attempts")?;
        Ok(AttemptHistory {
            remaining_attempts: (quiz.max_attempts - attempts.len() as i64).max(0),
            attempts,
        })
    }

    /// Look back at one attempt. Learners need `allow_review` on the quiz;
    /// the quiz author and admins can always review.
    pub async fn review_attempt(&self, user: &User, id: i64, attempt_id: i64) -> Result<AttemptReview, QuizServiceError> {
        let quiz = self.get(Some(user), id).await?;
        let attempt = self
            .repo
            .get_attempt(attempt_id)
            .await
            .context("Failed to get attempt")?
            .filter(|a| a.quiz_id == id)
            .filter(|a| a.user_id == user.id || user.can_modify(quiz.author_id))
            .ok_or_else(|| QuizServiceError::not_found("Attempt", attempt_id))?;

        if !quiz.allow_review && !user.can_modify(quiz.author_id) {
            return Err(QuizServiceError::forbidden("Review is disabled for this quiz"));
        }

        let answers = self
            .repo
            .answers_for_attempt(attempt.id)
            .await
            .context("Failed to load answers")?;
        Ok(AttemptReview { attempt, answers })
    }

    /// Rate a quiz the user has attempted at least once
    pub async fn rate(&self, user: &User, id: i64, input: RateInput) -> Result<ContentRating, QuizServiceError> {
        self.get(Some(user), id).await?;
        super::rating::check_rating(input.rating).map_err(QuizServiceError::ValidationError)?;
        if self
            .repo
            .count_attempts(user.id, id)
            .await
            .context("Failed to count attempts")?
            == 0
        {
            return Err(QuizServiceError::validation(
                "You must attempt the quiz before rating it",
            ));
        }

        Ok(self
            .rating_repo
            .upsert(user.id, RatingTarget::Quiz(id), input.rating, &input.review)
            .await
            .context("Failed to save rating")?)
    }

    async fn authored(&self, user: &User, id: i64) -> Result<Quiz, QuizServiceError> {
        super::require_staff(user).map_err(QuizServiceError::Forbidden)?;
        let quiz = self.get(Some(user), id).await?;
        if !user.can_modify(quiz.author_id) {
            return Err(QuizServiceError::forbidden(
                "Only the author or an admin can change this quiz",
            ));
        }
        Ok(quiz)
    }

    async fn ensure_category(&self, id: i64) -> Result<(), QuizServiceError> {
        self.category_repo
            .get_by_id(id)
            .await
            .context("Failed to get category")?
            .ok_or_else(|| QuizServiceError::validation(format!("Category {} does not exist", id)))?;
        Ok(())
    }

    async fn ensure_lesson(&self, id: i64) -> Result<(), QuizServiceError> {
        self.lesson_repo
            .get_by_id(id)
            .await
            .context("Failed to get lesson")?
            .ok_or_else(|| QuizServiceError::validation(format!("Lesson {} does not exist", id)))?;
        Ok(())
    }
}

fn check_settings(
    max_attempts: i64,
    passing_score: i64,
    points_reward: i64,
    time_limit: Option<i64>,
) -> Result<(), QuizServiceError> {
    if !(1..=10).contains(&max_attempts) {
        return Err(QuizServiceError::validation("max_attempts must be between 1 and 10"));
    }
    if !(1..=100).contains(&passing_score) {
        return Err(QuizServiceError::validation("passing_score must be between 1 and 100"));
    }
    if !(1..=200).contains(&points_reward) {
        return Err(QuizServiceError::validation("points_reward must be between 1 and 200"));
    }
    if time_limit.is_some_and(|t| t < 1) {
        return Err(QuizServiceError::validation("time_limit must be at least 1 minute"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::create_cache;
    use crate::config::CacheConfig;
    use crate::db::repositories::quiz::tests::{choice_question, new_quiz};
    use crate::db::repositories::{
        test_support, SqlxCategoryRepository, SqlxLessonRepository, SqlxQuizRepository, SqlxRatingRepository,
        SqlxTagRepository,
    };
    use crate::models::{Answer, UserRole};
    use proptest::prelude::*;

    fn question(id: i64, kind: QuestionType, points: i64, answers: &[(i64, &str, bool)]) -> Question {
        Question {
            id,
            quiz_id: 1,
            question_text: format!("Q{}", id),
            question_type: kind,
            explanation: String::new(),
            points,
            sort_order: 0,
            answers: answers
                .iter()
                .map(|(aid, text, correct)| Answer {
                    id: *aid,
                    question_id: id,
                    answer_text: text.to_string(),
                    is_correct: *correct,
                    sort_order: 0,
                })
                .collect(),
            created_at: Utc::now(),
        }
    }

    fn pick(question_id: i64, answer_id: i64) -> SubmittedAnswer {
        SubmittedAnswer {
            question_id,
            answer_id: Some(answer_id),
            text_answer: None,
        }
    }

    fn text(question_id: i64, text: &str) -> SubmittedAnswer {
        SubmittedAnswer {
            question_id,
            answer_id: None,
            text_answer: Some(text.to_string()),
        }
    }

    #[test]
    fn test_is_correct_by_question_type() {
        let choice = question(1, QuestionType::MultipleChoice, 1, &[(10, "A", true), (11, "B", false)]);
        assert!(is_correct(&choice, &pick(1, 10)));
        assert!(!is_correct(&choice, &pick(1, 11)));
        // an answer id from another question never counts
        assert!(!is_correct(&choice, &pick(1, 99)));

        let short = question(2, QuestionType::ShortAnswer, 1, &[(20, "Carbon Dioxide", true)]);
        assert!(is_correct(&short, &text(2, "  carbon dioxide ")));
        assert!(!is_correct(&short, &text(2, "methane")));
        assert!(!is_correct(&short, &text(2, "")));

        let essay = question(3, QuestionType::Essay, 5, &[(30, "anything", true)]);
        assert!(!is_correct(&essay, &text(3, "anything")));
    }

    #[test]
    fn test_score_answers() {
        let questions = vec![
            question(1, QuestionType::MultipleChoice, 2, &[(10, "A", true), (11, "B", false)]),
            question(2, QuestionType::TrueFalse, 1, &[(20, "True", true), (21, "False", false)]),
            question(3, QuestionType::FillBlank, 3, &[(30, "solar", true)]),
        ];

        let scored = score_answers(&questions, &[pick(1, 10), pick(2, 21), text(3, "Solar"), pick(1, 11)]);
        assert_eq!(scored.earned, 5);
        assert_eq!(scored.max_points, 6);
        assert_eq!(scored.correct, 2);
        // 5/6 rounds down
        assert_eq!(scored.score(), 83);
        assert_eq!(scored.answers.len(), 3);

        assert_eq!(score_answers(&[], &[pick(1, 10)]).score(), 0);
    }

    proptest! {
        #[test]
        fn prop_score_in_range(points in proptest::collection::vec(1i64..=10, 1..8), mask in proptest::collection::vec(any::<bool>(), 8)) {
            let questions: Vec<Question> = points
                .iter()
                .enumerate()
                .map(|(i, p)| question(i as i64 + 1, QuestionType::MultipleChoice, *p, &[(100 + i as i64, "A", true), (200 + i as i64, "B", false)]))
                .collect();
            let answers: Vec<SubmittedAnswer> = questions
                .iter()
                .zip(mask.iter())
                .map(|(q, right)| pick(q.id, if *right { q.answers[0].id } else { q.answers[1].id }))
                .collect();

            let scored = score_answers(&questions, &answers);
            prop_assert!((0..=100).contains(&scored.score()));
            prop_assert_eq!(scored.score() == 100, scored.correct as usize == questions.len());
        }
    }

    #[test]
    fn test_shuffle_keeps_elements() {
        let mut items: Vec<i32> = (0..20).collect();
        shuffle(&mut items);
        let mut sorted = items.clone();
        sorted.sort();
        assert_eq!(sorted, (0..20).collect::<Vec<_>>());
    }

    async fn setup() -> (SqlitePool, QuizService, Arc<dyn QuizRepository>, User, User, i64) {
        let pool = test_support::pool().await;
        let teacher = test_support::user(&pool, "t@example.com", UserRole::Teacher).await;
        let student = test_support::user(&pool, "s@example.com", UserRole::Student).await;
        let category = test_support::category(&pool, "Energy").await;
        let repo = SqlxQuizRepository::boxed(pool.clone());
        let service = QuizService::new(
            pool.clone(),
            repo.clone(),
            SqlxLessonRepository::boxed(pool.clone()),
            SqlxCategoryRepository::boxed(pool.clone()),
            SqlxTagRepository::boxed(pool.clone()),
            SqlxRatingRepository::boxed(pool.clone()),
            create_cache(&CacheConfig::default()),
        );
        (pool, service, repo, teacher, student, category)
    }

    #[tokio::test]
    async fn test_start_hides_correct_answers() {
        let (_pool, service, repo, teacher, student, category) = setup().await;
        let quiz = repo.create(&new_quiz("Energy Quiz", category, teacher.id), &[]).await.unwrap();
        repo.create_question(&choice_question(quiz.id, "Q1", 1)).await.unwrap();

        let session = service.start(&student, quiz.id).await.unwrap();
        assert_eq!(session.questions.len(), 1);
        assert_eq!(session.remaining_attempts, 3);

        let json = serde_json::to_value(&session.questions).unwrap();
        assert!(json[0]["answers"][0].get("is_correct").is_none());
    }

    #[tokio::test]
    async fn test_take_scores_and_limits_attempts() {
        let (pool, service, repo, teacher, student, category) = setup().await;
        let mut quiz = new_quiz("Energy Quiz", category, teacher.id);
        quiz.max_attempts = 2;
        let quiz = repo.create(&quiz, &[]).await.unwrap();
        let q1 = repo.create_question(&choice_question(quiz.id, "Q1", 2)).await.unwrap();
        let q2 = repo.create_question(&choice_question(quiz.id, "Q2", 3)).await.unwrap();

        let right = |q: &Question| pick(q.id, q.correct_answer_ids()[0]);
        let wrong = |q: &Question| {
            let id = q.answers.iter().find(|a| !a.is_correct).unwrap().id;
            pick(q.id, id)
        };

        let first = service
            .take(
                &student,
                quiz.id,
                TakeQuizInput {
                    answers: vec![right(&q1), wrong(&q2)],
                    time_taken: 60,
                },
            )
            .await
            .unwrap();
        assert_eq!(first.attempt.score, 40);
        assert!(!first.attempt.is_passed);
        assert_eq!(first.attempt.attempt_number, 1);
        assert_eq!(first.attempt.total_questions, 2);
        // 20 * 1.1 on the first attempt
        assert_eq!(first.points_earned, 22);
        assert_eq!(first.results[1].correct_answer_ids, Some(q2.correct_answer_ids()));

        let second = service
            .take(
                &student,
                quiz.id,
                TakeQuizInput {
                    answers: vec![right(&q1), right(&q2)],
                    time_taken: 45,
                },
            )
            .await
            .unwrap();
        assert_eq!(second.attempt.score, 100);
        assert!(second.attempt.is_passed);
        assert_eq!(second.points_earned, 30);

        assert!(matches!(
            service
                .take(
                    &student,
                    quiz.id,
                    TakeQuizInput {
                        answers: vec![right(&q1)],
                        time_taken: 10,
                    },
                )
                .await,
            Err(QuizServiceError::ValidationError(_))
        ));

        let history = service.attempts(&student, quiz.id).await.unwrap();
        assert_eq!(history.attempts.len(), 2);
        assert_eq!(history.remaining_attempts, 0);

        let review = service.review_attempt(&student, quiz.id, first.attempt.id).await.unwrap();
        assert_eq!(review.answers.len(), 2);
        assert_eq!(review.answers.iter().filter(|a| a.is_correct).count(), 1);

        let other = test_support::user(&pool, "o@example.com", UserRole::Student).await;
        assert!(matches!(
            service.review_attempt(&other, quiz.id, first.attempt.id).await,
            Err(QuizServiceError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_take_rejects_bad_input() {
        let (_pool, service, repo, teacher, student, category) = setup().await;
        let quiz = repo.create(&new_quiz("Energy Quiz", category, teacher.id), &[]).await.unwrap();
        let other = repo.create(&new_quiz("Water Quiz", category, teacher.id), &[]).await.unwrap();
        let q = repo.create_question(&choice_question(quiz.id, "Q1", 1)).await.unwrap();
        let foreign = repo.create_question(&choice_question(other.id, "Q2", 1)).await.unwrap();

        let take = |answers, time_taken| TakeQuizInput { answers, time_taken };
        assert!(service.take(&student, quiz.id, take(vec![], 10)).await.is_err());
        assert!(service
            .take(&student, quiz.id, take(vec![pick(q.id, q.answers[0].id)], 0))
            .await
            .is_err());
        assert!(service
            .take(&student, quiz.id, take(vec![pick(foreign.id, foreign.answers[0].id)], 10))
            .await
            .is_err());

        // nothing was stored
        assert_eq!(service.attempts(&student, quiz.id).await.unwrap().attempts.len(), 0);
    }

    #[tokio::test]
    async fn test_take_stores_unknown_answer_ids_as_null() {
        let (_pool, service, repo, teacher, student, category) = setup().await;
        let quiz = repo.create(&new_quiz("Energy Quiz", category, teacher.id), &[]).await.unwrap();
        let other = repo.create(&new_quiz("Water Quiz", category, teacher.id), &[]).await.unwrap();
        let q1 = repo.create_question(&choice_question(quiz.id, "Q1", 1)).await.unwrap();
        let q2 = repo.create_question(&choice_question(quiz.id, "Q2", 1)).await.unwrap();
        let foreign = repo.create_question(&choice_question(other.id, "Q3", 1)).await.unwrap();

        let response = service
            .take(
                &student,
                quiz.id,
                TakeQuizInput {
                    // an id that does not exist, and one from another quiz's question
                    answers: vec![pick(q1.id, 999_999), pick(q2.id, foreign.correct_answer_ids()[0])],
                    time_taken: 30,
                },
            )
            .await
            .unwrap();
        assert_eq!(response.attempt.score, 0);
        assert_eq!(response.attempt.correct_answers, 0);
        assert!(response.results.iter().all(|r| !r.is_correct));

        let review = service.review_attempt(&student, quiz.id, response.attempt.id).await.unwrap();
        assert_eq!(review.answers.len(), 2);
        assert!(review.answers.iter().all(|a| a.selected_answer_id.is_none()));
        assert!(review.answers.iter().all(|a| a.points_earned == 0));
    }

    #[tokio::test]
    async fn test_authoring_rules() {
        let (_pool, service, _repo, teacher, student, category) = setup().await;
        let input = QuizInput {
            title: "Oceans".to_string(),
            description: String::new(),
            instructions: String::new(),
            lesson_id: None,
            category_id: category,
            tag_ids: Vec::new(),
            quiz_type: Default::default(),
            time_limit: Some(15),
            max_attempts: 3,
            passing_score: 70,
            points_reward: 20,
            shuffle_questions: true,
            shuffle_answers: true,
            show_correct_answers: true,
            allow_review: true,
            is_published: false,
            is_featured: false,
        };

        assert!(matches!(
            service.create(&student, input.clone()).await,
            Err(QuizServiceError::Forbidden(_))
        ));
        let mut bad = input.clone();
        bad.max_attempts = 11;
        assert!(service.create(&teacher, bad).await.is_err());

        let quiz = service.create(&teacher, input).await.unwrap();
        assert!(service.get(Some(&student), quiz.id).await.is_err());
        assert!(service.start(&student, quiz.id).await.is_err());

        let updated = service
            .update(
                &teacher,
                quiz.id,
                UpdateQuizInput {
                    time_limit: Some(0),
                    is_published: Some(true),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.time_limit, None);
        assert!(updated.published_at.is_some());
    }
}
