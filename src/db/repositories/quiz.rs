//! Quiz repository
//!
//! Database operations for quizzes, their questions and answers, and the
//! attempts users make at them.
//!
//! Attempts and their per-question answers are written with the
//! connection-level helpers so they share the scoring cascade's transaction.

use crate::models::{
    round1, Answer, AnswerInput, Question, QuestionInput, Quiz, QuizAttempt, QuizFilter,
    UserAnswer,
};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row, Sqlite, SqliteConnection, SqlitePool};
use std::sync::Arc;

use super::tag::{self, TagTarget};
use super::{like_pattern, parse_enum};

/// Quiz repository trait
#[async_trait]
pub trait QuizRepository: Send + Sync {
    /// Create a quiz with its tags
    async fn create(&self, quiz: &Quiz, tag_ids: &[i64]) -> Result<Quiz>;

    /// Get quiz by ID
    async fn get_by_id(&self, id: i64) -> Result<Option<Quiz>>;

    /// Update a quiz; `tag_ids` replaces the tags when given
    async fn update(&self, quiz: &Quiz, tag_ids: Option<&[i64]>) -> Result<Quiz>;

    /// Delete a quiz
    async fn delete(&self, id: i64) -> Result<()>;

    /// List quizzes matching the filter, newest first
    async fn list(&self, filter: &QuizFilter, offset: i64, limit: i64) -> Result<(Vec<Quiz>, i64)>;

    /// Check if a slug is taken by a quiz other than `exclude_id`
    async fn slug_exists(&self, slug: &str, exclude_id: i64) -> Result<bool>;

    // Questions

    /// Create a question and its answers in one transaction
    async fn create_question(&self, input: &QuestionInput) -> Result<Question>;

    async fn get_question(&self, id: i64) -> Result<Option<Question>>;

    /// Update a question; `answers` replaces every answer when given
    async fn update_question(&self, question: &Question, answers: Option<&[AnswerInput]>) -> Result<Question>;

    async fn delete_question(&self, id: i64) -> Result<()>;

    /// List questions, optionally restricted to one quiz and/or one quiz author
    async fn list_questions(
        &self,
        quiz_id: Option<i64>,
        author_id: Option<i64>,
        offset: i64,
        limit: i64,
    ) -> Result<(Vec<Question>, i64)>;

    /// All questions of a quiz with their answers, in display order
    async fn questions_for_quiz(&self, quiz_id: i64) -> Result<Vec<Question>>;

    // Attempts

    /// Completed attempts a user has made at a quiz
    async fn count_attempts(&self, user_id: i64, quiz_id: i64) -> Result<i64>;

    /// A user's attempts at a quiz, newest first
    async fn attempts_for_user(&self, user_id: i64, quiz_id: i64) -> Result<Vec<QuizAttempt>>;

    async fn get_attempt(&self, id: i64) -> Result<Option<QuizAttempt>>;

    async fn answers_for_attempt(&self, attempt_id: i64) -> Result<Vec<UserAnswer>>;
}

/// SQLx-based quiz repository implementation
pub struct SqlxQuizRepository {
    pool: SqlitePool,
}

impl SqlxQuizRepository {
    /// Create a new SQLx quiz repository
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create a boxed repository for use with dependency injection
    pub fn boxed(pool: SqlitePool) -> Arc<dyn QuizRepository> {
        Arc::new(Self::new(pool))
    }

    async fn with_tags(&self, mut quizzes: Vec<Quiz>) -> Result<Vec<Quiz>> {
        let mut conn = self.pool.acquire().await.context("Failed to acquire connection")?;
        for quiz in quizzes.iter_mut() {
            quiz.tags = tag::get_for(&mut conn, TagTarget::Quiz, quiz.id).await?;
        }
        Ok(quizzes)
    }

    async fn with_answers(&self, mut questions: Vec<Question>) -> Result<Vec<Question>> {
        let mut conn = self.pool.acquire().await.context("Failed to acquire connection")?;
        for question in questions.iter_mut() {
            question.answers = answers_for_question(&mut conn, question.id).await?;
        }
        Ok(questions)
    }
}

const QUIZ_SELECT: &str = r#"
    SELECT q.id, q.title, q.slug, q.description, q.instructions, q.lesson_id, q.category_id,
           q.author_id, q.quiz_type, q.time_limit, q.max_attempts, q.passing_score,
           q.points_reward, q.shuffle_questions, q.shuffle_answers, q.show_correct_answers,
           q.allow_review, q.is_published, q.is_featured, q.published_at, q.created_at, q.updated_at,
           (SELECT COUNT(*) FROM questions qu WHERE qu.quiz_id = q.id) AS question_count,
           (SELECT COUNT(*) FROM quiz_attempts a WHERE a.quiz_id = q.id) AS attempt_count,
           (SELECT AVG(a.score) FROM quiz_attempts a WHERE a.quiz_id = q.id AND a.completed_at IS NOT NULL) AS average_score
    FROM quizzes q
"#;

const QUESTION_COLUMNS: &str =
    "qu.id, qu.quiz_id, qu.question_text, qu.question_type, qu.explanation, qu.points, qu.sort_order, qu.created_at";

const ATTEMPT_COLUMNS: &str = "id, user_id, quiz_id, score, total_questions, correct_answers, \
     time_taken, is_passed, attempt_number, started_at, completed_at";

fn push_filter(qb: &mut QueryBuilder<'_, Sqlite>, filter: &QuizFilter) {
    qb.push(" WHERE 1 = 1");
    if filter.published_only {
        qb.push(" AND q.is_published = 1");
    }
    if let Some(category) = filter.category {
        qb.push(" AND q.category_id = ").push_bind(category);
    }
    if let Some(lesson) = filter.lesson {
        qb.push(" AND q.lesson_id = ").push_bind(lesson);
    }
    if let Some(quiz_type) = filter.quiz_type {
        qb.push(" AND q.quiz_type = ").push_bind(quiz_type.as_str());
    }
    if let Some(featured) = filter.featured {
        qb.push(" AND q.is_featured = ").push_bind(featured);
    }
    if let Some(search) = filter.search.as_deref().filter(|s| !s.trim().is_empty()) {
        let pattern = like_pattern(search);
        qb.push(" AND (q.title LIKE ")
            .push_bind(pattern.clone())
            .push(" ESCAPE '\\' OR q.description LIKE ")
            .push_bind(pattern)
            .push(" ESCAPE '\\')");
    }
}

fn push_question_scope(qb: &mut QueryBuilder<'_, Sqlite>, quiz_id: Option<i64>, author_id: Option<i64>) {
    qb.push(" FROM questions qu JOIN quizzes q ON q.id = qu.quiz_id WHERE 1 = 1");
    if let Some(quiz_id) = quiz_id {
        qb.push(" AND qu.quiz_id = ").push_bind(quiz_id);
    }
    if let Some(author_id) = author_id {
        qb.push(" AND q.author_id = ").push_bind(author_id);
    }
}

#[async_trait]
impl QuizRepository for SqlxQuizRepository {
    async fn create(&self, quiz: &Quiz, tag_ids: &[i64]) -> Result<Quiz> {
        let mut tx = self.pool.begin().await.context("Failed to begin transaction")?;
        let now = Utc::now();

        let result = sqlx::query(
            r#"
            INSERT INTO quizzes (title, slug, description, instructions, lesson_id, category_id,
                                 author_id, quiz_type, time_limit, max_attempts, passing_score,
                                 points_reward, shuffle_questions, shuffle_answers,
                                 show_correct_answers, allow_review, is_published, is_featured,
                                 published_at, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&quiz.title)
        .bind(&quiz.slug)
        .bind(&quiz.description)
        .bind(&quiz.instructions)
        .bind(quiz.lesson_id)
        .bind(quiz.category_id)
        .bind(quiz.author_id)
        .bind(quiz.quiz_type.as_str())
        .bind(quiz.time_limit)
        .bind(quiz.max_attempts)
        .bind(quiz.passing_score)
        .bind(quiz.points_reward)
        .bind(quiz.shuffle_questions)
        .bind(quiz.shuffle_answers)
        .bind(quiz.show_correct_answers)
        .bind(quiz.allow_review)
        .bind(quiz.is_published)
        .bind(quiz.is_featured)
        .bind(quiz.published_at)
        .bind(now)
        .bind(now)
        .execute(&mut *tx)
        .await
        .context("Failed to create quiz")?;
        let id = result.last_insert_rowid();

        replace_tags(&mut tx, id, tag_ids).await?;
        tx.commit().await.context("Failed to commit quiz")?;

        self.get_by_id(id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("Quiz not found after insert"))
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<Quiz>> {
        let row = sqlx::query(&format!("{} WHERE q.id = ?", QUIZ_SELECT))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to get quiz by ID")?;

        match row {
            Some(row) => Ok(self.with_tags(vec![row_to_quiz(&row)?]).await?.pop()),
            None => Ok(None),
        }
    }

    async fn update(&self, quiz: &Quiz, tag_ids: Option<&[i64]>) -> Result<Quiz> {
        let mut tx = self.pool.begin().await.context("Failed to begin transaction")?;

        sqlx::query(
            r#"
            UPDATE quizzes
            SET title = ?, slug = ?, description = ?, instructions = ?, lesson_id = ?,
                category_id = ?, quiz_type = ?, time_limit = ?, max_attempts = ?,
                passing_score = ?, points_reward = ?, shuffle_questions = ?, shuffle_answers = ?,
                show_correct_answers = ?, allow_review = ?, is_published = ?, is_featured = ?,
                published_at = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&quiz.title)
        .bind(&quiz.slug)
        .bind(&quiz.description)
        .bind(&quiz.instructions)
        .bind(quiz.lesson_id)
        .bind(quiz.category_id)
        .bind(quiz.quiz_type.as_str())
        .bind(quiz.time_limit)
        .bind(quiz.max_attempts)
        .bind(quiz.passing_score)
        .bind(quiz.points_reward)
        .bind(quiz.shuffle_questions)
        .bind(quiz.shuffle_answers)
        .bind(quiz.show_correct_answers)
        .bind(quiz.allow_review)
        .bind(quiz.is_published)
        .bind(quiz.is_featured)
        .bind(quiz.published_at)
        .bind(Utc::now())
        .bind(quiz.id)
        .execute(&mut *tx)
        .await
        .context("Failed to update quiz")?;

        if let Some(tag_ids) = tag_ids {
            replace_tags(&mut tx, quiz.id, tag_ids).await?;
        }
        tx.commit().await.context("Failed to commit quiz update")?;

        self.get_by_id(quiz.id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("Quiz not found after update"))
    }

    async fn delete(&self, id: i64) -> Result<()> {
        sqlx::query("DELETE FROM quizzes WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .context("Failed to delete quiz")?;
        Ok(())
    }

    async fn list(&self, filter: &QuizFilter, offset: i64, limit: i64) -> Result<(Vec<Quiz>, i64)> {
        let mut count = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) AS count FROM quizzes q");
        push_filter(&mut count, filter);
        let total: i64 = count
            .build()
            .fetch_one(&self.pool)
            .await
            .context("Failed to count quizzes")?
            .get("count");

        let mut query = QueryBuilder::<Sqlite>::new(QUIZ_SELECT);
        push_filter(&mut query, filter);
        query
            .push(" ORDER BY q.created_at DESC, q.id DESC LIMIT ")
            .push_bind(limit)
            .push(" OFFSET ")
            .push_bind(offset);

        let rows = query
            .build()
            .fetch_all(&self.pool)
            .await
            .context("Failed to list quizzes")?;

        let quizzes = rows.iter().map(row_to_quiz).collect::<Result<Vec<_>>>()?;
        Ok((self.with_tags(quizzes).await?, total))
    }

    async fn slug_exists(&self, slug: &str, exclude_id: i64) -> Result<bool> {
        let row = sqlx::query("SELECT COUNT(*) AS count FROM quizzes WHERE slug = ? AND id != ?")
            .bind(slug)
            .bind(exclude_id)
            .fetch_one(&self.pool)
            .await
            .context("Failed to check quiz slug")?;
        let count: i64 = row.get("count");
        Ok(count > 0)
    }

    // ========================================================================
    // Questions
    // ========================================================================

    async fn create_question(&self, input: &QuestionInput) -> Result<Question> {
        let mut tx = self.pool.begin().await.context("Failed to begin transaction")?;

        let result = sqlx::query(
            r#"
            INSERT INTO questions (quiz_id, question_text, question_type, explanation, points, sort_order, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(input.quiz_id)
        .bind(&input.question_text)
        .bind(input.question_type.as_str())
        .bind(&input.explanation)
        .bind(input.points)
        .bind(input.sort_order)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await
        .context("Failed to create question")?;
        let id = result.last_insert_rowid();

        insert_answers(&mut tx, id, &input.answers).await?;
        tx.commit().await.context("Failed to commit question")?;

        self.get_question(id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("Question not found after insert"))
    }

    async fn get_question(&self, id: i64) -> Result<Option<Question>> {
        let row = sqlx::query(&format!("SELECT {} FROM questions qu WHERE qu.id = ?", QUESTION_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to get question")?;

        match row {
            Some(row) => Ok(self.with_answers(vec![row_to_question(&row)?]).await?.pop()),
            None => Ok(None),
        }
    }

    async fn update_question(&self, question: &Question, answers: Option<&[AnswerInput]>) -> Result<Question> {
        let mut tx = self.pool.begin().await.context("Failed to begin transaction")?;

        sqlx::query(
            r#"
            UPDATE questions
            SET question_text = ?, question_type = ?, explanation = ?, points = ?, sort_order = ?
            WHERE id = ?
            "#,
        )
        .bind(&question.question_text)
        .bind(question.question_type.as_str())
        .bind(&question.explanation)
        .bind(question.points)
        .bind(question.sort_order)
        .bind(question.id)
        .execute(&mut *tx)
        .await
        .context("Failed to update question")?;

        if let Some(answers) = answers {
            sqlx::query("DELETE FROM answers WHERE question_id = ?")
                .bind(question.id)
                .execute(&mut *tx)
                .await
                .context("Failed to clear answers")?;
            insert_answers(&mut tx, question.id, answers).await?;
        }
        tx.commit().await.context("Failed to commit question update")?;

        self.get_question(question.id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("Question not found after update"))
    }

    async fn delete_question(&self, id: i64) -> Result<()> {
        sqlx::query("DELETE FROM questions WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .context("Failed to delete question")?;
        Ok(())
    }

    async fn list_questions(
        &self,
        quiz_id: Option<i64>,
        author_id: Option<i64>,
        offset: i64,
        limit: i64,
    ) -> Result<(Vec<Question>, i64)> {
        let mut count = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) AS count");
        push_question_scope(&mut count, quiz_id, author_id);
        let total: i64 = count
            .build()
            .fetch_one(&self.pool)
            .await
            .context("Failed to count questions")?
            .get("count");

        let mut query = QueryBuilder::<Sqlite>::new(format!("SELECT {}", QUESTION_COLUMNS));
        push_question_scope(&mut query, quiz_id, author_id);
        query
            .push(" ORDER BY qu.quiz_id ASC, qu.sort_order ASC, qu.id ASC LIMIT ")
            .push_bind(limit)
            .push(" OFFSET ")
            .push_bind(offset);

        let rows = query
            .build()
            .fetch_all(&self.pool)
            .await
            .context("Failed to list questions")?;

        let questions = rows.iter().map(row_to_question).collect::<Result<Vec<_>>>()?;
        Ok((self.with_answers(questions).await?, total))
    }

    async fn questions_for_quiz(&self, quiz_id: i64) -> Result<Vec<Question>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM questions qu WHERE qu.quiz_id = ? ORDER BY qu.sort_order ASC, qu.id ASC",
            QUESTION_COLUMNS
        ))
        .bind(quiz_id)
        .fetch_all(&self.pool)
        .await
        .context("Failed to load quiz questions")?;

        let questions = rows.iter().map(row_to_question).collect::<Result<Vec<_>>>()?;
        self.with_answers(questions).await
    }

    // ========================================================================
    // Attempts
    // ========================================================================

    async fn count_attempts(&self, user_id: i64, quiz_id: i64) -> Result<i64> {
        let mut conn = self.pool.acquire().await.context("Failed to acquire connection")?;
        count_attempts(&mut conn, user_id, quiz_id).await
    }

    async fn attempts_for_user(&self, user_id: i64, quiz_id: i64) -> Result<Vec<QuizAttempt>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM quiz_attempts WHERE user_id = ? AND quiz_id = ? ORDER BY attempt_number DESC",
            ATTEMPT_COLUMNS
        ))
        .bind(user_id)
        .bind(quiz_id)
        .fetch_all(&self.pool)
        .await
        .context("Failed to list quiz attempts")?;

        Ok(rows.iter().map(row_to_attempt).collect())
    }

    async fn get_attempt(&self, id: i64) -> Result<Option<QuizAttempt>> {
        let row = sqlx::query(&format!("SELECT {} FROM quiz_attempts WHERE id = ?", ATTEMPT_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to get quiz attempt")?;

        Ok(row.as_ref().map(row_to_attempt))
    }

    async fn answers_for_attempt(&self, attempt_id: i64) -> Result<Vec<UserAnswer>> {
        let rows = sqlx::query(
            r#"
            SELECT id, attempt_id, question_id, selected_answer_id, text_answer, is_correct, points_earned
            FROM user_answers
            WHERE attempt_id = ?
            ORDER BY id
            "#,
        )
        .bind(attempt_id)
        .fetch_all(&self.pool)
        .await
        .context("Failed to list attempt answers")?;

        Ok(rows
            .iter()
            .map(|row| UserAnswer {
                id: row.get("id"),
                attempt_id: row.get("attempt_id"),
                question_id: row.get("question_id"),
                selected_answer_id: row.get("selected_answer_id"),
                text_answer: row.get("text_answer"),
                is_correct: row.get("is_correct"),
                points_earned: row.get("points_earned"),
            })
            .collect())
    }
}

// ============================================================================
// Connection-level helpers
// ============================================================================

/// Attempts a user has made at a quiz, on an existing connection
pub async fn count_attempts(conn: &mut SqliteConnection, user_id: i64, quiz_id: i64) -> Result<i64> {
    let row = sqlx::query("SELECT COUNT(*) AS count FROM quiz_attempts WHERE user_id = ? AND quiz_id = ?")
        .bind(user_id)
        .bind(quiz_id)
        .fetch_one(&mut *conn)
        .await
        .context("Failed to count quiz attempts")?;
    Ok(row.get("count"))
}

/// Insert a finished attempt and return it with its ID
pub async fn insert_attempt(conn: &mut SqliteConnection, attempt: &QuizAttempt) -> Result<QuizAttempt> {
    let result = sqlx::query(
        r#"
        INSERT INTO quiz_attempts (user_id, quiz_id, score, total_questions, correct_answers,
                                   time_taken, is_passed, attempt_number, started_at, completed_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(attempt.user_id)
    .bind(attempt.quiz_id)
    .bind(attempt.score)
    .bind(attempt.total_questions)
    .bind(attempt.correct_answers)
    .bind(attempt.time_taken)
    .bind(attempt.is_passed)
    .bind(attempt.attempt_number)
    .bind(attempt.started_at)
    .bind(attempt.completed_at)
    .execute(&mut *conn)
    .await
    .context("Failed to record quiz attempt")?;

    Ok(QuizAttempt {
        id: result.last_insert_rowid(),
        ..attempt.clone()
    })
}

/// Insert one graded answer; a repeated question in the same attempt is ignored
pub async fn insert_user_answer(conn: &mut SqliteConnection, answer: &UserAnswer) -> Result<()> {
    sqlx::query(
        r#"
        INSERT OR IGNORE INTO user_answers (attempt_id, question_id, selected_answer_id, text_answer, is_correct, points_earned)
        VALUES (?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(answer.attempt_id)
    .bind(answer.question_id)
    .bind(answer.selected_answer_id)
    .bind(&answer.text_answer)
    .bind(answer.is_correct)
    .bind(answer.points_earned)
    .execute(&mut *conn)
    .await
    .context("Failed to record answer")?;
    Ok(())
}

async fn answers_for_question(conn: &mut SqliteConnection, question_id: i64) -> Result<Vec<Answer>> {
    let rows = sqlx::query(
        "SELECT id, question_id, answer_text, is_correct, sort_order FROM answers WHERE question_id = ? ORDER BY sort_order ASC, id ASC",
    )
    .bind(question_id)
    .fetch_all(&mut *conn)
    .await
    .context("Failed to load answers")?;

    Ok(rows
        .iter()
        .map(|row| Answer {
            id: row.get("id"),
            question_id: row.get("question_id"),
            answer_text: row.get("answer_text"),
            is_correct: row.get("is_correct"),
            sort_order: row.get("sort_order"),
        })
        .collect())
}

async fn insert_answers(conn: &mut SqliteConnection, question_id: i64, answers: &[AnswerInput]) -> Result<()> {
    for answer in answers {
        sqlx::query(
            "INSERT INTO answers (question_id, answer_text, is_correct, sort_order) VALUES (?, ?, ?, ?)",
        )
        .bind(question_id)
        .bind(&answer.answer_text)
        .bind(answer.is_correct)
        .bind(answer.sort_order)
        .execute(&mut *conn)
        .await
        .context("Failed to create answer")?;
    }
    Ok(())
}

async fn replace_tags(conn: &mut SqliteConnection, quiz_id: i64, tag_ids: &[i64]) -> Result<()> {
    sqlx::query("DELETE FROM quiz_tags WHERE quiz_id = ?")
        .bind(quiz_id)
        .execute(&mut *conn)
        .await
        .context("Failed to clear quiz tags")?;
    for tag_id in tag_ids {
        sqlx::query("INSERT OR IGNORE INTO quiz_tags (quiz_id, tag_id) VALUES (?, ?)")
            .bind(quiz_id)
            .bind(tag_id)
            .execute(&mut *conn)
            .await
            .context("Failed to attach quiz tag")?;
    }
    Ok(())
}

// ============================================================================
// Row mapping
// ============================================================================

fn row_to_quiz(row: &SqliteRow) -> Result<Quiz> {
    let average_score: Option<f64> = row.get("average_score");
    Ok(Quiz {
        id: row.get("id"),
        title: row.get("title"),
        slug: row.get("slug"),
        description: row.get("description"),
        instructions: row.get("instructions"),
        lesson_id: row.get("lesson_id"),
        category_id: row.get("category_id"),
        tags: Vec::new(),
        author_id: row.get("author_id"),
        quiz_type: parse_enum(row, "quiz_type")?,
        time_limit: row.get("time_limit"),
        max_attempts: row.get("max_attempts"),
        passing_score: row.get("passing_score"),
        points_reward: row.get("points_reward"),
        shuffle_questions: row.get("shuffle_questions"),
        shuffle_answers: row.get("shuffle_answers"),
        show_correct_answers: row.get("show_correct_answers"),
        allow_review: row.get("allow_review"),
        is_published: row.get("is_published"),
        is_featured: row.get("is_featured"),
        published_at: row.get("published_at"),
        question_count: row.get("question_count"),
        attempt_count: row.get("attempt_count"),
        average_score: average_score.map(round1),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

fn row_to_question(row: &SqliteRow) -> Result<Question> {
    Ok(Question {
        id: row.get("id"),
        quiz_id: row.get("quiz_id"),
        question_text: row.get("question_text"),
        question_type: parse_enum(row, "question_type")?,
        explanation: row.get("explanation"),
        points: row.get("points"),
        sort_order: row.get("sort_order"),
        answers: Vec::new(),
        created_at: row.get("created_at"),
    })
}

fn row_to_attempt(row: &SqliteRow) -> QuizAttempt {
    QuizAttempt {
        id: row.get("id"),
        user_id: row.get("user_id"),
        quiz_id: row.get("quiz_id"),
        score: row.get("score"),
        total_questions: row.get("total_questions"),
        correct_answers: row.get("correct_answers"),
        time_taken: row.get("time_taken"),
        is_passed: row.get("is_passed"),
        attempt_number: row.get("attempt_number"),
        started_at: row.get("started_at"),
        completed_at: row.get("completed_at"),
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::db::repositories::test_support;
    use crate::models::{QuestionType, QuizType, UserRole};

    pub(crate) fn new_quiz(title: &str, category_id: i64, author_id: i64) -> Quiz {
        let now = Utc::now();
        Quiz {
            id: 0,
            title: title.to_string(),
            slug: title.to_lowercase().replace(' ', "-"),
            description: String::new(),
            instructions: String::new(),
            lesson_id: None,
            category_id,
            tags: Vec::new(),
            author_id,
            quiz_type: QuizType::Practice,
            time_limit: None,
            max_attempts: 3,
            passing_score: 70,
            points_reward: 20,
            shuffle_questions: false,
            shuffle_answers: false,
            show_correct_answers: true,
            allow_review: true,
            is_published: true,
            is_featured: false,
            published_at: Some(now),
            question_count: 0,
            attempt_count: 0,
            average_score: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub(crate) fn choice_question(quiz_id: i64, text: &str, points: i64) -> QuestionInput {
        QuestionInput {
            quiz_id,
            question_text: text.to_string(),
            question_type: QuestionType::MultipleChoice,
            explanation: String::new(),
            points,
            sort_order: 0,
            answers: vec![
                AnswerInput {
                    answer_text: "Right".to_string(),
                    is_correct: true,
                    sort_order: 0,
                },
                AnswerInput {
                    answer_text: "Wrong".to_string(),
                    is_correct: false,
                    sort_order: 1,
                },
            ],
        }
    }

    #[tokio::test]
    async fn test_questions_with_answers() {
        let pool = test_support::pool().await;
        let author = test_support::user(&pool, "t@example.com", UserRole::Teacher).await;
        let category_id = test_support::category(&pool, "Energy").await;
        let repo = SqlxQuizRepository::new(pool);

        let quiz = repo.create(&new_quiz("Energy Quiz", category_id, author.id), &[]).await.unwrap();
        let question = repo.create_question(&choice_question(quiz.id, "Q1", 2)).await.unwrap();
        assert_eq!(question.answers.len(), 2);
        assert_eq!(question.correct_answer_ids().len(), 1);

        let replacement = vec![AnswerInput {
            answer_text: "Only".to_string(),
            is_correct: true,
            sort_order: 0,
        }];
        let updated = repo.update_question(&question, Some(&replacement)).await.unwrap();
        assert_eq!(updated.answers.len(), 1);

        let reloaded = repo.get_by_id(quiz.id).await.unwrap().unwrap();
        assert_eq!(reloaded.question_count, 1);

        let (_, total) = repo.list_questions(None, Some(author.id), 0, 20).await.unwrap();
        assert_eq!(total, 1);
        let (_, total) = repo.list_questions(None, Some(author.id + 100), 0, 20).await.unwrap();
        assert_eq!(total, 0);
    }

    #[tokio::test]
    async fn test_attempt_bookkeeping() {
        let pool = test_support::pool().await;
        let author = test_support::user(&pool, "t@example.com", UserRole::Teacher).await;
        let student = test_support::user(&pool, "s@example.com", UserRole::Student).await;
        let category_id = test_support::category(&pool, "Energy").await;
        let repo = SqlxQuizRepository::new(pool.clone());
        let quiz = repo.create(&new_quiz("Energy Quiz", category_id, author.id), &[]).await.unwrap();

        let now = Utc::now();
        let attempt = QuizAttempt {
            id: 0,
            user_id: student.id,
            quiz_id: quiz.id,
            score: 80,
            total_questions: 1,
            correct_answers: 1,
            time_taken: 30,
            is_passed: true,
            attempt_number: 1,
            started_at: now,
            completed_at: Some(now),
        };
        let mut conn = pool.acquire().await.unwrap();
        let saved = insert_attempt(&mut conn, &attempt).await.unwrap();
        assert!(saved.id > 0);
        assert_eq!(count_attempts(&mut conn, student.id, quiz.id).await.unwrap(), 1);
        drop(conn);

        let attempts = repo.attempts_for_user(student.id, quiz.id).await.unwrap();
        assert_eq!(attempts.len(), 1);
        let reloaded = repo.get_by_id(quiz.id).await.unwrap().unwrap();
        assert_eq!(reloaded.attempt_count, 1);
        assert_eq!(reloaded.average_score, Some(80.0));
    }
}
