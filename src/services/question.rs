//! Question service
//!
//! Questions are authoring material: only teachers and admins reach them,
//! and a teacher works only with the questions of their own quizzes.

use crate::db::repositories::QuizRepository;
use crate::models::{
    AnswerInput, ListParams, PagedResult, Question, QuestionInput, QuestionType, Quiz, UpdateQuestionInput, User,
};
use anyhow::Context;
use std::sync::Arc;

service_error!(
    /// Error types for question operations
    QuestionServiceError
);

/// Check the answer set against the question type
pub fn check_answers(kind: QuestionType, answers: &[AnswerInput]) -> Result<(), String> {
    let correct = answers.iter().filter(|a| a.is_correct).count();
    if answers.iter().any(|a| a.answer_text.trim().is_empty()) {
        return Err("Answer text cannot be empty".to_string());
    }
    match kind {
        QuestionType::MultipleChoice => {
            if answers.len() < 2 {
                return Err("Multiple choice questions need at least 2 answers".to_string());
            }
            if correct == 0 {
                return Err("Multiple choice questions need at least one correct answer".to_string());
            }
        }
        QuestionType::TrueFalse => {
            if answers.len() != 2 || correct != 1 {
                return Err("True/false questions need exactly 2 answers with one correct".to_string());
            }
        }
        _ => {}
    }
    Ok(())
}

fn check_points(points: i64) -> Result<(), String> {
    if (1..=10).contains(&points) {
        Ok(())
    } else {
        Err("Question points must be between 1 and 10".to_string())
    }
}

pub struct QuestionService {
    quiz_repo: Arc<dyn QuizRepository>,
}

impl QuestionService {
    pub fn new(quiz_repo: Arc<dyn QuizRepository>) -> Self {
        Self { quiz_repo }
    }

    /// Questions visible to the caller, optionally for one quiz
    pub async fn list(
        &self,
        user: &User,
        quiz_id: Option<i64>,
        params: &ListParams,
    ) -> Result<PagedResult<Question>, QuestionServiceError> {
        super::require_staff(user).map_err(QuestionServiceError::Forbidden)?;
        let author = (!user.is_admin()).then_some(user.id);
        let (items, total) = self
            .quiz_repo
            .list_questions(quiz_id, author, params.offset(), params.limit())
            .await
            .context("Failed to list questions")?;
        Ok(PagedResult::new(items, total, params))
    }

    pub async fn get(&self, user: &User, id: i64) -> Result<Question, QuestionServiceError> {
        super::require_staff(user).map_err(QuestionServiceError::Forbidden)?;
        let question = self
            .quiz_repo
            .get_question(id)
            .await
            .context("Failed to get question")?
            .ok_or_else(|| QuestionServiceError::not_found("Question", id))?;

        // a teacher never learns about other authors' questions
        match self.owned_quiz(user, question.quiz_id).await {
            Ok(_) => Ok(question),
            Err(QuestionServiceError::Forbidden(_)) => Err(QuestionServiceError::not_found("Question", id)),
            Err(e) => Err(e),
        }
    }

    pub async fn create(&self, user: &User, input: QuestionInput) -> Result<Question, QuestionServiceError> {
        super::require_staff(user).map_err(QuestionServiceError::Forbidden)?;
        self.owned_quiz(user, input.quiz_id).await?;

        if input.question_text.trim().is_empty() {
            return Err(QuestionServiceError::validation("Question text is required"));
        }
        check_points(input.points).map_err(QuestionServiceError::ValidationError)?;
        check_answers(input.question_type, &input.answers).map_err(QuestionServiceError::ValidationError)?;

        Ok(self
            .quiz_repo
            .create_question(&input)
            .await
            .context("Failed to create question")?)
    }

    pub async fn update(
        &self,
        user: &User,
        id: i64,
        input: UpdateQuestionInput,
    ) -> Result<Question, QuestionServiceError> {
        let mut question = self.get(user, id).await?;

        if let Some(text) = input.question_text {
            if text.trim().is_empty() {
                return Err(QuestionServiceError::validation("Question text is required"));
            }
            question.question_text = text;
        }
        if let Some(kind) = input.question_type {
            question.question_type = kind;
        }
        if let Some(explanation) = input.explanation {
            question.explanation = explanation;
        }
        if let Some(points) = input.points {
            check_points(points).map_err(QuestionServiceError::ValidationError)?;
            question.points = points;
        }
        if let Some(order) = input.sort_order {
            question.sort_order = order;
        }

        // a type change is checked against the answers that will be stored
        let answers: Vec<AnswerInput> = match &input.answers {
            Some(answers) => answers.clone(),
            None => question
                .answers
                .iter()
                .map(|a| AnswerInput {
                    answer_text: a.answer_text.clone(),
                    is_correct: a.is_correct,
                    sort_order: a.sort_order,
                })
                .collect(),
        };
        check_answers(question.question_type, &answers).map_err(QuestionServiceError::ValidationError)?;

        Ok(self
            .quiz_repo
            .update_question(&question, input.answers.as_deref())
            .await
            .context("Failed to update question")?)
    }

    pub async fn delete(&self, user: &User, id: i64) -> Result<(), QuestionServiceError> {
        self.get(user, id).await?;
        self.quiz_repo
            .delete_question(id)
            .await
            .context("Failed to delete question")?;
        Ok(())
    }

    async fn owned_quiz(&self, user: &User, quiz_id: i64) -> Result<Quiz, QuestionServiceError> {
        let quiz = self
            .quiz_repo
            .get_by_id(quiz_id)
            .await
            .context("Failed to get quiz")?
            .ok_or_else(|| QuestionServiceError::validation(format!("Quiz {} does not exist", quiz_id)))?;
        if !user.can_modify(quiz.author_id) {
            return Err(QuestionServiceError::forbidden(
                "You can only manage questions of your own quizzes",
            ));
        }
        Ok(quiz)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::quiz::tests::{choice_question, new_quiz};
    use crate::db::repositories::{test_support, SqlxQuizRepository};
    use crate::models::UserRole;

    fn answer(text: &str, is_correct: bool) -> AnswerInput {
        AnswerInput {
            answer_text: text.to_string(),
            is_correct,
            sort_order: 0,
        }
    }

    #[test]
    fn test_check_answers() {
        let mc = QuestionType::MultipleChoice;
        assert!(check_answers(mc, &[answer("A", true), answer("B", false)]).is_ok());
        assert!(check_answers(mc, &[answer("A", true)]).is_err());
        assert!(check_answers(mc, &[answer("A", false), answer("B", false)]).is_err());

        let tf = QuestionType::TrueFalse;
        assert!(check_answers(tf, &[answer("True", true), answer("False", false)]).is_ok());
        assert!(check_answers(tf, &[answer("True", true), answer("False", true)]).is_err());
        assert!(check_answers(tf, &[answer("True", true), answer("False", false), answer("Maybe", false)]).is_err());

        assert!(check_answers(QuestionType::Essay, &[]).is_ok());
        assert!(check_answers(QuestionType::ShortAnswer, &[answer("  ", true)]).is_err());
    }

    #[tokio::test]
    async fn test_teachers_see_only_their_questions() {
        let pool = test_support::pool().await;
        let alice = test_support::user(&pool, "alice@example.com", UserRole::Teacher).await;
        let bob = test_support::user(&pool, "bob@example.com", UserRole::Teacher).await;
        let admin = test_support::user(&pool, "admin@example.com", UserRole::Admin).await;
        let student = test_support::user(&pool, "s@example.com", UserRole::Student).await;
        let category = test_support::category(&pool, "Energy").await;

        let repo = SqlxQuizRepository::boxed(pool.clone());
        let quiz = repo.create(&new_quiz("Alice Quiz", category, alice.id), &[]).await.unwrap();
        let service = QuestionService::new(repo);

        let question = service.create(&alice, choice_question(quiz.id, "Q1", 2)).await.unwrap();
        assert!(matches!(
            service.create(&bob, choice_question(quiz.id, "Q2", 2)).await,
            Err(QuestionServiceError::Forbidden(_))
        ));
        assert!(matches!(
            service.list(&student, None, &ListParams::default()).await,
            Err(QuestionServiceError::Forbidden(_))
        ));

        assert_eq!(service.list(&alice, None, &ListParams::default()).await.unwrap().total, 1);
        assert_eq!(service.list(&bob, None, &ListParams::default()).await.unwrap().total, 0);
        assert_eq!(service.list(&admin, Some(quiz.id), &ListParams::default()).await.unwrap().total, 1);
        assert!(matches!(
            service.get(&bob, question.id).await,
            Err(QuestionServiceError::NotFound(_))
        ));

        let mut bad = choice_question(quiz.id, "Q3", 11);
        assert!(service.create(&alice, bad.clone()).await.is_err());
        bad.points = 1;
        bad.answers.truncate(1);
        assert!(service.create(&alice, bad).await.is_err());
    }

    #[tokio::test]
    async fn test_update_checks_type_against_answers() {
        let pool = test_support::pool().await;
        let teacher = test_support::user(&pool, "t@example.com", UserRole::Teacher).await;
        let category = test_support::category(&pool, "Energy").await;
        let repo = SqlxQuizRepository::boxed(pool.clone());
        let quiz = repo.create(&new_quiz("Quiz", category, teacher.id), &[]).await.unwrap();
        let service = QuestionService::new(repo);

        let question = service.create(&teacher, choice_question(quiz.id, "Q1", 1)).await.unwrap();

        // Right/Wrong with one correct also satisfies true/false
        let updated = service
            .update(
                &teacher,
                question.id,
                UpdateQuestionInput {
                    question_type: Some(QuestionType::TrueFalse),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.question_type, QuestionType::TrueFalse);

        let three = UpdateQuestionInput {
            answers: Some(vec![answer("A", true), answer("B", false), answer("C", false)]),
            ..Default::default()
        };
        assert!(service.update(&teacher, question.id, three).await.is_err());

        service.delete(&teacher, question.id).await.unwrap();
        assert!(service.get(&teacher, question.id).await.is_err());
    }
}
