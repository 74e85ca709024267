//! Carbon footprint service
//!
//! `calculate` is a preview and stores nothing. `create` keeps the inputs
//! together with the computed results.

use crate::db::repositories::{CarbonRepository, ChallengeRepository};
use crate::models::{CarbonFootprint, CarbonInput, CarbonResult, ListParams, PagedResult, User};
use anyhow::Context;
use std::sync::Arc;

service_error!(
    /// Error types for carbon footprint operations
    CarbonServiceError
);

pub struct CarbonService {
    repo: Arc<dyn CarbonRepository>,
    challenge_repo: Arc<dyn ChallengeRepository>,
}

impl CarbonService {
    pub fn new(repo: Arc<dyn CarbonRepository>, challenge_repo: Arc<dyn ChallengeRepository>) -> Self {
        Self { repo, challenge_repo }
    }

    pub fn calculate(&self, input: &CarbonInput) -> Result<CarbonResult, CarbonServiceError> {
        input.validate().map_err(CarbonServiceError::ValidationError)?;
        Ok(input.calculate())
    }

    pub async fn create(&self, user: &User, input: CarbonInput) -> Result<CarbonFootprint, CarbonServiceError> {
        let result = self.calculate(&input)?;
        if let Some(challenge_id) = input.challenge_id {
            self.challenge_repo
                .get_by_id(challenge_id)
                .await
                .context("Failed to get challenge")?
                .ok_or_else(|| CarbonServiceError::validation(format!("Challenge {} does not exist", challenge_id)))?;
        }

        let footprint = self
            .repo
            .create(user.id, &input, &result)
            .await
            .context("Failed to store footprint")?;
        tracing::debug!(
            "User {} recorded a footprint of {} kg (score {})",
            user.id,
            result.total_emissions,
            result.eco_score
        );
        Ok(footprint)
    }

    /// Own footprints; admins see everyone's
    pub async fn list(&self, viewer: &User, params: &ListParams) -> Result<PagedResult<CarbonFootprint>, CarbonServiceError> {
        let scope = (!viewer.is_admin()).then_some(viewer.id);
        let (items, total) = self
            .repo
            .list(scope, params.offset(), params.limit())
            .await
            .context("Failed to list footprints")?;
        Ok(PagedResult::new(items, total, params))
    }

    pub async fn get(&self, viewer: &User, id: i64) -> Result<CarbonFootprint, CarbonServiceError> {
        self.repo
            .get_by_id(id)
            .await
            .context("Failed to get footprint")?
            .filter(|f| viewer.can_modify(f.user_id))
            .ok_or_else(|| CarbonServiceError::not_found("Carbon footprint", id))
    }

    pub async fn delete(&self, viewer: &User, id: i64) -> Result<(), CarbonServiceError> {
        self.get(viewer, id).await?;
        self.repo.delete(id).await.context("Failed to delete footprint")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::{test_support, SqlxCarbonRepository, SqlxChallengeRepository};
    use crate::models::UserRole;

    fn commuter() -> CarbonInput {
        CarbonInput {
            car_distance: 100.0,
            car_efficiency: 8.0,
            electricity_usage: 300.0,
            renewable_energy: 20.0,
            meat_consumption: 5.0,
            local_food: 20.0,
            waste_recycling: 50.0,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_calculate_and_persist() {
        let pool = test_support::pool().await;
        let alice = test_support::user(&pool, "alice@example.com", UserRole::Student).await;
        let bob = test_support::user(&pool, "bob@example.com", UserRole::Student).await;
        let admin = test_support::user(&pool, "admin@example.com", UserRole::Admin).await;
        let service = CarbonService::new(
            SqlxCarbonRepository::boxed(pool.clone()),
            SqlxChallengeRepository::boxed(pool.clone()),
        );

        let preview = service.calculate(&commuter()).unwrap();
        // 100 * 52 * 8 / 100 * 2.31
        assert_eq!(preview.transport_emissions, 960.96);
        assert_eq!(service.list(&alice, &ListParams::default()).await.unwrap().total, 0);

        let mut bad = commuter();
        bad.renewable_energy = 120.0;
        assert!(matches!(
            service.create(&alice, bad).await,
            Err(CarbonServiceError::ValidationError(_))
        ));
        let mut missing = commuter();
        missing.challenge_id = Some(42);
        assert!(service.create(&alice, missing).await.is_err());

        let saved = service.create(&alice, commuter()).await.unwrap();
        assert_eq!(saved.result.total_emissions, preview.total_emissions);

        assert!(matches!(
            service.get(&bob, saved.id).await,
            Err(CarbonServiceError::NotFound(_))
        ));
        assert_eq!(service.list(&admin, &ListParams::default()).await.unwrap().total, 1);

        service.delete(&alice, saved.id).await.unwrap();
        assert!(service.get(&alice, saved.id).await.is_err());
    }
}
