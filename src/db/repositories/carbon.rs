//! Carbon footprint repository
//!
//! Stores calculator inputs together with the results computed at save time.

use crate::models::{CarbonFootprint, CarbonInput, CarbonResult};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use std::sync::Arc;

/// Carbon footprint repository trait
#[async_trait]
pub trait CarbonRepository: Send + Sync {
    /// Persist inputs and their computed result for a user
    async fn create(&self, user_id: i64, input: &CarbonInput, result: &CarbonResult) -> Result<CarbonFootprint>;

    async fn get_by_id(&self, id: i64) -> Result<Option<CarbonFootprint>>;

    /// List footprints, restricted to one user when `user_id` is given
    async fn list(&self, user_id: Option<i64>, offset: i64, limit: i64) -> Result<(Vec<CarbonFootprint>, i64)>;

    async fn delete(&self, id: i64) -> Result<()>;
}

/// SQLx-based carbon footprint repository implementation
pub struct SqlxCarbonRepository {
    pool: SqlitePool,
}

impl SqlxCarbonRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: SqlitePool) -> Arc<dyn CarbonRepository> {
        Arc::new(Self::new(pool))
    }
}

const FOOTPRINT_COLUMNS: &str = "id, user_id, challenge_id, car_distance, car_efficiency, \
     public_transport_distance, flights_short, flights_long, electricity_usage, heating_gas, \
     renewable_energy, meat_consumption, local_food, waste_recycling, transport_emissions, \
     energy_emissions, lifestyle_emissions, total_emissions, eco_score, recommendations, \
     created_at, updated_at";

#[async_trait]
impl CarbonRepository for SqlxCarbonRepository {
    async fn create(&self, user_id: i64, input: &CarbonInput, result: &CarbonResult) -> Result<CarbonFootprint> {
        let now = Utc::now();
        let recommendations =
            serde_json::to_string(&result.recommendations).context("Failed to encode recommendations")?;

        let inserted = sqlx::query(
            r#"
            INSERT INTO carbon_footprints (user_id, challenge_id, car_distance, car_efficiency,
                                           public_transport_distance, flights_short, flights_long,
                                           electricity_usage, heating_gas, renewable_energy,
                                           meat_consumption, local_food, waste_recycling,
                                           transport_emissions, energy_emissions, lifestyle_emissions,
                                           total_emissions, eco_score, recommendations,
                                           created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(user_id)
        .bind(input.challenge_id)
        .bind(input.car_distance)
        .bind(input.car_efficiency)
        .bind(input.public_transport_distance)
        .bind(input.flights_short)
        .bind(input.flights_long)
        .bind(input.electricity_usage)
        .bind(input.heating_gas)
        .bind(input.renewable_energy)
        .bind(input.meat_consumption)
        .bind(input.local_food)
        .bind(input.waste_recycling)
        .bind(result.transport_emissions)
        .bind(result.energy_emissions)
        .bind(result.lifestyle_emissions)
        .bind(result.total_emissions)
        .bind(result.eco_score)
        .bind(recommendations)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await
        .context("Failed to save carbon footprint")?;

        self.get_by_id(inserted.last_insert_rowid())
            .await?
            .ok_or_else(|| anyhow::anyhow!("Carbon footprint not found after insert"))
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<CarbonFootprint>> {
        let row = sqlx::query(&format!("SELECT {} FROM carbon_footprints WHERE id = ?", FOOTPRINT_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to get carbon footprint")?;

        Ok(row.as_ref().map(row_to_footprint))
    }

    async fn list(&self, user_id: Option<i64>, offset: i64, limit: i64) -> Result<(Vec<CarbonFootprint>, i64)> {
        let scope = if user_id.is_some() { "WHERE user_id = ?" } else { "WHERE ? IS NULL" };

        let count_row = sqlx::query(&format!("SELECT COUNT(*) AS count FROM carbon_footprints {}", scope))
            .bind(user_id)
            .fetch_one(&self.pool)
            .await
            .context("Failed to count carbon footprints")?;
        let total: i64 = count_row.get("count");

        let rows = sqlx::query(&format!(
            "SELECT {} FROM carbon_footprints {} ORDER BY created_at DESC, id DESC LIMIT ? OFFSET ?",
            FOOTPRINT_COLUMNS, scope
        ))
        .bind(user_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
        .context("Failed to list carbon footprints")?;

        Ok((rows.iter().map(row_to_footprint).collect(), total))
    }

    async fn delete(&self, id: i64) -> Result<()> {
        sqlx::query("DELETE FROM carbon_footprints WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .context("Failed to delete carbon footprint")?;
        Ok(())
    }
}

fn row_to_footprint(row: &SqliteRow) -> CarbonFootprint {
    let recommendations: String = row.get("recommendations");
    CarbonFootprint {
        id: row.get("id"),
        user_id: row.get("user_id"),
        input: CarbonInput {
            challenge_id: row.get("challenge_id"),
            car_distance: row.get("car_distance"),
            car_efficiency: row.get("car_efficiency"),
            public_transport_distance: row.get("public_transport_distance"),
            flights_short: row.get("flights_short"),
            flights_long: row.get("flights_long"),
            electricity_usage: row.get("electricity_usage"),
            heating_gas: row.get("heating_gas"),
            renewable_energy: row.get("renewable_energy"),
            meat_consumption: row.get("meat_consumption"),
            local_food: row.get("local_food"),
            waste_recycling: row.get("waste_recycling"),
        },
        result: CarbonResult {
            transport_emissions: row.get("transport_emissions"),
            energy_emissions: row.get("energy_emissions"),
            lifestyle_emissions: row.get("lifestyle_emissions"),
            total_emissions: row.get("total_emissions"),
            eco_score: row.get("eco_score"),
            recommendations: serde_json::from_str(&recommendations).unwrap_or_default(),
        },
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::test_support;
    use crate::models::UserRole;

    #[tokio::test]
    async fn test_footprint_round_trip() {
        let pool = test_support::pool().await;
        let alice = test_support::user(&pool, "alice@example.com", UserRole::Student).await;
        let bob = test_support::user(&pool, "bob@example.com", UserRole::Student).await;
        let repo = SqlxCarbonRepository::new(pool);

        let input = CarbonInput {
            car_distance: 100.0,
            car_efficiency: 8.0,
            flights_long: 1,
            ..Default::default()
        };
        let result = input.calculate();
        let saved = repo.create(alice.id, &input, &result).await.unwrap();
        repo.create(bob.id, &CarbonInput::default(), &CarbonInput::default().calculate())
            .await
            .unwrap();

        assert_eq!(saved.input, input);
        assert_eq!(saved.result, result);
        assert_eq!(repo.list(Some(alice.id), 0, 20).await.unwrap().1, 1);
        assert_eq!(repo.list(None, 0, 20).await.unwrap().1, 2);

        repo.delete(saved.id).await.unwrap();
        assert!(repo.get_by_id(saved.id).await.unwrap().is_none());
    }
}
