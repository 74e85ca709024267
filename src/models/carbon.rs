//! Carbon footprint calculator
//!
//! All results are kg CO2e per year. Inputs are weekly, monthly or yearly as
//! noted on each field and are annualised here.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::round2;

/// kg CO2 per litre of petrol
const PETROL_KG_PER_LITRE: f64 = 2.31;
/// kg CO2e per passenger-km of public transport
const PUBLIC_TRANSPORT_KG_PER_KM: f64 = 0.089;
const SHORT_FLIGHT_KG: f64 = 255.0;
const LONG_FLIGHT_KG: f64 = 1100.0;
/// kg CO2e per kWh of grid electricity
const GRID_KG_PER_KWH: f64 = 0.475;
/// kg CO2e per cubic metre of natural gas
const GAS_KG_PER_M3: f64 = 2.0;
/// kg CO2e per serving of meat
const MEAT_KG_PER_SERVING: f64 = 3.3;
/// Yearly household waste before recycling
const BASE_WASTE_KG: f64 = 400.0;
/// Total at which the eco score starts dropping below 100
const ECO_SCORE_BASELINE: f64 = 2000.0;
const ECO_SCORE_KG_PER_POINT: f64 = 180.0;

/// Calculator inputs
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CarbonInput {
    /// Optional challenge the calculation belongs to
    pub challenge_id: Option<i64>,
    /// km per week
    pub car_distance: f64,
    /// litres per 100 km
    pub car_efficiency: f64,
    /// km per week
    pub public_transport_distance: f64,
    /// flights per year
    pub flights_short: i64,
    pub flights_long: i64,
    /// kWh per month
    pub electricity_usage: f64,
    /// m3 per month
    pub heating_gas: f64,
    /// percent 0..=100
    pub renewable_energy: f64,
    /// servings per week
    pub meat_consumption: f64,
    /// percent 0..=100
    pub local_food: f64,
    /// percent 0..=100
    pub waste_recycling: f64,
}

/// Calculator output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CarbonResult {
    pub transport_emissions: f64,
    pub energy_emissions: f64,
    pub lifestyle_emissions: f64,
    pub total_emissions: f64,
    pub eco_score: i64,
    pub recommendations: Vec<String>,
}

impl CarbonInput {
    /// Reject negative quantities and percentages outside 0..=100
    pub fn validate(&self) -> Result<(), String> {
        let quantities = [
            ("car_distance", self.car_distance),
            ("car_efficiency", self.car_efficiency),
            ("public_transport_distance", self.public_transport_distance),
            ("electricity_usage", self.electricity_usage),
            ("heating_gas", self.heating_gas),
            ("meat_consumption", self.meat_consumption),
        ];
        for (name, value) in quantities {
            if !value.is_finite() || value < 0.0 {
                return Err(format!("{} must be a non-negative number", name));
            }
        }
        if self.flights_short < 0 || self.flights_long < 0 {
            return Err("Flight counts must be non-negative".to_string());
        }
        let percentages = [
            ("renewable_energy", self.renewable_energy),
            ("local_food", self.local_food),
            ("waste_recycling", self.waste_recycling),
        ];
        for (name, value) in percentages {
            if !(0.0..=100.0).contains(&value) {
                return Err(format!("{} must be between 0 and 100", name));
            }
        }
        Ok(())
    }

    fn car_emissions(&self) -> f64 {
        self.car_distance * 52.0 * self.car_efficiency / 100.0 * PETROL_KG_PER_LITRE
    }

    /// Compute emissions, eco score and recommendations
    pub fn calculate(&self) -> CarbonResult {
        let car = self.car_emissions();
        let transport = car
            + self.public_transport_distance * 52.0 * PUBLIC_TRANSPORT_KG_PER_KM
            + self.flights_short as f64 * SHORT_FLIGHT_KG
            + self.flights_long as f64 * LONG_FLIGHT_KG;

        let energy = self.electricity_usage * 12.0 * GRID_KG_PER_KWH
            * (1.0 - self.renewable_energy / 100.0)
            + self.heating_gas * 12.0 * GAS_KG_PER_M3;

        let lifestyle = self.meat_consumption * 52.0 * MEAT_KG_PER_SERVING
            * (1.0 - 0.1 * self.local_food / 100.0)
            + BASE_WASTE_KG * (1.0 - 0.5 * self.waste_recycling / 100.0);

        let total = transport + energy + lifestyle;
        let eco_score = (100.0 - (total - ECO_SCORE_BASELINE) / ECO_SCORE_KG_PER_POINT)
            .round()
            .clamp(0.0, 100.0) as i64;

        CarbonResult {
            transport_emissions: round2(transport),
            energy_emissions: round2(energy),
            lifestyle_emissions: round2(lifestyle),
            total_emissions: round2(total),
            eco_score,
            recommendations: self.recommendations(car),
        }
    }

    fn recommendations(&self, car_emissions: f64) -> Vec<String> {
        let mut tips = Vec::new();
        if car_emissions > 1000.0 {
            tips.push(
                "Consider carpooling, cycling or public transport for some of your car trips"
                    .to_string(),
            );
        }
        if self.flights_long > 0 {
            tips.push("Long-haul flights dominate travel emissions; replace one with a train trip or video call".to_string());
        }
        if self.renewable_energy < 50.0 {
            tips.push("Switch to a renewable electricity tariff or install solar panels".to_string());
        }
        if self.meat_consumption > 7.0 {
            tips.push("Try a few plant-based meals each week to cut food emissions".to_string());
        }
        if self.waste_recycling < 50.0 {
            tips.push("Recycle and compost more of your household waste".to_string());
        }
        if self.local_food < 30.0 {
            tips.push("Buy more local and seasonal produce".to_string());
        }
        if tips.is_empty() {
            tips.push("Great job! Keep up your low-carbon lifestyle".to_string());
        }
        tips
    }
}

/// Stored calculation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CarbonFootprint {
    pub id: i64,
    pub user_id: i64,
    #[serde(flatten)]
    pub input: CarbonInput,
    #[serde(flatten)]
    pub result: CarbonResult,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
