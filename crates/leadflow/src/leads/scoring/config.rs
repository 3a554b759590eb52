use serde::{Deserialize, Serialize};

/// Points awarded by the lead scoring rubric and the tier cut-offs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoringConfig {
    pub base_points: u8,
    pub email_confirmed_points: u8,
    pub phone_points: u8,
    pub full_name_points: u8,
    pub fresh_lead_points: u8,
    pub fresh_window_hours: u32,
    pub in_progress_points: u8,
    pub confirmed_points: u8,
    pub converted_points: u8,
    pub negative_outcome_penalty: u8,
    pub hot_threshold: u8,
    pub warm_threshold: u8,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            base_points: 10,
            email_confirmed_points: 25,
            phone_points: 15,
            full_name_points: 10,
            fresh_lead_points: 10,
            fresh_window_hours: 24,
            in_progress_points: 10,
            confirmed_points: 30,
            converted_points: 40,
            negative_outcome_penalty: 30,
            hot_threshold: 70,
            warm_threshold: 40,
        }
    }
}
