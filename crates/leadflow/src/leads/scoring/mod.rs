mod config;
mod rules;

pub use config::ScoringConfig;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::domain::Lead;
use super::status::LeadStatus;

/// Qualification band derived from the numeric score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoreTier {
    #[default]
    Cold,
    Warm,
    Hot,
}

impl ScoreTier {
    pub const fn label(self) -> &'static str {
        match self {
            ScoreTier::Cold => "cold",
            ScoreTier::Warm => "warm",
            ScoreTier::Hot => "hot",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoreFactor {
    Base,
    EmailConfirmed,
    Phone,
    FullName,
    Freshness,
    Status,
}

/// Discrete contribution to a score, kept for audits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreComponent {
    pub factor: ScoreFactor,
    pub points: i16,
    pub notes: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeadScore {
    pub total: u8,
    pub tier: ScoreTier,
    pub components: Vec<ScoreComponent>,
}

/// What made a rescore necessary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScoreTrigger {
    Created,
    EmailConfirmed,
    StatusChanged { from: LeadStatus, to: LeadStatus },
}

impl ScoreTrigger {
    /// Compares the stored lead with the one about to be saved. Changes confined to the
    /// score fields never produce a trigger, so writing a score cannot cascade.
    pub fn detect(previous: Option<&Lead>, current: &Lead) -> Option<Self> {
        let Some(previous) = previous else {
            return Some(ScoreTrigger::Created);
        };

        if previous.email_confirmed_at.is_none() && current.email_confirmed_at.is_some() {
            return Some(ScoreTrigger::EmailConfirmed);
        }

        if previous.status != current.status {
            return Some(ScoreTrigger::StatusChanged {
                from: previous.status,
                to: current.status,
            });
        }

        None
    }
}

/// Stateless evaluator applying the rubric configuration to a lead.
#[derive(Debug, Clone)]
pub struct ScoringEngine {
    config: ScoringConfig,
}

impl ScoringEngine {
    pub fn new(config: ScoringConfig) -> Self {
        Self { config }
    }

    pub fn score(&self, lead: &Lead, now: DateTime<Utc>) -> LeadScore {
        let (components, total) = rules::score_lead(lead, &self.config, now);
        LeadScore {
            total,
            tier: self.tier_for(total),
            components,
        }
    }

    pub fn tier_for(&self, total: u8) -> ScoreTier {
        if total >= self.config.hot_threshold {
            ScoreTier::Hot
        } else if total >= self.config.warm_threshold {
            ScoreTier::Warm
        } else {
            ScoreTier::Cold
        }
    }

    /// Writes the score fields onto `lead`.
    pub fn apply(&self, lead: &mut Lead, now: DateTime<Utc>) -> LeadScore {
        let score = self.score(lead, now);
        lead.score = score.total;
        lead.score_tier = score.tier;
        lead.scored_at = Some(now);
        score
    }
}
