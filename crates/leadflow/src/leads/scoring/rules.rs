use chrono::{DateTime, Duration, Utc};

use super::super::domain::Lead;
use super::super::status::LeadStatus;
use super::config::ScoringConfig;
use super::{ScoreComponent, ScoreFactor};

pub(crate) fn score_lead(
    lead: &Lead,
    config: &ScoringConfig,
    now: DateTime<Utc>,
) -> (Vec<ScoreComponent>, u8) {
    let mut components = vec![ScoreComponent {
        factor: ScoreFactor::Base,
        points: i16::from(config.base_points),
        notes: "captured lead".to_string(),
    }];

    if lead.email_confirmed_at.is_some() {
        components.push(ScoreComponent {
            factor: ScoreFactor::EmailConfirmed,
            points: i16::from(config.email_confirmed_points),
            notes: "double opt-in completed".to_string(),
        });
    }

    let has_phone = lead
        .phone
        .as_deref()
        .map(|phone| phone.chars().filter(char::is_ascii_digit).count() >= 6)
        .unwrap_or(false);
    if has_phone {
        components.push(ScoreComponent {
            factor: ScoreFactor::Phone,
            points: i16::from(config.phone_points),
            notes: "reachable by phone".to_string(),
        });
    }

    if !lead.first_name.trim().is_empty() && !lead.last_name.trim().is_empty() {
        components.push(ScoreComponent {
            factor: ScoreFactor::FullName,
            points: i16::from(config.full_name_points),
            notes: "first and last name provided".to_string(),
        });
    }

    let age = now.signed_duration_since(lead.created_at);
    if age <= Duration::hours(i64::from(config.fresh_window_hours)) {
        components.push(ScoreComponent {
            factor: ScoreFactor::Freshness,
            points: i16::from(config.fresh_lead_points),
            notes: format!("captured within {} hours", config.fresh_window_hours),
        });
    }

    if let Some(component) = status_component(lead.status, config) {
        components.push(component);
    }

    let total: i16 = components.iter().map(|component| component.points).sum();
    let clamped = total.clamp(0, 100) as u8;

    (components, clamped)
}

fn status_component(status: LeadStatus, config: &ScoringConfig) -> Option<ScoreComponent> {
    let (points, notes) = match status {
        LeadStatus::PendingCall | LeadStatus::CallbackPending => (
            i16::from(config.in_progress_points),
            "in the call queue",
        ),
        LeadStatus::Confirmed => (i16::from(config.confirmed_points), "confirmed by phone"),
        LeadStatus::Converted => (i16::from(config.converted_points), "converted"),
        LeadStatus::NotInterested
        | LeadStatus::WrongNumber
        | LeadStatus::Rejected
        | LeadStatus::Expired => (
            -i16::from(config.negative_outcome_penalty),
            "negative outcome",
        ),
        LeadStatus::PendingEmail | LeadStatus::EmailConfirmed | LeadStatus::NoAnswer => {
            return None
        }
    };

    Some(ScoreComponent {
        factor: ScoreFactor::Status,
        points,
        notes: format!("{notes} ({status})"),
    })
}
