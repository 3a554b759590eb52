use super::common::*;
use crate::leads::scoring::{ScoreFactor, ScoreTier, ScoreTrigger, ScoringConfig, ScoringEngine};
use crate::leads::status::LeadStatus;

fn engine() -> ScoringEngine {
    ScoringEngine::new(ScoringConfig::default())
}

#[test]
fn fresh_confirmed_lead_scores_components() {
    let mut lead = stored_lead("lead-1", LeadStatus::EmailConfirmed, fixed_now());
    lead.phone = Some("0612345678".to_string());

    let score = engine().score(&lead, fixed_now() + hours(1));

    let factors: Vec<_> = score.components.iter().map(|c| c.factor).collect();
    assert_eq!(
        factors,
        vec![
            ScoreFactor::Base,
            ScoreFactor::EmailConfirmed,
            ScoreFactor::Phone,
            ScoreFactor::FullName,
            ScoreFactor::Freshness,
        ]
    );
    assert_eq!(score.total, 70);
    assert_eq!(score.tier, ScoreTier::Hot);
}

#[test]
fn stale_unconfirmed_lead_is_cold() {
    let mut lead = stored_lead("lead-2", LeadStatus::PendingEmail, fixed_now());
    lead.email_confirmed_at = None;
    lead.last_name = String::new();

    let score = engine().score(&lead, fixed_now() + hours(72));

    assert_eq!(score.total, 10);
    assert_eq!(score.tier, ScoreTier::Cold);
}

#[test]
fn short_phone_numbers_earn_nothing() {
    let mut lead = stored_lead("lead-3", LeadStatus::PendingEmail, fixed_now());
    lead.phone = Some("12-34".to_string());

    let score = engine().score(&lead, fixed_now());

    assert!(score
        .components
        .iter()
        .all(|component| component.factor != ScoreFactor::Phone));
}

#[test]
fn negative_outcomes_clamp_at_zero() {
    let config = ScoringConfig {
        negative_outcome_penalty: 200,
        ..ScoringConfig::default()
    };
    let lead = stored_lead("lead-4", LeadStatus::WrongNumber, fixed_now());

    let score = ScoringEngine::new(config).score(&lead, fixed_now());

    assert_eq!(score.total, 0);
    assert_eq!(score.tier, ScoreTier::Cold);
}

#[test]
fn conversion_clamps_at_one_hundred() {
    let mut lead = stored_lead("lead-5", LeadStatus::Converted, fixed_now());
    lead.phone = Some("+1 555 010 9999".to_string());

    let score = engine().score(&lead, fixed_now());

    assert_eq!(score.total, 100);
}

#[test]
fn apply_writes_score_fields() {
    let mut lead = stored_lead("lead-6", LeadStatus::PendingCall, fixed_now());

    let score = engine().apply(&mut lead, fixed_now());

    assert_eq!(lead.score, score.total);
    assert_eq!(lead.score_tier, score.tier);
    assert_eq!(lead.scored_at, Some(fixed_now()));
}

#[test]
fn triggers_ignore_score_only_changes() {
    let previous = stored_lead("lead-7", LeadStatus::PendingCall, fixed_now());
    let mut rescored = previous.clone();
    rescored.score = 88;
    rescored.score_tier = ScoreTier::Hot;
    rescored.scored_at = Some(fixed_now());

    assert_eq!(ScoreTrigger::detect(Some(&previous), &rescored), None);
    assert_eq!(
        ScoreTrigger::detect(None, &previous),
        Some(ScoreTrigger::Created)
    );

    let mut called = previous.clone();
    called.status = LeadStatus::NoAnswer;
    assert_eq!(
        ScoreTrigger::detect(Some(&previous), &called),
        Some(ScoreTrigger::StatusChanged {
            from: LeadStatus::PendingCall,
            to: LeadStatus::NoAnswer,
        })
    );
}

#[test]
fn email_confirmation_triggers_rescore() {
    let mut previous = stored_lead("lead-8", LeadStatus::PendingEmail, fixed_now());
    previous.email_confirmed_at = None;
    let mut confirmed = previous.clone();
    confirmed.email_confirmed_at = Some(fixed_now());

    assert_eq!(
        ScoreTrigger::detect(Some(&previous), &confirmed),
        Some(ScoreTrigger::EmailConfirmed)
    );
}
