use serde::{Deserialize, Serialize};

/// Every status a lead can carry between capture and final call outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeadStatus {
    PendingEmail,
    EmailConfirmed,
    PendingCall,
    CallbackPending,
    NoAnswer,
    Confirmed,
    Converted,
    NotInterested,
    WrongNumber,
    Rejected,
    Expired,
}

impl LeadStatus {
    pub const ALL: [LeadStatus; 11] = [
        LeadStatus::PendingEmail,
        LeadStatus::EmailConfirmed,
        LeadStatus::PendingCall,
        LeadStatus::CallbackPending,
        LeadStatus::NoAnswer,
        LeadStatus::Confirmed,
        LeadStatus::Converted,
        LeadStatus::NotInterested,
        LeadStatus::WrongNumber,
        LeadStatus::Rejected,
        LeadStatus::Expired,
    ];

    pub const fn label(self) -> &'static str {
        match self {
            LeadStatus::PendingEmail => "pending_email",
            LeadStatus::EmailConfirmed => "email_confirmed",
            LeadStatus::PendingCall => "pending_call",
            LeadStatus::CallbackPending => "callback_pending",
            LeadStatus::NoAnswer => "no_answer",
            LeadStatus::Confirmed => "confirmed",
            LeadStatus::Converted => "converted",
            LeadStatus::NotInterested => "not_interested",
            LeadStatus::WrongNumber => "wrong_number",
            LeadStatus::Rejected => "rejected",
            LeadStatus::Expired => "expired",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        let label = label.trim();
        Self::ALL
            .into_iter()
            .find(|status| status.label().eq_ignore_ascii_case(label))
    }

    /// Lead still needs work from the call center.
    pub const fn is_active(self) -> bool {
        !self.is_final()
    }

    /// No further call outcome is expected.
    pub const fn is_final(self) -> bool {
        matches!(
            self,
            LeadStatus::Confirmed
                | LeadStatus::Converted
                | LeadStatus::NotInterested
                | LeadStatus::WrongNumber
                | LeadStatus::Rejected
                | LeadStatus::Expired
        )
    }

    /// Statuses an agent may record as the outcome of a call.
    pub const fn can_follow_call(self) -> bool {
        matches!(
            self,
            LeadStatus::CallbackPending
                | LeadStatus::NoAnswer
                | LeadStatus::Confirmed
                | LeadStatus::Converted
                | LeadStatus::NotInterested
                | LeadStatus::WrongNumber
                | LeadStatus::Rejected
        )
    }

    pub fn post_call_statuses() -> impl Iterator<Item = LeadStatus> {
        Self::ALL.into_iter().filter(|status| status.can_follow_call())
    }
}

impl std::fmt::Display for LeadStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}
