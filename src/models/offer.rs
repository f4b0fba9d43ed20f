use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OfferStatus {
    Pending,
    Accepted,
    Rejected,
}

impl OfferStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OfferStatus::Pending => "pending",
            OfferStatus::Accepted => "accepted",
            OfferStatus::Rejected => "rejected",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(OfferStatus::Pending),
            "accepted" => Some(OfferStatus::Accepted),
            "rejected" => Some(OfferStatus::Rejected),
            _ => None,
        }
    }

    /// Accepted and rejected are terminal; no further transitions permitted.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, OfferStatus::Pending)
    }

    pub fn can_transition_to(&self, next: OfferStatus) -> bool {
        matches!(self, OfferStatus::Pending) && next.is_terminal()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pending_transitions_to_terminal_states() {
        assert!(OfferStatus::Pending.can_transition_to(OfferStatus::Accepted));
        assert!(OfferStatus::Pending.can_transition_to(OfferStatus::Rejected));
    }

    #[test]
    fn terminal_states_never_re_transition() {
        for from in [OfferStatus::Accepted, OfferStatus::Rejected] {
            for to in [
                OfferStatus::Pending,
                OfferStatus::Accepted,
                OfferStatus::Rejected,
            ] {
                assert!(!from.can_transition_to(to));
            }
        }
    }

    #[test]
    fn pending_cannot_transition_to_pending() {
        assert!(!OfferStatus::Pending.can_transition_to(OfferStatus::Pending));
    }
}
