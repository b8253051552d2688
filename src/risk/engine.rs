use alloy::primitives::U256;
use std::collections::HashSet;

use crate::approvals::types::{ApprovalKind, CandidateEvent};

use super::types::{score_to_level, ReasonCode, RiskLevel};

/// 2^255. Any allowance at or above this is treated as effectively
/// unbounded even if it is not the exact max value.
const HUGE_ALLOWANCE_THRESHOLD: U256 = U256::from_limbs([0, 0, 0, 1u64 << 63]);

/// Outcome of scoring a single approval event.
#[derive(Debug, Clone)]
pub struct RiskAssessment {
    pub score: i32,
    pub level: RiskLevel,
    pub reasons: Vec<ReasonCode>,
    pub is_infinite: bool,
}

impl RiskAssessment {
    /// Outcome for a revocation: always benign, overriding any token or
    /// spender contributions accumulated before the kind branch.
    fn revoke() -> Self {
        Self {
            score: 0,
            level: score_to_level(0),
            reasons: vec![ReasonCode::Revoke],
            is_infinite: false,
        }
    }

    /// The JSONB payload persisted alongside the score.
    pub fn meta(&self, event: &CandidateEvent) -> serde_json::Value {
        serde_json::json!({
            "reasons": self.reasons.iter().map(|r| r.as_str()).collect::<Vec<_>>(),
            "isInfinite": self.is_infinite,
            "details": {
                "rawValue": event.raw_value,
                "approved": event.approved,
            },
        })
    }
}

fn parse_raw_value(raw: Option<&str>) -> Option<U256> {
    U256::from_str_radix(raw?, 10).ok()
}

/// Score one approval event. Deterministic and side-effect-free.
///
/// `valuable_tokens` is the chain's configured set of lowercased token
/// addresses. `trusted_spender` is `Some(bool)` when the allowlist was
/// consulted for this event's owner, `None` when it could not be; an
/// unresolved spender is not penalized.
pub fn compute_risk(
    event: &CandidateEvent,
    valuable_tokens: &HashSet<String>,
    trusted_spender: Option<bool>,
) -> RiskAssessment {
    let mut score = 0;
    let mut reasons = Vec::new();

    if valuable_tokens.contains(&event.token_address.to_lowercase()) {
        score += 20;
        reasons.push(ReasonCode::ValuableToken);
    }

    if trusted_spender == Some(false) {
        score += 25;
        reasons.push(ReasonCode::SpenderNotAllowlisted);
    }

    let mut is_infinite = false;
    match event.kind {
        ApprovalKind::Erc20Approval => {
            if let Some(value) = parse_raw_value(event.raw_value.as_deref()) {
                if value.is_zero() {
                    return RiskAssessment::revoke();
                }
                if value == U256::MAX {
                    is_infinite = true;
                    score += 60;
                    reasons.push(ReasonCode::InfiniteAllowance);
                } else if value >= HUGE_ALLOWANCE_THRESHOLD {
                    score += 40;
                    reasons.push(ReasonCode::HugeAllowance);
                }
            }
        }
        ApprovalKind::ApprovalForAll => match event.approved {
            Some(false) => return RiskAssessment::revoke(),
            Some(true) => {
                score += 70;
                reasons.push(ReasonCode::ApprovalForAllEnabled);
            }
            None => {}
        },
    }

    RiskAssessment {
        score,
        level: score_to_level(score),
        reasons,
        is_infinite,
    }
}
