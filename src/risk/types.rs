/// Discrete risk levels derived from a score via [`RISK_THRESHOLDS`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl RiskLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "LOW",
            Self::Medium => "MEDIUM",
            Self::High => "HIGH",
            Self::Critical => "CRITICAL",
        }
    }
}

/// A discrete tag explaining one contribution to a risk score.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReasonCode {
    ValuableToken,
    SpenderNotAllowlisted,
    InfiniteAllowance,
    HugeAllowance,
    ApprovalForAllEnabled,
    Revoke,
}

impl ReasonCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ValuableToken => "VALUABLE_TOKEN",
            Self::SpenderNotAllowlisted => "SPENDER_NOT_ALLOWLISTED",
            Self::InfiniteAllowance => "INFINITE_ALLOWANCE",
            Self::HugeAllowance => "HUGE_ALLOWANCE",
            Self::ApprovalForAllEnabled => "APPROVAL_FOR_ALL_ENABLED",
            Self::Revoke => "REVOKE",
        }
    }
}

/// Score-to-level mapping. Thresholds are data, not code, and are
/// evaluated highest-first.
pub const RISK_THRESHOLDS: [(i32, RiskLevel); 4] = [
    (80, RiskLevel::Critical),
    (50, RiskLevel::High),
    (20, RiskLevel::Medium),
    (0, RiskLevel::Low),
];

pub fn score_to_level(score: i32) -> RiskLevel {
    for (min_score, level) in RISK_THRESHOLDS {
        if score >= min_score {
            return level;
        }
    }
    RiskLevel::Low
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn thresholds_are_ordered_high_to_low() {
        for pair in RISK_THRESHOLDS.windows(2) {
            assert!(pair[0].0 >= pair[1].0);
        }
    }

    #[test]
    fn score_to_level_boundaries() {
        assert_eq!(score_to_level(0), RiskLevel::Low);
        assert_eq!(score_to_level(19), RiskLevel::Low);
        assert_eq!(score_to_level(20), RiskLevel::Medium);
        assert_eq!(score_to_level(49), RiskLevel::Medium);
        assert_eq!(score_to_level(50), RiskLevel::High);
        assert_eq!(score_to_level(79), RiskLevel::High);
        assert_eq!(score_to_level(80), RiskLevel::Critical);
        assert_eq!(score_to_level(999), RiskLevel::Critical);
    }
}
