//! Severity tiers for detection events.
//!
//! Severity is a step function over an event's peak throughput (bits/sec)
//! and peak rate (packets/sec). A tier is reached when *either* measure meets
//! that tier's cutoff, and the highest reached tier wins. Because raising
//! either measure can only satisfy more cutoffs, the function is monotonic in
//! both arguments for any set of breakpoints.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};

/// Discrete severity classification of a detection event.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Below every configured cutoff.
    #[default]
    Minimal,
    /// Noticeable but unlikely to degrade service.
    Low,
    /// Likely to degrade service.
    Medium,
    /// Service-impacting.
    High,
    /// Saturating.
    Critical,
}

impl Severity {
    /// All tiers, lowest first.
    pub const ALL: [Self; 5] = [
        Self::Minimal,
        Self::Low,
        Self::Medium,
        Self::High,
        Self::Critical,
    ];

    /// Returns the severity as a string.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Minimal => "minimal",
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }

    /// Returns the rank of this tier (higher = more severe).
    #[must_use]
    pub const fn rank(&self) -> u8 {
        match self {
            Self::Minimal => 0,
            Self::Low => 1,
            Self::Medium => 2,
            Self::High => 3,
            Self::Critical => 4,
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Severity {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "minimal" => Ok(Self::Minimal),
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            "critical" => Ok(Self::Critical),
            other => Err(CoreError::UnknownSeverity(other.to_string())),
        }
    }
}

/// Cutoff for a single tier.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TierCutoff {
    /// Minimum peak throughput in bits per second.
    pub bps: f64,
    /// Minimum peak rate in packets per second.
    pub pps: f64,
}

impl TierCutoff {
    /// Creates a cutoff.
    #[must_use]
    pub const fn new(bps: f64, pps: f64) -> Self {
        Self { bps, pps }
    }

    /// Returns true if either measure meets this cutoff.
    #[must_use]
    pub fn reached_by(&self, peak_bps: f64, peak_pps: f64) -> bool {
        peak_bps >= self.bps || peak_pps >= self.pps
    }
}

/// Breakpoints for every tier above [`Severity::Minimal`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SeverityBreakpoints {
    /// Cutoff for [`Severity::Low`].
    pub low: TierCutoff,
    /// Cutoff for [`Severity::Medium`].
    pub medium: TierCutoff,
    /// Cutoff for [`Severity::High`].
    pub high: TierCutoff,
    /// Cutoff for [`Severity::Critical`].
    pub critical: TierCutoff,
}

impl Default for SeverityBreakpoints {
    fn default() -> Self {
        Self {
            low: TierCutoff::new(1e8, 1e4),
            medium: TierCutoff::new(1e9, 1e5),
            high: TierCutoff::new(1e10, 1e6),
            critical: TierCutoff::new(5e10, 5e6),
        }
    }
}

impl SeverityBreakpoints {
    /// Classifies an event by its peaks.
    ///
    /// Total over all `f64` inputs: NaN and negative values reach no cutoff.
    #[must_use]
    pub fn classify(&self, peak_bps: f64, peak_pps: f64) -> Severity {
        self.tiers()
            .iter()
            .rev()
            .find(|(_, cutoff)| cutoff.reached_by(peak_bps, peak_pps))
            .map_or(Severity::Minimal, |(tier, _)| *tier)
    }

    /// Returns the cutoff for a tier, `None` for [`Severity::Minimal`].
    #[must_use]
    pub const fn cutoff(&self, tier: Severity) -> Option<TierCutoff> {
        match tier {
            Severity::Minimal => None,
            Severity::Low => Some(self.low),
            Severity::Medium => Some(self.medium),
            Severity::High => Some(self.high),
            Severity::Critical => Some(self.critical),
        }
    }

    /// Validates that cutoffs are finite, non-negative, and non-decreasing.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::InvalidBreakpoints` on the first offending tier.
    pub fn validate(&self) -> Result<()> {
        let tiers = self.tiers();

        for (tier, cutoff) in &tiers {
            if !cutoff.bps.is_finite() || !cutoff.pps.is_finite() {
                return Err(CoreError::InvalidBreakpoints {
                    reason: format!("{tier} cutoff must be finite"),
                });
            }
            if cutoff.bps < 0.0 || cutoff.pps < 0.0 {
                return Err(CoreError::InvalidBreakpoints {
                    reason: format!("{tier} cutoff must not be negative"),
                });
            }
        }

        for pair in tiers.windows(2) {
            let (lower_tier, lower) = pair[0];
            let (upper_tier, upper) = pair[1];
            if upper.bps < lower.bps || upper.pps < lower.pps {
                return Err(CoreError::InvalidBreakpoints {
                    reason: format!("{upper_tier} cutoff is below {lower_tier} cutoff"),
                });
            }
        }

        Ok(())
    }

    fn tiers(&self) -> [(Severity, TierCutoff); 4] {
        [
            (Severity::Low, self.low),
            (Severity::Medium, self.medium),
            (Severity::High, self.high),
            (Severity::Critical, self.critical),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use test_case::test_case;

    #[test_case(0.0, 0.0, Severity::Minimal ; "idle")]
    #[test_case(5e7, 5_000.0, Severity::Minimal ; "below low")]
    #[test_case(1e8, 0.0, Severity::Low ; "low by bps")]
    #[test_case(0.0, 1e4, Severity::Low ; "low by pps")]
    #[test_case(2e9, 50_000.0, Severity::Medium ; "medium by bps")]
    #[test_case(1e8, 2e5, Severity::Medium ; "medium by pps")]
    #[test_case(1.5e10, 0.0, Severity::High ; "high by bps")]
    #[test_case(0.0, 6e6, Severity::Critical ; "critical by pps")]
    #[test_case(1e12, 1e9, Severity::Critical ; "far above critical")]
    #[test_case(f64::NAN, f64::NAN, Severity::Minimal ; "nan")]
    #[test_case(-1.0, -1.0, Severity::Minimal ; "negative")]
    #[test_case(f64::INFINITY, 0.0, Severity::Critical ; "infinite bps")]
    fn classify_default_breakpoints(bps: f64, pps: f64, expected: Severity) {
        assert_eq!(SeverityBreakpoints::default().classify(bps, pps), expected);
    }

    #[test]
    fn severity_ordering() {
        assert!(Severity::Minimal < Severity::Low);
        assert!(Severity::Low < Severity::Medium);
        assert!(Severity::Medium < Severity::High);
        assert!(Severity::High < Severity::Critical);
        for pair in Severity::ALL.windows(2) {
            assert!(pair[0].rank() < pair[1].rank());
        }
    }

    #[test]
    fn severity_from_str() {
        assert_eq!("HIGH".parse::<Severity>().unwrap(), Severity::High);
        assert_eq!(" low ".parse::<Severity>().unwrap(), Severity::Low);
        assert!("severe".parse::<Severity>().is_err());
    }

    #[test]
    fn severity_serde_lowercase() {
        let json = serde_json::to_string(&Severity::Critical).unwrap();
        assert_eq!(json, "\"critical\"");
        let back: Severity = serde_json::from_str("\"medium\"").unwrap();
        assert_eq!(back, Severity::Medium);
    }

    #[test]
    fn default_breakpoints_are_valid() {
        assert!(SeverityBreakpoints::default().validate().is_ok());
    }

    #[test]
    fn validate_rejects_decreasing_tiers() {
        let breakpoints = SeverityBreakpoints {
            high: TierCutoff::new(1e8, 1e6),
            ..SeverityBreakpoints::default()
        };
        let err = breakpoints.validate().unwrap_err();
        assert!(matches!(err, CoreError::InvalidBreakpoints { .. }));
        assert!(err.to_string().contains("high"));
    }

    #[test]
    fn validate_rejects_nan_and_negative() {
        let nan = SeverityBreakpoints {
            low: TierCutoff::new(f64::NAN, 1.0),
            ..SeverityBreakpoints::default()
        };
        assert!(nan.validate().is_err());

        let negative = SeverityBreakpoints {
            low: TierCutoff::new(-1.0, 1.0),
            ..SeverityBreakpoints::default()
        };
        assert!(negative.validate().is_err());
    }

    #[test]
    fn custom_breakpoints_shift_tiers() {
        let strict = SeverityBreakpoints {
            low: TierCutoff::new(1e9, 1e5),
            medium: TierCutoff::new(5e9, 5e5),
            high: TierCutoff::new(2e10, 2e6),
            critical: TierCutoff::new(1e11, 1e7),
        };
        assert_eq!(strict.classify(2e9, 50_000.0), Severity::Low);
    }

    #[test]
    fn cutoff_lookup() {
        let breakpoints = SeverityBreakpoints::default();
        assert!(breakpoints.cutoff(Severity::Minimal).is_none());
        assert_eq!(breakpoints.cutoff(Severity::Medium), Some(breakpoints.medium));
    }

    proptest! {
        #[test]
        fn classify_is_monotonic_in_bps(
            bps in 0.0f64..1e12,
            extra in 0.0f64..1e12,
            pps in 0.0f64..1e8,
        ) {
            let breakpoints = SeverityBreakpoints::default();
            prop_assert!(breakpoints.classify(bps + extra, pps) >= breakpoints.classify(bps, pps));
        }

        #[test]
        fn classify_is_monotonic_in_pps(
            bps in 0.0f64..1e12,
            pps in 0.0f64..1e8,
            extra in 0.0f64..1e8,
        ) {
            let breakpoints = SeverityBreakpoints::default();
            prop_assert!(breakpoints.classify(bps, pps + extra) >= breakpoints.classify(bps, pps));
        }

        #[test]
        fn classify_is_total(bps in any::<f64>(), pps in any::<f64>()) {
            let tier = SeverityBreakpoints::default().classify(bps, pps);
            prop_assert!(Severity::ALL.contains(&tier));
        }
    }
}
