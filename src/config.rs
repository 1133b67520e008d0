//! Configuration of a protocol session.
use serde::{Deserialize, Serialize};

use crate::protocol::policy::{InputVerification, Multiplication};

/// Settings shared by all parties of one protocol session.
///
/// All fields have defaults (semi-honest BGW with the standard degree), so a configuration
/// file only needs to list what it changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// The sharing degree `t`. Defaults to the largest degree the adversary model allows.
    pub degree: Option<usize>,
    /// The number of public complaint rounds before a dealer is declared a cheater.
    pub complaint_rounds: usize,
    /// Seeds the parties' randomness for reproducible runs (never use in production).
    pub seed: Option<u64>,
    /// Input verification.
    pub input_verification: InputVerification,
    /// Degree reduction after multiplication.
    pub multiplication: Multiplication,
}

impl SessionConfig {
    /// The default number of complaint rounds.
    pub const COMPLAINT_ROUNDS: usize = 3;

    /// Semi-honest BGW.
    pub fn semi_honest() -> Self {
        Self::default()
    }

    /// Byzantine-robust BGW with the error-correcting degree reduction.
    pub fn byzantine() -> Self {
        Self {
            input_verification: InputVerification::Complaints,
            multiplication: Multiplication::ErrorCorrecting,
            ..Self::default()
        }
    }

    /// Sets the degree reduction strategy.
    pub fn with_multiplication(mut self, multiplication: Multiplication) -> Self {
        self.multiplication = multiplication;
        self
    }

    /// Sets the sharing degree.
    pub fn with_degree(mut self, degree: usize) -> Self {
        self.degree = Some(degree);
        self
    }

    /// Seeds the parties' randomness.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            degree: None,
            complaint_rounds: Self::COMPLAINT_ROUNDS,
            seed: None,
            input_verification: InputVerification::Trusting,
            multiplication: Multiplication::Grr,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_fields_use_defaults() {
        let config: SessionConfig =
            serde_json::from_str(r#"{ "seed": 3, "multiplication": "VerifiedGrr" }"#).unwrap();
        assert_eq!(config.seed, Some(3));
        assert_eq!(config.multiplication, Multiplication::VerifiedGrr);
        assert_eq!(config.complaint_rounds, SessionConfig::COMPLAINT_ROUNDS);
        assert_eq!(config.degree, None);
        assert_eq!(config.input_verification, InputVerification::Trusting);

        let config: SessionConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, SessionConfig::default());
    }

    #[test]
    fn survives_the_wire() {
        let config = SessionConfig::byzantine().with_seed(3).with_degree(1);
        let bytes = bincode::serialize(&config).unwrap();
        assert_eq!(bincode::deserialize::<SessionConfig>(&bytes).unwrap(), config);
    }
}
