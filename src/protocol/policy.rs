//! The capabilities a protocol session is composed of.
//!
//! Instead of one engine per adversary model, a session is configured with a
//! [`ProtocolPolicy`]: how inputs are verified, how products are reduced, and a small set of
//! [`Hooks`] for the values a party produces locally. The hooks are plain function pointers,
//! which makes it easy to build a misbehaving party for tests by replacing a single one.
use rand_chacha::ChaCha20Rng;
use serde::{Deserialize, Serialize};

use crate::{
    config::SessionConfig,
    field::{self, Zp},
    sharing::{self, EvalPoints, SecretPolynomials},
};

/// How input shares are checked before they are used.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InputVerification {
    /// Shares are accepted as received (semi-honest parties).
    Trusting,
    /// Bivariate sharing with public complaint and disclosure rounds (Byzantine parties).
    Complaints,
}

/// How the degree of a product sharing is reduced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Multiplication {
    /// Re-share and recombine (semi-honest parties).
    Grr,
    /// Re-share with a public verification polynomial per dealer.
    VerifiedGrr,
    /// Re-share verifiably and locate cheaters by decoding the expected-zero coefficients.
    ErrorCorrecting,
}

/// Deals the bivariate sharing of a secret among `n` parties at degree `t`.
pub type DealFn =
    fn(&mut ChaCha20Rng, Zp, usize, usize) -> Result<Vec<SecretPolynomials>, field::Error>;

/// Selects the dealt polynomials to disclose, given the mask of complaining parties.
pub type DiscloseFn = fn(&[SecretPolynomials], &[bool]) -> Vec<Option<SecretPolynomials>>;

/// Maps the local product of two shares (for the given party) to the value that is re-shared.
pub type ProductFn = fn(usize, Zp) -> Zp;

/// The locally computed values of a party.
#[derive(Debug, Clone, Copy)]
pub struct Hooks {
    /// Dealing of input and product sharings.
    pub deal: DealFn,
    /// Disclosure of dealt polynomials after complaints.
    pub disclose: DiscloseFn,
    /// The product share before degree reduction.
    pub product: ProductFn,
}

fn deal(
    rng: &mut ChaCha20Rng,
    secret: Zp,
    n: usize,
    t: usize,
) -> Result<Vec<SecretPolynomials>, field::Error> {
    sharing::share_byzantine(rng, secret, n, t)
}

fn disclose(dealt: &[SecretPolynomials], complainers: &[bool]) -> Vec<Option<SecretPolynomials>> {
    dealt
        .iter()
        .zip(complainers)
        .map(|(polys, complained)| complained.then(|| polys.clone()))
        .collect()
}

fn product(_party: usize, product: Zp) -> Zp {
    product
}

impl Default for Hooks {
    fn default() -> Self {
        Self {
            deal,
            disclose,
            product,
        }
    }
}

/// The capability set of a protocol session.
#[derive(Debug, Clone, Copy)]
pub struct ProtocolPolicy {
    /// Input verification.
    pub input_verification: InputVerification,
    /// Degree reduction after multiplication.
    pub multiplication: Multiplication,
    /// The party's local behavior.
    pub hooks: Hooks,
}

impl ProtocolPolicy {
    /// Semi-honest BGW: plain Shamir sharing and GRR.
    pub fn semi_honest() -> Self {
        Self {
            input_verification: InputVerification::Trusting,
            multiplication: Multiplication::Grr,
            hooks: Hooks::default(),
        }
    }

    /// Byzantine-robust BGW with the error-correcting degree reduction.
    pub fn byzantine() -> Self {
        Self {
            input_verification: InputVerification::Complaints,
            multiplication: Multiplication::ErrorCorrecting,
            hooks: Hooks::default(),
        }
    }

    /// The honest policy described by a session configuration.
    pub fn from_config(config: &SessionConfig) -> Self {
        Self {
            input_verification: config.input_verification,
            multiplication: config.multiplication,
            hooks: Hooks::default(),
        }
    }

    /// True if the policy protects against Byzantine parties.
    pub fn is_byzantine(&self) -> bool {
        self.input_verification == InputVerification::Complaints
    }

    /// The evaluation points of the parties' shares.
    pub fn points(&self) -> EvalPoints {
        if self.is_byzantine() {
            EvalPoints::Primitive
        } else {
            EvalPoints::Sequential
        }
    }

    /// Checks that the capabilities fit together.
    pub fn validate(&self) -> Result<(), String> {
        match (self.input_verification, self.multiplication) {
            (InputVerification::Trusting, Multiplication::Grr)
            | (
                InputVerification::Complaints,
                Multiplication::VerifiedGrr | Multiplication::ErrorCorrecting,
            ) => Ok(()),
            (verification, multiplication) => Err(format!(
                "{multiplication:?} multiplication cannot be combined with {verification:?} inputs"
            )),
        }
    }
}
