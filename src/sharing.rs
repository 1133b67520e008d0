//! Shamir secret sharing: univariate shares, recombination and bivariate (Byzantine) shares.
//!
//! Players are numbered from `0`. Player `i` evaluates at `x = i + 1` with
//! [`EvalPoints::Sequential`] and at `x = w^i` (for the primitive root `w`) with
//! [`EvalPoints::Primitive`]. Both the semi-honest and the Byzantine engine depend on these
//! conventions, so shares of one kind must only ever be recombined with the same kind.
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::{
    field::{Error, Zp, primitive_root},
    matrix::FieldMatrix,
    polynomial::Polynomial,
};

/// The evaluation points used for the players' shares.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EvalPoints {
    /// Player `i` holds the share at `x = i + 1`.
    Sequential,
    /// Player `i` holds the share at `x = w^i`, `w` being the field's primitive root.
    Primitive,
}

/// The sharing polynomial together with the resulting shares.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShareDetails {
    /// The `t + 1` coefficients of the sharing polynomial, the secret first.
    pub coefficients: Vec<Zp>,
    /// One share per player.
    pub shares: Vec<Zp>,
}

impl ShareDetails {
    /// The sharing polynomial.
    pub fn polynomial(&self, prime: i64) -> Polynomial {
        Polynomial::new(prime, self.coefficients.clone())
    }
}

/// A player's part of a bivariate sharing `f(x, y)`.
///
/// Player `i` holds `f_i(x) = f(x, w^i)` and `g_i(y) = f(w^i, y)`, both as `t + 1`
/// coefficients. The player's share of the secret is `f_i(0)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecretPolynomials {
    /// Coefficients of `f(x, w^i)`.
    pub f: Vec<Zp>,
    /// Coefficients of `f(w^i, y)`.
    pub g: Vec<Zp>,
}

impl SecretPolynomials {
    /// The share of the secret, `f_i(0)`.
    pub fn share(&self) -> Option<Zp> {
        self.f.first().copied()
    }

    /// Evaluates `f_i` at `x`.
    pub fn f_at(&self, prime: i64, x: Zp) -> Zp {
        Polynomial::new(prime, self.f.clone()).evaluate(x)
    }

    /// Evaluates `g_i` at `y`.
    pub fn g_at(&self, prime: i64, y: Zp) -> Zp {
        Polynomial::new(prime, self.g.clone()).evaluate(y)
    }

    /// Checks the shape and the field of untrusted polynomials.
    pub fn is_well_formed(&self, t: usize, prime: i64) -> bool {
        self.f.len() == t + 1
            && self.g.len() == t + 1
            && self.f.iter().chain(&self.g).all(|c| c.is_element_of(prime))
    }

    /// Both polynomials pass through `f(w^i, w^i)` at the player's own point.
    pub fn is_consistent_at(&self, prime: i64, own_point: Zp) -> bool {
        self.f_at(prime, own_point) == self.g_at(prime, own_point)
    }
}

/// The evaluation points of `n` players.
pub fn evaluation_points(prime: i64, n: usize, points: EvalPoints) -> Result<Vec<Zp>, Error> {
    if n as i64 >= prime {
        return Err(Error::InvalidParameters(format!(
            "the field of size {prime} has too few points for {n} players"
        )));
    }
    match points {
        EvalPoints::Sequential => Ok((1..=n as i64).map(|x| Zp::new(prime, x)).collect()),
        EvalPoints::Primitive => {
            let w = primitive_root(prime)?;
            Ok((0..n as u64).map(|i| w.pow(i)).collect())
        }
    }
}

fn check_degree(n: usize, t: usize) -> Result<(), Error> {
    if n <= t {
        return Err(Error::InvalidDegree {
            players: n,
            degree: t,
        });
    }
    Ok(())
}

fn random_coefficients<R: Rng + ?Sized>(rng: &mut R, secret: Zp, t: usize) -> FieldMatrix {
    let mut coefficients = FieldMatrix::random(1, t + 1, secret.prime(), rng);
    coefficients.set(0, 0, secret);
    coefficients
}

fn share_with_details<R: Rng + ?Sized>(
    rng: &mut R,
    secret: Zp,
    n: usize,
    t: usize,
    points: EvalPoints,
) -> Result<ShareDetails, Error> {
    check_degree(n, t)?;
    let prime = secret.prime();
    let xs = evaluation_points(prime, n, points)?;
    let coefficients = random_coefficients(rng, secret, t);
    let shares = coefficients.times(&FieldMatrix::vandermonde_with(t + 1, prime, &xs))?;
    Ok(ShareDetails {
        coefficients: coefficients.row(0),
        shares: shares.row(0),
    })
}

/// Splits `secret` into `n` shares of a random degree-`t` polynomial.
///
/// Fails with [`Error::InvalidDegree`] if `n <= t`.
pub fn share<R: Rng + ?Sized>(
    rng: &mut R,
    secret: Zp,
    n: usize,
    t: usize,
    points: EvalPoints,
) -> Result<Vec<Zp>, Error> {
    Ok(share_with_details(rng, secret, n, t, points)?.shares)
}

/// Shares `secret` at the primitive points and also returns the sharing polynomial.
pub fn detailed_share<R: Rng + ?Sized>(
    rng: &mut R,
    secret: Zp,
    n: usize,
    t: usize,
) -> Result<ShareDetails, Error> {
    share_with_details(rng, secret, n, t, EvalPoints::Primitive)
}

/// Shares of zero, used to re-randomize a sharing without changing its secret.
pub fn randomized_shares<R: Rng + ?Sized>(
    rng: &mut R,
    n: usize,
    t: usize,
    prime: i64,
    points: EvalPoints,
) -> Result<Vec<Zp>, Error> {
    share(rng, Zp::zero(prime), n, t, points)
}

/// Adds the received shares of zero to a share.
pub fn add_randomization(share: Zp, zero_shares: &[Zp]) -> Zp {
    zero_shares.iter().fold(share, |acc, z| acc + *z)
}

/// The value at `x = 0` of the polynomial through the given points.
pub fn interpolate_at_zero(prime: i64, xs: &[Zp], ys: &[Zp]) -> Result<Zp, Error> {
    let lambda = FieldMatrix::lagrange_at_zero(prime, xs)?;
    Ok(lambda
        .iter()
        .zip(ys)
        .fold(Zp::zero(prime), |acc, (l, y)| acc + *l * *y))
}

/// Reconstructs the secret from the first `t + 1` present shares.
///
/// `shares[i]` is player `i`'s share (or `None` if it is missing).
pub fn recombine(
    shares: &[Option<Zp>],
    t: usize,
    prime: i64,
    points: EvalPoints,
) -> Result<Zp, Error> {
    let all_xs = evaluation_points(prime, shares.len(), points)?;
    let (xs, ys): (Vec<Zp>, Vec<Zp>) = shares
        .iter()
        .zip(all_xs)
        .filter_map(|(share, x)| share.map(|s| (x, s)))
        .take(t + 1)
        .unzip();
    if xs.len() < t + 1 {
        return Err(Error::NotEnoughShares {
            needed: t + 1,
            available: xs.len(),
        });
    }
    interpolate_at_zero(prime, &xs, &ys)
}

/// Shares `secret` with a random bivariate polynomial of degree `t` in each variable.
///
/// Requires `n > 4t`, so that the Byzantine protocol can decode around up to `t` cheaters.
pub fn share_byzantine<R: Rng + ?Sized>(
    rng: &mut R,
    secret: Zp,
    n: usize,
    t: usize,
) -> Result<Vec<SecretPolynomials>, Error> {
    if n <= 4 * t {
        return Err(Error::InvalidDegree {
            players: n,
            degree: t,
        });
    }
    let prime = secret.prime();
    let xs = evaluation_points(prime, n, EvalPoints::Primitive)?;
    // entry (a, b) is the coefficient of x^a y^b
    let mut bivariate = FieldMatrix::random(t + 1, t + 1, prime, rng);
    bivariate.set(0, 0, secret);
    let transposed = bivariate.transpose();
    xs.iter()
        .map(|w| {
            let powers = FieldMatrix::vandermonde_with(t + 1, prime, &[*w]);
            Ok(SecretPolynomials {
                f: bivariate.times(&powers)?.column(0),
                g: transposed.times(&powers)?.column(0),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha20Rng;

    use super::*;

    const P: i64 = 1009;

    proptest! {
        #[test]
        fn share_then_recombine(secret in 0..P, n in 1usize..10, seed in any::<u64>()) {
            let mut rng = ChaCha20Rng::seed_from_u64(seed);
            let secret = Zp::new(P, secret);
            for t in 0..n {
                for points in [EvalPoints::Sequential, EvalPoints::Primitive] {
                    let shares = share(&mut rng, secret, n, t, points).unwrap();
                    let shares: Vec<Option<Zp>> = shares.into_iter().map(Some).collect();
                    prop_assert_eq!(recombine(&shares, t, P, points).unwrap(), secret);
                }
            }
        }
    }

    #[test]
    fn share_requires_more_players_than_degree() {
        let mut rng = ChaCha20Rng::seed_from_u64(1);
        assert_eq!(
            share(&mut rng, Zp::new(P, 1), 3, 3, EvalPoints::Sequential),
            Err(Error::InvalidDegree {
                players: 3,
                degree: 3
            })
        );
    }

    #[test]
    fn recombine_skips_missing_shares() {
        let mut rng = ChaCha20Rng::seed_from_u64(2);
        let secret = Zp::new(P, 42);
        let shares = share(&mut rng, secret, 5, 2, EvalPoints::Sequential).unwrap();
        let mut partial: Vec<Option<Zp>> = shares.into_iter().map(Some).collect();
        partial[0] = None;
        partial[3] = None;
        assert_eq!(recombine(&partial, 2, P, EvalPoints::Sequential), Ok(secret));
        partial[1] = None;
        assert_eq!(
            recombine(&partial, 2, P, EvalPoints::Sequential),
            Err(Error::NotEnoughShares {
                needed: 3,
                available: 2
            })
        );
    }

    #[test]
    fn detailed_share_matches_polynomial() {
        let mut rng = ChaCha20Rng::seed_from_u64(3);
        let details = detailed_share(&mut rng, Zp::new(P, 17), 6, 2).unwrap();
        assert_eq!(details.coefficients.len(), 3);
        assert_eq!(details.coefficients[0].value(), 17);
        let poly = details.polynomial(P);
        let xs = evaluation_points(P, 6, EvalPoints::Primitive).unwrap();
        for (x, s) in xs.iter().zip(&details.shares) {
            assert_eq!(poly.evaluate(*x), *s);
        }
    }

    #[test]
    fn randomized_shares_hide_nothing_but_zero() {
        let mut rng = ChaCha20Rng::seed_from_u64(4);
        let secret = Zp::new(P, 99);
        let shares = share(&mut rng, secret, 4, 1, EvalPoints::Sequential).unwrap();
        let zeros = randomized_shares(&mut rng, 4, 1, P, EvalPoints::Sequential).unwrap();
        let combined: Vec<Option<Zp>> = shares
            .iter()
            .zip(&zeros)
            .map(|(s, z)| Some(add_randomization(*s, &[*z])))
            .collect();
        assert_ne!(combined[0], Some(shares[0]));
        assert_eq!(recombine(&combined, 1, P, EvalPoints::Sequential), Ok(secret));
    }

    #[test]
    fn bivariate_shares_are_pairwise_consistent() {
        let mut rng = ChaCha20Rng::seed_from_u64(5);
        let (n, t) = (7, 1);
        let secret = Zp::new(P, 123);
        let polys = share_byzantine(&mut rng, secret, n, t).unwrap();
        let xs = evaluation_points(P, n, EvalPoints::Primitive).unwrap();
        for i in 0..n {
            assert!(polys[i].is_well_formed(t, P));
            assert!(polys[i].is_consistent_at(P, xs[i]));
            for j in 0..n {
                // f_i(w^j) = f(w^j, w^i) = g_j(w^i)
                assert_eq!(polys[i].f_at(P, xs[j]), polys[j].g_at(P, xs[i]));
            }
        }
        let shares: Vec<Option<Zp>> = polys.iter().map(SecretPolynomials::share).collect();
        assert_eq!(recombine(&shares, t, P, EvalPoints::Primitive), Ok(secret));
    }

    #[test]
    fn bivariate_sharing_requires_honest_majority_margin() {
        let mut rng = ChaCha20Rng::seed_from_u64(6);
        assert!(share_byzantine(&mut rng, Zp::new(P, 1), 4, 1).is_err());
        assert!(share_byzantine(&mut rng, Zp::new(P, 1), 5, 1).is_ok());
    }
}
