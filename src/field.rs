//! Arithmetic in the prime field `Z/pZ`.
//!
//! [`Zp`] is a small value type carrying its own prime, so that elements received from other
//! parties can be checked against the field of the running session (see [`Zp::is_element_of`]).
//! The errors of the whole linear-algebra layer (fields, polynomials, matrices and sharing) are
//! collected in [`Error`].
use std::{
    fmt,
    ops::{Add, AddAssign, Mul, MulAssign, Neg, Sub, SubAssign},
};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised by field, polynomial, matrix and secret sharing operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    /// Division by the additive identity.
    #[error("division by zero")]
    DivisionByZero,
    /// A polynomial division left a non-zero remainder.
    #[error("polynomial is not divisible without remainder")]
    NotDivisible,
    /// The matrix is not square or has no inverse.
    #[error("matrix is singular")]
    SingularMatrix,
    /// The sharing degree does not fit the number of players.
    #[error("cannot share among {players} players with degree {degree}")]
    InvalidDegree {
        /// The number of players.
        players: usize,
        /// The requested polynomial degree.
        degree: usize,
    },
    /// The parameters do not fit the field (e.g. too few distinct evaluation points).
    #[error("invalid parameters: {0}")]
    InvalidParameters(String),
    /// Fewer shares than the degree requires are available.
    #[error("need {needed} shares to recombine, but only {available} are present")]
    NotEnoughShares {
        /// Shares required for recombination.
        needed: usize,
        /// Shares actually present.
        available: usize,
    },
    /// The modulus is not a prime.
    #[error("{0} is not a prime")]
    NotPrime(i64),
}

/// An element of the prime field `Z/pZ`, always normalized into `[0, prime)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Zp {
    prime: i64,
    value: i64,
}

impl Zp {
    /// Creates the element `value mod prime`.
    pub fn new(prime: i64, value: i64) -> Self {
        Self {
            prime,
            value: value.rem_euclid(prime),
        }
    }

    /// The additive identity.
    pub fn zero(prime: i64) -> Self {
        Self { prime, value: 0 }
    }

    /// The multiplicative identity.
    pub fn one(prime: i64) -> Self {
        Self::new(prime, 1)
    }

    /// The modulus of the field this element belongs to.
    pub fn prime(&self) -> i64 {
        self.prime
    }

    /// The normalized value in `[0, prime)`.
    pub fn value(&self) -> i64 {
        self.value
    }

    /// Returns true for the additive identity.
    pub fn is_zero(&self) -> bool {
        self.value == 0
    }

    /// Checks that the element belongs to the given field and is normalized.
    ///
    /// Deserialization does not normalize, so every element received from another party must
    /// pass this check before it is used.
    pub fn is_element_of(&self, prime: i64) -> bool {
        self.prime == prime && (0..prime).contains(&self.value)
    }

    /// The multiplicative inverse, failing for zero.
    pub fn inverse(&self) -> Result<Self, Error> {
        Ok(Self {
            prime: self.prime,
            value: mod_inverse(self.value, self.prime)?,
        })
    }

    /// Division as multiplication by the inverse of `rhs`.
    pub fn checked_div(self, rhs: Self) -> Result<Self, Error> {
        debug_assert_eq!(self.prime, rhs.prime);
        Ok(self * rhs.inverse()?)
    }

    /// Raises the element to the given power.
    pub fn pow(self, exponent: u64) -> Self {
        Self {
            prime: self.prime,
            value: mod_pow(self.value, exponent, self.prime),
        }
    }
}

impl fmt::Display for Zp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.value)
    }
}

impl Add for Zp {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        debug_assert_eq!(self.prime, rhs.prime);
        let sum = self.value as i128 + rhs.value as i128;
        Self {
            prime: self.prime,
            value: (sum % self.prime as i128) as i64,
        }
    }
}

impl Sub for Zp {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self::Output {
        debug_assert_eq!(self.prime, rhs.prime);
        Self::new(self.prime, self.value - rhs.value)
    }
}

impl Mul for Zp {
    type Output = Self;

    fn mul(self, rhs: Self) -> Self::Output {
        debug_assert_eq!(self.prime, rhs.prime);
        let product = self.value as i128 * rhs.value as i128;
        Self {
            prime: self.prime,
            value: (product % self.prime as i128) as i64,
        }
    }
}

impl Neg for Zp {
    type Output = Self;

    fn neg(self) -> Self::Output {
        Self::new(self.prime, -self.value)
    }
}

impl AddAssign for Zp {
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}

impl SubAssign for Zp {
    fn sub_assign(&mut self, rhs: Self) {
        *self = *self - rhs;
    }
}

impl MulAssign for Zp {
    fn mul_assign(&mut self, rhs: Self) {
        *self = *self * rhs;
    }
}

/// Trial division primality test.
pub fn is_prime(n: i64) -> bool {
    if n < 2 {
        return false;
    }
    let mut d = 2;
    while d * d <= n {
        if n % d == 0 {
            return false;
        }
        d += 1;
    }
    true
}

/// Modular exponentiation by repeated squaring.
pub fn mod_pow(base: i64, exponent: u64, prime: i64) -> i64 {
    let p = prime as i128;
    let mut base = (base as i128).rem_euclid(p);
    let mut exponent = exponent;
    let mut result = 1 % p;
    while exponent > 0 {
        if exponent & 1 == 1 {
            result = result * base % p;
        }
        base = base * base % p;
        exponent >>= 1;
    }
    result as i64
}

/// The multiplicative inverse of `value` modulo `prime` (extended Euclid).
pub fn mod_inverse(value: i64, prime: i64) -> Result<i64, Error> {
    let a = value.rem_euclid(prime);
    if a == 0 {
        return Err(Error::DivisionByZero);
    }
    let (mut old_r, mut r) = (a as i128, prime as i128);
    let (mut old_s, mut s) = (1_i128, 0_i128);
    while r != 0 {
        let q = old_r / r;
        (old_r, r) = (r, old_r - q * r);
        (old_s, s) = (s, old_s - q * s);
    }
    Ok(old_s.rem_euclid(prime as i128) as i64)
}

/// The inverses of all field elements, indexed by element (`0` maps to `0`).
pub fn inverse_table(prime: i64) -> Vec<i64> {
    let size = prime.max(2) as usize;
    let mut table = vec![0; size];
    table[1] = 1 % prime;
    for i in 2..size {
        let i = i as i64;
        // p = (p / i) * i + p % i  =>  i^-1 = -(p / i) * (p % i)^-1
        let q = prime / i;
        let r = (prime % i) as usize;
        table[i as usize] = ((-(q as i128) * table[r] as i128).rem_euclid(prime as i128)) as i64;
    }
    table
}

/// The smallest generator of the multiplicative group of the field.
pub fn primitive_root(prime: i64) -> Result<Zp, Error> {
    if !is_prime(prime) {
        return Err(Error::NotPrime(prime));
    }
    if prime == 2 {
        return Ok(Zp::one(prime));
    }
    let order = prime - 1;
    let factors = prime_factors(order);
    for candidate in 2..prime {
        if factors
            .iter()
            .all(|q| mod_pow(candidate, (order / q) as u64, prime) != 1)
        {
            return Ok(Zp::new(prime, candidate));
        }
    }
    Err(Error::InvalidParameters(format!(
        "no primitive root found for {prime}"
    )))
}

fn prime_factors(mut n: i64) -> Vec<i64> {
    let mut factors = vec![];
    let mut d = 2;
    while d * d <= n {
        if n % d == 0 {
            factors.push(d);
            while n % d == 0 {
                n /= d;
            }
        }
        d += 1;
    }
    if n > 1 {
        factors.push(n);
    }
    factors
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    const PRIMES: [i64; 6] = [2, 3, 61, 1009, 7919, 2_147_483_647];

    fn prime_and_pair() -> impl Strategy<Value = (i64, i64, i64)> {
        proptest::sample::select(PRIMES.to_vec())
            .prop_flat_map(|p| (Just(p), 0..p, 0..p))
    }

    proptest! {
        #[test]
        fn ring_ops_match_integer_arithmetic((p, a, b) in prime_and_pair()) {
            let (x, y) = (Zp::new(p, a), Zp::new(p, b));
            prop_assert_eq!((x + y).value(), (a + b) % p);
            prop_assert_eq!((x - y).value(), (a - b).rem_euclid(p));
            prop_assert_eq!((x * y).value(), ((a as i128 * b as i128) % p as i128) as i64);
        }

        #[test]
        fn division_inverts_multiplication((p, a, b) in prime_and_pair()) {
            prop_assume!(b != 0);
            let (x, y) = (Zp::new(p, a), Zp::new(p, b));
            prop_assert_eq!(x.checked_div(y).unwrap() * y, x);
        }
    }

    #[test]
    fn division_by_zero_fails() {
        assert_eq!(
            Zp::new(61, 5).checked_div(Zp::zero(61)),
            Err(Error::DivisionByZero)
        );
    }

    #[test]
    fn normalizes_negative_values() {
        assert_eq!(Zp::new(61, -1).value(), 60);
        assert_eq!((-Zp::new(61, 1)).value(), 60);
        assert_eq!(Zp::new(61, 122).value(), 0);
    }

    #[test]
    fn primes() {
        let found: Vec<i64> = (0..30).filter(|n| is_prime(*n)).collect();
        assert_eq!(found, vec![2, 3, 5, 7, 11, 13, 17, 19, 23, 29]);
    }

    #[test]
    fn minimal_primitive_roots() {
        assert_eq!(primitive_root(7).unwrap().value(), 3);
        assert_eq!(primitive_root(17).unwrap().value(), 3);
        assert_eq!(primitive_root(61).unwrap().value(), 2);
        assert_eq!(primitive_root(2).unwrap().value(), 1);
        assert_eq!(primitive_root(8), Err(Error::NotPrime(8)));
    }

    #[test]
    fn primitive_root_generates_the_group() {
        let p = 61;
        let w = primitive_root(p).unwrap();
        let mut seen = std::collections::HashSet::new();
        for i in 0..(p - 1) as u64 {
            seen.insert(w.pow(i).value());
        }
        assert_eq!(seen.len(), (p - 1) as usize);
    }

    #[test]
    fn inverse_table_matches_inverse() {
        assert_eq!(inverse_table(7), vec![0, 1, 4, 5, 2, 3, 6]);
        let table = inverse_table(1009);
        for (a, inv) in table.iter().enumerate().skip(1) {
            assert_eq!(mod_inverse(a as i64, 1009).unwrap(), *inv);
        }
    }

    #[test]
    fn pow_by_squaring() {
        assert_eq!(mod_pow(3, 0, 7), 1);
        assert_eq!(mod_pow(3, 6, 7), 1);
        assert_eq!(mod_pow(2, 10, 1009), 1024 % 1009);
        assert_eq!(mod_pow(-2, 3, 61), 53);
    }
}
