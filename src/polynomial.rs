//! Dense univariate polynomials over a prime field.
use serde::{Deserialize, Serialize};

use crate::field::{Error, Zp, mod_pow};

/// A polynomial given by its coefficients, index = degree.
///
/// Trailing zero coefficients are trimmed, the zero polynomial has no coefficients at all.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Polynomial {
    prime: i64,
    coefficients: Vec<Zp>,
}

impl Polynomial {
    /// Creates a polynomial from its coefficients (lowest degree first).
    pub fn new(prime: i64, coefficients: Vec<Zp>) -> Self {
        let mut coefficients = coefficients;
        while coefficients.last().is_some_and(Zp::is_zero) {
            coefficients.pop();
        }
        Self {
            prime,
            coefficients,
        }
    }

    /// Creates a polynomial from raw integer coefficients (lowest degree first).
    pub fn from_values(prime: i64, values: &[i64]) -> Self {
        Self::new(prime, values.iter().map(|v| Zp::new(prime, *v)).collect())
    }

    /// The zero polynomial.
    pub fn zero(prime: i64) -> Self {
        Self {
            prime,
            coefficients: vec![],
        }
    }

    /// The modulus of the coefficient field.
    pub fn prime(&self) -> i64 {
        self.prime
    }

    /// The (trimmed) coefficients, lowest degree first.
    pub fn coefficients(&self) -> &[Zp] {
        &self.coefficients
    }

    /// The coefficient of `x^i`, zero beyond the degree.
    pub fn coefficient(&self, i: usize) -> Zp {
        self.coefficients
            .get(i)
            .copied()
            .unwrap_or(Zp::zero(self.prime))
    }

    /// The degree, `None` for the zero polynomial.
    pub fn degree(&self) -> Option<usize> {
        self.coefficients.len().checked_sub(1)
    }

    /// Returns true for the zero polynomial.
    pub fn is_zero(&self) -> bool {
        self.coefficients.is_empty()
    }

    /// Evaluates the polynomial at `point`, one modular power per term.
    pub fn evaluate(&self, point: Zp) -> Zp {
        let mut result = Zp::zero(self.prime);
        for (i, c) in self.coefficients.iter().enumerate() {
            let power = mod_pow(point.value(), i as u64, self.prime);
            result += *c * Zp::new(self.prime, power);
        }
        result
    }

    /// The sum of two polynomials.
    pub fn plus(&self, other: &Self) -> Self {
        let len = self.coefficients.len().max(other.coefficients.len());
        let coefficients = (0..len)
            .map(|i| self.coefficient(i) + other.coefficient(i))
            .collect();
        Self::new(self.prime, coefficients)
    }

    /// The difference of two polynomials.
    pub fn minus(&self, other: &Self) -> Self {
        let len = self.coefficients.len().max(other.coefficients.len());
        let coefficients = (0..len)
            .map(|i| self.coefficient(i) - other.coefficient(i))
            .collect();
        Self::new(self.prime, coefficients)
    }

    /// Multiplies every coefficient by `factor`.
    pub fn scale(&self, factor: Zp) -> Self {
        Self::new(
            self.prime,
            self.coefficients.iter().map(|c| *c * factor).collect(),
        )
    }

    /// Multiplies the polynomial by `x`.
    pub fn shift(&self) -> Self {
        if self.is_zero() {
            return self.clone();
        }
        let mut coefficients = Vec::with_capacity(self.coefficients.len() + 1);
        coefficients.push(Zp::zero(self.prime));
        coefficients.extend_from_slice(&self.coefficients);
        Self::new(self.prime, coefficients)
    }

    /// The product of two polynomials (coefficient convolution).
    pub fn multiply(&self, other: &Self) -> Self {
        if self.is_zero() || other.is_zero() {
            return Self::zero(self.prime);
        }
        let mut coefficients =
            vec![Zp::zero(self.prime); self.coefficients.len() + other.coefficients.len() - 1];
        for (i, a) in self.coefficients.iter().enumerate() {
            for (j, b) in other.coefficients.iter().enumerate() {
                coefficients[i + j] += *a * *b;
            }
        }
        Self::new(self.prime, coefficients)
    }

    /// Long division that only succeeds if the remainder is zero.
    ///
    /// Returns the quotient, or [`Error::NotDivisible`] if `divisor` does not divide `self`.
    pub fn divide_with_remainder(&self, divisor: &Self) -> Result<Self, Error> {
        let Some(d) = divisor.degree() else {
            return Err(Error::DivisionByZero);
        };
        let Some(n) = self.degree() else {
            return Ok(Self::zero(self.prime));
        };
        if n < d {
            return Err(Error::NotDivisible);
        }
        let lead_inverse = divisor.coefficients[d].inverse()?;
        let mut remainder = self.coefficients.clone();
        let mut quotient = vec![Zp::zero(self.prime); n - d + 1];
        for i in (0..=n - d).rev() {
            let factor = remainder[i + d] * lead_inverse;
            quotient[i] = factor;
            for (j, c) in divisor.coefficients.iter().enumerate() {
                remainder[i + j] -= factor * *c;
            }
        }
        if remainder.iter().all(Zp::is_zero) {
            Ok(Self::new(self.prime, quotient))
        } else {
            Err(Error::NotDivisible)
        }
    }

    /// All roots, found by scanning the whole field. Only sensible for small primes.
    pub fn roots(&self) -> Vec<Zp> {
        (0..self.prime)
            .map(|v| Zp::new(self.prime, v))
            .filter(|x| self.evaluate(*x).is_zero())
            .collect()
    }

    /// The unique polynomial of degree `< xs.len()` through the given points (Lagrange).
    pub fn interpolate(prime: i64, xs: &[Zp], ys: &[Zp]) -> Result<Self, Error> {
        if xs.len() != ys.len() {
            return Err(Error::InvalidParameters(format!(
                "{} x-values but {} y-values",
                xs.len(),
                ys.len()
            )));
        }
        let mut result = Self::zero(prime);
        for (i, (xi, yi)) in xs.iter().zip(ys).enumerate() {
            let mut basis = Self::new(prime, vec![Zp::one(prime)]);
            let mut denominator = Zp::one(prime);
            for (j, xj) in xs.iter().enumerate() {
                if i == j {
                    continue;
                }
                basis = basis.multiply(&Self::new(prime, vec![-*xj, Zp::one(prime)]));
                denominator *= *xi - *xj;
            }
            let factor = yi.checked_div(denominator).map_err(|_| {
                Error::InvalidParameters(format!("duplicate interpolation point {xi}"))
            })?;
            result = result.plus(&basis.scale(factor));
        }
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const P: i64 = 61;

    fn poly(values: &[i64]) -> Polynomial {
        Polynomial::from_values(P, values)
    }

    #[test]
    fn trims_trailing_zeros() {
        assert_eq!(poly(&[1, 2, 0, 0]).degree(), Some(1));
        assert_eq!(poly(&[0, 0]).degree(), None);
        assert!(poly(&[]).is_zero());
    }

    #[test]
    fn evaluate() {
        // 3 + 2x + x^2 at x = 5
        assert_eq!(poly(&[3, 2, 1]).evaluate(Zp::new(P, 5)).value(), 38);
        assert_eq!(poly(&[3, 2, 1]).evaluate(Zp::new(P, 10)).value(), 123 % P);
        assert!(poly(&[]).evaluate(Zp::new(P, 7)).is_zero());
    }

    #[test]
    fn multiply_and_divide() {
        let a = poly(&[1, 1]); // x + 1
        let b = poly(&[-2, 0, 1]); // x^2 - 2
        let product = a.multiply(&b);
        assert_eq!(product, poly(&[-2, -2, 1, 1]));
        assert_eq!(product.divide_with_remainder(&a), Ok(b.clone()));
        assert_eq!(product.divide_with_remainder(&b), Ok(a));
    }

    #[test]
    fn division_with_remainder_fails() {
        let a = poly(&[1, 0, 1]);
        let b = poly(&[1, 1]);
        assert_eq!(a.divide_with_remainder(&b), Err(Error::NotDivisible));
        assert_eq!(b.divide_with_remainder(&a), Err(Error::NotDivisible));
        assert_eq!(a.divide_with_remainder(&poly(&[])), Err(Error::DivisionByZero));
    }

    #[test]
    fn roots_by_scanning() {
        // (x - 3)(x - 7)
        let p = poly(&[-3, 1]).multiply(&poly(&[-7, 1]));
        let roots: Vec<i64> = p.roots().iter().map(Zp::value).collect();
        assert_eq!(roots, vec![3, 7]);
    }

    #[test]
    fn shift_and_arithmetic() {
        let a = poly(&[1, 2]);
        assert_eq!(a.shift(), poly(&[0, 1, 2]));
        assert_eq!(a.plus(&poly(&[-1, -2])), poly(&[]));
        assert_eq!(a.minus(&poly(&[1])), poly(&[0, 2]));
        assert_eq!(a.scale(Zp::new(P, 3)), poly(&[3, 6]));
    }

    #[test]
    fn interpolation_recovers_polynomial() {
        let p = poly(&[5, 0, 3]);
        let xs: Vec<Zp> = (1..=4).map(|x| Zp::new(P, x)).collect();
        let ys: Vec<Zp> = xs.iter().map(|x| p.evaluate(*x)).collect();
        assert_eq!(Polynomial::interpolate(P, &xs, &ys), Ok(p));
        let dup = [Zp::new(P, 1), Zp::new(P, 1)];
        assert!(Polynomial::interpolate(P, &dup, &dup).is_err());
    }
}
