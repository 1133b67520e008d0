//! Welch-Berlekamp decoding of Reed-Solomon codewords.
//!
//! Given `n` points of which at most `e` are wrong, the decoder looks for a monic error
//! locator `E` of degree `e` and a numerator `N` of degree `< n - e` with
//! `N(x_i) = y_i · E(x_i)` for all `i`. If the errors fit the bound, `N / E` is the message
//! polynomial and the division is exact.
use thiserror::Error;

use crate::{
    field::Zp,
    matrix::FieldMatrix,
    polynomial::Polynomial,
};

/// More errors than the given bound, the codeword cannot be corrected.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("could not decode codeword with at most {max_errors} errors")]
pub struct DecodeFailure {
    /// The error bound that was exceeded.
    pub max_errors: usize,
}

/// Decodes the polynomial of degree `<= degree` that agrees with all but `max_errors` points.
pub fn decode_polynomial(
    prime: i64,
    xs: &[Zp],
    ys: &[Zp],
    max_errors: usize,
    degree: usize,
) -> Result<Polynomial, DecodeFailure> {
    let failure = DecodeFailure { max_errors };
    let n = xs.len();
    if ys.len() != n || n < degree + 1 {
        return Err(failure);
    }
    if max_errors == 0 {
        return Polynomial::interpolate(prime, &xs[..=degree], &ys[..=degree]).map_err(|_| failure);
    }
    let e = max_errors;
    if n < 2 * e {
        return Err(failure);
    }
    let numerator_len = n - e;

    // [ x_i^0 .. x_i^(n-e-1) | -y_i x_i^0 .. -y_i x_i^(e-1) | y_i x_i^e ]
    let numerator_part = FieldMatrix::vandermonde_with(numerator_len, prime, xs).transpose();
    let neg_ys: Vec<Zp> = ys.iter().map(|y| -*y).collect();
    let locator_part = FieldMatrix::vandermonde_with(e, prime, xs)
        .transpose()
        .scale_rows(&neg_ys)
        .map_err(|_| failure.clone())?;
    let rhs: Vec<Zp> = xs.iter().zip(ys).map(|(x, y)| x.pow(e as u64) * *y).collect();
    let mut system = numerator_part
        .concat(&locator_part)
        .and_then(|m| m.concat(&FieldMatrix::from_row(prime, &rhs).transpose()))
        .map_err(|_| failure.clone())?;
    system.gauss();

    let unknowns = numerator_len + e;
    let mut solution = vec![Zp::zero(prime); unknowns];
    for r in 0..system.rows() {
        let row = system.row(r);
        match row[..unknowns].iter().position(|c| !c.is_zero()) {
            Some(pivot) => solution[pivot] = row[unknowns],
            None if !row[unknowns].is_zero() => return Err(failure),
            None => {}
        }
    }

    let numerator = Polynomial::new(prime, solution[..numerator_len].to_vec());
    let mut locator = solution[numerator_len..].to_vec();
    locator.push(Zp::one(prime));
    let locator = Polynomial::new(prime, locator);
    let message = numerator
        .divide_with_remainder(&locator)
        .map_err(|_| failure.clone())?;

    if message.degree().is_some_and(|d| d > degree) {
        return Err(failure);
    }
    let disagreements = xs
        .iter()
        .zip(ys)
        .filter(|(x, y)| message.evaluate(**x) != **y)
        .count();
    if disagreements > e {
        return Err(failure);
    }
    Ok(message)
}

/// Decodes the codeword and returns the corrected value at every point.
pub fn decode(
    prime: i64,
    xs: &[Zp],
    ys: &[Zp],
    max_errors: usize,
    degree: usize,
) -> Result<Vec<Zp>, DecodeFailure> {
    let message = decode_polynomial(prime, xs, ys, max_errors, degree)?;
    Ok(xs.iter().map(|x| message.evaluate(*x)).collect())
}
