//! Dense matrices over a prime field.
//!
//! Besides the usual arithmetic, [`FieldMatrix`] offers exact Gaussian elimination, an LU
//! decomposition with row pivoting (used for [`FieldMatrix::solve`] and
//! [`FieldMatrix::inverse`]) and the Vandermonde-family builders needed for sharing and
//! recombination.
use std::fmt;

use rand::Rng;

use crate::field::{Error, Zp, mod_inverse, primitive_root};

/// A `rows × cols` matrix of raw integers interpreted modulo `prime`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldMatrix {
    prime: i64,
    rows: usize,
    cols: usize,
    data: Vec<i64>,
}

fn mul_mod(a: i64, b: i64, p: i64) -> i64 {
    ((a as i128 * b as i128) % p as i128) as i64
}

fn sub_mod(a: i64, b: i64, p: i64) -> i64 {
    (a - b).rem_euclid(p)
}

fn dimension_mismatch(op: &str, a: &FieldMatrix, b: &FieldMatrix) -> Error {
    Error::InvalidParameters(format!(
        "cannot {op} a {}x{} and a {}x{} matrix",
        a.rows, a.cols, b.rows, b.cols
    ))
}

struct Lu {
    lu: FieldMatrix,
    perm: Vec<usize>,
    odd: bool,
}

impl FieldMatrix {
    /// The all-zero matrix.
    pub fn zeros(rows: usize, cols: usize, prime: i64) -> Self {
        Self {
            prime,
            rows,
            cols,
            data: vec![0; rows * cols],
        }
    }

    /// Builds a matrix from raw rows, normalizing every entry.
    pub fn from_rows(prime: i64, rows: &[Vec<i64>]) -> Result<Self, Error> {
        let cols = rows.first().map_or(0, Vec::len);
        if rows.iter().any(|r| r.len() != cols) {
            return Err(Error::InvalidParameters("ragged matrix rows".into()));
        }
        Ok(Self {
            prime,
            rows: rows.len(),
            cols,
            data: rows.iter().flatten().map(|v| v.rem_euclid(prime)).collect(),
        })
    }

    /// A `1 × n` matrix holding the given elements.
    pub fn from_row(prime: i64, row: &[Zp]) -> Self {
        Self {
            prime,
            rows: 1,
            cols: row.len(),
            data: row.iter().map(Zp::value).collect(),
        }
    }

    /// The `n × n` identity.
    pub fn identity(n: usize, prime: i64) -> Self {
        let mut m = Self::zeros(n, n, prime);
        for i in 0..n {
            m.data[i * n + i] = 1 % prime;
        }
        m
    }

    /// A matrix of uniformly random field elements.
    pub fn random<R: Rng + ?Sized>(rows: usize, cols: usize, prime: i64, rng: &mut R) -> Self {
        Self {
            prime,
            rows,
            cols,
            data: (0..rows * cols).map(|_| rng.random_range(0..prime)).collect(),
        }
    }

    /// Vandermonde matrix for the x-values `1..=cols`: entry `(r, c)` is `(c + 1)^r`.
    pub fn vandermonde(rows: usize, cols: usize, prime: i64) -> Self {
        let xs: Vec<Zp> = (1..=cols as i64).map(|x| Zp::new(prime, x)).collect();
        Self::vandermonde_with(rows, prime, &xs)
    }

    /// Vandermonde matrix for the given x-values: entry `(r, c)` is `xs[c]^r`.
    pub fn vandermonde_with(rows: usize, prime: i64, xs: &[Zp]) -> Self {
        let mut m = Self::zeros(rows, xs.len(), prime);
        for (c, x) in xs.iter().enumerate() {
            let mut power = Zp::one(prime);
            for r in 0..rows {
                m.data[r * m.cols + c] = power.value();
                power *= *x;
            }
        }
        m
    }

    /// Vandermonde matrix for the powers `w^0..w^(cols - 1)` of the field's primitive root.
    pub fn primitive_vandermonde(rows: usize, cols: usize, prime: i64) -> Result<Self, Error> {
        let w = primitive_root(prime)?;
        let xs: Vec<Zp> = (0..cols as u64).map(|i| w.pow(i)).collect();
        Ok(Self::vandermonde_with(rows, prime, &xs))
    }

    /// The transposed square Vandermonde matrix for `xs`, one row of powers per player.
    ///
    /// Solving against it turns a list of shares into the coefficients of the polynomial
    /// through them.
    pub fn shamir_recombination(prime: i64, xs: &[Zp]) -> Self {
        Self::vandermonde_with(xs.len(), prime, xs).transpose()
    }

    /// The Lagrange coefficients for reconstructing the value at `x = 0` from shares at `xs`.
    ///
    /// This is the first row of the inverse of [`FieldMatrix::shamir_recombination`].
    pub fn lagrange_at_zero(prime: i64, xs: &[Zp]) -> Result<Vec<Zp>, Error> {
        Ok(Self::shamir_recombination(prime, xs).inverse()?.row(0))
    }

    /// The modulus of the field.
    pub fn prime(&self) -> i64 {
        self.prime
    }

    /// Number of rows.
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Number of columns.
    pub fn cols(&self) -> usize {
        self.cols
    }

    /// The entry at row `r` and column `c`.
    pub fn get(&self, r: usize, c: usize) -> Zp {
        Zp::new(self.prime, self.data[r * self.cols + c])
    }

    /// Overwrites the entry at row `r` and column `c`.
    pub fn set(&mut self, r: usize, c: usize, value: Zp) {
        self.data[r * self.cols + c] = value.value();
    }

    /// The elements of row `r`.
    pub fn row(&self, r: usize) -> Vec<Zp> {
        self.data[r * self.cols..(r + 1) * self.cols]
            .iter()
            .map(|v| Zp::new(self.prime, *v))
            .collect()
    }

    /// The elements of column `c`.
    pub fn column(&self, c: usize) -> Vec<Zp> {
        (0..self.rows).map(|r| self.get(r, c)).collect()
    }

    /// The transposed matrix.
    pub fn transpose(&self) -> Self {
        let mut t = Self::zeros(self.cols, self.rows, self.prime);
        for r in 0..self.rows {
            for c in 0..self.cols {
                t.data[c * self.rows + r] = self.data[r * self.cols + c];
            }
        }
        t
    }

    /// The matrix product `self · other`.
    pub fn times(&self, other: &Self) -> Result<Self, Error> {
        if self.cols != other.rows {
            return Err(dimension_mismatch("multiply", self, other));
        }
        let p = self.prime;
        let mut m = Self::zeros(self.rows, other.cols, p);
        for r in 0..self.rows {
            for k in 0..self.cols {
                let a = self.data[r * self.cols + k];
                if a == 0 {
                    continue;
                }
                for c in 0..other.cols {
                    let idx = r * m.cols + c;
                    m.data[idx] = (m.data[idx] + mul_mod(a, other.data[k * other.cols + c], p)) % p;
                }
            }
        }
        Ok(m)
    }

    /// The entry-wise sum.
    pub fn plus(&self, other: &Self) -> Result<Self, Error> {
        if self.rows != other.rows || self.cols != other.cols {
            return Err(dimension_mismatch("add", self, other));
        }
        let data = self
            .data
            .iter()
            .zip(&other.data)
            .map(|(a, b)| (a + b) % self.prime)
            .collect();
        Ok(Self {
            data,
            ..self.clone()
        })
    }

    /// Multiplies row `i` by `scalars[i]`.
    pub fn scale_rows(&self, scalars: &[Zp]) -> Result<Self, Error> {
        if scalars.len() != self.rows {
            return Err(Error::InvalidParameters(format!(
                "{} scalars for {} rows",
                scalars.len(),
                self.rows
            )));
        }
        let mut m = self.clone();
        for (r, s) in scalars.iter().enumerate() {
            for c in 0..self.cols {
                let idx = r * self.cols + c;
                m.data[idx] = mul_mod(m.data[idx], s.value(), self.prime);
            }
        }
        Ok(m)
    }

    /// The sum of all rows, as a single row.
    pub fn sum_rows(&self) -> Vec<Zp> {
        (0..self.cols)
            .map(|c| {
                let sum = (0..self.rows)
                    .fold(0, |acc, r| (acc + self.data[r * self.cols + c]) % self.prime);
                Zp::new(self.prime, sum)
            })
            .collect()
    }

    /// Places `other` to the right of `self`.
    pub fn concat(&self, other: &Self) -> Result<Self, Error> {
        if self.rows != other.rows {
            return Err(dimension_mismatch("concatenate", self, other));
        }
        let cols = self.cols + other.cols;
        let mut data = Vec::with_capacity(self.rows * cols);
        for r in 0..self.rows {
            data.extend_from_slice(&self.data[r * self.cols..(r + 1) * self.cols]);
            data.extend_from_slice(&other.data[r * other.cols..(r + 1) * other.cols]);
        }
        Ok(Self {
            prime: self.prime,
            rows: self.rows,
            cols,
            data,
        })
    }

    /// Removes row `r`.
    pub fn remove_row(&self, r: usize) -> Self {
        let mut mask = vec![false; self.rows];
        mask[r] = true;
        self.keep(&mask, &vec![false; self.cols])
    }

    /// Removes column `c`.
    pub fn remove_column(&self, c: usize) -> Self {
        let mut mask = vec![false; self.cols];
        mask[c] = true;
        self.keep(&vec![false; self.rows], &mask)
    }

    /// Removes every row `i` with `mask[i]` set, together with as many trailing columns.
    ///
    /// Applied to a square Vandermonde-like matrix, the result stays square: it describes the
    /// interpolation problem over the remaining rows' points.
    pub fn remove_rows(&self, mask: &[bool]) -> Self {
        let removed = mask.iter().filter(|m| **m).count();
        let col_mask: Vec<bool> = (0..self.cols)
            .map(|c| c >= self.cols.saturating_sub(removed))
            .collect();
        let row_mask: Vec<bool> = (0..self.rows)
            .map(|r| mask.get(r).copied().unwrap_or(false))
            .collect();
        self.keep(&row_mask, &col_mask)
    }

    fn keep(&self, row_mask: &[bool], col_mask: &[bool]) -> Self {
        let rows: Vec<usize> = (0..self.rows).filter(|r| !row_mask[*r]).collect();
        let cols: Vec<usize> = (0..self.cols).filter(|c| !col_mask[*c]).collect();
        let mut data = Vec::with_capacity(rows.len() * cols.len());
        for r in &rows {
            for c in &cols {
                data.push(self.data[r * self.cols + c]);
            }
        }
        Self {
            prime: self.prime,
            rows: rows.len(),
            cols: cols.len(),
            data,
        }
    }

    /// Brings the matrix into reduced row echelon form in place and returns its rank.
    pub fn gauss(&mut self) -> usize {
        let p = self.prime;
        let mut rank = 0;
        for c in 0..self.cols {
            if rank == self.rows {
                break;
            }
            let Some(pivot) = (rank..self.rows).find(|r| self.data[r * self.cols + c] != 0) else {
                continue;
            };
            self.swap_rows(rank, pivot);
            let Ok(inv) = mod_inverse(self.data[rank * self.cols + c], p) else {
                continue;
            };
            for k in 0..self.cols {
                let idx = rank * self.cols + k;
                self.data[idx] = mul_mod(self.data[idx], inv, p);
            }
            for r in 0..self.rows {
                let factor = self.data[r * self.cols + c];
                if r == rank || factor == 0 {
                    continue;
                }
                for k in 0..self.cols {
                    let sub = mul_mod(factor, self.data[rank * self.cols + k], p);
                    let idx = r * self.cols + k;
                    self.data[idx] = sub_mod(self.data[idx], sub, p);
                }
            }
            rank += 1;
        }
        rank
    }

    fn swap_rows(&mut self, a: usize, b: usize) {
        if a == b {
            return;
        }
        for k in 0..self.cols {
            self.data.swap(a * self.cols + k, b * self.cols + k);
        }
    }

    // LU decomposition with row pivoting: the first nonzero entry in the column is chosen,
    // any nonzero pivot is exact in a field.
    fn lu(&self) -> Result<Lu, Error> {
        if self.rows != self.cols {
            return Err(Error::SingularMatrix);
        }
        let (n, p) = (self.rows, self.prime);
        let mut lu = self.clone();
        let mut perm: Vec<usize> = (0..n).collect();
        let mut odd = false;
        for k in 0..n {
            let pivot = (k..n)
                .find(|r| lu.data[r * n + k] != 0)
                .ok_or(Error::SingularMatrix)?;
            if pivot != k {
                lu.swap_rows(k, pivot);
                perm.swap(k, pivot);
                odd = !odd;
            }
            let inv = mod_inverse(lu.data[k * n + k], p)?;
            for r in k + 1..n {
                let factor = mul_mod(lu.data[r * n + k], inv, p);
                lu.data[r * n + k] = factor;
                for c in k + 1..n {
                    let sub = mul_mod(factor, lu.data[k * n + c], p);
                    lu.data[r * n + c] = sub_mod(lu.data[r * n + c], sub, p);
                }
            }
        }
        Ok(Lu { lu, perm, odd })
    }

    /// Solves `self · x = b` for a square, nonsingular matrix.
    pub fn solve(&self, b: &[Zp]) -> Result<Vec<Zp>, Error> {
        if b.len() != self.rows {
            return Err(Error::InvalidParameters(format!(
                "right-hand side of length {} for {} rows",
                b.len(),
                self.rows
            )));
        }
        let lu = self.lu()?;
        lu.solve(&b.iter().map(Zp::value).collect::<Vec<_>>())
            .map(|x| x.into_iter().map(|v| Zp::new(self.prime, v)).collect())
    }

    /// The inverse of a square, nonsingular matrix.
    pub fn inverse(&self) -> Result<Self, Error> {
        let lu = self.lu()?;
        let n = self.rows;
        let mut inv = Self::zeros(n, n, self.prime);
        for c in 0..n {
            let mut e = vec![0; n];
            e[c] = 1 % self.prime;
            let x = lu.solve(&e)?;
            for (r, v) in x.into_iter().enumerate() {
                inv.data[r * n + c] = v;
            }
        }
        Ok(inv)
    }

    /// The determinant of a square matrix (zero if singular).
    pub fn determinant(&self) -> Result<Zp, Error> {
        if self.rows != self.cols {
            return Err(Error::InvalidParameters("determinant of a non-square matrix".into()));
        }
        let lu = match self.lu() {
            Ok(lu) => lu,
            Err(Error::SingularMatrix) => return Ok(Zp::zero(self.prime)),
            Err(e) => return Err(e),
        };
        let n = self.rows;
        let mut det = Zp::one(self.prime);
        for k in 0..n {
            det *= Zp::new(self.prime, lu.lu.data[k * n + k]);
        }
        Ok(if lu.odd { -det } else { det })
    }
}

impl Lu {
    fn solve(&self, b: &[i64]) -> Result<Vec<i64>, Error> {
        let n = self.lu.rows;
        let p = self.lu.prime;
        let a = &self.lu.data;
        let mut y: Vec<i64> = self.perm.iter().map(|i| b[*i].rem_euclid(p)).collect();
        for r in 0..n {
            for c in 0..r {
                y[r] = sub_mod(y[r], mul_mod(a[r * n + c], y[c], p), p);
            }
        }
        for r in (0..n).rev() {
            for c in r + 1..n {
                y[r] = sub_mod(y[r], mul_mod(a[r * n + c], y[c], p), p);
            }
            y[r] = mul_mod(y[r], mod_inverse(a[r * n + r], p)?, p);
        }
        Ok(y)
    }
}

impl fmt::Display for FieldMatrix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for r in 0..self.rows {
            let row: Vec<String> = self.data[r * self.cols..(r + 1) * self.cols]
                .iter()
                .map(i64::to_string)
                .collect();
            writeln!(f, "[{}]", row.join(", "))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand_chacha::ChaCha20Rng;

    use super::*;

    const P: i64 = 61;

    #[test]
    fn vandermonde_inverse_is_identity() {
        for n in 1..8 {
            let v = FieldMatrix::vandermonde(n, n, P);
            let inv = v.inverse().unwrap();
            assert_eq!(v.times(&inv).unwrap(), FieldMatrix::identity(n, P));
            assert_eq!(inv.times(&v).unwrap(), FieldMatrix::identity(n, P));
        }
    }

    #[test]
    fn primitive_vandermonde_inverse_is_identity() {
        for p in [7, 61, 1009] {
            for n in 1..7 {
                let v = FieldMatrix::primitive_vandermonde(n, n, p).unwrap();
                let id = FieldMatrix::identity(n, p);
                assert_eq!(v.times(&v.inverse().unwrap()).unwrap(), id);
                let t = v.transpose();
                assert_eq!(t.times(&t.inverse().unwrap()).unwrap(), id);
            }
        }
    }

    #[test]
    fn random_nonsingular_inverses() {
        let mut rng = ChaCha20Rng::seed_from_u64(7);
        let mut checked = 0;
        while checked < 20 {
            let m = FieldMatrix::random(4, 4, P, &mut rng);
            match m.inverse() {
                Ok(inv) => {
                    assert_eq!(m.times(&inv).unwrap(), FieldMatrix::identity(4, P));
                    assert!(!m.determinant().unwrap().is_zero());
                    checked += 1;
                }
                Err(e) => {
                    assert_eq!(e, Error::SingularMatrix);
                    assert!(m.determinant().unwrap().is_zero());
                }
            }
        }
    }

    #[test]
    fn needs_pivoting() {
        let m = FieldMatrix::from_rows(P, &[vec![0, 1], vec![1, 0]]).unwrap();
        assert_eq!(m.inverse().unwrap(), m);
        assert_eq!(m.determinant().unwrap().value(), P - 1);
    }

    #[test]
    fn singular_matrix_fails() {
        let m = FieldMatrix::from_rows(P, &[vec![1, 2], vec![2, 4]]).unwrap();
        assert_eq!(m.inverse(), Err(Error::SingularMatrix));
        assert_eq!(
            m.solve(&[Zp::new(P, 1), Zp::new(P, 1)]),
            Err(Error::SingularMatrix)
        );
        let rect = FieldMatrix::zeros(2, 3, P);
        assert_eq!(rect.inverse(), Err(Error::SingularMatrix));
    }

    #[test]
    fn solve_linear_system() {
        // x + 2y = 5, 3x + 4y = 6
        let m = FieldMatrix::from_rows(P, &[vec![1, 2], vec![3, 4]]).unwrap();
        let b = [Zp::new(P, 5), Zp::new(P, 6)];
        let x = m.solve(&b).unwrap();
        let check = m
            .times(&FieldMatrix::from_row(P, &x).transpose())
            .unwrap()
            .column(0);
        assert_eq!(check, b.to_vec());
    }

    #[test]
    fn lagrange_coefficients_reconstruct_constant_term() {
        let xs: Vec<Zp> = (1..=3).map(|x| Zp::new(P, x)).collect();
        let lambda = FieldMatrix::lagrange_at_zero(P, &xs).unwrap();
        // f(x) = 9 + 4x + 2x^2
        let ys: Vec<Zp> = xs
            .iter()
            .map(|x| Zp::new(P, 9) + Zp::new(P, 4) * *x + Zp::new(P, 2) * *x * *x)
            .collect();
        let secret = lambda
            .iter()
            .zip(&ys)
            .fold(Zp::zero(P), |acc, (l, y)| acc + *l * *y);
        assert_eq!(secret.value(), 9);
    }

    #[test]
    fn gauss_reports_rank() {
        let mut m =
            FieldMatrix::from_rows(P, &[vec![1, 2, 3], vec![2, 4, 6], vec![0, 1, 1]]).unwrap();
        assert_eq!(m.gauss(), 2);
        assert_eq!(m.row(2), vec![Zp::zero(P); 3]);
        let mut id = FieldMatrix::identity(4, P);
        assert_eq!(id.gauss(), 4);
    }

    #[test]
    fn remove_rows_keeps_square_shape() {
        let v = FieldMatrix::primitive_vandermonde(5, 5, P).unwrap().transpose();
        let reduced = v.remove_rows(&[false, true, false, true, false]);
        assert_eq!((reduced.rows(), reduced.cols()), (3, 3));
        assert_eq!(reduced.row(1), v.row(2)[..3].to_vec());
        assert!(reduced.inverse().is_ok());
    }

    #[test]
    fn row_and_column_surgery() {
        let m = FieldMatrix::from_rows(P, &[vec![1, 2, 3], vec![4, 5, 6]]).unwrap();
        assert_eq!(m.remove_row(0).row(0), m.row(1));
        assert_eq!(m.remove_column(1).column(1), m.column(2));
        let c = m.concat(&FieldMatrix::identity(2, P)).unwrap();
        assert_eq!((c.rows(), c.cols()), (2, 5));
        assert_eq!(c.get(1, 4).value(), 1);
        let scaled = m.scale_rows(&[Zp::new(P, 2), Zp::new(P, 0)]).unwrap();
        assert_eq!(scaled.sum_rows(), vec![Zp::new(P, 2), Zp::new(P, 4), Zp::new(P, 6)]);
        assert_eq!(m.plus(&m).unwrap().get(1, 2).value(), 12);
        assert!(m.times(&m).is_err());
    }
}
