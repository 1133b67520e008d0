use bgw_mpc::{
    decoder::decode,
    field::Zp,
    matrix::FieldMatrix,
    sharing::{self, EvalPoints, evaluation_points},
};
use criterion::{BenchmarkId, Criterion};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;

const PRIME: i64 = 1_000_003;

pub fn primitives_benchmark(c: &mut Criterion) {
    let mut g = c.benchmark_group("primitives");
    let mut rng = ChaCha20Rng::seed_from_u64(42);

    for n in [9, 33, 65] {
        let t = (n - 1) / 4;
        let xs = evaluation_points(PRIME, n, EvalPoints::Primitive).expect("valid points");
        let secret = Zp::new(PRIME, rng.random_range(0..PRIME));
        let mut shares =
            sharing::share(&mut rng, secret, n, t, EvalPoints::Primitive).expect("valid degree");
        for share in shares.iter_mut().take(t) {
            *share += Zp::one(PRIME);
        }

        g.bench_with_input(BenchmarkId::new("decode", n), &shares, |b, shares| {
            b.iter(|| decode(PRIME, &xs, shares, t, t).expect("decodable"))
        });
        g.bench_with_input(BenchmarkId::new("vandermonde inverse", n), &xs, |b, xs| {
            b.iter(|| {
                FieldMatrix::shamir_recombination(PRIME, xs)
                    .inverse()
                    .expect("invertible")
            })
        });
        g.bench_function(BenchmarkId::new("bivariate sharing", n), |b| {
            b.iter(|| sharing::share_byzantine(&mut rng, secret, n, t).expect("valid degree"))
        });
    }
}
