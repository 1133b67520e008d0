use bgw_mpc::{
    circuit::{Circuit, CircuitBuilder},
    config::SessionConfig,
    field::{self, Zp},
    protocol::{
        Error, Hooks, Multiplication, ProtocolPolicy, simulate_mpc, simulate_mpc_with_policies,
    },
    sharing::{self, SecretPolynomials},
};
use rand_chacha::ChaCha20Rng;
use tracing::subscriber::DefaultGuard;
use tracing_subscriber::{EnvFilter, util::SubscriberInitExt};

const P: i64 = 61;

fn zp(value: i64) -> Zp {
    Zp::new(P, value)
}

fn trace() -> DefaultGuard {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .set_default()
}

/// `(x + y) * z`
fn circuit() -> Circuit {
    let mut b = CircuitBuilder::new(P, ["x", "y", "z"]);
    let x = b.input(0).unwrap();
    let y = b.input(1).unwrap();
    let z = b.input(2).unwrap();
    let sum = b.add(x, y).unwrap();
    let product = b.mul(sum, z).unwrap();
    b.output(product).unwrap();
    b.build().unwrap()
}

/// Deals valid polynomials to parties 0 and 1, but shifted ones to everybody else.
fn inconsistent_deal(
    rng: &mut ChaCha20Rng,
    secret: Zp,
    n: usize,
    t: usize,
) -> Result<Vec<SecretPolynomials>, field::Error> {
    let mut polys = sharing::share_byzantine(rng, secret, n, t)?;
    for p in polys.iter_mut().skip(2) {
        p.f[0] += Zp::one(secret.prime());
    }
    Ok(polys)
}

fn withhold(_: &[SecretPolynomials], complainers: &[bool]) -> Vec<Option<SecretPolynomials>> {
    vec![None; complainers.len()]
}

fn skewed_product(_: usize, product: Zp) -> Zp {
    product + Zp::one(product.prime())
}

fn cheating_dealer() -> ProtocolPolicy {
    ProtocolPolicy {
        hooks: Hooks {
            deal: inconsistent_deal,
            disclose: withhold,
            ..Hooks::default()
        },
        ..ProtocolPolicy::byzantine()
    }
}

fn cheating_multiplier(multiplication: Multiplication) -> ProtocolPolicy {
    ProtocolPolicy {
        multiplication,
        hooks: Hooks {
            product: skewed_product,
            ..Hooks::default()
        },
        ..ProtocolPolicy::byzantine()
    }
}

fn inputs(n: usize, x: i64, y: i64, z: i64) -> Vec<Option<Zp>> {
    let mut inputs = vec![Some(zp(x)), Some(zp(y)), Some(zp(z))];
    inputs.resize(n, None);
    inputs
}

#[test]
fn honest_parties_compute_the_result() -> Result<(), Error> {
    let _g = trace();
    for multiplication in [Multiplication::ErrorCorrecting, Multiplication::VerifiedGrr] {
        let config = SessionConfig::byzantine()
            .with_multiplication(multiplication)
            .with_seed(11);
        let p_out = [vec![0, 1, 2, 3, 4]];
        let results = simulate_mpc(&circuit(), &inputs(5, 3, 5, 4), &p_out, &config)?;
        for result in results {
            assert_eq!(result?, vec![Some(zp(32))]);
        }
    }
    Ok(())
}

#[test]
fn division_with_error_correction() -> Result<(), Error> {
    let _g = trace();
    let mut b = CircuitBuilder::new(P, ["x", "y"]);
    let x = b.input(0)?;
    let y = b.input(1)?;
    let quotient = b.div(x, y)?;
    b.output(quotient)?;
    let circuit = b.build()?;

    let config = SessionConfig::byzantine().with_seed(5);
    let inputs = [Some(zp(12)), Some(zp(4)), None, None, None];
    let results = simulate_mpc(&circuit, &inputs, &[vec![2]], &config)?;
    assert_eq!(results[2].as_ref().ok(), Some(&vec![Some(zp(3))]));
    assert_eq!(results[0].as_ref().ok(), Some(&vec![None]));
    Ok(())
}

#[test]
fn inconsistent_dealer_is_excluded_and_its_input_zeroed() -> Result<(), Error> {
    let _g = trace();
    let n = 7;
    let config = SessionConfig::byzantine().with_seed(23);
    let mut policies = vec![ProtocolPolicy::byzantine(); n];
    policies[1] = cheating_dealer();
    let p_out = [(0..n).collect::<Vec<_>>()];
    let results =
        simulate_mpc_with_policies(&circuit(), &inputs(n, 3, 5, 4), &p_out, &config, &policies)?;

    // the cheater's input counts as 0
    let expected = circuit().evaluate(&[zp(3), zp(0), zp(4)])?;
    for (p, result) in results.into_iter().enumerate() {
        if p != 1 {
            assert_eq!(result?, vec![Some(expected[0])]);
        }
    }
    Ok(())
}

#[test]
fn wrong_product_is_detected() -> Result<(), Error> {
    let _g = trace();
    let n = 7;
    for multiplication in [Multiplication::ErrorCorrecting, Multiplication::VerifiedGrr] {
        let config = SessionConfig::byzantine()
            .with_multiplication(multiplication)
            .with_seed(99);
        let mut policies = vec![ProtocolPolicy::from_config(&config); n];
        policies[4] = cheating_multiplier(multiplication);
        let p_out = [vec![0, 6]];
        let results = simulate_mpc_with_policies(
            &circuit(),
            &inputs(n, 3, 5, 4),
            &p_out,
            &config,
            &policies,
        )?;
        assert_eq!(results[0].as_ref().ok(), Some(&vec![Some(zp(32))]));
        assert_eq!(results[6].as_ref().ok(), Some(&vec![Some(zp(32))]));
    }
    Ok(())
}

#[test]
fn too_many_cheaters_abort() -> Result<(), Error> {
    let _g = trace();
    let n = 5;
    let config = SessionConfig::byzantine().with_seed(1);
    let mut policies = vec![ProtocolPolicy::byzantine(); n];
    policies[0] = cheating_dealer();
    policies[1] = cheating_dealer();
    let inputs = inputs(n, 3, 5, 4);
    let results = simulate_mpc_with_policies(&circuit(), &inputs, &[vec![4]], &config, &policies)?;
    for result in &results[2..] {
        assert!(matches!(
            result,
            Err(Error::TooManyCheaters {
                excluded: 2,
                tolerated: 1
            })
        ));
    }
    Ok(())
}

#[test]
fn degree_must_leave_room_for_cheaters() -> Result<(), Error> {
    let config = SessionConfig::byzantine().with_degree(1);
    let results = simulate_mpc(&circuit(), &inputs(4, 1, 2, 3), &[vec![0]], &config)?;
    for result in results {
        assert!(matches!(
            result,
            Err(Error::InvalidDegree {
                degree: 1,
                parties: 4
            })
        ));
    }
    Ok(())
}
