//! The BGW protocol: secure evaluation of an arithmetic circuit over Shamir shares.
//!
//! Every party runs [`mpc`] with its own input (if it owns one) and its own endpoint of a
//! [`Channel`]. Parties with index `i < circuit.input_count()` contribute input `i`. The session
//! proceeds in three phases:
//!
//! 1. Input sharing: every input owner deals shares of its input to all parties.
//! 2. Evaluation: gates are processed in order. Additions, subtractions and operations with a
//!    constant are local, multiplications and divisions of two shares are followed by an
//!    interactive degree reduction.
//! 3. Output: the output sharings are re-randomized and their shares are sent to the parties
//!    that are allowed to learn the respective output, which reconstruct the value.
//!
//! What happens in each phase depends on the session's [`ProtocolPolicy`]. With the
//! semi-honest policy, parties are assumed to follow the protocol, any missing message aborts
//! the session. With a Byzantine policy (which needs `n > 4t`), inputs are shared verifiably,
//! products are re-shared verifiably, cheaters are excluded, and outputs are error-corrected.
use futures::future::join_all;
use rand::{SeedableRng, random};
use rand_chacha::ChaCha20Rng;
use thiserror::Error;
use tokio::{runtime::Runtime, task};
use tracing::{Level, debug, instrument, warn};

use crate::{
    channel::{self, Channel, SimpleChannel, scatter},
    circuit::{self, Circuit, InverseCircuits, Op, WireId, WireKind},
    config::SessionConfig,
    field::{self, Zp},
    matrix::FieldMatrix,
    sharing::{self, EvalPoints},
};

mod byzantine;
pub mod policy;

pub use policy::{Hooks, InputVerification, Multiplication, ProtocolPolicy};

/// Errors that can abort a protocol session.
#[derive(Debug, Error)]
pub enum Error {
    /// A message could not be sent or received.
    #[error("channel error: {0}")]
    Channel(#[from] channel::Error),
    /// A field or matrix operation failed.
    #[error(transparent)]
    Field(#[from] field::Error),
    /// The circuit is malformed.
    #[error("invalid circuit: {0}")]
    Circuit(#[from] circuit::Error),
    /// The party index is out of range.
    #[error("party {0} does not exist")]
    PartyDoesNotExist(usize),
    /// The circuit has more inputs than there are parties.
    #[error("the circuit has {inputs} inputs, but there are only {parties} parties")]
    TooManyInputs {
        /// Inputs of the circuit.
        inputs: usize,
        /// Parties of the session.
        parties: usize,
    },
    /// The party owns an input, but did not provide it.
    #[error("party {0} must provide an input")]
    MissingInput(usize),
    /// The party provided an input it does not own, or one from a different field.
    #[error("party {0} provided an unexpected input")]
    UnexpectedInput(usize),
    /// The output parties do not match the circuit outputs.
    #[error("invalid output parties: {0}")]
    InvalidOutputParties(String),
    /// The sharing degree cannot be used with this many parties.
    #[error("degree {degree} cannot be used with {parties} parties")]
    InvalidDegree {
        /// The requested degree.
        degree: usize,
        /// Parties of the session.
        parties: usize,
    },
    /// The protocol capabilities do not fit together.
    #[error("invalid protocol policy: {0}")]
    InvalidPolicy(String),
    /// A share needed by the semi-honest protocol did not arrive.
    #[error("missing share of party {party} during {phase}")]
    MissingShare {
        /// The party that did not deliver.
        party: usize,
        /// The protocol phase.
        phase: String,
    },
    /// More parties misbehaved than the sharing degree tolerates.
    #[error("{excluded} parties cheated, but only {tolerated} can be tolerated")]
    TooManyCheaters {
        /// Parties excluded so far.
        excluded: usize,
        /// The sharing degree.
        tolerated: usize,
    },
    /// The tokio runtime of a simulation could not be started.
    #[error("could not start the tokio runtime: {0}")]
    Runtime(#[from] std::io::Error),
    /// A party of a simulation panicked or was cancelled.
    #[error("party task failed: {0}")]
    TaskFailed(String),
}

/// Executes the BGW protocol for a single party, configured by `config`.
///
/// * `input` is the party's input if `p_own < circuit.input_count()`, `None` otherwise.
/// * `p_out[k]` lists the parties that learn output `k`.
///
/// Returns one entry per circuit output: `Some(value)` for the outputs the party is allowed
/// to learn, `None` for all others.
pub async fn mpc(
    channel: &impl Channel,
    circuit: &Circuit,
    input: Option<Zp>,
    p_own: usize,
    p_max: usize,
    p_out: &[Vec<usize>],
    config: &SessionConfig,
) -> Result<Vec<Option<Zp>>, Error> {
    let policy = ProtocolPolicy::from_config(config);
    mpc_with_policy(channel, circuit, input, p_own, p_max, p_out, &policy, config).await
}

/// Executes the protocol for a single party with an explicit [`ProtocolPolicy`].
#[allow(clippy::too_many_arguments)]
#[instrument(level = Level::DEBUG, skip_all, fields(party = p_own), err)]
pub async fn mpc_with_policy(
    channel: &impl Channel,
    circuit: &Circuit,
    input: Option<Zp>,
    p_own: usize,
    p_max: usize,
    p_out: &[Vec<usize>],
    policy: &ProtocolPolicy,
    config: &SessionConfig,
) -> Result<Vec<Option<Zp>>, Error> {
    if p_own >= p_max {
        return Err(Error::PartyDoesNotExist(p_own));
    }
    let degree = sharing_degree(circuit, p_max, policy, config)?;
    let ctx = Context {
        channel,
        circ: circuit,
        p_own,
        p_max,
        p_out,
        prime: circuit.prime(),
        degree,
        policy,
        config,
    };
    validate(&ctx, input)?;
    let rng = match config.seed {
        Some(seed) => ChaCha20Rng::seed_from_u64(seed.wrapping_add(p_own as u64)),
        None => ChaCha20Rng::from_seed(random()),
    };
    let mut state = State::new(p_max, rng);
    _mpc(&ctx, &mut state, input).await
}

pub(crate) struct Context<'a, C: Channel> {
    pub(crate) channel: &'a C,
    pub(crate) circ: &'a Circuit,
    pub(crate) p_own: usize,
    pub(crate) p_max: usize,
    pub(crate) p_out: &'a [Vec<usize>],
    pub(crate) prime: i64,
    pub(crate) degree: usize,
    pub(crate) policy: &'a ProtocolPolicy,
    pub(crate) config: &'a SessionConfig,
}

impl<C: Channel> Context<'_, C> {
    pub(crate) fn points(&self) -> Result<Vec<Zp>, Error> {
        Ok(sharing::evaluation_points(
            self.prime,
            self.p_max,
            self.policy.points(),
        )?)
    }

    fn learns(&self, output: usize) -> bool {
        self.p_out
            .get(output)
            .is_some_and(|parties| parties.contains(&self.p_own))
    }
}

/// The mutable part of a session.
pub(crate) struct State {
    /// Parties that have not been excluded.
    pub(crate) good: Vec<bool>,
    pub(crate) rng: ChaCha20Rng,
    inverse_circuits: InverseCircuits,
    recombination: Option<Vec<Zp>>,
}

impl State {
    fn new(p_max: usize, rng: ChaCha20Rng) -> Self {
        Self {
            good: vec![true; p_max],
            rng,
            inverse_circuits: InverseCircuits::new(),
            recombination: None,
        }
    }

    pub(crate) fn excluded(&self) -> usize {
        self.good.iter().filter(|g| !**g).count()
    }

    /// How many of the remaining parties can still be cheaters.
    pub(crate) fn remaining_faults(&self, degree: usize) -> usize {
        degree.saturating_sub(self.excluded())
    }

    pub(crate) fn good_parties(&self) -> Vec<usize> {
        (0..self.good.len()).filter(|p| self.good[*p]).collect()
    }

    pub(crate) fn too_many_cheaters(&self, degree: usize) -> Error {
        Error::TooManyCheaters {
            excluded: self.excluded(),
            tolerated: degree,
        }
    }

    /// Excludes a cheater for the rest of the session and disconnects from it.
    pub(crate) async fn exclude(
        &mut self,
        ctx: &Context<'_, impl Channel>,
        party: usize,
        reason: &str,
    ) -> Result<(), Error> {
        if self.good.get(party).copied().unwrap_or(false) {
            warn!("excluding party {party}: {reason}");
            self.good[party] = false;
            if party != ctx.p_own {
                ctx.channel.disconnect(party).await;
            }
        }
        if self.excluded() > ctx.degree {
            return Err(self.too_many_cheaters(ctx.degree));
        }
        Ok(())
    }
}

fn sharing_degree(
    circuit: &Circuit,
    p_max: usize,
    policy: &ProtocolPolicy,
    config: &SessionConfig,
) -> Result<usize, Error> {
    let multiplies = circuit.has_multiplication();
    let default = if policy.is_byzantine() {
        (p_max - 1) / 4
    } else if multiplies {
        (p_max - 1) / 2
    } else {
        p_max - 1
    };
    let degree = config.degree.unwrap_or(default);
    let valid = if policy.is_byzantine() {
        p_max > 4 * degree
    } else if multiplies {
        p_max > 2 * degree
    } else {
        p_max > degree
    };
    if valid {
        Ok(degree)
    } else {
        Err(Error::InvalidDegree {
            degree,
            parties: p_max,
        })
    }
}

fn validate(ctx: &Context<impl Channel>, input: Option<Zp>) -> Result<(), Error> {
    let &Context {
        circ,
        p_own,
        p_max,
        p_out,
        prime,
        policy,
        ..
    } = ctx;
    policy.validate().map_err(Error::InvalidPolicy)?;
    circ.validate()?;
    if circ.input_count() > p_max {
        return Err(Error::TooManyInputs {
            inputs: circ.input_count(),
            parties: p_max,
        });
    }
    match input {
        None if p_own < circ.input_count() => return Err(Error::MissingInput(p_own)),
        Some(_) if p_own >= circ.input_count() => return Err(Error::UnexpectedInput(p_own)),
        Some(x) if !x.is_element_of(prime) => return Err(Error::UnexpectedInput(p_own)),
        _ => {}
    }
    if p_out.len() != circ.outputs().len() {
        return Err(Error::InvalidOutputParties(format!(
            "{} outputs, but output parties for {}",
            circ.outputs().len(),
            p_out.len()
        )));
    }
    if let Some(p) = p_out.iter().flatten().find(|p| **p >= p_max) {
        return Err(Error::InvalidOutputParties(format!("party {p} does not exist")));
    }
    ctx.points()?;
    Ok(())
}

async fn _mpc(
    ctx: &Context<'_, impl Channel>,
    state: &mut State,
    input: Option<Zp>,
) -> Result<Vec<Option<Zp>>, Error> {
    let byzantine = ctx.policy.is_byzantine();
    debug!(
        degree = ctx.degree,
        byzantine,
        "sharing {} inputs",
        ctx.circ.input_count()
    );
    let input_shares = if byzantine {
        byzantine::share_inputs(ctx, state, input).await?
    } else {
        share_inputs(ctx, state, input).await?
    };

    debug!("evaluating {} gates", ctx.circ.gates().len());
    let output_shares = evaluate(ctx, state, &input_shares).await?;

    debug!("revealing {} outputs", output_shares.len());
    if byzantine {
        byzantine::output(ctx, state, &output_shares).await
    } else {
        output(ctx, state, &output_shares).await
    }
}

fn missing_share(party: usize, phase: &str) -> Error {
    Error::MissingShare {
        party,
        phase: phase.to_string(),
    }
}

/// Discards shares from a different field.
pub(crate) fn in_field(share: Option<Zp>, prime: i64) -> Option<Zp> {
    share.filter(|s| s.is_element_of(prime))
}

async fn share_inputs(
    ctx: &Context<'_, impl Channel>,
    state: &mut State,
    input: Option<Zp>,
) -> Result<Vec<Zp>, Error> {
    let &Context {
        channel,
        circ,
        p_own,
        p_max,
        prime,
        degree,
        ..
    } = ctx;
    let phase = "input sharing";
    let msgs: Vec<Option<Zp>> = match input {
        Some(x) => sharing::share(&mut state.rng, x, p_max, degree, EvalPoints::Sequential)?
            .into_iter()
            .map(Some)
            .collect(),
        None => vec![None; p_max],
    };
    let owners: Vec<bool> = (0..p_max).map(|p| p < circ.input_count()).collect();
    let received = scatter(channel, p_own, phase, &msgs, &owners).await;
    (0..circ.input_count())
        .map(|p| in_field(received[p], prime).ok_or_else(|| missing_share(p, phase)))
        .collect()
}

fn operand(
    circ: &Circuit,
    values: &[Option<Zp>],
    inputs: &[Zp],
    wire: WireId,
    gate: usize,
) -> Result<Zp, circuit::Error> {
    match circ.wire(wire).map(|w| w.kind()) {
        Some(WireKind::Input(i)) => inputs.get(i).copied().ok_or(circuit::Error::UnknownInput(i)),
        Some(WireKind::Constant(c)) => Ok(c),
        Some(WireKind::Internal(_)) => values[wire.0].ok_or(circuit::Error::ForwardReference {
            gate,
            wire: wire.0,
        }),
        None => Err(circuit::Error::UnknownWire(wire.0)),
    }
}

fn is_constant(circ: &Circuit, wire: WireId) -> bool {
    circ.wire(wire).is_some_and(|w| w.is_constant())
}

/// Evaluates the circuit on shares and returns the shares of the outputs.
async fn evaluate(
    ctx: &Context<'_, impl Channel>,
    state: &mut State,
    inputs: &[Zp],
) -> Result<Vec<Zp>, Error> {
    let circ = ctx.circ;
    let mut values: Vec<Option<Zp>> = vec![None; circ.wires().len()];
    for (g, gate) in circ.gates().iter().enumerate() {
        let operands = gate
            .inputs()
            .iter()
            .map(|w| operand(circ, &values, inputs, *w, g))
            .collect::<Result<Vec<_>, _>>()?;
        let phase = format!("gate {g}");
        let value = match (gate.op(), operands.as_slice()) {
            (Op::Add, [first, rest @ ..]) => rest.iter().fold(*first, |acc, v| acc + *v),
            (Op::Sub, [first, rest @ ..]) => rest.iter().fold(*first, |acc, v| acc - *v),
            (Op::Mul, [a, b]) if gate.needs_degree_reduction(circ) => {
                multiply(ctx, state, &phase, *a, *b).await?
            }
            (Op::Mul, [a, b]) => *a * *b,
            (Op::Div, [a, b]) if is_constant(circ, gate.inputs()[1]) => *a * b.inverse()?,
            (Op::Div, [a, b]) => {
                let inverse = invert(ctx, state, &phase, *b).await?;
                if is_constant(circ, gate.inputs()[0]) {
                    *a * inverse
                } else {
                    multiply(ctx, state, &phase, *a, inverse).await?
                }
            }
            (op, operands) => {
                return Err(circuit::Error::InvalidArity {
                    op,
                    operands: operands.len(),
                }
                .into());
            }
        };
        values[gate.output().0] = Some(value);
    }
    circ.outputs()
        .iter()
        .map(|w| operand(circ, &values, inputs, *w, circ.gates().len()).map_err(Error::from))
        .collect()
}

/// Computes a sharing of `1 / x` (or of `0` for `x = 0`) by running the inverse circuit.
async fn invert(
    ctx: &Context<'_, impl Channel>,
    state: &mut State,
    phase: &str,
    divisor: Zp,
) -> Result<Zp, Error> {
    let inverse = state.inverse_circuits.get_or_build(ctx.prime)?;
    let inputs = [divisor];
    let mut values: Vec<Option<Zp>> = vec![None; inverse.wires().len()];
    for (g, gate) in inverse.gates().iter().enumerate() {
        let operands = gate
            .inputs()
            .iter()
            .map(|w| operand(&inverse, &values, &inputs, *w, g))
            .collect::<Result<Vec<_>, _>>()?;
        let value = match (gate.op(), operands.as_slice()) {
            (Op::Mul, [a, b]) => {
                let phase = format!("{phase} inverse gate {g}");
                multiply(ctx, state, &phase, *a, *b).await?
            }
            (Op::Add, [a]) => *a,
            (op, operands) => {
                return Err(circuit::Error::InvalidArity {
                    op,
                    operands: operands.len(),
                }
                .into());
            }
        };
        values[gate.output().0] = Some(value);
    }
    let Some(output) = inverse.outputs().first() else {
        return Err(circuit::Error::NoOutputs.into());
    };
    Ok(operand(&inverse, &values, &inputs, *output, inverse.gates().len())?)
}

/// Multiplies two shares and brings the product back to the sharing degree.
async fn multiply(
    ctx: &Context<'_, impl Channel>,
    state: &mut State,
    phase: &str,
    a: Zp,
    b: Zp,
) -> Result<Zp, Error> {
    debug!("{phase}: degree reduction");
    let product = (ctx.policy.hooks.product)(ctx.p_own, a * b);
    match ctx.policy.multiplication {
        Multiplication::Grr => grr(ctx, state, phase, product).await,
        Multiplication::VerifiedGrr => {
            byzantine::verified_grr(ctx, state, phase, a, b, product).await
        }
        Multiplication::ErrorCorrecting => {
            byzantine::error_correcting_reduction(ctx, state, phase, product).await
        }
    }
}

/// Re-shares the product at degree `t` and recombines the received shares.
async fn grr(
    ctx: &Context<'_, impl Channel>,
    state: &mut State,
    phase: &str,
    product: Zp,
) -> Result<Zp, Error> {
    let &Context {
        channel,
        p_own,
        p_max,
        prime,
        degree,
        ..
    } = ctx;
    let msgs: Vec<Option<Zp>> =
        sharing::share(&mut state.rng, product, p_max, degree, EvalPoints::Sequential)?
            .into_iter()
            .map(Some)
            .collect();
    let received = scatter(channel, p_own, phase, &msgs, &state.good).await;
    let lambda = match &state.recombination {
        Some(lambda) => lambda.clone(),
        None => {
            // first row of the inverse of the transposed Vandermonde matrix
            let lambda = FieldMatrix::vandermonde(p_max, p_max, prime)
                .transpose()
                .inverse()?
                .row(0);
            state.recombination = Some(lambda.clone());
            lambda
        }
    };
    let mut result = Zp::zero(prime);
    for (p, (share, l)) in received.into_iter().zip(lambda).enumerate() {
        let share = in_field(share, prime).ok_or_else(|| missing_share(p, phase))?;
        result += share * l;
    }
    Ok(result)
}

/// Re-randomizes the output sharings and reveals them to the output parties.
async fn output(
    ctx: &Context<'_, impl Channel>,
    state: &mut State,
    outputs: &[Zp],
) -> Result<Vec<Option<Zp>>, Error> {
    let &Context {
        channel,
        p_own,
        p_max,
        p_out,
        prime,
        degree,
        ..
    } = ctx;

    let phase = "output randomization";
    let zero_sharings = outputs
        .iter()
        .map(|_| {
            let points = EvalPoints::Sequential;
            sharing::randomized_shares(&mut state.rng, p_max, degree, prime, points)
        })
        .collect::<Result<Vec<_>, _>>()?;
    let msgs: Vec<Option<Vec<Zp>>> = (0..p_max)
        .map(|p| Some(zero_sharings.iter().map(|zeros| zeros[p]).collect()))
        .collect();
    let received = scatter(channel, p_own, phase, &msgs, &state.good).await;
    let mut zeros: Vec<Vec<Zp>> = vec![Vec::with_capacity(p_max); outputs.len()];
    for (p, shares) in received.into_iter().enumerate() {
        let shares = shares
            .filter(|s| s.len() == outputs.len() && s.iter().all(|z| z.is_element_of(prime)))
            .ok_or_else(|| missing_share(p, phase))?;
        for (o, z) in shares.into_iter().enumerate() {
            zeros[o].push(z);
        }
    }
    let randomized: Vec<Zp> = outputs
        .iter()
        .zip(&zeros)
        .map(|(share, zeros)| sharing::add_randomization(*share, zeros))
        .collect();

    let phase = "output shares";
    let msgs: Vec<Option<Vec<Option<Zp>>>> = (0..p_max)
        .map(|p| {
            let visible: Vec<Option<Zp>> = randomized
                .iter()
                .enumerate()
                .map(|(o, share)| p_out[o].contains(&p).then_some(*share))
                .collect();
            visible.iter().any(Option::is_some).then_some(visible)
        })
        .collect();
    let learns_any = (0..outputs.len()).any(|o| ctx.learns(o));
    let expect = vec![learns_any; p_max];
    let received = scatter(channel, p_own, phase, &msgs, &expect).await;

    let mut results = vec![None; outputs.len()];
    for (o, result) in results.iter_mut().enumerate() {
        if !ctx.learns(o) {
            continue;
        }
        let shares: Vec<Option<Zp>> = received
            .iter()
            .map(|msg| {
                let share = msg.as_ref().and_then(|m| m.get(o).copied().flatten());
                in_field(share, prime)
            })
            .collect();
        if let Some(p) = shares.iter().position(Option::is_none) {
            return Err(missing_share(p, phase));
        }
        *result = Some(sharing::recombine(&shares, degree, prime, EvalPoints::Sequential)?);
    }
    Ok(results)
}

/// Simulates the protocol with one honest party per entry of `inputs`, configured by `config`.
///
/// Returns the result of every party, in party order.
pub fn simulate_mpc(
    circuit: &Circuit,
    inputs: &[Option<Zp>],
    p_out: &[Vec<usize>],
    config: &SessionConfig,
) -> Result<Vec<Result<Vec<Option<Zp>>, Error>>, Error> {
    let policies = vec![ProtocolPolicy::from_config(config); inputs.len()];
    simulate_mpc_with_policies(circuit, inputs, p_out, config, &policies)
}

/// Simulates the protocol over in-memory channels, party `i` following `policies[i]`.
pub fn simulate_mpc_with_policies(
    circuit: &Circuit,
    inputs: &[Option<Zp>],
    p_out: &[Vec<usize>],
    config: &SessionConfig,
    policies: &[ProtocolPolicy],
) -> Result<Vec<Result<Vec<Option<Zp>>, Error>>, Error> {
    let p_max = inputs.len();
    if policies.len() != p_max {
        return Err(Error::InvalidPolicy(format!(
            "{} policies for {p_max} parties",
            policies.len()
        )));
    }
    let tokio = Runtime::new()?;
    tokio.block_on(async {
        let channels = SimpleChannel::channels(p_max);
        let mut parties = vec![];
        for (p_own, (channel, (input, policy))) in channels
            .into_iter()
            .zip(inputs.iter().zip(policies))
            .enumerate()
        {
            let circuit = circuit.clone();
            let p_out = p_out.to_vec();
            let config = config.clone();
            let policy = *policy;
            let input = *input;
            parties.push(task::spawn(async move {
                mpc_with_policy(
                    &channel, &circuit, input, p_own, p_max, &p_out, &policy, &config,
                )
                .await
            }));
        }
        join_all(parties)
            .await
            .into_iter()
            .map(|result| result.map_err(|e| Error::TaskFailed(e.to_string())))
            .collect()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{circuit::CircuitBuilder, polynomial::Polynomial};

    const P: i64 = 61;

    fn zp(value: i64) -> Zp {
        Zp::new(P, value)
    }

    fn product_circuit() -> Circuit {
        let mut b = CircuitBuilder::new(P, ["x", "y"]);
        let x = b.input(0).unwrap();
        let y = b.input(1).unwrap();
        let xy = b.mul(x, y).unwrap();
        b.output(xy).unwrap();
        b.build().unwrap()
    }

    #[test]
    fn default_degrees() {
        let circuit = product_circuit();
        let semi_honest = ProtocolPolicy::semi_honest();
        let byzantine = ProtocolPolicy::byzantine();
        let config = SessionConfig::default();
        assert_eq!(sharing_degree(&circuit, 5, &semi_honest, &config).unwrap(), 2);
        assert_eq!(sharing_degree(&circuit, 9, &byzantine, &config).unwrap(), 2);
        assert!(matches!(
            sharing_degree(&circuit, 5, &semi_honest, &config.clone().with_degree(3)),
            Err(Error::InvalidDegree { degree: 3, parties: 5 })
        ));

        let mut b = CircuitBuilder::new(P, ["x", "y"]);
        let x = b.input(0).unwrap();
        let y = b.input(1).unwrap();
        let sum = b.add(x, y).unwrap();
        b.output(sum).unwrap();
        let linear = b.build().unwrap();
        assert_eq!(sharing_degree(&linear, 5, &semi_honest, &config).unwrap(), 4);
    }

    #[test]
    fn rejects_invalid_sessions() {
        let circuit = product_circuit();
        let config = SessionConfig::default();
        let results = simulate_mpc(&circuit, &[Some(zp(1)), None, None], &[vec![0]], &config)
            .unwrap();
        assert!(matches!(results[1], Err(Error::MissingInput(1))));

        let results = simulate_mpc(
            &circuit,
            &[Some(zp(1)), Some(zp(2)), Some(zp(3))],
            &[vec![0]],
            &config,
        )
        .unwrap();
        assert!(matches!(results[2], Err(Error::UnexpectedInput(2))));

        let results = simulate_mpc(
            &circuit,
            &[Some(zp(1)), Some(zp(2)), None],
            &[vec![0], vec![1]],
            &config,
        )
        .unwrap();
        assert!(results.iter().all(|r| matches!(r, Err(Error::InvalidOutputParties(_)))));

        let results = simulate_mpc(&circuit, &[Some(zp(1))], &[vec![0]], &config).unwrap();
        assert!(matches!(results[0], Err(Error::TooManyInputs { inputs: 2, parties: 1 })));
    }

    #[test]
    fn semi_honest_product() {
        let config = SessionConfig::default().with_seed(7);
        let results = simulate_mpc(
            &product_circuit(),
            &[Some(zp(3)), Some(zp(4)), None],
            &[vec![0, 2]],
            &config,
        )
        .unwrap();
        let outputs: Vec<Vec<Option<Zp>>> = results.into_iter().map(Result::unwrap).collect();
        assert_eq!(outputs[0], vec![Some(zp(12))]);
        assert_eq!(outputs[1], vec![None]);
        assert_eq!(outputs[2], vec![Some(zp(12))]);
    }

    /// Runs one degree reduction of `a * b` for all `n` parties and returns their shares.
    async fn reduced_shares(n: usize, config: &SessionConfig, a: Zp, b: Zp) -> (usize, Vec<Zp>) {
        let circuit = product_circuit();
        let policy = ProtocolPolicy::from_config(config);
        let degree = sharing_degree(&circuit, n, &policy, config).unwrap();
        let mut rng = ChaCha20Rng::seed_from_u64(17);
        let a_shares = sharing::share(&mut rng, a, n, degree, policy.points()).unwrap();
        let b_shares = sharing::share(&mut rng, b, n, degree, policy.points()).unwrap();
        let channels = SimpleChannel::channels(n);
        let p_out = [vec![0]];
        let parties = channels.iter().enumerate().map(|(p_own, channel)| {
            let ctx = Context {
                channel,
                circ: &circuit,
                p_own,
                p_max: n,
                p_out: &p_out,
                prime: P,
                degree,
                policy: &policy,
                config,
            };
            let (a, b) = (a_shares[p_own], b_shares[p_own]);
            async move {
                let mut state = State::new(n, ChaCha20Rng::seed_from_u64(p_own as u64));
                multiply(&ctx, &mut state, "test", a, b).await.unwrap()
            }
        });
        (degree, join_all(parties).await)
    }

    #[tokio::test]
    async fn reduced_shares_have_the_sharing_degree() {
        let configs = [
            SessionConfig::default(),
            SessionConfig::byzantine().with_multiplication(Multiplication::VerifiedGrr),
            SessionConfig::byzantine().with_multiplication(Multiplication::ErrorCorrecting),
        ];
        for config in configs {
            let n = 5;
            let points = ProtocolPolicy::from_config(&config).points();
            let (t, shares) = reduced_shares(n, &config, zp(6), zp(7)).await;

            let xs = sharing::evaluation_points(P, n, points).unwrap();
            let poly = Polynomial::interpolate(P, &xs, &shares).unwrap();
            assert!(poly.degree().is_none_or(|d| d <= t), "{config:?}");

            let first: Vec<Option<Zp>> = shares.iter().map(|s| Some(*s)).collect();
            let last: Vec<Option<Zp>> = first
                .iter()
                .enumerate()
                .map(|(p, s)| s.filter(|_| p >= n - t - 1))
                .collect();
            assert_eq!(sharing::recombine(&first, t, P, points).unwrap(), zp(42));
            assert_eq!(sharing::recombine(&last, t, P, points).unwrap(), zp(42));
        }
    }

    #[test]
    fn missing_grr_share_aborts() {
        let tokio = Runtime::new().unwrap();
        let circuit = product_circuit();
        let p_out = [vec![0]];
        let config = SessionConfig::default().with_seed(1);
        let results: Vec<Result<Vec<Option<Zp>>, Error>> = tokio.block_on(async {
            let channels: Vec<SimpleChannel> = SimpleChannel::channels(3)
                .into_iter()
                .map(|c| c.with_timeout(std::time::Duration::from_millis(200)))
                .collect();
            let mut channels = channels.into_iter();
            let (Some(a), Some(b), Some(silent)) =
                (channels.next(), channels.next(), channels.next())
            else {
                unreachable!()
            };
            // party 2 drops out right away
            drop(silent);
            let (ra, rb) = futures::join!(
                mpc(&a, &circuit, Some(zp(2)), 0, 3, &p_out, &config),
                mpc(&b, &circuit, Some(zp(5)), 1, 3, &p_out, &config),
            );
            vec![ra, rb]
        });
        for result in results {
            assert!(matches!(result, Err(Error::MissingShare { party: 2, .. })));
        }
    }
}
