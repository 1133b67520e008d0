//! Byzantine-robust phases: verifiable sharing, verified degree reduction and robust output.
//!
//! All shares live at the primitive points `w^i`. Public rounds go through the
//! [`BulletinBoard`], so that all honest parties see the same complaints and disclosures and
//! therefore exclude the same cheaters.
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::{Context, Error, State, in_field};
use crate::{
    bulletin::BulletinBoard,
    channel::{Channel, broadcast, scatter},
    decoder::{decode, decode_polynomial},
    field::Zp,
    matrix::FieldMatrix,
    polynomial::Polynomial,
    sharing::{self, SecretPolynomials},
};

/// Shares the inputs with the bivariate scheme.
pub(crate) async fn share_inputs(
    ctx: &Context<'_, impl Channel>,
    state: &mut State,
    input: Option<Zp>,
) -> Result<Vec<Zp>, Error> {
    let dealers: Vec<usize> = (0..ctx.circ.input_count()).collect();
    vss(ctx, state, "input", input, &dealers).await
}

/// Verifiable secret sharing, batched over all `dealers`.
///
/// Returns the own share of every dealer's secret, in the order of `dealers`. The share of a
/// dealer that is excluded (before or during the sharing) is zero.
async fn vss(
    ctx: &Context<'_, impl Channel>,
    state: &mut State,
    phase: &str,
    secret: Option<Zp>,
    dealers: &[usize],
) -> Result<Vec<Zp>, Error> {
    let &Context {
        channel,
        p_own,
        p_max,
        prime,
        degree: t,
        policy,
        config,
        ..
    } = ctx;
    let xs = ctx.points()?;
    let zero = Zp::zero(prime);
    let own_position = dealers.iter().position(|d| *d == p_own);

    let dealt = match (secret, own_position) {
        (Some(secret), Some(_)) => Some((policy.hooks.deal)(&mut state.rng, secret, p_max, t)?),
        _ => None,
    };
    let msgs: Vec<Option<SecretPolynomials>> = (0..p_max)
        .map(|p| {
            dealt
                .as_ref()
                .filter(|_| state.good[p])
                .and_then(|polys| polys.get(p).cloned())
        })
        .collect();
    let expect: Vec<bool> = (0..p_max)
        .map(|p| state.good[p] && dealers.contains(&p))
        .collect();
    let received = scatter(channel, p_own, &format!("{phase} dealing"), &msgs, &expect).await;
    let mut held: Vec<Option<SecretPolynomials>> = dealers
        .iter()
        .map(|d| {
            received[*d]
                .clone()
                .filter(|polys| polys.is_well_formed(t, prime))
        })
        .collect();

    // f_d(w^k) for every party k, to be checked against k's own g_d(w^own)
    let msgs: Vec<Option<Vec<Option<Zp>>>> = xs
        .iter()
        .zip(&state.good)
        .map(|(x, good)| {
            good.then(|| {
                held.iter()
                    .map(|polys| polys.as_ref().map(|p| p.f_at(prime, *x)))
                    .collect()
            })
        })
        .collect();
    let checks = scatter(
        channel,
        p_own,
        &format!("{phase} verification"),
        &msgs,
        &state.good,
    )
    .await;
    let mut complaints: Vec<bool> = dealers
        .iter()
        .enumerate()
        .map(|(d, dealer)| {
            if *dealer == p_own || !state.good[*dealer] {
                return false;
            }
            let Some(mine) = &held[d] else {
                return true;
            };
            (0..p_max).filter(|k| state.good[*k] && *k != p_own).any(|k| {
                let value = checks[k]
                    .as_ref()
                    .filter(|values| values.len() == dealers.len())
                    .and_then(|values| in_field(values[d], prime));
                value != Some(mine.g_at(prime, xs[k]))
            })
        })
        .collect();

    let mut disclosed: Vec<Vec<Option<SecretPolynomials>>> =
        vec![vec![None; p_max]; dealers.len()];
    let mut cheaters: Vec<usize> = vec![];
    for round in 1..=config.complaint_rounds {
        let board = BulletinBoard::new(channel, p_own, &state.good, state.remaining_faults(t));
        let published = board
            .publish_and_read(&format!("{phase} complaints {round}"), &complaints)
            .await?;
        let complainers: Vec<Vec<bool>> = (0..dealers.len())
            .map(|d| {
                (0..p_max)
                    .map(|k| {
                        state.good[k]
                            && published[k]
                                .as_ref()
                                .is_some_and(|c| c.len() == dealers.len() && c[d])
                    })
                    .collect()
            })
            .collect();
        let counts: Vec<usize> = complainers
            .iter()
            .map(|c| c.iter().filter(|k| **k).count())
            .collect();
        if counts.iter().all(|c| *c == 0) {
            break;
        }
        debug!("{phase}: complaints in round {round}: {counts:?}");
        if round == config.complaint_rounds {
            cheaters.extend(
                dealers
                    .iter()
                    .zip(&counts)
                    .filter(|(_, count)| **count > t)
                    .map(|(dealer, _)| *dealer),
            );
            break;
        }

        let disclosure: Vec<Option<SecretPolynomials>> = match (&dealt, own_position) {
            (Some(polys), Some(d)) if counts[d] > 0 => {
                (policy.hooks.disclose)(polys, &complainers[d])
            }
            _ => vec![],
        };
        let published = board
            .publish_and_read(&format!("{phase} disclosure {round}"), &disclosure)
            .await?;

        complaints = vec![false; dealers.len()];
        for (d, dealer) in dealers.iter().enumerate() {
            if counts[d] == 0 || *dealer == p_own {
                continue;
            }
            for k in (0..p_max).filter(|k| complainers[d][*k]) {
                let polys = published[*dealer]
                    .as_ref()
                    .and_then(|v| v.get(k).cloned().flatten())
                    .filter(|p| p.is_well_formed(t, prime) && p.is_consistent_at(prime, xs[k]))
                    .filter(|p| disclosed[d][k].as_ref().is_none_or(|earlier| earlier == p));
                let Some(polys) = polys else {
                    warn!("{phase}: dealer {dealer} did not answer the complaint of party {k}");
                    complaints[d] = true;
                    continue;
                };
                if k == p_own {
                    held[d] = Some(polys.clone());
                } else if let Some(mine) = &held[d] {
                    let matches = mine.g_at(prime, xs[k]) == polys.f_at(prime, xs[p_own])
                        && mine.f_at(prime, xs[k]) == polys.g_at(prime, xs[p_own]);
                    if !matches {
                        complaints[d] = true;
                    }
                } else {
                    complaints[d] = true;
                }
                disclosed[d][k] = Some(polys);
            }
        }
    }

    for cheater in &cheaters {
        state.exclude(ctx, *cheater, "dealt an inconsistent sharing").await?;
    }
    Ok(dealers
        .iter()
        .zip(held)
        .map(|(dealer, polys)| {
            if state.good[*dealer] {
                polys.and_then(|p| p.share()).unwrap_or(zero)
            } else {
                zero
            }
        })
        .collect())
}

/// What a dealer of the verified GRR sends to each party.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct ProductShares {
    a: Zp,
    b: Zp,
    ab: Zp,
    r: Zp,
}

impl ProductShares {
    fn is_element_of(&self, prime: i64) -> bool {
        [self.a, self.b, self.ab, self.r]
            .iter()
            .all(|v| v.is_element_of(prime))
    }

    /// Checks the shares at `x` against the dealer's public `R(x) = x r(x) + a(x) b(x) - h(x)`.
    fn matches(&self, check: &Polynomial, x: Zp) -> bool {
        self.is_element_of(check.prime())
            && check.evaluate(x) == x * self.r + self.a * self.b - self.ab
    }
}

/// Degree reduction in which every dealer proves that it re-shared the product of its shares.
pub(crate) async fn verified_grr(
    ctx: &Context<'_, impl Channel>,
    state: &mut State,
    phase: &str,
    a: Zp,
    b: Zp,
    product: Zp,
) -> Result<Zp, Error> {
    let &Context {
        channel,
        p_own,
        p_max,
        prime,
        degree: t,
        ..
    } = ctx;
    let xs = ctx.points()?;
    let rng = &mut state.rng;

    let fa = sharing::detailed_share(rng, a, p_max, t)?;
    let fb = sharing::detailed_share(rng, b, p_max, t)?;
    let h = sharing::detailed_share(rng, product, p_max, t)?;
    let (r, r_shares) = if t == 0 {
        (Polynomial::zero(prime), vec![Zp::zero(prime); p_max])
    } else {
        let secret = Zp::new(prime, rng.random_range(0..prime));
        let r = sharing::detailed_share(rng, secret, p_max, 2 * t - 1)?;
        (r.polynomial(prime), r.shares)
    };
    let check = r
        .shift()
        .plus(&fa.polynomial(prime).multiply(&fb.polynomial(prime)))
        .minus(&h.polynomial(prime));
    let check: Vec<Zp> = (0..=2 * t).map(|i| check.coefficient(i)).collect();
    let msgs: Vec<Option<ProductShares>> = (0..p_max)
        .map(|p| {
            state.good[p].then(|| ProductShares {
                a: fa.shares[p],
                b: fb.shares[p],
                ab: h.shares[p],
                r: r_shares[p],
            })
        })
        .collect();
    let phase_products = format!("{phase} products");
    let mut received = scatter(channel, p_own, &phase_products, &msgs, &state.good).await;

    let board = BulletinBoard::new(channel, p_own, &state.good, state.remaining_faults(t));
    let published = board
        .publish_and_read(&format!("{phase} checks"), &check)
        .await?;
    let checks: Vec<Option<Polynomial>> = published
        .into_iter()
        .enumerate()
        .map(|(p, c)| {
            c.filter(|c| {
                state.good[p]
                    && c.len() == 2 * t + 1
                    && c.iter().all(|v| v.is_element_of(prime))
                    && c[0].is_zero()
            })
            .map(|c| Polynomial::new(prime, c))
        })
        .collect();
    let mut cheaters: Vec<usize> = (0..p_max)
        .filter(|p| state.good[*p] && checks[*p].is_none())
        .collect();

    let complaints: Vec<bool> = (0..p_max)
        .map(|p| match &checks[p] {
            Some(check) if p != p_own => !received[p]
                .as_ref()
                .is_some_and(|s| s.matches(check, xs[p_own])),
            _ => false,
        })
        .collect();
    let published = board
        .publish_and_read(&format!("{phase} complaints"), &complaints)
        .await?;
    let complainers: Vec<Vec<bool>> = (0..p_max)
        .map(|dealer| {
            (0..p_max)
                .map(|k| {
                    state.good[k]
                        && published[k]
                            .as_ref()
                            .is_some_and(|c| c.len() == p_max && c[dealer])
                })
                .collect()
        })
        .collect();

    if complainers.iter().flatten().any(|c| *c) {
        let disclosure: Vec<Option<ProductShares>> = msgs
            .iter()
            .zip(&complainers[p_own])
            .map(|(shares, complained)| shares.clone().filter(|_| *complained))
            .collect();
        let published = board
            .publish_and_read(&format!("{phase} disclosure"), &disclosure)
            .await?;
        for dealer in 0..p_max {
            let Some(check) = &checks[dealer] else {
                continue;
            };
            for k in (0..p_max).filter(|k| complainers[dealer][*k]) {
                let shares = published[dealer]
                    .as_ref()
                    .and_then(|v| v.get(k).cloned().flatten())
                    .filter(|s| s.matches(check, xs[k]));
                match shares {
                    Some(shares) if k == p_own => received[dealer] = Some(shares),
                    Some(_) => {}
                    None => {
                        cheaters.push(dealer);
                        break;
                    }
                }
            }
        }
    }

    for cheater in cheaters {
        state.exclude(ctx, cheater, "did not re-share its product").await?;
    }
    let dealers = state.good_parties();
    let points: Vec<Zp> = dealers.iter().map(|d| xs[*d]).collect();
    let lambda = FieldMatrix::lagrange_at_zero(prime, &points)?;
    Ok(dealers
        .iter()
        .zip(lambda)
        .fold(Zp::zero(prime), |acc, (d, l)| {
            let share = received[*d].as_ref().map_or(Zp::zero(prime), |s| s.ab);
            acc + l * share
        }))
}

/// Degree reduction that locates cheaters by decoding the coefficients that must be zero.
///
/// Every party verifiably re-shares its product share. The product shares of the good parties
/// lie on a polynomial of degree `2t`, so all higher coefficients of the polynomial through
/// them must vanish. Any nonzero coefficient is evaluated at the good points and decoded at
/// degree `2t`, and the positions where decoding changes the value are the cheaters.
pub(crate) async fn error_correcting_reduction(
    ctx: &Context<'_, impl Channel>,
    state: &mut State,
    phase: &str,
    product: Zp,
) -> Result<Zp, Error> {
    let &Context {
        channel,
        p_own,
        prime,
        degree: t,
        ..
    } = ctx;
    let all_points = ctx.points()?;
    let dealers = state.good_parties();
    let shares = vss(ctx, state, &format!("{phase} products"), Some(product), &dealers).await?;

    let mut iteration = 0;
    let (lambda, ys) = loop {
        iteration += 1;
        let active: Vec<usize> = (0..dealers.len())
            .filter(|d| state.good[dealers[*d]])
            .collect();
        let m = active.len();
        if m < 2 * t + 1 {
            return Err(state.too_many_cheaters(t));
        }
        let xs: Vec<Zp> = active.iter().map(|d| all_points[dealers[*d]]).collect();
        let ys: Vec<Zp> = active.iter().map(|d| shares[*d]).collect();
        let inverse = FieldMatrix::shamir_recombination(prime, &xs).inverse()?;
        let high = 2 * t + 1..m;
        if high.is_empty() {
            break (inverse.row(0), ys);
        }

        let own_coefficients: Vec<Zp> = high
            .clone()
            .map(|k| {
                inverse
                    .row(k)
                    .iter()
                    .zip(&ys)
                    .fold(Zp::zero(prime), |acc, (l, y)| acc + *l * *y)
            })
            .collect();
        let received = broadcast(
            channel,
            p_own,
            &format!("{phase} coefficients {iteration}"),
            &own_coefficients,
            &state.good,
        )
        .await;
        let players = state.good_parties();
        let player_points: Vec<Zp> = players.iter().map(|p| all_points[*p]).collect();
        let faults = state.remaining_faults(t);
        let mut coefficients = vec![Zp::zero(prime); 2 * t + 1];
        for i in 0..high.len() {
            let codeword: Vec<Zp> = players
                .iter()
                .map(|p| {
                    received[*p]
                        .as_ref()
                        .filter(|c| c.len() == high.len())
                        .and_then(|c| in_field(Some(c[i]), prime))
                        .unwrap_or(Zp::zero(prime))
                })
                .collect();
            let coefficient = decode_polynomial(prime, &player_points, &codeword, faults, t)
                .map_err(|_| state.too_many_cheaters(t))?
                .coefficient(0);
            coefficients.push(coefficient);
        }
        let calculation = Polynomial::new(prime, coefficients);
        if calculation.is_zero() {
            break (inverse.row(0), ys);
        }

        let distorted: Vec<Zp> = xs.iter().map(|x| calculation.evaluate(*x)).collect();
        let fixed = decode(prime, &xs, &distorted, faults, 2 * t)
            .map_err(|_| state.too_many_cheaters(t))?;
        let cheaters: Vec<usize> = active
            .iter()
            .zip(distorted.iter().zip(&fixed))
            .filter(|(_, (distorted, fixed))| distorted != fixed)
            .map(|(d, _)| dealers[*d])
            .collect();
        if cheaters.is_empty() {
            return Err(state.too_many_cheaters(t));
        }
        for cheater in cheaters {
            state.exclude(ctx, cheater, "re-shared a wrong product").await?;
        }
    };
    Ok(lambda
        .iter()
        .zip(&ys)
        .fold(Zp::zero(prime), |acc, (l, y)| acc + *l * *y))
}

/// Reveals the outputs, correcting the shares of up to `t` cheaters.
pub(crate) async fn output(
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
        degree: t,
        ..
    } = ctx;
    let all_points = ctx.points()?;

    let msgs: Vec<Option<Vec<Option<Zp>>>> = (0..p_max)
        .map(|p| {
            let visible: Vec<Option<Zp>> = outputs
                .iter()
                .enumerate()
                .map(|(o, share)| p_out[o].contains(&p).then_some(*share))
                .collect();
            (state.good[p] && visible.iter().any(Option::is_some)).then_some(visible)
        })
        .collect();
    let learns_any = (0..outputs.len()).any(|o| ctx.learns(o));
    let expect: Vec<bool> = state.good.iter().map(|g| *g && learns_any).collect();
    let received = scatter(channel, p_own, "output shares", &msgs, &expect).await;

    let players = state.good_parties();
    let xs: Vec<Zp> = players.iter().map(|p| all_points[*p]).collect();
    let faults = state.remaining_faults(t);
    let mut results = vec![None; outputs.len()];
    for (o, result) in results.iter_mut().enumerate() {
        if !ctx.learns(o) {
            continue;
        }
        let ys: Vec<Zp> = players
            .iter()
            .map(|p| {
                let share = received[*p]
                    .as_ref()
                    .and_then(|shares| shares.get(o).copied().flatten());
                in_field(share, prime).unwrap_or(Zp::zero(prime))
            })
            .collect();
        let fixed = decode(prime, &xs, &ys, faults, t).map_err(|_| state.too_many_cheaters(t))?;
        *result = Some(sharing::interpolate_at_zero(
            prime,
            &xs[..=t],
            &fixed[..=t],
        )?);
    }
    Ok(results)
}
