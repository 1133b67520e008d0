//! The bulletin board used for the public rounds of the Byzantine protocol.
//!
//! Every round is a broadcast-and-collect among the parties that are still considered good:
//! each party publishes one message (possibly an empty one) and reads the messages of all
//! others. A publisher could show different messages to different parties, so after the
//! publishing step the parties run a phase-king agreement on what every publisher published:
//!
//! 1. Every party sends the values it currently holds (one per publisher) to all others.
//!    A value held by more than `(good + 2 * tolerance) / 2` voters is kept.
//! 2. The king of the phase proposes every value held by more than half of the voters (or
//!    nothing), and all other values are replaced by the king's proposal.
//!
//! With `tolerance + 1` phases at least one king is honest, after which all honest parties
//! hold the same values. An honest publisher's message is kept in every phase, an
//! equivocating publisher ends up with the same message (or none) for all honest parties.
//! This needs `good > 4 * tolerance`, which a Byzantine session guarantees.
use std::collections::HashMap;

use serde::{Serialize, de::DeserializeOwned};
use tracing::{debug, warn};

use crate::channel::{self, Channel, ErrorKind, broadcast, scatter};

type Digest = [u8; 32];

/// What a party holds for every publisher, `None` if nothing (consistent) was published.
type Values = Vec<Option<Vec<u8>>>;

/// Broadcast-and-collect with agreement on the published messages.
#[derive(Debug)]
pub struct BulletinBoard<'a, C: Channel> {
    channel: &'a C,
    p_own: usize,
    good: &'a [bool],
    tolerance: usize,
}

fn digest(value: &Option<Vec<u8>>) -> Option<Digest> {
    value.as_ref().map(|bytes| *blake3::hash(bytes).as_bytes())
}

/// The value held by more than `threshold` of the voters, if there is one.
fn majority<'v>(
    votes: impl Iterator<Item = &'v Option<Vec<u8>>>,
    threshold: usize,
) -> Option<&'v Option<Vec<u8>>> {
    let mut tally: HashMap<Option<Digest>, (usize, &Option<Vec<u8>>)> = HashMap::new();
    for vote in votes {
        tally.entry(digest(vote)).or_insert((0, vote)).0 += 1;
    }
    tally
        .into_values()
        .find(|(count, _)| *count > threshold)
        .map(|(_, value)| value)
}

impl<'a, C: Channel> BulletinBoard<'a, C> {
    /// A board among the parties marked in `good`, tolerating `tolerance` liars.
    pub fn new(channel: &'a C, p_own: usize, good: &'a [bool], tolerance: usize) -> Self {
        Self {
            channel,
            p_own,
            good,
            tolerance,
        }
    }

    /// Publishes `msg` and returns the agreed message of every party (`None` for excluded,
    /// silent or equivocating publishers).
    pub async fn publish_and_read<T: Serialize + DeserializeOwned>(
        &self,
        phase: &str,
        msg: &T,
    ) -> Result<Vec<Option<T>>, channel::Error> {
        let &BulletinBoard {
            channel,
            p_own,
            good,
            tolerance,
        } = self;
        let bytes = bincode::serialize(msg).map_err(|e| channel::Error {
            phase: format!("publishing {phase}"),
            reason: ErrorKind::SerdeError(format!("{e:?}")),
        })?;
        let n = good.len();
        let mut values: Values =
            broadcast(channel, p_own, &format!("{phase} (publish)"), &bytes, good).await;

        let voters = good.iter().filter(|g| **g).count();
        let keep = (voters + 2 * tolerance) / 2;
        let kings: Vec<usize> = (0..n).filter(|p| good[*p]).take(tolerance + 1).collect();
        for (round, king) in kings.into_iter().enumerate() {
            let votes: Vec<Option<Values>> = broadcast(
                channel,
                p_own,
                &format!("{phase} (votes {round})"),
                &values,
                good,
            )
            .await;
            let votes: Vec<&Values> = votes
                .iter()
                .zip(good)
                .filter_map(|(v, good)| v.as_ref().filter(|v| *good && v.len() == n))
                .collect();

            let proposal: Option<Values> = (king == p_own).then(|| {
                (0..n)
                    .map(|k| majority(votes.iter().map(|v| &v[k]), voters / 2).cloned().flatten())
                    .collect()
            });
            let msgs: Vec<Option<Values>> = (0..n)
                .map(|p| proposal.clone().filter(|_| good[p] || p == p_own))
                .collect();
            let expect: Vec<bool> = (0..n).map(|p| p == king).collect();
            let mut received =
                scatter(channel, p_own, &format!("{phase} (king {round})"), &msgs, &expect).await;
            let proposal = received
                .get_mut(king)
                .and_then(Option::take)
                .filter(|v| v.len() == n)
                .unwrap_or_else(|| {
                    debug!("{phase}: no proposal from king {king}");
                    vec![None; n]
                });

            values = proposal
                .into_iter()
                .enumerate()
                .map(|(k, proposed)| match majority(votes.iter().map(|v| &v[k]), keep) {
                    Some(kept) => kept.clone(),
                    None => proposed,
                })
                .collect();
        }

        Ok(values
            .into_iter()
            .enumerate()
            .map(|(k, bytes)| {
                let bytes = bytes.filter(|_| good[k])?;
                match bincode::deserialize(&bytes) {
                    Ok(msg) => Some(msg),
                    Err(e) => {
                        warn!("{phase}: malformed message of party {k}: {e:?}");
                        None
                    }
                }
            })
            .collect())
    }
}
