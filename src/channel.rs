//! A communication channel used to send/receive messages to/from other parties.
//!
//! The protocol treats the network as unreliable: a message that cannot be received (because
//! the peer timed out, hung up or sent garbage) is simply missing. [`scatter`] and
//! [`broadcast`] therefore return one `Option` per party instead of failing.
//!
//! Every message carries the label of the phase it was sent for, so a message that arrives
//! after its round has timed out is dropped instead of being read in a later round. Phase
//! labels must therefore be unique within a session.
use std::{fmt, future::Future, sync::Mutex, time::Duration};

use futures::future::join_all;
use serde::{Serialize, de::DeserializeOwned};
use tokio::{
    sync::{
        Mutex as AsyncMutex,
        mpsc::{Receiver, Sender, channel},
    },
    time::timeout,
};
use tracing::{trace, warn};

/// Errors related to sending / receiving / (de-)serializing messages.
#[derive(Debug)]
pub struct Error {
    /// The protocol phase during which the error occurred.
    pub phase: String,
    /// The specific error that was raised.
    pub reason: ErrorKind,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?} during {}", self.reason, self.phase)
    }
}

impl std::error::Error for Error {}

/// The specific error that occurred when trying to send / receive a message.
#[derive(Debug)]
pub enum ErrorKind {
    /// The (serialized) message could not be received over the channel.
    RecvError(String),
    /// The (serialized) message could not be sent over the channel.
    SendError(String),
    /// The message could not be (de-)serialized.
    SerdeError(String),
    /// The message is a Vec, but not of the expected length.
    InvalidLength,
}

/// A communication channel used to send/receive messages to/from another party.
pub trait Channel {
    /// The error that can occur sending messages over the channel.
    type SendError: fmt::Debug;
    /// The error that can occur receiving messages over the channel.
    type RecvError: fmt::Debug;

    /// Sends a message to the party with the given index (must be between `0..participants`).
    fn send_bytes_to(
        &self,
        party: usize,
        msg: Vec<u8>,
        phase: &str,
    ) -> impl Future<Output = Result<(), Self::SendError>> + Send;

    /// Awaits a message from the party with the given index (must be between `0..participants`).
    fn recv_bytes_from(
        &self,
        party: usize,
        phase: &str,
    ) -> impl Future<Output = Result<Vec<u8>, Self::RecvError>> + Send;

    /// Tears down the connection to a party that has been excluded from the protocol.
    fn disconnect(&self, _party: usize) -> impl Future<Output = ()> + Send {
        async {}
    }
}

/// Serializes and sends a message to the other party.
pub async fn send_to<S: Serialize + ?Sized>(
    channel: &impl Channel,
    party: usize,
    phase: &str,
    msg: &S,
) -> Result<(), Error> {
    let serde_error = |e: bincode::Error| Error {
        phase: format!("sending {phase}"),
        reason: ErrorKind::SerdeError(format!("{e:?}")),
    };
    let payload = bincode::serialize(msg).map_err(serde_error)?;
    let msg = bincode::serialize(&(phase, payload)).map_err(serde_error)?;
    channel
        .send_bytes_to(party, msg, phase)
        .await
        .map_err(|e| Error {
            phase: phase.to_string(),
            reason: ErrorKind::SendError(format!("{e:?}")),
        })
}

/// Receives and deserializes a message from the other party.
///
/// Messages that were sent for a different phase (e.g. ones that arrived after their round
/// timed out) are skipped.
pub async fn recv_from<T: DeserializeOwned>(
    channel: &impl Channel,
    party: usize,
    phase: &str,
) -> Result<T, Error> {
    let serde_error = |e: bincode::Error| Error {
        phase: format!("receiving {phase}"),
        reason: ErrorKind::SerdeError(format!("{e:?}")),
    };
    loop {
        let msg = channel
            .recv_bytes_from(party, phase)
            .await
            .map_err(|e| Error {
                phase: phase.to_string(),
                reason: ErrorKind::RecvError(format!("{e:?}")),
            })?;
        let (sent_for, payload): (String, Vec<u8>) =
            bincode::deserialize(&msg).map_err(serde_error)?;
        if sent_for == phase {
            return bincode::deserialize(&payload).map_err(serde_error);
        }
        warn!("dropping message of party {party} for {sent_for} while waiting for {phase}");
    }
}

/// Receives and deserializes a Vec from the other party (while checking the length).
pub async fn recv_vec_from<T: DeserializeOwned>(
    channel: &impl Channel,
    party: usize,
    phase: &str,
    len: usize,
) -> Result<Vec<T>, Error> {
    let v: Vec<T> = recv_from(channel, party, phase).await?;
    if v.len() == len {
        Ok(v)
    } else {
        Err(Error {
            phase: phase.to_string(),
            reason: ErrorKind::InvalidLength,
        })
    }
}

/// Sends `msgs[p]` to every party `p` with `msgs[p] = Some(_)` and receives from every party
/// `p` with `expect[p]`.
///
/// Sending to ourselves is skipped, the own entry of the result is taken from `msgs`. Failing
/// sends are logged and ignored, failing receives result in `None`.
pub async fn scatter<T: Serialize + DeserializeOwned + Clone>(
    channel: &impl Channel,
    p_own: usize,
    phase: &str,
    msgs: &[Option<T>],
    expect: &[bool],
) -> Vec<Option<T>> {
    let sends = msgs.iter().enumerate().filter_map(|(p, msg)| {
        let msg = msg.as_ref()?;
        (p != p_own).then(|| async move {
            if let Err(e) = send_to(channel, p, phase, msg).await {
                warn!("could not send {phase} to party {p}: {e}");
            }
        })
    });
    join_all(sends).await;

    let recvs = (0..expect.len()).map(|p| async move {
        if p == p_own || !expect[p] {
            return None;
        }
        match recv_from::<T>(channel, p, phase).await {
            Ok(msg) => Some(msg),
            Err(e) => {
                warn!("no {phase} from party {p}: {e}");
                None
            }
        }
    });
    let mut received = join_all(recvs).await;
    if let Some(own) = received.get_mut(p_own) {
        *own = msgs.get(p_own).cloned().flatten();
    }
    received
}

/// Sends the same message to all parties in `to` and receives from all of them.
pub async fn broadcast<T: Serialize + DeserializeOwned + Clone>(
    channel: &impl Channel,
    p_own: usize,
    phase: &str,
    msg: &T,
    to: &[bool],
) -> Vec<Option<T>> {
    let msgs: Vec<Option<T>> = to
        .iter()
        .enumerate()
        .map(|(p, include)| (*include || p == p_own).then(|| msg.clone()))
        .collect();
    scatter(channel, p_own, phase, &msgs, to).await
}

/// An in-memory channel using tokio's [`Sender`] and [`Receiver`], for simulations and tests.
#[derive(Debug)]
pub struct SimpleChannel {
    s: Vec<Mutex<Option<Sender<Vec<u8>>>>>,
    r: Vec<Option<AsyncMutex<Receiver<Vec<u8>>>>>,
    timeout: Duration,
}

impl SimpleChannel {
    /// The default time to wait for a message before treating it as missing.
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

    /// Creates channels for N parties to communicate with each other.
    pub fn channels(parties: usize) -> Vec<Self> {
        let buffer_capacity = 1024;
        let mut channels: Vec<Self> = (0..parties)
            .map(|_| SimpleChannel {
                s: (0..parties).map(|_| Mutex::new(None)).collect(),
                r: (0..parties).map(|_| None).collect(),
                timeout: Self::DEFAULT_TIMEOUT,
            })
            .collect();
        for a in 0..parties {
            for b in a + 1..parties {
                let (send_a_to_b, recv_a_to_b) = channel(buffer_capacity);
                let (send_b_to_a, recv_b_to_a) = channel(buffer_capacity);
                channels[a].s[b] = Mutex::new(Some(send_a_to_b));
                channels[b].s[a] = Mutex::new(Some(send_b_to_a));
                channels[a].r[b] = Some(AsyncMutex::new(recv_b_to_a));
                channels[b].r[a] = Some(AsyncMutex::new(recv_a_to_b));
            }
        }
        channels
    }

    /// Sets the time to wait for a message.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn sender(&self, p: usize) -> Option<Sender<Vec<u8>>> {
        let slot = self.s.get(p)?;
        match slot.lock() {
            Ok(sender) => sender.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

/// The error raised by `send` calls of a [`SimpleChannel`].
#[derive(Debug)]
pub enum AsyncSendError {
    /// There is no connection to the party (anymore).
    Disconnected,
    /// The receiving side has been closed.
    Closed,
}

/// The error raised by `recv` calls of a [`SimpleChannel`].
#[derive(Debug)]
pub enum AsyncRecvError {
    /// There is no connection to the party.
    Disconnected,
    /// The channel has been closed.
    Closed,
    /// No message was received before the timeout.
    TimeoutElapsed,
}

impl Channel for SimpleChannel {
    type SendError = AsyncSendError;
    type RecvError = AsyncRecvError;

    async fn send_bytes_to(
        &self,
        p: usize,
        msg: Vec<u8>,
        phase: &str,
    ) -> Result<(), AsyncSendError> {
        trace!("sending {phase} to party {p} ({} bytes)", msg.len());
        let sender = self.sender(p).ok_or(AsyncSendError::Disconnected)?;
        sender.send(msg).await.map_err(|_| AsyncSendError::Closed)
    }

    async fn recv_bytes_from(&self, p: usize, phase: &str) -> Result<Vec<u8>, AsyncRecvError> {
        let receiver = self
            .r
            .get(p)
            .and_then(Option::as_ref)
            .ok_or(AsyncRecvError::Disconnected)?;
        let mut receiver = receiver.lock().await;
        match timeout(self.timeout, receiver.recv()).await {
            Ok(Some(bytes)) => {
                trace!("received {phase} from party {p} ({} bytes)", bytes.len());
                Ok(bytes)
            }
            Ok(None) => Err(AsyncRecvError::Closed),
            Err(_) => Err(AsyncRecvError::TimeoutElapsed),
        }
    }

    async fn disconnect(&self, p: usize) {
        if let Some(slot) = self.s.get(p) {
            match slot.lock() {
                Ok(mut sender) => *sender = None,
                Err(poisoned) => *poisoned.into_inner() = None,
            }
        }
        if let Some(Some(receiver)) = self.r.get(p) {
            receiver.lock().await.close();
        }
    }
}
