//! A communication channel used to send/receive messages to/from other parties.
//!
//! All protocols in this crate are written against the [`Channel`] trait, which
//! only knows how to move raw bytes to/from a party identified by its rank.
//! The free functions [`send_to`] / [`recv_from`] / [`recv_vec_from`] add
//! (de-)serialization and tag every message with the protocol phase during
//! which it was exchanged, so that errors can point at the step that failed.

use std::{fmt, future::Future, time::Duration};

use serde::{Serialize, de::DeserializeOwned};
use tokio::{
    sync::mpsc::{Receiver, Sender, channel, error::SendError},
    time::timeout,
};

/// Errors related to sending / receiving / (de-)serializing messages.
#[derive(Debug, thiserror::Error)]
#[error("channel error while {phase}: {reason:?}")]
pub struct Error {
    /// The protocol phase during which the error occurred.
    pub phase: String,
    /// The specific error that was raised.
    pub reason: ErrorKind,
}

/// The specific error that occurred when trying to send / receive a message.
#[derive(Debug)]
pub enum ErrorKind {
    /// The (serialized) message could not be received over the channel.
    Recv(String),
    /// The (serialized) message could not be sent over the channel.
    Send(String),
    /// The message could not be (de-)serialized.
    Serde(String),
    /// The message is a Vec, but not of the expected length.
    InvalidLength,
}

/// A communication channel used to send/receive messages to/from another party.
pub trait Channel {
    /// The error that can occur sending messages over the channel.
    type SendError: fmt::Debug;
    /// The error that can occur receiving messages over the channel.
    type RecvError: fmt::Debug;

    /// Sends a message to the party with the given rank (must be between `0..parties`).
    fn send_bytes_to(
        &mut self,
        party: usize,
        msg: Vec<u8>,
    ) -> impl Future<Output = Result<(), Self::SendError>> + Send;

    /// Awaits a message from the party with the given rank (must be between `0..parties`).
    fn recv_bytes_from(
        &mut self,
        party: usize,
    ) -> impl Future<Output = Result<Vec<u8>, Self::RecvError>> + Send;
}

/// Serializes and sends a message to the party with the given rank.
pub(crate) async fn send_to<T: Serialize>(
    channel: &mut impl Channel,
    party: usize,
    phase: &str,
    msg: &[T],
) -> Result<(), Error> {
    let msg = bincode::serialize(msg).map_err(|e| Error {
        phase: format!("serializing {phase}"),
        reason: ErrorKind::Serde(format!("{e:?}")),
    })?;
    channel.send_bytes_to(party, msg).await.map_err(|e| Error {
        phase: phase.to_string(),
        reason: ErrorKind::Send(format!("{e:?}")),
    })
}

/// Receives and deserializes a message from the party with the given rank.
pub(crate) async fn recv_from<T: DeserializeOwned>(
    channel: &mut impl Channel,
    party: usize,
    phase: &str,
) -> Result<Vec<T>, Error> {
    let msg = channel.recv_bytes_from(party).await.map_err(|e| Error {
        phase: phase.to_string(),
        reason: ErrorKind::Recv(format!("{e:?}")),
    })?;
    bincode::deserialize(&msg).map_err(|e| Error {
        phase: format!("deserializing {phase}"),
        reason: ErrorKind::Serde(format!("{e:?}")),
    })
}

/// Receives a Vec from the party with the given rank, checking its length.
pub(crate) async fn recv_vec_from<T: DeserializeOwned>(
    channel: &mut impl Channel,
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

/// Sends to the previous rank and receives from the next rank, one round.
///
/// With replicated sharing this is the resharing step: the value a party
/// receives is exactly what its successor sent, so a pair `(own, received)`
/// satisfies the `(x_i, x_{i+1})` share layout.
pub(crate) async fn rotate<T: Serialize + DeserializeOwned>(
    channel: &mut impl Channel,
    i: usize,
    n: usize,
    phase: &str,
    msg: &[T],
) -> Result<Vec<T>, Error> {
    let prev = (i + n - 1) % n;
    let next = (i + 1) % n;
    send_to(channel, prev, phase, msg).await?;
    recv_vec_from(channel, next, phase, msg.len()).await
}

/// A simple channel for testing and simulation, backed by [`Sender`] and [`Receiver`].
#[derive(Debug)]
pub struct SimpleChannel {
    s: Vec<Option<Sender<Vec<u8>>>>,
    r: Vec<Option<Receiver<Vec<u8>>>>,
}

impl SimpleChannel {
    /// Creates channels for N parties to communicate with each other.
    pub fn channels(parties: usize) -> Vec<Self> {
        let buffer_capacity = 1024;
        let mut channels = vec![];
        for _ in 0..parties {
            let mut s = vec![];
            let mut r = vec![];
            for _ in 0..parties {
                s.push(None);
                r.push(None);
            }
            channels.push(SimpleChannel { s, r });
        }
        for a in 0..parties {
            for b in 0..parties {
                if a == b {
                    continue;
                }
                let (send_a_to_b, recv_a_to_b) = channel(buffer_capacity);
                let (send_b_to_a, recv_b_to_a) = channel(buffer_capacity);
                channels[a].s[b] = Some(send_a_to_b);
                channels[b].s[a] = Some(send_b_to_a);
                channels[a].r[b] = Some(recv_b_to_a);
                channels[b].r[a] = Some(recv_a_to_b);
            }
        }
        channels
    }
}

/// The error raised by `recv` calls of a [`SimpleChannel`].
#[derive(Debug)]
pub enum AsyncRecvError {
    /// The channel has been closed.
    Closed,
    /// No message was received before the timeout.
    TimeoutElapsed,
}

impl Channel for SimpleChannel {
    type SendError = SendError<Vec<u8>>;
    type RecvError = AsyncRecvError;

    async fn send_bytes_to(&mut self, p: usize, msg: Vec<u8>) -> Result<(), SendError<Vec<u8>>> {
        self.s[p]
            .as_ref()
            .unwrap_or_else(|| panic!("no sender for party {p}"))
            .send(msg)
            .await
    }

    async fn recv_bytes_from(&mut self, p: usize) -> Result<Vec<u8>, AsyncRecvError> {
        let recv = self.r[p]
            .as_mut()
            .unwrap_or_else(|| panic!("no receiver for party {p}"))
            .recv();
        match timeout(Duration::from_secs(10 * 60), recv).await {
            Ok(Some(bytes)) => Ok(bytes),
            Ok(None) => Err(AsyncRecvError::Closed),
            Err(_) => Err(AsyncRecvError::TimeoutElapsed),
        }
    }
}
