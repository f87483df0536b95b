use super::{CommError, CommTag, Communicator};
use crossbeam::channel::{unbounded, Receiver, Sender};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug)]
struct Envelope {
    source: usize,
    tag: CommTag,
    payload: Vec<u8>,
}

/// A communicator connecting ranks that run as threads of one process.
///
/// Each rank owns an inbox. Messages that arrive before they are asked for are kept in a stash
/// and matched later by `(source, tag)` in arrival order.
pub struct ThreadComm {
    rank: usize,
    outboxes: Vec<Option<Sender<Envelope>>>,
    inbox: Receiver<Envelope>,
    stash: Mutex<Vec<Envelope>>,
}

impl fmt::Debug for ThreadComm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ThreadComm")
            .field("rank", &self.rank)
            .field("size", &self.outboxes.len())
            .finish()
    }
}

impl ThreadComm {
    /// Creates `size` connected communicators. Element `r` is meant to be moved to the thread
    /// acting as rank `r`.
    pub fn create(size: usize) -> Vec<ThreadComm> {
        let (senders, receivers): (Vec<_>, Vec<_>) = (0..size).map(|_| unbounded()).unzip();
        receivers
            .into_iter()
            .enumerate()
            .map(|(rank, inbox)| {
                // No sender to self, so the inbox disconnects once every peer is gone
                let outboxes = senders
                    .iter()
                    .enumerate()
                    .map(|(peer, sender)| (peer != rank).then(|| sender.clone()))
                    .collect();
                ThreadComm {
                    rank,
                    outboxes,
                    inbox,
                    stash: Mutex::new(Vec::new()),
                }
            })
            .collect()
    }

    fn send(&self, dest: usize, tag: CommTag, payload: Vec<u8>) -> Result<(), CommError> {
        self.check_peer(dest)?;
        let outbox = self.outboxes[dest]
            .as_ref()
            .ok_or(CommError::Disconnected { peer: dest })?;
        outbox
            .send(Envelope {
                source: self.rank,
                tag,
                payload,
            })
            .map_err(|_| CommError::Disconnected { peer: dest })
    }

    fn receive(&self, source: usize, tag: CommTag) -> Result<Vec<u8>, CommError> {
        self.check_peer(source)?;
        let mut stash = self.stash.lock();
        if let Some(pos) = stash
            .iter()
            .position(|envelope| envelope.source == source && envelope.tag == tag)
        {
            return Ok(stash.remove(pos).payload);
        }
        loop {
            let envelope = self
                .inbox
                .recv()
                .map_err(|_| CommError::Disconnected { peer: source })?;
            if envelope.source == source && envelope.tag == tag {
                return Ok(envelope.payload);
            }
            stash.push(envelope);
        }
    }
}

impl Communicator for ThreadComm {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.outboxes.len()
    }

    fn exchange(
        &self,
        tag: CommTag,
        outgoing: &BTreeMap<usize, Vec<u8>>,
        sources: &[usize],
    ) -> Result<BTreeMap<usize, Vec<u8>>, CommError> {
        // Channels are unbounded, so sending everything first cannot deadlock
        for (&dest, payload) in outgoing {
            self.send(dest, tag, payload.clone())?;
        }
        sources
            .iter()
            .map(|&source| Ok((source, self.receive(source, tag)?)))
            .collect()
    }

    fn exclusive_scan_sum(&self, tag: CommTag, value: usize) -> Result<usize, CommError> {
        let offset = if self.rank == 0 {
            0
        } else {
            let bytes = self.receive(self.rank - 1, tag)?;
            let bytes: [u8; 8] = bytes
                .as_slice()
                .try_into()
                .map_err(|_| CommError::Malformed {
                    peer: self.rank - 1,
                    reason: format!("expected 8 bytes for a prefix sum, got {}", bytes.len()),
                })?;
            u64::from_le_bytes(bytes) as usize
        };
        if self.rank + 1 < self.size() {
            let partial = (offset + value) as u64;
            self.send(self.rank + 1, tag, partial.to_le_bytes().to_vec())?;
        }
        Ok(offset)
    }
}
