//! Blocking message passing between the processes of one level build.
//!
//! Two collective points exist per level: the neighbour exchange of entity contributions and
//! the exclusive prefix sum of coarse dof counts. Both block until every participating process
//! has reached them; there is no cancellation and no timeout.
use std::collections::BTreeMap;
use std::fmt;

mod thread;
pub mod wire;

#[cfg(feature = "mpi-support")]
mod mpi;

#[cfg(feature = "mpi-support")]
pub use self::mpi::MpiComm;
pub use thread::ThreadComm;

/// Namespaces messages belonging to different collective points.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CommTag(pub u16);

impl CommTag {
    pub const ENTITY_CONTRIBUTIONS: CommTag = CommTag(0xA1);
    pub const COARSE_OFFSET: CommTag = CommTag(0xA2);
    pub const SCHUR_FACE: CommTag = CommTag(0xA3);
    pub const SCHUR_RHS: CommTag = CommTag(0xA4);
    pub const FACE_NUMBERING: CommTag = CommTag(0xA5);
    pub const FACE_COUNT: CommTag = CommTag(0xA6);
    pub const FACE_TOTAL: CommTag = CommTag(0xA7);
}

#[derive(Debug)]
#[non_exhaustive]
pub enum CommError {
    /// A peer is no longer reachable.
    Disconnected { peer: usize },
    /// A message was addressed to a rank that does not exist, or to the sending rank itself.
    InvalidPeer { peer: usize, rank: usize, size: usize },
    /// A received buffer could not be decoded.
    Malformed { peer: usize, reason: String },
}

impl fmt::Display for CommError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disconnected { peer } => write!(f, "Peer {} disconnected", peer),
            Self::InvalidPeer { peer, rank, size } => {
                write!(f, "Invalid peer {} for rank {} in a communicator of size {}", peer, rank, size)
            }
            Self::Malformed { peer, reason } => {
                write!(f, "Malformed message from peer {}: {}", peer, reason)
            }
        }
    }
}

impl std::error::Error for CommError {}

pub trait Communicator {
    fn rank(&self) -> usize;

    fn size(&self) -> usize;

    /// Sends each outgoing buffer to its destination rank and receives exactly one buffer from
    /// each rank in `sources`. Empty buffers are still delivered.
    ///
    /// Received buffers are keyed by source rank.
    fn exchange(
        &self,
        tag: CommTag,
        outgoing: &BTreeMap<usize, Vec<u8>>,
        sources: &[usize],
    ) -> Result<BTreeMap<usize, Vec<u8>>, CommError>;

    /// The sum of `value` over all ranks smaller than this one. Rank 0 receives 0.
    fn exclusive_scan_sum(&self, tag: CommTag, value: usize) -> Result<usize, CommError>;

    /// The sum of `value` over all ranks, known to every rank.
    ///
    /// The default implementation sends the value to every other rank.
    fn all_reduce_sum(&self, tag: CommTag, value: usize) -> Result<usize, CommError> {
        let peers: Vec<usize> = (0..self.size()).filter(|&r| r != self.rank()).collect();
        let payload = (value as u64).to_le_bytes().to_vec();
        let outgoing: BTreeMap<usize, Vec<u8>> = peers.iter().map(|&peer| (peer, payload.clone())).collect();
        let received = self.exchange(tag, &outgoing, &peers)?;
        received.into_iter().try_fold(value, |sum, (peer, bytes)| {
            let bytes: [u8; 8] = bytes.as_slice().try_into().map_err(|_| CommError::Malformed {
                peer,
                reason: format!("expected 8 bytes for a sum, got {}", bytes.len()),
            })?;
            Ok(sum + u64::from_le_bytes(bytes) as usize)
        })
    }

    /// Checks that `peer` can be addressed from this rank.
    fn check_peer(&self, peer: usize) -> Result<(), CommError> {
        if peer >= self.size() || peer == self.rank() {
            Err(CommError::InvalidPeer {
                peer,
                rank: self.rank(),
                size: self.size(),
            })
        } else {
            Ok(())
        }
    }
}

impl<'a, C> Communicator for &'a C
where
    C: ?Sized + Communicator,
{
    fn rank(&self) -> usize {
        C::rank(self)
    }

    fn size(&self) -> usize {
        C::size(self)
    }

    fn exchange(
        &self,
        tag: CommTag,
        outgoing: &BTreeMap<usize, Vec<u8>>,
        sources: &[usize],
    ) -> Result<BTreeMap<usize, Vec<u8>>, CommError> {
        C::exchange(self, tag, outgoing, sources)
    }

    fn exclusive_scan_sum(&self, tag: CommTag, value: usize) -> Result<usize, CommError> {
        C::exclusive_scan_sum(self, tag, value)
    }

    fn all_reduce_sum(&self, tag: CommTag, value: usize) -> Result<usize, CommError> {
        C::all_reduce_sum(self, tag, value)
    }
}

/// The communicator of a single process without peers.
#[derive(Debug, Clone, Copy, Default)]
pub struct SerialComm;

impl Communicator for SerialComm {
    fn rank(&self) -> usize {
        0
    }

    fn size(&self) -> usize {
        1
    }

    fn exchange(
        &self,
        _tag: CommTag,
        outgoing: &BTreeMap<usize, Vec<u8>>,
        sources: &[usize],
    ) -> Result<BTreeMap<usize, Vec<u8>>, CommError> {
        for &peer in outgoing.keys().chain(sources) {
            self.check_peer(peer)?;
        }
        Ok(BTreeMap::new())
    }

    fn exclusive_scan_sum(&self, _tag: CommTag, _value: usize) -> Result<usize, CommError> {
        Ok(0)
    }

    fn all_reduce_sum(&self, _tag: CommTag, value: usize) -> Result<usize, CommError> {
        Ok(value)
    }
}
