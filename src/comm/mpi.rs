use super::{CommError, CommTag, Communicator};
use mpi::collective::SystemOperation;
use mpi::topology::SimpleCommunicator;
use mpi::traits::*;
use std::collections::BTreeMap;

/// A communicator backed by an MPI communicator, one rank per MPI process.
pub struct MpiComm {
    world: SimpleCommunicator,
    rank: usize,
    size: usize,
}

impl MpiComm {
    pub fn new(world: SimpleCommunicator) -> Self {
        let rank = world.rank() as usize;
        let size = world.size() as usize;
        Self { world, rank, size }
    }
}

impl Communicator for MpiComm {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.size
    }

    fn exchange(
        &self,
        tag: CommTag,
        outgoing: &BTreeMap<usize, Vec<u8>>,
        sources: &[usize],
    ) -> Result<BTreeMap<usize, Vec<u8>>, CommError> {
        for &peer in outgoing.keys().chain(sources) {
            self.check_peer(peer)?;
        }
        let mpi_tag = i32::from(tag.0);
        let mut received = BTreeMap::new();
        mpi::request::scope(|scope| {
            let requests: Vec<_> = outgoing
                .iter()
                .map(|(&dest, payload)| {
                    self.world
                        .process_at_rank(dest as i32)
                        .immediate_send_with_tag(scope, &payload[..], mpi_tag)
                })
                .collect();
            for &source in sources {
                let (payload, _status) = self
                    .world
                    .process_at_rank(source as i32)
                    .receive_vec_with_tag::<u8>(mpi_tag);
                received.insert(source, payload);
            }
            for request in requests {
                request.wait();
            }
        });
        Ok(received)
    }

    fn exclusive_scan_sum(&self, _tag: CommTag, value: usize) -> Result<usize, CommError> {
        let value = value as u64;
        let mut offset = 0u64;
        self.world
            .exclusive_scan_into(&value, &mut offset, SystemOperation::sum());
        // The receive buffer of rank 0 is undefined after an exclusive scan
        if self.rank == 0 {
            offset = 0;
        }
        Ok(offset as usize)
    }

    fn all_reduce_sum(&self, _tag: CommTag, value: usize) -> Result<usize, CommError> {
        let value = value as u64;
        let mut sum = 0u64;
        self.world
            .all_reduce_into(&value, &mut sum, SystemOperation::sum());
        Ok(sum as usize)
    }
}
