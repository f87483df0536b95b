use super::run_ranks;
use amge::comm::{CommTag, Communicator};
use std::collections::BTreeMap;

#[test]
fn scan_and_sum_over_four_ranks() {
    let results = run_ranks(4, |comm| {
        let value = comm.rank() + 1;
        let offset = comm.exclusive_scan_sum(CommTag::COARSE_OFFSET, value).unwrap();
        let total = comm.all_reduce_sum(CommTag::FACE_TOTAL, value).unwrap();
        (offset, total)
    });
    assert_eq!(results, vec![(0, 10), (1, 10), (3, 10), (6, 10)]);
}

#[test]
fn ring_exchange_delivers_one_buffer_per_source() {
    let size = 5;
    let results = run_ranks(size, |comm| {
        let rank = comm.rank();
        let left = (rank + size - 1) % size;
        let right = (rank + 1) % size;
        let mut outgoing = BTreeMap::new();
        outgoing.insert(left, vec![rank as u8, 0]);
        outgoing.insert(right, vec![rank as u8, 1]);
        comm.exchange(CommTag::ENTITY_CONTRIBUTIONS, &outgoing, &[left, right])
            .unwrap()
    });

    for (rank, received) in results.iter().enumerate() {
        let left = (rank + size - 1) % size;
        let right = (rank + 1) % size;
        assert_eq!(received.len(), 2);
        // The left neighbour sent to its right, and vice versa
        assert_eq!(received[&left], vec![left as u8, 1]);
        assert_eq!(received[&right], vec![right as u8, 0]);
    }
}

#[test]
fn messages_are_matched_by_tag() {
    let results = run_ranks(2, |comm| {
        if comm.rank() == 0 {
            let send = |tag, payload: Vec<u8>| {
                let mut outgoing = BTreeMap::new();
                outgoing.insert(1, payload);
                comm.exchange(tag, &outgoing, &[]).unwrap();
            };
            send(CommTag::SCHUR_RHS, vec![1]);
            send(CommTag::SCHUR_FACE, vec![2]);
            send(CommTag::SCHUR_RHS, vec![3]);
            Vec::new()
        } else {
            let no_outgoing = BTreeMap::new();
            let receive = |tag| comm.exchange(tag, &no_outgoing, &[0]).unwrap().remove(&0).unwrap();
            vec![
                receive(CommTag::SCHUR_FACE),
                receive(CommTag::SCHUR_RHS),
                receive(CommTag::SCHUR_RHS),
            ]
        }
    });
    assert_eq!(results[1], vec![vec![2], vec![1], vec![3]]);
}

#[test]
fn empty_buffers_are_delivered() {
    let results = run_ranks(2, |comm| {
        let peer = 1 - comm.rank();
        let mut outgoing = BTreeMap::new();
        outgoing.insert(peer, Vec::new());
        comm.exchange(CommTag::FACE_NUMBERING, &outgoing, &[peer]).unwrap()
    });
    for received in results {
        assert_eq!(received.len(), 1);
        assert!(received.values().all(|buffer| buffer.is_empty()));
    }
}
