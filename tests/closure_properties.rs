//! Property tests for the group-over-group closure fixed point (§4.4 step
//! 4, §8). [`crate::planner::Stage::ClosureLoop`] is a thin descriptor;
//! its termination property — repeatedly inserting newly-reachable rows
//! converges to the transitive closure of the seed set, bounded by
//! `max_iterations` — is modeled here directly over a small in-memory
//! graph rather than through a live store.

use std::collections::{HashSet, VecDeque};

use proptest::prelude::*;

/// Mirrors the semantics of the `INSERT ... WHERE NOT EXISTS` loop the
/// planner emits: repeatedly grow `frontier` by following `edges` until an
/// iteration adds nothing, capped at `max_iterations`.
fn closure_fixed_point(edges: &[(u32, u32)], seeds: &[u32], max_iterations: usize) -> HashSet<u32> {
    let mut closed: HashSet<u32> = seeds.iter().copied().collect();
    for _ in 0..max_iterations {
        let mut inserted = 0;
        let additions: Vec<u32> = edges
            .iter()
            .filter(|(from, _)| closed.contains(from))
            .map(|(_, to)| *to)
            .filter(|to| !closed.contains(to))
            .collect();
        for node in additions {
            if closed.insert(node) {
                inserted += 1;
            }
        }
        if inserted == 0 {
            break;
        }
    }
    closed
}

/// Reference BFS reachability, used as the oracle.
fn bfs_reachable(edges: &[(u32, u32)], seeds: &[u32]) -> HashSet<u32> {
    let mut seen: HashSet<u32> = seeds.iter().copied().collect();
    let mut queue: VecDeque<u32> = seeds.iter().copied().collect();
    while let Some(node) = queue.pop_front() {
        for (from, to) in edges {
            if *from == node && seen.insert(*to) {
                queue.push_back(*to);
            }
        }
    }
    seen
}

proptest! {
    #[test]
    fn closure_matches_bfs_reachability_given_enough_iterations(
        edges in prop::collection::vec((0u32..20, 0u32..20), 0..40),
        seeds in prop::collection::vec(0u32..20, 0..5),
    ) {
        let closed = closure_fixed_point(&edges, &seeds, 64);
        let reachable = bfs_reachable(&edges, &seeds);
        prop_assert_eq!(closed, reachable);
    }

    #[test]
    fn closure_is_idempotent_once_reached(
        edges in prop::collection::vec((0u32..20, 0u32..20), 0..40),
        seeds in prop::collection::vec(0u32..20, 0..5),
    ) {
        let once = closure_fixed_point(&edges, &seeds, 64);
        let seeds_again: Vec<u32> = once.iter().copied().collect();
        let twice = closure_fixed_point(&edges, &seeds_again, 64);
        prop_assert_eq!(once, twice);
    }

    #[test]
    fn closure_never_drops_a_seed(
        edges in prop::collection::vec((0u32..20, 0u32..20), 0..40),
        seeds in prop::collection::vec(0u32..20, 0..5),
    ) {
        let closed = closure_fixed_point(&edges, &seeds, 64);
        for seed in &seeds {
            prop_assert!(closed.contains(seed));
        }
    }
}

#[test]
fn ceiling_of_zero_iterations_returns_only_the_seeds() {
    let edges = [(1, 2), (2, 3)];
    let closed = closure_fixed_point(&edges, &[1], 0);
    assert_eq!(closed, HashSet::from([1]));
}

#[test]
fn a_chain_longer_than_the_ceiling_is_not_fully_closed() {
    let edges = [(1, 2), (2, 3), (3, 4), (4, 5)];
    let closed = closure_fixed_point(&edges, &[1], 3);
    // Three iterations reach 1 -> 2 -> 3 -> 4, one short of 5.
    assert!(closed.contains(&4));
    assert!(!closed.contains(&5));
}
