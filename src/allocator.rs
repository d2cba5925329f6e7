//! Ticket identifier allocation.
//!
//! An identifier is `IG18` followed by two base-36 pairs: the first comes
//! from the low bits of the clock, the second counts down from `ZZ` as more
//! tickets are issued. The allocator never records what it hands out; the
//! caller has to persist the id before the next allocation sees the set of
//! existing ids, which is why all allocations go through one worker (see
//! [`crate::store`]).

use std::{
    collections::HashSet,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
};

use chrono::Utc;
use thiserror::Error;

use crate::definitions::ticket_id::{TicketId, PAIR_SPACE};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AllocationError {
    #[error("ID-limit of {limit} reached")]
    CapacityExceeded { limit: usize },
    #[error("couldn't create unique ticket ID in {attempts} attempts")]
    Collision { attempts: u32 },
}

/// Source of the time-derived part of an identifier.
pub trait Clock: Send + Sync {
    fn now_nanos(&self) -> i64;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_nanos(&self) -> i64 {
        let now = Utc::now();
        now.timestamp_nanos_opt()
            .unwrap_or_else(|| i64::from(now.timestamp_subsec_nanos()))
    }
}

/// A clock that never moves.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub i64);

impl Clock for FixedClock {
    fn now_nanos(&self) -> i64 {
        self.0
    }
}

/// Replays the given readings in order, starting over once exhausted.
#[derive(Debug)]
pub struct SequenceClock {
    readings: Vec<i64>,
    next: AtomicUsize,
}

impl SequenceClock {
    pub fn new(readings: Vec<i64>) -> Self {
        Self {
            readings,
            next: AtomicUsize::new(0),
        }
    }
}

impl Clock for SequenceClock {
    fn now_nanos(&self) -> i64 {
        if self.readings.is_empty() {
            return 0;
        }
        let n = self.next.fetch_add(1, Ordering::Relaxed);
        self.readings[n % self.readings.len()]
    }
}

#[derive(Clone)]
pub struct IdAllocator {
    id_limit: usize,
    retry_budget: u32,
    clock: Arc<dyn Clock>,
}

impl IdAllocator {
    pub fn new(id_limit: usize, retry_budget: u32, clock: Arc<dyn Clock>) -> Self {
        Self {
            id_limit,
            retry_budget,
            clock,
        }
    }

    pub fn id_limit(&self) -> usize {
        self.id_limit
    }

    pub fn retry_budget(&self) -> u32 {
        self.retry_budget
    }

    /// Produces an id absent from `existing`, or fails without issuing one.
    ///
    /// `existing_count` drives both the capacity check and the positional
    /// pair; only the clock pair is resampled between attempts.
    pub fn allocate(
        &self,
        existing_count: usize,
        existing: &HashSet<TicketId>,
    ) -> Result<TicketId, AllocationError> {
        if existing_count >= self.id_limit {
            return Err(AllocationError::CapacityExceeded {
                limit: self.id_limit,
            });
        }

        let position = position_part(existing_count);
        for attempt in 1..=self.retry_budget {
            let candidate = TicketId::from_pairs(self.clock_part(), position);
            if !existing.contains(&candidate) {
                return Ok(candidate);
            }
            log::trace!("ticket id {candidate} taken (attempt {attempt})");
        }

        log::warn!(
            "no free ticket id after {} attempts at position {position}",
            self.retry_budget
        );
        Err(AllocationError::Collision {
            attempts: self.retry_budget,
        })
    }

    fn clock_part(&self) -> usize {
        self.clock.now_nanos().rem_euclid(PAIR_SPACE as i64) as usize
    }
}

/// Descending slot for the next issue: `ZZ` for the first ticket, then `ZY`...
fn position_part(existing_count: usize) -> usize {
    PAIR_SPACE - (existing_count % PAIR_SPACE) - 1
}

impl std::fmt::Debug for IdAllocator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdAllocator")
            .field("id_limit", &self.id_limit)
            .field("retry_budget", &self.retry_budget)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use crate::definitions::ticket_id::is_valid_id;

    use super::*;

    fn allocator(limit: usize, clock: impl Clock + 'static) -> IdAllocator {
        IdAllocator::new(limit, 3, Arc::new(clock))
    }

    #[test]
    fn test_first_ids_count_down_from_zz() {
        let allocator = allocator(10, FixedClock(0));
        let mut existing = HashSet::new();
        let first = allocator.allocate(0, &existing).unwrap();
        assert_eq!(first.as_str(), "IG1800ZZ");
        existing.insert(first);
        let second = allocator.allocate(1, &existing).unwrap();
        assert_eq!(second.as_str(), "IG1800ZY");
    }

    #[test]
    fn test_clock_pair_uses_low_bits() {
        let wrapped = allocator(10, FixedClock(PAIR_SPACE as i64 * 7 + 37));
        let id = wrapped.allocate(0, &HashSet::new()).unwrap();
        assert_eq!(id.as_str(), "IG1811ZZ");

        let negative = allocator(10, FixedClock(-5));
        assert!(is_valid_id(negative.allocate(0, &HashSet::new()).unwrap().as_str()));
    }

    #[test]
    fn test_capacity_is_checked_before_anything_else() {
        let allocator = allocator(2, FixedClock(0));
        assert!(allocator.allocate(1, &HashSet::new()).is_ok());
        assert_eq!(
            allocator.allocate(2, &HashSet::new()),
            Err(AllocationError::CapacityExceeded { limit: 2 })
        );
        assert_eq!(
            allocator.allocate(3, &HashSet::new()),
            Err(AllocationError::CapacityExceeded { limit: 2 })
        );
    }

    #[test]
    fn test_collision_exhausts_retry_budget() {
        let allocator = allocator(10, FixedClock(0));
        let existing = HashSet::from([TicketId::from_pairs(0, position_part(1))]);
        assert_eq!(
            allocator.allocate(1, &existing),
            Err(AllocationError::Collision { attempts: 3 })
        );
    }

    #[test]
    fn test_collision_resamples_clock() {
        let clock = SequenceClock::new(vec![0, 0, 1]);
        let allocator = allocator(10, clock);
        let existing = HashSet::from([TicketId::from_pairs(0, position_part(1))]);
        let id = allocator.allocate(1, &existing).unwrap();
        assert_eq!(id, TicketId::from_pairs(1, position_part(1)));
    }

    #[test]
    fn test_frozen_clock_still_yields_unique_ids_up_to_limit() {
        let limit = 1000;
        let allocator = allocator(limit, FixedClock(42));
        let mut existing = HashSet::new();
        for count in 0..limit {
            let id = allocator.allocate(count, &existing).unwrap();
            assert!(existing.insert(id), "duplicate at {count}");
        }
        assert!(matches!(
            allocator.allocate(limit, &existing),
            Err(AllocationError::CapacityExceeded { .. })
        ));
    }

    proptest! {
        #[test]
        fn prop_sequential_issue_is_unique(readings in prop::collection::vec(any::<i64>(), 1..8), n in 1usize..400) {
            let allocator = IdAllocator::new(PAIR_SPACE, 3, Arc::new(SequenceClock::new(readings)));
            let mut existing = HashSet::new();
            for _ in 0..n {
                match allocator.allocate(existing.len(), &existing) {
                    Ok(id) => {
                        prop_assert!(is_valid_id(id.as_str()));
                        prop_assert!(existing.insert(id));
                    }
                    Err(AllocationError::Collision { .. }) => {}
                    Err(e) => prop_assert!(false, "unexpected {e}"),
                }
            }
        }
    }
}
