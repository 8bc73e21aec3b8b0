//! OpenMP parallel-region attribution.
//!
//! On `parallel_begin` a team array of thread-sample handles is allocated,
//! sized to `requested_parallelism`; each worker registers itself at its
//! team index as it enters the parallel function. On `parallel_end` the
//! team's `not_useful_omp_in` timers are split into a **scheduling** share
//! (`min × team_size`) and a **load-imbalance** share
//! (`Σ(sample − min)`), the only values the event contributes to open
//! regions.
//!
//! The level-1 array is reused across the process — resized, not
//! reallocated, on repeated nesting-depth-1 parallel regions. Deeper
//! levels allocate a fresh array every time, matching the original's
//! malloc-per-nested-level behaviour.

use crate::sample::ThreadSample;
use std::sync::{Arc, Mutex};

/// A live parallel team's thread-sample slots.
pub enum TeamArray {
    /// The process-wide, reused depth-1 array.
    Level1,
    /// A freshly allocated array for a nested (depth > 1) parallel region.
    Nested(Arc<Mutex<Vec<Option<Arc<ThreadSample>>>>>),
}

/// Result of a parallel-region-end attribution, ready to fold into every
/// open region.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ParallelAttributionResult {
    /// `min(not_useful_omp_in) × team_size`, ns.
    pub sched_time: i64,
    /// `Σ(not_useful_omp_in − min)`, ns.
    pub lb_time: i64,
    /// Number of team members that contributed a sample.
    pub team_size: u32,
}

/// Process-wide OpenMP parallel-attribution state: just the reused
/// level-1 array. Nested arrays are owned by their [`TeamArray::Nested`]
/// handle and dropped with it.
#[derive(Default)]
pub struct ParallelAttribution {
    level1_team: Mutex<Vec<Option<Arc<ThreadSample>>>>,
}

impl ParallelAttribution {
    /// A fresh attribution tracker with no level-1 team allocated yet.
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate (or, at level 1, resize the reused) team array for a new
    /// parallel region.
    pub fn parallel_begin(&self, level: u32, requested_parallelism: u32) -> TeamArray {
        if level <= 1 {
            let mut team = self.level1_team.lock().unwrap();
            team.clear();
            team.resize_with(requested_parallelism as usize, || None);
            TeamArray::Level1
        } else {
            TeamArray::Nested(Arc::new(Mutex::new(vec![None; requested_parallelism as usize])))
        }
    }

    /// Register the calling worker thread's sample into the team array at
    /// `index`. A no-op if `index` is out of range for the team (a
    /// misbehaving runtime reporting more workers than requested).
    pub fn register_member(&self, team: &TeamArray, index: usize, sample: Arc<ThreadSample>) {
        let mut guard = match team {
            TeamArray::Level1 => self.level1_team.lock().unwrap(),
            TeamArray::Nested(arr) => arr.lock().unwrap(),
        };
        if let Some(slot) = guard.get_mut(index) {
            *slot = Some(sample);
        }
    }

    /// Compute the scheduling/load-imbalance split across every registered
    /// team member, draining each member's `not_useful_omp_in` timer in
    /// the process. Members that never registered (array slots left
    /// `None`) are excluded from the split.
    pub fn parallel_end(&self, team: &TeamArray) -> ParallelAttributionResult {
        let members: Vec<Arc<ThreadSample>> = match team {
            TeamArray::Level1 => self
                .level1_team
                .lock()
                .unwrap()
                .iter()
                .filter_map(|slot| slot.clone())
                .collect(),
            TeamArray::Nested(arr) => arr
                .lock()
                .unwrap()
                .iter()
                .filter_map(|slot| slot.clone())
                .collect(),
        };

        if members.is_empty() {
            return ParallelAttributionResult::default();
        }

        let values: Vec<i64> = members.iter().map(|s| s.not_useful_omp_in_time()).collect();
        let min = values.iter().copied().min().unwrap_or(0);
        let team_size = members.len() as i64;

        let sched_time = min * team_size;
        let lb_time: i64 = values.iter().map(|v| v - min).sum();

        for member in &members {
            member.drain_not_useful_omp_in();
        }

        ParallelAttributionResult {
            sched_time,
            lb_time,
            team_size: members.len() as u32,
        }
    }
}
