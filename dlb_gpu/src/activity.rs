//! GPU activity records and interval-merging helpers.
//!
//! A GPU plugin reports completed kernel launches and memory copies as
//! `(start_ns, end_ns)` pairs tagged by kind. The collector never trusts
//! these to arrive sorted or non-overlapping — concurrent streams routinely
//! produce overlapping kernel intervals — so every computation here starts
//! by sorting and merging.

/// What kind of GPU activity an [`ActivityRecord`] describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivityKind {
    /// A kernel launch.
    Kernel,
    /// A host/device or device/device memory copy.
    MemoryCopy,
}

/// One completed GPU activity interval, in monotonic nanoseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActivityRecord {
    /// Start timestamp, monotonic nanoseconds.
    pub start_ns: i64,
    /// End timestamp, monotonic nanoseconds.
    pub end_ns: i64,
    /// Which buffer this record belongs to.
    pub kind: ActivityKind,
}

impl ActivityRecord {
    /// Build a new record.
    pub fn new(start_ns: i64, end_ns: i64, kind: ActivityKind) -> Self {
        Self {
            start_ns,
            end_ns,
            kind,
        }
    }

    /// `false` if the interval is degenerate or inverted (`end <= start`).
    /// Such records are dropped before merging.
    pub fn is_valid(&self) -> bool {
        self.end_ns > self.start_ns
    }

    /// Duration in nanoseconds. Only meaningful for a valid record.
    pub fn duration_ns(&self) -> i64 {
        self.end_ns - self.start_ns
    }
}

/// Sort `intervals` by start and merge overlapping or touching ranges in
/// one pass. Input order is not preserved; the result is sorted and
/// disjoint.
pub fn merge_intervals(mut intervals: Vec<(i64, i64)>) -> Vec<(i64, i64)> {
    intervals.sort_unstable_by_key(|&(start, _)| start);
    let mut merged: Vec<(i64, i64)> = Vec::with_capacity(intervals.len());
    for (start, end) in intervals {
        match merged.last_mut() {
            Some((_, last_end)) if start <= *last_end => {
                *last_end = (*last_end).max(end);
            }
            _ => merged.push((start, end)),
        }
    }
    merged
}

/// Total duration covered by a set of merged, disjoint intervals.
pub fn total_duration(merged: &[(i64, i64)]) -> i64 {
    merged.iter().map(|(s, e)| e - s).sum()
}

/// Portion of each interval in `subject` not covered by any interval in
/// `cover`. Both slices must already be sorted by start and disjoint within
/// themselves (the output of [`merge_intervals`]); a two-pointer sweep
/// computing GPU memory-exclusive time.
pub fn exclusive_duration(subject: &[(i64, i64)], cover: &[(i64, i64)]) -> i64 {
    let mut total = 0i64;
    let mut cover_idx = 0usize;

    for &(mut cursor, end) in subject {
        while cursor < end {
            while cover_idx < cover.len() && cover[cover_idx].1 <= cursor {
                cover_idx += 1;
            }
            if cover_idx >= cover.len() || cover[cover_idx].0 >= end {
                total += end - cursor;
                break;
            }
            let (cov_start, cov_end) = cover[cover_idx];
            if cov_start > cursor {
                total += cov_start - cursor;
            }
            cursor = cov_end.max(cursor);
        }
    }
    total
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_interval_is_rejected() {
        let rec = ActivityRecord::new(200, 100, ActivityKind::Kernel);
        assert!(!rec.is_valid());
    }

    #[test]
    fn merge_combines_overlapping_ranges() {
        let merged = merge_intervals(vec![(0, 50), (40, 90), (200, 210)]);
        assert_eq!(merged, vec![(0, 90), (200, 210)]);
    }

    #[test]
    fn merge_combines_touching_ranges() {
        let merged = merge_intervals(vec![(0, 50), (50, 100)]);
        assert_eq!(merged, vec![(0, 100)]);
    }

    #[test]
    fn merge_keeps_disjoint_ranges_separate() {
        let merged = merge_intervals(vec![(0, 10), (20, 30)]);
        assert_eq!(merged, vec![(0, 10), (20, 30)]);
    }

    #[test]
    fn total_duration_sums_merged_spans() {
        let merged = merge_intervals(vec![(0, 50), (40, 90)]);
        assert_eq!(total_duration(&merged), 90);
    }

    #[test]
    fn spec_example_kernel_and_memcpy() {
        // kernel [100,200], memcpy [150,250] => kernel_time=100, memory_exclusive=50
        let kernel = merge_intervals(vec![(100, 200)]);
        let memcpy = merge_intervals(vec![(150, 250)]);
        assert_eq!(total_duration(&kernel), 100);
        assert_eq!(exclusive_duration(&memcpy, &kernel), 50);
    }

    #[test]
    fn exclusive_duration_of_fully_covered_interval_is_zero() {
        let cover = merge_intervals(vec![(0, 100)]);
        let subject = merge_intervals(vec![(10, 90)]);
        assert_eq!(exclusive_duration(&subject, &cover), 0);
    }

    #[test]
    fn exclusive_duration_of_disjoint_interval_is_full() {
        let cover = merge_intervals(vec![(0, 10)]);
        let subject = merge_intervals(vec![(100, 150)]);
        assert_eq!(exclusive_duration(&subject, &cover), 50);
    }
}
