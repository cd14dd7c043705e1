//! Local extrema of a numeric sequence.
//!
//! Both scans walk the sequence with a three-state direction tracker and an
//! absolute tolerance of [`TOLERANCE`]. Entries below the tolerance are
//! treated as empty and skipped: the next informative entry is compared
//! against the last informative one.

/// Absolute tolerance for "changed" and "empty".
pub const TOLERANCE: f64 = 1e-6;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    Flat,
    Rising,
    Falling,
}

impl Direction {
    fn step(prev: f64, cur: f64) -> Direction {
        if cur > prev + TOLERANCE {
            Direction::Rising
        } else if cur < prev - TOLERANCE {
            Direction::Falling
        } else {
            Direction::Flat
        }
    }
}

/// Indices of the local extrema of `values`, anchored by the first and last index.
///
/// A direction reversal at index `i` emits `i - 1`. A strictly monotonic
/// sequence therefore yields just `[0, n - 1]`.
pub fn find_extrema(values: &[f64]) -> Vec<usize> {
    let n = values.len();
    if n == 0 {
        return Vec::new();
    }
    let mut res = vec![0];
    let mut status = Direction::Flat;
    let mut k = 0;
    for i in 1..n {
        if values[i] < TOLERANCE {
            continue;
        }
        match (status, Direction::step(values[k], values[i])) {
            (Direction::Rising, Direction::Falling) | (Direction::Falling, Direction::Rising) => {
                res.push(i - 1);
                status = Direction::step(values[k], values[i]);
            }
            (Direction::Flat, d) if d != Direction::Flat => status = d,
            _ => {}
        }
        k = i;
    }
    res.push(n - 1);
    res
}

/// Positions where `values` turns around, without the anchors.
///
/// Each entry is the index where the plateau that forms the peak or valley
/// last changed value, so for `[1, 3, 3, 1]` the peak is reported at 1.
pub fn find_peaks(values: &[f64]) -> Vec<usize> {
    let mut res = Vec::new();
    let mut status = Direction::Flat;
    let mut k = 0;
    let mut extremum = 0;
    for i in 1..values.len() {
        if values[i] < TOLERANCE {
            continue;
        }
        let step = Direction::step(values[k], values[i]);
        match (status, step) {
            (Direction::Rising, Direction::Falling) | (Direction::Falling, Direction::Rising) => {
                res.push(extremum);
                status = step;
            }
            (Direction::Flat, d) if d != Direction::Flat => status = d,
            _ => {}
        }
        if step != Direction::Flat {
            extremum = i;
        }
        k = i;
    }
    res
}
