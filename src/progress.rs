//! Progress accumulator, ambient glue for human-facing status during a
//! run. Grounded directly on the teacher's `lib.rs::Progress`/`FetchResult`
//! pair, generalised from "pool add vs. link" to "newly fetched vs.
//! skipped-as-up-to-date".

use std::fmt::Display;
use std::ops::{Add, AddAssign};

use crate::fetch::FetchOutcome;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    new: usize,
    new_bytes: usize,
    reused: usize,
}

impl Progress {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn record(&mut self, outcome: &FetchOutcome) {
        if outcome.skipped {
            self.reused += 1;
        } else {
            self.new += 1;
            self.new_bytes += outcome.bytes_fetched;
        }
    }

    pub fn file_count(&self) -> usize {
        self.new + self.reused
    }
}

impl Add for Progress {
    type Output = Progress;

    fn add(self, rhs: Self) -> Self::Output {
        Progress {
            new: self.new + rhs.new,
            new_bytes: self.new_bytes + rhs.new_bytes,
            reused: self.reused + rhs.reused,
        }
    }
}

impl AddAssign for Progress {
    fn add_assign(&mut self, rhs: Self) {
        self.new += rhs.new;
        self.new_bytes += rhs.new_bytes;
        self.reused += rhs.reused;
    }
}

impl Display for Progress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let total = self.file_count();
        let percent = if total == 0 {
            100f64
        } else {
            self.reused as f64 * 100f64 / total as f64
        };

        f.write_fmt(format_args!(
            "{} new files ({}b), re-used {} existing files ({:.2}% re-used)..",
            self.new, self.new_bytes, self.reused, percent
        ))
    }
}
