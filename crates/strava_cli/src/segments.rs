//! Segment usage tallying for the `segments` subcommand.

use std::collections::HashMap;
use std::fmt;
use strava_client::Segment;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SegmentUsage {
    pub id: u64,
    pub name: String,
    pub attempts: u32,
}

impl fmt::Display for SegmentUsage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: \"{}\" https://www.strava.com/segments/{}",
            self.attempts, self.name, self.id
        )
    }
}

#[derive(Default)]
pub struct SegmentTally {
    counts: HashMap<u64, SegmentUsage>,
    activities_seen: u32,
}

impl SegmentTally {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, segment: &Segment) {
        self.counts
            .entry(segment.id)
            .or_insert_with(|| SegmentUsage {
                id: segment.id,
                name: segment.name.clone(),
                attempts: 0,
            })
            .attempts += 1;
    }

    pub fn finish_activity(&mut self) {
        self.activities_seen += 1;
    }

    pub fn activities_seen(&self) -> u32 {
        self.activities_seen
    }

    /// Most-attempted first; ties break on segment id so the ordering is
    /// deterministic.
    pub fn ranked(&self) -> Vec<SegmentUsage> {
        let mut all: Vec<SegmentUsage> = self.counts.values().cloned().collect();
        all.sort_by(|a, b| b.attempts.cmp(&a.attempts).then(a.id.cmp(&b.id)));
        all
    }
}
