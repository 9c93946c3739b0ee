// src/ledger.rs
//
// Running totals of confirmed crossings. Append-only: counters are only
// ever incremented, matching the physical events they record.

use std::collections::{BTreeMap, HashMap};

use serde::Serialize;

use crate::crossing::{CrossingEvent, Direction};
use crate::types::class_name;

#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct ClassCounts {
    pub in_count: u64,
    pub out_count: u64,
}

impl ClassCounts {
    pub fn total(&self) -> u64 {
        self.in_count + self.out_count
    }
}

#[derive(Debug, Default)]
pub struct CountingLedger {
    total_in: u64,
    total_out: u64,
    per_class: HashMap<u32, ClassCounts>,
}

impl CountingLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn apply(&mut self, event: &CrossingEvent) {
        let class = self.per_class.entry(event.class_id).or_default();
        match event.direction {
            Direction::In => {
                self.total_in += 1;
                class.in_count += 1;
            }
            Direction::Out => {
                self.total_out += 1;
                class.out_count += 1;
            }
        }
    }

    pub fn total_in(&self) -> u64 {
        self.total_in
    }

    pub fn total_out(&self) -> u64 {
        self.total_out
    }

    /// Immutable copy for reporting, mid-run or at completion.
    pub fn snapshot(&self) -> LedgerView {
        let mut by_class = BTreeMap::new();
        for (class_id, counts) in &self.per_class {
            let name = class_name(*class_id)
                .map(str::to_string)
                .unwrap_or_else(|| format!("class_{}", class_id));
            by_class.insert(
                name,
                ClassView {
                    in_count: counts.in_count,
                    out_count: counts.out_count,
                    total: counts.total(),
                },
            );
        }
        LedgerView {
            total_in: self.total_in,
            total_out: self.total_out,
            total: self.total_in + self.total_out,
            by_class,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ClassView {
    #[serde(rename = "in")]
    pub in_count: u64,
    #[serde(rename = "out")]
    pub out_count: u64,
    pub total: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct LedgerView {
    pub total_in: u64,
    pub total_out: u64,
    pub total: u64,
    pub by_class: BTreeMap<String, ClassView>,
}
