// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Per-pass outcome reporting

use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BindingOutcome {
    /// Provider ran and the status holds its versions; `updated` entries changed
    Succeeded { updated: usize },
    /// Not processed this pass, retried on the next
    Skipped { reason: String },
    Failed { error: String },
    TimedOut,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindingReport {
    /// `namespace/name` of the binding
    pub binding: String,
    pub target_path: String,
    pub outcome: BindingOutcome,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchResult {
    pub reports: Vec<BindingReport>,
}

impl BatchResult {
    pub fn total(&self) -> usize {
        self.reports.len()
    }

    pub fn succeeded(&self) -> usize {
        self.count(|o| matches!(o, BindingOutcome::Succeeded { .. }))
    }

    pub fn skipped(&self) -> usize {
        self.count(|o| matches!(o, BindingOutcome::Skipped { .. }))
    }

    pub fn failed(&self) -> usize {
        self.count(|o| matches!(o, BindingOutcome::Failed { .. }))
    }

    pub fn timed_out(&self) -> usize {
        self.count(|o| matches!(o, BindingOutcome::TimedOut))
    }

    pub fn outcome(&self, binding: &str) -> Option<&BindingOutcome> {
        self.reports
            .iter()
            .find(|r| r.binding == binding)
            .map(|r| &r.outcome)
    }

    fn count(&self, pred: impl Fn(&BindingOutcome) -> bool) -> usize {
        self.reports.iter().filter(|r| pred(&r.outcome)).count()
    }
}

impl fmt::Display for BatchResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} bindings: {} succeeded, {} skipped, {} failed, {} timed out",
            self.total(),
            self.succeeded(),
            self.skipped(),
            self.failed(),
            self.timed_out()
        )
    }
}
