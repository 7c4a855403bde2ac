//! Time-sliced expansion phase
//!
//! Expansion is CPU-bound and runs on the task driving the pipeline, so it is
//! cut into ticks. Each tick expands records in order until its budget is
//! spent, then yields until the next tick. At least one record is expanded
//! per tick so a budget smaller than a single expansion still makes progress.

use crate::clock::Clock;
use crate::config::ConfigError;
use crate::error::{PipelineError, Result};
use crate::record::FileExpansionRecord;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{instrument, trace};

/// Counters describing a finished expansion phase
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ExpansionStats {
    /// Ticks taken to expand every record
    pub ticks: u64,
    /// Records expanded
    pub expanded: usize,
}

impl std::fmt::Display for ExpansionStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let plural = |n: u64, word: &str| {
            if n == 1 {
                format!("{} {}", n, word)
            } else {
                format!("{} {}s", n, word)
            }
        };
        write!(
            f,
            "{} in {}",
            plural(self.expanded as u64, "record"),
            plural(self.ticks, "tick")
        )
    }
}

/// Progress through the record list across ticks
#[derive(Debug, Default)]
pub struct ExpansionRun {
    cursor: usize,
    ticks: u64,
}

impl ExpansionRun {
    pub fn new() -> Self {
        Self::default()
    }

    /// Index of the next record to expand
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    pub fn stats(&self) -> ExpansionStats {
        ExpansionStats {
            ticks: self.ticks,
            expanded: self.cursor,
        }
    }
}

/// What a single tick achieved
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Records remain; wait for another tick
    Pending,
    /// Every record has a result
    Complete,
}

/// Drives expansion in budgeted ticks
#[derive(Debug, Clone)]
pub struct ExpansionScheduler {
    interval: Duration,
    budget: Duration,
    clock: Arc<dyn Clock>,
}

impl ExpansionScheduler {
    pub fn new(interval: Duration, budget: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            interval,
            budget,
            clock,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn budget(&self) -> Duration {
        self.budget
    }

    /// Expand every record, one budgeted tick at a time
    ///
    /// The first tick fires one interval after this is called.
    #[instrument(skip_all, fields(records = records.len()))]
    pub async fn run(
        &self,
        records: &mut [FileExpansionRecord],
        cancel: &CancellationToken,
    ) -> Result<ExpansionStats> {
        let mut run = ExpansionRun::new();
        if records.is_empty() {
            return Ok(run.stats());
        }
        if self.interval.is_zero() {
            return Err(PipelineError::InvalidConfig(ConfigError::Invalid {
                message: "tick interval must be greater than zero".to_string(),
            }));
        }

        let mut ticker = interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(PipelineError::Cancelled),
                _ = ticker.tick() => {}
            }

            if self.tick(&mut run, records, cancel)? == TickOutcome::Complete {
                return Ok(run.stats());
            }
        }
    }

    /// Run one tick synchronously
    pub fn tick(
        &self,
        run: &mut ExpansionRun,
        records: &mut [FileExpansionRecord],
        cancel: &CancellationToken,
    ) -> Result<TickOutcome> {
        run.ticks += 1;
        let start = self.clock.now();
        let deadline = start + self.budget;

        while run.cursor < records.len() {
            if cancel.is_cancelled() {
                return Err(PipelineError::Cancelled);
            }

            expand_record(&mut records[run.cursor])?;
            run.cursor += 1;

            if self.clock.now() >= deadline {
                break;
            }
        }

        trace!(
            tick = run.ticks,
            cursor = run.cursor,
            elapsed_us = (self.clock.now().saturating_sub(start)).as_micros() as u64,
            "expansion tick"
        );

        if run.cursor >= records.len() {
            Ok(TickOutcome::Complete)
        } else {
            Ok(TickOutcome::Pending)
        }
    }
}

fn expand_record(record: &mut FileExpansionRecord) -> Result<()> {
    if record.result().is_some() {
        return Ok(());
    }

    let text = match record.parsed() {
        Some(template) => template.expand(record.scope()),
        None => Err(stencil_templating::TemplatingError::render(format!(
            "template '{}' was never parsed",
            record.source()
        ))),
    }
    .map_err(|e| PipelineError::expansion_failed(record.destination(), e))?;

    record.set_result(text).map_err(|_| {
        PipelineError::expansion_failed(
            record.destination(),
            stencil_templating::TemplatingError::render("result was already stored"),
        )
    })
}
