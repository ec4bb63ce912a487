//! Parallel execution of apply/destroy units
//!
//! Units start in input order as pool slots free up. The coordinating loop
//! waits on two event sources at once: task completions and a display
//! ticker, so the live view keeps animating while every unit is busy.
//!
//! A failed unit never cancels its siblings. A panicking unit is reported as
//! a failed result for that unit.

use crate::progress::{StatusBoard, UnitState};
use crate::runner::ApplyRunner;
use colored::Colorize;
use futures_util::FutureExt;
use saorsa_cloud::{ApplyAction, ApplyConfiguration, ApplyResult, ResourceCounts};
use std::collections::{HashMap, VecDeque};
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::task::{Id, JoinError, JoinSet};
use tokio::time::{Instant, MissedTickBehavior};

pub const DEFAULT_MAX_CONCURRENT: usize = 5;
pub const DEFAULT_TICK: Duration = Duration::from_millis(250);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecutorOptions {
    /// Upper bound on units running at once
    pub max_concurrent: usize,

    /// Display refresh interval
    pub tick: Duration,

    /// Draw the live status board
    pub show_progress: bool,
}

impl Default for ExecutorOptions {
    fn default() -> Self {
        Self {
            max_concurrent: DEFAULT_MAX_CONCURRENT,
            tick: DEFAULT_TICK,
            show_progress: true,
        }
    }
}

type StatusMap = Arc<Mutex<HashMap<String, UnitState>>>;

fn lock(statuses: &StatusMap) -> MutexGuard<'_, HashMap<String, UnitState>> {
    statuses
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Runs many [`ApplyConfiguration`]s against one [`ApplyRunner`]
pub struct ParallelExecutor<R> {
    runner: Arc<R>,
    options: ExecutorOptions,
}

impl<R: ApplyRunner + 'static> ParallelExecutor<R> {
    pub fn new(runner: R) -> Self {
        Self::with_options(runner, ExecutorOptions::default())
    }

    pub fn with_options(runner: R, options: ExecutorOptions) -> Self {
        Self {
            runner: Arc::new(runner),
            options: ExecutorOptions {
                max_concurrent: options.max_concurrent.max(1),
                ..options
            },
        }
    }

    /// Run every unit and return exactly one result per input, in input
    /// order. Prints the combined resource summary and the full output of
    /// every failed unit when done.
    pub async fn run_all(
        &self,
        configs: Vec<ApplyConfiguration>,
        action: ApplyAction,
    ) -> Vec<ApplyResult> {
        let units = configs.clone();
        let statuses: StatusMap = Arc::new(Mutex::new(
            configs
                .iter()
                .map(|c| (c.key(), UnitState::pending()))
                .collect(),
        ));
        let keys: Vec<String> = configs.iter().map(ApplyConfiguration::key).collect();
        let board = StatusBoard::new(
            keys.iter().map(String::as_str),
            action,
            self.options.show_progress,
        );

        let mut queue: VecDeque<(usize, ApplyConfiguration)> =
            configs.into_iter().enumerate().collect();
        let mut slots: Vec<Option<ApplyResult>> = vec![None; units.len()];
        let mut tasks = JoinSet::new();
        let mut running: HashMap<Id, usize> = HashMap::new();

        let mut ticker = tokio::time::interval(self.options.tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut tick = 0usize;

        loop {
            while tasks.len() < self.options.max_concurrent {
                let Some((index, config)) = queue.pop_front() else {
                    break;
                };

                if let Some(state) = lock(&statuses).get_mut(&config.key()) {
                    state.start(Instant::now());
                }
                tracing::debug!("Starting {} for {}", action, config.key());

                let runner = self.runner.clone();
                let handle = tasks.spawn(async move {
                    AssertUnwindSafe(runner.run(&config, action))
                        .catch_unwind()
                        .await
                });
                running.insert(handle.id(), index);
            }

            if tasks.is_empty() {
                break;
            }

            tokio::select! {
                Some(joined) = tasks.join_next_with_id() => {
                    let Some((index, result)) = settle(joined, &mut running, &units, action) else {
                        continue;
                    };
                    let config = &units[index];

                    if let Some(state) = lock(&statuses).get_mut(&config.key()) {
                        state.finish(result.success, Instant::now());
                    }
                    tracing::debug!(
                        "{} for {} finished (success: {})",
                        action,
                        config.key(),
                        result.success
                    );
                    slots[index] = Some(result);
                    board.render(&lock(&statuses), tick);
                }
                _ = ticker.tick() => {
                    tick += 1;
                    board.render(&lock(&statuses), tick);
                }
            }
        }

        board.finish(&lock(&statuses), tick);

        let results: Vec<ApplyResult> = slots
            .into_iter()
            .zip(&units)
            .map(|(slot, config)| {
                slot.unwrap_or_else(|| ApplyResult::failure(config, "", "task did not complete"))
            })
            .collect();

        print_report(&results);
        results
    }
}

/// Map a finished task back to its unit and turn panics and join errors
/// into a failed result for that unit
fn settle(
    joined: Result<(Id, std::thread::Result<ApplyResult>), JoinError>,
    running: &mut HashMap<Id, usize>,
    units: &[ApplyConfiguration],
    action: ApplyAction,
) -> Option<(usize, ApplyResult)> {
    let id = match &joined {
        Ok((id, _)) => *id,
        Err(e) => e.id(),
    };
    let Some(index) = running.remove(&id) else {
        tracing::error!("finished task {} does not belong to any unit", id);
        return None;
    };
    let config = &units[index];

    let result = match joined {
        Ok((_, Ok(result))) => result,
        Ok((_, Err(panic))) => ApplyResult::failure(
            config,
            "",
            format!("{} task panicked: {}", action, panic_message(&*panic)),
        ),
        Err(e) => {
            tracing::error!("{} task for {} failed: {}", action, config.key(), e);
            ApplyResult::failure(config, "", format!("{} task failed: {}", action, e))
        }
    };
    Some((index, result))
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Added/changed/destroyed summed over successful units only
pub fn total_counts(results: &[ApplyResult]) -> ResourceCounts {
    results
        .iter()
        .filter(|r| r.success)
        .map(|r| r.counts)
        .sum()
}

/// Failure sections: a `FAILED: provider/region` header followed by the
/// unit's stderr and stdout
pub fn failure_report(results: &[ApplyResult]) -> Vec<String> {
    results
        .iter()
        .filter(|r| !r.success)
        .map(|r| {
            let mut section = format!("FAILED: {}", r.key());
            for stream in [&r.stderr, &r.stdout] {
                if !stream.is_empty() {
                    section.push('\n');
                    section.push_str(stream.trim_end());
                }
            }
            section
        })
        .collect()
}

fn print_report(results: &[ApplyResult]) {
    let totals = total_counts(results);
    println!();
    if !totals.is_empty() {
        println!("{}", format!("Resources: {}", totals).bold());
    }

    let failures = failure_report(results);
    if failures.is_empty() {
        return;
    }

    println!();
    for section in failures {
        let (header, body) = section.split_once('\n').unwrap_or((section.as_str(), ""));
        println!("{}", header.red().bold());
        if !body.is_empty() {
            println!("{}", body);
        }
        println!();
    }
}
