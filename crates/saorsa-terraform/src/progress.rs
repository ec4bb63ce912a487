use colored::Colorize;
use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};
use saorsa_cloud::ApplyAction;
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;
use tokio::time::Instant;

pub const SPINNER_FRAMES: [&str; 10] = ["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"];

/// Lifecycle of one unit in the live display
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitStatus {
    Pending,
    Running,
    Done,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnitState {
    pub status: UnitStatus,
    pub started: Option<Instant>,
    pub finished: Option<Instant>,
}

impl UnitState {
    pub fn pending() -> Self {
        Self {
            status: UnitStatus::Pending,
            started: None,
            finished: None,
        }
    }

    pub fn start(&mut self, now: Instant) {
        self.status = UnitStatus::Running;
        self.started = Some(now);
    }

    pub fn finish(&mut self, success: bool, now: Instant) {
        self.status = if success {
            UnitStatus::Done
        } else {
            UnitStatus::Failed
        };
        self.finished = Some(now);
    }

    pub fn elapsed(&self, now: Instant) -> Option<Duration> {
        let started = self.started?;
        Some(self.finished.unwrap_or(now).saturating_duration_since(started))
    }
}

/// `m:ss`
pub fn format_elapsed(elapsed: Duration) -> String {
    let secs = elapsed.as_secs();
    format!("{}:{:02}", secs / 60, secs % 60)
}

pub fn spinner_frame(tick: usize) -> &'static str {
    SPINNER_FRAMES[tick % SPINNER_FRAMES.len()]
}

/// Status column text for one unit
pub fn status_text(state: &UnitState, action: ApplyAction, tick: usize, now: Instant) -> String {
    let elapsed = state.elapsed(now).map(format_elapsed).unwrap_or_default();
    match state.status {
        UnitStatus::Pending => "pending".dimmed().to_string(),
        UnitStatus::Running => format!(
            "{} {}",
            format!("{} {}", spinner_frame(tick), action.progress_verb()).yellow(),
            elapsed
        ),
        UnitStatus::Done => format!("{} {}", "done".green(), elapsed),
        UnitStatus::Failed => format!("{} {}", "FAILED".red(), elapsed),
    }
}

/// One line per unit, redrawn on every tick
pub struct StatusBoard {
    lines: BTreeMap<String, ProgressBar>,
    action: ApplyAction,
}

impl StatusBoard {
    pub fn new<'a>(keys: impl IntoIterator<Item = &'a str>, action: ApplyAction, visible: bool) -> Self {
        let multi = if visible {
            MultiProgress::new()
        } else {
            MultiProgress::with_draw_target(ProgressDrawTarget::hidden())
        };
        let style = ProgressStyle::with_template("  {prefix:<24} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner());

        let mut keys: Vec<&str> = keys.into_iter().collect();
        keys.sort_unstable();

        let lines = keys
            .into_iter()
            .map(|key| {
                let line = multi.add(ProgressBar::new_spinner());
                line.set_style(style.clone());
                line.set_prefix(key.to_string());
                line.set_message("pending".dimmed().to_string());
                (key.to_string(), line)
            })
            .collect();

        Self { lines, action }
    }

    pub fn render(&self, states: &HashMap<String, UnitState>, tick: usize) {
        let now = Instant::now();
        for (key, line) in &self.lines {
            if let Some(state) = states.get(key) {
                line.set_message(status_text(state, self.action, tick, now));
            }
        }
    }

    /// Leave the final state on screen
    pub fn finish(&self, states: &HashMap<String, UnitState>, tick: usize) {
        self.render(states, tick);
        for line in self.lines.values() {
            line.finish();
        }
    }
}
