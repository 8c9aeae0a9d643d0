use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use std::sync::Arc;
use std::time::Duration;

use domain::{MigrationStatus, StepStatus};
use orchestrator::{ProgressCallback, ProgressUpdate};

/// Spinner flavours for the short interactive steps
#[derive(Debug, Clone, Copy)]
pub enum ProgressType {
    /// Local work such as planning
    Fast,
    /// Suggestion calls that may hit a remote model
    Suggest,
}

impl ProgressType {
    fn tick_chars(self) -> &'static str {
        match self {
            ProgressType::Fast => "⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏",
            ProgressType::Suggest => "⠋⠙⠚⠞⠖⠦⠴⠲⠳⠓",
        }
    }

    fn tick_interval(self) -> Duration {
        match self {
            ProgressType::Fast => Duration::from_millis(80),
            ProgressType::Suggest => Duration::from_millis(120),
        }
    }

    pub fn create_spinner(self, message: &str) -> Spinner {
        let spinner = ProgressBar::new_spinner();
        let style = ProgressStyle::default_spinner()
            .tick_chars(self.tick_chars())
            .template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner());
        spinner.set_style(style);
        spinner.set_message(message.to_string());
        spinner.enable_steady_tick(self.tick_interval());
        Spinner { spinner }
    }
}

pub struct Spinner {
    spinner: ProgressBar,
}

impl Spinner {
    pub fn set_message(&self, message: &str) {
        self.spinner.set_message(message.to_string());
    }

    pub fn finish_success(&self, message: &str) {
        self.spinner.finish_with_message(format!("✓ {message}").green().to_string());
    }

    pub fn finish_error(&self, message: &str) {
        self.spinner.finish_with_message(format!("✗ {message}").red().to_string());
    }
}

/// Overall-progress bar fed by orchestrator updates
#[derive(Clone)]
pub struct MigrationProgressBar {
    bar: ProgressBar,
}

impl MigrationProgressBar {
    pub fn new() -> Self {
        let bar = ProgressBar::new(100);
        let style = ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos:>3}% {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=>-");
        bar.set_style(style);
        bar.enable_steady_tick(Duration::from_millis(120));
        Self { bar }
    }

    pub fn apply(&self, update: &ProgressUpdate) {
        // overall progress never decreases, the bar follows it
        self.bar.set_position(update.overall_progress.round().clamp(0.0, 100.0) as u64);
        self.bar.set_message(stage_message(update));
    }

    pub fn callback(&self) -> ProgressCallback {
        let bar = self.clone();
        Arc::new(move |update: &ProgressUpdate| bar.apply(update))
    }

    pub fn finish(&self, status: MigrationStatus) {
        let message = match status {
            MigrationStatus::Completed => "✓ migration completed".green().to_string(),
            other => format!("✗ migration {other}").red().to_string(),
        };
        self.bar.finish_with_message(message);
    }

    pub fn position(&self) -> u64 {
        self.bar.position()
    }
}

impl Default for MigrationProgressBar {
    fn default() -> Self {
        Self::new()
    }
}

fn stage_message(update: &ProgressUpdate) -> String {
    let progress = &update.progress;
    match (update.stage, update.step_status) {
        (Some(stage), Some(StepStatus::Failed)) => format!("{stage} failed").red().to_string(),
        (Some(stage), Some(status)) => format!(
            "{stage} {status} ({}/{} ok, {} failed)",
            progress.completed, progress.total, progress.failed
        ),
        _ => format!("{}/{} ok", progress.completed, progress.total),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::{MigrationProgress, StageKind};
    use uuid::Uuid;

    fn update(stage: Option<StageKind>, step_status: Option<StepStatus>, overall: f64) -> ProgressUpdate {
        let mut progress = MigrationProgress::new(10);
        progress.record_success().expect("capacity");
        ProgressUpdate {
            plan_id: Uuid::new_v4(),
            stage,
            step_status,
            step_progress: 0,
            overall_progress: overall,
            progress,
            timestamp: Default::default(),
        }
    }

    #[test]
    fn test_bar_tracks_overall_progress() {
        let bar = MigrationProgressBar::new();
        let callback = bar.callback();

        callback(&update(None, None, 33.4));
        assert_eq!(bar.position(), 33);

        callback(&update(None, None, 100.0));
        assert_eq!(bar.position(), 100);
    }

    #[test]
    fn test_stage_message_shows_counts() {
        let message = stage_message(&update(Some(StageKind::Products), Some(StepStatus::Running), 50.0));
        assert!(message.contains("products running"));
        assert!(message.contains("1/10 ok"));
    }
}
