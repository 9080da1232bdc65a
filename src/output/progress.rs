use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};

use super::styling::{bright, bright_green, bright_yellow};

/// Progress tracking for multi-phase operations
pub struct PhaseProgress {
    pb: ProgressBar,
    phase: usize,
    total: usize,
    label: String,
}

impl PhaseProgress {
    pub fn start(total: usize, label: &str) -> Self {
        eprintln!("{}  {}", bright("⚙️"), bright("Phases").underlined());
        let pb = create_spinner(bright_yellow(format!("Phase 1/{total}: {label}")).to_string());
        Self {
            pb,
            phase: 1,
            total,
            label: label.to_string(),
        }
    }

    #[must_use]
    pub fn next(self, label: &str) -> Self {
        self.finish_current();
        let phase = self.phase + 1;
        let pb = create_spinner(
            bright_yellow(format!("Phase {phase}/{}: {label}", self.total)).to_string(),
        );
        Self {
            pb,
            phase,
            total: self.total,
            label: label.to_string(),
        }
    }

    pub fn finish(self) {
        self.finish_current();
        eprintln!();
    }

    fn finish_current(&self) {
        self.pb.finish_with_message(
            bright_green(format!("Phase {}/{}: {} ✓", self.phase, self.total, self.label))
                .to_string(),
        );
    }
}

fn create_spinner(message: String) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_draw_target(ProgressDrawTarget::stderr());
    if let Ok(style) = ProgressStyle::default_spinner().template("  {msg} {spinner}") {
        pb.set_style(style);
    }
    pb.set_message(message);
    pb.enable_steady_tick(std::time::Duration::from_millis(100));
    pb
}
