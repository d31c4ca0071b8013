use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};

use super::styling::{bright, bright_green, bright_red, bright_yellow};

/// Progress tracking for the phases of one run
pub struct RunProgress {
    pb: ProgressBar,
    visible: bool,
}

impl RunProgress {
    pub fn start_phase_1(visible: bool) -> Self {
        if visible {
            eprintln!("{}  {}", bright("⚙️"), bright("Phases").underlined());
        }
        let pb = create_spinner(
            bright_yellow("Phase 1/2: Checking change history and targeting").to_string(),
            visible,
        );
        Self { pb, visible }
    }

    pub fn finish_phase_1_start_phase_2(self, live_count: usize) -> Self {
        self.pb.finish_with_message(
            bright_green(format!(
                "Phase 1/2: Found {live_count} experiments live to real users ✓"
            ))
            .to_string(),
        );
        let pb = create_spinner(
            bright_yellow("Phase 2/2: Delivering report").to_string(),
            self.visible,
        );
        Self {
            pb,
            visible: self.visible,
        }
    }

    pub fn finish_phase_2(self) {
        self.pb
            .finish_with_message(bright_green("Phase 2/2: Report delivered ✓").to_string());
        if self.visible {
            eprintln!();
        }
    }

    pub fn abandon(self, reason: &str) {
        self.pb
            .abandon_with_message(bright_red(format!("{reason} ✗")).to_string());
    }
}

fn create_spinner(message: String, visible: bool) -> ProgressBar {
    if !visible {
        return ProgressBar::hidden();
    }

    let pb = ProgressBar::new_spinner();
    pb.set_draw_target(ProgressDrawTarget::stderr());
    if let Ok(style) = ProgressStyle::default_spinner().template("  {msg} {spinner}") {
        pb.set_style(style);
    }
    pb.set_message(message);
    pb.enable_steady_tick(std::time::Duration::from_millis(100));
    pb
}
