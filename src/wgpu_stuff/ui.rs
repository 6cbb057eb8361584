//! User-facing readouts. The simulation only talks to [`UiAdapter`]; the
//! window title is the stock implementation.

use std::sync::Arc;
use std::time::{Duration, Instant};

use winit::window::Window;

use crate::config::RuntimeControls;

const TITLE_REFRESH: Duration = Duration::from_millis(250);

/// Timing readouts for one frame, already formatted.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FrameStats {
    pub physics: String,
    pub render: String,
    pub fps: Option<f64>,
}

pub trait UiAdapter {
    fn show_stats(&mut self, stats: FrameStats);
    fn show_controls(&mut self, controls: &RuntimeControls);
}

pub struct WindowTitleUi {
    window: Arc<Window>,
    base: String,
    stats: FrameStats,
    controls: Option<RuntimeControls>,
    last_refresh: Option<Instant>,
}

impl WindowTitleUi {
    pub fn new(window: Arc<Window>, base: impl Into<String>) -> Self {
        Self {
            window,
            base: base.into(),
            stats: FrameStats::default(),
            controls: None,
            last_refresh: None,
        }
    }

    fn refresh(&mut self) {
        self.last_refresh = Some(Instant::now());
        self.window
            .set_title(&compose_title(&self.base, &self.stats, self.controls.as_ref()));
    }
}

impl UiAdapter for WindowTitleUi {
    fn show_stats(&mut self, stats: FrameStats) {
        self.stats = stats;

        let due = self
            .last_refresh
            .map_or(true, |last| last.elapsed() >= TITLE_REFRESH);
        if due {
            self.refresh();
        }
    }

    fn show_controls(&mut self, controls: &RuntimeControls) {
        self.controls = Some(controls.clone());
        self.refresh();
    }
}

pub fn compose_title(base: &str, stats: &FrameStats, controls: Option<&RuntimeControls>) -> String {
    let mut title = base.to_owned();

    if let Some(controls) = controls {
        title.push_str(&format!(
            " | bodies {}/{} | restitution {:.1}",
            controls.body_count, controls.max_bodies, controls.restitution
        ));
    }

    title.push_str(&format!(" | physics {} | render {}", stats.physics, stats.render));
    if let Some(fps) = stats.fps {
        title.push_str(&format!(" ({fps:.0} fps)"));
    }

    title
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn title_lists_controls_and_timings() {
        let stats = FrameStats {
            physics: "120.3µs".into(),
            render: "1.25ms".into(),
            fps: Some(800.0),
        };
        let controls = RuntimeControls {
            body_count: 50,
            max_bodies: 512,
            restitution: 0.7,
        };

        assert_eq!(
            compose_title("nbody", &stats, Some(&controls)),
            "nbody | bodies 50/512 | restitution 0.7 | physics 120.3µs | render 1.25ms (800 fps)"
        );
    }

    #[test]
    fn title_without_timestamps_has_no_fps() {
        let stats = FrameStats {
            physics: "unsupported".into(),
            render: "unsupported".into(),
            fps: None,
        };

        let title = compose_title("nbody", &stats, None);
        assert_eq!(title, "nbody | physics unsupported | render unsupported");
    }
}
