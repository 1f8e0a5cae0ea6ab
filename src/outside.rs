use crossterm::event::{MouseEvent, MouseEventKind};
use ratatui::layout::{Position, Rect};

/// Detects pointer presses that land outside a region.
///
/// The listener starts attached and detaches after firing once; the owner
/// drops it when the region goes away.
#[derive(Debug)]
pub struct OutsideClick {
    region: Option<Rect>,
    attached: bool,
}

impl OutsideClick {
    pub fn attach() -> Self {
        Self {
            region: None,
            attached: true,
        }
    }

    pub fn set_region(&mut self, region: Rect) {
        self.region = Some(region);
    }

    pub fn detach(&mut self) {
        self.attached = false;
    }

    /// Runs `on_outside` for a button press outside the region. Returns whether it ran.
    pub fn handle<F: FnOnce()>(&mut self, event: &MouseEvent, on_outside: F) -> bool {
        if !self.attached || !matches!(event.kind, MouseEventKind::Down(_)) {
            return false;
        }
        let Some(region) = self.region else {
            return false;
        };
        if region.contains(Position::new(event.column, event.row)) {
            return false;
        }

        self.detach();
        on_outside();
        true
    }
}
