use eframe::egui::{self, Vec2};

use crate::session::{Lane, Session};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ButtonStates {
    pub undo: bool,
    pub redo: bool,
    pub reset: bool,
}

/// Which sections of the window are shown, derived from the session.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ViewState {
    pub preview_visible: bool,
    pub processed_visible: bool,
    pub controls_visible: bool,
    pub background_visible: bool,
    pub history_visible: bool,
    pub processing: bool,
    pub buttons: ButtonStates,
}

impl ViewState {
    pub fn from_session(session: &Session) -> Self {
        let backgrounds = session.backgrounds();
        let has_foreground = session.foreground().is_some();
        Self {
            preview_visible: session.preview().is_some() || has_foreground,
            processed_visible: session.result().is_some(),
            controls_visible: has_foreground,
            background_visible: has_foreground && backgrounds.current().is_some(),
            history_visible: !session.history().is_empty(),
            processing: session.is_waiting(Lane::Foreground),
            buttons: ButtonStates {
                undo: backgrounds.can_undo(),
                redo: backgrounds.can_redo(),
                reset: backgrounds.can_reset(),
            },
        }
    }
}

pub fn fit_within(image_size: Vec2, available: Vec2) -> (Vec2, f32) {
    let safe_size = egui::vec2(image_size.x.max(1.0), image_size.y.max(1.0));
    let scale = (available.x / safe_size.x)
        .min(available.y / safe_size.y)
        .max(0.01);
    (safe_size * scale, scale)
}
