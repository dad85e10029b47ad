use crate::{color::Color, loader::ImageSource};

/// What is painted behind the cutout.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Background {
    Image(ImageSource),
    Color(Color),
}

impl Background {
    pub fn label(&self) -> String {
        match self {
            Self::Image(source) => source.key().into_owned(),
            Self::Color(color) => color.spec().to_string(),
        }
    }
}

/// Current background slot plus the undo and redo stacks.
///
/// Stacks hold whole slots, so "no background" is a state that undo and
/// redo can return to. Undo followed by redo always restores the slot.
#[derive(Clone, Debug, Default)]
pub struct BackgroundStack {
    current: Option<Background>,
    undo: Vec<Option<Background>>,
    redo: Vec<Option<Background>>,
}

impl BackgroundStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> Option<&Background> {
        self.current.as_ref()
    }

    pub fn undo_len(&self) -> usize {
        self.undo.len()
    }

    pub fn redo_len(&self) -> usize {
        self.redo.len()
    }

    pub fn can_undo(&self) -> bool {
        !self.undo.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo.is_empty()
    }

    pub fn can_reset(&self) -> bool {
        self.current.is_some()
    }

    /// Returns `false` when `background` is already current.
    pub fn set(&mut self, background: Background) -> bool {
        if self.current.as_ref() == Some(&background) {
            return false;
        }
        self.undo.push(self.current.take());
        self.redo.clear();
        self.current = Some(background);
        true
    }

    pub fn undo(&mut self) -> bool {
        let Some(prev) = self.undo.pop() else {
            return false;
        };
        self.redo.push(std::mem::replace(&mut self.current, prev));
        true
    }

    pub fn redo(&mut self) -> bool {
        let Some(next) = self.redo.pop() else {
            return false;
        };
        self.undo.push(std::mem::replace(&mut self.current, next));
        true
    }

    pub fn reset(&mut self) -> bool {
        if self.current.is_none() {
            return false;
        }
        self.undo.push(self.current.take());
        self.redo.clear();
        true
    }

    /// Drops the slot without recording an edit, as when a history entry
    /// is restored over the current composite.
    pub fn detach(&mut self) -> Option<Background> {
        self.current.take()
    }
}
