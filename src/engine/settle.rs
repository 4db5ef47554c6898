use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Deferred work keyed by paragraph position. Scheduling a key that is
/// already pending replaces the old task, so each key runs at most once per
/// settle point.
pub struct SettleQueue<T> {
    pending: BTreeMap<u32, T>,
}

impl<T> Default for SettleQueue<T> {
    fn default() -> Self {
        Self {
            pending: BTreeMap::new(),
        }
    }
}

impl<T> SettleQueue<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the task this one superseded, if any.
    pub fn schedule(&mut self, pos: u32, task: T) -> Option<T> {
        self.pending.insert(pos, task)
    }

    pub fn cancel(&mut self, pos: u32) -> Option<T> {
        self.pending.remove(&pos)
    }

    pub fn clear(&mut self) {
        self.pending.clear();
    }

    /// Take every pending task, in position order.
    pub fn drain(&mut self) -> Vec<(u32, T)> {
        std::mem::take(&mut self.pending).into_iter().collect()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

/// Inputs for positioning one list label.
#[derive(Clone, Debug, PartialEq)]
pub struct MarkerTask {
    pub text: String,
    pub font_size_pt: f32,
    pub font_family: Option<String>,
    pub indent_left_pt: f32,
    pub indent_hanging_pt: f32,
}

/// Where a list label and its tab separator sit, relative to the content box.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkerGeometry {
    pub pos: u32,
    pub marker_left_px: f32,
    pub marker_width_px: f32,
    pub separator_width_px: f32,
    pub text_left_px: f32,
}
