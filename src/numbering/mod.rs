//! List counters, computed in document order.
//!
//! A counter value depends on every list item before it, so the store is
//! rebuilt from scratch for each full layout pass. Histories are kept per
//! `(numId, level)` and per `(abstractNumId, level)`: restart decisions look at
//! usage across every `numId` that shares an abstract definition.

mod definitions;
mod markers;

use std::collections::{BTreeMap, HashMap};
use std::ops::Bound;

pub use definitions::{AbstractNumbering, LevelDefinition, NumberingDefinitions, NumberingInstance};
pub use markers::{ListMarker, ListMarkers, assign_list_markers, format_number, render_label};

pub type NumId = u32;
pub type AbstractId = u32;

/// Counters in OOXML lists run 0..=8; anything deeper is clamped.
pub const MAX_LEVEL: u8 = 8;

const DEFAULT_START: u32 = 1;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StartSettings {
    pub start: u32,
    /// `None`: any shallower level used since this level's last item resets it.
    /// `Some(0)`: never reset, always continue from the previous item.
    /// `Some(n)`: reset only when a used shallower level is `<= n`.
    pub restart: Option<u8>,
}

impl Default for StartSettings {
    fn default() -> Self {
        Self {
            start: DEFAULT_START,
            restart: None,
        }
    }
}

/// The most recent `(pos, value)` per key, valid during one forward scan.
#[derive(Default)]
struct ForwardCache {
    by_num: HashMap<(NumId, u8), (u32, u32)>,
    by_abstract: HashMap<(AbstractId, u8), (u32, u32)>,
}

#[derive(Default)]
pub struct NumberingCounterStore {
    settings: HashMap<(NumId, u8), StartSettings>,
    by_num: HashMap<(NumId, u8), BTreeMap<u32, u32>>,
    by_abstract: HashMap<(AbstractId, u8), BTreeMap<u32, u32>>,
    cache: Option<ForwardCache>,
}

impl NumberingCounterStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop all counters, policies and cached state.
    pub fn clear(&mut self) {
        self.settings.clear();
        self.by_num.clear();
        self.by_abstract.clear();
        if self.cache.is_some() {
            self.cache = Some(ForwardCache::default());
        }
    }

    pub fn enable_cache(&mut self) {
        if self.cache.is_none() {
            self.cache = Some(ForwardCache::default());
        }
    }

    /// Leave cache mode. Cached entries are discarded with it.
    pub fn disable_cache(&mut self) {
        self.cache = None;
    }

    pub fn is_cache_enabled(&self) -> bool {
        self.cache.is_some()
    }

    pub fn set_start_settings(&mut self, num_id: NumId, level: u8, start: u32, restart: Option<u8>) {
        self.settings
            .insert((num_id, level.min(MAX_LEVEL)), StartSettings { start, restart });
    }

    pub fn has_start_settings(&self, num_id: NumId, level: u8) -> bool {
        self.settings.contains_key(&(num_id, level.min(MAX_LEVEL)))
    }

    pub fn start_settings(&self, num_id: NumId, level: u8) -> StartSettings {
        self.settings
            .get(&(num_id, level.min(MAX_LEVEL)))
            .copied()
            .unwrap_or_default()
    }

    pub fn set_counter(&mut self, num_id: NumId, level: u8, pos: u32, value: u32, abstract_id: AbstractId) {
        let level = level.min(MAX_LEVEL);
        self.by_num.entry((num_id, level)).or_default().insert(pos, value);
        self.by_abstract
            .entry((abstract_id, level))
            .or_default()
            .insert(pos, value);

        if let Some(cache) = self.cache.as_mut() {
            let advance = |slot: &mut (u32, u32)| {
                if pos >= slot.0 {
                    *slot = (pos, value);
                }
            };
            cache
                .by_num
                .entry((num_id, level))
                .and_modify(advance)
                .or_insert((pos, value));
            cache
                .by_abstract
                .entry((abstract_id, level))
                .and_modify(advance)
                .or_insert((pos, value));
        }
    }

    /// The counter value for a list item at `pos`.
    pub fn calculate_counter(&self, num_id: NumId, level: u8, pos: u32, abstract_id: AbstractId) -> u32 {
        let level = level.min(MAX_LEVEL);
        let settings = self.start_settings(num_id, level);

        let previous = self.previous_abstract_entry(abstract_id, level, pos);

        if settings.restart == Some(0) {
            return previous.map(|(_, v)| v.saturating_add(1)).unwrap_or(settings.start);
        }

        let Some((prev_pos, prev_value)) = previous else {
            return settings.start;
        };

        let used_levels: Vec<u8> = (0..level)
            .filter(|&shallower| self.abstract_used_between(abstract_id, shallower, prev_pos, pos))
            .collect();

        if used_levels.is_empty() {
            return prev_value.saturating_add(1);
        }

        match settings.restart {
            None => settings.start,
            Some(threshold) => {
                if used_levels.iter().any(|&lvl| lvl <= threshold) {
                    settings.start
                } else {
                    prev_value.saturating_add(1)
                }
            }
        }
    }

    /// Counter values of every level shallower than `level`, as seen at `pos`.
    /// Levels that have not been used yet contribute their start value.
    pub fn get_ancestors_path(&self, num_id: NumId, level: u8, pos: u32) -> Vec<u32> {
        let level = level.min(MAX_LEVEL);
        (0..level)
            .map(|shallower| {
                self.last_num_value_at_or_before(num_id, shallower, pos)
                    .unwrap_or_else(|| self.start_settings(num_id, shallower).start)
            })
            .collect()
    }

    fn previous_abstract_entry(&self, abstract_id: AbstractId, level: u8, pos: u32) -> Option<(u32, u32)> {
        // A miss or an out-of-order query falls back to the full history.
        if let Some(cache) = &self.cache
            && let Some(&(cached_pos, value)) = cache.by_abstract.get(&(abstract_id, level))
            && cached_pos < pos
        {
            return Some((cached_pos, value));
        }
        self.by_abstract
            .get(&(abstract_id, level))?
            .range(..pos)
            .next_back()
            .map(|(&p, &v)| (p, v))
    }

    fn abstract_used_between(&self, abstract_id: AbstractId, level: u8, after: u32, before: u32) -> bool {
        if let Some(cache) = &self.cache
            && let Some(&(last_pos, _)) = cache.by_abstract.get(&(abstract_id, level))
            && last_pos < before
        {
            return last_pos > after;
        }
        self.by_abstract
            .get(&(abstract_id, level))
            .is_some_and(|history| {
                history
                    .range((Bound::Excluded(after), Bound::Excluded(before)))
                    .next()
                    .is_some()
            })
    }

    fn last_num_value_at_or_before(&self, num_id: NumId, level: u8, pos: u32) -> Option<u32> {
        if let Some(cache) = &self.cache
            && let Some(&(cached_pos, value)) = cache.by_num.get(&(num_id, level))
            && cached_pos <= pos
        {
            return Some(value);
        }
        self.by_num
            .get(&(num_id, level))?
            .range(..=pos)
            .next_back()
            .map(|(_, &v)| v)
    }
}
