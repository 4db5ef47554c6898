use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::model::TriState;

use super::{AbstractId, NumId, StartSettings};

fn default_start() -> u32 {
    1
}

fn default_num_fmt() -> String {
    "decimal".to_string()
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LevelDefinition {
    #[serde(default = "default_start")]
    pub start: u32,
    /// Raw `w:lvlRestart` value. Absent and null both mean "restart after any
    /// shallower level", `0` means "never restart".
    #[serde(default, skip_serializing_if = "TriState::is_absent")]
    pub restart: TriState<u8>,
    #[serde(default = "default_num_fmt")]
    pub num_fmt: String,
    #[serde(default)]
    pub lvl_text: String,
    #[serde(default)]
    pub indent_left_pt: f32,
    #[serde(default)]
    pub indent_hanging_pt: f32,
}

impl Default for LevelDefinition {
    fn default() -> Self {
        Self {
            start: default_start(),
            restart: TriState::Absent,
            num_fmt: default_num_fmt(),
            lvl_text: String::new(),
            indent_left_pt: 0.0,
            indent_hanging_pt: 0.0,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct AbstractNumbering {
    pub levels: BTreeMap<u8, LevelDefinition>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NumberingInstance {
    pub abstract_id: AbstractId,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub start_overrides: BTreeMap<u8, u32>,
}

/// `w:abstractNum` templates and the `w:num` instances that reference them.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct NumberingDefinitions {
    #[serde(default)]
    pub abstracts: BTreeMap<AbstractId, AbstractNumbering>,
    #[serde(default)]
    pub instances: BTreeMap<NumId, NumberingInstance>,
}

impl NumberingDefinitions {
    pub fn abstract_id(&self, num_id: NumId) -> Option<AbstractId> {
        self.instances.get(&num_id).map(|inst| inst.abstract_id)
    }

    pub fn levels(&self, num_id: NumId) -> Option<&BTreeMap<u8, LevelDefinition>> {
        let abstract_id = self.abstract_id(num_id)?;
        self.abstracts.get(&abstract_id).map(|a| &a.levels)
    }

    pub fn level(&self, num_id: NumId, level: u8) -> Option<&LevelDefinition> {
        self.levels(num_id)?.get(&level)
    }

    /// Start/restart policy of one level, with the instance's start override applied.
    pub fn start_settings(&self, num_id: NumId, level: u8) -> Option<StartSettings> {
        let def = self.level(num_id, level)?;
        let start = self
            .instances
            .get(&num_id)
            .and_then(|inst| inst.start_overrides.get(&level))
            .copied()
            .unwrap_or(def.start);
        let restart = match def.restart {
            TriState::Value(v) => Some(v),
            TriState::Absent | TriState::Null => None,
        };
        Some(StartSettings { start, restart })
    }
}
