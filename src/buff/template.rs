use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::effects::EffectModule;
use super::triggers::TriggerModule;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BuffCategory {
    #[default]
    Buff,
    Debuff,
    Neutral,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DurationType {
    /// Never decays and cannot be dispelled; only explicit removal ends it.
    Infinite,
    #[default]
    Timed,
    /// Never decays; ends through dispel or explicit removal.
    UntilDispelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StackingType {
    #[default]
    None,
    Stack,
    Refresh,
    Independent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DispelType {
    /// Not removable by dispel.
    #[default]
    None,
    Magic,
    Physical,
    Curse,
    Poison,
    /// Only valid as a dispel request: matches every dispellable buff.
    All,
}

fn default_max_stacks() -> u32 {
    1
}

/// Immutable buff definition shared by every instance created from it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuffTemplate {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub category: BuffCategory,
    #[serde(default)]
    pub duration_type: DurationType,
    /// Seconds. Ignored unless `duration_type` is `Timed`.
    #[serde(default)]
    pub duration: f64,
    #[serde(default)]
    pub stacking: StackingType,
    #[serde(default)]
    pub dispel: DispelType,
    #[serde(default = "default_max_stacks")]
    pub max_stacks: u32,
    /// With `StackingType::None`, re-application resets the remaining duration.
    #[serde(default)]
    pub refresh_on_reapply: bool,
    #[serde(default)]
    pub effects: Vec<EffectModule>,
    #[serde(default)]
    pub triggers: Vec<TriggerModule>,
}

impl BuffTemplate {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            category: BuffCategory::default(),
            duration_type: DurationType::default(),
            duration: 0.0,
            stacking: StackingType::default(),
            dispel: DispelType::default(),
            max_stacks: 1,
            refresh_on_reapply: false,
            effects: Vec::new(),
            triggers: Vec::new(),
        }
    }

    pub fn timed(mut self, seconds: f64) -> Self {
        self.duration_type = DurationType::Timed;
        self.duration = seconds;
        self
    }

    pub fn infinite(mut self) -> Self {
        self.duration_type = DurationType::Infinite;
        self
    }

    pub fn until_dispelled(mut self, dispel: DispelType) -> Self {
        self.duration_type = DurationType::UntilDispelled;
        self.dispel = dispel;
        self
    }

    pub fn stacking(mut self, stacking: StackingType, max_stacks: u32) -> Self {
        self.stacking = stacking;
        self.max_stacks = max_stacks.max(1);
        self
    }

    pub fn dispellable(mut self, dispel: DispelType) -> Self {
        self.dispel = dispel;
        self
    }

    pub fn with_effect(mut self, effect: EffectModule) -> Self {
        self.effects.push(effect);
        self
    }

    pub fn with_trigger(mut self, trigger: TriggerModule) -> Self {
        self.triggers.push(trigger);
        self
    }

    /// Remaining duration for a fresh or refreshed instance. `None` means it never decays.
    pub fn initial_remaining(&self) -> Option<f64> {
        match self.duration_type {
            DurationType::Timed => Some(self.duration.max(0.0)),
            DurationType::Infinite | DurationType::UntilDispelled => None,
        }
    }

    pub fn effective_max_stacks(&self) -> u32 {
        self.max_stacks.max(1)
    }

    pub fn is_dispelled_by(&self, request: DispelType) -> bool {
        if self.duration_type == DurationType::Infinite || self.dispel == DispelType::None {
            return false;
        }
        request == DispelType::All || request == self.dispel
    }
}

/// Templates indexed by id, shared with every world that applies them.
#[derive(Debug, Clone, Default)]
pub struct BuffLibrary {
    templates: HashMap<String, Arc<BuffTemplate>>,
}

impl BuffLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds templates. Returns ids that were already present (and have been replaced).
    pub fn extend<I>(&mut self, templates: I) -> Vec<String>
    where
        I: IntoIterator<Item = BuffTemplate>,
    {
        let mut replaced = Vec::new();
        for template in templates {
            let id = template.id.clone();
            if self.templates.insert(id.clone(), Arc::new(template)).is_some() {
                replaced.push(id);
            }
        }
        replaced
    }

    pub fn insert(&mut self, template: BuffTemplate) {
        self.templates.insert(template.id.clone(), Arc::new(template));
    }

    pub fn get(&self, id: &str) -> Option<Arc<BuffTemplate>> {
        self.templates.get(id).cloned()
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }

    pub fn ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.templates.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }
}
