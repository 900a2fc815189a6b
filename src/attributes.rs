//! Attribute sheet with retractable modifiers.
//!
//! Modifiers are stored per [ModifierSource] rather than folded into running
//! totals, so retracting a source always restores the exact prior value.
//! Composition: `(base + flat) * (1 + percent_add) * Π(1 + percent_mult)`.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::buff::BuffInstanceId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Attribute {
    Attack,
    Defense,
    MaxHealth,
    MoveSpeed,
    AttackSpeed,
    CritChance,
    CritDamage,
    HealingReceived,
    DamageTaken,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModifierType {
    Flat,
    /// Summed with other additive percentages before multiplying.
    PercentAdd,
    /// Each one multiplies the result independently.
    PercentMult,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AttributeModifier {
    pub attribute: Attribute,
    #[serde(rename = "type")]
    pub modifier_type: ModifierType,
    pub value: f64,
}

impl AttributeModifier {
    pub fn flat(attribute: Attribute, value: f64) -> Self {
        Self {
            attribute,
            modifier_type: ModifierType::Flat,
            value,
        }
    }

    pub fn percent_add(attribute: Attribute, value: f64) -> Self {
        Self {
            attribute,
            modifier_type: ModifierType::PercentAdd,
            value,
        }
    }

    pub fn percent_mult(attribute: Attribute, value: f64) -> Self {
        Self {
            attribute,
            modifier_type: ModifierType::PercentMult,
            value,
        }
    }

    pub fn scaled(self, factor: f64) -> Self {
        Self {
            value: self.value * factor,
            ..self
        }
    }
}

/// Identifies who installed a set of modifiers: one effect module of one buff instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ModifierSource {
    pub instance: BuffInstanceId,
    pub effect_index: usize,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CategoryTotals {
    pub flat: f64,
    pub percent_add: f64,
    pub percent_mult: f64,
}

impl Default for CategoryTotals {
    fn default() -> Self {
        Self {
            flat: 0.0,
            percent_add: 0.0,
            percent_mult: 1.0,
        }
    }
}

impl CategoryTotals {
    pub fn apply(&mut self, modifier_type: ModifierType, value: f64) {
        match modifier_type {
            ModifierType::Flat => self.flat += value,
            ModifierType::PercentAdd => self.percent_add += value,
            ModifierType::PercentMult => self.percent_mult *= 1.0 + value,
        }
    }

    pub fn compose(self, base: f64) -> f64 {
        (base + self.flat) * (1.0 + self.percent_add) * self.percent_mult
    }
}

#[derive(Debug, Clone, Default)]
pub struct AttributeSheet {
    base: BTreeMap<Attribute, f64>,
    installed: BTreeMap<ModifierSource, Vec<AttributeModifier>>,
}

impl AttributeSheet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_base<I>(values: I) -> Self
    where
        I: IntoIterator<Item = (Attribute, f64)>,
    {
        Self {
            base: values.into_iter().collect(),
            installed: BTreeMap::new(),
        }
    }

    pub fn set_base(&mut self, attribute: Attribute, value: f64) {
        self.base.insert(attribute, value);
    }

    pub fn base(&self, attribute: Attribute) -> f64 {
        self.base.get(&attribute).copied().unwrap_or(0.0)
    }

    /// Installs `modifiers` under `source`, replacing whatever that source had installed.
    pub fn apply(&mut self, source: ModifierSource, modifiers: &[AttributeModifier]) {
        if modifiers.is_empty() {
            self.installed.remove(&source);
        } else {
            self.installed.insert(source, modifiers.to_vec());
        }
    }

    /// Returns false when `source` had nothing installed.
    pub fn retract(&mut self, source: ModifierSource) -> bool {
        self.installed.remove(&source).is_some()
    }

    pub fn totals_for(&self, attribute: Attribute) -> CategoryTotals {
        let mut totals = CategoryTotals::default();
        for modifier in self.installed.values().flatten() {
            if modifier.attribute == attribute {
                totals.apply(modifier.modifier_type, modifier.value);
            }
        }
        totals
    }

    pub fn value(&self, attribute: Attribute) -> f64 {
        self.totals_for(attribute).compose(self.base(attribute))
    }

    /// Net change modifiers make to `attribute` over its base.
    pub fn contribution(&self, attribute: Attribute) -> f64 {
        self.value(attribute) - self.base(attribute)
    }

    pub fn source_count(&self) -> usize {
        self.installed.len()
    }

    pub fn clear_modifiers(&mut self) {
        self.installed.clear();
    }
}
