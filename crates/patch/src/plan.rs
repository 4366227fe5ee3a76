//! Declarative patch plans.
//!
//! A plan declares settings and describes each patch as a list of replace rules: find the n-th
//! instruction matching a [`MatchRule`] and replace it with a read of a setting. Installing a plan
//! registers the settings in a [`SettingsStore`] and the patches in a [`PatchRegistry`]; nothing
//! is applied until the registry sees the target method load.

use crate::cursor::Cursor;
use crate::inject::replace_current_with_call;
use crate::pattern::MatchRule;
use crate::registry::PatchRegistry;
use crate::settings::{DisplayMeta, SettingHandle, SettingsStore};
use crate::{Error, Patch, Result};
use ilweave_core::{InstrId, MethodId, Value};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::num::NonZeroUsize;
use std::sync::Arc;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PatchPlan {
    #[serde(default)]
    pub settings: Vec<SettingSpec>,
    #[serde(default)]
    pub patches: Vec<PlanPatch>,
}

/// A setting to register before any patch runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SettingSpec {
    pub key: String,
    pub default: Value,
    #[serde(flatten)]
    pub meta: DisplayMeta,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanPatch {
    pub target: MethodId,
    pub name: String,
    pub rules: Vec<ReplaceRule>,
}

/// Replace the `occurrence`-th instruction matching `pattern` with a read of `setting`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplaceRule {
    pub pattern: MatchRule,
    #[serde(default = "first_occurrence")]
    pub occurrence: NonZeroUsize,
    pub setting: String,
}

fn first_occurrence() -> NonZeroUsize {
    NonZeroUsize::MIN
}

/// What [`PatchPlan::install`] registered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct InstallReport {
    pub settings: usize,
    pub patches: usize,
    /// Patches whose target already had a registration.
    pub skipped: usize,
}

impl PatchPlan {
    pub fn from_json(json: &str) -> Result<Self> {
        let plan: Self = serde_json::from_str(json)?;
        plan.validate()?;
        Ok(plan)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Every method the plan patches.
    pub fn targets(&self) -> Vec<MethodId> {
        self.patches.iter().map(|p| p.target.clone()).collect()
    }

    /// Checks that setting keys are unique and every rule names a declared setting.
    pub fn validate(&self) -> Result<()> {
        let mut keys = HashSet::new();
        for spec in &self.settings {
            if !keys.insert(spec.key.as_str()) {
                return Err(Error::Plan(format!("setting '{}' declared twice", spec.key)));
            }
        }
        for patch in &self.patches {
            if patch.rules.is_empty() {
                return Err(Error::Plan(format!(
                    "patch '{}' for {} has no rules",
                    patch.name, patch.target
                )));
            }
            if let Some(rule) = patch
                .rules
                .iter()
                .find(|rule| !keys.contains(rule.setting.as_str()))
            {
                return Err(Error::Plan(format!(
                    "patch '{}' uses undeclared setting '{}'",
                    patch.name, rule.setting
                )));
            }
        }
        Ok(())
    }

    /// Registers the plan's settings in `settings` and its patches in `registry`.
    pub fn install(
        &self,
        settings: &SettingsStore,
        registry: &PatchRegistry,
    ) -> Result<InstallReport> {
        self.validate()?;
        let mut report = InstallReport::default();

        for spec in &self.settings {
            settings.get_or_register(spec.key.clone(), spec.default, spec.meta.clone())?;
            report.settings += 1;
        }

        for patch in &self.patches {
            let rules = patch
                .rules
                .iter()
                .map(|rule| {
                    settings
                        .get(&rule.setting)
                        .map(|handle| (rule.clone(), handle))
                        .ok_or_else(|| Error::Plan(format!("setting '{}' is missing", rule.setting)))
                })
                .collect::<Result<Vec<_>>>()?;

            let patch_impl = Arc::new(RulePatch { rules });
            if registry.register_patch(patch.target.clone(), patch.name.clone(), patch_impl) {
                report.patches += 1;
            } else {
                report.skipped += 1;
            }
        }

        tracing::info!(
            "Installed plan: {} setting(s), {} patch(es), {} skipped",
            report.settings,
            report.patches,
            report.skipped
        );
        Ok(report)
    }
}

struct RulePatch {
    rules: Vec<(ReplaceRule, SettingHandle)>,
}

impl Patch for RulePatch {
    /// Every rule is resolved against the unpatched body before anything is replaced, so an
    /// occurrence counts original instructions only.
    fn apply(&self, cursor: &mut Cursor<'_>) -> Result<()> {
        let mut targets: Vec<(InstrId, &SettingHandle)> = Vec::with_capacity(self.rules.len());
        for (rule, handle) in &self.rules {
            let id = resolve(cursor, rule)?;
            if targets.iter().any(|(claimed, _)| *claimed == id) {
                return Err(Error::Plan(format!(
                    "rule for setting '{}' selects an instruction another rule already replaces",
                    rule.setting
                )));
            }
            targets.push((id, handle));
        }

        for (id, handle) in targets {
            let Some(index) = cursor.stream().position_of(id) else {
                return Err(Error::NoCurrentInstruction);
            };
            cursor.seek_to(index);
            replace_current_with_call(cursor, Arc::new(handle.clone()))?;
        }
        Ok(())
    }
}

/// Finds the instruction `rule` selects, without editing the stream.
fn resolve(cursor: &mut Cursor<'_>, rule: &ReplaceRule) -> Result<InstrId> {
    cursor.seek_first();
    for seen in 0..rule.occurrence.get() {
        if !cursor.find_next(&rule.pattern) {
            tracing::warn!(
                "Pattern for '{}' not found in {} (wanted occurrence {}, saw {})",
                rule.setting,
                cursor.stream().method(),
                rule.occurrence,
                seen
            );
            return Err(Error::NoCurrentInstruction);
        }
    }
    cursor
        .index()
        .and_then(|index| cursor.stream().id_at(index))
        .ok_or(Error::NoCurrentInstruction)
}
