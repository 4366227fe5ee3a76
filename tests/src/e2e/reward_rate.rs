use super::{MULTIPLE_OF_FIVE, REWARD_PLAN, TRANSITION_ASM, host_with, init_tracing};
use color_eyre::Result;
use color_eyre::eyre::eyre;
use ilweave_core::{MethodId, Value, ValueSource, ValueType};
use ilweave_patch::pattern::ldc_i4;
use ilweave_patch::{PatchPlan, PatchRegistry, RegistrationState, SettingsStore, replace_with_call};
use std::sync::Arc;

struct AlwaysSeven;

impl ValueSource for AlwaysSeven {
    fn name(&self) -> &str {
        "always_seven"
    }

    fn value_type(&self) -> ValueType {
        ValueType::I32
    }

    fn current_value(&self) -> Value {
        Value::I32(7)
    }
}

fn reward(table: &ilweave_core::MethodTable, id: &MethodId, cond: bool, n: i32) -> Result<bool> {
    match table.invoke(id, &[Value::Bool(cond), Value::I32(n)])? {
        Some(Value::Bool(taken)) => Ok(taken),
        other => Err(eyre!("unexpected return value {other:?}")),
    }
}

#[test]
fn test_multiple_of_five_becomes_multiple_of_seven() -> Result<()> {
    init_tracing();
    let id = MethodId::new("Level", "reward");
    let registry = Arc::new(PatchRegistry::new());
    registry.register(id.clone(), "seven", |cursor| {
        replace_with_call(cursor, &ldc_i4(5), Arc::new(AlwaysSeven)).map(|_| ())
    });

    let table = host_with(&registry, MULTIPLE_OF_FIVE)?;
    assert!(matches!(
        registry.state(&id),
        Some(RegistrationState::Applied { .. })
    ));

    assert!(reward(&table, &id, true, 7)?);
    assert!(!reward(&table, &id, true, 5)?);
    assert!(reward(&table, &id, true, 14)?);
    assert!(!reward(&table, &id, false, 14)?);
    Ok(())
}

#[test]
fn test_reward_plan_follows_setting_changes() -> Result<()> {
    init_tracing();
    let plan = PatchPlan::from_json(REWARD_PLAN)?;
    let settings = SettingsStore::new();
    let registry = Arc::new(PatchRegistry::new());
    plan.install(&settings, &registry)?;

    let table = host_with(&registry, TRANSITION_ASM)?;
    let id = MethodId::new("RunHandler", "TransitionOnLevelCompleted");
    let rewarded = |table: &ilweave_core::MethodTable| -> Result<Vec<i32>> {
        let mut levels = Vec::new();
        for level in 0..15 {
            if reward(table, &id, true, level)? {
                levels.push(level);
            }
        }
        Ok(levels)
    };

    // The default keeps the original behaviour.
    assert_eq!(rewarded(&table)?, vec![0, 4, 9, 14]);

    let rate = settings
        .get("endless_reward_every_levels")
        .ok_or_else(|| eyre!("setting was not registered"))?;
    rate.set(Value::I32(3))?;
    assert_eq!(rewarded(&table)?, vec![0, 2, 5, 8, 11, 14]);

    // No rewards outside endless mode, whatever the setting.
    assert!(!reward(&table, &id, false, 2)?);

    // The helper in the same module is untouched.
    let next = table.invoke(&MethodId::new("RunHandler", "NextLevel"), &[Value::I32(3)])?;
    assert_eq!(next, Some(Value::I32(4)));
    Ok(())
}

#[test]
fn test_zero_setting_surfaces_runtime_error() -> Result<()> {
    let plan = PatchPlan::from_json(REWARD_PLAN)?;
    let settings = SettingsStore::new();
    let registry = Arc::new(PatchRegistry::new());
    plan.install(&settings, &registry)?;
    let table = host_with(&registry, TRANSITION_ASM)?;

    settings
        .get("endless_reward_every_levels")
        .ok_or_else(|| eyre!("setting was not registered"))?
        .set(Value::I32(0))?;
    let id = MethodId::new("RunHandler", "TransitionOnLevelCompleted");
    // Level 0 short-circuits before the remainder.
    assert!(reward(&table, &id, true, 0)?);
    assert!(matches!(
        table.invoke(&id, &[Value::Bool(true), Value::I32(3)]),
        Err(ilweave_core::result::Error::DivideByZero(_))
    ));
    Ok(())
}
