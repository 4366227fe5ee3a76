use ilweave_core::{MethodId, Value};
use ilweave_patch::pattern::MatchRule;
use ilweave_patch::{Error, PatchPlan, PatchRegistry, SettingsStore};

const PLAN: &str = include_str!("../../../demos/reward_rate.json");

#[test]
fn test_demo_plan_declares_reward_setting() {
    let plan = PatchPlan::from_json(PLAN).unwrap();
    let setting = &plan.settings[0];
    assert_eq!(setting.key, "endless_reward_every_levels");
    assert_eq!(setting.default, Value::I32(5));
    assert_eq!(setting.meta.label, "Endless: Give rewards every X levels");
    assert_eq!(setting.meta.category, "Difficulty");

    let patch = &plan.patches[0];
    assert_eq!(
        patch.target,
        MethodId::new("RunHandler", "TransitionOnLevelCompleted")
    );
    assert_eq!(patch.rules[0].pattern, MatchRule::LdcI4 { value: 5 });
}

#[test]
fn test_plan_survives_serialization() {
    let plan = PatchPlan::from_json(PLAN).unwrap();
    let again = PatchPlan::from_json(&plan.to_json().unwrap()).unwrap();
    assert_eq!(plan, again);
}

#[test]
fn test_install_registers_settings_and_patches() {
    let plan = PatchPlan::from_json(PLAN).unwrap();
    let store = SettingsStore::new();
    let registry = PatchRegistry::new();

    let report = plan.install(&store, &registry).unwrap();
    assert_eq!((report.settings, report.patches, report.skipped), (1, 1, 0));
    assert!(registry.is_registered(&plan.targets()[0]));
    assert_eq!(
        store
            .get("endless_reward_every_levels")
            .map(|s| s.current_value()),
        Some(Value::I32(5))
    );
}

#[test]
fn test_duplicate_setting_keys_are_rejected() {
    let mut plan = PatchPlan::from_json(PLAN).unwrap();
    plan.settings.push(plan.settings[0].clone());
    let store = SettingsStore::new();
    assert!(matches!(
        plan.install(&store, &PatchRegistry::new()),
        Err(Error::Plan(_))
    ));
    assert!(store.is_empty());
}

#[test]
fn test_malformed_json_is_a_serialization_error() {
    assert!(matches!(
        PatchPlan::from_json("{ \"patches\": [ { \"target\": 5 } ] }"),
        Err(Error::Json(_))
    ));
}
