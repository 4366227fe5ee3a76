use super::Fixed;
use ilweave_core::decoder::parse_module;
use ilweave_core::encoder::digest_hex;
use ilweave_core::{MethodId, MethodTable, Value, load_module};
use ilweave_patch::pattern::ldc_i4;
use ilweave_patch::{ApplyOutcome, PatchRegistry, RegistrationState, replace_with_call};
use std::sync::Arc;
use std::thread;

const MODULE: &str = "
.method Shop::price() -> i32
    ldc.i4 5
    ret
.method Shop::stock() -> i32
    ldc.i4 5
    ldc.i4 2
    mul
    ret
.method Shop::open() -> bool
    ldc.bool true
    ret
";

fn shop(name: &str) -> MethodId {
    MethodId::new("Shop", name)
}

fn seven_instead_of_five(registry: &PatchRegistry, target: MethodId) -> bool {
    registry.register(target, "seven", |cursor| {
        replace_with_call(cursor, &ldc_i4(5), Arc::new(Fixed::i32("seven", 7))).map(|_| ())
    })
}

#[test]
fn test_double_apply_matches_single_apply() {
    let once = MethodTable::new();
    load_module(&once, MODULE).unwrap();
    let registry = PatchRegistry::new();
    seven_instead_of_five(&registry, shop("price"));
    assert_eq!(
        registry.apply_on_load(&once, &shop("price")).unwrap(),
        ApplyOutcome::Applied
    );

    let twice = MethodTable::new();
    load_module(&twice, MODULE).unwrap();
    let registry = PatchRegistry::new();
    seven_instead_of_five(&registry, shop("price"));
    registry.apply_on_load(&twice, &shop("price")).unwrap();
    assert_eq!(
        registry.apply_on_load(&twice, &shop("price")).unwrap(),
        ApplyOutcome::AlreadyApplied
    );

    assert_eq!(
        once.body_digest(&shop("price")).unwrap(),
        twice.body_digest(&shop("price")).unwrap()
    );
    match registry.state(&shop("price")) {
        Some(RegistrationState::Applied { digest }) => {
            let body = twice.body(&shop("price")).unwrap();
            assert_eq!(digest, digest_hex(&body).unwrap());
        }
        other => panic!("unexpected state {other:?}"),
    }
}

#[test]
fn test_distinct_targets_patch_concurrently() {
    let table = Arc::new(MethodTable::new());
    load_module(&table, MODULE).unwrap();
    let registry = Arc::new(PatchRegistry::new());
    for name in ["price", "stock"] {
        assert!(seven_instead_of_five(&registry, shop(name)));
    }

    let handles: Vec<_> = ["price", "stock", "price", "stock", "open"]
        .into_iter()
        .map(|name| {
            let table = Arc::clone(&table);
            let registry = Arc::clone(&registry);
            thread::spawn(move || registry.apply_on_load(&*table, &shop(name)).unwrap())
        })
        .collect();
    let mut outcomes: Vec<ApplyOutcome> =
        handles.into_iter().map(|h| h.join().unwrap()).collect();
    outcomes.sort_by_key(|outcome| format!("{outcome:?}"));

    assert_eq!(
        outcomes,
        vec![
            ApplyOutcome::AlreadyApplied,
            ApplyOutcome::AlreadyApplied,
            ApplyOutcome::Applied,
            ApplyOutcome::Applied,
            ApplyOutcome::NotRegistered,
        ]
    );
    assert_eq!(table.invoke(&shop("price"), &[]).unwrap(), Some(Value::I32(7)));
    assert_eq!(table.invoke(&shop("stock"), &[]).unwrap(), Some(Value::I32(14)));
}

#[test]
fn test_redefinition_after_apply_is_not_repatched() {
    let table = MethodTable::new();
    let registry = Arc::new(PatchRegistry::new());
    seven_instead_of_five(&registry, shop("price"));
    table.subscribe(registry.clone());

    let methods = parse_module(MODULE).unwrap();
    table.define(methods[0].clone()).unwrap();
    assert_eq!(table.invoke(&shop("price"), &[]).unwrap(), Some(Value::I32(7)));

    // A reload swaps in the original body; the registration has already been used.
    table.define(methods[0].clone()).unwrap();
    assert_eq!(table.invoke(&shop("price"), &[]).unwrap(), Some(Value::I32(5)));
    assert_eq!(registry.registrations().len(), 1);
}

#[test]
fn test_missing_pattern_fails_and_records_reason() {
    let table = MethodTable::new();
    load_module(&table, MODULE).unwrap();
    let before = table.body_digest(&shop("open")).unwrap();
    let registry = PatchRegistry::new();
    seven_instead_of_five(&registry, shop("open"));

    assert!(registry.apply_on_load(&table, &shop("open")).is_err());
    match registry.state(&shop("open")) {
        Some(RegistrationState::Failed { reason }) => {
            assert!(reason.contains("not positioned"), "{reason}");
        }
        other => panic!("unexpected state {other:?}"),
    }
    assert_eq!(table.body_digest(&shop("open")).unwrap(), before);
}
