use ilweave_core::decoder::parse_method;
use ilweave_core::result::Error;
use ilweave_core::{
    LoadHook, MethodHost, MethodId, MethodTable, Signature, Value, ValueType, load_module,
};
use parking_lot::Mutex;
use std::sync::Arc;

const MODULE: &str = include_str!("../../../demos/transition.asm");

#[derive(Default)]
struct Recorder {
    seen: Mutex<Vec<MethodId>>,
}

impl LoadHook for Recorder {
    fn on_method_loaded(&self, host: &dyn MethodHost, id: &MethodId) {
        // The body must already be loadable when the hook fires.
        assert!(host.load(id).is_ok());
        self.seen.lock().push(id.clone());
    }
}

#[test]
fn test_hooks_see_every_defined_method_in_order() {
    let table = MethodTable::new();
    let recorder = Arc::new(Recorder::default());
    table.subscribe(recorder.clone());

    let ids = load_module(&table, MODULE).unwrap();
    assert_eq!(*recorder.seen.lock(), ids);
    assert_eq!(table.method_ids().len(), 2);
}

#[test]
fn test_unpatched_transition_rewards_every_fifth_level() {
    let table = MethodTable::new();
    load_module(&table, MODULE).unwrap();
    let id = MethodId::new("RunHandler", "TransitionOnLevelCompleted");

    let rewarded: Vec<i32> = (0..12)
        .filter(|&level| {
            table.invoke(&id, &[Value::Bool(true), Value::I32(level)]).unwrap()
                == Some(Value::Bool(true))
        })
        .collect();
    assert_eq!(rewarded, vec![0, 4, 9]);
    assert_eq!(
        table
            .invoke(&id, &[Value::Bool(false), Value::I32(4)])
            .unwrap(),
        Some(Value::Bool(false))
    );
}

#[test]
fn test_commit_to_intrinsic_is_rejected() {
    let table = MethodTable::new();
    let id = MethodId::new("Time", "now");
    table.define_intrinsic(
        id.clone(),
        Signature::new(vec![], Some(ValueType::I64)),
        Arc::new(|_: &[Value]| -> ilweave_core::result::Result<Option<Value>> {
            Ok(Some(Value::I64(0)))
        }),
    );

    let body = parse_method(".method Time::now() -> i64\n    ldc.i8 1\n    ret\n").unwrap();
    assert!(matches!(table.commit(body), Err(Error::UnsupportedBody(_))));
    assert!(table.contains(&id));
}

#[test]
fn test_commit_to_unknown_method_is_rejected() {
    let table = MethodTable::new();
    let body = parse_method(".method Ghost::f()\n    ret\n").unwrap();
    assert!(matches!(table.commit(body), Err(Error::TargetNotFound(_))));
}
