use ilweave_core::decoder::parse_method;
use ilweave_core::result::Error;
use ilweave_core::validator::{collect_violations, verify};
use ilweave_core::{Instruction, MethodTable, MethodHost, Opcode};

const ASM: &str = "
.method Gate::open(bool, i32) -> bool
    ldarg 0
    brfalse @closed
    ldarg 1
    ldc.i4 3
    clt
    ret
@closed:
    ldc.bool false
    ret
";

#[test]
fn test_well_formed_method_verifies() {
    verify(&parse_method(ASM).unwrap()).unwrap();
}

#[test]
fn test_removed_push_is_reported_as_underflow() {
    let mut stream = parse_method(ASM).unwrap();
    stream.remove(3).unwrap();
    let violations = collect_violations(&stream);
    assert!(!violations.is_empty());
    assert_eq!(violations[0].position, Some(3));
}

#[test]
fn test_unbalanced_merge_is_reported() {
    let src = "
.method Gate::merge(bool) -> i32
    ldc.i4 1
    ldarg 0
    brtrue @join
    ldc.i4 2
@join:
    ret
";
    let violations = collect_violations(&parse_method(src).unwrap());
    assert!(
        violations
            .iter()
            .any(|v| v.message.contains("stack shape differs"))
    );
}

#[test]
fn test_wrong_type_pushed_for_return() {
    let mut stream = parse_method(ASM).unwrap();
    let old = stream.id_at(6).unwrap();
    let new = stream.insert(6, Instruction::ldc_i4(0)).unwrap();
    stream.retarget(old, new);
    stream.remove(7).unwrap();

    let violations = collect_violations(&stream);
    assert_eq!(violations.len(), 1);
    assert!(violations[0].message.contains("expects bool"));
    assert!(matches!(
        verify(&stream),
        Err(Error::VerificationFailed { .. })
    ));
}

#[test]
fn test_failed_commit_leaves_live_body() {
    let table = MethodTable::new();
    let stream = parse_method(ASM).unwrap();
    let id = stream.method().clone();
    table.define(stream).unwrap();
    let before = table.body_digest(&id).unwrap();

    let mut broken = table.load(&id).unwrap();
    // Removing the branch target without a replacement leaves the label dangling.
    broken.remove(6).unwrap();
    broken.push(Instruction::simple(Opcode::Ret));

    match table.commit(broken) {
        Err(Error::VerificationFailed { violations, .. }) => {
            assert!(violations.iter().any(|v| v.position == Some(1)));
        }
        other => panic!("expected verification failure, got {other:?}"),
    }
    assert_eq!(table.body_digest(&id).unwrap(), before);
}
