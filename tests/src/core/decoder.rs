use ilweave_core::decoder::{disassemble, parse_method, parse_module};
use ilweave_core::result::Error;
use ilweave_core::{MethodId, Opcode, ValueType};

const TRANSITION: &str = include_str!("../../../demos/transition.asm");

#[test]
fn test_demo_module_parses() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_ansi(false)
        .without_time()
        .try_init();

    let methods = parse_module(TRANSITION).unwrap();
    assert_eq!(methods.len(), 2);

    let transition = &methods[0];
    assert_eq!(
        transition.method(),
        &MethodId::new("RunHandler", "TransitionOnLevelCompleted")
    );
    assert_eq!(
        transition.signature().params,
        vec![ValueType::Bool, ValueType::I32]
    );
    assert_eq!(transition.signature().returns, Some(ValueType::Bool));
    assert_eq!(transition.len(), 18);

    let fives = transition
        .instructions()
        .filter(|i| i.match_ldc_i4(5))
        .count();
    assert_eq!(fives, 1, "the reward interval is loaded exactly once");
}

#[test]
fn test_listing_reparses_to_same_body() {
    for stream in parse_module(TRANSITION).unwrap() {
        let listing = disassemble(&stream);
        tracing::debug!("\n{}", listing);
        let reparsed = parse_method(&listing).unwrap();
        assert_eq!(reparsed.digest().unwrap(), stream.digest().unwrap());
    }
}

#[test]
fn test_branches_resolve_to_labelled_instructions() {
    let stream = parse_method(TRANSITION.split("# Unpatched").next().unwrap()).unwrap();
    let targets: Vec<usize> = stream
        .instructions()
        .filter(|i| i.op().is_branch())
        .filter_map(|i| i.label())
        .filter_map(|id| stream.position_of(id))
        .collect();
    // brfalse @no_reward, brtrue @reward, brfalse @no_reward
    assert_eq!(targets, vec![16, 14, 16]);
    assert_eq!(stream.get(14).map(|i| i.op()), Some(Opcode::LdcBool));
}

#[test]
fn test_parse_errors_carry_line_numbers() {
    let src = ".method A::f() -> i32\n    ldc.i4 1\n    frobnicate\n    ret\n";
    match parse_method(src) {
        Err(Error::ParseError { line, raw, .. }) => {
            assert_eq!(line, 3);
            assert!(raw.contains("frobnicate"));
        }
        other => panic!("expected parse error, got {other:?}"),
    }
}

#[test]
fn test_unknown_label_is_a_parse_error() {
    let src = ".method A::f()\n    br @nowhere\n";
    assert!(matches!(parse_method(src), Err(Error::ParseError { .. })));
}

#[test]
fn test_call_cannot_be_assembled() {
    let src = ".method A::f() -> i32\n    call setting\n    ret\n";
    assert!(matches!(
        parse_method(src),
        Err(Error::UnboundExternal(_))
    ));
}

#[test]
fn test_parse_method_rejects_multiple_methods() {
    assert!(parse_method(TRANSITION).is_err());
}
