use ilweave_cli::commands::run::parse_args;
use ilweave_cli::commands::{
    CliError, Session, read_module, read_plan, read_settings, select_method,
};
use ilweave_core::{MethodId, Value};
use ilweave_patch::RegistrationState;

const DEMOS: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/../demos");

#[tokio::test]
async fn test_demo_files_patch_through_session() {
    super::init_tracing();
    let plan = read_plan(format!("{DEMOS}/reward_rate.json")).await.unwrap();
    let snapshot = read_settings(format!("{DEMOS}/settings.json")).await.unwrap();
    let methods = read_module(format!("{DEMOS}/transition.asm")).await.unwrap();

    let session = Session::new(Some(&plan), Some(&snapshot)).unwrap();
    assert_eq!(session.install.patches, 1);
    let ids = session.load(methods).unwrap();

    let target = select_method(&ids, Some("RunHandler::TransitionOnLevelCompleted")).unwrap();
    assert!(matches!(
        session.registry.state(&target),
        Some(RegistrationState::Applied { .. })
    ));

    let signature = session.table.signature(&target).unwrap();
    let args = parse_args(&signature, &["true".to_string(), "6".to_string()]).unwrap();
    // settings.json sets the interval to 7: level 6 is the 7th level.
    assert_eq!(
        session.table.invoke(&target, &args).unwrap(),
        Some(Value::Bool(true))
    );
}

#[tokio::test]
async fn test_method_must_be_named_when_ambiguous() {
    let methods = read_module(format!("{DEMOS}/transition.asm")).await.unwrap();
    let ids: Vec<MethodId> = methods.iter().map(|m| m.method().clone()).collect();
    assert!(matches!(
        select_method(&ids, None),
        Err(CliError::Method(_))
    ));
    assert!(matches!(
        select_method(&ids, Some("RunHandler::Missing")),
        Err(CliError::Method(_))
    ));
    assert_eq!(
        select_method(&ids[..1], None).unwrap(),
        MethodId::new("RunHandler", "TransitionOnLevelCompleted")
    );
}

#[tokio::test]
async fn test_missing_input_file_is_reported() {
    assert!(matches!(
        read_module(format!("{DEMOS}/does_not_exist.asm")).await,
        Err(CliError::File(_))
    ));
}

#[test]
fn test_arguments_are_typed_by_signature() {
    let signature = ilweave_core::Signature::new(
        vec![ilweave_core::ValueType::Bool, ilweave_core::ValueType::I32],
        None,
    );
    let ok = parse_args(&signature, &["false".into(), "0x10".into()]).unwrap();
    assert_eq!(ok, vec![Value::Bool(false), Value::I32(16)]);
    assert!(matches!(
        parse_args(&signature, &["1".into(), "2".into()]),
        Err(CliError::Argument(_))
    ));
    assert!(matches!(
        parse_args(&signature, &["true".into()]),
        Err(CliError::Argument(_))
    ));
}
