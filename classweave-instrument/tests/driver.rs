mod common;

use anyhow::Result;
use classweave_bytecode::core::classfile::{attr, AccessFlags};
use classweave_bytecode::{ClassFile, Opcode};
use classweave_instrument::{
    CollectingSink, CompilationUnit, InstrumentationConfig, InstrumentationMode,
    PatternValidatorBuilder, RewriteOutcome, Severity, INSTRUMENTED_ATTRIBUTE, PRESENTABLE_NAME,
};
use common::{aload, config, op, process, rewritten, ClassFixture};
use pretty_assertions::assert_eq;
use test_case::test_case;

/// `static String normalize(@Pattern("[a-z]+") String raw) { return raw; }`
fn single_parameter_class() -> ClassFixture {
    let mut fixture = ClassFixture::new("com/example/Names");
    let method = fixture.method(
        AccessFlags::PUBLIC | AccessFlags::STATIC,
        "normalize",
        "(Ljava/lang/String;)Ljava/lang/String;",
        1,
        vec![aload(0), op(Opcode::ARETURN)],
    );
    let marker = fixture.pattern("[a-z]+");
    fixture.annotate_parameters(method, &[vec![marker]]);
    fixture
}

fn plain_class() -> ClassFixture {
    let mut fixture = ClassFixture::new("com/example/Plain");
    fixture.method(
        AccessFlags::PUBLIC | AccessFlags::STATIC,
        "id",
        "(Ljava/lang/Object;)Ljava/lang/Object;",
        1,
        vec![aload(0), op(Opcode::ARETURN)],
    );
    let other = fixture.other_annotation();
    fixture.annotate_method(0, &[other]);
    fixture
}

#[test]
fn test_disabled_mode_leaves_everything_untouched() {
    let disabled = InstrumentationConfig::new(InstrumentationMode::None, common::MARKER);
    for unit in [
        single_parameter_class().unit(),
        CompilationUnit::new("com.example.Garbage", vec![0xde, 0xad]),
        CompilationUnit::new("com.example.Empty", Vec::new()),
    ] {
        let (outcome, reported) = process(&unit, &disabled);
        assert_eq!(outcome, RewriteOutcome::Unchanged);
        assert!(reported.is_empty());
    }
}

#[test_case("module-info" ; "bare")]
#[test_case("com.example.module-info" ; "qualified")]
#[test_case("com/example/module-info" ; "internal")]
fn test_module_descriptor_is_skipped(name: &str) {
    // Unparseable on purpose: the filter must reject it before parsing
    let unit = CompilationUnit::new(name, vec![1, 2, 3]);
    let (outcome, reported) = process(&unit, &config());
    assert_eq!(outcome, RewriteOutcome::Unchanged);
    assert!(reported.is_empty());
}

#[test]
fn test_class_without_markers_is_unchanged() {
    let (outcome, reported) = process(&plain_class().unit(), &config());
    assert_eq!(outcome, RewriteOutcome::Unchanged);
    assert!(reported.is_empty());
}

#[test]
fn test_marker_of_another_type_is_ignored() -> Result<()> {
    let fixture = single_parameter_class();
    let other = InstrumentationConfig::new(InstrumentationMode::Assert, "com.example.Other");
    let (outcome, reported) = process(&fixture.unit(), &other);
    assert_eq!(outcome, RewriteOutcome::Unchanged);
    assert!(reported.is_empty());
    Ok(())
}

#[test]
fn test_single_parameter_gets_one_check() -> Result<()> {
    let (outcome, reported) = process(&single_parameter_class().unit(), &config());
    assert!(reported.is_empty());
    let bytes = rewritten(&outcome)?;

    assert_eq!(common::count_validator_calls(bytes)?, 1);
    assert_eq!(
        common::opcodes(bytes, "normalize")?,
        vec![
            Opcode::ALOAD_0,
            Opcode::LDC,
            Opcode::LDC,
            Opcode::INVOKESTATIC,
            Opcode::ALOAD_0,
            Opcode::ARETURN,
        ]
    );

    let code = common::code_of(bytes, "normalize")?;
    assert_eq!(code.max_stack, 2 + 3);
    assert_eq!(code.max_locals, 1);
    Ok(())
}

#[test]
fn test_check_arguments_are_pattern_and_location() -> Result<()> {
    let (outcome, _) = process(&single_parameter_class().unit(), &config());
    let listing = common::verbose_listing(rewritten(&outcome)?)?;
    assert!(listing.contains("\"[a-z]+\""), "{listing}");
    assert!(
        listing.contains("\"parameter 0 of com.example.Names.normalize\""),
        "{listing}"
    );
    assert!(listing.contains(
        "org/classweave/runtime/PatternValidator.assertMatches:(Ljava/lang/Object;Ljava/lang/String;Ljava/lang/String;)V"
    ));
    Ok(())
}

#[test]
fn test_exception_mode_calls_the_checking_entry_point() -> Result<()> {
    let exception = InstrumentationConfig::new(InstrumentationMode::Exception, common::MARKER);
    let (outcome, _) = process(&single_parameter_class().unit(), &exception);
    let listing = common::verbose_listing(rewritten(&outcome)?)?;
    assert!(listing.contains("PatternValidator.checkMatches"));
    assert!(!listing.contains("PatternValidator.assertMatches"));
    Ok(())
}

#[test]
fn test_rewritten_class_is_marked_and_reparses() -> Result<()> {
    let original = single_parameter_class();
    let (outcome, _) = process(&original.unit(), &config());
    let class = ClassFile::parse(rewritten(&outcome)?)?;

    assert!(class.find_attribute(INSTRUMENTED_ATTRIBUTE).is_some());
    assert_eq!(class.name()?, "com/example/Names");
    assert_eq!(class.major_version, original.class.major_version);
    assert_eq!(class.methods.len(), original.class.methods.len());
    Ok(())
}

#[test]
fn test_rewrite_is_deterministic() -> Result<()> {
    let unit = single_parameter_class().unit();
    let (first, _) = process(&unit, &config());
    let (second, _) = process(&unit, &config());
    assert_eq!(rewritten(&first)?, rewritten(&second)?);
    Ok(())
}

#[test]
fn test_second_pass_is_refused() -> Result<()> {
    let unit = single_parameter_class().unit();
    let (outcome, _) = process(&unit, &config());
    let again = CompilationUnit::new(unit.name.clone(), rewritten(&outcome)?.to_vec());

    let (outcome, reported) = process(&again, &config());
    assert_eq!(reported.len(), 1);
    assert_eq!(
        reported[0].message,
        "Class com.example.Names was already instrumented"
    );
    assert_eq!(outcome, RewriteOutcome::Failed(reported[0].clone()));
    Ok(())
}

#[test_case(Vec::new() ; "empty")]
#[test_case(vec![0xca, 0xfe, 0xba] ; "short magic")]
#[test_case(vec![0xde, 0xad, 0xbe, 0xef, 0, 0, 0, 52] ; "wrong magic")]
fn test_malformed_unit_fails_with_parse_message(bytes: Vec<u8>) {
    let unit = CompilationUnit::new("com.example.Broken", bytes);
    let (outcome, reported) = process(&unit, &config());

    assert_eq!(reported.len(), 1);
    let diagnostic = &reported[0];
    assert_eq!(diagnostic.step, PRESENTABLE_NAME);
    assert_eq!(diagnostic.severity, Severity::Error);
    assert_eq!(diagnostic.unit, "com.example.Broken");
    assert!(diagnostic.message.starts_with("Failed to parse class file: "));
    assert_eq!(outcome.diagnostic(), Some(diagnostic));
}

#[test]
fn test_truncated_class_fails() {
    let mut bytes = single_parameter_class().bytes();
    bytes.truncate(bytes.len() - 5);
    let (outcome, reported) = process(&CompilationUnit::new("com.example.Names", bytes), &config());
    assert!(outcome.is_failed());
    assert_eq!(reported.len(), 1);
    assert!(reported[0].message.starts_with("Failed to parse class file: "));
}

#[test]
fn test_corrupt_method_body_reports_parse_failure() {
    let mut fixture = single_parameter_class();
    let class = &mut fixture.class;
    let code = class.methods[0]
        .find_attribute_mut(&class.constant_pool, attr::CODE)
        .expect("method has code");
    // First opcode of the body; 0xff is reserved
    code.info[8] = 0xff;

    let (outcome, reported) = process(&fixture.unit(), &config());
    assert!(outcome.is_failed());
    assert_eq!(reported.len(), 1);
    assert!(
        reported[0].message.starts_with("Failed to parse class file: "),
        "{}",
        reported[0].message
    );
    assert_eq!(outcome.diagnostic(), Some(&reported[0]));
}

#[test]
fn test_corrupt_body_without_sites_is_left_alone() {
    let mut fixture = plain_class();
    let class = &mut fixture.class;
    let code = class.methods[0]
        .find_attribute_mut(&class.constant_pool, attr::CODE)
        .expect("method has code");
    code.info[8] = 0xff;

    // Nothing to weave, so the instruction stream is never decoded
    let (outcome, reported) = process(&fixture.unit(), &config());
    assert_eq!(outcome, RewriteOutcome::Unchanged);
    assert!(reported.is_empty());
}

#[test]
fn test_marker_without_value_fails() {
    let mut fixture = ClassFixture::new("com/example/Names");
    let method = fixture.method(
        AccessFlags::STATIC,
        "normalize",
        "(Ljava/lang/String;)V",
        1,
        vec![op(Opcode::RETURN)],
    );
    let marker = fixture.bare_marker();
    fixture.annotate_parameters(method, &[vec![marker]]);

    let (outcome, reported) = process(&fixture.unit(), &config());
    assert!(outcome.is_failed());
    assert_eq!(
        reported[0].message,
        "Marker on parameter 0 of method com.example.Names.normalize has no String `value` element"
    );
}

#[test]
fn test_primitive_parameter_fails() {
    let mut fixture = ClassFixture::new("com/example/Counter");
    let method = fixture.method(AccessFlags::STATIC, "bump", "(I)V", 1, vec![op(Opcode::RETURN)]);
    let marker = fixture.pattern("[0-9]+");
    fixture.annotate_parameters(method, &[vec![marker]]);

    let (outcome, reported) = process(&fixture.unit(), &config());
    assert!(outcome.is_failed());
    assert_eq!(reported.len(), 1);
    assert!(
        reported[0]
            .message
            .starts_with("Cannot instrument parameter 0 of method com.example.Counter.bump"),
        "{}",
        reported[0].message
    );
}

#[test]
fn test_void_method_marker_fails() {
    let mut fixture = ClassFixture::new("com/example/Counter");
    let method = fixture.method(AccessFlags::STATIC, "reset", "()V", 0, vec![op(Opcode::RETURN)]);
    let marker = fixture.pattern("x");
    fixture.annotate_method(method, &[marker]);

    let (outcome, reported) = process(&fixture.unit(), &config());
    assert!(outcome.is_failed());
    assert_eq!(
        reported[0].message,
        "Cannot instrument method com.example.Counter.reset: annotated method returns void"
    );
}

#[test]
fn test_instrument_all_keeps_units_independent() -> Result<()> {
    let units = vec![
        single_parameter_class().unit(),
        CompilationUnit::new("com.example.Broken", vec![0xca, 0xfe]),
        plain_class().unit(),
        CompilationUnit::new("module-info", vec![0]),
        single_parameter_class().unit(),
    ];
    let sink = CollectingSink::new();
    let outcomes = PatternValidatorBuilder::new().instrument_all(&units, &config(), &sink)?;

    assert_eq!(outcomes.len(), units.len());
    assert!(outcomes[0].is_rewritten());
    assert!(outcomes[1].is_failed());
    assert!(outcomes[2].is_unchanged());
    assert!(outcomes[3].is_unchanged());
    assert_eq!(outcomes[0], outcomes[4]);

    let reported = sink.take();
    assert_eq!(reported.len(), 1);
    assert_eq!(reported[0].unit, "com.example.Broken");
    Ok(())
}

#[test]
fn test_closure_sink_receives_failures() {
    let seen = parking_lot::Mutex::new(Vec::new());
    let sink = |diagnostic: classweave_instrument::Diagnostic| seen.lock().push(diagnostic.unit);
    let unit = CompilationUnit::new("com.example.Broken", vec![1]);
    let outcome = PatternValidatorBuilder::new().process(&unit, &config(), &sink);
    assert!(outcome.is_failed());
    assert_eq!(*seen.lock(), vec!["com.example.Broken".to_string()]);
}

#[test]
fn test_config_from_json_drives_the_rewrite() -> Result<()> {
    let config = InstrumentationConfig::from_json_str(
        r#"{
            "mode": "exception",
            "marker_annotation": "com.example.Pattern",
            "validator": { "class": "com.example.rt.Checks" }
        }"#,
    )?;
    let (outcome, _) = process(&single_parameter_class().unit(), &config);
    let listing = common::verbose_listing(rewritten(&outcome)?)?;
    assert!(listing.contains("com/example/rt/Checks.checkMatches"), "{listing}");
    Ok(())
}
