//! Tests for:
//! - Byte-identical parse/serialize of complete class files
//! - Header validation (magic, version range, trailing bytes)
//! - Truncated and corrupted input never panicking
//! - Typed views over Code, StackMapTable and LineNumberTable

use classweave_bytecode::core::classfile::{AccessFlags, Attribute, ClassFile, attr};
use classweave_bytecode::core::code::{CodeAttribute, ExceptionEntry, LineNumber, LineNumberTable};
use classweave_bytecode::core::constants::Constant;
use classweave_bytecode::core::instructions::{Instruction, assemble};
use classweave_bytecode::core::opcodes::Opcode;
use classweave_bytecode::core::stack_map::{FrameKind, StackMapFrame, StackMapTable};
use classweave_bytecode::{BytecodeError, MAX_SUPPORTED_MAJOR};
use pretty_assertions::assert_eq;
use proptest::prelude::*;
use test_case::test_case;

/// `String pick(String a)`: returns `a` when non-null, a literal otherwise
fn sample_class(major: u16) -> ClassFile {
    let mut class = ClassFile::new("demo/Picker", Some("java/lang/Object"), major).unwrap();
    let pool = &mut class.constant_pool;
    let fallback = pool.intern_string("fallback").unwrap();
    let code_name = pool.intern_utf8(attr::CODE).unwrap();
    let lines_name = pool.intern_utf8(attr::LINE_NUMBER_TABLE).unwrap();
    let frames_name = pool.intern_utf8(attr::STACK_MAP_TABLE).unwrap();
    pool.intern(Constant::Long(1 << 40)).unwrap();
    pool.intern(Constant::Double(2.5f64.to_bits())).unwrap();
    pool.intern_utf8("caf\u{e9}\0").unwrap();

    let mut body = vec![
        Instruction::simple(Opcode::ALOAD_1),
        Instruction::branch(Opcode::IFNULL, 5),
        Instruction::simple(Opcode::ALOAD_1),
        Instruction::simple(Opcode::ARETURN),
        Instruction::constant(Opcode::LDC_W, fallback),
        Instruction::simple(Opcode::ARETURN),
    ];
    let mut code = CodeAttribute::new(1, 2, assemble(&mut body).unwrap());
    code.exception_table.push(ExceptionEntry {
        start_pc: 0,
        end_pc: 6,
        handler_pc: 6,
        catch_type: 0,
    });
    code.attributes.push(Attribute::new(
        lines_name,
        LineNumberTable(vec![
            LineNumber { start_pc: 0, line: 3 },
            LineNumber { start_pc: 6, line: 4 },
        ])
        .encode()
        .unwrap(),
    ));
    code.attributes.push(Attribute::new(
        frames_name,
        StackMapTable {
            frames: vec![StackMapFrame {
                offset_delta: 6,
                kind: FrameKind::Same,
            }],
        }
        .encode()
        .unwrap(),
    ));

    class
        .add_method(AccessFlags::PUBLIC, "pick", "(Ljava/lang/String;)Ljava/lang/String;")
        .unwrap()
        .attributes
        .push(Attribute::new(code_name, code.encode().unwrap()));
    class
        .add_field(AccessFlags::PRIVATE | AccessFlags::FINAL, "label", "Ljava/lang/String;")
        .unwrap();
    class
}

#[test]
fn test_round_trip_is_byte_identical() {
    let bytes = sample_class(61).to_bytes().unwrap();
    let parsed = ClassFile::parse(&bytes).unwrap();
    assert_eq!(parsed, ClassFile::parse(&parsed.to_bytes().unwrap()).unwrap());
    assert_eq!(parsed.to_bytes().unwrap(), bytes);
}

#[test]
fn test_unknown_flag_bits_survive_round_trip() {
    let mut class = sample_class(52);
    // bit 0x0100 has no meaning on classes but must be preserved
    class.access_flags = AccessFlags::from_bits_retain(0x0121);
    let bytes = class.to_bytes().unwrap();
    let parsed = ClassFile::parse(&bytes).unwrap();
    assert_eq!(parsed.access_flags.bits(), 0x0121);
    assert_eq!(parsed.to_bytes().unwrap(), bytes);
}

#[test]
fn test_typed_views() {
    let class = ClassFile::parse(&sample_class(52).to_bytes().unwrap()).unwrap();
    let pool = &class.constant_pool;
    let method = &class.methods[0];
    let code = method.code(pool).unwrap().unwrap();

    let instructions = code.instructions().unwrap();
    assert_eq!(instructions.len(), 6);
    assert_eq!(instructions[1].branch_targets(), vec![6]);

    let frames = code
        .attributes
        .iter()
        .find(|a| a.is_named(pool, attr::STACK_MAP_TABLE))
        .map(|a| StackMapTable::decode(&a.info).unwrap())
        .unwrap();
    assert_eq!(frames.offsets(), vec![6]);
    assert!(matches!(frames.frames[0].kind, FrameKind::Same));
}

#[test_case(45 ; "oldest")]
#[test_case(52 ; "java 8")]
#[test_case(MAX_SUPPORTED_MAJOR ; "newest")]
fn test_supported_versions(major: u16) {
    let bytes = sample_class(major).to_bytes().unwrap();
    let parsed = ClassFile::parse(&bytes).unwrap();
    assert_eq!(parsed.major_version, major);
    assert_eq!(ClassFile::peek_version(&bytes), Some((major, 0)));
}

#[test_case(44 ; "too old")]
#[test_case(MAX_SUPPORTED_MAJOR + 1 ; "too new")]
fn test_unsupported_versions(major: u16) {
    let bytes = sample_class(major).to_bytes().unwrap();
    assert_eq!(
        ClassFile::parse(&bytes),
        Err(BytecodeError::UnsupportedVersion { major, minor: 0 })
    );
}

#[test]
fn test_not_a_class_file() {
    assert_eq!(ClassFile::peek_version(b"PK\x03\x04zipdata"), None);
    assert!(matches!(
        ClassFile::parse(b"PK\x03\x04zipdata"),
        Err(BytecodeError::BadMagic(0x504B0304))
    ));
    assert!(ClassFile::parse(&[]).is_err());
}

#[test]
fn test_corrupt_code_is_reported_lazily() {
    let mut class = sample_class(52);
    // Truncate the Code body: the class still parses, decoding the view fails
    let pool = class.constant_pool.clone();
    let code = class.methods[0].find_attribute_mut(&pool, attr::CODE).unwrap();
    code.info.truncate(6);
    let parsed = ClassFile::parse(&class.to_bytes().unwrap()).unwrap();
    assert!(parsed.methods[0].code(&parsed.constant_pool).is_err());
}

proptest! {
    #[test]
    fn prop_truncated_input_is_an_error(cut in 0usize..1000) {
        let bytes = sample_class(52).to_bytes().unwrap();
        let cut = cut % bytes.len();
        prop_assert!(ClassFile::parse(&bytes[..cut]).is_err());
    }

    #[test]
    fn prop_corrupted_input_never_panics(at in 0usize..1000, value in any::<u8>()) {
        let mut bytes = sample_class(52).to_bytes().unwrap();
        let at = at % bytes.len();
        bytes[at] = value;
        if let Ok(class) = ClassFile::parse(&bytes) {
            for method in &class.methods {
                let _ = method.code(&class.constant_pool).map(|code| code.map(|c| c.instructions()));
            }
        }
    }
}
