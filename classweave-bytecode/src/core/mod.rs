pub mod annotations;
pub mod classfile;
pub mod code;
pub mod constants;
pub mod descriptor;
pub mod instructions;
pub mod io;
pub mod opcodes;
pub mod stack_map;

// Re-export core types
pub use self::annotations::{Annotation, ElementValue};
pub use self::classfile::{AccessFlags, Attribute, ClassFile, Member};
pub use self::code::{CodeAttribute, ExceptionEntry, LineNumberTable, LocalVariableTable};
pub use self::constants::{Constant, ConstantPool, MemberRef};
pub use self::descriptor::{FieldType, MethodDescriptor};
pub use self::instructions::{Instruction, Operand};
pub use self::opcodes::Opcode;
pub use self::stack_map::StackMapTable;
