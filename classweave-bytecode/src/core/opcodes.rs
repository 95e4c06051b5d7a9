//! Opcode definitions for the JVM instruction set

/// How the operand bytes following an opcode are laid out
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperandShape {
    /// No operands
    None,
    /// One signed or unsigned immediate byte (`bipush`, `newarray`)
    Byte,
    /// Two immediate bytes (`sipush`)
    Short,
    /// One-byte local variable index
    Local,
    /// One-byte constant pool index (`ldc`)
    ConstantByte,
    /// Two-byte constant pool index
    Constant,
    /// Local index and signed increment (`iinc`)
    Iinc,
    /// Signed 16-bit branch offset
    Branch,
    /// Signed 32-bit branch offset
    BranchWide,
    /// Constant index, count and a zero byte
    InvokeInterface,
    /// Constant index and two zero bytes
    InvokeDynamic,
    /// Constant index and dimension count
    MultiANewArray,
    TableSwitch,
    LookupSwitch,
    /// Prefix widening the following local-variable instruction
    Wide,
}

impl OperandShape {
    /// Operand length in bytes, `None` for variable-length shapes
    pub const fn fixed_len(self) -> Option<usize> {
        match self {
            OperandShape::None => Some(0),
            OperandShape::Byte | OperandShape::Local | OperandShape::ConstantByte => Some(1),
            OperandShape::Short | OperandShape::Constant | OperandShape::Iinc => Some(2),
            OperandShape::Branch => Some(2),
            OperandShape::MultiANewArray => Some(3),
            OperandShape::BranchWide
            | OperandShape::InvokeInterface
            | OperandShape::InvokeDynamic => Some(4),
            OperandShape::TableSwitch | OperandShape::LookupSwitch | OperandShape::Wide => None,
        }
    }
}

macro_rules! opcodes {
    ($($name:ident = $byte:literal => $shape:ident),* $(,)?) => {
        /// Primary opcode enumeration (8 bits)
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        #[repr(u8)]
        #[allow(non_camel_case_types)] // Opcodes follow the JVM mnemonic convention
        pub enum Opcode {
            $($name = $byte,)*
        }

        impl Opcode {
            /// Parse opcode from byte
            pub const fn from_byte(byte: u8) -> Option<Self> {
                match byte {
                    $($byte => Some(Opcode::$name),)*
                    _ => None,
                }
            }

            /// Upper-case mnemonic, as spelled in the enum
            pub const fn mnemonic(self) -> &'static str {
                match self {
                    $(Opcode::$name => stringify!($name),)*
                }
            }

            pub const fn shape(self) -> OperandShape {
                match self {
                    $(Opcode::$name => OperandShape::$shape,)*
                }
            }
        }
    };
}

opcodes! {
    NOP = 0x00 => None,
    ACONST_NULL = 0x01 => None,
    ICONST_M1 = 0x02 => None,
    ICONST_0 = 0x03 => None,
    ICONST_1 = 0x04 => None,
    ICONST_2 = 0x05 => None,
    ICONST_3 = 0x06 => None,
    ICONST_4 = 0x07 => None,
    ICONST_5 = 0x08 => None,
    LCONST_0 = 0x09 => None,
    LCONST_1 = 0x0a => None,
    FCONST_0 = 0x0b => None,
    FCONST_1 = 0x0c => None,
    FCONST_2 = 0x0d => None,
    DCONST_0 = 0x0e => None,
    DCONST_1 = 0x0f => None,
    BIPUSH = 0x10 => Byte,
    SIPUSH = 0x11 => Short,
    LDC = 0x12 => ConstantByte,
    LDC_W = 0x13 => Constant,
    LDC2_W = 0x14 => Constant,
    ILOAD = 0x15 => Local,
    LLOAD = 0x16 => Local,
    FLOAD = 0x17 => Local,
    DLOAD = 0x18 => Local,
    ALOAD = 0x19 => Local,
    ILOAD_0 = 0x1a => None,
    ILOAD_1 = 0x1b => None,
    ILOAD_2 = 0x1c => None,
    ILOAD_3 = 0x1d => None,
    LLOAD_0 = 0x1e => None,
    LLOAD_1 = 0x1f => None,
    LLOAD_2 = 0x20 => None,
    LLOAD_3 = 0x21 => None,
    FLOAD_0 = 0x22 => None,
    FLOAD_1 = 0x23 => None,
    FLOAD_2 = 0x24 => None,
    FLOAD_3 = 0x25 => None,
    DLOAD_0 = 0x26 => None,
    DLOAD_1 = 0x27 => None,
    DLOAD_2 = 0x28 => None,
    DLOAD_3 = 0x29 => None,
    ALOAD_0 = 0x2a => None,
    ALOAD_1 = 0x2b => None,
    ALOAD_2 = 0x2c => None,
    ALOAD_3 = 0x2d => None,
    IALOAD = 0x2e => None,
    LALOAD = 0x2f => None,
    FALOAD = 0x30 => None,
    DALOAD = 0x31 => None,
    AALOAD = 0x32 => None,
    BALOAD = 0x33 => None,
    CALOAD = 0x34 => None,
    SALOAD = 0x35 => None,
    ISTORE = 0x36 => Local,
    LSTORE = 0x37 => Local,
    FSTORE = 0x38 => Local,
    DSTORE = 0x39 => Local,
    ASTORE = 0x3a => Local,
    ISTORE_0 = 0x3b => None,
    ISTORE_1 = 0x3c => None,
    ISTORE_2 = 0x3d => None,
    ISTORE_3 = 0x3e => None,
    LSTORE_0 = 0x3f => None,
    LSTORE_1 = 0x40 => None,
    LSTORE_2 = 0x41 => None,
    LSTORE_3 = 0x42 => None,
    FSTORE_0 = 0x43 => None,
    FSTORE_1 = 0x44 => None,
    FSTORE_2 = 0x45 => None,
    FSTORE_3 = 0x46 => None,
    DSTORE_0 = 0x47 => None,
    DSTORE_1 = 0x48 => None,
    DSTORE_2 = 0x49 => None,
    DSTORE_3 = 0x4a => None,
    ASTORE_0 = 0x4b => None,
    ASTORE_1 = 0x4c => None,
    ASTORE_2 = 0x4d => None,
    ASTORE_3 = 0x4e => None,
    IASTORE = 0x4f => None,
    LASTORE = 0x50 => None,
    FASTORE = 0x51 => None,
    DASTORE = 0x52 => None,
    AASTORE = 0x53 => None,
    BASTORE = 0x54 => None,
    CASTORE = 0x55 => None,
    SASTORE = 0x56 => None,
    POP = 0x57 => None,
    POP2 = 0x58 => None,
    DUP = 0x59 => None,
    DUP_X1 = 0x5a => None,
    DUP_X2 = 0x5b => None,
    DUP2 = 0x5c => None,
    DUP2_X1 = 0x5d => None,
    DUP2_X2 = 0x5e => None,
    SWAP = 0x5f => None,
    IADD = 0x60 => None,
    LADD = 0x61 => None,
    FADD = 0x62 => None,
    DADD = 0x63 => None,
    ISUB = 0x64 => None,
    LSUB = 0x65 => None,
    FSUB = 0x66 => None,
    DSUB = 0x67 => None,
    IMUL = 0x68 => None,
    LMUL = 0x69 => None,
    FMUL = 0x6a => None,
    DMUL = 0x6b => None,
    IDIV = 0x6c => None,
    LDIV = 0x6d => None,
    FDIV = 0x6e => None,
    DDIV = 0x6f => None,
    IREM = 0x70 => None,
    LREM = 0x71 => None,
    FREM = 0x72 => None,
    DREM = 0x73 => None,
    INEG = 0x74 => None,
    LNEG = 0x75 => None,
    FNEG = 0x76 => None,
    DNEG = 0x77 => None,
    ISHL = 0x78 => None,
    LSHL = 0x79 => None,
    ISHR = 0x7a => None,
    LSHR = 0x7b => None,
    IUSHR = 0x7c => None,
    LUSHR = 0x7d => None,
    IAND = 0x7e => None,
    LAND = 0x7f => None,
    IOR = 0x80 => None,
    LOR = 0x81 => None,
    IXOR = 0x82 => None,
    LXOR = 0x83 => None,
    IINC = 0x84 => Iinc,
    I2L = 0x85 => None,
    I2F = 0x86 => None,
    I2D = 0x87 => None,
    L2I = 0x88 => None,
    L2F = 0x89 => None,
    L2D = 0x8a => None,
    F2I = 0x8b => None,
    F2L = 0x8c => None,
    F2D = 0x8d => None,
    D2I = 0x8e => None,
    D2L = 0x8f => None,
    D2F = 0x90 => None,
    I2B = 0x91 => None,
    I2C = 0x92 => None,
    I2S = 0x93 => None,
    LCMP = 0x94 => None,
    FCMPL = 0x95 => None,
    FCMPG = 0x96 => None,
    DCMPL = 0x97 => None,
    DCMPG = 0x98 => None,
    IFEQ = 0x99 => Branch,
    IFNE = 0x9a => Branch,
    IFLT = 0x9b => Branch,
    IFGE = 0x9c => Branch,
    IFGT = 0x9d => Branch,
    IFLE = 0x9e => Branch,
    IF_ICMPEQ = 0x9f => Branch,
    IF_ICMPNE = 0xa0 => Branch,
    IF_ICMPLT = 0xa1 => Branch,
    IF_ICMPGE = 0xa2 => Branch,
    IF_ICMPGT = 0xa3 => Branch,
    IF_ICMPLE = 0xa4 => Branch,
    IF_ACMPEQ = 0xa5 => Branch,
    IF_ACMPNE = 0xa6 => Branch,
    GOTO = 0xa7 => Branch,
    JSR = 0xa8 => Branch,
    RET = 0xa9 => Local,
    TABLESWITCH = 0xaa => TableSwitch,
    LOOKUPSWITCH = 0xab => LookupSwitch,
    IRETURN = 0xac => None,
    LRETURN = 0xad => None,
    FRETURN = 0xae => None,
    DRETURN = 0xaf => None,
    ARETURN = 0xb0 => None,
    RETURN = 0xb1 => None,
    GETSTATIC = 0xb2 => Constant,
    PUTSTATIC = 0xb3 => Constant,
    GETFIELD = 0xb4 => Constant,
    PUTFIELD = 0xb5 => Constant,
    INVOKEVIRTUAL = 0xb6 => Constant,
    INVOKESPECIAL = 0xb7 => Constant,
    INVOKESTATIC = 0xb8 => Constant,
    INVOKEINTERFACE = 0xb9 => InvokeInterface,
    INVOKEDYNAMIC = 0xba => InvokeDynamic,
    NEW = 0xbb => Constant,
    NEWARRAY = 0xbc => Byte,
    ANEWARRAY = 0xbd => Constant,
    ARRAYLENGTH = 0xbe => None,
    ATHROW = 0xbf => None,
    CHECKCAST = 0xc0 => Constant,
    INSTANCEOF = 0xc1 => Constant,
    MONITORENTER = 0xc2 => None,
    MONITOREXIT = 0xc3 => None,
    WIDE = 0xc4 => Wide,
    MULTIANEWARRAY = 0xc5 => MultiANewArray,
    IFNULL = 0xc6 => Branch,
    IFNONNULL = 0xc7 => Branch,
    GOTO_W = 0xc8 => BranchWide,
    JSR_W = 0xc9 => BranchWide,
}

impl Opcode {
    /// Check if this opcode transfers control to an encoded offset
    pub fn is_branch(self) -> bool {
        matches!(
            self.shape(),
            OperandShape::Branch
                | OperandShape::BranchWide
                | OperandShape::TableSwitch
                | OperandShape::LookupSwitch
        )
    }

    /// Check if this opcode leaves the method
    pub fn is_return(self) -> bool {
        matches!(
            self,
            Opcode::IRETURN
                | Opcode::LRETURN
                | Opcode::FRETURN
                | Opcode::DRETURN
                | Opcode::ARETURN
                | Opcode::RETURN
                | Opcode::ATHROW
        )
    }

    /// Check if the operand is a constant pool index
    pub fn references_constant(self) -> bool {
        matches!(
            self.shape(),
            OperandShape::ConstantByte
                | OperandShape::Constant
                | OperandShape::InvokeInterface
                | OperandShape::InvokeDynamic
                | OperandShape::MultiANewArray
        )
    }

    /// Opcodes that may follow the `wide` prefix
    pub fn is_widenable(self) -> bool {
        matches!(
            self,
            Opcode::ILOAD
                | Opcode::LLOAD
                | Opcode::FLOAD
                | Opcode::DLOAD
                | Opcode::ALOAD
                | Opcode::ISTORE
                | Opcode::LSTORE
                | Opcode::FSTORE
                | Opcode::DSTORE
                | Opcode::ASTORE
                | Opcode::RET
                | Opcode::IINC
        )
    }
}
