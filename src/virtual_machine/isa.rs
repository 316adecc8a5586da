//! Instruction Set Architecture (ISA) definitions.
//!
//! The [`for_each_instruction!`](crate::for_each_instruction) macro holds the
//! canonical opcode table and invokes a callback macro for code generation, so
//! the engine's dispatcher, the assembler and the disassembler never duplicate
//! the list.
//!
//! This module generates:
//! - The [`Instruction`] enum with opcode mappings
//! - `TryFrom<u8>` for decoding opcodes
//! - Mnemonic lookup in both directions
//!
//! # Bytecode Format
//!
//! Every instruction is a one-byte opcode optionally followed by an operand:
//! - `Offset`: signed 16-bit little-endian jump offset, relative to the opcode address
//! - `Hash160`: 20-byte script hash
//! - `VarBytes`: var-int length (at most 252) followed by that many bytes
//! - `Data1` / `Data2` / `Data4`: 1-, 2- or 4-byte little-endian length followed by data
//!
//! Opcodes `0x01..=0x4B` are not listed in the table: each pushes the next
//! `opcode` bytes verbatim (`PUSHBYTES1`..`PUSHBYTES75`).

use crate::virtual_machine::errors::VMError;

/// First direct-push opcode; pushes the following byte.
pub const PUSHBYTES1: u8 = 0x01;
/// Last direct-push opcode; pushes the following 75 bytes.
pub const PUSHBYTES75: u8 = 0x4B;
/// Longest syscall name accepted by `SYSCALL`.
pub const MAX_SYSCALL_NAME: usize = 252;

/// Invokes a callback macro with the complete instruction definition list.
#[macro_export]
macro_rules! for_each_instruction {
    ($callback:ident) => {
        $callback! {
            // =========================
            // Constants
            // =========================
            /// PUSH0 ; pushes an empty byte array
            Push0 = 0x00, "PUSH0" => [],
            /// PUSHDATA1 len:u8 data ; pushes data
            PushData1 = 0x4C, "PUSHDATA1" => [data: Data1],
            /// PUSHDATA2 len:u16 data ; pushes data
            PushData2 = 0x4D, "PUSHDATA2" => [data: Data2],
            /// PUSHDATA4 len:i32 data ; pushes data
            PushData4 = 0x4E, "PUSHDATA4" => [data: Data4],
            /// PUSHM1 ; pushes -1
            PushM1 = 0x4F, "PUSHM1" => [],
            /// PUSH1 ; pushes 1
            Push1 = 0x51, "PUSH1" => [],
            Push2 = 0x52, "PUSH2" => [],
            Push3 = 0x53, "PUSH3" => [],
            Push4 = 0x54, "PUSH4" => [],
            Push5 = 0x55, "PUSH5" => [],
            Push6 = 0x56, "PUSH6" => [],
            Push7 = 0x57, "PUSH7" => [],
            Push8 = 0x58, "PUSH8" => [],
            Push9 = 0x59, "PUSH9" => [],
            Push10 = 0x5A, "PUSH10" => [],
            Push11 = 0x5B, "PUSH11" => [],
            Push12 = 0x5C, "PUSH12" => [],
            Push13 = 0x5D, "PUSH13" => [],
            Push14 = 0x5E, "PUSH14" => [],
            Push15 = 0x5F, "PUSH15" => [],
            /// PUSH16 ; pushes 16, the last push-class opcode
            Push16 = 0x60, "PUSH16" => [],
            // =========================
            // Control Flow
            // =========================
            /// NOP ; does nothing
            Nop = 0x61, "NOP" => [],
            /// JMP offset ; ip = opcode address + offset
            Jmp = 0x62, "JMP" => [offset: Offset],
            /// JMPIF offset ; pops a bool and jumps if true
            JmpIf = 0x63, "JMPIF" => [offset: Offset],
            /// JMPIFNOT offset ; pops a bool and jumps if false
            JmpIfNot = 0x64, "JMPIFNOT" => [offset: Offset],
            /// CALL offset ; runs a copy of the current frame from the jump target
            Call = 0x65, "CALL" => [offset: Offset],
            /// RET ; pops the current frame, halting when none remain
            Ret = 0x66, "RET" => [],
            /// APPCALL hash ; loads the script with the given hash as a new frame
            AppCall = 0x67, "APPCALL" => [hash: Hash160],
            /// SYSCALL name ; invokes a registered host call
            Syscall = 0x68, "SYSCALL" => [name: VarBytes],
            /// TAILCALL hash ; replaces the current frame with the script with the given hash
            TailCall = 0x69, "TAILCALL" => [hash: Hash160],
            // =========================
            // Stack
            // =========================
            /// DUPFROMALTSTACK ; copies the alt stack top onto the evaluation stack
            DupFromAltStack = 0x6A, "DUPFROMALTSTACK" => [],
            /// TOALTSTACK ; moves the top item to the alt stack
            ToAltStack = 0x6B, "TOALTSTACK" => [],
            /// FROMALTSTACK ; moves the alt stack top back
            FromAltStack = 0x6C, "FROMALTSTACK" => [],
            /// XDROP ; pops n and removes the item at depth n
            XDrop = 0x6D, "XDROP" => [],
            /// XSWAP ; pops n and swaps the top with the item at depth n
            XSwap = 0x72, "XSWAP" => [],
            /// XTUCK ; pops n and inserts a copy of the top at depth n
            XTuck = 0x73, "XTUCK" => [],
            /// DEPTH ; pushes the evaluation stack size
            Depth = 0x74, "DEPTH" => [],
            Drop = 0x75, "DROP" => [],
            Dup = 0x76, "DUP" => [],
            /// NIP ; removes the second item
            Nip = 0x77, "NIP" => [],
            /// OVER ; copies the second item to the top
            Over = 0x78, "OVER" => [],
            /// PICK ; pops n and copies the item at depth n to the top
            Pick = 0x79, "PICK" => [],
            /// ROLL ; pops n and moves the item at depth n to the top
            Roll = 0x7A, "ROLL" => [],
            /// ROT ; a b c -> b c a
            Rot = 0x7B, "ROT" => [],
            Swap = 0x7C, "SWAP" => [],
            /// TUCK ; a b -> b a b
            Tuck = 0x7D, "TUCK" => [],
            // =========================
            // Splice
            // =========================
            /// CAT ; a b -> a||b
            Cat = 0x7E, "CAT" => [],
            /// SUBSTR ; data index count -> data[index..index+count]
            SubStr = 0x7F, "SUBSTR" => [],
            /// LEFT ; data count -> data[..count]
            Left = 0x80, "LEFT" => [],
            /// RIGHT ; data count -> data[len-count..]
            Right = 0x81, "RIGHT" => [],
            /// SIZE ; pushes the byte length of the top item
            Size = 0x82, "SIZE" => [],
            // =========================
            // Bitwise
            // =========================
            Invert = 0x83, "INVERT" => [],
            And = 0x84, "AND" => [],
            Or = 0x85, "OR" => [],
            Xor = 0x86, "XOR" => [],
            /// EQUAL ; pushes whether the two top items are equal
            Equal = 0x87, "EQUAL" => [],
            // =========================
            // Arithmetic
            // =========================
            Inc = 0x8B, "INC" => [],
            Dec = 0x8C, "DEC" => [],
            /// SIGN ; pushes -1, 0 or 1
            Sign = 0x8D, "SIGN" => [],
            Negate = 0x8F, "NEGATE" => [],
            Abs = 0x90, "ABS" => [],
            /// NOT ; boolean negation
            Not = 0x91, "NOT" => [],
            /// NZ ; pushes x != 0
            Nz = 0x92, "NZ" => [],
            Add = 0x93, "ADD" => [],
            Sub = 0x94, "SUB" => [],
            Mul = 0x95, "MUL" => [],
            /// DIV ; truncating division, faults on zero
            Div = 0x96, "DIV" => [],
            /// MOD ; remainder with the dividend's sign, faults on zero
            Mod = 0x97, "MOD" => [],
            Shl = 0x98, "SHL" => [],
            Shr = 0x99, "SHR" => [],
            BoolAnd = 0x9A, "BOOLAND" => [],
            BoolOr = 0x9B, "BOOLOR" => [],
            NumEqual = 0x9C, "NUMEQUAL" => [],
            NumNotEqual = 0x9E, "NUMNOTEQUAL" => [],
            Lt = 0x9F, "LT" => [],
            Gt = 0xA0, "GT" => [],
            Lte = 0xA1, "LTE" => [],
            Gte = 0xA2, "GTE" => [],
            Min = 0xA3, "MIN" => [],
            Max = 0xA4, "MAX" => [],
            /// WITHIN ; x a b -> a <= x < b
            Within = 0xA5, "WITHIN" => [],
            // =========================
            // Crypto
            // =========================
            Sha1 = 0xA7, "SHA1" => [],
            Sha256 = 0xA8, "SHA256" => [],
            Hash160 = 0xA9, "HASH160" => [],
            Hash256 = 0xAA, "HASH256" => [],
            /// CHECKSIG ; signature pubkey -> bool, over the container message
            CheckSig = 0xAC, "CHECKSIG" => [],
            /// CHECKMULTISIG ; sigs.. m keys.. n -> bool
            CheckMultiSig = 0xAE, "CHECKMULTISIG" => [],
            // =========================
            // Containers
            // =========================
            /// ARRAYSIZE ; element count of a container, byte length otherwise
            ArraySize = 0xC0, "ARRAYSIZE" => [],
            /// PACK ; items.. n -> array (top item at index 0)
            Pack = 0xC1, "PACK" => [],
            /// UNPACK ; array -> items.. n
            Unpack = 0xC2, "UNPACK" => [],
            /// PICKITEM ; array index -> item
            PickItem = 0xC3, "PICKITEM" => [],
            /// SETITEM ; array index item ->
            SetItem = 0xC4, "SETITEM" => [],
            /// NEWARRAY ; n -> array of n `false`
            NewArray = 0xC5, "NEWARRAY" => [],
            /// NEWSTRUCT ; n -> struct of n `false`
            NewStruct = 0xC6, "NEWSTRUCT" => [],
        }
    };
}

#[macro_export]
macro_rules! define_instructions {
    (
        $(
            $(#[$doc:meta])*
            $name:ident = $opcode:literal, $mnemonic:literal => [
                $( $field:ident : $kind:ident ),* $(,)?
            ]
        ),* $(,)?
    ) => {
        // =========================
        // VM instruction enum
        // =========================
        #[repr(u8)]
        #[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
        pub enum Instruction {
            $(
                $(#[$doc])*
                $name = $opcode,
            )*
        }

        impl TryFrom<u8> for Instruction {
            type Error = VMError;

            fn try_from(value: u8) -> Result<Self, Self::Error> {
                match value {
                    $( $opcode => Ok(Instruction::$name), )*
                    _ => Err(VMError::InvalidOpcode {
                        opcode: value,
                        offset: 0,
                    }),
                }
            }
        }

        impl Instruction {
            /// Every instruction in opcode order.
            pub const ALL: &'static [Instruction] = &[ $( Instruction::$name, )* ];

            /// Returns the assembly mnemonic for this instruction.
            pub const fn mnemonic(&self) -> &'static str {
                match self {
                    $( Instruction::$name => $mnemonic, )*
                }
            }

            /// Looks up an instruction by its mnemonic (case-sensitive).
            pub fn from_mnemonic(name: &str) -> Option<Instruction> {
                match name {
                    $( $mnemonic => Some(Instruction::$name), )*
                    _ => None,
                }
            }

            /// Returns the operand kind following the opcode, if any.
            pub const fn operand(&self) -> Option<OperandKind> {
                match self {
                    $( Instruction::$name => define_instructions!(@operand $( $kind )*), )*
                }
            }
        }
    };

    // ---------- operand kinds ----------
    (@operand) => { None };
    (@operand $kind:ident) => { Some(OperandKind::$kind) };

    // ---------- types ----------
    (@ty Offset)   => { i16 };
    (@ty Hash160)  => { $crate::types::hash::ScriptHash };
    (@ty VarBytes) => { $crate::types::bytes::Bytes };
    (@ty Data1)    => { $crate::types::bytes::Bytes };
    (@ty Data2)    => { $crate::types::bytes::Bytes };
    (@ty Data4)    => { $crate::types::bytes::Bytes };
}

/// Operand encodings that may follow an opcode.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum OperandKind {
    /// Signed 16-bit relative jump offset.
    Offset,
    /// 20-byte script hash.
    Hash160,
    /// Var-int length prefixed bytes.
    VarBytes,
    /// 1-byte length prefixed bytes.
    Data1,
    /// 2-byte length prefixed bytes.
    Data2,
    /// 4-byte length prefixed bytes.
    Data4,
}

for_each_instruction!(define_instructions);

impl Instruction {
    /// Returns the opcode byte.
    pub const fn opcode(self) -> u8 {
        self as u8
    }

    /// Returns true for opcodes that take a relative jump operand.
    pub const fn is_jump(self) -> bool {
        matches!(
            self,
            Instruction::Jmp | Instruction::JmpIf | Instruction::JmpIfNot | Instruction::Call
        )
    }

    /// Returns the integer pushed by `PUSHM1` and `PUSH1`..`PUSH16`.
    pub const fn small_int(self) -> Option<i8> {
        match self {
            Instruction::PushM1 => Some(-1),
            _ if self as u8 >= Instruction::Push1 as u8
                && self as u8 <= Instruction::Push16 as u8 =>
            {
                Some((self as u8 - Instruction::Push1 as u8 + 1) as i8)
            }
            _ => None,
        }
    }
}

/// Returns true for bytes up to `PUSH16`, the only opcodes besides `RET` a
/// push-only frame may execute.
pub const fn is_push_opcode(opcode: u8) -> bool {
    opcode <= Instruction::Push16 as u8
}

/// Returns true if `opcode` is one of the direct-push opcodes `PUSHBYTES1..=PUSHBYTES75`.
pub const fn is_push_bytes(opcode: u8) -> bool {
    opcode >= PUSHBYTES1 && opcode <= PUSHBYTES75
}
