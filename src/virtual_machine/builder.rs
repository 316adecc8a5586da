//! Bytecode encoder.
//!
//! [`ScriptBuilder`] is the inverse of the engine's decoder: every helper
//! writes exactly the byte form the dispatcher reads back.

use crate::types::bytes::Bytes;
use crate::types::hash::ScriptHash;
use crate::virtual_machine::errors::VMError;
use crate::virtual_machine::isa::{Instruction, MAX_SYSCALL_NAME, PUSHBYTES75};
use crate::virtual_machine::value::integer_to_bytes;
use num_bigint::BigInt;
use num_traits::ToPrimitive;

#[derive(Debug, Default, Clone)]
pub struct ScriptBuilder {
    script: Vec<u8>,
}

impl ScriptBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of bytes written so far.
    pub fn offset(&self) -> usize {
        self.script.len()
    }

    /// Appends a bare opcode.
    pub fn emit(&mut self, instr: Instruction) -> &mut Self {
        self.script.push(instr.opcode());
        self
    }

    /// Appends an opcode followed by a raw operand.
    pub fn emit_with(&mut self, instr: Instruction, operand: &[u8]) -> &mut Self {
        self.script.push(instr.opcode());
        self.script.extend_from_slice(operand);
        self
    }

    /// `APPCALL hash`, or `TAILCALL hash` when `tail` is set.
    pub fn emit_app_call(&mut self, hash: &ScriptHash, tail: bool) -> &mut Self {
        let instr = if tail {
            Instruction::TailCall
        } else {
            Instruction::AppCall
        };
        self.emit_with(instr, hash.as_slice())
    }

    /// A jump-class opcode with its signed 16-bit offset, measured from the
    /// jump's own address.
    pub fn emit_jump(&mut self, instr: Instruction, offset: i16) -> Result<&mut Self, VMError> {
        if !instr.is_jump() {
            return Err(VMError::NotAJump {
                instruction: instr.mnemonic(),
            });
        }
        Ok(self.emit_with(instr, &offset.to_le_bytes()))
    }

    /// Shortest push of an integer: `PUSHM1`, `PUSH0`, `PUSH1`..`PUSH16`, or
    /// its minimal byte form.
    pub fn emit_push_int(&mut self, value: impl Into<BigInt>) -> &mut Self {
        let value = value.into();
        match value.to_i8() {
            Some(-1) => self.emit(Instruction::PushM1),
            Some(0) => self.emit(Instruction::Push0),
            Some(n @ 1..=16) => {
                let opcode = Instruction::Push1.opcode() + (n as u8 - 1);
                self.script.push(opcode);
                self
            }
            _ => self.emit_push_bytes(&integer_to_bytes(&value)),
        }
    }

    /// `PUSH1` for true, `PUSH0` for false.
    pub fn emit_push_bool(&mut self, value: bool) -> &mut Self {
        if value {
            self.emit(Instruction::Push1)
        } else {
            self.emit(Instruction::Push0)
        }
    }

    /// Shortest push of a byte buffer.
    ///
    /// Up to 75 bytes use the length itself as the opcode; longer buffers use
    /// `PUSHDATA1`, `PUSHDATA2` or `PUSHDATA4`.
    pub fn emit_push_bytes(&mut self, data: &[u8]) -> &mut Self {
        let len = data.len();
        if len <= PUSHBYTES75 as usize {
            self.script.push(len as u8);
        } else if len < 0x100 {
            self.emit_with(Instruction::PushData1, &[len as u8]);
        } else if len < 0x10000 {
            self.emit_with(Instruction::PushData2, &(len as u16).to_le_bytes());
        } else {
            self.emit_with(Instruction::PushData4, &(len as u32).to_le_bytes());
        }
        self.script.extend_from_slice(data);
        self
    }

    /// `SYSCALL` with a length-prefixed ASCII name of 1 to 252 bytes.
    pub fn emit_syscall(&mut self, name: &str) -> Result<&mut Self, VMError> {
        if name.is_empty() || !name.is_ascii() {
            return Err(VMError::InvalidSyscallName {
                name: name.to_string(),
            });
        }
        if name.len() > MAX_SYSCALL_NAME {
            return Err(VMError::SyscallNameTooLong {
                length: name.len() as u64,
                max: MAX_SYSCALL_NAME,
            });
        }
        self.emit(Instruction::Syscall);
        self.script.push(name.len() as u8);
        self.script.extend_from_slice(name.as_bytes());
        Ok(self)
    }

    /// Copy of the script written so far.
    pub fn to_vec(&self) -> Vec<u8> {
        self.script.clone()
    }

    pub fn into_bytes(self) -> Bytes {
        Bytes::new(self.script)
    }
}
