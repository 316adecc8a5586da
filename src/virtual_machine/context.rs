//! Call frames.
//!
//! An [`ExecutionContext`] is one entry of the invocation stack: the script it
//! runs, a cursor into it, the push-only flag and the breakpoint set. Frames
//! created by `CALL` share the script buffer and the breakpoint set with the
//! frame they were cloned from.

use crate::crypto::Crypto;
use crate::types::bytes::Bytes;
use crate::types::hash::{SCRIPT_HASH_LEN, ScriptHash};
use crate::virtual_machine::errors::VMError;
use std::cell::{OnceCell, RefCell};
use std::collections::HashSet;
use std::rc::Rc;

pub struct ExecutionContext {
    script: Bytes,
    ip: usize,
    push_only: bool,
    breakpoints: Rc<RefCell<HashSet<u32>>>,
    script_hash: OnceCell<ScriptHash>,
}

impl ExecutionContext {
    /// Creates a frame positioned at the start of `script`.
    pub fn new(script: impl Into<Bytes>, push_only: bool) -> Self {
        Self {
            script: script.into(),
            ip: 0,
            push_only,
            breakpoints: Rc::new(RefCell::new(HashSet::new())),
            script_hash: OnceCell::new(),
        }
    }

    /// Copy of this frame for `CALL`. Script, breakpoints and the cached hash
    /// are shared; the cursor is independent.
    pub fn clone_frame(&self) -> Self {
        Self {
            script: self.script.clone(),
            ip: self.ip,
            push_only: self.push_only,
            breakpoints: Rc::clone(&self.breakpoints),
            script_hash: self.script_hash.clone(),
        }
    }

    pub fn script(&self) -> &Bytes {
        &self.script
    }

    /// Offset of the next byte to execute.
    pub fn ip(&self) -> usize {
        self.ip
    }

    pub fn set_ip(&mut self, ip: usize) {
        self.ip = ip;
    }

    pub fn push_only(&self) -> bool {
        self.push_only
    }

    /// True once the cursor has run off the script.
    pub fn is_at_end(&self) -> bool {
        self.ip >= self.script.len()
    }

    /// Hash160 of the script, computed on first use.
    pub fn script_hash(&self, crypto: &dyn Crypto) -> ScriptHash {
        *self
            .script_hash
            .get_or_init(|| ScriptHash(crypto.hash160(&self.script)))
    }

    pub fn add_breakpoint(&self, offset: u32) {
        self.breakpoints.borrow_mut().insert(offset);
    }

    /// Returns true if a breakpoint was removed.
    pub fn remove_breakpoint(&self, offset: u32) -> bool {
        self.breakpoints.borrow_mut().remove(&offset)
    }

    pub fn has_breakpoint(&self, offset: u32) -> bool {
        self.breakpoints.borrow().contains(&offset)
    }

    /// Reads exactly `count` bytes at the cursor and advances past them.
    pub fn read_exact(&mut self, count: usize) -> Result<&[u8], VMError> {
        let start = self.ip;
        let available = self.script.len().saturating_sub(start);
        let end = start
            .checked_add(count)
            .filter(|end| *end <= self.script.len())
            .ok_or(VMError::UnexpectedEndOfScript {
                ip: start,
                requested: count,
                available,
            })?;
        self.ip = end;
        Ok(&self.script[start..end])
    }

    pub fn read_u8(&mut self) -> Result<u8, VMError> {
        Ok(self.read_exact(1)?[0])
    }

    pub fn read_u16(&mut self) -> Result<u16, VMError> {
        let bytes = self.read_array::<2>()?;
        Ok(u16::from_le_bytes(bytes))
    }

    pub fn read_i16(&mut self) -> Result<i16, VMError> {
        let bytes = self.read_array::<2>()?;
        Ok(i16::from_le_bytes(bytes))
    }

    pub fn read_i32(&mut self) -> Result<i32, VMError> {
        let bytes = self.read_array::<4>()?;
        Ok(i32::from_le_bytes(bytes))
    }

    /// Reads `count` bytes as a shared buffer.
    pub fn read_bytes(&mut self, count: usize) -> Result<Bytes, VMError> {
        Ok(Bytes::from(self.read_exact(count)?))
    }

    pub fn read_hash(&mut self) -> Result<ScriptHash, VMError> {
        Ok(ScriptHash(self.read_array::<SCRIPT_HASH_LEN>()?))
    }

    /// Var-int: one byte below `0xFD`, otherwise a `0xFD`/`0xFE`/`0xFF` marker
    /// followed by a u16/u32/u64.
    pub fn read_var_int(&mut self) -> Result<u64, VMError> {
        let value = match self.read_u8()? {
            0xFD => u64::from(u16::from_le_bytes(self.read_array::<2>()?)),
            0xFE => u64::from(u32::from_le_bytes(self.read_array::<4>()?)),
            0xFF => u64::from_le_bytes(self.read_array::<8>()?),
            small => u64::from(small),
        };
        Ok(value)
    }

    /// Var-int length followed by that many bytes. Only `SYSCALL` names use
    /// this form, so an oversized length is reported as a name error.
    pub fn read_var_bytes(&mut self, max: usize) -> Result<Bytes, VMError> {
        let length = self.read_var_int()?;
        if length > max as u64 {
            return Err(VMError::SyscallNameTooLong { length, max });
        }
        self.read_bytes(length as usize)
    }

    /// `PUSHDATA1` operand: u8 length, then the data.
    pub fn read_data1(&mut self) -> Result<Bytes, VMError> {
        let length = self.read_u8()?;
        self.read_bytes(usize::from(length))
    }

    /// `PUSHDATA2` operand: u16 length, then the data.
    pub fn read_data2(&mut self) -> Result<Bytes, VMError> {
        let length = self.read_u16()?;
        self.read_bytes(usize::from(length))
    }

    /// `PUSHDATA4` operand: i32 length, then the data. Negative lengths fail.
    pub fn read_data4(&mut self) -> Result<Bytes, VMError> {
        let length = self.read_i32()?;
        let length = usize::try_from(length).map_err(|_| VMError::NegativeLength {
            length: i64::from(length),
        })?;
        self.read_bytes(length)
    }

    fn read_array<const N: usize>(&mut self) -> Result<[u8; N], VMError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.read_exact(N)?);
        Ok(out)
    }
}
