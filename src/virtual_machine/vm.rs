//! Stack-based execution engine.
//!
//! The engine runs scripts one opcode at a time against three stacks:
//! the invocation stack of [`ExecutionContext`] frames, and the evaluation and
//! alt stacks of [`StackItem`]s, which every frame shares. Values cross
//! `CALL`, `APPCALL` and `TAILCALL` boundaries only through those shared stacks.
//!
//! Any error raised while dispatching an opcode moves the engine to
//! [`VMState::Fault`] and is kept as [`ExecutionEngine::fault_reason`]; it never
//! propagates out of [`ExecutionEngine::step_into`].

use crate::crypto::{self, Crypto};
use crate::debug;
use crate::types::bytes::Bytes;
use crate::types::hash::ScriptHash;
use crate::virtual_machine::context::ExecutionContext;
use crate::virtual_machine::errors::VMError;
use crate::virtual_machine::host::{ScriptContainer, ScriptTable};
use crate::virtual_machine::interop::InteropService;
use crate::virtual_machine::isa::{Instruction, MAX_SYSCALL_NAME, is_push_bytes, is_push_opcode};
use crate::virtual_machine::stack::RandomAccessStack;
use crate::virtual_machine::state::VMState;
use crate::virtual_machine::value::StackItem;
use num_bigint::BigInt;
use num_traits::{Signed, Zero};
use std::rc::Rc;

/// Size of a jump instruction: opcode plus 16-bit offset.
const JUMP_SIZE: i64 = 3;

macro_rules! exec_vm {
    // Entry point
    (
        vm = $vm:ident,
        instr = $instr:ident,
        { $( $variant:ident => $handler:ident ( $( $field:ident : $kind:ident ),* $(,)? ) ),* $(,)? }
    ) => {{
        match $instr {
            $(
                Instruction::$variant => {
                    $( let $field = exec_vm!(@read $vm, $kind)?; )*
                    $vm.$handler($instr, $( $field ),*)
                }
            ),*
        }
    }};

    // Signed 16-bit jump offset
    (@read $vm:ident, Offset) => {{
        $vm.current_context_mut()?.read_i16()
    }};

    // 20-byte script hash
    (@read $vm:ident, Hash160) => {{
        $vm.current_context_mut()?.read_hash()
    }};

    // Var-int length prefixed syscall name
    (@read $vm:ident, VarBytes) => {{
        $vm.current_context_mut()?.read_var_bytes(MAX_SYSCALL_NAME)
    }};

    // Length prefixed data
    (@read $vm:ident, Data1) => {{
        $vm.current_context_mut()?.read_data1()
    }};

    (@read $vm:ident, Data2) => {{
        $vm.current_context_mut()?.read_data2()
    }};

    (@read $vm:ident, Data4) => {{
        $vm.current_context_mut()?.read_data4()
    }};
}

/// Script interpreter.
///
/// Borrows its crypto capability and optional script table from the host for
/// `'a`; the script container and interop service are owned.
pub struct ExecutionEngine<'a> {
    crypto: &'a dyn Crypto,
    table: Option<&'a dyn ScriptTable>,
    container: Option<Rc<dyn ScriptContainer>>,
    service: InteropService,
    invocation_stack: RandomAccessStack<ExecutionContext>,
    evaluation_stack: RandomAccessStack<StackItem>,
    alt_stack: RandomAccessStack<StackItem>,
    state: VMState,
    fault_reason: Option<VMError>,
}

impl<'a> ExecutionEngine<'a> {
    /// Creates an engine with the built-in interop service, no script table
    /// and no script container.
    pub fn new(crypto: &'a dyn Crypto) -> Self {
        Self {
            crypto,
            table: None,
            container: None,
            service: InteropService::new(),
            invocation_stack: RandomAccessStack::new(),
            evaluation_stack: RandomAccessStack::new(),
            alt_stack: RandomAccessStack::new(),
            state: VMState::None,
            fault_reason: None,
        }
    }

    /// Resolver used by `APPCALL` and `TAILCALL`.
    pub fn with_table(mut self, table: &'a dyn ScriptTable) -> Self {
        self.table = Some(table);
        self
    }

    /// Object whose message `CHECKSIG`/`CHECKMULTISIG` verify.
    pub fn with_container(mut self, container: Rc<dyn ScriptContainer>) -> Self {
        self.container = Some(container);
        self
    }

    pub fn with_service(mut self, service: InteropService) -> Self {
        self.service = service;
        self
    }

    /// Pushes `script` as a new frame on top of the invocation stack.
    pub fn load_script(&mut self, script: impl Into<Bytes>, push_only: bool) {
        self.invocation_stack
            .push(ExecutionContext::new(script, push_only));
    }

    // ==================== Drivers ====================

    /// Runs until the engine halts, faults or reaches a breakpoint.
    pub fn execute(&mut self) -> VMState {
        self.resume();
        while !self.state.is_stopped() {
            self.step_into();
        }
        self.state
    }

    /// Executes a single opcode of the current frame.
    ///
    /// A terminal engine is left untouched. An empty invocation stack halts.
    pub fn step_into(&mut self) {
        if self.state.is_terminal() {
            return;
        }
        if self.invocation_stack.is_empty() {
            self.state = VMState::Halt;
            return;
        }
        let offset = self.invocation_stack.peek(0).map(|c| c.ip()).unwrap_or(0);
        match self.execute_next() {
            Ok(()) => {
                if self.at_breakpoint() {
                    self.state = VMState::Break;
                }
            }
            Err(err) => {
                debug!("fault at offset {offset}: {err}");
                self.state = VMState::Fault;
                self.fault_reason = Some(err);
            }
        }
    }

    /// Runs until the current frame returns.
    pub fn step_out(&mut self) {
        self.resume();
        let depth = self.invocation_stack.len();
        while !self.state.is_stopped() && self.invocation_stack.len() >= depth {
            self.step_into();
        }
    }

    /// Executes one opcode, running any frames it pushes to completion.
    pub fn step_over(&mut self) {
        if self.state.is_terminal() {
            return;
        }
        self.resume();
        let depth = self.invocation_stack.len();
        loop {
            self.step_into();
            if self.state.is_stopped() || self.invocation_stack.len() <= depth {
                break;
            }
        }
    }

    /// Leaves a breakpoint pause so that single steps continue.
    pub fn resume(&mut self) {
        if self.state == VMState::Break {
            self.state = VMState::None;
        }
    }

    /// Registers a breakpoint at `offset` of the current frame's script.
    ///
    /// Frames cloned by `CALL` share the set.
    pub fn add_breakpoint(&mut self, offset: u32) -> Result<(), VMError> {
        self.current_context()?.add_breakpoint(offset);
        Ok(())
    }

    /// Returns whether a breakpoint was removed from the current frame.
    pub fn remove_breakpoint(&mut self, offset: u32) -> Result<bool, VMError> {
        Ok(self.current_context()?.remove_breakpoint(offset))
    }

    /// Drops every remaining frame.
    pub fn dispose(&mut self) {
        self.invocation_stack.clear();
    }

    // ==================== Inspection ====================

    pub fn state(&self) -> VMState {
        self.state
    }

    /// Error that moved the engine to FAULT.
    pub fn fault_reason(&self) -> Option<&VMError> {
        self.fault_reason.as_ref()
    }

    pub fn evaluation_stack(&self) -> &RandomAccessStack<StackItem> {
        &self.evaluation_stack
    }

    pub fn evaluation_stack_mut(&mut self) -> &mut RandomAccessStack<StackItem> {
        &mut self.evaluation_stack
    }

    pub fn alt_stack(&self) -> &RandomAccessStack<StackItem> {
        &self.alt_stack
    }

    pub fn invocation_stack(&self) -> &RandomAccessStack<ExecutionContext> {
        &self.invocation_stack
    }

    /// Frame currently executing.
    pub fn current_context(&self) -> Result<&ExecutionContext, VMError> {
        self.invocation_stack
            .peek(0)
            .map_err(|_| VMError::NoCurrentContext)
    }

    /// Frame directly below the current one.
    pub fn calling_context(&self) -> Result<&ExecutionContext, VMError> {
        self.invocation_stack
            .peek(1)
            .map_err(|_| VMError::NoCallingContext)
    }

    /// Bottom frame of the invocation stack.
    pub fn entry_context(&self) -> Result<&ExecutionContext, VMError> {
        let depth = self
            .invocation_stack
            .len()
            .checked_sub(1)
            .ok_or(VMError::NoCurrentContext)?;
        self.invocation_stack.peek(depth)
    }

    pub fn script_container(&self) -> Option<&Rc<dyn ScriptContainer>> {
        self.container.as_ref()
    }

    pub fn crypto(&self) -> &'a dyn Crypto {
        self.crypto
    }

    pub fn service(&self) -> &InteropService {
        &self.service
    }

    pub fn service_mut(&mut self) -> &mut InteropService {
        &mut self.service
    }

    // ==================== Step internals ====================

    fn current_context_mut(&mut self) -> Result<&mut ExecutionContext, VMError> {
        self.invocation_stack
            .peek_mut(0)
            .map_err(|_| VMError::NoCurrentContext)
    }

    fn at_breakpoint(&self) -> bool {
        match self.invocation_stack.peek(0) {
            Ok(context) => {
                u32::try_from(context.ip()).is_ok_and(|ip| context.has_breakpoint(ip))
            }
            Err(_) => false,
        }
    }

    /// Decodes and runs the opcode at the current frame's cursor.
    fn execute_next(&mut self) -> Result<(), VMError> {
        let context = self.current_context_mut()?;
        if context.is_at_end() {
            return self.op_ret(Instruction::Ret);
        }
        let offset = context.ip();
        let opcode = context.read_u8()?;

        if context.push_only()
            && !is_push_opcode(opcode)
            && opcode != Instruction::Ret.opcode()
        {
            let instruction = Instruction::try_from(opcode)
                .map(|instr| instr.mnemonic().to_string())
                .unwrap_or_else(|_| format!("0x{opcode:02x}"));
            return Err(VMError::PushOnlyViolation { instruction });
        }

        if is_push_bytes(opcode) {
            let data = context.read_bytes(usize::from(opcode))?;
            self.evaluation_stack.push(StackItem::ByteArray(data));
            return Ok(());
        }

        let instr = Instruction::try_from(opcode)
            .map_err(|_| VMError::InvalidOpcode { opcode, offset })?;
        self.exec(instr)
    }

    /// Executes a single decoded instruction.
    fn exec(&mut self, instruction: Instruction) -> Result<(), VMError> {
        exec_vm! {
            vm = self,
            instr = instruction,
            {
                // Constants
                Push0 => op_push0(),
                PushData1 => op_push_data(data: Data1),
                PushData2 => op_push_data(data: Data2),
                PushData4 => op_push_data(data: Data4),
                PushM1 => op_push_small(),
                Push1 => op_push_small(),
                Push2 => op_push_small(),
                Push3 => op_push_small(),
                Push4 => op_push_small(),
                Push5 => op_push_small(),
                Push6 => op_push_small(),
                Push7 => op_push_small(),
                Push8 => op_push_small(),
                Push9 => op_push_small(),
                Push10 => op_push_small(),
                Push11 => op_push_small(),
                Push12 => op_push_small(),
                Push13 => op_push_small(),
                Push14 => op_push_small(),
                Push15 => op_push_small(),
                Push16 => op_push_small(),
                // Control flow
                Nop => op_nop(),
                Jmp => op_jump(offset: Offset),
                JmpIf => op_jump(offset: Offset),
                JmpIfNot => op_jump(offset: Offset),
                Call => op_call(offset: Offset),
                Ret => op_ret(),
                AppCall => op_app_call(hash: Hash160),
                Syscall => op_syscall(name: VarBytes),
                TailCall => op_app_call(hash: Hash160),
                // Stack
                DupFromAltStack => op_dup_from_alt_stack(),
                ToAltStack => op_to_alt_stack(),
                FromAltStack => op_from_alt_stack(),
                XDrop => op_xdrop(),
                XSwap => op_xswap(),
                XTuck => op_xtuck(),
                Depth => op_depth(),
                Drop => op_drop(),
                Dup => op_dup(),
                Nip => op_nip(),
                Over => op_over(),
                Pick => op_pick(),
                Roll => op_roll(),
                Rot => op_rot(),
                Swap => op_swap(),
                Tuck => op_tuck(),
                // Splice
                Cat => op_cat(),
                SubStr => op_substr(),
                Left => op_left(),
                Right => op_right(),
                Size => op_size(),
                // Bitwise
                Invert => op_invert(),
                And => op_bitwise(),
                Or => op_bitwise(),
                Xor => op_bitwise(),
                Equal => op_equal(),
                // Arithmetic
                Inc => op_unary(),
                Dec => op_unary(),
                Sign => op_unary(),
                Negate => op_unary(),
                Abs => op_unary(),
                Not => op_not(),
                Nz => op_nz(),
                Add => op_binary(),
                Sub => op_binary(),
                Mul => op_binary(),
                Div => op_div_mod(),
                Mod => op_div_mod(),
                Shl => op_shift(),
                Shr => op_shift(),
                BoolAnd => op_bool_logic(),
                BoolOr => op_bool_logic(),
                NumEqual => op_compare(),
                NumNotEqual => op_compare(),
                Lt => op_compare(),
                Gt => op_compare(),
                Lte => op_compare(),
                Gte => op_compare(),
                Min => op_binary(),
                Max => op_binary(),
                Within => op_within(),
                // Crypto
                Sha1 => op_hash(),
                Sha256 => op_hash(),
                Hash160 => op_hash(),
                Hash256 => op_hash(),
                CheckSig => op_check_sig(),
                CheckMultiSig => op_check_multi_sig(),
                // Containers
                ArraySize => op_array_size(),
                Pack => op_pack(),
                Unpack => op_unpack(),
                PickItem => op_pick_item(),
                SetItem => op_set_item(),
                NewArray => op_new_container(),
                NewStruct => op_new_container(),
            }
        }
    }

    // ==================== Operand helpers ====================

    fn push(&mut self, item: impl Into<StackItem>) {
        self.evaluation_stack.push(item.into());
    }

    fn pop(&mut self) -> Result<StackItem, VMError> {
        self.evaluation_stack.pop()
    }

    fn peek_cloned(&self, depth: usize) -> Result<StackItem, VMError> {
        self.evaluation_stack.peek(depth).cloned()
    }

    fn pop_integer(&mut self, instr: Instruction) -> Result<BigInt, VMError> {
        let item = self.pop()?;
        item.to_integer()
            .map_err(|_| type_mismatch(instr, "Integer", &item))
    }

    fn pop_bool(&mut self) -> Result<bool, VMError> {
        Ok(self.pop()?.to_bool())
    }

    fn pop_bytes(&mut self, instr: Instruction) -> Result<Bytes, VMError> {
        let item = self.pop()?;
        item.to_bytes()
            .map_err(|_| type_mismatch(instr, "ByteArray", &item))
    }

    /// Pops an integer that must fit in 32 bits.
    fn pop_i32(&mut self, instr: Instruction) -> Result<i32, VMError> {
        let value = self.pop_integer(instr)?;
        i32::try_from(&value).map_err(|_| VMError::IntegerOverflow {
            instruction: instr.mnemonic(),
            value: value.to_string(),
        })
    }

    /// Pops a non-negative 32-bit count, index or depth.
    fn pop_count(&mut self, instr: Instruction) -> Result<usize, VMError> {
        let value = self.pop_i32(instr)?;
        usize::try_from(value).map_err(|_| VMError::NegativeArgument {
            instruction: instr.mnemonic(),
            value,
        })
    }

    /// Absolute target of a jump whose operand has just been read.
    fn jump_target(&self, offset: i16) -> Result<usize, VMError> {
        let context = self.current_context()?;
        let script_len = context.script().len();
        let target = context.ip() as i64 - JUMP_SIZE + i64::from(offset);
        match usize::try_from(target) {
            Ok(target) if target <= script_len => Ok(target),
            _ => Err(VMError::InvalidJumpTarget { target, script_len }),
        }
    }

    // ==================== Constants ====================

    fn op_push0(&mut self, _instr: Instruction) -> Result<(), VMError> {
        self.push(Bytes::empty());
        Ok(())
    }

    fn op_push_data(&mut self, _instr: Instruction, data: Bytes) -> Result<(), VMError> {
        self.push(data);
        Ok(())
    }

    fn op_push_small(&mut self, instr: Instruction) -> Result<(), VMError> {
        if let Some(value) = instr.small_int() {
            self.push(i64::from(value));
        }
        Ok(())
    }

    // ==================== Control flow ====================

    fn op_nop(&mut self, _instr: Instruction) -> Result<(), VMError> {
        Ok(())
    }

    fn op_jump(&mut self, instr: Instruction, offset: i16) -> Result<(), VMError> {
        let target = self.jump_target(offset)?;
        let taken = match instr {
            Instruction::JmpIf => self.pop_bool()?,
            Instruction::JmpIfNot => !self.pop_bool()?,
            _ => true,
        };
        if taken {
            self.current_context_mut()?.set_ip(target);
        }
        Ok(())
    }

    fn op_call(&mut self, _instr: Instruction, offset: i16) -> Result<(), VMError> {
        let target = self.jump_target(offset)?;
        let mut callee = self.current_context()?.clone_frame();
        callee.set_ip(target);
        self.invocation_stack.push(callee);
        Ok(())
    }

    fn op_ret(&mut self, _instr: Instruction) -> Result<(), VMError> {
        self.invocation_stack.pop()?;
        if self.invocation_stack.is_empty() {
            self.state = VMState::Halt;
        }
        Ok(())
    }

    fn op_app_call(&mut self, instr: Instruction, hash: ScriptHash) -> Result<(), VMError> {
        let table = self.table.ok_or(VMError::MissingScriptTable)?;
        let script = table
            .get_script(&hash)
            .ok_or(VMError::ScriptNotFound { hash })?;
        if instr == Instruction::TailCall {
            self.invocation_stack.pop()?;
        }
        self.load_script(script, false);
        Ok(())
    }

    fn op_syscall(&mut self, _instr: Instruction, name: Bytes) -> Result<(), VMError> {
        let name = String::from_utf8_lossy(&name).into_owned();
        if !name.is_ascii() {
            return Err(VMError::InvalidSyscallName { name });
        }
        let handler = self
            .service
            .get(&name)
            .ok_or(VMError::UnknownSyscall { name })?;
        handler(self)
    }

    // ==================== Stack ====================

    fn op_dup_from_alt_stack(&mut self, _instr: Instruction) -> Result<(), VMError> {
        let item = self.alt_stack.peek(0)?.clone();
        self.push(item);
        Ok(())
    }

    fn op_to_alt_stack(&mut self, _instr: Instruction) -> Result<(), VMError> {
        let item = self.pop()?;
        self.alt_stack.push(item);
        Ok(())
    }

    fn op_from_alt_stack(&mut self, _instr: Instruction) -> Result<(), VMError> {
        let item = self.alt_stack.pop()?;
        self.push(item);
        Ok(())
    }

    fn op_xdrop(&mut self, instr: Instruction) -> Result<(), VMError> {
        let n = self.pop_count(instr)?;
        self.evaluation_stack.remove(n)?;
        Ok(())
    }

    fn op_xswap(&mut self, instr: Instruction) -> Result<(), VMError> {
        let n = self.pop_count(instr)?;
        if n == 0 {
            return Ok(());
        }
        let deep = self.peek_cloned(n)?;
        let top = std::mem::replace(self.evaluation_stack.peek_mut(0)?, deep);
        self.evaluation_stack.set(n, top)
    }

    fn op_xtuck(&mut self, instr: Instruction) -> Result<(), VMError> {
        let n = self.pop_i32(instr)?;
        if n <= 0 {
            return Err(VMError::ArgumentOutOfRange {
                instruction: instr.mnemonic(),
                value: i64::from(n),
                max: self.evaluation_stack.len(),
            });
        }
        let top = self.peek_cloned(0)?;
        self.evaluation_stack.insert(n as usize, top)
    }

    fn op_depth(&mut self, _instr: Instruction) -> Result<(), VMError> {
        let depth = self.evaluation_stack.len();
        self.push(depth);
        Ok(())
    }

    fn op_drop(&mut self, _instr: Instruction) -> Result<(), VMError> {
        self.pop()?;
        Ok(())
    }

    fn op_dup(&mut self, _instr: Instruction) -> Result<(), VMError> {
        let item = self.peek_cloned(0)?;
        self.push(item);
        Ok(())
    }

    fn op_nip(&mut self, _instr: Instruction) -> Result<(), VMError> {
        self.evaluation_stack.remove(1)?;
        Ok(())
    }

    fn op_over(&mut self, _instr: Instruction) -> Result<(), VMError> {
        let item = self.peek_cloned(1)?;
        self.push(item);
        Ok(())
    }

    fn op_pick(&mut self, instr: Instruction) -> Result<(), VMError> {
        let n = self.pop_count(instr)?;
        let item = self.peek_cloned(n)?;
        self.push(item);
        Ok(())
    }

    fn op_roll(&mut self, instr: Instruction) -> Result<(), VMError> {
        let n = self.pop_count(instr)?;
        if n == 0 {
            return Ok(());
        }
        let item = self.evaluation_stack.remove(n)?;
        self.push(item);
        Ok(())
    }

    fn op_rot(&mut self, _instr: Instruction) -> Result<(), VMError> {
        let item = self.evaluation_stack.remove(2)?;
        self.push(item);
        Ok(())
    }

    fn op_swap(&mut self, _instr: Instruction) -> Result<(), VMError> {
        let item = self.evaluation_stack.remove(1)?;
        self.push(item);
        Ok(())
    }

    fn op_tuck(&mut self, _instr: Instruction) -> Result<(), VMError> {
        let top = self.peek_cloned(0)?;
        self.evaluation_stack.insert(2, top)
    }

    // ==================== Splice ====================

    fn op_cat(&mut self, instr: Instruction) -> Result<(), VMError> {
        let b = self.pop_bytes(instr)?;
        let a = self.pop_bytes(instr)?;
        self.push(a.concat(&b));
        Ok(())
    }

    fn op_substr(&mut self, instr: Instruction) -> Result<(), VMError> {
        let count = self.pop_count(instr)?;
        let index = self.pop_count(instr)?;
        let data = self.pop_bytes(instr)?;
        self.push(data.sub(index, count));
        Ok(())
    }

    fn op_left(&mut self, instr: Instruction) -> Result<(), VMError> {
        let count = self.pop_count(instr)?;
        let data = self.pop_bytes(instr)?;
        self.push(data.sub(0, count));
        Ok(())
    }

    fn op_right(&mut self, instr: Instruction) -> Result<(), VMError> {
        let count = self.pop_count(instr)?;
        let data = self.pop_bytes(instr)?;
        if data.len() < count {
            return Err(VMError::ArgumentOutOfRange {
                instruction: instr.mnemonic(),
                value: count as i64,
                max: data.len(),
            });
        }
        self.push(data.sub(data.len() - count, count));
        Ok(())
    }

    fn op_size(&mut self, instr: Instruction) -> Result<(), VMError> {
        let data = self.pop_bytes(instr)?;
        self.push(data.len());
        Ok(())
    }

    // ==================== Bitwise ====================

    fn op_invert(&mut self, instr: Instruction) -> Result<(), VMError> {
        let x = self.pop_integer(instr)?;
        self.push(!x);
        Ok(())
    }

    fn op_bitwise(&mut self, instr: Instruction) -> Result<(), VMError> {
        let b = self.pop_integer(instr)?;
        let a = self.pop_integer(instr)?;
        let result = match instr {
            Instruction::And => a & b,
            Instruction::Or => a | b,
            _ => a ^ b,
        };
        self.push(result);
        Ok(())
    }

    fn op_equal(&mut self, _instr: Instruction) -> Result<(), VMError> {
        let b = self.pop()?;
        let a = self.pop()?;
        self.push(a.equals(&b));
        Ok(())
    }

    // ==================== Arithmetic ====================

    fn op_unary(&mut self, instr: Instruction) -> Result<(), VMError> {
        let x = self.pop_integer(instr)?;
        let result = match instr {
            Instruction::Inc => x + 1,
            Instruction::Dec => x - 1,
            Instruction::Sign => x.signum(),
            Instruction::Negate => -x,
            _ => x.abs(),
        };
        self.push(result);
        Ok(())
    }

    fn op_not(&mut self, _instr: Instruction) -> Result<(), VMError> {
        let x = self.pop_bool()?;
        self.push(!x);
        Ok(())
    }

    fn op_nz(&mut self, instr: Instruction) -> Result<(), VMError> {
        let x = self.pop_integer(instr)?;
        self.push(!x.is_zero());
        Ok(())
    }

    fn op_binary(&mut self, instr: Instruction) -> Result<(), VMError> {
        let b = self.pop_integer(instr)?;
        let a = self.pop_integer(instr)?;
        let result = match instr {
            Instruction::Add => a + b,
            Instruction::Sub => a - b,
            Instruction::Mul => a * b,
            Instruction::Min => a.min(b),
            _ => a.max(b),
        };
        self.push(result);
        Ok(())
    }

    fn op_div_mod(&mut self, instr: Instruction) -> Result<(), VMError> {
        let b = self.pop_integer(instr)?;
        let a = self.pop_integer(instr)?;
        if b.is_zero() {
            return Err(VMError::DivisionByZero);
        }
        let result = match instr {
            Instruction::Div => a / b,
            _ => a % b,
        };
        self.push(result);
        Ok(())
    }

    fn op_shift(&mut self, instr: Instruction) -> Result<(), VMError> {
        let n = self.pop_i32(instr)?;
        let x = self.pop_integer(instr)?;
        let left = (instr == Instruction::Shl) == (n >= 0);
        let amount = n.unsigned_abs() as usize;
        let result = if left { x << amount } else { x >> amount };
        self.push(result);
        Ok(())
    }

    fn op_bool_logic(&mut self, instr: Instruction) -> Result<(), VMError> {
        let b = self.pop_bool()?;
        let a = self.pop_bool()?;
        let result = match instr {
            Instruction::BoolAnd => a && b,
            _ => a || b,
        };
        self.push(result);
        Ok(())
    }

    fn op_compare(&mut self, instr: Instruction) -> Result<(), VMError> {
        let b = self.pop_integer(instr)?;
        let a = self.pop_integer(instr)?;
        let result = match instr {
            Instruction::NumEqual => a == b,
            Instruction::NumNotEqual => a != b,
            Instruction::Lt => a < b,
            Instruction::Gt => a > b,
            Instruction::Lte => a <= b,
            _ => a >= b,
        };
        self.push(result);
        Ok(())
    }

    fn op_within(&mut self, instr: Instruction) -> Result<(), VMError> {
        let b = self.pop_integer(instr)?;
        let a = self.pop_integer(instr)?;
        let x = self.pop_integer(instr)?;
        self.push(a <= x && x < b);
        Ok(())
    }

    // ==================== Crypto ====================

    fn op_hash(&mut self, instr: Instruction) -> Result<(), VMError> {
        let data = self.pop_bytes(instr)?;
        let digest = match instr {
            Instruction::Sha1 => crypto::sha1(&data).to_vec(),
            Instruction::Sha256 => crypto::sha256(&data).to_vec(),
            Instruction::Hash160 => self.crypto.hash160(&data).to_vec(),
            _ => self.crypto.hash256(&data).to_vec(),
        };
        self.push(digest);
        Ok(())
    }

    fn message(&self) -> Result<Bytes, VMError> {
        self.container
            .as_ref()
            .map(|container| container.message())
            .ok_or(VMError::MissingScriptContainer)
    }

    fn op_check_sig(&mut self, instr: Instruction) -> Result<(), VMError> {
        let public_key = self.pop_bytes(instr)?;
        let signature = self.pop_bytes(instr)?;
        let message = self.message()?;
        let valid = self
            .crypto
            .verify_signature(&message, &signature, &public_key)
            .unwrap_or(false);
        self.push(valid);
        Ok(())
    }

    fn op_check_multi_sig(&mut self, instr: Instruction) -> Result<(), VMError> {
        let n = self.pop_i32(instr)?;
        if n < 1 {
            return Err(VMError::InvalidMultiSig { m: 0, n });
        }
        let public_keys = (0..n)
            .map(|_| self.pop_bytes(instr))
            .collect::<Result<Vec<_>, _>>()?;
        let m = self.pop_i32(instr)?;
        if m < 1 || m > n {
            return Err(VMError::InvalidMultiSig { m, n });
        }
        let signatures = (0..m)
            .map(|_| self.pop_bytes(instr))
            .collect::<Result<Vec<_>, _>>()?;
        let message = self.message()?;

        // Signatures must match keys in order; a key may be skipped but not reused.
        let (m, n) = (signatures.len(), public_keys.len());
        let (mut i, mut j) = (0, 0);
        let mut valid = true;
        while valid && i < m && j < n {
            match self
                .crypto
                .verify_signature(&message, &signatures[i], &public_keys[j])
            {
                Ok(true) => i += 1,
                Ok(false) => {}
                Err(_) => {
                    valid = false;
                    break;
                }
            }
            j += 1;
            if m - i > n - j {
                valid = false;
            }
        }
        self.push(valid);
        Ok(())
    }

    // ==================== Containers ====================

    fn op_array_size(&mut self, instr: Instruction) -> Result<(), VMError> {
        let item = self.pop()?;
        let size = match item.items() {
            Some(items) => items.borrow().len(),
            None => item
                .to_bytes()
                .map_err(|_| type_mismatch(instr, "Array", &item))?
                .len(),
        };
        self.push(size);
        Ok(())
    }

    fn op_pack(&mut self, instr: Instruction) -> Result<(), VMError> {
        let size = self.pop_i32(instr)?;
        let depth = self.evaluation_stack.len();
        let size = match usize::try_from(size) {
            Ok(size) if size <= depth => size,
            _ => {
                return Err(VMError::ArgumentOutOfRange {
                    instruction: instr.mnemonic(),
                    value: i64::from(size),
                    max: depth,
                });
            }
        };
        let mut items = Vec::with_capacity(size);
        for _ in 0..size {
            items.push(self.pop()?.clone_struct());
        }
        self.push(StackItem::array(items));
        Ok(())
    }

    fn op_unpack(&mut self, instr: Instruction) -> Result<(), VMError> {
        let item = self.pop()?;
        let items = match item.items() {
            Some(items) => items.borrow().clone(),
            None => return Err(type_mismatch(instr, "Array", &item)),
        };
        let count = items.len();
        for element in items.into_iter().rev() {
            self.push(element);
        }
        self.push(count);
        Ok(())
    }

    fn op_pick_item(&mut self, instr: Instruction) -> Result<(), VMError> {
        let index = self.pop_count(instr)?;
        let item = self.pop()?;
        let items = item
            .items()
            .ok_or_else(|| type_mismatch(instr, "Array", &item))?;
        let element = {
            let items = items.borrow();
            items.get(index).cloned().ok_or(VMError::IndexOutOfRange {
                index,
                len: items.len(),
            })?
        };
        self.push(element);
        Ok(())
    }

    fn op_set_item(&mut self, instr: Instruction) -> Result<(), VMError> {
        let value = self.pop()?.clone_struct();
        let index = self.pop_count(instr)?;
        let target = self.pop()?;
        let items = target
            .items()
            .ok_or_else(|| type_mismatch(instr, "Array", &target))?;
        let mut items = items.borrow_mut();
        let len = items.len();
        let slot = items
            .get_mut(index)
            .ok_or(VMError::IndexOutOfRange { index, len })?;
        *slot = value;
        Ok(())
    }

    fn op_new_container(&mut self, instr: Instruction) -> Result<(), VMError> {
        let count = self.pop_count(instr)?;
        let mut items = Vec::new();
        items
            .try_reserve_exact(count)
            .map_err(|_| VMError::AllocationFailed { count })?;
        items.resize(count, StackItem::Boolean(false));
        let container = if instr == Instruction::NewStruct {
            StackItem::structure(items)
        } else {
            StackItem::array(items)
        };
        self.push(container);
        Ok(())
    }
}

fn type_mismatch(instr: Instruction, expected: &'static str, item: &StackItem) -> VMError {
    VMError::TypeMismatch {
        instruction: instr.mnemonic(),
        expected,
        actual: item.type_name(),
    }
}
