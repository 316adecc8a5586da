use crate::types::hash::ScriptHash;
use script_vm_derive::Error;

/// Errors that can occur during script execution, encoding or assembly.
///
/// Any error returned while dispatching an opcode moves the engine to FAULT;
/// the error itself is kept as the fault reason.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum VMError {
    // ==================== Decoding ====================
    /// Unknown opcode encountered in bytecode.
    #[error("invalid opcode 0x{opcode:02x} at offset {offset}")]
    InvalidOpcode { opcode: u8, offset: usize },
    /// Script ended while reading an operand.
    #[error("unexpected end of script at {ip}: requested {requested} bytes, {available} available")]
    UnexpectedEndOfScript {
        ip: usize,
        requested: usize,
        available: usize,
    },
    /// A length prefix declared a negative size.
    #[error("negative data length {length}")]
    NegativeLength { length: i64 },
    /// Syscall name longer than the allowed maximum.
    #[error("syscall name is {length} bytes, at most {max} allowed")]
    SyscallNameTooLong { length: u64, max: usize },
    /// Syscall name empty or not ASCII.
    #[error("invalid syscall name {name:?}")]
    InvalidSyscallName { name: String },

    // ==================== Control flow ====================
    /// A non-push opcode was executed by a push-only frame.
    #[error("{instruction} is not allowed in a push-only script")]
    PushOnlyViolation { instruction: String },
    /// Jump target falls outside the script.
    #[error("jump target {target} outside script of length {script_len}")]
    InvalidJumpTarget { target: i64, script_len: usize },
    /// The engine has no frame to execute or inspect.
    #[error("invocation stack is empty")]
    NoCurrentContext,
    /// `GetCallingScriptHash` invoked from the entry frame.
    #[error("no calling context")]
    NoCallingContext,
    /// `APPCALL`/`TAILCALL` without a script table.
    #[error("no script table configured")]
    MissingScriptTable,
    /// Script hash unknown to the script table.
    #[error("script {hash} not found")]
    ScriptNotFound { hash: ScriptHash },
    /// `SYSCALL` with a name that has no registered handler.
    #[error("unknown syscall {name}")]
    UnknownSyscall { name: String },
    /// A registered host call reported failure.
    #[error("syscall {name} failed: {reason}")]
    SyscallFailed { name: String, reason: String },
    /// `CHECKSIG`, `CHECKMULTISIG` or `GetScriptContainer` without a container.
    #[error("no script container")]
    MissingScriptContainer,

    // ==================== Operands ====================
    /// Stack access beyond the current size.
    #[error("stack depth {depth} out of range for stack of size {len}")]
    StackOutOfRange { depth: usize, len: usize },
    /// Value cannot be converted to the type an instruction needs.
    #[error("{instruction} expected {expected} but got {actual}")]
    TypeMismatch {
        instruction: &'static str,
        expected: &'static str,
        actual: &'static str,
    },
    /// Integer operand does not fit a 32-bit count, index or shift.
    #[error("{instruction}: integer {value} does not fit in 32 bits")]
    IntegerOverflow {
        instruction: &'static str,
        value: String,
    },
    /// Count or index operand must not be negative.
    #[error("{instruction}: negative argument {value}")]
    NegativeArgument {
        instruction: &'static str,
        value: i32,
    },
    /// Count or index operand outside the valid range.
    #[error("{instruction}: argument {value} out of range 0..={max}")]
    ArgumentOutOfRange {
        instruction: &'static str,
        value: i64,
        max: usize,
    },
    /// Container index past the last element.
    #[error("index {index} out of bounds for container of length {len}")]
    IndexOutOfRange { index: usize, len: usize },
    /// Division or modulo by zero.
    #[error("division by zero")]
    DivisionByZero,
    /// `CHECKMULTISIG` key or signature count invalid.
    #[error("invalid multisig parameters m={m} n={n}")]
    InvalidMultiSig { m: i32, n: i32 },
    /// Allocation for a new container failed.
    #[error("cannot allocate container of {count} items")]
    AllocationFailed { count: usize },

    // ==================== Encoding / assembly ====================
    /// `emit_jump` called with an opcode that has no jump operand.
    #[error("{instruction} does not take a jump offset")]
    NotAJump { instruction: &'static str },
    /// Unrecognized instruction mnemonic during assembly.
    #[error("invalid instruction name: {name}")]
    InvalidInstructionName { name: String },
    /// Wrong number of operands for an instruction.
    #[error("{instruction} expects {expected} operand(s), got {actual}")]
    ArityMismatch {
        instruction: String,
        expected: usize,
        actual: usize,
    },
    /// Operand token could not be parsed.
    #[error("invalid operand {token}: expected {expected}")]
    InvalidOperand {
        token: String,
        expected: &'static str,
    },
    /// Label or literal jump distance does not fit a 16-bit offset.
    #[error("jump offset {offset} does not fit in 16 bits")]
    JumpOutOfRange { offset: i64 },
    /// Label defined more than once.
    #[error("duplicate label: {label}")]
    DuplicateLabel { label: String },
    /// Reference to undefined label.
    #[error("undefined label: {label}")]
    UndefinedLabel { label: String },
    /// Malformed line, with a position.
    #[error("line {line}:{offset}: {message}")]
    ParseError {
        line: usize,
        offset: usize,
        message: &'static str,
    },
    /// Any assembly failure, annotated with its position.
    #[error("line {line}:{offset}: {source}")]
    AssemblyError {
        line: usize,
        offset: usize,
        source: String,
    },
    /// File I/O error during assembly.
    #[error("io error on {path}: {source}")]
    IoError { path: String, source: String },
}
