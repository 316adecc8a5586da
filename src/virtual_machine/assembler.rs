//! Assembly language parser, bytecode compiler and disassembler.
//!
//! Converts human-readable assembly source into script bytes and back.
//! Uses [`for_each_instruction!`](crate::for_each_instruction) to generate the
//! per-instruction parser and encoder, and [`ScriptBuilder`] for pushes.
//!
//! # Syntax
//!
//! ```text
//! label:
//!     INSTRUCTION operand   # optional comment
//! ```
//!
//! - Instructions are the uppercase mnemonics of the opcode table (`ADD`, `JMPIF`)
//! - `PUSH <literal>` picks the shortest push for an integer (`42`, `-1`),
//!   hex bytes (`0x0102`), a double-quoted string or `true`/`false`
//! - `PUSHBYTES1`..`PUSHBYTES75` and `PUSHDATA1/2/4` take hex bytes
//! - Jumps take a label or a signed offset from the jump's own address
//! - `SYSCALL` takes a double-quoted name; `APPCALL`/`TAILCALL` a 20-byte hex hash
//! - Comments start with `#`; commas between operands are ignored
//!
//! [`disassemble`] writes every instruction on its own line, prefixed with its
//! offset as a label, so a listing assembles back to the same bytes.

use crate::define_instructions;
use crate::error;
use crate::for_each_instruction;
use crate::types::bytes::Bytes;
use crate::types::hash::ScriptHash;
use crate::virtual_machine::builder::ScriptBuilder;
use crate::virtual_machine::context::ExecutionContext;
use crate::virtual_machine::errors::VMError;
use crate::virtual_machine::isa::{
    Instruction, MAX_SYSCALL_NAME, OperandKind, PUSHBYTES1, PUSHBYTES75, is_push_bytes,
};
use num_bigint::BigInt;
use std::collections::HashMap;
use std::fmt::Write;
use std::fs;
use std::path::Path;

const COMMENT_CHAR: char = '#';
const LABEL_SUFFIX: char = ':';
const PUSH_MNEMONIC: &str = "PUSH";
const PUSH_BYTES_PREFIX: &str = "PUSHBYTES";

/// Return the line/column/message triple for assembly-related errors.
fn assembly_error_location(err: &VMError) -> Option<(usize, usize, String)> {
    match err {
        VMError::AssemblyError {
            line,
            offset,
            source,
        } => Some((*line, *offset, source.clone())),
        VMError::ParseError {
            line,
            offset,
            message,
        } => Some((*line, *offset, message.to_string())),
        _ => None,
    }
}

/// Formats a compiler-style diagnostic for assembly failures.
fn render_assembly_diagnostic(
    file: &str,
    source: &str,
    line: usize,
    offset: usize,
    message: &str,
) -> String {
    let mut diag = String::new();
    let _ = writeln!(diag, "error: {message}");
    let _ = writeln!(diag, " --> {file}:{line}:{offset}");

    if let Some(raw_line) = source.lines().nth(line.saturating_sub(1)) {
        let line_text = raw_line.trim_end_matches('\r');
        let underline = " ".repeat(offset.saturating_sub(1));
        let _ = writeln!(diag, "  |");
        let _ = writeln!(diag, "{:>4} | {}", line, line_text);
        let _ = writeln!(diag, "  | {}^", underline);
    }

    diag
}

/// Logs a diagnostic for an assembly error.
fn log_assembly_error(file: &str, source: &str, err: &VMError) {
    match assembly_error_location(err) {
        Some((line, offset, message)) => {
            error!(
                "{}",
                render_assembly_diagnostic(file, source, line, offset, &message)
            )
        }
        None => error!("{file}: {err}"),
    }
}

/// Label table built during the first pass.
///
/// While `strict` is unset, unknown labels resolve to the referencing
/// instruction itself so that instruction sizes can be measured before every
/// label is known.
pub struct AsmContext {
    labels: HashMap<String, usize>,
    strict: bool,
}

impl AsmContext {
    pub fn new() -> Self {
        Self {
            labels: HashMap::new(),
            strict: false,
        }
    }

    /// Registers a label at the given script offset.
    pub(crate) fn define_label(&mut self, name: String, offset: usize) -> Result<(), VMError> {
        if self.labels.contains_key(&name) {
            return Err(VMError::DuplicateLabel { label: name });
        }
        self.labels.insert(name, offset);
        Ok(())
    }

    /// Resolves a label to its script offset.
    pub(crate) fn resolve_label(&self, name: &str) -> Result<usize, VMError> {
        self.labels
            .get(name)
            .copied()
            .ok_or(VMError::UndefinedLabel {
                label: name.to_string(),
            })
    }

    /// Target of a jump written at `address`.
    fn jump_target(&self, name: &str, address: usize) -> Result<usize, VMError> {
        match self.resolve_label(name) {
            Err(_) if !self.strict => Ok(address),
            result => result,
        }
    }
}

impl Default for AsmContext {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone)]
struct Token<'a> {
    text: &'a str,
    /// 1-based column offset in the line.
    offset: usize,
}

/// Tokenize a single line of assembly.
///
/// Rules:
/// - `#` starts a comment
/// - commas are ignored
/// - whitespace-separated tokens
/// - a double-quoted string is one token, quotes included
fn tokenize(line_no: usize, line: &str) -> Result<Vec<Token<'_>>, VMError> {
    let mut out = Vec::with_capacity(4);

    let mut start: Option<usize> = None;
    let mut start_col: usize = 0;
    let mut in_str = false;

    for (i, c) in line.char_indices() {
        if c == COMMENT_CHAR && !in_str {
            if let Some(s) = start.take() {
                out.push(Token {
                    text: &line[s..i],
                    offset: start_col,
                });
            }
            return Ok(out);
        }

        match c {
            '"' => {
                if start.is_none() {
                    start = Some(i);
                    start_col = i + 1;
                }
                in_str = !in_str;
            }
            ',' | ' ' | '\t' | '\r' if !in_str => {
                if let Some(s) = start.take() {
                    out.push(Token {
                        text: &line[s..i],
                        offset: start_col,
                    });
                }
            }
            _ => {
                if start.is_none() {
                    start = Some(i);
                    start_col = i + 1;
                }
            }
        }
    }

    if in_str {
        return Err(VMError::ParseError {
            line: line_no,
            offset: start_col,
            message: "unterminated string literal (missing closing quote)",
        });
    }

    if let Some(s) = start {
        out.push(Token {
            text: &line[s..],
            offset: start_col,
        });
    }

    Ok(out)
}

/// Checks if a token is a label definition (ends with `:`)
fn is_label_def(tok: &str) -> bool {
    tok.ends_with(LABEL_SUFFIX) && tok.len() > 1 && !tok.starts_with('"')
}

/// Extracts the label name from a label definition token.
fn label_name(tok: &str) -> &str {
    &tok[..tok.len() - 1]
}

/// Contents of a double-quoted token.
fn parse_string(tok: &str) -> Option<&str> {
    tok.strip_prefix('"')?.strip_suffix('"')
}

/// Parses `0x`-prefixed hex bytes.
fn parse_hex(tok: &str) -> Result<Vec<u8>, VMError> {
    let invalid = || VMError::InvalidOperand {
        token: tok.to_string(),
        expected: "0x-prefixed hex bytes",
    };
    let digits = tok.strip_prefix("0x").ok_or_else(invalid)?;
    hex::decode(digits).map_err(|_| invalid())
}

/// Parses hex data no longer than `max` bytes.
fn parse_data(tok: &str, max: usize) -> Result<Bytes, VMError> {
    let data = parse_hex(tok)?;
    if data.len() > max {
        return Err(VMError::InvalidOperand {
            token: tok.to_string(),
            expected: "data that fits the length prefix",
        });
    }
    Ok(Bytes::new(data))
}

/// Parses a 20-byte hex script hash.
fn parse_hash(tok: &str) -> Result<ScriptHash, VMError> {
    tok.parse::<ScriptHash>()
        .map_err(|_| VMError::InvalidOperand {
            token: tok.to_string(),
            expected: "20-byte hex script hash",
        })
}

/// Parses a quoted syscall name.
fn parse_syscall_name(tok: &str) -> Result<Bytes, VMError> {
    let name = parse_string(tok).ok_or_else(|| VMError::InvalidOperand {
        token: tok.to_string(),
        expected: "double-quoted syscall name",
    })?;
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
    Ok(Bytes::from(name))
}

/// Parses a jump operand: a signed offset or a label.
///
/// Labels become the distance from `address`, the jump's own offset.
fn parse_offset(tok: &str, ctx: &AsmContext, address: usize) -> Result<i16, VMError> {
    let offset = match tok.parse::<i64>() {
        Ok(v) => v,
        Err(_) => ctx.jump_target(tok, address)? as i64 - address as i64,
    };
    i16::try_from(offset).map_err(|_| VMError::JumpOutOfRange { offset })
}

macro_rules! define_parse_instruction {
    (
        $(
            $(#[$doc:meta])*
            $name:ident = $opcode:literal, $mnemonic:literal => [
                $( $field:ident : $kind:ident ),* $(,)?
            ]
        ),* $(,)?
    ) => {

        // =========================
        // Assembler IR
        // =========================
        #[derive(Debug, Clone)]
        enum AsmInstr {
            $(
                $name {
                    $( $field: define_instructions!(@ty $kind) ),*
                },
            )*
        }

        impl AsmInstr {
            /// Encodes the instruction into the script.
            fn emit(&self, builder: &mut ScriptBuilder) {
                match self {
                    $(
                        AsmInstr::$name { $( $field ),* } => {
                            #[allow(unused_mut)]
                            let mut operand: Vec<u8> = Vec::new();
                            $(
                                define_parse_instruction!(@encode operand, $kind, $field);
                            )*
                            builder.emit_with(Instruction::$name, &operand);
                        }
                    ),*
                }
            }
        }

        /// Parse one table instruction from tokens into [`AsmInstr`].
        ///
        /// `address` is the offset where this instruction starts, used to turn
        /// labels into relative jump offsets.
        fn parse_instruction(
            ctx: &AsmContext,
            instr: Instruction,
            tokens: &[Token],
            address: usize,
        ) -> Result<AsmInstr, VMError> {
            match instr {
                $(
                    Instruction::$name => {
                        const EXPECTED: usize = 1 + define_parse_instruction!(@count $( $field ),*);
                        if tokens.len() != EXPECTED {
                            return Err(VMError::ArityMismatch {
                                instruction: tokens[0].text.to_string(),
                                expected: EXPECTED - 1,
                                actual: tokens.len() - 1,
                            });
                        }

                        define_parse_instruction!(
                            @construct ctx address tokens; $name $( $field : $kind ),*
                        )
                    }
                ),*
            }
        }
    };

    // ---------- counting ----------
    (@count $( $x:ident ),* ) => {
        <[()]>::len(&[ $( define_parse_instruction!(@unit $x) ),* ])
    };

    (@unit $x:ident) => { () };

    // ---------- parsing ----------
    (@construct $ctx:ident $address:ident $tokens:ident; $name:ident) => {
        Ok(AsmInstr::$name { })
    };

    (@construct $ctx:ident $address:ident $tokens:ident; $name:ident $field:ident : $kind:ident) => {
        Ok(AsmInstr::$name {
            $field: define_parse_instruction!(@parse_operand $kind, $tokens[1].text, $ctx, $address)?,
        })
    };

    (@parse_operand Offset, $tok:expr, $ctx:expr, $address:expr) => {
        parse_offset($tok, $ctx, $address)
    };

    (@parse_operand Hash160, $tok:expr, $ctx:expr, $address:expr) => {
        parse_hash($tok)
    };

    (@parse_operand VarBytes, $tok:expr, $ctx:expr, $address:expr) => {
        parse_syscall_name($tok)
    };

    (@parse_operand Data1, $tok:expr, $ctx:expr, $address:expr) => {
        parse_data($tok, u8::MAX as usize)
    };

    (@parse_operand Data2, $tok:expr, $ctx:expr, $address:expr) => {
        parse_data($tok, u16::MAX as usize)
    };

    (@parse_operand Data4, $tok:expr, $ctx:expr, $address:expr) => {
        parse_data($tok, i32::MAX as usize)
    };

    // ---------- encoding ----------
    (@encode $out:ident, Offset, $field:ident) => {
        $out.extend_from_slice(&$field.to_le_bytes())
    };

    (@encode $out:ident, Hash160, $field:ident) => {
        $out.extend_from_slice($field.as_slice())
    };

    (@encode $out:ident, VarBytes, $field:ident) => {{
        $out.push($field.len() as u8);
        $out.extend_from_slice($field.as_slice());
    }};

    (@encode $out:ident, Data1, $field:ident) => {{
        $out.push($field.len() as u8);
        $out.extend_from_slice($field.as_slice());
    }};

    (@encode $out:ident, Data2, $field:ident) => {{
        $out.extend_from_slice(&($field.len() as u16).to_le_bytes());
        $out.extend_from_slice($field.as_slice());
    }};

    (@encode $out:ident, Data4, $field:ident) => {{
        $out.extend_from_slice(&($field.len() as u32).to_le_bytes());
        $out.extend_from_slice($field.as_slice());
    }};
}

for_each_instruction!(define_parse_instruction);

/// One assembled line.
#[derive(Debug, Clone)]
enum Statement {
    Instr(AsmInstr),
    PushInt(BigInt),
    PushBool(bool),
    PushBytes(Bytes),
}

impl Statement {
    fn emit(&self, builder: &mut ScriptBuilder) {
        match self {
            Statement::Instr(instr) => instr.emit(builder),
            Statement::PushInt(value) => {
                builder.emit_push_int(value.clone());
            }
            Statement::PushBool(value) => {
                builder.emit_push_bool(*value);
            }
            Statement::PushBytes(data) => {
                builder.emit_push_bytes(data);
            }
        }
    }
}

fn instruction_from_str(name: &str) -> Result<Instruction, VMError> {
    Instruction::from_mnemonic(name).ok_or_else(|| VMError::InvalidInstructionName {
        name: name.to_string(),
    })
}

fn expect_operands(tokens: &[Token], expected: usize) -> Result<(), VMError> {
    if tokens.len() != expected + 1 {
        return Err(VMError::ArityMismatch {
            instruction: tokens[0].text.to_string(),
            expected,
            actual: tokens.len() - 1,
        });
    }
    Ok(())
}

/// Literal of the generic `PUSH`.
fn parse_push_literal(tok: &str) -> Result<Statement, VMError> {
    match tok {
        "true" => return Ok(Statement::PushBool(true)),
        "false" => return Ok(Statement::PushBool(false)),
        _ => {}
    }
    if let Some(text) = parse_string(tok) {
        return Ok(Statement::PushBytes(Bytes::from(text)));
    }
    if tok.starts_with("0x") {
        return Ok(Statement::PushBytes(Bytes::new(parse_hex(tok)?)));
    }
    tok.parse::<BigInt>()
        .map(Statement::PushInt)
        .map_err(|_| VMError::InvalidOperand {
            token: tok.to_string(),
            expected: "integer, hex bytes, string or boolean",
        })
}

/// `PUSHBYTESn 0x..` with exactly `n` bytes.
fn parse_push_bytes(count: &str, tokens: &[Token]) -> Result<Statement, VMError> {
    let count = count
        .parse::<u8>()
        .ok()
        .filter(|n| (PUSHBYTES1..=PUSHBYTES75).contains(n))
        .ok_or_else(|| VMError::InvalidInstructionName {
            name: tokens[0].text.to_string(),
        })?;
    expect_operands(tokens, 1)?;
    let data = parse_hex(tokens[1].text)?;
    if data.len() != usize::from(count) {
        return Err(VMError::InvalidOperand {
            token: tokens[1].text.to_string(),
            expected: "exactly as many bytes as the opcode names",
        });
    }
    Ok(Statement::PushBytes(Bytes::new(data)))
}

fn parse_statement(
    ctx: &AsmContext,
    tokens: &[Token],
    address: usize,
) -> Result<Statement, VMError> {
    let mnemonic = tokens[0].text;
    if mnemonic == PUSH_MNEMONIC {
        expect_operands(tokens, 1)?;
        return parse_push_literal(tokens[1].text);
    }
    if let Some(count) = mnemonic.strip_prefix(PUSH_BYTES_PREFIX) {
        return parse_push_bytes(count, tokens);
    }
    let instr = instruction_from_str(mnemonic)?;
    Ok(Statement::Instr(parse_instruction(ctx, instr, tokens, address)?))
}

/// Performs two-pass assembly.
///
/// Pass 1: tokenizes every line, records labels and measures each statement
/// with labels resolved leniently.
///
/// Pass 2: parses statements with strict label resolution and emits bytecode.
fn assemble_lines(source: &str) -> Result<Bytes, VMError> {
    let mut asm_context = AsmContext::new();
    let mut statements: Vec<(usize, Vec<Token>)> = Vec::new();
    let mut address = 0usize;

    for (index, line) in source.lines().enumerate() {
        let line_no = index + 1;
        let tokens = tokenize(line_no, line)?;

        let mut rest = &tokens[..];
        while let Some(first) = rest.first() {
            if !is_label_def(first.text) {
                break;
            }
            asm_context
                .define_label(label_name(first.text).to_string(), address)
                .map_err(|e| VMError::AssemblyError {
                    line: line_no,
                    offset: first.offset,
                    source: e.to_string(),
                })?;
            rest = &rest[1..];
        }
        if rest.is_empty() {
            continue;
        }

        let mut scratch = ScriptBuilder::new();
        parse_statement(&asm_context, rest, address)
            .map_err(|e| VMError::AssemblyError {
                line: line_no,
                offset: rest[0].offset,
                source: e.to_string(),
            })?
            .emit(&mut scratch);
        address += scratch.offset();
        statements.push((line_no, rest.to_vec()));
    }

    asm_context.strict = true;
    let mut builder = ScriptBuilder::new();
    for (line_no, tokens) in statements {
        let statement = parse_statement(&asm_context, &tokens, builder.offset()).map_err(|e| {
            VMError::AssemblyError {
                line: line_no,
                offset: tokens[0].offset,
                source: e.to_string(),
            }
        })?;
        statement.emit(&mut builder);
    }

    Ok(builder.into_bytes())
}

/// Assemble a full source string into script bytes.
///
/// Labels may be referenced before they are defined.
pub fn assemble_source(source: impl Into<String>) -> Result<Bytes, VMError> {
    assemble_source_with_name(&source.into(), "<source>")
}

/// Assembles source with an associated filename for error diagnostics.
fn assemble_source_with_name(source: &str, source_name: &str) -> Result<Bytes, VMError> {
    let result = assemble_lines(source);
    if let Err(err) = &result {
        log_assembly_error(source_name, source, err);
    }
    result
}

/// Convenience: assemble directly from file path
pub fn assemble_file<P: AsRef<Path>>(path: P) -> Result<Bytes, VMError> {
    let path_ref = path.as_ref();
    let source = fs::read_to_string(path_ref).map_err(|e| VMError::IoError {
        path: path_ref.display().to_string(),
        source: e.to_string(),
    })?;
    assemble_source_with_name(&source, &path_ref.display().to_string())
}

// =========================
// Disassembly
// =========================

fn hex_operand(data: &[u8]) -> String {
    format!("0x{}", hex::encode(data))
}

/// Decodes the instruction at the context's cursor into assembly text.
fn decode_next(context: &mut ExecutionContext) -> Result<String, VMError> {
    let offset = context.ip();
    let opcode = context.read_u8()?;
    if is_push_bytes(opcode) {
        let data = context.read_bytes(usize::from(opcode))?;
        return Ok(format!("{PUSH_BYTES_PREFIX}{opcode} {}", hex_operand(&data)));
    }

    let instr =
        Instruction::try_from(opcode).map_err(|_| VMError::InvalidOpcode { opcode, offset })?;
    let mnemonic = instr.mnemonic();
    let text = match instr.operand() {
        None => mnemonic.to_string(),
        Some(OperandKind::Offset) => format!("{mnemonic} {}", context.read_i16()?),
        Some(OperandKind::Hash160) => format!("{mnemonic} 0x{}", context.read_hash()?),
        Some(OperandKind::VarBytes) => {
            let name = context.read_var_bytes(MAX_SYSCALL_NAME)?;
            format!("{mnemonic} \"{}\"", String::from_utf8_lossy(&name))
        }
        Some(OperandKind::Data1) => format!("{mnemonic} {}", hex_operand(&context.read_data1()?)),
        Some(OperandKind::Data2) => format!("{mnemonic} {}", hex_operand(&context.read_data2()?)),
        Some(OperandKind::Data4) => format!("{mnemonic} {}", hex_operand(&context.read_data4()?)),
    };
    Ok(text)
}

/// Renders the instruction starting at `offset`.
pub fn disassemble_at(script: &Bytes, offset: usize) -> Result<String, VMError> {
    let mut context = ExecutionContext::new(script.clone(), false);
    context.set_ip(offset);
    decode_next(&mut context)
}

/// Renders a whole script, one `offset: instruction` line each.
pub fn disassemble(script: impl Into<Bytes>) -> Result<String, VMError> {
    let mut context = ExecutionContext::new(script, false);
    let mut out = String::new();
    while !context.is_at_end() {
        let offset = context.ip();
        let text = decode_next(&mut context)?;
        let _ = writeln!(out, "{offset:04}: {text}");
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;

    fn texts(line: &str) -> Vec<&str> {
        tokenize(1, line).unwrap().iter().map(|t| t.text).collect()
    }

    #[test]
    fn tokenize_rules() {
        assert_eq!(texts("ADD"), vec!["ADD"]);
        assert_eq!(texts("  PUSH 5, # five"), vec!["PUSH", "5"]);
        assert_eq!(
            texts(r#"SYSCALL "A.B, C#D""#),
            vec!["SYSCALL", r#""A.B, C#D""#]
        );
        assert_eq!(texts("loop: JMP loop"), vec!["loop:", "JMP", "loop"]);
        assert!(texts("# only a comment").is_empty());
    }

    #[test]
    fn tokenize_columns() {
        let tokens = tokenize(1, "  PUSH   7").unwrap();
        assert_eq!(tokens[0].offset, 3);
        assert_eq!(tokens[1].offset, 10);
    }

    #[test]
    fn tokenize_unterminated_string() {
        assert!(matches!(
            tokenize(4, r#"SYSCALL "abc"#),
            Err(VMError::ParseError { line: 4, offset: 9, .. })
        ));
    }

    #[test]
    fn assemble_empty_source() {
        assert!(assemble_source("").unwrap().is_empty());
        assert!(assemble_source("\n# comment\n\n").unwrap().is_empty());
    }

    #[test]
    fn assemble_bare_instructions() {
        let script = assemble_source("PUSH2\nPUSH3 # three\nADD").unwrap();
        assert_eq!(script.as_slice(), &[0x52, 0x53, 0x93]);
    }

    #[test]
    fn assemble_generic_push() {
        let script = assemble_source(
            r#"
            PUSH -1
            PUSH 0
            PUSH 16
            PUSH 1000
            PUSH true
            PUSH false
            PUSH 0xabcd
            PUSH "hi"
            "#,
        )
        .unwrap();
        assert_eq!(
            script.as_slice(),
            &[
                0x4F, 0x00, 0x60, 0x02, 0xE8, 0x03, 0x51, 0x00, 0x02, 0xAB, 0xCD, 0x02, b'h', b'i'
            ]
        );
    }

    #[test]
    fn assemble_explicit_pushes() {
        let script = assemble_source("PUSHBYTES2 0x0102\nPUSHDATA1 0x07\nPUSHDATA2 0x\n").unwrap();
        assert_eq!(
            script.as_slice(),
            &[0x02, 0x01, 0x02, 0x4C, 0x01, 0x07, 0x4D, 0x00, 0x00]
        );
    }

    #[test]
    fn push_bytes_length_must_match() {
        let err = assemble_source("PUSHBYTES3 0x0102").unwrap_err();
        assert!(matches!(err, VMError::AssemblyError { line: 1, offset: 1, .. }));
        assert!(matches!(
            assemble_source("PUSHBYTES76 0x00").unwrap_err(),
            VMError::AssemblyError { .. }
        ));
    }

    #[test]
    fn assemble_invalid_instruction() {
        let err = assemble_source("PUSH1\n  FOO").unwrap_err();
        match err {
            VMError::AssemblyError {
                line,
                offset,
                source,
            } => {
                assert_eq!((line, offset), (2, 3));
                assert!(source.contains("FOO"));
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn assemble_wrong_arity() {
        assert!(matches!(
            assemble_source("ADD 1").unwrap_err(),
            VMError::AssemblyError { .. }
        ));
        assert!(matches!(
            assemble_source("JMP").unwrap_err(),
            VMError::AssemblyError { .. }
        ));
        assert!(matches!(
            parse_statement(
                &AsmContext::new(),
                &tokenize(1, "PUSH").unwrap(),
                0
            ),
            Err(VMError::ArityMismatch {
                expected: 1,
                actual: 0,
                ..
            })
        ));
    }

    #[test]
    fn labels_resolve_forward_and_backward() {
        let script = assemble_source(
            r#"
            start:
                PUSH1
                JMPIF end
                JMP start
            end: RET
            "#,
        )
        .unwrap();
        // 0: PUSH1, 1: JMPIF +6, 4: JMP -4, 7: RET
        assert_eq!(
            script.as_slice(),
            &[0x51, 0x63, 0x06, 0x00, 0x62, 0xFC, 0xFF, 0x66]
        );
    }

    #[test]
    fn numeric_jump_offsets() {
        let script = assemble_source("JMP 3\nCALL -1").unwrap();
        assert_eq!(script.as_slice(), &[0x62, 0x03, 0x00, 0x65, 0xFF, 0xFF]);
        assert!(matches!(
            parse_offset("40000", &AsmContext::new(), 0),
            Err(VMError::JumpOutOfRange { offset: 40000 })
        ));
    }

    #[test]
    fn duplicate_label_error() {
        let err = assemble_source("a:\na:").unwrap_err();
        assert!(matches!(err, VMError::AssemblyError { line: 2, .. }));
    }

    #[test]
    fn undefined_label_error() {
        match assemble_source("JMP nowhere").unwrap_err() {
            VMError::AssemblyError { source, .. } => assert!(source.contains("nowhere")),
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn label_context() {
        let mut ctx = AsmContext::new();
        ctx.define_label("a".to_string(), 4).unwrap();
        assert_eq!(ctx.resolve_label("a"), Ok(4));
        assert_eq!(
            ctx.define_label("a".to_string(), 5),
            Err(VMError::DuplicateLabel {
                label: "a".to_string()
            })
        );
        assert_eq!(ctx.jump_target("b", 9), Ok(9));
        ctx.strict = true;
        assert!(ctx.jump_target("b", 9).is_err());
    }

    #[test]
    fn syscall_and_app_call_operands() {
        let hash = "0x000102030405060708090a0b0c0d0e0f10111213";
        let script = assemble_source(format!(
            "SYSCALL \"Neo.Test\"\nAPPCALL {hash}\nTAILCALL {hash}"
        ))
        .unwrap();
        assert_eq!(&script[..10], &[0x68, 8, b'N', b'e', b'o', b'.', b'T', b'e', b's', b't']);
        assert_eq!(script[10], 0x67);
        assert_eq!(script[11..31], (0u8..20).collect::<Vec<_>>()[..]);
        assert_eq!(script[31], 0x69);
        assert_eq!(script.len(), 52);

        assert!(assemble_source("SYSCALL Neo.Test").is_err());
        assert!(assemble_source("SYSCALL \"\"").is_err());
        assert!(assemble_source("APPCALL 0x0102").is_err());
    }

    #[test]
    fn disassemble_every_form() {
        let source = r#"
            PUSH0
            PUSHBYTES3 0x010203
            PUSHDATA1 0xff
            PUSHDATA2 0x0a0b
            PUSHDATA4 0x0c
            PUSHM1
            PUSH16
            NOP
            JMP 3
            JMPIF -5
            JMPIFNOT 0
            CALL 6
            APPCALL 0x1111111111111111111111111111111111111111
            TAILCALL 0x2222222222222222222222222222222222222222
            SYSCALL "System.ExecutionEngine.GetEntryScriptHash"
            CHECKMULTISIG
            NEWSTRUCT
            RET
        "#;
        let script = assemble_source(source).unwrap();
        let listing = disassemble(script.clone()).unwrap();
        let lines: Vec<&str> = listing.lines().collect();
        assert_eq!(lines.len(), 18);
        assert_eq!(lines[0], "0000: PUSH0");
        assert_eq!(lines[1], "0001: PUSHBYTES3 0x010203");
        assert_eq!(lines[2], "0005: PUSHDATA1 0xff");
        assert_eq!(lines[3], "0008: PUSHDATA2 0x0a0b");
        assert_eq!(lines[4], "0013: PUSHDATA4 0x0c");
        assert_eq!(lines[9], "0025: JMPIF -5");
        assert_eq!(
            lines[12],
            "0034: APPCALL 0x1111111111111111111111111111111111111111"
        );
        assert_eq!(
            lines[14],
            "0076: SYSCALL \"System.ExecutionEngine.GetEntryScriptHash\""
        );
        assert_eq!(lines[17], "0121: RET");

        // listings are valid assembly
        assert_eq!(assemble_source(listing).unwrap(), script);
    }

    #[test]
    fn disassemble_single_instruction() {
        let script = assemble_source("PUSH1\nJMP -1").unwrap();
        assert_eq!(disassemble_at(&script, 1).unwrap(), "JMP -1");
        assert_eq!(disassemble_at(&script, 0).unwrap(), "PUSH1");
    }

    #[test]
    fn disassemble_rejects_bad_bytes() {
        assert_eq!(
            disassemble(vec![0x51u8, 0xFF]),
            Err(VMError::InvalidOpcode {
                opcode: 0xFF,
                offset: 1
            })
        );
        assert!(matches!(
            disassemble(vec![0x62u8, 0x00]),
            Err(VMError::UnexpectedEndOfScript { .. })
        ));
        assert!(matches!(
            disassemble(vec![0x4Eu8, 0xFF, 0xFF, 0xFF, 0xFF]),
            Err(VMError::NegativeLength { length: -1 })
        ));
    }

    #[test]
    fn diagnostic_points_at_column() {
        let source = "PUSH1\n  BAD 1\n";
        let diag = render_assembly_diagnostic("test.asm", source, 2, 3, "invalid instruction name: BAD");
        assert!(diag.contains("error: invalid instruction name: BAD"));
        assert!(diag.contains(" --> test.asm:2:3"));
        assert!(diag.contains("   2 |   BAD 1"));
        assert!(diag.contains("  |   ^"));
    }

    #[test]
    fn assemble_file_reads_source() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "PUSH2\nPUSH3\nADD").unwrap();
        let script = assemble_file(file.path()).unwrap();
        assert_eq!(script.as_slice(), &[0x52, 0x53, 0x93]);
    }

    #[test]
    fn assemble_file_missing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.asm");
        assert!(matches!(
            assemble_file(&path),
            Err(VMError::IoError { .. })
        ));
    }
}
