//! Script runner and tracer.
//!
//! Assembles a script (or decodes it from hex), runs it on the execution
//! engine and prints the final state and evaluation stack.
//!
//! # Usage
//! ```text
//! script_vm <script> [OPTIONS]
//! ```
//!
//! # Arguments
//! - `script`: Assembly source file, or hex bytecode with `--hex`
//!
//! # Options
//! - `--hex`: Treat `<script>` as hex-encoded bytecode
//! - `--push-only`: Load the script as a push-only frame
//! - `--break <offset>`: Pause and dump the stack at `offset` (repeatable)
//! - `--max-steps <n>`: Abort after `n` opcodes (defaults to 1,000,000)
//! - `--trace`: Log every instruction before it executes
//!
//! The log level is read from `SCRIPT_VM_LOG` (`debug`, `info`, `warn`, `error`).
//!
//! # Exit status
//! `0` on HALT, `1` on FAULT or bad input, `2` when the step budget runs out.

use script_vm::crypto::{Crypto, Secp256k1Crypto};
use script_vm::types::bytes::Bytes;
use script_vm::types::hash::ScriptHash;
use script_vm::utils::log;
use script_vm::virtual_machine::assembler::{assemble_file, disassemble_at};
use script_vm::virtual_machine::host::MemoryScriptTable;
use script_vm::virtual_machine::state::VMState;
use script_vm::virtual_machine::vm::ExecutionEngine;
use script_vm::{error, info, warn};
use std::env;
use std::process;

const DEFAULT_MAX_STEPS: u64 = 1_000_000;

struct Options {
    input: String,
    hex: bool,
    push_only: bool,
    breakpoints: Vec<u32>,
    max_steps: u64,
    trace: bool,
}

fn main() {
    log::init_from_env();
    let args: Vec<String> = env::args().collect();
    let program = args.first().map(String::as_str).unwrap_or("script_vm");

    if args.len() < 2 || args[1] == "--help" || args[1] == "-h" {
        print_usage(program);
        process::exit(if args.len() < 2 { 1 } else { 0 });
    }

    let options = parse_args(program, &args);
    let script = load_script(&options);
    process::exit(run(&options, script));
}

fn parse_args(program: &str, args: &[String]) -> Options {
    let mut options = Options {
        input: args[1].clone(),
        hex: false,
        push_only: false,
        breakpoints: Vec::new(),
        max_steps: DEFAULT_MAX_STEPS,
        trace: false,
    };

    let mut i = 2;
    while i < args.len() {
        match args[i].as_str() {
            "--hex" => options.hex = true,
            "--push-only" => options.push_only = true,
            "--trace" => options.trace = true,
            k @ "--break" => {
                i += 1;
                let value = flag_value(args, i, k);
                let offset = value.parse::<u32>().unwrap_or_else(|_| {
                    error!("Invalid breakpoint offset: '{value}'");
                    process::exit(1);
                });
                options.breakpoints.push(offset);
            }
            k @ "--max-steps" => {
                i += 1;
                let value = flag_value(args, i, k);
                options.max_steps = match value.parse::<u64>() {
                    Ok(n) if n > 0 => n,
                    _ => {
                        error!("Step budget must be a positive number, got '{value}'");
                        process::exit(1);
                    }
                };
            }
            other => {
                error!("Unexpected argument: {}\n", other);
                print_usage(program);
                process::exit(1);
            }
        }
        i += 1;
    }

    options
}

/// Value following `flag`, or exit when it is missing.
fn flag_value<'a>(args: &'a [String], i: usize, flag: &str) -> &'a str {
    match args.get(i) {
        Some(value) => value,
        None => {
            error!("{flag} requires an argument");
            process::exit(1);
        }
    }
}

fn load_script(options: &Options) -> Bytes {
    if options.hex {
        let text = options.input.trim();
        let digits = text.strip_prefix("0x").unwrap_or(text);
        return match hex::decode(digits) {
            Ok(bytes) => Bytes::new(bytes),
            Err(e) => {
                error!("Invalid hex script: {e}");
                process::exit(1);
            }
        };
    }

    match assemble_file(&options.input) {
        Ok(script) => script,
        Err(e) => {
            error!("Assembly failed: {e}");
            process::exit(1);
        }
    }
}

/// Drives the engine one opcode at a time and returns the exit status.
fn run(options: &Options, script: Bytes) -> i32 {
    let crypto = Secp256k1Crypto;
    let hash = ScriptHash(crypto.hash160(&script));
    // the script may APPCALL itself
    let mut table = MemoryScriptTable::new();
    table.insert(hash, script.clone());

    let mut engine = ExecutionEngine::new(&crypto).with_table(&table);
    engine.load_script(script.clone(), options.push_only);
    for offset in &options.breakpoints {
        if let Err(e) = engine.add_breakpoint(*offset) {
            error!("{e}");
            return 1;
        }
    }
    info!("Loaded script {hash} ({} bytes)", script.len());

    let mut steps = 0u64;
    while !engine.state().is_terminal() {
        if steps == options.max_steps {
            warn!("Step budget of {} exhausted", options.max_steps);
            print_stacks(&engine);
            return 2;
        }
        if options.trace {
            trace(&engine);
        }
        engine.step_into();
        steps += 1;

        if engine.state() == VMState::Break {
            let ip = engine.current_context().map(|c| c.ip()).unwrap_or(0);
            info!("Break at offset {ip} after {steps} steps");
            print_stacks(&engine);
            engine.resume();
        }
    }

    match engine.fault_reason() {
        Some(reason) => {
            error!("FAULT after {steps} steps: {reason}");
            print_stacks(&engine);
            1
        }
        None => {
            info!("{} after {steps} steps", engine.state());
            print_stacks(&engine);
            0
        }
    }
}

fn trace(engine: &ExecutionEngine<'_>) {
    let Ok(context) = engine.current_context() else {
        return;
    };
    let depth = engine.invocation_stack().len();
    let text = if context.is_at_end() {
        "RET (end of script)".to_string()
    } else {
        disassemble_at(context.script(), context.ip()).unwrap_or_else(|e| format!("<{e}>"))
    };
    info!("[{depth}] {:04}: {text}", context.ip());
}

fn print_stacks(engine: &ExecutionEngine<'_>) {
    let stack = engine.evaluation_stack();
    println!("Evaluation stack ({} items, top first):", stack.len());
    for (depth, item) in stack.iter().rev().enumerate() {
        println!("{depth:>4}: {item}");
    }

    let alt = engine.alt_stack();
    if !alt.is_empty() {
        println!("Alt stack ({} items, top first):", alt.len());
        for (depth, item) in alt.iter().rev().enumerate() {
            println!("{depth:>4}: {item}");
        }
    }
}

const USAGE: &str = "\
Script VM

USAGE:
    {program} <script> [OPTIONS]

ARGS:
    <script>    Assembly source file, or hex bytecode with --hex

OPTIONS:
    --hex                Treat <script> as hex-encoded bytecode
    --push-only          Load the script as a push-only frame
    --break <offset>     Pause and dump the stack at <offset> (repeatable)
    --max-steps <n>      Abort after <n> opcodes (defaults to 1,000,000)
    --trace              Log every instruction before it executes
    -h, --help           Print this help message

ENVIRONMENT:
    SCRIPT_VM_LOG        Minimum log level: debug, info, warn or error

EXAMPLES:
    # Run an assembly file
    {program} add.asm

    # Run raw bytecode (PUSH2 PUSH3 ADD), tracing every step
    {program} 525393 --hex --trace

    # Pause at offset 4 and stop after 100 opcodes
    {program} loop.asm --break 4 --max-steps 100
";

fn print_usage(program: &str) {
    info!("{}", USAGE.replace("{program}", program));
}
