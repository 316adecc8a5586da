//! Host calls reachable through `SYSCALL`.
//!
//! [`InteropService`] maps call names to handlers that receive the live engine.
//! A fresh service carries the `System.ExecutionEngine.*` built-ins; hosts add
//! their own entries with [`InteropService::register`] before running
//! untrusted scripts. Unknown names fault the engine.

use crate::virtual_machine::errors::VMError;
use crate::virtual_machine::host::InteropInterface;
use crate::virtual_machine::value::StackItem;
use crate::virtual_machine::vm::ExecutionEngine;
use std::collections::HashMap;
use std::rc::Rc;

pub const GET_SCRIPT_CONTAINER: &str = "System.ExecutionEngine.GetScriptContainer";
pub const GET_EXECUTING_SCRIPT_HASH: &str = "System.ExecutionEngine.GetExecutingScriptHash";
pub const GET_CALLING_SCRIPT_HASH: &str = "System.ExecutionEngine.GetCallingScriptHash";
pub const GET_ENTRY_SCRIPT_HASH: &str = "System.ExecutionEngine.GetEntryScriptHash";

/// A host call. Returning `Err` faults the engine.
pub type InteropHandler = Rc<dyn Fn(&mut ExecutionEngine<'_>) -> Result<(), VMError>>;

#[derive(Clone)]
pub struct InteropService {
    handlers: HashMap<String, InteropHandler>,
}

impl InteropService {
    /// Service with the built-in engine queries registered.
    pub fn new() -> Self {
        let mut service = Self::empty();
        service.register(GET_SCRIPT_CONTAINER, get_script_container);
        service.register(GET_EXECUTING_SCRIPT_HASH, get_executing_script_hash);
        service.register(GET_CALLING_SCRIPT_HASH, get_calling_script_hash);
        service.register(GET_ENTRY_SCRIPT_HASH, get_entry_script_hash);
        service
    }

    /// Service with no entries at all.
    pub fn empty() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// Adds `handler` under `name`, replacing any previous entry.
    pub fn register<F>(&mut self, name: impl Into<String>, handler: F)
    where
        F: Fn(&mut ExecutionEngine<'_>) -> Result<(), VMError> + 'static,
    {
        self.handlers.insert(name.into(), Rc::new(handler));
    }

    pub fn contains(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }

    /// Handler registered under `name`.
    pub fn get(&self, name: &str) -> Option<InteropHandler> {
        self.handlers.get(name).cloned()
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.handlers.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl Default for InteropService {
    fn default() -> Self {
        Self::new()
    }
}

fn get_script_container(engine: &mut ExecutionEngine<'_>) -> Result<(), VMError> {
    let container = engine
        .script_container()
        .cloned()
        .ok_or(VMError::MissingScriptContainer)?;
    let object: Rc<dyn InteropInterface> = container;
    engine.evaluation_stack_mut().push(StackItem::interop(object));
    Ok(())
}

fn get_executing_script_hash(engine: &mut ExecutionEngine<'_>) -> Result<(), VMError> {
    let hash = engine.current_context()?.script_hash(engine.crypto());
    engine.evaluation_stack_mut().push(hash.to_vec().into());
    Ok(())
}

fn get_calling_script_hash(engine: &mut ExecutionEngine<'_>) -> Result<(), VMError> {
    let hash = engine.calling_context()?.script_hash(engine.crypto());
    engine.evaluation_stack_mut().push(hash.to_vec().into());
    Ok(())
}

fn get_entry_script_hash(engine: &mut ExecutionEngine<'_>) -> Result<(), VMError> {
    let hash = engine.entry_context()?.script_hash(engine.crypto());
    engine.evaluation_stack_mut().push(hash.to_vec().into());
    Ok(())
}
