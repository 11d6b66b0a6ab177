//! [`Commander`] – registry of named, loosely-typed commands.
//!
//! A command is a function of a JSON-like [`Params`] map returning a JSON
//! [`Value`]. Handlers coerce their own argument types. Commands are
//! registered while the owner is composed; once the owner starts, the
//! registry is frozen and only read.
//!
//! Looking up or executing an unknown command yields `None`, never an error.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use botkit_types::{ConfigError, Params, Value};
use parking_lot::RwLock;

/// A registered command handler.
pub type CommandFn = Arc<dyn Fn(&Params) -> Value + Send + Sync>;

#[derive(Default)]
struct Inner {
    commands: RwLock<BTreeMap<String, CommandFn>>,
    frozen: AtomicBool,
}

/// Named commands belonging to one object. Clones share the same registry.
#[derive(Clone, Default)]
pub struct Commander {
    inner: Arc<Inner>,
}

impl fmt::Debug for Commander {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Commander")
            .field("commands", &self.commands())
            .finish()
    }
}

impl Commander {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` under `name`.
    ///
    /// # Errors
    ///
    /// * [`ConfigError::DuplicateName`] when `name` is already registered.
    /// * [`ConfigError::Frozen`] once the owner has started.
    pub fn add_command<F>(&self, name: &str, handler: F) -> Result<(), ConfigError>
    where
        F: Fn(&Params) -> Value + Send + Sync + 'static,
    {
        if self.is_frozen() {
            return Err(ConfigError::Frozen {
                what: format!("command registry (adding '{name}')"),
            });
        }
        let mut commands = self.inner.commands.write();
        if commands.contains_key(name) {
            return Err(ConfigError::DuplicateName {
                kind: "command",
                name: name.to_string(),
            });
        }
        commands.insert(name.to_string(), Arc::new(handler));
        Ok(())
    }

    pub fn command(&self, name: &str) -> Option<CommandFn> {
        self.inner.commands.read().get(name).cloned()
    }

    /// Registered command names, sorted.
    pub fn commands(&self) -> Vec<String> {
        self.inner.commands.read().keys().cloned().collect()
    }

    /// Run the command `name` with `params`. `None` when it does not exist.
    pub fn execute(&self, name: &str, params: &Params) -> Option<Value> {
        // Release the lock before running user code.
        let handler = self.command(name)?;
        Some(handler(params))
    }

    pub fn freeze(&self) {
        self.inner.frozen.store(true, Ordering::SeqCst);
    }

    pub fn thaw(&self) {
        self.inner.frozen.store(false, Ordering::SeqCst);
    }

    pub fn is_frozen(&self) -> bool {
        self.inner.frozen.load(Ordering::SeqCst)
    }
}
