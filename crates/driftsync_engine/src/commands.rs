//! Parsing and dispatch of inter-device commands.

use driftsync_protocol::Command;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

/// Executes one kind of command.
pub trait CommandRunner: Send + Sync {
    /// Runs the command with its positional arguments.
    fn execute(&self, args: &[String]);
}

/// Registry dispatching commands from the `clients` collection to their
/// runners. Malformed commands parse to nothing and unregistered commands
/// are logged and dropped; neither is ever an error.
#[derive(Default)]
pub struct CommandProcessor {
    runners: HashMap<String, Box<dyn CommandRunner>>,
}

impl CommandProcessor {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a runner for a command name.
    pub fn register_command(&mut self, name: impl Into<String>, runner: Box<dyn CommandRunner>) {
        self.runners.insert(name.into(), runner);
    }

    /// Returns true if a runner is registered for `name`.
    #[must_use]
    pub fn is_registered(&self, name: &str) -> bool {
        self.runners.contains_key(name)
    }

    /// Parses and dispatches one wire command. Returns true if a runner
    /// executed it.
    pub fn process_command(&self, value: &Value) -> bool {
        let Some(command) = Command::from_value(value) else {
            debug!("ignoring malformed command");
            return false;
        };
        let Some(runner) = self.runners.get(&command.command_type) else {
            debug!(command = %command.command_type, "no runner registered; dropping command");
            return false;
        };
        runner.execute(&command.args);
        true
    }
}

impl std::fmt::Debug for CommandProcessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandProcessor")
            .field("registered", &self.runners.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Built-in runner for `displayURI`: surfaces a URI sent by another device.
#[derive(Debug, Default)]
pub struct DisplayUriRunner;

impl CommandRunner for DisplayUriRunner {
    fn execute(&self, args: &[String]) {
        let uri = args.first().map(String::as_str).unwrap_or("<missing>");
        let sender = args.get(1).map(String::as_str).unwrap_or("<unknown>");
        info!(%uri, %sender, "displayURI command received");
    }
}

/// Built-in runner for `wipeEngine`: arms the clients stage wipe flag so
/// the local store is replaced wholesale on the next download.
#[derive(Debug)]
pub struct WipeEngineRunner {
    flag: Arc<AtomicBool>,
}

impl WipeEngineRunner {
    /// Creates a runner arming the given flag.
    #[must_use]
    pub fn new(flag: Arc<AtomicBool>) -> Self {
        Self { flag }
    }
}

impl CommandRunner for WipeEngineRunner {
    fn execute(&self, args: &[String]) {
        info!(engine = ?args.first(), "wipeEngine command received");
        self.flag.store(true, Ordering::SeqCst);
    }
}
