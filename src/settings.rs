//! Durable key-value settings used by the debugger manager.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use log::{debug, error, warn};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::debugger::breakpoint::BreakpointCookie;

pub const BREAKPOINTS_KEY: &str = "breakpoints";
pub const BREAKPOINTS_ENABLED_KEY: &str = "breakpoints-enabled";
pub const BREAK_ON_ALL_EXCEPTIONS_KEY: &str = "break-on-all-exceptions";
pub const BREAK_ON_ALL_UNCAUGHT_EXCEPTIONS_KEY: &str = "break-on-all-uncaught-exceptions";
pub const BREAK_ON_ASSERTIONS_KEY: &str = "break-on-assertions";
pub const ASYNC_STACK_TRACE_DEPTH_KEY: &str = "async-stack-trace-depth";
pub const TEMPORARILY_DISABLED_BREAKPOINTS_RESTORE_KEY: &str = "temporarily-disabled-breakpoints-restore";

pub const DEFAULT_ASYNC_STACK_TRACE_DEPTH: u32 = 200;

/// Key-value persistence backend
pub trait SettingsStore: Send {
    fn get(&self, key: &str) -> Option<Value>;
    fn set(&mut self, key: &str, value: Value);
}

/// Settings kept only for the lifetime of the process
#[derive(Debug, Clone, Default)]
pub struct MemorySettingsStore {
    values: HashMap<String, Value>,
}

impl MemorySettingsStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_value(mut self, key: &str, value: Value) -> Self {
        self.values.insert(key.to_string(), value);
        self
    }
}

impl SettingsStore for MemorySettingsStore {
    fn get(&self, key: &str) -> Option<Value> {
        self.values.get(key).cloned()
    }

    fn set(&mut self, key: &str, value: Value) {
        self.values.insert(key.to_string(), value);
    }
}

/// Settings persisted as one JSON object, rewritten on every change
#[derive(Debug)]
pub struct JsonFileSettingsStore {
    path: PathBuf,
    values: serde_json::Map<String, Value>,
}

impl JsonFileSettingsStore {
    /// Open the settings file; a missing file starts empty
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        let values = if path.exists() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("reading settings from {}", path.display()))?;
            serde_json::from_str(&contents)
                .with_context(|| format!("parsing settings in {}", path.display()))?
        } else {
            debug!("Settings file {} does not exist yet", path.display());
            serde_json::Map::new()
        };

        Ok(Self { path, values })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self) -> Result<()> {
        let contents = serde_json::to_string_pretty(&self.values)?;
        fs::write(&self.path, contents).with_context(|| format!("writing settings to {}", self.path.display()))
    }
}

impl SettingsStore for JsonFileSettingsStore {
    fn get(&self, key: &str) -> Option<Value> {
        self.values.get(key).cloned()
    }

    fn set(&mut self, key: &str, value: Value) {
        self.values.insert(key.to_string(), value);
        if let Err(e) = self.persist() {
            error!("Failed to save settings: {:#}", e);
        }
    }
}

/// A typed setting with a default, cached in memory and written through
#[derive(Debug, Clone)]
pub struct Setting<T> {
    key: &'static str,
    value: T,
}

impl<T> Setting<T>
where
    T: Serialize + DeserializeOwned + Clone + PartialEq,
{
    pub fn load(store: &dyn SettingsStore, key: &'static str, default: T) -> Self {
        let value = match store.get(key) {
            Some(raw) => match serde_json::from_value(raw) {
                Ok(value) => value,
                Err(e) => {
                    warn!("Ignoring malformed setting {}: {}", key, e);
                    default
                }
            },
            None => default,
        };

        Self { key, value }
    }

    pub fn key(&self) -> &'static str {
        self.key
    }

    pub fn value(&self) -> &T {
        &self.value
    }

    pub fn set(&mut self, store: &mut dyn SettingsStore, value: T) {
        if self.value == value {
            return;
        }

        match serde_json::to_value(&value) {
            Ok(raw) => store.set(self.key, raw),
            Err(e) => error!("Failed to serialize setting {}: {}", self.key, e),
        }
        self.value = value;
    }
}

/// Every setting the debugger manager reads or writes
pub struct DebuggerSettings {
    store: Box<dyn SettingsStore>,
    breakpoints: Setting<Vec<BreakpointCookie>>,
    breakpoints_enabled: Setting<bool>,
    break_on_all_exceptions: Setting<bool>,
    break_on_all_uncaught_exceptions: Setting<bool>,
    break_on_assertions: Setting<bool>,
    async_stack_trace_depth: Setting<u32>,
    temporarily_disabled_restore: Setting<Option<bool>>,
}

impl DebuggerSettings {
    pub fn load(store: Box<dyn SettingsStore>) -> Self {
        let backing = store.as_ref();

        Self {
            breakpoints: Setting::load(backing, BREAKPOINTS_KEY, Vec::new()),
            breakpoints_enabled: Setting::load(backing, BREAKPOINTS_ENABLED_KEY, true),
            break_on_all_exceptions: Setting::load(backing, BREAK_ON_ALL_EXCEPTIONS_KEY, false),
            break_on_all_uncaught_exceptions: Setting::load(backing, BREAK_ON_ALL_UNCAUGHT_EXCEPTIONS_KEY, false),
            break_on_assertions: Setting::load(backing, BREAK_ON_ASSERTIONS_KEY, false),
            async_stack_trace_depth: Setting::load(backing, ASYNC_STACK_TRACE_DEPTH_KEY, DEFAULT_ASYNC_STACK_TRACE_DEPTH),
            temporarily_disabled_restore: Setting::load(backing, TEMPORARILY_DISABLED_BREAKPOINTS_RESTORE_KEY, None),
            store,
        }
    }

    /// Settings backed by a fresh in-memory store
    pub fn in_memory() -> Self {
        Self::load(Box::new(MemorySettingsStore::new()))
    }

    pub fn store(&self) -> &dyn SettingsStore {
        self.store.as_ref()
    }

    pub fn breakpoints(&self) -> &[BreakpointCookie] {
        self.breakpoints.value()
    }

    pub fn set_breakpoints(&mut self, cookies: Vec<BreakpointCookie>) {
        self.breakpoints.set(self.store.as_mut(), cookies);
    }

    pub fn breakpoints_enabled(&self) -> bool {
        *self.breakpoints_enabled.value()
    }

    pub fn set_breakpoints_enabled(&mut self, enabled: bool) {
        self.breakpoints_enabled.set(self.store.as_mut(), enabled);
    }

    pub fn break_on_all_exceptions(&self) -> bool {
        *self.break_on_all_exceptions.value()
    }

    pub fn set_break_on_all_exceptions(&mut self, enabled: bool) {
        self.break_on_all_exceptions.set(self.store.as_mut(), enabled);
    }

    pub fn break_on_all_uncaught_exceptions(&self) -> bool {
        *self.break_on_all_uncaught_exceptions.value()
    }

    pub fn set_break_on_all_uncaught_exceptions(&mut self, enabled: bool) {
        self.break_on_all_uncaught_exceptions.set(self.store.as_mut(), enabled);
    }

    pub fn break_on_assertions(&self) -> bool {
        *self.break_on_assertions.value()
    }

    pub fn set_break_on_assertions(&mut self, enabled: bool) {
        self.break_on_assertions.set(self.store.as_mut(), enabled);
    }

    pub fn async_stack_trace_depth(&self) -> u32 {
        *self.async_stack_trace_depth.value()
    }

    pub fn set_async_stack_trace_depth(&mut self, depth: u32) {
        self.async_stack_trace_depth.set(self.store.as_mut(), depth);
    }

    /// Enabled flag to restore once a temporary suppression ends
    pub fn temporarily_disabled_restore(&self) -> Option<bool> {
        *self.temporarily_disabled_restore.value()
    }

    pub fn set_temporarily_disabled_restore(&mut self, restore: Option<bool>) {
        self.temporarily_disabled_restore.set(self.store.as_mut(), restore);
    }
}

impl std::fmt::Debug for DebuggerSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DebuggerSettings")
            .field("breakpoints", &self.breakpoints.value().len())
            .field("breakpoints_enabled", self.breakpoints_enabled.value())
            .field("break_on_all_exceptions", self.break_on_all_exceptions.value())
            .field("break_on_all_uncaught_exceptions", self.break_on_all_uncaught_exceptions.value())
            .field("break_on_assertions", self.break_on_assertions.value())
            .field("async_stack_trace_depth", self.async_stack_trace_depth.value())
            .field("temporarily_disabled_restore", self.temporarily_disabled_restore.value())
            .finish()
    }
}
