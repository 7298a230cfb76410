//! Console application: option declaration and precedence resolution.
//!
//! An application declares its options (name, typed default, help text,
//! flags) up front, parses the command line once, and then resolves each
//! option on demand through the precedence chain:
//!
//! 1. command-line argument,
//! 2. explicit [`ConsoleApp::set_option`] value,
//! 3. the cascading configuration file chain,
//! 4. the declared default.
//!
//! The first successful resolution locks the option's kind; later raw
//! values coerce toward it. Resolved values are cached; a config reload
//! deliberately does not invalidate them — callers re-fetch explicitly via
//! [`ConsoleApp::invalidate_option`].

use std::path::{Path, PathBuf};
use std::sync::RwLock;

use indexmap::IndexMap;
use layered_config::{ConfigError, ConfigStore, ConfigValue, SourceChain, ValueKind};

use crate::cli;
use crate::error::{AppError, Result};
use crate::output::{DebugLevel, Output, RotatingFileSink};

/// Normalization applied to a command-line value before choice checking.
pub type Normalizer = fn(&str) -> String;

/// Reserved framework option: debug output level (`-D`).
pub const DEBUG_LEVEL_OPTION: &str = "debugLevel";
/// Reserved framework option: log file path (`-L`).
pub const LOG_FILE_OPTION: &str = "logFile";
/// Framework option: log rotation threshold in megabytes.
pub const LOG_FILE_MAX_SIZE_OPTION: &str = "logFileMaxSize";

/// Declaration of one option.
pub struct OptionSpec {
   pub(crate) name: String,
   pub(crate) default: ConfigValue,
   pub(crate) help: String,
   pub(crate) short: Option<char>,
   pub(crate) no_short: bool,
   pub(crate) multiple: bool,
   pub(crate) choices: Option<Vec<String>>,
   pub(crate) normalizer: Option<Normalizer>,
}

impl OptionSpec {
   pub fn new(name: &str, default: ConfigValue) -> Self {
      Self {
         name: name.to_string(),
         default,
         help: String::new(),
         short: None,
         no_short: false,
         multiple: false,
         choices: None,
         normalizer: None,
      }
   }

   pub fn help(mut self, text: &str) -> Self {
      self.help = text.to_string();
      self
   }

   /// Explicit short flag (default: first letter of the name, when free).
   pub fn short(mut self, flag: char) -> Self {
      self.short = Some(flag);
      self
   }

   /// Suppress the short flag entirely.
   pub fn no_short(mut self) -> Self {
      self.no_short = true;
      self
   }

   /// Allow multiple command-line occurrences; each appends to an ordered
   /// sequence and the resolved value is a list.
   pub fn multiple(mut self) -> Self {
      self.multiple = true;
      self
   }

   /// Closed set of allowed command-line values.
   pub fn choices<I, S>(mut self, values: I) -> Self
   where
      I: IntoIterator<Item = S>,
      S: Into<String>,
   {
      self.choices = Some(values.into_iter().map(Into::into).collect());
      self
   }

   /// Normalization applied to command-line values before the choice check.
   pub fn normalizer(mut self, normalize: Normalizer) -> Self {
      self.normalizer = Some(normalize);
      self
   }
}

/// Runtime state of one declared (or config-discovered) option.
pub(crate) struct OptionDecl {
   pub(crate) spec: OptionSpec,
   /// Locked on first successful resolution.
   kind: Option<ValueKind>,
   /// Element kind for multiple-valued options, taken from the default
   /// list's first element.
   elem_kind: Option<ValueKind>,
   explicit: Option<ConfigValue>,
   cli: Vec<String>,
   cached: Option<ConfigValue>,
}

impl OptionDecl {
   fn declared(spec: OptionSpec) -> Self {
      let kind = Some(spec.default.kind());
      let elem_kind = match &spec.default {
         ConfigValue::List(items) => items.first().map(ConfigValue::kind),
         _ => None,
      };
      Self {
         spec,
         kind,
         elem_kind,
         explicit: None,
         cli: Vec::new(),
         cached: None,
      }
   }

   /// An option that exists only because a config file defines it; its kind
   /// is inferred on first resolution.
   fn dynamic(name: &str) -> Self {
      Self {
         spec: OptionSpec::new(name, ConfigValue::Str(String::new())),
         kind: None,
         elem_kind: None,
         explicit: None,
         cli: Vec::new(),
         cached: None,
      }
   }
}

/// A console application instance: a named option registry over a layered
/// configuration store.
pub struct ConsoleApp {
   name: String,
   env_id: Option<String>,
   store: RwLock<ConfigStore>,
   options: RwLock<IndexMap<String, OptionDecl>>,
}

impl ConsoleApp {
   /// Create an application, discovering the configuration chain from the
   /// current executable path and working directory.
   pub fn new(name: &str, env_id: Option<&str>) -> Self {
      let app_path = std::env::current_exe().unwrap_or_else(|_| PathBuf::from(name));
      let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
      let chain = SourceChain::discover(&app_path, env_id, &cwd, &[]);
      Self::with_chain(name, env_id, chain)
   }

   /// Create an application over an explicit source chain.
   pub fn with_chain(name: &str, env_id: Option<&str>, chain: SourceChain) -> Self {
      Self::build(name, env_id, ConfigStore::load(chain, None))
   }

   /// Create an application over a pre-loaded store.
   pub fn with_store(name: &str, store: ConfigStore) -> Self {
      Self::build(name, None, store)
   }

   fn build(name: &str, env_id: Option<&str>, store: ConfigStore) -> Self {
      let app = Self {
         name: name.to_string(),
         env_id: env_id.map(str::to_string),
         store: RwLock::new(store),
         options: RwLock::new(IndexMap::new()),
      };
      // Reserved framework options
      app.declare(
         OptionSpec::new(DEBUG_LEVEL_OPTION, ConfigValue::Int(0))
            .short('D')
            .choices(["0", "1", "2", "3"])
            .help("Debug level: 0=disabled, 1=enabled, 2=verbose, 3=timestamped"),
      );
      app.declare(
         OptionSpec::new(LOG_FILE_OPTION, ConfigValue::Str(String::new()))
            .short('L')
            .help("Duplicate console output into this log file"),
      );
      app.declare(
         OptionSpec::new(LOG_FILE_MAX_SIZE_OPTION, ConfigValue::Int(20))
            .no_short()
            .help("Log file rotation threshold in megabytes"),
      );
      app
   }

   pub fn name(&self) -> &str {
      &self.name
   }

   pub fn env_id(&self) -> Option<&str> {
      self.env_id.as_deref()
   }

   /// Declare an option. Re-declaring a name replaces the previous
   /// declaration and drops any cached resolution.
   pub fn declare(&self, spec: OptionSpec) {
      let mut options = self.lock_options();
      options.insert(spec.name.clone(), OptionDecl::declared(spec));
   }

   /// Parse the process command line. On failure the usage message is
   /// printed and the process exits with a non-zero status — a misconfigured
   /// run must not proceed with wrong values.
   pub fn parse_args(&self) {
      if let Err(err) = self.parse_cli(std::env::args_os()) {
         err.exit();
      }
   }

   /// Non-exiting parse entry point for tests and embedders. `argv` includes
   /// the binary name.
   pub fn parse_args_from<I, T>(&self, argv: I) -> Result<()>
   where
      I: IntoIterator<Item = T>,
      T: Into<std::ffi::OsString> + Clone,
   {
      self
         .parse_cli(argv)
         .map_err(|e| AppError::Usage(e.to_string()))
   }

   fn parse_cli<I, T>(&self, argv: I) -> std::result::Result<(), clap::Error>
   where
      I: IntoIterator<Item = T>,
      T: Into<std::ffi::OsString> + Clone,
   {
      let mut options = self.lock_options();
      let mut cmd = cli::build_command(&self.name, &options);
      let occurrences = cli::parse_occurrences(&mut cmd, argv)?;

      // Choice validation happens here, where the usage/error path is still
      // available. The normalized value is what gets appended.
      for (name, decl) in options.iter_mut() {
         let Some(values) = occurrences.get(name) else {
            continue;
         };
         let mut accepted = Vec::with_capacity(values.len());
         for value in values {
            let normalized = match decl.spec.normalizer {
               Some(normalize) => normalize(value),
               None => value.trim().to_string(),
            };
            if let Some(choices) = &decl.spec.choices
               && !choices.iter().any(|c| c == &normalized)
            {
               return Err(cmd.error(
                  clap::error::ErrorKind::InvalidValue,
                  format!(
                     "invalid value '{normalized}' for '--{name}': allowed values are {choices:?}"
                  ),
               ));
            }
            accepted.push(normalized);
         }
         decl.cli = accepted;
         decl.cached = None;
      }
      Ok(())
   }

   /// Explicitly set an option value (precedence below the command line,
   /// above config files).
   pub fn set_option(&self, name: &str, value: ConfigValue) -> Result<()> {
      let mut options = self.lock_options();
      let decl = options
         .entry(name.to_string())
         .or_insert_with(|| OptionDecl::dynamic(name));
      if let Some(kind) = decl.kind
         && value.kind() != kind
      {
         return Err(AppError::Config(ConfigError::Coercion {
            option: name.to_string(),
            raw: value.persist_repr(),
            kind,
         }));
      }
      if decl.kind.is_none() {
         decl.kind = Some(value.kind());
      }
      decl.explicit = Some(value);
      decl.cached = None;
      Ok(())
   }

   /// Resolve the effective value of `name` through the precedence chain.
   pub fn get_option(&self, name: &str) -> Result<ConfigValue> {
      let mut options = self.lock_options();
      if !options.contains_key(name) {
         // Options may also be created by a config file read
         let known = {
            let store = self.lock_store_read();
            store.get_raw(name).is_some()
         };
         if !known {
            return Err(AppError::UnknownOption(name.to_string()));
         }
         options.insert(name.to_string(), OptionDecl::dynamic(name));
      }
      let Some(decl) = options.get_mut(name) else {
         return Err(AppError::UnknownOption(name.to_string()));
      };

      if let Some(cached) = &decl.cached {
         return Ok(cached.clone());
      }

      let resolved = if !decl.cli.is_empty() {
         if decl.spec.multiple {
            let mut items = Vec::with_capacity(decl.cli.len());
            for raw in &decl.cli {
               items.push(ConfigValue::coerce(name, raw, decl.elem_kind)?);
            }
            ConfigValue::List(items)
         } else {
            let raw = decl.cli[decl.cli.len() - 1].clone();
            ConfigValue::coerce(name, &raw, decl.kind)?
         }
      } else if let Some(explicit) = &decl.explicit {
         explicit.clone()
      } else {
         let from_store = {
            let store = self.lock_store_read();
            store.get_raw(name).map(|sourced| sourced.raw.clone())
         };
         match from_store {
            Some(raw) => ConfigValue::coerce(name, &raw, decl.kind)?,
            None => decl.spec.default.clone(),
         }
      };

      if decl.kind.is_none() {
         decl.kind = Some(resolved.kind());
      }
      decl.cached = Some(resolved.clone());
      Ok(resolved)
   }

   /// Drop the cached resolution of `name`, forcing the next
   /// [`ConsoleApp::get_option`] to resolve afresh.
   pub fn invalidate_option(&self, name: &str) {
      let mut options = self.lock_options();
      if let Some(decl) = options.get_mut(name) {
         decl.cached = None;
      }
   }

   pub fn get_int(&self, name: &str) -> Result<i64> {
      match self.get_option(name)? {
         ConfigValue::Int(i) => Ok(i),
         other => Err(self.kind_mismatch(name, &other, ValueKind::Int)),
      }
   }

   pub fn get_str(&self, name: &str) -> Result<String> {
      match self.get_option(name)? {
         ConfigValue::Str(s) => Ok(s),
         other => Err(self.kind_mismatch(name, &other, ValueKind::Str)),
      }
   }

   pub fn get_bool(&self, name: &str) -> Result<bool> {
      match self.get_option(name)? {
         ConfigValue::Bool(b) => Ok(b),
         other => Err(self.kind_mismatch(name, &other, ValueKind::Bool)),
      }
   }

   fn kind_mismatch(&self, name: &str, value: &ConfigValue, kind: ValueKind) -> AppError {
      AppError::Config(ConfigError::Coercion {
         option: name.to_string(),
         raw: value.persist_repr(),
         kind,
      })
   }

   /// Whether the main config file changed on disk since it was read.
   pub fn is_config_stale(&self) -> bool {
      self.lock_store_read().is_stale()
   }

   /// Re-read the whole source chain. Cached option resolutions survive;
   /// callers re-fetch what they need via [`ConsoleApp::invalidate_option`].
   pub fn reload_config(&self) {
      self
         .store
         .write()
         .unwrap_or_else(|e| e.into_inner())
         .reload();
   }

   /// Persist a value into the designated section of the main config file
   /// (or an explicit section/file).
   pub fn persist_option(
      &self,
      name: &str,
      value: &ConfigValue,
      section: Option<&str>,
      file: Option<&Path>,
   ) -> Result<()> {
      self.lock_store_read().persist(name, value, section, file)?;
      Ok(())
   }

   pub fn main_config_file(&self) -> PathBuf {
      self.lock_store_read().main_file().to_path_buf()
   }

   /// The effective debug level from the reserved `debugLevel` option.
   pub fn debug_level(&self) -> DebugLevel {
      self
         .get_int(DEBUG_LEVEL_OPTION)
         .ok()
         .and_then(|level| DebugLevel::try_from(level).ok())
         .unwrap_or_default()
   }

   /// The effective log file path, if one is configured.
   pub fn log_file(&self) -> Option<PathBuf> {
      match self.get_str(LOG_FILE_OPTION) {
         Ok(path) if !path.is_empty() => Some(PathBuf::from(path)),
         _ => None,
      }
   }

   /// Build the output facade from the resolved reserved options: console
   /// only, or console duplicated into a rotating log file.
   pub fn build_output(&self) -> Result<Output> {
      let level = self.debug_level();
      match self.log_file() {
         Some(path) => {
            let max_megabytes = self.get_int(LOG_FILE_MAX_SIZE_OPTION).unwrap_or(20).max(0) as u64;
            Ok(Output::with_log_file(
               level,
               &path,
               max_megabytes,
               RotatingFileSink::DEFAULT_MAX_KEEP,
            )?)
         }
         None => Ok(Output::console(level)),
      }
   }

   fn lock_options(&self) -> std::sync::RwLockWriteGuard<'_, IndexMap<String, OptionDecl>> {
      self.options.write().unwrap_or_else(|e| e.into_inner())
   }

   fn lock_store_read(&self) -> std::sync::RwLockReadGuard<'_, ConfigStore> {
      self.store.read().unwrap_or_else(|e| e.into_inner())
   }
}
