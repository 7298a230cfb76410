//! End-to-end framework tests: precedence resolution over real config
//! files, write-back, and the output pipeline.

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use console_app_toolkit::{AppRegistry, ConsoleApp, OptionSpec};
use layered_config::{ConfigStore, ConfigValue, SourceChain};

fn app_over(files: Vec<PathBuf>) -> ConsoleApp {
   ConsoleApp::with_store("sync_tool", ConfigStore::load(SourceChain::from_files(files), None))
}

// ============================================================================
// The canonical precedence scenario
// ============================================================================

#[test]
fn retry_count_resolves_through_the_full_chain() {
   let temp = tempfile::tempdir().unwrap();
   let main = temp.path().join("sync_tool.ini");
   fs::write(&main, "[Settings]\nretryCount = 5\n").unwrap();

   // Command line beats the config file
   let app = app_over(vec![main.clone()]);
   app.declare(OptionSpec::new("retryCount", ConfigValue::Int(3)));
   app
      .parse_args_from(["sync_tool", "--retryCount=7"])
      .unwrap();
   assert_eq!(app.get_int("retryCount").unwrap(), 7);

   // Without the flag the config file wins
   let app = app_over(vec![main.clone()]);
   app.declare(OptionSpec::new("retryCount", ConfigValue::Int(3)));
   app.parse_args_from(["sync_tool"]).unwrap();
   assert_eq!(app.get_int("retryCount").unwrap(), 5);

   // Without the config line the declared default wins
   fs::write(&main, "[Settings]\n").unwrap();
   let app = app_over(vec![main]);
   app.declare(OptionSpec::new("retryCount", ConfigValue::Int(3)));
   app.parse_args_from(["sync_tool"]).unwrap();
   assert_eq!(app.get_int("retryCount").unwrap(), 3);
}

#[test]
fn structured_option_from_config_file() {
   let temp = tempfile::tempdir().unwrap();
   let main = temp.path().join("sync_tool.ini");
   fs::write(
      &main,
      "[Settings]\nendpoints = '''{'acumen': 'srv1', 'sihot': 'srv2'}'''\n",
   )
   .unwrap();

   let app = app_over(vec![main]);
   app.declare(OptionSpec::new("endpoints", ConfigValue::Map(vec![])).no_short());
   let value = app.get_option("endpoints").unwrap();

   let ConfigValue::Map(entries) = value else {
      panic!("expected a map");
   };
   assert_eq!(entries[0].0, "acumen");
   assert_eq!(entries[0].1, ConfigValue::Str("srv1".into()));
}

#[test]
fn persist_writes_into_the_main_file() {
   let temp = tempfile::tempdir().unwrap();
   let main = temp.path().join("sync_tool.ini");
   fs::write(&main, "[Settings]\nretryCount = 3\n").unwrap();

   let app = app_over(vec![main.clone()]);
   app.declare(OptionSpec::new("retryCount", ConfigValue::Int(3)));
   app
      .persist_option("retryCount", &ConfigValue::Int(9), None, None)
      .unwrap();

   assert!(fs::read_to_string(&main).unwrap().contains("retryCount = 9"));

   // A fresh instance over the same chain resolves the persisted value
   let app = app_over(vec![main]);
   app.declare(OptionSpec::new("retryCount", ConfigValue::Int(3)));
   assert_eq!(app.get_int("retryCount").unwrap(), 9);
}

// ============================================================================
// Registry
// ============================================================================

#[test]
fn apps_are_shared_through_the_registry_by_env_id() {
   let registry = AppRegistry::new();
   let app = Arc::new(app_over(vec![]));
   app.declare(OptionSpec::new("retryCount", ConfigValue::Int(3)));

   registry.register("PROD", app.clone());
   let found = registry.get("PROD").expect("registered app");
   assert_eq!(found.get_int("retryCount").unwrap(), 3);
}

// ============================================================================
// Output wiring from reserved options
// ============================================================================

#[test]
fn log_file_option_routes_output_to_disk() {
   let temp = tempfile::tempdir().unwrap();
   let log_path = temp.path().join("run.log");

   let app = app_over(vec![]);
   app
      .parse_args_from([
         "sync_tool".to_string(),
         format!("--logFile={}", log_path.display()),
      ])
      .unwrap();

   let output = app.build_output().unwrap();
   output.error("sync failed");
   output.warn("slow response");

   let logged = fs::read_to_string(&log_path).unwrap();
   assert!(logged.contains("*** sync failed"));
   assert!(logged.contains("### slow response"));
}
