//! Dynamic clap command construction for declared options.
//!
//! Every declared option produces a `--name=VALUE` long flag and, unless
//! suppressed or already taken, a single-letter short flag derived from the
//! option name. Parse failures go through clap's usage/error path, which
//! prints the usage message and terminates with a non-zero status in the
//! process entry point.

use std::collections::{HashMap, HashSet};
use std::ffi::OsString;

use clap::{Arg, ArgAction, Command};
use indexmap::IndexMap;

use crate::app::OptionDecl;

/// Build the clap command for the currently declared options.
pub(crate) fn build_command(app_name: &str, decls: &IndexMap<String, OptionDecl>) -> Command {
   let mut cmd = Command::new(app_name.to_string());
   // 'h' is taken by --help
   let mut used_shorts: HashSet<char> = HashSet::from(['h']);

   for (name, decl) in decls {
      let action = if decl.spec.multiple {
         ArgAction::Append
      } else {
         ArgAction::Set
      };
      let mut arg = Arg::new(name.clone())
         .long(name.clone())
         .value_name("VALUE")
         .action(action)
         .help(decl.spec.help.clone());

      let short = decl
         .spec
         .short
         .or_else(|| (!decl.spec.no_short).then(|| name.chars().next()).flatten());
      if let Some(c) = short
         && !used_shorts.contains(&c)
      {
         used_shorts.insert(c);
         arg = arg.short(c);
      }

      cmd = cmd.arg(arg);
   }

   cmd
}

/// Parse `argv` (including the binary name) into raw per-option occurrence
/// lists. Structural failures (unknown flag, repeated non-multiple option)
/// surface as clap errors.
pub(crate) fn parse_occurrences<I, T>(
   cmd: &mut Command,
   argv: I,
) -> Result<HashMap<String, Vec<String>>, clap::Error>
where
   I: IntoIterator<Item = T>,
   T: Into<OsString> + Clone,
{
   let matches = cmd.try_get_matches_from_mut(argv)?;
   let mut occurrences = HashMap::new();
   for id in matches.ids() {
      let name = id.as_str().to_string();
      if let Some(values) = matches.get_many::<String>(&name) {
         occurrences.insert(name, values.cloned().collect());
      }
   }
   Ok(occurrences)
}
