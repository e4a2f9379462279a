//! Argument-vector assembly.
//!
//! Commands are built from discrete items (switches, `--name=value` flags and
//! `KEY VALUE` config overrides) checked against a per-program [`FlagSchema`].
//! Nothing is ever joined into a shell string until it is displayed.

use crate::error::{LaunchError, LaunchResult};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt::Display;

/// Enumerated set of flags a program accepts.
#[derive(Debug)]
pub struct FlagSchema {
    pub program: &'static str,
    /// Names accepted as `--name` or `--name=value`.
    pub flags: &'static [&'static str],
    /// Keys accepted as trailing `KEY VALUE` pairs.
    pub overrides: &'static [&'static str],
}

impl FlagSchema {
    fn accepts_flag(&self, name: &str) -> bool {
        self.flags.contains(&name)
    }

    fn accepts_override(&self, key: &str) -> bool {
        self.overrides.contains(&key)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum ArgItem {
    Switch(&'static str),
    Value(&'static str, String),
    Override(&'static str, String),
}

/// Accumulates validated arguments for one program.
#[derive(Debug)]
pub struct CommandBuilder {
    schema: &'static FlagSchema,
    items: Vec<ArgItem>,
}

impl CommandBuilder {
    #[must_use]
    pub fn new(schema: &'static FlagSchema) -> Self {
        Self { schema, items: Vec::new() }
    }

    #[must_use]
    pub fn switch(mut self, name: &'static str) -> Self {
        self.items.push(ArgItem::Switch(name));
        self
    }

    #[must_use]
    pub fn switch_if(self, enabled: bool, name: &'static str) -> Self {
        if enabled { self.switch(name) } else { self }
    }

    #[must_use]
    pub fn value(mut self, name: &'static str, value: impl Display) -> Self {
        self.items.push(ArgItem::Value(name, value.to_string()));
        self
    }

    #[must_use]
    pub fn value_if(self, enabled: bool, name: &'static str, value: impl Display) -> Self {
        if enabled { self.value(name, value) } else { self }
    }

    #[must_use]
    pub fn value_opt<T: Display>(self, name: &'static str, value: Option<T>) -> Self {
        match value {
            Some(value) => self.value(name, value),
            None => self,
        }
    }

    #[must_use]
    pub fn config_override(mut self, key: &'static str, value: impl Display) -> Self {
        self.items.push(ArgItem::Override(key, value.to_string()));
        self
    }

    /// Validate every item against the schema and flatten into argv form.
    pub fn build(self) -> LaunchResult<Vec<String>> {
        let mut seen = HashSet::new();
        let mut flags = Vec::new();
        let mut overrides = Vec::new();

        for item in self.items {
            let (name, is_override) = match &item {
                ArgItem::Switch(name) | ArgItem::Value(name, _) => (*name, false),
                ArgItem::Override(key, _) => (*key, true),
            };
            let known = if is_override {
                self.schema.accepts_override(name)
            } else {
                self.schema.accepts_flag(name)
            };
            if !known {
                return Err(LaunchError::InvalidCommand(format!(
                    "{} does not accept {}",
                    self.schema.program, name
                )));
            }
            if !seen.insert(name) {
                return Err(LaunchError::InvalidCommand(format!(
                    "{} given twice for {}",
                    name, self.schema.program
                )));
            }
            match item {
                ArgItem::Switch(name) => flags.push(format!("--{name}")),
                ArgItem::Value(name, value) => flags.push(format!("--{name}={value}")),
                ArgItem::Override(key, value) => {
                    overrides.push(key.to_string());
                    overrides.push(value);
                }
            }
        }

        flags.extend(overrides);
        Ok(flags)
    }
}

/// A fully assembled child process invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LaunchCommand {
    pub program: String,
    pub args: Vec<String>,
    /// Variables set in the child environment.
    pub env: Vec<(String, String)>,
    /// Variables removed from the child environment.
    pub env_remove: Vec<String>,
}

impl LaunchCommand {
    #[must_use]
    pub fn new(program: impl Into<String>) -> Self {
        Self { program: program.into(), ..Self::default() }
    }

    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    #[must_use]
    pub fn env<I>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = (String, String)>,
    {
        self.env.extend(vars);
        self
    }

    #[must_use]
    pub fn env_remove(mut self, key: impl Into<String>) -> Self {
        self.env_remove.push(key.into());
        self
    }

    /// Number of arguments equal to `--name` or starting with `--name=`.
    #[must_use]
    pub fn count_flag(&self, name: &str) -> usize {
        let bare = format!("--{name}");
        let valued = format!("--{name}=");
        self.args.iter().filter(|a| **a == bare || a.starts_with(&valued)).count()
    }

    #[must_use]
    pub fn has_flag(&self, name: &str) -> bool {
        self.count_flag(name) > 0
    }

    /// Value of the first `--name=value` argument.
    #[must_use]
    pub fn flag_value(&self, name: &str) -> Option<&str> {
        let prefix = format!("--{name}=");
        self.args.iter().find_map(|a| a.strip_prefix(prefix.as_str()))
    }

    /// Value following a `KEY VALUE` override pair.
    #[must_use]
    pub fn override_value(&self, key: &str) -> Option<&str> {
        self.args
            .windows(2)
            .find(|pair| pair[0] == key)
            .map(|pair| pair[1].as_str())
    }
}

fn quote(arg: &str) -> String {
    let plain = !arg.is_empty()
        && arg.chars().all(|c| c.is_ascii_alphanumeric() || "-_=./:,+@%".contains(c));
    if plain { arg.to_string() } else { format!("'{}'", arg.replace('\'', r"'\''")) }
}

impl std::fmt::Display for LaunchCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&quote(&self.program))?;
        for arg in &self.args {
            write!(f, " {}", quote(arg))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    static SCHEMA: FlagSchema = FlagSchema {
        program: "train.py",
        flags: &["fp16", "seed", "do_train"],
        overrides: &["SOLVER.BASE_LR"],
    };

    #[test]
    fn test_builder_orders_flags_before_overrides() {
        let args = CommandBuilder::new(&SCHEMA)
            .config_override("SOLVER.BASE_LR", 0.12)
            .value("seed", 7)
            .switch_if(true, "fp16")
            .switch_if(false, "do_train")
            .build()
            .unwrap();
        assert_eq!(args, vec!["--seed=7", "--fp16", "SOLVER.BASE_LR", "0.12"]);
    }

    #[test]
    fn test_builder_rejects_unknown_flag() {
        let err = CommandBuilder::new(&SCHEMA).switch("fp32").build().unwrap_err();
        assert!(matches!(err, LaunchError::InvalidCommand(_)));
    }

    #[test]
    fn test_builder_rejects_duplicates() {
        let err = CommandBuilder::new(&SCHEMA).switch("fp16").switch("fp16").build().unwrap_err();
        assert!(err.to_string().contains("twice"));
    }

    #[test]
    fn test_command_queries() {
        let cmd = LaunchCommand::new("python3").args(["--seed=1", "--fp16", "DTYPE", "float16"]);
        assert!(cmd.has_flag("fp16"));
        assert_eq!(cmd.count_flag("seed"), 1);
        assert_eq!(cmd.flag_value("seed"), Some("1"));
        assert_eq!(cmd.override_value("DTYPE"), Some("float16"));
        assert!(!cmd.has_flag("fp1"));
    }

    #[test]
    fn test_display_quotes_spaces() {
        let cmd = LaunchCommand::new("python3").args(["SOLVER.STEPS", "(30000, 40000)"]);
        assert_eq!(cmd.to_string(), "python3 SOLVER.STEPS '(30000, 40000)'");
    }
}
