//! # Recipe Evaluation
//!
//! Package recipes (PKGBUILDs) are shell scripts. Patch lists live in their
//! `source` array, often assembled conditionally from knobs such as
//! `_cpusched` or `_use_llvm_lto`. This module evaluates the subset of shell
//! those recipes use to compute variables, without ever spawning a shell.
//!
//! ## Supported
//!
//! - Scalar and array assignment, including `+=` and multi-line arrays
//! - Single, double and `$'...'` quoting, backslash escapes, continuations
//! - `$v`, `${v}`, `${v:-d}`, `${v:=d}`, `${v:+a}`, `${v:?m}`, `${#v}`,
//!   `${a[@]}`, `${a[*]}`, `${a[N]}`, prefix/suffix removal, substitution,
//!   case conversion and substrings
//! - `if`/`elif`/`else`, `case` with glob patterns and all three arm
//!   terminators (`;;`, `;&`, `;;&`), `for` loops, `&&`/`||`, `!`, groups
//!   and subshells
//! - `test`, `[ ... ]` and `[[ ... ]]` string, integer and regex tests
//! - Function definitions; a function body runs only when the recipe calls it
//!
//! Everything else (external commands, command substitution, arithmetic,
//! `while` loops) is ignored and logged at debug level. Syntax errors are
//! [`Error::Manifest`] with the offending line.
//!
//! ## Overrides
//!
//! Callers may seed variables before evaluation. Only names on an allow-list
//! are accepted (see [`DEFAULT_ALLOWED_OVERRIDES`]). Overrides behave like
//! environment variables: `${v:=default}` keeps them, a plain `v=...` in the
//! recipe replaces them.

mod cond;
mod expand;
mod lexer;
mod parser;
mod shell;

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use crate::error::{Error, Result};

/// Recipe variables that may be overridden without extending the allow-list.
pub const DEFAULT_ALLOWED_OVERRIDES: &[&str] = &[
    "_use_llvm_lto",
    "_cpusched",
    "_build_nvidia_open",
    "_build_zfs",
    "_cc_harder",
    "_per_gov",
    "_tcp_bbr3",
    "_HZ_ticks",
    "_tickrate",
    "_preempt",
    "_hugepage",
    "_processor_opt",
    "_use_auto_optimization",
    "_use_kcfi",
    "_build_debug",
    "_localmodcfg",
    "_kernel_suffix",
];

/// A shell variable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Scalar(String),
    Array(Vec<String>),
}

impl Value {
    /// The scalar view: an array yields its first element.
    pub fn scalar(&self) -> Option<&str> {
        match self {
            Value::Scalar(s) => Some(s),
            Value::Array(items) => items.first().map(String::as_str),
        }
    }

    /// The array view: a scalar yields a single element.
    pub fn elements(&self) -> Vec<String> {
        match self {
            Value::Scalar(s) => vec![s.clone()],
            Value::Array(items) => items.clone(),
        }
    }
}

pub(crate) type Vars = HashMap<String, Value>;

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Validated variables to seed before a recipe is evaluated.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Overrides {
    values: BTreeMap<String, String>,
}

impl Overrides {
    /// Accepts `values` if every name is on the default allow-list or in
    /// `extra_allowed`.
    pub fn new(extra_allowed: &[String], values: &BTreeMap<String, String>) -> Result<Self> {
        if let Some(bad) = extra_allowed.iter().find(|n| !is_identifier(n)) {
            return Err(Error::config(format!(
                "allowed_variables entry {:?} is not a shell variable name",
                bad
            )));
        }
        for name in values.keys() {
            let allowed = DEFAULT_ALLOWED_OVERRIDES.contains(&name.as_str())
                || extra_allowed.iter().any(|n| n == name);
            if !allowed {
                return Err(Error::Configuration {
                    message: format!("recipe variable {} may not be overridden", name),
                    hint: Some(format!(
                        "add it to must_apply.allowed_variables; built-in names are: {}",
                        DEFAULT_ALLOWED_OVERRIDES.join(", ")
                    )),
                });
            }
        }
        Ok(Self {
            values: values.clone(),
        })
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// The variable state a recipe leaves behind.
#[derive(Debug, Clone)]
pub struct Recipe {
    vars: Vars,
}

impl Recipe {
    /// Evaluate recipe text.
    pub fn evaluate(source: &str, overrides: &Overrides) -> Result<Self> {
        let tokens = lexer::tokenize(source)?;
        let list = parser::parse(tokens)?;
        let vars = overrides
            .values
            .iter()
            .map(|(k, v)| (k.clone(), Value::Scalar(v.clone())))
            .collect();
        let mut shell = shell::Shell::new(vars);
        shell.run(&list)?;
        Ok(Self {
            vars: shell.into_vars(),
        })
    }

    /// Read and evaluate a recipe file.
    pub fn load(path: &Path, overrides: &Overrides) -> Result<Self> {
        if !path.is_file() {
            return Err(Error::MissingFile {
                what: "recipe".to_string(),
                path: path.to_path_buf(),
            });
        }
        let source = std::fs::read_to_string(path)?;
        Self::evaluate(&source, overrides)
    }

    pub fn scalar(&self, name: &str) -> Option<&str> {
        self.vars.get(name).and_then(Value::scalar)
    }

    /// Elements of an array variable; empty when unset.
    pub fn array(&self, name: &str) -> Vec<String> {
        self.vars.get(name).map(Value::elements).unwrap_or_default()
    }

    /// The recipe's `source` array.
    pub fn sources(&self) -> Vec<String> {
        self.array("source")
    }
}


#[cfg(test)]
mod tests {
    use super::testing::KERNEL_RECIPE;
    use super::*;

    fn overrides(pairs: &[(&str, &str)]) -> Overrides {
        let values = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Overrides::new(&[], &values).unwrap()
    }

    const BASE: &str = "https://raw.githubusercontent.com/cachyos/kernel-patches/master/6.19";

    #[test]
    fn test_defaults_without_overrides() {
        let recipe = Recipe::evaluate(KERNEL_RECIPE, &Overrides::default()).unwrap();
        assert_eq!(recipe.scalar("pkgver"), Some("6.19.0.rc5"));
        assert_eq!(
            recipe.sources(),
            vec![
                "https://github.com/torvalds/linux/archive/refs/tags/v6.19-rc5.tar.gz".to_string(),
                "config".to_string(),
                format!("{}/all/0001-cachyos-base-all.patch", BASE),
                format!("{}/sched/0001-bore-cachy.patch", BASE),
            ]
        );
    }

    #[test]
    fn test_overrides_select_branches() {
        let recipe = Recipe::evaluate(
            KERNEL_RECIPE,
            &overrides(&[("_use_llvm_lto", "thin"), ("_cpusched", "hardened"), ("_build_zfs", "yes")]),
        )
        .unwrap();
        let sources = recipe.sources();
        assert_eq!(sources[2], format!("{}/misc/dkms-clang.patch", BASE));
        assert_eq!(sources[3], format!("{}/all/0001-cachyos-base-all.patch", BASE));
        assert_eq!(sources[4], format!("{}/sched/0001-bore-cachy.patch", BASE));
        assert_eq!(sources[5], format!("{}/misc/0001-hardened.patch", BASE));
        assert_eq!(sources[6], "git+https://github.com/cachyos/zfs.git#commit=abc");
        assert_eq!(sources.len(), 7);
    }

    #[test]
    fn test_scheduler_arms_accumulate() {
        let sources = |sched: &str| {
            Recipe::evaluate(KERNEL_RECIPE, &overrides(&[("_cpusched", sched)]))
                .unwrap()
                .sources()
                .split_off(3)
        };
        assert_eq!(
            sources("rt-bore"),
            vec![
                format!("{}/sched/0001-bore-cachy.patch", BASE),
                format!("{}/misc/0001-rt-i915.patch", BASE),
            ]
        );
        assert_eq!(sources("rt"), vec![format!("{}/misc/0001-rt-i915.patch", BASE)]);
        assert_eq!(sources("bmq"), vec![format!("{}/sched/0001-prjc-cachy.patch", BASE)]);
        assert!(sources("eevdf").is_empty());
    }

    #[test]
    fn test_plain_assignment_replaces_override() {
        let recipe = Recipe::evaluate(
            "_cpusched=eevdf\n: \"${_use_llvm_lto:=none}\"",
            &overrides(&[("_cpusched", "bore"), ("_use_llvm_lto", "thin")]),
        )
        .unwrap();
        assert_eq!(recipe.scalar("_cpusched"), Some("eevdf"));
        assert_eq!(recipe.scalar("_use_llvm_lto"), Some("thin"));
    }

    #[test]
    fn test_function_bodies_are_not_run() {
        let recipe = Recipe::evaluate(KERNEL_RECIPE, &Overrides::default()).unwrap();
        assert_eq!(recipe.scalar("src"), None);
    }

    #[test]
    fn test_disallowed_override_is_rejected() {
        let values = BTreeMap::from([("PATH".to_string(), "/tmp".to_string())]);
        let err = Overrides::new(&[], &values).unwrap_err();
        assert!(matches!(err, Error::Configuration { .. }));
        assert!(err.to_string().contains("PATH"));

        let extended = Overrides::new(&["PATH".to_string()], &values).unwrap();
        assert_eq!(extended.get("PATH"), Some("/tmp"));
    }

    #[test]
    fn test_invalid_allow_list_entry_is_rejected() {
        let err = Overrides::new(&["not a name".to_string()], &BTreeMap::new()).unwrap_err();
        assert!(err.to_string().contains("not a shell variable name"));
    }

    #[test]
    fn test_syntax_error_carries_line() {
        let err = Recipe::evaluate("a=1\nif [ x ]; then\n", &Overrides::default()).unwrap_err();
        assert!(matches!(err, Error::Manifest { line: 2, .. }));
    }

    #[test]
    fn test_load_missing_file() {
        let temp = tempfile::TempDir::new().unwrap();
        let err = Recipe::load(&temp.path().join("PKGBUILD"), &Overrides::default()).unwrap_err();
        assert!(matches!(err, Error::MissingFile { .. }));
    }

    #[test]
    fn test_unset_array_is_empty() {
        let recipe = Recipe::evaluate("a=1", &Overrides::default()).unwrap();
        assert!(recipe.array("source").is_empty());
        assert_eq!(recipe.array("a"), vec!["1".to_string()]);
    }
}
