//! Tree-walking interpreter for parsed recipes.
//!
//! Only variable state is modelled. Nothing is executed: commands other than
//! the handful of builtins below are skipped with a debug log and report exit
//! status 1.

use std::collections::HashMap;
use std::rc::Rc;

use log::debug;

use super::cond::{self, Arg};
use super::expand::{pattern_matches, Expander};
use super::parser::{AndOr, CaseEnd, Command, Item, List, Pipeline, TestArg};
use super::{Value, Vars};
use crate::error::{Error, Result};

/// Deepest allowed chain of recipe function calls.
const MAX_CALL_DEPTH: usize = 64;

const DECLARATION_BUILTINS: &[&str] = &["export", "declare", "local", "readonly", "typeset"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Next,
    Return,
    Exit,
}

pub(crate) struct Shell {
    vars: Vars,
    functions: HashMap<String, Rc<Command>>,
    status: i32,
    depth: usize,
}

/// Splits `name=value` / `name+=value` into its parts.
pub(crate) fn split_assignment(raw: &str) -> Option<(&str, bool, &str)> {
    let end = raw
        .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
        .unwrap_or(raw.len());
    let name = &raw[..end];
    if name.is_empty() || name.starts_with(|c: char| c.is_ascii_digit()) {
        return None;
    }
    let rest = &raw[end..];
    if let Some(value) = rest.strip_prefix("+=") {
        Some((name, true, value))
    } else {
        rest.strip_prefix('=').map(|value| (name, false, value))
    }
}

fn is_assignment(item: &Item) -> bool {
    match item {
        Item::Array { .. } => true,
        Item::Word(raw) => split_assignment(raw).is_some(),
    }
}

impl Shell {
    pub fn new(vars: Vars) -> Self {
        Self {
            vars,
            functions: HashMap::new(),
            status: 0,
            depth: 0,
        }
    }

    pub fn into_vars(self) -> Vars {
        self.vars
    }

    /// Run a whole recipe. A top-level `return` or `exit` ends evaluation,
    /// as it would for a sourced file.
    pub fn run(&mut self, list: &List) -> Result<()> {
        self.list(list)?;
        Ok(())
    }

    fn expander(&mut self, line: usize) -> Expander<'_> {
        Expander {
            vars: &mut self.vars,
            status: self.status,
            line,
        }
    }

    fn case_matches(&mut self, line: usize, patterns: &[String], subject: &str) -> Result<bool> {
        for pattern in patterns {
            let pattern = self.expander(line).string(pattern)?;
            if pattern_matches(&pattern, subject) {
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn list(&mut self, list: &List) -> Result<Flow> {
        for and_or in list {
            let flow = self.and_or(and_or)?;
            if flow != Flow::Next {
                return Ok(flow);
            }
        }
        Ok(Flow::Next)
    }

    fn and_or(&mut self, and_or: &AndOr) -> Result<Flow> {
        let flow = self.pipeline(&and_or.first)?;
        if flow != Flow::Next {
            return Ok(flow);
        }
        for (is_and, pipeline) in &and_or.rest {
            if *is_and != (self.status == 0) {
                continue;
            }
            let flow = self.pipeline(pipeline)?;
            if flow != Flow::Next {
                return Ok(flow);
            }
        }
        Ok(Flow::Next)
    }

    fn pipeline(&mut self, pipeline: &Pipeline) -> Result<Flow> {
        for command in &pipeline.commands {
            let flow = self.command(command)?;
            if flow != Flow::Next {
                return Ok(flow);
            }
        }
        if pipeline.negated {
            self.status = if self.status == 0 { 1 } else { 0 };
        }
        Ok(Flow::Next)
    }

    fn command(&mut self, command: &Command) -> Result<Flow> {
        match command {
            Command::Simple { line, items } => self.simple(*line, items),
            Command::Test { line, args } => {
                let mut expanded = Vec::with_capacity(args.len());
                for arg in args {
                    expanded.push(match arg {
                        TestArg::Op(op) => Arg::operator(op),
                        TestArg::Word(raw) => Arg::word(self.expander(*line).string(raw)?),
                    });
                }
                self.status = condition_status(cond::evaluate(&expanded, true));
                Ok(Flow::Next)
            }
            Command::If {
                branches,
                otherwise,
            } => {
                for (condition, body) in branches {
                    let flow = self.list(condition)?;
                    if flow != Flow::Next {
                        return Ok(flow);
                    }
                    if self.status == 0 {
                        return self.list(body);
                    }
                }
                match otherwise {
                    Some(body) => self.list(body),
                    None => {
                        self.status = 0;
                        Ok(Flow::Next)
                    }
                }
            }
            Command::Case { line, word, arms } => {
                let subject = self.expander(*line).string(word)?;
                self.status = 0;
                let mut fall_through = false;
                for arm in arms {
                    if !fall_through && !self.case_matches(*line, &arm.patterns, &subject)? {
                        continue;
                    }
                    let flow = self.list(&arm.body)?;
                    if flow != Flow::Next {
                        return Ok(flow);
                    }
                    match arm.end {
                        CaseEnd::Break => break,
                        CaseEnd::FallThrough => fall_through = true,
                        CaseEnd::Continue => fall_through = false,
                    }
                }
                Ok(Flow::Next)
            }
            Command::For {
                line,
                var,
                words,
                body,
            } => {
                let mut values = Vec::new();
                for raw in words.iter().flatten() {
                    values.extend(self.expander(*line).fields(raw)?);
                }
                self.status = 0;
                for value in values {
                    self.vars.insert(var.clone(), Value::Scalar(value));
                    let flow = self.list(body)?;
                    if flow != Flow::Next {
                        return Ok(flow);
                    }
                }
                Ok(Flow::Next)
            }
            Command::Loop { line, keyword } => {
                debug!("recipe line {}: `{}` loop not evaluated", line, keyword);
                self.status = 0;
                Ok(Flow::Next)
            }
            Command::Group(list) => self.list(list),
            Command::Subshell(list) => {
                let vars = self.vars.clone();
                let functions = self.functions.clone();
                let flow = self.list(list);
                self.vars = vars;
                self.functions = functions;
                flow.map(|_| Flow::Next)
            }
            Command::Function { name, body } => {
                self.functions.insert(name.clone(), Rc::clone(body));
                self.status = 0;
                Ok(Flow::Next)
            }
        }
    }

    fn simple(&mut self, line: usize, items: &[Item]) -> Result<Flow> {
        let split = items
            .iter()
            .position(|item| !is_assignment(item))
            .unwrap_or(items.len());
        let (assignments, rest) = items.split_at(split);

        if rest.is_empty() {
            for item in assignments {
                self.assign(line, item)?;
            }
            self.status = 0;
            return Ok(Flow::Next);
        }

        if let Item::Word(first) = &rest[0] {
            if DECLARATION_BUILTINS.contains(&first.as_str()) {
                for item in rest[1..].iter().filter(|item| is_assignment(item)) {
                    self.assign(line, item)?;
                }
                self.status = 0;
                return Ok(Flow::Next);
            }
        }

        let mut argv = Vec::new();
        for item in rest {
            match item {
                Item::Word(raw) => argv.extend(self.expander(line).fields(raw)?),
                Item::Array { name, .. } => {
                    debug!("recipe line {}: ignoring array argument `{}=(...)`", line, name);
                }
            }
        }
        let Some(name) = argv.first().cloned() else {
            self.status = 0;
            return Ok(Flow::Next);
        };

        match name.as_str() {
            ":" | "true" => self.status = 0,
            "false" => self.status = 1,
            "[" | "test" => {
                let mut args: Vec<Arg> = argv[1..].iter().map(|a| Arg::word(a.as_str())).collect();
                let closed = name != "[" || args.last().is_some_and(|a| a.text == "]");
                if closed {
                    if name == "[" {
                        args.pop();
                    }
                    self.status = condition_status(cond::evaluate(&args, false));
                } else {
                    debug!("recipe line {}: missing `]`", line);
                    self.status = 2;
                }
            }
            "unset" => {
                let functions_only = argv[1..].iter().any(|a| a == "-f");
                for target in argv[1..].iter().filter(|a| !a.starts_with('-')) {
                    if functions_only {
                        self.functions.remove(target);
                    } else {
                        self.vars.remove(target);
                    }
                }
                self.status = 0;
            }
            "return" | "exit" => {
                if let Some(code) = argv.get(1).and_then(|c| c.parse::<i32>().ok()) {
                    self.status = code;
                }
                return Ok(if name == "return" {
                    Flow::Return
                } else {
                    Flow::Exit
                });
            }
            _ if self.functions.contains_key(&name) => return self.call(line, &name),
            _ => {
                debug!("recipe line {}: ignoring command `{}`", line, name);
                self.status = 1;
            }
        }
        Ok(Flow::Next)
    }

    fn call(&mut self, line: usize, name: &str) -> Result<Flow> {
        if self.depth >= MAX_CALL_DEPTH {
            return Err(Error::Manifest {
                line,
                message: format!("function `{}` nested too deeply", name),
            });
        }
        let Some(body) = self.functions.get(name).cloned() else {
            return Ok(Flow::Next);
        };
        self.depth += 1;
        let flow = self.command(&body);
        self.depth -= 1;
        match flow? {
            Flow::Exit => Ok(Flow::Exit),
            _ => Ok(Flow::Next),
        }
    }

    fn assign(&mut self, line: usize, item: &Item) -> Result<()> {
        match item {
            Item::Array {
                name,
                append,
                elements,
            } => {
                let mut values = Vec::new();
                for raw in elements {
                    values.extend(self.expander(line).fields(raw)?);
                }
                let value = match (self.vars.remove(name), *append) {
                    (Some(existing), true) => {
                        let mut all = existing.elements();
                        all.extend(values);
                        all
                    }
                    _ => values,
                };
                self.vars.insert(name.clone(), Value::Array(value));
            }
            Item::Word(raw) => {
                let Some((name, append, value_raw)) = split_assignment(raw) else {
                    return Ok(());
                };
                let value = self.expander(line).string(value_raw)?;
                let updated = match (self.vars.remove(name), append) {
                    (Some(Value::Scalar(old)), true) => Value::Scalar(old + &value),
                    (Some(Value::Array(mut items)), append) => {
                        match items.first_mut() {
                            Some(first) if append => first.push_str(&value),
                            Some(first) => *first = value,
                            None => items.push(value),
                        }
                        Value::Array(items)
                    }
                    _ => Value::Scalar(value),
                };
                self.vars.insert(name.to_string(), updated);
            }
        }
        Ok(())
    }
}

fn condition_status(result: Option<bool>) -> i32 {
    match result {
        Some(true) => 0,
        Some(false) => 1,
        None => 2,
    }
}
