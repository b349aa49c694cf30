//! `test`, `[ ... ]` and `[[ ... ]]` conditions.

use log::debug;
use regex::Regex;

use super::expand::pattern_matches;

/// One expanded argument. `operator` marks `&&`, `||`, `(`, `)`, `<`, `>`
/// coming from the `[[` token stream rather than from a word.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Arg {
    pub text: String,
    pub operator: bool,
}

impl Arg {
    pub fn word(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            operator: false,
        }
    }

    pub fn operator(text: &str) -> Self {
        Self {
            text: text.to_string(),
            operator: true,
        }
    }
}

/// Evaluate a condition; `None` is a syntax error (exit status 2).
pub(crate) fn evaluate(args: &[Arg], extended: bool) -> Option<bool> {
    if args.is_empty() {
        return Some(false);
    }
    let mut cond = Cond {
        args,
        pos: 0,
        extended,
    };
    let value = cond.or()?;
    if cond.pos == args.len() {
        Some(value)
    } else {
        None
    }
}

struct Cond<'a> {
    args: &'a [Arg],
    pos: usize,
    extended: bool,
}

const UNARY_FILE_TESTS: &[&str] = &[
    "-a", "-b", "-c", "-d", "-e", "-f", "-g", "-h", "-k", "-p", "-r", "-s", "-u", "-w", "-x",
    "-G", "-L", "-N", "-O", "-S",
];

impl<'a> Cond<'a> {
    fn at(&self, offset: usize) -> Option<&'a Arg> {
        self.args.get(self.pos + offset)
    }

    fn remaining(&self) -> usize {
        self.args.len() - self.pos
    }

    fn is_connective(&self, arg: &Arg, extended_op: &str, posix_op: &str) -> bool {
        if self.extended {
            arg.operator && arg.text == extended_op
        } else {
            !arg.operator && arg.text == posix_op
        }
    }

    fn or(&mut self) -> Option<bool> {
        let mut value = self.and()?;
        while self.at(0).is_some_and(|a| self.is_connective(a, "||", "-o")) {
            self.pos += 1;
            let rhs = self.and()?;
            value = value || rhs;
        }
        Some(value)
    }

    fn and(&mut self) -> Option<bool> {
        let mut value = self.not()?;
        while self.at(0).is_some_and(|a| self.is_connective(a, "&&", "-a")) {
            self.pos += 1;
            let rhs = self.not()?;
            value = value && rhs;
        }
        Some(value)
    }

    fn not(&mut self) -> Option<bool> {
        if self.remaining() > 1 && self.at(0).is_some_and(|a| a.text == "!" && !a.operator) {
            self.pos += 1;
            return self.not().map(|v| !v);
        }
        self.primary()
    }

    fn primary(&mut self) -> Option<bool> {
        let first = self.at(0)?;
        if first.text == "(" && (first.operator || !self.extended) && self.remaining() > 1 {
            self.pos += 1;
            let value = self.or()?;
            let close = self.at(0)?;
            if close.text != ")" {
                return None;
            }
            self.pos += 1;
            return Some(value);
        }

        if self.remaining() >= 3 {
            if let (Some(op), Some(rhs)) = (self.at(1), self.at(2)) {
                if let Some(value) = self.binary(&first.text, op, &rhs.text) {
                    self.pos += 3;
                    return value;
                }
            }
        }

        if self.remaining() >= 2 && !first.operator {
            if let Some(operand) = self.at(1) {
                if let Some(value) = unary(&first.text, &operand.text) {
                    self.pos += 2;
                    return Some(value);
                }
            }
        }

        if first.operator {
            return None;
        }
        self.pos += 1;
        Some(!first.text.is_empty())
    }

    /// `Some(result)` when `op` is a binary operator, `None` otherwise.
    fn binary(&self, lhs: &str, op: &Arg, rhs: &str) -> Option<Option<bool>> {
        let result = match op.text.as_str() {
            "=" | "==" if self.extended => Some(pattern_matches(rhs, lhs)),
            "!=" if self.extended => Some(!pattern_matches(rhs, lhs)),
            "=" | "==" => Some(lhs == rhs),
            "!=" => Some(lhs != rhs),
            "=~" if self.extended => Regex::new(rhs).ok().map(|re| re.is_match(lhs)),
            "<" if op.operator => Some(lhs < rhs),
            ">" if op.operator => Some(lhs > rhs),
            "-eq" | "-ne" | "-lt" | "-le" | "-gt" | "-ge" => {
                let (Ok(l), Ok(r)) = (lhs.trim().parse::<i64>(), rhs.trim().parse::<i64>()) else {
                    return Some(None);
                };
                Some(match op.text.as_str() {
                    "-eq" => l == r,
                    "-ne" => l != r,
                    "-lt" => l < r,
                    "-le" => l <= r,
                    "-gt" => l > r,
                    _ => l >= r,
                })
            }
            _ => return None,
        };
        Some(result)
    }
}

fn unary(op: &str, operand: &str) -> Option<bool> {
    match op {
        "-n" => Some(!operand.is_empty()),
        "-z" => Some(operand.is_empty()),
        op if UNARY_FILE_TESTS.contains(&op) => {
            debug!("recipe: file test `{} {}` evaluates to false", op, operand);
            Some(false)
        }
        _ => None,
    }
}
