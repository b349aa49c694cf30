//! Quote removal, parameter expansion and field splitting.
//!
//! Command substitution and arithmetic are never executed; they expand to the
//! empty string and are logged at debug level. There is no pathname
//! expansion: `*` in a word stays literal.

use glob::Pattern;
use log::debug;

use super::{Value, Vars};
use crate::error::{Error, Result};

/// The result of expanding one parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Expanded {
    Str(String),
    /// `${a[@]}` keeps elements apart, `${a[*]}` joins them when quoted.
    List { items: Vec<String>, star: bool },
}

impl Expanded {
    fn is_null(&self) -> bool {
        match self {
            Expanded::Str(s) => s.is_empty(),
            Expanded::List { items, .. } => items.is_empty(),
        }
    }

    fn map(self, f: impl Fn(&str) -> String) -> Expanded {
        match self {
            Expanded::Str(s) => Expanded::Str(f(&s)),
            Expanded::List { items, star } => Expanded::List {
                items: items.iter().map(|s| f(s)).collect(),
                star,
            },
        }
    }
}

/// Accumulates fields while a word is expanded.
struct Fields {
    fields: Vec<String>,
    current: String,
    has_current: bool,
    split: bool,
}

impl Fields {
    fn new(split: bool) -> Self {
        Self {
            fields: Vec::new(),
            current: String::new(),
            has_current: false,
            split,
        }
    }

    fn literal(&mut self, s: &str) {
        self.current.push_str(s);
        self.has_current = true;
    }

    fn break_field(&mut self) {
        if self.has_current {
            self.fields.push(std::mem::take(&mut self.current));
            self.has_current = false;
        }
    }

    /// Unquoted expansion result: subject to field splitting.
    fn unquoted(&mut self, s: &str) {
        if !self.split {
            self.current.push_str(s);
            if !s.is_empty() {
                self.has_current = true;
            }
            return;
        }
        let parts: Vec<&str> = s.split_whitespace().collect();
        if parts.is_empty() {
            if !s.is_empty() {
                self.break_field();
            }
            return;
        }
        if s.starts_with(char::is_whitespace) {
            self.break_field();
        }
        for (i, part) in parts.iter().enumerate() {
            if i > 0 {
                self.break_field();
            }
            self.literal(part);
        }
        if s.ends_with(char::is_whitespace) {
            self.break_field();
        }
    }

    fn quoted_list(&mut self, items: &[String]) {
        for (i, item) in items.iter().enumerate() {
            if i > 0 {
                self.break_field();
            }
            self.literal(item);
        }
    }

    fn unquoted_list(&mut self, items: &[String]) {
        for (i, item) in items.iter().enumerate() {
            if i > 0 {
                self.break_field();
            }
            self.unquoted(item);
        }
    }

    fn finish(mut self) -> Vec<String> {
        self.break_field();
        self.fields
    }
}

/// Expands words against a variable table. `${v:=d}` assigns into it.
pub(crate) struct Expander<'a> {
    pub vars: &'a mut Vars,
    pub status: i32,
    pub line: usize,
}

impl<'a> Expander<'a> {
    /// Expand with field splitting; a word may yield zero or many fields.
    pub fn fields(&mut self, raw: &str) -> Result<Vec<String>> {
        let mut out = Fields::new(true);
        self.expand_into(raw, &mut out)?;
        Ok(out.finish())
    }

    /// Expand to exactly one string, as on the right of an assignment.
    pub fn string(&mut self, raw: &str) -> Result<String> {
        let mut out = Fields::new(false);
        self.expand_into(raw, &mut out)?;
        Ok(out.finish().join(" "))
    }

    fn error(&self, message: impl Into<String>) -> Error {
        Error::Manifest {
            line: self.line,
            message: message.into(),
        }
    }

    fn expand_into(&mut self, raw: &str, out: &mut Fields) -> Result<()> {
        let chars: Vec<char> = raw.chars().collect();
        let mut i = 0;
        while i < chars.len() {
            match chars[i] {
                '\'' => {
                    let end = find_char(&chars, i + 1, '\'')
                        .ok_or_else(|| self.error("unterminated single quote"))?;
                    out.literal(&collect(&chars[i + 1..end]));
                    i = end + 1;
                }
                '"' => i = self.double_quoted(&chars, i + 1, out)?,
                '\\' => {
                    match chars.get(i + 1) {
                        Some(c) => out.literal(&c.to_string()),
                        None => out.literal("\\"),
                    }
                    i += 2;
                }
                '$' => i = self.dollar(&chars, i, out, false)?,
                '`' => {
                    let end = find_char(&chars, i + 1, '`')
                        .ok_or_else(|| self.error("unterminated backquote"))?;
                    debug!("recipe line {}: command substitution not evaluated", self.line);
                    out.unquoted("");
                    i = end + 1;
                }
                c => {
                    out.literal(&c.to_string());
                    i += 1;
                }
            }
        }
        Ok(())
    }

    fn double_quoted(&mut self, chars: &[char], mut i: usize, out: &mut Fields) -> Result<usize> {
        out.literal("");
        while i < chars.len() {
            match chars[i] {
                '"' => return Ok(i + 1),
                '\\' => {
                    match chars.get(i + 1) {
                        Some(c @ ('$' | '`' | '"' | '\\')) => out.literal(&c.to_string()),
                        Some('\n') => {}
                        Some(c) => {
                            out.literal("\\");
                            out.literal(&c.to_string());
                        }
                        None => out.literal("\\"),
                    }
                    i += 2;
                }
                '$' => i = self.dollar(chars, i, out, true)?,
                '`' => {
                    let end = find_char(chars, i + 1, '`')
                        .ok_or_else(|| self.error("unterminated backquote"))?;
                    debug!("recipe line {}: command substitution not evaluated", self.line);
                    i = end + 1;
                }
                c => {
                    out.literal(&c.to_string());
                    i += 1;
                }
            }
        }
        Err(self.error("unterminated double quote"))
    }

    /// Expand the `$...` starting at `chars[i]`; returns the index after it.
    fn dollar(&mut self, chars: &[char], i: usize, out: &mut Fields, quoted: bool) -> Result<usize> {
        let Some(&next) = chars.get(i + 1) else {
            out.literal("$");
            return Ok(i + 1);
        };
        match next {
            '{' => {
                let end = find_closing(chars, i + 1, '{', '}')
                    .ok_or_else(|| self.error("unterminated `${`"))?;
                let value = self.brace(&collect(&chars[i + 2..end]))?;
                self.emit(value, out, quoted);
                Ok(end + 1)
            }
            '(' => {
                let end = find_closing(chars, i + 1, '(', ')')
                    .ok_or_else(|| self.error("unterminated `$(`"))?;
                if chars.get(i + 2) == Some(&'(') {
                    debug!("recipe line {}: arithmetic expansion not evaluated", self.line);
                } else {
                    debug!("recipe line {}: command substitution not evaluated", self.line);
                }
                self.emit(Expanded::Str(String::new()), out, quoted);
                Ok(end + 1)
            }
            '\'' if !quoted => {
                let end = find_char(chars, i + 2, '\'')
                    .ok_or_else(|| self.error("unterminated `$'`"))?;
                out.literal(&ansi_c(&collect(&chars[i + 2..end])));
                Ok(end + 1)
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let mut end = i + 1;
                while chars
                    .get(end)
                    .is_some_and(|c| c.is_ascii_alphanumeric() || *c == '_')
                {
                    end += 1;
                }
                let name = collect(&chars[i + 1..end]);
                let value = self
                    .vars
                    .get(&name)
                    .and_then(Value::scalar)
                    .unwrap_or_default()
                    .to_string();
                self.emit(Expanded::Str(value), out, quoted);
                Ok(end)
            }
            '?' => {
                self.emit(Expanded::Str(self.status.to_string()), out, quoted);
                Ok(i + 2)
            }
            '#' => {
                self.emit(Expanded::Str("0".to_string()), out, quoted);
                Ok(i + 2)
            }
            '@' | '*' => {
                self.emit(
                    Expanded::List {
                        items: Vec::new(),
                        star: next == '*',
                    },
                    out,
                    quoted,
                );
                Ok(i + 2)
            }
            c if c.is_ascii_digit() || matches!(c, '$' | '!' | '-') => {
                self.emit(Expanded::Str(String::new()), out, quoted);
                Ok(i + 2)
            }
            _ => {
                out.literal("$");
                Ok(i + 1)
            }
        }
    }

    fn emit(&self, value: Expanded, out: &mut Fields, quoted: bool) {
        match (value, quoted) {
            (Expanded::Str(s), true) => out.literal(&s),
            (Expanded::Str(s), false) => out.unquoted(&s),
            (Expanded::List { items, star: true }, true) => out.literal(&items.join(" ")),
            (Expanded::List { items, .. }, true) => out.quoted_list(&items),
            (Expanded::List { items, .. }, false) => out.unquoted_list(&items),
        }
    }

    /// Evaluate the inside of `${...}`.
    fn brace(&mut self, content: &str) -> Result<Expanded> {
        if content.len() > 1 {
            if let Some(target) = content.strip_prefix('#') {
                return self.length(target, content);
            }
        }
        if content.starts_with('!') {
            return Err(self.error(format!("unsupported indirect expansion `${{{}}}`", content)));
        }

        let (param, rest) = split_param(content)
            .ok_or_else(|| self.error(format!("bad substitution `${{{}}}`", content)))?;
        let (name, subscript, op) = match rest.strip_prefix('[') {
            Some(after) => {
                let close = after
                    .find(']')
                    .ok_or_else(|| self.error(format!("bad substitution `${{{}}}`", content)))?;
                (param, Some(&after[..close]), &after[close + 1..])
            }
            None => (param, None, rest),
        };

        let base = self.lookup(name, subscript)?;
        self.apply_operator(name, subscript, base, op, content)
    }

    fn length(&mut self, target: &str, content: &str) -> Result<Expanded> {
        let (name, rest) = split_param(target)
            .ok_or_else(|| self.error(format!("bad substitution `${{{}}}`", content)))?;
        let len = match rest {
            "" => self
                .lookup(name, None)?
                .map(|v| match v {
                    Expanded::Str(s) => s.chars().count(),
                    Expanded::List { items, .. } => items.len(),
                })
                .unwrap_or(0),
            "[@]" | "[*]" => self
                .vars
                .get(name)
                .map(|v| v.elements().len())
                .unwrap_or(0),
            sub if sub.starts_with('[') && sub.ends_with(']') => {
                match self.lookup(name, Some(&sub[1..sub.len() - 1]))? {
                    Some(Expanded::Str(s)) => s.chars().count(),
                    _ => 0,
                }
            }
            _ => return Err(self.error(format!("bad substitution `${{{}}}`", content))),
        };
        Ok(Expanded::Str(len.to_string()))
    }

    /// Current value of a parameter, `None` when unset.
    fn lookup(&mut self, name: &str, subscript: Option<&str>) -> Result<Option<Expanded>> {
        match name {
            "?" => return Ok(Some(Expanded::Str(self.status.to_string()))),
            "#" => return Ok(Some(Expanded::Str("0".to_string()))),
            "@" | "*" => {
                return Ok(Some(Expanded::List {
                    items: Vec::new(),
                    star: name == "*",
                }))
            }
            n if n.chars().all(|c| c.is_ascii_digit()) => return Ok(None),
            _ => {}
        }
        let Some(value) = self.vars.get(name) else {
            return Ok(None);
        };
        match subscript {
            None => Ok(value.scalar().map(|s| Expanded::Str(s.to_string()))),
            Some(s @ ("@" | "*")) => Ok(Some(Expanded::List {
                items: value.elements(),
                star: s == "*",
            })),
            Some(index) => {
                let elements = value.elements();
                let index = self.index(index)?;
                let position = if index < 0 {
                    (elements.len() as i64).saturating_add(index)
                } else {
                    index
                };
                Ok(usize::try_from(position)
                    .ok()
                    .and_then(|p| elements.get(p))
                    .map(|s| Expanded::Str(s.clone())))
            }
        }
    }

    fn index(&mut self, raw: &str) -> Result<i64> {
        let text = self.string(raw)?;
        let text = text.trim();
        if let Ok(n) = text.parse::<i64>() {
            return Ok(n);
        }
        let from_var = self
            .vars
            .get(text)
            .and_then(Value::scalar)
            .and_then(|v| v.trim().parse::<i64>().ok());
        from_var.ok_or_else(|| self.error(format!("unsupported array index `{}`", raw)))
    }

    fn apply_operator(
        &mut self,
        name: &str,
        subscript: Option<&str>,
        base: Option<Expanded>,
        op: &str,
        content: &str,
    ) -> Result<Expanded> {
        if op.is_empty() {
            return Ok(base.unwrap_or(Expanded::Str(String::new())));
        }

        let (colon, body) = match op.strip_prefix(':') {
            Some(after) if after.starts_with(['-', '=', '+', '?']) => (true, after),
            Some(after) => return self.substring(base, after),
            None => (false, op),
        };

        let missing = match &base {
            None => true,
            Some(v) => colon && v.is_null(),
        };
        let mut chars = body.chars();
        let first = chars.next().unwrap_or_default();
        let word = chars.as_str();

        match first {
            '-' => {
                if missing {
                    Ok(Expanded::Str(self.string(word)?))
                } else {
                    Ok(base.unwrap_or(Expanded::Str(String::new())))
                }
            }
            '=' => {
                if !missing {
                    return Ok(base.unwrap_or(Expanded::Str(String::new())));
                }
                if subscript.is_some() || !is_name(name) {
                    return Err(self.error(format!("cannot assign in `${{{}}}`", content)));
                }
                let value = self.string(word)?;
                self.vars
                    .insert(name.to_string(), Value::Scalar(value.clone()));
                Ok(Expanded::Str(value))
            }
            '+' => {
                if missing {
                    Ok(Expanded::Str(String::new()))
                } else {
                    Ok(Expanded::Str(self.string(word)?))
                }
            }
            '?' => {
                if missing {
                    let message = self.string(word)?;
                    let message = if message.is_empty() {
                        "parameter null or not set".to_string()
                    } else {
                        message
                    };
                    Err(self.error(format!("{}: {}", name, message)))
                } else {
                    Ok(base.unwrap_or(Expanded::Str(String::new())))
                }
            }
            _ => self.pattern_operator(base.unwrap_or(Expanded::Str(String::new())), op, content),
        }
    }

    fn substring(&mut self, base: Option<Expanded>, spec: &str) -> Result<Expanded> {
        let (offset, length) = match spec.split_once(':') {
            Some((o, l)) => (o, Some(l)),
            None => (spec, None),
        };
        let offset = self.index(offset)?;
        let length = length.map(|l| self.index(l)).transpose()?;
        let slice = |len: usize| -> (usize, usize) {
            let start = if offset < 0 {
                (len as i64).saturating_add(offset).max(0) as usize
            } else {
                (offset as usize).min(len)
            };
            let end = match length {
                None => len,
                Some(l) if l < 0 => ((len as i64).saturating_add(l).max(start as i64)) as usize,
                Some(l) => start.saturating_add(l as usize).min(len),
            };
            (start, end)
        };
        Ok(match base {
            None => Expanded::Str(String::new()),
            Some(Expanded::Str(s)) => {
                let chars: Vec<char> = s.chars().collect();
                let (start, end) = slice(chars.len());
                Expanded::Str(collect(&chars[start..end]))
            }
            Some(Expanded::List { items, star }) => {
                let (start, end) = slice(items.len());
                Expanded::List {
                    items: items[start..end].to_vec(),
                    star,
                }
            }
        })
    }

    fn pattern_operator(&mut self, base: Expanded, op: &str, content: &str) -> Result<Expanded> {
        for (prefix, longest) in [("##", true), ("#", false)] {
            if let Some(word) = op.strip_prefix(prefix) {
                let pattern = self.string(word)?;
                return Ok(base.map(|s| remove_prefix(s, &pattern, longest)));
            }
        }
        for (prefix, longest) in [("%%", true), ("%", false)] {
            if let Some(word) = op.strip_prefix(prefix) {
                let pattern = self.string(word)?;
                return Ok(base.map(|s| remove_suffix(s, &pattern, longest)));
            }
        }
        if let Some(rest) = op.strip_prefix('/') {
            let (mode, rest) = match rest.chars().next() {
                Some('/') => (Replace::All, &rest[1..]),
                Some('#') => (Replace::Prefix, &rest[1..]),
                Some('%') => (Replace::Suffix, &rest[1..]),
                _ => (Replace::First, rest),
            };
            let (pattern, replacement) = match split_unescaped(rest, '/') {
                Some((p, r)) => (p, r),
                None => (rest, ""),
            };
            let pattern = self.string(pattern)?;
            let replacement = self.string(replacement)?;
            return Ok(base.map(|s| replace(s, &pattern, &replacement, mode)));
        }
        match op {
            "^^" => Ok(base.map(|s| s.to_uppercase())),
            ",," => Ok(base.map(|s| s.to_lowercase())),
            "^" => Ok(base.map(|s| map_first(s, char::to_uppercase))),
            "," => Ok(base.map(|s| map_first(s, char::to_lowercase))),
            _ => Err(self.error(format!("unsupported expansion `${{{}}}`", content))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Replace {
    First,
    All,
    Prefix,
    Suffix,
}

fn collect(chars: &[char]) -> String {
    chars.iter().collect()
}

fn is_name(s: &str) -> bool {
    let mut chars = s.chars();
    chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Split `content` into a parameter name and the rest.
fn split_param(content: &str) -> Option<(&str, &str)> {
    let first = content.chars().next()?;
    if first.is_ascii_alphabetic() || first == '_' {
        let end = content
            .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
            .unwrap_or(content.len());
        return Some(content.split_at(end));
    }
    if first.is_ascii_digit() {
        let end = content
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(content.len());
        return Some(content.split_at(end));
    }
    if matches!(first, '?' | '@' | '*' | '#') {
        return Some(content.split_at(1));
    }
    None
}

fn find_char(chars: &[char], from: usize, target: char) -> Option<usize> {
    (from..chars.len()).find(|&i| chars[i] == target)
}

/// Index of the bracket closing the one at `open_at`.
fn find_closing(chars: &[char], open_at: usize, open: char, close: char) -> Option<usize> {
    let mut depth = 0;
    let mut i = open_at;
    let mut in_single = false;
    let mut in_double = false;
    while i < chars.len() {
        let c = chars[i];
        match c {
            '\\' if !in_single => i += 1,
            '\'' if !in_double && open == '(' => in_single = !in_single,
            '"' if !in_single => in_double = !in_double,
            _ if in_single || in_double => {}
            c if c == open => depth += 1,
            c if c == close => {
                depth -= 1;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
        i += 1;
    }
    None
}

fn split_unescaped(s: &str, sep: char) -> Option<(&str, &str)> {
    let mut escaped = false;
    for (i, c) in s.char_indices() {
        if escaped {
            escaped = false;
        } else if c == '\\' {
            escaped = true;
        } else if c == sep {
            return Some((&s[..i], &s[i + 1..]));
        }
    }
    None
}

fn ansi_c(s: &str) -> String {
    let mut out = String::new();
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}

fn map_first<I: Iterator<Item = char>>(s: &str, f: impl Fn(char) -> I) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) => f(c).chain(chars).collect(),
        None => String::new(),
    }
}

/// Matches `text` against a shell pattern; invalid patterns match literally.
pub(crate) fn pattern_matches(pattern: &str, text: &str) -> bool {
    match Pattern::new(pattern) {
        Ok(p) => p.matches(text),
        Err(_) => pattern == text,
    }
}

fn boundaries(s: &str) -> Vec<usize> {
    s.char_indices()
        .map(|(i, _)| i)
        .chain(std::iter::once(s.len()))
        .collect()
}

fn remove_prefix(s: &str, pattern: &str, longest: bool) -> String {
    let bounds = boundaries(s);
    let pick = |i: usize| pattern_matches(pattern, &s[..i]);
    let cut = if longest {
        bounds.iter().rev().copied().find(|&i| pick(i))
    } else {
        bounds.iter().copied().find(|&i| pick(i))
    };
    match cut {
        Some(i) => s[i..].to_string(),
        None => s.to_string(),
    }
}

fn remove_suffix(s: &str, pattern: &str, longest: bool) -> String {
    let bounds = boundaries(s);
    let pick = |i: usize| pattern_matches(pattern, &s[i..]);
    let cut = if longest {
        bounds.iter().copied().find(|&i| pick(i))
    } else {
        bounds.iter().rev().copied().find(|&i| pick(i))
    };
    match cut {
        Some(i) => s[..i].to_string(),
        None => s.to_string(),
    }
}

fn replace(s: &str, pattern: &str, replacement: &str, mode: Replace) -> String {
    let bounds = boundaries(s);
    match mode {
        Replace::Prefix => match bounds.iter().rev().find(|&&j| pattern_matches(pattern, &s[..j])) {
            Some(&j) => format!("{}{}", replacement, &s[j..]),
            None => s.to_string(),
        },
        Replace::Suffix => match bounds.iter().find(|&&i| pattern_matches(pattern, &s[i..])) {
            Some(&i) => format!("{}{}", &s[..i], replacement),
            None => s.to_string(),
        },
        Replace::First | Replace::All => {
            let mut out = String::new();
            let mut k = 0;
            let mut replaced = false;
            while k < bounds.len() - 1 {
                let i = bounds[k];
                let matched = if replaced && mode == Replace::First {
                    None
                } else {
                    bounds[k + 1..]
                        .iter()
                        .rev()
                        .position(|&j| pattern_matches(pattern, &s[i..j]))
                        .map(|p| bounds.len() - 1 - p)
                };
                match matched {
                    Some(end) => {
                        out.push_str(replacement);
                        k = end;
                        replaced = true;
                    }
                    None => {
                        out.push_str(&s[i..bounds[k + 1]]);
                        k += 1;
                    }
                }
            }
            out
        }
    }
}
