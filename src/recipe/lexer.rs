//! Tokenizer for the recipe shell subset.
//!
//! Words are kept as raw source text (quotes included); quote removal and
//! expansion happen later in [`super::expand`]. Comments, line continuations
//! and heredoc bodies never reach the parser.

use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Tok {
    /// A word, raw.
    Word(String),
    /// `name=( ... )` or `name+=( ... )`, elements raw.
    Array {
        name: String,
        append: bool,
        elements: Vec<String>,
    },
    /// Control or redirection operator, or `"\n"`.
    Op(&'static str),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Token {
    pub tok: Tok,
    pub line: usize,
}

pub(crate) const REDIRECTIONS: &[&str] = &["<", ">", ">>", "<<", "<<<", ">&", "<&", "&>", ">|", "<>"];

pub(crate) fn tokenize(src: &str) -> Result<Vec<Token>> {
    Lexer {
        chars: src.chars().collect(),
        pos: 0,
        line: 1,
        pending_heredocs: Vec::new(),
        tokens: Vec::new(),
    }
    .run()
}

struct Heredoc {
    delimiter: String,
    strip_tabs: bool,
}

struct Lexer {
    chars: Vec<char>,
    pos: usize,
    line: usize,
    pending_heredocs: Vec<Heredoc>,
    tokens: Vec<Token>,
}

fn is_meta(c: char) -> bool {
    matches!(c, ' ' | '\t' | '\n' | ';' | '&' | '|' | '(' | ')' | '<' | '>')
}

fn is_name_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

fn is_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

impl Lexer {
    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn error(&self, line: usize, message: impl Into<String>) -> Error {
        Error::Manifest {
            line,
            message: message.into(),
        }
    }

    fn push(&mut self, tok: Tok, line: usize) {
        self.tokens.push(Token { tok, line });
    }

    fn run(mut self) -> Result<Vec<Token>> {
        while let Some(c) = self.peek() {
            let line = self.line;
            match c {
                ' ' | '\t' | '\r' => self.pos += 1,
                '\\' if self.peek_at(1) == Some('\n') => {
                    self.pos += 2;
                    self.line += 1;
                }
                '#' => {
                    while self.peek().is_some_and(|c| c != '\n') {
                        self.pos += 1;
                    }
                }
                '\n' => {
                    self.pos += 1;
                    self.line += 1;
                    self.push(Tok::Op("\n"), line);
                    self.read_heredoc_bodies()?;
                }
                ';' | '&' | '|' | '(' | ')' | '<' | '>' => {
                    let op = self.read_operator();
                    self.push(Tok::Op(op), line);
                    if op == "<<" {
                        self.queue_heredoc()?;
                    }
                }
                _ => {
                    let tok = self.read_word_or_array()?;
                    self.push(tok, line);
                }
            }
        }
        if let Some(doc) = self.pending_heredocs.first() {
            return Err(self.error(
                self.line,
                format!("unterminated heredoc `{}`", doc.delimiter),
            ));
        }
        Ok(self.tokens)
    }

    fn read_operator(&mut self) -> &'static str {
        let c = self.peek();
        let next = self.peek_at(1);
        let third = self.peek_at(2);
        let (op, len) = match (c, next, third) {
            (Some(';'), Some(';'), Some('&')) => (";;&", 3),
            (Some(';'), Some(';'), _) => (";;", 2),
            (Some(';'), Some('&'), _) => (";&", 2),
            (Some(';'), _, _) => (";", 1),
            (Some('&'), Some('&'), _) => ("&&", 2),
            (Some('&'), Some('>'), _) => ("&>", 2),
            (Some('&'), _, _) => ("&", 1),
            (Some('|'), Some('|'), _) => ("||", 2),
            (Some('|'), Some('&'), _) => ("|", 2),
            (Some('|'), _, _) => ("|", 1),
            (Some('('), _, _) => ("(", 1),
            (Some(')'), _, _) => (")", 1),
            (Some('<'), Some('<'), Some('<')) => ("<<<", 3),
            (Some('<'), Some('<'), Some('-')) => ("<<", 2),
            (Some('<'), Some('<'), _) => ("<<", 2),
            (Some('<'), Some('&'), _) => ("<&", 2),
            (Some('<'), Some('>'), _) => ("<>", 2),
            (Some('<'), _, _) => ("<", 1),
            (Some('>'), Some('>'), _) => (">>", 2),
            (Some('>'), Some('&'), _) => (">&", 2),
            (Some('>'), Some('|'), _) => (">|", 2),
            _ => (">", 1),
        };
        self.pos += len;
        op
    }

    fn queue_heredoc(&mut self) -> Result<()> {
        let strip_tabs = self.peek() == Some('-');
        if strip_tabs {
            self.pos += 1;
        }
        while matches!(self.peek(), Some(' ' | '\t')) {
            self.pos += 1;
        }
        let line = self.line;
        let raw = match self.read_word_or_array()? {
            Tok::Word(raw) => raw,
            _ => return Err(self.error(line, "invalid heredoc delimiter")),
        };
        let delimiter: String = raw.chars().filter(|c| !matches!(c, '\'' | '"' | '\\')).collect();
        self.push(Tok::Word(raw), line);
        self.pending_heredocs.push(Heredoc {
            delimiter,
            strip_tabs,
        });
        Ok(())
    }

    fn read_heredoc_bodies(&mut self) -> Result<()> {
        for doc in std::mem::take(&mut self.pending_heredocs) {
            let start = self.line;
            loop {
                if self.pos >= self.chars.len() {
                    return Err(self.error(start, format!("unterminated heredoc `{}`", doc.delimiter)));
                }
                let begin = self.pos;
                while self.peek().is_some_and(|c| c != '\n') {
                    self.pos += 1;
                }
                let text: String = self.chars[begin..self.pos].iter().collect();
                if self.peek() == Some('\n') {
                    self.pos += 1;
                }
                self.line += 1;
                let text = if doc.strip_tabs {
                    text.trim_start_matches('\t')
                } else {
                    text.as_str()
                };
                if text.trim_end_matches('\r') == doc.delimiter {
                    break;
                }
            }
        }
        Ok(())
    }

    /// Length of a `name=` / `name+=` prefix directly followed by `(`.
    fn array_prefix(&self) -> Option<(String, bool, usize)> {
        let mut i = self.pos;
        if !self.chars.get(i).copied().is_some_and(is_name_start) {
            return None;
        }
        while self.chars.get(i).copied().is_some_and(is_name_char) {
            i += 1;
        }
        let name: String = self.chars[self.pos..i].iter().collect();
        let append = self.chars.get(i) == Some(&'+');
        if append {
            i += 1;
        }
        if self.chars.get(i) == Some(&'=') && self.chars.get(i + 1) == Some(&'(') {
            Some((name, append, i + 2 - self.pos))
        } else {
            None
        }
    }

    fn read_word_or_array(&mut self) -> Result<Tok> {
        if let Some((name, append, len)) = self.array_prefix() {
            let start = self.line;
            self.pos += len;
            let mut elements = Vec::new();
            loop {
                match self.peek() {
                    None => return Err(self.error(start, format!("unterminated array `{}`", name))),
                    Some(' ' | '\t' | '\r') => self.pos += 1,
                    Some('\n') => {
                        self.pos += 1;
                        self.line += 1;
                    }
                    Some('\\') if self.peek_at(1) == Some('\n') => {
                        self.pos += 2;
                        self.line += 1;
                    }
                    Some('#') => {
                        while self.peek().is_some_and(|c| c != '\n') {
                            self.pos += 1;
                        }
                    }
                    Some(')') => {
                        self.pos += 1;
                        break;
                    }
                    Some(_) => {
                        let element = self.read_word()?;
                        if element.is_empty() {
                            return Err(self.error(
                                self.line,
                                format!("unexpected character in array `{}`", name),
                            ));
                        }
                        elements.push(element);
                    }
                }
            }
            return Ok(Tok::Array {
                name,
                append,
                elements,
            });
        }
        Ok(Tok::Word(self.read_word()?))
    }

    fn read_word(&mut self) -> Result<String> {
        let mut raw = String::new();
        while let Some(c) = self.peek() {
            if is_meta(c) {
                break;
            }
            match c {
                '\'' => self.read_single_quoted(&mut raw)?,
                '"' => self.read_double_quoted(&mut raw)?,
                '\\' => {
                    if self.peek_at(1) == Some('\n') {
                        self.pos += 2;
                        self.line += 1;
                    } else {
                        raw.push(c);
                        self.pos += 1;
                        if let Some(next) = self.peek() {
                            raw.push(next);
                            self.pos += 1;
                        }
                    }
                }
                '$' if matches!(self.peek_at(1), Some('{') | Some('(')) => {
                    self.read_dollar_group(&mut raw)?
                }
                '`' => self.read_backticks(&mut raw)?,
                _ => {
                    raw.push(c);
                    self.pos += 1;
                }
            }
        }
        Ok(raw)
    }

    fn take(&mut self, raw: &mut String) {
        if let Some(c) = self.peek() {
            if c == '\n' {
                self.line += 1;
            }
            raw.push(c);
            self.pos += 1;
        }
    }

    fn read_single_quoted(&mut self, raw: &mut String) -> Result<()> {
        let start = self.line;
        self.take(raw);
        loop {
            match self.peek() {
                None => return Err(self.error(start, "unterminated single quote")),
                Some('\'') => {
                    self.take(raw);
                    return Ok(());
                }
                Some(_) => self.take(raw),
            }
        }
    }

    fn read_double_quoted(&mut self, raw: &mut String) -> Result<()> {
        let start = self.line;
        self.take(raw);
        loop {
            match self.peek() {
                None => return Err(self.error(start, "unterminated double quote")),
                Some('"') => {
                    self.take(raw);
                    return Ok(());
                }
                Some('\\') => {
                    self.take(raw);
                    self.take(raw);
                }
                Some('$') if matches!(self.peek_at(1), Some('{') | Some('(')) => {
                    self.read_dollar_group(raw)?
                }
                Some('`') => self.read_backticks(raw)?,
                Some(_) => self.take(raw),
            }
        }
    }

    /// `${ ... }` or `$( ... )`, with nesting and quotes.
    fn read_dollar_group(&mut self, raw: &mut String) -> Result<()> {
        let start = self.line;
        self.take(raw);
        let open = self.peek().unwrap_or('{');
        let close = if open == '{' { '}' } else { ')' };
        self.take(raw);
        let mut depth = 1;
        loop {
            match self.peek() {
                None => {
                    return Err(self.error(start, format!("unterminated `${}`", open)));
                }
                Some('\'') if open == '(' => self.read_single_quoted(raw)?,
                Some('"') => self.read_double_quoted(raw)?,
                Some('\\') => {
                    self.take(raw);
                    self.take(raw);
                }
                Some('$') if matches!(self.peek_at(1), Some('{') | Some('(')) => {
                    self.read_dollar_group(raw)?
                }
                Some(c) if c == open => {
                    depth += 1;
                    self.take(raw);
                }
                Some(c) if c == close => {
                    depth -= 1;
                    self.take(raw);
                    if depth == 0 {
                        return Ok(());
                    }
                }
                Some(_) => self.take(raw),
            }
        }
    }

    fn read_backticks(&mut self, raw: &mut String) -> Result<()> {
        let start = self.line;
        self.take(raw);
        loop {
            match self.peek() {
                None => return Err(self.error(start, "unterminated backquote")),
                Some('\\') => {
                    self.take(raw);
                    self.take(raw);
                }
                Some('`') => {
                    self.take(raw);
                    return Ok(());
                }
                Some(_) => self.take(raw),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(src: &str) -> Vec<Tok> {
        tokenize(src).unwrap().into_iter().map(|t| t.tok).collect()
    }

    fn word(s: &str) -> Tok {
        Tok::Word(s.to_string())
    }

    #[test]
    fn test_words_and_operators() {
        assert_eq!(
            kinds("a=1; [ -n \"$a\" ] && echo 'x y'\n"),
            vec![
                word("a=1"),
                Tok::Op(";"),
                word("["),
                word("-n"),
                word("\"$a\""),
                word("]"),
                Tok::Op("&&"),
                word("echo"),
                word("'x y'"),
                Tok::Op("\n"),
            ]
        );
    }

    #[test]
    fn test_array_assignment_spans_lines() {
        let toks = tokenize("source=(\n  \"a b\" # comment\n  c\n)\nx=1\n").unwrap();
        assert_eq!(
            toks[0].tok,
            Tok::Array {
                name: "source".to_string(),
                append: false,
                elements: vec!["\"a b\"".to_string(), "c".to_string()],
            }
        );
        assert_eq!(toks[2].line, 5);
    }

    #[test]
    fn test_append_array() {
        assert_eq!(
            kinds("source+=(x)"),
            vec![Tok::Array {
                name: "source".to_string(),
                append: true,
                elements: vec!["x".to_string()],
            }]
        );
    }

    #[test]
    fn test_comment_and_continuation() {
        assert_eq!(
            kinds("# header\necho a \\\n  b"),
            vec![Tok::Op("\n"), word("echo"), word("a"), word("b")]
        );
    }

    #[test]
    fn test_parameter_expansion_is_one_word() {
        assert_eq!(kinds("x=${a:-b c}d"), vec![word("x=${a:-b c}d")]);
        assert_eq!(kinds("x=$(echo ')')"), vec![word("x=$(echo ')')")]);
    }

    #[test]
    fn test_case_operators() {
        assert_eq!(
            kinds("a|b) x;;"),
            vec![word("a"), Tok::Op("|"), word("b"), Tok::Op(")"), word("x"), Tok::Op(";;")]
        );
        assert_eq!(
            kinds("a) x;&\nb) y;;&"),
            vec![
                word("a"),
                Tok::Op(")"),
                word("x"),
                Tok::Op(";&"),
                Tok::Op("\n"),
                word("b"),
                Tok::Op(")"),
                word("y"),
                Tok::Op(";;&"),
            ]
        );
    }

    #[test]
    fn test_heredoc_body_is_skipped() {
        assert_eq!(
            kinds("cat <<EOF\n$(rm -rf /)\nEOF\nx=1\n"),
            vec![
                word("cat"),
                Tok::Op("<<"),
                word("EOF"),
                Tok::Op("\n"),
                word("x=1"),
                Tok::Op("\n"),
            ]
        );
    }

    #[test]
    fn test_unterminated_quote_reports_start_line() {
        match tokenize("a=1\nb=\"oops\n\n") {
            Err(Error::Manifest { line, message }) => {
                assert_eq!(line, 2);
                assert!(message.contains("double quote"));
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_unterminated_array() {
        assert!(matches!(
            tokenize("source=(a b"),
            Err(Error::Manifest { line: 1, .. })
        ));
    }
}
