//! Recursive-descent parser producing the command tree the interpreter walks.

use std::rc::Rc;

use super::lexer::{Tok, Token, REDIRECTIONS};
use crate::error::{Error, Result};

pub(crate) type List = Vec<AndOr>;

#[derive(Debug, Clone)]
pub(crate) struct AndOr {
    pub first: Pipeline,
    /// `true` for `&&`, `false` for `||`.
    pub rest: Vec<(bool, Pipeline)>,
}

#[derive(Debug, Clone)]
pub(crate) struct Pipeline {
    pub negated: bool,
    pub commands: Vec<Command>,
}

#[derive(Debug, Clone)]
pub(crate) enum Item {
    Word(String),
    Array {
        name: String,
        append: bool,
        elements: Vec<String>,
    },
}

/// How a `case` arm hands over once its body has run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CaseEnd {
    /// `;;`
    Break,
    /// `;&`: run the next body without testing its patterns.
    FallThrough,
    /// `;;&`: keep testing the following arms.
    Continue,
}

#[derive(Debug, Clone)]
pub(crate) struct CaseArm {
    pub patterns: Vec<String>,
    pub body: List,
    pub end: CaseEnd,
}

/// One argument of `[[ ... ]]`.
#[derive(Debug, Clone)]
pub(crate) enum TestArg {
    Op(&'static str),
    Word(String),
}

#[derive(Debug, Clone)]
pub(crate) enum Command {
    Simple {
        line: usize,
        items: Vec<Item>,
    },
    Test {
        line: usize,
        args: Vec<TestArg>,
    },
    If {
        branches: Vec<(List, List)>,
        otherwise: Option<List>,
    },
    Case {
        line: usize,
        word: String,
        arms: Vec<CaseArm>,
    },
    For {
        line: usize,
        var: String,
        words: Option<Vec<String>>,
        body: List,
    },
    /// `while`/`until`: parsed, never run.
    Loop {
        line: usize,
        keyword: String,
    },
    Group(List),
    Subshell(List),
    Function {
        name: String,
        body: Rc<Command>,
    },
}

const RESERVED_TERMINATORS: &[&str] = &["then", "elif", "else", "fi", "do", "done", "esac", "}"];

pub(crate) fn parse(tokens: Vec<Token>) -> Result<List> {
    let mut parser = Parser { tokens, pos: 0 };
    let list = parser.list()?;
    match parser.peek() {
        None => Ok(list),
        Some(token) => Err(Error::Manifest {
            line: token.line,
            message: format!("unexpected `{}`", describe(&token.tok)),
        }),
    }
}

fn describe(tok: &Tok) -> String {
    match tok {
        Tok::Word(w) => w.clone(),
        Tok::Array { name, .. } => format!("{}=(", name),
        Tok::Op("\n") => "newline".to_string(),
        Tok::Op(op) => op.to_string(),
    }
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn peek_tok(&self) -> Option<&Tok> {
        self.peek().map(|t| &t.tok)
    }

    fn line(&self) -> usize {
        self.peek()
            .or_else(|| self.tokens.last())
            .map(|t| t.line)
            .unwrap_or(1)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    fn at_word(&self, word: &str) -> bool {
        matches!(self.peek_tok(), Some(Tok::Word(w)) if w == word)
    }

    fn at_op(&self, op: &str) -> bool {
        matches!(self.peek_tok(), Some(Tok::Op(o)) if *o == op)
    }

    fn skip_newlines(&mut self) {
        while self.at_op("\n") {
            self.pos += 1;
        }
    }

    fn skip_separators(&mut self) {
        while self.at_op("\n") || self.at_op(";") || self.at_op("&") {
            self.pos += 1;
        }
    }

    fn error(&self, line: usize, message: impl Into<String>) -> Error {
        Error::Manifest {
            line,
            message: message.into(),
        }
    }

    fn expect_word(&mut self, word: &str, opened_at: usize, construct: &str) -> Result<()> {
        if self.at_word(word) {
            self.pos += 1;
            Ok(())
        } else {
            Err(self.error(
                opened_at,
                format!("unterminated `{}`: expected `{}`", construct, word),
            ))
        }
    }

    fn at_list_end(&self) -> bool {
        match self.peek_tok() {
            None => true,
            Some(Tok::Word(w)) => RESERVED_TERMINATORS.contains(&w.as_str()),
            Some(Tok::Op(op)) => matches!(*op, ")" | ";;" | ";&" | ";;&"),
            Some(Tok::Array { .. }) => false,
        }
    }

    fn list(&mut self) -> Result<List> {
        let mut list = Vec::new();
        loop {
            self.skip_separators();
            if self.at_list_end() {
                return Ok(list);
            }
            list.push(self.and_or()?);
        }
    }

    fn and_or(&mut self) -> Result<AndOr> {
        let first = self.pipeline()?;
        let mut rest = Vec::new();
        loop {
            let is_and = if self.at_op("&&") {
                true
            } else if self.at_op("||") {
                false
            } else {
                break;
            };
            self.pos += 1;
            self.skip_newlines();
            rest.push((is_and, self.pipeline()?));
        }
        Ok(AndOr { first, rest })
    }

    fn pipeline(&mut self) -> Result<Pipeline> {
        let negated = self.at_word("!");
        if negated {
            self.pos += 1;
        }
        let mut commands = vec![self.command()?];
        while self.at_op("|") {
            self.pos += 1;
            self.skip_newlines();
            commands.push(self.command()?);
        }
        Ok(Pipeline { negated, commands })
    }

    fn command(&mut self) -> Result<Command> {
        let line = self.line();
        let word = match self.peek_tok() {
            Some(Tok::Word(w)) => Some(w.clone()),
            Some(Tok::Op("(")) => {
                self.pos += 1;
                let body = self.list()?;
                if !self.at_op(")") {
                    return Err(self.error(line, "unterminated subshell"));
                }
                self.pos += 1;
                return Ok(Command::Subshell(body));
            }
            _ => None,
        };

        match word.as_deref() {
            Some("if") => return self.if_clause(line),
            Some("case") => return self.case_clause(line),
            Some("for") => return self.for_clause(line),
            Some(kw @ ("while" | "until")) => {
                let keyword = kw.to_string();
                return self.loop_clause(line, keyword);
            }
            Some("{") => {
                self.pos += 1;
                let body = self.list()?;
                self.expect_word("}", line, "{")?;
                return Ok(Command::Group(body));
            }
            Some("[[") => return self.test_clause(line),
            Some("function") => {
                self.pos += 1;
                let name = match self.advance().map(|t| t.tok) {
                    Some(Tok::Word(name)) => name,
                    _ => return Err(self.error(line, "expected function name")),
                };
                if self.at_op("(") {
                    self.pos += 1;
                    if !self.at_op(")") {
                        return Err(self.error(line, "expected `)` after `(`"));
                    }
                    self.pos += 1;
                }
                return self.function_body(line, name);
            }
            Some(name) if self.is_function_def() => {
                let name = name.to_string();
                self.pos += 3;
                return self.function_body(line, name);
            }
            Some(w) if RESERVED_TERMINATORS.contains(&w) => {
                return Err(self.error(line, format!("unexpected `{}`", w)));
            }
            _ => {}
        }

        self.simple_command(line)
    }

    fn is_function_def(&self) -> bool {
        matches!(
            (
                self.tokens.get(self.pos + 1).map(|t| &t.tok),
                self.tokens.get(self.pos + 2).map(|t| &t.tok),
            ),
            (Some(Tok::Op("(")), Some(Tok::Op(")")))
        )
    }

    fn function_body(&mut self, line: usize, name: String) -> Result<Command> {
        self.skip_newlines();
        if self.peek().is_none() {
            return Err(self.error(line, format!("missing body for function `{}`", name)));
        }
        let body = self.command()?;
        Ok(Command::Function {
            name,
            body: Rc::new(body),
        })
    }

    fn simple_command(&mut self, line: usize) -> Result<Command> {
        let mut items = Vec::new();
        while let Some(tok) = self.peek_tok() {
            match tok {
                Tok::Word(w) => {
                    items.push(Item::Word(w.clone()));
                    self.pos += 1;
                }
                Tok::Array {
                    name,
                    append,
                    elements,
                } => {
                    items.push(Item::Array {
                        name: name.clone(),
                        append: *append,
                        elements: elements.clone(),
                    });
                    self.pos += 1;
                }
                Tok::Op(op) if REDIRECTIONS.contains(op) => {
                    self.pos += 1;
                    if matches!(self.peek_tok(), Some(Tok::Word(_))) {
                        self.pos += 1;
                    }
                }
                Tok::Op(_) => break,
            }
        }
        if items.is_empty() {
            let found = self
                .peek_tok()
                .map(describe)
                .unwrap_or_else(|| "end of file".to_string());
            return Err(self.error(line, format!("unexpected `{}`", found)));
        }
        Ok(Command::Simple { line, items })
    }

    fn test_clause(&mut self, line: usize) -> Result<Command> {
        self.pos += 1;
        let mut args = Vec::new();
        loop {
            match self.advance().map(|t| t.tok) {
                None | Some(Tok::Op("\n")) => {
                    return Err(self.error(line, "unterminated `[[`"));
                }
                Some(Tok::Word(w)) if w == "]]" => break,
                Some(Tok::Word(w)) => args.push(TestArg::Word(w)),
                Some(Tok::Op(op)) => args.push(TestArg::Op(op)),
                Some(Tok::Array { name, .. }) => {
                    return Err(self.error(line, format!("unexpected array `{}` in `[[`", name)));
                }
            }
        }
        Ok(Command::Test { line, args })
    }

    fn if_clause(&mut self, line: usize) -> Result<Command> {
        self.pos += 1;
        let mut branches = Vec::new();
        let mut otherwise = None;
        loop {
            let condition = self.list()?;
            self.expect_word("then", line, "if")?;
            let body = self.list()?;
            branches.push((condition, body));
            if self.at_word("elif") {
                self.pos += 1;
                continue;
            }
            if self.at_word("else") {
                self.pos += 1;
                otherwise = Some(self.list()?);
            }
            self.expect_word("fi", line, "if")?;
            return Ok(Command::If {
                branches,
                otherwise,
            });
        }
    }

    fn case_clause(&mut self, line: usize) -> Result<Command> {
        self.pos += 1;
        let word = match self.advance().map(|t| t.tok) {
            Some(Tok::Word(w)) => w,
            _ => return Err(self.error(line, "expected word after `case`")),
        };
        self.skip_newlines();
        self.expect_word("in", line, "case")?;
        let mut arms = Vec::new();
        loop {
            self.skip_separators();
            if self.at_word("esac") {
                self.pos += 1;
                return Ok(Command::Case { line, word, arms });
            }
            if self.at_op("(") {
                self.pos += 1;
            }
            let mut patterns = Vec::new();
            loop {
                match self.advance().map(|t| t.tok) {
                    Some(Tok::Word(p)) => patterns.push(p),
                    _ => return Err(self.error(line, "unterminated `case`: expected pattern")),
                }
                if self.at_op("|") {
                    self.pos += 1;
                    continue;
                }
                if self.at_op(")") {
                    self.pos += 1;
                    break;
                }
                return Err(self.error(line, "unterminated `case`: expected `)` after pattern"));
            }
            let body = self.list()?;
            let end = match self.peek_tok() {
                Some(Tok::Op(";;")) => CaseEnd::Break,
                Some(Tok::Op(";&")) => CaseEnd::FallThrough,
                Some(Tok::Op(";;&")) => CaseEnd::Continue,
                _ if self.at_word("esac") => CaseEnd::Break,
                _ => {
                    return Err(self.error(line, "unterminated `case`: expected `;;` or `esac`"))
                }
            };
            if !self.at_word("esac") {
                self.pos += 1;
            }
            arms.push(CaseArm {
                patterns,
                body,
                end,
            });
        }
    }

    fn for_clause(&mut self, line: usize) -> Result<Command> {
        self.pos += 1;
        let var = match self.advance().map(|t| t.tok) {
            Some(Tok::Word(w)) => w,
            _ => return Err(self.error(line, "expected variable after `for`")),
        };
        self.skip_newlines();
        let mut words = None;
        if self.at_word("in") {
            self.pos += 1;
            let mut list = Vec::new();
            while let Some(Tok::Word(w)) = self.peek_tok() {
                list.push(w.clone());
                self.pos += 1;
            }
            words = Some(list);
        }
        self.skip_separators();
        self.expect_word("do", line, "for")?;
        let body = self.list()?;
        self.expect_word("done", line, "for")?;
        Ok(Command::For {
            line,
            var,
            words,
            body,
        })
    }

    fn loop_clause(&mut self, line: usize, keyword: String) -> Result<Command> {
        self.pos += 1;
        self.list()?;
        self.expect_word("do", line, &keyword)?;
        self.list()?;
        self.expect_word("done", line, &keyword)?;
        Ok(Command::Loop { line, keyword })
    }
}

#[cfg(test)]
mod tests {
    use super::super::lexer::tokenize;
    use super::*;

    fn parse_src(src: &str) -> Result<List> {
        parse(tokenize(src)?)
    }

    #[test]
    fn test_if_elif_else() {
        let list = parse_src(
            "if [ a = b ]; then\n x=1\nelif true; then x=2\nelse\n x=3\nfi\n",
        )
        .unwrap();
        assert_eq!(list.len(), 1);
        match &list[0].first.commands[0] {
            Command::If {
                branches,
                otherwise,
            } => {
                assert_eq!(branches.len(), 2);
                assert!(otherwise.is_some());
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_case_arms() {
        let list = parse_src("case $x in\n  a|b) y=1 ;;\n  (*) y=2\nesac").unwrap();
        match &list[0].first.commands[0] {
            Command::Case { arms, .. } => {
                assert_eq!(arms.len(), 2);
                assert_eq!(arms[0].patterns, vec!["a".to_string(), "b".to_string()]);
                assert_eq!(arms[0].end, CaseEnd::Break);
                assert_eq!(arms[1].patterns, vec!["*".to_string()]);
                assert_eq!(arms[1].end, CaseEnd::Break);
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_case_arm_terminators() {
        let list = parse_src("case $x in
  a) y=1 ;&
  b) y=2 ;;&
  c) y=3 ;;
  d) y=4
esac")
            .unwrap();
        match &list[0].first.commands[0] {
            Command::Case { arms, .. } => {
                let ends: Vec<CaseEnd> = arms.iter().map(|arm| arm.end).collect();
                assert_eq!(
                    ends,
                    vec![
                        CaseEnd::FallThrough,
                        CaseEnd::Continue,
                        CaseEnd::Break,
                        CaseEnd::Break
                    ]
                );
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_function_definition_forms() {
        let list = parse_src("prepare() {\n  cd x\n}\nfunction build { make; }\n").unwrap();
        assert!(matches!(&list[0].first.commands[0], Command::Function { name, .. } if name == "prepare"));
        assert!(matches!(&list[1].first.commands[0], Command::Function { name, .. } if name == "build"));
    }

    #[test]
    fn test_double_bracket_collects_operators() {
        let list = parse_src("[[ $a = x || $b = y ]] && z=1").unwrap();
        match &list[0].first.commands[0] {
            Command::Test { args, .. } => {
                assert_eq!(args.len(), 7);
                assert!(matches!(args[3], TestArg::Op("||")));
            }
            other => panic!("unexpected: {:?}", other),
        }
        assert_eq!(list[0].rest.len(), 1);
    }

    #[test]
    fn test_redirections_are_dropped() {
        let list = parse_src("echo hi > /dev/null 2>&1").unwrap();
        match &list[0].first.commands[0] {
            Command::Simple { items, .. } => assert_eq!(items.len(), 3),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_unbalanced_if_is_error() {
        match parse_src("x=1\nif true; then\n  y=2\n") {
            Err(Error::Manifest { line, message }) => {
                assert_eq!(line, 2);
                assert!(message.contains("if"));
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_stray_fi_is_error() {
        assert!(matches!(parse_src("x=1\nfi\n"), Err(Error::Manifest { line: 2, .. })));
    }

    #[test]
    fn test_unterminated_case_is_error() {
        assert!(parse_src("case x in\n a) y=1 ;;\n").is_err());
    }
}
