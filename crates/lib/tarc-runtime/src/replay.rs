//! Replay of scripted runtime calls.
//!
//! A replay script issues the same calls that generated code would, one
//! statement per line, and binds results to named roots:
//!
//! ```text
//! let a = Arrmake 3 0     # boxed array of three zeros
//! let b = [1, 2, 3]       # flat literal; `{..}` is a boxed literal
//! set a 0 b               # a[0] := b
//! write get a 0           # prints [1, 2, 3]
//! write rc b              # prints 2
//! drop b
//! ```
//!
//! Expressions: an integer, a name, `arrmake n v`, `Arrmake n v`, `[..]`,
//! `{..}`, `get x i`, `len x` (or `arrlen x`), `rc x` and `read`. Literal
//! elements are integers, names or nested literals.
//!
//! Each name owns one reference through a [`Root`]. Rebinding a name binds the
//! new value before the old one is released, and a value that is written but
//! never bound is released right after it is printed.

use std::{
    collections::HashMap,
    io::{BufRead, Write},
    path::{Path, PathBuf},
};

use chumsky::prelude::*;

use crate::{
    Config, LeakCheck, intrinsics,
    runtime::{
        ErrorKind, RuntimeError,
        rooted::{Root, SharedHeap, new_shared_heap},
    },
    utils::{
        error::{ReportableError, SimpleError},
        metadata::{Location, Span},
    },
    value::Value,
};

const KEYWORDS: [&str; 11] = [
    "let", "set", "drop", "write", "arrmake", "Arrmake", "get", "len", "arrlen", "rc", "read",
];

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Int(i64),
    Sym(char),
}

#[derive(Debug, Clone)]
struct Lexeme {
    token: Token,
    span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub enum OperandKind {
    Int(i64),
    Name(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Operand {
    pub kind: OperandKind,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Elem {
    Operand(Operand),
    Literal {
        boxed: bool,
        elems: Vec<Elem>,
        span: Span,
    },
}

impl Elem {
    fn span(&self) -> &Span {
        match self {
            Elem::Operand(op) => &op.span,
            Elem::Literal { span, .. } => span,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Operand(Operand),
    Make {
        boxed: bool,
        len: Operand,
        init: Operand,
    },
    Literal {
        boxed: bool,
        elems: Vec<Elem>,
    },
    Get {
        array: Operand,
        index: Operand,
    },
    Len(Operand),
    Rc(Operand),
    Read,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Let {
        name: String,
        expr: Expr,
    },
    Set {
        array: Operand,
        index: Operand,
        value: Elem,
    },
    Drop {
        name: String,
        span: Span,
    },
    Write(Expr),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub command: Command,
    pub span: Span,
}

type LexerError<'src> = extra::Err<Rich<'src, char, SimpleSpan>>;

fn tokenizer<'src>() -> impl Parser<'src, &'src str, Token, LexerError<'src>> + Clone {
    let int = just('-')
        .or_not()
        .then(text::int::<&'src str, LexerError<'src>>(10))
        .to_slice()
        .validate(|s: &'src str, e, emitter| match s.parse() {
            Ok(n) => Token::Int(n),
            Err(_) => {
                emitter.emit(Rich::custom(
                    e.span(),
                    format!("integer literal {s} does not fit in 64 bits"),
                ));
                Token::Int(0)
            }
        });
    let ident = text::ascii::ident().map(|s: &'src str| Token::Ident(s.to_string()));
    let sym = one_of("=[]{},").map(Token::Sym);

    choice((int, ident, sym))
}

fn lexer<'src>() -> impl Parser<'src, &'src str, Vec<(Token, SimpleSpan)>, LexerError<'src>> + Clone
{
    let comment = just('#').then(any().repeated()).ignored();

    text::inline_whitespace()
        .ignore_then(
            tokenizer()
                .map_with(|t, e| (t, e.span()))
                .then_ignore(text::inline_whitespace())
                .repeated()
                .collect::<Vec<_>>(),
        )
        .then_ignore(comment.or_not())
        .then_ignore(end())
}

/// Tokens of one line, with spans shifted by the line's offset in the script.
fn tokenize(line: &str, offset: usize, path: &Path) -> Result<Vec<Lexeme>, SimpleError> {
    let shift = |span: SimpleSpan| offset + span.start..offset + span.end;
    match lexer().parse(line).into_result() {
        Ok(tokens) => Ok(tokens
            .into_iter()
            .map(|(token, span)| Lexeme {
                token,
                span: shift(span),
            })
            .collect()),
        Err(errs) => {
            let (message, span) = errs.first().map_or_else(
                || ("malformed line".to_string(), offset..offset + line.len()),
                |e| (e.reason().to_string(), shift(*e.span())),
            );
            Err(SimpleError {
                message,
                span: Location::new(span, path.to_path_buf()),
            })
        }
    }
}

struct LineParser<'a> {
    tokens: Vec<Lexeme>,
    pos: usize,
    end: usize,
    path: &'a Path,
}

impl LineParser<'_> {
    fn error(&self, message: impl Into<String>, span: Span) -> SimpleError {
        SimpleError {
            message: message.into(),
            span: Location::new(span, self.path.to_path_buf()),
        }
    }

    fn peek(&self) -> Option<&Lexeme> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self, what: &str) -> Result<Lexeme, SimpleError> {
        match self.tokens.get(self.pos) {
            Some(lexeme) => {
                self.pos += 1;
                Ok(lexeme.clone())
            }
            None => Err(self.error(format!("expected {what}"), self.end..self.end)),
        }
    }

    fn expect_sym(&mut self, sym: char) -> Result<(), SimpleError> {
        let lexeme = self.next(&format!("`{sym}`"))?;
        match lexeme.token {
            Token::Sym(c) if c == sym => Ok(()),
            _ => Err(self.error(format!("expected `{sym}`"), lexeme.span)),
        }
    }

    fn name(&mut self) -> Result<(String, Span), SimpleError> {
        let lexeme = self.next("a name")?;
        match lexeme.token {
            Token::Ident(name) if KEYWORDS.contains(&name.as_str()) => Err(self.error(
                format!("`{name}` is a reserved word"),
                lexeme.span,
            )),
            Token::Ident(name) => Ok((name, lexeme.span)),
            _ => Err(self.error("expected a name", lexeme.span)),
        }
    }

    fn operand(&mut self) -> Result<Operand, SimpleError> {
        let lexeme = self.next("an integer or a name")?;
        let kind = match lexeme.token {
            Token::Int(i) => OperandKind::Int(i),
            Token::Ident(name) if !KEYWORDS.contains(&name.as_str()) => OperandKind::Name(name),
            _ => return Err(self.error("expected an integer or a name", lexeme.span)),
        };
        Ok(Operand {
            kind,
            span: lexeme.span,
        })
    }

    fn elem(&mut self) -> Result<Elem, SimpleError> {
        match self.peek().cloned() {
            Some(Lexeme {
                token: Token::Sym(open @ ('[' | '{')),
                span,
            }) => {
                self.pos += 1;
                let boxed = open == '{';
                let elems = self.literal(if boxed { '}' } else { ']' })?;
                let end = self.tokens[self.pos - 1].span.end;
                Ok(Elem::Literal {
                    boxed,
                    elems,
                    span: span.start..end,
                })
            }
            _ => self.operand().map(Elem::Operand),
        }
    }

    fn literal(&mut self, close: char) -> Result<Vec<Elem>, SimpleError> {
        let mut elems = vec![];
        if matches!(self.peek(), Some(Lexeme { token: Token::Sym(c), .. }) if *c == close) {
            self.pos += 1;
            return Ok(elems);
        }
        loop {
            elems.push(self.elem()?);
            let lexeme = self.next(&format!("`,` or `{close}`"))?;
            match lexeme.token {
                Token::Sym(',') => continue,
                Token::Sym(c) if c == close => return Ok(elems),
                _ => return Err(self.error(format!("expected `,` or `{close}`"), lexeme.span)),
            }
        }
    }

    fn expr(&mut self) -> Result<Expr, SimpleError> {
        let Some(head) = self.peek().cloned() else {
            return Err(self.error("expected an expression", self.end..self.end));
        };
        let expr = match &head.token {
            Token::Sym('[') | Token::Sym('{') => {
                self.pos += 1;
                let boxed = head.token == Token::Sym('{');
                let elems = self.literal(if boxed { '}' } else { ']' })?;
                Expr::Literal { boxed, elems }
            }
            Token::Ident(kw) if kw == "arrmake" || kw == "Arrmake" => {
                self.pos += 1;
                let len = self.operand()?;
                let init = self.operand()?;
                Expr::Make {
                    boxed: kw == "Arrmake",
                    len,
                    init,
                }
            }
            Token::Ident(kw) if kw == "get" => {
                self.pos += 1;
                let array = self.operand()?;
                let index = self.operand()?;
                Expr::Get { array, index }
            }
            Token::Ident(kw) if kw == "len" || kw == "arrlen" => {
                self.pos += 1;
                Expr::Len(self.operand()?)
            }
            Token::Ident(kw) if kw == "rc" => {
                self.pos += 1;
                Expr::Rc(self.operand()?)
            }
            Token::Ident(kw) if kw == "read" => {
                self.pos += 1;
                Expr::Read
            }
            _ => Expr::Operand(self.operand()?),
        };
        Ok(expr)
    }

    fn statement(&mut self) -> Result<Command, SimpleError> {
        let head = self.next("a statement")?;
        let command = match head.token {
            Token::Ident(kw) if kw == "let" => {
                let (name, _) = self.name()?;
                self.expect_sym('=')?;
                let expr = self.expr()?;
                Command::Let { name, expr }
            }
            Token::Ident(kw) if kw == "set" => Command::Set {
                array: self.operand()?,
                index: self.operand()?,
                value: self.elem()?,
            },
            Token::Ident(kw) if kw == "drop" => {
                let (name, span) = self.name()?;
                Command::Drop { name, span }
            }
            Token::Ident(kw) if kw == "write" => Command::Write(self.expr()?),
            _ => {
                return Err(self.error(
                    "expected `let`, `set`, `drop` or `write`",
                    head.span,
                ));
            }
        };
        if let Some(extra) = self.peek() {
            return Err(self.error("unexpected token after statement", extra.span.clone()));
        }
        Ok(command)
    }
}

/// Parse a whole script, collecting the errors of every malformed line.
pub fn parse(src: &str, path: &Path) -> Result<Vec<Statement>, Vec<SimpleError>> {
    let mut stmts = vec![];
    let mut errs = vec![];
    let mut offset = 0;
    for raw_line in src.split_inclusive('\n') {
        let line = raw_line.trim_end_matches(['\n', '\r']);
        let line_offset = offset;
        offset += raw_line.len();
        let tokens = match tokenize(line, line_offset, path) {
            Ok(tokens) if tokens.is_empty() => continue,
            Ok(tokens) => tokens,
            Err(e) => {
                errs.push(e);
                continue;
            }
        };
        let span = tokens[0].span.start..tokens[tokens.len() - 1].span.end;
        let mut parser = LineParser {
            tokens,
            pos: 0,
            end: line_offset + line.len(),
            path,
        };
        match parser.statement() {
            Ok(command) => stmts.push(Statement { command, span }),
            Err(e) => errs.push(e),
        }
    }
    if errs.is_empty() { Ok(stmts) } else { Err(errs) }
}

/// Outcome of a successful replay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReplaySummary {
    pub statements: usize,
    /// Array objects still alive after every root was dropped.
    pub leaked: usize,
}

type ReplayError = Box<dyn ReportableError>;

struct Interpreter<'io> {
    heap: SharedHeap,
    env: HashMap<String, Root>,
    input: &'io mut dyn BufRead,
    output: &'io mut dyn Write,
    path: PathBuf,
}

impl Interpreter<'_> {
    fn simple(&self, message: String, span: &Span) -> ReplayError {
        Box::new(SimpleError {
            message,
            span: Location::new(span.clone(), self.path.clone()),
        })
    }

    fn runtime(&self, kind: ErrorKind, span: &Span) -> ReplayError {
        Box::new(RuntimeError(
            kind,
            Location::new(span.clone(), self.path.clone()),
        ))
    }

    fn operand(&self, op: &Operand) -> Result<Value, ReplayError> {
        match &op.kind {
            OperandKind::Int(i) => Ok(Value::Int(*i)),
            OperandKind::Name(name) => self
                .env
                .get(name)
                .map(Root::value)
                .ok_or_else(|| self.simple(format!("unbound name `{name}`"), &op.span)),
        }
    }

    fn int_operand(&self, op: &Operand) -> Result<i64, ReplayError> {
        self.operand(op)?
            .as_int()
            .ok_or_else(|| self.simple("expected an integer, found an array".to_string(), &op.span))
    }

    /// Build a literal array. Nested literals that were already built are
    /// released again if a later element fails.
    fn literal(&self, boxed: bool, elems: &[Elem], span: &Span) -> Result<Value, ReplayError> {
        let mut values = Vec::with_capacity(elems.len());
        let mut temps = vec![];
        for elem in elems {
            let v = match elem {
                Elem::Operand(op) => self.operand(op),
                Elem::Literal {
                    boxed,
                    elems,
                    span,
                } => self.literal(*boxed, elems, span).inspect(|v| temps.push(*v)),
            };
            let v = v.and_then(|v| match v {
                Value::Array(_) if !boxed => {
                    Err(self.runtime(ErrorKind::FlatArrayRef, elem.span()))
                }
                _ => Ok(v),
            });
            match v {
                Ok(v) => values.push(v),
                Err(e) => {
                    let mut heap = self.heap.borrow_mut();
                    for t in temps {
                        if let Err(e) = heap.release(t) {
                            log::warn!("replay: {e}");
                        }
                    }
                    return Err(e);
                }
            }
        }
        let mut heap = self.heap.borrow_mut();
        if boxed {
            let res = heap.make_boxed_from(values);
            drop(heap);
            res.map(Value::Array).map_err(|e| self.runtime(e, span))
        } else {
            let ints = values.into_iter().filter_map(Value::as_int).collect();
            Ok(Value::Array(heap.make_from_ints(ints)))
        }
    }

    fn elem(&self, elem: &Elem) -> Result<Value, ReplayError> {
        match elem {
            Elem::Operand(op) => self.operand(op),
            Elem::Literal { boxed, elems, span } => self.literal(*boxed, elems, span),
        }
    }

    fn eval(&mut self, expr: &Expr, span: &Span) -> Result<Value, ReplayError> {
        match expr {
            Expr::Operand(op) => self.operand(op),
            Expr::Make { boxed, len, init } => {
                let n = self.int_operand(len)?;
                let init_v = self.operand(init)?;
                let mut heap = self.heap.borrow_mut();
                let res = if *boxed {
                    heap.make_boxed(n, init_v)
                } else {
                    heap.make(n, init_v)
                };
                drop(heap);
                res.map(Value::Array).map_err(|e| self.runtime(e, span))
            }
            Expr::Literal { boxed, elems } => self.literal(*boxed, elems, span),
            Expr::Get { array, index } => {
                let a = self.operand(array)?;
                let i = self.int_operand(index)?;
                let res = self.heap.borrow().get(a, i);
                res.map_err(|e| self.runtime(e, span))
            }
            Expr::Len(array) => {
                let a = self.operand(array)?;
                let res = self.heap.borrow().len(a);
                res.map(|n| Value::Int(n as i64))
                    .map_err(|e| self.runtime(e, span))
            }
            Expr::Rc(array) => {
                let res = match self.operand(array)? {
                    Value::Array(r) => self.heap.borrow().refcount(r),
                    Value::Int(i) => Err(ErrorKind::NotAnArray(i)),
                };
                res.map(|n| Value::Int(n as i64))
                    .map_err(|e| self.runtime(e, &array.span))
            }
            Expr::Read => intrinsics::read(&mut self.input, &mut std::io::sink())
                .map(Value::Int)
                .map_err(|e| self.simple(e.to_string(), span)),
        }
    }

    fn exec(&mut self, stmt: &Statement) -> Result<(), ReplayError> {
        log::debug!("replay: {:?}", stmt.command);
        let span = &stmt.span;
        match &stmt.command {
            Command::Let { name, expr } => {
                let v = self.eval(expr, span)?;
                let root = Root::bind(&self.heap, v).map_err(|e| self.runtime(e, span))?;
                // the previous binding is released only after the new one holds its value
                drop(self.env.insert(name.clone(), root));
            }
            Command::Set {
                array,
                index,
                value,
            } => {
                let a = self.operand(array)?;
                let i = self.int_operand(index)?;
                let v = self.elem(value)?;
                // a literal value is only owned by the container after the store
                let tmp = Root::bind(&self.heap, v).map_err(|e| self.runtime(e, span))?;
                let res = self.heap.borrow_mut().set(a, i, v);
                drop(tmp);
                res.map_err(|e| self.runtime(e, span))?;
            }
            Command::Drop { name, span } => {
                let root = self
                    .env
                    .remove(name)
                    .ok_or_else(|| self.simple(format!("unbound name `{name}`"), span))?;
                drop(root);
            }
            Command::Write(expr) => {
                let v = self.eval(expr, span)?;
                let tmp = Root::bind(&self.heap, v).map_err(|e| self.runtime(e, span))?;
                let res = match v {
                    Value::Int(i) => intrinsics::write(&mut self.output, i),
                    Value::Array(_) => {
                        let text = self.heap.borrow().render(v);
                        writeln!(self.output, "{text}").map_err(intrinsics::Error::from)
                    }
                };
                drop(tmp);
                res.map_err(|e| self.simple(format!("failed to write output: {e}"), span))?;
            }
        }
        Ok(())
    }
}

/// Parse and execute `src`, printing `write` results to `output`.
pub fn run_source<'io>(
    src: &str,
    path: PathBuf,
    config: Config,
    input: &'io mut dyn BufRead,
    output: &'io mut dyn Write,
) -> Result<ReplaySummary, Vec<ReplayError>> {
    let stmts = parse(src, &path).map_err(|errs| {
        errs.into_iter()
            .map(|e| Box::new(e) as ReplayError)
            .collect::<Vec<_>>()
    })?;
    let heap = new_shared_heap();
    let mut interp = Interpreter {
        heap: heap.clone(),
        env: HashMap::new(),
        input,
        output,
        path: path.clone(),
    };
    for stmt in &stmts {
        interp.exec(stmt).map_err(|e| vec![e])?;
    }
    drop(interp);

    let leaked = heap.borrow().live_count();
    if leaked > 0 {
        match config.leak_check {
            LeakCheck::Ignore => {}
            LeakCheck::Warn => log::warn!("{leaked} array objects leaked"),
            LeakCheck::Error => {
                return Err(vec![Box::new(SimpleError {
                    message: format!(
                        "{leaked} array objects are still alive after every root was dropped"
                    ),
                    span: Location::new(0..0, path),
                })]);
            }
        }
    }
    Ok(ReplaySummary {
        statements: stmts.len(),
        leaked,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(src: &str) -> Result<(String, ReplaySummary), Vec<ReplayError>> {
        let mut out = vec![];
        let summary = run_source(
            src,
            PathBuf::from("test.tarc"),
            Config::default(),
            &mut &b""[..],
            &mut out,
        )?;
        Ok((String::from_utf8(out).unwrap(), summary))
    }

    #[test]
    fn parse_statements() {
        let stmts = parse("let a = Arrmake 2 0 # comment\n\nset a 1 -4\n", Path::new("t")).unwrap();
        assert_eq!(stmts.len(), 2);
        assert_eq!(stmts[0].span, 0..19);
        assert_eq!(
            stmts[1].command,
            Command::Set {
                array: Operand {
                    kind: OperandKind::Name("a".to_string()),
                    span: 35..36,
                },
                index: Operand {
                    kind: OperandKind::Int(1),
                    span: 37..38,
                },
                value: Elem::Operand(Operand {
                    kind: OperandKind::Int(-4),
                    span: 39..41,
                }),
            }
        );
    }

    #[test]
    fn parse_errors_are_collected_per_line() {
        let errs = parse("let = 1\nwrite [1, 2\nfrobnicate\nwrite 1 2", Path::new("t")).unwrap_err();
        assert_eq!(errs.len(), 4);
        assert_eq!(errs[0].span.span, 4..5);
        assert_eq!(errs[1].message, "expected `,` or `]`");
    }

    #[test]
    fn lexer_errors_point_at_the_offending_text() {
        let errs = parse(
            "write 1\nlet a = 99999999999999999999\nwrite $",
            Path::new("t"),
        )
        .unwrap_err();
        assert_eq!(errs.len(), 2);
        assert_eq!(errs[0].span.span, 16..36);
        assert!(errs[0].message.contains("does not fit in 64 bits"));
        assert_eq!(errs[1].span.span.start, 43);
    }

    #[test]
    fn huge_length_is_a_runtime_error() {
        let errs = run("let a = arrmake 9223372036854775807 0").unwrap_err();
        assert_eq!(errs.len(), 1);
        let (_, msg) = errs[0].get_labels().remove(0);
        assert_eq!(
            msg,
            ErrorKind::AllocationFailed {
                len: i64::MAX as usize
            }
            .to_string()
        );
    }

    #[test]
    fn nested_scenario() {
        let (out, summary) = run("let a = Arrmake 3 0
write rc a
let b = arrmake 2 7
set a 0 b
write rc b
write get a 0
set a 0 5
write a
drop a
")
        .unwrap();
        assert_eq!(out, "1\n2\n[7, 7]\n{5, 0, 0}\n");
        assert_eq!(summary.leaked, 0);
    }

    #[test]
    fn rebinding_keeps_value_alive() {
        let (out, summary) = run("let a = {[1, 2], 3}
let a = get a 0
write a
write rc a
")
        .unwrap();
        assert_eq!(out, "[1, 2]\n1\n");
        assert_eq!(summary.leaked, 0);
    }

    #[test]
    fn unbound_temporaries_are_freed() {
        let (out, summary) = run("let x = [4]
write Arrmake 2 x
write rc x
write {x, {[1], 2}}
write rc x
")
        .unwrap();
        assert_eq!(out, "{[4], [4]}\n1\n{[4], {[1], 2}}\n1\n");
        assert_eq!(summary.leaked, 0);
    }

    #[test]
    fn runtime_errors_carry_location() {
        let errs = run("let a = [1, 2]\nlet b = {a}\nset a 0 b\n").unwrap_err();
        assert_eq!(errs.len(), 1);
        let labels = errs[0].get_labels();
        assert_eq!(labels[0].0.span, 27..36);
        assert_eq!(labels[0].1, ErrorKind::FlatArrayRef.to_string());
    }

    #[test]
    fn unbound_name() {
        let errs = run("write get x 0").unwrap_err();
        assert_eq!(errs[0].get_message(), "unbound name `x`");
    }

    #[test]
    fn leak_check_error() {
        let src = "let a = {0}\nset a 0 a\n";
        let mut out = vec![];
        let config = Config {
            leak_check: LeakCheck::Error,
        };
        let res = run_source(src, PathBuf::from("t"), config, &mut &b""[..], &mut out);
        assert!(res.is_err());
        assert_eq!(run(src).unwrap().1.leaked, 1);
    }

    #[test]
    fn read_from_input() {
        let mut out = vec![];
        let summary = run_source(
            "let n = read\nlet a = arrmake n 1\nwrite len a\n",
            PathBuf::from("t"),
            Config::default(),
            &mut &b"4\n"[..],
            &mut out,
        )
        .unwrap();
        assert_eq!(out, b"4\n");
        assert_eq!(summary.statements, 3);
    }
}
