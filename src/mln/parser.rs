//! Parser for program, evidence and query text.
//!
//! Program lines are one of:
//! - a domain declaration `person = { Alice, Bob }`
//! - a predicate declaration `smokes(person)`, prefixed with `*` for closed world
//! - a soft rule `1.5 smokes(x) => cancer(x)`
//! - a hard rule `friends(x, y) => friends(y, x).`
//!
//! Formulas are literals joined by `v`/`|` (disjunction) or `,`/`^`/`&`
//! (conjunction), chained with right-associative `=>`. They are converted to
//! clausal form while parsing.

use std::path::Path;

use crate::error::ParseError;
use crate::symbol::{ConstantId, PredicateId, RuleId, TypeId};

use super::lexer::{tokenize, Token, TokenKind};
use super::{Literal, Program, Rule, Term, Variable, Weight};

/// Result type for parsing operations.
pub type ParseResult<T> = std::result::Result<T, ParseError>;

/// Truth value carried by an evidence line.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EvidenceTruth {
    True,
    False,
    /// Soft evidence: prior probability that the atom is true.
    Prior(f64),
}

/// One ground evidence atom.
#[derive(Debug, Clone, PartialEq)]
pub struct EvidenceFact {
    pub predicate: PredicateId,
    pub args: Vec<ConstantId>,
    pub truth: EvidenceTruth,
}

/// A query pattern: `None` slots range over the slot's type domain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuerySpec {
    pub predicate: PredicateId,
    pub args: Vec<Option<ConstantId>>,
}

/// Read a source file into a string.
pub fn read_source(path: &Path) -> ParseResult<String> {
    std::fs::read_to_string(path).map_err(|source| ParseError::Io {
        path: path.display().to_string(),
        source,
    })
}

/// Parse and merge several program files into one program.
pub fn load_program(paths: &[impl AsRef<Path>]) -> ParseResult<Program> {
    let mut program = Program::new();
    for path in paths {
        let path = path.as_ref();
        let text = read_source(path)?;
        parse_program(&mut program, &path.display().to_string(), &text)?;
    }
    tracing::info!(
        predicates = program.predicates.len(),
        rules = program.rules.len(),
        constants = program.constants.len(),
        "program loaded"
    );
    Ok(program)
}

/// Parse program text into `program`.
pub fn parse_program(program: &mut Program, source_name: &str, text: &str) -> ParseResult<()> {
    for (idx, line) in text.lines().enumerate() {
        let mut parser = LineParser::new(source_name, idx + 1, line)?;
        if parser.tokens.is_empty() {
            continue;
        }
        parser.program_line(program)?;
    }
    Ok(())
}

/// Parse evidence text. Constants are interned into the program's store.
pub fn parse_evidence(
    program: &Program,
    source_name: &str,
    text: &str,
) -> ParseResult<Vec<EvidenceFact>> {
    let mut facts = Vec::new();
    for (idx, line) in text.lines().enumerate() {
        let mut parser = LineParser::new(source_name, idx + 1, line)?;
        if parser.tokens.is_empty() {
            continue;
        }
        facts.push(parser.evidence_line(program)?);
    }
    Ok(facts)
}

/// Parse query atoms, one or more per line separated by top-level commas.
pub fn parse_queries(
    program: &Program,
    source_name: &str,
    text: &str,
) -> ParseResult<Vec<QuerySpec>> {
    let mut queries = Vec::new();
    for (idx, line) in text.lines().enumerate() {
        let mut parser = LineParser::new(source_name, idx + 1, line)?;
        while !parser.at_end() {
            queries.push(parser.query_atom(program)?);
            if !parser.at_end() {
                parser.expect(&TokenKind::Comma, "',' between query atoms")?;
            }
        }
    }
    Ok(queries)
}

// ---------------------------------------------------------------------------
// Line parser
// ---------------------------------------------------------------------------

/// An argument as written, before it is resolved against the predicate's types.
#[derive(Debug, Clone)]
enum RawArg {
    Var(String),
    Const(String),
}

/// How the literals of a group were joined.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Joiner {
    Single,
    Or,
    And,
}

struct LineParser<'a> {
    source_name: &'a str,
    line_no: usize,
    line: &'a str,
    tokens: Vec<Token>,
    pos: usize,
}

impl<'a> LineParser<'a> {
    fn new(source_name: &'a str, line_no: usize, line: &'a str) -> ParseResult<Self> {
        let tokens = tokenize(line).map_err(|(col, message)| ParseError::Syntax {
            source_name: source_name.to_string(),
            line: line_no,
            message: format!("column {}: {message}", col + 1),
        })?;
        Ok(Self {
            source_name,
            line_no,
            line,
            tokens,
            pos: 0,
        })
    }

    fn syntax(&self, message: impl Into<String>) -> ParseError {
        ParseError::Syntax {
            source_name: self.source_name.to_string(),
            line: self.line_no,
            message: message.into(),
        }
    }

    fn peek(&self) -> Option<&TokenKind> {
        self.tokens.get(self.pos).map(|t| &t.kind)
    }

    fn peek_at(&self, offset: usize) -> Option<&TokenKind> {
        self.tokens.get(self.pos + offset).map(|t| &t.kind)
    }

    fn at_end(&self) -> bool {
        self.pos >= self.tokens.len()
    }

    fn bump(&mut self) -> Option<Token> {
        let tok = self.tokens.get(self.pos).cloned();
        if tok.is_some() {
            self.pos += 1;
        }
        tok
    }

    fn eat(&mut self, kind: &TokenKind) -> bool {
        if self.peek() == Some(kind) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: &TokenKind, what: &str) -> ParseResult<()> {
        if self.eat(kind) {
            Ok(())
        } else {
            Err(self.syntax(format!("expected {what}, found {}", self.describe_next())))
        }
    }

    fn describe_next(&self) -> String {
        match self.tokens.get(self.pos) {
            Some(tok) => format!("`{}`", &self.line[tok.span.start..tok.span.end]),
            None => "end of line".to_string(),
        }
    }

    fn ident(&mut self, what: &str) -> ParseResult<String> {
        match self.peek() {
            Some(TokenKind::Ident(name)) => {
                let name = name.clone();
                self.pos += 1;
                Ok(name)
            }
            _ => Err(self.syntax(format!("expected {what}, found {}", self.describe_next()))),
        }
    }

    fn unknown_predicate(&self, name: &str) -> ParseError {
        ParseError::UnknownPredicate {
            source_name: self.source_name.to_string(),
            line: self.line_no,
            predicate: name.to_string(),
        }
    }

    fn check_arity(&self, program: &Program, pred: PredicateId, actual: usize) -> ParseResult<()> {
        let p = program.predicate(pred);
        if p.arity() != actual {
            return Err(ParseError::ArityMismatch {
                source_name: self.source_name.to_string(),
                line: self.line_no,
                predicate: p.name.clone(),
                expected: p.arity(),
                actual,
            });
        }
        Ok(())
    }

    // -- program lines ------------------------------------------------------

    fn program_line(&mut self, program: &mut Program) -> ParseResult<()> {
        let first = self.peek().cloned();
        let second = self.peek_at(1).cloned();
        let hard = self.tokens.last().map(|t| &t.kind) == Some(&TokenKind::Dot);
        match (first, second) {
            (Some(TokenKind::Star), _) => {
                self.bump();
                self.declaration(program, true)
            }
            (Some(TokenKind::Ident(_)), Some(TokenKind::Equals)) => self.domain(program),
            (Some(TokenKind::Number(weight)), _) => {
                self.bump();
                let text = self.rest_text();
                self.rule(program, Weight::Soft(weight), text)
            }
            _ if hard => {
                self.tokens.pop();
                let text = self.rest_text();
                self.rule(program, Weight::Hard, text)
            }
            (Some(TokenKind::Ident(name)), _) if program.predicate_id(&name).is_none() => {
                self.declaration(program, false)
            }
            _ => Err(self.syntax(
                "a rule needs a leading weight (soft) or a trailing '.' (hard)",
            )),
        }
    }

    /// Remaining source text from the current token, without comments.
    fn rest_text(&self) -> String {
        match (self.tokens.get(self.pos), self.tokens.last()) {
            (Some(first), Some(last)) => self.line[first.span.start..last.span.end].to_string(),
            _ => String::new(),
        }
    }

    fn declaration(&mut self, program: &mut Program, closed_world: bool) -> ParseResult<()> {
        let name = self.ident("predicate name")?;
        let mut arg_types = Vec::new();
        if self.eat(&TokenKind::LParen) {
            if !self.eat(&TokenKind::RParen) {
                loop {
                    let ty = self.ident("argument type")?;
                    arg_types.push(program.intern_type(&ty));
                    if self.eat(&TokenKind::RParen) {
                        break;
                    }
                    self.expect(&TokenKind::Comma, "',' or ')'")?;
                }
            }
        }
        if !self.at_end() {
            return Err(self.syntax(format!(
                "unexpected {} after predicate declaration",
                self.describe_next()
            )));
        }
        program
            .declare_predicate(&name, arg_types, closed_world)
            .ok_or_else(|| ParseError::DuplicatePredicate {
                source_name: self.source_name.to_string(),
                line: self.line_no,
                predicate: name.clone(),
            })?;
        Ok(())
    }

    fn domain(&mut self, program: &mut Program) -> ParseResult<()> {
        let ty_name = self.ident("type name")?;
        let ty = program.intern_type(&ty_name);
        self.expect(&TokenKind::Equals, "'='")?;
        self.expect(&TokenKind::LBrace, "'{'")?;
        if self.eat(&TokenKind::RBrace) {
            return Ok(());
        }
        loop {
            let label = match self.raw_arg()? {
                RawArg::Const(label) => label,
                RawArg::Var(v) => {
                    return Err(self.syntax(format!(
                        "domain members must be constants, `{v}` looks like a variable"
                    )))
                }
            };
            program.constants.intern(&label, ty);
            if self.eat(&TokenKind::RBrace) {
                break;
            }
            self.expect(&TokenKind::Comma, "',' or '}'")?;
        }
        Ok(())
    }

    fn rule(&mut self, program: &mut Program, weight: Weight, text: String) -> ParseResult<()> {
        let mut scope = Vec::new();
        let clauses = self.formula(program, &mut scope)?;
        if !self.at_end() {
            return Err(self.syntax(format!("unexpected {}", self.describe_next())));
        }
        let id = RuleId(program.rules.len() as u32);
        program.rules.push(Rule {
            id,
            weight,
            clauses,
            variables: scope,
            text,
        });
        Ok(())
    }

    /// Parse a formula into clausal form.
    fn formula(
        &mut self,
        program: &Program,
        scope: &mut Vec<Variable>,
    ) -> ParseResult<Vec<Vec<Literal>>> {
        let (lits, joiner) = self.group(program, scope)?;
        if self.eat(&TokenKind::Implies) {
            let rhs = self.formula(program, scope)?;
            // not(lhs) in clausal form.
            let negated: Vec<Vec<Literal>> = match joiner {
                Joiner::Single | Joiner::And => vec![lits.iter().map(Literal::negated).collect()],
                Joiner::Or => lits.iter().map(|l| vec![l.negated()]).collect(),
            };
            let mut clauses = Vec::with_capacity(negated.len() * rhs.len());
            for n in &negated {
                for r in &rhs {
                    let mut clause = n.clone();
                    clause.extend(r.iter().cloned());
                    clauses.push(clause);
                }
            }
            Ok(clauses)
        } else {
            Ok(match joiner {
                Joiner::Single | Joiner::Or => vec![lits],
                Joiner::And => lits.into_iter().map(|l| vec![l]).collect(),
            })
        }
    }

    /// Literals joined by a single kind of connective.
    fn group(
        &mut self,
        program: &Program,
        scope: &mut Vec<Variable>,
    ) -> ParseResult<(Vec<Literal>, Joiner)> {
        let mut lits = vec![self.literal(program, scope)?];
        let mut joiner = Joiner::Single;
        loop {
            let next = match self.peek() {
                Some(TokenKind::Or) => Joiner::Or,
                Some(TokenKind::Ident(v))
                    if v == "v" && self.peek_at(1) != Some(&TokenKind::LParen) =>
                {
                    Joiner::Or
                }
                Some(TokenKind::Comma) | Some(TokenKind::And) => Joiner::And,
                _ => break,
            };
            if joiner != Joiner::Single && joiner != next {
                return Err(self.syntax(
                    "cannot mix disjunction and conjunction without '=>'; split the formula",
                ));
            }
            joiner = next;
            self.bump();
            lits.push(self.literal(program, scope)?);
        }
        Ok((lits, joiner))
    }

    fn literal(&mut self, program: &Program, scope: &mut Vec<Variable>) -> ParseResult<Literal> {
        let mut positive = true;
        while self.eat(&TokenKind::Bang) {
            positive = !positive;
        }
        let (predicate, raw) = self.atom(program)?;
        let arg_types = program.predicate(predicate).arg_types.clone();
        let mut args = Vec::with_capacity(raw.len());
        for (arg, ty) in raw.into_iter().zip(arg_types) {
            args.push(match arg {
                RawArg::Const(label) => Term::Const(program.constants.intern(&label, ty)),
                RawArg::Var(name) => Term::Var(self.bind_variable(program, scope, &name, ty)?),
            });
        }
        Ok(Literal {
            predicate,
            args,
            positive,
        })
    }

    fn bind_variable(
        &self,
        program: &Program,
        scope: &mut Vec<Variable>,
        name: &str,
        ty: TypeId,
    ) -> ParseResult<u32> {
        if let Some(idx) = scope.iter().position(|v| v.name == name) {
            if scope[idx].ty != ty {
                return Err(self.syntax(format!(
                    "variable `{name}` used as both `{}` and `{}`",
                    program.type_name(scope[idx].ty),
                    program.type_name(ty)
                )));
            }
            return Ok(idx as u32);
        }
        scope.push(Variable {
            name: name.to_string(),
            ty,
        });
        Ok((scope.len() - 1) as u32)
    }

    /// `pred(arg, ...)` or a bare zero-arity `pred`.
    fn atom(&mut self, program: &Program) -> ParseResult<(PredicateId, Vec<RawArg>)> {
        let name = self.ident("predicate")?;
        let predicate = program
            .predicate_id(&name)
            .ok_or_else(|| self.unknown_predicate(&name))?;
        let mut args = Vec::new();
        if self.eat(&TokenKind::LParen) && !self.eat(&TokenKind::RParen) {
            loop {
                args.push(self.raw_arg()?);
                if self.eat(&TokenKind::RParen) {
                    break;
                }
                self.expect(&TokenKind::Comma, "',' or ')'")?;
            }
        }
        self.check_arity(program, predicate, args.len())?;
        Ok((predicate, args))
    }

    fn raw_arg(&mut self) -> ParseResult<RawArg> {
        let Some(tok) = self.bump() else {
            return Err(self.syntax("expected an argument, found end of line"));
        };
        match tok.kind {
            TokenKind::Ident(name) => {
                if name.chars().next().is_some_and(|c| c.is_lowercase()) {
                    Ok(RawArg::Var(name))
                } else {
                    Ok(RawArg::Const(name))
                }
            }
            TokenKind::Quoted(text) => Ok(RawArg::Const(text)),
            TokenKind::Number(_) => Ok(RawArg::Const(
                self.line[tok.span.start..tok.span.end].to_string(),
            )),
            _ => {
                self.pos -= 1;
                Err(self.syntax(format!(
                    "expected an argument, found {}",
                    self.describe_next()
                )))
            }
        }
    }

    // -- evidence and queries ----------------------------------------------

    fn evidence_line(&mut self, program: &Program) -> ParseResult<EvidenceFact> {
        let prior = match self.peek() {
            Some(TokenKind::Number(p)) => {
                let p = *p;
                self.bump();
                if !(0.0..=1.0).contains(&p) {
                    return Err(self.syntax(format!("evidence probability {p} is outside [0, 1]")));
                }
                Some(p)
            }
            _ => None,
        };
        let mut positive = true;
        while self.eat(&TokenKind::Bang) {
            positive = !positive;
        }
        let (predicate, raw) = self.atom(program)?;
        let args = self.ground_args(program, predicate, raw)?;
        // Tolerate a trailing period.
        self.eat(&TokenKind::Dot);
        if !self.at_end() {
            return Err(self.syntax(format!("unexpected {} after evidence atom", self.describe_next())));
        }
        let truth = match (prior, positive) {
            (Some(p), true) => EvidenceTruth::Prior(p),
            (Some(p), false) => EvidenceTruth::Prior(1.0 - p),
            (None, true) => EvidenceTruth::True,
            (None, false) => EvidenceTruth::False,
        };
        Ok(EvidenceFact {
            predicate,
            args,
            truth,
        })
    }

    fn ground_args(
        &self,
        program: &Program,
        predicate: PredicateId,
        raw: Vec<RawArg>,
    ) -> ParseResult<Vec<ConstantId>> {
        let arg_types = &program.predicate(predicate).arg_types;
        raw.into_iter()
            .zip(arg_types)
            .map(|(arg, &ty)| match arg {
                RawArg::Const(label) => Ok(program.constants.intern(&label, ty)),
                RawArg::Var(variable) => Err(ParseError::VariableInEvidence {
                    source_name: self.source_name.to_string(),
                    line: self.line_no,
                    variable,
                }),
            })
            .collect()
    }

    fn query_atom(&mut self, program: &Program) -> ParseResult<QuerySpec> {
        let name = self.ident("query predicate")?;
        let predicate = program
            .predicate_id(&name)
            .ok_or_else(|| self.unknown_predicate(&name))?;
        let arity = program.predicate(predicate).arity();
        let has_args = self.peek() == Some(&TokenKind::LParen);
        if !has_args {
            return Ok(QuerySpec {
                predicate,
                args: vec![None; arity],
            });
        }
        self.pos -= 1;
        let (predicate, raw) = self.atom(program)?;
        let arg_types = program.predicate(predicate).arg_types.clone();
        let args = raw
            .into_iter()
            .zip(arg_types)
            .map(|(arg, ty)| match arg {
                RawArg::Const(label) => Some(program.constants.intern(&label, ty)),
                RawArg::Var(_) => None,
            })
            .collect();
        Ok(QuerySpec { predicate, args })
    }
}
