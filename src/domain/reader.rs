//! Minimal reader for Lisp source text
//!
//! Reads just enough of the surface syntax to locate and decode `ns` forms:
//! lists, vectors, maps, sets, symbols, keywords, strings and metadata.
//! Everything else (numbers, characters, regexes, tagged literals) is kept as
//! opaque atoms. Reader conditionals (`#?` and `#?@`) are resolved against a
//! configurable feature set.

use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum ReadError {
    #[error("Unexpected end of input at line {line} (unclosed {open})")]
    UnexpectedEof { line: usize, open: char },

    #[error("Unmatched '{ch}' at line {line}")]
    Unmatched { ch: char, line: usize },

    #[error("Unterminated string starting at line {line}")]
    UnterminatedString { line: usize },

    #[error("Invalid reader syntax at line {line}: {reason}")]
    Invalid { line: usize, reason: String },
}

/// A form produced by the reader
#[derive(Debug, Clone, PartialEq)]
pub enum Form {
    List(Vec<Form>),
    Vector(Vec<Form>),
    Map(Vec<Form>),
    Set(Vec<Form>),
    Symbol(String),
    Keyword(String),
    Str(String),
    /// Numbers, characters, regexes and other literals the ns reader ignores
    Atom(String),
    /// A form carrying `^` metadata
    WithMeta { meta: Box<Form>, form: Box<Form> },
}

impl Form {
    /// Strips metadata wrappers
    pub fn bare(&self) -> &Form {
        match self {
            Form::WithMeta { form, .. } => form.bare(),
            other => other,
        }
    }

    pub fn as_symbol(&self) -> Option<&str> {
        match self.bare() {
            Form::Symbol(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_keyword(&self) -> Option<&str> {
        match self.bare() {
            Form::Keyword(k) => Some(k),
            _ => None,
        }
    }

    /// Elements of a list or vector
    pub fn as_seq(&self) -> Option<&[Form]> {
        match self.bare() {
            Form::List(items) | Form::Vector(items) => Some(items),
            _ => None,
        }
    }

    /// Collects every metadata map attached to this form, outermost first
    pub fn metadata(&self) -> Vec<&Form> {
        let mut out = Vec::new();
        let mut current = self;
        while let Form::WithMeta { meta, form } = current {
            out.push(meta.as_ref());
            current = form;
        }
        out
    }
}

/// Options controlling how reader conditionals are resolved
#[derive(Debug, Clone)]
pub struct ReadOptions {
    /// Platform feature keywords, without the leading colon (e.g. `cljr`)
    pub features: Vec<String>,
}

impl Default for ReadOptions {
    fn default() -> Self {
        Self {
            features: vec!["cljr".to_string()],
        }
    }
}

impl ReadOptions {
    fn selects(&self, feature: &str) -> bool {
        feature == "default" || self.features.iter().any(|f| f == feature)
    }
}

/// Result of reading one element: a form, a spliced sequence, or nothing
enum Read {
    Form(Form),
    Splice(Vec<Form>),
    Skip,
}

/// Streaming reader over source text
pub struct Reader<'a> {
    chars: Vec<char>,
    pos: usize,
    line: usize,
    opts: &'a ReadOptions,
}

impl<'a> Reader<'a> {
    pub fn new(source: &str, opts: &'a ReadOptions) -> Self {
        Self {
            chars: source.chars().collect(),
            pos: 0,
            line: 1,
            opts,
        }
    }

    /// Current line (1-based)
    pub fn line(&self) -> usize {
        self.line
    }

    /// Reads the next top-level form, or `None` at end of input
    pub fn next_form(&mut self) -> Result<Option<Form>, ReadError> {
        loop {
            self.skip_whitespace();
            if self.peek().is_none() {
                return Ok(None);
            }
            match self.read_one()? {
                Read::Form(form) => return Ok(Some(form)),
                // Top-level splices are not valid Clojure; take the first element
                Read::Splice(mut forms) if !forms.is_empty() => return Ok(Some(forms.remove(0))),
                Read::Splice(_) | Read::Skip => continue,
            }
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.chars.get(self.pos).copied()?;
        self.pos += 1;
        if c == '\n' {
            self.line += 1;
        }
        Some(c)
    }

    fn skip_whitespace(&mut self) {
        while let Some(c) = self.peek() {
            if c.is_whitespace() || c == ',' {
                self.bump();
            } else if c == ';' {
                while let Some(c) = self.bump() {
                    if c == '\n' {
                        break;
                    }
                }
            } else {
                break;
            }
        }
    }

    fn invalid(&self, reason: impl Into<String>) -> ReadError {
        ReadError::Invalid {
            line: self.line,
            reason: reason.into(),
        }
    }

    /// Reads the next form where one is required (after `'`, `^`, `#_`, ...)
    fn read_required(&mut self, what: &str) -> Result<Form, ReadError> {
        loop {
            self.skip_whitespace();
            if self.peek().is_none() {
                return Err(self.invalid(format!("expected a form after {}", what)));
            }
            match self.read_one()? {
                Read::Form(form) => return Ok(form),
                Read::Splice(mut forms) if !forms.is_empty() => return Ok(forms.remove(0)),
                Read::Splice(_) | Read::Skip => continue,
            }
        }
    }

    fn read_one(&mut self) -> Result<Read, ReadError> {
        let line = self.line;
        let c = match self.peek() {
            Some(c) => c,
            None => return Err(self.invalid("unexpected end of input")),
        };

        match c {
            '(' => {
                self.bump();
                Ok(Read::Form(Form::List(self.read_delimited(')', '(')?)))
            }
            '[' => {
                self.bump();
                Ok(Read::Form(Form::Vector(self.read_delimited(']', '[')?)))
            }
            '{' => {
                self.bump();
                Ok(Read::Form(Form::Map(self.read_delimited('}', '{')?)))
            }
            ')' | ']' | '}' => Err(ReadError::Unmatched { ch: c, line }),
            '"' => {
                self.bump();
                Ok(Read::Form(Form::Str(self.read_string(line)?)))
            }
            '\'' | '`' | '@' => {
                self.bump();
                let head = match c {
                    '\'' => "quote",
                    '`' => "syntax-quote",
                    _ => "deref",
                };
                let inner = self.read_required(&c.to_string())?;
                Ok(Read::Form(Form::List(vec![Form::Symbol(head.to_string()), inner])))
            }
            '~' => {
                self.bump();
                let head = if self.peek() == Some('@') {
                    self.bump();
                    "unquote-splicing"
                } else {
                    "unquote"
                };
                let inner = self.read_required("~")?;
                Ok(Read::Form(Form::List(vec![Form::Symbol(head.to_string()), inner])))
            }
            '^' => {
                self.bump();
                let meta = self.read_required("^")?;
                let meta = match meta {
                    Form::Keyword(k) => Form::Map(vec![Form::Keyword(k), Form::Atom("true".to_string())]),
                    Form::Symbol(s) => Form::Map(vec![Form::Keyword("tag".to_string()), Form::Symbol(s)]),
                    Form::Str(s) => Form::Map(vec![Form::Keyword("tag".to_string()), Form::Str(s)]),
                    other => other,
                };
                let form = self.read_required("metadata")?;
                Ok(Read::Form(Form::WithMeta {
                    meta: Box::new(meta),
                    form: Box::new(form),
                }))
            }
            '\\' => {
                self.bump();
                let mut text = String::from("\\");
                if let Some(first) = self.bump() {
                    text.push(first);
                }
                while let Some(c) = self.peek() {
                    if is_terminator(c) {
                        break;
                    }
                    text.push(c);
                    self.bump();
                }
                Ok(Read::Form(Form::Atom(text)))
            }
            '#' => self.read_dispatch(line),
            _ => Ok(Read::Form(self.read_token())),
        }
    }

    fn read_dispatch(&mut self, line: usize) -> Result<Read, ReadError> {
        self.bump();
        match self.peek() {
            Some('_') => {
                self.bump();
                self.read_required("#_")?;
                Ok(Read::Skip)
            }
            Some('{') => {
                self.bump();
                Ok(Read::Form(Form::Set(self.read_delimited('}', '{')?)))
            }
            Some('(') => {
                self.bump();
                Ok(Read::Form(Form::List(self.read_delimited(')', '(')?)))
            }
            Some('"') => {
                self.bump();
                Ok(Read::Form(Form::Atom(self.read_string(line)?)))
            }
            Some('\'') => {
                self.bump();
                let inner = self.read_required("#'")?;
                Ok(Read::Form(Form::List(vec![Form::Symbol("var".to_string()), inner])))
            }
            Some('?') => {
                self.bump();
                let splicing = if self.peek() == Some('@') {
                    self.bump();
                    true
                } else {
                    false
                };
                self.read_conditional(splicing)
            }
            Some('#') => {
                // Symbolic values such as ##Inf
                self.bump();
                Ok(Read::Form(Form::Atom(format!("##{}", self.read_token_text()))))
            }
            Some(':') => {
                // Namespaced map literal #:ns{...}
                let _prefix = self.read_token_text();
                self.read_required("#:")?;
                Ok(Read::Form(Form::Atom("#:map".to_string())))
            }
            Some(c) if !is_terminator(c) => {
                // Tagged literal: #inst "...", #uuid "...", #my/tag form
                let tag = self.read_token_text();
                let value = self.read_required(&format!("#{}", tag))?;
                Ok(Read::Form(value))
            }
            _ => Err(self.invalid("unsupported dispatch macro")),
        }
    }

    fn read_conditional(&mut self, splicing: bool) -> Result<Read, ReadError> {
        self.skip_whitespace();
        if self.peek() != Some('(') {
            return Err(self.invalid("reader conditional body must be a list"));
        }
        self.bump();
        let branches = self.read_delimited(')', '(')?;
        if branches.len() % 2 != 0 {
            return Err(self.invalid("reader conditional requires an even number of forms"));
        }

        for pair in branches.chunks(2) {
            let feature = pair[0]
                .as_keyword()
                .ok_or_else(|| self.invalid("reader conditional feature must be a keyword"))?;
            if self.opts.selects(feature) {
                let chosen = pair[1].clone();
                if splicing {
                    return match chosen.bare() {
                        Form::List(items) | Form::Vector(items) => Ok(Read::Splice(items.clone())),
                        _ => Err(self.invalid("#?@ branch must be a sequential form")),
                    };
                }
                return Ok(Read::Form(chosen));
            }
        }

        Ok(Read::Skip)
    }

    fn read_delimited(&mut self, close: char, open: char) -> Result<Vec<Form>, ReadError> {
        let start_line = self.line;
        let mut items = Vec::new();
        loop {
            self.skip_whitespace();
            match self.peek() {
                None => {
                    return Err(ReadError::UnexpectedEof {
                        line: start_line,
                        open,
                    })
                }
                Some(c) if c == close => {
                    self.bump();
                    return Ok(items);
                }
                Some(_) => match self.read_one()? {
                    Read::Form(form) => items.push(form),
                    Read::Splice(forms) => items.extend(forms),
                    Read::Skip => {}
                },
            }
        }
    }

    fn read_string(&mut self, line: usize) -> Result<String, ReadError> {
        let mut out = String::new();
        loop {
            match self.bump() {
                None => return Err(ReadError::UnterminatedString { line }),
                Some('"') => return Ok(out),
                Some('\\') => match self.bump() {
                    None => return Err(ReadError::UnterminatedString { line }),
                    Some('n') => out.push('\n'),
                    Some('t') => out.push('\t'),
                    Some('r') => out.push('\r'),
                    Some(other) => out.push(other),
                },
                Some(c) => out.push(c),
            }
        }
    }

    fn read_token_text(&mut self) -> String {
        let mut text = String::new();
        while let Some(c) = self.peek() {
            if is_terminator(c) {
                break;
            }
            text.push(c);
            self.bump();
        }
        text
    }

    fn read_token(&mut self) -> Form {
        let text = self.read_token_text();

        if let Some(kw) = text.strip_prefix(':') {
            return Form::Keyword(kw.trim_start_matches(':').to_string());
        }

        let first = text.chars().next().unwrap_or('0');
        let numeric = first.is_ascii_digit()
            || ((first == '-' || first == '+')
                && text.chars().nth(1).is_some_and(|c| c.is_ascii_digit()));
        if numeric || matches!(text.as_str(), "nil" | "true" | "false") {
            return Form::Atom(text);
        }

        Form::Symbol(text)
    }

    #[cfg(test)]
    fn remaining(&self) -> usize {
        self.chars.len().saturating_sub(self.pos)
    }
}

fn is_terminator(c: char) -> bool {
    c.is_whitespace() || matches!(c, ',' | '(' | ')' | '[' | ']' | '{' | '}' | '"' | ';' | '^' | '`' | '~' | '@' | '\\')
}

/// Reads every top-level form in `source`
pub fn read_all(source: &str, opts: &ReadOptions) -> Result<Vec<Form>, ReadError> {
    let mut reader = Reader::new(source, opts);
    let mut forms = Vec::new();
    while let Some(form) = reader.next_form()? {
        forms.push(form);
    }
    Ok(forms)
}
