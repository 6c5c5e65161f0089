//! Namespace declarations
//!
//! A source unit declares its identity and dependencies in a leading `ns`
//! form. This module decodes that form into an [`NsDecl`], a tagged record of
//! the namespace name, its references and its reload flags.
//!
//! Supported reference clauses are `:require`, `:use` and `:require-macros`,
//! including prefix lists (`(:require (foo.bar baz qux))`) and libspec vectors
//! (`[foo.bar :as b]`). Host imports and `:refer-clojure` are ignored.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::name::{NameError, NamespaceName};
use super::reader::{Form, ReadError, ReadOptions, Reader};

/// Metadata key disabling reload of a namespace
pub const LOAD_FLAG: &str = "clojure.tools.namespace.repl/load";

/// Metadata key disabling unload of a namespace
pub const UNLOAD_FLAG: &str = "clojure.tools.namespace.repl/unload";

#[derive(Debug, Error, PartialEq)]
pub enum DeclError {
    #[error("No ns declaration found")]
    MissingNs,

    #[error("Malformed ns declaration: {0}")]
    MalformedNs(String),

    #[error("Malformed libspec in {clause}: {spec}")]
    MalformedLibspec { clause: String, spec: String },

    #[error("Invalid namespace name: {0}")]
    InvalidName(#[from] NameError),

    #[error("Read error: {0}")]
    Read(#[from] ReadError),
}

/// Kind of reference clause a dependency came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReferenceKind {
    Require,
    Use,
    RequireMacros,
}

impl ReferenceKind {
    fn from_clause(head: &str) -> Option<Self> {
        match head {
            "require" => Some(ReferenceKind::Require),
            "use" => Some(ReferenceKind::Use),
            "require-macros" => Some(ReferenceKind::RequireMacros),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ReferenceKind::Require => "require",
            ReferenceKind::Use => "use",
            ReferenceKind::RequireMacros => "require-macros",
        }
    }
}

/// A single dependency reference in an ns form
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Reference {
    pub kind: ReferenceKind,
    pub target: NamespaceName,
}

/// A decoded `ns` declaration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NsDecl {
    /// The declared namespace name
    pub name: NamespaceName,

    /// References in declaration order (duplicates removed)
    pub references: Vec<Reference>,

    /// Docstring, if present
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doc: Option<String>,

    /// False when the namespace opts out of reloading
    #[serde(default = "default_true")]
    pub reload: bool,

    /// False when the namespace opts out of unloading
    #[serde(default = "default_true")]
    pub unload: bool,
}

fn default_true() -> bool {
    true
}

impl NsDecl {
    /// Creates a declaration with plain `:require` references
    pub fn new(name: NamespaceName, requires: impl IntoIterator<Item = NamespaceName>) -> Self {
        let mut decl = Self {
            name,
            references: Vec::new(),
            doc: None,
            reload: true,
            unload: true,
        };
        for target in requires {
            decl.push_reference(ReferenceKind::Require, target);
        }
        decl
    }

    /// Reads source text up to its first `ns` form and decodes it
    pub fn parse(source: &str, opts: &ReadOptions) -> Result<Self, DeclError> {
        let mut reader = Reader::new(source, opts);
        while let Some(form) = reader.next_form()? {
            if is_ns_form(&form) {
                return Self::from_form(&form);
            }
        }
        Err(DeclError::MissingNs)
    }

    /// Decodes an already-read `(ns ...)` form
    pub fn from_form(form: &Form) -> Result<Self, DeclError> {
        let items = match form.bare() {
            Form::List(items) => items,
            _ => return Err(DeclError::MalformedNs("ns declaration must be a list".to_string())),
        };

        let mut rest = items.iter().skip(1);
        let name_form = rest
            .next()
            .ok_or_else(|| DeclError::MalformedNs("missing namespace name".to_string()))?;
        let name_text = name_form.as_symbol().ok_or_else(|| {
            DeclError::MalformedNs(format!("namespace name must be a symbol, got {}", describe(name_form)))
        })?;

        let mut decl = Self::new(NamespaceName::new(name_text)?, []);
        for meta in name_form.metadata() {
            decl.apply_flags(meta);
        }

        let mut rest = rest.peekable();
        if let Some(Form::Str(doc)) = rest.peek().map(|f| f.bare()) {
            decl.doc = Some(doc.clone());
            rest.next();
        }
        if let Some(attrs @ Form::Map(_)) = rest.peek().map(|f| f.bare()) {
            decl.apply_flags(attrs);
            rest.next();
        }

        for clause in rest {
            let clause_items = match clause.bare() {
                Form::List(items) => items,
                other => {
                    return Err(DeclError::MalformedNs(format!(
                        "reference clause must be a list, got {}",
                        describe(other)
                    )))
                }
            };
            let head = clause_items.first().and_then(|f| f.as_keyword());
            let kind = match head.and_then(ReferenceKind::from_clause) {
                Some(kind) => kind,
                // :import, :refer-clojure, :gen-class, :load and friends
                None => continue,
            };

            for spec in &clause_items[1..] {
                let mut targets = Vec::new();
                collect_libspec(None, spec, kind, &mut targets)?;
                for target in targets {
                    decl.push_reference(kind, target);
                }
            }
        }

        Ok(decl)
    }

    /// Names of every referenced namespace
    pub fn requires(&self) -> BTreeSet<NamespaceName> {
        self.references.iter().map(|r| r.target.clone()).collect()
    }

    fn push_reference(&mut self, kind: ReferenceKind, target: NamespaceName) {
        let reference = Reference { kind, target };
        if !self.references.contains(&reference) {
            self.references.push(reference);
        }
    }

    fn apply_flags(&mut self, meta: &Form) {
        let Form::Map(entries) = meta.bare() else {
            return;
        };
        for pair in entries.chunks(2) {
            let [key, value] = pair else { continue };
            let disabled = matches!(value.bare(), Form::Atom(v) if v == "false" || v == "nil");
            match key.as_keyword() {
                Some(LOAD_FLAG) if disabled => self.reload = false,
                Some(UNLOAD_FLAG) if disabled => self.unload = false,
                _ => {}
            }
        }
    }
}

/// True for a list whose head is the symbol `ns`
pub fn is_ns_form(form: &Form) -> bool {
    match form.bare() {
        Form::List(items) => items.first().and_then(|f| f.as_symbol()) == Some("ns"),
        _ => false,
    }
}

fn describe(form: &Form) -> String {
    match form.bare() {
        Form::List(_) => "a list".to_string(),
        Form::Vector(_) => "a vector".to_string(),
        Form::Map(_) => "a map".to_string(),
        Form::Set(_) => "a set".to_string(),
        Form::Symbol(s) => format!("symbol {}", s),
        Form::Keyword(k) => format!(":{}", k),
        Form::Str(s) => format!("string \"{}\"", s),
        Form::Atom(a) => a.clone(),
        Form::WithMeta { form, .. } => describe(form),
    }
}

fn join(prefix: Option<&NamespaceName>, symbol: &str) -> Result<NamespaceName, DeclError> {
    match prefix {
        Some(prefix) => Ok(prefix.child(symbol)?),
        None => Ok(NamespaceName::new(symbol)?),
    }
}

/// A prefix list: a sequence headed by a symbol, longer than one, with no keywords
fn is_prefix_spec(items: &[Form]) -> bool {
    items.len() > 1 && items[0].as_symbol().is_some() && items.iter().all(|f| f.as_keyword().is_none())
}

/// A libspec with options: `[foo.bar :as b]` or `[foo.bar]`
fn is_option_spec(items: &[Form]) -> bool {
    items.first().and_then(|f| f.as_symbol()).is_some()
        && (items.len() == 1 || items.get(1).and_then(|f| f.as_keyword()).is_some())
}

fn collect_libspec(
    prefix: Option<&NamespaceName>,
    spec: &Form,
    kind: ReferenceKind,
    out: &mut Vec<NamespaceName>,
) -> Result<(), DeclError> {
    let malformed = || DeclError::MalformedLibspec {
        clause: format!(":{}", kind.as_str()),
        spec: describe(spec),
    };

    match spec.bare() {
        Form::Symbol(s) => out.push(join(prefix, s)?),
        // Flags such as :reload, :reload-all, :verbose
        Form::Keyword(_) => {}
        // String libspecs name host/npm modules, not namespaces
        Form::Str(_) => {}
        Form::List(items) | Form::Vector(items) => {
            if is_prefix_spec(items) {
                let head = items[0].as_symbol().ok_or_else(malformed)?;
                let nested = join(prefix, head)?;
                for inner in &items[1..] {
                    collect_libspec(Some(&nested), inner, kind, out)?;
                }
            } else if is_option_spec(items) {
                collect_libspec(prefix, &items[0], kind, out)?;
            } else if matches!(items.first().map(|f| f.bare()), Some(Form::Str(_))) {
                // ["npm-module" :as m]
            } else {
                return Err(malformed());
            }
        }
        _ => return Err(malformed()),
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(source: &str) -> NsDecl {
        NsDecl::parse(source, &ReadOptions::default()).unwrap()
    }

    fn names(decl: &NsDecl) -> Vec<String> {
        decl.requires().iter().map(|n| n.to_string()).collect()
    }

    #[test]
    fn simple_requires() {
        let decl = parse("(ns my.app (:require my.util [my.db :as db] [my.log :refer [info]]))");
        assert_eq!(decl.name.as_str(), "my.app");
        assert_eq!(names(&decl), vec!["my.db", "my.log", "my.util"]);
        assert!(decl.reload);
        assert!(decl.unload);
    }

    #[test]
    fn prefix_lists() {
        let decl = parse(
            "(ns a (:require (foo.bar baz [qux :as q]) [lib sub.one sub.two]) (:use (x.y z)))",
        );
        assert_eq!(
            names(&decl),
            vec!["foo.bar.baz", "foo.bar.qux", "lib.sub.one", "lib.sub.two", "x.y.z"]
        );
    }

    #[test]
    fn nested_prefix_lists() {
        let decl = parse("(ns a (:require (foo (bar baz))))");
        assert_eq!(names(&decl), vec!["foo.bar.baz"]);
    }

    #[test]
    fn reference_kinds_are_tagged() {
        let decl = parse("(ns a (:require b) (:use c) (:require-macros d))");
        let kinds: Vec<_> = decl.references.iter().map(|r| r.kind).collect();
        assert_eq!(
            kinds,
            vec![ReferenceKind::Require, ReferenceKind::Use, ReferenceKind::RequireMacros]
        );
    }

    #[test]
    fn ignores_imports_and_flags() {
        let decl = parse(
            "(ns a (:refer-clojure :exclude [map]) (:import (System.IO File)) (:require b :reload) (:gen-class))",
        );
        assert_eq!(names(&decl), vec!["b"]);
    }

    #[test]
    fn docstring_and_attr_map() {
        let decl = parse("(ns a \"Docs here\" {:author \"me\"} (:require b))");
        assert_eq!(decl.doc.as_deref(), Some("Docs here"));
        assert_eq!(names(&decl), vec!["b"]);
    }

    #[test]
    fn skips_forms_before_ns() {
        let decl = parse("; header\n(comment \"scratch\")\n#_(ns not.this)\n(ns real.one (:require dep))");
        assert_eq!(decl.name.as_str(), "real.one");
    }

    #[test]
    fn reload_flags_from_metadata() {
        let decl = parse("(ns ^{:clojure.tools.namespace.repl/load false} pinned (:require b))");
        assert!(!decl.reload);
        assert!(decl.unload);

        let decl = parse("(ns ^{:clojure.tools.namespace.repl/unload false} kept)");
        assert!(decl.reload);
        assert!(!decl.unload);

        let decl = parse("(ns kept {:clojure.tools.namespace.repl/unload false})");
        assert!(!decl.unload);
    }

    #[test]
    fn cljc_reader_conditionals() {
        let src = "(ns a (:require #?(:clj [clj.only] :cljr [clr.only]) common))";
        let decl = parse(src);
        assert_eq!(names(&decl), vec!["clr.only", "common"]);

        let opts = ReadOptions {
            features: vec!["clj".to_string()],
        };
        let decl = NsDecl::parse(src, &opts).unwrap();
        assert_eq!(names(&decl), vec!["clj.only", "common"]);
    }

    #[test]
    fn string_libspecs_ignored() {
        let decl = parse("(ns a (:require [\"react\" :as react] b))");
        assert_eq!(names(&decl), vec!["b"]);
    }

    #[test]
    fn duplicates_collapse() {
        let decl = parse("(ns a (:require b [b :as bb]))");
        assert_eq!(decl.references.len(), 1);
    }

    #[test]
    fn missing_ns_is_error() {
        let err = NsDecl::parse("(defn f [] 1)", &ReadOptions::default()).unwrap_err();
        assert_eq!(err, DeclError::MissingNs);
    }

    #[test]
    fn non_symbol_name_is_error() {
        let err = NsDecl::parse("(ns \"a\")", &ReadOptions::default()).unwrap_err();
        assert!(matches!(err, DeclError::MalformedNs(_)));

        let err = NsDecl::parse("(ns)", &ReadOptions::default()).unwrap_err();
        assert!(matches!(err, DeclError::MalformedNs(_)));
    }

    #[test]
    fn malformed_libspec_is_error() {
        let err = NsDecl::parse("(ns a (:require 42))", &ReadOptions::default()).unwrap_err();
        assert!(matches!(err, DeclError::MalformedLibspec { .. }));

        let err = NsDecl::parse("(ns a (:require [:as b]))", &ReadOptions::default()).unwrap_err();
        assert!(matches!(err, DeclError::MalformedLibspec { .. }));
    }

    #[test]
    fn unbalanced_source_is_read_error() {
        let err = NsDecl::parse("(ns a (:require b)", &ReadOptions::default()).unwrap_err();
        assert!(matches!(err, DeclError::Read(_)));
    }

    #[test]
    fn new_builds_require_references() {
        let decl = NsDecl::new(
            NamespaceName::new("a").unwrap(),
            [NamespaceName::new("b").unwrap()],
        );
        assert_eq!(decl.references[0].kind, ReferenceKind::Require);
        assert_eq!(names(&decl), vec!["b"]);
    }
}
