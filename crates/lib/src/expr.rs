//! Command expression templates.
//!
//! Build commands and exported-env values are templates over two reference
//! forms:
//!
//! - `$NAME` — an environment-style reference resolved against a flat
//!   scope. Unresolved references pass through verbatim so downstream
//!   shell expansion (e.g. `$PATH`) still applies.
//! - `#{...}` — a bracketed expression over a two-level scope
//!   (package name → field → value). Supported forms: dotted references
//!   (`pkg.lib`, `self.bin`), single-quoted literals, path joins with `/`,
//!   and `:` to join parts with the platform path-list delimiter.
//!
//! # Example
//!
//! ```
//! use esker_lib::expr::{EvalScope, ScopeField, evaluate};
//!
//! let mut scope = EvalScope::new();
//! scope.bind("pkg", [(ScopeField::Lib, "/store/i/pkg-1.0.0-aaaaaaaa/lib".to_string())]);
//!
//! let rendered = evaluate(
//!   "#{pkg.lib / 'ocaml' : $CAML_LD_LIBRARY_PATH}",
//!   &scope,
//!   &|_| None,
//!   ":",
//! )
//! .unwrap();
//! assert_eq!(rendered, "/store/i/pkg-1.0.0-aaaaaaaa/lib/ocaml:$CAML_LD_LIBRARY_PATH");
//! ```
//!
//! Malformed expressions and references to unknown packages or fields are
//! hard errors: silently rendering an empty string would change what the
//! build actually does.

use indexmap::IndexMap;
use thiserror::Error;

/// Errors raised while parsing or evaluating a template.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExprError {
  #[error("unclosed #{{...}} expression at position {0}")]
  Unclosed(usize),

  #[error("malformed expression: {0}")]
  Malformed(String),

  #[error("empty #{{}} expression")]
  EmptyExpression,

  #[error("'{0}' does not name a value; expected a dotted reference like '{0}.bin'")]
  NonLeafReference(String),

  #[error("unknown package '{0}' in expression")]
  UnknownPackage(String),

  #[error("unknown field '{field}' of package '{package}'")]
  UnknownField { package: String, field: String },
}

/// A parsed piece of a template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
  /// Literal text.
  Literal(String),

  /// A `$NAME` reference.
  Var(String),

  /// A `#{...}` expression.
  Expr(Expr),
}

/// A `#{...}` expression: parts joined by `:` (rendered with the path-list
/// delimiter), each part a sequence of atoms joined by `/` (rendered as a
/// path).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Expr {
  pub parts: Vec<Vec<Atom>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Atom {
  /// `pkg.field` — resolved against the evaluation scope.
  Ref { package: String, field: String },

  /// `'text'` — a literal fragment.
  Literal(String),

  /// `$NAME` inside an expression — emitted verbatim for the shell.
  ShellVar(String),
}

/// The fixed set of per-package bindings an expression may reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScopeField {
  Name,
  Version,
  Root,
  Depends,
  TargetDir,
  Install,
  Bin,
  Sbin,
  Lib,
  Man,
  Doc,
  Stublibs,
  Toplevel,
  Share,
  Etc,
}

impl ScopeField {
  pub fn from_name(name: &str) -> Option<Self> {
    Some(match name {
      "name" => ScopeField::Name,
      "version" => ScopeField::Version,
      "root" => ScopeField::Root,
      "depends" => ScopeField::Depends,
      "target_dir" => ScopeField::TargetDir,
      "install" => ScopeField::Install,
      "bin" => ScopeField::Bin,
      "sbin" => ScopeField::Sbin,
      "lib" => ScopeField::Lib,
      "man" => ScopeField::Man,
      "doc" => ScopeField::Doc,
      "stublibs" => ScopeField::Stublibs,
      "toplevel" => ScopeField::Toplevel,
      "share" => ScopeField::Share,
      "etc" => ScopeField::Etc,
      _ => return None,
    })
  }

  pub fn as_str(&self) -> &'static str {
    match self {
      ScopeField::Name => "name",
      ScopeField::Version => "version",
      ScopeField::Root => "root",
      ScopeField::Depends => "depends",
      ScopeField::TargetDir => "target_dir",
      ScopeField::Install => "install",
      ScopeField::Bin => "bin",
      ScopeField::Sbin => "sbin",
      ScopeField::Lib => "lib",
      ScopeField::Man => "man",
      ScopeField::Doc => "doc",
      ScopeField::Stublibs => "stublibs",
      ScopeField::Toplevel => "toplevel",
      ScopeField::Share => "share",
      ScopeField::Etc => "etc",
    }
  }
}

/// Per-package field bindings.
pub type PackageBindings = IndexMap<ScopeField, String>;

/// The two-level evaluation scope: package name → field → value.
#[derive(Debug, Clone, Default)]
pub struct EvalScope {
  packages: IndexMap<String, PackageBindings>,
}

impl EvalScope {
  pub fn new() -> Self {
    Self::default()
  }

  /// Bind a package's fields, replacing any previous bindings of that name.
  pub fn bind(&mut self, package: &str, fields: impl IntoIterator<Item = (ScopeField, String)>) {
    self.packages.insert(package.to_string(), fields.into_iter().collect());
  }

  /// Alias an already-bound package under another name (used for `self`).
  pub fn alias(&mut self, package: &str, alias: &str) {
    if let Some(bindings) = self.packages.get(package).cloned() {
      self.packages.insert(alias.to_string(), bindings);
    }
  }

  pub fn package(&self, name: &str) -> Option<&PackageBindings> {
    self.packages.get(name)
  }

  fn lookup(&self, package: &str, field: &str) -> Result<&str, ExprError> {
    let bindings = self
      .packages
      .get(package)
      .ok_or_else(|| ExprError::UnknownPackage(package.to_string()))?;
    let field_key = ScopeField::from_name(field).ok_or_else(|| ExprError::UnknownField {
      package: package.to_string(),
      field: field.to_string(),
    })?;
    bindings
      .get(&field_key)
      .map(String::as_str)
      .ok_or_else(|| ExprError::UnknownField {
        package: package.to_string(),
        field: field.to_string(),
      })
  }
}

/// Parse a template into segments.
pub fn parse_template(input: &str) -> Result<Vec<Segment>, ExprError> {
  let mut segments = Vec::new();
  let mut literal = String::new();
  let mut chars = input.char_indices().peekable();

  while let Some((pos, ch)) = chars.next() {
    match ch {
      '#' if matches!(chars.peek(), Some((_, '{'))) => {
        chars.next(); // consume the {

        if !literal.is_empty() {
          segments.push(Segment::Literal(std::mem::take(&mut literal)));
        }

        let mut content = String::new();
        let mut found_close = false;
        for (_, c) in chars.by_ref() {
          if c == '}' {
            found_close = true;
            break;
          }
          content.push(c);
        }
        if !found_close {
          return Err(ExprError::Unclosed(pos));
        }

        segments.push(Segment::Expr(parse_expr(&content)?));
      }
      '$' if matches!(chars.peek(), Some((_, c)) if is_ident_char(*c)) => {
        if !literal.is_empty() {
          segments.push(Segment::Literal(std::mem::take(&mut literal)));
        }
        let mut name = String::new();
        while let Some((_, c)) = chars.peek() {
          if is_ident_char(*c) {
            name.push(*c);
            chars.next();
          } else {
            break;
          }
        }
        segments.push(Segment::Var(name));
      }
      _ => literal.push(ch),
    }
  }

  if !literal.is_empty() {
    segments.push(Segment::Literal(literal));
  }

  Ok(segments)
}

fn is_ident_char(c: char) -> bool {
  c.is_ascii_alphanumeric() || c == '_'
}

fn is_name_char(c: char) -> bool {
  c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == '@'
}

/// Parse the content between `#{` and `}`.
fn parse_expr(content: &str) -> Result<Expr, ExprError> {
  let mut parts: Vec<Vec<Atom>> = Vec::new();
  let mut atoms: Vec<Atom> = Vec::new();
  let mut chars = content.chars().peekable();

  loop {
    // Atom position.
    while matches!(chars.peek(), Some(c) if c.is_whitespace()) {
      chars.next();
    }
    let atom = match chars.peek() {
      None => {
        if parts.is_empty() && atoms.is_empty() {
          return Err(ExprError::EmptyExpression);
        }
        return Err(ExprError::Malformed(format!("expression ends with an operator: '{content}'")));
      }
      Some('\'') => {
        chars.next();
        let mut text = String::new();
        let mut closed = false;
        for c in chars.by_ref() {
          if c == '\'' {
            closed = true;
            break;
          }
          text.push(c);
        }
        if !closed {
          return Err(ExprError::Malformed(format!("unclosed string literal in '{content}'")));
        }
        Atom::Literal(text)
      }
      Some('$') => {
        chars.next();
        let mut name = String::new();
        while let Some(&c) = chars.peek() {
          if !is_ident_char(c) {
            break;
          }
          name.push(c);
          chars.next();
        }
        if name.is_empty() {
          return Err(ExprError::Malformed(format!("dangling '$' in '{content}'")));
        }
        Atom::ShellVar(name)
      }
      Some(c) if is_name_char(*c) => {
        let mut package = String::new();
        while let Some(&c) = chars.peek() {
          if !is_name_char(c) {
            break;
          }
          package.push(c);
          chars.next();
        }
        if matches!(chars.peek(), Some('.')) {
          chars.next();
          let mut field = String::new();
          while let Some(&c) = chars.peek() {
            if !is_ident_char(c) {
              break;
            }
            field.push(c);
            chars.next();
          }
          if field.is_empty() || matches!(chars.peek(), Some('.')) {
            return Err(ExprError::Malformed(format!(
              "expected a single 'package.field' reference in '{content}'"
            )));
          }
          Atom::Ref { package, field }
        } else {
          return Err(ExprError::NonLeafReference(package));
        }
      }
      Some(c) => {
        return Err(ExprError::Malformed(format!("unexpected '{c}' in '{content}'")));
      }
    };
    atoms.push(atom);

    // Operator position.
    while matches!(chars.peek(), Some(c) if c.is_whitespace()) {
      chars.next();
    }
    match chars.next() {
      None => break,
      Some('/') => {}
      Some(':') => {
        parts.push(std::mem::take(&mut atoms));
      }
      Some(c) => {
        return Err(ExprError::Malformed(format!("unexpected '{c}' in '{content}'")));
      }
    }
  }

  parts.push(atoms);
  Ok(Expr { parts })
}

/// Substitute `$NAME` references against a flat lookup, leaving unresolved
/// references untouched. `#{...}` forms are not interpreted here.
pub fn render_with_scope(value: &str, lookup: &dyn Fn(&str) -> Option<String>) -> String {
  let mut out = String::new();
  let mut chars = value.chars().peekable();

  while let Some(ch) = chars.next() {
    if ch == '$' && matches!(chars.peek(), Some(c) if is_ident_char(*c)) {
      let mut name = String::new();
      while let Some(&c) = chars.peek() {
        if !is_ident_char(c) {
          break;
        }
        name.push(c);
        chars.next();
      }
      match lookup(&name) {
        Some(resolved) => out.push_str(&resolved),
        None => {
          out.push('$');
          out.push_str(&name);
        }
      }
    } else {
      out.push(ch);
    }
  }

  out
}

/// Evaluate a full template: `$NAME` against the flat lookup, `#{...}`
/// against the two-level scope, with `:` parts joined by `delimiter`.
pub fn evaluate(
  template: &str,
  scope: &EvalScope,
  lookup_var: &dyn Fn(&str) -> Option<String>,
  delimiter: &str,
) -> Result<String, ExprError> {
  let mut out = String::new();
  for segment in parse_template(template)? {
    match segment {
      Segment::Literal(text) => out.push_str(&text),
      Segment::Var(name) => match lookup_var(&name) {
        Some(resolved) => out.push_str(&resolved),
        None => {
          out.push('$');
          out.push_str(&name);
        }
      },
      Segment::Expr(expr) => out.push_str(&eval_expr(&expr, scope, delimiter)?),
    }
  }
  Ok(out)
}

fn eval_expr(expr: &Expr, scope: &EvalScope, delimiter: &str) -> Result<String, ExprError> {
  let mut parts = Vec::with_capacity(expr.parts.len());
  for atoms in &expr.parts {
    let mut rendered = String::new();
    for (i, atom) in atoms.iter().enumerate() {
      if i > 0 {
        rendered.push('/');
      }
      match atom {
        Atom::Ref { package, field } => rendered.push_str(scope.lookup(package, field)?),
        Atom::Literal(text) => rendered.push_str(text),
        Atom::ShellVar(name) => {
          rendered.push('$');
          rendered.push_str(name);
        }
      }
    }
    parts.push(rendered);
  }
  Ok(parts.join(delimiter))
}

/// Quote a rendered argument for the shell if it contains whitespace or
/// quote characters.
pub fn quote_arg_if_needed(arg: &str) -> String {
  if arg.contains([' ', '\t', '\n', '\'', '"']) {
    format!("\"{}\"", arg.replace('"', "\\\""))
  } else {
    arg.to_string()
  }
}
