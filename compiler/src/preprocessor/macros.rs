//! The macro table: spec.md §4.1 "Macro table".
//!
//! Maps name -> `{parameters, body-tokens, is_function_like, is_variadic}`.
//! `#define`/`#undef` mutate the table; redefining a name with a different
//! body is an error (spec.md's redefinition rule).

use super::token::Token;
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq)]
pub struct MacroDef {
    pub name: String,
    pub params: Vec<String>,
    pub is_function_like: bool,
    pub is_variadic: bool,
    pub body: Vec<Token>,
}

impl MacroDef {
    pub fn object_like(name: impl Into<String>, body: Vec<Token>) -> Self {
        MacroDef { name: name.into(), params: Vec::new(), is_function_like: false, is_variadic: false, body }
    }
}

/// Two macro bodies are "the same" for redefinition purposes if their
/// token texts match in sequence (whitespace-before flags are ignored,
/// matching the common "benign redefinition" rule).
fn bodies_equivalent(a: &MacroDef, b: &MacroDef) -> bool {
    a.params == b.params
        && a.is_function_like == b.is_function_like
        && a.is_variadic == b.is_variadic
        && a.body.len() == b.body.len()
        && a.body.iter().zip(b.body.iter()).all(|(x, y)| x.kind == y.kind && x.text == y.text)
}

#[derive(Default)]
pub struct MacroTable {
    defs: HashMap<String, MacroDef>,
}

impl MacroTable {
    pub fn new() -> Self {
        MacroTable { defs: HashMap::new() }
    }

    /// Define `def`, or no-op if an identical definition already exists.
    /// Returns an error message if a *different* definition already exists
    /// (spec.md: "Redefinition with a different body fails").
    pub fn define(&mut self, def: MacroDef) -> Result<(), String> {
        if let Some(existing) = self.defs.get(&def.name) {
            if !bodies_equivalent(existing, &def) {
                return Err(format!("'{}' macro redefined with a different body", def.name));
            }
            return Ok(());
        }
        self.defs.insert(def.name.clone(), def);
        Ok(())
    }

    pub fn undef(&mut self, name: &str) {
        self.defs.remove(name);
    }

    pub fn get(&self, name: &str) -> Option<&MacroDef> {
        self.defs.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.defs.contains_key(name)
    }
}
