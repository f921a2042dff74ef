use crate::element::Element;
use crate::error::{Error, Result};
use std::collections::HashMap;
use std::fmt;

/// A named right-hand side of a grammar.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Rule {
    name: String,
    element: Element,
}

/// Immutable set of rules plus the grammars it imports rules from.
///
/// Rule calls resolve against the grammar's own rules first and then against
/// each import in declaration order (depth first through their imports).
/// A rule body always resolves its calls in the grammar defining the rule, so
/// an importer can't change what an imported rule derives.
#[derive(Clone, Debug)]
pub struct Grammar {
    name: String,
    rules: Vec<Rule>,
    index: HashMap<String, usize>,
    imports: Vec<Grammar>,
}

/// Builds a Grammar while checking for duplicate rules. The first error is
/// kept and reported by `into_grammar`.
#[derive(Debug)]
pub struct GrammarBuilder {
    name: String,
    rules: Vec<Rule>,
    imports: Vec<Grammar>,
    error: Option<Error>,
}

impl Rule {
    pub fn new(name: impl Into<String>, element: Element) -> Self {
        Rule { name: name.into(), element }
    }

    pub fn name(&self) -> &str { &self.name }
    pub fn element(&self) -> &Element { &self.element }
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} = {}", self.name, self.element)
    }
}

// The index is derived from `rules`, it doesn't take part in equality.
impl PartialEq for Grammar {
    fn eq(&self, other: &Grammar) -> bool {
        self.name == other.name && self.rules == other.rules && self.imports == other.imports
    }
}

impl Eq for Grammar {}

impl Grammar {
    /// Build and validate a grammar. Rule names must be unique and every rule
    /// call reachable from the rules must resolve.
    pub fn new<N: Into<String>>(
        name: impl Into<String>,
        rules: impl IntoIterator<Item = (N, Element)>,
        imports: Vec<Grammar>,
    ) -> Result<Grammar> {
        let rules = rules.into_iter().map(|(n, e)| Rule::new(n, e)).collect();
        Grammar::from_rules(name.into(), rules, imports)
    }

    fn from_rules(name: String, rules: Vec<Rule>, imports: Vec<Grammar>) -> Result<Grammar> {
        let mut index = HashMap::with_capacity(rules.len());
        for (idx, rule) in rules.iter().enumerate() {
            if index.insert(rule.name.clone(), idx).is_some() {
                return Err(Error::DuplicateRule(rule.name.clone()));
            }
        }
        let grammar = Grammar { name, rules, index, imports };
        grammar.validate()?;
        tracing::debug!(grammar = %grammar.name, rules = grammar.rules.len(), "grammar built");
        Ok(grammar)
    }

    // Imports were validated when they were built and resolve their own calls,
    // so only calls made by own rules are checked, in rule order.
    fn validate(&self) -> Result<()> {
        for rule in &self.rules {
            let mut calls = Vec::new();
            rule.element.visit_calls(&mut |name| calls.push(name));
            for name in calls {
                self.resolve(name)?;
            }
        }
        Ok(())
    }

    pub fn name(&self) -> &str { &self.name }

    pub fn imports(&self) -> &[Grammar] { &self.imports }

    /// Own rules in insertion order (imported rules are only reachable
    /// through `lookup`).
    pub fn rules(&self) -> &[Rule] { &self.rules }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.rules.iter().map(|r| r.name.as_str())
    }

    pub fn len(&self) -> usize { self.rules.len() }

    pub fn is_empty(&self) -> bool { self.rules.is_empty() }

    fn find(&self, name: &str) -> Option<(&Grammar, &Rule)> {
        if let Some(&idx) = self.index.get(name) {
            return Some((self, &self.rules[idx]));
        }
        self.imports.iter().find_map(|import| import.find(name))
    }

    /// Resolve a rule through own rules and then imports, returning it along
    /// with the grammar that defines it.
    pub fn resolve(&self, name: &str) -> Result<(&Grammar, &Rule)> {
        self.find(name).ok_or_else(|| Error::UnresolvedRule {
            rule: name.to_string(),
            grammar: self.name.clone(),
        })
    }

    pub fn get(&self, name: &str) -> Option<&Element> {
        self.find(name).map(|(_, rule)| &rule.element)
    }

    pub fn lookup(&self, name: &str) -> Result<&Element> {
        self.resolve(name).map(|(_, rule)| &rule.element)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }
}

/// ABNF listing of the grammar's own rules
impl fmt::Display for Grammar {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "; ===== Grammar {} =====", self.name)?;
        if !self.imports.is_empty() {
            let names: Vec<_> = self.imports.iter().map(|g| g.name.as_str()).collect();
            write!(f, "\n; uses rules from {}", names.join(", "))?;
        }
        for rule in &self.rules {
            write!(f, "\n{}", rule)?;
        }
        Ok(())
    }
}

impl GrammarBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        GrammarBuilder { name: name.into(), rules: Vec::new(), imports: Vec::new(), error: None }
    }

    fn add_rule(&mut self, name: String, element: Element, quiet: bool) {
        // Check for duplicate rules to avoid overwriting by mistake
        if !self.rules.iter().any(|r| r.name == name) {
            self.rules.push(Rule { name, element });
        } else if !quiet && self.error.is_none() {
            self.error = Some(Error::DuplicateRule(name));
        }
    }

    pub fn rule(mut self, name: impl Into<String>, element: Element) -> Self {
        self.add_rule(name.into(), element, false);
        self
    }

    /// Quiet silently ignores redefinitions of a rule. It doesn't chain so it
    /// can be invoked in loops.
    pub fn quiet_rule(&mut self, name: impl Into<String>, element: Element) {
        self.add_rule(name.into(), element, true);
    }

    pub fn import(mut self, grammar: Grammar) -> Self {
        self.imports.push(grammar);
        self
    }

    pub fn into_grammar(self) -> Result<Grammar> {
        match self.error {
            Some(error) => Err(error),
            None => Grammar::from_rules(self.name, self.rules, self.imports),
        }
    }
}

///////////////////////////////////////////////////////////////////////////////
