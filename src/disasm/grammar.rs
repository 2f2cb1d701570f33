//! Grammar composition: `TokenExpression` combinators (terminal, sequence,
//! option, sub-grammar reference) over [`TokenPattern`](super::token::TokenPattern),
//! and the `Grammar`/`Rule` types that pair a pattern with a semantic
//! action.

use std::collections::HashMap;
use std::sync::Arc;

use crate::disasm::builder::Builder;
use crate::disasm::state::DecodeState;
use crate::disasm::token::{Captures, TokenPattern};
use crate::error::Result;

/// A semantic action: runs against the current decode state and an IL
/// builder, emitting mnemonics and/or jump declarations. Actions are
/// reference-counted so a `Grammar` can be cheaply cloned (e.g. shared
/// across worker threads by the driver).
pub type Action = Arc<dyn Fn(&mut DecodeState, &mut Builder) -> Result<()> + Send + Sync>;

/// A combinator tree describing what a rule matches: a terminal bit pattern,
/// a sequence of two sub-expressions, zero-or-one of a sub-expression, or a
/// reference to another named grammar.
#[derive(Clone)]
pub enum TokenExpression {
    /// One token matching a fixed bit pattern.
    Terminal(TokenPattern),
    /// `a >> b`: match `a`, then `b` starting at the next token.
    Sequence(Box<TokenExpression>, Box<TokenExpression>),
    /// `*a`: match `a` zero-or-one times.
    Option(Box<TokenExpression>),
    /// Recurse into another grammar's rules, by name.
    SubGrammar(String),
}

impl TokenExpression {
    /// Shorthand for [`TokenExpression::Terminal`] built directly from a
    /// pattern string.
    pub fn terminal(pattern: &str, width: u32) -> Result<TokenExpression> {
        Ok(TokenExpression::Terminal(TokenPattern::parse(pattern, width)?))
    }

    /// `self >> next`.
    pub fn then(self, next: TokenExpression) -> TokenExpression {
        TokenExpression::Sequence(Box::new(self), Box::new(next))
    }

    /// `*self`.
    pub fn optional(self) -> TokenExpression {
        TokenExpression::Option(Box::new(self))
    }

    /// The maximum number of tokens this expression could consume, given the
    /// sub-grammars registered in `registry`. Used by the decode engine to
    /// decide how many tokens to read ahead before matching.
    pub fn max_tokens(&self, registry: &HashMap<String, Grammar>) -> usize {
        match self {
            TokenExpression::Terminal(_) => 1,
            TokenExpression::Sequence(a, b) => a.max_tokens(registry) + b.max_tokens(registry),
            TokenExpression::Option(a) => a.max_tokens(registry),
            TokenExpression::SubGrammar(name) => registry
                .get(name)
                .map(|g| g.max_tokens(registry))
                .unwrap_or(0),
        }
    }

    /// Try to match this expression as a prefix of `tokens`. On success,
    /// returns the number of tokens consumed and the merged captures (a
    /// later sub-expression's capture wins any name collision, which a
    /// well-formed grammar never exercises — capture names must not
    /// collide within a rule).
    fn try_match(
        &self,
        tokens: &[u64],
        registry: &HashMap<String, Grammar>,
    ) -> Option<(usize, Captures)> {
        match self {
            TokenExpression::Terminal(pattern) => {
                let tok = *tokens.first()?;
                pattern.matches(tok).map(|caps| (1, caps))
            }
            TokenExpression::Sequence(a, b) => {
                let (n1, mut caps1) = a.try_match(tokens, registry)?;
                let (n2, caps2) = b.try_match(&tokens[n1..], registry)?;
                caps1.extend(caps2);
                Some((n1 + n2, caps1))
            }
            TokenExpression::Option(a) => match a.try_match(tokens, registry) {
                Some(result) => Some(result),
                None => Some((0, Captures::new())),
            },
            TokenExpression::SubGrammar(name) => {
                let sub = registry.get(name)?;
                sub.match_longest(tokens, registry)
                    .map(|(consumed, caps, _)| (consumed, caps))
            }
        }
    }
}

/// One grammar rule: a pattern and the action to run when it wins the match.
#[derive(Clone)]
pub struct Rule {
    pattern: TokenExpression,
    action: Action,
}

impl Rule {
    /// A new rule.
    pub fn new(pattern: TokenExpression, action: Action) -> Rule {
        Rule { pattern, action }
    }
}

/// A collection of rules for one architecture (or sub-addressing-mode),
/// plus an optional default rule fired when nothing else matches.
#[derive(Clone)]
pub struct Grammar {
    rules: Vec<Rule>,
    default_action: Option<Action>,
    sub_grammars: HashMap<String, Grammar>,
}

impl Grammar {
    /// An empty grammar with no rules and no default.
    pub fn new() -> Grammar {
        Grammar {
            rules: Vec::new(),
            default_action: None,
            sub_grammars: HashMap::new(),
        }
    }

    /// Register a rule. Rules are tried in registration order; on a tie in
    /// matched token count, the *last*-registered rule wins.
    pub fn rule(mut self, pattern: TokenExpression, action: Action) -> Grammar {
        self.rules.push(Rule::new(pattern, action));
        self
    }

    /// Install the default rule, fired when no registered rule matches.
    pub fn default(mut self, action: Action) -> Grammar {
        self.default_action = Some(action);
        self
    }

    /// Register a named sub-grammar, reachable from a
    /// [`TokenExpression::SubGrammar`] of this same name.
    pub fn sub_grammar(mut self, name: impl Into<String>, grammar: Grammar) -> Grammar {
        self.sub_grammars.insert(name.into(), grammar);
        self
    }

    /// `true` if a default rule is installed.
    pub fn has_default(&self) -> bool {
        self.default_action.is_some()
    }

    /// The default action, if any.
    pub fn default_action(&self) -> Option<&Action> {
        self.default_action.as_ref()
    }

    fn max_tokens(&self, registry: &HashMap<String, Grammar>) -> usize {
        self.rules
            .iter()
            .map(|r| r.pattern.max_tokens(registry))
            .max()
            .unwrap_or(1)
    }

    /// The maximum number of tokens any rule in this grammar (including its
    /// own sub-grammars) might consume. Used by the decode engine to size
    /// its read-ahead.
    pub fn max_lookahead(&self) -> usize {
        self.max_tokens(&self.sub_grammars).max(1)
    }

    /// Find the longest match among all registered rules over the prefix of
    /// `tokens`, returning `(consumed, captures, rule_index)`. Ties go to
    /// the later-registered rule.
    pub fn match_longest(
        &self,
        tokens: &[u64],
        registry: &HashMap<String, Grammar>,
    ) -> Option<(usize, Captures, usize)> {
        let mut best: Option<(usize, Captures, usize)> = None;
        for (i, rule) in self.rules.iter().enumerate() {
            if let Some((consumed, caps)) = rule.pattern.try_match(tokens, registry) {
                let better = match &best {
                    None => true,
                    Some((n, _, _)) => consumed >= *n,
                };
                if better {
                    best = Some((consumed, caps, i));
                }
            }
        }
        best
    }

    /// Match against this grammar's own rules, using its own sub-grammars as
    /// the resolution registry for any `SubGrammar` references.
    pub fn match_top(&self, tokens: &[u64]) -> Option<(usize, Captures, usize)> {
        self.match_longest(tokens, &self.sub_grammars)
    }

    /// The action belonging to rule `index`.
    pub fn action_at(&self, index: usize) -> &Action {
        &self.rules[index].action
    }
}

impl Default for Grammar {
    fn default() -> Grammar {
        Grammar::new()
    }
}
