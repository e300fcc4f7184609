//! The grammar: a registry of token patterns and rules addressed by numeric
//! id.
//!
//! A [`GrammarBuilder`] hands out ids as patterns and rules are registered,
//! then checks the whole graph at [`GrammarBuilder::build`]. The built
//! [`Grammar`] is immutable; rules refer to each other by id, so cyclic
//! grammars need no cyclic ownership. A `Grammar` can be shared between
//! threads freely; each parse keeps its own mutable state on the context.

use std::sync::Arc;

use regex::Regex;
use rustc_hash::FxHashMap;

use crate::error::GrammarError;
use crate::patterns::{CustomMatch, PassageFn, TokenPattern, TokenPatternKind};
use crate::recovery::ErrorRecovery;
use crate::rules::{ProjectionFn, Rule, RuleExpr};

/// Identifies a token pattern within one grammar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TokenId(pub u32);

/// Identifies a rule within one grammar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RuleId(pub u32);

/// What produced a parsed element: a token pattern or a rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ElementId {
    /// A token pattern.
    Token(TokenId),
    /// A rule.
    Rule(RuleId),
}

/// An immutable, compiled grammar.
pub struct Grammar {
    tokens: Vec<TokenPattern>,
    rules: Vec<Rule>,
    token_aliases: FxHashMap<String, TokenId>,
    rule_aliases: FxHashMap<String, RuleId>,
    start: RuleId,
    skip: Option<TokenId>,
    sync: Vec<RuleId>,
}

impl std::fmt::Debug for Grammar {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Grammar")
            .field("tokens", &self.tokens.len())
            .field("rules", &self.rules.len())
            .field("start", &self.start)
            .finish_non_exhaustive()
    }
}

impl Grammar {
    pub(crate) fn token(&self, id: TokenId) -> &TokenPattern {
        &self.tokens[id.0 as usize]
    }

    pub(crate) fn rule(&self, id: RuleId) -> &Rule {
        &self.rules[id.0 as usize]
    }

    /// Look up a token pattern by its alias.
    pub fn token_by_alias(&self, alias: &str) -> Option<TokenId> {
        self.token_aliases.get(alias).copied()
    }

    /// Look up a rule by its alias.
    pub fn rule_by_alias(&self, alias: &str) -> Option<RuleId> {
        self.rule_aliases.get(alias).copied()
    }

    /// The human name of a token pattern.
    pub fn alias_of_token(&self, id: TokenId) -> &str {
        &self.token(id).main_alias
    }

    /// The human name of a rule.
    pub fn alias_of_rule(&self, id: RuleId) -> &str {
        &self.rule(id).alias
    }

    /// Look up a *barrier* pattern by alias. Used to resolve the
    /// caller-supplied barrier list; non-barrier patterns don't count.
    pub fn barrier_by_alias(&self, alias: &str) -> Option<TokenId> {
        let id = self.token_by_alias(alias)?;
        matches!(self.token(id).kind, TokenPatternKind::Barrier).then_some(id)
    }

    /// The rule a plain `parse` call starts from.
    pub fn start_rule(&self) -> RuleId {
        self.start
    }

    pub(crate) fn skip_token(&self) -> Option<TokenId> {
        self.skip
    }

    pub(crate) fn sync_rules(&self) -> &[RuleId] {
        &self.sync
    }

    /// Number of registered token patterns.
    pub fn token_count(&self) -> usize {
        self.tokens.len()
    }

    /// Number of registered rules.
    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }
}

/// Builder for a [`Grammar`].
///
/// Registration methods hand out ids immediately; problems (duplicate
/// aliases, bad regexes, rules that were declared but never defined) are
/// collected and reported by [`GrammarBuilder::build`].
///
/// For cyclic rules, `declare_rule` first to get an id, then `define_rule`
/// once the body can mention it.
pub struct GrammarBuilder {
    tokens: Vec<TokenPattern>,
    rules: Vec<(String, Option<Rule>)>,
    token_aliases: FxHashMap<String, TokenId>,
    rule_aliases: FxHashMap<String, RuleId>,
    problems: Vec<GrammarError>,
    start: Option<RuleId>,
    skip: Option<TokenId>,
    sync: Vec<RuleId>,
}

impl GrammarBuilder {
    /// Create an empty builder.
    pub fn new() -> Self {
        GrammarBuilder {
            tokens: Vec::new(),
            rules: Vec::new(),
            token_aliases: FxHashMap::default(),
            rule_aliases: FxHashMap::default(),
            problems: Vec::new(),
            start: None,
            skip: None,
            sync: Vec::new(),
        }
    }

    fn add_token(&mut self, alias: String, kind: TokenPatternKind) -> TokenId {
        if let Some(&existing) = self.token_aliases.get(&alias) {
            self.problems.push(GrammarError::DuplicateAlias(alias));
            return existing;
        }
        let id = TokenId(self.tokens.len() as u32);
        self.token_aliases.insert(alias.clone(), id);
        self.tokens.push(TokenPattern {
            id,
            main_alias: alias,
            exclude_from_ast: false,
            kind,
        });
        id
    }

    /// A pattern matching `text` exactly. Registering the same literal twice
    /// returns the original id.
    pub fn literal(&mut self, text: &str) -> TokenId {
        let alias = format!("{text:?}");
        if let Some(&existing) = self.token_aliases.get(&alias) {
            return existing;
        }
        self.add_token(
            alias,
            TokenPatternKind::Literal {
                text: text.to_string(),
                case_insensitive: false,
            },
        )
    }

    /// A pattern matching `text`, ignoring ASCII case.
    pub fn literal_ci(&mut self, text: &str) -> TokenId {
        let alias = format!("{text:?} (any case)");
        if let Some(&existing) = self.token_aliases.get(&alias) {
            return existing;
        }
        self.add_token(
            alias,
            TokenPatternKind::Literal {
                text: text.to_string(),
                case_insensitive: true,
            },
        )
    }

    /// A pattern matching one character satisfying `predicate`. The alias
    /// doubles as the noun in error messages ("expected letter").
    pub fn char_class(&mut self, alias: &str, predicate: fn(char) -> bool) -> TokenId {
        self.add_token(alias.to_string(), TokenPatternKind::CharClass { predicate })
    }

    /// A pattern matching a regex, anchored at the current position. The
    /// longest anchored match wins; the match object becomes the pattern's
    /// intermediate value.
    pub fn regex(&mut self, alias: &str, pattern: &str) -> TokenId {
        match Regex::new(&format!("\\A(?:{pattern})")) {
            Ok(regex) => self.add_token(alias.to_string(), TokenPatternKind::Regex { regex }),
            Err(err) => {
                self.problems.push(GrammarError::InvalidRegex {
                    alias: alias.to_string(),
                    message: err.to_string(),
                });
                // Register a never-matching placeholder so the id stays valid.
                self.add_token(
                    alias.to_string(),
                    TokenPatternKind::Custom {
                        matcher: Arc::new(|_, _| None),
                    },
                )
            }
        }
    }

    /// A pattern matching each child in order.
    pub fn sequence(&mut self, alias: &str, children: Vec<TokenId>) -> TokenId {
        if children.is_empty() {
            self.problems
                .push(GrammarError::EmptyComposite(alias.to_string()));
        }
        self.add_token(
            alias.to_string(),
            TokenPatternKind::Sequence {
                children,
                passage: None,
            },
        )
    }

    /// Like [`GrammarBuilder::sequence`], with a passage function combining
    /// the children's intermediate values into the sequence's own.
    pub fn sequence_with(
        &mut self,
        alias: &str,
        children: Vec<TokenId>,
        passage: PassageFn,
    ) -> TokenId {
        if children.is_empty() {
            self.problems
                .push(GrammarError::EmptyComposite(alias.to_string()));
        }
        self.add_token(
            alias.to_string(),
            TokenPatternKind::Sequence {
                children,
                passage: Some(passage),
            },
        )
    }

    /// A pattern trying each child in declared order; the first match wins.
    pub fn choice(&mut self, alias: &str, children: Vec<TokenId>) -> TokenId {
        if children.is_empty() {
            self.problems
                .push(GrammarError::EmptyComposite(alias.to_string()));
        }
        self.add_token(alias.to_string(), TokenPatternKind::Choice { children })
    }

    /// A pattern matching `child` greedily, between `min` and `max` times
    /// (`None` for unbounded).
    pub fn repeat(
        &mut self,
        alias: &str,
        child: TokenId,
        min: usize,
        max: Option<usize>,
    ) -> TokenId {
        self.repeat_inner(alias, child, min, max, None)
    }

    /// A repetition with a separator pattern between elements.
    pub fn repeat_sep(
        &mut self,
        alias: &str,
        child: TokenId,
        separator: TokenId,
        min: usize,
        max: Option<usize>,
    ) -> TokenId {
        self.repeat_inner(alias, child, min, max, Some(separator))
    }

    fn repeat_inner(
        &mut self,
        alias: &str,
        child: TokenId,
        min: usize,
        max: Option<usize>,
        separator: Option<TokenId>,
    ) -> TokenId {
        if let Some(max) = max {
            if max < min {
                self.problems
                    .push(GrammarError::InvalidRepeatBounds(alias.to_string()));
            }
        }
        self.add_token(
            alias.to_string(),
            TokenPatternKind::Repeat {
                child,
                min,
                max,
                separator,
            },
        )
    }

    /// A pattern matching `child` or nothing.
    pub fn optional(&mut self, alias: &str, child: TokenId) -> TokenId {
        self.add_token(alias.to_string(), TokenPatternKind::Optional { child })
    }

    /// A barrier pattern. Barrier tokens in the caller-supplied list resolve
    /// to their pattern through this alias, and rules consume them by
    /// referencing this id.
    pub fn barrier(&mut self, alias: &str) -> TokenId {
        self.add_token(alias.to_string(), TokenPatternKind::Barrier)
    }

    /// A user-defined leaf pattern: a function from `(source, position)` to
    /// a match length and value, or `None`.
    pub fn custom(
        &mut self,
        alias: &str,
        matcher: impl Fn(&str, usize) -> Option<CustomMatch> + Send + Sync + 'static,
    ) -> TokenId {
        self.add_token(
            alias.to_string(),
            TokenPatternKind::Custom {
                matcher: Arc::new(matcher),
            },
        )
    }

    /// Mark a token pattern as excluded from the AST; its children are
    /// promoted into its parent's child list.
    pub fn exclude_token(&mut self, id: TokenId) {
        self.tokens[id.0 as usize].exclude_from_ast = true;
    }

    /// Reserve an id for a rule so other rules (or the rule itself) can
    /// reference it before its body exists.
    pub fn declare_rule(&mut self, alias: &str) -> RuleId {
        if let Some(&existing) = self.rule_aliases.get(alias) {
            self.problems
                .push(GrammarError::DuplicateAlias(alias.to_string()));
            return existing;
        }
        let id = RuleId(self.rules.len() as u32);
        self.rule_aliases.insert(alias.to_string(), id);
        self.rules.push((alias.to_string(), None));
        id
    }

    /// Supply the body for a rule declared with
    /// [`GrammarBuilder::declare_rule`].
    pub fn define_rule(&mut self, id: RuleId, body: RuleExpr) {
        let (alias, slot) = &mut self.rules[id.0 as usize];
        assert!(
            slot.is_none(),
            "rule {alias:?} was defined twice; define_rule takes each id once"
        );
        *slot = Some(Rule {
            id,
            alias: alias.clone(),
            body,
            projection: None,
            recovery: ErrorRecovery::none(),
            exclude_from_ast: false,
        });
    }

    /// Declare and define a rule in one step.
    pub fn rule(&mut self, alias: &str, body: RuleExpr) -> RuleId {
        let id = self.declare_rule(alias);
        self.define_rule(id, body);
        id
    }

    /// Attach a value-projection callback to a rule. It runs after the
    /// rule's body matches, receiving the element and its children's values.
    pub fn set_projection(&mut self, id: RuleId, projection: ProjectionFn) {
        let (alias, slot) = &mut self.rules[id.0 as usize];
        let rule = slot
            .as_mut()
            .unwrap_or_else(|| panic!("rule {alias:?} must be defined before set_projection"));
        rule.projection = Some(projection);
    }

    /// Attach an error recovery policy to a rule.
    pub fn set_recovery(&mut self, id: RuleId, recovery: ErrorRecovery) {
        let (alias, slot) = &mut self.rules[id.0 as usize];
        let rule = slot
            .as_mut()
            .unwrap_or_else(|| panic!("rule {alias:?} must be defined before set_recovery"));
        rule.recovery = recovery;
    }

    /// Mark a rule as excluded from the AST.
    pub fn exclude_rule(&mut self, id: RuleId) {
        let (alias, slot) = &mut self.rules[id.0 as usize];
        let rule = slot
            .as_mut()
            .unwrap_or_else(|| panic!("rule {alias:?} must be defined before exclude_rule"));
        rule.exclude_from_ast = true;
    }

    /// Set the rule a plain `parse` call starts from.
    pub fn start(&mut self, id: RuleId) {
        self.start = Some(id);
    }

    /// Set a token pattern to be skipped between the items of rule-level
    /// sequences, typically whitespace. Skipping never steps over a
    /// barrier.
    pub fn skip(&mut self, id: TokenId) {
        self.skip = Some(id);
    }

    /// The ambient synchronization set for `PanicMode` recovery: scanning
    /// stops at the first position where any of these rules matches.
    pub fn sync_set(&mut self, rules: &[RuleId]) {
        self.sync = rules.to_vec();
    }

    /// Check the whole grammar and freeze it.
    pub fn build(self) -> Result<Grammar, GrammarError> {
        if let Some(problem) = self.problems.into_iter().next() {
            return Err(problem);
        }
        let mut rules = Vec::with_capacity(self.rules.len());
        for (alias, slot) in self.rules {
            match slot {
                Some(rule) => rules.push(rule),
                None => return Err(GrammarError::UndefinedRule(alias)),
            }
        }
        let start = self.start.ok_or(GrammarError::NoStartRule)?;
        let start_rule = &rules[start.0 as usize];
        if start_rule.exclude_from_ast {
            return Err(GrammarError::ExcludedStartRule(start_rule.alias.clone()));
        }
        Ok(Grammar {
            tokens: self.tokens,
            rules,
            token_aliases: self.token_aliases,
            rule_aliases: self.rule_aliases,
            start,
            skip: self.skip,
            sync: self.sync,
        })
    }
}

impl Default for GrammarBuilder {
    fn default() -> Self {
        GrammarBuilder::new()
    }
}
