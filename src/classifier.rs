//! Ordered URL pattern table.
//!
//! Rules are tried in registration order and the first match wins, so
//! specific shapes must be registered before the catch-alls that would
//! otherwise swallow them. Every rule carries a sample URL it must win;
//! [`PatternTable::shadowed_rules`] reports rules that can no longer be
//! reached.

use crate::record::{MediaType, Provider, Subtype};
use regex::Regex;
use std::collections::BTreeMap;
use std::fmt;

pub struct PatternRule {
    pub name: &'static str,
    pub provider: Provider,
    pub media_type: MediaType,
    pub subtype: Option<Subtype>,
    pub regex: Regex,
    /// A URL this rule is expected to classify.
    pub sample: &'static str,
}

impl PatternRule {
    /// Patterns are compile-time literals; an invalid one is a programming
    /// error caught by the classifier tests.
    pub fn new(
        name: &'static str,
        provider: Provider,
        media_type: MediaType,
        pattern: &str,
        sample: &'static str,
    ) -> Self {
        let regex = Regex::new(pattern)
            .unwrap_or_else(|e| panic!("invalid pattern for rule {name}: {e}"));
        Self {
            name,
            provider,
            media_type,
            subtype: None,
            regex,
            sample,
        }
    }

    pub fn with_subtype(mut self, subtype: Subtype) -> Self {
        self.subtype = Some(subtype);
        self
    }
}

impl fmt::Debug for PatternRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PatternRule")
            .field("name", &self.name)
            .field("provider", &self.provider)
            .field("pattern", &self.regex.as_str())
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub provider: Provider,
    pub media_type: MediaType,
    pub subtype: Option<Subtype>,
    pub rule: &'static str,
    /// Named capture groups of the winning rule.
    pub captures: BTreeMap<String, String>,
}

impl Classification {
    /// Anything no rule recognizes is a generic page.
    pub fn fallback() -> Self {
        Self {
            provider: Provider::Page,
            media_type: MediaType::Item,
            subtype: None,
            rule: "page_item",
            captures: BTreeMap::new(),
        }
    }

    pub fn capture(&self, name: &str) -> Option<&str> {
        self.captures.get(name).map(String::as_str)
    }
}

#[derive(Debug, Default)]
pub struct PatternTable {
    rules: Vec<PatternRule>,
}

impl PatternTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn extend(&mut self, rules: impl IntoIterator<Item = PatternRule>) {
        self.rules.extend(rules);
    }

    pub fn rules(&self) -> &[PatternRule] {
        &self.rules
    }

    pub fn classify(&self, url: &str) -> Classification {
        for rule in &self.rules {
            if let Some(caps) = rule.regex.captures(url) {
                let captures = rule
                    .regex
                    .capture_names()
                    .flatten()
                    .filter_map(|name| {
                        caps.name(name)
                            .map(|m| (name.to_string(), m.as_str().to_string()))
                    })
                    .collect();

                return Classification {
                    provider: rule.provider,
                    media_type: rule.media_type,
                    subtype: rule.subtype,
                    rule: rule.name,
                    captures,
                };
            }
        }
        Classification::fallback()
    }

    /// Rules whose own sample is claimed by an earlier rule.
    pub fn shadowed_rules(&self) -> Vec<(&'static str, &'static str)> {
        self.rules
            .iter()
            .filter_map(|rule| {
                let winner = self.classify(rule.sample).rule;
                (winner != rule.name).then_some((rule.name, winner))
            })
            .collect()
    }
}
