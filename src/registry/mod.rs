//! Capability-tuple keyed plugin registries.
//!
//! Every plugin kind (application, infrastructure-foundation) is selected
//! by the same three-part key: the component type, the infrastructure
//! type, and the infrastructure flavor. A registered tuple may use `"*"`
//! in any position to match anything during lookup; queries never contain
//! wildcards.

use std::collections::HashMap;
use std::fmt;

/// The `(type, infra, infra_flavor)` key used for plugin dispatch.
///
/// Example: `("rails", "aws", "vpc-public-private")`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Tuple {
    /// Component type, e.g. an application type ("rails") or a foundation
    /// name ("consul").
    pub type_: String,
    /// Infrastructure type, e.g. "aws".
    pub infra: String,
    /// Infrastructure flavor, e.g. "simple".
    pub infra_flavor: String,
}

/// The wildcard value matching any field during lookup.
pub const WILDCARD: &str = "*";

impl Tuple {
    pub fn new(
        type_: impl Into<String>,
        infra: impl Into<String>,
        infra_flavor: impl Into<String>,
    ) -> Self {
        Self {
            type_: type_.into(),
            infra: infra.into(),
            infra_flavor: infra_flavor.into(),
        }
    }

    /// Whether this (possibly wildcarded) tuple matches a concrete query.
    fn matches(&self, query: &Tuple) -> bool {
        (self.type_ == WILDCARD || self.type_ == query.type_)
            && (self.infra == WILDCARD || self.infra == query.infra)
            && (self.infra_flavor == WILDCARD || self.infra_flavor == query.infra_flavor)
    }

    /// Position-weighted specificity: a concrete type outweighs a
    /// concrete infra, which outweighs a concrete flavor. Two distinct
    /// patterns matching the same query always differ in which fields
    /// are concrete, so their weights differ and lookup has no ties.
    fn specificity(&self) -> usize {
        let mut weight = 0;
        if self.type_ != WILDCARD {
            weight += 4;
        }
        if self.infra != WILDCARD {
            weight += 2;
        }
        if self.infra_flavor != WILDCARD {
            weight += 1;
        }
        weight
    }
}

impl fmt::Display for Tuple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "({:?}, {:?}, {:?})",
            self.type_, self.infra, self.infra_flavor
        )
    }
}

/// A tuple-keyed table of plugin factories.
///
/// Built once at startup and passed into the orchestration core; never
/// mutated afterwards.
#[derive(Clone)]
pub struct Registry<F> {
    entries: HashMap<Tuple, F>,
}

impl<F> Default for Registry<F> {
    fn default() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }
}

impl<F> Registry<F> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Associate a capability tuple with a factory. Re-registering a tuple
    /// replaces the previous entry.
    pub fn register(&mut self, tuple: Tuple, factory: F) {
        self.entries.insert(tuple, factory);
    }

    /// Look up the factory for a concrete tuple.
    ///
    /// An exact match always wins. Otherwise all wildcard entries that
    /// match are considered and the one with the highest position-weighted
    /// specificity is returned, so lookup is deterministic regardless of
    /// insertion order.
    pub fn lookup(&self, query: &Tuple) -> Option<&F> {
        if let Some(f) = self.entries.get(query) {
            return Some(f);
        }

        self.entries
            .iter()
            .filter(|(pattern, _)| pattern.matches(query))
            .max_by_key(|(pattern, _)| pattern.specificity())
            .map(|(_, f)| f)
    }

    /// Union another registry into this one; entries in `other` take
    /// precedence on key collision.
    pub fn merge(&mut self, other: Registry<F>) {
        self.entries.extend(other.entries);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn tuples(&self) -> impl Iterator<Item = &Tuple> {
        self.entries.keys()
    }
}
