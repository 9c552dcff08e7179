use core::cmp::Ordering;
use core::fmt::Debug;
use std::collections::BTreeMap;

use analysis::domains::{JoinSemiLattice, SetMap};
use itertools::Itertools;
use smt::z3::ast::{BV, Bool};

use crate::ir::ElementaryType;

/// A variable with its solver symbol. Two tracked variables are equal when
/// they name the same symbol with the same type.
#[derive(Clone)]
pub struct TrackedVariable<'ctx> {
    /// The fully qualified identity, including the call prefixes.
    pub identity: String,
    pub ty: ElementaryType,
    pub term: BV<'ctx>,
    /// Holds when the last operation computing the value overflowed.
    pub overflow: Bool<'ctx>,
    symbol: String,
}

impl<'ctx> TrackedVariable<'ctx> {
    pub fn new(identity: String, ty: ElementaryType, term: BV<'ctx>, overflow: Bool<'ctx>) -> Self {
        let symbol = term.to_string();
        Self {
            identity,
            ty,
            term,
            overflow,
            symbol,
        }
    }

    pub fn width(&self) -> u32 {
        self.term.get_size()
    }

    pub fn is_signed(&self) -> bool {
        self.ty.is_signed()
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }
}

impl PartialEq for TrackedVariable<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.identity == other.identity && self.ty == other.ty && self.symbol == other.symbol
    }
}

impl Eq for TrackedVariable<'_> {}

impl Debug for TrackedVariable<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}: {} ({})", self.identity, self.ty, self.symbol)
    }
}

/// The storage a handler reads and writes. Handlers only see identities
/// local to the function they run in, the store decides how they are
/// qualified.
pub trait VariableStore<'ctx> {
    fn get(&self, identity: &str) -> Option<&TrackedVariable<'ctx>>;
    fn insert(&mut self, identity: &str, variable: TrackedVariable<'ctx>);
    /// The identity as the solver and the result maps see it.
    fn qualify(&self, identity: &str) -> String;

    /// Remember that `writer` stored a value under a storage or memory key.
    fn record_write(&mut self, key: &str, writer: &str);
    /// The identities that stored a value under `key`, unqualified.
    fn writers(&self, key: &str) -> Vec<String>;

    /// Remember that a reference points to an element or member.
    fn alias(&mut self, reference: &str, target: &str);
    fn resolve_alias(&self, reference: &str) -> Option<String>;

    /// A short description of the tracked identities for diagnostics.
    fn snapshot(&self) -> String;
}

#[derive(Clone, Default, PartialEq, Eq)]
pub struct IntervalState<'ctx> {
    variables: BTreeMap<String, TrackedVariable<'ctx>>,
    writes: SetMap<String, String>,
    aliases: BTreeMap<String, String>,
}

impl<'ctx> IntervalState<'ctx> {
    pub fn variables(&self) -> impl Iterator<Item = &TrackedVariable<'ctx>> {
        self.variables.values()
    }

    pub fn len(&self) -> usize {
        self.variables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.variables.is_empty()
    }

    pub fn contains(&self, identity: &str) -> bool {
        self.variables.contains_key(identity)
    }

    fn is_included_in(&self, other: &Self) -> bool {
        self.variables
            .iter()
            .all(|(id, var)| other.variables.get(id) == Some(var))
            && self.aliases
                .iter()
                .all(|(reference, target)| other.aliases.get(reference) == Some(target))
            && self.writes <= other.writes
    }

    /// Union of both states, entries of `self` win on conflicts.
    fn union(&self, other: &Self) -> Self {
        let mut result = self.clone();
        for (id, var) in &other.variables {
            result
                .variables
                .entry(id.clone())
                .or_insert_with(|| var.clone());
        }
        for (reference, target) in &other.aliases {
            result
                .aliases
                .entry(reference.clone())
                .or_insert_with(|| target.clone());
        }
        result.writes.union_with(&other.writes);
        result
    }
}

impl<'ctx> VariableStore<'ctx> for IntervalState<'ctx> {
    fn get(&self, identity: &str) -> Option<&TrackedVariable<'ctx>> {
        self.variables.get(identity)
    }

    fn insert(&mut self, identity: &str, variable: TrackedVariable<'ctx>) {
        self.variables.insert(identity.to_owned(), variable);
    }

    fn qualify(&self, identity: &str) -> String {
        identity.to_owned()
    }

    fn record_write(&mut self, key: &str, writer: &str) {
        self.writes.insert(key.to_owned(), writer.to_owned());
    }

    fn writers(&self, key: &str) -> Vec<String> {
        self.writes
            .get(&key.to_owned())
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default()
    }

    fn alias(&mut self, reference: &str, target: &str) {
        self.aliases.insert(reference.to_owned(), target.to_owned());
    }

    fn resolve_alias(&self, reference: &str) -> Option<String> {
        self.aliases.get(reference).cloned()
    }

    fn snapshot(&self) -> String {
        format!("{{{}}}", self.variables.keys().join(", "))
    }
}

impl PartialOrd for IntervalState<'_> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match (self.is_included_in(other), other.is_included_in(self)) {
            (true, true) => Some(Ordering::Equal),
            (true, false) => Some(Ordering::Less),
            (false, true) => Some(Ordering::Greater),
            (false, false) => None,
        }
    }
}

impl Debug for IntervalState<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_list().entries(self.variables.values()).finish()
    }
}

/// The domain of the interval analysis. Handlers only run on the state
/// variant, a bottom domain stands for an unreachable node.
#[derive(Clone, Default, PartialEq, Eq)]
pub enum IntervalDomain<'ctx> {
    #[default]
    Bottom,
    State(IntervalState<'ctx>),
}

impl<'ctx> IntervalDomain<'ctx> {
    pub fn state(&self) -> Option<&IntervalState<'ctx>> {
        match self {
            IntervalDomain::Bottom => None,
            IntervalDomain::State(state) => Some(state),
        }
    }
}

impl PartialOrd for IntervalDomain<'_> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (IntervalDomain::Bottom, IntervalDomain::Bottom) => Some(Ordering::Equal),
            (IntervalDomain::Bottom, _) => Some(Ordering::Less),
            (_, IntervalDomain::Bottom) => Some(Ordering::Greater),
            (IntervalDomain::State(lhs), IntervalDomain::State(rhs)) => lhs.partial_cmp(rhs),
        }
    }
}

impl Debug for IntervalDomain<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            IntervalDomain::Bottom => write!(f, "Bottom"),
            IntervalDomain::State(state) => write!(f, "{state:?}"),
        }
    }
}

impl JoinSemiLattice for IntervalDomain<'_> {
    type LatticeContext = ();

    fn bottom(_: &()) -> Self {
        IntervalDomain::Bottom
    }

    fn join(&self, other: &Self, _: &()) -> Self {
        match (self, other) {
            (IntervalDomain::Bottom, _) => other.clone(),
            (_, IntervalDomain::Bottom) => self.clone(),
            (IntervalDomain::State(lhs), IntervalDomain::State(rhs)) => {
                IntervalDomain::State(lhs.union(rhs))
            }
        }
    }
}

/// A view of another store where every identity is qualified with a call
/// site prefix. Views nest for calls made from inlined callees.
pub struct PrefixedDomain<'a, 'ctx> {
    inner: &'a mut dyn VariableStore<'ctx>,
    prefix: String,
}

impl<'a, 'ctx> PrefixedDomain<'a, 'ctx> {
    pub fn new(inner: &'a mut dyn VariableStore<'ctx>, prefix: &str) -> Self {
        Self {
            inner,
            prefix: prefix.to_owned(),
        }
    }

    fn prefixed(&self, identity: &str) -> String {
        format!("{}{identity}", self.prefix)
    }
}

impl<'ctx> VariableStore<'ctx> for PrefixedDomain<'_, 'ctx> {
    fn get(&self, identity: &str) -> Option<&TrackedVariable<'ctx>> {
        self.inner.get(&self.prefixed(identity))
    }

    fn insert(&mut self, identity: &str, variable: TrackedVariable<'ctx>) {
        let key = self.prefixed(identity);
        self.inner.insert(&key, variable);
    }

    fn qualify(&self, identity: &str) -> String {
        self.inner.qualify(&self.prefixed(identity))
    }

    fn record_write(&mut self, key: &str, writer: &str) {
        let (key, writer) = (self.prefixed(key), self.prefixed(writer));
        self.inner.record_write(&key, &writer);
    }

    fn writers(&self, key: &str) -> Vec<String> {
        self.inner
            .writers(&self.prefixed(key))
            .into_iter()
            .filter_map(|writer| writer.strip_prefix(&self.prefix).map(str::to_owned))
            .collect()
    }

    fn alias(&mut self, reference: &str, target: &str) {
        let (reference, target) = (self.prefixed(reference), self.prefixed(target));
        self.inner.alias(&reference, &target);
    }

    fn resolve_alias(&self, reference: &str) -> Option<String> {
        let target = self.inner.resolve_alias(&self.prefixed(reference))?;
        target.strip_prefix(&self.prefix).map(str::to_owned)
    }

    fn snapshot(&self) -> String {
        format!("{} (viewed through `{}`)", self.inner.snapshot(), self.prefix)
    }
}
