use core::cmp::Ordering;
use core::fmt::Debug;
use core::ops::{Deref, DerefMut};
use std::collections::{BTreeMap, BTreeSet};

/////////////////////////
// Traits for domains. //
/////////////////////////

/// A join semi-lattice is a partially ordered set where the least upper
/// bound exists for every pair of elements. The ordering relation can be
/// read as "knows at least as much as": a state that is greater than
/// another one carries every fact of the smaller one. Bottom stands for
/// "no information yet", which for most analyses means the node was not
/// reached.
pub trait JoinSemiLattice: Eq + PartialOrd + Clone + Debug {
    /// A type to hold some information about the lattice on the side.
    /// When no such information is needed, set this to unit.
    type LatticeContext;

    /// The unit element of the join operation.
    ///
    /// Required to be the smallest element according to the ordering.
    fn bottom(ctx: &Self::LatticeContext) -> Self;

    /// Computes the least upper bound of two elements. Used at merge
    /// points where the state after the merge has to cover every
    /// predecessor.
    ///
    /// Requirements:
    /// * Reflexive: a.join(a, ctx) == a
    /// * Commutative: a.join(b, ctx) == b.join(a, ctx)
    /// * Bottom is unit: bottom.join(b, ctx) == b
    /// * Upper bound: a.join(b, ctx) >= a and a.join(b, ctx) >= b
    fn join(&self, other: &Self, ctx: &Self::LatticeContext) -> Self;

    /// Widening for domains with long ascending chains. The default
    /// implementation does not widen.
    ///
    /// Requirements:
    /// * Reflexive: a.widen(a, ctx, i) == a
    /// * b.widen(a, ctx, i) == b if a <= b
    fn widen(&self, _previous: &Self, _ctx: &Self::LatticeContext, _iteration: usize) -> Self {
        self.clone()
    }

    /// Returns true when joining `other` into `self` would not add
    /// anything, i.e., `other <= self`.
    fn subsumes(&self, other: &Self) -> bool {
        matches!(
            other.partial_cmp(self),
            Some(Ordering::Less | Ordering::Equal)
        )
    }
}

/////////////////////////////////////
// Concrete domain implementations //
/////////////////////////////////////

impl JoinSemiLattice for () {
    type LatticeContext = ();

    fn bottom(&(): &Self::LatticeContext) -> Self {}

    fn join(&self, &(): &Self, &(): &Self::LatticeContext) -> Self {}
}

/// Bool is a lattice, where false is bottom and true is top,
/// join is or.
impl JoinSemiLattice for bool {
    type LatticeContext = ();

    fn bottom(_ctx: &Self::LatticeContext) -> Self {
        false
    }

    fn join(&self, other: &Self, _ctx: &Self::LatticeContext) -> Self {
        *self || *other
    }
}

/// In the power set lattice, the empty set is bottom and union is join.
/// The elements are kept ordered so printing and comparing states is
/// deterministic.
#[derive(PartialEq, Eq, Clone, Hash)]
pub struct PowerSet<T: Ord>(pub BTreeSet<T>);

impl<T: Ord> Default for PowerSet<T> {
    fn default() -> Self {
        Self(BTreeSet::new())
    }
}

impl<T: Ord> Deref for PowerSet<T> {
    type Target = BTreeSet<T>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl<T: Ord> DerefMut for PowerSet<T> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

impl<T: Ord> FromIterator<T> for PowerSet<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<T: Ord> PartialOrd for PowerSet<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match (self.is_superset(other), other.is_superset(self)) {
            (true, true) => Some(Ordering::Equal),
            (true, false) => Some(Ordering::Greater),
            (false, true) => Some(Ordering::Less),
            (_, _) => None,
        }
    }
}

impl<T: Ord + Debug> Debug for PowerSet<T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

impl<T: Ord + Debug + Clone> JoinSemiLattice for PowerSet<T> {
    type LatticeContext = ();

    fn bottom(_: &Self::LatticeContext) -> Self {
        Self::default()
    }

    fn join(&self, other: &Self, _ctx: &Self::LatticeContext) -> Self {
        Self(self.union(other).cloned().collect())
    }
}

impl<T: Ord + Clone> PowerSet<T> {
    /// In place union, returns true when the set grew.
    pub fn union_with(&mut self, other: &Self) -> bool {
        let before = self.len();
        self.0.extend(other.iter().cloned());
        self.len() != before
    }
}

/// A map from keys to sets, ordered pointwise. A missing key is the same
/// as a key mapped to the empty set, so the map never stores empty sets.
#[derive(PartialEq, Eq, Clone, Hash)]
pub struct SetMap<K: Ord, V: Ord>(BTreeMap<K, PowerSet<V>>);

impl<K: Ord, V: Ord> Default for SetMap<K, V> {
    fn default() -> Self {
        Self(BTreeMap::new())
    }
}

impl<K: Ord + Clone, V: Ord + Clone> SetMap<K, V> {
    pub fn get(&self, key: &K) -> Option<&PowerSet<V>> {
        self.0.get(key)
    }

    pub fn contains(&self, key: &K, value: &V) -> bool {
        self.0.get(key).is_some_and(|set| set.contains(value))
    }

    pub fn contains_key(&self, key: &K) -> bool {
        self.0.contains_key(key)
    }

    pub fn insert(&mut self, key: K, value: V) -> bool {
        self.0.entry(key).or_default().insert(value)
    }

    pub fn extend<I: IntoIterator<Item = V>>(&mut self, key: K, values: I) {
        let mut values = values.into_iter().peekable();
        if values.peek().is_some() {
            self.0.entry(key).or_default().extend(values);
        }
    }

    pub fn keys(&self) -> impl Iterator<Item = &K> {
        self.0.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&K, &PowerSet<V>)> {
        self.0.iter()
    }

    pub fn values(&self) -> impl Iterator<Item = &V> {
        self.0.values().flat_map(|set| set.iter())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// In place pointwise union, returns true when anything was added.
    pub fn union_with(&mut self, other: &Self) -> bool {
        let mut changed = false;
        for (key, values) in &other.0 {
            changed |= self.0.entry(key.clone()).or_default().union_with(values);
        }
        changed
    }

    fn is_superset(&self, other: &Self) -> bool {
        other.0.iter().all(|(key, values)| {
            self.0
                .get(key)
                .is_some_and(|mine| mine.is_superset(values))
        })
    }
}

impl<K: Ord + Clone, V: Ord + Clone> PartialOrd for SetMap<K, V> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match (self.is_superset(other), other.is_superset(self)) {
            (true, true) => Some(Ordering::Equal),
            (true, false) => Some(Ordering::Greater),
            (false, true) => Some(Ordering::Less),
            (_, _) => None,
        }
    }
}

impl<K: Ord + Debug, V: Ord + Debug> Debug for SetMap<K, V> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_map().entries(self.0.iter()).finish()
    }
}

impl<K: Ord + Debug + Clone, V: Ord + Debug + Clone> JoinSemiLattice for SetMap<K, V> {
    type LatticeContext = ();

    fn bottom(_: &Self::LatticeContext) -> Self {
        Self::default()
    }

    fn join(&self, other: &Self, _ctx: &Self::LatticeContext) -> Self {
        let mut result = self.clone();
        result.union_with(other);
        result
    }
}
