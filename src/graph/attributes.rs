//! Typed attribute stores shared by nodes and edges.
//!
//! Every graph element carries four disjoint stores keyed by attribute name:
//! toggles (presence-only flags), strings, integers and floats. A name may
//! coexist across stores; numeric lookup prefers the float store over the
//! int store. Range attributes are sugar for four int attributes.

use std::collections::{BTreeMap, BTreeSet};
use std::hash::{Hash, Hasher};

use super::range::Range;

/// Suffixes composing a range attribute out of int attributes.
const RANGE_START_LINE: &str = "_StartLine";
const RANGE_END_LINE: &str = "_EndLine";
const RANGE_START_CHAR: &str = "_StartCharacter";
const RANGE_END_CHAR: &str = "_EndCharacter";

/// Attribute maps for one graph element.
///
/// BTree-backed so iteration order (and therefore output and hashing) is
/// deterministic across runs.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AttributeStore {
    toggles: BTreeSet<String>,
    strings: BTreeMap<String, String>,
    ints: BTreeMap<String, i64>,
    floats: BTreeMap<String, f64>,
}

impl AttributeStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a toggle attribute.
    pub fn set_toggle(&mut self, name: impl Into<String>) {
        self.toggles.insert(name.into());
    }

    /// Removes a toggle attribute.
    pub fn clear_toggle(&mut self, name: &str) {
        self.toggles.remove(name);
    }

    /// Whether the toggle is set.
    pub fn has_toggle(&self, name: &str) -> bool {
        self.toggles.contains(name)
    }

    /// Sets a string attribute, replacing any previous value.
    pub fn set_string(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.strings.insert(name.into(), value.into());
    }

    /// Looks up a string attribute.
    pub fn string(&self, name: &str) -> Option<&str> {
        self.strings.get(name).map(String::as_str)
    }

    /// Sets an int attribute, replacing any previous value.
    pub fn set_int(&mut self, name: impl Into<String>, value: i64) {
        self.ints.insert(name.into(), value);
    }

    /// Looks up an int attribute.
    pub fn int(&self, name: &str) -> Option<i64> {
        self.ints.get(name).copied()
    }

    /// Adds `delta` to an int attribute, creating it at `delta` if absent.
    pub fn increment_int(&mut self, name: &str, delta: i64) {
        *self.ints.entry(name.to_string()).or_insert(0) += delta;
    }

    /// Sets a float attribute, replacing any previous value.
    pub fn set_float(&mut self, name: impl Into<String>, value: f64) {
        self.floats.insert(name.into(), value);
    }

    /// Looks up a float attribute.
    pub fn float(&self, name: &str) -> Option<f64> {
        self.floats.get(name).copied()
    }

    /// Numeric lookup across stores; the float store wins when a name is
    /// present in both.
    pub fn numeric(&self, name: &str) -> Option<f64> {
        self.float(name).or_else(|| self.int(name).map(|i| i as f64))
    }

    /// Stores a range attribute as its four int components.
    pub fn set_range(&mut self, name: &str, range: &Range) {
        self.set_int(format!("{name}{RANGE_START_LINE}"), i64::from(range.start_line));
        self.set_int(format!("{name}{RANGE_END_LINE}"), i64::from(range.end_line));
        match range.start_char {
            Some(c) => self.set_int(format!("{name}{RANGE_START_CHAR}"), i64::from(c)),
            None => {
                self.ints.remove(&format!("{name}{RANGE_START_CHAR}"));
            }
        }
        match range.end_char {
            Some(c) => self.set_int(format!("{name}{RANGE_END_CHAR}"), i64::from(c)),
            None => {
                self.ints.remove(&format!("{name}{RANGE_END_CHAR}"));
            }
        }
    }

    /// Reassembles a range attribute; `None` when the line components are
    /// missing. Character components are optional.
    pub fn range(&self, name: &str) -> Option<Range> {
        let start_line = self.int(&format!("{name}{RANGE_START_LINE}"))?;
        let end_line = self.int(&format!("{name}{RANGE_END_LINE}"))?;
        Some(Range {
            start_line: start_line as u32,
            end_line: end_line as u32,
            start_char: self
                .int(&format!("{name}{RANGE_START_CHAR}"))
                .map(|c| c as u32),
            end_char: self
                .int(&format!("{name}{RANGE_END_CHAR}"))
                .map(|c| c as u32),
        })
    }

    /// Structural equality over all four stores.
    pub fn has_same_attributes(&self, other: &AttributeStore) -> bool {
        self == other
    }

    /// Stable hash of all stores, used as the isomorphism index key.
    pub fn content_hash(&self) -> u64 {
        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        self.toggles.hash(&mut hasher);
        self.strings.hash(&mut hasher);
        self.ints.hash(&mut hasher);
        for (k, v) in &self.floats {
            k.hash(&mut hasher);
            v.to_bits().hash(&mut hasher);
        }
        hasher.finish()
    }

    /// Toggle names in deterministic order.
    pub fn toggles(&self) -> impl Iterator<Item = &str> {
        self.toggles.iter().map(String::as_str)
    }

    /// String attributes in deterministic order.
    pub fn strings(&self) -> impl Iterator<Item = (&str, &str)> {
        self.strings.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Int attributes in deterministic order.
    pub fn ints(&self) -> impl Iterator<Item = (&str, i64)> {
        self.ints.iter().map(|(k, v)| (k.as_str(), *v))
    }

    /// Float attributes in deterministic order.
    pub fn floats(&self) -> impl Iterator<Item = (&str, f64)> {
        self.floats.iter().map(|(k, v)| (k.as_str(), *v))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn name_may_coexist_across_kinds() {
        let mut attrs = AttributeStore::new();
        attrs.set_toggle("X");
        attrs.set_string("X", "s");
        attrs.set_int("X", 1);
        attrs.set_float("X", 2.5);

        assert!(attrs.has_toggle("X"));
        assert_eq!(attrs.string("X"), Some("s"));
        assert_eq!(attrs.int("X"), Some(1));
        assert_eq!(attrs.float("X"), Some(2.5));
    }

    #[test]
    fn numeric_prefers_float_over_int() {
        let mut attrs = AttributeStore::new();
        attrs.set_int("Metric", 3);
        assert_eq!(attrs.numeric("Metric"), Some(3.0));
        attrs.set_float("Metric", 4.5);
        assert_eq!(attrs.numeric("Metric"), Some(4.5));
    }

    #[test]
    fn range_sugar_round_trips() {
        let mut attrs = AttributeStore::new();
        let r = Range::new(2, 4, 8, 1);
        attrs.set_range("SourceRange", &r);
        assert_eq!(attrs.range("SourceRange"), Some(r));
        assert_eq!(attrs.int("SourceRange_StartLine"), Some(2));
        assert_eq!(attrs.int("SourceRange_EndCharacter"), Some(1));
    }

    #[test]
    fn range_sugar_without_characters() {
        let mut attrs = AttributeStore::new();
        let r = Range::lines(1, 5);
        attrs.set_range("SourceRange", &r);
        let got = attrs.range("SourceRange").unwrap();
        assert_eq!(got.start_char, None);
        assert_eq!(got.end_char, None);
    }

    #[test]
    fn has_same_attributes_is_an_equivalence() {
        let mut a = AttributeStore::new();
        a.set_string("Source.Name", "foo");
        a.set_int("Metric.Lines.LOC", 10);

        let b = a.clone();
        let c = a.clone();

        // Reflexive, symmetric, transitive.
        assert!(a.has_same_attributes(&a));
        assert!(a.has_same_attributes(&b) && b.has_same_attributes(&a));
        assert!(a.has_same_attributes(&b) && b.has_same_attributes(&c) && a.has_same_attributes(&c));

        let mut d = a.clone();
        d.set_toggle("Deprecated");
        assert!(!a.has_same_attributes(&d));
    }

    #[test]
    fn equal_stores_hash_equal() {
        let mut a = AttributeStore::new();
        a.set_float("F", 1.25);
        a.set_string("S", "v");
        let b = a.clone();
        assert_eq!(a.content_hash(), b.content_hash());
    }

    #[test]
    fn increment_creates_and_accumulates() {
        let mut attrs = AttributeStore::new();
        attrs.increment_int("Metrics.LSP_Warning", 1);
        attrs.increment_int("Metrics.LSP_Warning", 2);
        assert_eq!(attrs.int("Metrics.LSP_Warning"), Some(3));
    }
}
