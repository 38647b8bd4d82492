//! Spatial index mapping source ranges to the symbols that enclose them.
//!
//! The importer resolves every location a language server reports back to the
//! smallest symbol node whose range encloses it. A linear scan over all nodes
//! of a file dominated import time, so the default index is a static
//! 4-axis BSP over (startLine, startChar, endLine, endChar) with median
//! splits and bounding-interval pruning. The linear scan survives behind
//! [`SymbolIndex::Linear`] for the unoptimized code path.

use crate::graph::Range;

const LEAF_CAPACITY: usize = 8;

/// A range paired with the node id it belongs to.
#[derive(Debug, Clone)]
pub struct Entry {
    /// The symbol's source range.
    pub range: Range,
    /// The owning node id.
    pub payload: String,
}

impl Entry {
    /// Creates an index entry.
    pub fn new(range: Range, payload: impl Into<String>) -> Self {
        Self {
            range,
            payload: payload.into(),
        }
    }
}

/// Per-file symbol index with a tightest-enclosing stabbing query.
#[derive(Debug)]
pub enum SymbolIndex {
    /// Balanced static BSP; build O(n log n), query O(log n + k) expected.
    Tree(IntervalTree),
    /// Unoptimized linear scan over all entries.
    Linear(Vec<Entry>),
}

impl SymbolIndex {
    /// Builds the index requested by `optimized`.
    pub fn build(entries: Vec<Entry>, optimized: bool) -> Self {
        if optimized {
            Self::Tree(IntervalTree::build(entries))
        } else {
            Self::Linear(entries)
        }
    }

    /// Payloads of the tightest entries enclosing `query`.
    ///
    /// "Tightest" minimizes the line span first and the character span
    /// second; all minima are returned, in ascending payload order so ties
    /// resolve deterministically across runs.
    pub fn tightest_enclosing(&self, query: &Range) -> Vec<&str> {
        match self {
            Self::Tree(tree) => tree.tightest_enclosing(query),
            Self::Linear(entries) => {
                tightest(entries.iter().filter(|e| e.range.contains(query)))
            }
        }
    }

    /// Number of indexed entries.
    pub fn len(&self) -> usize {
        match self {
            Self::Tree(tree) => tree.entries.len(),
            Self::Linear(entries) => entries.len(),
        }
    }

    /// Whether the index is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Reduces enclosing candidates to the set of equal-size minima.
fn tightest<'a>(candidates: impl Iterator<Item = &'a Entry>) -> Vec<&'a str> {
    let mut best: Option<(u32, u64)> = None;
    let mut winners: Vec<&'a str> = Vec::new();
    for entry in candidates {
        let size = entry.range.size();
        match best {
            Some(b) if size > b => {}
            Some(b) if size == b => winners.push(&entry.payload),
            _ => {
                best = Some(size);
                winners.clear();
                winners.push(&entry.payload);
            }
        }
    }
    winners.sort_unstable();
    winners
}

/// Static interval tree over the four range coordinates.
#[derive(Debug)]
pub struct IntervalTree {
    entries: Vec<Entry>,
    root: Option<TreeNode>,
}

#[derive(Debug)]
struct TreeNode {
    /// Smallest start key in the subtree.
    min_start: u64,
    /// Largest end key in the subtree.
    max_end: u64,
    kind: TreeKind,
}

#[derive(Debug)]
enum TreeKind {
    Leaf(Vec<usize>),
    Split {
        lo: Box<TreeNode>,
        hi: Box<TreeNode>,
    },
}

/// Coordinate used for the median split at `depth`.
fn axis_key(range: &Range, depth: usize) -> u64 {
    match depth % 4 {
        0 => u64::from(range.start_line),
        1 => u64::from(range.start_char.unwrap_or(0)),
        2 => u64::from(range.end_line),
        _ => u64::from(range.end_char.unwrap_or(u32::MAX)),
    }
}

impl IntervalTree {
    /// Builds the tree over the given entries.
    pub fn build(entries: Vec<Entry>) -> Self {
        let mut indices: Vec<usize> = (0..entries.len()).collect();
        let root = if indices.is_empty() {
            None
        } else {
            Some(Self::build_node(&entries, &mut indices, 0))
        };
        Self { entries, root }
    }

    fn build_node(entries: &[Entry], indices: &mut [usize], depth: usize) -> TreeNode {
        let min_start = indices
            .iter()
            .map(|&i| entries[i].range.start_key())
            .min()
            .unwrap_or(u64::MAX);
        let max_end = indices
            .iter()
            .map(|&i| entries[i].range.end_key())
            .max()
            .unwrap_or(0);

        if indices.len() <= LEAF_CAPACITY {
            return TreeNode {
                min_start,
                max_end,
                kind: TreeKind::Leaf(indices.to_vec()),
            };
        }

        indices.sort_unstable_by_key(|&i| axis_key(&entries[i].range, depth));
        let mid = indices.len() / 2;
        let (lo_half, hi_half) = indices.split_at_mut(mid);
        let lo = Self::build_node(entries, lo_half, depth + 1);
        let hi = Self::build_node(entries, hi_half, depth + 1);
        TreeNode {
            min_start,
            max_end,
            kind: TreeKind::Split {
                lo: Box::new(lo),
                hi: Box::new(hi),
            },
        }
    }

    /// Payloads of the tightest entries enclosing `query`, ascending.
    pub fn tightest_enclosing(&self, query: &Range) -> Vec<&str> {
        let mut hits: Vec<usize> = Vec::new();
        if let Some(root) = &self.root {
            self.collect(root, query, &mut hits);
        }
        tightest(hits.into_iter().map(|i| &self.entries[i]))
    }

    fn collect(&self, node: &TreeNode, query: &Range, hits: &mut Vec<usize>) {
        // A subtree can only hold an enclosing range if some entry starts at
        // or before the query and some entry ends at or after it.
        if node.min_start > query.start_key() || node.max_end < query.end_key() {
            return;
        }
        match &node.kind {
            TreeKind::Leaf(items) => {
                for &i in items {
                    if self.entries[i].range.contains(query) {
                        hits.push(i);
                    }
                }
            }
            TreeKind::Split { lo, hi } => {
                self.collect(lo, query, hits);
                self.collect(hi, query, hits);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entries() -> Vec<Entry> {
        vec![
            // A file-sized range, a class inside it, two methods inside the
            // class, and an unrelated sibling class.
            Entry::new(Range::new(0, 0, 100, 0), "file"),
            Entry::new(Range::new(10, 0, 40, 1), "Foo"),
            Entry::new(Range::new(12, 4, 20, 5), "Foo.a"),
            Entry::new(Range::new(22, 4, 30, 5), "Foo.b"),
            Entry::new(Range::new(50, 0, 80, 1), "Bar"),
        ]
    }

    #[test]
    fn stabbing_own_range_returns_self() {
        for optimized in [true, false] {
            let index = SymbolIndex::build(entries(), optimized);
            for entry in entries() {
                let winners = index.tightest_enclosing(&entry.range);
                assert!(
                    winners.contains(&entry.payload.as_str()),
                    "{} not among {winners:?}",
                    entry.payload
                );
            }
        }
    }

    #[test]
    fn picks_the_tightest_enclosing_symbol() {
        let index = SymbolIndex::build(entries(), true);
        let probe = Range::new(13, 0, 13, 10);
        assert_eq!(index.tightest_enclosing(&probe), vec!["Foo.a"]);

        let between_methods = Range::new(21, 0, 21, 1);
        assert_eq!(index.tightest_enclosing(&between_methods), vec!["Foo"]);

        let outside_classes = Range::new(45, 0, 45, 1);
        assert_eq!(index.tightest_enclosing(&outside_classes), vec!["file"]);
    }

    #[test]
    fn equal_size_minima_are_all_returned() {
        let twins = vec![
            Entry::new(Range::new(0, 0, 10, 0), "left"),
            Entry::new(Range::new(0, 0, 10, 0), "right"),
            Entry::new(Range::new(0, 0, 50, 0), "outer"),
        ];
        let index = SymbolIndex::build(twins, true);
        let probe = Range::new(2, 0, 3, 0);
        assert_eq!(index.tightest_enclosing(&probe), vec!["left", "right"]);
    }

    #[test]
    fn char_span_breaks_line_span_ties() {
        let set = vec![
            Entry::new(Range::new(5, 0, 5, 40), "wide"),
            Entry::new(Range::new(5, 10, 5, 25), "narrow"),
        ];
        let index = SymbolIndex::build(set, true);
        let probe = Range::new(5, 12, 5, 14);
        assert_eq!(index.tightest_enclosing(&probe), vec!["narrow"]);
    }

    #[test]
    fn no_enclosing_range_yields_empty() {
        let index = SymbolIndex::build(entries(), true);
        let probe = Range::new(200, 0, 201, 0);
        assert!(index.tightest_enclosing(&probe).is_empty());
    }

    #[test]
    fn empty_index_yields_empty() {
        let index = SymbolIndex::build(Vec::new(), true);
        assert!(index.is_empty());
        assert!(index
            .tightest_enclosing(&Range::new(0, 0, 1, 0))
            .is_empty());
    }

    #[test]
    fn tree_and_linear_agree() {
        // Deterministic pseudo-random ranges, enough to force splits.
        let mut set = Vec::new();
        let mut seed = 0x9e37_79b9_u64;
        for i in 0..200 {
            seed = seed.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            let start = (seed >> 33) as u32 % 500;
            let len = 1 + ((seed >> 12) as u32 % 60);
            set.push(Entry::new(
                Range::new(start, 0, start + len, 0),
                format!("n{i}"),
            ));
        }
        let tree = SymbolIndex::build(set.clone(), true);
        let linear = SymbolIndex::build(set.clone(), false);
        for probe_start in (0..560).step_by(7) {
            let probe = Range::new(probe_start, 0, probe_start + 1, 0);
            assert_eq!(
                tree.tightest_enclosing(&probe),
                linear.tightest_enclosing(&probe),
                "diverged at line {probe_start}"
            );
        }
    }

    #[test]
    fn line_granular_entries_participate() {
        let set = vec![
            Entry::new(Range::lines(0, 20), "coarse"),
            Entry::new(Range::new(3, 0, 6, 0), "fine"),
        ];
        let index = SymbolIndex::build(set, true);
        assert_eq!(
            index.tightest_enclosing(&Range::new(4, 1, 4, 5)),
            vec!["fine"]
        );
        assert_eq!(
            index.tightest_enclosing(&Range::new(10, 0, 11, 0)),
            vec!["coarse"]
        );
    }
}
