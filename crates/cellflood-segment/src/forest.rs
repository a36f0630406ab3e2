//! Union-find over pixel indices with a merge-size cap.
//!
//! Pixels join the forest lazily as they are flooded. Unions are by size
//! with path halving on [`DisjointSetForest::find`]. A union between two
//! components that have both reached `merge_threshold` pixels is refused,
//! which keeps two large basins apart even when they touch.

use log::trace;

/// Parent sentinel for pixels that have not been inserted yet.
const UNSET: usize = usize::MAX;

/// Parent-pointer forest over `[0, n)` with per-root sizes.
#[derive(Debug, Clone)]
pub struct DisjointSetForest {
    parent: Vec<usize>,
    size: Vec<usize>,
    merge_threshold: usize,
    components: usize,
    refused: usize,
}

impl DisjointSetForest {
    /// Create an empty forest over `n` pixel slots.
    ///
    /// `merge_threshold = None` means `n + 1`, i.e. unlimited merging.
    #[must_use]
    pub fn new(n: usize, merge_threshold: Option<usize>) -> Self {
        Self {
            parent: vec![UNSET; n],
            size: vec![0; n],
            merge_threshold: merge_threshold.unwrap_or(n + 1),
            components: 0,
            refused: 0,
        }
    }

    /// Number of pixel slots.
    #[must_use]
    pub fn len(&self) -> usize {
        self.parent.len()
    }

    /// Returns `true` if the forest has no pixel slots.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.parent.is_empty()
    }

    /// Effective merge cap.
    #[must_use]
    pub const fn merge_threshold(&self) -> usize {
        self.merge_threshold
    }

    /// Number of disjoint components among inserted pixels.
    #[must_use]
    pub const fn component_count(&self) -> usize {
        self.components
    }

    /// Number of union requests refused by the merge cap.
    #[must_use]
    pub const fn refused_merges(&self) -> usize {
        self.refused
    }

    /// Add pixel `i` as a singleton component.
    ///
    /// Returns `false` if `i` was already present or is out of range.
    pub fn insert(&mut self, i: usize) -> bool {
        match self.parent.get(i) {
            Some(&UNSET) => {
                self.parent[i] = i;
                self.size[i] = 1;
                self.components += 1;
                true
            }
            _ => false,
        }
    }

    /// Returns `true` if pixel `i` has been inserted.
    #[must_use]
    pub fn contains(&self, i: usize) -> bool {
        self.parent.get(i).is_some_and(|&p| p != UNSET)
    }

    /// Root of the component holding `i`, compressing the path.
    ///
    /// `None` if `i` has not been inserted.
    pub fn find(&mut self, i: usize) -> Option<usize> {
        if !self.contains(i) {
            return None;
        }
        let mut x = i;
        while self.parent[x] != x {
            let grandparent = self.parent[self.parent[x]];
            self.parent[x] = grandparent;
            x = grandparent;
        }
        Some(x)
    }

    /// Root of the component holding `i` without modifying the forest.
    #[must_use]
    pub fn find_root(&self, i: usize) -> Option<usize> {
        if !self.contains(i) {
            return None;
        }
        let mut x = i;
        while self.parent[x] != x {
            x = self.parent[x];
        }
        Some(x)
    }

    /// Size of the component holding `i` (0 if `i` is not inserted).
    #[must_use]
    pub fn size(&self, i: usize) -> usize {
        self.find_root(i).map_or(0, |root| self.size[root])
    }

    /// Merge the components holding `i` and `j`.
    ///
    /// Returns `true` only if two distinct components were merged. A
    /// request is refused when both components already hold at least
    /// `merge_threshold` pixels; requests involving a pixel that was never
    /// inserted are ignored.
    pub fn union(&mut self, i: usize, j: usize) -> bool {
        let (Some(ri), Some(rj)) = (self.find(i), self.find(j)) else {
            return false;
        };
        if ri == rj {
            return false;
        }

        let (si, sj) = (self.size[ri], self.size[rj]);
        if si >= self.merge_threshold && sj >= self.merge_threshold {
            trace!("refused merge of components {ri} ({si} px) and {rj} ({sj} px)");
            self.refused += 1;
            return false;
        }

        let (big, small) = if si >= sj { (ri, rj) } else { (rj, ri) };
        self.parent[small] = big;
        self.size[big] += self.size[small];
        self.components -= 1;
        true
    }

    /// Roots in ascending index order.
    pub fn roots(&self) -> impl Iterator<Item = usize> + '_ {
        self.parent
            .iter()
            .enumerate()
            .filter_map(|(i, &p)| (p == i).then_some(i))
    }

    /// Members of every component, ordered by each component's smallest
    /// pixel index. Pixels inside a component are ascending.
    #[must_use]
    pub fn components(&self) -> Vec<Vec<usize>> {
        let mut slot_of_root = vec![UNSET; self.parent.len()];
        let mut groups: Vec<Vec<usize>> = Vec::with_capacity(self.components);
        for i in 0..self.parent.len() {
            let Some(root) = self.find_root(i) else {
                continue;
            };
            if slot_of_root[root] == UNSET {
                slot_of_root[root] = groups.len();
                groups.push(Vec::with_capacity(self.size[root]));
            }
            groups[slot_of_root[root]].push(i);
        }
        groups
    }
}
