/// Disjoint-set forest over dense indices `0..len`.
///
/// Stored as flat parent/rank arrays; `find` uses path halving so it never
/// recurses.
#[derive(Debug, Clone, Default)]
pub struct UnionFind {
    parent: Vec<usize>,
    rank: Vec<u8>,
}

impl UnionFind {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_len(len: usize) -> Self {
        Self {
            parent: (0..len).collect(),
            rank: vec![0; len],
        }
    }

    /// Add a singleton set and return its index
    pub fn push(&mut self) -> usize {
        let index = self.parent.len();
        self.parent.push(index);
        self.rank.push(0);
        index
    }

    pub fn len(&self) -> usize {
        self.parent.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parent.is_empty()
    }

    pub fn find(&mut self, mut x: usize) -> usize {
        while self.parent[x] != x {
            self.parent[x] = self.parent[self.parent[x]];
            x = self.parent[x];
        }
        x
    }

    /// Merge the sets containing `a` and `b`; returns false if already merged
    pub fn union(&mut self, a: usize, b: usize) -> bool {
        let ra = self.find(a);
        let rb = self.find(b);
        if ra == rb {
            return false;
        }

        // Union by rank
        match self.rank[ra].cmp(&self.rank[rb]) {
            std::cmp::Ordering::Less => self.parent[ra] = rb,
            std::cmp::Ordering::Greater => self.parent[rb] = ra,
            std::cmp::Ordering::Equal => {
                self.parent[rb] = ra;
                self.rank[ra] = self.rank[ra].saturating_add(1);
            }
        }
        true
    }

    pub fn connected(&mut self, a: usize, b: usize) -> bool {
        self.find(a) == self.find(b)
    }

    /// All sets, each sorted ascending, ordered by their smallest element
    pub fn groups(&mut self) -> Vec<Vec<usize>> {
        let mut slot_of_root = vec![usize::MAX; self.len()];
        let mut groups: Vec<Vec<usize>> = Vec::new();
        for x in 0..self.len() {
            let root = self.find(x);
            if slot_of_root[root] == usize::MAX {
                slot_of_root[root] = groups.len();
                groups.push(Vec::new());
            }
            groups[slot_of_root[root]].push(x);
        }
        groups
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_union_and_find() {
        let mut sets = UnionFind::with_len(5);
        assert!(sets.union(0, 1));
        assert!(sets.union(3, 4));
        assert!(!sets.union(1, 0));

        assert!(sets.connected(0, 1));
        assert!(!sets.connected(1, 3));
        assert_eq!(sets.groups(), vec![vec![0, 1], vec![2], vec![3, 4]]);
    }

    #[test]
    fn test_transitive_chain_forms_one_set() {
        let mut sets = UnionFind::new();
        for _ in 0..100 {
            sets.push();
        }
        // 0-1, 1-2, ... 98-99: a long chain
        for i in 0..99 {
            sets.union(i + 1, i);
        }
        assert!(sets.connected(0, 99));
        assert_eq!(sets.groups().len(), 1);
    }

    #[test]
    fn test_groups_ordered_by_first_member() {
        let mut sets = UnionFind::with_len(6);
        sets.union(5, 2);
        sets.union(4, 0);
        assert_eq!(
            sets.groups(),
            vec![vec![0, 4], vec![1], vec![2, 5], vec![3]]
        );
    }
}
