//! 相似图的连通分量

/// 并查集，按大小合并并在查找时压缩路径
pub struct UnionFind {
    parent: Vec<usize>,
    size: Vec<usize>,
}

impl UnionFind {
    pub fn new(n: usize) -> Self {
        Self { parent: (0..n).collect(), size: vec![1; n] }
    }

    pub fn find(&mut self, mut x: usize) -> usize {
        while self.parent[x] != x {
            self.parent[x] = self.parent[self.parent[x]];
            x = self.parent[x];
        }
        x
    }

    /// 合并两个集合，若原本就在同一集合中则返回 false
    pub fn union(&mut self, a: usize, b: usize) -> bool {
        let (mut a, mut b) = (self.find(a), self.find(b));
        if a == b {
            return false;
        }
        if self.size[a] < self.size[b] {
            std::mem::swap(&mut a, &mut b);
        }
        self.parent[b] = a;
        self.size[a] += self.size[b];
        true
    }
}

/// 计算 n 个节点的无向图的全部连通分量
///
/// 每个分量内部升序排列，分量之间按最小成员排序，孤立节点各自成为一个分量
pub fn connected_components(n: usize, edges: &[(usize, usize)]) -> Vec<Vec<usize>> {
    let mut uf = UnionFind::new(n);
    for &(a, b) in edges {
        uf.union(a, b);
    }

    let mut slot = vec![usize::MAX; n];
    let mut components: Vec<Vec<usize>> = vec![];
    for i in 0..n {
        let root = uf.find(i);
        if slot[root] == usize::MAX {
            slot[root] = components.len();
            components.push(vec![]);
        }
        components[slot[root]].push(i);
    }
    components
}
