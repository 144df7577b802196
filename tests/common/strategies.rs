use proptest::prelude::*;

/// Acyclic dependency lists: node `i` may only depend on nodes with a lower index.
pub fn acyclic_graph_strategy() -> impl Strategy<Value = Vec<Vec<usize>>> {
    (1usize..12).prop_flat_map(|size| {
        (0..size)
            .map(|i| {
                if i == 0 {
                    Just(Vec::new()).boxed()
                } else {
                    prop::collection::vec(0..i, 0..=i.min(3)).boxed()
                }
            })
            .collect::<Vec<_>>()
    })
}

/// Cache operations: `(key index, read?)` pairs over a small key space.
pub fn cache_ops_strategy() -> impl Strategy<Value = Vec<(u8, bool)>> {
    prop::collection::vec((0u8..20, any::<bool>()), 1..200)
}

pub fn module_name(index: usize) -> String {
    format!("module-{index}")
}
