/// How the product engine walks the entries of a box.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionStrategy {
    /// Every entry on the calling thread.
    Sequential,

    /// Entries of a box are spread over the rayon thread pool.
    Parallel,
}

/// Product evaluation is configurable.
/// These are all the parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MatmultParameters {
    pub strategy: ExecutionStrategy,

    /// Boxes with fewer product points than this run sequentially
    /// regardless of `strategy`.
    pub min_parallel_points: usize,

    /// Tag used for the first ghost exchange, each exchange takes the next one.
    pub first_tag: u64,
}

impl std::default::Default for MatmultParameters {
    fn default() -> Self {
        MatmultParameters {
            strategy: ExecutionStrategy::Parallel,
            min_parallel_points: 4096,
            first_tag: 1000,
        }
    }
}
