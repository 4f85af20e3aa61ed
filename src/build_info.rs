use crate::matmult::{ExecutionStrategy, MatmultParameters};

/// JSON record identifying a run, so timings can be matched to a build.
pub fn print_report(name: &str, params: &MatmultParameters, ranks: usize) {
    let strategy = match params.strategy {
        ExecutionStrategy::Sequential => "sequential",
        ExecutionStrategy::Parallel => "parallel",
    };
    println!("{{");
    println!("  \"name\": \"{}\",", name);
    println!("  \"git_describe\": \"{}\",", env!("GIT_DESCRIBE"));
    println!("  \"git_hash\": \"{}\",", env!("GIT_HASH"));
    println!("  \"strategy\": \"{}\",", strategy);
    println!("  \"min_parallel_points\": {},", params.min_parallel_points);
    println!("  \"ranks\": {}", ranks);
    println!("}}");
}
