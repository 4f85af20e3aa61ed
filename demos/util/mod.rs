use clap::Parser;
use structmm::build_info;
use structmm::matmult::{ExecutionStrategy, MatmultParameters};
use structmm::util::*;

#[cfg(feature = "profile-with-puffin")]
use std::sync::Mutex;

#[cfg(feature = "profile-with-puffin")]
static PUFFIN_SERVER: Mutex<Option<puffin_http::Server>> = Mutex::new(None);

/// structmm product executable
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Args {
    /// Domain size, cells per dimension.
    #[arg(short, long, default_value = "256")]
    pub domain_size: i32,

    /// Boxes per dimension.
    #[arg(short, long, default_value = "4")]
    pub boxes: usize,

    /// Number of ranks, one thread each.
    #[arg(short, long, default_value = "1")]
    pub ranks: usize,

    /// The number of threads to use for evaluation.
    #[arg(short, long, default_value = "8")]
    pub threads: usize,

    /// Evaluate boxes sequentially.
    #[arg(long)]
    pub sequential: bool,

    /// Smallest loop run in parallel.
    #[arg(long, default_value = "4096")]
    pub min_parallel_points: usize,

    /// How many times to repeat the product.
    #[arg(long, default_value = "1")]
    pub repeats: usize,

    /// Print build information and quit
    #[arg(long)]
    pub build_info: bool,

    /// Library log level, RUST_LOG overrides it.
    #[arg(long, default_value = "warn")]
    pub log_level: log::LevelFilter,
}

impl Args {
    pub fn matmult_parameters(&self) -> MatmultParameters {
        MatmultParameters {
            strategy: if self.sequential {
                ExecutionStrategy::Sequential
            } else {
                ExecutionStrategy::Parallel
            },
            min_parallel_points: self.min_parallel_points,
            ..Default::default()
        }
    }

    pub fn domain<const GRID_DIMENSION: usize>(&self) -> AABB<GRID_DIMENSION> {
        AABB::from_mm(
            Coord::zero(),
            Coord::repeat(self.domain_size - 1),
        )
    }

    pub fn cli_setup(name: &str) -> Self {
        println!("EXAMPLE: {}", name);
        println!("GIT: {}", env!("GIT_DESCRIBE"));
        let args = Args::parse();
        env_logger::Builder::new()
            .filter_level(args.log_level)
            .parse_default_env()
            .init();

        if args.build_info {
            build_info::print_report(name, &args.matmult_parameters(), args.ranks);
            std::process::exit(0);
        }

        #[cfg(feature = "profile-with-puffin")]
        {
            let mut server_lock = PUFFIN_SERVER.lock().unwrap();
            let server_addr = format!("127.0.0.1:{}", puffin_http::DEFAULT_PORT);
            println!("Initializing profiling server:");
            println!("Run this to view profiling data:  puffin_viewer {server_addr}");
            let server = puffin_http::Server::new(&server_addr).unwrap();
            std::thread::sleep(std::time::Duration::from_secs(2));
            profiling::puffin::set_scopes_on(true);
            profiling::finish_frame!();
            println!("t: {}", server.num_clients());
            *server_lock = Some(server);
        }

        rayon::ThreadPoolBuilder::new()
            .num_threads(args.threads)
            .thread_name(|i| format!("rayon_thread_{}", i))
            .build_global()
            .unwrap();

        args
    }

    pub fn finish(&self) {
        profiling::finish_frame!();
        #[cfg(feature = "profile-with-puffin")]
        {
            println!("Flushing profiler");
            PUFFIN_SERVER.lock().unwrap().take();
        }
    }
}

/// Elapsed seconds, on stderr.
pub fn report_elapsed(now: std::time::Instant) {
    eprintln!("{}", now.elapsed().as_nanos() as f64 / 1000000000.0);
}
