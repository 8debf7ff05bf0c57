use clap::Parser;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Args {
    /// Node listening host
    #[arg(long, env = "CLUSTERFS_HOST", default_value = "127.0.0.1")]
    pub host: String,

    /// Node listening port
    #[arg(short, long, env = "CLUSTERFS_PORT", default_value_t = 7640)]
    pub port: u16,

    /// Identity of this node as the rest of the pool dials it
    #[arg(long, env = "CLUSTERFS_IDENTITY", default_value = "127.0.0.1")]
    pub identity: String,

    /// Local storage base path
    #[arg(long, env = "CLUSTERFS_ROOTDIR", default_value = "/var/lib/clusterfs")]
    pub root: String,

    /// Registry database URL
    #[arg(
        long,
        env = "CLUSTERFS_DATABASE_URL",
        default_value = "sqlite:///var/lib/clusterfs/registry.db"
    )]
    pub database_url: String,

    /// Key prefix for the ephemeral registry tier
    #[arg(long, env = "CLUSTERFS_CACHE_PREFIX", default_value = "clusterfs/")]
    pub cache_prefix: String,

    /// Capacity of the ephemeral registry tier
    #[arg(long, env = "CLUSTERFS_CACHE_CAPACITY", default_value_t = 10_000)]
    pub cache_capacity: u64,

    /// Redundancy target: minimum copies per file including the local one,
    /// or -1 for every node in the pool
    #[arg(short, long, env = "CLUSTERFS_REDUNDANCY", default_value_t = 1)]
    pub redundancy: i64,

    /// Use https for inter-node transfers
    #[arg(long, env = "CLUSTERFS_SECURE", default_value_t = false)]
    pub secure: bool,

    /// Pool members as identity:port[:endpoint], repeatable or comma-separated
    #[arg(long = "peer", env = "CLUSTERFS_PEERS", value_delimiter = ',')]
    pub peers: Vec<String>,

    /// Seconds between durable registry reconciliations per path
    #[arg(long, env = "CLUSTERFS_RECONCILE_SECS", default_value_t = 60)]
    pub reconcile_secs: u64,

    /// Octal permission mode for files created by the engine
    #[arg(long, env = "CLUSTERFS_FILE_MODE", default_value = "644")]
    pub file_mode: String,
}
