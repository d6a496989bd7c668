use std::path::PathBuf;

use structopt::StructOpt;

#[derive(StructOpt)]
#[structopt(about = "Relayer - run options")]
pub struct RunOptions {
    #[structopt(long = "skip-indexer", help = "Do not scan the source and destination chains")]
    pub skip_indexer: bool,

    #[structopt(long = "skip-processor", help = "Do not settle stored transfers")]
    pub skip_processor: bool,

    #[structopt(long = "http", help = "Enable http read API")]
    pub http: bool,

    #[structopt(
        long = "http-threads",
        help = "Number of threads to use for the server",
        default_value = "2"
    )]
    pub http_threads: u64,

    #[structopt(
        long = "http-port",
        help = "Port number of the server",
        default_value = "8080"
    )]
    pub http_port: u16,

    #[structopt(
        long = "http-addr",
        help = "Bind address of the server",
        default_value = "127.0.0.1"
    )]
    pub http_addr: String,
}

#[derive(StructOpt)]
#[structopt(about = "Scan one chain into the record store")]
pub struct IndexOptions {
    #[structopt(
        long = "chain",
        help = "Which chain to scan",
        default_value = "source",
        possible_values = &["source", "destination"]
    )]
    pub chain: String,

    #[structopt(long = "once", help = "Scan up to the current head and exit")]
    pub once: bool,
}

#[derive(StructOpt)]
#[structopt(about = "Settle a single transfer with retries")]
pub struct SettleOptions {
    #[structopt(long = "transfer-id", help = "32-byte transfer id (0x prefixed hex)")]
    pub transfer_id: String,
}

#[derive(StructOpt)]
#[structopt(about = "List transfers")]
pub struct TransfersOptions {
    #[structopt(
        long = "status",
        help = "Only transfers in this status",
        possible_values = &["pending", "stored", "acknowledged", "completed"],
        case_insensitive = true
    )]
    pub status: Option<String>,

    #[structopt(long = "limit", help = "Maximum number of transfers", default_value = "100")]
    pub limit: i64,
}

#[derive(StructOpt)]
#[structopt(about = "Show deposit with its transfers")]
pub struct DepositOptions {
    #[structopt(long = "deposit-id", help = "32-byte deposit id (0x prefixed hex)")]
    pub deposit_id: String,
}

#[derive(StructOpt)]
#[structopt(about = "Show activity feed of a user")]
pub struct ActivityOptions {
    #[structopt(long = "user", help = "User address")]
    pub user: String,

    #[structopt(long = "limit", help = "Maximum number of activities")]
    pub limit: Option<i64>,
}

#[derive(StructOpt)]
#[structopt(about = "Relayer commands")]
pub enum RelayCommands {
    Run {
        #[structopt(flatten)]
        run_options: RunOptions,
    },
    Index {
        #[structopt(flatten)]
        index_options: IndexOptions,
    },
    Settle {
        #[structopt(flatten)]
        settle_options: SettleOptions,
    },
    #[structopt(about = "Run a single settlement cycle and exit")]
    ProcessOnce,
    Transfers {
        #[structopt(flatten)]
        transfers_options: TransfersOptions,
    },
    Deposit {
        #[structopt(flatten)]
        deposit_options: DepositOptions,
    },
    Activity {
        #[structopt(flatten)]
        activity_options: ActivityOptions,
    },
}

#[derive(StructOpt)]
#[structopt(about = "c0gito cross-chain relayer")]
pub struct RelayOptions {
    #[structopt(
        long = "config",
        help = "Configuration file",
        default_value = "config-relayer.toml"
    )]
    pub config: PathBuf,

    #[structopt(
        long = "sqlite-db-file",
        help = "Sqlite database file, DB_SQLITE_FILENAME takes precedence",
        default_value = "./relayer.sqlite"
    )]
    pub sqlite_db_file: PathBuf,

    #[structopt(long = "sqlite-read-only", help = "Create read only connection")]
    pub sqlite_read_only: bool,

    #[structopt(long = "skip-migrations", help = "Do not run database migrations")]
    pub skip_migrations: bool,

    #[structopt(subcommand)]
    pub commands: RelayCommands,
}
