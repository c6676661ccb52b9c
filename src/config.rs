use clap::Parser;
use std::path::PathBuf;

/// Personal watchlist service.
#[derive(Parser, Debug, Clone)]
#[command(name = "mylist", version, about)]
pub struct Settings {
    /// Address the HTTP server listens on
    #[arg(long, env = "MYLIST_BIND", default_value = "127.0.0.1:8080")]
    pub bind: String,

    /// Directory of the database; a temporary database is used when unset
    #[arg(long, env = "MYLIST_DB_PATH")]
    pub db_path: Option<PathBuf>,

    /// User id assumed for requests without an x-user-id header
    #[arg(long, env = "DEFAULT_USER_ID", default_value = "demo-user")]
    pub default_user: String,

    /// Load the demo catalog at startup
    #[arg(long, env = "MYLIST_SEED_DEMO")]
    pub seed_demo: bool,
}
