use std::env;
use std::process;

use dotenv::dotenv;
use log::{info, warn};

use subreddit_tracker::db::client::StoreClient;
use subreddit_tracker::db::error::StoreError;
use subreddit_tracker::db::migrations;

fn main() -> Result<(), StoreError> {
    env_logger::init();

    if let Err(err) = dotenv() {
        warn!("failed to load .env file: {}", err);
    }

    let database_url = env::var("DATABASE_URL").expect("DATABASE_URL must be set");
    let client = StoreClient::new(&database_url)?;

    match env::args().nth(1).as_deref() {
        None | Some("migrate") => {
            migrations::run_pending(&client.conn)?;
            info!("database is up to date");
        }
        Some("revert") => {
            let version = migrations::revert_one(&client.conn)?;
            info!("reverted migration {}", version);
        }
        Some("status") => {
            let pending = migrations::pending_versions(&client.conn)?;
            if pending.is_empty() {
                info!("no pending migrations");
            }
            for version in pending {
                info!("pending migration {}", version);
            }
        }
        Some(other) => {
            eprintln!("unknown subcommand: {}", other);
            process::exit(2);
        }
    }

    Ok(())
}
