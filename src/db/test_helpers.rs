use crate::db::client::StoreClient;
use crate::db::migrations;

#[allow(dead_code)]
pub fn setup_test_db() -> StoreClient {
    setup_test_db_with(true)
}

#[allow(dead_code)]
pub fn setup_test_db_with(run_migrations: bool) -> StoreClient {
    std::fs::create_dir(".tmp").err();
    std::fs::remove_file(".tmp/test.db").err();
    let client = StoreClient::new("file:.tmp/test.db").unwrap();
    if run_migrations {
        migrations::run_pending(&client.conn).unwrap();
    }
    client
}
