use chrono::Utc;
use diesel::prelude::*;
use diesel::result::{DatabaseErrorKind, Error};
use log::{error, info};

use super::error::StoreError;
use super::models::{CommandEntity, NewSubscription, Subscription, User};
use super::schema;

pub struct StoreClient {
    pub conn: SqliteConnection,
}

impl StoreClient {
    /// Connects and turns on foreign-key enforcement, which SQLite leaves off
    /// per connection by default. Migrations are not run here; the migration
    /// tool applies them before the application serves traffic.
    pub fn new(url: &str) -> Result<StoreClient, StoreError> {
        let conn = SqliteConnection::establish(url)?;
        conn.execute("PRAGMA foreign_keys = ON")?;
        Ok(StoreClient { conn })
    }

    pub fn create_user(&self, id: &str) -> Result<User, StoreError> {
        use schema::users;

        let new_user = User {
            id: id.to_string(),
            created_at: Utc::now().to_rfc3339(),
        };

        info!("creating new user: {:?}", new_user);

        match diesel::insert_into(users::table)
            .values(&new_user)
            .execute(&self.conn)
        {
            Ok(_) => Ok(new_user),
            Err(err) => {
                error!("failed to create new user: {}", err);
                Err(err.into())
            }
        }
    }

    /// Cascades to the user's subscriptions and command row.
    pub fn delete_user(&self, id: &str) -> Result<(), StoreError> {
        use schema::users::dsl;
        match diesel::delete(dsl::users.filter(dsl::id.eq(id))).execute(&self.conn) {
            Ok(_) => Ok(()),
            Err(err) => {
                error!("failed to delete user: {}", err);
                Err(err.into())
            }
        }
    }

    pub fn get_users(&self) -> Result<Vec<User>, StoreError> {
        use schema::users::dsl;
        match dsl::users.load::<User>(&self.conn) {
            Ok(result) => Ok(result),
            Err(err) => {
                error!("failed to get users: {}", err);
                Err(err.into())
            }
        }
    }

    pub fn subscribe(&self, user_id: &str, subreddit: &str) -> Result<Subscription, StoreError> {
        use schema::users_subscriptions::dsl;

        info!("subscribing user_id: {}, subreddit: {}", user_id, subreddit);

        let new_subscription = NewSubscription { user_id, subreddit };

        match self.conn.transaction::<_, Error, _>(|| {
            diesel::insert_into(dsl::users_subscriptions)
                .values(&new_subscription)
                .execute(&self.conn)?;

            dsl::users_subscriptions
                .order(dsl::id.desc())
                .first::<Subscription>(&self.conn)
        }) {
            Ok(subscription) => Ok(subscription),
            Err(err) => {
                error!("failed to subscribe: {}", err);
                Err(subscription_error(err, user_id, subreddit))
            }
        }
    }

    pub fn unsubscribe(&self, user_id: &str, subreddit: &str) -> Result<(), StoreError> {
        use schema::users_subscriptions::dsl;

        info!(
            "unsubscribing user_id: {}, subreddit: {}",
            user_id, subreddit
        );

        match diesel::delete(
            dsl::users_subscriptions
                .filter(dsl::user_id.eq(user_id).and(dsl::subreddit.eq(subreddit))),
        )
        .execute(&self.conn)
        {
            Ok(_) => Ok(()),
            Err(err) => {
                error!("failed to unsubscribe: {}", err);
                Err(err.into())
            }
        }
    }

    pub fn get_subscriptions(&self) -> Result<Vec<Subscription>, StoreError> {
        use schema::users_subscriptions::dsl;
        match dsl::users_subscriptions.load::<Subscription>(&self.conn) {
            Ok(result) => Ok(result),
            Err(err) => {
                error!("failed to get subscriptions: {}", err);
                Err(err.into())
            }
        }
    }

    pub fn get_user_subscriptions(&self, user_id: &str) -> Result<Vec<Subscription>, StoreError> {
        use schema::users_subscriptions::dsl;
        match dsl::users_subscriptions
            .filter(dsl::user_id.eq(user_id))
            .load::<Subscription>(&self.conn)
        {
            Ok(result) => Ok(result),
            Err(err) => {
                error!("failed to get subscriptions: {}", err);
                Err(err.into())
            }
        }
    }

    pub fn update_last_sent(&self, id: i32) -> Result<(), StoreError> {
        use schema::users_subscriptions::dsl;

        info!("updating last sent at id: {}", id);

        match diesel::update(dsl::users_subscriptions.find(id))
            .set(dsl::last_sent_at.eq(Utc::now().to_rfc3339()))
            .execute(&self.conn)
        {
            Ok(_) => Ok(()),
            Err(err) => {
                error!("failed to update last sent date: {}", err);
                Err(err.into())
            }
        }
    }

    pub fn get_command(&self, user_id: &str) -> Result<Option<CommandEntity>, StoreError> {
        use schema::commands::dsl;
        match dsl::commands
            .find(user_id)
            .first::<CommandEntity>(&self.conn)
            .optional()
        {
            Ok(result) => Ok(result),
            Err(err) => {
                error!("failed to get command for user {}: {}", user_id, err);
                Err(err.into())
            }
        }
    }

    pub fn upsert_command(&self, command: &CommandEntity) -> Result<(), StoreError> {
        use schema::commands::dsl;

        info!("inserting or updating command: {:?}", command);

        match diesel::replace_into(dsl::commands)
            .values(command)
            .execute(&self.conn)
        {
            Ok(_) => Ok(()),
            Err(err) => {
                error!("failed to insert or update command: {}", err);
                Err(command_error(err, &command.user_id))
            }
        }
    }

    pub fn clear_command(&self, user_id: &str) -> Result<(), StoreError> {
        use schema::commands::dsl;
        match diesel::delete(dsl::commands.find(user_id)).execute(&self.conn) {
            Ok(_) => Ok(()),
            Err(err) => {
                error!("failed to clear command for user {}: {}", user_id, err);
                Err(err.into())
            }
        }
    }
}

fn subscription_error(err: Error, user_id: &str, subreddit: &str) -> StoreError {
    match &err {
        Error::DatabaseError(DatabaseErrorKind::UniqueViolation, _) => {
            StoreError::DuplicateSubscription {
                user_id: user_id.to_string(),
                subreddit: subreddit.to_string(),
            }
        }
        Error::DatabaseError(_, info) if info.message().contains("UNIQUE constraint failed") => {
            StoreError::DuplicateSubscription {
                user_id: user_id.to_string(),
                subreddit: subreddit.to_string(),
            }
        }
        Error::DatabaseError(_, info)
            if info.message().contains("FOREIGN KEY constraint failed") =>
        {
            StoreError::UnknownUser(user_id.to_string())
        }
        _ => StoreError::Database(err),
    }
}

fn command_error(err: Error, user_id: &str) -> StoreError {
    match &err {
        Error::DatabaseError(_, info)
            if info.message().contains("FOREIGN KEY constraint failed") =>
        {
            StoreError::UnknownUser(user_id.to_string())
        }
        _ => StoreError::Database(err),
    }
}

#[cfg(test)]
mod test {
    use serial_test::serial;

    use super::*;
    use crate::db::test_helpers::setup_test_db;

    const USER_ID: &str = "1";

    #[test]
    #[serial]
    fn users() {
        let client = setup_test_db();
        let result = client.get_users().unwrap();
        assert_eq!(result.len(), 0);

        client.create_user(USER_ID).unwrap();
        let result = client.get_users().unwrap();
        assert_eq!(result.len(), 1);

        let result = client.create_user(USER_ID).unwrap_err();
        let result = format!("{}", result);
        assert!(result.contains("UNIQUE constraint failed: users.id"));

        client.delete_user(USER_ID).unwrap();
        let result = client.get_users().unwrap();
        assert_eq!(result.len(), 0);
    }

    #[test]
    #[serial]
    fn user_subscriptions() {
        let client = setup_test_db();
        client.create_user(USER_ID).unwrap();

        let result = client.get_user_subscriptions(USER_ID).unwrap();
        assert_eq!(result.len(), 0);

        client.subscribe(USER_ID, "rust").unwrap();

        let result = client.get_user_subscriptions(USER_ID).unwrap();
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].subreddit, "rust");

        let result = client.subscribe(USER_ID, "rust").unwrap_err();
        assert!(matches!(
            result,
            StoreError::DuplicateSubscription { ref user_id, ref subreddit }
                if user_id == USER_ID && subreddit == "rust"
        ));

        client.subscribe(USER_ID, "Whatcouldgowrong").unwrap();
        let result = client.get_user_subscriptions(USER_ID).unwrap();
        let mut subreddits: Vec<String> = result.into_iter().map(|s| s.subreddit).collect();
        subreddits.sort();
        assert_eq!(subreddits, vec!["Whatcouldgowrong", "rust"]);

        client.unsubscribe(USER_ID, "rust").unwrap();
        let result = client.get_user_subscriptions(USER_ID).unwrap();
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].subreddit, "Whatcouldgowrong");

        client.delete_user(USER_ID).unwrap();
        let result = client.get_user_subscriptions(USER_ID).unwrap();
        assert_eq!(result.len(), 0);
    }

    #[test]
    #[serial]
    fn subscribing_unknown_user_is_rejected() {
        let client = setup_test_db();

        let result = client.subscribe("ghost", "rust").unwrap_err();
        assert!(matches!(
            result,
            StoreError::UnknownUser(ref user_id) if user_id == "ghost"
        ));
        assert_eq!(client.get_subscriptions().unwrap().len(), 0);
    }

    #[test]
    #[serial]
    fn subscriptions() {
        const SECOND_USER_ID: &str = "2";

        let client = setup_test_db();
        client.create_user(USER_ID).unwrap();
        client.create_user(SECOND_USER_ID).unwrap();

        let result = client.get_user_subscriptions(USER_ID).unwrap();
        assert_eq!(result.len(), 0);

        let result = client.get_user_subscriptions(SECOND_USER_ID).unwrap();
        assert_eq!(result.len(), 0);

        client.subscribe(USER_ID, "rust").unwrap();

        let result = client.get_user_subscriptions(SECOND_USER_ID).unwrap();
        assert_eq!(result.len(), 0);

        let result = client.get_subscriptions().unwrap();
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].subreddit, "rust");
    }

    #[test]
    #[serial]
    fn update_last_sent() {
        let client = setup_test_db();
        client.create_user(USER_ID).unwrap();

        let subscription = client.subscribe(USER_ID, "rust").unwrap();
        assert!(subscription.last_sent_at.is_none());

        client.update_last_sent(subscription.id).unwrap();
        let result = client.get_subscriptions().unwrap();
        assert!(result[0].last_sent_at.is_some());
    }

    #[test]
    #[serial]
    fn commands() {
        let client = setup_test_db();
        client.create_user(USER_ID).unwrap();

        let result = client.get_command(USER_ID).unwrap();
        assert!(result.is_none());

        let mut command = CommandEntity::new(USER_ID, "/subscribe", "Start");
        client.upsert_command(&command).unwrap();
        let result = client.get_command(USER_ID).unwrap();
        assert_eq!(result, Some(command.clone()));

        command.advance("Subreddit");
        command.data = Some(r#"{"Start":"payload"}"#.to_string());
        client.upsert_command(&command).unwrap();
        let result = client.get_command(USER_ID).unwrap();
        assert_eq!(result, Some(command));

        client.clear_command(USER_ID).unwrap();
        let result = client.get_command(USER_ID).unwrap();
        assert!(result.is_none());
    }

    #[test]
    #[serial]
    fn commands_require_an_existing_user() {
        let client = setup_test_db();

        let command = CommandEntity::new("ghost", "/subscribe", "Start");
        let result = client.upsert_command(&command).unwrap_err();
        assert!(matches!(
            result,
            StoreError::UnknownUser(ref user_id) if user_id == "ghost"
        ));
    }

    #[test]
    #[serial]
    fn deleting_a_user_clears_their_command() {
        let client = setup_test_db();
        client.create_user(USER_ID).unwrap();

        let command = CommandEntity::new(USER_ID, "/unsubscribe", "Start");
        client.upsert_command(&command).unwrap();

        client.delete_user(USER_ID).unwrap();
        let result = client.get_command(USER_ID).unwrap();
        assert!(result.is_none());
    }
}
