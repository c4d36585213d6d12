use std::collections::HashMap;
use std::convert::TryFrom;
use std::hash::Hash;
use std::str::FromStr;

use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::Serialize;

use super::error::StoreError;
use super::schema::commands;
use super::schema::users;
use super::schema::users_subscriptions;

#[derive(Debug, Queryable, Insertable)]
#[table_name = "users"]
pub struct User {
    pub id: String,
    pub created_at: String,
}

#[derive(Debug, Queryable)]
pub struct Subscription {
    pub id: i32,
    pub user_id: String,
    pub subreddit: String,
    pub last_sent_at: Option<String>,
}

#[derive(Insertable)]
#[table_name = "users_subscriptions"]
pub struct NewSubscription<'a> {
    pub user_id: &'a str,
    pub subreddit: &'a str,
}

/// Stored row of an in-progress multi-step interaction. One row per user, the
/// command table's primary key is the user id.
#[derive(Debug, Queryable, Insertable, Clone, PartialEq)]
#[table_name = "commands"]
pub struct CommandEntity {
    pub user_id: String,
    pub command: String,
    pub created_at: String,
    pub updated_at: String,
    pub current_step: String,
    pub data: Option<String>,
}

impl CommandEntity {
    pub fn new(user_id: &str, command: &str, step: &str) -> CommandEntity {
        let now = Utc::now().to_rfc3339();
        CommandEntity {
            user_id: user_id.to_string(),
            command: command.to_string(),
            created_at: now.clone(),
            updated_at: now,
            current_step: step.to_string(),
            data: None,
        }
    }

    pub fn advance(&mut self, step: &str) {
        self.current_step = step.to_string();
        self.updated_at = Utc::now().to_rfc3339();
    }
}

/// Typed view over a [`CommandEntity`]: the step is an enum and the payload a
/// per-step map, stored as the step's string name plus a JSON object.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandState<T>
where
    T: Hash + Eq,
{
    pub user_id: String,
    pub command: String,
    pub current_step: T,
    pub data: HashMap<T, String>,
}

impl<T> TryFrom<CommandEntity> for CommandState<T>
where
    T: Hash + Eq + FromStr + DeserializeOwned,
{
    type Error = StoreError;

    fn try_from(entity: CommandEntity) -> Result<Self, StoreError> {
        let current_step = T::from_str(&entity.current_step)
            .map_err(|_| StoreError::InvalidCommandStep(entity.current_step.clone()))?;

        let data = match &entity.data {
            Some(raw) if !raw.is_empty() => serde_json::from_str(raw)?,
            _ => HashMap::new(),
        };

        Ok(CommandState {
            user_id: entity.user_id,
            command: entity.command,
            current_step,
            data,
        })
    }
}

impl<T> CommandState<T>
where
    T: Hash + Eq + Serialize + ToString,
{
    pub fn to_entity(&self) -> Result<CommandEntity, StoreError> {
        let mut entity = CommandEntity::new(
            &self.user_id,
            &self.command,
            &self.current_step.to_string(),
        );
        entity.data = Some(serde_json::to_string(&self.data)?);
        Ok(entity)
    }
}

#[cfg(test)]
mod test {
    use serde::{Deserialize, Serialize};
    use strum_macros::{Display, EnumString};

    use super::*;

    #[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Serialize, Deserialize, Display, EnumString)]
    enum Subscribe {
        Start,
        Subreddit,
    }

    #[test]
    fn command_state_round_trip() {
        let mut state = CommandState {
            user_id: "123".to_string(),
            command: "/subscribe".to_string(),
            current_step: Subscribe::Start,
            data: HashMap::new(),
        };
        state.data.insert(Subscribe::Start, "payload".to_string());
        state.current_step = Subscribe::Subreddit;

        let entity = state.to_entity().unwrap();
        assert_eq!(entity.current_step, "Subreddit");
        assert_eq!(entity.data.as_deref(), Some(r#"{"Start":"payload"}"#));

        let restored = CommandState::<Subscribe>::try_from(entity).unwrap();
        assert_eq!(restored, state);
    }

    #[test]
    fn missing_data_becomes_empty_map() {
        let entity = CommandEntity::new("123", "/subscribe", "Start");
        let state = CommandState::<Subscribe>::try_from(entity).unwrap();
        assert_eq!(state.current_step, Subscribe::Start);
        assert!(state.data.is_empty());
    }

    #[test]
    fn unknown_step_is_rejected() {
        let entity = CommandEntity::new("123", "/subscribe", "Bogus");
        let result = CommandState::<Subscribe>::try_from(entity);
        assert!(matches!(result, Err(StoreError::InvalidCommandStep(step)) if step == "Bogus"));
    }

    #[test]
    fn advance_moves_step_and_bumps_updated_at() {
        let mut entity = CommandEntity::new("123", "/subscribe", "Start");
        let created_at = entity.created_at.clone();
        entity.advance("Subreddit");
        assert_eq!(entity.current_step, "Subreddit");
        assert_eq!(entity.created_at, created_at);
        assert!(entity.updated_at >= created_at);
    }
}
