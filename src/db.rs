//! Database-level interface: command dispatch and monitoring.
use ::{Client, ThreadedClient};
use Error::ResponseError;
use Result;

use apm::{CommandResult, CommandStarted};
use bson::{self, Bson};
use chrono::Utc;
use coll::Collection;
use common::WriteConcern;
use connection::check_command_reply;
use cursor::Cursor;
use semver::Version;
use std::sync::Arc;
use time;

/// Interfaces with a MongoDB database.
pub struct DatabaseInner {
    /// The database name.
    pub name: String,
    /// A reference to the client that spawned this representation.
    pub client: Client,
    /// Default write behavior for collections of this database.
    pub write_concern: WriteConcern,
}

pub type Database = Arc<DatabaseInner>;

pub trait ThreadedDatabase {
    /// Creates a database representation.
    fn open(client: Client, name: &str, write_concern: Option<WriteConcern>) -> Database;
    /// Creates a collection representation inheriting this database's
    /// write concern.
    fn collection(&self, coll_name: &str) -> Collection;
    /// Sends a command, returning the raw reply document unchecked.
    fn run_command(&self, command: bson::Document) -> Result<bson::Document>;
    /// Sends a command, raising a database error when `ok != 1`.
    fn run_command_checked(&self, command: bson::Document) -> Result<bson::Document>;
    /// Sends a command whose reply opens a cursor (`cursor.firstBatch`),
    /// returning that cursor.
    fn run_list_command(
        &self,
        command: bson::Document,
        batch_size: Option<i32>,
        max_await_time_ms: Option<i64>,
    ) -> Result<Cursor>;
    /// The server version, read from `buildInfo`.
    fn version(&self) -> Result<Version>;
    /// Drops the database.
    fn drop_database(&self) -> Result<()>;
}

impl ThreadedDatabase for Database {
    fn open(client: Client, name: &str, write_concern: Option<WriteConcern>) -> Database {
        let write_concern = write_concern.unwrap_or_else(|| client.config.write_concern());
        Arc::new(DatabaseInner {
            name: name.to_owned(),
            client: client,
            write_concern: write_concern,
        })
    }

    fn collection(&self, coll_name: &str) -> Collection {
        Collection::new(self.clone(), coll_name, Some(self.write_concern.clone()))
    }

    fn run_command(&self, command: bson::Document) -> Result<bson::Document> {
        let mut conn = self.client.acquire_connection()?;
        let connection_host = conn.host().to_string();
        let command_name = command
            .keys()
            .next()
            .cloned()
            .unwrap_or_else(String::new);

        {
            let started = CommandStarted {
                command: &command,
                database_name: &self.name,
                command_name: &command_name,
                connection_host: &connection_host,
                at: Utc::now(),
            };
            self.client.listener().run_start_hooks(&started)?;
        }

        let start_time = time::precise_time_ns();
        let result = conn.run_command(&self.name, command);
        let duration_nanos = time::precise_time_ns() - start_time;

        let completion = match result {
            Ok(ref reply) => {
                CommandResult::Success {
                    duration_nanos: duration_nanos,
                    reply: reply,
                    command_name: &command_name,
                    connection_host: &connection_host,
                }
            }
            Err(ref err) => {
                CommandResult::Failure {
                    duration_nanos: duration_nanos,
                    error: err,
                    command_name: &command_name,
                    connection_host: &connection_host,
                }
            }
        };
        self.client.listener().run_completion_hooks(&completion)?;

        result
    }

    fn run_command_checked(&self, command: bson::Document) -> Result<bson::Document> {
        let reply = self.run_command(command)?;
        check_command_reply(reply, self.client.host())
    }

    fn run_list_command(
        &self,
        mut command: bson::Document,
        batch_size: Option<i32>,
        max_await_time_ms: Option<i64>,
    ) -> Result<Cursor> {
        if !command.contains_key("cursor") {
            let mut cursor_doc = bson::Document::new();
            if let Some(batch_size) = batch_size {
                cursor_doc.insert("batchSize", Bson::I32(batch_size));
            }
            command.insert("cursor", cursor_doc);
        }
        let reply = self.run_command_checked(command)?;
        Cursor::from_command_reply(self.client.clone(), reply, batch_size, max_await_time_ms)
    }

    fn version(&self) -> Result<Version> {
        let reply = self.run_command_checked(doc! { "buildInfo": 1 })?;
        match reply.get("version") {
            Some(&Bson::String(ref version)) => {
                Version::parse(version).map_err(|err| {
                    ResponseError(format!("invalid server version '{}': {}", version, err))
                })
            }
            _ => Err(ResponseError(
                "buildInfo reply carries no version string".to_owned(),
            )),
        }
    }

    fn drop_database(&self) -> Result<()> {
        self.run_command_checked(doc! { "dropDatabase": 1 })?;
        Ok(())
    }
}
