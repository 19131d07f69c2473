//! A lightweight MongoDB client driver.
//!
//! The client multiplexes logical requests from many threads onto a bounded
//! pool of authenticated server connections, speaking both the legacy OP_*
//! opcode family and the modern OP_MSG command protocol.
//!
//! ```no_run
//! # #[macro_use(bson, doc)]
//! # extern crate bson;
//! # extern crate mongo_driver;
//! use mongo_driver::{Client, ThreadedClient};
//!
//! # fn main() {
//! let client = Client::with_uri("mongodb://localhost:27017/test")
//!     .expect("failed to connect");
//! let coll = client.get_collection("test.movies").unwrap();
//!
//! coll.insert_one(doc! { "title": "Jaws", "year": 1975 }).unwrap();
//! let mut cursor = coll.find(Some(doc! { "year": 1975 }), None).unwrap();
//! for movie in cursor.by_ref() {
//!     println!("{}", movie.unwrap());
//! }
//! # }
//! ```
#[macro_use]
extern crate bitflags;
#[macro_use(bson, doc)]
extern crate bson;
extern crate bufstream;
extern crate byteorder;
extern crate chrono;
extern crate data_encoding;
extern crate hex;
extern crate hmac;
#[macro_use]
extern crate log;
extern crate md5;
#[cfg(feature = "ssl")]
extern crate openssl;
extern crate pbkdf2;
extern crate rand;
extern crate semver;
extern crate serde;
#[macro_use]
extern crate serde_derive;
extern crate sha1;
extern crate time;

pub mod apm;
pub mod auth;
pub mod coll;
pub mod common;
pub mod connection;
pub mod connstring;
pub mod cursor;
pub mod db;
pub mod error;
pub mod pool;
#[cfg(feature = "ssl")]
pub mod ssl;
pub mod stream;
pub mod wire_protocol;

pub use error::{Error, Result};

use apm::{CommandResult, CommandStarted, Listener};
use coll::Collection;
use common::DatabaseInfo;
use connstring::{ConnectionString, Host};
use db::{Database, ThreadedDatabase};
use pool::{ConnectionPool, PooledConnection};
use std::sync::Arc;

/// Interfaces with a MongoDB server.
#[derive(Debug)]
pub struct ClientInner {
    /// The settings the client was built from.
    pub config: ConnectionString,
    pool: ConnectionPool,
    listener: Listener,
}

/// A thread-safe handle to a MongoDB client.
pub type Client = Arc<ClientInner>;

pub trait ThreadedClient: Sized {
    /// Connects to a single unauthenticated server by host and port.
    fn connect(host: &str, port: u16) -> Result<Self>;
    /// Creates a client from a MongoDB connection string URI, as defined by
    /// [the manual](https://docs.mongodb.org/manual/reference/connection-string/).
    fn with_uri(uri: &str) -> Result<Self>;
    /// Creates a client from parsed settings.
    fn with_config(config: ConnectionString) -> Result<Self>;
    /// Creates a database representation.
    fn db(&self, name: &str) -> Database;
    /// Resolves a `db.coll` namespace into a collection representation.
    fn get_collection(&self, namespace: &str) -> Result<Collection>;
    /// Checks out an exclusive pooled connection.
    fn acquire_connection(&self) -> Result<PooledConnection>;
    /// The databases present on the server.
    fn list_databases(&self) -> Result<Vec<DatabaseInfo>>;
    /// Closes every idle pooled connection, returning how many were closed.
    fn cleanup_connections(&self) -> usize;
    /// Drops the database named `name`.
    fn drop_database(&self, name: &str) -> Result<()>;
    /// Registers a hook run before every command.
    fn add_start_hook(&self, hook: fn(&CommandStarted)) -> Result<()>;
    /// Registers a hook run after every command completes or fails.
    fn add_completion_hook(&self, hook: fn(&CommandResult)) -> Result<()>;
}

impl ThreadedClient for Client {
    fn connect(host: &str, port: u16) -> Result<Client> {
        Client::with_config(ConnectionString::new(host, port))
    }

    fn with_uri(uri: &str) -> Result<Client> {
        Client::with_config(connstring::parse(uri)?)
    }

    fn with_config(config: ConnectionString) -> Result<Client> {
        // Replica-set seed lists are recorded but not chased; only the
        // first host is dialed.
        let host = match config.hosts.first() {
            Some(host) => host.clone(),
            None => return Err(Error::ParseError("no hosts configured".to_owned())),
        };
        if config.hosts.len() > 1 {
            debug!(
                "{} seed hosts configured; only {} will be used",
                config.hosts.len(),
                host
            );
        }

        let pool = ConnectionPool::new(host, &config);
        let client: Client = Arc::new(ClientInner {
            config: config,
            pool: pool,
            listener: Listener::new(),
        });

        // Acquire one connection up front so bad URIs and unreachable
        // servers fail here rather than on the first operation.
        client.acquire_connection().map(|_| ())?;
        Ok(client)
    }

    fn db(&self, name: &str) -> Database {
        Database::open(self.clone(), name, None)
    }

    fn get_collection(&self, namespace: &str) -> Result<Collection> {
        match namespace.find('.') {
            Some(idx) if idx > 0 && idx + 1 < namespace.len() => {
                let db = self.db(&namespace[..idx]);
                Ok(db.collection(&namespace[idx + 1..]))
            }
            _ => {
                Err(Error::ArgumentError(format!(
                    "'{}' is not a 'db.collection' namespace",
                    namespace
                )))
            }
        }
    }

    fn acquire_connection(&self) -> Result<PooledConnection> {
        self.pool.acquire()
    }

    fn list_databases(&self) -> Result<Vec<DatabaseInfo>> {
        let mut conn = self.acquire_connection()?;
        conn.list_databases()
    }

    fn cleanup_connections(&self) -> usize {
        self.pool.remove_unused(|host| {
            debug!("closed idle connection to {}", host);
        })
    }

    fn drop_database(&self, name: &str) -> Result<()> {
        self.db(name).drop_database()
    }

    fn add_start_hook(&self, hook: fn(&CommandStarted)) -> Result<()> {
        self.listener.add_start_hook(hook)
    }

    fn add_completion_hook(&self, hook: fn(&CommandResult)) -> Result<()> {
        self.listener.add_completion_hook(hook)
    }
}

impl ClientInner {
    /// The host this client's pool dials.
    pub fn host(&self) -> &Host {
        &self.pool.host
    }

    pub(crate) fn listener(&self) -> &Listener {
        &self.listener
    }
}
