//! Connection pooling for a single MongoDB server.
use Error::OperationError;
use Result;

use connection::Connection;
use connstring::{ConnectionString, Host};
use std::ops::{Deref, DerefMut};
use std::sync::{Arc, Condvar, Mutex};

pub static DEFAULT_POOL_SIZE: usize = 5;

/// Hands out exclusive, authenticated connections to a single server.
#[derive(Clone, Debug)]
pub struct ConnectionPool {
    /// The connection host.
    pub host: Host,
    // Settings used by the factory when a new connection must be built.
    config: ConnectionString,
    // The pooled state.
    inner: Arc<Mutex<Pool>>,
    // A condition variable used for threads waiting for the pool
    // to be repopulated with available connections.
    wait_lock: Arc<Condvar>,
}

#[derive(Debug)]
struct Pool {
    /// The maximum number of concurrent connections allowed.
    size: usize,
    // The current number of live connections, idle and checked out alike.
    len: usize,
    // The idle connections.
    idle: Vec<Connection>,
    // The pool iteration. Incremented on clear; checked-out connections from
    // an older iteration are retired instead of returned.
    iteration: usize,
}

/// Holds a checked-out connection, with logic to return it to the
/// connection pool when dropped.
pub struct PooledConnection {
    // This option will always be Some(conn) until the guard is dropped.
    conn: Option<Connection>,
    // A reference to the pool that the connection was taken from.
    pool: Arc<Mutex<Pool>>,
    // A reference to the waiting condvar associated with the pool.
    wait_lock: Arc<Condvar>,
    // The pool iteration at the moment of extraction.
    iteration: usize,
}

impl Deref for PooledConnection {
    type Target = Connection;
    fn deref(&self) -> &Connection {
        self.conn.as_ref().unwrap()
    }
}

impl DerefMut for PooledConnection {
    fn deref_mut(&mut self) -> &mut Connection {
        self.conn.as_mut().unwrap()
    }
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        // Attempt to lock and return the connection to the pool,
        // or give up if the pool lock has been poisoned.
        if let Ok(mut locked) = self.pool.lock() {
            let conn = self.conn.take().unwrap();
            if conn.is_connected() && self.iteration == locked.iteration {
                locked.idle.push(conn);
            } else {
                // Tainted or stale connections are retired, freeing a slot.
                locked.len -= 1;
            }
            // Notify waiting threads that a connection or slot is available.
            self.wait_lock.notify_one();
        }
    }
}

impl ConnectionPool {
    /// Returns a pool sized by the settings' `max_connections`.
    pub fn new(host: Host, config: &ConnectionString) -> ConnectionPool {
        let size = config.max_connections;
        ConnectionPool::with_size(host, config, size)
    }

    /// Returns a connection pool with a specified capped size.
    pub fn with_size(host: Host, config: &ConnectionString, size: usize) -> ConnectionPool {
        ConnectionPool {
            host: host,
            config: config.clone(),
            wait_lock: Arc::new(Condvar::new()),
            inner: Arc::new(Mutex::new(Pool {
                len: 0,
                size: size,
                idle: Vec::with_capacity(size),
                iteration: 0,
            })),
        }
    }

    /// Sets the maximum number of open connections.
    pub fn set_size(&self, size: usize) -> Result<()> {
        if size < 1 {
            Err(OperationError(
                "The connection pool size must be greater than zero.".to_owned(),
            ))
        } else {
            let mut locked = self.inner.lock()?;
            locked.size = size;
            self.wait_lock.notify_all();
            Ok(())
        }
    }

    /// Drops all idle connections and marks checked-out ones for retirement.
    pub fn clear(&self) {
        if let Ok(mut locked) = self.inner.lock() {
            locked.iteration += 1;
            locked.len -= locked.idle.len();
            locked.idle.clear();
        }
    }

    /// Attempts to acquire an exclusive connection. If none is idle and the
    /// pool has not reached its maximum size, a new connection is built and
    /// authenticated. Otherwise the call blocks until one is released.
    pub fn acquire(&self) -> Result<PooledConnection> {
        let mut locked = self.inner.lock()?;
        if locked.size == 0 {
            return Err(OperationError(
                "The connection pool does not allow connections; \
                 increase the size of the pool."
                    .to_owned(),
            ));
        }

        loop {
            // Acquire an existing idle connection.
            if let Some(conn) = locked.idle.pop() {
                return Ok(PooledConnection {
                    conn: Some(conn),
                    pool: self.inner.clone(),
                    wait_lock: self.wait_lock.clone(),
                    iteration: locked.iteration,
                });
            }

            // Attempt to make a new connection, reserving the slot before
            // releasing the lock so the cap holds while handshaking.
            if locked.len < locked.size {
                locked.len += 1;
                let iteration = locked.iteration;
                drop(locked);

                match Connection::connect(&self.host, &self.config) {
                    Ok(conn) => {
                        return Ok(PooledConnection {
                            conn: Some(conn),
                            pool: self.inner.clone(),
                            wait_lock: self.wait_lock.clone(),
                            iteration: iteration,
                        })
                    }
                    Err(err) => {
                        if let Ok(mut locked) = self.inner.lock() {
                            locked.len -= 1;
                            self.wait_lock.notify_one();
                        }
                        return Err(err);
                    }
                }
            }

            // Release the lock and wait for the pool to be repopulated.
            locked = self.wait_lock.wait(locked)?;
        }
    }

    /// Disconnects every idle connection, invoking `on_close` for each one.
    /// Close failures are logged and do not abort the sweep.
    pub fn remove_unused<F>(&self, mut on_close: F) -> usize
    where
        F: FnMut(&Host),
    {
        let drained: Vec<Connection> = match self.inner.lock() {
            Ok(mut locked) => {
                let count = locked.idle.len();
                locked.len -= count;
                locked.idle.drain(..).collect()
            }
            Err(_) => return 0,
        };

        let count = drained.len();
        for mut conn in drained {
            if let Err(err) = conn.disconnect() {
                warn!("failed to close idle connection to {}: {}", self.host, err);
            }
            on_close(&self.host);
        }
        self.wait_lock.notify_all();
        count
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use connstring::{self, ConnectionString};

    fn test_pool(size: usize) -> ConnectionPool {
        let config = ConnectionString::new("localhost", connstring::DEFAULT_PORT);
        ConnectionPool::with_size(config.hosts[0].clone(), &config, size)
    }

    #[test]
    fn zero_sized_pool_rejects_acquisition() {
        let pool = test_pool(0);
        assert!(pool.acquire().is_err());
    }

    #[test]
    fn set_size_validates() {
        let pool = test_pool(2);
        assert!(pool.set_size(0).is_err());
        assert!(pool.set_size(8).is_ok());
    }

    #[test]
    fn sweep_of_empty_pool_is_a_no_op() {
        let pool = test_pool(2);
        let mut closed = 0;
        assert_eq!(pool.remove_unused(|_| closed += 1), 0);
        assert_eq!(closed, 0);
    }
}
