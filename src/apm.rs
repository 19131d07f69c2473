//! Command monitoring: hooks run around every database command.
use Error;
use Result;

use bson;
use chrono::{DateTime, Utc};
use std::sync::Mutex;

/// Fired just before a command is put on the wire.
pub struct CommandStarted<'a> {
    /// The command document about to be sent.
    pub command: &'a bson::Document,
    pub database_name: &'a str,
    /// The command verb, i.e. the first key of the document.
    pub command_name: &'a str,
    /// The `host:port` the command is sent to.
    pub connection_host: &'a str,
    pub at: DateTime<Utc>,
}

/// Fired once the server has answered, or the exchange failed.
pub enum CommandResult<'a> {
    Success {
        duration_nanos: u64,
        reply: &'a bson::Document,
        command_name: &'a str,
        connection_host: &'a str,
    },
    Failure {
        duration_nanos: u64,
        error: &'a Error,
        command_name: &'a str,
        connection_host: &'a str,
    },
}

/// Registered monitoring hooks for one client.
#[derive(Debug)]
pub struct Listener {
    start_hooks: Mutex<Vec<fn(&CommandStarted)>>,
    completion_hooks: Mutex<Vec<fn(&CommandResult)>>,
}

impl Listener {
    pub fn new() -> Listener {
        Listener {
            start_hooks: Mutex::new(Vec::new()),
            completion_hooks: Mutex::new(Vec::new()),
        }
    }

    pub fn add_start_hook(&self, hook: fn(&CommandStarted)) -> Result<()> {
        self.start_hooks.lock()?.push(hook);
        Ok(())
    }

    pub fn add_completion_hook(&self, hook: fn(&CommandResult)) -> Result<()> {
        self.completion_hooks.lock()?.push(hook);
        Ok(())
    }

    pub fn run_start_hooks(&self, started: &CommandStarted) -> Result<()> {
        for hook in self.start_hooks.lock()?.iter() {
            hook(started);
        }
        Ok(())
    }

    pub fn run_completion_hooks(&self, result: &CommandResult) -> Result<()> {
        for hook in self.completion_hooks.lock()?.iter() {
            hook(result);
        }
        Ok(())
    }
}

impl Default for Listener {
    fn default() -> Listener {
        Listener::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    static STARTS: AtomicUsize = AtomicUsize::new(0);
    static COMPLETIONS: AtomicUsize = AtomicUsize::new(0);

    fn on_start(started: &CommandStarted) {
        assert_eq!(started.command_name, "ping");
        STARTS.fetch_add(1, Ordering::SeqCst);
    }

    fn on_completion(result: &CommandResult) {
        if let CommandResult::Success { command_name, .. } = *result {
            assert_eq!(command_name, "ping");
        }
        COMPLETIONS.fetch_add(1, Ordering::SeqCst);
    }

    #[test]
    fn hooks_fire_in_registration_order() {
        let listener = Listener::new();
        listener.add_start_hook(on_start).unwrap();
        listener.add_completion_hook(on_completion).unwrap();

        let command = doc! { "ping": 1 };
        let reply = doc! { "ok": 1 };

        listener
            .run_start_hooks(&CommandStarted {
                command: &command,
                database_name: "admin",
                command_name: "ping",
                connection_host: "localhost:27017",
                at: Utc::now(),
            })
            .unwrap();
        listener
            .run_completion_hooks(&CommandResult::Success {
                duration_nanos: 1,
                reply: &reply,
                command_name: "ping",
                connection_host: "localhost:27017",
            })
            .unwrap();

        assert!(STARTS.load(Ordering::SeqCst) >= 1);
        assert!(COMPLETIONS.load(Ordering::SeqCst) >= 1);
    }
}
