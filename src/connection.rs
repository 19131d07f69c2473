//! A single logical connection to a server: handshake, authentication, and
//! request/response exchange in both protocol families.
use Error::{self, ArgumentError, CursorNotFoundError, ResponseError};
use Result;

use auth;
use bson::{self, Bson};
use bufstream::BufStream;
use common::{DatabaseInfo, ServerDescription, WireVersion, bson_f64, bson_i64};
use connstring::{ConnectionString, Host};
use error::{CommandException, WriteException};
use std::io::Write;
use stream::{self, Stream};
use wire_protocol::flags::{OpInsertFlags, OpMsgFlags, OpQueryFlags, OpRemoveFlags, OpReplyFlags,
                           OpUpdateFlags};
use wire_protocol::operations::Message;

/// One batch of documents pulled through the legacy query protocol.
#[derive(Debug)]
pub struct QueryReply {
    pub cursor_id: i64,
    pub flags: OpReplyFlags,
    pub starting_from: i32,
    pub documents: Vec<bson::Document>,
}

/// An authenticated connection to a single server.
///
/// A connection holds at most one outstanding request at any time; it is
/// handed out exclusively by the pool, so nothing here needs further locking.
#[derive(Debug)]
pub struct Connection {
    stream: BufStream<Stream>,
    host: Host,
    config: ConnectionString,
    description: ServerDescription,
    request_id: i32,
    connected: bool,
    authenticated: bool,
}

impl Connection {
    /// Opens a connection, performs the `isMaster` handshake, and
    /// authenticates according to the settings.
    pub fn connect(host: &Host, config: &ConnectionString) -> Result<Connection> {
        let stream = Connection::open_stream(host, config)?;

        let mut conn = Connection {
            stream: BufStream::new(stream),
            host: host.clone(),
            config: config.clone(),
            description: ServerDescription::default(),
            request_id: 0,
            connected: true,
            authenticated: false,
        };

        conn.handshake()?;
        auth::authenticate(&mut conn)?;
        conn.authenticated = true;
        Ok(conn)
    }

    #[cfg(feature = "ssl")]
    fn open_stream(host: &Host, config: &ConnectionString) -> Result<Stream> {
        let tcp = stream::connect_tcp(&host.host_name, host.port, config.connect_timeout)?;
        if let Some(timeout) = config.socket_timeout {
            tcp.set_read_timeout(Some(timeout))?;
            tcp.set_write_timeout(Some(timeout))?;
        }
        if config.ssl {
            let ssl_config = ::ssl::SslConfig::from_connection_string(config);
            Ok(Stream::Ssl(::ssl::connect(&host.host_name, tcp, &ssl_config)?))
        } else {
            Ok(Stream::Tcp(tcp))
        }
    }

    #[cfg(not(feature = "ssl"))]
    fn open_stream(host: &Host, config: &ConnectionString) -> Result<Stream> {
        if config.ssl {
            return Err(ArgumentError(
                "cannot connect with TLS; the driver was built without the `ssl` feature"
                    .to_owned(),
            ));
        }
        let tcp = stream::connect_tcp(&host.host_name, host.port, config.connect_timeout)?;
        if let Some(timeout) = config.socket_timeout {
            tcp.set_read_timeout(Some(timeout))?;
            tcp.set_write_timeout(Some(timeout))?;
        }
        Ok(Stream::Tcp(tcp))
    }

    /// The server snapshot captured during the handshake.
    pub fn description(&self) -> &ServerDescription {
        &self.description
    }

    /// The settings this connection was built from.
    pub fn config(&self) -> &ConnectionString {
        &self.config
    }

    pub fn host(&self) -> &Host {
        &self.host
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    pub fn is_authenticated(&self) -> bool {
        self.authenticated
    }

    pub fn is_ssl(&self) -> bool {
        self.stream.get_ref().is_ssl()
    }

    /// Flushes and closes the connection. Idempotent.
    pub fn disconnect(&mut self) -> Result<()> {
        if !self.connected {
            return Ok(());
        }
        self.connected = false;
        let _ = self.stream.flush();
        self.stream.get_ref().shutdown()?;
        Ok(())
    }

    // Marks the connection unusable after a driver-level failure. The pool
    // retires tainted connections instead of re-queueing them.
    fn taint(&mut self) {
        self.connected = false;
        let _ = self.stream.get_ref().shutdown();
    }

    fn next_request_id(&mut self) -> i32 {
        self.request_id += 1;
        self.request_id
    }

    fn send(&mut self, message: &Message) -> Result<()> {
        if !self.connected {
            return Err(ResponseError("the connection has been closed".to_owned()));
        }
        let outcome = message
            .write(&mut self.stream)
            .and_then(|_| self.stream.flush().map_err(Error::from));
        if let Err(err) = outcome {
            self.taint();
            return Err(err);
        }
        Ok(())
    }

    /// Reads the next message and enforces that it answers `request_id`.
    fn receive(&mut self, request_id: i32) -> Result<Message> {
        let message = match Message::read(&mut self.stream) {
            Ok(message) => message,
            Err(err) => {
                self.taint();
                return Err(err);
            }
        };

        let response_to = message.header().response_to;
        if response_to != request_id {
            self.taint();
            return Err(ResponseError(format!(
                "expected a reply to request {} but the server answered {}",
                request_id, response_to
            )));
        }
        Ok(message)
    }

    // The isMaster handshake always uses the legacy framing, since the
    // server's wire version is not known yet.
    fn handshake(&mut self) -> Result<()> {
        let mut client = doc! {
            "driver": {
                "name": "mongo-driver",
                "version": env!("CARGO_PKG_VERSION")
            },
            "os": {
                "type": ::std::env::consts::OS,
                "architecture": ::std::env::consts::ARCH
            },
            "platform": "rust"
        };
        if let Some(ref app_name) = self.config.app_name {
            client.insert("application", doc! { "name": app_name.clone() });
        }

        let command = doc! { "isMaster": 1, "client": client };
        let reply = self.round_trip_query("admin.$cmd", command)?;
        let reply = check_command_reply(reply, &self.host)?;
        self.description = ServerDescription::from_is_master(&reply);
        Ok(())
    }

    // Sends a single-batch OP_QUERY and returns the first reply document.
    fn round_trip_query(&mut self, namespace: &str, command: bson::Document) -> Result<bson::Document> {
        let request_id = self.next_request_id();
        let message = Message::with_query(
            request_id,
            OpQueryFlags::empty(),
            namespace.to_owned(),
            0,
            -1,
            command,
            None,
        )?;
        self.send(&message)?;

        let reply = self.receive(request_id)?;
        match reply {
            Message::OpReply { flags, mut documents, .. } => {
                if flags.contains(OpReplyFlags::QUERY_FAILURE) {
                    let failure = documents.pop().unwrap_or_else(bson::Document::new);
                    let message = match failure.get("$err") {
                        Some(&Bson::String(ref err)) => err.clone(),
                        _ => "query failure without details".to_owned(),
                    };
                    self.taint();
                    return Err(ResponseError(message));
                }
                if documents.is_empty() {
                    self.taint();
                    return Err(ResponseError("the reply carried no documents".to_owned()));
                }
                Ok(documents.remove(0))
            }
            other => {
                self.taint();
                Err(ResponseError(format!(
                    "expected OP_REPLY to a query but found {}",
                    other.header().op_code
                )))
            }
        }
    }

    /// Submits a command to the named database, choosing OP_MSG or the
    /// legacy `$cmd` query form by server wire version.
    pub fn run_command(&mut self, db: &str, mut command: bson::Document) -> Result<bson::Document> {
        if self.description.max_wire_version >= WireVersion::V36 {
            command.insert("$db", db);
            let request_id = self.next_request_id();
            let message = Message::with_msg(request_id, OpMsgFlags::empty(), command)?;
            self.send(&message)?;
            match self.receive(request_id)? {
                Message::OpMsg { document, .. } => Ok(document),
                other => {
                    self.taint();
                    Err(ResponseError(format!(
                        "expected OP_MSG in reply to a command but found {}",
                        other.header().op_code
                    )))
                }
            }
        } else {
            let namespace = format!("{}.$cmd", db);
            self.round_trip_query(&namespace, command)
        }
    }

    /// `run_command`, raising a database error when the server reports
    /// `ok != 1`.
    pub fn run_command_checked(&mut self, db: &str, command: bson::Document) -> Result<bson::Document> {
        let reply = self.run_command(db, command)?;
        check_command_reply(reply, &self.host)
    }

    /// Legacy OP_INSERT, followed by a `getLastError` round in safe mode.
    pub fn insert(
        &mut self,
        namespace: &str,
        flags: OpInsertFlags,
        documents: Vec<bson::Document>,
    ) -> Result<()> {
        let request_id = self.next_request_id();
        let message = Message::with_insert(request_id, flags, namespace.to_owned(), documents)?;
        self.send(&message)?;
        self.check_last_error(namespace)
    }

    /// Legacy OP_UPDATE, followed by a `getLastError` round in safe mode.
    pub fn update(
        &mut self,
        namespace: &str,
        flags: OpUpdateFlags,
        selector: bson::Document,
        update: bson::Document,
    ) -> Result<()> {
        let request_id = self.next_request_id();
        let message =
            Message::with_update(request_id, namespace.to_owned(), flags, selector, update)?;
        self.send(&message)?;
        self.check_last_error(namespace)
    }

    /// Legacy OP_DELETE, followed by a `getLastError` round in safe mode.
    pub fn delete(
        &mut self,
        namespace: &str,
        flags: OpRemoveFlags,
        selector: bson::Document,
    ) -> Result<()> {
        let request_id = self.next_request_id();
        let message = Message::with_delete(request_id, namespace.to_owned(), flags, selector)?;
        self.send(&message)?;
        self.check_last_error(namespace)
    }

    /// Legacy OP_QUERY returning the opening batch of a cursor.
    pub fn query(
        &mut self,
        namespace: &str,
        flags: OpQueryFlags,
        number_to_skip: i32,
        number_to_return: i32,
        query: bson::Document,
        return_field_selector: Option<bson::Document>,
    ) -> Result<QueryReply> {
        let request_id = self.next_request_id();
        let message = Message::with_query(
            request_id,
            flags,
            namespace.to_owned(),
            number_to_skip,
            number_to_return,
            query,
            return_field_selector,
        )?;
        self.send(&message)?;
        let reply = self.receive(request_id)?;
        self.unpack_reply(reply)
    }

    /// Legacy OP_GET_MORE for the next batch of a live cursor.
    pub fn get_more(
        &mut self,
        namespace: &str,
        number_to_return: i32,
        cursor_id: i64,
    ) -> Result<QueryReply> {
        let request_id = self.next_request_id();
        let message =
            Message::with_get_more(request_id, namespace.to_owned(), number_to_return, cursor_id);
        self.send(&message)?;
        let reply = self.receive(request_id)?;
        self.unpack_reply(reply)
    }

    /// Legacy OP_KILL_CURSORS. Fire-and-forget: the server sends no reply.
    pub fn kill_cursors(&mut self, cursor_ids: &[i64]) -> Result<()> {
        let live_ids: Vec<i64> = cursor_ids.iter().cloned().filter(|&id| id != 0).collect();
        if live_ids.is_empty() {
            return Ok(());
        }
        let request_id = self.next_request_id();
        let message = Message::with_kill_cursors(request_id, live_ids);
        self.send(&message)
    }

    /// The databases present on the server.
    pub fn list_databases(&mut self) -> Result<Vec<DatabaseInfo>> {
        let reply = self.run_command_checked("admin", doc! { "listDatabases": 1 })?;
        let entries = match reply.get("databases") {
            Some(&Bson::Array(ref entries)) => entries.clone(),
            _ => {
                return Err(ResponseError(
                    "listDatabases reply carries no databases array".to_owned(),
                ))
            }
        };

        let mut databases = Vec::with_capacity(entries.len());
        for entry in entries {
            if let Bson::Document(ref doc) = entry {
                let name = match doc.get("name") {
                    Some(&Bson::String(ref name)) => name.clone(),
                    _ => continue,
                };
                databases.push(DatabaseInfo {
                    name: name,
                    size_on_disk: doc.get("sizeOnDisk").and_then(bson_f64).unwrap_or(0.0),
                    empty: match doc.get("empty") {
                        Some(&Bson::Boolean(b)) => b,
                        _ => false,
                    },
                });
            }
        }
        Ok(databases)
    }

    fn unpack_reply(&mut self, reply: Message) -> Result<QueryReply> {
        match reply {
            Message::OpReply { flags, cursor_id, starting_from, mut documents, .. } => {
                if flags.contains(OpReplyFlags::CURSOR_NOT_FOUND) {
                    return Err(CursorNotFoundError);
                }
                if flags.contains(OpReplyFlags::QUERY_FAILURE) {
                    let failure = documents.pop().unwrap_or_else(bson::Document::new);
                    let message = match failure.get("$err") {
                        Some(&Bson::String(ref err)) => err.clone(),
                        _ => "query failure without details".to_owned(),
                    };
                    self.taint();
                    return Err(ResponseError(message));
                }
                Ok(QueryReply {
                    cursor_id: cursor_id,
                    flags: flags,
                    starting_from: starting_from,
                    documents: documents,
                })
            }
            other => {
                self.taint();
                Err(ResponseError(format!(
                    "expected OP_REPLY but found {}",
                    other.header().op_code
                )))
            }
        }
    }

    // In safe mode every legacy write is immediately acknowledged through
    // getLastError, with the configured write-concern parameters attached.
    fn check_last_error(&mut self, namespace: &str) -> Result<()> {
        if !self.config.safe {
            return Ok(());
        }

        let mut command = doc! { "getLastError": 1 };
        self.config.write_concern().append_get_last_error(&mut command);

        let db = namespace_db(namespace).to_owned();
        let reply = self.run_command(&db, command)?;

        if let Some(&Bson::String(ref err)) = reply.get("err") {
            if !err.is_empty() {
                return Err(Error::WriteError(WriteException {
                    code: reply.get("code").and_then(bson_i64).unwrap_or(0) as i32,
                    message: err.clone(),
                    n: reply.get("n").and_then(bson_i64).unwrap_or(0) as i32,
                    connection_id: reply
                        .get("connectionId")
                        .and_then(bson_i64)
                        .map(|id| id as i32),
                }));
            }
        }
        Ok(())
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        let _ = self.disconnect();
    }
}

/// The database portion of a `db.coll` namespace.
pub fn namespace_db(namespace: &str) -> &str {
    match namespace.find('.') {
        Some(idx) => &namespace[..idx],
        None => namespace,
    }
}

/// Raises a database error when a command reply reports `ok != 1`.
pub fn check_command_reply(reply: bson::Document, host: &Host) -> Result<bson::Document> {
    let ok = reply.get("ok").and_then(bson_f64).unwrap_or(0.0);
    if ok == 1.0 {
        return Ok(reply);
    }

    let message = match reply.get("errmsg") {
        Some(&Bson::String(ref errmsg)) => errmsg.clone(),
        _ => format!("command failed on {} without an error message", host),
    };
    Err(Error::CommandError(CommandException {
        code: reply.get("code").and_then(bson_i64).unwrap_or(0) as i32,
        message: message,
        connection_id: reply
            .get("connectionId")
            .and_then(bson_i64)
            .map(|id| id as i32),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use connstring::Host;

    #[test]
    fn namespace_db_extraction() {
        assert_eq!(namespace_db("test.widgets"), "test");
        assert_eq!(namespace_db("test.system.indexes"), "test");
        assert_eq!(namespace_db("bare"), "bare");
    }

    #[test]
    fn command_reply_checking() {
        let host = Host::new("localhost".to_owned(), 27017);
        assert!(check_command_reply(doc! { "ok": 1 }, &host).is_ok());
        assert!(check_command_reply(doc! { "ok": 1.0 }, &host).is_ok());

        let err = check_command_reply(
            doc! { "ok": 0, "errmsg": "not authorized", "code": 13 },
            &host,
        ).unwrap_err();
        match err {
            ::Error::CommandError(exception) => {
                assert_eq!(exception.code, 13);
                assert_eq!(exception.message, "not authorized");
            }
            other => panic!("expected CommandError, got {:?}", other),
        }
    }
}
