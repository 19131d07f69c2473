//! Iteration over query results, lazily paged from the server.
use ::{Client, ThreadedClient};
use Error::{self, ArgumentError};
use Result;

use bson::{self, Bson};
use coll;
use coll::options::{CursorType, FindOptions};
use common::WireVersion;
use connection::namespace_db;
use serde::de::DeserializeOwned;
use std::collections::VecDeque;
use std::marker::PhantomData;
use std::mem;
use std::thread;
use wire_protocol::flags::OpQueryFlags;

/// The number of documents fetched per batch when none is requested.
pub const DEFAULT_BATCH_SIZE: i32 = 20;

const FROZEN_ERR: &'static str = "cursor modifications are only allowed before iteration starts";

// A find command that has not been sent yet. Until the first fetch the
// filter and options remain open to modification.
struct PendingFind {
    filter: bson::Document,
    options: FindOptions,
}

/// The response payload of a command that opens or continues a cursor.
#[derive(Debug, Deserialize)]
struct CursorPayload {
    cursor: CursorBatch,
}

/// The `cursor` sub-document of such a payload.
#[derive(Debug, Deserialize)]
struct CursorBatch {
    id: i64,
    ns: String,
    #[serde(alias = "firstBatch", alias = "nextBatch")]
    batch: Vec<bson::Document>,
}

/// A lazy, forward-only stream of documents out of a server cursor.
///
/// The cursor owns its server-side counterpart: when iteration ends early
/// (an imposed limit, an explicit `kill`, or the value being dropped) the
/// server cursor is released exactly once.
pub struct Cursor {
    client: Client,
    namespace: String,
    cursor_id: i64,
    buffer: VecDeque<bson::Document>,
    batch_size: i32,
    /// Documents the caller still wants; `None` means unbounded.
    remaining: Option<i64>,
    pending: Option<PendingFind>,
    started: bool,
    tailable: bool,
    await_data: bool,
    max_await_time_ms: Option<i64>,
}

impl Cursor {
    /// A cursor over a find command that will be sent on the first fetch.
    pub(crate) fn from_find(
        client: Client,
        namespace: String,
        filter: bson::Document,
        options: FindOptions,
    ) -> Cursor {
        let mut options = options;

        // Negative sizes request a single batch of the absolute size.
        let (limit, single_from_limit) = normalize_size(options.limit);
        let (batch_size, single_from_batch) = normalize_size(options.batch_size.map(i64::from));
        options.limit = limit;
        options.batch_size = batch_size.map(|b| b as i32);
        if single_from_limit || single_from_batch {
            options.single_batch = true;
        }

        // maxAwaitTimeMS only applies to an await-capable tailable cursor.
        let max_await_time_ms = if options.cursor_type == CursorType::TailableAwait {
            options.max_await_time_ms
        } else {
            None
        };

        Cursor {
            client: client,
            namespace: namespace,
            cursor_id: 0,
            buffer: VecDeque::new(),
            batch_size: options.batch_size.unwrap_or(DEFAULT_BATCH_SIZE),
            remaining: options.limit.and_then(|l| if l > 0 { Some(l) } else { None }),
            tailable: options.cursor_type != CursorType::NonTailable,
            await_data: options.cursor_type == CursorType::TailableAwait,
            max_await_time_ms: max_await_time_ms,
            pending: Some(PendingFind {
                filter: filter,
                options: options,
            }),
            started: false,
        }
    }

    /// A cursor over a command reply that already carries the first batch
    /// (aggregate, listIndexes, and friends).
    pub(crate) fn from_command_reply(
        client: Client,
        reply: bson::Document,
        batch_size: Option<i32>,
        max_await_time_ms: Option<i64>,
    ) -> Result<Cursor> {
        let payload: CursorPayload =
            bson::from_bson(Bson::Document(reply)).map_err(Error::from)?;

        Ok(Cursor {
            client: client,
            namespace: payload.cursor.ns,
            cursor_id: payload.cursor.id,
            buffer: payload.cursor.batch.into_iter().collect(),
            batch_size: batch_size.unwrap_or(DEFAULT_BATCH_SIZE),
            remaining: None,
            pending: None,
            started: true,
            tailable: false,
            await_data: false,
            max_await_time_ms: max_await_time_ms,
        })
    }

    /// A pre-exhausted cursor holding a single reply document, used where a
    /// command yields one document instead of a batch (explain).
    pub(crate) fn from_single_document(client: Client, namespace: String, doc: bson::Document) -> Cursor {
        let mut buffer = VecDeque::new();
        buffer.push_back(doc);
        Cursor {
            client: client,
            namespace: namespace,
            cursor_id: 0,
            buffer: buffer,
            batch_size: DEFAULT_BATCH_SIZE,
            remaining: None,
            pending: None,
            started: true,
            tailable: false,
            await_data: false,
            max_await_time_ms: None,
        }
    }

    /// The `db.coll` namespace the cursor reads from.
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Whether the server still holds a cursor for this iteration.
    pub fn is_alive(&self) -> bool {
        self.cursor_id != 0 || !self.buffer.is_empty() || self.pending.is_some()
    }

    /// Orders the results. Only permitted before iteration starts.
    pub fn sort(&mut self, sort: bson::Document) -> Result<()> {
        self.pending_options()?.sort = Some(sort);
        Ok(())
    }

    /// Skips the first `skip` results. Only permitted before iteration starts.
    pub fn skip(&mut self, skip: i64) -> Result<()> {
        self.pending_options()?.skip = Some(skip);
        Ok(())
    }

    /// Caps the number of returned documents. Only permitted before
    /// iteration starts; a negative value requests one single batch.
    pub fn limit(&mut self, limit: i64) -> Result<()> {
        {
            let options = self.pending_options()?;
            let (normalized, single) = normalize_size(Some(limit));
            options.limit = normalized;
            if single {
                options.single_batch = true;
            }
        }
        self.remaining = if limit != 0 { Some(limit.abs()) } else { None };
        Ok(())
    }

    /// Adjusts the per-batch document count. Only permitted before
    /// iteration starts.
    pub fn batch_size(&mut self, batch_size: i32) -> Result<()> {
        {
            let options = self.pending_options()?;
            let (normalized, single) = normalize_size(Some(i64::from(batch_size)));
            options.batch_size = normalized.map(|b| b as i32);
            if single {
                options.single_batch = true;
            }
        }
        self.batch_size = batch_size.abs();
        Ok(())
    }

    fn pending_options(&mut self) -> Result<&mut FindOptions> {
        if self.started {
            return Err(ArgumentError(FROZEN_ERR.to_owned()));
        }
        match self.pending {
            Some(ref mut pending) => Ok(&mut pending.options),
            None => Err(ArgumentError(FROZEN_ERR.to_owned())),
        }
    }

    /// Whether another document can be produced, fetching from the server
    /// as needed. The inverse of the forward-range `empty` operation.
    pub fn has_next(&mut self) -> Result<bool> {
        if self.remaining == Some(0) {
            return Ok(false);
        }
        loop {
            if !self.buffer.is_empty() {
                return Ok(true);
            }
            if self.pending.is_some() {
                self.execute()?;
                continue;
            }
            if self.cursor_id == 0 {
                return Ok(false);
            }
            self.fetch_batch()?;
            if self.buffer.is_empty() && self.tailable {
                // A tailable cursor stays alive on an empty batch; report
                // emptiness now and let the caller poll again later.
                return Ok(false);
            }
            if self.buffer.is_empty() && self.cursor_id == 0 {
                return Ok(false);
            }
        }
    }

    /// Releases the server-side cursor. Harmless when already exhausted.
    pub fn kill(&mut self) -> Result<()> {
        if self.cursor_id == 0 {
            return Ok(());
        }
        let cursor_id = mem::replace(&mut self.cursor_id, 0);
        let mut conn = self.client.acquire_connection()?;

        if conn.description().max_wire_version >= WireVersion::V32 {
            let db = namespace_db(&self.namespace).to_owned();
            let command = doc! {
                "killCursors": collection_name(&self.namespace),
                "cursors": [cursor_id]
            };
            conn.run_command(&db, command)?;
            Ok(())
        } else {
            conn.kill_cursors(&[cursor_id])
        }
    }

    /// Adapts the cursor to deserialize every document into `T`.
    pub fn typed<T: DeserializeOwned>(self) -> TypedCursor<T> {
        TypedCursor {
            cursor: self,
            phantom: PhantomData,
        }
    }

    // Sends the deferred find, via the find command on capable servers and
    // the legacy OP_QUERY framing on older ones.
    fn execute(&mut self) -> Result<()> {
        let pending = match self.pending.take() {
            Some(pending) => pending,
            None => return Ok(()),
        };
        self.started = true;

        let mut conn = self.client.acquire_connection()?;
        let wire_version = conn.description().max_wire_version;

        if wire_version >= WireVersion::V32 {
            let db = namespace_db(&self.namespace).to_owned();
            let command = coll::build_find_command(
                collection_name(&self.namespace),
                pending.filter,
                &pending.options,
                wire_version,
            )?;
            let reply = conn.run_command_checked(&db, command)?;
            drop(conn);
            self.apply_payload(reply)
        } else {
            let options = &pending.options;
            let mut flags = OpQueryFlags::empty();
            if self.tailable {
                flags |= OpQueryFlags::TAILABLE_CURSOR;
            }
            if self.await_data {
                flags |= OpQueryFlags::AWAIT_DATA;
            }
            if options.no_cursor_timeout {
                flags |= OpQueryFlags::NO_CURSOR_TIMEOUT;
            }
            if options.allow_partial_results {
                flags |= OpQueryFlags::PARTIAL;
            }

            let query = match options.sort {
                Some(ref sort) => {
                    doc! { "$query": pending.filter.clone(), "$orderby": sort.clone() }
                }
                None => pending.filter.clone(),
            };
            let number_to_return = legacy_number_to_return(
                self.remaining,
                self.batch_size,
                options.single_batch,
            );

            let reply = conn.query(
                &self.namespace,
                flags,
                options.skip.unwrap_or(0) as i32,
                number_to_return,
                query,
                options.projection.clone(),
            )?;
            self.cursor_id = reply.cursor_id;
            self.buffer.extend(reply.documents);
            Ok(())
        }
    }

    // Pulls the next batch of a live cursor.
    fn fetch_batch(&mut self) -> Result<()> {
        let mut conn = self.client.acquire_connection()?;
        let wire_version = conn.description().max_wire_version;

        if wire_version >= WireVersion::V32 {
            let db = namespace_db(&self.namespace).to_owned();
            let mut command = doc! {
                "getMore": self.cursor_id,
                "collection": collection_name(&self.namespace)
            };
            if self.batch_size > 0 {
                command.insert("batchSize", Bson::I32(self.batch_size));
            }
            if self.await_data {
                if let Some(max_await) = self.max_await_time_ms {
                    command.insert("maxTimeMS", Bson::I64(max_await));
                }
            }
            let reply = conn.run_command_checked(&db, command)?;
            drop(conn);
            self.apply_payload(reply)
        } else {
            let number_to_return =
                legacy_number_to_return(self.remaining, self.batch_size, false);
            let reply = conn.get_more(&self.namespace, number_to_return, self.cursor_id)?;
            self.cursor_id = reply.cursor_id;
            self.buffer.extend(reply.documents);
            Ok(())
        }
    }

    fn apply_payload(&mut self, reply: bson::Document) -> Result<()> {
        let payload: CursorPayload =
            bson::from_bson(Bson::Document(reply)).map_err(Error::from)?;
        self.cursor_id = payload.cursor.id;
        self.namespace = payload.cursor.ns;
        self.buffer.extend(payload.cursor.batch);
        Ok(())
    }
}

impl Iterator for Cursor {
    type Item = Result<bson::Document>;

    fn next(&mut self) -> Option<Result<bson::Document>> {
        match self.has_next() {
            Err(err) => Some(Err(err)),
            Ok(false) => None,
            Ok(true) => {
                let doc = match self.buffer.pop_front() {
                    Some(doc) => doc,
                    None => return None,
                };
                if let Some(ref mut remaining) = self.remaining {
                    *remaining -= 1;
                }
                // The imposed limit is exhausted; release the server cursor
                // rather than letting it idle until a timeout.
                if self.remaining == Some(0) && self.cursor_id != 0 {
                    if let Err(err) = self.kill() {
                        warn!(
                            "failed to kill limited cursor on {}: {}",
                            self.namespace, err
                        );
                    }
                }
                Some(Ok(doc))
            }
        }
    }
}

impl Drop for Cursor {
    fn drop(&mut self) {
        if self.cursor_id == 0 {
            return;
        }
        if thread::panicking() {
            // Issuing I/O during an unwind risks a double panic; leak the
            // cursor to the server's timeout instead.
            warn!(
                "leaking server cursor {} on {}: dropped during a panic",
                self.cursor_id, self.namespace
            );
        } else if let Err(err) = self.kill() {
            warn!(
                "failed to kill server cursor on {}: {}",
                self.namespace, err
            );
        }
    }
}

/// A cursor whose documents are deserialized into `T` as they are pulled.
pub struct TypedCursor<T> {
    cursor: Cursor,
    phantom: PhantomData<T>,
}

impl<T: DeserializeOwned> TypedCursor<T> {
    /// The underlying raw cursor.
    pub fn into_inner(self) -> Cursor {
        self.cursor
    }
}

impl<T: DeserializeOwned> Iterator for TypedCursor<T> {
    type Item = Result<T>;

    fn next(&mut self) -> Option<Result<T>> {
        match self.cursor.next() {
            Some(Ok(doc)) => {
                Some(bson::from_bson(Bson::Document(doc)).map_err(Error::from))
            }
            Some(Err(err)) => Some(Err(err)),
            None => None,
        }
    }
}

/// Splits a negative size request into `(absolute size, single batch)`.
fn normalize_size(size: Option<i64>) -> (Option<i64>, bool) {
    match size {
        Some(n) if n < 0 => (Some(-n), true),
        Some(0) => (None, false),
        other => (other, false),
    }
}

/// The collection portion of a `db.coll` namespace.
fn collection_name(namespace: &str) -> &str {
    match namespace.find('.') {
        Some(idx) => &namespace[idx + 1..],
        None => namespace,
    }
}

// The legacy numberToReturn field folds the limit, the batch size, and the
// single-batch request into one signed integer.
fn legacy_number_to_return(remaining: Option<i64>, batch_size: i32, single_batch: bool) -> i32 {
    let batch = if batch_size > 0 { batch_size } else { DEFAULT_BATCH_SIZE };
    match remaining {
        Some(limit) if single_batch => -(limit.min(i64::from(i32::max_value())) as i32),
        Some(limit) if limit < i64::from(batch) => limit as i32,
        _ if single_batch => -batch,
        _ => batch,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn negative_sizes_request_single_batches() {
        assert_eq!(normalize_size(Some(-5)), (Some(5), true));
        assert_eq!(normalize_size(Some(5)), (Some(5), false));
        assert_eq!(normalize_size(Some(0)), (None, false));
        assert_eq!(normalize_size(None), (None, false));
    }

    #[test]
    fn number_to_return_folding() {
        // An unbounded cursor asks for one batch at a time.
        assert_eq!(legacy_number_to_return(None, 20, false), 20);
        assert_eq!(legacy_number_to_return(None, 0, false), DEFAULT_BATCH_SIZE);
        // A small limit caps the batch.
        assert_eq!(legacy_number_to_return(Some(3), 20, false), 3);
        // Single-batch requests are negative on the wire.
        assert_eq!(legacy_number_to_return(Some(7), 20, true), -7);
        assert_eq!(legacy_number_to_return(None, 15, true), -15);
    }

    #[test]
    fn namespace_split() {
        assert_eq!(collection_name("db.coll"), "coll");
        assert_eq!(collection_name("db.system.indexes"), "system.indexes");
    }
}
