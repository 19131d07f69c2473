//! Collection-level operations, expressed as ordered command documents.
pub mod options;
pub mod results;

use Error::{self, ArgumentError, ResponseError};
use Result;
use ThreadedClient;

use bson::{self, Bson, oid};
use coll::options::{AggregateOptions, CountOptions, DeleteOptions, DistinctOptions,
                    FindAndModifyOptions, FindOptions, IndexModel, IndexOptions,
                    InsertManyOptions, UpdateOptions};
use coll::results::{DeleteResult, InsertManyResult, InsertOneResult, UpdateResult};
use common::{WireVersion, WriteConcern, bson_i64};
use connection::check_command_reply;
use cursor::Cursor;
use db::{Database, ThreadedDatabase};
use error::CommandException;
use serde::de::DeserializeOwned;
use std::collections::BTreeMap;
use wire_protocol::flags::{OpInsertFlags, OpRemoveFlags, OpUpdateFlags};

/// Interfaces with a MongoDB collection.
pub struct Collection {
    /// The database the collection belongs to.
    pub db: Database,
    /// The collection's write behavior; defaults to the client settings.
    pub write_concern: WriteConcern,
    name: String,
    namespace: String,
}

impl Collection {
    /// Creates a collection representation.
    pub fn new(db: Database, name: &str, write_concern: Option<WriteConcern>) -> Collection {
        let write_concern = write_concern.unwrap_or_else(|| db.client.config.write_concern());
        Collection {
            namespace: format!("{}.{}", db.name, name),
            name: name.to_owned(),
            db: db,
            write_concern: write_concern,
        }
    }

    /// The collection name, without the database prefix.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The full `db.coll` namespace.
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    // ---------------------------------------------------------------------
    // Reads

    /// Starts a query, returning a lazy cursor over the matching documents.
    /// The find is not sent until the first document is requested, so the
    /// cursor's `sort`/`skip`/`limit` may still be applied.
    pub fn find(&self, filter: Option<bson::Document>, options: Option<FindOptions>) -> Result<Cursor> {
        Ok(Cursor::from_find(
            self.db.client.clone(),
            self.namespace.clone(),
            filter.unwrap_or_else(bson::Document::new),
            options.unwrap_or_else(FindOptions::new),
        ))
    }

    /// Returns the first matching document, or `None`.
    pub fn find_one(
        &self,
        filter: Option<bson::Document>,
        options: Option<FindOptions>,
    ) -> Result<Option<bson::Document>> {
        let mut options = options.unwrap_or_else(FindOptions::new);
        options.limit = Some(-1);
        let mut cursor = self.find(filter, Some(options))?;
        match cursor.next() {
            Some(Ok(doc)) => Ok(Some(doc)),
            Some(Err(err)) => Err(err),
            None => Ok(None),
        }
    }

    /// Runs an aggregation pipeline, returning a cursor over its output.
    /// With `explain` set, the reply is the single plan document and no
    /// server cursor is opened.
    pub fn aggregate(
        &self,
        pipeline: Vec<bson::Document>,
        options: Option<AggregateOptions>,
    ) -> Result<Cursor> {
        let options = options.unwrap_or_else(AggregateOptions::new);

        let mut conn = self.db.client.acquire_connection()?;
        let wire_version = conn.description().max_wire_version;

        let mut command = doc! { "aggregate": self.name.clone() };
        let stages: Vec<Bson> = pipeline.into_iter().map(Bson::Document).collect();
        command.insert("pipeline", Bson::Array(stages));
        if options.explain {
            command.insert("explain", Bson::Boolean(true));
        } else {
            let mut cursor_doc = bson::Document::new();
            if let Some(batch_size) = options.batch_size {
                cursor_doc.insert("batchSize", Bson::I32(batch_size));
            }
            command.insert("cursor", cursor_doc);
        }
        options.append_to(&mut command, wire_version)?;

        let reply = conn.run_command_checked(&self.db.name, command)?;
        drop(conn);

        if options.explain {
            Ok(Cursor::from_single_document(
                self.db.client.clone(),
                self.namespace.clone(),
                reply,
            ))
        } else {
            Cursor::from_command_reply(self.db.client.clone(), reply, options.batch_size, None)
        }
    }

    /// Counts matching documents through an aggregation.
    pub fn count_documents(
        &self,
        filter: Option<bson::Document>,
        options: Option<CountOptions>,
    ) -> Result<i64> {
        let options = options.unwrap_or_else(CountOptions::new);

        let mut pipeline = vec![doc! { "$match": filter.unwrap_or_else(bson::Document::new) }];
        if let Some(skip) = options.skip {
            pipeline.push(doc! { "$skip": skip });
        }
        if let Some(limit) = options.limit {
            pipeline.push(doc! { "$limit": limit });
        }
        pipeline.push(doc! { "$group": { "_id": 1, "n": { "$sum": 1 } } });

        let mut aggregate_options = AggregateOptions::new();
        aggregate_options.max_time_ms = options.max_time_ms;
        aggregate_options.hint = options.hint.clone();
        aggregate_options.collation = options.collation.clone();

        let mut cursor = self.aggregate(pipeline, Some(aggregate_options))?;
        match cursor.next() {
            Some(Ok(doc)) => Ok(doc.get("n").and_then(bson_i64).unwrap_or(0)),
            Some(Err(err)) => Err(err),
            // An empty pipeline output means nothing matched.
            None => Ok(0),
        }
    }

    /// A fast, possibly stale document count taken from collection metadata.
    pub fn estimated_document_count(&self) -> Result<i64> {
        let wire_version = {
            let conn = self.db.client.acquire_connection()?;
            conn.description().max_wire_version
        };

        if wire_version >= WireVersion::V49 {
            let pipeline = vec![
                doc! { "$collStats": { "count": {} } },
                doc! { "$group": { "_id": 1, "n": { "$sum": "$count" } } },
            ];
            let mut cursor = self.aggregate(pipeline, None)?;
            match cursor.next() {
                Some(Ok(doc)) => Ok(doc.get("n").and_then(bson_i64).unwrap_or(0)),
                Some(Err(err)) => Err(err),
                None => Ok(0),
            }
        } else {
            let mut conn = self.db.client.acquire_connection()?;
            let reply = conn.run_command_checked(
                &self.db.name,
                doc! { "count": self.name.clone() },
            )?;
            Ok(reply.get("n").and_then(bson_i64).unwrap_or(0))
        }
    }

    /// The distinct values taken by `key` across matching documents.
    pub fn distinct(
        &self,
        key: &str,
        filter: Option<bson::Document>,
        options: Option<DistinctOptions>,
    ) -> Result<Vec<Bson>> {
        let options = options.unwrap_or_else(DistinctOptions::new);

        let mut conn = self.db.client.acquire_connection()?;
        let wire_version = conn.description().max_wire_version;

        let mut command = doc! {
            "distinct": self.name.clone(),
            "key": key,
            "query": filter.unwrap_or_else(bson::Document::new)
        };
        options.append_to(&mut command, wire_version)?;

        let reply = conn.run_command_checked(&self.db.name, command)?;
        match reply.get("values") {
            Some(&Bson::Array(ref values)) => Ok(values.clone()),
            _ => Err(ResponseError(
                "distinct reply carries no values array".to_owned(),
            )),
        }
    }

    /// `distinct`, deserializing each value into `T`.
    pub fn distinct_as<T: DeserializeOwned>(
        &self,
        key: &str,
        filter: Option<bson::Document>,
        options: Option<DistinctOptions>,
    ) -> Result<Vec<T>> {
        let values = self.distinct(key, filter, options)?;
        let mut out = Vec::with_capacity(values.len());
        for value in values {
            out.push(bson::from_bson(value).map_err(Error::from)?);
        }
        Ok(out)
    }

    // ---------------------------------------------------------------------
    // Writes

    /// Inserts one document, generating a local ObjectId `_id` when absent.
    pub fn insert_one(&self, doc: bson::Document) -> Result<InsertOneResult> {
        let mut result = self.insert_many(vec![doc], None)?;
        Ok(InsertOneResult::new(
            result.acknowledged,
            result.inserted_ids.remove(&0),
        ))
    }

    /// Inserts a batch of documents, generating missing `_id`s locally and
    /// reporting them keyed by batch position.
    pub fn insert_many(
        &self,
        mut docs: Vec<bson::Document>,
        options: Option<InsertManyOptions>,
    ) -> Result<InsertManyResult> {
        if docs.is_empty() {
            return Err(ArgumentError("no documents provided to insert".to_owned()));
        }
        let options = options.unwrap_or_else(InsertManyOptions::new);

        let mut inserted_ids = BTreeMap::new();
        for (index, doc) in docs.iter_mut().enumerate() {
            if !doc.contains_key("_id") {
                let mut with_id = doc! { "_id": Bson::ObjectId(oid::ObjectId::new()?) };
                for (key, value) in doc.iter() {
                    with_id.insert(key.clone(), value.clone());
                }
                *doc = with_id;
            }
            inserted_ids.insert(index, doc.get("_id").cloned().unwrap_or(Bson::Null));
        }

        let mut conn = self.db.client.acquire_connection()?;
        let wire_version = conn.description().max_wire_version;

        if wire_version >= WireVersion::V26 {
            let command = build_insert_command(
                &self.name,
                docs,
                &options,
                &self.write_concern,
                wire_version,
            )?;
            let reply = conn.run_command_checked(&self.db.name, command)?;
            check_write_errors(&reply)?;
        } else {
            let mut flags = OpInsertFlags::empty();
            if options.ordered == Some(false) {
                flags |= OpInsertFlags::CONTINUE_ON_ERROR;
            }
            conn.insert(&self.namespace, flags, docs)?;
        }
        Ok(InsertManyResult::new(true, inserted_ids))
    }

    /// Deletes the first matching document.
    pub fn delete_one(
        &self,
        filter: bson::Document,
        options: Option<DeleteOptions>,
    ) -> Result<DeleteResult> {
        self.delete(filter, 1, options)
    }

    /// Deletes every matching document.
    pub fn delete_many(
        &self,
        filter: bson::Document,
        options: Option<DeleteOptions>,
    ) -> Result<DeleteResult> {
        self.delete(filter, 0, options)
    }

    /// Deletes every document in the collection.
    pub fn delete_all(&self, options: Option<DeleteOptions>) -> Result<DeleteResult> {
        self.delete_many(bson::Document::new(), options)
    }

    fn delete(
        &self,
        filter: bson::Document,
        limit: i64,
        options: Option<DeleteOptions>,
    ) -> Result<DeleteResult> {
        let options = options.unwrap_or_else(DeleteOptions::new);

        let mut conn = self.db.client.acquire_connection()?;
        let wire_version = conn.description().max_wire_version;

        if wire_version >= WireVersion::V26 {
            let entry = build_delete_entry(filter, limit, &options, wire_version)?;
            let command =
                build_delete_command(&self.name, vec![entry], &self.write_concern);
            let reply = conn.run_command_checked(&self.db.name, command)?;
            check_write_errors(&reply)?;
            Ok(DeleteResult::from_reply(&reply))
        } else {
            let flags = if limit == 1 {
                OpRemoveFlags::SINGLE_REMOVE
            } else {
                OpRemoveFlags::empty()
            };
            conn.delete(&self.namespace, flags, filter)?;
            Ok(DeleteResult {
                acknowledged: self.db.client.config.safe,
                deleted_count: 0,
            })
        }
    }

    /// Replaces the first matching document wholesale. The replacement must
    /// be a plain document, free of `$`-operators.
    pub fn replace_one(
        &self,
        filter: bson::Document,
        replacement: bson::Document,
        options: Option<UpdateOptions>,
    ) -> Result<UpdateResult> {
        validate_replace(&replacement)?;
        self.update(filter, replacement, false, options)
    }

    /// Applies update operators to the first matching document.
    pub fn update_one(
        &self,
        filter: bson::Document,
        update: bson::Document,
        options: Option<UpdateOptions>,
    ) -> Result<UpdateResult> {
        validate_update(&update)?;
        self.update(filter, update, false, options)
    }

    /// Applies update operators to every matching document.
    pub fn update_many(
        &self,
        filter: bson::Document,
        update: bson::Document,
        options: Option<UpdateOptions>,
    ) -> Result<UpdateResult> {
        validate_update(&update)?;
        self.update(filter, update, true, options)
    }

    fn update(
        &self,
        filter: bson::Document,
        update: bson::Document,
        multi: bool,
        options: Option<UpdateOptions>,
    ) -> Result<UpdateResult> {
        let options = options.unwrap_or_else(UpdateOptions::new);

        let mut conn = self.db.client.acquire_connection()?;
        let wire_version = conn.description().max_wire_version;

        if wire_version >= WireVersion::V26 {
            let entry = build_update_entry(filter, update, multi, &options, wire_version)?;
            let command =
                build_update_command(&self.name, vec![entry], &self.write_concern);
            let reply = conn.run_command_checked(&self.db.name, command)?;
            check_write_errors(&reply)?;
            Ok(UpdateResult::from_reply(&reply))
        } else {
            let mut flags = OpUpdateFlags::empty();
            if multi {
                flags |= OpUpdateFlags::MULTI_UPDATE;
            }
            if options.upsert == Some(true) {
                flags |= OpUpdateFlags::UPSERT;
            }
            conn.update(&self.namespace, flags, filter, update)?;
            Ok(UpdateResult {
                acknowledged: self.db.client.config.safe,
                matched_count: 0,
                modified_count: 0,
                upserted_id: None,
            })
        }
    }

    /// Atomically modifies and returns one document.
    pub fn find_and_modify(
        &self,
        query: bson::Document,
        update: Option<bson::Document>,
        options: Option<FindAndModifyOptions>,
    ) -> Result<Option<bson::Document>> {
        let options = options.unwrap_or_else(FindAndModifyOptions::new);
        if options.remove && update.is_some() {
            return Err(ArgumentError(
                "findAndModify cannot both remove and update".to_owned(),
            ));
        }
        if !options.remove && update.is_none() {
            return Err(ArgumentError(
                "findAndModify requires an update unless removing".to_owned(),
            ));
        }

        let mut conn = self.db.client.acquire_connection()?;
        let wire_version = conn.description().max_wire_version;

        let mut command = doc! {
            "findAndModify": self.name.clone(),
            "query": query
        };
        if let Some(update) = update {
            command.insert("update", Bson::Document(update));
        }
        options.append_to(&mut command, wire_version)?;

        let reply = conn.run_command_checked(&self.db.name, command)?;
        match reply.get("value") {
            Some(&Bson::Document(ref doc)) => Ok(Some(doc.clone())),
            _ => Ok(None),
        }
    }

    // ---------------------------------------------------------------------
    // Indexes and collection management

    /// Creates one index, returning its name.
    pub fn create_index(
        &self,
        keys: bson::Document,
        options: Option<IndexOptions>,
    ) -> Result<String> {
        let mut names = self.create_indexes(vec![IndexModel::new(keys, options)])?;
        Ok(names.remove(0))
    }

    /// Creates a batch of indexes, returning their names.
    pub fn create_indexes(&self, models: Vec<IndexModel>) -> Result<Vec<String>> {
        if models.is_empty() {
            return Err(ArgumentError("no indexes provided to create".to_owned()));
        }

        let mut conn = self.db.client.acquire_connection()?;
        let wire_version = conn.description().max_wire_version;
        let names: Vec<String> = models.iter().map(IndexModel::name).collect();

        if wire_version >= WireVersion::V26 {
            let mut entries = Vec::with_capacity(models.len());
            for model in &models {
                entries.push(Bson::Document(model.to_document(wire_version)?));
            }
            let mut command = doc! { "createIndexes": self.name.clone() };
            command.insert("indexes", Bson::Array(entries));
            conn.run_command_checked(&self.db.name, command)?;
        } else {
            // Before the createIndexes command, indexes were created by
            // inserting descriptors into the system.indexes collection.
            let mut docs = Vec::with_capacity(models.len());
            for model in &models {
                let mut doc = doc! { "ns": self.namespace.clone() };
                for (key, value) in model.to_document(wire_version)?.iter() {
                    doc.insert(key.clone(), value.clone());
                }
                docs.push(doc);
            }
            let system_indexes = format!("{}.system.indexes", self.db.name);
            conn.insert(&system_indexes, OpInsertFlags::empty(), docs)?;
        }
        Ok(names)
    }

    /// Drops a single named index. The wildcard `"*"` is rejected; use
    /// `drop_indexes` to drop them all.
    pub fn drop_index(&self, name: &str) -> Result<()> {
        if name == "*" {
            return Err(ArgumentError(
                "dropIndex does not accept '*'; use drop_indexes instead".to_owned(),
            ));
        }
        self.drop_index_unchecked(name)
    }

    /// Drops several named indexes: one command on servers that accept an
    /// array, a loop of single drops otherwise.
    pub fn drop_index_names(&self, names: &[&str]) -> Result<()> {
        let wire_version = {
            let conn = self.db.client.acquire_connection()?;
            conn.description().max_wire_version
        };

        if wire_version >= WireVersion::V42 {
            let list: Vec<Bson> = names.iter().map(|n| Bson::String((*n).to_owned())).collect();
            let mut command = doc! { "dropIndexes": self.name.clone() };
            command.insert("index", Bson::Array(list));
            let mut conn = self.db.client.acquire_connection()?;
            conn.run_command_checked(&self.db.name, command)?;
            Ok(())
        } else {
            for name in names {
                self.drop_index(name)?;
            }
            Ok(())
        }
    }

    /// Drops every index on the collection.
    pub fn drop_indexes(&self) -> Result<()> {
        self.drop_index_unchecked("*")
    }

    fn drop_index_unchecked(&self, name: &str) -> Result<()> {
        let mut conn = self.db.client.acquire_connection()?;
        let command = doc! {
            "dropIndexes": self.name.clone(),
            "index": name
        };
        conn.run_command_checked(&self.db.name, command)?;
        Ok(())
    }

    /// Lists the collection's indexes as a cursor of descriptor documents.
    pub fn list_indexes(&self) -> Result<Cursor> {
        let wire_version = {
            let conn = self.db.client.acquire_connection()?;
            conn.description().max_wire_version
        };

        if wire_version >= WireVersion::V30 {
            self.db.run_list_command(
                doc! { "listIndexes": self.name.clone() },
                None,
                None,
            )
        } else {
            // Old servers expose index metadata as plain documents.
            let system_indexes = Collection::new(
                self.db.clone(),
                "system.indexes",
                Some(WriteConcern::new()),
            );
            system_indexes.find(Some(doc! { "ns": self.namespace.clone() }), None)
        }
    }

    /// Drops the collection. Dropping a collection that does not exist is
    /// not an error.
    pub fn drop(&self) -> Result<()> {
        let mut conn = self.db.client.acquire_connection()?;
        let reply = conn.run_command(&self.db.name, doc! { "drop": self.name.clone() })?;
        match check_command_reply(reply, conn.host()) {
            Ok(_) => Ok(()),
            Err(Error::CommandError(CommandException { ref message, code, .. }))
                if code == 26 || message.as_str() == "ns not found" => Ok(()),
            Err(err) => Err(err),
        }
    }
}

// ---------------------------------------------------------------------------
// Command builders. These produce the exact ordered documents that go on the
// wire; the command verb is always the first key.

pub(crate) fn build_find_command(
    coll_name: &str,
    filter: bson::Document,
    options: &FindOptions,
    wire_version: WireVersion,
) -> Result<bson::Document> {
    let mut command = doc! {
        "find": coll_name,
        "filter": filter
    };
    options.append_to(&mut command, wire_version)?;
    Ok(command)
}

pub(crate) fn build_insert_command(
    coll_name: &str,
    documents: Vec<bson::Document>,
    options: &InsertManyOptions,
    write_concern: &WriteConcern,
    wire_version: WireVersion,
) -> Result<bson::Document> {
    let mut command = doc! { "insert": coll_name };
    let array: Vec<Bson> = documents.into_iter().map(Bson::Document).collect();
    command.insert("documents", Bson::Array(array));
    options.append_to(&mut command, wire_version)?;
    append_write_concern(&mut command, write_concern);
    Ok(command)
}

pub(crate) fn build_update_entry(
    filter: bson::Document,
    update: bson::Document,
    multi: bool,
    options: &UpdateOptions,
    wire_version: WireVersion,
) -> Result<bson::Document> {
    let mut entry = doc! {
        "q": filter,
        "u": update,
        "multi": multi
    };
    options.append_to_entry(&mut entry, wire_version)?;
    Ok(entry)
}

pub(crate) fn build_update_command(
    coll_name: &str,
    entries: Vec<bson::Document>,
    write_concern: &WriteConcern,
) -> bson::Document {
    let mut command = doc! { "update": coll_name };
    let array: Vec<Bson> = entries.into_iter().map(Bson::Document).collect();
    command.insert("updates", Bson::Array(array));
    append_write_concern(&mut command, write_concern);
    command
}

pub(crate) fn build_delete_entry(
    filter: bson::Document,
    limit: i64,
    options: &DeleteOptions,
    wire_version: WireVersion,
) -> Result<bson::Document> {
    let mut entry = doc! {
        "q": filter,
        "limit": limit
    };
    options.append_to_entry(&mut entry, wire_version)?;
    Ok(entry)
}

pub(crate) fn build_delete_command(
    coll_name: &str,
    entries: Vec<bson::Document>,
    write_concern: &WriteConcern,
) -> bson::Document {
    let mut command = doc! { "delete": coll_name };
    let array: Vec<Bson> = entries.into_iter().map(Bson::Document).collect();
    command.insert("deletes", Bson::Array(array));
    append_write_concern(&mut command, write_concern);
    command
}

fn append_write_concern(command: &mut bson::Document, write_concern: &WriteConcern) {
    if write_concern.is_configured() {
        command.insert("writeConcern", Bson::Document(write_concern.to_document()));
    }
}

// Per-document write failures arrive inside an ok:1 reply.
fn check_write_errors(reply: &bson::Document) -> Result<()> {
    if let Some(&Bson::Array(ref errors)) = reply.get("writeErrors") {
        if let Some(&Bson::Document(ref error)) = errors.iter().next() {
            let message = match error.get("errmsg") {
                Some(&Bson::String(ref errmsg)) => errmsg.clone(),
                _ => "write failed without an error message".to_owned(),
            };
            return Err(Error::CommandError(CommandException {
                code: error.get("code").and_then(bson_i64).unwrap_or(0) as i32,
                message: message,
                connection_id: None,
            }));
        }
    }
    if let Some(&Bson::Document(ref error)) = reply.get("writeConcernError") {
        let message = match error.get("errmsg") {
            Some(&Bson::String(ref errmsg)) => errmsg.clone(),
            _ => "write concern was not satisfied".to_owned(),
        };
        return Err(Error::CommandError(CommandException {
            code: error.get("code").and_then(bson_i64).unwrap_or(0) as i32,
            message: message,
            connection_id: None,
        }));
    }
    Ok(())
}

fn validate_replace(replacement: &bson::Document) -> Result<()> {
    for key in replacement.keys() {
        if key.starts_with('$') {
            return Err(ArgumentError(
                "replacement documents must not contain update operators".to_owned(),
            ));
        }
    }
    Ok(())
}

fn validate_update(update: &bson::Document) -> Result<()> {
    if update.is_empty() {
        return Err(ArgumentError(
            "update documents must contain at least one update operator".to_owned(),
        ));
    }
    for key in update.keys() {
        if !key.starts_with('$') {
            return Err(ArgumentError(
                "update documents may only contain update operators".to_owned(),
            ));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use coll::options::{DeleteOptions, FindOptions, InsertManyOptions, UpdateOptions};
    use common::{WireVersion, WriteConcern};

    #[test]
    fn find_command_layout() {
        let mut options = FindOptions::new();
        options.sort = Some(doc! { "age": -1 });
        options.limit = Some(10);
        let command = build_find_command(
            "people",
            doc! { "alive": true },
            &options,
            WireVersion::V36,
        ).unwrap();

        let mut keys = command.keys();
        assert_eq!(keys.next().map(|s| &s[..]), Some("find"));
        assert_eq!(keys.next().map(|s| &s[..]), Some("filter"));
        assert_eq!(command.get("find"), Some(&Bson::String("people".to_owned())));
        assert_eq!(command.get("limit"), Some(&Bson::I64(10)));
        assert_eq!(command.get("sort"), Some(&Bson::Document(doc! { "age": -1 })));
    }

    #[test]
    fn insert_command_layout() {
        let command = build_insert_command(
            "widgets",
            vec![doc! { "a": 1 }, doc! { "a": 2 }],
            &InsertManyOptions::new(),
            &WriteConcern::new(),
            WireVersion::V36,
        ).unwrap();

        let mut keys = command.keys();
        assert_eq!(keys.next().map(|s| &s[..]), Some("insert"));
        assert_eq!(keys.next().map(|s| &s[..]), Some("documents"));
        match command.get("documents") {
            Some(&Bson::Array(ref docs)) => assert_eq!(docs.len(), 2),
            other => panic!("expected documents array, got {:?}", other),
        }
        // No configured write concern, no writeConcern field.
        assert!(command.get("writeConcern").is_none());
    }

    #[test]
    fn insert_command_carries_write_concern() {
        let mut concern = WriteConcern::new();
        concern.w = Some(Bson::I64(2));
        concern.j = true;
        let command = build_insert_command(
            "widgets",
            vec![doc! { "a": 1 }],
            &InsertManyOptions::new(),
            &concern,
            WireVersion::V36,
        ).unwrap();

        let embedded = match command.get("writeConcern") {
            Some(&Bson::Document(ref doc)) => doc.clone(),
            other => panic!("expected writeConcern document, got {:?}", other),
        };
        assert_eq!(embedded.get("w"), Some(&Bson::I64(2)));
        assert_eq!(embedded.get("j"), Some(&Bson::Boolean(true)));
    }

    #[test]
    fn delete_entry_limits() {
        let one = build_delete_entry(
            doc! { "a": 1 },
            1,
            &DeleteOptions::new(),
            WireVersion::V36,
        ).unwrap();
        assert_eq!(one.get("limit"), Some(&Bson::I64(1)));

        let many = build_delete_entry(
            doc! {},
            0,
            &DeleteOptions::new(),
            WireVersion::V36,
        ).unwrap();
        assert_eq!(many.get("limit"), Some(&Bson::I64(0)));

        let command = build_delete_command("widgets", vec![one, many], &WriteConcern::new());
        let mut keys = command.keys();
        assert_eq!(keys.next().map(|s| &s[..]), Some("delete"));
        assert_eq!(keys.next().map(|s| &s[..]), Some("deletes"));
    }

    #[test]
    fn update_entry_layout() {
        let entry = build_update_entry(
            doc! { "a": 1 },
            doc! { "$set": { "b": 2 } },
            true,
            &UpdateOptions::new(),
            WireVersion::V36,
        ).unwrap();

        let mut keys = entry.keys();
        assert_eq!(keys.next().map(|s| &s[..]), Some("q"));
        assert_eq!(keys.next().map(|s| &s[..]), Some("u"));
        assert_eq!(keys.next().map(|s| &s[..]), Some("multi"));
        assert_eq!(entry.get("multi"), Some(&Bson::Boolean(true)));
    }

    #[test]
    fn replace_validation_rejects_operators() {
        assert!(validate_replace(&doc! { "a": 1 }).is_ok());
        assert!(validate_replace(&doc! { "$set": { "a": 1 } }).is_err());
    }

    #[test]
    fn update_validation_requires_operators() {
        assert!(validate_update(&doc! { "$set": { "a": 1 } }).is_ok());
        assert!(validate_update(&doc! { "a": 1 }).is_err());
        assert!(validate_update(&doc! {}).is_err());
    }

    #[test]
    fn write_errors_surface_as_command_errors() {
        let reply = doc! {
            "ok": 1,
            "n": 0,
            "writeErrors": [ { "index": 0, "code": 11000, "errmsg": "duplicate key" } ]
        };
        match check_write_errors(&reply) {
            Err(::Error::CommandError(exception)) => {
                assert_eq!(exception.code, 11000);
                assert_eq!(exception.message, "duplicate key");
            }
            other => panic!("expected CommandError, got {:?}", other),
        }
    }
}
