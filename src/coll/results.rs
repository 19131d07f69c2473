//! Results of collection-level write operations.
use bson::{self, Bson};
use common::bson_i64;
use std::collections::BTreeMap;

/// The outcome of an insertOne operation.
#[derive(Debug, Clone, PartialEq)]
pub struct InsertOneResult {
    pub acknowledged: bool,
    /// The `_id` of the inserted document; generated locally when the
    /// document carried none.
    pub inserted_id: Option<Bson>,
}

impl InsertOneResult {
    pub fn new(acknowledged: bool, inserted_id: Option<Bson>) -> InsertOneResult {
        InsertOneResult {
            acknowledged: acknowledged,
            inserted_id: inserted_id,
        }
    }
}

/// The outcome of an insertMany operation.
#[derive(Debug, Clone, PartialEq)]
pub struct InsertManyResult {
    pub acknowledged: bool,
    /// The `_id` of each inserted document, keyed by its position in the
    /// input batch.
    pub inserted_ids: BTreeMap<usize, Bson>,
}

impl InsertManyResult {
    pub fn new(acknowledged: bool, inserted_ids: BTreeMap<usize, Bson>) -> InsertManyResult {
        InsertManyResult {
            acknowledged: acknowledged,
            inserted_ids: inserted_ids,
        }
    }
}

/// The outcome of an update, replace, or upsert operation.
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateResult {
    pub acknowledged: bool,
    pub matched_count: i64,
    pub modified_count: i64,
    /// The `_id` of the document created by an upsert, when one happened.
    pub upserted_id: Option<Bson>,
}

impl UpdateResult {
    pub fn from_reply(reply: &bson::Document) -> UpdateResult {
        let upserted_id = match reply.get("upserted") {
            Some(&Bson::Array(ref entries)) => {
                entries.iter().next().and_then(|entry| match *entry {
                    Bson::Document(ref doc) => doc.get("_id").cloned(),
                    _ => None,
                })
            }
            _ => None,
        };
        UpdateResult {
            acknowledged: true,
            matched_count: reply.get("n").and_then(bson_i64).unwrap_or(0),
            modified_count: reply.get("nModified").and_then(bson_i64).unwrap_or(0),
            upserted_id: upserted_id,
        }
    }
}

/// The outcome of a delete operation.
#[derive(Debug, Clone, PartialEq)]
pub struct DeleteResult {
    pub acknowledged: bool,
    pub deleted_count: i64,
}

impl DeleteResult {
    pub fn from_reply(reply: &bson::Document) -> DeleteResult {
        DeleteResult {
            acknowledged: true,
            deleted_count: reply.get("n").and_then(bson_i64).unwrap_or(0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn update_result_extracts_upserted_id() {
        let reply = doc! {
            "ok": 1,
            "n": 1,
            "nModified": 0,
            "upserted": [ { "index": 0, "_id": 42 } ]
        };
        let result = UpdateResult::from_reply(&reply);
        assert_eq!(result.matched_count, 1);
        assert_eq!(result.modified_count, 0);
        assert_eq!(result.upserted_id, Some(Bson::I32(42)));
    }

    #[test]
    fn delete_result_counts() {
        let result = DeleteResult::from_reply(&doc! { "ok": 1, "n": 3 });
        assert_eq!(result.deleted_count, 3);
    }
}
