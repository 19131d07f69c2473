//! Options for collection-level operations.
//!
//! Every option knows the wire-version window it is valid in; the gate is
//! evaluated at request-build time against the connected server, so a field
//! set by the caller may be dropped, rejected, or flagged as deprecated
//! depending on what the server understands.
use Error::ArgumentError;
use Result;

use bson::{self, Bson};
use common::{ReadConcern, WireVersion};

/// How a field interacts with the server's wire version.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldGate {
    /// Send the field to any server.
    Always,
    /// Drop the field silently on servers below the given version.
    Since(WireVersion),
    /// Drop the field silently on servers at or above the given version.
    Until(WireVersion),
    /// Refuse the whole request on servers below the given version.
    ErrorBefore(WireVersion),
    /// Send everywhere, but log when the server has deprecated the field.
    DeprecatedSince(WireVersion),
}

/// Appends `key` to the command if the gate admits it at `wire_version`.
pub(crate) fn append_gated(
    doc: &mut bson::Document,
    key: &str,
    value: Bson,
    gate: FieldGate,
    wire_version: WireVersion,
) -> Result<()> {
    match gate {
        FieldGate::Always => {
            doc.insert(key, value);
        }
        FieldGate::Since(required) => {
            if wire_version >= required {
                doc.insert(key, value);
            } else {
                debug!(
                    "dropping option '{}': the server speaks wire version {} but {} is required",
                    key, wire_version, required
                );
            }
        }
        FieldGate::Until(removed) => {
            if wire_version < removed {
                doc.insert(key, value);
            } else {
                debug!(
                    "dropping option '{}': removed as of wire version {}",
                    key, removed
                );
            }
        }
        FieldGate::ErrorBefore(required) => {
            if wire_version >= required {
                doc.insert(key, value);
            } else {
                return Err(ArgumentError(format!(
                    "option '{}' requires a server at wire version {} or newer",
                    key, required
                )));
            }
        }
        FieldGate::DeprecatedSince(deprecated) => {
            if wire_version >= deprecated {
                warn!(
                    "option '{}' is deprecated as of wire version {}",
                    key, deprecated
                );
            }
            doc.insert(key, value);
        }
    }
    Ok(())
}

/// Describes the type of cursor to return on find operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CursorType {
    NonTailable,
    Tailable,
    TailableAwait,
}

impl Default for CursorType {
    fn default() -> CursorType {
        CursorType::NonTailable
    }
}

/// Options for find operations.
#[derive(Debug, Clone, Default)]
pub struct FindOptions {
    pub sort: Option<bson::Document>,
    pub projection: Option<bson::Document>,
    pub skip: Option<i64>,
    /// A negative limit requests a single batch of the absolute size.
    pub limit: Option<i64>,
    /// A negative batch size likewise implies `single_batch`.
    pub batch_size: Option<i32>,
    pub single_batch: bool,
    pub cursor_type: CursorType,
    pub no_cursor_timeout: bool,
    pub allow_partial_results: bool,
    pub max_time_ms: Option<i64>,
    /// Only honored by tailable await cursors; cleared otherwise.
    pub max_await_time_ms: Option<i64>,
    pub collation: Option<bson::Document>,
    pub hint: Option<Bson>,
    pub comment: Option<String>,
    pub read_concern: Option<ReadConcern>,
    pub allow_disk_use: Option<bool>,
    pub return_key: bool,
    pub show_record_id: bool,
    pub min: Option<bson::Document>,
    pub max: Option<bson::Document>,
    /// Removed from modern servers; dropped there.
    pub snapshot: Option<bool>,
    /// Still accepted, but deprecated on modern servers.
    pub max_scan: Option<i64>,
}

impl FindOptions {
    pub fn new() -> FindOptions {
        FindOptions::default()
    }

    /// Appends the configured fields onto a find command body.
    pub(crate) fn append_to(
        &self,
        doc: &mut bson::Document,
        wire_version: WireVersion,
    ) -> Result<()> {
        if let Some(ref sort) = self.sort {
            append_gated(doc, "sort", Bson::Document(sort.clone()), FieldGate::Always, wire_version)?;
        }
        if let Some(ref projection) = self.projection {
            append_gated(doc, "projection", Bson::Document(projection.clone()), FieldGate::Always, wire_version)?;
        }
        if let Some(ref hint) = self.hint {
            append_gated(doc, "hint", hint.clone(), FieldGate::Always, wire_version)?;
        }
        if let Some(skip) = self.skip {
            append_gated(doc, "skip", Bson::I64(skip), FieldGate::Always, wire_version)?;
        }
        if let Some(limit) = self.limit {
            append_gated(doc, "limit", Bson::I64(limit), FieldGate::Always, wire_version)?;
        }
        if let Some(batch_size) = self.batch_size {
            append_gated(doc, "batchSize", Bson::I32(batch_size), FieldGate::Always, wire_version)?;
        }
        if self.single_batch {
            append_gated(doc, "singleBatch", Bson::Boolean(true), FieldGate::Always, wire_version)?;
        }
        if let Some(ref comment) = self.comment {
            append_gated(doc, "comment", Bson::String(comment.clone()), FieldGate::Always, wire_version)?;
        }
        if let Some(max_scan) = self.max_scan {
            append_gated(doc, "maxScan", Bson::I64(max_scan), FieldGate::DeprecatedSince(WireVersion::V40), wire_version)?;
        }
        if let Some(max_time_ms) = self.max_time_ms {
            append_gated(doc, "maxTimeMS", Bson::I64(max_time_ms), FieldGate::Always, wire_version)?;
        }
        if let Some(ref min) = self.min {
            append_gated(doc, "min", Bson::Document(min.clone()), FieldGate::Always, wire_version)?;
        }
        if let Some(ref max) = self.max {
            append_gated(doc, "max", Bson::Document(max.clone()), FieldGate::Always, wire_version)?;
        }
        if self.return_key {
            append_gated(doc, "returnKey", Bson::Boolean(true), FieldGate::Always, wire_version)?;
        }
        if self.show_record_id {
            append_gated(doc, "showRecordId", Bson::Boolean(true), FieldGate::Since(WireVersion::V32), wire_version)?;
        }
        if let Some(snapshot) = self.snapshot {
            append_gated(doc, "snapshot", Bson::Boolean(snapshot), FieldGate::Until(WireVersion::V40), wire_version)?;
        }
        match self.cursor_type {
            CursorType::NonTailable => {}
            CursorType::Tailable => {
                append_gated(doc, "tailable", Bson::Boolean(true), FieldGate::Always, wire_version)?;
            }
            CursorType::TailableAwait => {
                append_gated(doc, "tailable", Bson::Boolean(true), FieldGate::Always, wire_version)?;
                append_gated(doc, "awaitData", Bson::Boolean(true), FieldGate::Always, wire_version)?;
            }
        }
        if self.no_cursor_timeout {
            append_gated(doc, "noCursorTimeout", Bson::Boolean(true), FieldGate::Always, wire_version)?;
        }
        if self.allow_partial_results {
            append_gated(doc, "allowPartialResults", Bson::Boolean(true), FieldGate::Always, wire_version)?;
        }
        if let Some(ref collation) = self.collation {
            append_gated(doc, "collation", Bson::Document(collation.clone()), FieldGate::ErrorBefore(WireVersion::V34), wire_version)?;
        }
        if let Some(ref read_concern) = self.read_concern {
            append_gated(doc, "readConcern", Bson::Document(read_concern.to_document()), FieldGate::Since(WireVersion::V32), wire_version)?;
        }
        if let Some(allow_disk_use) = self.allow_disk_use {
            append_gated(doc, "allowDiskUse", Bson::Boolean(allow_disk_use), FieldGate::Since(WireVersion::V42), wire_version)?;
        }
        Ok(())
    }
}

/// Options for aggregation pipelines.
#[derive(Debug, Clone, Default)]
pub struct AggregateOptions {
    pub batch_size: Option<i32>,
    /// Request the query plan instead of results; the reply is a single
    /// document and no server cursor is opened.
    pub explain: bool,
    pub allow_disk_use: Option<bool>,
    pub max_time_ms: Option<i64>,
    pub read_concern: Option<ReadConcern>,
    pub collation: Option<bson::Document>,
    pub hint: Option<Bson>,
    pub comment: Option<String>,
    pub bypass_document_validation: Option<bool>,
}

impl AggregateOptions {
    pub fn new() -> AggregateOptions {
        AggregateOptions::default()
    }

    pub(crate) fn append_to(
        &self,
        doc: &mut bson::Document,
        wire_version: WireVersion,
    ) -> Result<()> {
        if let Some(allow_disk_use) = self.allow_disk_use {
            append_gated(doc, "allowDiskUse", Bson::Boolean(allow_disk_use), FieldGate::Since(WireVersion::V26_2), wire_version)?;
        }
        if let Some(max_time_ms) = self.max_time_ms {
            append_gated(doc, "maxTimeMS", Bson::I64(max_time_ms), FieldGate::Always, wire_version)?;
        }
        if let Some(ref read_concern) = self.read_concern {
            append_gated(doc, "readConcern", Bson::Document(read_concern.to_document()), FieldGate::Since(WireVersion::V32), wire_version)?;
        }
        if let Some(ref collation) = self.collation {
            append_gated(doc, "collation", Bson::Document(collation.clone()), FieldGate::ErrorBefore(WireVersion::V34), wire_version)?;
        }
        if let Some(ref hint) = self.hint {
            append_gated(doc, "hint", hint.clone(), FieldGate::Since(WireVersion::V36), wire_version)?;
        }
        if let Some(ref comment) = self.comment {
            append_gated(doc, "comment", Bson::String(comment.clone()), FieldGate::Since(WireVersion::V36), wire_version)?;
        }
        if let Some(bypass) = self.bypass_document_validation {
            append_gated(doc, "bypassDocumentValidation", Bson::Boolean(bypass), FieldGate::Since(WireVersion::V32), wire_version)?;
        }
        Ok(())
    }
}

/// Options for count operations.
#[derive(Debug, Clone, Default)]
pub struct CountOptions {
    pub skip: Option<i64>,
    pub limit: Option<i64>,
    pub max_time_ms: Option<i64>,
    pub hint: Option<Bson>,
    pub collation: Option<bson::Document>,
}

impl CountOptions {
    pub fn new() -> CountOptions {
        CountOptions::default()
    }
}

/// Options for distinct operations.
#[derive(Debug, Clone, Default)]
pub struct DistinctOptions {
    pub max_time_ms: Option<i64>,
    pub collation: Option<bson::Document>,
}

impl DistinctOptions {
    pub fn new() -> DistinctOptions {
        DistinctOptions::default()
    }

    pub(crate) fn append_to(
        &self,
        doc: &mut bson::Document,
        wire_version: WireVersion,
    ) -> Result<()> {
        if let Some(max_time_ms) = self.max_time_ms {
            append_gated(doc, "maxTimeMS", Bson::I64(max_time_ms), FieldGate::Always, wire_version)?;
        }
        if let Some(ref collation) = self.collation {
            append_gated(doc, "collation", Bson::Document(collation.clone()), FieldGate::ErrorBefore(WireVersion::V34), wire_version)?;
        }
        Ok(())
    }
}

/// Options for insert operations.
#[derive(Debug, Clone, Default)]
pub struct InsertManyOptions {
    /// Stop at the first failure instead of attempting every document.
    pub ordered: Option<bool>,
    pub bypass_document_validation: Option<bool>,
}

impl InsertManyOptions {
    pub fn new() -> InsertManyOptions {
        InsertManyOptions::default()
    }

    pub(crate) fn append_to(
        &self,
        doc: &mut bson::Document,
        wire_version: WireVersion,
    ) -> Result<()> {
        if let Some(ordered) = self.ordered {
            append_gated(doc, "ordered", Bson::Boolean(ordered), FieldGate::Always, wire_version)?;
        }
        if let Some(bypass) = self.bypass_document_validation {
            append_gated(doc, "bypassDocumentValidation", Bson::Boolean(bypass), FieldGate::Since(WireVersion::V32), wire_version)?;
        }
        Ok(())
    }
}

/// Options for update and replace operations.
#[derive(Debug, Clone, Default)]
pub struct UpdateOptions {
    pub upsert: Option<bool>,
    pub collation: Option<bson::Document>,
    pub array_filters: Option<Vec<bson::Document>>,
    pub hint: Option<Bson>,
}

impl UpdateOptions {
    pub fn new() -> UpdateOptions {
        UpdateOptions::default()
    }

    /// Appends onto a single entry of the `updates` array.
    pub(crate) fn append_to_entry(
        &self,
        doc: &mut bson::Document,
        wire_version: WireVersion,
    ) -> Result<()> {
        if let Some(upsert) = self.upsert {
            append_gated(doc, "upsert", Bson::Boolean(upsert), FieldGate::Always, wire_version)?;
        }
        if let Some(ref collation) = self.collation {
            append_gated(doc, "collation", Bson::Document(collation.clone()), FieldGate::ErrorBefore(WireVersion::V34), wire_version)?;
        }
        if let Some(ref filters) = self.array_filters {
            let array = filters.iter().cloned().map(Bson::Document).collect();
            append_gated(doc, "arrayFilters", Bson::Array(array), FieldGate::Since(WireVersion::V36), wire_version)?;
        }
        if let Some(ref hint) = self.hint {
            append_gated(doc, "hint", hint.clone(), FieldGate::Since(WireVersion::V42), wire_version)?;
        }
        Ok(())
    }
}

/// Options for delete operations.
#[derive(Debug, Clone, Default)]
pub struct DeleteOptions {
    pub collation: Option<bson::Document>,
    pub hint: Option<Bson>,
}

impl DeleteOptions {
    pub fn new() -> DeleteOptions {
        DeleteOptions::default()
    }

    /// Appends onto a single entry of the `deletes` array.
    pub(crate) fn append_to_entry(
        &self,
        doc: &mut bson::Document,
        wire_version: WireVersion,
    ) -> Result<()> {
        if let Some(ref collation) = self.collation {
            append_gated(doc, "collation", Bson::Document(collation.clone()), FieldGate::ErrorBefore(WireVersion::V34), wire_version)?;
        }
        if let Some(ref hint) = self.hint {
            append_gated(doc, "hint", hint.clone(), FieldGate::Since(WireVersion::V42), wire_version)?;
        }
        Ok(())
    }
}

/// Options for findAndModify operations.
#[derive(Debug, Clone, Default)]
pub struct FindAndModifyOptions {
    /// Remove the matched document instead of updating it.
    pub remove: bool,
    /// Return the post-image instead of the pre-image.
    pub new: Option<bool>,
    pub fields: Option<bson::Document>,
    pub sort: Option<bson::Document>,
    pub upsert: Option<bool>,
    pub max_time_ms: Option<i64>,
    pub collation: Option<bson::Document>,
    pub bypass_document_validation: Option<bool>,
}

impl FindAndModifyOptions {
    pub fn new() -> FindAndModifyOptions {
        FindAndModifyOptions::default()
    }

    pub(crate) fn append_to(
        &self,
        doc: &mut bson::Document,
        wire_version: WireVersion,
    ) -> Result<()> {
        if let Some(ref sort) = self.sort {
            append_gated(doc, "sort", Bson::Document(sort.clone()), FieldGate::Always, wire_version)?;
        }
        if self.remove {
            append_gated(doc, "remove", Bson::Boolean(true), FieldGate::Always, wire_version)?;
        }
        if let Some(new) = self.new {
            append_gated(doc, "new", Bson::Boolean(new), FieldGate::Always, wire_version)?;
        }
        if let Some(ref fields) = self.fields {
            append_gated(doc, "fields", Bson::Document(fields.clone()), FieldGate::Always, wire_version)?;
        }
        if let Some(upsert) = self.upsert {
            append_gated(doc, "upsert", Bson::Boolean(upsert), FieldGate::Always, wire_version)?;
        }
        if let Some(max_time_ms) = self.max_time_ms {
            append_gated(doc, "maxTimeMS", Bson::I64(max_time_ms), FieldGate::Always, wire_version)?;
        }
        if let Some(ref collation) = self.collation {
            append_gated(doc, "collation", Bson::Document(collation.clone()), FieldGate::ErrorBefore(WireVersion::V34), wire_version)?;
        }
        if let Some(bypass) = self.bypass_document_validation {
            append_gated(doc, "bypassDocumentValidation", Bson::Boolean(bypass), FieldGate::Since(WireVersion::V32), wire_version)?;
        }
        Ok(())
    }
}

/// A single index over a key document, with its creation options.
#[derive(Debug, Clone)]
pub struct IndexModel {
    pub keys: bson::Document,
    pub options: IndexOptions,
}

/// Options for index creation.
#[derive(Debug, Clone, Default)]
pub struct IndexOptions {
    /// The index name; derived from the keys when absent.
    pub name: Option<String>,
    pub unique: Option<bool>,
    pub background: Option<bool>,
    pub sparse: Option<bool>,
    pub expire_after_seconds: Option<i64>,
    pub version: Option<i32>,
    pub default_language: Option<String>,
    pub partial_filter_expression: Option<bson::Document>,
    pub collation: Option<bson::Document>,
}

impl IndexOptions {
    pub fn new() -> IndexOptions {
        IndexOptions::default()
    }
}

impl IndexModel {
    pub fn new(keys: bson::Document, options: Option<IndexOptions>) -> IndexModel {
        IndexModel {
            keys: keys,
            options: options.unwrap_or_else(IndexOptions::new),
        }
    }

    /// The explicit name, or one derived by joining `<field>_<direction>`
    /// pairs in key order.
    pub fn name(&self) -> String {
        match self.options.name {
            Some(ref name) => name.clone(),
            None => {
                let parts: Vec<String> = self.keys
                    .iter()
                    .map(|(key, value)| format!("{}_{}", key, direction_suffix(value)))
                    .collect();
                parts.join("_")
            }
        }
    }

    /// The entry sent inside the `createIndexes` array, or inserted into
    /// `system.indexes` on servers that predate the command.
    pub(crate) fn to_document(&self, wire_version: WireVersion) -> Result<bson::Document> {
        let mut doc = doc! {
            "key": self.keys.clone(),
            "name": self.name()
        };
        let options = &self.options;
        if let Some(unique) = options.unique {
            append_gated(&mut doc, "unique", Bson::Boolean(unique), FieldGate::Always, wire_version)?;
        }
        if let Some(background) = options.background {
            append_gated(&mut doc, "background", Bson::Boolean(background), FieldGate::Always, wire_version)?;
        }
        if let Some(sparse) = options.sparse {
            append_gated(&mut doc, "sparse", Bson::Boolean(sparse), FieldGate::Always, wire_version)?;
        }
        if let Some(expire) = options.expire_after_seconds {
            append_gated(&mut doc, "expireAfterSeconds", Bson::I64(expire), FieldGate::Always, wire_version)?;
        }
        if let Some(version) = options.version {
            append_gated(&mut doc, "v", Bson::I32(version), FieldGate::Always, wire_version)?;
        }
        if let Some(ref language) = options.default_language {
            append_gated(&mut doc, "default_language", Bson::String(language.clone()), FieldGate::Always, wire_version)?;
        }
        if let Some(ref partial) = options.partial_filter_expression {
            append_gated(&mut doc, "partialFilterExpression", Bson::Document(partial.clone()), FieldGate::Since(WireVersion::V32), wire_version)?;
        }
        if let Some(ref collation) = options.collation {
            append_gated(&mut doc, "collation", Bson::Document(collation.clone()), FieldGate::ErrorBefore(WireVersion::V34), wire_version)?;
        }
        Ok(doc)
    }
}

// Index directions are integers (1, -1) or type strings ("text", "2dsphere").
fn direction_suffix(value: &Bson) -> String {
    match *value {
        Bson::I32(i) => i.to_string(),
        Bson::I64(i) => i.to_string(),
        Bson::FloatingPoint(f) => (f as i64).to_string(),
        Bson::String(ref s) => s.clone(),
        ref other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::WireVersion;

    #[test]
    fn since_gate_drops_on_old_servers() {
        let mut doc = bson::Document::new();
        append_gated(
            &mut doc,
            "allowDiskUse",
            Bson::Boolean(true),
            FieldGate::Since(WireVersion::V42),
            WireVersion::V36,
        ).unwrap();
        assert!(doc.get("allowDiskUse").is_none());

        append_gated(
            &mut doc,
            "allowDiskUse",
            Bson::Boolean(true),
            FieldGate::Since(WireVersion::V42),
            WireVersion::V42,
        ).unwrap();
        assert_eq!(doc.get("allowDiskUse"), Some(&Bson::Boolean(true)));
    }

    #[test]
    fn until_gate_drops_on_new_servers() {
        let mut doc = bson::Document::new();
        append_gated(
            &mut doc,
            "snapshot",
            Bson::Boolean(true),
            FieldGate::Until(WireVersion::V40),
            WireVersion::V40,
        ).unwrap();
        assert!(doc.get("snapshot").is_none());

        append_gated(
            &mut doc,
            "snapshot",
            Bson::Boolean(true),
            FieldGate::Until(WireVersion::V40),
            WireVersion::V34,
        ).unwrap();
        assert_eq!(doc.get("snapshot"), Some(&Bson::Boolean(true)));
    }

    #[test]
    fn error_before_gate_rejects_the_request() {
        let mut doc = bson::Document::new();
        let result = append_gated(
            &mut doc,
            "collation",
            Bson::Document(doc! { "locale": "fr" }),
            FieldGate::ErrorBefore(WireVersion::V34),
            WireVersion::V32,
        );
        assert!(result.is_err());
    }

    #[test]
    fn find_options_respect_the_server_version() {
        let mut options = FindOptions::new();
        options.sort = Some(doc! { "a": 1 });
        options.allow_disk_use = Some(true);
        options.snapshot = Some(true);

        let mut old = bson::Document::new();
        options.append_to(&mut old, WireVersion::V34).unwrap();
        assert_eq!(old.get("sort"), Some(&Bson::Document(doc! { "a": 1 })));
        assert!(old.get("allowDiskUse").is_none());
        assert_eq!(old.get("snapshot"), Some(&Bson::Boolean(true)));

        let mut new = bson::Document::new();
        options.append_to(&mut new, WireVersion::V49).unwrap();
        assert_eq!(new.get("allowDiskUse"), Some(&Bson::Boolean(true)));
        assert!(new.get("snapshot").is_none());
    }

    #[test]
    fn index_names_derive_from_keys() {
        let mut keys = bson::Document::new();
        keys.insert("name", Bson::I32(1));
        keys.insert("primarykey", Bson::I32(-1));
        let model = IndexModel::new(keys, None);
        assert_eq!(model.name(), "name_1_primarykey_-1");

        let mut keys = bson::Document::new();
        keys.insert("content", Bson::String("text".to_owned()));
        let model = IndexModel::new(keys, None);
        assert_eq!(model.name(), "content_text");

        let mut options = IndexOptions::new();
        options.name = Some("custom".to_owned());
        let model = IndexModel::new(doc! { "a": 1 }, Some(options));
        assert_eq!(model.name(), "custom");
    }

    #[test]
    fn index_entry_layout() {
        let mut keys = bson::Document::new();
        keys.insert("a", Bson::I32(1));
        let mut options = IndexOptions::new();
        options.unique = Some(true);
        let model = IndexModel::new(keys, Some(options));

        let doc = model.to_document(WireVersion::V36).unwrap();
        let mut fields = doc.keys();
        assert_eq!(fields.next().map(|s| &s[..]), Some("key"));
        assert_eq!(fields.next().map(|s| &s[..]), Some("name"));
        assert_eq!(doc.get("unique"), Some(&Bson::Boolean(true)));
    }
}
