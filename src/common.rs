//! Library-wide value types shared between the connection and the facades.
use Error::{self, ArgumentError};
use Result;

use bson::{self, Bson};
use connstring::ConnectionString;
use std::fmt;
use std::str::FromStr;

/// Server protocol capability levels, ordered oldest to newest.
///
/// The discriminants are the integer wire versions reported by the server in
/// the `isMaster` handshake; unknown values saturate to the nearest known
/// variant so capability gating stays monotone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum WireVersion {
    Old = 0,
    V26 = 1,
    V26_2 = 2,
    V30 = 3,
    V32 = 4,
    V34 = 5,
    V36 = 6,
    V40 = 7,
    V42 = 8,
    V49 = 12,
}

impl WireVersion {
    pub fn from_i32(version: i32) -> WireVersion {
        match version {
            v if v <= 0 => WireVersion::Old,
            1 => WireVersion::V26,
            2 => WireVersion::V26_2,
            3 => WireVersion::V30,
            4 => WireVersion::V32,
            5 => WireVersion::V34,
            6 => WireVersion::V36,
            7 => WireVersion::V40,
            8..=11 => WireVersion::V42,
            _ => WireVersion::V49,
        }
    }
}

impl fmt::Display for WireVersion {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        write!(fmt, "{}", *self as i32)
    }
}

/// The role a server reported for itself during the handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ServerType {
    Unknown,
    Standalone,
    Mongos,
    RsPrimary,
    RsSecondary,
    RsArbiter,
    RsOther,
    RsGhost,
}

/// A snapshot of the server taken from the `isMaster` handshake reply.
#[derive(Debug, Clone)]
pub struct ServerDescription {
    pub server_type: ServerType,
    pub min_wire_version: WireVersion,
    pub max_wire_version: WireVersion,
    /// Members of the replica set, when the server belongs to one.
    pub hosts: Vec<String>,
    pub passives: Vec<String>,
    pub arbiters: Vec<String>,
    /// Replica-set tags advertised by the server.
    pub tags: bson::Document,
    pub set_name: Option<String>,
    /// The member the server believes is primary.
    pub primary: Option<String>,
    pub election_id: Option<bson::oid::ObjectId>,
    pub logical_session_timeout_minutes: Option<i64>,
}

impl Default for ServerDescription {
    fn default() -> ServerDescription {
        ServerDescription {
            server_type: ServerType::Unknown,
            min_wire_version: WireVersion::Old,
            max_wire_version: WireVersion::Old,
            hosts: Vec::new(),
            passives: Vec::new(),
            arbiters: Vec::new(),
            tags: bson::Document::new(),
            set_name: None,
            primary: None,
            election_id: None,
            logical_session_timeout_minutes: None,
        }
    }
}

impl ServerDescription {
    /// Builds a description from an `isMaster` reply document.
    pub fn from_is_master(doc: &bson::Document) -> ServerDescription {
        let mut description = ServerDescription::default();

        description.min_wire_version = doc.get("minWireVersion")
            .and_then(bson_i64)
            .map(|v| WireVersion::from_i32(v as i32))
            .unwrap_or(WireVersion::Old);
        description.max_wire_version = doc.get("maxWireVersion")
            .and_then(bson_i64)
            .map(|v| WireVersion::from_i32(v as i32))
            .unwrap_or(WireVersion::Old);

        description.hosts = string_array(doc, "hosts");
        description.passives = string_array(doc, "passives");
        description.arbiters = string_array(doc, "arbiters");

        if let Some(&Bson::Document(ref tags)) = doc.get("tags") {
            description.tags = tags.clone();
        }
        if let Some(&Bson::String(ref name)) = doc.get("setName") {
            description.set_name = Some(name.clone());
        }
        if let Some(&Bson::String(ref primary)) = doc.get("primary") {
            description.primary = Some(primary.clone());
        }
        if let Some(&Bson::ObjectId(ref id)) = doc.get("electionId") {
            description.election_id = Some(id.clone());
        }
        description.logical_session_timeout_minutes =
            doc.get("logicalSessionTimeoutMinutes").and_then(bson_i64);

        let is_master = get_bool(doc, "ismaster");
        let is_secondary = get_bool(doc, "secondary");
        let is_arbiter = get_bool(doc, "arbiterOnly");
        let is_replica_set_ghost = get_bool(doc, "isreplicaset");
        let is_mongos = match doc.get("msg") {
            Some(&Bson::String(ref msg)) => msg == "isdbgrid",
            _ => false,
        };

        description.server_type = if is_mongos {
            ServerType::Mongos
        } else if description.set_name.is_some() {
            if is_master {
                ServerType::RsPrimary
            } else if is_secondary {
                ServerType::RsSecondary
            } else if is_arbiter {
                ServerType::RsArbiter
            } else {
                ServerType::RsOther
            }
        } else if is_replica_set_ghost {
            ServerType::RsGhost
        } else {
            ServerType::Standalone
        };

        description
    }
}

/// A database row from a `listDatabases` reply.
#[derive(Debug, Clone, PartialEq)]
pub struct DatabaseInfo {
    pub name: String,
    pub size_on_disk: f64,
    pub empty: bool,
}

/// Level of desired consistency and isolation properties of the data read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ReadConcernLevel {
    Local,
    Available,
    Majority,
    Linearizable,
    Snapshot,
}

impl ReadConcernLevel {
    fn to_str(&self) -> &'static str {
        match *self {
            ReadConcernLevel::Available => "available",
            ReadConcernLevel::Linearizable => "linearizable",
            ReadConcernLevel::Local => "local",
            ReadConcernLevel::Majority => "majority",
            ReadConcernLevel::Snapshot => "snapshot",
        }
    }
}

impl FromStr for ReadConcernLevel {
    type Err = Error;
    fn from_str(s: &str) -> Result<Self> {
        Ok(match s {
            "available" => ReadConcernLevel::Available,
            "linearizable" => ReadConcernLevel::Linearizable,
            "local" => ReadConcernLevel::Local,
            "majority" => ReadConcernLevel::Majority,
            "snapshot" => ReadConcernLevel::Snapshot,
            _ => {
                return Err(ArgumentError(
                    format!("Could not convert '{}' to ReadConcernLevel.", s),
                ))
            }
        })
    }
}

/// Indicates the consistency and isolation properties of the data read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ReadConcern {
    pub level: ReadConcernLevel,
}

impl ReadConcern {
    pub fn new(level: ReadConcernLevel) -> ReadConcern {
        ReadConcern { level: level }
    }

    pub fn to_document(&self) -> bson::Document {
        doc! { "level": self.level.to_str() }
    }
}

/// Write-acknowledgement parameters derived from the connection string.
#[derive(Debug, Clone, PartialEq)]
pub struct WriteConcern {
    /// Write replication: an integer node count or the string "majority".
    pub w: Option<Bson>,
    /// Used in conjunction with `w`. Propagation timeout in ms.
    pub w_timeout: Option<i64>,
    /// If true, blocks until write operations have been committed to journal.
    pub j: bool,
    /// If true and the server is not journaling, blocks until the server has
    /// synced all data files to disk.
    pub fsync: bool,
}

impl WriteConcern {
    pub fn new() -> WriteConcern {
        WriteConcern {
            w: None,
            w_timeout: None,
            j: false,
            fsync: false,
        }
    }

    pub fn from_connection_string(config: &ConnectionString) -> WriteConcern {
        WriteConcern {
            w: config.w.clone(),
            w_timeout: config.w_timeout_ms,
            j: config.journal,
            fsync: config.fsync,
        }
    }

    /// Whether any parameter was configured at all.
    pub fn is_configured(&self) -> bool {
        self.w.is_some() || self.w_timeout.is_some() || self.j || self.fsync
    }

    /// The `writeConcern` sub-document embedded in modern write commands.
    pub fn to_document(&self) -> bson::Document {
        let mut doc = bson::Document::new();
        self.append_fields(&mut doc);
        doc
    }

    /// Appends the configured parameters onto a legacy `getLastError` command.
    pub fn append_get_last_error(&self, doc: &mut bson::Document) {
        self.append_fields(doc);
    }

    fn append_fields(&self, doc: &mut bson::Document) {
        if let Some(ref w) = self.w {
            doc.insert("w", w.clone());
        }
        if let Some(timeout) = self.w_timeout {
            doc.insert("wtimeout", Bson::I64(timeout));
        }
        if self.j {
            doc.insert("j", Bson::Boolean(true));
        }
        if self.fsync {
            doc.insert("fsync", Bson::Boolean(true));
        }
    }
}

impl Default for WriteConcern {
    fn default() -> Self {
        WriteConcern::new()
    }
}

/// Widens any BSON numeric value to an i64.
pub fn bson_i64(value: &Bson) -> Option<i64> {
    match *value {
        Bson::I32(i) => Some(i64::from(i)),
        Bson::I64(i) => Some(i),
        Bson::FloatingPoint(f) => Some(f as i64),
        _ => None,
    }
}

/// Widens any BSON numeric value to an f64.
pub fn bson_f64(value: &Bson) -> Option<f64> {
    match *value {
        Bson::I32(i) => Some(f64::from(i)),
        Bson::I64(i) => Some(i as f64),
        Bson::FloatingPoint(f) => Some(f),
        _ => None,
    }
}

fn get_bool(doc: &bson::Document, key: &str) -> bool {
    match doc.get(key) {
        Some(&Bson::Boolean(b)) => b,
        _ => false,
    }
}

fn string_array(doc: &bson::Document, key: &str) -> Vec<String> {
    match doc.get(key) {
        Some(&Bson::Array(ref values)) => {
            values
                .iter()
                .filter_map(|v| match *v {
                    Bson::String(ref s) => Some(s.clone()),
                    _ => None,
                })
                .collect()
        }
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::Bson;

    #[test]
    fn wire_versions_are_ordered() {
        assert!(WireVersion::Old < WireVersion::V26);
        assert!(WireVersion::V30 < WireVersion::V32);
        assert!(WireVersion::V42 < WireVersion::V49);
        assert_eq!(WireVersion::from_i32(6), WireVersion::V36);
        assert_eq!(WireVersion::from_i32(-3), WireVersion::Old);
        // Unreleased intermediate versions saturate downwards.
        assert_eq!(WireVersion::from_i32(9), WireVersion::V42);
        assert_eq!(WireVersion::from_i32(13), WireVersion::V49);
    }

    #[test]
    fn description_from_is_master() {
        let doc = doc! {
            "ismaster": true,
            "maxWireVersion": 8,
            "minWireVersion": 0,
            "setName": "shoal",
            "hosts": ["a:27017", "b:27017"],
            "primary": "a:27017",
            "logicalSessionTimeoutMinutes": 30,
            "ok": 1
        };
        let description = ServerDescription::from_is_master(&doc);
        assert_eq!(description.server_type, ServerType::RsPrimary);
        assert_eq!(description.max_wire_version, WireVersion::V42);
        assert_eq!(description.hosts, vec!["a:27017", "b:27017"]);
        assert_eq!(description.primary.as_ref().map(|s| &s[..]), Some("a:27017"));
        assert_eq!(description.logical_session_timeout_minutes, Some(30));
    }

    #[test]
    fn description_for_mongos() {
        let doc = doc! { "ismaster": true, "msg": "isdbgrid", "maxWireVersion": 6 };
        let description = ServerDescription::from_is_master(&doc);
        assert_eq!(description.server_type, ServerType::Mongos);
    }

    #[test]
    fn write_concern_document() {
        let mut concern = WriteConcern::new();
        assert!(!concern.is_configured());
        concern.w = Some(Bson::String("majority".to_owned()));
        concern.w_timeout = Some(2000);
        concern.j = true;
        assert!(concern.is_configured());

        let doc = concern.to_document();
        assert_eq!(doc.get("w"), Some(&Bson::String("majority".to_owned())));
        assert_eq!(doc.get("wtimeout"), Some(&Bson::I64(2000)));
        assert_eq!(doc.get("j"), Some(&Bson::Boolean(true)));
        assert!(doc.get("fsync").is_none());
    }
}
