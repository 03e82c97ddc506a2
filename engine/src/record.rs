//! Record types: identities and versioned payloads.

use crate::{Error, RecordId, ResourceType, Timestamp, VersionId};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

/// Stable logical identity of a record: `(resourceType, id)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordRef {
    /// Resource type, e.g. `Patient`
    pub resource_type: ResourceType,
    /// Logical id within the resource type
    pub id: RecordId,
}

impl RecordRef {
    /// Create a new reference.
    pub fn new(resource_type: impl Into<ResourceType>, id: impl Into<RecordId>) -> Self {
        Self {
            resource_type: resource_type.into(),
            id: id.into(),
        }
    }
}

impl fmt::Display for RecordRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.resource_type, self.id)
    }
}

impl FromStr for RecordRef {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once('/') {
            Some((resource_type, id))
                if !resource_type.is_empty() && !id.is_empty() && !id.contains('/') =>
            {
                Ok(Self::new(resource_type, id))
            }
            _ => Err(Error::InvalidResource(format!("malformed reference: {s}"))),
        }
    }
}

/// A versioned record as held by the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Record {
    /// Identity of the record
    pub reference: RecordRef,
    /// The resource body (JSON value)
    pub payload: Value,
    /// Server-assigned version, if known
    pub version_id: Option<VersionId>,
    /// Server-assigned modification instant, if known
    pub last_updated: Option<Timestamp>,
}

impl Record {
    /// Create a record without version metadata.
    pub fn new(reference: RecordRef, payload: Value) -> Self {
        Self {
            reference,
            payload,
            version_id: None,
            last_updated: None,
        }
    }

    /// Build a record from a resource body.
    ///
    /// Reads `resourceType`, `id` and the optional `meta.versionId` /
    /// `meta.lastUpdated`. An unparseable `lastUpdated` is treated as absent.
    pub fn from_resource(payload: Value) -> crate::Result<Self> {
        let resource_type = payload
            .get("resourceType")
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| Error::InvalidResource("missing resourceType".into()))?;
        let id = payload
            .get("id")
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| Error::InvalidResource(format!("{resource_type} without id")))?;
        let reference = RecordRef::new(resource_type, id);

        let meta = payload.get("meta");
        let version_id = meta
            .and_then(|m| m.get("versionId"))
            .and_then(Value::as_str)
            .map(str::to_owned);
        let last_updated = meta
            .and_then(|m| m.get("lastUpdated"))
            .and_then(Value::as_str)
            .and_then(parse_instant);

        Ok(Self {
            reference,
            payload,
            version_id,
            last_updated,
        })
    }

    /// Set version metadata explicitly.
    pub fn with_version_metadata(
        mut self,
        version_id: impl Into<VersionId>,
        last_updated: Timestamp,
    ) -> Self {
        self.set_version_metadata(version_id.into(), last_updated);
        self
    }

    /// The resource type of this record.
    pub fn resource_type(&self) -> &str {
        &self.reference.resource_type
    }

    /// The logical id of this record.
    pub fn id(&self) -> &str {
        &self.reference.id
    }

    /// Whether both `versionId` and `lastUpdated` are known.
    pub fn has_version_metadata(&self) -> bool {
        self.version_id.is_some() && self.last_updated.is_some()
    }

    /// Overwrite version metadata, mirroring it into the payload's `meta`.
    pub fn set_version_metadata(&mut self, version_id: VersionId, last_updated: Timestamp) {
        if let Some(body) = self.payload.as_object_mut() {
            let meta = body
                .entry("meta")
                .or_insert_with(|| Value::Object(Map::new()));
            if let Some(meta) = meta.as_object_mut() {
                meta.insert("versionId".into(), Value::String(version_id.clone()));
                meta.insert(
                    "lastUpdated".into(),
                    Value::String(format_instant(&last_updated)),
                );
            }
        }
        self.version_id = Some(version_id);
        self.last_updated = Some(last_updated);
    }
}

/// Parse an RFC 3339 instant into UTC.
pub fn parse_instant(value: &str) -> Option<Timestamp> {
    DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|t| t.with_timezone(&Utc))
}

/// Format an instant as RFC 3339 with a `Z` suffix.
pub fn format_instant(value: &Timestamp) -> String {
    value.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}
