//! JSON file backend.
//!
//! The file is a single object mapping member id to a record. Field names
//! written by older deployments (`join_date`, `joined_at`, `name`, `role`)
//! are accepted on read.

use crate::error::{Error, Result};
use crate::record::{MemberId, MemberRecord};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

#[derive(Debug, Serialize, Deserialize)]
struct StoredRecord {
    #[serde(
        default,
        with = "crate::timestamp",
        alias = "join_date",
        alias = "joined_at"
    )]
    join_timestamp: Option<DateTime<Utc>>,

    #[serde(default, alias = "name")]
    display_name: String,

    #[serde(default, alias = "role")]
    role_labels: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    departed_at: Option<DateTime<Utc>>,
}

impl StoredRecord {
    fn into_record(self, id: MemberId) -> MemberRecord {
        MemberRecord {
            id,
            joined_at: self.join_timestamp,
            display_name: self.display_name,
            role_labels: self.role_labels.into_iter().collect(),
            departed_at: self.departed_at,
        }
    }
}

impl From<&MemberRecord> for StoredRecord {
    fn from(record: &MemberRecord) -> Self {
        Self {
            join_timestamp: record.joined_at,
            display_name: record.display_name.clone(),
            role_labels: record.role_labels.iter().cloned().collect(),
            departed_at: record.departed_at,
        }
    }
}

/// Decode a store file. An absent or blank file is an empty store.
pub(crate) async fn load(path: &Path) -> Result<BTreeMap<MemberId, MemberRecord>> {
    let bytes = match tokio::fs::read(path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(BTreeMap::new()),
        Err(e) => return Err(e.into()),
    };
    decode(&bytes)
}

pub(crate) fn decode(bytes: &[u8]) -> Result<BTreeMap<MemberId, MemberRecord>> {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(BTreeMap::new());
    }

    let stored: BTreeMap<String, StoredRecord> =
        serde_json::from_slice(bytes).map_err(|e| Error::Corrupt(e.to_string()))?;

    Ok(stored
        .into_iter()
        .map(|(id, record)| {
            let id = MemberId::from(id);
            (id.clone(), record.into_record(id))
        })
        .collect())
}

pub(crate) fn encode(records: &BTreeMap<MemberId, MemberRecord>) -> Result<Vec<u8>> {
    let stored: BTreeMap<&str, StoredRecord> = records
        .iter()
        .map(|(id, record)| (id.as_str(), StoredRecord::from(record)))
        .collect();
    Ok(serde_json::to_vec_pretty(&stored)?)
}

/// Replace the store file atomically.
pub(crate) async fn save(path: &Path, bytes: &[u8]) -> Result<()> {
    let tmp = sibling(path, "tmp");
    tokio::fs::write(&tmp, bytes).await?;
    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}

/// Move an unreadable store out of the way, returning where it went.
pub(crate) async fn quarantine(path: &Path) -> Result<PathBuf> {
    let target = sibling(path, "corrupt");
    tokio::fs::rename(path, &target).await?;
    Ok(target)
}

fn sibling(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".");
    name.push(suffix);
    path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_current_format() {
        let json = r#"{
            "1": {
                "join_timestamp": "2023-01-01T00:00:00Z",
                "display_name": "ada",
                "role_labels": ["Member", "1 Year Member"]
            }
        }"#;
        let records = decode(json.as_bytes()).unwrap();
        let ada = &records[&MemberId::from("1")];
        assert_eq!(ada.display_name, "ada");
        assert_eq!(ada.joined_at.unwrap().timestamp(), 1_672_531_200);
        assert!(ada.has_label("1 Year Member"));
        assert!(!ada.is_departed());
    }

    #[test]
    fn decodes_epoch_only_format() {
        let json = r#"{"1234": {"join_date": 1672531200.25}}"#;
        let records = decode(json.as_bytes()).unwrap();
        let record = &records[&MemberId::from("1234")];
        assert_eq!(record.joined_at.unwrap().timestamp(), 1_672_531_200);
        assert!(record.role_labels.is_empty());
    }

    #[test]
    fn decodes_tracker_format() {
        let json = r#"{
            "55": {"name": "bo", "joined_at": "2024-02-03T04:05:06.789000+00:00", "role": ["Member"]},
            "56": {"name": "cy", "joined_at": null, "role": []}
        }"#;
        let records = decode(json.as_bytes()).unwrap();
        assert_eq!(records[&MemberId::from("55")].display_name, "bo");
        assert!(records[&MemberId::from("55")].has_label("Member"));
        assert_eq!(records[&MemberId::from("56")].joined_at, None);
    }

    #[test]
    fn blank_is_empty() {
        assert!(decode(b"").unwrap().is_empty());
        assert!(decode(b"  \n").unwrap().is_empty());
        assert!(decode(b"{}").unwrap().is_empty());
    }

    #[test]
    fn garbage_is_corrupt() {
        assert!(matches!(decode(b"{\"1\": [1,2"), Err(Error::Corrupt(_))));
        assert!(matches!(decode(b"[]"), Err(Error::Corrupt(_))));
    }

    #[test]
    fn encode_decode_is_lossless() {
        let mut record = MemberRecord::new("9".into());
        record.display_name = "dee".into();
        record.observe_join(DateTime::from_timestamp(1_650_000_000, 5));
        record.set_roles(["Member", "Artist"]);
        record.departed_at = DateTime::from_timestamp(1_700_000_000, 0);

        let records = BTreeMap::from([(record.id.clone(), record)]);
        let bytes = encode(&records).unwrap();
        assert_eq!(decode(&bytes).unwrap(), records);
    }

    #[test]
    fn sibling_names() {
        let p = Path::new("/data/members.json");
        assert_eq!(sibling(p, "tmp"), PathBuf::from("/data/members.json.tmp"));
        assert_eq!(sibling(p, "corrupt"), PathBuf::from("/data/members.json.corrupt"));
    }
}
