//! Object-created notifications delivered by the content store.
//!
//! The document follows the S3 event notification layout; only the bucket
//! name and object key of each record are read.

use percent_encoding::percent_decode_str;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreEvent {
    #[serde(rename = "Records", default)]
    pub records: Vec<EventRecord>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    pub s3: S3Entity,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct S3Entity {
    pub bucket: BucketEntity,
    pub object: ObjectEntity,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BucketEntity {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectEntity {
    pub key: String,
    #[serde(default)]
    pub size: Option<u64>,
}

/// A single (bucket, key) pair from a notification batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreNotification {
    pub bucket: String,
    /// Key as it appears in the notification, still form-encoded.
    pub key: String,
}

impl StoreNotification {
    pub fn new(bucket: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            key: key.into(),
        }
    }

    /// The object key with notification encoding (`+` for space, `%XX`
    /// escapes) undone. Malformed escapes are kept verbatim.
    pub fn decoded_key(&self) -> String {
        percent_decode_str(&self.key.replace('+', " "))
            .decode_utf8_lossy()
            .into_owned()
    }
}

impl StoreEvent {
    pub fn notifications(&self) -> Vec<StoreNotification> {
        self.records
            .iter()
            .map(|r| StoreNotification::new(&r.s3.bucket.name, &r.s3.object.key))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flattens_records() {
        let raw = r#"{
            "Records": [
                { "eventName": "ObjectCreated:Put",
                  "s3": { "bucket": { "name": "art" }, "object": { "key": "output/1/2/3/4", "size": 10 } } },
                { "s3": { "bucket": { "name": "art" }, "object": { "key": "output/1/2/3/5" } } }
            ]
        }"#;
        let event: StoreEvent = serde_json::from_str(raw).unwrap();
        assert_eq!(
            event.notifications(),
            vec![
                StoreNotification::new("art", "output/1/2/3/4"),
                StoreNotification::new("art", "output/1/2/3/5"),
            ]
        );
    }

    #[test]
    fn empty_document_has_no_records() {
        let event: StoreEvent = serde_json::from_str("{}").unwrap();
        assert!(event.notifications().is_empty());
    }

    #[test]
    fn decodes_form_encoding() {
        let n = StoreNotification::new("b", "output/a+b/%3Dx%2F/%zz/%4");
        assert_eq!(n.decoded_key(), "output/a b/=x//%zz/%4");
        // An escaped plus stays a plus.
        let n = StoreNotification::new("b", "output/1%2B1.png");
        assert_eq!(n.decoded_key(), "output/1+1.png");
    }
}
