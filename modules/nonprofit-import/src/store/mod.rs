//! PersistenceGateway implementations and the merge rules they share.

pub mod memory;
pub mod postgres;

pub use memory::MemoryOrgStore;
pub use postgres::PgOrgStore;

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::document::SanitizedRecord;
use crate::types::{ImportHistoryEntry, PersistedOrgRecord, ReviewStatus};

pub const SOURCE_SYSTEM: &str = "propublica";

/// Fields that change between imports: financials, filings, classification.
/// Their prior values are snapshotted into the import history before a merge.
pub const MUTABLE_FIELDS: &[&str] = &[
    "assetAmount",
    "incomeAmount",
    "revenueAmount",
    "taxPeriod",
    "latestFiling",
    "filingHistory",
    "nteeCode",
    "subsectionCode",
    "affiliationCode",
    "classificationCodes",
    "deductibilityCode",
    "foundationCode",
    "activityCodes",
    "organizationCode",
    "exemptStatusCode",
];

/// First import of an identifier.
pub fn new_record(external_id: &str, incoming: SanitizedRecord, now: DateTime<Utc>) -> PersistedOrgRecord {
    PersistedOrgRecord {
        id: Uuid::new_v4(),
        external_id: external_id.to_string(),
        record: incoming.into_json(),
        source_system: SOURCE_SYSTEM.to_string(),
        review_status: ReviewStatus::Pending,
        import_history: Vec::new(),
        imported_at: now,
        updated_at: now,
    }
}

/// Repeat import: snapshot the prior mutable values into the history, then
/// shallow-merge the incoming fields over the stored record. History is
/// append-only; the review status is left alone.
pub fn merge_import(existing: &mut PersistedOrgRecord, incoming: SanitizedRecord, now: DateTime<Utc>) {
    let mut previous = Map::new();
    for field in MUTABLE_FIELDS {
        if let Some(v) = existing.record.get(*field) {
            previous.insert((*field).to_string(), v.clone());
        }
    }
    existing.import_history.push(ImportHistoryEntry {
        recorded_at: existing.updated_at,
        previous: Value::Object(previous),
    });

    match incoming.into_json() {
        Value::Object(fields) if existing.record.is_object() => {
            if let Some(stored) = existing.record.as_object_mut() {
                stored.extend(fields);
            }
        }
        replacement => existing.record = replacement,
    }
    existing.updated_at = now;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{sanitize, Document};
    use chrono::Duration;
    use serde_json::json;

    fn clean(value: Value) -> SanitizedRecord {
        sanitize(Document::from(value)).unwrap()
    }

    #[test]
    fn new_record_starts_pending_with_empty_history() {
        let now = Utc::now();
        let rec = new_record("11-1111111", clean(json!({"ein": "11-1111111"})), now);
        assert_eq!(rec.review_status, ReviewStatus::Pending);
        assert_eq!(rec.source_system, "propublica");
        assert!(rec.import_history.is_empty());
        assert_eq!(rec.imported_at, now);
    }

    #[test]
    fn merge_snapshots_prior_values_and_overwrites() {
        let t0 = Utc::now();
        let t1 = t0 + Duration::days(30);
        let mut rec = new_record(
            "11-1111111",
            clean(json!({"ein": "11-1111111", "name": "Old", "assetAmount": 10, "notes": "kept"})),
            t0,
        );
        rec.review_status = ReviewStatus::Approved;

        merge_import(
            &mut rec,
            clean(json!({"ein": "11-1111111", "name": "New", "assetAmount": 25})),
            t1,
        );

        assert_eq!(rec.record["assetAmount"], json!(25));
        assert_eq!(rec.record["name"], json!("New"));
        assert_eq!(rec.record["notes"], json!("kept"));
        assert_eq!(rec.review_status, ReviewStatus::Approved);
        assert_eq!(rec.imported_at, t0);
        assert_eq!(rec.updated_at, t1);

        assert_eq!(rec.import_history.len(), 1);
        assert_eq!(rec.import_history[0].recorded_at, t0);
        assert_eq!(rec.import_history[0].previous, json!({"assetAmount": 10}));
    }

    #[test]
    fn history_is_appended_on_every_reimport() {
        let t0 = Utc::now();
        let mut rec = new_record("11-1111111", clean(json!({"revenueAmount": 1})), t0);
        merge_import(&mut rec, clean(json!({"revenueAmount": 2})), t0 + Duration::days(1));
        merge_import(&mut rec, clean(json!({"revenueAmount": 3})), t0 + Duration::days(2));

        let prior: Vec<Value> = rec
            .import_history
            .iter()
            .map(|h| h.previous["revenueAmount"].clone())
            .collect();
        assert_eq!(prior, vec![json!(1), json!(2)]);
        assert_eq!(rec.record["revenueAmount"], json!(3));
    }
}
