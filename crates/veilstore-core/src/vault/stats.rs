//! Account-wide usage statistics.
//!
//! A single fold over every file record of the owner: totals, upload
//! recency buckets and a file-size histogram. Nothing here needs the
//! account key; only plaintext metadata fields are aggregated.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tracing::instrument;

use crate::store::FileRecord;

use super::{Vault, VaultError};

const MB: u64 = 1024 * 1024;

/// Usage totals for one account.
///
/// The recency buckets are disjoint: a file uploaded three days ago counts
/// once, in `uploads_last_7_days`. The size histogram buckets every file
/// exactly once as well.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct VaultStats {
    pub uploads_last_7_days: u64,
    pub uploads_last_14_days: u64,
    pub uploads_last_30_days: u64,
    pub uploads_last_60_days: u64,
    pub uploads_last_90_days: u64,
    pub total_usage: u64,
    pub total_files: u64,
    pub total_downloads: u64,

    pub files_0mb_500mb: u64,
    pub files_500mb_1gb: u64,
    pub files_1gb_2gb: u64,
    pub files_2gb_3gb: u64,
    pub files_3gb_4gb: u64,
    pub files_4gb_5gb: u64,
    pub files_over_5gb: u64,
}

impl VaultStats {
    fn absorb(&mut self, record: &FileRecord, now: DateTime<Utc>) {
        self.total_files += 1;
        self.total_usage += record.size_bytes;
        self.total_downloads += record.download_count;

        let age = now - record.uploaded_at;
        if age < Duration::days(7) {
            self.uploads_last_7_days += 1;
        } else if age < Duration::days(14) {
            self.uploads_last_14_days += 1;
        } else if age < Duration::days(30) {
            self.uploads_last_30_days += 1;
        } else if age < Duration::days(60) {
            self.uploads_last_60_days += 1;
        } else if age < Duration::days(90) {
            self.uploads_last_90_days += 1;
        }

        match record.size_bytes {
            s if s < 500 * MB => self.files_0mb_500mb += 1,
            s if s <= 1000 * MB => self.files_500mb_1gb += 1,
            s if s <= 2000 * MB => self.files_1gb_2gb += 1,
            s if s <= 3000 * MB => self.files_2gb_3gb += 1,
            s if s <= 4000 * MB => self.files_3gb_4gb += 1,
            s if s <= 5000 * MB => self.files_4gb_5gb += 1,
            _ => self.files_over_5gb += 1,
        }
    }
}

impl Vault {
    /// Aggregate usage statistics over every file the account owns.
    #[instrument(skip(self), fields(owner = %self.owner))]
    pub fn stats(&self) -> Result<VaultStats, VaultError> {
        // Every folder path starts with "/", so the range scan from "/"
        // covers the whole account.
        let records = self.metadata.list_files_from(&self.owner, "/")?;
        Ok(fold_stats(&records, Utc::now()))
    }
}

fn fold_stats(records: &[FileRecord], now: DateTime<Utc>) -> VaultStats {
    let mut stats = VaultStats::default();
    for record in records {
        stats.absorb(record, now);
    }
    stats
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(size_bytes: u64, days_ago: i64, download_count: u64) -> FileRecord {
        FileRecord {
            id: 0,
            owner: "alice".into(),
            encrypted_name: vec![],
            name_fingerprint: String::new(),
            folder_path: "/docs/".into(),
            blob_ref: String::new(),
            content_type: "application/octet-stream".into(),
            size_bytes,
            uploaded_at: Utc::now() - Duration::days(days_ago),
            download_count,
            description: String::new(),
            tags: vec![],
            compressed: false,
            content_digest: String::new(),
        }
    }

    #[test]
    fn totals_accumulate_across_records() {
        let records = vec![record(100, 0, 2), record(250, 1, 3)];
        let stats = fold_stats(&records, Utc::now());

        assert_eq!(stats.total_files, 2);
        assert_eq!(stats.total_usage, 350);
        assert_eq!(stats.total_downloads, 5);
    }

    #[test]
    fn recency_buckets_are_disjoint() {
        let records = vec![
            record(1, 3, 0),
            record(1, 10, 0),
            record(1, 20, 0),
            record(1, 45, 0),
            record(1, 75, 0),
            record(1, 365, 0),
        ];
        let stats = fold_stats(&records, Utc::now());

        assert_eq!(stats.uploads_last_7_days, 1);
        assert_eq!(stats.uploads_last_14_days, 1);
        assert_eq!(stats.uploads_last_30_days, 1);
        assert_eq!(stats.uploads_last_60_days, 1);
        assert_eq!(stats.uploads_last_90_days, 1);
        assert_eq!(stats.total_files, 6, "stale files still count in the totals");
    }

    #[test]
    fn size_histogram_buckets_each_file_once() {
        let records = vec![
            record(499 * MB, 0, 0),
            record(800 * MB, 0, 0),
            record(1500 * MB, 0, 0),
            record(2500 * MB, 0, 0),
            record(3500 * MB, 0, 0),
            record(4500 * MB, 0, 0),
            record(6000 * MB, 0, 0),
        ];
        let stats = fold_stats(&records, Utc::now());

        assert_eq!(stats.files_0mb_500mb, 1);
        assert_eq!(stats.files_500mb_1gb, 1);
        assert_eq!(stats.files_1gb_2gb, 1);
        assert_eq!(stats.files_2gb_3gb, 1);
        assert_eq!(stats.files_3gb_4gb, 1);
        assert_eq!(stats.files_4gb_5gb, 1);
        assert_eq!(stats.files_over_5gb, 1);
    }

    #[test]
    fn empty_account_is_all_zeroes() {
        assert_eq!(fold_stats(&[], Utc::now()), VaultStats::default());
    }
}
