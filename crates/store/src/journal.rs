//! JSONL ledger journal - append-only source of truth
//!
//! One JSON line per record, one file per UTC day. Status transitions
//! (settle, cancel, review) re-append the full updated entry; replay takes
//! the latest record per entry id, so the files themselves are never
//! rewritten.

use chrono::Utc;
use glowcast_ledger::LedgerEntry;
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Journal errors
#[derive(Error, Debug)]
pub enum JournalError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Append-only JSONL journal writer
pub struct LedgerJournal {
    base_path: PathBuf,
    current_file: Option<BufWriter<File>>,
    current_date: Option<String>,
}

impl LedgerJournal {
    /// Create a journal rooted at the given directory
    pub fn new(base_path: impl AsRef<Path>) -> Result<Self, JournalError> {
        let base_path = base_path.as_ref().to_path_buf();
        fs::create_dir_all(&base_path)?;

        Ok(Self {
            base_path,
            current_file: None,
            current_date: None,
        })
    }

    /// Append a record. Flushed before returning so a crash after the
    /// commit section never loses an acknowledged entry.
    pub fn append(&mut self, entry: &LedgerEntry) -> Result<(), JournalError> {
        let date = Utc::now().format("%Y-%m-%d").to_string();

        if self.current_date.as_ref() != Some(&date) {
            self.rotate_file(&date)?;
        }

        if let Some(ref mut writer) = self.current_file {
            let json = serde_json::to_string(entry)?;
            writeln!(writer, "{}", json)?;
            writer.flush()?;
        }

        Ok(())
    }

    fn rotate_file(&mut self, date: &str) -> Result<(), JournalError> {
        if let Some(ref mut writer) = self.current_file {
            writer.flush()?;
        }

        let file_path = self.base_path.join(format!("{}.jsonl", date));
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&file_path)?;

        self.current_file = Some(BufWriter::new(file));
        self.current_date = Some(date.to_string());

        Ok(())
    }

    /// Flush and close the current file
    pub fn close(&mut self) -> Result<(), JournalError> {
        if let Some(ref mut writer) = self.current_file {
            writer.flush()?;
        }
        self.current_file = None;
        self.current_date = None;
        Ok(())
    }
}

impl Drop for LedgerJournal {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

/// Sequential journal reader for replay
pub struct JournalReader {
    files: Vec<PathBuf>,
}

impl JournalReader {
    /// Create a reader over all journal files in a directory
    pub fn from_directory(path: impl AsRef<Path>) -> Result<Self, JournalError> {
        let path = path.as_ref();
        let mut files = Vec::new();

        if path.exists() {
            for entry in fs::read_dir(path)? {
                let entry = entry?;
                let file_path = entry.path();
                if file_path.extension().map_or(false, |ext| ext == "jsonl") {
                    files.push(file_path);
                }
            }
        }

        files.sort();

        Ok(Self { files })
    }

    /// Read all records from all files in append order
    pub fn read_all(&self) -> Result<Vec<LedgerEntry>, JournalError> {
        let mut records = Vec::new();

        for file_path in &self.files {
            let file = File::open(file_path)?;
            let reader = BufReader::new(file);

            for line in reader.lines() {
                let line = line?;
                if line.trim().is_empty() {
                    continue;
                }
                let entry: LedgerEntry = serde_json::from_str(&line)?;
                records.push(entry);
            }
        }

        Ok(records)
    }

    /// Count total records across all files
    pub fn count(&self) -> Result<usize, JournalError> {
        let mut count = 0;

        for file_path in &self.files {
            let file = File::open(file_path)?;
            let reader = BufReader::new(file);

            for line in reader.lines() {
                let line = line?;
                if !line.trim().is_empty() {
                    count += 1;
                }
            }
        }

        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use glowcast_core::{Coins, EntryId, UserId};
    use glowcast_ledger::{
        calculate_entry_hash, BalancePool, EntryContext, EntryStatus, EntryType, GENESIS_HASH,
    };

    fn sample_entry() -> LedgerEntry {
        let mut entry = LedgerEntry {
            id: EntryId::generate(),
            user_id: UserId::new("alice"),
            counterparty_id: None,
            entry_type: EntryType::Purchase,
            amount: Coins::new(500),
            balance_before: Coins::ZERO,
            balance_after: Coins::new(500),
            source: EntryType::Purchase.flow().0,
            destination: EntryType::Purchase.flow().1,
            pool: BalancePool::Withdrawable,
            context: EntryContext::Purchase {
                payment_id: "pay_1".to_string(),
                payment_gateway: "stripe".to_string(),
            },
            status: EntryStatus::Completed,
            created_at: Utc::now(),
            processed_at: Some(Utc::now()),
            fraud_score: Some(5),
            risk_level: None,
            hash: String::new(),
            previous_hash: GENESIS_HASH.to_string(),
            idempotency_key: None,
            external_payment_id: Some("pay_1".to_string()),
        };
        entry.hash = calculate_entry_hash(&entry);
        entry
    }

    #[test]
    fn test_append_and_read_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let mut journal = LedgerJournal::new(dir.path()).unwrap();

        let entry = sample_entry();
        journal.append(&entry).unwrap();
        journal.close().unwrap();

        let reader = JournalReader::from_directory(dir.path()).unwrap();
        let records = reader.read_all().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].id, entry.id);
        assert_eq!(records[0].hash, entry.hash);
    }

    #[test]
    fn test_reappend_preserves_both_records() {
        let dir = tempfile::tempdir().unwrap();
        let mut journal = LedgerJournal::new(dir.path()).unwrap();

        let mut entry = sample_entry();
        entry.status = EntryStatus::Pending;
        entry.hash = String::new();
        entry.previous_hash = String::new();
        journal.append(&entry).unwrap();

        entry.status = EntryStatus::Completed;
        journal.append(&entry).unwrap();
        journal.close().unwrap();

        let reader = JournalReader::from_directory(dir.path()).unwrap();
        assert_eq!(reader.count().unwrap(), 2);
        let records = reader.read_all().unwrap();
        assert_eq!(records[0].status, EntryStatus::Pending);
        assert_eq!(records[1].status, EntryStatus::Completed);
    }

    #[test]
    fn test_empty_directory_reads_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let reader = JournalReader::from_directory(dir.path()).unwrap();
        assert!(reader.read_all().unwrap().is_empty());
    }
}
