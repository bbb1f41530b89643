//! Append-only ledger of choices, backed by an external row store.

pub mod port;
pub mod types;

use std::sync::Arc;

use crate::{domain::UserId, Result};

use port::LedgerStore;
use types::{LedgerEntry, LedgerRow, HEADER};

/// Typed view over a [`LedgerStore`].
///
/// Position 0 holds the header; data rows start at 1.
#[derive(Clone)]
pub struct Ledger {
    store: Arc<dyn LedgerStore>,
}

impl Ledger {
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self { store }
    }

    /// Append one row, writing the header first when the first row is blank.
    pub async fn append(&self, row: &LedgerRow) -> Result<()> {
        let first = self.store.first_row().await?;
        if first.iter().all(|c| c.trim().is_empty()) {
            tracing::info!("ledger header missing; writing it");
            self.store.write_header(&HEADER).await?;
        }
        self.store.append_row(row.to_values()).await
    }

    /// Raw rows, header included.
    pub async fn read_all(&self) -> Result<Vec<Vec<String>>> {
        self.store.read_all().await
    }

    /// Data rows with their positions. Rows without a user id are skipped.
    pub async fn entries(&self) -> Result<Vec<LedgerEntry>> {
        let raw = self.store.read_all().await?;
        Ok(entries_from_raw(&raw))
    }

    /// Data rows only.
    pub async fn rows(&self) -> Result<Vec<LedgerRow>> {
        Ok(self.entries().await?.into_iter().map(|e| e.row).collect())
    }

    pub async fn delete_row(&self, index: usize) -> Result<()> {
        self.store.delete_row(index).await
    }
}

pub fn entries_from_raw(raw: &[Vec<String>]) -> Vec<LedgerEntry> {
    raw.iter()
        .enumerate()
        .skip(1)
        .filter_map(|(index, values)| {
            LedgerRow::from_values(values).map(|row| LedgerEntry { index, row })
        })
        .collect()
}

/// The most recent entry for `user`, scanning from the end.
pub fn last_entry_for<'a>(entries: &'a [LedgerEntry], user: &UserId) -> Option<&'a LedgerEntry> {
    entries.iter().rev().find(|e| &e.row.user_id == user)
}
