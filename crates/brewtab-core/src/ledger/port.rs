use async_trait::async_trait;

use crate::Result;

/// Row-oriented external store backing the ledger (a spreadsheet tab).
///
/// Positions are 0-based and include the header row at position 0.
/// Implementations attempt every call exactly once; failures propagate.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Cells of the first row. Empty when the sheet has no first row yet.
    async fn first_row(&self) -> Result<Vec<String>>;

    /// Overwrite the first row with `header`.
    async fn write_header(&self, header: &[&str]) -> Result<()>;

    /// Append one row after the last non-empty row.
    async fn append_row(&self, values: Vec<String>) -> Result<()>;

    /// Every row in order, header included.
    async fn read_all(&self) -> Result<Vec<Vec<String>>>;

    /// Remove exactly one row by position, shifting later rows up.
    async fn delete_row(&self, index: usize) -> Result<()>;
}
