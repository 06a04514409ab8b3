//! Row types bridging SQLite and the contract records.

use exn::ResultExt;
use packrat_proto::error::{Error, ErrorKind};
use packrat_proto::{BlobLocator, CheckoutEntry};

/// One joined (commit_files ⨝ assets) row of a checkout query.
#[derive(sqlx::FromRow)]
pub(crate) struct CheckoutRow {
    file_path: String,
    content_hash: String,
    size_bytes: i64,
    blob_locator: String,
}

impl TryFrom<CheckoutRow> for CheckoutEntry {
    type Error = Error;
    fn try_from(row: CheckoutRow) -> Result<Self, Self::Error> {
        Ok(Self {
            path: row.file_path,
            hash: row.content_hash,
            size: u64::try_from(row.size_bytes).or_raise(|| ErrorKind::Authority("checkout row decode"))?,
            locator: BlobLocator::from(row.blob_locator),
        })
    }
}
