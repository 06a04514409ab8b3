use crate::error::{ErrorKind, Result};
use std::path::Path;
use tokio::io::AsyncReadExt;

/// Read granularity for streamed hashing. Memory use stays flat no matter how
/// large the asset is — multi-gigabyte files are the normal case here.
const CHUNK_SIZE: usize = 64 * 1024;

/// Compute the BLAKE3 digest of a file's bytes as lowercase hex.
///
/// The file is streamed through the hasher in fixed-size chunks; the whole
/// content is never resident in memory.
pub async fn hash_file(path: impl AsRef<Path>) -> Result<String> {
    let mut file = tokio::fs::File::open(path.as_ref()).await.map_err(ErrorKind::Io)?;
    let mut hasher = blake3::Hasher::new();
    let mut buffer = vec![0u8; CHUNK_SIZE];
    loop {
        let read = file.read(&mut buffer).await.map_err(ErrorKind::Io)?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }
    Ok(hasher.finalize().to_hex().to_string())
}
