//! The SQLite implementation of the metadata authority contract.

use crate::Database;
use crate::models::CheckoutRow;
use async_trait::async_trait;
use exn::ResultExt;
use packrat_proto::error::{ErrorKind, Result};
use packrat_proto::{
    CheckoutManifest, CommitReceipt, CommitRequest, ConfirmUpload, HandshakeRequest, HandshakeResponse,
    MetadataAuthority,
};
use sqlx::{QueryBuilder, Sqlite, SqliteConnection, SqlitePool};
use std::collections::{HashMap, HashSet};

// SQLite's historical bind-variable limit is 999; chunk well under it so the
// per-row multiplier in bulk inserts never pushes a statement over.
const BIND_CHUNK: usize = 300;

fn now() -> i64 {
    time::UtcDateTime::now().unix_timestamp()
}

/// Authority over Project, Asset, Commit and ProjectFile records.
///
/// Everything mutating runs in a transaction against the pool owned by
/// [`Database`]; the handle is cheap to clone and share.
#[derive(Debug, Clone)]
pub struct SqliteAuthority {
    pool: SqlitePool,
}

impl From<&Database> for SqliteAuthority {
    fn from(db: &Database) -> Self {
        Self { pool: db.pool().clone() }
    }
}

impl SqliteAuthority {
    /// Create an authority over an existing connection pool.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

/// Look up asset ids for a set of content hashes, in chunks that respect the
/// bind-variable limit. Hashes with no asset row are simply absent from the
/// returned map.
async fn resolve_assets(conn: &mut SqliteConnection, hashes: &[&str]) -> Result<HashMap<String, i64>> {
    let mut resolved = HashMap::new();
    for chunk in hashes.chunks(BIND_CHUNK) {
        let mut query =
            QueryBuilder::<Sqlite>::new("SELECT content_hash, id FROM assets WHERE content_hash IN (");
        let mut bindings = query.separated(", ");
        for hash in chunk {
            bindings.push_bind(*hash);
        }
        query.push(")");
        let rows: Vec<(String, i64)> = query
            .build_query_as()
            .fetch_all(&mut *conn)
            .await
            .or_raise(|| ErrorKind::Authority("asset lookup"))?;
        resolved.extend(rows);
    }
    Ok(resolved)
}

#[async_trait]
impl MetadataAuthority for SqliteAuthority {
    async fn handshake(&self, request: HandshakeRequest) -> Result<HandshakeResponse> {
        let mut unique = HashSet::new();
        let hashes: Vec<&str> =
            request.manifest.iter().map(|e| e.hash.as_str()).filter(|h| unique.insert(*h)).collect();
        let mut conn = self.pool.acquire().await.or_raise(|| ErrorKind::Authority("handshake"))?;
        let known = resolve_assets(&mut conn, &hashes).await?;
        // Paths, not hashes: several paths sharing one novel hash are all
        // listed, and the client is free to upload the bytes only once.
        let required_paths: Vec<String> = request
            .manifest
            .iter()
            .filter(|entry| !known.contains_key(&entry.hash))
            .map(|entry| entry.path.clone())
            .collect();
        let message = format!(
            "checked {} files: {} already known, {} required",
            request.manifest.len(),
            request.manifest.len() - required_paths.len(),
            required_paths.len(),
        );
        tracing::info!(project = %request.project, %message, "handshake");
        Ok(HandshakeResponse { required_paths, message })
    }

    async fn confirm_upload(&self, request: ConfirmUpload) -> Result<()> {
        if request.hash.is_empty() {
            exn::bail!(ErrorKind::InvalidRequest("empty content hash"));
        }
        let size = i64::try_from(request.size).or_raise(|| ErrorKind::InvalidRequest("asset size out of range"))?;
        sqlx::query(include_str!("../queries/insert_asset.sql"))
            .bind(&request.hash)
            .bind(size)
            .bind(&request.mime_type)
            .bind(request.locator.as_str())
            .bind(now())
            .execute(&self.pool)
            .await
            .or_raise(|| ErrorKind::Authority("confirm upload"))?;
        Ok(())
    }

    async fn commit(&self, request: CommitRequest) -> Result<CommitReceipt> {
        let tag = request.tag.trim();
        if tag.is_empty() {
            exn::bail!(ErrorKind::InvalidTag(request.tag.clone()));
        }
        let mut seen = HashSet::new();
        if request.manifest.iter().any(|entry| !seen.insert(entry.path.as_str())) {
            exn::bail!(ErrorKind::InvalidRequest("duplicate path in manifest"));
        }

        let mut tx = self.pool.begin().await.or_raise(|| ErrorKind::Authority("commit"))?;

        let project_id: Option<i64> = sqlx::query_scalar(include_str!("../queries/get_project_id.sql"))
            .bind(&request.project)
            .fetch_optional(&mut *tx)
            .await
            .or_raise(|| ErrorKind::Authority("commit"))?;
        let project_id = match project_id {
            Some(id) => id,
            // Projects come into being on their first commit.
            None => sqlx::query_scalar(include_str!("../queries/insert_project.sql"))
                .bind(&request.project)
                .bind(now())
                .fetch_one(&mut *tx)
                .await
                .or_raise(|| ErrorKind::Authority("commit"))?,
        };

        let taken: i64 = sqlx::query_scalar(include_str!("../queries/count_tag.sql"))
            .bind(project_id)
            .bind(tag)
            .fetch_one(&mut *tx)
            .await
            .or_raise(|| ErrorKind::Authority("commit"))?;
        if taken > 0 {
            exn::bail!(ErrorKind::DuplicateTag(tag.to_string()));
        }

        let mut unique = HashSet::new();
        let hashes: Vec<&str> =
            request.manifest.iter().map(|e| e.hash.as_str()).filter(|h| unique.insert(*h)).collect();
        let assets = resolve_assets(&mut tx, &hashes).await?;

        let unresolved: Vec<String> = request
            .manifest
            .iter()
            .filter(|entry| !assets.contains_key(&entry.hash))
            .map(|entry| entry.path.clone())
            .collect();
        if !unresolved.is_empty() && !request.allow_partial {
            // Dropping the transaction rolls everything back, including a
            // lazily created project row.
            exn::bail!(ErrorKind::PartialCommit(unresolved));
        }

        let commit_id: i64 = sqlx::query_scalar(include_str!("../queries/insert_commit.sql"))
            .bind(project_id)
            .bind(tag)
            .bind(&request.message)
            .bind(&request.author)
            .bind(now())
            .fetch_one(&mut *tx)
            .await
            .or_raise(|| ErrorKind::Authority("commit"))?;

        let links: Vec<(&str, i64)> = request
            .manifest
            .iter()
            .filter_map(|entry| assets.get(&entry.hash).map(|id| (entry.path.as_str(), *id)))
            .collect();
        for chunk in links.chunks(BIND_CHUNK) {
            let mut query = QueryBuilder::<Sqlite>::new("INSERT INTO commit_files (commit_id, asset_id, file_path) ");
            query.push_values(chunk, |mut bindings, (path, asset_id)| {
                bindings.push_bind(commit_id).push_bind(*asset_id).push_bind(*path);
            });
            query.build().execute(&mut *tx).await.or_raise(|| ErrorKind::Authority("commit"))?;
        }

        tx.commit().await.or_raise(|| ErrorKind::Authority("commit"))?;
        tracing::info!(
            project = %request.project,
            tag,
            commit_id,
            linked = links.len(),
            unresolved = unresolved.len(),
            "commit created"
        );
        Ok(CommitReceipt { commit_id, tag: tag.to_string(), linked: links.len(), unresolved })
    }

    async fn checkout(&self, project: &str, tag: &str) -> Result<CheckoutManifest> {
        let commit_id: Option<i64> = sqlx::query_scalar(include_str!("../queries/find_commit.sql"))
            .bind(project)
            .bind(tag)
            .fetch_optional(&self.pool)
            .await
            .or_raise(|| ErrorKind::Authority("checkout"))?;
        let Some(commit_id) = commit_id else {
            exn::bail!(ErrorKind::VersionNotFound { project: project.to_string(), tag: tag.to_string() });
        };
        let rows: Vec<CheckoutRow> = sqlx::query_as(include_str!("../queries/checkout_files.sql"))
            .bind(commit_id)
            .fetch_all(&self.pool)
            .await
            .or_raise(|| ErrorKind::Authority("checkout"))?;
        let entries = rows.into_iter().map(TryInto::try_into).collect::<Result<Vec<_>>>()?;
        Ok(CheckoutManifest { project: project.to_string(), tag: tag.to_string(), entries })
    }

    async fn list_versions(&self, project: &str) -> Result<Vec<String>> {
        // Unknown projects list no tags; they only exist once something was
        // committed under them.
        sqlx::query_scalar(include_str!("../queries/list_versions.sql"))
            .bind(project)
            .fetch_all(&self.pool)
            .await
            .or_raise(|| ErrorKind::Authority("list versions"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use packrat_proto::ManifestEntry;

    async fn authority() -> SqliteAuthority {
        let db = Database::connect_in_memory().await.unwrap();
        SqliteAuthority::from(&db)
    }

    fn entry(path: &str, hash: &str, size: u64) -> ManifestEntry {
        ManifestEntry::new(path, hash, size)
    }

    async fn confirm(authority: &SqliteAuthority, entries: &[ManifestEntry]) {
        for e in entries {
            authority.confirm_upload(ConfirmUpload::for_entry(e)).await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_handshake_empty_manifest() {
        let authority = authority().await;
        let response = authority
            .handshake(HandshakeRequest { project: "film".to_string(), manifest: vec![] })
            .await
            .unwrap();
        assert!(response.nothing_required());
    }

    #[tokio::test]
    async fn test_handshake_before_and_after_confirm() {
        let authority = authority().await;
        let manifest = vec![entry("a.bin", "hash-a", 100)];
        let request = HandshakeRequest { project: "film".to_string(), manifest: manifest.clone() };
        let response = authority.handshake(request.clone()).await.unwrap();
        assert_eq!(response.required_paths, vec!["a.bin"]);
        confirm(&authority, &manifest).await;
        let response = authority.handshake(request).await.unwrap();
        assert!(response.nothing_required());
    }

    #[tokio::test]
    async fn test_handshake_lists_every_path_of_a_shared_hash() {
        let authority = authority().await;
        let manifest = vec![entry("one/copy.bin", "same", 4), entry("two/copy.bin", "same", 4)];
        let response =
            authority.handshake(HandshakeRequest { project: "film".to_string(), manifest }).await.unwrap();
        assert_eq!(response.required_paths, vec!["one/copy.bin", "two/copy.bin"]);
    }

    #[tokio::test]
    async fn test_confirm_upload_is_idempotent() {
        let authority = authority().await;
        let e = entry("a.bin", "hash-a", 100);
        confirm(&authority, std::slice::from_ref(&e)).await;
        confirm(&authority, std::slice::from_ref(&e)).await;
        let response = authority
            .handshake(HandshakeRequest { project: "film".to_string(), manifest: vec![e] })
            .await
            .unwrap();
        assert!(response.nothing_required());
    }

    #[tokio::test]
    async fn test_commit_and_checkout_round_trip() {
        let authority = authority().await;
        let manifest = vec![entry("b.bin", "hash-b", 2), entry("a.bin", "hash-a", 1)];
        confirm(&authority, &manifest).await;
        let receipt = authority
            .commit(CommitRequest {
                project: "film".to_string(),
                tag: "v1.0".to_string(),
                message: "first".to_string(),
                author: "ada".to_string(),
                manifest,
                allow_partial: false,
            })
            .await
            .unwrap();
        assert_eq!(receipt.linked, 2);
        assert!(receipt.unresolved.is_empty());
        let checkout = authority.checkout("film", "v1.0").await.unwrap();
        let paths: Vec<_> = checkout.entries.iter().map(|e| e.path.as_str()).collect();
        assert_eq!(paths, vec!["a.bin", "b.bin"]);
        assert_eq!(checkout.entries[0].locator.as_str(), "/blobs/hash-a");
    }

    #[tokio::test]
    async fn test_duplicate_tag_is_rejected() {
        let authority = authority().await;
        let request = CommitRequest {
            project: "film".to_string(),
            tag: "v1.0".to_string(),
            message: String::new(),
            author: String::new(),
            manifest: vec![],
            allow_partial: false,
        };
        authority.commit(request.clone()).await.unwrap();
        let err = authority.commit(request).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::DuplicateTag(tag) if tag == "v1.0"));
    }

    #[tokio::test]
    async fn test_unconfirmed_content_aborts_commit() {
        let authority = authority().await;
        let confirmed = entry("ok.bin", "hash-ok", 1);
        confirm(&authority, std::slice::from_ref(&confirmed)).await;
        let err = authority
            .commit(CommitRequest {
                project: "film".to_string(),
                tag: "v1.0".to_string(),
                message: String::new(),
                author: String::new(),
                manifest: vec![confirmed, entry("rogue.bin", "hash-rogue", 1)],
                allow_partial: false,
            })
            .await
            .unwrap_err();
        assert!(matches!(&*err, ErrorKind::PartialCommit(paths) if paths == &["rogue.bin".to_string()]));
        // Nothing was persisted, not even the lazily created project.
        assert!(authority.list_versions("film").await.unwrap().is_empty());
        assert!(matches!(
            &*authority.checkout("film", "v1.0").await.unwrap_err(),
            ErrorKind::VersionNotFound { .. }
        ));
    }

    #[tokio::test]
    async fn test_partial_commit_keeps_resolved_subset() {
        let authority = authority().await;
        let confirmed = entry("ok.bin", "hash-ok", 1);
        confirm(&authority, std::slice::from_ref(&confirmed)).await;
        let receipt = authority
            .commit(CommitRequest {
                project: "film".to_string(),
                tag: "v1.0".to_string(),
                message: String::new(),
                author: String::new(),
                manifest: vec![confirmed, entry("rogue.bin", "hash-rogue", 1)],
                allow_partial: true,
            })
            .await
            .unwrap();
        assert_eq!(receipt.linked, 1);
        assert_eq!(receipt.unresolved, vec!["rogue.bin"]);
        let checkout = authority.checkout("film", "v1.0").await.unwrap();
        assert_eq!(checkout.entries.len(), 1);
        assert_eq!(checkout.entries[0].path, "ok.bin");
    }

    #[tokio::test]
    async fn test_empty_commit_checks_out_empty() {
        let authority = authority().await;
        authority
            .commit(CommitRequest {
                project: "film".to_string(),
                tag: "v1.0".to_string(),
                message: String::new(),
                author: String::new(),
                manifest: vec![],
                allow_partial: false,
            })
            .await
            .unwrap();
        let checkout = authority.checkout("film", "v1.0").await.unwrap();
        assert!(checkout.entries.is_empty());
    }

    #[tokio::test]
    async fn test_blank_tag_is_invalid() {
        let authority = authority().await;
        let err = authority
            .commit(CommitRequest {
                project: "film".to_string(),
                tag: "   ".to_string(),
                message: String::new(),
                author: String::new(),
                manifest: vec![],
                allow_partial: false,
            })
            .await
            .unwrap_err();
        assert!(matches!(&*err, ErrorKind::InvalidTag(_)));
    }

    #[tokio::test]
    async fn test_duplicate_manifest_path_is_invalid() {
        let authority = authority().await;
        let err = authority
            .commit(CommitRequest {
                project: "film".to_string(),
                tag: "v1.0".to_string(),
                message: String::new(),
                author: String::new(),
                manifest: vec![entry("a.bin", "h1", 1), entry("a.bin", "h2", 2)],
                allow_partial: false,
            })
            .await
            .unwrap_err();
        assert!(matches!(&*err, ErrorKind::InvalidRequest(_)));
    }

    #[tokio::test]
    async fn test_list_versions_newest_first() {
        let authority = authority().await;
        for tag in ["v1.0", "v1.1", "v2.0"] {
            authority
                .commit(CommitRequest {
                    project: "film".to_string(),
                    tag: tag.to_string(),
                    message: String::new(),
                    author: String::new(),
                    manifest: vec![],
                    allow_partial: false,
                })
                .await
                .unwrap();
        }
        let versions = authority.list_versions("film").await.unwrap();
        assert_eq!(versions, vec!["v2.0", "v1.1", "v1.0"]);
    }

    #[tokio::test]
    async fn test_assets_are_shared_across_projects() {
        let authority = authority().await;
        let shared = entry("asset.bin", "hash-shared", 8);
        confirm(&authority, std::slice::from_ref(&shared)).await;
        for project in ["film-a", "film-b"] {
            authority
                .commit(CommitRequest {
                    project: project.to_string(),
                    tag: "v1.0".to_string(),
                    message: String::new(),
                    author: String::new(),
                    manifest: vec![shared.clone()],
                    allow_partial: false,
                })
                .await
                .unwrap();
        }
        // Second project's handshake sees the content as already known.
        let response = authority
            .handshake(HandshakeRequest { project: "film-c".to_string(), manifest: vec![shared] })
            .await
            .unwrap();
        assert!(response.nothing_required());
    }
}
