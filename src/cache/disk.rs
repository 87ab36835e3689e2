//! Cache storage persisted under a directory, surviving restarts.
//!
//! Layout: one directory per store, named from the SHA-256 of the store name
//! and holding a `store.json` descriptor. Each entry is a single `.entry`
//! file: a JSON metadata line, a newline, then the raw body bytes. Entries are
//! written to a unique `.part` file and renamed into place, so readers see
//! either the old or the new entry and concurrent writers are last-write-wins.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::{CacheStorage, check_put_key};
use crate::error::{Error, Result};
use crate::http::{RequestKey, Response, ResponseType};

const STORE_FILE: &str = "store.json";
const ENTRY_EXT: &str = "entry";

static PART_COUNTER: AtomicU64 = AtomicU64::new(0);

#[derive(Debug, Serialize, Deserialize)]
struct StoreDescriptor {
    name: String,
    created: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
struct EntryMeta {
    key: RequestKey,
    status: u16,
    status_text: String,
    kind: ResponseType,
    headers: Vec<(String, String)>,
    stored_at: DateTime<Utc>,
}

fn sha256_hex(input: &str) -> String {
    Sha256::digest(input.as_bytes())
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect()
}

/// Cache storage backed by the local file system via `tokio::fs`.
#[derive(Debug, Clone)]
pub struct DiskCacheStorage {
    root: PathBuf,
}

impl DiskCacheStorage {
    /// Creates a storage rooted at `root`. Nothing is touched until first use.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Returns the root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn store_dir(&self, name: &str) -> PathBuf {
        self.root.join(format!("store-{}", &sha256_hex(name)[..16]))
    }

    fn entry_path(&self, name: &str, key: &RequestKey) -> PathBuf {
        self.store_dir(name)
            .join(format!("{}.{ENTRY_EXT}", sha256_hex(&key.to_string())))
    }

    async fn read_descriptor(dir: &Path) -> Result<Option<StoreDescriptor>> {
        match tokio::fs::read(dir.join(STORE_FILE)).await {
            Ok(raw) => Ok(Some(serde_json::from_slice(&raw)?)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Writes `contents` to `path` through a uniquely named `.part` file.
    async fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
        let seq = PART_COUNTER.fetch_add(1, Ordering::Relaxed);
        let part = path.with_extension(format!("{}.{seq}.part", std::process::id()));
        tokio::fs::write(&part, contents).await?;
        if let Err(e) = tokio::fs::rename(&part, path).await {
            let _ = tokio::fs::remove_file(&part).await;
            return Err(e.into());
        }
        Ok(())
    }

    async fn read_entry(path: &Path) -> Result<Option<(EntryMeta, Bytes)>> {
        let raw = match tokio::fs::read(path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let split = raw
            .iter()
            .position(|&b| b == b'\n')
            .ok_or_else(|| Error::Cache(format!("corrupt entry {}", path.display())))?;
        let meta: EntryMeta = serde_json::from_slice(&raw[..split])?;
        let body = Bytes::copy_from_slice(&raw[split + 1..]);
        Ok(Some((meta, body)))
    }
}

#[async_trait]
impl CacheStorage for DiskCacheStorage {
    async fn open(&self, name: &str) -> Result<()> {
        let dir = self.store_dir(name);
        tokio::fs::create_dir_all(&dir).await?;
        if Self::read_descriptor(&dir).await?.is_none() {
            let descriptor = StoreDescriptor {
                name: name.to_string(),
                created: Utc::now(),
            };
            Self::write_atomic(&dir.join(STORE_FILE), &serde_json::to_vec(&descriptor)?).await?;
        }
        Ok(())
    }

    async fn keys(&self) -> Result<Vec<String>> {
        let mut dirs = match tokio::fs::read_dir(&self.root).await {
            Ok(dirs) => dirs,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let mut stores = Vec::new();
        while let Some(entry) = dirs.next_entry().await? {
            if !entry.file_type().await?.is_dir() {
                continue;
            }
            if let Some(descriptor) = Self::read_descriptor(&entry.path()).await? {
                stores.push(descriptor);
            }
        }
        stores.sort_by(|a, b| a.created.cmp(&b.created).then_with(|| a.name.cmp(&b.name)));
        Ok(stores.into_iter().map(|d| d.name).collect())
    }

    async fn delete(&self, name: &str) -> Result<bool> {
        match tokio::fs::remove_dir_all(self.store_dir(name)).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn match_request(&self, name: &str, key: &RequestKey) -> Result<Option<Response>> {
        if !key.is_cacheable() {
            return Ok(None);
        }
        let Some((meta, body)) = Self::read_entry(&self.entry_path(name, key)).await? else {
            return Ok(None);
        };
        // Guard against a hash collision handing back another request's entry.
        if &meta.key != key {
            return Ok(None);
        }
        Ok(Some(Response {
            status: meta.status,
            status_text: meta.status_text,
            kind: meta.kind,
            headers: meta.headers,
            body,
        }))
    }

    async fn put(&self, name: &str, key: &RequestKey, response: &Response) -> Result<()> {
        check_put_key(key)?;
        self.open(name).await?;
        let meta = EntryMeta {
            key: key.clone(),
            status: response.status,
            status_text: response.status_text.clone(),
            kind: response.kind,
            headers: response.headers.clone(),
            stored_at: Utc::now(),
        };
        let mut contents = serde_json::to_vec(&meta)?;
        contents.push(b'\n');
        contents.extend_from_slice(&response.body);
        Self::write_atomic(&self.entry_path(name, key), &contents).await
    }

    async fn entries(&self, name: &str) -> Result<Vec<RequestKey>> {
        let mut files = match tokio::fs::read_dir(self.store_dir(name)).await {
            Ok(files) => files,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let mut keys = Vec::new();
        while let Some(file) = files.next_entry().await? {
            let path = file.path();
            if path.extension().is_some_and(|ext| ext == ENTRY_EXT)
                && let Some((meta, _)) = Self::read_entry(&path).await?
            {
                keys.push(meta.key);
            }
        }
        keys.sort();
        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::Request;
    use tempfile::TempDir;
    use url::Url;

    fn key(path: &str) -> RequestKey {
        Request::get(Url::parse("https://site.test/").unwrap().join(path).unwrap()).key()
    }

    #[tokio::test]
    async fn missing_root_has_no_stores() {
        let dir = TempDir::new().unwrap();
        let storage = DiskCacheStorage::new(dir.path().join("absent"));
        assert!(storage.keys().await.unwrap().is_empty());
        assert!(!storage.delete("smcp-v1").await.unwrap());
    }

    #[tokio::test]
    async fn open_and_list_stores() {
        let dir = TempDir::new().unwrap();
        let storage = DiskCacheStorage::new(dir.path());
        storage.open("smcp-v1").await.unwrap();
        storage.open("smcp-v1").await.unwrap();
        assert_eq!(storage.keys().await.unwrap(), vec!["smcp-v1"]);
    }

    #[tokio::test]
    async fn entry_round_trips_bytes_and_metadata() {
        let dir = TempDir::new().unwrap();
        let storage = DiskCacheStorage::new(dir.path());
        let k = key("icon.svg");
        let body: &[u8] = b"<svg>\n<circle r=\"4\"/>\n</svg>";
        let response = Response::new(200, Bytes::from_static(body))
            .with_header("content-type", "image/svg+xml");

        storage.put("smcp-v1", &k, &response).await.unwrap();
        let hit = storage.match_request("smcp-v1", &k).await.unwrap().unwrap();

        assert_eq!(hit, response);
        assert!(storage.match_request("smcp-v1", &key("index.html")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn entries_survive_reopen() {
        let dir = TempDir::new().unwrap();
        DiskCacheStorage::new(dir.path())
            .put("smcp-v1", &key("index.html"), &Response::new(200, "home"))
            .await
            .unwrap();

        let reopened = DiskCacheStorage::new(dir.path());
        assert_eq!(reopened.entries("smcp-v1").await.unwrap(), vec![key("index.html")]);
    }

    #[tokio::test]
    async fn delete_removes_entries() {
        let dir = TempDir::new().unwrap();
        let storage = DiskCacheStorage::new(dir.path());
        storage.put("smcp-v1", &key("a.html"), &Response::new(200, "a")).await.unwrap();
        storage.open("smcp-v2").await.unwrap();

        assert!(storage.delete("smcp-v1").await.unwrap());
        assert_eq!(storage.keys().await.unwrap(), vec!["smcp-v2"]);
        assert!(storage.match_request("smcp-v1", &key("a.html")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn non_get_entries_are_rejected() {
        let dir = TempDir::new().unwrap();
        let storage = DiskCacheStorage::new(dir.path());
        let url = Url::parse("https://site.test/submit").unwrap();
        let post = Request::get(url).with_method(reqwest::Method::POST).key();

        let result = storage.put("smcp-v1", &post, &Response::new(200, "ok")).await;

        assert!(matches!(result, Err(Error::Cache(_))));
        assert!(storage.match_request("smcp-v1", &post).await.unwrap().is_none());
        assert!(storage.keys().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn concurrent_puts_leave_one_whole_entry() {
        let dir = TempDir::new().unwrap();
        let storage = DiskCacheStorage::new(dir.path());
        let k = key("module1.html");
        let responses: Vec<Response> = (0..8)
            .map(|i| Response::new(200, format!("body-{i}").repeat(512)))
            .collect();

        let writes = responses.iter().map(|r| storage.put("v", &k, r));
        for result in futures::future::join_all(writes).await {
            result.unwrap();
        }

        let hit = storage.match_request("v", &k).await.unwrap().unwrap();
        assert!(responses.iter().any(|r| r.body == hit.body));
        assert_eq!(storage.entries("v").await.unwrap(), vec![k]);
    }
}
