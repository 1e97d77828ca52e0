//! Cache Persistence
//!
//! Each stored variant is written as two sibling files: `<hash>.json` holding
//! the metadata array (bodies nulled) and `<hash>.data` holding the raw body.
//! `<hash>` is the MD5 hex digest of the serialized metadata array.

use std::fs;
use std::path::Path;

use md5::{Digest, Md5};

use super::{CachedResponse, ResponseCache, cache_key};
use crate::NetError;

impl ResponseCache {
    /// Write every complete entry to `dir`, returning the number of file pairs written
    pub fn save_to_dir(&self, dir: &Path) -> Result<usize, NetError> {
        fs::create_dir_all(dir)?;
        let groups: Vec<Vec<CachedResponse>> = self.lock().entries.values().cloned().collect();

        let mut written = 0;
        for group in groups {
            for entry in group.into_iter().filter(|e| !e.is_waiting_for_body()) {
                let body = entry.body().map(<[u8]>::to_vec);
                let mut metadata = entry;
                if let Some(stored) = metadata.response.as_mut() {
                    stored.body = None;
                }
                let json = serde_json::to_string(&[metadata])?;
                let hash = hex::encode(Md5::digest(json.as_bytes()));

                fs::write(dir.join(format!("{hash}.json")), &json)?;
                fs::write(dir.join(format!("{hash}.data")), body.unwrap_or_default())?;
                written += 1;
            }
        }

        tracing::debug!("Saved {} cache entries to {}", written, dir.display());
        Ok(written)
    }

    /// Load entries written by `save_to_dir`, returning the number restored
    ///
    /// Expired entries without validators are skipped, as are entries saved
    /// before their body arrived.
    pub fn load_from_dir(&self, dir: &Path) -> Result<usize, NetError> {
        let now = self.now();
        let mut restored = 0;

        for dir_entry in fs::read_dir(dir)? {
            let path = dir_entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }

            let json = fs::read_to_string(&path)?;
            let entries: Vec<CachedResponse> = match serde_json::from_str(&json) {
                Ok(entries) => entries,
                Err(err) => {
                    tracing::warn!("Skipping unreadable cache file {}: {}", path.display(), err);
                    continue;
                }
            };
            let body = fs::read(path.with_extension("data")).ok();

            let mut store = self.lock();
            for mut entry in entries {
                if entry.is_waiting_for_body() {
                    continue;
                }
                if entry.is_expired(now) && entry.last_modified.is_none() && entry.etag.is_none() {
                    continue;
                }
                let Some(stored) = entry.response.as_mut() else {
                    continue;
                };
                stored.body = body.clone();
                stored.waiting_for_body = false;

                let key = entry.url.clone();
                let group = store.entries.entry(key).or_default();
                match group
                    .iter()
                    .position(|e| e.request_method == entry.request_method && e.vary_headers == entry.vary_headers)
                {
                    Some(i) => group[i] = entry,
                    None => group.push(entry),
                }
                restored += 1;
            }
        }

        Ok(restored)
    }

    /// File stem used for an entry written by `save_to_dir`
    pub fn persisted_name(entry: &CachedResponse) -> Result<String, NetError> {
        let mut metadata = entry.clone();
        if let Some(stored) = metadata.response.as_mut() {
            stored.body = None;
        }
        let json = serde_json::to_string(&[metadata])?;
        Ok(hex::encode(Md5::digest(json.as_bytes())))
    }

    /// Whether any entry is stored for `url`
    pub fn contains_url(&self, url: &url::Url) -> bool {
        self.lock().entries.contains_key(&cache_key(url))
    }
}
