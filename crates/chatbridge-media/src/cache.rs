//! On-disk cache of downloaded attachments.
//!
//! Files live at `<root>/<chat dir>/<filename>`.  A file that already exists
//! is returned as-is; otherwise the descriptor is loaded from the store, the
//! transport downloads and verifies the blob, and the result is renamed into
//! place from a temp file.  Concurrent misses for the same file are not deduplicated: the
//! last write wins, which is harmless as content is fixed per locator.

use std::path::{Component, Path, PathBuf};
use std::sync::{Arc, Mutex};

use tokio::fs;
use tracing::{debug, info};

use chatbridge_net::MediaFetcher;
use chatbridge_shared::{Jid, MediaKind};
use chatbridge_store::{Database, MediaInfo};

use crate::error::{MediaError, Result};

/// A cached attachment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedMedia {
    pub kind: MediaKind,
    pub filename: String,
    pub path: PathBuf,
    /// `false` when the file was already cached
    pub downloaded: bool,
}

pub struct MediaCache<F: ?Sized> {
    root: PathBuf,
    store: Arc<Mutex<Database>>,
    fetcher: Arc<F>,
}

impl<F: MediaFetcher + ?Sized> MediaCache<F> {
    pub fn new(root: PathBuf, store: Arc<Mutex<Database>>, fetcher: Arc<F>) -> Self {
        Self {
            root,
            store,
            fetcher,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Deterministic location of `filename` for `chat`, confined to the root.
    pub fn media_path(&self, chat: &Jid, filename: &str) -> Result<PathBuf> {
        let dir = chat.to_dir_name();
        for part in [dir.as_str(), filename] {
            if matches!(part, "" | "." | "..") || part.contains('/') || part.contains('\\') {
                return Err(MediaError::InvalidPath(format!("{dir}/{filename}")));
            }
        }
        ensure_within(&self.root, &self.root.join(&dir).join(filename))
    }

    /// Local file for the attachment of message `(message_id, chat)`.
    pub async fn resolve(&self, message_id: &str, chat: &Jid) -> Result<ResolvedMedia> {
        let info = self.media_info(message_id, chat)?;
        let kind = info.kind.ok_or(MediaError::NotMedia)?;
        let path = self.media_path(chat, &info.filename)?;

        if fs::try_exists(&path).await.unwrap_or(false) {
            debug!(chat = %chat, id = %message_id, path = %path.display(), "media cache hit");
            return Ok(ResolvedMedia {
                kind,
                filename: info.filename,
                path,
                downloaded: false,
            });
        }

        if !info.reference.is_complete() {
            return Err(MediaError::IncompleteMedia);
        }

        let data = self.fetcher.download(&info.reference, kind).await?;

        write_atomically(&path, &data).await?;

        info!(
            chat = %chat,
            id = %message_id,
            kind = %kind,
            bytes = data.len(),
            sha256 = %hex::encode(&info.reference.digest_plain),
            path = %path.display(),
            "downloaded media"
        );

        Ok(ResolvedMedia {
            kind,
            filename: info.filename,
            path,
            downloaded: true,
        })
    }

    /// Like [`MediaCache::resolve`] when only the display filename is known.
    ///
    /// An unknown filename is a terminal [`StoreError::NotFound`] rather than
    /// an empty file.
    ///
    /// [`StoreError::NotFound`]: chatbridge_store::StoreError::NotFound
    pub async fn resolve_by_filename(&self, chat: &Jid, filename: &str) -> Result<PathBuf> {
        let path = self.media_path(chat, filename)?;
        if fs::try_exists(&path).await.unwrap_or(false) {
            return Ok(path);
        }

        let message_id = {
            let db = self.lock_store()?;
            db.find_message_id_by_filename(chat, filename)?
        };
        Ok(self.resolve(&message_id, chat).await?.path)
    }

    fn media_info(&self, message_id: &str, chat: &Jid) -> Result<MediaInfo> {
        let db = self.lock_store()?;
        Ok(db.get_media_info(message_id, chat)?)
    }

    fn lock_store(&self) -> Result<std::sync::MutexGuard<'_, Database>> {
        self.store
            .lock()
            .map_err(|e| MediaError::Lock(e.to_string()))
    }
}

/// Write through a sibling temp file renamed over `path`. A partial write
/// never appears at `path`.
async fn write_atomically(path: &Path, data: &[u8]) -> Result<()> {
    let parent = path
        .parent()
        .ok_or_else(|| MediaError::InvalidPath(path.display().to_string()))?;
    fs::create_dir_all(parent).await?;

    let name = path.file_name().unwrap_or_default().to_string_lossy();
    let temp = parent.join(format!(".{name}.{:08x}.part", rand::random::<u32>()));
    if let Err(e) = fs::write(&temp, data).await {
        let _ = fs::remove_file(&temp).await;
        return Err(e.into());
    }
    if let Err(e) = fs::rename(&temp, path).await {
        let _ = fs::remove_file(&temp).await;
        return Err(e.into());
    }
    Ok(())
}

/// Rebuild `target` under `base` from its normal components only.
fn ensure_within(base: &Path, target: &Path) -> Result<PathBuf> {
    let mut resolved = base.to_path_buf();
    for component in target.strip_prefix(base).unwrap_or(target).components() {
        match component {
            Component::Normal(c) => resolved.push(c),
            Component::ParentDir => {
                return Err(MediaError::InvalidPath(target.display().to_string()));
            }
            _ => {}
        }
    }
    if !resolved.starts_with(base) {
        return Err(MediaError::InvalidPath(target.display().to_string()));
    }
    Ok(resolved)
}
