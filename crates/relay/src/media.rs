//! Download-then-upload media transfer with size ceilings.
//!
//! Each transfer lands in a uniquely named file inside the pipeline's
//! media directory. The file is owned by a [`LocalBlob`] which removes it
//! when dropped, whether the upload succeeded, failed or never happened.

use std::{
    path::{Path, PathBuf},
    sync::atomic::{AtomicU64, Ordering},
};

use {
    tempfile::TempDir,
    tgdc_channels::{Attachment, AttachmentKind, OutboundFile, PlatformClient, StickerFormat},
    tracing::{debug, warn},
};

#[cfg(feature = "metrics")]
use tgdc_metrics::{counter, media as media_metrics};

use crate::{Error, Result};

/// A downloaded attachment on local disk.
#[derive(Debug)]
pub struct LocalBlob {
    path: PathBuf,
    upload_name: String,
    kind: AttachmentKind,
    size: u64,
}

impl LocalBlob {
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Name the destination platform should see.
    #[must_use]
    pub fn upload_name(&self) -> &str {
        &self.upload_name
    }

    #[must_use]
    pub fn kind(&self) -> AttachmentKind {
        self.kind
    }

    #[must_use]
    pub fn size(&self) -> u64 {
        self.size
    }

    #[must_use]
    pub fn as_outbound(&self) -> OutboundFile {
        OutboundFile {
            path: self.path.clone(),
            file_name: self.upload_name.clone(),
            kind: self.kind,
        }
    }
}

impl Drop for LocalBlob {
    fn drop(&mut self) {
        match std::fs::remove_file(&self.path) {
            Ok(()) => debug!(path = %self.path.display(), "removed media file"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {},
            Err(e) => warn!(path = %self.path.display(), error = %e, "failed to remove media file"),
        }
    }
}

pub struct MediaPipeline {
    dir: PathBuf,
    seq: AtomicU64,
    _guard: Option<TempDir>,
}

impl MediaPipeline {
    /// Pipeline working in a fresh temporary directory, removed on drop.
    pub fn new() -> Result<Self> {
        let guard = tempfile::Builder::new().prefix("tgdc-media-").tempdir()?;
        Ok(Self {
            dir: guard.path().to_path_buf(),
            seq: AtomicU64::new(0),
            _guard: Some(guard),
        })
    }

    /// Pipeline working in `dir`, created if missing.
    pub fn in_dir(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            seq: AtomicU64::new(0),
            _guard: None,
        })
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Fetch `attachment` from `source` into a local file.
    ///
    /// A declared size above `cap` fails with [`Error::SizeExceeded`]
    /// before anything is downloaded. Sizes are checked again after the
    /// download for platforms that do not declare them.
    pub async fn transfer(
        &self,
        source: &dyn PlatformClient,
        attachment: &Attachment,
        cap: u64,
    ) -> Result<LocalBlob> {
        let label = attachment.kind.label();
        if let Some(size) = attachment.size
            && size > cap
        {
            debug!(kind = label, size, cap, "attachment above size cap, not downloading");
            #[cfg(feature = "metrics")]
            counter!(media_metrics::OVERSIZE_TOTAL).increment(1);
            return Err(Error::SizeExceeded {
                kind: label,
                size,
                cap,
            });
        }

        let bytes = source.fetch_file(attachment).await.map_err(|e| {
            #[cfg(feature = "metrics")]
            counter!(media_metrics::TRANSFER_FAILURES_TOTAL).increment(1);
            Error::transfer_failed(format!("fetching {label}"), e)
        })?;
        let size = bytes.len() as u64;
        if size > cap {
            #[cfg(feature = "metrics")]
            counter!(media_metrics::OVERSIZE_TOTAL).increment(1);
            return Err(Error::SizeExceeded {
                kind: label,
                size,
                cap,
            });
        }

        let ext = extension_for(attachment);
        let seq = self.seq.fetch_add(1, Ordering::Relaxed);
        let local_name = format!(
            "{}_{}_{seq}.{ext}",
            local_prefix(attachment.kind),
            sanitize(&attachment.unique_id)
        );
        let blob = LocalBlob {
            path: self.dir.join(local_name),
            upload_name: upload_name(attachment, &ext),
            kind: attachment.kind,
            size,
        };
        tokio::fs::write(&blob.path, &bytes)
            .await
            .map_err(|e| Error::transfer_failed(format!("writing {label}"), e))?;

        debug!(path = %blob.path.display(), size, kind = label, "media downloaded");
        #[cfg(feature = "metrics")]
        {
            counter!(media_metrics::TRANSFERS_TOTAL).increment(1);
            counter!(media_metrics::TRANSFER_BYTES_TOTAL).increment(size);
        }
        Ok(blob)
    }
}

fn local_prefix(kind: AttachmentKind) -> &'static str {
    match kind {
        AttachmentKind::Sticker(_) => "st",
        AttachmentKind::VideoNote => "vn",
        AttachmentKind::Voice => "vc",
        _ => "f",
    }
}

fn sanitize(id: &str) -> String {
    let cleaned: String = id
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '-' || *c == '_')
        .take(64)
        .collect();
    if cleaned.is_empty() {
        "file".to_string()
    } else {
        cleaned
    }
}

fn extension_for(attachment: &Attachment) -> String {
    let fixed = match attachment.kind {
        AttachmentKind::VideoNote => Some("mp4"),
        AttachmentKind::Photo => Some("jpg"),
        AttachmentKind::Sticker(format) => Some(match format {
            StickerFormat::Raster => "webp",
            StickerFormat::Video => "webm",
            StickerFormat::Animated => "tgs",
            StickerFormat::Png | StickerFormat::Apng => "png",
            StickerFormat::Gif => "gif",
            StickerFormat::Lottie => "json",
        }),
        _ => None,
    };
    if let Some(ext) = fixed {
        return ext.to_string();
    }

    if attachment.kind == AttachmentKind::Voice {
        return attachment
            .mime_type
            .as_deref()
            .and_then(|m| m.split('/').nth(1))
            .map(|sub| sub.split(';').next().unwrap_or(sub).trim())
            .filter(|sub| !sub.is_empty() && sub.chars().all(|c| c.is_ascii_alphanumeric()))
            .unwrap_or("ogg")
            .to_string();
    }

    if let Some(ext) = attachment
        .file_name
        .as_deref()
        .and_then(|name| Path::new(name).extension())
        .and_then(|ext| ext.to_str())
        .filter(|ext| !ext.is_empty() && ext.chars().all(|c| c.is_ascii_alphanumeric()))
    {
        return ext.to_ascii_lowercase();
    }

    attachment
        .mime_type
        .as_deref()
        .and_then(mime_guess::get_mime_extensions_str)
        .and_then(|exts| exts.first())
        .map_or_else(|| "bin".to_string(), |ext| (*ext).to_string())
}

fn upload_name(attachment: &Attachment, ext: &str) -> String {
    match attachment.kind {
        AttachmentKind::Sticker(_) => format!("sticker.{ext}"),
        AttachmentKind::VideoNote => "video_note.mp4".to_string(),
        AttachmentKind::Voice => format!("voice.{ext}"),
        _ => attachment
            .file_name
            .as_deref()
            .map(|name| name.trim())
            .filter(|name| !name.is_empty())
            .map_or_else(|| format!("file.{ext}"), str::to_string),
    }
}
