//! Registry of origin-platform chats that receive relayed messages.
//!
//! Append-only: a chat is added the first time it writes to the bot and
//! never removed automatically. Persisted as a JSON array of chat ids.

use std::path::PathBuf;

use {
    serde_json::Value,
    tokio::sync::RwLock,
    tracing::{info, warn},
};

use crate::Result;

pub struct SubscriberRegistry {
    path: Option<PathBuf>,
    chats: RwLock<Vec<String>>,
}

impl SubscriberRegistry {
    /// Load the registry file. Numbers and strings are both accepted as ids;
    /// a missing or unreadable file starts an empty registry.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let chats = match tokio::fs::read_to_string(&path).await {
            Ok(data) => parse_ids(&data).unwrap_or_else(|e| {
                warn!(path = %path.display(), error = %e, "subscriber file unreadable, starting empty");
                Vec::new()
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(e.into()),
        };
        info!(path = %path.display(), subscribers = chats.len(), "loaded subscribers");
        Ok(Self {
            path: Some(path),
            chats: RwLock::new(chats),
        })
    }

    #[must_use]
    pub fn in_memory(chats: impl IntoIterator<Item = String>) -> Self {
        let mut list = Vec::new();
        for chat in chats {
            if !list.contains(&chat) {
                list.push(chat);
            }
        }
        Self {
            path: None,
            chats: RwLock::new(list),
        }
    }

    /// Add `chat_id`. Returns `true` when it was not registered before.
    pub async fn register(&self, chat_id: &str) -> Result<bool> {
        let mut chats = self.chats.write().await;
        if chats.iter().any(|c| c == chat_id) {
            return Ok(false);
        }
        chats.push(chat_id.to_string());
        info!(chat_id, total = chats.len(), "registered subscriber");

        if let Some(path) = &self.path {
            if let Some(parent) = path.parent()
                && !parent.as_os_str().is_empty()
            {
                tokio::fs::create_dir_all(parent).await?;
            }
            let json = serde_json::to_vec_pretty(&*chats)?;
            let tmp = path.with_extension("json.tmp");
            tokio::fs::write(&tmp, &json).await?;
            tokio::fs::rename(&tmp, path).await?;
        }
        Ok(true)
    }

    /// Snapshot of all subscribers, in registration order.
    pub async fn list(&self) -> Vec<String> {
        self.chats.read().await.clone()
    }

    pub async fn contains(&self, chat_id: &str) -> bool {
        self.chats.read().await.iter().any(|c| c == chat_id)
    }

    pub async fn len(&self) -> usize {
        self.chats.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.chats.read().await.is_empty()
    }
}

fn parse_ids(data: &str) -> serde_json::Result<Vec<String>> {
    if data.trim().is_empty() {
        return Ok(Vec::new());
    }
    let values: Vec<Value> = serde_json::from_str(data)?;
    let mut ids: Vec<String> = Vec::with_capacity(values.len());
    for value in values {
        let id = match value {
            Value::String(s) => s,
            Value::Number(n) => n.to_string(),
            other => {
                warn!(value = %other, "skipping non-id subscriber entry");
                continue;
            },
        };
        if !ids.contains(&id) {
            ids.push(id);
        }
    }
    Ok(ids)
}
