//! Bidirectional message correlation table.
//!
//! Every relayed message produces one pair: the source message and its
//! mirror on the other platform. The pair is stored as two reverse records
//! keyed by `"<platform>:<chat>:<message>"`, so lookups work from either
//! side. Records are always inserted and removed two at a time.

use std::collections::{HashMap, HashSet, VecDeque};

use {
    serde::{Deserialize, Serialize},
    tgdc_channels::Platform,
};

/// Fully qualified message identity on one platform.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageRef {
    pub platform: Platform,
    pub chat_id: String,
    pub message_id: String,
}

impl MessageRef {
    #[must_use]
    pub fn new(
        platform: Platform,
        chat_id: impl Into<String>,
        message_id: impl Into<String>,
    ) -> Self {
        Self {
            platform,
            chat_id: chat_id.into(),
            message_id: message_id.into(),
        }
    }

    /// Stringified key used in the correlation mapping.
    #[must_use]
    pub fn key(&self) -> String {
        format!(
            "{}:{}:{}",
            self.platform.as_str(),
            self.chat_id,
            self.message_id
        )
    }
}

impl std::fmt::Display for MessageRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.key())
    }
}

/// Which half of a pair a record is keyed by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// A message written by a person.
    Source,
    /// A copy produced by the relay.
    Mirror,
}

/// One reverse-lookup record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Correlation {
    /// The message on the other side of the pair.
    pub peer: MessageRef,
    /// Role of the message this record is keyed by.
    pub role: Role,
    /// The mirror was sent through a send-as identity and can only be
    /// edited or deleted through it.
    #[serde(default)]
    pub impersonated: bool,
}

/// Serialized form of one record, in insertion order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredCorrelation {
    pub key: String,
    #[serde(flatten)]
    pub correlation: Correlation,
}

/// In-memory correlation mapping with insertion-order eviction.
#[derive(Debug, Default)]
pub struct CorrelationTable {
    records: HashMap<String, Correlation>,
    order: VecDeque<String>,
}

impl CorrelationTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of keys (twice the number of pairs).
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.records.contains_key(key)
    }

    #[must_use]
    pub fn lookup(&self, message: &MessageRef) -> Option<&Correlation> {
        self.records.get(&message.key())
    }

    /// Insert the pair `source <-> mirror`.
    ///
    /// Any pair either message already belonged to is removed first (last
    /// write wins). Returns the keys that were dropped that way.
    pub fn link(&mut self, source: &MessageRef, mirror: &MessageRef, impersonated: bool) -> Vec<String> {
        let source_key = source.key();
        let mirror_key = mirror.key();

        let mut removed = Vec::new();
        for key in [&source_key, &mirror_key] {
            if let Some((a, b)) = self.remove_pair(key) {
                removed.push(a);
                removed.extend(b);
            }
        }
        if !removed.is_empty() {
            let gone: HashSet<&str> = removed.iter().map(String::as_str).collect();
            self.order.retain(|k| !gone.contains(k.as_str()));
        }

        self.records.insert(source_key.clone(), Correlation {
            peer: mirror.clone(),
            role: Role::Source,
            impersonated,
        });
        self.records.insert(mirror_key.clone(), Correlation {
            peer: source.clone(),
            role: Role::Mirror,
            impersonated,
        });
        self.order.push_back(source_key);
        self.order.push_back(mirror_key);
        removed
    }

    /// Remove the pair containing `message`. Returns the record that was
    /// keyed by `message`, or `None` when it was not correlated.
    pub fn unlink(&mut self, message: &MessageRef) -> Option<Correlation> {
        let key = message.key();
        let existing = self.records.get(&key).cloned()?;
        if let Some((a, b)) = self.remove_pair(&key) {
            self.order.retain(|k| *k != a && Some(k) != b.as_ref());
        }
        Some(existing)
    }

    /// Evict the oldest half of the keys once the table holds more than
    /// `ceiling` keys. Partners are evicted together, so no key is ever
    /// left without its reverse record. Returns the evicted keys.
    pub fn prune(&mut self, ceiling: usize) -> Vec<String> {
        if self.records.len() <= ceiling {
            return Vec::new();
        }
        let target = self.records.len() / 2;
        let mut evicted: Vec<String> = Vec::with_capacity(target + 1);
        let mut gone: HashSet<String> = HashSet::new();

        for key in &self.order {
            if evicted.len() >= target {
                break;
            }
            if gone.contains(key) {
                continue;
            }
            if let Some(record) = self.records.get(key) {
                let peer_key = record.peer.key();
                gone.insert(key.clone());
                evicted.push(key.clone());
                if gone.insert(peer_key.clone()) {
                    evicted.push(peer_key);
                }
            }
        }

        for key in &evicted {
            self.records.remove(key);
        }
        self.order.retain(|k| !gone.contains(k));
        evicted
    }

    /// Records in insertion order, for persistence.
    pub fn entries(&self) -> impl Iterator<Item = StoredCorrelation> + '_ {
        self.order.iter().filter_map(|key| {
            self.records.get(key).map(|correlation| StoredCorrelation {
                key: key.clone(),
                correlation: correlation.clone(),
            })
        })
    }

    /// Rebuild from persisted records, dropping any record whose reverse
    /// record is missing or points elsewhere. Returns the table and the
    /// number of dropped records.
    #[must_use]
    pub fn from_entries(entries: Vec<StoredCorrelation>) -> (Self, usize) {
        let total = entries.len();
        let mut records: HashMap<String, Correlation> = HashMap::with_capacity(total);
        let mut order = VecDeque::with_capacity(total);
        for entry in entries {
            if records.insert(entry.key.clone(), entry.correlation).is_none() {
                order.push_back(entry.key);
            }
        }

        let unpaired: HashSet<String> = records
            .iter()
            .filter(|(key, record)| {
                records
                    .get(&record.peer.key())
                    .is_none_or(|back| back.peer.key() != **key || back.role == record.role)
            })
            .map(|(key, _)| key.clone())
            .collect();
        for key in &unpaired {
            records.remove(key);
        }
        order.retain(|k| !unpaired.contains(k));

        let dropped = total - records.len();
        (Self { records, order }, dropped)
    }

    /// Remove `key` and its partner from the map (not from `order`).
    fn remove_pair(&mut self, key: &str) -> Option<(String, Option<String>)> {
        let record = self.records.remove(key)?;
        let peer_key = record.peer.key();
        let peer_removed = self.records.remove(&peer_key).map(|_| peer_key);
        Some((key.to_string(), peer_removed))
    }
}
