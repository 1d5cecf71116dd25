//! Output history and offsite payloads
//!
//! Every code cell with captured outputs owns a parallel output lineage.
//! Payloads larger than [`HistoryConfig::offsite_threshold_bytes`] are kept
//! out of the store: the committed [`NodeyOutput`] carries an [`OffsiteRef`]
//! and the payload itself is handed to the caller for an external artifact
//! store. Fetching it back goes through [`OutputResolver`], which caches by
//! content hash and degrades to a placeholder when the fetch fails.

use crate::config::HistoryConfig;
use crate::error::Result;
use async_trait::async_trait;
use moka::future::Cache;
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::warn;
use verdant_nodey::{ContentHash, Lineage, Nodey, NodeyOutput, OffsiteRef, OutputPayload};

/// Versions of one output lineage
#[derive(Debug, Clone)]
pub struct OutputHistory {
    lineage: Lineage,
    code: Lineage,
    versions: Vec<Arc<Nodey>>,
}

impl OutputHistory {
    pub(crate) fn new(lineage: Lineage, code: Lineage, versions: Vec<Arc<Nodey>>) -> Self {
        Self {
            lineage,
            code,
            versions,
        }
    }

    /// Output lineage
    #[inline]
    #[must_use]
    pub fn lineage(&self) -> Lineage {
        self.lineage
    }

    /// Code cell lineage that produces these outputs
    #[inline]
    #[must_use]
    pub fn code(&self) -> Lineage {
        self.code
    }

    /// Most recent output version
    #[inline]
    #[must_use]
    pub fn latest(&self) -> Option<&Arc<Nodey>> {
        self.versions.last()
    }

    /// Most recent output version published at or before a notebook version
    #[must_use]
    pub fn latest_at(&self, notebook: u32) -> Option<&Arc<Nodey>> {
        self.versions
            .iter()
            .rev()
            .find(|output| output.meta().notebook <= notebook)
    }

    /// All versions, oldest first
    #[inline]
    #[must_use]
    pub fn versions(&self) -> &[Arc<Nodey>] {
        &self.versions
    }

    /// Iterate output payloads, oldest first
    pub fn iter(&self) -> impl Iterator<Item = &NodeyOutput> {
        self.versions.iter().filter_map(|nodey| nodey.as_output())
    }

    /// Versions whose payloads satisfy a predicate
    pub fn filter<P>(&self, mut predicate: P) -> Vec<&NodeyOutput>
    where
        P: FnMut(&NodeyOutput) -> bool,
    {
        self.iter().filter(|output| predicate(output)).collect()
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.versions.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.versions.is_empty()
    }
}

/// Payload to be written to an external artifact store
#[derive(Debug, Clone, PartialEq)]
pub struct OffsitePayload {
    pub reference: OffsiteRef,
    pub payload: Value,
}

/// Decide where a captured output lives
///
/// Returns the payload to commit and, for oversized outputs, the payload
/// to hand to the artifact store.
///
/// # Errors
/// Returns error if the output cannot be serialized
pub fn externalize(output: Value, threshold: usize) -> Result<(OutputPayload, Option<OffsitePayload>)> {
    let bytes = serde_json::to_vec(&output)?;
    if bytes.len() <= threshold {
        return Ok((OutputPayload::Inline(output), None));
    }
    let reference = OffsiteRef {
        file_type: file_type_of(&output).to_string(),
        offsite: ContentHash::compute(&bytes),
        size: bytes.len(),
    };
    Ok((
        OutputPayload::Offsite(reference.clone()),
        Some(OffsitePayload {
            reference,
            payload: output,
        }),
    ))
}

fn file_type_of(output: &Value) -> &'static str {
    const MIME_TYPES: [(&str, &str); 4] = [
        ("image/png", "png"),
        ("image/jpeg", "jpeg"),
        ("image/svg+xml", "svg"),
        ("text/html", "html"),
    ];
    let Some(data) = output.get("data").and_then(Value::as_object) else {
        return "json";
    };
    MIME_TYPES
        .iter()
        .find(|(mime, _)| data.contains_key(*mime))
        .map_or("json", |(_, ext)| *ext)
}

/// Errors from an external artifact store
#[derive(Debug, Clone, thiserror::Error)]
pub enum FetchError {
    /// Locator is unknown to the store
    #[error("artifact {0} not found")]
    Missing(ContentHash),

    /// Store could not be reached
    #[error("artifact store unavailable: {0}")]
    Unavailable(String),
}

/// External capability that fetches offsite payloads
#[async_trait]
pub trait ArtifactFetcher: Send + Sync {
    /// Fetch the payload behind a reference
    async fn fetch(&self, reference: &OffsiteRef) -> std::result::Result<Value, FetchError>;
}

/// In-memory artifact store
#[derive(Debug, Default)]
pub struct MemoryArtifacts {
    blobs: RwLock<HashMap<ContentHash, Value>>,
}

impl MemoryArtifacts {
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Keep an externalized payload
    pub fn store(&self, payload: &OffsitePayload) {
        self.blobs
            .write()
            .insert(payload.reference.offsite, payload.payload.clone());
    }

    /// Drop a payload
    pub fn remove(&self, locator: &ContentHash) -> Option<Value> {
        self.blobs.write().remove(locator)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.blobs.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.blobs.read().is_empty()
    }
}

#[async_trait]
impl ArtifactFetcher for MemoryArtifacts {
    async fn fetch(&self, reference: &OffsiteRef) -> std::result::Result<Value, FetchError> {
        self.blobs
            .read()
            .get(&reference.offsite)
            .cloned()
            .ok_or(FetchError::Missing(reference.offsite))
    }
}

/// Displayable form of one output payload
#[derive(Debug, Clone, PartialEq)]
pub enum ResolvedOutput {
    /// Payload stored inline in the history
    Inline(Value),
    /// Payload fetched from the artifact store
    Fetched(Arc<Value>),
    /// Fetch failed; show a placeholder instead
    Placeholder { reference: OffsiteRef, reason: String },
}

impl ResolvedOutput {
    /// Payload, if one is available
    #[must_use]
    pub fn value(&self) -> Option<&Value> {
        match self {
            Self::Inline(value) => Some(value),
            Self::Fetched(value) => Some(value.as_ref()),
            Self::Placeholder { .. } => None,
        }
    }

    #[inline]
    #[must_use]
    pub fn is_placeholder(&self) -> bool {
        matches!(self, Self::Placeholder { .. })
    }
}

/// Resolves committed outputs into displayable payloads
///
/// Has no write access to the history; dropping a pending `resolve` future
/// leaves nothing behind but (possibly) a warm cache entry.
pub struct OutputResolver {
    fetcher: Arc<dyn ArtifactFetcher>,
    cache: Cache<ContentHash, Arc<Value>>,
}

impl OutputResolver {
    /// Create resolver with a cache sized from config
    #[must_use]
    pub fn new(fetcher: Arc<dyn ArtifactFetcher>, config: &HistoryConfig) -> Self {
        Self {
            fetcher,
            cache: Cache::new(config.offsite_cache_capacity),
        }
    }

    /// Resolve every payload of an output version
    pub async fn resolve(&self, output: &NodeyOutput) -> Vec<ResolvedOutput> {
        futures::future::join_all(output.raw.iter().map(|payload| self.resolve_payload(payload))).await
    }

    /// Resolve one payload
    pub async fn resolve_payload(&self, payload: &OutputPayload) -> ResolvedOutput {
        let reference = match payload {
            OutputPayload::Inline(value) => return ResolvedOutput::Inline(value.clone()),
            OutputPayload::Offsite(reference) => reference,
        };
        let fetched = self
            .cache
            .try_get_with(reference.offsite, async {
                self.fetcher.fetch(reference).await.map(Arc::new)
            })
            .await;
        match fetched {
            Ok(value) => ResolvedOutput::Fetched(value),
            Err(err) => {
                warn!(
                    locator = %reference.offsite.short(),
                    file_type = %reference.file_type,
                    error = %err,
                    "offsite fetch failed"
                );
                ResolvedOutput::Placeholder {
                    reference: reference.clone(),
                    reason: err.to_string(),
                }
            }
        }
    }

    /// Number of cached payloads
    #[must_use]
    pub fn cached_entries(&self) -> u64 {
        self.cache.entry_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use verdant_nodey::{CheckpointId, NodeMeta, NodeName};

    struct CountingFetcher {
        inner: MemoryArtifacts,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ArtifactFetcher for CountingFetcher {
        async fn fetch(&self, reference: &OffsiteRef) -> std::result::Result<Value, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.inner.fetch(reference).await
        }
    }

    fn output_with(raw: Vec<OutputPayload>) -> NodeyOutput {
        NodeyOutput {
            meta: NodeMeta {
                name: NodeName::new(0, 6, 0),
                created: CheckpointId(1),
                notebook: 1,
                parent: None,
            },
            parent: NodeName::new(0, 0, 0),
            raw,
        }
    }

    fn image() -> Value {
        json!({
            "output_type": "display_data",
            "data": {"image/png": "iVBORw0KGgo".repeat(20)},
        })
    }

    #[test]
    fn small_outputs_stay_inline() {
        let value = json!({"output_type": "stream", "text": "hi"});
        let (payload, offsite) = externalize(value.clone(), 1024).unwrap();
        assert_eq!(payload, OutputPayload::Inline(value));
        assert!(offsite.is_none());
    }

    #[test]
    fn large_outputs_go_offsite() {
        let (payload, offsite) = externalize(image(), 64).unwrap();
        let offsite = offsite.unwrap();
        assert!(payload.is_offsite());
        assert_eq!(offsite.reference.file_type, "png");
        assert_eq!(offsite.payload, image());
        assert!(offsite.reference.size > 64);
    }

    #[tokio::test]
    async fn resolver_fetches_and_caches() {
        let (payload, offsite) = externalize(image(), 64).unwrap();
        let fetcher = Arc::new(CountingFetcher {
            inner: MemoryArtifacts::new(),
            calls: AtomicUsize::new(0),
        });
        fetcher.inner.store(&offsite.unwrap());
        let resolver = OutputResolver::new(fetcher.clone(), &HistoryConfig::default());
        let output = output_with(vec![payload, OutputPayload::Inline(json!({"text": "ok"}))]);

        let first = resolver.resolve(&output).await;
        let second = resolver.resolve(&output).await;

        assert_eq!(first[0].value(), Some(&image()));
        assert_eq!(first[1].value(), Some(&json!({"text": "ok"})));
        assert_eq!(first, second);
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failed_fetch_degrades_to_placeholder() {
        let (payload, _) = externalize(image(), 64).unwrap();
        let resolver = OutputResolver::new(Arc::new(MemoryArtifacts::new()), &HistoryConfig::default());

        let resolved = resolver.resolve(&output_with(vec![payload])).await;

        assert_eq!(resolved.len(), 1);
        assert!(resolved[0].is_placeholder());
        assert!(resolved[0].value().is_none());
    }

    #[test]
    fn output_history_tracks_notebook_versions() {
        let make = |version: u32, notebook: u32| {
            Arc::new(Nodey::Output(NodeyOutput {
                meta: NodeMeta {
                    name: NodeName::new(0, 6, version),
                    created: CheckpointId(version),
                    notebook,
                    parent: None,
                },
                parent: NodeName::new(0, 0, 0),
                raw: vec![OutputPayload::Inline(json!(version))],
            }))
        };
        let history = OutputHistory::new(
            Lineage::new(0, 6),
            Lineage::new(0, 0),
            vec![make(0, 1), make(1, 3), make(2, 4)],
        );

        assert_eq!(history.latest().unwrap().version(), 2);
        assert_eq!(history.latest_at(3).unwrap().version(), 1);
        assert!(history.latest_at(0).is_none());
        assert_eq!(history.filter(|o| o.raw[0] != OutputPayload::Inline(json!(0))).len(), 2);
        assert_eq!(history.iter().count(), 3);
    }
}
