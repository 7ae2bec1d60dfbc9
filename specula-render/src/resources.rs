//! Per-camera registry of allocated render targets.

use std::collections::BTreeMap;

use crate::backend::{SsrBackend, TextureId};
use crate::error::SsrError;
use crate::targets::{Lifetime, TargetDesc, TargetKey};

/// Result of [`FrameResources::ensure`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Allocation {
    pub id: TextureId,
    /// True when the backend allocated a new texture for this call; its
    /// contents are undefined.
    pub fresh: bool,
}

#[derive(Clone, Debug)]
struct Entry {
    id: TextureId,
    desc: TargetDesc,
    lifetime: Lifetime,
}

#[derive(Debug, Default)]
pub struct FrameResources {
    entries: BTreeMap<TargetKey, Entry>,
}

impl FrameResources {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate `key` with `desc`, or return the existing handle when the
    /// registered descriptor is identical. A stale handle registered under the
    /// same key with a different descriptor is released first.
    pub fn ensure(
        &mut self,
        backend: &mut dyn SsrBackend,
        key: TargetKey,
        desc: TargetDesc,
        lifetime: Lifetime,
    ) -> Result<Allocation, SsrError> {
        if let Some(entry) = self.entries.get_mut(&key) {
            if entry.desc == desc {
                entry.lifetime = lifetime;
                return Ok(Allocation {
                    id: entry.id,
                    fresh: false,
                });
            }
        }

        if let Some(stale) = self.entries.remove(&key) {
            log::debug!(
                "SSR target {key:?} changed {} -> {}, reallocating",
                stale.desc.size,
                desc.size
            );
            backend.release_target(stale.id);
        }

        if !backend.supports_target(&desc) {
            return Err(SsrError::UnsupportedFormat {
                key,
                format: desc.format,
            });
        }

        let id = backend.allocate_target(key, &desc)?;
        self.entries.insert(key, Entry { id, desc, lifetime });
        Ok(Allocation { id, fresh: true })
    }

    pub fn get(&self, key: TargetKey) -> Option<TextureId> {
        self.entries.get(&key).map(|e| e.id)
    }

    pub fn require(&self, key: TargetKey) -> Result<TextureId, SsrError> {
        self.get(key).ok_or(SsrError::MissingTarget(key))
    }

    pub fn desc(&self, key: TargetKey) -> Option<&TargetDesc> {
        self.entries.get(&key).map(|e| &e.desc)
    }

    /// Unregister without releasing. The caller owns the release, normally as
    /// a `Release` command after the last use.
    pub fn take(&mut self, key: TargetKey) -> Option<TextureId> {
        self.entries.remove(&key).map(|e| e.id)
    }

    /// Release every frame-lifetime target; persistent ones stay registered.
    pub fn release_frame_targets(&mut self, backend: &mut dyn SsrBackend) {
        let frame_keys: Vec<TargetKey> = self
            .entries
            .iter()
            .filter(|(_, e)| e.lifetime == Lifetime::Frame)
            .map(|(k, _)| *k)
            .collect();
        for key in frame_keys {
            if let Some(entry) = self.entries.remove(&key) {
                backend.release_target(entry.id);
            }
        }
    }

    pub fn release_all(&mut self, backend: &mut dyn SsrBackend) {
        for (_, entry) in std::mem::take(&mut self.entries) {
            backend.release_target(entry.id);
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = TargetKey> + '_ {
        self.entries.keys().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recording::RecordingBackend;
    use crate::targets::TargetFormat;
    use crate::texture_size::TextureSize;

    fn desc(w: u32, h: u32) -> TargetDesc {
        TargetDesc::color(TextureSize::new(w, h), TargetFormat::Rgba16Float)
    }

    #[test]
    fn test_ensure_is_idempotent() {
        let mut backend = RecordingBackend::new();
        let mut res = FrameResources::new();
        let a = res
            .ensure(&mut backend, TargetKey::Resolved, desc(960, 540), Lifetime::Frame)
            .unwrap();
        let b = res
            .ensure(&mut backend, TargetKey::Resolved, desc(960, 540), Lifetime::Frame)
            .unwrap();
        assert!(a.fresh);
        assert!(!b.fresh);
        assert_eq!(a.id, b.id);
        assert_eq!(backend.live_count(), 1);
    }

    #[test]
    fn test_changed_desc_releases_stale() {
        let mut backend = RecordingBackend::new();
        let mut res = FrameResources::new();
        let a = res
            .ensure(&mut backend, TargetKey::Combine, desc(64, 64), Lifetime::Frame)
            .unwrap();
        let b = res
            .ensure(&mut backend, TargetKey::Combine, desc(32, 32), Lifetime::Frame)
            .unwrap();
        assert_ne!(a.id, b.id);
        assert!(b.fresh);
        assert!(!backend.is_live(a.id));
        assert_eq!(backend.live_count(), 1);
    }

    #[test]
    fn test_unsupported_format_fails_allocation() {
        let mut backend = RecordingBackend::new();
        backend.disable_format(TargetFormat::Rgba32Float);
        let mut res = FrameResources::new();
        let err = res
            .ensure(
                &mut backend,
                TargetKey::HitData,
                TargetDesc::color(TextureSize::new(8, 8), TargetFormat::Rgba32Float),
                Lifetime::Frame,
            )
            .unwrap_err();
        assert!(err.is_degradable());
        assert!(res.get(TargetKey::HitData).is_none());
        assert_eq!(backend.live_count(), 0);
    }

    #[test]
    fn test_release_frame_keeps_persistent() {
        let mut backend = RecordingBackend::new();
        let mut res = FrameResources::new();
        res.ensure(&mut backend, TargetKey::TaaCurrent, desc(8, 8), Lifetime::Frame)
            .unwrap();
        let history = res
            .ensure(&mut backend, TargetKey::TaaHistory, desc(8, 8), Lifetime::Persistent)
            .unwrap();
        res.release_frame_targets(&mut backend);
        assert_eq!(res.keys().collect::<Vec<_>>(), vec![TargetKey::TaaHistory]);
        assert!(backend.is_live(history.id));
        assert_eq!(backend.live_count(), 1);

        res.release_all(&mut backend);
        assert!(res.is_empty());
        assert_eq!(backend.live_count(), 0);
    }
}
