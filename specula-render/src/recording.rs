//! GPU-free backend that validates and records submitted command lists.
//!
//! Used by the test suite and by hosts that want to inspect what a frame
//! would do. It checks handle liveness in submission order, so a release
//! recorded before a use of the same texture fails the submit.

use std::collections::{BTreeMap, HashSet};

use specula_gpu_shared::shaders::{ComputeKernel, ShaderPass};

use crate::backend::{SsrBackend, TextureId};
use crate::commands::{Command, CommandList};
use crate::error::SsrError;
use crate::targets::{StorageAccess, TargetDesc, TargetFormat, TargetKey};
use crate::texture_size::TextureSize;

#[derive(Clone, Debug, PartialEq)]
pub struct LiveTexture {
    /// `None` for imported host textures.
    pub key: Option<TargetKey>,
    pub size: TextureSize,
    pub desc: Option<TargetDesc>,
}

#[derive(Debug)]
pub struct RecordingBackend {
    next_id: u64,
    live: BTreeMap<TextureId, LiveTexture>,
    missing_passes: HashSet<ShaderPass>,
    missing_kernels: HashSet<ComputeKernel>,
    unsupported_formats: HashSet<TargetFormat>,
    read_write_storage: bool,
    group_size: [u32; 3],
    fail_next_submit: Option<String>,
    allocation_count: usize,
    submissions: Vec<CommandList>,
}

impl Default for RecordingBackend {
    fn default() -> Self {
        Self {
            next_id: 1,
            live: BTreeMap::new(),
            missing_passes: HashSet::new(),
            missing_kernels: HashSet::new(),
            unsupported_formats: HashSet::new(),
            read_write_storage: true,
            group_size: [8, 8, 1],
            fail_next_submit: None,
            allocation_count: 0,
            submissions: Vec::new(),
        }
    }
}

impl RecordingBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn next_id(&mut self) -> TextureId {
        let id = TextureId(self.next_id);
        self.next_id += 1;
        id
    }

    /// Registers a host texture (camera colour, depth, G-buffer, noise).
    pub fn import_texture(&mut self, size: TextureSize) -> TextureId {
        let id = self.next_id();
        self.live.insert(
            id,
            LiveTexture {
                key: None,
                size,
                desc: None,
            },
        );
        id
    }

    pub fn disable_shader_pass(&mut self, pass: ShaderPass) {
        self.missing_passes.insert(pass);
    }

    pub fn disable_kernel(&mut self, kernel: ComputeKernel) {
        self.missing_kernels.insert(kernel);
    }

    pub fn disable_format(&mut self, format: TargetFormat) {
        self.unsupported_formats.insert(format);
    }

    pub fn set_read_write_storage(&mut self, supported: bool) {
        self.read_write_storage = supported;
    }

    pub fn set_group_size(&mut self, group_size: [u32; 3]) {
        self.group_size = group_size;
    }

    pub fn fail_next_submit(&mut self, message: &str) {
        self.fail_next_submit = Some(message.to_string());
    }

    pub fn live_count(&self) -> usize {
        self.live.len()
    }

    pub fn is_live(&self, id: TextureId) -> bool {
        self.live.contains_key(&id)
    }

    pub fn live(&self, id: TextureId) -> Option<&LiveTexture> {
        self.live.get(&id)
    }

    /// Keys of live pipeline-owned targets.
    pub fn live_keys(&self) -> Vec<TargetKey> {
        self.live.values().filter_map(|t| t.key).collect()
    }

    /// Total number of allocations ever made.
    pub fn allocation_count(&self) -> usize {
        self.allocation_count
    }

    pub fn submissions(&self) -> &[CommandList] {
        &self.submissions
    }

    pub fn last_submission(&self) -> Option<&CommandList> {
        self.submissions.last()
    }

    fn check_live(&self, id: TextureId, index: usize) -> Result<(), SsrError> {
        if self.live.contains_key(&id) {
            Ok(())
        } else {
            Err(SsrError::Backend(format!(
                "command {index} uses {id}, which is not live"
            )))
        }
    }

    fn check_command<'a>(
        &self,
        scopes: &mut Vec<&'a str>,
        index: usize,
        command: &'a Command,
    ) -> Result<(), SsrError> {
        match command {
            Command::BeginSample(name) => scopes.push(name),
            Command::EndSample(name) => match scopes.pop() {
                Some(open) if open == name => {}
                _ => {
                    return Err(SsrError::Backend(format!(
                        "command {index} closes unopened scope {name}"
                    )))
                }
            },
            Command::SetFrameUniforms(_) => {}
            Command::Blit {
                source,
                target,
                bindings,
                ..
            } => {
                if let Some(source) = source {
                    self.check_live(*source, index)?;
                }
                self.check_live(*target, index)?;
                for id in bindings.slots().into_iter().filter_map(|(_, id)| id) {
                    self.check_live(id, index)?;
                }
            }
            Command::CopyTexture { source, target, .. }
            | Command::Dispatch { source, target, .. } => {
                self.check_live(*source, index)?;
                self.check_live(*target, index)?;
            }
            Command::DrawRenderers { color_targets, .. } => {
                for id in color_targets {
                    self.check_live(*id, index)?;
                }
            }
            Command::Release(id) => self.check_live(*id, index)?,
        }
        Ok(())
    }

    /// Checks the list in order and applies its releases. Every release is
    /// applied even after the first error, so a rejected frame leaks nothing.
    fn validate(&mut self, commands: &CommandList) -> Result<(), SsrError> {
        let mut scopes: Vec<&str> = Vec::new();
        let mut failure = None;
        for (index, command) in commands.iter().enumerate() {
            if failure.is_none() {
                if let Err(e) = self.check_command(&mut scopes, index, command) {
                    failure = Some(e);
                }
            }
            if let Command::Release(id) = command {
                self.live.remove(id);
            }
        }
        if let Some(e) = failure {
            return Err(e);
        }
        if let Some(open) = scopes.pop() {
            return Err(SsrError::Backend(format!("profiler scope {open} left open")));
        }
        Ok(())
    }
}

impl SsrBackend for RecordingBackend {
    fn supports_target(&self, desc: &TargetDesc) -> bool {
        !self.unsupported_formats.contains(&desc.format)
            && (desc.storage != StorageAccess::ReadWrite || self.read_write_storage)
    }

    fn allocate_target(
        &mut self,
        key: TargetKey,
        desc: &TargetDesc,
    ) -> Result<TextureId, SsrError> {
        if !self.supports_target(desc) {
            return Err(SsrError::UnsupportedFormat {
                key,
                format: desc.format,
            });
        }
        let id = self.next_id();
        self.live.insert(
            id,
            LiveTexture {
                key: Some(key),
                size: desc.size,
                desc: Some(*desc),
            },
        );
        self.allocation_count += 1;
        Ok(id)
    }

    fn release_target(&mut self, id: TextureId) {
        if self.live.remove(&id).is_none() {
            log::warn!("release of unknown texture {id}");
        }
    }

    fn has_shader_pass(&self, pass: ShaderPass) -> bool {
        !self.missing_passes.contains(&pass)
    }

    fn kernel_group_size(&self, kernel: ComputeKernel) -> Option<[u32; 3]> {
        (!self.missing_kernels.contains(&kernel)).then_some(self.group_size)
    }

    fn submit(&mut self, commands: CommandList) -> Result<(), SsrError> {
        if let Some(message) = self.fail_next_submit.take() {
            for command in commands.iter() {
                if let Command::Release(id) = command {
                    self.live.remove(id);
                }
            }
            return Err(SsrError::Backend(message));
        }
        let result = self.validate(&commands);
        self.submissions.push(commands);
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::FrameBindings;

    #[test]
    fn test_use_after_release_rejected() {
        let mut backend = RecordingBackend::new();
        let a = backend
            .allocate_target(
                TargetKey::Combine,
                &TargetDesc::color(TextureSize::new(4, 4), TargetFormat::Rgba16Float),
            )
            .unwrap();
        let mut list = CommandList::new("test");
        list.release(a);
        list.push(Command::Blit {
            source: None,
            target: a,
            pass: None,
            bindings: FrameBindings::default(),
        });
        let err = backend.submit(list).unwrap_err();
        assert!(err.to_string().contains("not live"));
    }

    #[test]
    fn test_rejected_list_still_applies_releases() {
        let mut backend = RecordingBackend::new();
        let desc = TargetDesc::color(TextureSize::new(4, 4), TargetFormat::Rgba16Float);
        let a = backend.allocate_target(TargetKey::Combine, &desc).unwrap();
        let b = backend.allocate_target(TargetKey::Resolved, &desc).unwrap();
        let mut list = CommandList::new("test");
        list.release(a);
        list.push(Command::Blit {
            source: Some(a),
            target: b,
            pass: None,
            bindings: FrameBindings::default(),
        });
        list.release(b);

        assert!(backend.submit(list).is_err());
        assert!(!backend.is_live(a));
        assert!(!backend.is_live(b));
    }

    #[test]
    fn test_unbalanced_scope_rejected() {
        let mut backend = RecordingBackend::new();
        let mut list = CommandList::new("test");
        list.begin_sample("SSR Blur");
        assert!(backend.submit(list).is_err());
    }

    #[test]
    fn test_read_write_storage_toggle() {
        let mut backend = RecordingBackend::new();
        let desc = TargetDesc::storage(
            TextureSize::new(4, 4),
            TargetFormat::Rgba16Float,
            StorageAccess::ReadWrite,
        );
        assert!(backend.supports_target(&desc));
        backend.set_read_write_storage(false);
        assert!(!backend.supports_target(&desc));
        assert!(backend.allocate_target(TargetKey::BlurIntermediate, &desc).is_err());
    }
}
