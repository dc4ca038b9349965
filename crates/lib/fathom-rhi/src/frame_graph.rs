use crate::{
    buffer::Buffer,
    image::Image,
    resource::{ResourceId, ResourceTracking},
    RhiError,
};
use std::sync::Arc;

/// Generational reference to a frame attachment. Resolving a handle after
/// `end_frame` freed its slot yields `None` instead of a dangling reference.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AttachmentHandle {
    pub(crate) index: u32,
    pub(crate) generation: u16,
}

/// How a scope uses an attached resource.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq)]
pub enum ScopeAttachmentUsage {
    RenderTarget,
    DepthStencil,
    Shader,
    SubpassInput,
    Copy,
    Resolve,
    Predication,
    Indirect,
    InputAssembly,
    ShadingRate,
    Uninitialized,
}

#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq)]
pub enum ScopeAttachmentAccess {
    Read,
    Write,
    ReadWrite,
}

pub enum AttachedResource {
    Image(Arc<Image>),
    Buffer(Arc<Buffer>),
}

impl AttachedResource {
    fn tracking(&self) -> &ResourceTracking {
        match self {
            AttachedResource::Image(image) => &image.tracking,
            AttachedResource::Buffer(buffer) => &buffer.tracking,
        }
    }

    pub fn id(&self) -> ResourceId {
        self.tracking().id()
    }

    pub fn name(&self) -> &str {
        self.tracking().name()
    }
}

/// One use of a frame attachment by one scope, in the frame attachment's
/// chronological usage list.
#[derive(Clone, Copy, Debug)]
pub struct ScopeUsage {
    pub scope_index: u32,
    pub usage: ScopeAttachmentUsage,
    pub access: ScopeAttachmentAccess,
}

/// Frame-long record of a resource's participation in the graph. Holds the
/// resource alive for the duration of the frame.
pub struct FrameAttachment {
    name: String,
    resource: AttachedResource,
    scope_usages: Vec<ScopeUsage>,
}

impl FrameAttachment {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn resource(&self) -> &AttachedResource {
        &self.resource
    }

    /// Scope usages in chronological scope order.
    pub fn scope_usages(&self) -> &[ScopeUsage] {
        &self.scope_usages
    }
}

/// Declaration that a scope reads/writes one attached resource. A scope may
/// declare several of these for the same resource, e.g. a color write and a
/// later shader read of the same target.
#[derive(Clone, Copy, Debug)]
pub struct ScopeAttachment {
    pub attachment: AttachmentHandle,
    pub(crate) resource_id: ResourceId,
    pub usage: ScopeAttachmentUsage,
    pub access: ScopeAttachmentAccess,
}

impl ScopeAttachment {
    pub fn resource_id(&self) -> ResourceId {
        self.resource_id
    }
}

pub struct Scope {
    pub name: String,
    pub(crate) index: u32,
    pub(crate) attachments: Vec<ScopeAttachment>,
}

impl Scope {
    pub fn index(&self) -> u32 {
        self.index
    }

    /// Attachments in declaration order.
    pub fn attachments(&self) -> &[ScopeAttachment] {
        &self.attachments
    }
}

struct AttachmentSlot {
    generation: u16,
    attachment: Option<FrameAttachment>,
}

/// Per-frame registry of attachments and scopes. Built once per frame by the
/// graph builder, torn down by `end_frame`.
#[derive(Default)]
pub struct FrameGraph {
    slots: Vec<AttachmentSlot>,
    scopes: Vec<Scope>,
}

impl FrameGraph {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn import_image(
        &mut self,
        name: impl Into<String>,
        image: Arc<Image>,
    ) -> Result<AttachmentHandle, RhiError> {
        self.import(name.into(), AttachedResource::Image(image))
    }

    pub fn import_buffer(
        &mut self,
        name: impl Into<String>,
        buffer: Arc<Buffer>,
    ) -> Result<AttachmentHandle, RhiError> {
        self.import(name.into(), AttachedResource::Buffer(buffer))
    }

    fn import(
        &mut self,
        name: String,
        resource: AttachedResource,
    ) -> Result<AttachmentHandle, RhiError> {
        if resource.tracking().attachment().is_some() {
            return Err(RhiError::ResourceAccess {
                info: format!(
                    "Resource {:?} is already attached to the frame graph",
                    resource.name()
                ),
            });
        }

        let index = match self.slots.iter().position(|slot| slot.attachment.is_none()) {
            Some(index) => index,
            None => {
                self.slots.push(AttachmentSlot {
                    generation: 0,
                    attachment: None,
                });
                self.slots.len() - 1
            }
        };

        let slot = &mut self.slots[index];
        let handle = AttachmentHandle {
            index: index as u32,
            generation: slot.generation,
        };

        log::trace!("Importing {:?} as frame attachment {:?}", name, handle);

        resource.tracking().set_attachment(Some(handle));
        slot.attachment = Some(FrameAttachment {
            name,
            resource,
            scope_usages: Vec::new(),
        });

        Ok(handle)
    }

    pub fn attachment(&self, handle: AttachmentHandle) -> Option<&FrameAttachment> {
        let slot = self.slots.get(handle.index as usize)?;
        if slot.generation != handle.generation {
            return None;
        }
        slot.attachment.as_ref()
    }

    fn attachment_mut(&mut self, handle: AttachmentHandle) -> Option<&mut FrameAttachment> {
        let slot = self.slots.get_mut(handle.index as usize)?;
        if slot.generation != handle.generation {
            return None;
        }
        slot.attachment.as_mut()
    }

    /// Starts recording a scope. The scope is registered with the graph when
    /// the returned builder is dropped.
    pub fn add_scope(&mut self, name: impl Into<String>) -> ScopeBuilder<'_> {
        let index = self.scopes.len() as u32;
        ScopeBuilder {
            graph: self,
            scope: Some(Scope {
                name: name.into(),
                index,
                attachments: Vec::new(),
            }),
        }
    }

    /// Scopes in declaration (chronological) order.
    pub fn scopes(&self) -> &[Scope] {
        &self.scopes
    }

    pub(crate) fn record_scope(&mut self, scope: Scope) {
        self.scopes.push(scope);
    }

    /// Tears the frame down: releases every attachment's resource
    /// back-reference and frees its slot. Handles from this frame resolve to
    /// `None` afterwards; slots are reused by the next frame under a new
    /// generation.
    pub fn end_frame(&mut self) {
        for slot in &mut self.slots {
            if let Some(attachment) = slot.attachment.take() {
                attachment.resource.tracking().set_attachment(None);
                slot.generation = slot.generation.wrapping_add(1);
            }
        }
        self.scopes.clear();
    }
}

impl Drop for FrameGraph {
    fn drop(&mut self) {
        self.end_frame();
    }
}

pub struct ScopeBuilder<'fg> {
    graph: &'fg mut FrameGraph,
    scope: Option<Scope>,
}

impl<'fg> Drop for ScopeBuilder<'fg> {
    fn drop(&mut self) {
        self.graph.record_scope(self.scope.take().unwrap())
    }
}

impl<'fg> ScopeBuilder<'fg> {
    /// Declares that this scope uses `handle` with the given usage and
    /// access. Declaration order is preserved; it is the order validation
    /// reports candidates in.
    pub fn use_attachment(
        &mut self,
        handle: AttachmentHandle,
        usage: ScopeAttachmentUsage,
        access: ScopeAttachmentAccess,
    ) -> &mut Self {
        let scope = self.scope.as_mut().unwrap();

        let attachment = self
            .graph
            .attachment_mut(handle)
            .unwrap_or_else(|| panic!("Invalid attachment handle: {:?}", handle));

        attachment.scope_usages.push(ScopeUsage {
            scope_index: scope.index,
            usage,
            access,
        });

        scope.attachments.push(ScopeAttachment {
            attachment: handle,
            resource_id: attachment.resource.id(),
            usage,
            access,
        });

        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{buffer::BufferDesc, image::ImageDesc, resource::Resource};
    use ash::vk;

    fn test_image() -> Arc<Image> {
        Arc::new(Image::new(
            ImageDesc::new_2d(vk::Format::R8G8B8A8_UNORM, [32, 32]),
            "gbuffer",
        ))
    }

    fn test_buffer() -> Arc<Buffer> {
        Arc::new(Buffer::new(
            BufferDesc::new_gpu_only(256, vk::BufferUsageFlags::STORAGE_BUFFER),
            "instances",
        ))
    }

    #[test]
    fn import_sets_the_attachment_back_reference() {
        let mut graph = FrameGraph::new();
        let image = test_image();

        assert!(!image.is_attachment());
        let handle = graph.import_image("gbuffer", image.clone()).unwrap();
        assert!(image.is_attachment());
        assert_eq!(image.tracking().attachment(), Some(handle));
        assert_eq!(graph.attachment(handle).unwrap().name(), "gbuffer");

        // A resource can be attached at most once per frame.
        assert!(graph.import_image("gbuffer_again", image.clone()).is_err());

        graph.end_frame();
        assert!(!image.is_attachment());
    }

    #[test]
    fn handles_go_stale_after_end_frame() {
        let mut graph = FrameGraph::new();
        let image = test_image();

        let handle = graph.import_image("gbuffer", image.clone()).unwrap();
        graph.end_frame();
        assert!(graph.attachment(handle).is_none());

        // The slot is reused under a new generation; the old handle stays
        // stale.
        let next = graph.import_image("gbuffer", image).unwrap();
        assert_eq!(next.index, handle.index);
        assert_ne!(next.generation, handle.generation);
        assert!(graph.attachment(handle).is_none());
        assert!(graph.attachment(next).is_some());
    }

    #[test]
    fn scopes_record_attachments_in_declaration_order() {
        let mut graph = FrameGraph::new();
        let image = test_image();
        let buffer = test_buffer();

        let color = graph.import_image("color", image).unwrap();
        let instances = graph.import_buffer("instances", buffer).unwrap();

        graph
            .add_scope("opaque")
            .use_attachment(
                color,
                ScopeAttachmentUsage::RenderTarget,
                ScopeAttachmentAccess::Write,
            )
            .use_attachment(
                instances,
                ScopeAttachmentUsage::Shader,
                ScopeAttachmentAccess::Read,
            );

        graph.add_scope("post").use_attachment(
            color,
            ScopeAttachmentUsage::Shader,
            ScopeAttachmentAccess::Read,
        );

        let scopes = graph.scopes();
        assert_eq!(scopes.len(), 2);
        assert_eq!(scopes[0].name, "opaque");
        assert_eq!(scopes[0].attachments().len(), 2);
        assert_eq!(
            scopes[0].attachments()[0].usage,
            ScopeAttachmentUsage::RenderTarget
        );
        assert_eq!(scopes[1].attachments().len(), 1);

        // The frame attachment sees its usage chain in chronological order.
        let usages = graph.attachment(color).unwrap().scope_usages();
        assert_eq!(usages.len(), 2);
        assert_eq!(usages[0].scope_index, 0);
        assert_eq!(usages[0].access, ScopeAttachmentAccess::Write);
        assert_eq!(usages[1].scope_index, 1);
        assert_eq!(usages[1].access, ScopeAttachmentAccess::Read);
    }

    #[test]
    fn same_resource_twice_in_one_scope() {
        let mut graph = FrameGraph::new();
        let image = test_image();
        let color = graph.import_image("color", image).unwrap();

        graph
            .add_scope("feedback")
            .use_attachment(
                color,
                ScopeAttachmentUsage::RenderTarget,
                ScopeAttachmentAccess::Write,
            )
            .use_attachment(
                color,
                ScopeAttachmentUsage::Shader,
                ScopeAttachmentAccess::Read,
            );

        let scope = &graph.scopes()[0];
        assert_eq!(scope.attachments().len(), 2);
        assert_eq!(
            scope.attachments()[0].resource_id(),
            scope.attachments()[1].resource_id()
        );
    }
}
