pub mod buffer;
pub mod error;
pub mod factory;
pub mod frame_graph;
pub mod image;
pub mod resource;
pub mod shader_resource_group;
pub mod validation;
mod view_cache;

pub use ash;

pub use buffer::{Buffer, BufferDesc, BufferView, BufferViewDesc, MemoryLocation};
pub use error::RhiError;
pub use factory::{RawResourceView, ViewFactory};
pub use frame_graph::{
    AttachedResource, AttachmentHandle, FrameAttachment, FrameGraph, Scope, ScopeAttachment,
    ScopeAttachmentAccess, ScopeAttachmentUsage, ScopeBuilder, ScopeUsage,
};
pub use image::{Image, ImageDesc, ImageType, ImageView, ImageViewDesc};
pub use resource::{Resource, ResourceId, ResourceTracking};
pub use shader_resource_group::{
    ResourceBindingInfo, ShaderInputBufferAccess, ShaderInputImageAccess, ShaderResourceGroup,
    ShaderResourceGroupBindingInfo, ShaderResourceGroupLayout,
};
pub use validation::{
    CommandListValidator, ScopeValidator, ValidationDiagnostic, ValidationMode,
};
