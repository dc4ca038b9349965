use crate::{buffer::BufferView, image::ImageView};
use ash::vk;
use fxhash::FxHashMap;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

/// Access mode a shader declares for a buffer input. `Constant` and `Read`
/// are both read-only from the frame graph's point of view.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ShaderInputBufferAccess {
    Constant,
    Read,
    ReadWrite,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ShaderInputImageAccess {
    Read,
    ReadWrite,
}

#[derive(Clone, Debug)]
pub struct ShaderInputBufferDescriptor {
    pub name: String,
    pub access: ShaderInputBufferAccess,
}

#[derive(Clone, Debug)]
pub struct ShaderInputImageDescriptor {
    pub name: String,
    pub access: ShaderInputImageAccess,
}

/// Static shape of a shader resource group: the buffer and image inputs a
/// compatible group must fill.
#[derive(Clone, Debug, Default)]
pub struct ShaderResourceGroupLayout {
    pub buffer_inputs: Vec<ShaderInputBufferDescriptor>,
    pub image_inputs: Vec<ShaderInputImageDescriptor>,
}

impl ShaderResourceGroupLayout {
    pub fn buffer_input(
        mut self,
        name: impl Into<String>,
        access: ShaderInputBufferAccess,
    ) -> Self {
        self.buffer_inputs.push(ShaderInputBufferDescriptor {
            name: name.into(),
            access,
        });
        self
    }

    pub fn image_input(mut self, name: impl Into<String>, access: ShaderInputImageAccess) -> Self {
        self.image_inputs.push(ShaderInputImageDescriptor {
            name: name.into(),
            access,
        });
        self
    }
}

/// A bound set of views matching a layout. View arrays are indexed by the
/// input's position in the layout.
pub struct ShaderResourceGroup {
    name: String,
    layout: Arc<ShaderResourceGroupLayout>,
    buffer_views: Vec<Vec<Arc<BufferView>>>,
    image_views: Vec<Vec<Arc<ImageView>>>,
    queued_for_compile: AtomicBool,
}

impl ShaderResourceGroup {
    pub fn new(name: impl Into<String>, layout: Arc<ShaderResourceGroupLayout>) -> Self {
        let buffer_views = vec![Vec::new(); layout.buffer_inputs.len()];
        let image_views = vec![Vec::new(); layout.image_inputs.len()];

        Self {
            name: name.into(),
            layout,
            buffer_views,
            image_views,
            queued_for_compile: AtomicBool::new(false),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn layout(&self) -> &ShaderResourceGroupLayout {
        &self.layout
    }

    pub fn set_buffer_views(&mut self, input_index: usize, views: Vec<Arc<BufferView>>) {
        self.buffer_views[input_index] = views;
    }

    pub fn set_image_views(&mut self, input_index: usize, views: Vec<Arc<ImageView>>) {
        self.image_views[input_index] = views;
    }

    pub fn buffer_views(&self, input_index: usize) -> &[Arc<BufferView>] {
        &self.buffer_views[input_index]
    }

    pub fn image_views(&self, input_index: usize) -> &[Arc<ImageView>] {
        &self.image_views[input_index]
    }

    /// Set by the owning pool while a compile for this group is pending and
    /// the pool has not been registered with the frame scheduler; GPU-side
    /// data is stale until the compile lands.
    pub fn set_queued_for_compile(&self, queued: bool) {
        self.queued_for_compile.store(queued, Ordering::Release);
    }

    pub fn is_queued_for_compile(&self) -> bool {
        self.queued_for_compile.load(Ordering::Acquire)
    }
}

/// Which shader stages actually reference a resource input, per pipeline.
/// Inputs absent from the map (or present with an empty mask) are declared by
/// the layout but never consumed by the bound pipeline.
#[derive(Clone, Copy, Debug, Default)]
pub struct ResourceBindingInfo {
    pub shader_stage_mask: vk::ShaderStageFlags,
}

impl ResourceBindingInfo {
    pub fn new(shader_stage_mask: vk::ShaderStageFlags) -> Self {
        Self { shader_stage_mask }
    }
}

#[derive(Clone, Debug, Default)]
pub struct ShaderResourceGroupBindingInfo {
    resources: FxHashMap<String, ResourceBindingInfo>,
}

impl ShaderResourceGroupBindingInfo {
    pub fn with_resource(
        mut self,
        name: impl Into<String>,
        shader_stage_mask: vk::ShaderStageFlags,
    ) -> Self {
        self.resources
            .insert(name.into(), ResourceBindingInfo::new(shader_stage_mask));
        self
    }

    pub fn resource(&self, name: &str) -> Option<&ResourceBindingInfo> {
        self.resources.get(name)
    }

    pub(crate) fn references(&self, name: &str) -> bool {
        self.resource(name)
            .map_or(false, |info| !info.shader_stage_mask.is_empty())
    }
}
