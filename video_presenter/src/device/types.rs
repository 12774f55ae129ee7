/// Plain data types exchanged through the device function table

use bitflags::bitflags;
use std::fmt;

use crate::device::handle::*;

// ============================================================================
// Surfaces and images
// ============================================================================

/// Pixel format of decoded frames and presentable surfaces
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SurfaceFormat {
    /// 8-bit BGRA, unorm
    Bgra8,
    /// 8-bit RGBA, unorm
    Rgba8,
    /// 16-bit float RGBA
    Rgba16F,
    /// 8-bit 4:2:0 two-plane YUV
    Nv12,
}

impl SurfaceFormat {
    /// Formats the presenter can sample directly as its input
    pub fn is_presentable_input(self) -> bool {
        matches!(self, SurfaceFormat::Bgra8 | SurfaceFormat::Rgba8)
    }
}

impl fmt::Display for SurfaceFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Memory domain a frame currently lives in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryType {
    /// System memory
    Host,
    /// GPU memory owned by the presenter's device
    Gpu,
}

/// Image layouts tracked across submissions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageLayout {
    Undefined,
    General,
    ColorAttachment,
    ShaderReadOnly,
    TransferSrc,
    TransferDst,
    PresentSrc,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Extent2D {
    pub width: u32,
    pub height: u32,
}

impl Extent2D {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// Viewport for rendering
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub min_depth: f32,
    pub max_depth: f32,
}

/// 2D rectangle (for scissor)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rect2D {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

// ============================================================================
// Buffers and samplers
// ============================================================================

/// Buffer usage
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferUsage {
    Vertex,
    Uniform,
}

/// Descriptor for creating a host-visible buffer
#[derive(Debug, Clone)]
pub struct BufferDesc {
    /// Size in bytes
    pub size: u64,
    pub usage: BufferUsage,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Filter {
    Nearest,
    Linear,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MipmapMode {
    Nearest,
    Linear,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressMode {
    Repeat,
    MirroredRepeat,
    ClampToEdge,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Never,
    Always,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BorderColor {
    OpaqueBlack,
    OpaqueWhite,
    TransparentBlack,
}

/// Sampler creation parameters
#[derive(Debug, Clone, PartialEq)]
pub struct SamplerDesc {
    pub mag_filter: Filter,
    pub min_filter: Filter,
    pub mipmap_mode: MipmapMode,
    pub address_mode: AddressMode,
    pub mip_lod_bias: f32,
    pub max_anisotropy: f32,
    pub compare_op: CompareOp,
    pub min_lod: f32,
    pub max_lod: f32,
    pub border_color: BorderColor,
}

impl Default for SamplerDesc {
    /// Linear filtering, repeat addressing, no anisotropy, single mip.
    fn default() -> Self {
        Self {
            mag_filter: Filter::Linear,
            min_filter: Filter::Linear,
            mipmap_mode: MipmapMode::Linear,
            address_mode: AddressMode::Repeat,
            mip_lod_bias: 0.0,
            max_anisotropy: 1.0,
            compare_op: CompareOp::Never,
            min_lod: 0.0,
            max_lod: 0.0,
            border_color: BorderColor::OpaqueWhite,
        }
    }
}

// ============================================================================
// Descriptors
// ============================================================================

/// Kind of resource bound to a descriptor slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DescriptorType {
    UniformBuffer,
    CombinedImageSampler,
}

bitflags! {
    /// Shader stages a binding is visible to
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ShaderStageFlags: u32 {
        const VERTEX = 0x1;
        const FRAGMENT = 0x10;
    }
}

/// One slot of a descriptor-set layout. Immutable once registered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DescriptorBinding {
    /// Binding slot index inside the set
    pub binding: u32,
    pub kind: DescriptorType,
    /// Array length of the slot
    pub count: u32,
    pub stages: ShaderStageFlags,
}

/// Pool capacity for one descriptor type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DescriptorPoolSize {
    pub kind: DescriptorType,
    pub count: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferInfo {
    pub buffer: BufferHandle,
    pub offset: u64,
    pub range: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageInfo {
    pub sampler: SamplerHandle,
    pub view: ImageViewHandle,
    pub layout: ImageLayout,
}

/// Resource referenced by one descriptor array element
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DescriptorInfo {
    Buffer(BufferInfo),
    Image(ImageInfo),
}

impl DescriptorInfo {
    /// Descriptor type this info can be written to
    pub fn kind(&self) -> DescriptorType {
        match self {
            DescriptorInfo::Buffer(_) => DescriptorType::UniformBuffer,
            DescriptorInfo::Image(_) => DescriptorType::CombinedImageSampler,
        }
    }
}

/// Contiguous infos written by one descriptor write
#[derive(Debug, Clone, Copy)]
pub enum DescriptorWriteInfos<'a> {
    Buffers(&'a [BufferInfo]),
    Images(&'a [ImageInfo]),
}

impl DescriptorWriteInfos<'_> {
    pub fn len(&self) -> usize {
        match self {
            DescriptorWriteInfos::Buffers(infos) => infos.len(),
            DescriptorWriteInfos::Images(infos) => infos.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// One write applied by `update_descriptor_sets`
#[derive(Debug, Clone, Copy)]
pub struct DescriptorWrite<'a> {
    pub set: DescriptorSetHandle,
    pub binding: u32,
    pub array_index: u32,
    pub kind: DescriptorType,
    pub infos: DescriptorWriteInfos<'a>,
}

// ============================================================================
// Pipelines
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShaderStage {
    Vertex,
    Fragment,
}

/// Shader module bound to one pipeline stage
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShaderStageDesc {
    pub stage: ShaderStage,
    pub module: ShaderModuleHandle,
    pub entry_point: String,
}

/// Vertex attribute data format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(non_camel_case_types)]
pub enum VertexFormat {
    R32G32_SFLOAT,
    R32G32B32_SFLOAT,
    R32G32B32A32_SFLOAT,
}

impl VertexFormat {
    pub fn size_bytes(&self) -> u32 {
        match self {
            VertexFormat::R32G32_SFLOAT => 8,
            VertexFormat::R32G32B32_SFLOAT => 12,
            VertexFormat::R32G32B32A32_SFLOAT => 16,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VertexBinding {
    pub binding: u32,
    /// Bytes between consecutive vertices
    pub stride: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VertexAttribute {
    pub location: u32,
    pub binding: u32,
    pub format: VertexFormat,
    pub offset: u32,
}

/// Fixed vertex-input layout of a pipeline
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct VertexLayout {
    pub bindings: Vec<VertexBinding>,
    pub attributes: Vec<VertexAttribute>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrimitiveTopology {
    TriangleList,
    TriangleStrip,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolygonMode {
    Fill,
    Line,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CullMode {
    None,
    Front,
    Back,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrontFace {
    Clockwise,
    CounterClockwise,
}

/// Fixed-function state of a graphics pipeline
#[derive(Debug, Clone, PartialEq)]
pub struct FixedFunctionState {
    pub topology: PrimitiveTopology,
    pub primitive_restart: bool,
    pub polygon_mode: PolygonMode,
    pub cull_mode: CullMode,
    pub front_face: FrontFace,
    pub line_width: f32,
    pub sample_count: u32,
    pub blend_enable: bool,
    pub depth_test_enable: bool,
    /// Viewport and scissor are set per frame instead of baked in
    pub dynamic_viewport_scissor: bool,
}

impl Default for FixedFunctionState {
    /// Triangle strip, no culling, no depth test, one non-blended attachment.
    fn default() -> Self {
        Self {
            topology: PrimitiveTopology::TriangleStrip,
            primitive_restart: false,
            polygon_mode: PolygonMode::Fill,
            cull_mode: CullMode::None,
            front_face: FrontFace::Clockwise,
            line_width: 1.0,
            sample_count: 1,
            blend_enable: false,
            depth_test_enable: false,
            dynamic_viewport_scissor: true,
        }
    }
}

/// Render pass a pipeline is compatible with
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderTargetLayout {
    pub render_pass: RenderPassHandle,
    pub subpass: u32,
    pub format: SurfaceFormat,
}

/// Everything the backend needs to create a graphics pipeline
#[derive(Debug, Clone, Copy)]
pub struct GraphicsPipelineDesc<'a> {
    pub layout: PipelineLayoutHandle,
    pub stages: &'a [ShaderStageDesc],
    pub vertex_layout: &'a VertexLayout,
    pub state: &'a FixedFunctionState,
    pub target: &'a RenderTargetLayout,
}

// ============================================================================
// Commands and submission
// ============================================================================

/// Pipeline stage a semaphore wait applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PipelineStage {
    TopOfPipe,
    VertexShader,
    FragmentShader,
    ColorAttachmentOutput,
    Transfer,
    BottomOfPipe,
}

/// Layout transition of one color image
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageBarrier {
    pub image: ImageHandle,
    pub old_layout: ImageLayout,
    pub new_layout: ImageLayout,
}

/// Semaphore wait registered for a submission
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SemaphoreWait {
    pub semaphore: SemaphoreHandle,
    pub stage: PipelineStage,
}

/// One queue submission of a single command buffer
#[derive(Debug, Clone, Copy)]
pub struct SubmitInfo<'a> {
    pub command_buffer: CommandBufferHandle,
    pub waits: &'a [SemaphoreWait],
    pub signals: &'a [SemaphoreHandle],
}
