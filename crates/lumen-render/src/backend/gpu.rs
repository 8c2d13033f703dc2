//! wgpu implementation of the batcher's collaborator traits.
//!
//! Draws are not issued immediately. Each `draw_elements` call resolves the
//! pipeline, texture bind group and geometry buffers it needs and records
//! them; [`WgpuBackend::encode`] replays the recording into a render pass.
//!
//! Queue writes land before the frame's command buffer runs, so overwriting a
//! geometry buffer mid-frame would change draws already recorded. This
//! backend therefore reports `can_upload_same_buffer() == false` and the
//! batcher rotates geometry targets instead.

use std::sync::Arc;

use ahash::HashMap;
use lumen_core::math::Mat4;
use lumen_core::profiling::{profile_function, profile_scope};
use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::backend::context::GraphicsContext;
use crate::backend::{GeometryTarget, IndexFormat, PrimitiveType, ProgramId, RenderBackend};
use crate::batch::{BatchProgram, VertexLayout};
use crate::blend::BlendMode;
use crate::texture::{BaseTexture, TextureId};

/// Key for a bind group: program, then the texture bound at each slot (0 = fallback).
type BindGroupKey = (u32, Vec<u64>);

struct Program {
    max_textures: u32,
    module: wgpu::ShaderModule,
    layout: wgpu::PipelineLayout,
    texture_layout: wgpu::BindGroupLayout,
    vertex_attributes: Vec<wgpu::VertexAttribute>,
    stride: u64,
}

#[derive(Clone)]
struct GeometryBuffers {
    vertex: wgpu::Buffer,
    index: wgpu::Buffer,
}

struct PassCommand {
    pipeline: wgpu::RenderPipeline,
    textures: wgpu::BindGroup,
    geometry: GeometryBuffers,
    index_format: wgpu::IndexFormat,
    first_index: u32,
    count: u32,
}

struct WgpuState {
    bound: Vec<Option<Arc<BaseTexture>>>,
    views: HashMap<TextureId, wgpu::TextureView>,
    programs: Vec<Program>,
    current_program: Option<u32>,
    current_blend: BlendMode,
    current_geometry: Option<GeometryBuffers>,
    pipelines: HashMap<(u32, BlendMode, PrimitiveType), wgpu::RenderPipeline>,
    bind_groups: HashMap<BindGroupKey, wgpu::BindGroup>,
    commands: Vec<PassCommand>,
}

/// Renders batches with wgpu.
pub struct WgpuBackend {
    context: Arc<GraphicsContext>,
    surface_format: wgpu::TextureFormat,
    sampler: wgpu::Sampler,
    fallback_view: wgpu::TextureView,
    _fallback_texture: wgpu::Texture,
    projection_buffer: wgpu::Buffer,
    projection_layout: wgpu::BindGroupLayout,
    projection_bind_group: wgpu::BindGroup,
    state: Arc<Mutex<WgpuState>>,
}

impl WgpuBackend {
    pub fn new(context: Arc<GraphicsContext>, surface_format: wgpu::TextureFormat) -> Self {
        profile_function!();
        let device = context.device();
        let queue = context.queue();

        let (fallback_texture, fallback_view) = create_fallback_texture(device, queue);
        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("lumen_batch_sampler"),
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });

        let projection_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("lumen_batch_projection"),
            size: 64, // mat4x4<f32>
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        queue.write_buffer(
            &projection_buffer,
            0,
            bytemuck::cast_slice(&Mat4::IDENTITY.to_cols_array()),
        );

        let projection_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("lumen_batch_projection_layout"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            }],
        });
        let projection_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("lumen_batch_projection_bg"),
            layout: &projection_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: projection_buffer.as_entire_binding(),
            }],
        });

        let max_units = context.max_sampled_textures_per_shader_stage() as usize;
        let state = WgpuState {
            bound: vec![None; max_units],
            views: HashMap::default(),
            programs: Vec::new(),
            current_program: None,
            current_blend: BlendMode::Normal,
            current_geometry: None,
            pipelines: HashMap::default(),
            bind_groups: HashMap::default(),
            commands: Vec::new(),
        };

        Self {
            context,
            surface_format,
            sampler,
            fallback_view,
            _fallback_texture: fallback_texture,
            projection_buffer,
            projection_layout,
            projection_bind_group,
            state: Arc::new(Mutex::new(state)),
        }
    }

    pub fn surface_format(&self) -> wgpu::TextureFormat {
        self.surface_format
    }

    /// Make `view` the GPU image of `texture`.
    pub fn register_texture(&self, texture: &BaseTexture, view: wgpu::TextureView) {
        let mut state = self.state.lock();
        state.views.insert(texture.id(), view);
        // Cached bind groups may reference a previous view.
        state.bind_groups.retain(|(_, ids), _| !ids.contains(&texture.id().0));
    }

    pub fn unregister_texture(&self, texture: &BaseTexture) {
        let mut state = self.state.lock();
        state.views.remove(&texture.id());
        state.bind_groups.retain(|(_, ids), _| !ids.contains(&texture.id().0));
    }

    /// Upload `texture`'s pixels and register the result.
    ///
    /// `pixels` is tightly packed RGBA8 of `texture.width() * texture.height()` texels.
    pub fn upload_rgba8(&self, texture: &BaseTexture, pixels: &[u8]) {
        let device = self.context.device();
        let size = wgpu::Extent3d {
            width: texture.width().max(1),
            height: texture.height().max(1),
            depth_or_array_layers: 1,
        };
        let gpu_texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("lumen_batch_texture"),
            size,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Rgba8Unorm,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        self.context.queue().write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &gpu_texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            pixels,
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(4 * size.width),
                rows_per_image: Some(size.height),
            },
            size,
        );
        let view = gpu_texture.create_view(&wgpu::TextureViewDescriptor::default());
        self.register_texture(texture, view);
        texture.set_valid(true);
    }

    /// Set the projection applied to every vertex.
    pub fn set_projection(&self, projection: Mat4) {
        self.context.queue().write_buffer(
            &self.projection_buffer,
            0,
            bytemuck::cast_slice(&projection.to_cols_array()),
        );
    }

    /// Number of draws recorded since the last [`end_frame`](Self::end_frame).
    pub fn recorded_draws(&self) -> usize {
        self.state.lock().commands.len()
    }

    /// Replay recorded draws into `pass`.
    pub fn encode(&self, pass: &mut wgpu::RenderPass<'_>) {
        profile_function!();
        let state = self.state.lock();
        if state.commands.is_empty() {
            return;
        }

        pass.push_debug_group("lumen::batch");
        pass.set_bind_group(1, &self.projection_bind_group, &[]);
        for command in &state.commands {
            pass.set_pipeline(&command.pipeline);
            pass.set_bind_group(0, &command.textures, &[]);
            pass.set_vertex_buffer(0, command.geometry.vertex.slice(..));
            pass.set_index_buffer(command.geometry.index.slice(..), command.index_format);
            pass.draw_indexed(command.first_index..command.first_index + command.count, 0, 0..1);
        }
        pass.pop_debug_group();
    }

    /// Drop this frame's recording.
    pub fn end_frame(&self) {
        self.state.lock().commands.clear();
    }

    fn bind_group_for(&self, state: &mut WgpuState, program_index: u32) -> wgpu::BindGroup {
        let max_textures = state.programs[program_index as usize].max_textures as usize;
        let ids: Vec<u64> = (0..max_textures)
            .map(|slot| {
                state
                    .bound
                    .get(slot)
                    .and_then(|t| t.as_ref())
                    .filter(|t| state.views.contains_key(&t.id()))
                    .map_or(0, |t| t.id().0)
            })
            .collect();
        let key = (program_index, ids);

        if let Some(group) = state.bind_groups.get(&key) {
            return group.clone();
        }

        let views: Vec<&wgpu::TextureView> = key
            .1
            .iter()
            .map(|id| {
                state
                    .views
                    .get(&TextureId(*id))
                    .unwrap_or(&self.fallback_view)
            })
            .collect();

        let mut entries = Vec::with_capacity(max_textures + 1);
        entries.push(wgpu::BindGroupEntry {
            binding: 0,
            resource: wgpu::BindingResource::Sampler(&self.sampler),
        });
        for (slot, view) in views.iter().enumerate() {
            entries.push(wgpu::BindGroupEntry {
                binding: slot as u32 + 1,
                resource: wgpu::BindingResource::TextureView(view),
            });
        }

        let group = self.context.device().create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("lumen_batch_textures_bg"),
            layout: &state.programs[program_index as usize].texture_layout,
            entries: &entries,
        });
        trace!("Created texture bind group {:?}", key.1);
        state.bind_groups.insert(key, group.clone());
        group
    }

    fn pipeline_for(
        &self,
        state: &mut WgpuState,
        program_index: u32,
        blend: BlendMode,
        primitive: PrimitiveType,
    ) -> wgpu::RenderPipeline {
        let key = (program_index, blend, primitive);
        if let Some(pipeline) = state.pipelines.get(&key) {
            return pipeline.clone();
        }

        let program = &state.programs[program_index as usize];
        let strip_index_format = match primitive {
            PrimitiveType::LineStrip | PrimitiveType::TriangleStrip => Some(wgpu::IndexFormat::Uint32),
            _ => None,
        };

        let pipeline = self
            .context
            .device()
            .create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some("lumen_batch_pipeline"),
                layout: Some(&program.layout),
                vertex: wgpu::VertexState {
                    module: &program.module,
                    entry_point: Some("vs_main"),
                    buffers: &[wgpu::VertexBufferLayout {
                        array_stride: program.stride,
                        step_mode: wgpu::VertexStepMode::Vertex,
                        attributes: &program.vertex_attributes,
                    }],
                    compilation_options: wgpu::PipelineCompilationOptions::default(),
                },
                fragment: Some(wgpu::FragmentState {
                    module: &program.module,
                    entry_point: Some("fs_main"),
                    targets: &[Some(blend.to_color_target_state(self.surface_format))],
                    compilation_options: wgpu::PipelineCompilationOptions::default(),
                }),
                primitive: wgpu::PrimitiveState {
                    topology: primitive.to_wgpu(),
                    strip_index_format,
                    front_face: wgpu::FrontFace::Ccw,
                    cull_mode: None,
                    polygon_mode: wgpu::PolygonMode::Fill,
                    unclipped_depth: false,
                    conservative: false,
                },
                depth_stencil: None,
                multisample: wgpu::MultisampleState::default(),
                multiview: None,
                cache: None,
            });
        debug!("Created batch pipeline for {:?} {:?}", blend, primitive);
        state.pipelines.insert(key, pipeline.clone());
        pipeline
    }
}

impl RenderBackend for WgpuBackend {
    fn max_texture_image_units(&self) -> u32 {
        self.context.max_sampled_textures_per_shader_stage()
    }

    fn can_upload_same_buffer(&self) -> bool {
        false
    }

    fn compile_probe(&self, fragment_source: &str) -> bool {
        let device = self.context.device();
        device.push_error_scope(wgpu::ErrorFilter::Validation);
        let _module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("lumen_batch_probe"),
            source: wgpu::ShaderSource::Wgsl(fragment_source.into()),
        });
        pollster::block_on(device.pop_error_scope()).is_none()
    }

    fn create_program(&self, program: &BatchProgram, layout: &VertexLayout) -> ProgramId {
        profile_function!();
        let device = self.context.device();

        let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("lumen_batch_shader"),
            source: wgpu::ShaderSource::Wgsl(program.module_source().into()),
        });

        let mut entries = Vec::with_capacity(program.max_textures as usize + 1);
        entries.push(wgpu::BindGroupLayoutEntry {
            binding: 0,
            visibility: wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
            count: None,
        });
        for slot in 0..program.max_textures {
            entries.push(wgpu::BindGroupLayoutEntry {
                binding: slot + 1,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Texture {
                    sample_type: wgpu::TextureSampleType::Float { filterable: true },
                    view_dimension: wgpu::TextureViewDimension::D2,
                    multisampled: false,
                },
                count: None,
            });
        }
        let texture_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("lumen_batch_texture_layout"),
            entries: &entries,
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("lumen_batch_pipeline_layout"),
            bind_group_layouts: &[&texture_layout, &self.projection_layout],
            push_constant_ranges: &[],
        });

        let mut state = self.state.lock();
        let id = state.programs.len() as u32;
        state.programs.push(Program {
            max_textures: program.max_textures,
            module,
            layout: pipeline_layout,
            texture_layout,
            vertex_attributes: layout.to_wgpu_attributes(),
            stride: layout.stride() as u64,
        });
        debug!("Created batch program {} for {} textures", id, program.max_textures);
        ProgramId(id)
    }

    fn bind_program(&self, program: ProgramId) {
        self.state.lock().current_program = Some(program.0);
    }

    fn create_geometry(&self, _layout: &VertexLayout) -> Box<dyn GeometryTarget> {
        Box::new(WgpuGeometry::new(self.context.clone(), self.state.clone()))
    }

    fn bind_texture(&self, texture: &Arc<BaseTexture>, slot: u32) {
        let mut state = self.state.lock();
        let slot = slot as usize;
        if slot >= state.bound.len() {
            state.bound.resize(slot + 1, None);
        }
        state.bound[slot] = Some(texture.clone());
    }

    fn bound_texture(&self, slot: u32) -> Option<Arc<BaseTexture>> {
        self.state.lock().bound.get(slot as usize).cloned().flatten()
    }

    fn set_blend_mode(&self, mode: BlendMode) {
        self.state.lock().current_blend = mode;
    }

    fn draw_elements(&self, primitive: PrimitiveType, count: u32, format: IndexFormat, byte_offset: u32) {
        profile_scope!("record_draw");
        let mut state = self.state.lock();
        let (Some(program_index), Some(geometry)) = (state.current_program, state.current_geometry.clone())
        else {
            trace!("Draw skipped: no program or geometry bound");
            return;
        };
        if program_index as usize >= state.programs.len() {
            return;
        }

        let blend = state.current_blend;
        let pipeline = self.pipeline_for(&mut state, program_index, blend, primitive);
        let textures = self.bind_group_for(&mut state, program_index);

        state.commands.push(PassCommand {
            pipeline,
            textures,
            geometry,
            index_format: format.to_wgpu(),
            first_index: byte_offset / format.byte_size(),
            count,
        });
    }
}

/// A vertex and index buffer pair that grows on demand.
pub struct WgpuGeometry {
    context: Arc<GraphicsContext>,
    state: Arc<Mutex<WgpuState>>,
    buffers: Mutex<GeometryBuffers>,
}

impl WgpuGeometry {
    const INITIAL_BYTES: u64 = 4096;

    fn new(context: Arc<GraphicsContext>, state: Arc<Mutex<WgpuState>>) -> Self {
        let buffers = GeometryBuffers {
            vertex: create_buffer(&context, Self::INITIAL_BYTES, wgpu::BufferUsages::VERTEX),
            index: create_buffer(&context, Self::INITIAL_BYTES, wgpu::BufferUsages::INDEX),
        };
        Self {
            context,
            state,
            buffers: Mutex::new(buffers),
        }
    }
}

impl GeometryTarget for WgpuGeometry {
    fn bind(&self) {
        let buffers = self.buffers.lock().clone();
        self.state.lock().current_geometry = Some(buffers);
    }

    fn update_buffers(&self, vertices: &[u8], indices: &[u8]) {
        let mut buffers = self.buffers.lock();
        let queue = self.context.queue();

        if vertices.len() as u64 > buffers.vertex.size() {
            let size = (vertices.len() as u64).next_power_of_two();
            buffers.vertex = create_buffer(&self.context, size, wgpu::BufferUsages::VERTEX);
        }
        if indices.len() as u64 > buffers.index.size() {
            let size = (indices.len() as u64).next_power_of_two();
            buffers.index = create_buffer(&self.context, size, wgpu::BufferUsages::INDEX);
        }

        if !vertices.is_empty() {
            queue.write_buffer(&buffers.vertex, 0, vertices);
        }
        if !indices.is_empty() {
            queue.write_buffer(&buffers.index, 0, indices);
        }
    }
}

fn create_buffer(context: &GraphicsContext, size: u64, usage: wgpu::BufferUsages) -> wgpu::Buffer {
    context.device().create_buffer(&wgpu::BufferDescriptor {
        label: Some("lumen_batch_geometry"),
        size,
        usage: usage | wgpu::BufferUsages::COPY_DST,
        mapped_at_creation: false,
    })
}

/// A 1x1 white texture sampled by empty slots.
fn create_fallback_texture(device: &wgpu::Device, queue: &wgpu::Queue) -> (wgpu::Texture, wgpu::TextureView) {
    let size = wgpu::Extent3d {
        width: 1,
        height: 1,
        depth_or_array_layers: 1,
    };
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some("lumen_batch_fallback_texture"),
        size,
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: wgpu::TextureFormat::Rgba8Unorm,
        usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
        view_formats: &[],
    });
    queue.write_texture(
        wgpu::TexelCopyTextureInfo {
            texture: &texture,
            mip_level: 0,
            origin: wgpu::Origin3d::ZERO,
            aspect: wgpu::TextureAspect::All,
        },
        &[255, 255, 255, 255],
        wgpu::TexelCopyBufferLayout {
            offset: 0,
            bytes_per_row: Some(4),
            rows_per_image: Some(1),
        },
        size,
    );
    let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
    (texture, view)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::{Batcher, ShaderGenerator, check_max_if_statements};
    use crate::renderable::{Renderable, Sprite};
    use crate::settings::BatchSettings;
    use crate::texture::AlphaMode;

    fn backend() -> Arc<WgpuBackend> {
        let context = GraphicsContext::new_owned_sync().expect("Failed to create graphics context");
        Arc::new(WgpuBackend::new(context, wgpu::TextureFormat::Rgba8Unorm))
    }

    #[test]
    #[ignore] // Requires GPU
    fn test_default_shader_compiles() {
        let backend = backend();
        let program = ShaderGenerator::default().generate(4);
        assert!(backend.compile_probe(&program.module_source()));
    }

    #[test]
    #[ignore] // Requires GPU
    fn test_probe_accepts_hardware_limit() {
        let backend = backend();
        let max = backend.max_texture_image_units();
        assert_eq!(check_max_if_statements(max, backend.as_ref()), max);
        assert!(!backend.compile_probe("fn broken( {"));
    }

    #[test]
    #[ignore] // Requires GPU
    fn test_batcher_records_draws() {
        let backend = backend();
        let mut batcher = Batcher::new(backend.clone(), BatchSettings::default()).unwrap();
        assert!(!batcher.can_upload_same_buffer());

        let texture = BaseTexture::pending(2, 2, AlphaMode::Premultiplied);
        backend.upload_rgba8(&texture, &[255; 16]);

        batcher.start();
        for _ in 0..3 {
            let sprite: Arc<dyn Renderable> = Arc::new(Sprite::new(texture.clone()));
            batcher.render(&sprite);
        }
        batcher.stop();

        assert_eq!(backend.recorded_draws(), 1);
        backend.end_frame();
        assert_eq!(backend.recorded_draws(), 0);
    }
}
