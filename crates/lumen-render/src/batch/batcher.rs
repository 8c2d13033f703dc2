//! The sprite batcher.
//!
//! Elements are buffered in submission order. On flush they are split into
//! texture sets of at most `max_textures` distinct textures, each set is split
//! again wherever the effective blend mode changes, geometry for everything is
//! packed into one upload, and one indexed draw is issued per run.

use std::sync::Arc;

use lumen_core::profiling::{profile_function, profile_scope};
use tracing::{debug, info, trace, warn};

use crate::backend::{GeometryTarget, IndexFormat, PrimitiveType, ProgramId, RenderBackend};
use crate::batch::buffer::{ScratchPool, ViewableBuffer};
use crate::batch::draw_call::{DrawCall, TextureSet};
use crate::batch::geometry::pack_interleaved_geometry;
use crate::batch::layout::{AttributeDefinition, VertexLayout};
use crate::batch::shader::{ShaderGenerator, check_max_if_statements};
use crate::blend::{BlendMode, premultiply_blend_mode};
use crate::dispatcher::ObjectRenderer;
use crate::error::BatchResult;
use crate::renderable::Renderable;
use crate::settings::BatchSettings;
use crate::texture::{BaseTexture, next_batch_tick};

/// Geometry targets created up front on context change.
const INITIAL_PACKED_GEOMETRIES: usize = 8;

/// Counters for the current frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchStats {
    pub flushes: u32,
    pub draw_calls: u32,
    pub texture_binds: u32,
    pub blend_changes: u32,
    pub elements: u32,
}

/// Buffers renderable elements and turns them into draw calls.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use lumen_render::{AlphaMode, BaseTexture, BatchSettings, Batcher, Renderable, Sprite};
/// use lumen_test_utils::MockBackend;
///
/// let backend = Arc::new(MockBackend::new());
/// let mut batcher = Batcher::new(backend.clone(), BatchSettings::default()).unwrap();
///
/// let texture = BaseTexture::new(32, 32, AlphaMode::Premultiplied);
/// let sprite: Arc<dyn Renderable> = Arc::new(Sprite::new(texture));
///
/// batcher.start();
/// batcher.render(&sprite);
/// batcher.stop();
///
/// assert_eq!(backend.draws().len(), 1);
/// ```
pub struct Batcher {
    backend: Arc<dyn RenderBackend>,
    settings: BatchSettings,
    layout: VertexLayout,
    shader_generator: ShaderGenerator,

    /// Vertex capacity of one flush.
    size: usize,
    max_textures: u32,
    program: Option<ProgramId>,
    can_upload_same_buffer: bool,

    packed_geometries: Vec<Box<dyn GeometryTarget>>,
    flush_id: usize,
    warned_geometry_cap: bool,

    buffered_elements: Vec<Arc<dyn Renderable>>,
    buffered_textures: Vec<Arc<BaseTexture>>,
    vertex_count: usize,
    index_count: usize,

    scratch: ScratchPool,
    draw_calls: Vec<DrawCall>,
    draw_call_count: usize,
    texture_sets: Vec<TextureSet>,
    temp_bound_textures: Vec<Option<Arc<BaseTexture>>>,
    a_index: usize,
    i_index: usize,

    current_blend: Option<BlendMode>,
    /// Between `start` and `stop`.
    active: bool,
    stats: BatchStats,
}

impl Batcher {
    /// Create a batcher with the standard vertex layout and shader.
    pub fn new(backend: Arc<dyn RenderBackend>, settings: BatchSettings) -> BatchResult<Self> {
        Self::with_layout(backend, settings, VertexLayout::default(), ShaderGenerator::default())
    }

    /// Create a batcher for a custom attribute list.
    ///
    /// Unknown built-ins and mis-sized attributes are rejected here, never
    /// while rendering.
    pub fn with_attributes(
        backend: Arc<dyn RenderBackend>,
        settings: BatchSettings,
        attributes: &[AttributeDefinition],
        shader_generator: ShaderGenerator,
    ) -> BatchResult<Self> {
        let layout = VertexLayout::compile(attributes)?;
        Self::with_layout(backend, settings, layout, shader_generator)
    }

    pub fn with_layout(
        backend: Arc<dyn RenderBackend>,
        settings: BatchSettings,
        layout: VertexLayout,
        shader_generator: ShaderGenerator,
    ) -> BatchResult<Self> {
        settings.validate()?;

        let size = settings.vertex_capacity() as usize;
        let scratch = ScratchPool::new(layout.stride_words());

        let mut batcher = Self {
            backend,
            settings,
            layout,
            shader_generator,
            size,
            max_textures: 1,
            program: None,
            can_upload_same_buffer: true,
            packed_geometries: Vec::new(),
            flush_id: 0,
            warned_geometry_cap: false,
            buffered_elements: Vec::with_capacity(size / 4),
            buffered_textures: Vec::with_capacity(size / 4),
            vertex_count: 0,
            index_count: 0,
            scratch,
            draw_calls: Vec::new(),
            draw_call_count: 0,
            texture_sets: Vec::new(),
            temp_bound_textures: Vec::new(),
            a_index: 0,
            i_index: 0,
            current_blend: None,
            active: false,
            stats: BatchStats::default(),
        };
        batcher.context_change();
        Ok(batcher)
    }

    /// Texture units in use, as settled by the last context change.
    pub fn max_textures(&self) -> u32 {
        self.max_textures
    }

    /// Vertex capacity of one flush.
    pub fn size(&self) -> usize {
        self.size
    }

    pub fn layout(&self) -> &VertexLayout {
        &self.layout
    }

    pub fn settings(&self) -> &BatchSettings {
        &self.settings
    }

    pub fn stats(&self) -> BatchStats {
        self.stats
    }

    pub fn program(&self) -> Option<ProgramId> {
        self.program
    }

    /// Whether geometry is overwritten in place rather than rotated.
    pub fn can_upload_same_buffer(&self) -> bool {
        self.can_upload_same_buffer
    }

    /// Number of buffered elements.
    pub fn buffered_len(&self) -> usize {
        self.buffered_elements.len()
    }

    pub fn buffered_vertex_count(&self) -> usize {
        self.vertex_count
    }

    pub fn packed_geometry_count(&self) -> usize {
        self.packed_geometries.len()
    }

    pub fn scratch(&self) -> &ScratchPool {
        &self.scratch
    }

    /// Draw calls built by the last flush.
    pub fn last_draw_calls(&self) -> &[DrawCall] {
        &self.draw_calls[..self.draw_call_count]
    }

    /// Re-derive GPU state after the context was created or restored.
    ///
    /// Probes the usable texture-unit count, regenerates and links the shader,
    /// recreates the geometry pool and resizes the per-flush pools. An active
    /// batcher rebinds its new program and geometry.
    pub fn context_change(&mut self) {
        profile_function!();

        self.max_textures = if self.settings.prefer_legacy {
            1
        } else {
            let hardware = self.backend.max_texture_image_units();
            let cap = hardware.min(self.settings.resolved_max_textures()).max(1);
            check_max_if_statements(cap, self.backend.as_ref())
        };
        info!("Sprite batcher using {} texture units", self.max_textures);

        let program = self.shader_generator.generate(self.max_textures);
        self.program = Some(self.backend.create_program(&program, &self.layout));

        self.can_upload_same_buffer =
            self.settings.resolved_can_upload_same_buffer() && self.backend.can_upload_same_buffer();

        let initial = INITIAL_PACKED_GEOMETRIES.min(self.settings.max_packed_geometries.max(1));
        self.packed_geometries = (0..initial)
            .map(|_| self.backend.create_geometry(&self.layout))
            .collect();
        self.flush_id = 0;

        self.init_flush_buffers();

        self.current_blend = None;
        if self.active {
            self.bind_state();
        }
    }

    fn init_flush_buffers(&mut self) {
        let max = self.max_textures as usize;
        let max_elements = self.size / 4;
        let pool_size = max_elements.div_ceil(max) + 1;

        self.texture_sets = (0..pool_size).map(|_| TextureSet::with_capacity(max)).collect();
        self.draw_calls = vec![DrawCall::default(); pool_size];
        self.draw_call_count = 0;
        self.temp_bound_textures = vec![None; max];
        debug!("Batch pools sized to {} entries", pool_size);
    }

    /// Called when this batcher becomes the active renderer.
    pub fn start(&mut self) {
        self.active = true;
        self.bind_state();
    }

    fn bind_state(&mut self) {
        self.current_blend = None;
        if let Some(program) = self.program {
            self.backend.bind_program(program);
        }
        if self.can_upload_same_buffer
            && let Some(geometry) = self.packed_geometries.get(self.flush_id)
        {
            geometry.bind();
        }
    }

    /// Flush everything buffered.
    pub fn stop(&mut self) {
        self.flush();
        self.active = false;
    }

    /// Reset the per-frame geometry rotation and statistics.
    pub fn prerender(&mut self) {
        self.flush_id = 0;
        self.warned_geometry_cap = false;
        self.stats = BatchStats::default();
    }

    /// Buffer one element.
    ///
    /// Elements whose texture is not loaded, or that have no vertices or no
    /// indices, are skipped. If the element would overflow the vertex
    /// capacity, the buffer is flushed first.
    pub fn render(&mut self, element: &Arc<dyn Renderable>) {
        let texture = element.texture();
        if !texture.is_valid() {
            trace!("Skipping element with unloaded texture {:?}", texture.id());
            return;
        }

        let vertex_data = element.vertex_data();
        let vertex_count = element.vertex_count();
        if vertex_data.len() != element.uvs().len() || vertex_data.len() != vertex_count * 2 {
            warn!(
                "Dropping element with {} position and {} uv components for {} vertices",
                vertex_data.len(),
                element.uvs().len(),
                vertex_count
            );
            return;
        }
        if vertex_count == 0 || element.indices().is_empty() {
            trace!("Skipping empty element");
            return;
        }

        if self.vertex_count + vertex_count > self.size {
            self.flush();
        }

        self.vertex_count += vertex_count;
        self.index_count += element.indices().len();
        self.buffered_textures.push(texture.clone());
        self.buffered_elements.push(element.clone());
        self.stats.elements += 1;
    }

    /// Turn buffered elements into draw calls.
    pub fn flush(&mut self) {
        if self.buffered_elements.is_empty() {
            return;
        }
        profile_function!();

        let mut attributes = self.scratch.take_attribute_buffer(self.vertex_count);
        let mut indices = self.scratch.take_index_buffer(self.index_count);

        self.a_index = 0;
        self.i_index = 0;
        self.draw_call_count = 0;

        self.build_textures_and_draw_calls(&mut attributes, &mut indices);
        self.update_geometry(&attributes, &indices);
        self.draw_batches();

        self.scratch.release_attribute_buffer(attributes);
        self.scratch.release_index_buffer(indices);

        self.buffered_elements.clear();
        self.buffered_textures.clear();
        self.vertex_count = 0;
        self.index_count = 0;
        self.stats.flushes += 1;
    }

    fn build_textures_and_draw_calls(
        &mut self,
        attributes: &mut ViewableBuffer,
        indices: &mut ViewableBuffer,
    ) {
        profile_function!();

        let max = self.max_textures as usize;
        let mut tick = next_batch_tick();
        let mut set_index = 0;
        let mut start = 0;

        copy_bound_textures(self.backend.as_ref(), &mut self.temp_bound_textures, max);
        texture_set_at(&mut self.texture_sets, set_index, max);

        for i in 0..self.buffered_textures.len() {
            if self.buffered_textures[i].batch_tick() == tick {
                continue;
            }

            if self.texture_sets[set_index].count >= max {
                bound_array(
                    &mut self.texture_sets[set_index],
                    &mut self.temp_bound_textures,
                    tick,
                    max,
                );
                self.build_draw_calls(set_index, start, i, attributes, indices);
                start = i;
                set_index += 1;
                texture_set_at(&mut self.texture_sets, set_index, max);
                tick = next_batch_tick();
            }

            let texture = &self.buffered_textures[i];
            texture.set_batch_tick(tick);
            self.texture_sets[set_index].push(texture.clone());
        }

        let finish = self.buffered_textures.len();
        if self.texture_sets[set_index].count > 0 {
            bound_array(
                &mut self.texture_sets[set_index],
                &mut self.temp_bound_textures,
                tick,
                max,
            );
            self.build_draw_calls(set_index, start, finish, attributes, indices);
        }

        for slot in &mut self.temp_bound_textures {
            *slot = None;
        }
    }

    fn build_draw_calls(
        &mut self,
        set_index: usize,
        start: usize,
        finish: usize,
        attributes: &mut ViewableBuffer,
        indices: &mut ViewableBuffer,
    ) {
        let stride_words = self.layout.stride_words();
        let mut run_start = start;
        let mut dc_index = self.draw_call_count;
        let mut a_index = self.a_index;
        let mut i_index = self.i_index;

        open_draw_call(&mut self.draw_calls, dc_index, set_index, i_index);

        for i in start..finish {
            let element = &self.buffered_elements[i];
            let texture = element.texture();
            let blend = premultiply_blend_mode(texture.is_premultiplied(), element.blend_mode());

            if run_start < i && self.draw_calls[dc_index].blend != blend {
                let call = &mut self.draw_calls[dc_index];
                call.size = i_index as u32 - call.start;
                run_start = i;
                dc_index += 1;
                open_draw_call(&mut self.draw_calls, dc_index, set_index, i_index);
            }

            pack_interleaved_geometry(
                element.as_ref(),
                &self.layout,
                texture.batch_location() as f32,
                attributes,
                a_index,
                indices.uint32_view_mut(),
                i_index,
            );
            a_index += element.vertex_count() * stride_words;
            i_index += element.indices().len();
            self.draw_calls[dc_index].blend = blend;
        }

        if run_start < finish {
            let call = &mut self.draw_calls[dc_index];
            call.size = i_index as u32 - call.start;
            dc_index += 1;
        }

        self.draw_call_count = dc_index;
        self.a_index = a_index;
        self.i_index = i_index;
    }

    fn update_geometry(&mut self, attributes: &ViewableBuffer, indices: &ViewableBuffer) {
        let vertices = &attributes.raw_bytes()[..self.a_index * 4];
        let indices = &indices.raw_bytes()[..self.i_index * 4];

        if self.can_upload_same_buffer {
            if self.packed_geometries.is_empty() {
                self.packed_geometries.push(self.backend.create_geometry(&self.layout));
            }
            let index = self.flush_id.min(self.packed_geometries.len() - 1);
            self.packed_geometries[index].update_buffers(vertices, indices);
            return;
        }

        if self.flush_id >= self.packed_geometries.len() {
            if self.packed_geometries.len() < self.settings.max_packed_geometries.max(1) {
                debug!("Growing packed geometry pool to {}", self.packed_geometries.len() + 1);
                self.packed_geometries.push(self.backend.create_geometry(&self.layout));
            } else {
                if !self.warned_geometry_cap {
                    warn!(
                        "Packed geometry pool hit its cap of {}, reusing buffers this frame",
                        self.packed_geometries.len()
                    );
                    self.warned_geometry_cap = true;
                }
                self.flush_id = 0;
            }
        }

        let geometry = &self.packed_geometries[self.flush_id];
        geometry.update_buffers(vertices, indices);
        geometry.bind();
        self.flush_id += 1;
    }

    fn draw_batches(&mut self) {
        profile_function!();

        let mut current_set = None;
        for i in 0..self.draw_call_count {
            let call = self.draw_calls[i];

            if current_set != Some(call.texture_set) {
                profile_scope!("bind_textures");
                current_set = Some(call.texture_set);
                let set = &mut self.texture_sets[call.texture_set];
                for (texture, slot) in set.iter() {
                    self.backend.bind_texture(texture, slot);
                    self.stats.texture_binds += 1;
                }
                set.clear();
            }

            if self.current_blend != Some(call.blend) {
                self.backend.set_blend_mode(call.blend);
                self.current_blend = Some(call.blend);
                self.stats.blend_changes += 1;
            }

            self.backend.draw_elements(
                call.primitive,
                call.size,
                IndexFormat::Uint32,
                call.start * IndexFormat::Uint32.byte_size(),
            );
            self.stats.draw_calls += 1;
        }
    }

    /// Release GPU resources. The batcher must not be used afterwards.
    pub fn destroy(&mut self) {
        self.buffered_elements.clear();
        self.buffered_textures.clear();
        self.vertex_count = 0;
        self.index_count = 0;
        self.packed_geometries.clear();
        self.texture_sets.clear();
        self.draw_calls.clear();
        self.draw_call_count = 0;
        self.temp_bound_textures.clear();
        self.scratch.clear();
        self.program = None;
        self.current_blend = None;
        self.active = false;
    }
}

impl ObjectRenderer for Batcher {
    fn start(&mut self) {
        Batcher::start(self);
    }

    fn stop(&mut self) {
        Batcher::stop(self);
    }

    fn flush(&mut self) {
        Batcher::flush(self);
    }

    fn render(&mut self, element: &Arc<dyn Renderable>) {
        Batcher::render(self, element);
    }

    fn prerender(&mut self) {
        Batcher::prerender(self);
    }

    fn context_change(&mut self) {
        Batcher::context_change(self);
    }

    fn destroy(&mut self) {
        Batcher::destroy(self);
    }
}

impl std::fmt::Debug for Batcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Batcher")
            .field("size", &self.size)
            .field("max_textures", &self.max_textures)
            .field("buffered", &self.buffered_elements.len())
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}

/// Snapshot the backend's bound textures and stamp each with its slot.
fn copy_bound_textures(
    backend: &dyn RenderBackend,
    bound: &mut Vec<Option<Arc<BaseTexture>>>,
    max_textures: usize,
) {
    if bound.len() < max_textures {
        bound.resize(max_textures, None);
    }
    for slot in (0..max_textures).rev() {
        bound[slot] = backend.bound_texture(slot as u32);
        if let Some(texture) = &bound[slot] {
            texture.set_batch_location(slot as u32);
        }
    }
}

/// Assign a slot to every texture in `set`.
///
/// A texture already bound at its recorded slot keeps it. Others take the
/// lowest slot not held by another member of the same group.
fn bound_array(
    set: &mut TextureSet,
    bound: &mut [Option<Arc<BaseTexture>>],
    tick: u64,
    max_textures: usize,
) {
    let mut j = 0;
    for i in 0..set.count {
        let Some(texture) = set.elements[i].as_ref() else {
            continue;
        };

        let location = texture.batch_location() as usize;
        if location < max_textures
            && bound[location]
                .as_ref()
                .is_some_and(|b| Arc::ptr_eq(b, texture))
        {
            set.ids[i] = location as u32;
            continue;
        }

        while j < max_textures {
            let taken = bound[j]
                .as_ref()
                .is_some_and(|b| b.batch_tick() == tick && b.batch_location() as usize == j);
            if taken {
                j += 1;
                continue;
            }

            set.ids[i] = j as u32;
            texture.set_batch_location(j as u32);
            bound[j] = Some(texture.clone());
            break;
        }
    }
}

fn texture_set_at(sets: &mut Vec<TextureSet>, index: usize, max_textures: usize) {
    if index >= sets.len() {
        debug!("Growing texture set pool to {}", index + 1);
        sets.resize_with(index + 1, || TextureSet::with_capacity(max_textures));
    }
    sets[index].clear();
}

fn open_draw_call(calls: &mut Vec<DrawCall>, index: usize, texture_set: usize, start: usize) {
    if index >= calls.len() {
        debug!("Growing draw call pool to {}", index + 1);
        calls.resize(index + 1, DrawCall::default());
    }
    calls[index] = DrawCall {
        texture_set,
        blend: BlendMode::Normal,
        primitive: PrimitiveType::Triangles,
        start: start as u32,
        size: 0,
    };
}
