//! Recording implementation of the batcher's backend traits.

use std::sync::Arc;

use lumen_render::{
    BaseTexture, BatchProgram, BlendMode, GeometryTarget, IndexFormat, PrimitiveType, ProgramId,
    RenderBackend, TextureId, VertexLayout,
};
use parking_lot::Mutex;

/// Records a backend call for verification in tests.
#[derive(Debug, Clone, PartialEq)]
pub enum BackendCall {
    CompileProbe {
        branches: usize,
        success: bool,
    },
    CreateProgram {
        id: ProgramId,
        max_textures: u32,
    },
    BindProgram(ProgramId),
    CreateGeometry {
        id: usize,
    },
    BindGeometry {
        id: usize,
    },
    UpdateBuffers {
        id: usize,
        vertex_bytes: usize,
        index_bytes: usize,
    },
    BindTexture {
        texture: TextureId,
        slot: u32,
    },
    SetBlendMode(BlendMode),
    DrawElements {
        primitive: PrimitiveType,
        count: u32,
        byte_offset: u32,
    },
}

/// A draw with the state it was issued under.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedDraw {
    pub primitive: PrimitiveType,
    pub count: u32,
    pub format: IndexFormat,
    pub byte_offset: u32,
    pub blend: Option<BlendMode>,
    pub geometry: Option<usize>,
    /// Texture bound at each slot when the draw was issued.
    pub bound: Vec<Option<TextureId>>,
}

impl RecordedDraw {
    /// First index of the draw.
    pub fn first_index(&self) -> u32 {
        self.byte_offset / self.format.byte_size()
    }

    /// Index range covered by the draw.
    pub fn index_range(&self) -> std::ops::Range<u32> {
        self.first_index()..self.first_index() + self.count
    }
}

/// Bytes uploaded to one geometry target.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedUpload {
    pub geometry: usize,
    pub vertices: Vec<u8>,
    pub indices: Vec<u8>,
}

impl RecordedUpload {
    /// Vertex data as 32-bit words.
    pub fn vertex_words(&self) -> Vec<u32> {
        words(&self.vertices)
    }

    /// Index data as `u32` indices.
    pub fn index_values(&self) -> Vec<u32> {
        words(&self.indices)
    }
}

fn words(bytes: &[u8]) -> Vec<u32> {
    bytes
        .chunks_exact(4)
        .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}

#[derive(Default)]
struct State {
    calls: Vec<BackendCall>,
    draws: Vec<RecordedDraw>,
    uploads: Vec<RecordedUpload>,
    programs: Vec<BatchProgram>,
    bound: Vec<Option<Arc<BaseTexture>>>,
    blend: Option<BlendMode>,
    geometry: Option<usize>,
    geometries: usize,
}

struct Shared {
    max_texture_units: u32,
    probe_limit: Option<u32>,
    can_upload_same_buffer: bool,
    state: Mutex<State>,
}

/// Mock implementation of `RenderBackend` for testing.
///
/// Tracks bound textures per slot like a real backend so the batcher's slot
/// reuse can be observed across flushes.
#[derive(Clone)]
pub struct MockBackend {
    shared: Arc<Shared>,
}

impl MockBackend {
    /// 16 texture units, every probe compiles, same-buffer uploads allowed.
    pub fn new() -> Self {
        Self::build(16, None, true)
    }

    fn build(max_texture_units: u32, probe_limit: Option<u32>, can_upload_same_buffer: bool) -> Self {
        Self {
            shared: Arc::new(Shared {
                max_texture_units,
                probe_limit,
                can_upload_same_buffer,
                state: Mutex::new(State::default()),
            }),
        }
    }

    /// Report `units` hardware texture units.
    pub fn with_max_texture_units(self, units: u32) -> Self {
        Self::build(units, self.shared.probe_limit, self.shared.can_upload_same_buffer)
    }

    /// Fail probe shaders with more than `branches` branches.
    pub fn with_probe_limit(self, branches: u32) -> Self {
        Self::build(
            self.shared.max_texture_units,
            Some(branches),
            self.shared.can_upload_same_buffer,
        )
    }

    pub fn with_can_upload_same_buffer(self, can_upload: bool) -> Self {
        Self::build(self.shared.max_texture_units, self.shared.probe_limit, can_upload)
    }

    /// Get a copy of all recorded calls (for test assertions).
    pub fn calls(&self) -> Vec<BackendCall> {
        self.shared.state.lock().calls.clone()
    }

    /// Clear recorded calls, draws and uploads (useful between test steps).
    ///
    /// Bound textures, blend state and geometry bindings are kept.
    pub fn clear_calls(&self) {
        let mut state = self.shared.state.lock();
        state.calls.clear();
        state.draws.clear();
        state.uploads.clear();
    }

    pub fn draws(&self) -> Vec<RecordedDraw> {
        self.shared.state.lock().draws.clone()
    }

    pub fn uploads(&self) -> Vec<RecordedUpload> {
        self.shared.state.lock().uploads.clone()
    }

    /// Programs created so far.
    pub fn programs(&self) -> Vec<BatchProgram> {
        self.shared.state.lock().programs.clone()
    }

    /// Number of geometry targets created.
    pub fn geometry_count(&self) -> usize {
        self.shared.state.lock().geometries
    }

    pub fn bound_textures(&self) -> Vec<Option<TextureId>> {
        self.shared
            .state
            .lock()
            .bound
            .iter()
            .map(|t| t.as_ref().map(|t| t.id()))
            .collect()
    }

    /// Unbind every texture slot.
    pub fn unbind_all_textures(&self) {
        self.shared.state.lock().bound.clear();
    }

    pub fn count_texture_binds(&self) -> usize {
        self.count(|call| matches!(call, BackendCall::BindTexture { .. }))
    }

    pub fn count_blend_changes(&self) -> usize {
        self.count(|call| matches!(call, BackendCall::SetBlendMode(_)))
    }

    pub fn count_probes(&self) -> usize {
        self.count(|call| matches!(call, BackendCall::CompileProbe { .. }))
    }

    pub fn count_buffer_updates(&self) -> usize {
        self.count(|call| matches!(call, BackendCall::UpdateBuffers { .. }))
    }

    /// Get total number of recorded calls.
    pub fn call_count(&self) -> usize {
        self.shared.state.lock().calls.len()
    }

    fn count(&self, filter: impl Fn(&BackendCall) -> bool) -> usize {
        self.shared.state.lock().calls.iter().filter(|c| filter(*c)).count()
    }
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl RenderBackend for MockBackend {
    fn max_texture_image_units(&self) -> u32 {
        self.shared.max_texture_units
    }

    fn can_upload_same_buffer(&self) -> bool {
        self.shared.can_upload_same_buffer
    }

    fn compile_probe(&self, fragment_source: &str) -> bool {
        let branches = fragment_source.matches("{}").count();
        let success = self
            .shared
            .probe_limit
            .is_none_or(|limit| branches <= limit as usize);
        self.shared
            .state
            .lock()
            .calls
            .push(BackendCall::CompileProbe { branches, success });
        success
    }

    fn create_program(&self, program: &BatchProgram, _layout: &VertexLayout) -> ProgramId {
        let mut state = self.shared.state.lock();
        let id = ProgramId(state.programs.len() as u32);
        state.programs.push(program.clone());
        state.calls.push(BackendCall::CreateProgram {
            id,
            max_textures: program.max_textures,
        });
        id
    }

    fn bind_program(&self, program: ProgramId) {
        self.shared.state.lock().calls.push(BackendCall::BindProgram(program));
    }

    fn create_geometry(&self, _layout: &VertexLayout) -> Box<dyn GeometryTarget> {
        let mut state = self.shared.state.lock();
        let id = state.geometries;
        state.geometries += 1;
        state.calls.push(BackendCall::CreateGeometry { id });
        Box::new(MockGeometry {
            id,
            shared: self.shared.clone(),
        })
    }

    fn bind_texture(&self, texture: &Arc<BaseTexture>, slot: u32) {
        let mut state = self.shared.state.lock();
        let slot_index = slot as usize;
        if slot_index >= state.bound.len() {
            state.bound.resize(slot_index + 1, None);
        }
        state.bound[slot_index] = Some(texture.clone());
        state.calls.push(BackendCall::BindTexture {
            texture: texture.id(),
            slot,
        });
    }

    fn bound_texture(&self, slot: u32) -> Option<Arc<BaseTexture>> {
        self.shared.state.lock().bound.get(slot as usize).cloned().flatten()
    }

    fn set_blend_mode(&self, mode: BlendMode) {
        let mut state = self.shared.state.lock();
        state.blend = Some(mode);
        state.calls.push(BackendCall::SetBlendMode(mode));
    }

    fn draw_elements(&self, primitive: PrimitiveType, count: u32, format: IndexFormat, byte_offset: u32) {
        let mut state = self.shared.state.lock();
        let draw = RecordedDraw {
            primitive,
            count,
            format,
            byte_offset,
            blend: state.blend,
            geometry: state.geometry,
            bound: state.bound.iter().map(|t| t.as_ref().map(|t| t.id())).collect(),
        };
        state.draws.push(draw);
        state.calls.push(BackendCall::DrawElements {
            primitive,
            count,
            byte_offset,
        });
    }
}

/// Geometry target handed out by [`MockBackend`].
pub struct MockGeometry {
    id: usize,
    shared: Arc<Shared>,
}

impl MockGeometry {
    pub fn id(&self) -> usize {
        self.id
    }
}

impl GeometryTarget for MockGeometry {
    fn bind(&self) {
        let mut state = self.shared.state.lock();
        state.geometry = Some(self.id);
        state.calls.push(BackendCall::BindGeometry { id: self.id });
    }

    fn update_buffers(&self, vertices: &[u8], indices: &[u8]) {
        let mut state = self.shared.state.lock();
        state.uploads.push(RecordedUpload {
            geometry: self.id,
            vertices: vertices.to_vec(),
            indices: indices.to_vec(),
        });
        state.calls.push(BackendCall::UpdateBuffers {
            id: self.id,
            vertex_bytes: vertices.len(),
            index_bytes: indices.len(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lumen_render::AlphaMode;

    #[test]
    fn test_tracks_bound_slots() {
        let mock = MockBackend::new();
        let texture = BaseTexture::new(1, 1, AlphaMode::default());
        mock.bind_texture(&texture, 2);

        assert!(mock.bound_texture(0).is_none());
        assert!(Arc::ptr_eq(&mock.bound_texture(2).unwrap(), &texture));
        assert_eq!(mock.count_texture_binds(), 1);
    }

    #[test]
    fn test_probe_limit() {
        let mock = MockBackend::new().with_probe_limit(4);
        assert!(mock.compile_probe("{}{}{}{}"));
        assert!(!mock.compile_probe("{}{}{}{}{}"));
        assert_eq!(mock.count_probes(), 2);
    }

    #[test]
    fn test_draw_snapshot() {
        let mock = MockBackend::new();
        mock.set_blend_mode(BlendMode::Add);
        let geometry = mock.create_geometry(&VertexLayout::default());
        geometry.bind();
        mock.draw_elements(PrimitiveType::Triangles, 6, IndexFormat::Uint32, 24);

        let draw = &mock.draws()[0];
        assert_eq!(draw.blend, Some(BlendMode::Add));
        assert_eq!(draw.geometry, Some(0));
        assert_eq!(draw.index_range(), 6..12);
    }

    #[test]
    fn test_builder_keeps_other_options() {
        let mock = MockBackend::new()
            .with_max_texture_units(4)
            .with_can_upload_same_buffer(false)
            .with_probe_limit(2);
        assert_eq!(mock.max_texture_image_units(), 4);
        assert!(!mock.can_upload_same_buffer());
        assert!(!mock.compile_probe("{}{}{}"));
    }
}
