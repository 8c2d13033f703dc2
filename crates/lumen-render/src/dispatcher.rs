//! Active-renderer switching.
//!
//! Only one [`ObjectRenderer`] is current at a time. Switching stops the old
//! one, which flushes anything it buffered, before starting the new one, so
//! batched content is always drawn before something else draws over it.

use std::sync::Arc;

use tracing::debug;

use crate::renderable::Renderable;

/// A renderer the dispatcher can make current.
pub trait ObjectRenderer: Send {
    /// Called when this renderer becomes current.
    fn start(&mut self) {}

    /// Called when another renderer takes over. Must draw everything buffered.
    fn stop(&mut self) {}

    fn flush(&mut self) {}

    fn render(&mut self, element: &Arc<dyn Renderable>);

    /// Called once per frame before scene traversal.
    fn prerender(&mut self) {}

    /// Called when the GPU context is created or restored.
    fn context_change(&mut self) {}

    fn destroy(&mut self) {}
}

/// The idle renderer. Draws nothing.
#[derive(Debug, Default)]
pub struct EmptyRenderer;

impl ObjectRenderer for EmptyRenderer {
    fn render(&mut self, _element: &Arc<dyn Renderable>) {}
}

/// Handle to a renderer registered with a [`BatchSystem`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RendererId(usize);

impl RendererId {
    /// The built-in [`EmptyRenderer`].
    pub const EMPTY: RendererId = RendererId(0);

    pub fn index(self) -> usize {
        self.0
    }
}

/// Owns the registered renderers and tracks the current one.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use lumen_render::{BatchSettings, BatchSystem, Batcher, RendererId};
/// use lumen_test_utils::MockBackend;
///
/// let backend = Arc::new(MockBackend::new());
/// let batcher = Batcher::new(backend, BatchSettings::default()).unwrap();
///
/// let mut system = BatchSystem::new();
/// let sprites = system.register("batch", Box::new(batcher));
///
/// system.set_object_renderer(sprites);
/// assert_eq!(system.current(), sprites);
/// system.reset();
/// assert_eq!(system.current(), RendererId::EMPTY);
/// ```
pub struct BatchSystem {
    renderers: Vec<(String, Box<dyn ObjectRenderer>)>,
    current: RendererId,
}

impl BatchSystem {
    pub fn new() -> Self {
        Self {
            renderers: vec![("empty".to_string(), Box::new(EmptyRenderer))],
            current: RendererId::EMPTY,
        }
    }

    /// Register a renderer under `name`. Registering a name twice replaces it.
    pub fn register(&mut self, name: impl Into<String>, renderer: Box<dyn ObjectRenderer>) -> RendererId {
        let name = name.into();
        if let Some(id) = self.find(&name) {
            if id == self.current {
                self.set_object_renderer(RendererId::EMPTY);
            }
            self.renderers[id.0].1 = renderer;
            return id;
        }
        self.renderers.push((name, renderer));
        RendererId(self.renderers.len() - 1)
    }

    pub fn find(&self, name: &str) -> Option<RendererId> {
        self.renderers
            .iter()
            .position(|(n, _)| n == name)
            .map(RendererId)
    }

    pub fn current(&self) -> RendererId {
        self.current
    }

    pub fn name(&self, id: RendererId) -> Option<&str> {
        self.renderers.get(id.0).map(|(name, _)| name.as_str())
    }

    /// Make `id` current, stopping the previous renderer first.
    ///
    /// No-op when `id` is already current or unknown.
    pub fn set_object_renderer(&mut self, id: RendererId) {
        if id == self.current || id.0 >= self.renderers.len() {
            return;
        }
        debug!(
            "Switching renderer {} -> {}",
            self.renderers[self.current.0].0, self.renderers[id.0].0
        );
        self.renderers[self.current.0].1.stop();
        self.current = id;
        self.renderers[id.0].1.start();
    }

    /// Route `element` to renderer `id`, making it current.
    pub fn render(&mut self, id: RendererId, element: &Arc<dyn Renderable>) {
        self.set_object_renderer(id);
        self.renderers[self.current.0].1.render(element);
    }

    /// Draw everything the current renderer buffered.
    pub fn flush(&mut self) {
        self.set_object_renderer(RendererId::EMPTY);
    }

    /// Stop the current renderer and go idle.
    pub fn reset(&mut self) {
        self.set_object_renderer(RendererId::EMPTY);
    }

    pub fn prerender(&mut self) {
        for (_, renderer) in &mut self.renderers {
            renderer.prerender();
        }
    }

    pub fn context_change(&mut self) {
        for (_, renderer) in &mut self.renderers {
            renderer.context_change();
        }
    }

    /// Mutable access to a registered renderer.
    pub fn renderer_mut(&mut self, id: RendererId) -> Option<&mut (dyn ObjectRenderer + 'static)> {
        self.renderers.get_mut(id.0).map(|(_, renderer)| renderer.as_mut())
    }

    pub fn destroy(&mut self) {
        self.reset();
        for (_, renderer) in &mut self.renderers {
            renderer.destroy();
        }
        self.renderers.truncate(1);
    }
}

impl Default for BatchSystem {
    fn default() -> Self {
        Self::new()
    }
}
