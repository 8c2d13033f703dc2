//! Test utilities for the Lumen renderer.
//!
//! - [`MockBackend`] implements the batcher's `RenderBackend` and
//!   `GeometryTarget` traits without a GPU and records every call.
//! - [`fixtures`] builds textures and elements for tests.
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use lumen_render::{BatchSettings, Batcher};
//! use lumen_test_utils::{MockBackend, fixtures};
//!
//! let backend = Arc::new(MockBackend::new().with_max_texture_units(8));
//! let mut batcher = Batcher::new(backend.clone(), BatchSettings::default()).unwrap();
//! assert_eq!(batcher.max_textures(), 8);
//!
//! let texture = fixtures::texture();
//! batcher.start();
//! batcher.render(&fixtures::quad(&texture));
//! batcher.stop();
//!
//! assert_eq!(backend.draws().len(), 1);
//! assert_eq!(backend.uploads().len(), 1);
//! ```
//!
//! Mock state lives behind `parking_lot::Mutex`, so every method takes `&self`
//! and the mock can be shared as `Arc<dyn RenderBackend>`.

pub mod fixtures;
pub mod mock;

pub use mock::{BackendCall, MockBackend, MockGeometry, RecordedDraw, RecordedUpload};
