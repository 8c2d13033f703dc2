//! Batching behavior against a recording backend (no GPU required).
//!
//! These tests drive the batcher through whole frames and check the draws,
//! texture binds, blend changes and uploads it produces.

use std::sync::Arc;

use lumen_core::math::{Affine2, Vec2};
use lumen_render::{
    AlphaMode, BaseTexture, BatchSettings, BatchStats, Batcher, BlendMode, Renderable, Sprite,
    pack_color, premultiply_blend_mode,
};
use lumen_test_utils::fixtures::{self, TestElement};
use lumen_test_utils::{MockBackend, RecordedUpload};

/// Words per vertex in the standard layout.
const STRIDE: usize = 6;

fn setup(settings: BatchSettings) -> (Arc<MockBackend>, Batcher) {
    setup_with(MockBackend::new(), settings)
}

fn setup_with(backend: MockBackend, settings: BatchSettings) -> (Arc<MockBackend>, Batcher) {
    let backend = Arc::new(backend);
    let batcher = Batcher::new(backend.clone(), settings).unwrap();
    (backend, batcher)
}

fn draw_frame(batcher: &mut Batcher, elements: &[Arc<dyn Renderable>]) {
    batcher.prerender();
    batcher.start();
    for element in elements {
        batcher.render(element);
    }
    batcher.stop();
}

/// Texture slot written into the first vertex of the element starting at `vertex`.
fn slot_of_vertex(upload: &RecordedUpload, vertex: usize) -> u32 {
    f32::from_bits(upload.vertex_words()[vertex * STRIDE + 5]) as u32
}

#[test]
fn test_single_texture_single_draw() {
    let (backend, mut batcher) = setup(BatchSettings::default());
    let texture = fixtures::texture();
    let quads: Vec<_> = (0..3).map(|_| fixtures::quad(&texture)).collect();

    draw_frame(&mut batcher, &quads);

    let draws = backend.draws();
    assert_eq!(draws.len(), 1);
    assert_eq!(draws[0].count, 18);
    assert_eq!(draws[0].byte_offset, 0);
    assert_eq!(backend.count_texture_binds(), 1);

    let uploads = backend.uploads();
    assert_eq!(uploads.len(), 1);
    assert_eq!(uploads[0].vertices.len(), 12 * STRIDE * 4);
    assert_eq!(uploads[0].index_values().len(), 18);
}

#[test]
fn test_texture_overflow_splits_groups() {
    let (backend, mut batcher) = setup(BatchSettings::new().max_textures(2));
    assert_eq!(batcher.max_textures(), 2);

    let textures = fixtures::textures(3);
    let quads: Vec<_> = textures.iter().map(fixtures::quad).collect();
    draw_frame(&mut batcher, &quads);

    let draws = backend.draws();
    assert_eq!(draws.len(), 2);
    assert_eq!(draws[0].index_range(), 0..12);
    assert_eq!(draws[1].index_range(), 12..18);
    assert_eq!(backend.count_texture_binds(), 3);

    // The third texture reuses a slot freed by the first group.
    let slot = slot_of_vertex(&backend.uploads()[0], 8) as usize;
    assert_eq!(draws[1].bound[slot], Some(textures[2].id()));
}

#[test]
fn test_blend_change_splits_draws() {
    let (backend, mut batcher) = setup(BatchSettings::default());
    let texture = fixtures::texture();
    let quads = vec![
        fixtures::quad_with_blend(&texture, BlendMode::Normal),
        fixtures::quad_with_blend(&texture, BlendMode::Add),
        fixtures::quad_with_blend(&texture, BlendMode::Normal),
    ];

    draw_frame(&mut batcher, &quads);

    let draws = backend.draws();
    let blends: Vec<_> = draws.iter().map(|d| d.blend).collect();
    assert_eq!(
        blends,
        vec![Some(BlendMode::Normal), Some(BlendMode::Add), Some(BlendMode::Normal)]
    );
    assert!(draws.iter().all(|d| d.count == 6));
    // One texture set, bound once for all three runs.
    assert_eq!(backend.count_texture_binds(), 1);
    assert_eq!(backend.count_blend_changes(), 3);
}

#[test]
fn test_equal_blends_merge() {
    let (backend, mut batcher) = setup(BatchSettings::default());
    let texture = fixtures::texture();
    let quads = vec![
        fixtures::quad_with_blend(&texture, BlendMode::Add),
        fixtures::quad_with_blend(&texture, BlendMode::Add),
        fixtures::quad_with_blend(&texture, BlendMode::Multiply),
    ];

    draw_frame(&mut batcher, &quads);

    let counts: Vec<_> = backend.draws().iter().map(|d| d.count).collect();
    assert_eq!(counts, vec![12, 6]);
    assert_eq!(batcher.last_draw_calls().len(), 2);
}

#[test]
fn test_draws_cover_submission_in_order() {
    let (backend, mut batcher) = setup(BatchSettings::new().max_textures(4));
    let textures = fixtures::textures(6);

    let mut expected_textures = Vec::new();
    let mut expected_blends = Vec::new();
    let quads: Vec<Arc<dyn Renderable>> = (0..40)
        .map(|k| {
            let texture = &textures[(k * 7 + k / 3) % textures.len()];
            let blend = if k % 5 == 0 { BlendMode::Add } else { BlendMode::Normal };
            expected_textures.push(texture.id());
            expected_blends.push(blend);
            let sprite = Sprite::new(texture.clone())
                .with_transform(Affine2::from_translation(Vec2::new(k as f32, 0.0)))
                .with_blend_mode(blend);
            Arc::new(sprite) as Arc<dyn Renderable>
        })
        .collect();

    draw_frame(&mut batcher, &quads);

    let draws = backend.draws();
    let uploads = backend.uploads();
    assert_eq!(uploads.len(), 1);
    let upload = &uploads[0];
    let words = upload.vertex_words();
    let indices = upload.index_values();

    // Draws tile the index buffer with no gaps or overlap.
    let mut next = 0;
    for draw in &draws {
        assert_eq!(draw.first_index(), next);
        assert!(draw.count > 0);
        next += draw.count;
    }
    assert_eq!(next as usize, quads.len() * 6);

    for k in 0..quads.len() {
        // Geometry stays in submission order.
        let first_vertex = k * 4;
        assert_eq!(f32::from_bits(words[first_vertex * STRIDE]), k as f32);
        assert_eq!(indices[k * 6], first_vertex as u32);

        let draw = draws
            .iter()
            .find(|d| d.index_range().contains(&(k as u32 * 6)))
            .unwrap();
        assert!(draw.index_range().contains(&(k as u32 * 6 + 5)));
        assert_eq!(draw.blend, Some(expected_blends[k]));

        let slot = slot_of_vertex(upload, first_vertex);
        assert!(slot < batcher.max_textures());
        assert_eq!(draw.bound[slot as usize], Some(expected_textures[k]));
    }
}

#[test]
fn test_slot_reused_across_flushes() {
    let (backend, mut batcher) = setup(BatchSettings::new().max_textures(4));
    let textures = fixtures::textures(2);

    draw_frame(
        &mut batcher,
        &[fixtures::quad(&textures[0]), fixtures::quad(&textures[1])],
    );
    let first_slot = slot_of_vertex(&backend.uploads()[0], 4);
    backend.clear_calls();

    draw_frame(&mut batcher, &[fixtures::quad(&textures[1])]);

    assert_eq!(slot_of_vertex(&backend.uploads()[0], 0), first_slot);
    assert_eq!(textures[1].batch_location(), first_slot);
}

#[test]
fn test_capacity_forces_flush() {
    let (backend, mut batcher) = setup(BatchSettings::new().batch_size(2));
    assert_eq!(batcher.size(), 8);

    let texture = fixtures::texture();
    batcher.prerender();
    batcher.start();
    for k in 0..5 {
        batcher.render(&fixtures::quad(&texture));
        assert!(batcher.buffered_vertex_count() <= batcher.size());
        // Every second quad overflows and flushes, leaving only itself buffered.
        assert_eq!(batcher.buffered_len(), k % 2 + 1);
    }
    batcher.stop();

    let uploads = backend.uploads();
    assert_eq!(uploads.len(), 3);
    assert!(uploads.iter().all(|u| u.vertices.len() <= 8 * STRIDE * 4));
    assert_eq!(batcher.stats().flushes, 3);
    assert_eq!(batcher.stats().elements, 5);
}

#[test]
fn test_oversized_element_flushes_alone() {
    let (backend, mut batcher) = setup(BatchSettings::new().batch_size(1));
    let texture = fixtures::texture();

    let vertices: Vec<f32> = (0..12).flat_map(|i| [i as f32, 0.0]).collect();
    let uvs = vec![0.0; 24];
    let indices: Vec<u32> = (0..10).flat_map(|i| [0, i + 1, i + 2]).collect();
    let fan = TestElement::new(&texture, vertices, uvs, indices).into_renderable();

    draw_frame(&mut batcher, &[fixtures::quad(&texture), fan]);

    let uploads = backend.uploads();
    assert_eq!(uploads.len(), 2);
    assert_eq!(uploads[1].vertices.len(), 12 * STRIDE * 4);
    assert_eq!(backend.draws()[1].count, 30);
}

#[test]
fn test_empty_flush_does_nothing() {
    let (backend, mut batcher) = setup(BatchSettings::default());
    backend.clear_calls();

    batcher.start();
    batcher.flush();
    batcher.stop();

    assert!(backend.draws().is_empty());
    assert!(backend.uploads().is_empty());
    assert_eq!(batcher.scratch().bucket_count(), 0);
    assert_eq!(batcher.stats().flushes, 0);
}

#[test]
fn test_straight_alpha_texture_uses_npm_blend() {
    let (backend, mut batcher) = setup(BatchSettings::default());
    let straight = fixtures::texture_with(AlphaMode::NoPremultipliedAlpha);
    let premultiplied = fixtures::texture();

    draw_frame(
        &mut batcher,
        &[fixtures::quad(&straight), fixtures::quad(&premultiplied)],
    );

    let draws = backend.draws();
    assert_eq!(draws.len(), 2);
    assert_eq!(
        draws[0].blend,
        Some(premultiply_blend_mode(false, BlendMode::Normal))
    );
    assert_eq!(draws[1].blend, Some(BlendMode::Normal));
    assert_ne!(draws[0].blend, draws[1].blend);
}

#[test]
fn test_vertex_color_follows_alpha_mode() {
    let (backend, mut batcher) = setup(BatchSettings::default());
    let straight = fixtures::texture_with(AlphaMode::NoPremultipliedAlpha);
    let premultiplied = fixtures::texture();

    let elements = vec![
        TestElement::triangle(&premultiplied)
            .with_alpha(0.5)
            .with_tint(0xff8000)
            .into_renderable(),
        TestElement::triangle(&straight)
            .with_alpha(0.5)
            .with_tint(0xff8000)
            .into_renderable(),
    ];
    draw_frame(&mut batcher, &elements);

    let words = backend.uploads()[0].vertex_words();
    assert_eq!(words[4], pack_color(0xff8000, 0.5, true));
    assert_eq!(words[3 * STRIDE + 4], pack_color(0xff8000, 0.5, false));
}

#[test]
fn test_unloaded_texture_is_skipped() {
    let (backend, mut batcher) = setup(BatchSettings::default());
    let pending = BaseTexture::pending(16, 16, AlphaMode::Premultiplied);
    let quad = fixtures::quad(&pending);

    batcher.start();
    batcher.render(&quad);
    assert_eq!(batcher.buffered_len(), 0);
    batcher.stop();
    assert!(backend.draws().is_empty());

    pending.set_valid(true);
    draw_frame(&mut batcher, &[quad]);
    assert_eq!(backend.draws().len(), 1);
}

#[test]
fn test_malformed_geometry_is_dropped() {
    let (backend, mut batcher) = setup(BatchSettings::default());
    let texture = fixtures::texture();
    let mismatched = TestElement::new(
        &texture,
        vec![0.0, 0.0, 1.0, 0.0, 0.0, 1.0],
        vec![0.0, 0.0],
        vec![0, 1, 2],
    )
    .into_renderable();

    draw_frame(&mut batcher, &[mismatched, fixtures::quad(&texture)]);

    let draws = backend.draws();
    assert_eq!(draws.len(), 1);
    assert_eq!(draws[0].count, 6);
}

#[test]
fn test_empty_elements_are_skipped() {
    let (backend, mut batcher) = setup(BatchSettings::default());
    let texture = fixtures::texture();
    let empty = TestElement::new(&texture, vec![], vec![], vec![])
        .with_blend_mode(BlendMode::Add)
        .into_renderable();
    let unindexed = TestElement::new(&texture, vec![0.0, 0.0], vec![0.0, 0.0], vec![]).into_renderable();

    batcher.start();
    for _ in 0..1000 {
        batcher.render(&empty);
        batcher.render(&unindexed);
    }
    assert_eq!(batcher.buffered_len(), 0);
    batcher.stop();
    assert_eq!(batcher.buffered_len(), 0);
    assert!(backend.draws().is_empty());

    draw_frame(
        &mut batcher,
        &[fixtures::quad(&texture), empty, fixtures::quad(&texture)],
    );
    let counts: Vec<_> = backend.draws().iter().map(|d| d.count).collect();
    assert_eq!(counts, vec![12]);
}

#[test]
fn test_blend_state_tracked_across_flushes() {
    let (backend, mut batcher) = setup(BatchSettings::default());
    let texture = fixtures::texture();
    backend.clear_calls();

    batcher.start();
    batcher.render(&fixtures::quad_with_blend(&texture, BlendMode::Add));
    batcher.flush();
    batcher.render(&fixtures::quad_with_blend(&texture, BlendMode::Add));
    batcher.flush();
    assert_eq!(backend.count_blend_changes(), 1);

    // Restarting forgets the cached state.
    batcher.start();
    batcher.render(&fixtures::quad_with_blend(&texture, BlendMode::Add));
    batcher.stop();
    assert_eq!(backend.count_blend_changes(), 2);
}

#[test]
fn test_stats_count_frame_work() {
    let (_backend, mut batcher) = setup(BatchSettings::new().max_textures(2));
    let textures = fixtures::textures(3);
    let quads: Vec<_> = textures.iter().map(fixtures::quad).collect();

    draw_frame(&mut batcher, &quads);
    let stats = batcher.stats();
    assert_eq!(stats.flushes, 1);
    assert_eq!(stats.draw_calls, 2);
    assert_eq!(stats.texture_binds, 3);
    assert_eq!(stats.elements, 3);

    batcher.prerender();
    assert_eq!(batcher.stats(), BatchStats::default());
}

#[test]
fn test_single_texture_mode() {
    let (backend, mut batcher) = setup(BatchSettings::new().prefer_legacy(true));
    assert_eq!(batcher.max_textures(), 1);

    let textures = fixtures::textures(3);
    let quads: Vec<_> = textures.iter().map(fixtures::quad).collect();
    draw_frame(&mut batcher, &quads);

    let draws = backend.draws();
    assert_eq!(draws.len(), 3);
    for (draw, texture) in draws.iter().zip(&textures) {
        assert_eq!(draw.bound[0], Some(texture.id()));
    }
}

#[test]
fn test_destroy_drops_buffered_work() {
    let (backend, mut batcher) = setup(BatchSettings::default());
    let texture = fixtures::texture();

    batcher.start();
    batcher.render(&fixtures::quad(&texture));
    batcher.destroy();

    assert_eq!(batcher.buffered_len(), 0);
    assert_eq!(batcher.packed_geometry_count(), 0);
    assert!(batcher.program().is_none());
    assert!(backend.draws().is_empty());
}
