//! Batches a grid of sprites into an offscreen target.
//!
//! Four textures and two blend modes are mixed so the log shows how many draws
//! the batcher needed for the frame.
//!
//! Run with: `cargo run -p lumen-render --example headless_batch`
//!
//! Set `LUMEN_PUFFIN=1` to serve the frame's profile to puffin_viewer.

use std::sync::Arc;

use lumen_core::logging;
use lumen_core::math::{Affine2, Mat4, Vec2};
use lumen_core::profiling::{ProfilingBackend, init_profiling, new_frame, profile_scope};
use lumen_render::{
    AlphaMode, BaseTexture, BatchSettings, Batcher, BlendMode, GraphicsContext, Renderable, Sprite,
    WgpuBackend,
};

const TARGET_SIZE: u32 = 512;
const TARGET_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;

fn solid_texture(backend: &WgpuBackend, rgba: [u8; 4]) -> Arc<BaseTexture> {
    let texture = BaseTexture::pending(8, 8, AlphaMode::Premultiplied);
    let pixels: Vec<u8> = rgba.iter().copied().cycle().take(8 * 8 * 4).collect();
    backend.upload_rgba8(&texture, &pixels);
    texture
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    logging::init();
    if std::env::var_os("LUMEN_PUFFIN").is_some() {
        init_profiling(ProfilingBackend::PuffinHttp);
    }

    let context = GraphicsContext::new_owned_sync()?;
    tracing::info!("Using adapter {:?}", context.info().name);

    let backend = Arc::new(WgpuBackend::new(context.clone(), TARGET_FORMAT));
    backend.set_projection(Mat4::orthographic_rh(
        0.0,
        TARGET_SIZE as f32,
        TARGET_SIZE as f32,
        0.0,
        -1.0,
        1.0,
    ));

    let textures = [
        solid_texture(&backend, [255, 0, 0, 255]),
        solid_texture(&backend, [0, 255, 0, 255]),
        solid_texture(&backend, [0, 0, 255, 255]),
        solid_texture(&backend, [128, 128, 128, 128]),
    ];

    let sprites: Vec<Arc<dyn Renderable>> = (0..256)
        .map(|i| {
            let position = Vec2::new((i % 16) as f32 * 32.0, (i / 16) as f32 * 32.0);
            let blend = if i % 37 == 0 { BlendMode::Add } else { BlendMode::Normal };
            let sprite = Sprite::new(textures[i % textures.len()].clone())
                .with_transform(Affine2::from_translation(position))
                .with_size(Vec2::splat(28.0))
                .with_alpha(0.9)
                .with_blend_mode(blend);
            Arc::new(sprite) as Arc<dyn Renderable>
        })
        .collect();

    let mut batcher = Batcher::new(backend.clone(), BatchSettings::default())?;

    let target = context.device().create_texture(&wgpu::TextureDescriptor {
        label: Some("headless_target"),
        size: wgpu::Extent3d {
            width: TARGET_SIZE,
            height: TARGET_SIZE,
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: TARGET_FORMAT,
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
        view_formats: &[],
    });
    let view = target.create_view(&wgpu::TextureViewDescriptor::default());

    new_frame();
    {
        profile_scope!("batch_frame");
        batcher.prerender();
        batcher.start();
        for sprite in &sprites {
            batcher.render(sprite);
        }
        batcher.stop();
    }

    let mut encoder = context
        .device()
        .create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("headless_encoder"),
        });
    {
        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("headless_pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: &view,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                    store: wgpu::StoreOp::Store,
                },
                depth_slice: None,
            })],
            depth_stencil_attachment: None,
            timestamp_writes: None,
            occlusion_query_set: None,
        });
        backend.encode(&mut pass);
    }
    context.queue().submit(Some(encoder.finish()));
    backend.end_frame();

    let stats = batcher.stats();
    tracing::info!(
        "{} sprites -> {} draws, {} texture binds, {} blend changes ({} textures per draw)",
        stats.elements,
        stats.draw_calls,
        stats.texture_binds,
        stats.blend_changes,
        batcher.max_textures()
    );

    batcher.destroy();
    Ok(())
}
