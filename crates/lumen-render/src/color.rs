//! Tint packing for the interleaved vertex color.
//!
//! Tints are authored as `0xRRGGBB`. The packed vertex color is a little-endian
//! `u32` whose bytes read `R, G, B, A` in memory, which is what a `Unorm8x4`
//! vertex attribute expects.

/// Swap an `0xRRGGBB` tint to `0xBBGGRR` so R lands in the lowest byte.
#[inline]
pub fn tint_to_bgr(rgb: u32) -> u32 {
    ((rgb >> 16) & 0xff) | (rgb & 0xff00) | ((rgb & 0xff) << 16)
}

/// Scale each channel of `tint` by `alpha` and put the alpha in the top byte.
///
/// Channel order is preserved, so this works on both RGB and BGR tints.
pub fn premultiply_tint(tint: u32, alpha: f32) -> u32 {
    if alpha == 1.0 {
        return (255 << 24) | (tint & 0x00ff_ffff);
    }
    if alpha == 0.0 {
        return 0;
    }

    let scale = |channel: u32| (channel as f32 * alpha + 0.5) as u32;
    let c0 = scale(tint & 0xff);
    let c1 = scale((tint >> 8) & 0xff);
    let c2 = scale((tint >> 16) & 0xff);
    let a = (alpha * 255.0) as u32;

    (a << 24) | (c2 << 16) | (c1 << 8) | c0
}

/// Pack a tint and alpha into the vertex color word.
///
/// When the texture is premultiplied and the element is translucent, the tint
/// is scaled by alpha. Otherwise only the alpha byte carries the alpha.
pub fn pack_color(tint: u32, alpha: f32, premultiplied: bool) -> u32 {
    let alpha = alpha.clamp(0.0, 1.0);
    let bgr = tint_to_bgr(tint);

    if alpha < 1.0 && premultiplied {
        premultiply_tint(bgr, alpha)
    } else {
        bgr + (((alpha * 255.0) as u32) << 24)
    }
}

/// Split a packed color into its `[r, g, b, a]` bytes.
#[inline]
pub fn unpack_color(packed: u32) -> [u8; 4] {
    packed.to_le_bytes()
}
