//! Blend modes and their premultiplied-alpha normalization.

/// Blend modes an element may request.
///
/// The `*Npm` variants are the straight-alpha counterparts of `Normal`,
/// `Add` and `Screen`. Elements rarely ask for them directly; the batcher
/// picks them through [`premultiply_blend_mode`] when a texture is not
/// premultiplied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum BlendMode {
    /// Standard premultiplied alpha compositing.
    ///
    /// Formula: `src.rgb + dst.rgb * (1 - src.a)`
    #[default]
    Normal = 0,
    /// Additive blending. Use for glows, particles and light sources.
    Add,
    /// Multiplicative blending. Use for shadows and tinting.
    Multiply,
    /// `src + dst * (1 - src)`.
    Screen,
    Overlay,
    Darken,
    Lighten,
    ColorDodge,
    ColorBurn,
    HardLight,
    SoftLight,
    Difference,
    Exclusion,
    Hue,
    Saturation,
    Color,
    Luminosity,
    /// Straight alpha blending.
    ///
    /// Formula: `src.rgb * src.a + dst.rgb * (1 - src.a)`
    NormalNpm,
    /// Straight alpha additive blending.
    AddNpm,
    /// Straight alpha screen blending.
    ScreenNpm,
    /// No blending. Source replaces destination.
    None,
    /// Punches holes in the destination using the source alpha.
    Erase,
    /// `dst - src`.
    Subtract,
}

impl BlendMode {
    /// Number of blend modes.
    pub const COUNT: usize = 23;

    /// Every blend mode in discriminant order.
    pub const ALL: [BlendMode; Self::COUNT] = [
        BlendMode::Normal,
        BlendMode::Add,
        BlendMode::Multiply,
        BlendMode::Screen,
        BlendMode::Overlay,
        BlendMode::Darken,
        BlendMode::Lighten,
        BlendMode::ColorDodge,
        BlendMode::ColorBurn,
        BlendMode::HardLight,
        BlendMode::SoftLight,
        BlendMode::Difference,
        BlendMode::Exclusion,
        BlendMode::Hue,
        BlendMode::Saturation,
        BlendMode::Color,
        BlendMode::Luminosity,
        BlendMode::NormalNpm,
        BlendMode::AddNpm,
        BlendMode::ScreenNpm,
        BlendMode::None,
        BlendMode::Erase,
        BlendMode::Subtract,
    ];

    /// Convert to wgpu BlendState.
    ///
    /// Non-separable and advanced modes need a framebuffer read and render as
    /// `Normal` here.
    pub fn to_blend_state(self) -> Option<wgpu::BlendState> {
        use wgpu::{BlendComponent, BlendFactor, BlendOperation, BlendState};

        const fn component(src: BlendFactor, dst: BlendFactor) -> BlendComponent {
            BlendComponent {
                src_factor: src,
                dst_factor: dst,
                operation: BlendOperation::Add,
            }
        }

        let premultiplied_alpha = component(BlendFactor::One, BlendFactor::OneMinusSrcAlpha);

        match self {
            BlendMode::None => None,
            BlendMode::Add => Some(BlendState {
                color: component(BlendFactor::One, BlendFactor::One),
                alpha: component(BlendFactor::One, BlendFactor::One),
            }),
            BlendMode::Multiply => Some(BlendState {
                color: component(BlendFactor::Dst, BlendFactor::OneMinusSrcAlpha),
                alpha: premultiplied_alpha,
            }),
            BlendMode::Screen => Some(BlendState {
                color: component(BlendFactor::One, BlendFactor::OneMinusSrc),
                alpha: premultiplied_alpha,
            }),
            BlendMode::NormalNpm => Some(BlendState {
                color: component(BlendFactor::SrcAlpha, BlendFactor::OneMinusSrcAlpha),
                alpha: premultiplied_alpha,
            }),
            BlendMode::AddNpm => Some(BlendState {
                color: component(BlendFactor::SrcAlpha, BlendFactor::One),
                alpha: component(BlendFactor::One, BlendFactor::One),
            }),
            BlendMode::ScreenNpm => Some(BlendState {
                color: component(BlendFactor::SrcAlpha, BlendFactor::OneMinusSrc),
                alpha: premultiplied_alpha,
            }),
            BlendMode::Erase => Some(BlendState {
                color: component(BlendFactor::Zero, BlendFactor::OneMinusSrcAlpha),
                alpha: component(BlendFactor::Zero, BlendFactor::OneMinusSrcAlpha),
            }),
            BlendMode::Subtract => Some(BlendState {
                color: BlendComponent {
                    src_factor: BlendFactor::One,
                    dst_factor: BlendFactor::One,
                    operation: BlendOperation::ReverseSubtract,
                },
                alpha: component(BlendFactor::One, BlendFactor::One),
            }),
            _ => Some(BlendState::PREMULTIPLIED_ALPHA_BLENDING),
        }
    }

    /// Create a color target state with this blend mode.
    pub fn to_color_target_state(self, format: wgpu::TextureFormat) -> wgpu::ColorTargetState {
        wgpu::ColorTargetState {
            format,
            blend: self.to_blend_state(),
            write_mask: wgpu::ColorWrites::ALL,
        }
    }
}

impl From<BlendMode> for Option<wgpu::BlendState> {
    fn from(mode: BlendMode) -> Self {
        mode.to_blend_state()
    }
}

const fn build_premultiply_table() -> [[BlendMode; BlendMode::COUNT]; 2] {
    let mut straight = BlendMode::ALL;
    let mut premultiplied = BlendMode::ALL;

    straight[BlendMode::Normal as usize] = BlendMode::NormalNpm;
    straight[BlendMode::Add as usize] = BlendMode::AddNpm;
    straight[BlendMode::Screen as usize] = BlendMode::ScreenNpm;

    premultiplied[BlendMode::NormalNpm as usize] = BlendMode::Normal;
    premultiplied[BlendMode::AddNpm as usize] = BlendMode::Add;
    premultiplied[BlendMode::ScreenNpm as usize] = BlendMode::Screen;

    [straight, premultiplied]
}

/// Row 0 is for straight-alpha textures, row 1 for premultiplied ones.
static PREMULTIPLY_TABLE: [[BlendMode; BlendMode::COUNT]; 2] = build_premultiply_table();

/// The blend mode actually used for an element.
///
/// Straight-alpha textures need different blend factors than premultiplied
/// ones for the same requested mode.
#[inline]
pub fn premultiply_blend_mode(premultiplied: bool, mode: BlendMode) -> BlendMode {
    PREMULTIPLY_TABLE[premultiplied as usize][mode as usize]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_is_in_discriminant_order() {
        for (i, mode) in BlendMode::ALL.iter().enumerate() {
            assert_eq!(*mode as usize, i);
        }
    }

    #[test]
    fn test_straight_alpha_row() {
        assert_eq!(premultiply_blend_mode(false, BlendMode::Normal), BlendMode::NormalNpm);
        assert_eq!(premultiply_blend_mode(false, BlendMode::Add), BlendMode::AddNpm);
        assert_eq!(premultiply_blend_mode(false, BlendMode::Screen), BlendMode::ScreenNpm);
        assert_eq!(premultiply_blend_mode(false, BlendMode::Multiply), BlendMode::Multiply);
        assert_eq!(premultiply_blend_mode(false, BlendMode::NormalNpm), BlendMode::NormalNpm);
    }

    #[test]
    fn test_premultiplied_row() {
        assert_eq!(premultiply_blend_mode(true, BlendMode::NormalNpm), BlendMode::Normal);
        assert_eq!(premultiply_blend_mode(true, BlendMode::AddNpm), BlendMode::Add);
        assert_eq!(premultiply_blend_mode(true, BlendMode::ScreenNpm), BlendMode::Screen);
        assert_eq!(premultiply_blend_mode(true, BlendMode::Normal), BlendMode::Normal);
        assert_eq!(premultiply_blend_mode(true, BlendMode::Erase), BlendMode::Erase);
    }

    #[test]
    fn test_blend_states() {
        assert!(BlendMode::None.to_blend_state().is_none());
        assert_eq!(
            BlendMode::Normal.to_blend_state(),
            Some(wgpu::BlendState::PREMULTIPLIED_ALPHA_BLENDING)
        );
        // Advanced modes fall back to normal.
        assert_eq!(
            BlendMode::Overlay.to_blend_state(),
            BlendMode::Normal.to_blend_state()
        );

        let subtract = BlendMode::Subtract.to_blend_state().unwrap();
        assert_eq!(subtract.color.operation, wgpu::BlendOperation::ReverseSubtract);

        let add_npm = BlendMode::AddNpm.to_blend_state().unwrap();
        assert_eq!(add_npm.color.src_factor, wgpu::BlendFactor::SrcAlpha);
        assert_eq!(add_npm.color.dst_factor, wgpu::BlendFactor::One);
    }

    #[test]
    fn test_color_target_state() {
        let state = BlendMode::Add.to_color_target_state(wgpu::TextureFormat::Bgra8Unorm);
        assert_eq!(state.format, wgpu::TextureFormat::Bgra8Unorm);
        assert_eq!(state.write_mask, wgpu::ColorWrites::ALL);
        assert!(state.blend.is_some());
    }
}
