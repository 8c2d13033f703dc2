//! Interleaved geometry packing.

use crate::batch::buffer::ViewableBuffer;
use crate::batch::layout::{AttributeSource, VertexLayout};
use crate::color::pack_color;
use crate::renderable::Renderable;

/// Write one element's vertices and indices into the scratch buffers.
///
/// `a_index` is a word offset into `attributes` and `i_index` an offset into
/// `indices`. Indices are rebased by the number of vertices already packed, so
/// they address the shared vertex buffer.
pub fn pack_interleaved_geometry(
    element: &dyn Renderable,
    layout: &VertexLayout,
    texture_slot: f32,
    attributes: &mut ViewableBuffer,
    a_index: usize,
    indices: &mut [u32],
    i_index: usize,
) {
    let stride_words = layout.stride_words();
    let vertex_data = element.vertex_data();
    let uvs = element.uvs();
    let vertex_count = vertex_data.len() / 2;
    let texture = element.texture();
    let color = pack_color(element.tint(), element.world_alpha(), texture.is_premultiplied());
    let slot_bits = texture_slot.to_bits();

    let words = attributes.uint32_view_mut();

    if layout.is_standard() {
        let mut a = a_index;
        for v in 0..vertex_count {
            let i = v * 2;
            words[a] = vertex_data[i].to_bits();
            words[a + 1] = vertex_data[i + 1].to_bits();
            words[a + 2] = uvs[i].to_bits();
            words[a + 3] = uvs[i + 1].to_bits();
            words[a + 4] = color;
            words[a + 5] = slot_bits;
            a += stride_words;
        }
    } else {
        for attribute in layout.attributes() {
            let offset = attribute.word_offset();
            match attribute.source {
                AttributeSource::Position => {
                    for v in 0..vertex_count {
                        let a = a_index + v * stride_words + offset;
                        words[a] = vertex_data[v * 2].to_bits();
                        words[a + 1] = vertex_data[v * 2 + 1].to_bits();
                    }
                }
                AttributeSource::TextureCoord => {
                    for v in 0..vertex_count {
                        let a = a_index + v * stride_words + offset;
                        words[a] = uvs[v * 2].to_bits();
                        words[a + 1] = uvs[v * 2 + 1].to_bits();
                    }
                }
                AttributeSource::Color => {
                    for v in 0..vertex_count {
                        words[a_index + v * stride_words + offset] = color;
                    }
                }
                AttributeSource::TextureId => {
                    for v in 0..vertex_count {
                        words[a_index + v * stride_words + offset] = slot_bits;
                    }
                }
                AttributeSource::Custom => {
                    let width = attribute.format.word_count();
                    let data = element.custom_attribute(&attribute.identifier);
                    for v in 0..vertex_count {
                        let a = a_index + v * stride_words + offset;
                        for k in 0..width {
                            words[a + k] = match data {
                                Some(data) if data.len() >= vertex_count * width => {
                                    data.word(v * width + k)
                                }
                                // One tuple for the whole element.
                                Some(data) if data.len() >= width => data.word(k),
                                _ => 0,
                            };
                        }
                    }
                }
            }
        }
    }

    let base = (a_index / stride_words) as u32;
    for (k, &index) in element.indices().iter().enumerate() {
        indices[i_index + k] = base + index;
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::batch::layout::{AttributeDefinition, AttributeFormat};
    use crate::renderable::{CustomAttributeData, QUAD_INDICES};
    use crate::texture::{AlphaMode, BaseTexture};

    struct Quad {
        texture: Arc<BaseTexture>,
        vertices: [f32; 8],
        alpha: f32,
        frame: Option<[f32; 4]>,
    }

    impl Quad {
        fn new(alpha_mode: AlphaMode) -> Self {
            Self {
                texture: BaseTexture::new(4, 4, alpha_mode),
                vertices: [0.0, 0.0, 1.0, 0.0, 1.0, 1.0, 0.0, 1.0],
                alpha: 1.0,
                frame: None,
            }
        }
    }

    impl Renderable for Quad {
        fn texture(&self) -> &Arc<BaseTexture> {
            &self.texture
        }

        fn vertex_data(&self) -> &[f32] {
            &self.vertices
        }

        fn uvs(&self) -> &[f32] {
            &self.vertices
        }

        fn indices(&self) -> &[u32] {
            &QUAD_INDICES
        }

        fn world_alpha(&self) -> f32 {
            self.alpha
        }

        fn tint(&self) -> u32 {
            0xff0000
        }

        fn custom_attribute(&self, identifier: &str) -> Option<CustomAttributeData<'_>> {
            match (identifier, &self.frame) {
                ("aFrame", Some(frame)) => Some(CustomAttributeData::Float(frame)),
                _ => None,
            }
        }
    }

    #[test]
    fn test_standard_packing() {
        let quad = Quad::new(AlphaMode::Premultiplied);
        let layout = VertexLayout::default();
        let mut attributes = ViewableBuffer::new(4 * 6);
        let mut indices = [0u32; 6];

        pack_interleaved_geometry(&quad, &layout, 3.0, &mut attributes, 0, &mut indices, 0);

        let floats = attributes.float32_view();
        let words = attributes.uint32_view();
        // Third vertex (1, 1)
        assert_eq!(&floats[12..16], &[1.0, 1.0, 1.0, 1.0]);
        assert_eq!(words[16], 0xff0000ff);
        assert_eq!(floats[17], 3.0);
        assert_eq!(indices, QUAD_INDICES);
    }

    #[test]
    fn test_indices_are_rebased() {
        let quad = Quad::new(AlphaMode::Premultiplied);
        let layout = VertexLayout::default();
        let mut attributes = ViewableBuffer::new(8 * 6);
        let mut indices = [0u32; 12];

        pack_interleaved_geometry(&quad, &layout, 0.0, &mut attributes, 0, &mut indices, 0);
        pack_interleaved_geometry(&quad, &layout, 0.0, &mut attributes, 4 * 6, &mut indices, 6);

        assert_eq!(&indices[6..], &[4, 5, 6, 4, 6, 7]);
    }

    #[test]
    fn test_premultiplied_color() {
        let mut quad = Quad::new(AlphaMode::Premultiplied);
        quad.alpha = 0.5;
        let layout = VertexLayout::default();
        let mut attributes = ViewableBuffer::new(4 * 6);
        let mut indices = [0u32; 6];

        pack_interleaved_geometry(&quad, &layout, 0.0, &mut attributes, 0, &mut indices, 0);

        let [r, g, b, a] = attributes.uint32_view()[4].to_le_bytes();
        assert_eq!((r, g, b, a), (128, 0, 0, 127));
    }

    #[test]
    fn test_custom_layout_broadcast_and_missing() {
        let mut definitions: Vec<AttributeDefinition> = ["aVertexPosition", "aTextureCoord", "aColor", "aTextureId"]
            .into_iter()
            .map(AttributeDefinition::builtin)
            .collect();
        definitions.push(AttributeDefinition::custom("aFrame", AttributeFormat::Float32x4));
        let layout = VertexLayout::compile(&definitions).unwrap();
        let stride = layout.stride_words();

        let mut quad = Quad::new(AlphaMode::Premultiplied);
        quad.frame = Some([0.25, 0.5, 0.75, 1.0]);
        let mut attributes = ViewableBuffer::new(4 * stride);
        let mut indices = [0u32; 6];
        pack_interleaved_geometry(&quad, &layout, 1.0, &mut attributes, 0, &mut indices, 0);

        let floats = attributes.float32_view();
        for v in 0..4 {
            assert_eq!(&floats[v * stride + 6..v * stride + 10], &[0.25, 0.5, 0.75, 1.0]);
            assert_eq!(floats[v * stride + 5], 1.0);
        }

        quad.frame = None;
        pack_interleaved_geometry(&quad, &layout, 1.0, &mut attributes, 0, &mut indices, 0);
        let floats = attributes.float32_view();
        assert_eq!(&floats[6..10], &[0.0; 4]);
    }
}
