//! Vertex layout compiler.
//!
//! Attribute definitions are resolved once, when a batcher is built, into a
//! fixed list of offsets and sources. Packing never re-inspects definitions.

use crate::error::{BatchError, BatchResult};

/// GPU-side format of one vertex attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttributeFormat {
    Float32,
    Float32x2,
    Float32x3,
    Float32x4,
    Unorm8x4,
    Uint32,
    Unorm16x2,
    Unorm8x2,
}

impl AttributeFormat {
    /// Size of one value in bytes.
    pub fn byte_size(self) -> u32 {
        match self {
            AttributeFormat::Float32 => 4,
            AttributeFormat::Float32x2 => 8,
            AttributeFormat::Float32x3 => 12,
            AttributeFormat::Float32x4 => 16,
            AttributeFormat::Unorm8x4 => 4,
            AttributeFormat::Uint32 => 4,
            AttributeFormat::Unorm16x2 => 4,
            AttributeFormat::Unorm8x2 => 2,
        }
    }

    /// Size of one value in 32-bit words.
    pub fn word_count(self) -> usize {
        (self.byte_size() / 4) as usize
    }

    pub fn to_wgpu(self) -> wgpu::VertexFormat {
        match self {
            AttributeFormat::Float32 => wgpu::VertexFormat::Float32,
            AttributeFormat::Float32x2 => wgpu::VertexFormat::Float32x2,
            AttributeFormat::Float32x3 => wgpu::VertexFormat::Float32x3,
            AttributeFormat::Float32x4 => wgpu::VertexFormat::Float32x4,
            AttributeFormat::Unorm8x4 => wgpu::VertexFormat::Unorm8x4,
            AttributeFormat::Uint32 => wgpu::VertexFormat::Uint32,
            AttributeFormat::Unorm16x2 => wgpu::VertexFormat::Unorm16x2,
            AttributeFormat::Unorm8x2 => wgpu::VertexFormat::Unorm8x2,
        }
    }
}

/// Identifier of the built-in position attribute.
pub const POSITION: &str = "aVertexPosition";
/// Identifier of the built-in texture coordinate attribute.
pub const TEXTURE_COORD: &str = "aTextureCoord";
/// Identifier of the built-in packed color attribute.
pub const COLOR: &str = "aColor";
/// Identifier of the built-in texture slot attribute.
pub const TEXTURE_ID: &str = "aTextureId";

/// One entry of a custom batch layout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttributeDefinition {
    /// One of the built-in attributes, by identifier.
    Builtin(String),
    /// Per-vertex data supplied by the element through
    /// [`Renderable::custom_attribute`](crate::Renderable::custom_attribute).
    Custom {
        identifier: String,
        format: AttributeFormat,
        /// Bytes per vertex the element supplies.
        source_size: u32,
    },
}

impl AttributeDefinition {
    pub fn builtin(identifier: impl Into<String>) -> Self {
        AttributeDefinition::Builtin(identifier.into())
    }

    /// A custom attribute whose source size matches its format.
    pub fn custom(identifier: impl Into<String>, format: AttributeFormat) -> Self {
        AttributeDefinition::Custom {
            identifier: identifier.into(),
            format,
            source_size: format.byte_size(),
        }
    }
}

/// Where a compiled attribute reads its value from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttributeSource {
    Position,
    TextureCoord,
    Color,
    TextureId,
    Custom,
}

/// An attribute with its resolved byte offset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledAttribute {
    pub identifier: String,
    pub source: AttributeSource,
    pub format: AttributeFormat,
    /// Byte offset within one vertex.
    pub offset: u32,
}

impl CompiledAttribute {
    /// Word offset within one vertex.
    pub fn word_offset(&self) -> usize {
        (self.offset / 4) as usize
    }
}

/// A resolved interleaved vertex layout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VertexLayout {
    attributes: Vec<CompiledAttribute>,
    stride: u32,
    standard: bool,
}

impl VertexLayout {
    /// Resolve attribute definitions into offsets.
    ///
    /// Fails on unknown built-ins, formats that are not a whole number of words,
    /// and custom attributes whose source size disagrees with their format.
    pub fn compile(definitions: &[AttributeDefinition]) -> BatchResult<Self> {
        if definitions.is_empty() {
            return Err(BatchError::EmptyVertexLayout);
        }

        let mut attributes = Vec::with_capacity(definitions.len());
        let mut offset = 0;

        for definition in definitions {
            let (identifier, source, format) = match definition {
                AttributeDefinition::Builtin(identifier) => {
                    let (source, format) = builtin(identifier)?;
                    (identifier.clone(), source, format)
                }
                AttributeDefinition::Custom {
                    identifier,
                    format,
                    source_size,
                } => {
                    let gpu_size = format.byte_size();
                    if gpu_size % 4 != 0 {
                        return Err(BatchError::AttributeSizeMisaligned {
                            identifier: identifier.clone(),
                            size: gpu_size,
                        });
                    }
                    if *source_size != gpu_size {
                        return Err(BatchError::AttributeSizeMismatch {
                            identifier: identifier.clone(),
                            source_size: *source_size,
                            gpu_size,
                        });
                    }
                    (identifier.clone(), AttributeSource::Custom, *format)
                }
            };

            attributes.push(CompiledAttribute {
                identifier,
                source,
                format,
                offset,
            });
            offset += format.byte_size();
        }

        let standard = attributes.len() == 4
            && attributes
                .iter()
                .map(|a| a.source)
                .eq(STANDARD_SOURCES.iter().copied());

        Ok(Self {
            attributes,
            stride: offset,
            standard,
        })
    }

    pub fn attributes(&self) -> &[CompiledAttribute] {
        &self.attributes
    }

    /// Bytes per vertex.
    pub fn stride(&self) -> u32 {
        self.stride
    }

    /// Words per vertex.
    pub fn stride_words(&self) -> usize {
        (self.stride / 4) as usize
    }

    /// Whether this is exactly position, uv, color, texture id.
    pub fn is_standard(&self) -> bool {
        self.standard
    }

    /// wgpu attributes, with shader locations in declaration order.
    pub fn to_wgpu_attributes(&self) -> Vec<wgpu::VertexAttribute> {
        self.attributes
            .iter()
            .enumerate()
            .map(|(location, attribute)| wgpu::VertexAttribute {
                format: attribute.format.to_wgpu(),
                offset: attribute.offset as u64,
                shader_location: location as u32,
            })
            .collect()
    }

    /// Buffer layout over attributes from [`to_wgpu_attributes`](Self::to_wgpu_attributes).
    pub fn buffer_layout<'a>(&self, attributes: &'a [wgpu::VertexAttribute]) -> wgpu::VertexBufferLayout<'a> {
        wgpu::VertexBufferLayout {
            array_stride: self.stride as u64,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes,
        }
    }
}

impl Default for VertexLayout {
    /// Position, uv, packed color and texture slot: 24 bytes.
    fn default() -> Self {
        let mut offset = 0;
        let attributes = STANDARD_SOURCES
            .iter()
            .zip([POSITION, TEXTURE_COORD, COLOR, TEXTURE_ID])
            .map(|(&source, identifier)| {
                let format = builtin_format(source);
                let attribute = CompiledAttribute {
                    identifier: identifier.to_string(),
                    source,
                    format,
                    offset,
                };
                offset += format.byte_size();
                attribute
            })
            .collect();

        Self {
            attributes,
            stride: offset,
            standard: true,
        }
    }
}

const STANDARD_SOURCES: [AttributeSource; 4] = [
    AttributeSource::Position,
    AttributeSource::TextureCoord,
    AttributeSource::Color,
    AttributeSource::TextureId,
];

fn builtin_format(source: AttributeSource) -> AttributeFormat {
    match source {
        AttributeSource::Position | AttributeSource::TextureCoord => AttributeFormat::Float32x2,
        AttributeSource::Color => AttributeFormat::Unorm8x4,
        AttributeSource::TextureId => AttributeFormat::Float32,
        AttributeSource::Custom => AttributeFormat::Float32,
    }
}

fn builtin(identifier: &str) -> BatchResult<(AttributeSource, AttributeFormat)> {
    let source = match identifier {
        POSITION => AttributeSource::Position,
        TEXTURE_COORD => AttributeSource::TextureCoord,
        COLOR => AttributeSource::Color,
        TEXTURE_ID => AttributeSource::TextureId,
        _ => {
            return Err(BatchError::UnknownBuiltinAttribute {
                identifier: identifier.to_string(),
            });
        }
    };
    Ok((source, builtin_format(source)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn standard_definitions() -> Vec<AttributeDefinition> {
        [POSITION, TEXTURE_COORD, COLOR, TEXTURE_ID]
            .into_iter()
            .map(AttributeDefinition::builtin)
            .collect()
    }

    #[test]
    fn test_default_layout() {
        let layout = VertexLayout::default();
        assert_eq!(layout.stride(), 24);
        assert_eq!(layout.stride_words(), 6);
        assert!(layout.is_standard());
        let offsets: Vec<u32> = layout.attributes().iter().map(|a| a.offset).collect();
        assert_eq!(offsets, vec![0, 8, 16, 20]);
    }

    #[test]
    fn test_compiled_builtins_match_default() {
        let layout = VertexLayout::compile(&standard_definitions()).unwrap();
        assert_eq!(layout, VertexLayout::default());
    }

    #[test]
    fn test_custom_attribute_appended() {
        let mut definitions = standard_definitions();
        definitions.push(AttributeDefinition::custom("aFrame", AttributeFormat::Float32x4));
        let layout = VertexLayout::compile(&definitions).unwrap();

        assert_eq!(layout.stride(), 40);
        assert!(!layout.is_standard());
        let frame = &layout.attributes()[4];
        assert_eq!(frame.source, AttributeSource::Custom);
        assert_eq!(frame.offset, 24);
        assert_eq!(frame.word_offset(), 6);
    }

    #[test]
    fn test_unknown_builtin() {
        let result = VertexLayout::compile(&[AttributeDefinition::builtin("aNormal")]);
        assert_eq!(
            result,
            Err(BatchError::UnknownBuiltinAttribute {
                identifier: "aNormal".to_string()
            })
        );
    }

    #[test]
    fn test_misaligned_custom() {
        let result = VertexLayout::compile(&[AttributeDefinition::custom(
            "aSmall",
            AttributeFormat::Unorm8x2,
        )]);
        assert_eq!(
            result,
            Err(BatchError::AttributeSizeMisaligned {
                identifier: "aSmall".to_string(),
                size: 2
            })
        );
    }

    #[test]
    fn test_source_size_mismatch() {
        let result = VertexLayout::compile(&[AttributeDefinition::Custom {
            identifier: "aFrame".to_string(),
            format: AttributeFormat::Float32x4,
            source_size: 8,
        }]);
        assert!(matches!(
            result,
            Err(BatchError::AttributeSizeMismatch {
                source_size: 8,
                gpu_size: 16,
                ..
            })
        ));
    }

    #[test]
    fn test_empty_layout() {
        assert_eq!(VertexLayout::compile(&[]), Err(BatchError::EmptyVertexLayout));
    }

    #[test]
    fn test_wgpu_attributes() {
        let attributes = VertexLayout::default().to_wgpu_attributes();
        assert_eq!(attributes.len(), 4);
        assert_eq!(attributes[2].format, wgpu::VertexFormat::Unorm8x4);
        assert_eq!(attributes[2].offset, 16);
        assert_eq!(attributes[3].shader_location, 3);
    }
}
