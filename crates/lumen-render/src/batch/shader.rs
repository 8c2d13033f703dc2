//! Multi-texture shader generation and the branch-limit probe.

use std::fmt::Write;

use tracing::debug;

use crate::backend::RenderBackend;

/// Default vertex stage.
pub const DEFAULT_VERTEX_SOURCE: &str = include_str!("../shaders/batch_vertex.wgsl");

/// Default fragment template.
///
/// `%count%` is replaced with the texture count, `%bindings%` with the texture
/// declarations and `%forloop%` with the sampling chain.
pub const DEFAULT_FRAGMENT_TEMPLATE: &str = include_str!("../shaders/batch_fragment.wgsl");

/// Generated shader sources for a fixed texture count.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchProgram {
    pub vertex_source: String,
    /// Appended to the vertex source to form one module.
    pub fragment_source: String,
    pub max_textures: u32,
}

impl BatchProgram {
    /// Vertex and fragment stages as one module.
    pub fn module_source(&self) -> String {
        format!("{}\n{}", self.vertex_source, self.fragment_source)
    }
}

/// Fills a fragment template for a given texture count.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShaderGenerator {
    vertex_source: String,
    fragment_template: String,
}

impl ShaderGenerator {
    pub fn new(vertex_source: impl Into<String>, fragment_template: impl Into<String>) -> Self {
        Self {
            vertex_source: vertex_source.into(),
            fragment_template: fragment_template.into(),
        }
    }

    pub fn generate(&self, max_textures: u32) -> BatchProgram {
        let max_textures = max_textures.max(1);
        let fragment_source = self
            .fragment_template
            .replace("%count%", &max_textures.to_string())
            .replace("%bindings%", &generate_bindings(max_textures))
            .replace("%forloop%", &generate_sample_source(max_textures));

        BatchProgram {
            vertex_source: self.vertex_source.clone(),
            fragment_source,
            max_textures,
        }
    }
}

impl Default for ShaderGenerator {
    fn default() -> Self {
        Self::new(DEFAULT_VERTEX_SOURCE, DEFAULT_FRAGMENT_TEMPLATE)
    }
}

/// One `texture_2d` per slot, at bindings `1..=max_textures` of group 0.
fn generate_bindings(max_textures: u32) -> String {
    let mut src = String::new();
    for i in 0..max_textures {
        let _ = writeln!(
            src,
            "@group(0) @binding({}) var batch_texture_{}: texture_2d<f32>;",
            i + 1,
            i
        );
    }
    src
}

/// An if-else chain picking the texture for `in.texture_id`.
///
/// `textureSampleLevel` is used because the branches are not uniform control flow.
fn generate_sample_source(max_textures: u32) -> String {
    let mut src = String::new();
    for i in 0..max_textures {
        if i > 0 {
            src.push_str("\n    else ");
        }
        if i < max_textures - 1 {
            let _ = write!(src, "if (in.texture_id < {}.5) ", i);
        }
        let _ = write!(
            src,
            "{{ color = textureSampleLevel(batch_texture_{}, batch_sampler, in.uv, 0.0); }}",
            i
        );
    }
    src
}

/// A fragment module with a chain of `max_ifs` branches.
pub fn generate_probe_source(max_ifs: u32) -> String {
    let mut chain = String::new();
    for i in 0..max_ifs {
        if i > 0 {
            chain.push_str("\n    else ");
        }
        if i < max_ifs - 1 {
            let _ = write!(chain, "if (test == {}.0) ", i);
        }
        chain.push_str("{}");
    }

    format!(
        "@fragment\nfn fs_probe() -> @location(0) vec4<f32> {{\n    let test: f32 = 0.1;\n    {}\n    return vec4<f32>(0.0);\n}}\n",
        chain
    )
}

/// Largest branch count up to `max_ifs` the backend compiles.
///
/// Some drivers reject long if-else chains without saying why, so the count is
/// halved until a probe compiles. Never returns less than 1.
pub fn check_max_if_statements(max_ifs: u32, backend: &dyn RenderBackend) -> u32 {
    let mut max_ifs = max_ifs.max(1);
    loop {
        if backend.compile_probe(&generate_probe_source(max_ifs)) {
            return max_ifs;
        }
        if max_ifs == 1 {
            debug!("Probe shader failed with a single branch, using 1 texture");
            return 1;
        }
        debug!("Probe shader with {} branches failed, halving", max_ifs);
        max_ifs /= 2;
    }
}
