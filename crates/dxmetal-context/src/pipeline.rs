//! Pipeline state cache.
//!
//! Render and compute pipelines are keyed by a structural
//! [`PipelineConfiguration`]; a hit returns the cached pipeline without
//! touching the backend compiler. On every miss the backend's reflection
//! of the freshly compiled pipeline is cross-checked against the source
//! shader's own reflection, so cross-compiler drift surfaces at compile
//! time instead of as silently wrong bindings.

use crate::error::PipelineError;
use crate::shader::{Shader, ShaderId, ShaderRegistry};
use crate::state::UAV_BUFFER_BASE;
use dxmetal_dxbc::{RdefInputType, ShaderReflection, VERTEX_BUFFER_PREFIX};
use dxmetal_metal::{
    ArgumentKind, ComputePipelineDescriptor, ComputePipelineHandle, MtlDevice, PipelineArgument,
    PipelineReflection, PixelFormat, RenderPipelineColorAttachment, RenderPipelineDescriptor,
    RenderPipelineHandle, StructMember, VertexDescriptor, MAX_COLOR_ATTACHMENTS,
};
use std::collections::HashMap;
use std::rc::Rc;
use std::sync::Arc;
use tracing::{debug, error};

/// Structural cache key for a pipeline.
///
/// Two configurations that compare equal compile to identical backend
/// pipelines, so equality keys the cache directly.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct PipelineConfiguration {
    /// Vertex shader; required for render pipelines.
    pub vertex_shader: Option<ShaderId>,
    /// Fragment shader; `None` for depth-only rendering.
    pub fragment_shader: Option<ShaderId>,
    /// Compute shader; when set, the other stages must be `None`.
    pub compute_shader: Option<ShaderId>,
    /// Vertex fetch layout.
    pub vertex_descriptor: Option<VertexDescriptor>,
    /// Color attachment formats and blend state.
    pub color_attachments: [RenderPipelineColorAttachment; MAX_COLOR_ATTACHMENTS],
    /// Depth attachment format.
    pub depth_format: PixelFormat,
    /// Stencil attachment format.
    pub stencil_format: PixelFormat,
    /// Multisample count.
    pub sample_count: usize,
}

impl PipelineConfiguration {
    /// The shader ids this configuration references, in stage order.
    pub fn shader_ids(&self) -> impl Iterator<Item = ShaderId> + '_ {
        [self.vertex_shader, self.fragment_shader, self.compute_shader]
            .into_iter()
            .flatten()
    }
}

/// The compiled backend object of a pipeline.
pub enum PipelineState {
    /// A render pipeline.
    Render(RenderPipelineHandle),
    /// A compute pipeline.
    Compute(ComputePipelineHandle),
}

/// A compiled, validated pipeline.
pub struct Pipeline {
    config: PipelineConfiguration,
    state: PipelineState,
    reflection: PipelineReflection,
}

impl Pipeline {
    /// The configuration this pipeline was compiled from.
    pub fn config(&self) -> &PipelineConfiguration {
        &self.config
    }

    /// The backend pipeline object.
    pub fn state(&self) -> &PipelineState {
        &self.state
    }

    /// The render pipeline handle, or `None` for compute pipelines.
    pub fn render_state(&self) -> Option<&RenderPipelineHandle> {
        match &self.state {
            PipelineState::Render(state) => Some(state),
            PipelineState::Compute(_) => None,
        }
    }

    /// The compute pipeline handle, or `None` for render pipelines.
    pub fn compute_state(&self) -> Option<&ComputePipelineHandle> {
        match &self.state {
            PipelineState::Render(_) => None,
            PipelineState::Compute(state) => Some(state),
        }
    }

    /// The backend's reflection of the compiled pipeline.
    pub fn reflection(&self) -> &PipelineReflection {
        &self.reflection
    }
}

/// Configuration-keyed pipeline storage.
#[derive(Default)]
pub struct PipelineCache {
    pipelines: HashMap<PipelineConfiguration, Rc<Pipeline>>,
    hits: u64,
    misses: u64,
}

impl PipelineCache {
    /// Creates an empty cache.
    pub fn new() -> PipelineCache {
        PipelineCache::default()
    }

    /// Returns the pipeline for `config`, compiling it on a miss.
    ///
    /// A miss compiles through `device`, cross-validates the backend's
    /// reflection against each constituent shader's reflection, and
    /// attaches the pipeline to those shaders for later eviction.
    pub fn allocate(
        &mut self,
        device: &dyn MtlDevice,
        registry: &ShaderRegistry,
        config: &PipelineConfiguration,
    ) -> Result<Rc<Pipeline>, PipelineError> {
        if let Some(pipeline) = self.pipelines.get(config) {
            self.hits += 1;
            return Ok(Rc::clone(pipeline));
        }
        self.misses += 1;

        let pipeline = Rc::new(self.compile(device, registry, config)?);
        for id in config.shader_ids() {
            if let Some(shader) = registry.get(id) {
                shader.attach(&pipeline);
            }
        }
        self.pipelines.insert(config.clone(), Rc::clone(&pipeline));
        debug!(cached = self.pipelines.len(), "compiled pipeline");
        Ok(pipeline)
    }

    fn compile(
        &self,
        device: &dyn MtlDevice,
        registry: &ShaderRegistry,
        config: &PipelineConfiguration,
    ) -> Result<Pipeline, PipelineError> {
        if let Some(cs_id) = config.compute_shader {
            let shader = registry
                .get(cs_id)
                .ok_or(PipelineError::MissingShader(cs_id))?;
            let desc = ComputePipelineDescriptor {
                label: format!("cs#{}", cs_id.0),
                compute_function: Some(Arc::clone(shader.function())),
            };
            let (state, reflection) = device.new_compute_pipeline(&desc)?;
            validate_stage_arguments("compute", &reflection.vertex_arguments, shader.reflection())?;
            return Ok(Pipeline {
                config: config.clone(),
                state: PipelineState::Compute(state),
                reflection,
            });
        }

        let vs_id = config.vertex_shader.ok_or(PipelineError::EmptyConfiguration)?;
        let vs = registry
            .get(vs_id)
            .ok_or(PipelineError::MissingShader(vs_id))?;
        let fs = match config.fragment_shader {
            Some(id) => Some(registry.get(id).ok_or(PipelineError::MissingShader(id))?),
            None => None,
        };

        let desc = RenderPipelineDescriptor {
            label: render_pipeline_label(config),
            vertex_function: Some(Arc::clone(vs.function())),
            fragment_function: fs.map(|s| Arc::clone(s.function())),
            vertex_descriptor: config.vertex_descriptor.clone(),
            color_attachments: config.color_attachments.clone(),
            depth_attachment_format: config.depth_format,
            stencil_attachment_format: config.stencil_format,
            sample_count: config.sample_count.max(1),
        };
        let (state, reflection) = device.new_render_pipeline(&desc)?;

        validate_stage_arguments("vertex", &reflection.vertex_arguments, vs.reflection())?;
        if let Some(fs) = fs {
            validate_stage_arguments("fragment", &reflection.fragment_arguments, fs.reflection())?;
        }

        Ok(Pipeline {
            config: config.clone(),
            state: PipelineState::Render(state),
            reflection,
        })
    }

    /// Drops every pipeline attached to `shader`.
    ///
    /// Called during shader destruction, after the shader has left the
    /// registry; `shader` itself is skipped when detaching.
    pub fn evict_for_shader(&mut self, shader: &Shader, registry: &ShaderRegistry) {
        for pipeline in shader.take_attached() {
            self.remove(&pipeline, Some(shader.id()), registry);
        }
    }

    /// Removes one pipeline from the cache and detaches it from its
    /// shaders, except `excluded`.
    pub fn remove(
        &mut self,
        pipeline: &Rc<Pipeline>,
        excluded: Option<ShaderId>,
        registry: &ShaderRegistry,
    ) {
        self.pipelines.remove(pipeline.config());
        for id in pipeline.config().shader_ids() {
            if Some(id) == excluded {
                continue;
            }
            if let Some(shader) = registry.get(id) {
                shader.detach(pipeline);
            }
        }
    }

    /// Number of cached pipelines.
    pub fn len(&self) -> usize {
        self.pipelines.len()
    }

    /// Whether the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.pipelines.is_empty()
    }

    /// Cache hits since creation.
    pub fn hits(&self) -> u64 {
        self.hits
    }

    /// Cache misses since creation.
    pub fn misses(&self) -> u64 {
        self.misses
    }
}

fn render_pipeline_label(config: &PipelineConfiguration) -> String {
    let vs = config.vertex_shader.map(|id| id.0).unwrap_or(0);
    let fs = config.fragment_shader.map(|id| id.0).unwrap_or(0);
    format!("vs#{vs} ps#{fs}")
}

/// Cross-checks one stage's compiled arguments against the source
/// shader's reflection.
///
/// Arguments the compiler dead-stripped (`active == false`) and the
/// vertex-fetch buffers the cross-compiler adds under
/// [`VERTEX_BUFFER_PREFIX`] are exempt; everything else must resolve to a
/// source binding at the same table index, and constant buffer members
/// must sit at the offsets the source declares.
pub fn validate_stage_arguments(
    stage: &'static str,
    arguments: &[PipelineArgument],
    source: &ShaderReflection,
) -> Result<(), PipelineError> {
    for arg in arguments.iter().filter(|a| a.active) {
        if arg.name.starts_with(VERTEX_BUFFER_PREFIX) {
            continue;
        }
        let outcome = match &arg.kind {
            ArgumentKind::ThreadgroupMemory => Ok(()),
            ArgumentKind::Buffer { members } => validate_buffer_argument(arg, members, source),
            ArgumentKind::Texture => validate_texture_argument(arg, source),
            ArgumentKind::Sampler => validate_sampler_argument(arg, source),
        };
        if let Err(detail) = outcome {
            error!(stage, argument = %arg.name, detail, "pipeline reflection mismatch");
            return Err(PipelineError::ReflectionMismatch(format!(
                "{stage} argument '{}': {detail}",
                arg.name
            )));
        }
    }
    Ok(())
}

fn validate_buffer_argument(
    arg: &PipelineArgument,
    members: &[StructMember],
    source: &ShaderReflection,
) -> Result<(), String> {
    let binding = source
        .rdef
        .find_resource(&arg.name)
        .ok_or_else(|| "no source resource binding with this name".to_owned())?;

    let expected_index = if binding.input_type.is_uav() {
        UAV_BUFFER_BASE as u32 + binding.bind_point
    } else {
        binding.bind_point
    };
    if expected_index != arg.index {
        return Err(format!(
            "bound at buffer index {} but the source register maps to index {expected_index}",
            arg.index
        ));
    }

    if binding.input_type == RdefInputType::ConstantBuffer {
        let cb = source
            .rdef
            .find_constant_buffer(&arg.name)
            .ok_or_else(|| "no source constant buffer layout with this name".to_owned())?;
        for member in members {
            // Array members reflect with an element-zero placeholder.
            let name = member.name.strip_suffix("[0]").unwrap_or(&member.name);
            let variable = cb
                .variables
                .iter()
                .find(|v| v.name == name)
                .ok_or_else(|| format!("member '{}' has no source variable", member.name))?;
            if variable.start_offset != member.offset {
                return Err(format!(
                    "member '{}' at offset {} but the source declares offset {}",
                    member.name, member.offset, variable.start_offset
                ));
            }
        }
    }
    Ok(())
}

fn validate_texture_argument(
    arg: &PipelineArgument,
    source: &ShaderReflection,
) -> Result<(), String> {
    let binding = source
        .rdef
        .find_resource(&arg.name)
        .ok_or_else(|| "no source resource binding with this name".to_owned())?;
    if binding.bind_point != arg.index {
        return Err(format!(
            "bound at texture index {} but the source declares register {}",
            arg.index, binding.bind_point
        ));
    }
    Ok(())
}

fn validate_sampler_argument(
    arg: &PipelineArgument,
    source: &ShaderReflection,
) -> Result<(), String> {
    // Combined texture/sampler names come from the backend trailer map;
    // standalone samplers from the resource bindings.
    if let Some(entry) = source.mtlx.samplers.iter().find(|s| s.name == arg.name) {
        if entry.sampler_slot != arg.index {
            return Err(format!(
                "bound at sampler index {} but the sampler map declares slot {}",
                arg.index, entry.sampler_slot
            ));
        }
        return Ok(());
    }
    let binding = source
        .rdef
        .find_resource(&arg.name)
        .ok_or_else(|| "no sampler map entry or source binding with this name".to_owned())?;
    if binding.input_type != RdefInputType::Sampler {
        return Err("source binding with this name is not a sampler".to_owned());
    }
    if binding.bind_point != arg.index {
        return Err(format!(
            "bound at sampler index {} but the source declares register {}",
            arg.index, binding.bind_point
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shader::ShaderStage;
    use dxmetal_dxbc::test_utils::{
        build_container, build_mtlx_chunk, build_rdef_chunk, CbSpec, MtlxSpec, ResSpec,
    };
    use dxmetal_dxbc::FourCC;
    use dxmetal_metal::testing::RecordingDevice;

    fn reflection_with(
        stage: u32,
        constant_buffers: &[CbSpec<'_>],
        resources: &[ResSpec<'_>],
        samplers: &[(u32, u32, &str)],
    ) -> ShaderReflection {
        let rdef = build_rdef_chunk(constant_buffers, resources);
        let mtlx = build_mtlx_chunk(&MtlxSpec {
            stage,
            threads_per_group: [8, 8, 1],
            samplers,
            input_hash: 0x1234,
            msl_source: "/* msl */",
        });
        let bytes = build_container(&[
            (FourCC(*b"RDEF"), rdef.as_slice()),
            (FourCC(*b"MTLX"), mtlx.as_slice()),
        ]);
        ShaderReflection::parse(&bytes).expect("reflection should parse")
    }

    fn register(
        registry: &mut ShaderRegistry,
        device: &RecordingDevice,
        reflection: ShaderReflection,
    ) -> ShaderId {
        let stage: ShaderStage = reflection.stage().into();
        let function = device
            .new_function(&reflection.mtlx.msl_source, stage.entry_point())
            .expect("function");
        registry.register(function, reflection)
    }

    fn render_config(vs: ShaderId, fs: Option<ShaderId>) -> PipelineConfiguration {
        PipelineConfiguration {
            vertex_shader: Some(vs),
            fragment_shader: fs,
            depth_format: PixelFormat::Depth32Float,
            sample_count: 1,
            ..PipelineConfiguration::default()
        }
    }

    #[test]
    fn cache_hit_returns_the_same_pipeline_without_recompiling() {
        let device = RecordingDevice::new();
        let mut registry = ShaderRegistry::new();
        let vs = register(&mut registry, &device, reflection_with(0, &[], &[], &[]));
        let fs = register(&mut registry, &device, reflection_with(1, &[], &[], &[]));

        let mut cache = PipelineCache::new();
        let config = render_config(vs, Some(fs));

        let first = cache.allocate(device.as_ref(), &registry, &config).expect("first");
        let second = cache.allocate(device.as_ref(), &registry, &config).expect("second");

        assert!(Rc::ptr_eq(&first, &second));
        assert_eq!(device.log().render_pipelines_compiled(), 1);
        assert_eq!(cache.hits(), 1);
        assert_eq!(cache.misses(), 1);
    }

    #[test]
    fn compilation_failure_leaves_the_cache_unchanged() {
        let device = RecordingDevice::new();
        let mut registry = ShaderRegistry::new();
        let vs = register(&mut registry, &device, reflection_with(0, &[], &[], &[]));

        let mut cache = PipelineCache::new();
        device.fail_next_pipeline("bad shader");
        let result = cache.allocate(device.as_ref(), &registry, &render_config(vs, None));

        assert!(matches!(result, Err(PipelineError::Compilation(_))));
        assert!(cache.is_empty());
        assert_eq!(
            registry.get(vs).expect("shader").attached_pipeline_count(),
            0
        );
    }

    #[test]
    fn configuration_without_shaders_is_rejected() {
        let device = RecordingDevice::new();
        let registry = ShaderRegistry::new();
        let mut cache = PipelineCache::new();

        let result = cache.allocate(device.as_ref(), &registry, &PipelineConfiguration::default());
        assert!(matches!(result, Err(PipelineError::EmptyConfiguration)));
    }

    #[test]
    fn unknown_shader_id_is_rejected() {
        let device = RecordingDevice::new();
        let registry = ShaderRegistry::new();
        let mut cache = PipelineCache::new();

        let result = cache.allocate(
            device.as_ref(),
            &registry,
            &render_config(ShaderId(99), None),
        );
        assert!(matches!(result, Err(PipelineError::MissingShader(ShaderId(99)))));
    }

    #[test]
    fn destroying_a_shader_evicts_only_its_pipelines() {
        let device = RecordingDevice::new();
        let mut registry = ShaderRegistry::new();
        let vs = register(&mut registry, &device, reflection_with(0, &[], &[], &[]));
        let fs = register(&mut registry, &device, reflection_with(1, &[], &[], &[]));

        let mut cache = PipelineCache::new();
        cache
            .allocate(device.as_ref(), &registry, &render_config(vs, Some(fs)))
            .expect("lit pipeline");
        cache
            .allocate(device.as_ref(), &registry, &render_config(vs, None))
            .expect("depth-only pipeline");
        assert_eq!(cache.len(), 2);

        let removed = registry.remove(fs).expect("fragment shader");
        cache.evict_for_shader(&removed, &registry);

        assert_eq!(cache.len(), 1);
        let vs_shader = registry.get(vs).expect("vertex shader");
        assert_eq!(vs_shader.attached_pipeline_count(), 1);

        // The evicted configuration compiles fresh if requested again.
        let fs2 = register(&mut registry, &device, reflection_with(1, &[], &[], &[]));
        cache
            .allocate(device.as_ref(), &registry, &render_config(vs, Some(fs2)))
            .expect("recompiled pipeline");
        assert_eq!(device.log().render_pipelines_compiled(), 3);
    }

    #[test]
    fn compute_configuration_compiles_a_compute_pipeline() {
        let device = RecordingDevice::new();
        let mut registry = ShaderRegistry::new();
        let cs = register(&mut registry, &device, reflection_with(2, &[], &[], &[]));

        let mut cache = PipelineCache::new();
        let config = PipelineConfiguration {
            compute_shader: Some(cs),
            ..PipelineConfiguration::default()
        };
        let pipeline = cache
            .allocate(device.as_ref(), &registry, &config)
            .expect("compute pipeline");

        assert!(pipeline.compute_state().is_some());
        assert!(pipeline.render_state().is_none());
        assert_eq!(device.log().compute_pipelines_compiled(), 1);
    }

    #[test]
    fn matching_reflection_passes_validation() {
        let device = RecordingDevice::new();
        let mut registry = ShaderRegistry::new();
        let reflection = reflection_with(
            0,
            &[CbSpec {
                name: "PerDraw",
                size: 64,
                variables: &[("world", 0, 48), ("tint", 48, 16)],
            }],
            &[
                ResSpec { name: "PerDraw", input_type: 0, bind_point: 2, bind_count: 1 },
                ResSpec { name: "heightMap", input_type: 2, bind_point: 1, bind_count: 1 },
            ],
            &[(1, 0, "heightMap_linearSampler")],
        );
        let vs = register(&mut registry, &device, reflection);

        device.set_next_reflection(PipelineReflection {
            vertex_arguments: vec![
                PipelineArgument {
                    name: "PerDraw".to_owned(),
                    index: 2,
                    active: true,
                    kind: ArgumentKind::Buffer {
                        members: vec![
                            StructMember { name: "world".to_owned(), offset: 0 },
                            StructMember { name: "tint".to_owned(), offset: 48 },
                        ],
                    },
                },
                PipelineArgument {
                    name: "heightMap".to_owned(),
                    index: 1,
                    active: true,
                    kind: ArgumentKind::Texture,
                },
                PipelineArgument {
                    name: "heightMap_linearSampler".to_owned(),
                    index: 0,
                    active: true,
                    kind: ArgumentKind::Sampler,
                },
            ],
            fragment_arguments: Vec::new(),
        });

        let mut cache = PipelineCache::new();
        cache
            .allocate(device.as_ref(), &registry, &render_config(vs, None))
            .expect("validated pipeline");
    }

    #[test]
    fn member_offset_drift_fails_validation() {
        let device = RecordingDevice::new();
        let mut registry = ShaderRegistry::new();
        let reflection = reflection_with(
            0,
            &[CbSpec {
                name: "PerDraw",
                size: 32,
                variables: &[("color", 16, 16)],
            }],
            &[ResSpec { name: "PerDraw", input_type: 0, bind_point: 0, bind_count: 1 }],
            &[],
        );
        let vs = register(&mut registry, &device, reflection);

        device.set_next_reflection(PipelineReflection {
            vertex_arguments: vec![PipelineArgument {
                name: "PerDraw".to_owned(),
                index: 0,
                active: true,
                kind: ArgumentKind::Buffer {
                    members: vec![StructMember { name: "color".to_owned(), offset: 32 }],
                },
            }],
            fragment_arguments: Vec::new(),
        });

        let mut cache = PipelineCache::new();
        let result = cache.allocate(device.as_ref(), &registry, &render_config(vs, None));
        assert!(matches!(result, Err(PipelineError::ReflectionMismatch(_))));
        assert!(cache.is_empty());
    }

    #[test]
    fn uav_buffers_validate_against_the_shifted_table_index() {
        let device = RecordingDevice::new();
        let mut registry = ShaderRegistry::new();
        let reflection = reflection_with(
            2,
            &[],
            // input_type 6 = read/write structured UAV at register 1.
            &[ResSpec { name: "particles", input_type: 6, bind_point: 1, bind_count: 1 }],
            &[],
        );
        let cs = register(&mut registry, &device, reflection);

        device.set_next_reflection(PipelineReflection {
            vertex_arguments: vec![PipelineArgument {
                name: "particles".to_owned(),
                index: UAV_BUFFER_BASE as u32 + 1,
                active: true,
                kind: ArgumentKind::Buffer { members: Vec::new() },
            }],
            fragment_arguments: Vec::new(),
        });

        let mut cache = PipelineCache::new();
        let config = PipelineConfiguration {
            compute_shader: Some(cs),
            ..PipelineConfiguration::default()
        };
        cache
            .allocate(device.as_ref(), &registry, &config)
            .expect("uav pipeline");
    }

    #[test]
    fn inactive_and_vertex_fetch_arguments_are_exempt() {
        let device = RecordingDevice::new();
        let mut registry = ShaderRegistry::new();
        let vs = register(&mut registry, &device, reflection_with(0, &[], &[], &[]));

        device.set_next_reflection(PipelineReflection {
            vertex_arguments: vec![
                // Dead-stripped argument with no source counterpart.
                PipelineArgument {
                    name: "debugOverlay".to_owned(),
                    index: 5,
                    active: false,
                    kind: ArgumentKind::Texture,
                },
                // Vertex fetch buffer the cross-compiler injects.
                PipelineArgument {
                    name: "vertexBuffer.position".to_owned(),
                    index: 30,
                    active: true,
                    kind: ArgumentKind::Buffer { members: Vec::new() },
                },
            ],
            fragment_arguments: Vec::new(),
        });

        let mut cache = PipelineCache::new();
        cache
            .allocate(device.as_ref(), &registry, &render_config(vs, None))
            .expect("exempt arguments should not fail validation");
    }

    #[test]
    fn unmatched_texture_argument_fails_validation() {
        let device = RecordingDevice::new();
        let mut registry = ShaderRegistry::new();
        let vs = register(&mut registry, &device, reflection_with(0, &[], &[], &[]));

        device.set_next_reflection(PipelineReflection {
            vertex_arguments: vec![PipelineArgument {
                name: "shadowMap".to_owned(),
                index: 0,
                active: true,
                kind: ArgumentKind::Texture,
            }],
            fragment_arguments: Vec::new(),
        });

        let mut cache = PipelineCache::new();
        let result = cache.allocate(device.as_ref(), &registry, &render_config(vs, None));
        assert!(matches!(result, Err(PipelineError::ReflectionMismatch(_))));
    }
}
