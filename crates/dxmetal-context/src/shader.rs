//! Shader registry.
//!
//! Shaders are registered from parsed bytecode and referenced by id.
//! Each shader keeps weak back-references to the cached pipelines built
//! from it, so destroying a shader can evict exactly those pipelines.

use crate::pipeline::Pipeline;
use dxmetal_dxbc::{MtlxStage, ShaderReflection};
use dxmetal_metal::FunctionHandle;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::{Rc, Weak};

/// Opaque identifier of a registered shader.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ShaderId(pub(crate) u64);

/// The pipeline stage a shader executes in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderStage {
    /// Vertex shader.
    Vertex,
    /// Fragment (pixel) shader.
    Fragment,
    /// Compute shader.
    Compute,
}

impl From<MtlxStage> for ShaderStage {
    fn from(stage: MtlxStage) -> ShaderStage {
        match stage {
            MtlxStage::Vertex => ShaderStage::Vertex,
            MtlxStage::Fragment => ShaderStage::Fragment,
            MtlxStage::Compute => ShaderStage::Compute,
        }
    }
}

impl ShaderStage {
    /// The MSL entry point name the cross-compiler emits for this stage.
    pub fn entry_point(self) -> &'static str {
        match self {
            ShaderStage::Vertex => "vs_main",
            ShaderStage::Fragment => "ps_main",
            ShaderStage::Compute => "cs_main",
        }
    }
}

/// A registered shader: its compiled function, its reflection, and the
/// cached pipelines currently built from it.
pub struct Shader {
    id: ShaderId,
    stage: ShaderStage,
    function: FunctionHandle,
    reflection: ShaderReflection,
    attached_pipelines: RefCell<Vec<Weak<Pipeline>>>,
}

impl Shader {
    /// The shader's id.
    pub fn id(&self) -> ShaderId {
        self.id
    }

    /// The stage this shader executes in.
    pub fn stage(&self) -> ShaderStage {
        self.stage
    }

    /// The compiled function.
    pub fn function(&self) -> &FunctionHandle {
        &self.function
    }

    /// The shader's reflection. Immutable after registration.
    pub fn reflection(&self) -> &ShaderReflection {
        &self.reflection
    }

    /// Number of live pipelines attached to this shader.
    pub fn attached_pipeline_count(&self) -> usize {
        self.attached_pipelines
            .borrow()
            .iter()
            .filter(|weak| weak.strong_count() > 0)
            .count()
    }

    pub(crate) fn attach(&self, pipeline: &Rc<Pipeline>) {
        self.attached_pipelines.borrow_mut().push(Rc::downgrade(pipeline));
    }

    pub(crate) fn detach(&self, pipeline: &Rc<Pipeline>) {
        self.attached_pipelines
            .borrow_mut()
            .retain(|weak| match weak.upgrade() {
                Some(attached) => !Rc::ptr_eq(&attached, pipeline),
                None => false,
            });
    }

    pub(crate) fn take_attached(&self) -> Vec<Rc<Pipeline>> {
        self.attached_pipelines
            .borrow_mut()
            .drain(..)
            .filter_map(|weak| weak.upgrade())
            .collect()
    }
}

/// Id-keyed shader storage.
#[derive(Default)]
pub struct ShaderRegistry {
    next_id: u64,
    shaders: HashMap<ShaderId, Rc<Shader>>,
}

impl ShaderRegistry {
    /// Creates an empty registry.
    pub fn new() -> ShaderRegistry {
        ShaderRegistry::default()
    }

    /// Registers a shader and returns its id.
    pub fn register(&mut self, function: FunctionHandle, reflection: ShaderReflection) -> ShaderId {
        self.next_id += 1;
        let id = ShaderId(self.next_id);
        let shader = Rc::new(Shader {
            id,
            stage: reflection.stage().into(),
            function,
            reflection,
            attached_pipelines: RefCell::new(Vec::new()),
        });
        self.shaders.insert(id, shader);
        id
    }

    /// Looks up a shader.
    pub fn get(&self, id: ShaderId) -> Option<&Rc<Shader>> {
        self.shaders.get(&id)
    }

    /// Removes a shader, returning it for pipeline detachment.
    pub fn remove(&mut self, id: ShaderId) -> Option<Rc<Shader>> {
        self.shaders.remove(&id)
    }

    /// Number of registered shaders.
    pub fn len(&self) -> usize {
        self.shaders.len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.shaders.is_empty()
    }
}
