//! Pipeline manager
//!
//! Resolves shader files against a list of root directories, parses and
//! validates them with naga, and creates raster pipelines on a backend.
//! Every failure carries a message meant to be shown to the user as is.

use crate::backend::traits::*;
use crate::backend::types::*;
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ShaderError {
    #[error("shader '{path}' not found in any root path ({})", display_paths(.searched))]
    NotFound { path: PathBuf, searched: Vec<PathBuf> },
    #[error("failed to read shader '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse '{path}':\n{message}")]
    Parse { path: PathBuf, message: String },
    #[error("'{path}' failed validation:\n{message}")]
    Validation { path: PathBuf, message: String },
    #[error("'{path}' has no {stage:?} entry point named '{entry_point}'")]
    MissingEntryPoint {
        path: PathBuf,
        entry_point: String,
        stage: naga::ShaderStage,
    },
    #[error("pipeline '{name}': {source}")]
    Backend {
        name: String,
        #[source]
        source: BackendError,
    },
}

fn display_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Pipeline manager creation options
#[derive(Debug, Clone)]
pub struct PipelineManagerInfo {
    /// Directories searched, in order, for relative shader paths
    pub root_paths: Vec<PathBuf>,
    /// Log the entry points and bindings of every compiled module
    pub default_enable_debug_info: bool,
    pub name: String,
}

impl Default for PipelineManagerInfo {
    fn default() -> Self {
        Self {
            root_paths: vec![PathBuf::from("shaders")],
            default_enable_debug_info: cfg!(debug_assertions),
            name: "pipeline manager".to_string(),
        }
    }
}

/// A shader file and the entry point to use from it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShaderFile {
    pub path: PathBuf,
    pub entry_point: String,
}

impl ShaderFile {
    pub fn new(path: impl Into<PathBuf>, entry_point: &str) -> Self {
        Self {
            path: path.into(),
            entry_point: entry_point.to_string(),
        }
    }
}

/// Raster pipeline creation options
#[derive(Debug, Clone)]
pub struct RasterPipelineInfo {
    pub vertex_shader: ShaderFile,
    pub fragment_shader: ShaderFile,
    pub color_attachments: Vec<TextureFormat>,
    /// Bytes of push constants visible to the vertex stage
    pub push_constant_size: u32,
    pub name: String,
}

/// A compiled raster pipeline
pub struct RasterPipeline {
    name: String,
    handle: RenderPipelineHandle,
    color_formats: Vec<TextureFormat>,
    push_constant_size: u32,
}

impl RasterPipeline {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn handle(&self) -> RenderPipelineHandle {
        self.handle
    }

    pub fn color_formats(&self) -> &[TextureFormat] {
        &self.color_formats
    }

    pub fn push_constant_size(&self) -> u32 {
        self.push_constant_size
    }
}

impl fmt::Debug for RasterPipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RasterPipeline")
            .field("name", &self.name)
            .field("handle", &self.handle)
            .finish()
    }
}

/// Source of a shader file that parsed and validated
struct CompiledShader {
    path: PathBuf,
    source: String,
    module: naga::Module,
}

/// Compiles shaders and owns the raster pipelines created from them
pub struct PipelineManager {
    info: PipelineManagerInfo,
    pipelines: Vec<Arc<RasterPipeline>>,
}

impl PipelineManager {
    pub fn new(info: PipelineManagerInfo) -> Self {
        log::debug!(
            "{}: shader roots [{}]",
            info.name,
            display_paths(&info.root_paths)
        );
        Self {
            info,
            pipelines: Vec::new(),
        }
    }

    pub fn info(&self) -> &PipelineManagerInfo {
        &self.info
    }

    pub fn pipelines(&self) -> &[Arc<RasterPipeline>] {
        &self.pipelines
    }

    /// Pipeline previously created under `name`
    pub fn pipeline(&self, name: &str) -> Option<Arc<RasterPipeline>> {
        self.pipelines.iter().find(|p| p.name == name).cloned()
    }

    /// Find `path` under the root paths
    pub fn resolve(&self, path: &Path) -> Result<PathBuf, ShaderError> {
        if path.is_absolute() {
            if path.is_file() {
                return Ok(path.to_path_buf());
            }
            return Err(ShaderError::NotFound {
                path: path.to_path_buf(),
                searched: Vec::new(),
            });
        }

        self.info
            .root_paths
            .iter()
            .map(|root| root.join(path))
            .find(|candidate| candidate.is_file())
            .ok_or_else(|| ShaderError::NotFound {
                path: path.to_path_buf(),
                searched: self.info.root_paths.clone(),
            })
    }

    /// Compile both stages and create the pipeline on `backend`
    pub fn add_raster_pipeline(
        &mut self,
        backend: &mut dyn GraphicsBackend,
        info: RasterPipelineInfo,
    ) -> Result<Arc<RasterPipeline>, ShaderError> {
        let mut cache: HashMap<PathBuf, CompiledShader> = HashMap::new();

        let vertex = self.compile_stage(&mut cache, &info.vertex_shader, naga::ShaderStage::Vertex)?;
        let fragment =
            self.compile_stage(&mut cache, &info.fragment_shader, naga::ShaderStage::Fragment)?;

        let desc = RenderPipelineDescriptor {
            label: Some(info.name.clone()),
            vertex,
            fragment,
            color_targets: info
                .color_attachments
                .iter()
                .map(|&format| ColorTargetState { format })
                .collect(),
            primitive_topology: PrimitiveTopology::TriangleList,
            front_face: FrontFace::Ccw,
            cull_mode: CullMode::None,
            push_constant_size: info.push_constant_size,
        };

        let handle = backend
            .create_render_pipeline(&desc)
            .map_err(|source| ShaderError::Backend {
                name: info.name.clone(),
                source,
            })?;

        log::info!("{}: created raster pipeline '{}'", self.info.name, info.name);

        let pipeline = Arc::new(RasterPipeline {
            name: info.name,
            handle,
            color_formats: info.color_attachments,
            push_constant_size: info.push_constant_size,
        });
        self.pipelines.push(Arc::clone(&pipeline));
        Ok(pipeline)
    }

    fn compile_stage(
        &self,
        cache: &mut HashMap<PathBuf, CompiledShader>,
        file: &ShaderFile,
        stage: naga::ShaderStage,
    ) -> Result<ShaderStageSource, ShaderError> {
        let path = self.resolve(&file.path)?;
        if !cache.contains_key(&path) {
            let compiled = self.compile_file(&path)?;
            cache.insert(path.clone(), compiled);
        }
        let Some(shader) = cache.get(&path) else {
            return Err(ShaderError::NotFound {
                path,
                searched: self.info.root_paths.clone(),
            });
        };

        let found = shader
            .module
            .entry_points
            .iter()
            .any(|ep| ep.name == file.entry_point && ep.stage == stage);
        if !found {
            return Err(ShaderError::MissingEntryPoint {
                path: shader.path.clone(),
                entry_point: file.entry_point.clone(),
                stage,
            });
        }

        Ok(ShaderStageSource {
            source: shader.source.clone(),
            entry_point: file.entry_point.clone(),
        })
    }

    fn compile_file(&self, path: &Path) -> Result<CompiledShader, ShaderError> {
        let source = std::fs::read_to_string(path).map_err(|source| ShaderError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let module = naga::front::wgsl::parse_str(&source).map_err(|e| ShaderError::Parse {
            path: path.to_path_buf(),
            message: e.emit_to_string(&source),
        })?;

        let mut validator = naga::valid::Validator::new(
            naga::valid::ValidationFlags::all(),
            naga::valid::Capabilities::all(),
        );
        validator
            .validate(&module)
            .map_err(|e| ShaderError::Validation {
                path: path.to_path_buf(),
                message: e.emit_to_string(&source),
            })?;

        if self.info.default_enable_debug_info {
            for ep in &module.entry_points {
                log::debug!("{}: {:?} entry point '{}'", path.display(), ep.stage, ep.name);
            }
            log::debug!(
                "{}: {} global variables",
                path.display(),
                module.global_variables.len()
            );
        }

        Ok(CompiledShader {
            path: path.to_path_buf(),
            source,
            module,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::headless::HeadlessBackend;

    fn shader_root() -> PathBuf {
        PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("shaders")
    }

    fn manager_with(roots: Vec<PathBuf>) -> PipelineManager {
        PipelineManager::new(PipelineManagerInfo {
            root_paths: roots,
            default_enable_debug_info: true,
            name: "test manager".to_string(),
        })
    }

    fn triangle_info(vs: &str, fs: &str) -> RasterPipelineInfo {
        RasterPipelineInfo {
            vertex_shader: ShaderFile::new("main.wgsl", vs),
            fragment_shader: ShaderFile::new("main.wgsl", fs),
            color_attachments: vec![TextureFormat::Rgba8Unorm],
            push_constant_size: std::mem::size_of::<PushConstant>() as u32,
            name: "my pipeline".to_string(),
        }
    }

    #[test]
    fn bundled_shader_compiles() {
        let mut backend = HeadlessBackend::new(640, 480);
        let mut manager = manager_with(vec![shader_root()]);
        let pipeline = manager
            .add_raster_pipeline(&mut backend, triangle_info("vs_main", "fs_main"))
            .unwrap();
        assert_eq!(pipeline.name(), "my pipeline");
        assert_eq!(pipeline.push_constant_size(), 8);
        assert!(manager.pipeline("my pipeline").is_some());
        assert_eq!(backend.pipeline_count(), 1);
    }

    #[test]
    fn vertex_stage_reads_the_push_constant() {
        let manager = manager_with(vec![shader_root()]);
        let path = manager.resolve(Path::new("main.wgsl")).unwrap();
        let compiled = manager.compile_file(&path).unwrap();
        let module = &compiled.module;
        let vs_main = module
            .entry_points
            .iter()
            .find(|ep| ep.name == "vs_main")
            .unwrap();

        let reads_push_constant = vs_main.function.expressions.iter().any(|(_, expr)| {
            matches!(expr, naga::Expression::GlobalVariable(var)
                if module.global_variables[*var].space == naga::AddressSpace::PushConstant)
        });
        assert!(reads_push_constant);
    }

    #[test]
    fn later_roots_are_searched() {
        let manager = manager_with(vec![PathBuf::from("/definitely/missing"), shader_root()]);
        let resolved = manager.resolve(Path::new("main.wgsl")).unwrap();
        assert!(resolved.starts_with(shader_root()));
    }

    #[test]
    fn missing_file_lists_roots() {
        let manager = manager_with(vec![PathBuf::from("/definitely/missing")]);
        let err = manager.resolve(Path::new("main.wgsl")).unwrap_err();
        let message = err.to_string();
        assert!(message.contains("main.wgsl"));
        assert!(message.contains("/definitely/missing"));
    }

    #[test]
    fn missing_entry_point_is_reported() {
        let mut backend = HeadlessBackend::new(640, 480);
        let mut manager = manager_with(vec![shader_root()]);
        let err = manager
            .add_raster_pipeline(&mut backend, triangle_info("vs_main", "no_such_fs"))
            .unwrap_err();
        assert!(matches!(err, ShaderError::MissingEntryPoint { .. }));
        assert!(manager.pipelines().is_empty());
        assert_eq!(backend.pipeline_count(), 0);
    }
}
