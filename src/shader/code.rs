//! Shader code: the sources (or binary) of one pipeline stage and the GL
//! shader objects compiled from them.

use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};

use super::{binary_sub_path, include, ShaderStage};
use crate::asset::AssetResolver;
use crate::debug::{debug_code, numbered_source};
use crate::error::{Error, Result};
use crate::gpu::Gpu;

static NEXT_ID: AtomicU32 = AtomicU32::new(1);

/// A precompiled shader blob and its vendor format tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShaderBinary {
    /// One of the context's `GL_SHADER_BINARY_FORMATS`.
    pub format: u32,
    /// Blob contents.
    pub bytes: Vec<u8>,
}

/// What a [`ShaderCode`] is built from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShaderSource {
    /// One list of segments per shader object; the segments of an object are
    /// concatenated before they are handed to the driver.
    Text(Vec<Vec<String>>),
    /// A binary loaded into `count` shader objects at once.
    Binary {
        /// Number of shader objects the binary is loaded into.
        count: usize,
        /// The blob.
        binary: ShaderBinary,
    },
}

/// Sources or binary of one stage, plus the GL shader objects built from it.
///
/// Ids are process-wide, start at `1` and only ever increase.
#[derive(Debug)]
pub struct ShaderCode {
    id: u32,
    stage: ShaderStage,
    /// `None` once destroyed.
    source: Option<ShaderSource>,
    shaders: Vec<u32>,
    compiled: bool,
}

impl ShaderCode {
    fn with_source(stage: ShaderStage, source: ShaderSource) -> Self {
        Self {
            id: NEXT_ID.fetch_add(1, Ordering::Relaxed),
            stage,
            source: Some(source),
            shaders: Vec::new(),
            compiled: false,
        }
    }

    /// Build from one list of source segments per shader object.
    ///
    /// # Errors
    ///
    /// *invalid-argument* when `sources` is empty.
    pub fn from_source(stage: ShaderStage, sources: Vec<Vec<String>>) -> Result<Self> {
        if sources.is_empty() {
            return Err(Error::invalid_argument(format!(
                "{stage} shader code needs at least one source"
            )));
        }
        Ok(Self::with_source(stage, ShaderSource::Text(sources)))
    }

    /// A single shader object with a single source segment.
    pub fn from_text(stage: ShaderStage, text: impl Into<String>) -> Self {
        Self::with_source(stage, ShaderSource::Text(vec![vec![text.into()]]))
    }

    /// Build from a binary loaded into `count` shader objects.
    ///
    /// # Errors
    ///
    /// *invalid-argument* when `count` is `0` or the blob is empty.
    pub fn from_binary(stage: ShaderStage, count: usize, binary: ShaderBinary) -> Result<Self> {
        if count == 0 || binary.bytes.is_empty() {
            return Err(Error::invalid_argument(format!(
                "{stage} shader binary needs a non-empty blob and at least one shader object"
            )));
        }
        Ok(Self::with_source(stage, ShaderSource::Binary { count, binary }))
    }

    /// Read one shader object per path, expanding `#include` lines.
    ///
    /// # Errors
    ///
    /// *invalid-argument* for an empty path list; lookup and read failures
    /// from [`include::read_source`].
    pub fn create_from_source_files(
        assets: &dyn AssetResolver,
        stage: ShaderStage,
        paths: &[&str],
    ) -> Result<Self> {
        let debug = debug_code();
        let sources = paths
            .iter()
            .map(|path| include::read_source(assets, path, debug).map(|text| vec![text]))
            .collect::<Result<Vec<_>>>()?;
        Self::from_source(stage, sources)
    }

    /// Load a binary blob of `format` for `count` shader objects.
    ///
    /// # Errors
    ///
    /// *resource-not-found* when `path` does not resolve; read failures.
    pub fn create_from_binary_file(
        assets: &dyn AssetResolver,
        stage: ShaderStage,
        count: usize,
        format: u32,
        path: &str,
    ) -> Result<Self> {
        let resolved = assets.resolve(path).ok_or_else(|| Error::not_found(path))?;
        let bytes = assets.read_bytes(&resolved)?;
        Self::from_binary(stage, count, ShaderBinary { format, bytes })
    }

    /// Locate `basename` by stage suffix and build a single shader object.
    ///
    /// When the context has a compiler, `<src_root>/<basename>.<suffix>` is
    /// tried first. Otherwise (or if the source is missing) every binary
    /// format the context advertises that has a known sub-path is tried as
    /// `<bin_root>/<sub-path>/<basename>.<binary suffix>`; the first hit wins.
    ///
    /// # Errors
    ///
    /// *resource-not-found* when neither form exists; read failures.
    pub fn create_from_files(
        gpu: &dyn Gpu,
        assets: &dyn AssetResolver,
        stage: ShaderStage,
        src_root: &str,
        bin_root: &str,
        basename: &str,
    ) -> Result<Self> {
        if gpu.info().has_shader_compiler() {
            let path = join_asset(&[src_root, &format!("{basename}.{}", stage.file_suffix(false))]);
            match Self::create_from_source_files(assets, stage, &[&path]) {
                Err(Error::ResourceNotFound { name, origin: None }) if name == path => {
                    log::debug!("{path} not found, trying binaries");
                }
                other => return other,
            }
        }
        let file = format!("{basename}.{}", stage.file_suffix(true));
        for format in gpu.shader_binary_formats() {
            let Some(sub) = binary_sub_path(format) else {
                continue;
            };
            let path = join_asset(&[bin_root, sub, &file]);
            if assets.resolve(&path).is_some() {
                return Self::create_from_binary_file(assets, stage, 1, format, &path);
            }
        }
        Err(Error::not_found(format!(
            "{basename} ({stage} source or binary)"
        )))
    }

    /// Process-wide unique id.
    pub fn id(&self) -> u32 {
        self.id
    }

    /// Pipeline stage.
    pub fn stage(&self) -> ShaderStage {
        self.stage
    }

    /// Sources or binary; `None` once destroyed.
    pub fn source(&self) -> Option<&ShaderSource> {
        self.source.as_ref()
    }

    /// GL names of the shader objects (empty before the first compile).
    pub fn shader_names(&self) -> &[u32] {
        &self.shaders
    }

    /// Number of shader objects this code produces.
    pub fn shader_count(&self) -> usize {
        match &self.source {
            Some(ShaderSource::Text(objects)) => objects.len(),
            Some(ShaderSource::Binary { count, .. }) => *count,
            None => 0,
        }
    }

    /// Whether every shader object compiled (or the binary loaded).
    pub fn is_compiled(&self) -> bool {
        self.compiled
    }

    /// Whether the code still holds sources or a binary.
    pub fn is_valid(&self) -> bool {
        self.source.is_some()
    }

    /// Create the shader objects and compile them (or load the binary).
    ///
    /// Once compiled, further calls do nothing.
    ///
    /// # Errors
    ///
    /// *invalid-state* when the stage is not supported, the code was
    /// destroyed, or sources need a compiler the context lacks; *compile* with
    /// the first failing info log; driver failures from the binary load.
    pub fn compile(&mut self, gpu: &dyn Gpu) -> Result<()> {
        if self.compiled {
            return Ok(());
        }
        let info = gpu.info();
        if !self.stage.is_supported(info) {
            return Err(Error::invalid_state(format!(
                "{} shaders are not supported on {}",
                self.stage,
                info.profile()
            )));
        }
        let Some(source) = &self.source else {
            return Err(Error::invalid_state(format!(
                "shader code {} was destroyed",
                self.id
            )));
        };
        if matches!(source, ShaderSource::Text(_)) && !info.has_shader_compiler() {
            return Err(Error::invalid_state(format!(
                "shader code {}: context has no shader compiler",
                self.id
            )));
        }
        if self.shaders.is_empty() {
            for _ in 0..self.shader_count() {
                let shader = gpu.create_shader(self.stage.to_gl())?;
                self.shaders.push(shader);
            }
        }

        match source {
            ShaderSource::Text(objects) => {
                for (&shader, segments) in self.shaders.iter().zip(objects) {
                    gpu.shader_source(shader, &segments.concat());
                    gpu.compile_shader(shader);
                }
                if let Some(&failed) = self
                    .shaders
                    .iter()
                    .find(|&&shader| !gpu.shader_compile_status(shader))
                {
                    let log = gpu.shader_info_log(failed);
                    self.report_compile_failure(&log);
                    return Err(Error::Compile {
                        id: self.id,
                        stage: self.stage,
                        log,
                    });
                }
            }
            ShaderSource::Binary { binary, .. } => {
                gpu.shader_binary(&self.shaders, binary.format, &binary.bytes)?;
            }
        }
        self.compiled = true;
        log::debug!("compiled {self}");
        Ok(())
    }

    fn report_compile_failure(&self, info_log: &str) {
        if debug_code() {
            log::error!(
                "shader code {} ({}) failed to compile:\n{info_log}\n{}",
                self.id,
                self.stage,
                self.dump_source()
            );
        } else {
            log::error!(
                "shader code {} ({}) failed to compile: {}",
                self.id,
                self.stage,
                info_log.lines().next().unwrap_or_default()
            );
        }
    }

    /// Delete the shader objects and drop the sources. The code cannot be
    /// compiled again afterwards.
    pub fn destroy(&mut self, gpu: &dyn Gpu) {
        for shader in self.shaders.drain(..) {
            gpu.delete_shader(shader);
        }
        self.source = None;
        self.compiled = false;
        log::debug!("destroyed shader code {}", self.id);
    }

    pub(super) fn check_editable(&self) -> Result<()> {
        match &self.source {
            Some(ShaderSource::Text(_)) => Ok(()),
            Some(ShaderSource::Binary { .. }) => Err(Error::invalid_state(format!(
                "shader code {} is binary",
                self.id
            ))),
            None => Err(Error::invalid_state(format!(
                "shader code {} was destroyed",
                self.id
            ))),
        }
    }

    fn segments_mut(&mut self, index: usize) -> Option<&mut Vec<String>> {
        match &mut self.source {
            Some(ShaderSource::Text(objects)) => objects.get_mut(index),
            _ => None,
        }
    }

    /// The concatenated source of shader object `index`.
    pub fn source_string(&self, index: usize) -> Option<String> {
        match &self.source {
            Some(ShaderSource::Text(objects)) => objects.get(index).map(|s| s.concat()),
            _ => None,
        }
    }

    /// Byte index of `needle` in shader object `index`, searching from `from`.
    pub fn index_of(&self, index: usize, needle: &str, from: usize) -> Option<usize> {
        let text = self.source_string(index)?;
        text.get(from..)?.find(needle).map(|at| at + from)
    }

    /// Insert `text` at byte `position` of the concatenated source of shader
    /// object `index`. Positions at or past the end append.
    ///
    /// Returns the index just past the inserted text, or `None` for binary
    /// code, a bad object index, or a position inside a UTF-8 sequence.
    pub fn insert_source(&mut self, index: usize, position: usize, text: &str) -> Option<usize> {
        let segments = self.segments_mut(index)?;
        let total: usize = segments.iter().map(String::len).sum();
        if position >= total {
            match segments.last_mut() {
                Some(last) => last.push_str(text),
                None => segments.push(text.to_string()),
            }
            return Some(total + text.len());
        }
        let mut start = 0;
        for segment in segments.iter_mut() {
            if position < start + segment.len() {
                let local = position - start;
                if !segment.is_char_boundary(local) {
                    return None;
                }
                segment.insert_str(local, text);
                return Some(position + text.len());
            }
            start += segment.len();
        }
        None
    }

    /// Insert `text` at the start of the line following the first `tag` at
    /// or after `from`.
    ///
    /// CR, LF and CRLF all end a line. If the tag sits on the last line, a
    /// newline is added before `text`. Returns the index just past the
    /// inserted text, or `None` when the tag is not found.
    pub fn insert_after_tag(
        &mut self,
        index: usize,
        tag: &str,
        from: usize,
        text: &str,
    ) -> Option<usize> {
        let full = self.source_string(index)?;
        let after = full.get(from..)?.find(tag)? + from + tag.len();
        match full[after..].find(['\r', '\n']) {
            Some(rel) => {
                let eol = after + rel;
                let next = if full[eol..].starts_with("\r\n") {
                    eol + 2
                } else {
                    eol + 1
                };
                self.insert_source(index, next, text)
            }
            None => self.insert_source(index, usize::MAX, &format!("\n{text}")),
        }
    }

    /// Read `path` (with `#include` expansion) and insert it at `position`.
    ///
    /// # Errors
    ///
    /// Lookup and read failures from [`include::read_source`].
    pub fn insert_source_file(
        &mut self,
        index: usize,
        position: usize,
        assets: &dyn AssetResolver,
        path: &str,
    ) -> Result<Option<usize>> {
        let text = include::read_source(assets, path, debug_code())?;
        Ok(self.insert_source(index, position, &text))
    }

    /// Replace every occurrence of `old` with `new` in every segment of every
    /// shader object. Returns the number of replacements.
    ///
    /// Only the CPU-side sources change; compiled shader objects must be
    /// destroyed and rebuilt by the caller.
    pub fn replace_all(&mut self, old: &str, new: &str) -> usize {
        if old.is_empty() || old == new {
            return 0;
        }
        let Some(ShaderSource::Text(objects)) = &mut self.source else {
            return 0;
        };
        let mut count = 0;
        for segment in objects.iter_mut().flatten() {
            let hits = segment.matches(old).count();
            if hits > 0 {
                *segment = segment.replace(old, new);
                count += hits;
            }
        }
        count
    }

    /// Every shader object's source with numbered lines, for logging.
    pub fn dump_source(&self) -> String {
        let mut out = format!("{self}\n");
        match &self.source {
            Some(ShaderSource::Text(objects)) => {
                for (i, segments) in objects.iter().enumerate() {
                    out.push_str(&format!("// object {i}\n"));
                    out.push_str(&numbered_source(&segments.concat()));
                }
            }
            Some(ShaderSource::Binary { binary, .. }) => {
                out.push_str(&format!(
                    "// binary format {:#x}, {} bytes\n",
                    binary.format,
                    binary.bytes.len()
                ));
            }
            None => out.push_str("// destroyed\n"),
        }
        out
    }
}

impl PartialEq for ShaderCode {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for ShaderCode {}

impl fmt::Display for ShaderCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ShaderCode[id={}, {}, shaders={:?}, compiled={}]",
            self.id, self.stage, self.shaders, self.compiled
        )
    }
}

/// Join non-empty path parts with `/`.
fn join_asset(parts: &[&str]) -> String {
    parts
        .iter()
        .map(|p| p.trim_end_matches('/'))
        .filter(|p| !p.is_empty())
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asset::MemoryAssets;
    use crate::gpu::mock::{Call, MockGpu};
    use crate::gpu::ContextInfo;
    use crate::shader::NVIDIA_PLATFORM_BINARY_NV;

    const VS: &str = "attribute vec3 p; void main(){gl_Position=vec4(p,1);}";

    #[test]
    fn test_ids_increase() {
        let a = ShaderCode::from_text(ShaderStage::Vertex, VS);
        let b = ShaderCode::from_text(ShaderStage::Vertex, VS);
        assert!(a.id() > 0);
        assert!(a.id() < b.id());
        assert_ne!(a, b);
    }

    #[test]
    fn test_compile_once() {
        let gpu = MockGpu::new(ContextInfo::es2());
        let mut code = ShaderCode::from_text(ShaderStage::Vertex, VS);
        code.compile(&gpu).expect("compile");
        code.compile(&gpu).expect("compile again");
        assert!(code.is_compiled());
        assert_eq!(code.shader_names().len(), 1);
        assert_eq!(gpu.count(|c| matches!(c, Call::CompileShader(_))), 1);
        assert_eq!(
            gpu.count(|c| matches!(c, Call::ShaderSource { source, .. } if source == VS)),
            1
        );
    }

    #[test]
    fn test_compile_failure_keeps_code_destroyable() {
        let _ = env_logger::builder().is_test(true).try_init();
        let gpu = MockGpu::new(ContextInfo::es2());
        let mut code = ShaderCode::from_text(ShaderStage::Fragment, "#error broken\n");
        let err = code.compile(&gpu).expect_err("must fail");
        match err {
            Error::Compile { id, stage, log } => {
                assert_eq!(id, code.id());
                assert_eq!(stage, ShaderStage::Fragment);
                assert!(log.contains("#error"));
            }
            other => panic!("unexpected error {other:?}"),
        }
        assert!(!code.is_compiled());

        let shader = code.shader_names()[0];
        code.destroy(&gpu);
        assert!(!gpu.shader_exists(shader));
        assert!(!code.is_valid());
        assert!(matches!(code.compile(&gpu), Err(Error::InvalidState(_))));
    }

    #[test]
    fn test_compile_preconditions() {
        let no_compiler = MockGpu::new(ContextInfo::es2().with_shader_compiler(false));
        let mut code = ShaderCode::from_text(ShaderStage::Vertex, VS);
        assert!(matches!(code.compile(&no_compiler), Err(Error::InvalidState(_))));

        let es2 = MockGpu::new(ContextInfo::es2());
        let mut geometry = ShaderCode::from_text(ShaderStage::Geometry, "void main(){}");
        assert!(matches!(geometry.compile(&es2), Err(Error::InvalidState(_))));
        assert!(es2.calls().is_empty());
    }

    #[test]
    fn test_binary_compile() {
        let gpu = MockGpu::new(ContextInfo::es2().with_shader_compiler(false));
        gpu.set_binary_formats(vec![NVIDIA_PLATFORM_BINARY_NV]);
        let binary = ShaderBinary {
            format: NVIDIA_PLATFORM_BINARY_NV,
            bytes: vec![1, 2, 3],
        };
        let mut code = ShaderCode::from_binary(ShaderStage::Vertex, 1, binary).expect("binary");
        code.compile(&gpu).expect("load");
        assert!(code.is_compiled());
        assert!(gpu.calls().contains(&Call::ShaderBinary {
            format: NVIDIA_PLATFORM_BINARY_NV,
            len: 3
        }));
        assert!(code.source_string(0).is_none());
        assert!(matches!(code.check_editable(), Err(Error::InvalidState(_))));
    }

    #[test]
    fn test_insert_source_spans_segments() {
        let mut code = ShaderCode::from_source(
            ShaderStage::Vertex,
            vec![vec!["abc".to_string(), "def".to_string()]],
        )
        .expect("code");
        assert_eq!(code.insert_source(0, 4, "X"), Some(5));
        assert_eq!(code.source_string(0).as_deref(), Some("abcdXef"));
        assert_eq!(code.insert_source(0, 0, "<"), Some(1));
        assert_eq!(code.insert_source(0, usize::MAX, ">"), Some(9));
        assert_eq!(code.source_string(0).as_deref(), Some("<abcdXef>"));
        assert_eq!(code.insert_source(1, 0, "x"), None);
    }

    #[test]
    fn test_insert_source_rejects_split_char() {
        let mut code = ShaderCode::from_text(ShaderStage::Vertex, "// é\n");
        assert_eq!(code.insert_source(0, 4, "x"), None);
        assert_eq!(code.source_string(0).as_deref(), Some("// é\n"));
    }

    #[test]
    fn test_insert_after_tag() {
        let mut code = ShaderCode::from_text(ShaderStage::Fragment, "#version 100\r\nvoid main(){}\n");
        let end = code
            .insert_after_tag(0, "#version", 0, "#define A\n")
            .expect("tag");
        let text = code.source_string(0).expect("source");
        assert_eq!(text, "#version 100\r\n#define A\nvoid main(){}\n");
        let found = code.index_of(0, "#define A", 0).expect("inserted");
        assert!(found < end);

        let mut last = ShaderCode::from_text(ShaderStage::Fragment, "#version 100");
        let end = last.insert_after_tag(0, "#version", 0, "#define B\n").expect("tag");
        assert_eq!(last.source_string(0).as_deref(), Some("#version 100\n#define B\n"));
        assert_eq!(end, "#version 100\n#define B\n".len());
        assert!(last.insert_after_tag(0, "#missing", 0, "x").is_none());
    }

    #[test]
    fn test_replace_all() {
        let mut code = ShaderCode::from_source(
            ShaderStage::Fragment,
            vec![
                vec!["gl_FragColor = a; ".to_string(), "gl_FragColor += b;".to_string()],
                vec!["gl_FragColor;".to_string()],
            ],
        )
        .expect("code");
        assert_eq!(code.replace_all("gl_FragColor", "mgl_FragColor"), 3);
        assert_eq!(code.source_string(1).as_deref(), Some("mgl_FragColor;"));

        let Some(ShaderSource::Text(before)) = code.source() else {
            panic!("text source");
        };
        let ptr = before[0][0].as_ptr();
        let snapshot = before.clone();
        assert_eq!(code.replace_all("mgl_FragColor", "mgl_FragColor"), 0);
        let Some(ShaderSource::Text(after)) = code.source() else {
            panic!("text source");
        };
        assert_eq!(after[0][0].as_ptr(), ptr);
        assert_eq!(*after, snapshot);
    }

    #[test]
    fn test_create_from_source_files() {
        let assets = MemoryAssets::new()
            .with("shader/flat.vp", "#include \"common.glsl\"\nvoid main(){}\n")
            .with("shader/common.glsl", "uniform mat4 mvp;\n");
        let code = ShaderCode::create_from_source_files(&assets, ShaderStage::Vertex, &["shader/flat.vp"])
            .expect("code");
        assert!(code
            .source_string(0)
            .is_some_and(|s| s.starts_with("uniform mat4 mvp;\nvoid main(){}")));
        assert!(code.dump_source().contains("   1: "));
    }

    #[test]
    fn test_create_from_files_prefers_source() {
        let gpu = MockGpu::new(ContextInfo::es2());
        let assets = MemoryAssets::new().with("shader/flat.fp", "void main(){}\n");
        let code = ShaderCode::create_from_files(
            &gpu,
            &assets,
            ShaderStage::Fragment,
            "shader",
            "shader/bin",
            "flat",
        )
        .expect("code");
        assert_eq!(code.source_string(0).as_deref(), Some("void main(){}\n"));
    }

    #[test]
    fn test_create_from_files_falls_back_to_binary() {
        let gpu = MockGpu::new(ContextInfo::es2().with_shader_compiler(false));
        gpu.set_binary_formats(vec![0x1234, NVIDIA_PLATFORM_BINARY_NV]);
        let assets = MemoryAssets::new().with("shader/bin/nvidia/flat.bvp", vec![7u8, 7, 7]);
        let code = ShaderCode::create_from_files(
            &gpu,
            &assets,
            ShaderStage::Vertex,
            "shader",
            "shader/bin",
            "flat",
        )
        .expect("code");
        match code.source() {
            Some(ShaderSource::Binary { count, binary }) => {
                assert_eq!(*count, 1);
                assert_eq!(binary.format, NVIDIA_PLATFORM_BINARY_NV);
                assert_eq!(binary.bytes, vec![7, 7, 7]);
            }
            other => panic!("unexpected source {other:?}"),
        }

        let missing = ShaderCode::create_from_files(
            &gpu,
            &assets,
            ShaderStage::Fragment,
            "shader",
            "shader/bin",
            "flat",
        );
        assert!(matches!(missing, Err(Error::ResourceNotFound { .. })));
    }

    #[test]
    fn test_join_asset() {
        assert_eq!(join_asset(&["shader/", "nvidia", "a.bvp"]), "shader/nvidia/a.bvp");
        assert_eq!(join_asset(&["", "a.vp"]), "a.vp");
    }
}
