//! GLSL preludes: `#version` line, default precision and compatibility
//! defines.
//!
//! The defines let one source target both legacy (`attribute`/`varying`,
//! `gl_FragColor`) and modern (`in`/`out`) GLSL. Sources written against the
//! shims use `IN` for inputs and `mgl_FragColor` for the fragment output.

use std::fmt;

use super::code::ShaderCode;
use super::ShaderStage;
use crate::error::Result;
use crate::gpu::{ContextInfo, GlProfile};

const ES2_PRECISION_VP: &str = "\nprecision highp float;\nprecision highp int;\n";
const ES2_PRECISION_FP: &str = "\nprecision mediump float;\nprecision mediump int;\n";
const ES3_PRECISION: &str = "\nprecision highp float;\nprecision highp int;\n";
const GL3_PRECISION_VP_GP: &str = "\nprecision highp float;\nprecision highp int;\n";
const GL3_PRECISION_FP: &str = "\nprecision highp float;\nprecision mediump int;\n";

const DEFINES_VP_130: &str = "#define attribute in\n#define varying out\n#define IN in\n";
const DEFINES_VP_LEGACY: &str = "#define IN\n";
const DEFINES_FP_130: &str =
    "#define varying in\n#define IN in\nout vec4 mgl_FragColor;\n#define texture2D texture\n";
const DEFINES_FP_LEGACY: &str = "#define IN\n#define mgl_FragColor gl_FragColor\n";

/// Default precision source to insert.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Precision {
    /// Pick from the context and stage (see [`default_precision`]).
    #[default]
    Auto,
    /// Insert nothing.
    None,
    /// Insert this text verbatim.
    Custom(String),
}

/// What [`ShaderCode::default_shader_customization`] inserts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Customization {
    /// Prepend the context's `#version` line.
    pub prelude_version: bool,
    /// Default precision statements.
    pub precision: Precision,
    /// Legacy/modern compatibility defines.
    pub defines: bool,
}

impl Default for Customization {
    fn default() -> Self {
        Self {
            prelude_version: true,
            precision: Precision::Auto,
            defines: true,
        }
    }
}

/// Behavior of an `#extension` directive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[expect(missing_docs)]
pub enum ExtensionBehavior {
    Require,
    Enable,
    Disable,
    Warn,
}

impl fmt::Display for ExtensionBehavior {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Require => "require",
            Self::Enable => "enable",
            Self::Disable => "disable",
            Self::Warn => "warn",
        })
    }
}

/// `#extension <name> : <behavior>` with a trailing newline.
pub fn extension_directive(name: &str, behavior: ExtensionBehavior) -> String {
    format!("#extension {name} : {behavior}\n")
}

/// Whether sources for this context need default precision statements:
/// every ES context, and desktop GLSL in `[1.30, 1.50)`.
pub fn requires_default_precision(info: &ContextInfo) -> bool {
    info.is_es() || (130..150).contains(&info.glsl_version())
}

/// The default precision block for `stage` on this context, if any.
pub fn default_precision(info: &ContextInfo, stage: ShaderStage) -> Option<&'static str> {
    match info.profile() {
        GlProfile::Es2 => match stage {
            ShaderStage::Vertex => Some(ES2_PRECISION_VP),
            ShaderStage::Fragment => Some(ES2_PRECISION_FP),
            _ => None,
        },
        GlProfile::Es3 => Some(ES3_PRECISION),
        GlProfile::GlCore | GlProfile::GlCompat if requires_default_precision(info) => {
            Some(match stage {
                ShaderStage::Fragment | ShaderStage::Compute => GL3_PRECISION_FP,
                _ => GL3_PRECISION_VP_GP,
            })
        }
        GlProfile::GlCore | GlProfile::GlCompat => None,
    }
}

/// Compatibility defines for `stage` on this context, if any.
pub fn default_defines(info: &ContextInfo, stage: ShaderStage) -> Option<&'static str> {
    let modern = info.glsl_version() >= 130;
    match stage {
        ShaderStage::Vertex if modern => Some(DEFINES_VP_130),
        ShaderStage::Vertex => Some(DEFINES_VP_LEGACY),
        ShaderStage::Fragment if modern => Some(DEFINES_FP_130),
        ShaderStage::Fragment => Some(DEFINES_FP_LEGACY),
        _ => None,
    }
}

impl ShaderCode {
    /// Insert the context's `#version` line at the top of the first shader
    /// object, unless the source already starts with `#version`.
    ///
    /// Returns the index just past the version line.
    pub fn add_glsl_version(&mut self, info: &ContextInfo) -> usize {
        let existing = self.source_string(0).unwrap_or_default();
        if existing.trim_start().starts_with("#version") {
            return existing.find('\n').map_or(existing.len(), |eol| eol + 1);
        }
        self.insert_source(0, 0, &info.glsl_version_line())
            .unwrap_or(0)
    }

    /// Insert default precision statements at `position` when the context
    /// needs them. Returns the index past the insert (or `position`).
    pub fn add_default_precision(&mut self, info: &ContextInfo, position: usize) -> usize {
        match default_precision(info, self.stage()) {
            Some(text) if requires_default_precision(info) => {
                self.insert_source(0, position, text).unwrap_or(position)
            }
            _ => position,
        }
    }

    /// Insert the compatibility defines at `position`. Returns the index
    /// past the insert (or `position`).
    pub fn add_default_defines(&mut self, info: &ContextInfo, position: usize) -> usize {
        match default_defines(info, self.stage()) {
            Some(text) => self.insert_source(0, position, text).unwrap_or(position),
            None => position,
        }
    }

    /// Apply `custom` to the first shader object: version line, then
    /// precision, then defines, each inserted after the previous one.
    ///
    /// Returns the index just past the last insert, where application
    /// specific prelude text can go.
    ///
    /// # Errors
    ///
    /// *invalid-state* for binary shader code.
    pub fn default_shader_customization(
        &mut self,
        info: &ContextInfo,
        custom: &Customization,
    ) -> Result<usize> {
        self.check_editable()?;
        let mut position = if custom.prelude_version {
            self.add_glsl_version(info)
        } else {
            0
        };
        position = match &custom.precision {
            Precision::Auto => self.add_default_precision(info, position),
            Precision::None => position,
            Precision::Custom(text) => self.insert_source(0, position, text).unwrap_or(position),
        };
        if custom.defines {
            position = self.add_default_defines(info, position);
        }
        Ok(position)
    }
}
