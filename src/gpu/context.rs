//! Profile, version and capability description of the current GL context.

use std::fmt;

/// Family of the context's API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GlProfile {
    /// OpenGL ES 2.x (or WebGL 1).
    Es2,
    /// OpenGL ES 3.x (or WebGL 2).
    Es3,
    /// Desktop OpenGL, core profile.
    GlCore,
    /// Desktop OpenGL, compatibility profile (or a pre-3.2 context).
    GlCompat,
}

impl GlProfile {
    /// Whether this is an embedded (ES) profile.
    pub fn is_es(self) -> bool {
        matches!(self, Self::Es2 | Self::Es3)
    }
}

impl fmt::Display for GlProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Es2 => "ES2",
            Self::Es3 => "ES3",
            Self::GlCore => "GL-core",
            Self::GlCompat => "GL-compat",
        })
    }
}

/// A `major.minor` API version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct GlVersion {
    /// Major version.
    pub major: u32,
    /// Minor version.
    pub minor: u32,
}

impl GlVersion {
    /// Construct a version.
    pub const fn new(major: u32, minor: u32) -> Self {
        Self { major, minor }
    }
}

impl fmt::Display for GlVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

/// Everything the core needs to know about the context it runs on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextInfo {
    profile: GlProfile,
    version: GlVersion,
    /// GLSL version as the number used in `#version` lines (100, 130, 300, 330...).
    glsl_version: u32,
    shader_compiler: bool,
}

impl ContextInfo {
    /// Describe a context from its parts.
    pub fn new(profile: GlProfile, version: GlVersion, glsl_version: u32) -> Self {
        Self {
            profile,
            version,
            glsl_version,
            shader_compiler: true,
        }
    }

    /// An OpenGL ES 2.0 context with GLSL ES 1.00.
    pub fn es2() -> Self {
        Self::new(GlProfile::Es2, GlVersion::new(2, 0), 100)
    }

    /// An OpenGL ES 3.`minor` context.
    pub fn es3(minor: u32) -> Self {
        Self::new(GlProfile::Es3, GlVersion::new(3, minor), 300 + minor * 10)
    }

    /// A desktop core-profile context of the given version.
    pub fn gl_core(major: u32, minor: u32) -> Self {
        let version = GlVersion::new(major, minor);
        Self::new(GlProfile::GlCore, version, desktop_glsl_for(version))
    }

    /// A desktop compatibility-profile context of the given version.
    pub fn gl_compat(major: u32, minor: u32) -> Self {
        let version = GlVersion::new(major, minor);
        Self::new(GlProfile::GlCompat, version, desktop_glsl_for(version))
    }

    /// Override whether an online shader compiler is present (ES may lack one).
    #[must_use]
    pub fn with_shader_compiler(mut self, present: bool) -> Self {
        self.shader_compiler = present;
        self
    }

    /// Override the GLSL version number.
    #[must_use]
    pub fn with_glsl_version(mut self, glsl_version: u32) -> Self {
        self.glsl_version = glsl_version;
        self
    }

    /// API family.
    pub fn profile(&self) -> GlProfile {
        self.profile
    }

    /// Driver API version.
    pub fn version(&self) -> GlVersion {
        self.version
    }

    /// GLSL version number (e.g. `130` for GLSL 1.30).
    pub fn glsl_version(&self) -> u32 {
        self.glsl_version
    }

    /// Whether this is an ES context.
    pub fn is_es(&self) -> bool {
        self.profile.is_es()
    }

    /// Native ES 2.0 (or later) context.
    pub fn native_es2(&self) -> bool {
        self.is_es() && self.version.major >= 2
    }

    /// Native ES 3.0 (or later) context.
    pub fn native_es3(&self) -> bool {
        self.is_es() && self.version.major >= 3
    }

    /// Compute shaders are available (ES 3.1 / GL 4.3).
    pub fn has_compute(&self) -> bool {
        if self.is_es() {
            self.version >= GlVersion::new(3, 1)
        } else {
            self.version >= GlVersion::new(4, 3)
        }
    }

    /// Tessellation stages are available (ES 3.2 / GL 4.0).
    pub fn has_tessellation(&self) -> bool {
        if self.is_es() {
            self.version >= GlVersion::new(3, 2)
        } else {
            self.version >= GlVersion::new(4, 0)
        }
    }

    /// Geometry shaders are available (ES 3.2 / GL 3.2).
    pub fn has_geometry_shader(&self) -> bool {
        self.version >= GlVersion::new(3, 2)
    }

    /// An online GLSL compiler is available.
    pub fn has_shader_compiler(&self) -> bool {
        self.shader_compiler
    }

    /// Pack/unpack state for 3D images (`IMAGE_HEIGHT`, `SKIP_IMAGES`) exists.
    pub fn has_3d_pixel_store(&self) -> bool {
        if self.is_es() {
            self.native_es3()
        } else {
            self.version >= GlVersion::new(1, 2)
        }
    }

    /// The `#version` line matching this context, newline included.
    ///
    /// ES 3.00+ gets an `es` suffix, desktop 1.50+ gets `core` or
    /// `compatibility` according to the profile.
    pub fn glsl_version_line(&self) -> String {
        let suffix = match self.profile {
            GlProfile::Es2 | GlProfile::Es3 if self.glsl_version >= 300 => " es",
            GlProfile::GlCore if self.glsl_version >= 150 => " core",
            GlProfile::GlCompat if self.glsl_version >= 150 => " compatibility",
            _ => "",
        };
        format!("#version {}{suffix}\n", self.glsl_version)
    }
}

/// The GLSL version shipped with a desktop GL version.
fn desktop_glsl_for(version: GlVersion) -> u32 {
    match (version.major, version.minor) {
        (0 | 1, _) | (2, 0) => 110,
        (2, _) => 120,
        (3, 0) => 130,
        (3, 1) => 140,
        (3, 2) => 150,
        (major, minor) => major * 100 + minor * 10,
    }
}

/// Parse a `GL_SHADING_LANGUAGE_VERSION` string such as `"4.60 NVIDIA"` or
/// `"OpenGL ES GLSL ES 3.00"` into its `#version` number.
pub fn parse_glsl_version(text: &str) -> Option<u32> {
    text.split_whitespace().find_map(|token| {
        let (major, minor) = token.split_once('.')?;
        let major: u32 = major.parse().ok()?;
        let digits: String = minor.chars().take_while(char::is_ascii_digit).collect();
        let minor: u32 = match digits.len() {
            0 => return None,
            1 => digits.parse::<u32>().ok()? * 10,
            _ => digits[..2].parse().ok()?,
        };
        Some(major * 100 + minor)
    })
}
