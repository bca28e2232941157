//! Line-oriented `#include` expansion for shader sources.

use std::path::{Path, PathBuf};

use crate::asset::AssetResolver;
use crate::error::{Error, Result};

const INCLUDE: &str = "#include ";

/// Read `logical` through `assets`, expanding `#include` lines recursively.
///
/// An include target is resolved through `assets` first and, if that fails
/// for a relative name, relative to the directory of the including file.
/// With `debug` on, the top file and every include point get a marker
/// comment (`// <path>` and `// included @ line N: <path>`), where `N`
/// counts lines across all files read so far.
///
/// # Errors
///
/// *resource-not-found* for a missing file or include target (the origin
/// carries `file:line: text` of the include directive), *invalid-argument*
/// for a cyclic include, and read failures from the resolver.
pub fn read_source(assets: &dyn AssetResolver, logical: &str, debug: bool) -> Result<String> {
    let path = assets
        .resolve(logical)
        .ok_or_else(|| Error::not_found(logical))?;
    let mut reader = IncludeReader {
        assets,
        debug,
        out: String::new(),
        chain: Vec::new(),
        line: 0,
    };
    reader.expand(&path)?;
    Ok(reader.out)
}

struct IncludeReader<'a> {
    assets: &'a dyn AssetResolver,
    debug: bool,
    out: String,
    /// Files currently being expanded, outermost first.
    chain: Vec<PathBuf>,
    /// Lines consumed across all files.
    line: usize,
}

impl IncludeReader<'_> {
    fn expand(&mut self, path: &Path) -> Result<()> {
        if self.chain.iter().any(|p| p == path) {
            return Err(Error::invalid_argument(format!(
                "cyclic #include of {} (via {})",
                path.display(),
                self.chain
                    .iter()
                    .map(|p| p.display().to_string())
                    .collect::<Vec<_>>()
                    .join(" -> ")
            )));
        }
        let text = self.assets.read_text(path)?;
        if self.debug {
            if self.chain.is_empty() {
                self.out.push_str(&format!("// {}\n", path.display()));
            } else {
                self.out
                    .push_str(&format!("// included @ line {}: {}\n", self.line, path.display()));
            }
        }
        self.chain.push(path.to_path_buf());
        for (index, line) in text.lines().enumerate() {
            self.line += 1;
            let Some(rest) = line.strip_prefix(INCLUDE) else {
                self.out.push_str(line);
                self.out.push('\n');
                continue;
            };
            let name = unquote(rest.trim());
            let target = self.resolve_include(path, name).ok_or_else(|| Error::ResourceNotFound {
                name: name.to_string(),
                origin: Some(format!("{}:{}: {line}", path.display(), index + 1)),
            })?;
            self.expand(&target)?;
        }
        self.chain.pop();
        Ok(())
    }

    fn resolve_include(&self, parent: &Path, name: &str) -> Option<PathBuf> {
        if let Some(found) = self.assets.resolve(name) {
            return Some(found);
        }
        if Path::new(name).is_absolute() {
            return None;
        }
        let sibling = parent.parent()?.join(name);
        self.assets.resolve(sibling.to_str()?)
    }
}

/// Strip one pair of surrounding double quotes.
fn unquote(text: &str) -> &str {
    text.strip_prefix('"')
        .and_then(|t| t.strip_suffix('"'))
        .unwrap_or(text)
}
