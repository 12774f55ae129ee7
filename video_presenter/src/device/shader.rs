/// Shader binary loading

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::{vp_bail, vp_err};

/// Returns compiled shader bytes for a logical shader name
pub trait ShaderLoader: Send + Sync {
    fn load(&self, name: &str) -> Result<Vec<u8>>;
}

/// Loads SPIR-V files from a directory, by default the one holding the
/// running executable.
pub struct FileShaderLoader {
    root: PathBuf,
}

impl FileShaderLoader {
    /// Loader rooted at the running executable's directory
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the executable path cannot be resolved.
    pub fn new() -> Result<Self> {
        let exe = std::env::current_exe().map_err(|e| {
            vp_err!("vpresent::ShaderLoader", NotFound, "Cannot resolve executable path: {}", e)
        })?;
        let root = exe
            .parent()
            .map(Path::to_path_buf)
            .ok_or_else(|| {
                vp_err!("vpresent::ShaderLoader", NotFound, "Executable {} has no parent directory", exe.display())
            })?;
        Ok(Self { root })
    }

    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl ShaderLoader for FileShaderLoader {
    fn load(&self, name: &str) -> Result<Vec<u8>> {
        let path = self.root.join(name);
        let code = std::fs::read(&path).map_err(|e| match e.kind() {
            ErrorKind::NotFound => {
                vp_err!("vpresent::ShaderLoader", NotFound, "Shader {} not found", path.display())
            }
            _ => vp_err!("vpresent::ShaderLoader", BackendError, "Failed to read shader {}: {}", path.display(), e),
        })?;

        if code.is_empty() || code.len() % 4 != 0 {
            vp_bail!("vpresent::ShaderLoader", InvalidArgument,
                "Shader {} is not valid SPIR-V (size: {} bytes)", path.display(), code.len());
        }

        Ok(code)
    }
}

#[cfg(test)]
#[path = "shader_tests.rs"]
mod tests;
