use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::error::{GfxError, Result};
use crate::gfx::driver::{truncate_log, DriverError, ShaderId, ShaderStage, SharedDriver};

/// One compiled shader stage.
///
/// The GPU handle is released either when the unit is dropped or when a
/// render context links it into a program, whichever comes first.
pub struct ShaderUnit {
    driver: SharedDriver,
    handle: Option<ShaderId>,
    stage: ShaderStage,
    path: PathBuf,
}

impl ShaderUnit {
    /// Reads `path` whole and compiles it for `stage`.
    pub fn load(driver: &SharedDriver, path: impl AsRef<Path>, stage: ShaderStage) -> Result<Self> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|source| GfxError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_source(driver, path, stage, &source)
    }

    /// Compiles `source` for `stage`. `path` names the unit in logs and errors
    /// and is what render contexts de-duplicate on.
    pub fn from_source(
        driver: &SharedDriver,
        path: impl Into<PathBuf>,
        stage: ShaderStage,
        source: &str,
    ) -> Result<Self> {
        let path = path.into();
        if source.is_empty() {
            return Err(GfxError::EmptySource { path });
        }

        let handle = driver
            .create_shader(stage)
            .map_err(|e| GfxError::ResourceCreation {
                what: "shader",
                reason: e.to_string(),
            })?;
        // owned from here on, so a failed compile still frees the handle
        let unit = Self {
            driver: driver.clone(),
            handle: Some(handle),
            stage,
            path,
        };

        let started = Instant::now();
        match driver.compile_shader(handle, source) {
            Ok(()) => {}
            Err(DriverError::Compile { log }) => {
                let err = GfxError::ShaderCompilationFailed {
                    path: unit.path.clone(),
                    log: truncate_log(log),
                };
                log::error!("{err}");
                return Err(err);
            }
            Err(other) => return Err(other.into()),
        }

        log::info!(
            "[shader] [{}] compiled {} bytes in {}ms",
            unit.path.display(),
            source.len(),
            started.elapsed().as_millis()
        );
        Ok(unit)
    }

    /// Driver handle, or `None` once the unit has been linked into a program.
    pub fn handle(&self) -> Option<ShaderId> {
        self.handle
    }

    pub fn stage(&self) -> ShaderStage {
        self.stage
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Deletes the GPU shader. The linked program keeps the compiled code.
    pub(crate) fn release(&mut self) {
        if let Some(handle) = self.handle.take() {
            log::debug!("delete_shader({handle})");
            self.driver.delete_shader(handle);
        }
    }
}

impl Drop for ShaderUnit {
    fn drop(&mut self) {
        self.release();
    }
}

impl fmt::Debug for ShaderUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShaderUnit")
            .field("handle", &self.handle)
            .field("stage", &self.stage)
            .field("path", &self.path)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gfx::driver::GpuCall;
    use crate::gfx::test_support::{self, FRAGMENT_SRC, VERTEX_SRC};

    #[test]
    fn load_compiles_file_contents() {
        let (headless, driver) = test_support::headless();
        let dir = tempfile::tempdir().unwrap();
        let path = test_support::write_shader(&dir, "basic.vert.wgsl", VERTEX_SRC);

        let unit = ShaderUnit::load(&driver, &path, ShaderStage::Vertex).unwrap();
        assert_eq!(unit.stage(), ShaderStage::Vertex);
        assert_eq!(unit.path(), path.as_path());

        let handle = unit.handle().unwrap();
        assert!(headless.calls().contains(&GpuCall::CompileShader(handle)));
    }

    #[test]
    fn missing_file_is_io_error() {
        let (_, driver) = test_support::headless();
        let err = ShaderUnit::load(&driver, "does/not/exist.wgsl", ShaderStage::Vertex).unwrap_err();
        assert!(matches!(err, GfxError::Io { .. }));
    }

    #[test]
    fn empty_file_is_rejected_before_touching_the_driver() {
        let (headless, driver) = test_support::headless();
        let dir = tempfile::tempdir().unwrap();
        let path = test_support::write_shader(&dir, "empty.wgsl", "");

        let err = ShaderUnit::load(&driver, &path, ShaderStage::Fragment).unwrap_err();
        assert!(matches!(err, GfxError::EmptySource { .. }));
        assert!(headless.calls().is_empty());
    }

    #[test]
    fn compile_failure_carries_path_and_truncated_log() {
        let (headless, driver) = test_support::headless();
        let broken = format!("{}\n{}", "x".repeat(2048), "fn (");

        let err =
            ShaderUnit::from_source(&driver, "broken.wgsl", ShaderStage::Vertex, &broken).unwrap_err();
        let GfxError::ShaderCompilationFailed { path, log } = err else {
            panic!("expected a compile failure, got {err:?}");
        };
        assert_eq!(path, PathBuf::from("broken.wgsl"));
        assert!(log.len() <= crate::gfx::driver::INFO_LOG_CAPACITY);
        // the failed unit released its handle
        assert_eq!(headless.live_objects(), 0);
    }

    #[test]
    fn wrong_stage_fails_to_compile() {
        let (_, driver) = test_support::headless();
        let err = ShaderUnit::from_source(&driver, "frag-as-vert", ShaderStage::Vertex, FRAGMENT_SRC)
            .unwrap_err();
        assert!(matches!(err, GfxError::ShaderCompilationFailed { .. }));
    }

    #[test]
    fn drop_releases_handle() {
        let (headless, driver) = test_support::headless();
        let unit =
            ShaderUnit::from_source(&driver, "v.wgsl", ShaderStage::Vertex, VERTEX_SRC).unwrap();
        let handle = unit.handle().unwrap();
        drop(unit);
        assert!(!headless.is_live_shader(handle));
    }
}
