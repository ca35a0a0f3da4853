//! GPU driver section: injects the Adreno driver package into the Windows image.

use futures::future::{BoxFuture, FutureExt};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::{Section, SectionKind};
use crate::config::SettingsService;
use crate::error::{CompositionError, DeviceError};
use crate::orchestrator::steps::StepContext;
use crate::services::{MarkdownDisplayer, Services};

const GPU_NOTES: &str = "\
# GPU drivers installed

The graphics drivers take effect on the next boot of Windows.

* The first boot after installing drivers takes longer than usual.
* If the screen stays black, boot into Windows Phone and run **Install GPU** again.
";

/// Count `.inf` files under `dir`, recursively.
pub fn count_inf_files(dir: &Path) -> io::Result<usize> {
    let mut count = 0;
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if entry.file_type()?.is_dir() {
            count += count_inf_files(&path)?;
        } else if path
            .extension()
            .map_or(false, |ext| ext.eq_ignore_ascii_case("inf"))
        {
            count += 1;
        }
    }
    Ok(count)
}

pub struct GpuSection {
    settings: Arc<SettingsService>,
    markdown: Arc<dyn MarkdownDisplayer>,
}

/// Entry in [`BUILTIN_SECTIONS`](super::BUILTIN_SECTIONS).
pub fn create(services: &Services) -> Result<Arc<dyn Section>, CompositionError> {
    Ok(Arc::new(GpuSection::new(
        Arc::clone(&services.settings),
        Arc::clone(&services.markdown),
    )))
}

impl GpuSection {
    pub const ID: &'static str = "gpu";

    pub fn new(settings: Arc<SettingsService>, markdown: Arc<dyn MarkdownDisplayer>) -> Self {
        GpuSection { settings, markdown }
    }

    async fn locate_package(&self) -> Result<(PathBuf, usize), DeviceError> {
        let package = self.settings.get().gpu_driver_path;
        if !package.is_dir() {
            return Err(DeviceError::DriverPackage(format!(
                "no driver package at {}",
                package.display()
            )));
        }

        let scan_dir = package.clone();
        let count = tokio::task::spawn_blocking(move || count_inf_files(&scan_dir))
            .await
            .map_err(|e| DeviceError::Io(format!("driver scan failed: {}", e)))??;
        if count == 0 {
            return Err(DeviceError::DriverPackage(format!(
                "{} contains no .inf files",
                package.display()
            )));
        }
        Ok((package, count))
    }

    async fn run_impl(&self, ctx: &StepContext) -> Result<(), DeviceError> {
        let (package, count) = self.locate_package().await?;
        ctx.info(format!(
            "Installing {} GPU driver(s) from {}",
            count,
            package.display()
        ));

        ctx.device.install_drivers(&package, &ctx.progress).await?;

        self.markdown.display("GPU drivers", GPU_NOTES);
        Ok(())
    }
}

impl Section for GpuSection {
    fn id(&self) -> &'static str {
        Self::ID
    }

    fn kind(&self) -> SectionKind {
        SectionKind::Gpu
    }

    fn description(&self) -> String {
        "Install GPU drivers".to_string()
    }

    fn run<'a>(&'a self, ctx: &'a StepContext) -> BoxFuture<'a, Result<(), DeviceError>> {
        self.run_impl(ctx).boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_count_inf_files_recurses() {
        let temp = tempfile::tempdir().expect("temp dir");
        let nested = temp.path().join("qcdx").join("arm");
        fs::create_dir_all(&nested).expect("nested");
        fs::write(temp.path().join("qcdx.INF"), "").expect("inf");
        fs::write(nested.join("qcvss.inf"), "").expect("inf");
        fs::write(nested.join("qcvss.sys"), "").expect("sys");

        assert_eq!(count_inf_files(temp.path()).expect("count"), 2);
    }

    #[test]
    fn test_count_inf_files_missing_dir() {
        assert!(count_inf_files(Path::new("/definitely/not/here")).is_err());
    }
}
