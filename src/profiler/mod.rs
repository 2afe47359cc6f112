//! Profiler capability and composition.
//!
//! A [`Profiler`] analyzes one source file and returns the path of a report
//! artifact. [`AugmentingProfiler`] is the one wrapping implementation:
//! it runs an optional inner profiler first, then its own strategy, and
//! merges both outputs — inner content always before own content. Any number
//! of strategies can be layered by nesting wrappers.

pub mod c;
pub mod llm;
mod process;
pub mod python;
pub mod select;

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::error::ExecutionError;
use crate::task::RuntimeOptions;

pub use c::CProfiler;
pub use llm::OllamaProfiler;
pub use python::PythonProfiler;
pub use select::{ProfilerSelector, SelectProfiler};

/// File name of the merged report written next to the source.
pub const MERGED_REPORT_FILE: &str = "profiling.txt";

/// A unit of work that profiles one source file.
#[async_trait]
pub trait Profiler: Send + Sync {
    /// Profile the program at `source`, returning the report artifact path.
    async fn profile(
        &self,
        source: &Path,
        options: Option<&RuntimeOptions>,
    ) -> Result<PathBuf, ExecutionError>;

    /// Short label for logs and diagnostics, e.g. `c` or `augmented(llm+c)`.
    fn describe(&self) -> String;
}

impl std::fmt::Debug for dyn Profiler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.describe())
    }
}

/// Decorator that layers its own strategy's analysis on top of an inner
/// profiler's output.
pub struct AugmentingProfiler {
    inner: Option<Box<dyn Profiler>>,
    own: Box<dyn Profiler>,
}

impl AugmentingProfiler {
    pub fn new(own: Box<dyn Profiler>, inner: Option<Box<dyn Profiler>>) -> Self {
        Self { inner, own }
    }

    pub fn inner(&self) -> Option<&dyn Profiler> {
        self.inner.as_deref()
    }
}

#[async_trait]
impl Profiler for AugmentingProfiler {
    /// Runs the inner profiler first (any inner failure aborts the whole
    /// chain), then the own strategy, and writes `inner content + own
    /// content` in that exact order to [`MERGED_REPORT_FILE`] next to the
    /// source.
    async fn profile(
        &self,
        source: &Path,
        options: Option<&RuntimeOptions>,
    ) -> Result<PathBuf, ExecutionError> {
        let mut merged = String::new();

        if let Some(inner) = &self.inner {
            let inner_artifact = inner.profile(source, options).await?;
            merged.push_str(&tokio::fs::read_to_string(&inner_artifact).await?);
        }

        let own_artifact = self.own.profile(source, options).await?;
        merged.push_str(&tokio::fs::read_to_string(&own_artifact).await?);

        let merged_path = source
            .parent()
            .unwrap_or_else(|| Path::new("."))
            .join(MERGED_REPORT_FILE);
        tokio::fs::write(&merged_path, merged).await?;

        tracing::debug!(
            profiler = %self.describe(),
            artifact = %merged_path.display(),
            "Merged profiling report written"
        );
        Ok(merged_path)
    }

    fn describe(&self) -> String {
        match &self.inner {
            Some(inner) => format!("augmented({}+{})", inner.describe(), self.own.describe()),
            None => format!("augmented({})", self.own.describe()),
        }
    }
}
