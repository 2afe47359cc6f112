//! Profiler selection policy — maps `(language, mode)` to a strategy.

use tracing::{debug, warn};

use crate::config::OllamaConfig;
use crate::error::TaskError;
use crate::profiler::{
    AugmentingProfiler, CProfiler, OllamaProfiler, Profiler, PythonProfiler,
};
use crate::task::{Language, ProfilingMode};

/// Chooses a concrete profiler (and whether to wrap it) for a request.
pub trait SelectProfiler: Send + Sync {
    fn select(
        &self,
        language: &Language,
        mode: Option<ProfilingMode>,
    ) -> Result<Box<dyn Profiler>, TaskError>;
}

/// Default policy.
///
/// - absent mode falls back to the configured default
/// - `llm` returns the bare LLM strategy for any language, never wrapped
/// - otherwise the language strategy, with the LLM strategy as inner layer
///   when the mode is `augmented`
/// - a language without a classical strategy is an error in non-LLM modes
pub struct ProfilerSelector {
    default_mode: ProfilingMode,
    ollama: OllamaConfig,
}

impl ProfilerSelector {
    pub fn new(default_mode: ProfilingMode, ollama: OllamaConfig) -> Self {
        Self {
            default_mode,
            ollama,
        }
    }
}

impl SelectProfiler for ProfilerSelector {
    fn select(
        &self,
        language: &Language,
        mode: Option<ProfilingMode>,
    ) -> Result<Box<dyn Profiler>, TaskError> {
        let mode = mode.unwrap_or_else(|| {
            warn!(default = %self.default_mode, "Profiling mode not set, using default");
            self.default_mode
        });

        if mode == ProfilingMode::Llm {
            debug!(%language, "Selected bare LLM profiler");
            return Ok(Box::new(OllamaProfiler::new(&self.ollama)));
        }

        let strategy: Box<dyn Profiler> = match language.as_str() {
            "python" => Box::new(PythonProfiler::new()),
            "c" => Box::new(CProfiler::new()),
            other => {
                return Err(TaskError::UnsupportedLanguage {
                    language: other.to_string(),
                    mode: mode.to_string(),
                });
            }
        };

        let inner: Option<Box<dyn Profiler>> = if mode == ProfilingMode::Augmented {
            Some(Box::new(OllamaProfiler::new(&self.ollama)))
        } else {
            None
        };

        let profiler = AugmentingProfiler::new(strategy, inner);
        debug!(%language, %mode, profiler = %profiler.describe(), "Selected profiler");
        Ok(Box::new(profiler))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn selector() -> ProfilerSelector {
        ProfilerSelector::new(ProfilingMode::Classical, OllamaConfig::default())
    }

    #[test]
    fn augmented_c_layers_llm_inside() {
        let profiler = selector()
            .select(&Language::c(), Some(ProfilingMode::Augmented))
            .unwrap();
        assert_eq!(profiler.describe(), "augmented(llm+c)");
    }

    #[test]
    fn classical_c_has_no_inner_layer() {
        let profiler = selector()
            .select(&Language::c(), Some(ProfilingMode::Classical))
            .unwrap();
        assert_eq!(profiler.describe(), "augmented(c)");
    }

    #[test]
    fn llm_mode_is_never_wrapped() {
        for language in [Language::python(), Language::c(), Language::new("zig")] {
            let profiler = selector()
                .select(&language, Some(ProfilingMode::Llm))
                .unwrap();
            assert_eq!(profiler.describe(), "llm");
        }
    }

    #[test]
    fn absent_mode_defaults_to_classical() {
        let profiler = selector().select(&Language::python(), None).unwrap();
        assert_eq!(profiler.describe(), "augmented(python)");
    }

    #[test]
    fn unknown_language_fails_in_classical_mode() {
        let err = selector()
            .select(&Language::new("fortran"), Some(ProfilingMode::Classical))
            .unwrap_err();
        assert!(matches!(
            err,
            TaskError::UnsupportedLanguage { ref language, .. } if language == "fortran"
        ));
    }

    #[test]
    fn unknown_language_fails_in_augmented_mode() {
        assert!(selector()
            .select(&Language::new("cobol"), Some(ProfilingMode::Augmented))
            .is_err());
    }
}
