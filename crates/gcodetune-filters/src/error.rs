//! Filter-specific errors

use thiserror::Error;

/// Errors raised by filters beyond what the core pipeline models
#[derive(Debug, Error)]
pub enum FilterError {
    #[error(transparent)]
    Core(#[from] gcodetune_core::Error),

    /// The document cannot host the requested temperature gradient
    #[error("cannot build temperature gradient: {reason}")]
    GradientImpossible { reason: String },
}

impl FilterError {
    /// Adapt to the pipeline's error type, naming the originating filter
    pub fn into_core(self, filter: &str) -> gcodetune_core::Error {
        match self {
            FilterError::Core(inner) => inner,
            other => gcodetune_core::Error::Filter {
                filter: filter.to_string(),
                reason: other.to_string(),
            },
        }
    }
}

pub type Result<T> = std::result::Result<T, FilterError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_into_core_preserves_core_errors() {
        let core = gcodetune_core::Error::EmptyDocument;
        let wrapped = FilterError::Core(core);
        assert!(matches!(
            wrapped.into_core("x"),
            gcodetune_core::Error::EmptyDocument
        ));
    }

    #[test]
    fn test_into_core_names_the_filter() {
        let err = FilterError::GradientImpossible {
            reason: "flat".to_string(),
        };
        match err.into_core("tempcal") {
            gcodetune_core::Error::Filter { filter, reason } => {
                assert_eq!(filter, "tempcal");
                assert!(reason.contains("flat"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
