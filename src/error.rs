use thiserror::Error;

/// Errors surfaced by grid construction, inference and subdivision.
///
/// None of these are retried internally: each one points at a modeling or
/// configuration problem the caller has to resolve.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BayesError {
    /// Malformed parameter, condition or option declarations.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The model-output table does not cover the grid × condition product.
    #[error("incomplete model data: {missing} point(s) missing, e.g. {example}")]
    IncompleteModelData { missing: usize, example: String },

    /// An observation assigned zero likelihood to every box.
    #[error("degenerate update: {detail}")]
    DegenerateUpdate {
        observation: Option<usize>,
        detail: String,
    },

    /// Subdivision was requested but no box exceeds the probability threshold.
    #[error("no concentration: no box has probability above {threshold}")]
    NoConcentration { threshold: f64 },

    /// Non-finite values, wrong arity or otherwise unusable rows.
    #[error("invalid data: {0}")]
    InvalidData(String),
}

impl BayesError {
    pub fn config(message: impl Into<String>) -> Self {
        BayesError::Configuration(message.into())
    }

    pub fn data(message: impl Into<String>) -> Self {
        BayesError::InvalidData(message.into())
    }

    /// Attach the offending observation to a `DegenerateUpdate`.
    pub fn for_observation(self, index: usize, describe: impl FnOnce() -> String) -> Self {
        match self {
            BayesError::DegenerateUpdate { .. } => BayesError::DegenerateUpdate {
                observation: Some(index),
                detail: describe(),
            },
            other => other,
        }
    }

    /// Process exit code for front-ends that wrap this library.
    pub fn exit_code(&self) -> u8 {
        match self {
            BayesError::Configuration(_) => 2,
            BayesError::IncompleteModelData { .. } | BayesError::InvalidData(_) => 3,
            BayesError::DegenerateUpdate { .. } | BayesError::NoConcentration { .. } => 4,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes_group_by_kind() {
        assert_eq!(BayesError::config("x").exit_code(), 2);
        assert_eq!(BayesError::data("x").exit_code(), 3);
        assert_eq!(
            BayesError::NoConcentration { threshold: 0.001 }.exit_code(),
            4
        );
    }

    #[test]
    fn degenerate_update_names_the_observation() {
        let err = BayesError::DegenerateUpdate {
            observation: None,
            detail: "zero total likelihood".to_string(),
        }
        .for_observation(17, || "observation 17 at T=300".to_string());
        assert!(matches!(
            err,
            BayesError::DegenerateUpdate {
                observation: Some(17),
                ..
            }
        ));
        assert!(err.to_string().contains("observation 17"));

        let untouched = BayesError::config("x").for_observation(3, String::new);
        assert_eq!(untouched, BayesError::config("x"));
    }
}
