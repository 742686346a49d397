use thiserror::Error;

/// Errors surfaced by the query engine itself, as opposed to errors
/// propagated from a graph collaborator (those travel as `anyhow::Error`
/// with context attached at the point they're discovered).
#[derive(Debug, Error)]
pub enum QueryError {
    #[error("universe_scope must contain at least one target pattern")]
    EmptyUniverse,

    #[error(
        "expected exactly one successful universe root value, got {0} (programming invariant violation)"
    )]
    UniverseAnomaly(usize),

    #[error("target `{0}` not found")]
    TargetNotFound(String),

    #[error("target `{0}` is in a package that failed to load")]
    PackageContainsErrors(String),

    #[error("query was cancelled")]
    Cancelled,

    #[error("evaluation of `{expr}` failed: one or more errors were reported during evaluation")]
    EvaluationFailed { expr: String },

    #[error("batch streaming callback was already flushed")]
    CallbackAlreadyFlushed,

    #[error("a top-level query is already in progress on this engine instance")]
    AlreadyEvaluating,

    #[error("failed to parse target pattern `{pattern}`: {message}")]
    PatternParse { pattern: String, message: String },
}

/// Marker a collaborator returns when it detects cancellation as a value
/// rather than via a dropped future — the rare case §5/§13 call out
/// (ordinary cancellation is just the awaited future being dropped).
#[derive(Debug, Error)]
#[error("operation was cancelled")]
pub struct CancellationSignal;

/// Rewrites a `CancellationSignal` surfaced by a collaborator into the
/// driver's own `QueryError::Cancelled`, leaving every other error
/// untouched (§7 kind 9).
pub fn translate_cancellation(err: anyhow::Error) -> anyhow::Error {
    if err.is::<CancellationSignal>() {
        QueryError::Cancelled.into()
    } else {
        err
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn non_cancellation_errors_pass_through_untouched() {
        let err = anyhow::anyhow!("some other failure");
        let translated = translate_cancellation(err);
        assert!(!matches!(translated.downcast_ref::<QueryError>(), Some(QueryError::Cancelled)));
    }

    #[test]
    fn cancellation_signal_becomes_query_error() {
        let err: anyhow::Error = CancellationSignal.into();
        let translated = translate_cancellation(err);
        assert!(matches!(
            translated.downcast_ref::<QueryError>(),
            Some(QueryError::Cancelled)
        ));
    }
}
