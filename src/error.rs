use crate::param::Param;

/// Construction-time errors: malformed tree declarations caught once, at
/// build time, before the chart is ever pumped.
///
/// Grounded on `vivid_sm.c`'s `walk_init`/`vivid_sub_node`/`vivid_default`
/// error strings, which this preserves verbatim as message text.
#[derive(Debug, thiserror::Error)]
pub enum ChartError {
    #[error("sub-state defined more than once: {0}")]
    DuplicateState(&'static str),

    #[error("undefined default sub-state for {0}")]
    MissingDefault(&'static str),

    #[error("default already defined for {0}")]
    DuplicateDefault(&'static str),

    #[error("mixing parallel and non-parallel sub-states under {0}")]
    MixedParallel(&'static str),

    #[error("timer name not unique across chart: {0}")]
    DuplicateTimer(&'static str),

    #[error("sub-state {1} referenced by {0} was not declared")]
    UnknownTarget(&'static str, &'static str),

    #[error("sub-state {0} not yet defined")]
    UnknownDefaultTarget(&'static str),
}

/// Transient runtime errors raised while the chart is live. The engine
/// always continues after one of these; callers decide whether to treat it
/// as fatal via [`crate::Binding::error_hook`].
#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("event queue is full")]
    Full(Param),

    #[error("param size {got} exceeds max inline capacity {max}")]
    ParamTooLarge { got: usize, max: usize },
}
