//! An embeddable hierarchical state machine (statechart) runtime.
//!
//! [`Chart`] owns a static tree of [`Node`]s built once at construction time
//! via a [`Builder`], a bounded [`queue::Queue`] of incoming events, and a
//! set of named [`timer::TimerState`]s. Events are pushed from any thread
//! through [`Chart::queue_event`]; all state-tree mutation and handler
//! invocation happens on the single owning task inside [`Chart::pump`].
//!
//! See `DESIGN.md` in the repository root for the design rationale.

mod binding;
mod builder;
mod chart;
mod error;
mod node;
mod param;
mod queue;
mod timer;
mod transition;

pub use binding::{Binding, BindingErrorKind};
pub use builder::Builder;
pub use chart::{Chart, ChartHandle};
pub use error::{ChartError, QueueError};
pub use node::NodeKind;
pub use param::Param;
pub use queue::QueueMode;

#[cfg(test)]
mod test_binding;
