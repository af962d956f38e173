//! Execution-context identity.
//!
//! Scope stacks and resolution chains are tracked per execution context. A
//! context is the current OS thread, or, with the `async` feature, the tokio
//! task the caller runs in. Tasks may hop between worker threads at every
//! `.await`, so the task id is the stable identity there.

use std::fmt;
use std::thread::{self, ThreadId};

/// Identity of the thread or task that is calling into the container.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContextId {
    Thread(ThreadId),
    #[cfg(feature = "async")]
    Task(tokio::task::Id),
}

impl ContextId {
    /// The context of the caller.
    pub fn current() -> Self {
        #[cfg(feature = "async")]
        if let Some(id) = tokio::task::try_id() {
            return ContextId::Task(id);
        }

        ContextId::Thread(thread::current().id())
    }
}

impl fmt::Debug for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContextId::Thread(id) => write!(f, "{id:?}"),
            #[cfg(feature = "async")]
            ContextId::Task(id) => write!(f, "Task({id})"),
        }
    }
}
