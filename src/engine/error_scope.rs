//! Error scopes - chained handlers for user callback failures.
//!
//! Every component may install an [`ErrorHandler`]. The resolver threads an
//! [`ErrorScope`] down the tree, pushing a link for each component that has
//! one, so a failure inside a measure or mount callback reaches the nearest
//! ancestor's handler first and then walks up toward the root:
//!
//! ```text
//! Root (handler) ◀── Card (handler) ◀── Image::measure fails
//!                         │
//!                         └─ Propagate ─▶ Root ─ Propagate ─▶ RenderError::Callback
//! ```

use std::fmt;
use std::sync::Arc;

use crate::error::{CallbackError, CallbackPhase, RenderError};

/// What a handler did with an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorDisposition {
    /// Consumed, the operation continues in its degraded form.
    Handled,
    /// Hand it to the parent scope.
    Propagate,
}

/// A component-scoped error handler.
pub trait ErrorHandler: Send + Sync {
    fn on_error(
        &self,
        component: &str,
        phase: CallbackPhase,
        error: &CallbackError,
    ) -> ErrorDisposition;
}

impl<F> ErrorHandler for F
where
    F: Fn(&str, CallbackPhase, &CallbackError) -> ErrorDisposition + Send + Sync,
{
    fn on_error(
        &self,
        component: &str,
        phase: CallbackPhase,
        error: &CallbackError,
    ) -> ErrorDisposition {
        self(component, phase, error)
    }
}

struct ScopeLink {
    owner: String,
    handler: Arc<dyn ErrorHandler>,
    parent: ErrorScope,
}

/// Immutable linked list of handlers from a node up to the root.
///
/// Cloning is cheap; scopes are shared by every node below the owner.
#[derive(Clone, Default)]
pub struct ErrorScope(Option<Arc<ScopeLink>>);

impl ErrorScope {
    /// The root scope. Errors reaching it become [`RenderError::Callback`].
    pub fn root() -> Self {
        Self(None)
    }

    /// A child scope whose first handler is `handler`.
    pub fn push(&self, owner: impl Into<String>, handler: Arc<dyn ErrorHandler>) -> Self {
        Self(Some(Arc::new(ScopeLink {
            owner: owner.into(),
            handler,
            parent: self.clone(),
        })))
    }

    /// Number of handlers between here and the root.
    pub fn depth(&self) -> usize {
        let mut depth = 0;
        let mut scope = self;
        while let Some(link) = &scope.0 {
            depth += 1;
            scope = &link.parent;
        }
        depth
    }

    /// Offer `error` to each handler from the innermost outward.
    ///
    /// Returns `Ok(())` when some handler consumed it.
    pub fn route(
        &self,
        component: &str,
        phase: CallbackPhase,
        error: CallbackError,
    ) -> Result<(), RenderError> {
        let mut scope = self;
        while let Some(link) = &scope.0 {
            if link.handler.on_error(component, phase, &error) == ErrorDisposition::Handled {
                log::debug!(
                    "{phase} error in {component} handled by scope of {}: {error}",
                    link.owner
                );
                return Ok(());
            }
            scope = &link.parent;
        }
        log::warn!("unhandled {phase} error in {component}: {error}");
        Err(RenderError::Callback {
            component: component.to_string(),
            phase,
            source: error,
        })
    }
}

impl fmt::Debug for ErrorScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut owners = Vec::new();
        let mut scope = self;
        while let Some(link) = &scope.0 {
            owners.push(link.owner.as_str());
            scope = &link.parent;
        }
        f.debug_tuple("ErrorScope").field(&owners).finish()
    }
}
