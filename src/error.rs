//! Error types.
//!
//! Two families live here:
//!
//! - [`RenderError`]: invariant violations inside the pipeline (double
//!   release, double assignment of mount data, id overflow, illegal state
//!   transitions) plus user errors that reached the root error handler.
//!   These are returned immediately and propagated to the caller.
//! - [`CallbackError`]: what user callbacks (render, measure, mount, bind)
//!   report. These are routed through the component's error scope first.
//!
//! Cancellation is not an error and has no variant here.

use thiserror::Error;

/// Errors raised by the render pipeline.
#[derive(Debug, Error)]
pub enum RenderError {
    /// Mount content for an output was released twice.
    #[error("mount content for output {id:#x} was already released")]
    DoubleRelease { id: u64 },

    /// `NodeInfo` may only be assigned once per render unit.
    #[error("node info already set on output {id:#x}")]
    NodeInfoAlreadySet { id: u64 },

    /// `ViewNodeInfo` may only be assigned once per render unit.
    #[error("view node info already set on output {id:#x}")]
    ViewNodeInfoAlreadySet { id: u64 },

    /// Host nesting level does not fit the 8 bit id field.
    #[error("output level {level} exceeds the maximum of {max}")]
    LevelOverflow { level: usize, max: usize },

    /// Too many outputs share one base id.
    #[error("sequence overflow for base id {base_id:#x} (max {max})")]
    SequenceOverflow { base_id: u64, max: u32 },

    /// Component type id does not fit the 38 bit id field.
    #[error("component type id {type_id} of '{name}' exceeds 38 bits")]
    ComponentTypeOverflow { type_id: u64, name: String },

    /// Only an interrupted resolve can be resumed.
    #[error("cannot resume a resolve result that is not partial ({state})")]
    NotPartial { state: &'static str },

    /// A disappear transition was requested for a key that did not disappear.
    #[error("transition key '{key}' is {state}, not disappearing")]
    NotDisappearing { key: String, state: &'static str },

    /// Two mount items in the same pass claimed one transition key.
    #[error("transition key '{key}' is used by outputs {first:#x} and {second:#x}")]
    DuplicateTransitionKey { key: String, first: u64, second: u64 },

    /// A UI-thread-only operation ran on another thread.
    #[error("{operation} must run on the UI thread")]
    NotOnUiThread { operation: &'static str },

    /// An output's host was not mounted and could not be acquired.
    #[error("host {host_id:#x} for output {id:#x} is not mounted")]
    MissingHost { id: u64, host_id: u64 },

    /// A user callback error reached the root error handler.
    #[error("unhandled error in {component} during {phase}: {source}")]
    Callback {
        component: String,
        phase: CallbackPhase,
        #[source]
        source: CallbackError,
    },

    /// The flexbox solver rejected the node tree.
    #[error("layout solver error: {0}")]
    Solver(#[from] taffy::TaffyError),

    /// A coalesced layout computed by another caller failed.
    #[error("joined layout v{version} failed: {message}")]
    Joined { version: u64, message: String },

    /// Configuration could not be loaded.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
}

/// Where a user callback failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallbackPhase {
    Render,
    Measure,
    Mount,
    Bind,
    Event,
}

impl std::fmt::Display for CallbackPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Render => "render",
            Self::Measure => "measure",
            Self::Mount => "mount",
            Self::Bind => "bind",
            Self::Event => "event",
        };
        f.write_str(name)
    }
}

/// Error reported by user code running inside a component callback.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct CallbackError {
    pub message: String,
    #[source]
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl CallbackError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: None,
        }
    }

    /// Wrap another error as the cause.
    pub fn with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }
}

/// Errors that can occur when loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to parse config: {source}")]
    ParseError {
        #[source]
        source: toml::de::Error,
    },

    #[error("config validation failed: {message}")]
    ValidationError { message: String },
}

/// Result alias used across the pipeline.
pub type RenderResult<T> = Result<T, RenderError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_name_the_offender() {
        let err = RenderError::DoubleRelease { id: 0x2a };
        assert_eq!(err.to_string(), "mount content for output 0x2a was already released");

        let err = RenderError::NotDisappearing {
            key: "card".into(),
            state: "appeared",
        };
        assert!(err.to_string().contains("'card'"));
        assert!(err.to_string().contains("appeared"));
    }

    #[test]
    fn test_callback_error_source_chain() {
        let io = std::io::Error::other("disk");
        let err = RenderError::Callback {
            component: "Image".into(),
            phase: CallbackPhase::Mount,
            source: CallbackError::with_source("decode failed", io),
        };
        assert_eq!(err.to_string(), "unhandled error in Image during mount: decode failed");
        let source = std::error::Error::source(&err).expect("callback source");
        assert!(std::error::Error::source(source).is_some());
    }
}
