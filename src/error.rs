use crate::native::NativeHandle;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ResourceError {
    #[error("{0}")]
    Disposed(#[from] DisposeError),

    #[error("native resource access failed: {0}")]
    Native(#[from] NativeError),
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum DisposeError {
    #[error("cannot access disposed object '{name}' ({context})")]
    UseAfterDispose { name: String, context: String },

    #[error("'{owner}' cannot adopt '{child}': it would end up owning itself")]
    OwnershipCycle { owner: String, child: String },
}

/// Failures reported by the native heap. Inside a cleanup hook these are the
/// release failures that get logged and swallowed.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum NativeError {
    #[error("native handle {0} is not allocated")]
    InvalidHandle(NativeHandle),
    #[error("native handle {handle} holds a {actual}, expected a {expected}")]
    KindMismatch {
        handle: NativeHandle,
        expected: &'static str,
        actual: &'static str,
    },
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConfigError {
    #[error("invalid value for {var}: {value:?} ({reason})")]
    InvalidValue {
        var: &'static str,
        value: String,
        reason: String,
    },
}
