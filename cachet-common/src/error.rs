// Copyright 2026 cachet Project Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::{fmt::Display, sync::Arc};

/// All kinds of [`Error`] raised by cachet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The user supplied loader failed.
    Loader,
    /// A statistics or event hook failed.
    HookFailed,
    /// The cache is shut down or terminated.
    Unavailable,
    /// The load was cancelled before it completed.
    Cancelled,
    /// The executor refused to accept a task.
    Rejected,
    /// Config error.
    Config,
    /// Join error.
    Join,
}

impl ErrorKind {
    /// Short human readable name of the kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Loader => "Loader error",
            ErrorKind::HookFailed => "Hook failed",
            ErrorKind::Unavailable => "Cache unavailable",
            ErrorKind::Cancelled => "Load cancelled",
            ErrorKind::Rejected => "Task rejected",
            ErrorKind::Config => "Config error",
            ErrorKind::Join => "Join error",
        }
    }
}

impl Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The error returned by the cache.
///
/// Displayed on a single line:
///
/// ```shell
/// Loader error, context: { key: 42 } => load failed, source: connection refused
/// ```
///
/// Cloning shares the source, so every waiter of a failed load observes the very same error.
#[derive(Debug, Clone)]
pub struct Error {
    kind: ErrorKind,
    message: String,
    context: Vec<(&'static str, String)>,
    source: Option<Arc<anyhow::Error>>,
}

impl Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.kind)?;
        if !self.context.is_empty() {
            let context = self
                .context
                .iter()
                .map(|(k, v)| format!("{k}: {v}"))
                .collect::<Vec<_>>()
                .join(", ");
            write!(f, ", context: {{ {context} }}")?;
        }
        if !self.message.is_empty() {
            write!(f, " => {}", self.message)?;
        }
        if let Some(source) = &self.source {
            write!(f, ", source: {source}")?;
        }
        Ok(())
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source.as_ref().map(|v| v.as_ref().as_ref())
    }
}

impl Error {
    /// Create a new error. Attach a cause with [`Error::with_source`].
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            context: Vec::new(),
            source: None,
        }
    }

    /// Add a context pair.
    pub fn with_context(mut self, key: &'static str, value: impl ToString) -> Self {
        self.context.push((key, value.to_string()));
        self
    }

    /// Set the cause. Setting it twice panics in debug builds.
    pub fn with_source(mut self, source: impl Into<anyhow::Error>) -> Self {
        debug_assert!(self.source.is_none(), "the source error has been set");
        self.source = Some(Arc::new(source.into()));
        self
    }

    /// Get the error kind.
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Get the error message.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Get the context pairs, in insertion order.
    pub fn context(&self) -> &[(&'static str, String)] {
        &self.context
    }

    /// Get the error source.
    pub fn source(&self) -> Option<&anyhow::Error> {
        self.source.as_deref()
    }

    /// Downcast the source error to a specific error type.
    pub fn downcast_ref<E>(&self) -> Option<&E>
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        self.source.as_deref().and_then(|e| e.downcast_ref::<E>())
    }

    /// Returns `true` if both errors share the same source allocation.
    ///
    /// Two clones of one loader failure are `same_source`, two failures of two loader invocations are not.
    pub fn same_source(&self, other: &Error) -> bool {
        match (&self.source, &other.source) {
            (Some(a), Some(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

/// Result type for cachet.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Helper for creating an [`ErrorKind::Unavailable`] error.
    pub fn unavailable(state: impl Display) -> Self {
        Error::new(ErrorKind::Unavailable, "cache is not available").with_context("state", state)
    }

    /// Helper for creating an [`ErrorKind::Loader`] error wrapping the loader failure.
    pub fn loader(source: impl Into<anyhow::Error>) -> Self {
        Error::new(ErrorKind::Loader, "load failed").with_source(source)
    }

    /// Helper for creating an [`ErrorKind::Cancelled`] error.
    pub fn cancelled() -> Self {
        Error::new(ErrorKind::Cancelled, "load cancelled")
    }
}

#[cfg(test)]
mod tests {

    use super::*;

    fn is_send_sync_static<T: Send + Sync + 'static>() {}

    #[test]
    fn test_send_sync_static() {
        is_send_sync_static::<Error>();
    }

    #[derive(Debug, Clone, PartialEq, Eq)]
    struct TestError(String);

    impl std::fmt::Display for TestError {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "TestError: {}", self.0)
        }
    }

    impl std::error::Error for TestError {}

    #[test]
    fn test_error_display() {
        let err = Error::loader(TestError("boom".to_string()))
            .with_context("k1", "v1")
            .with_context("k2", "v2");

        assert_eq!(
            "Loader error, context: { k1: v1, k2: v2 } => load failed, source: TestError: boom",
            err.to_string()
        );
    }

    #[test]
    fn test_error_downcast() {
        let inner = TestError("Error or not error, that is a question.".to_string());
        let err = Error::new(ErrorKind::Loader, "").with_source(inner.clone());

        let downcasted = err.downcast_ref::<TestError>().unwrap();
        assert_eq!(downcasted, &inner);
    }

    #[test]
    fn test_error_clone_shares_source() {
        let err = Error::loader(TestError("shared".to_string()));
        let cloned = err.clone();
        assert!(err.same_source(&cloned));

        let other = Error::loader(TestError("shared".to_string()));
        assert!(!err.same_source(&other));
    }

    #[test]
    fn test_unavailable() {
        let err = Error::unavailable("Terminated");
        assert_eq!(err.kind(), ErrorKind::Unavailable);
        assert_eq!(
            "Cache unavailable, context: { state: Terminated } => cache is not available",
            err.to_string()
        );
    }
}
