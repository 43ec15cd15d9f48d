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

use std::fmt::Display;

use cachet_common::error::{Error as CommonError, ErrorKind};

/// In-memory cache error.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// Multiple error list.
    #[error(transparent)]
    Multiple(MultipleError),
    /// An event listener panicked.
    #[error("listener panicked: {0}")]
    ListenerPanic(String),
    /// Config error.
    #[error("config error: {0}")]
    Config(String),
}

impl Error {
    /// Combine multiple errors into one error.
    pub fn multiple(errs: Vec<Error>) -> Self {
        Self::Multiple(MultipleError(errs))
    }
}

/// Errors aggregated from several listeners.
#[derive(thiserror::Error, Debug)]
pub struct MultipleError(Vec<Error>);

impl MultipleError {
    /// The aggregated errors.
    pub fn errors(&self) -> &[Error] {
        &self.0
    }
}

impl Display for MultipleError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "multiple errors: [")?;
        if let Some((last, errs)) = self.0.as_slice().split_last() {
            for err in errs {
                write!(f, "{}, ", err)?;
            }
            write!(f, "{}", last)?;
        }
        write!(f, "]")?;
        Ok(())
    }
}

impl From<Error> for CommonError {
    fn from(e: Error) -> Self {
        let kind = match e {
            Error::Config(_) => ErrorKind::Config,
            Error::Multiple(_) | Error::ListenerPanic(_) => ErrorKind::HookFailed,
        };
        CommonError::new(kind, "").with_source(e)
    }
}

/// Render the payload of a caught panic.
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_multiple_error_display() {
        let err = Error::multiple(vec![
            Error::ListenerPanic("a".to_string()),
            Error::ListenerPanic("b".to_string()),
        ]);
        assert_eq!(
            err.to_string(),
            "multiple errors: [listener panicked: a, listener panicked: b]"
        );
    }

    #[test]
    fn test_into_common_error() {
        let err: CommonError = Error::Config("max entries must be positive".to_string()).into();
        assert_eq!(err.kind(), ErrorKind::Config);
        assert!(err.downcast_ref::<Error>().is_some());
    }
}
