// Copyright 2025 jonefeewang@gmail.com
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

use std::fmt;

use crate::{AppError, AppResult};

/// Collects the partial failures of a multi step operation.
#[derive(Debug, Default)]
pub struct MultiError {
    errors: Vec<AppError>,
}

impl MultiError {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, err: impl Into<AppError>) {
        self.errors.push(err.into());
    }

    /// Records the error of `result`, if any.
    pub fn check<T>(&mut self, result: AppResult<T>) -> Option<T> {
        match result {
            Ok(value) => Some(value),
            Err(err) => {
                self.errors.push(err);
                None
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn errors(&self) -> &[AppError] {
        &self.errors
    }

    pub fn into_result(self) -> AppResult<()> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(AppError::Multi(self))
        }
    }
}

impl fmt::Display for MultiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.errors.is_empty() {
            return f.write_str("<nil>");
        }
        f.write_str("multierr: [")?;
        for (i, err) in self.errors.iter().enumerate() {
            if i > 0 {
                f.write_str("  ")?;
            }
            write!(f, "``{}``", err)?;
        }
        f.write_str("]")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty() {
        let errs = MultiError::new();
        assert!(errs.is_empty());
        assert_eq!(errs.to_string(), "<nil>");
        assert!(errs.into_result().is_ok());
    }

    #[test]
    fn test_collects_errors() {
        let mut errs = MultiError::new();
        assert_eq!(errs.check(Ok::<_, AppError>(7)), Some(7));
        errs.push(AppError::AlreadyStopped);
        errs.check::<()>(Err(AppError::InvalidValue("port".into())));
        assert_eq!(errs.len(), 2);
        assert_eq!(
            errs.to_string(),
            "multierr: [``server already stopped``  ``invalid value: port``]"
        );
        let err = errs.into_result().unwrap_err();
        assert!(matches!(err, AppError::Multi(ref inner) if inner.len() == 2));
    }
}
