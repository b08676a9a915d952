use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use regex::Regex;

use crate::error::TaskResult;

/// A predicate over a single log line.
#[derive(Clone)]
pub struct ReadinessCheck {
    predicate: Arc<dyn Fn(&str) -> bool + Send + Sync>,
}

impl ReadinessCheck {
    pub fn new(predicate: impl Fn(&str) -> bool + Send + Sync + 'static) -> Self {
        Self {
            predicate: Arc::new(predicate),
        }
    }

    pub fn contains(pattern: impl Into<String>) -> Self {
        let pattern = pattern.into();
        Self::new(move |line| line.contains(&pattern))
    }

    pub fn matches(pattern: &str) -> TaskResult<Self> {
        let regex = Regex::new(pattern)?;
        Ok(Self::new(move |line| regex.is_match(line)))
    }

    pub fn check(&self, line: &str) -> bool {
        (self.predicate)(line)
    }
}

impl fmt::Debug for ReadinessCheck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReadinessCheck").finish_non_exhaustive()
    }
}

/// The readiness checks that have not passed yet.
/// A check is removed once any log line satisfies it, and the workload is
/// ready when no check is left.
#[derive(Debug, Clone, Default)]
pub struct ReadinessChecks {
    pending: BTreeMap<String, ReadinessCheck>,
}

impl ReadinessChecks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_check(mut self, name: impl Into<String>, check: ReadinessCheck) -> Self {
        self.pending.insert(name.into(), check);
        self
    }

    /// Removes every pending check satisfied by the line and returns their names.
    pub fn evaluate(&mut self, line: &str) -> Vec<String> {
        let passed = self
            .pending
            .iter()
            .filter(|(_, check)| check.check(line))
            .map(|(name, _)| name.clone())
            .collect::<Vec<_>>();
        for name in &passed {
            self.pending.remove(name);
        }
        passed
    }

    pub fn is_ready(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn pending(&self) -> impl Iterator<Item = &str> {
        self.pending.keys().map(|x| x.as_str())
    }
}
