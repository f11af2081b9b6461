//! Persisted show throttle.
//!
//! Caps how many treatment occurrences a client sees over the whole study.
//! The count lives in durable preferences so the cap holds across restarts.
//! Check and increment are one synchronous call: nothing can interleave
//! between reading the count and writing it back.

use studykit_host::PersistentKv;
use tracing::debug;

use crate::error::{Result, StudyError};

/// Result of asking the throttle for a slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThrottleDecision {
    /// Slot taken; `shown` is the count after this occurrence
    Allowed { shown: u32 },
    /// The cap is reached
    Exhausted { shown: u32 },
}

impl ThrottleDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allowed { .. })
    }
}

/// Show counter with a fixed cap.
#[derive(Debug, Clone)]
pub struct ShowThrottle {
    key: String,
    max: u32,
}

impl ShowThrottle {
    pub fn new(key: impl Into<String>, max: u32) -> Self {
        Self {
            key: key.into(),
            max,
        }
    }

    pub fn max(&self) -> u32 {
        self.max
    }

    /// Current count, 0 when unset. A stored count beyond `u32::MAX` reads
    /// as `u32::MAX`; a negative one is a storage error.
    pub fn count(&self, prefs: &dyn PersistentKv) -> Result<u32> {
        let raw = prefs.get_int(&self.key, 0)?;
        if raw < 0 {
            return Err(StudyError::storage(format!(
                "show counter {} is negative: {raw}",
                self.key
            )));
        }
        Ok(u32::try_from(raw).unwrap_or(u32::MAX))
    }

    /// Take a slot if one is left, persisting the new count before returning.
    pub fn try_acquire(&self, prefs: &dyn PersistentKv) -> Result<ThrottleDecision> {
        let shown = self.count(prefs)?;
        if shown >= self.max {
            debug!(shown, max = self.max, "Show throttle exhausted");
            return Ok(ThrottleDecision::Exhausted { shown });
        }
        let shown = shown + 1;
        prefs.set(&self.key, i64::from(shown).into())?;
        Ok(ThrottleDecision::Allowed { shown })
    }

    /// Set the count back to 0.
    pub fn reset(&self, prefs: &dyn PersistentKv) -> Result<()> {
        prefs.set(&self.key, 0i64.into())?;
        Ok(())
    }
}
