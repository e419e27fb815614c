// This file is part of instrument_controller.
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <https://www.gnu.org/licenses/>.

use log::{info, warn};

use crate::enums::SelfCheckState;

/// One pass of the self-check. A pass goes from CHECKING to SUCCEED,
/// WARNING or FAILED.
#[derive(Debug, Clone)]
pub struct SelfCheck {
    _state: SelfCheckState,
    _warnings: Vec<String>,
    _failures: Vec<String>,
}

impl SelfCheck {
    pub fn new() -> Self {
        Self {
            _state: SelfCheckState::Idle,
            _warnings: Vec::new(),
            _failures: Vec::new(),
        }
    }

    pub fn state(&self) -> SelfCheckState {
        self._state
    }

    /// Reasons of the last pass joined by "; ".
    pub fn reason(&self) -> String {
        self._failures
            .iter()
            .chain(self._warnings.iter())
            .cloned()
            .collect::<Vec<String>>()
            .join("; ")
    }

    /// Begin a new pass.
    pub fn begin(&mut self) {
        self._state = SelfCheckState::Checking;
        self._warnings.clear();
        self._failures.clear();
    }

    /// Record a partial failure.
    pub fn warn(&mut self, reason: &str) {
        if self._state == SelfCheckState::Checking {
            self._warnings.push(String::from(reason));
        }
    }

    /// Record a failure.
    pub fn fail(&mut self, reason: &str) {
        if self._state == SelfCheckState::Checking {
            self._failures.push(String::from(reason));
        }
    }

    /// Finish the pass. Nothing happens if no pass is running.
    ///
    /// # Returns
    /// Final state.
    pub fn finish(&mut self) -> SelfCheckState {
        if self._state != SelfCheckState::Checking {
            return self._state;
        }

        self._state = if !self._failures.is_empty() {
            SelfCheckState::Failed
        } else if !self._warnings.is_empty() {
            SelfCheckState::Warning
        } else {
            SelfCheckState::Succeed
        };

        match self._state {
            SelfCheckState::Succeed => info!("Self-check succeeds."),
            _ => warn!("Self-check ends in {:?}: {}.", self._state, self.reason()),
        }

        self._state
    }

    /// Return to IDLE.
    pub fn reset(&mut self) {
        self._state = SelfCheckState::Idle;
        self._warnings.clear();
        self._failures.clear();
    }
}

impl Default for SelfCheck {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pass_succeed() {
        let mut check = SelfCheck::new();

        check.begin();

        assert_eq!(check.state(), SelfCheckState::Checking);
        assert_eq!(check.finish(), SelfCheckState::Succeed);
        assert_eq!(check.reason(), "");
    }

    #[test]
    fn test_pass_warning_and_failed() {
        let mut check = SelfCheck::new();

        check.begin();
        check.warn("gauge 1");

        assert_eq!(check.finish(), SelfCheckState::Warning);

        check.begin();
        check.warn("gauge 1");
        check.fail("PLC");

        assert_eq!(check.finish(), SelfCheckState::Failed);
        assert_eq!(check.reason(), "PLC; gauge 1");
    }

    #[test]
    fn test_finish_without_begin() {
        let mut check = SelfCheck::new();
        check.fail("PLC");

        assert_eq!(check.finish(), SelfCheckState::Idle);
        assert_eq!(check.reason(), "");
    }

    #[test]
    fn test_new_pass_from_failed() {
        let mut check = SelfCheck::new();
        check.begin();
        check.fail("PLC");
        check.finish();

        check.begin();

        assert_eq!(check.state(), SelfCheckState::Checking);
        assert_eq!(check.finish(), SelfCheckState::Succeed);
    }
}
