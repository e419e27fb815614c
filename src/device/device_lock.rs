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

use log::info;

use crate::error::DeviceError;

/// Exclusive lock of a device by one client.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct DeviceLock {
    _locked: bool,
    _locker_id: String,
}

impl DeviceLock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_locked(&self) -> bool {
        self._locked
    }

    /// Client that holds the lock. Empty if unlocked.
    pub fn locker_id(&self) -> &str {
        &self._locker_id
    }

    /// Check the client can operate the device.
    ///
    /// # Arguments
    /// * `client_id` - Client ID.
    ///
    /// # Errors
    /// DeviceLocked if another client holds the lock.
    pub fn check(&self, client_id: &str) -> Result<(), DeviceError> {
        if self._locked && self._locker_id != client_id {
            return Err(DeviceError::DeviceLocked(self._locker_id.clone()));
        }

        Ok(())
    }

    /// Acquire the lock. Acquiring it again by the holder is allowed.
    ///
    /// # Arguments
    /// * `client_id` - Client ID.
    ///
    /// # Errors
    /// DeviceLocked if another client holds the lock, InvalidArgs if the
    /// client ID is empty.
    pub fn lock(&mut self, client_id: &str) -> Result<(), DeviceError> {
        if client_id.is_empty() {
            return Err(DeviceError::InvalidArgs(String::from(
                "client ID is required to lock the device",
            )));
        }

        self.check(client_id)?;

        self._locked = true;
        self._locker_id = String::from(client_id);

        info!("Device is locked by {client_id}.");

        Ok(())
    }

    /// Release the lock.
    ///
    /// # Arguments
    /// * `client_id` - Client ID.
    ///
    /// # Errors
    /// DeviceLocked if another client holds the lock.
    pub fn unlock(&mut self, client_id: &str) -> Result<(), DeviceError> {
        self.check(client_id)?;

        if self._locked {
            info!("Device is unlocked by {client_id}.");
        }

        self._locked = false;
        self._locker_id.clear();

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lock() {
        let mut lock = DeviceLock::new();

        assert!(lock.check("a").is_ok());

        lock.lock("a").unwrap();

        assert!(lock.is_locked());
        assert_eq!(lock.locker_id(), "a");
        assert!(lock.check("a").is_ok());
        assert_eq!(
            lock.check("b"),
            Err(DeviceError::DeviceLocked(String::from("a")))
        );
        assert!(lock.lock("b").is_err());
        assert!(lock.lock("a").is_ok());
    }

    #[test]
    fn test_lock_empty_client() {
        let mut lock = DeviceLock::new();

        assert!(matches!(lock.lock(""), Err(DeviceError::InvalidArgs(_))));
    }

    #[test]
    fn test_unlock() {
        let mut lock = DeviceLock::new();
        lock.lock("a").unwrap();

        assert!(lock.unlock("b").is_err());
        assert!(lock.is_locked());

        lock.unlock("a").unwrap();

        assert!(!lock.is_locked());
        assert!(lock.check("b").is_ok());

        // Unlock an unlocked device.
        assert!(lock.unlock("b").is_ok());
    }
}
