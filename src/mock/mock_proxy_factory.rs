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

use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

use crate::enums::LinkRole;
use crate::error::DeviceError;
use crate::mock::mock_encoder::{MockEncoder, MockEncoderHandle};
use crate::mock::mock_motion_controller::{MockMotionController, MockMotionHandle};
use crate::motion::proxy::{EncoderProxy, MotionProxy, ProxyFactory};

/// Factory of the handles to the mock collaborators.
pub struct MockProxyFactory {
    pub controller: Arc<MockMotionController>,
    pub encoder: Arc<MockEncoder>,
    // Number of the created handles.
    _create_count: AtomicUsize,
}

impl MockProxyFactory {
    /// Create a new factory with the online mock collaborators.
    pub fn new() -> Self {
        Self {
            controller: Arc::new(MockMotionController::new()),
            encoder: Arc::new(MockEncoder::new()),
            _create_count: AtomicUsize::new(0),
        }
    }

    /// Number of the created handles.
    pub fn create_count(&self) -> usize {
        self._create_count.load(Ordering::Relaxed)
    }
}

impl Default for MockProxyFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl ProxyFactory for MockProxyFactory {
    fn create_motion_proxy_and_ping(
        &self,
        role: LinkRole,
        _timeout_ms: u64,
    ) -> Result<Arc<dyn MotionProxy>, DeviceError> {
        let handle = MockMotionHandle::new(&self.controller);
        handle
            .ping()
            .map_err(|_| DeviceError::NoProxy(String::from(role.as_ref())))?;

        self._create_count.fetch_add(1, Ordering::Relaxed);

        Ok(Arc::new(handle))
    }

    fn create_encoder_proxy_and_ping(
        &self,
        _timeout_ms: u64,
    ) -> Result<Arc<dyn EncoderProxy>, DeviceError> {
        let handle = MockEncoderHandle::new(&self.encoder);
        handle
            .ping()
            .map_err(|_| DeviceError::NoProxy(String::from(LinkRole::Encoder.as_ref())))?;

        self._create_count.fetch_add(1, Ordering::Relaxed);

        Ok(Arc::new(handle))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_motion_proxy_and_ping() {
        let factory = MockProxyFactory::new();

        let upper = factory
            .create_motion_proxy_and_ping(LinkRole::UpperPlatform, 500)
            .unwrap();
        let lower = factory
            .create_motion_proxy_and_ping(LinkRole::LowerPlatform, 500)
            .unwrap();

        // Both handles drive the same controller.
        upper.move_absolute(0, 1.0).unwrap();
        lower.move_absolute(1, 2.0).unwrap();

        assert_eq!(factory.controller.position(0), 1.0);
        assert_eq!(factory.controller.position(1), 2.0);
        assert_eq!(factory.create_count(), 2);
    }

    #[test]
    fn test_create_offline() {
        let factory = MockProxyFactory::new();
        factory.controller.set_online(false);
        factory.encoder.set_online(false);

        assert_eq!(
            factory
                .create_motion_proxy_and_ping(LinkRole::UpperPlatform, 500)
                .err(),
            Some(DeviceError::NoProxy(String::from("UpperPlatform")))
        );
        assert!(factory.create_encoder_proxy_and_ping(500).is_err());
        assert_eq!(factory.create_count(), 0);
    }
}
