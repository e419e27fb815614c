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
use std::sync::{
    atomic::{AtomicBool, AtomicU32, Ordering},
    Arc, Mutex,
};

use crate::constants::{SUPERVISOR_CONNECT_TIMEOUT_MS, SUPERVISOR_PING_TIMEOUT_MS};
use crate::enums::{LinkRole, Platform};
use crate::motion::proxy::{
    ping_encoder_with_timeout, ping_motion_with_timeout, EncoderProxy, MotionProxy, ProxyFactory,
};
use crate::supervisor::connection_supervisor::SupervisedLinks;

type Slot<T> = Mutex<Option<Arc<T>>>;

/// Take a copy of the handle. The mutex is released before the handle is
/// used, so a call never holds it.
fn copy_handle<T: ?Sized>(slot: &Slot<T>) -> Option<Arc<T>> {
    slot.lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
        .clone()
}

fn store_handle<T: ?Sized>(slot: &Slot<T>, handle: Option<Arc<T>>) {
    *slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner()) = handle;
}

/// Handles to the encoder device and the two platform handles of the motion
/// controller, with the health flags shared by the supervisor and the
/// device.
pub struct ProxyLinks {
    _name: String,
    _factory: Arc<dyn ProxyFactory>,
    _encoder: Slot<dyn EncoderProxy>,
    _upper: Slot<dyn MotionProxy>,
    _lower: Slot<dyn MotionProxy>,
    _connection_healthy: AtomicBool,
    _motion_restore_pending: AtomicBool,
    _restore_retry_count: AtomicU32,
}

impl ProxyLinks {
    /// Create the links without any handle.
    ///
    /// # Arguments
    /// * `name` - Name of the owner device.
    /// * `factory` - Factory of the handles.
    pub fn new(name: &str, factory: Arc<dyn ProxyFactory>) -> Self {
        Self {
            _name: String::from(name),
            _factory: factory,
            _encoder: Mutex::new(None),
            _upper: Mutex::new(None),
            _lower: Mutex::new(None),
            _connection_healthy: AtomicBool::new(false),
            _motion_restore_pending: AtomicBool::new(false),
            _restore_retry_count: AtomicU32::new(0),
        }
    }

    /// Get the encoder handle.
    pub fn encoder(&self) -> Option<Arc<dyn EncoderProxy>> {
        copy_handle(&self._encoder)
    }

    /// Get the motion handle of the platform.
    pub fn motion(&self, platform: Platform) -> Option<Arc<dyn MotionProxy>> {
        match platform {
            Platform::Upper => copy_handle(&self._upper),
            Platform::Lower => copy_handle(&self._lower),
        }
    }

    /// All handles are present or not.
    pub fn all_present(&self) -> bool {
        self.encoder().is_some()
            && self.motion(Platform::Upper).is_some()
            && self.motion(Platform::Lower).is_some()
    }

    /// Connection is healthy or not. This never does any I/O.
    pub fn is_healthy(&self) -> bool {
        self._connection_healthy.load(Ordering::Relaxed)
    }

    /// Restore is pending after a motion handle is rebuilt or not.
    pub fn is_restore_pending(&self) -> bool {
        self._motion_restore_pending.load(Ordering::Relaxed)
    }

    /// Clear the pending restore after it succeeds.
    pub fn clear_restore_pending(&self) {
        self._motion_restore_pending.store(false, Ordering::Relaxed);
        self._restore_retry_count.store(0, Ordering::Relaxed);
    }

    /// Number of the failed restore attempts since the last rebuild.
    pub fn restore_retry_count(&self) -> u32 {
        self._restore_retry_count.load(Ordering::Relaxed)
    }

    /// Record a failed restore attempt.
    ///
    /// # Returns
    /// Number of the failed attempts.
    pub fn increment_restore_retry(&self) -> u32 {
        self._restore_retry_count.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Allow the pending restore to be retried again. The restore stays
    /// pending.
    pub fn rearm_restore_retry(&self) {
        self._restore_retry_count.store(0, Ordering::Relaxed);
    }

    /// Release all handles. Used at the teardown.
    pub fn release_all(&self) {
        store_handle(&self._encoder, None);
        store_handle(&self._upper, None);
        store_handle(&self._lower, None);

        self._connection_healthy.store(false, Ordering::Relaxed);
    }

    fn motion_slot(&self, platform: Platform) -> &Slot<dyn MotionProxy> {
        match platform {
            Platform::Upper => &self._upper,
            Platform::Lower => &self._lower,
        }
    }

    fn role(platform: Platform) -> LinkRole {
        match platform {
            Platform::Upper => LinkRole::UpperPlatform,
            Platform::Lower => LinkRole::LowerPlatform,
        }
    }
}

impl SupervisedLinks for ProxyLinks {
    fn name(&self) -> &str {
        &self._name
    }

    fn ping_links(&self) {
        if let Some(encoder) = self.encoder() {
            if let Err(error) = ping_encoder_with_timeout(encoder.as_ref(), SUPERVISOR_PING_TIMEOUT_MS)
            {
                warn!("{}: release the encoder handle: {error}.", self._name);
                store_handle(&self._encoder, None);
            }
        }

        for platform in [Platform::Upper, Platform::Lower] {
            if let Some(motion) = self.motion(platform) {
                if let Err(error) =
                    ping_motion_with_timeout(motion.as_ref(), SUPERVISOR_PING_TIMEOUT_MS)
                {
                    warn!(
                        "{}: release the {} platform handle: {error}.",
                        self._name,
                        platform.prefix()
                    );
                    store_handle(self.motion_slot(platform), None);
                }
            }
        }
    }

    fn has_missing_links(&self) -> bool {
        !self.all_present()
    }

    fn rebuild_links(&self) {
        if self.encoder().is_none() {
            if let Ok(encoder) = self
                ._factory
                .create_encoder_proxy_and_ping(SUPERVISOR_CONNECT_TIMEOUT_MS)
            {
                info!("{}: encoder handle is rebuilt.", self._name);
                store_handle(&self._encoder, Some(encoder));
            }
        }

        for platform in [Platform::Upper, Platform::Lower] {
            if self.motion(platform).is_some() {
                continue;
            }

            if let Ok(motion) = self
                ._factory
                .create_motion_proxy_and_ping(Self::role(platform), SUPERVISOR_CONNECT_TIMEOUT_MS)
            {
                info!("{}: {} platform handle is rebuilt.", self._name, platform.prefix());
                store_handle(self.motion_slot(platform), Some(motion));

                // The restore runs on the device thread.
                self._motion_restore_pending.store(true, Ordering::Relaxed);
                self._restore_retry_count.store(0, Ordering::Relaxed);
            }
        }
    }

    fn update_health(&self) -> bool {
        let is_healthy = self.all_present() && !self.is_restore_pending();
        self._connection_healthy.store(is_healthy, Ordering::Relaxed);

        is_healthy
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::time::{Duration, Instant};

    use crate::mock::mock_proxy_factory::MockProxyFactory;
    use crate::supervisor::connection_supervisor::SupervisionCycle;

    fn create_links() -> (ProxyLinks, Arc<MockProxyFactory>) {
        let factory = Arc::new(MockProxyFactory::new());
        (ProxyLinks::new("reflection", factory.clone()), factory)
    }

    #[test]
    fn test_rebuild_links() {
        let (links, factory) = create_links();

        assert!(links.has_missing_links());
        assert!(!links.update_health());

        links.rebuild_links();

        assert!(links.all_present());
        assert!(links.is_restore_pending());
        assert_eq!(factory.create_count(), 3);

        // Not healthy until the restore is done.
        assert!(!links.update_health());

        links.clear_restore_pending();

        assert!(links.update_health());
        assert!(links.is_healthy());
    }

    #[test]
    fn test_ping_links_release() {
        let (links, factory) = create_links();
        links.rebuild_links();
        links.clear_restore_pending();

        factory.controller.set_online(false);
        links.ping_links();

        assert!(links.encoder().is_some());
        assert!(links.motion(Platform::Upper).is_none());
        assert!(links.motion(Platform::Lower).is_none());
        assert!(!links.update_health());

        // The original timeout is restored after the failed ping.
        assert!(links.encoder().unwrap().timeout_ms() > SUPERVISOR_PING_TIMEOUT_MS);
    }

    #[test]
    fn test_encoder_rebuild_needs_no_restore() {
        let (links, factory) = create_links();
        links.rebuild_links();
        links.clear_restore_pending();

        factory.encoder.set_online(false);
        links.ping_links();

        assert!(links.encoder().is_none());

        factory.encoder.set_online(true);
        links.rebuild_links();

        assert!(!links.is_restore_pending());
        assert!(links.update_health());
    }

    #[test]
    fn test_held_handle_survives_release() {
        let (links, factory) = create_links();
        links.rebuild_links();

        // The request path holds a copy of the handle.
        let upper = links.motion(Platform::Upper).unwrap();

        factory.controller.set_online(false);
        links.ping_links();
        factory.controller.set_online(true);

        assert!(links.motion(Platform::Upper).is_none());
        assert!(upper.move_absolute(0, 1.0).is_ok());
    }

    #[test]
    fn test_restore_retry_count() {
        let (links, _) = create_links();

        assert_eq!(links.increment_restore_retry(), 1);
        assert_eq!(links.increment_restore_retry(), 2);

        links.rebuild_links();

        assert_eq!(links.restore_retry_count(), 0);
    }

    #[test]
    fn test_rearm_restore_retry() {
        let (links, _) = create_links();
        links.rebuild_links();

        for _ in 0..3 {
            links.increment_restore_retry();
        }
        links.rearm_restore_retry();

        assert_eq!(links.restore_retry_count(), 0);
        assert!(links.is_restore_pending());
        assert!(!links.update_health());
    }

    #[test]
    fn test_supervision_cycle() {
        let (links, factory) = create_links();
        let mut cycle = SupervisionCycle::new(Duration::from_secs(1));
        let begin = Instant::now();

        assert!(!cycle.run_once(&links, begin));
        assert!(links.is_restore_pending());

        links.clear_restore_pending();

        assert!(cycle.run_once(&links, begin + Duration::from_millis(500)));

        factory.controller.set_online(false);

        assert!(!cycle.run_once(&links, begin + Duration::from_millis(1000)));
        assert!(!links.is_healthy());
    }
}
