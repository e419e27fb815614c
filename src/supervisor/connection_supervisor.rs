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
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::thread::{sleep, spawn, JoinHandle};
use std::time::{Duration, Instant};

use crate::constants::{MIN_PROXY_RECONNECT_INTERVAL_SEC, SUPERVISOR_PERIOD_MS};

// Sleep slice of the supervisor so that the stop is noticed quickly.
const STOP_CHECK_SLICE_MS: u64 = 50;

/// Links to the collaborators watched by the connection supervisor. The
/// implementation owns the handles and the health flags. Only the
/// supervisor thread calls the methods that do the I/O.
pub trait SupervisedLinks: Send + Sync {
    /// Name used in the log.
    fn name(&self) -> &str;

    /// Ping the present links with the shortened timeout and release the
    /// ones that fail.
    fn ping_links(&self);

    /// Any link is missing or not.
    fn has_missing_links(&self) -> bool;

    /// Rebuild the missing links. Restore side effects are only flagged.
    fn rebuild_links(&self);

    /// Recompute the health flag.
    ///
    /// # Returns
    /// Connection is healthy or not.
    fn update_health(&self) -> bool;
}

/// Background thread that keeps the links of a device alive.
pub struct ConnectionSupervisor {
    _links: Arc<dyn SupervisedLinks>,
    _period: Duration,
    _reconnect_interval: Duration,
    _stop: Arc<AtomicBool>,
    _handle: Option<JoinHandle<()>>,
}

impl ConnectionSupervisor {
    /// Create a new supervisor.
    ///
    /// # Arguments
    /// * `links` - Links to supervise.
    /// * `reconnect_interval_sec` - Minimum interval between the rebuild
    /// attempts in second. The floor is 1 second.
    ///
    /// # Returns
    /// New supervisor that is not started.
    pub fn new(links: Arc<dyn SupervisedLinks>, reconnect_interval_sec: u64) -> Self {
        Self::with_timing(
            links,
            Duration::from_millis(SUPERVISOR_PERIOD_MS),
            Duration::from_secs(reconnect_interval_sec.max(MIN_PROXY_RECONNECT_INTERVAL_SEC)),
        )
    }

    /// Create a new supervisor with the specific timing.
    ///
    /// # Arguments
    /// * `links` - Links to supervise.
    /// * `period` - Period of the supervision cycle.
    /// * `reconnect_interval` - Minimum interval between the rebuild attempts.
    pub fn with_timing(
        links: Arc<dyn SupervisedLinks>,
        period: Duration,
        reconnect_interval: Duration,
    ) -> Self {
        Self {
            _links: links,
            _period: period,
            _reconnect_interval: reconnect_interval,
            _stop: Arc::new(AtomicBool::new(false)),
            _handle: None,
        }
    }

    /// Start the supervision thread. Nothing happens if it is running.
    pub fn start(&mut self) {
        if self.is_running() {
            return;
        }

        self._stop.store(false, Ordering::Relaxed);

        let links = self._links.clone();
        let stop = self._stop.clone();
        let period = self._period;
        let reconnect_interval = self._reconnect_interval;

        self._handle = Some(spawn(move || {
            info!("Connection supervisor of {} is running.", links.name());

            let mut cycle = SupervisionCycle::new(reconnect_interval);
            while !stop.load(Ordering::Relaxed) {
                cycle.run_once(links.as_ref(), Instant::now());

                let mut remaining = period;
                while !remaining.is_zero() && !stop.load(Ordering::Relaxed) {
                    let slice = remaining.min(Duration::from_millis(STOP_CHECK_SLICE_MS));
                    sleep(slice);
                    remaining -= slice;
                }
            }

            info!("Connection supervisor of {} is stopped.", links.name());
        }));
    }

    /// Stop the supervision thread and wait for it.
    pub fn stop(&mut self) {
        self._stop.store(true, Ordering::Relaxed);

        if let Some(handle) = self._handle.take() {
            if handle.join().is_err() {
                warn!("Connection supervisor of {} panicked.", self._links.name());
            }
        }
    }

    /// Supervision thread is running or not.
    pub fn is_running(&self) -> bool {
        self._handle
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }
}

impl Drop for ConnectionSupervisor {
    fn drop(&mut self) {
        self.stop();
    }
}

/// One step of the supervision. It is separated from the thread for the
/// deterministic tests.
pub struct SupervisionCycle {
    _reconnect_interval: Duration,
    _last_reconnect_attempt: Option<Instant>,
    _is_healthy: Option<bool>,
}

impl SupervisionCycle {
    pub fn new(reconnect_interval: Duration) -> Self {
        Self {
            _reconnect_interval: reconnect_interval,
            _last_reconnect_attempt: None,
            _is_healthy: None,
        }
    }

    /// Run one cycle: ping, rebuild when the interval allows, and update the
    /// health.
    ///
    /// # Arguments
    /// * `links` - Links to supervise.
    /// * `now` - Current time.
    ///
    /// # Returns
    /// Connection is healthy or not.
    pub fn run_once(&mut self, links: &dyn SupervisedLinks, now: Instant) -> bool {
        links.ping_links();

        if links.has_missing_links() {
            let is_allowed = self
                ._last_reconnect_attempt
                .map_or(true, |last| now.duration_since(last) >= self._reconnect_interval);

            if is_allowed {
                self._last_reconnect_attempt = Some(now);
                links.rebuild_links();
            }
        }

        let is_healthy = links.update_health();
        if self._is_healthy != Some(is_healthy) {
            if is_healthy {
                info!("Connection of {} is healthy.", links.name());
            } else {
                warn!("Connection of {} is unhealthy.", links.name());
            }
            self._is_healthy = Some(is_healthy);
        }

        is_healthy
    }
}
