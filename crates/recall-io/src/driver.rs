//! Device driver: ring consumer and musical clock.
//!
//! A [`DeviceDriver`] owns one [`SoundDevice`] backend and shares the
//! device's ring and clock with the producers that mix into it. Each cycle
//! it copies the front slot out under the device lock, writes the copy to
//! the backend with no lock held, then completes the buffer (clear, rotate,
//! tic) and notifies the scheduler through a weak [`OffsetListener`].
//!
//! The driver runs either on its own thread ([`DeviceDriver::start`]) or is
//! stepped by the caller ([`DeviceDriver::step`]) for offline rendering.

use std::sync::{Arc, Weak};
use std::thread::JoinHandle;
use std::time::Instant;

use crossbeam_channel::{Receiver, Sender, unbounded};
use parking_lot::Mutex;
use recall_core::{AudioGeometry, DriverControl, OffsetListener, SharedDeviceState};

use crate::backend::SoundDevice;
use crate::{Error, Result};

/// Lifecycle of a [`DeviceDriver`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverPhase {
    /// Created, backend not opened yet.
    Idle,
    /// Backend open; buffers are consumed.
    Running,
    /// Stopped on request or after a backend failure. Terminal.
    Stopped,
}

/// Consumes a device ring into a [`SoundDevice`].
pub struct DeviceDriver {
    name: String,
    geometry: AudioGeometry,
    state: SharedDeviceState,
    device: Mutex<Box<dyn SoundDevice>>,
    scratch: Mutex<Vec<f32>>,
    phase: Mutex<DriverPhase>,
    listener: Mutex<Option<Weak<dyn OffsetListener>>>,
    errors: (Sender<Error>, Receiver<Error>),
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl DeviceDriver {
    /// Creates an idle driver for `device`.
    ///
    /// `state` must have been built for `geometry`: its ring holds buffers
    /// of `buffer_size * pcm_channels` samples.
    pub fn new(device: Box<dyn SoundDevice>, geometry: AudioGeometry, state: SharedDeviceState) -> Self {
        let capacity = geometry.buffer_size() * usize::from(geometry.pcm_channels());
        Self {
            name: device.name().to_string(),
            geometry,
            state,
            device: Mutex::new(device),
            scratch: Mutex::new(Vec::with_capacity(capacity)),
            phase: Mutex::new(DriverPhase::Idle),
            listener: Mutex::new(None),
            errors: unbounded(),
            thread: Mutex::new(None),
        }
    }

    /// Sets the listener notified of offset changes and completed buffers.
    pub fn with_listener(self, listener: Weak<dyn OffsetListener>) -> Self {
        self.set_listener(listener);
        self
    }

    /// Replaces the listener.
    pub fn set_listener(&self, listener: Weak<dyn OffsetListener>) {
        *self.listener.lock() = Some(listener);
    }

    /// Geometry the backend was opened with.
    pub fn geometry(&self) -> &AudioGeometry {
        &self.geometry
    }

    /// Current lifecycle phase.
    pub fn phase(&self) -> DriverPhase {
        *self.phase.lock()
    }

    /// Receiver for faults raised on the driver thread.
    pub fn errors(&self) -> Receiver<Error> {
        self.errors.1.clone()
    }

    /// Opens the backend and enters [`DriverPhase::Running`].
    ///
    /// Opening a running driver is a no-op; a stopped driver stays stopped.
    pub fn open(&self) -> Result<()> {
        let mut phase = self.phase.lock();
        match *phase {
            DriverPhase::Running => return Ok(()),
            DriverPhase::Stopped => return Err(Error::Stopped(self.name.clone())),
            DriverPhase::Idle => {}
        }
        if let Err(e) = self.device.lock().open(&self.geometry) {
            *phase = DriverPhase::Stopped;
            tracing::error!(driver = %self.name, error = %e, "device failed to open");
            return Err(e);
        }
        *phase = DriverPhase::Running;
        tracing::info!(
            driver = %self.name,
            samplerate = self.geometry.samplerate(),
            buffer_size = self.geometry.buffer_size(),
            "driver running"
        );
        Ok(())
    }

    /// Runs one buffer cycle synchronously.
    ///
    /// Returns `true` when the note offset advanced. A backend failure
    /// stops the driver and is returned.
    pub fn step(&self) -> Result<bool> {
        if self.phase() != DriverPhase::Running {
            return Err(Error::Stopped(self.name.clone()));
        }

        let mut scratch = self.scratch.lock();
        {
            let guard = self.state.lock();
            let state = guard.borrow();
            scratch.clear();
            scratch.extend_from_slice(state.ring.front());
        }

        if let Err(e) = self.device.lock().write(&scratch) {
            self.fail(&e);
            return Err(e);
        }

        let (advanced, note_offset, absolute) = {
            let guard = self.state.lock();
            let mut state = guard.borrow_mut();
            let advanced = state.complete_buffer();
            (
                advanced,
                state.clock.note_offset(),
                state.clock.note_offset_absolute(),
            )
        };

        let listener = self.listener.lock().as_ref().and_then(Weak::upgrade);
        if let Some(listener) = listener {
            if advanced {
                listener.offset_changed(note_offset, absolute);
            }
            listener.buffer_completed();
        }
        Ok(advanced)
    }

    /// Opens the backend and consumes buffers on a dedicated thread until
    /// stopped.
    ///
    /// Faults end the thread; they are sent on [`errors`](Self::errors).
    pub fn start(self: &Arc<Self>) -> Result<()> {
        self.open()?;
        let mut slot = self.thread.lock();
        if slot.is_some() {
            return Ok(());
        }
        let driver = Arc::clone(self);
        let pacing = self.device.lock().pacing(&self.geometry);
        let handle = std::thread::Builder::new()
            .name(format!("recall-driver-{}", self.name))
            .spawn(move || {
                while driver.phase() == DriverPhase::Running {
                    let began = Instant::now();
                    match driver.step() {
                        Ok(_) => {}
                        Err(Error::Stopped(_)) => break,
                        Err(e) => {
                            let _ = driver.errors.0.send(e);
                            break;
                        }
                    }
                    if let Some(period) = pacing {
                        std::thread::sleep(period.saturating_sub(began.elapsed()));
                    }
                }
                tracing::debug!(driver = %driver.name, "driver thread exiting");
            })
            .map_err(|e| {
                *self.phase.lock() = DriverPhase::Stopped;
                Error::Io(e)
            })?;
        *slot = Some(handle);
        Ok(())
    }

    /// Stops the driver, waits for its thread and closes the backend.
    ///
    /// Safe to call more than once.
    pub fn close(&self) -> Result<()> {
        DriverControl::stop(self);
        let handle = self.thread.lock().take();
        if let Some(handle) = handle
            && handle.thread().id() != std::thread::current().id()
        {
            let _ = handle.join();
        }
        self.device.lock().close()
    }

    fn fail(&self, e: &Error) {
        *self.phase.lock() = DriverPhase::Stopped;
        tracing::error!(driver = %self.name, error = %e, "device fault, driver stopped");
    }
}

impl std::fmt::Debug for DeviceDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceDriver")
            .field("name", &self.name)
            .field("geometry", &self.geometry)
            .field("phase", &self.phase())
            .finish_non_exhaustive()
    }
}

impl DriverControl for DeviceDriver {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_running(&self) -> bool {
        self.phase() == DriverPhase::Running
    }

    fn stop(&self) {
        let mut phase = self.phase.lock();
        if *phase != DriverPhase::Stopped {
            *phase = DriverPhase::Stopped;
            tracing::info!(driver = %self.name, "driver stopped");
        }
    }

    fn state(&self) -> SharedDeviceState {
        Arc::clone(&self.state)
    }
}
