//! Thread-safe parameter cells.
//!
//! A [`Port`] is the seam between parameter hosts (UI, automation, plugin
//! wrappers) and node kinds running on the scheduler or worker threads.
//! Reads and writes are serialized per port; nothing else is locked.
//!
//! A port may carry a [`Conversion`] between the *external* value a host
//! writes (for example decibels) and the *internal* value a node kind reads
//! (linear gain).

use std::sync::Arc;

use parking_lot::Mutex;

/// Maps between a host-facing and a processing-facing value.
pub trait Conversion<T>: Send + Sync {
    /// External to internal.
    fn convert(&self, value: T) -> T;
    /// Internal to external.
    fn revert(&self, value: T) -> T;
}

/// Identity conversion.
#[derive(Debug, Clone, Copy, Default)]
pub struct Linear;

impl<T> Conversion<T> for Linear {
    fn convert(&self, value: T) -> T {
        value
    }

    fn revert(&self, value: T) -> T {
        value
    }
}

/// Decibels outside, linear amplitude inside.
///
/// Values at or below `floor_db` map to silence.
#[derive(Debug, Clone, Copy)]
pub struct Decibel {
    /// Level treated as silence.
    pub floor_db: f64,
}

impl Default for Decibel {
    fn default() -> Self {
        Self { floor_db: -96.0 }
    }
}

impl Conversion<f64> for Decibel {
    fn convert(&self, db: f64) -> f64 {
        if db <= self.floor_db {
            0.0
        } else {
            10f64.powf(db / 20.0)
        }
    }

    fn revert(&self, gain: f64) -> f64 {
        if gain <= 0.0 {
            self.floor_db
        } else {
            (20.0 * gain.log10()).max(self.floor_db)
        }
    }
}

/// A named, lockable parameter value.
///
/// # Example
///
/// ```rust
/// use recall_core::{Decibel, Port};
///
/// let gain = Port::with_conversion("gain", 1.0, Decibel::default());
/// gain.safe_write(-6.0);
/// assert!((gain.safe_read() - 0.501).abs() < 1e-3);
/// assert!((gain.safe_read_external() + 6.0).abs() < 1e-9);
/// ```
pub struct Port<T> {
    name: &'static str,
    value: Mutex<T>,
    conversion: Option<Box<dyn Conversion<T>>>,
}

/// Shared handle to a port.
pub type SharedPort<T> = Arc<Port<T>>;

impl<T: Copy + Send> Port<T> {
    /// Creates a port holding `value` as its internal value.
    pub fn new(name: &'static str, value: T) -> Self {
        Self {
            name,
            value: Mutex::new(value),
            conversion: None,
        }
    }

    /// Creates a port with a conversion; `value` is the internal value.
    pub fn with_conversion(
        name: &'static str,
        value: T,
        conversion: impl Conversion<T> + 'static,
    ) -> Self {
        Self {
            name,
            value: Mutex::new(value),
            conversion: Some(Box::new(conversion)),
        }
    }

    /// Wraps the port in a shared handle.
    pub fn into_shared(self) -> SharedPort<T> {
        Arc::new(self)
    }

    /// Port name.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Reads the internal value.
    pub fn safe_read(&self) -> T {
        *self.value.lock()
    }

    /// Writes an external value, converting it when a conversion is set.
    pub fn safe_write(&self, value: T) {
        let value = match &self.conversion {
            Some(c) => c.convert(value),
            None => value,
        };
        *self.value.lock() = value;
    }

    /// Writes the internal value directly.
    pub fn safe_write_raw(&self, value: T) {
        *self.value.lock() = value;
    }

    /// Reads the value as the host sees it.
    pub fn safe_read_external(&self) -> T {
        let value = self.safe_read();
        match &self.conversion {
            Some(c) => c.revert(value),
            None => value,
        }
    }

    /// Read-modify-write under the port's lock.
    pub fn update(&self, f: impl FnOnce(T) -> T) {
        let mut guard = self.value.lock();
        *guard = f(*guard);
    }
}

impl<T: core::fmt::Debug + Copy> core::fmt::Debug for Port<T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Port")
            .field("name", &self.name)
            .field("value", &*self.value.lock())
            .field("converted", &self.conversion.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_port_round_trips() {
        let port = Port::new("level", 0.5_f64);
        assert_eq!(port.safe_read(), 0.5);
        port.safe_write(0.25);
        assert_eq!(port.safe_read(), 0.25);
        assert_eq!(port.safe_read_external(), 0.25);
        assert_eq!(port.name(), "level");
    }

    #[test]
    fn decibel_floor_is_silence() {
        let port = Port::with_conversion("gain", 1.0, Decibel::default());
        port.safe_write(-200.0);
        assert_eq!(port.safe_read(), 0.0);
        assert_eq!(port.safe_read_external(), -96.0);
        port.safe_write(0.0);
        assert!((port.safe_read() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn concurrent_updates_are_serialized() {
        let port = Port::new("count", 0_u64).into_shared();
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let port = Arc::clone(&port);
                std::thread::spawn(move || {
                    for _ in 0..1000 {
                        port.update(|v| v + 1);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(port.safe_read(), 4000);
    }
}
