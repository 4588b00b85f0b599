//! Scoped ownership of transcode resources.
//!
//! Every source, decoder, filter chain, encoder, muxer and scaler is held in a
//! `Scoped` wrapper. Release happens exactly once: either explicitly or when
//! the wrapper drops. Locals drop in reverse declaration order, so holding
//! per-run resources as locals declared in acquisition order releases them
//! in reverse acquisition order on every exit path.

use std::ops::{Deref, DerefMut};
use tracing::trace;

/// A resource with an explicit teardown step.
pub trait Release {
    /// Short resource kind for logs ("decoder", "muxer", ...).
    fn kind(&self) -> &'static str;

    /// Free the resource. Called at most once by `Scoped`.
    fn release(&mut self);
}

/// Owns a resource and releases it exactly once.
pub struct Scoped<T: Release> {
    value: T,
    released: bool,
}

impl<T: Release> Scoped<T> {
    /// Take ownership of a freshly acquired resource.
    pub fn new(value: T) -> Self {
        trace!(kind = value.kind(), "Acquired");
        Self {
            value,
            released: false,
        }
    }

    /// Release now. Later calls, and the eventual drop, do nothing.
    pub fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        self.value.release();
        trace!(kind = self.value.kind(), "Released");
    }

    pub fn is_released(&self) -> bool {
        self.released
    }
}

impl<T: Release> Deref for Scoped<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.value
    }
}

impl<T: Release> DerefMut for Scoped<T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.value
    }
}

impl<T: Release> Drop for Scoped<T> {
    fn drop(&mut self) {
        self.release();
    }
}

impl<T: Release + std::fmt::Debug> std::fmt::Debug for Scoped<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scoped")
            .field("value", &self.value)
            .field("released", &self.released)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::Arc;

    struct Tracked {
        name: &'static str,
        log: Arc<Mutex<Vec<&'static str>>>,
    }

    impl Release for Tracked {
        fn kind(&self) -> &'static str {
            "tracked"
        }

        fn release(&mut self) {
            self.log.lock().push(self.name);
        }
    }

    fn tracked(name: &'static str, log: &Arc<Mutex<Vec<&'static str>>>) -> Scoped<Tracked> {
        Scoped::new(Tracked {
            name,
            log: Arc::clone(log),
        })
    }

    #[test]
    fn test_release_runs_once() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut a = tracked("a", &log);
        a.release();
        a.release();
        assert!(a.is_released());
        drop(a);
        assert_eq!(*log.lock(), vec!["a"]);
    }

    #[test]
    fn test_locals_release_in_reverse_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        {
            let _first = tracked("first", &log);
            let _second = tracked("second", &log);
            let _third = tracked("third", &log);
        }
        assert_eq!(*log.lock(), vec!["third", "second", "first"]);
    }

    #[test]
    fn test_early_return_releases() {
        fn open_encoder(fail: bool) -> Result<(), &'static str> {
            if fail {
                Err("no encoder")
            } else {
                Ok(())
            }
        }

        fn run(log: &Arc<Mutex<Vec<&'static str>>>) -> Result<(), &'static str> {
            let _muxer = tracked("muxer", log);
            let _encoder = tracked("encoder", log);
            open_encoder(true)?;
            let _never = tracked("never", log);
            Ok(())
        }

        let log = Arc::new(Mutex::new(Vec::new()));
        assert!(run(&log).is_err());
        assert_eq!(*log.lock(), vec!["encoder", "muxer"]);
    }
}
