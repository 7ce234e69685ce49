use std::sync::atomic::{AtomicBool, Ordering};

/// Signals whether the current unit of work is really ending.
///
/// Hosts may ask a model to detach at several intermediate points; only the
/// detach issued while the unit of work is ending takes effect.
#[derive(Debug, Default)]
pub struct UnitOfWork {
    ending: AtomicBool,
}

impl UnitOfWork {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn begin(&self) {
        self.ending.store(false, Ordering::SeqCst);
    }

    pub fn end(&self) {
        self.ending.store(true, Ordering::SeqCst);
    }

    pub fn is_ending(&self) -> bool {
        self.ending.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_begin_end() {
        let unit = UnitOfWork::new();
        assert!(!unit.is_ending());

        unit.end();
        assert!(unit.is_ending());

        unit.begin();
        assert!(!unit.is_ending());
    }
}
