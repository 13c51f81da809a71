use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::LibraryError;

/// Process-wide "a scan is running" flag. Clones share the flag.
#[derive(Clone, Debug, Default)]
pub struct ScanGuard {
    scanning: Arc<AtomicBool>,
}

impl ScanGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claims the flag. At most one ticket exists at a time.
    pub fn try_begin(&self) -> Result<ScanTicket, LibraryError> {
        self.scanning
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| LibraryError::AlreadyScanning)?;
        Ok(ScanTicket {
            scanning: Arc::clone(&self.scanning),
        })
    }

    pub fn is_scanning(&self) -> bool {
        self.scanning.load(Ordering::Acquire)
    }
}

/// Held for the duration of one scan; releases the guard when dropped,
/// whatever way the scan ends.
#[must_use = "dropping the ticket ends the scan"]
#[derive(Debug)]
pub struct ScanTicket {
    scanning: Arc<AtomicBool>,
}

impl ScanTicket {
    pub fn end(self) {}
}

impl Drop for ScanTicket {
    fn drop(&mut self) {
        self.scanning.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Barrier;
    use std::thread;

    #[test]
    fn second_begin_is_rejected_until_end() {
        let guard = ScanGuard::new();
        let ticket = guard.try_begin().unwrap();
        assert!(guard.is_scanning());
        assert!(matches!(guard.try_begin(), Err(LibraryError::AlreadyScanning)));

        ticket.end();
        assert!(!guard.is_scanning());
        let again = guard.try_begin().unwrap();
        drop(again);
        assert!(!guard.is_scanning());
    }

    #[test]
    fn concurrent_begins_admit_one() {
        let guard = ScanGuard::new();
        let barrier = Arc::new(Barrier::new(8));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let guard = guard.clone();
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    guard.try_begin().ok()
                })
            })
            .collect();
        let tickets: Vec<ScanTicket> = handles
            .into_iter()
            .filter_map(|handle| handle.join().unwrap())
            .collect();
        assert_eq!(tickets.len(), 1);
        assert!(guard.is_scanning());
        drop(tickets);
        assert!(!guard.is_scanning());
    }
}
