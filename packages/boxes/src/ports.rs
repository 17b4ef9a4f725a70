// ABOUTME: Random host port selection for box SSH endpoints
// ABOUTME: Probes candidates with portpicker and retries a bounded number of times

use crate::error::{BoxError, Result};
use rand::Rng;
use std::ops::Range;
use std::sync::Arc;
use tracing::debug;

/// Candidate range; the upper bound is exclusive.
pub const PORT_RANGE: Range<u16> = 1024..65535;

pub trait PortProbe: Send + Sync {
    fn is_available(&self, port: u16) -> bool;
}

/// Checks that the port can be bound on all interfaces.
#[derive(Debug, Default, Clone, Copy)]
pub struct TcpProbe;

impl PortProbe for TcpProbe {
    fn is_available(&self, port: u16) -> bool {
        portpicker::is_free_tcp(port)
    }
}

/// Picks free ports without reserving them. Another process can still take
/// the port before the container binds it.
#[derive(Clone)]
pub struct PortAllocator {
    probe: Arc<dyn PortProbe>,
    attempts: u32,
}

impl PortAllocator {
    pub fn new(attempts: u32) -> Self {
        Self::with_probe(Arc::new(TcpProbe), attempts)
    }

    pub fn with_probe(probe: Arc<dyn PortProbe>, attempts: u32) -> Self {
        Self { probe, attempts }
    }

    pub fn allocate_random(&self) -> Result<u16> {
        let mut rng = rand::thread_rng();
        for _ in 0..self.attempts {
            let candidate = rng.gen_range(PORT_RANGE);
            if self.probe.is_available(candidate) {
                return Ok(candidate);
            }
            debug!("Port {} is taken", candidate);
        }
        Err(BoxError::PortsExhausted {
            attempts: self.attempts,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    struct CountingProbe {
        calls: AtomicU32,
        available: bool,
    }

    impl PortProbe for CountingProbe {
        fn is_available(&self, _port: u16) -> bool {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.available
        }
    }

    struct RecordingProbe {
        seen: Mutex<Vec<u16>>,
    }

    impl PortProbe for RecordingProbe {
        fn is_available(&self, port: u16) -> bool {
            self.seen.lock().unwrap().push(port);
            false
        }
    }

    #[test]
    fn test_exhaustion_after_configured_attempts() {
        let probe = Arc::new(CountingProbe {
            calls: AtomicU32::new(0),
            available: false,
        });
        let allocator = PortAllocator::with_probe(probe.clone(), 100);

        let result = allocator.allocate_random();
        assert!(matches!(
            result,
            Err(BoxError::PortsExhausted { attempts: 100 })
        ));
        assert_eq!(probe.calls.load(Ordering::SeqCst), 100);
    }

    #[test]
    fn test_first_available_port_is_returned() {
        let probe = Arc::new(CountingProbe {
            calls: AtomicU32::new(0),
            available: true,
        });
        let port = PortAllocator::with_probe(probe.clone(), 100)
            .allocate_random()
            .unwrap();

        assert!(PORT_RANGE.contains(&port));
        assert_eq!(probe.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_candidates_stay_in_range() {
        let probe = Arc::new(RecordingProbe {
            seen: Mutex::new(Vec::new()),
        });
        let _ = PortAllocator::with_probe(probe.clone(), 500).allocate_random();

        let seen = probe.seen.lock().unwrap();
        assert_eq!(seen.len(), 500);
        assert!(seen.iter().all(|p| (1024..65535).contains(p)));
    }

    #[test]
    fn test_tcp_probe_detects_bound_port() {
        let listener = std::net::TcpListener::bind(("0.0.0.0", 0)).unwrap();
        let port = listener.local_addr().unwrap().port();
        assert!(!TcpProbe.is_available(port));
    }
}
