//! Load-readiness gate.
//!
//! Routes and collections arrive from independent loader managers in no
//! particular order. Resolving against a half-loaded world on first start
//! would produce spurious alerts, so resolution is gated behind two
//! latches: it runs only once both data sets have loaded at least once.
//! The latches are not one-shot — once both are set, every subsequent
//! signal from either side passes straight through.

/// Which side of the world just changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateSignal {
    Routes,
    Collections,
}

/// Two-latch state machine deciding when a resolution pass may run.
#[derive(Debug, Default)]
pub struct LoadGate {
    routes_ready: bool,
    collections_ready: bool,
}

impl LoadGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Latch `signal` and report whether a resolution pass should run now.
    pub fn signal(&mut self, signal: GateSignal) -> bool {
        match signal {
            GateSignal::Routes => self.routes_ready = true,
            GateSignal::Collections => self.collections_ready = true,
        }
        self.is_ready()
    }

    pub fn is_ready(&self) -> bool {
        self.routes_ready && self.collections_ready
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_side_does_not_open_gate() {
        let mut gate = LoadGate::new();
        assert!(!gate.signal(GateSignal::Routes));
        assert!(!gate.signal(GateSignal::Routes));
        assert!(!gate.is_ready());
    }

    #[test]
    fn test_both_sides_open_gate_in_either_order() {
        let mut gate = LoadGate::new();
        assert!(!gate.signal(GateSignal::Collections));
        assert!(gate.signal(GateSignal::Routes));

        let mut gate = LoadGate::new();
        assert!(!gate.signal(GateSignal::Routes));
        assert!(gate.signal(GateSignal::Collections));
    }

    #[test]
    fn test_gate_stays_open_for_every_later_signal() {
        let mut gate = LoadGate::new();
        gate.signal(GateSignal::Routes);
        gate.signal(GateSignal::Collections);
        assert!(gate.signal(GateSignal::Routes));
        assert!(gate.signal(GateSignal::Collections));
        assert!(gate.signal(GateSignal::Routes));
    }
}
