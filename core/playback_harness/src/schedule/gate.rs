use crossbeam::channel::{self, Receiver, Sender};

/// Opening side of a rendezvous created by [`rendezvous`].
#[derive(Debug)]
pub struct GateOpener {
    tx: Sender<()>,
}

/// Blocking side of a rendezvous created by [`rendezvous`].
#[derive(Debug)]
pub struct Gate {
    rx: Receiver<()>,
}

/// Single-use handshake between two threads.
///
/// The thread holding the [`Gate`] blocks in [`Gate::pass`] until the other
/// side calls [`GateOpener::open`]. Dropping the opener unblocks the gate
/// without opening it.
pub fn rendezvous() -> (GateOpener, Gate) {
    let (tx, rx) = channel::bounded(1);
    (GateOpener { tx }, Gate { rx })
}

impl GateOpener {
    pub fn open(self) {
        // the gate side may already be gone, nothing left to unblock then
        let _ = self.tx.send(());
    }
}

impl Gate {
    /// Blocks until opened. Returns false if the opener was dropped instead.
    pub fn pass(self) -> bool {
        self.rx.recv().is_ok()
    }
}
