//! A connector whose connect and write outcomes are scripted up front.
//!
//! Outcomes are consumed in order across every connection the connector
//! hands out; once a script runs dry every further call succeeds. Payloads
//! accepted by a connection are recorded together with that connection's
//! index so tests can tell which socket carried them.
//!
//! [`ScriptedConnector::hold_writes`] parks every write until the returned
//! [`WriteGate`] is dropped, letting tests keep a worker busy while they
//! fill its queue.

use std::{collections::VecDeque, io, sync::Arc, time::Duration};

use crossbeam_channel::{Receiver, Sender, bounded, unbounded};
use parking_lot::Mutex;

use crate::forward::{Connection, Connector, WriteError};

#[derive(Debug, Default)]
struct Script {
    connects: VecDeque<bool>,
    writes: VecDeque<Option<io::ErrorKind>>,
    connect_calls: usize,
    write_calls: usize,
    opened: usize,
    delivered: Vec<(usize, Vec<u8>)>,
    gate: Option<(Sender<()>, Receiver<()>)>,
}

/// Scripted [`Connector`] test double.
#[derive(Clone, Debug, Default)]
pub struct ScriptedConnector {
    script: Arc<Mutex<Script>>,
}

impl ScriptedConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue connect attempts: `false` fails with `ConnectionRefused`,
    /// `true` succeeds.
    pub fn script_connects(&self, outcomes: impl IntoIterator<Item = bool>) -> &Self {
        self.script.lock().connects.extend(outcomes);
        self
    }

    /// Queue `count` connect failures followed by successes.
    pub fn fail_connects(&self, count: usize) -> &Self {
        self.script_connects(std::iter::repeat_n(false, count))
    }

    /// Queue write failures of the given kinds, in order.
    pub fn fail_writes(&self, kinds: impl IntoIterator<Item = io::ErrorKind>) -> &Self {
        self.script.lock().writes.extend(kinds.into_iter().map(Some));
        self
    }

    /// Queue `count` successful writes, e.g. before scripting later failures.
    pub fn succeed_writes(&self, count: usize) -> &Self {
        self.script
            .lock()
            .writes
            .extend(std::iter::repeat_n(None, count));
        self
    }

    /// Park every subsequent write until the returned gate is dropped.
    pub fn hold_writes(&self) -> WriteGate {
        let (entered_tx, entered) = unbounded();
        let (release, release_rx) = bounded(0);
        self.script.lock().gate = Some((entered_tx, release_rx));
        WriteGate {
            entered,
            _release: release,
        }
    }

    pub fn connect_calls(&self) -> usize {
        self.script.lock().connect_calls
    }

    pub fn write_calls(&self) -> usize {
        self.script.lock().write_calls
    }

    /// Payloads accepted so far, tagged with the index of the connection
    /// that carried them (0 is the first connection opened).
    pub fn delivered(&self) -> Vec<(usize, Vec<u8>)> {
        self.script.lock().delivered.clone()
    }
}

impl Connector for ScriptedConnector {
    type Connection = ScriptedConnection;

    fn connect(&self) -> io::Result<ScriptedConnection> {
        let mut script = self.script.lock();
        script.connect_calls += 1;
        if script.connects.pop_front() == Some(false) {
            return Err(io::Error::new(
                io::ErrorKind::ConnectionRefused,
                "scripted connect failure",
            ));
        }
        let id = script.opened;
        script.opened += 1;
        Ok(ScriptedConnection {
            id,
            script: Arc::clone(&self.script),
        })
    }

    fn endpoint(&self) -> String {
        "scripted".into()
    }
}

/// Connection handed out by [`ScriptedConnector`].
#[derive(Debug)]
pub struct ScriptedConnection {
    id: usize,
    script: Arc<Mutex<Script>>,
}

impl ScriptedConnection {
    pub fn id(&self) -> usize {
        self.id
    }
}

impl Connection for ScriptedConnection {
    fn send(&mut self, payload: &[u8]) -> Result<(), WriteError> {
        let gate = self.script.lock().gate.clone();
        if let Some((entered, release)) = gate {
            let _ = entered.send(());
            // Returns once the gate's sender is dropped.
            let _ = release.recv();
        }
        let mut script = self.script.lock();
        script.write_calls += 1;
        if let Some(Some(kind)) = script.writes.pop_front() {
            return Err(WriteError::from(io::Error::new(kind, "scripted write failure")));
        }
        script.delivered.push((self.id, payload.to_vec()));
        Ok(())
    }
}

/// Holds writes of a [`ScriptedConnector`] until dropped.
#[derive(Debug)]
pub struct WriteGate {
    entered: Receiver<()>,
    _release: Sender<()>,
}

impl WriteGate {
    /// Wait until a write is parked at the gate. Returns `false` on timeout.
    pub fn wait_for_write(&self, timeout: Duration) -> bool {
        self.entered.recv_timeout(timeout).is_ok()
    }
}
