//! In-process collector used by the TCP integration tests.
//!
//! The collector accepts connections one after another and decodes the
//! back-to-back envelopes written on each of them, reporting every record
//! together with the index of the connection that carried it.

use std::{
    collections::BTreeMap,
    io::BufReader,
    net::{SocketAddr, TcpListener, TcpStream},
    sync::mpsc,
    thread,
    time::Duration,
};

use serde::Deserialize;

/// `[tag, timestamp, fields]` as decoded by the collector.
pub type Record = (String, i32, BTreeMap<String, String>);

/// Wire format the collector expects.
#[derive(Clone, Copy, Debug)]
pub enum Wire {
    MessagePack,
    Json,
}

/// Behaviour applied to each accepted connection, by index.
#[derive(Clone, Copy, Debug)]
pub enum Session {
    /// Decode records until the peer closes.
    Read,
    /// Close immediately without reading.
    Drop,
}

pub struct Collector {
    pub addr: SocketAddr,
    records: mpsc::Receiver<(usize, Record)>,
}

impl Collector {
    /// Start a collector that handles connections according to `sessions`;
    /// connections beyond the list are read.
    pub fn start(wire: Wire, sessions: Vec<Session>) -> Self {
        let listener = TcpListener::bind(("127.0.0.1", 0)).expect("bind ephemeral listener");
        let addr = listener.local_addr().expect("listener has address");
        let (tx, records) = mpsc::channel();
        thread::spawn(move || {
            for (index, stream) in listener.incoming().enumerate() {
                let Ok(stream) = stream else { return };
                match sessions.get(index).copied().unwrap_or(Session::Read) {
                    Session::Drop => drop(stream),
                    Session::Read => {
                        let tx = tx.clone();
                        thread::spawn(move || read_records(wire, index, stream, tx));
                    }
                }
            }
        });
        Self { addr, records }
    }

    pub fn address(&self) -> String {
        self.addr.to_string()
    }

    /// Wait for the next decoded record.
    pub fn recv(&self) -> (usize, Record) {
        self.records
            .recv_timeout(Duration::from_secs(5))
            .expect("collector should receive a record")
    }

    /// Collect records until none arrives for `idle`.
    pub fn drain(&self, idle: Duration) -> Vec<(usize, Record)> {
        let mut out = Vec::new();
        while let Ok(record) = self.records.recv_timeout(idle) {
            out.push(record);
        }
        out
    }
}

fn read_records(wire: Wire, index: usize, stream: TcpStream, tx: mpsc::Sender<(usize, Record)>) {
    let reader = BufReader::new(stream);
    match wire {
        Wire::MessagePack => {
            let mut de = rmp_serde::Deserializer::new(reader);
            while let Ok(record) = <Record as Deserialize>::deserialize(&mut de) {
                if tx.send((index, record)).is_err() {
                    return;
                }
            }
        }
        Wire::Json => {
            for record in serde_json::Deserializer::from_reader(reader).into_iter::<Record>() {
                let Ok(record) = record else { return };
                if tx.send((index, record)).is_err() {
                    return;
                }
            }
        }
    }
}

/// An address nothing listens on.
pub fn closed_address() -> String {
    let listener = TcpListener::bind(("127.0.0.1", 0)).expect("bind ephemeral listener");
    let addr = listener.local_addr().expect("listener has address");
    drop(listener);
    addr.to_string()
}
