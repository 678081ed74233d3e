//! End-to-end forwarding over real TCP sockets.

mod test_utils;

use std::{
    net::TcpListener,
    sync::mpsc,
    thread,
    time::{Duration, Instant},
};

use fluentd_forward::{
    AdapterHandle, AdapterRegistry, BuildError, ForwarderBuilder, ForwarderConfig, LogAdapter, LogEvent,
    PayloadFormat, Route, TransportRegistry,
    forward::{TcpEndpoint, TlsOptions, transport::connect_endpoint},
    registry::{FLUENTD_TCP_SCHEME, FactoryError},
};
use rstest::rstest;
use test_utils::{Collector, Session, Wire, closed_address, container_event};

fn builder_for(collector: &Collector) -> ForwarderBuilder {
    ForwarderBuilder::new()
        .with_tcp(collector.addr.ip().to_string(), collector.addr.port())
        .with_base_delay_ms(1)
        .with_retry_count(3)
}

#[rstest]
fn forwards_reference_event_over_tcp() {
    let collector = Collector::start(Wire::MessagePack, vec![]);
    let mut adapter = builder_for(&collector).connect().expect("connect adapter");

    adapter.forward(&container_event("hello")).expect("deliver event");

    let (conn, (tag, _, fields)) = collector.recv();
    assert_eq!(conn, 0);
    assert_eq!(tag, "docker.h1");
    assert_eq!(fields["message"], "hello");
    assert_eq!(fields["docker.id"], "abc123");
    assert_eq!(fields["docker.image"], "img:latest");
    assert_eq!(fields["docker.name"], "/c1");
    assert_eq!(fields["docker.label.env"], "prod");
}

#[rstest]
fn back_to_back_payloads_decode_in_order() {
    let collector = Collector::start(Wire::MessagePack, vec![]);
    let mut adapter = builder_for(&collector).connect().expect("connect adapter");

    let events: Vec<LogEvent> = (0..20).map(|i| container_event(&format!("line {i}"))).collect();
    let summary = adapter.stream(events);
    assert_eq!(summary.delivered, 20);

    let messages: Vec<String> = (0..20)
        .map(|_| collector.recv().1.2["message"].clone())
        .collect();
    let expected: Vec<String> = (0..20).map(|i| format!("line {i}")).collect();
    assert_eq!(messages, expected);
}

#[rstest]
fn json_format_is_understood_by_collector() {
    let collector = Collector::start(Wire::Json, vec![]);
    let mut adapter = builder_for(&collector)
        .with_format(PayloadFormat::Json)
        .connect()
        .expect("connect adapter");

    adapter.forward(&container_event("as json")).expect("deliver event");
    let (_, (tag, _, fields)) = collector.recv();
    assert_eq!(tag, "docker.h1");
    assert_eq!(fields["message"], "as json");
}

#[rstest]
fn initial_connect_failure_aborts_construction() {
    let address = closed_address();
    let (host, port) = address.rsplit_once(':').expect("host:port");
    let err = ForwarderBuilder::new()
        .with_tcp(host, port.parse().expect("port"))
        .with_connect_timeout_ms(200)
        .connect()
        .err()
        .expect("connect must fail");
    assert!(matches!(err, BuildError::Connect(ref e) if e.endpoint == address));
}

#[rstest]
fn reconnects_after_collector_drops_connection() {
    let collector = Collector::start(Wire::MessagePack, vec![Session::Drop]);
    let mut adapter = builder_for(&collector).connect().expect("connect adapter");

    // Writes into a socket the peer already closed may be accepted by the
    // kernel; keep sending until one fails and forces a reconnect.
    for i in 0..20 {
        let _ = adapter.forward(&container_event(&format!("m{i}")));
        thread::sleep(Duration::from_millis(25));
    }

    let received = collector.drain(Duration::from_millis(500));
    let last = received.last().expect("records after reconnect");
    assert_eq!(last.0, 1, "records arrive on the second connection");
    assert_eq!(last.1.2["message"], "m19");
}

#[rstest]
fn registry_builds_adapter_from_route() {
    let collector = Collector::start(Wire::Json, vec![]);
    let route = Route::new(FLUENTD_TCP_SCHEME, collector.address()).with_option("format", "json");
    let mut adapter = AdapterRegistry::with_defaults()
        .create(
            &route,
            &TransportRegistry::with_defaults(),
            &ForwarderConfig::default(),
        )
        .expect("create adapter");

    let summary = adapter.stream(&mut vec![container_event("routed")].into_iter());
    assert_eq!(summary.delivered, 1);
    assert_eq!(collector.recv().1.2["message"], "routed");
}

#[rstest]
fn registry_surfaces_initial_connect_failure() {
    let route = Route::new(FLUENTD_TCP_SCHEME, closed_address()).with_option("connect_timeout_ms", "200");
    let err = AdapterRegistry::with_defaults()
        .create(
            &route,
            &TransportRegistry::with_defaults(),
            &ForwarderConfig::default(),
        )
        .err()
        .expect("create must fail");
    assert!(matches!(err, FactoryError::Connect(_)));
}

#[rstest]
fn spawned_adapter_forwards_until_closed() {
    let collector = Collector::start(Wire::MessagePack, vec![]);
    let builder = builder_for(&collector).with_capacity(16);
    let config = builder.build_config().expect("valid config");
    let mut handle = AdapterHandle::spawn(builder.connect().expect("connect adapter"), &config);

    for i in 0..5 {
        handle.send(container_event(&format!("spawned {i}"))).expect("queue event");
    }
    let summary = handle.close().expect("worker summary");
    assert_eq!(summary.delivered, 5);
    assert_eq!(collector.drain(Duration::from_millis(300)).len(), 5);
}

#[rstest]
fn tls_handshake_respects_timeout() {
    let listener = TcpListener::bind(("127.0.0.1", 0)).expect("bind ephemeral listener");
    let addr = listener.local_addr().expect("listener has address");
    let (accepted_tx, accepted_rx) = mpsc::channel();
    thread::spawn(move || {
        let (stream, _) = listener.accept().expect("accept connection");
        accepted_tx.send(()).expect("signal accepted");
        // Keep the TCP connection open without speaking TLS.
        thread::sleep(Duration::from_secs(2));
        drop(stream);
    });

    let (result_tx, result_rx) = mpsc::channel();
    thread::spawn(move || {
        let endpoint = TcpEndpoint::new(addr.to_string())
            .with_connect_timeout(Duration::from_millis(250))
            .with_tls(TlsOptions {
                domain: "localhost".into(),
                insecure_skip_verify: true,
            });
        let start = Instant::now();
        let ok = connect_endpoint(&endpoint).is_ok();
        result_tx
            .send((ok, start.elapsed()))
            .expect("handshake duration should send");
    });

    accepted_rx
        .recv_timeout(Duration::from_secs(1))
        .expect("connection must be accepted");
    let (ok, elapsed) = result_rx
        .recv_timeout(Duration::from_secs(2))
        .expect("handshake result should arrive");
    assert!(!ok, "handshake should fail for stalled peer");
    assert!(
        elapsed < Duration::from_secs(2),
        "handshake should respect timeout, elapsed {elapsed:?}"
    );
}
