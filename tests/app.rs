use metrics_stress::{Cardinality, Config, Error, Exporter};
use std::{
    net::{SocketAddr, TcpListener},
    time::Duration,
};

fn free_addr() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap()
}

#[test]
fn unreachable_collector_stops_startup_before_bind() {
    let listen = free_addr();
    let collector = free_addr();

    let config = Config {
        listen,
        cardinality: Cardinality::uniform(10),
        export: Some(
            Exporter::builder()
                .endpoint(format!("http://{collector}"))
                .timeout(Duration::from_millis(200)),
        ),
        ..Config::basic()
    };

    let result = metrics_stress::run(config);
    assert!(
        matches!(result, Err(Error::CollectorUnreachable { .. })),
        "{result:?}"
    );

    // nothing was left listening
    TcpListener::bind(listen).unwrap();
}
