use crossbeam::channel::{Receiver, RecvTimeoutError, Sender};
use metrics_stress::{
    Cardinality, Error, Exporter, Generator, Protocol, Registry,
    proto::{
        otlp::{
            collector::metrics::v1::{
                ExportMetricsServiceRequest, ExportMetricsServiceResponse,
                metrics_service_server::{MetricsService, MetricsServiceServer},
            },
            metrics::v1::metric::Data,
        },
        prometheus::WriteRequest,
    },
};
use prost::Message;
use std::{
    io::{BufRead, BufReader, Read, Write},
    net::{SocketAddr, TcpListener},
    sync::Arc,
    thread,
    time::Duration,
};
use tonic::{Code, Request, Response, Status};

struct Collector {
    tx: Sender<ExportMetricsServiceRequest>,
    reject: Option<Code>,
}

#[tonic::async_trait]
impl MetricsService for Collector {
    async fn export(
        &self,
        request: Request<ExportMetricsServiceRequest>,
    ) -> Result<Response<ExportMetricsServiceResponse>, Status> {
        if let Some(code) = self.reject {
            return Err(Status::new(code, "nope"));
        }
        self.tx.send(request.into_inner()).ok();
        Ok(Response::new(ExportMetricsServiceResponse::default()))
    }
}

/// OTLP/gRPC collector on its own runtime, answering every export with
/// `reject` when set.
fn grpc_collector(reject: Option<Code>) -> (SocketAddr, Receiver<ExportMetricsServiceRequest>) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    listener.set_nonblocking(true).unwrap();
    let addr = listener.local_addr().unwrap();
    let (tx, rx) = crossbeam::channel::unbounded();

    thread::spawn(move || {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        runtime.block_on(async move {
            let listener = tokio::net::TcpListener::from_std(listener).unwrap();
            tonic::transport::Server::builder()
                .add_service(MetricsServiceServer::new(Collector { tx, reject }))
                .serve_with_incoming(tokio_stream::wrappers::TcpListenerStream::new(listener))
                .await
                .unwrap();
        });
    });

    (addr, rx)
}

struct Push {
    head: String,
    body: Vec<u8>,
}

/// HTTP receiver that accepts connections forever and answers every request
/// with `status`.
///
/// Connections that close without sending a request (the reachability check)
/// are skipped.
fn receiver(status: u16) -> (SocketAddr, Receiver<Push>) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    let (tx, rx) = crossbeam::channel::unbounded();

    thread::spawn(move || {
        for stream in listener.incoming() {
            let Ok(mut stream) = stream else { continue };
            let mut reader = BufReader::new(stream.try_clone().unwrap());

            let mut head = String::new();
            let mut content_length = 0;
            loop {
                let mut line = String::new();
                if reader.read_line(&mut line).unwrap_or(0) == 0 {
                    break;
                }
                if line == "\r\n" {
                    break;
                }
                if let Some((name, value)) = line.split_once(':') {
                    if name.eq_ignore_ascii_case("content-length") {
                        content_length = value.trim().parse().unwrap();
                    }
                }
                head.push_str(&line);
            }
            if head.is_empty() {
                continue;
            }

            let mut body = vec![0; content_length];
            reader.read_exact(&mut body).unwrap();

            let response =
                format!("HTTP/1.1 {status} X\r\ncontent-length: 4\r\nconnection: close\r\n\r\nnope");
            stream.write_all(response.as_bytes()).unwrap();

            if tx.send(Push { head, body }).is_err() {
                return;
            }
        }
    });

    (addr, rx)
}

fn header<'a>(head: &'a str, name: &str) -> Option<&'a str> {
    head.lines().find_map(|line| {
        let (key, value) = line.split_once(':')?;
        key.eq_ignore_ascii_case(name).then(|| value.trim())
    })
}

fn populated_registry() -> Arc<Registry> {
    let registry = Arc::new(Registry::new());
    let mut generator = Generator::new(&registry, Cardinality::uniform(5));
    generator.step();
    registry
}

#[test]
fn otlp_push_carries_all_families() {
    let (addr, exports) = grpc_collector(None);
    let exporter = Exporter::builder()
        .endpoint(format!("http://{addr}"))
        .build(populated_registry())
        .unwrap();

    exporter.push().unwrap();

    let request = exports.recv_timeout(Duration::from_secs(5)).unwrap();
    let metrics = &request.resource_metrics[0].scope_metrics[0].metrics;
    let names: Vec<&str> = metrics.iter().map(|m| m.name.as_str()).collect();
    assert_eq!(names, ["counter", "gauge", "histogram"]);

    match &metrics[2].data {
        Some(Data::Histogram(histogram)) => {
            assert_eq!(histogram.data_points.len(), 5);
            assert!(histogram.data_points.iter().all(|point| point.count == 12));
        }
        other => panic!("expected histogram, got {other:?}"),
    }
}

#[test]
fn otlp_push_speaks_http2() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();

    let (tx, rx) = crossbeam::channel::bounded(1);
    thread::spawn(move || {
        let (mut stream, _) = listener.accept().unwrap();
        let mut preface = [0; 24];
        stream.read_exact(&mut preface).unwrap();
        tx.send(preface).ok();
    });

    // connecting alone is enough for the client to send its preface
    let _ = Exporter::builder()
        .endpoint(format!("http://{addr}"))
        .timeout(Duration::from_millis(500))
        .build(Arc::new(Registry::new()));

    let preface = rx.recv_timeout(Duration::from_secs(5)).unwrap();
    assert_eq!(&preface, b"PRI * HTTP/2.0\r\n\r\nSM\r\n\r\n");
}

#[test]
fn rejected_export_is_an_error() {
    let (addr, _exports) = grpc_collector(Some(Code::Unavailable));
    let exporter = Exporter::builder()
        .endpoint(format!("http://{addr}"))
        .build(populated_registry())
        .unwrap();

    match exporter.push() {
        Err(Error::Export { source, .. }) => {
            assert_eq!(source.code(), Code::Unavailable);
            assert_eq!(source.message(), "nope");
        }
        other => panic!("expected rejection, got {other:?}"),
    }
}

#[test]
fn remote_write_push_is_snappy_compressed() {
    let (addr, pushes) = receiver(200);
    let exporter = Exporter::builder()
        .endpoint(format!("http://{addr}/api/v1/write"))
        .protocol(Protocol::RemoteWrite)
        .build(populated_registry())
        .unwrap();

    exporter.push().unwrap();

    let push = pushes.recv_timeout(Duration::from_secs(5)).unwrap();
    assert_eq!(header(&push.head, "content-encoding"), Some("snappy"));
    assert_eq!(
        header(&push.head, "x-prometheus-remote-write-version"),
        Some("1.0.0")
    );

    let raw = snap::raw::Decoder::new().decompress_vec(&push.body).unwrap();
    let request = WriteRequest::decode(raw.as_slice()).unwrap();
    // 5 counters + 5 gauges + 5 histograms expanded into 14 series each
    assert_eq!(request.timeseries.len(), 5 + 5 + 5 * 14);
}

#[test]
fn rejected_remote_write_is_an_error() {
    let (addr, _pushes) = receiver(400);
    let exporter = Exporter::builder()
        .endpoint(format!("http://{addr}/api/v1/write"))
        .protocol(Protocol::RemoteWrite)
        .build(populated_registry())
        .unwrap();

    match exporter.push() {
        Err(Error::Rejected { status, body, .. }) => {
            assert_eq!(status, 400);
            assert_eq!(body, "nope");
        }
        other => panic!("expected rejection, got {other:?}"),
    }
}

fn dead_addr() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap()
}

#[test]
fn unreachable_collector_fails_build() {
    for protocol in [Protocol::Otlp, Protocol::RemoteWrite] {
        let result = Exporter::builder()
            .endpoint(format!("http://{}", dead_addr()))
            .protocol(protocol)
            .timeout(Duration::from_millis(200))
            .build(Arc::new(Registry::new()));

        assert!(
            matches!(result, Err(Error::CollectorUnreachable { .. })),
            "{protocol:?} built against a dead collector"
        );
    }
}

#[test]
fn secure_endpoint_fails_build() {
    let result = Exporter::builder()
        .endpoint("https://127.0.0.1:4317")
        .build(Arc::new(Registry::new()));

    assert!(matches!(result, Err(Error::InvalidEndpoint { .. })));
}

#[test]
fn spawned_exporter_pushes_on_interval_and_flushes_on_shutdown() {
    let (addr, pushes) = grpc_collector(None);
    let handle = Exporter::builder()
        .endpoint(format!("http://{addr}"))
        .interval(Duration::from_millis(100))
        .build(populated_registry())
        .unwrap()
        .spawn()
        .unwrap();

    pushes.recv_timeout(Duration::from_secs(5)).unwrap();
    handle.shutdown();

    // drain anything sent before the final flush
    let mut flushed = 0;
    loop {
        match pushes.recv_timeout(Duration::from_millis(200)) {
            Ok(_) => flushed += 1,
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => break,
        }
    }
    assert!(flushed >= 1);
}

#[test]
fn shutdown_flushes_without_waiting_for_a_tick() {
    let (addr, pushes) = grpc_collector(None);
    let handle = Exporter::builder()
        .endpoint(format!("http://{addr}"))
        .interval(Duration::from_secs(3600))
        .build(populated_registry())
        .unwrap()
        .spawn()
        .unwrap();

    handle.shutdown();
    let request = pushes.recv_timeout(Duration::from_secs(5)).unwrap();
    assert!(!request.resource_metrics[0].scope_metrics[0].metrics.is_empty());
}
