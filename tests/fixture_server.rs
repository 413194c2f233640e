//! Tests de integración para el servidor de prueba
//! tests/fixture_server.rs
//!
//! Usan sockets reales sobre puertos efímeros, así que no necesitan nada
//! corriendo de antemano. Cada test de ciclo de vida lleva un timeout: si el
//! thread de servicio no termina, el test falla en vez de colgar la suite.

use fixture_server::config::{ACCEPT_POLL_INTERVAL, JOIN_TIMEOUT};
use fixture_server::server::handler;
use fixture_server::{CloseGate, Connection, FixtureError, FixtureServer, ServerConfig};
use std::io::{Read, Write};
use std::net::TcpStream;
use std::panic::{self, AssertUnwindSafe};
use std::thread;
use std::time::{Duration, Instant};

/// Helper: cliente HTTP sin pool ni proxy (cada request abre su conexión)
fn http_client() -> reqwest::blocking::Client {
    reqwest::blocking::Client::builder()
        .no_proxy()
        .pool_max_idle_per_host(0)
        .timeout(Duration::from_secs(10))
        .build()
        .expect("build http client")
}

fn url(server: &FixtureServer) -> String {
    let (host, port) = server.address();
    format!("http://{}:{}", host, port)
}

#[test]
#[ntest::timeout(10000)]
fn test_basic_exchange() {
    let question = b"success?";
    let answer = b"yeah, success";

    let handler = handler::boxed(move |conn: &mut Connection| {
        let text = conn.recv(1000)?;
        assert_eq!(text, question);
        conn.send_all(answer)?;
        Ok(None)
    });
    let mut server = FixtureServer::with_handler(ServerConfig::default(), handler).unwrap();

    server
        .scope(|addr| {
            let mut sock = TcpStream::connect(addr).unwrap();
            sock.write_all(question).unwrap();
            let mut text = [0u8; 13];
            sock.read_exact(&mut text).unwrap();
            assert_eq!(&text, answer);
        })
        .unwrap();

    assert!(server.handler_errors().is_empty());
}

#[test]
#[ntest::timeout(10000)]
fn test_server_closes_when_scope_ends() {
    let mut server = FixtureServer::basic_response_server(ServerConfig::default()).unwrap();
    let addr = server.local_addr();

    server
        .scope(|addr| {
            let sock = TcpStream::connect(addr).unwrap();
            drop(sock);
        })
        .unwrap();

    assert!(TcpStream::connect(addr).is_err());
}

#[test]
#[ntest::timeout(10000)]
fn test_text_response() {
    let mut server = FixtureServer::text_response_server(
        "HTTP/1.1 200 OK\r\nContent-Length: 6\r\n\r\nroflol",
        ServerConfig::default(),
    )
    .unwrap();
    let url = url(&server);

    server
        .scope(|_| {
            let r = http_client().get(&url).send().unwrap();
            assert_eq!(r.status(), 200);
            assert_eq!(r.headers()["Content-Length"], "6");
            assert_eq!(r.text().unwrap(), "roflol");
        })
        .unwrap();
}

#[test]
#[ntest::timeout(10000)]
fn test_basic_response() {
    let mut server = FixtureServer::basic_response_server(ServerConfig::default()).unwrap();
    let url = url(&server);

    server
        .scope(|_| {
            let r = http_client().get(&url).send().unwrap();
            assert_eq!(r.status(), 200);
            assert_eq!(r.headers()["Content-Length"], "0");
            assert_eq!(r.text().unwrap(), "");
        })
        .unwrap();

    let recorded = String::from_utf8_lossy(&server.handler_results()[0]).into_owned();
    assert!(recorded.starts_with("GET / HTTP/1.1\r\n"));
}

#[test]
#[ntest::timeout(15000)]
fn test_basic_waiting_server() {
    let block_server = CloseGate::new();
    let config = ServerConfig::default().with_wait_to_close_event(block_server.clone());
    let mut server = FixtureServer::basic_response_server(config).unwrap();

    server
        .scope(|addr| {
            let mut sock = TcpStream::connect(addr).unwrap();
            sock.write_all(b"send something").unwrap();
            thread::sleep(Duration::from_millis(1500));
            // El handler ya respondió pero sigue reteniendo la conexión
            sock.write_all(b"still alive").unwrap();
            block_server.set();
        })
        .unwrap();

    assert_eq!(server.handler_results(), &[b"send something".to_vec()]);
}

#[test]
#[ntest::timeout(20000)]
fn test_multiple_requests() {
    let requests_to_handle = 5;
    let config = ServerConfig::default().with_requests_to_handle(requests_to_handle);
    let mut server = FixtureServer::basic_response_server(config).unwrap();
    let url = url(&server);

    server
        .scope(|_| {
            let client = http_client();
            for _ in 0..requests_to_handle {
                let r = client.get(&url).send().unwrap();
                assert_eq!(r.status(), 200);
            }

            // La request n+1 falla: el listener ya se cerró
            let err = client.get(&url).send().unwrap_err();
            assert!(err.is_connect(), "expected connect error, got: {}", err);
        })
        .unwrap();

    assert_eq!(server.handler_results().len(), requests_to_handle);
}

#[test]
#[ntest::timeout(10000)]
fn test_request_recovery() {
    let config = ServerConfig::default().with_requests_to_handle(2);
    let mut server = FixtureServer::basic_response_server(config).unwrap();
    let first_request = b"put your hands up in the air";
    let second_request = b"put your hand down in the floor";

    server
        .scope(|addr| {
            let mut sock1 = TcpStream::connect(addr).unwrap();
            sock1.write_all(first_request).unwrap();
            drop(sock1);

            let mut sock2 = TcpStream::connect(addr).unwrap();
            sock2.write_all(second_request).unwrap();
            drop(sock2);
        })
        .unwrap();

    assert_eq!(server.handler_results()[0], first_request);
    assert_eq!(server.handler_results()[1], second_request);
}

#[test]
#[ntest::timeout(10000)]
fn test_results_keep_acceptance_order() {
    let payloads: Vec<Vec<u8>> = (0..4).map(|i| format!("payload-{}", i).into_bytes()).collect();
    let config = ServerConfig::default().with_requests_to_handle(payloads.len());
    let mut server = FixtureServer::basic_response_server(config).unwrap();

    server
        .scope(|addr| {
            for payload in &payloads {
                let mut sock = TcpStream::connect(addr).unwrap();
                sock.write_all(payload).unwrap();
            }
        })
        .unwrap();

    assert_eq!(server.handler_results(), payloads.as_slice());
}

#[test]
#[ntest::timeout(10000)]
fn test_requests_after_timeout_are_not_received() {
    let config = ServerConfig::default().with_request_timeout(Duration::from_secs(1));
    let mut server = FixtureServer::basic_response_server(config).unwrap();

    server
        .scope(|addr| {
            let mut sock = TcpStream::connect(addr).unwrap();
            thread::sleep(Duration::from_millis(1500));
            // Puede fallar si el servidor ya cerró; no importa
            let _ = sock.write_all(b"hehehe, not received");
        })
        .unwrap();

    assert_eq!(server.handler_results(), &[Vec::<u8>::new()]);
}

#[test]
#[ntest::timeout(10000)]
fn test_request_recovery_with_bigger_timeout() {
    let config = ServerConfig::default().with_request_timeout(Duration::from_secs(3));
    let mut server = FixtureServer::basic_response_server(config).unwrap();
    let data = b"bananadine";

    server
        .scope(|addr| {
            let mut sock = TcpStream::connect(addr).unwrap();
            thread::sleep(Duration::from_millis(1500));
            sock.write_all(data).unwrap();
        })
        .unwrap();

    assert_eq!(server.handler_results(), &[data.to_vec()]);
}

#[test]
#[ntest::timeout(10000)]
fn test_server_finishes_on_error() {
    let mut server = FixtureServer::basic_response_server(ServerConfig::default()).unwrap();

    let start = Instant::now();
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
        server
            .scope(|_| -> () { panic!("scope body failed") })
            .unwrap()
    }));

    // El panic original llega intacto después del teardown
    let payload = outcome.unwrap_err();
    assert_eq!(payload.downcast_ref::<&str>(), Some(&"scope body failed"));
    assert!(server.handler_results().is_empty());
    assert!(start.elapsed() < Duration::from_secs(2));
    assert!(TcpStream::connect(server.local_addr()).is_err());
}

#[test]
#[ntest::timeout(10000)]
fn test_scope_error_is_returned_unchanged() {
    let mut server = FixtureServer::basic_response_server(ServerConfig::default()).unwrap();

    let result: Result<(), std::io::Error> = server
        .scope(|_| Err(std::io::Error::new(std::io::ErrorKind::InvalidData, "bad body")))
        .unwrap();

    let err = result.unwrap_err();
    assert_eq!(err.kind(), std::io::ErrorKind::InvalidData);
    assert_eq!(err.to_string(), "bad body");
    assert!(server.handler_results().is_empty());
}

#[test]
#[ntest::timeout(10000)]
fn test_server_finishes_when_no_connections() {
    let mut server = FixtureServer::basic_response_server(ServerConfig::default()).unwrap();

    let start = Instant::now();
    server.scope(|_| ()).unwrap();

    assert!(server.handler_results().is_empty());
    assert!(start.elapsed() < Duration::from_secs(1));
}

#[test]
#[ntest::timeout(10000)]
fn test_server_is_not_reusable() {
    let mut server = FixtureServer::basic_response_server(ServerConfig::default()).unwrap();
    server.scope(|_| ()).unwrap();

    let err = server.scope(|_| ()).unwrap_err();
    assert!(matches!(err, FixtureError::NotReusable));
}

#[test]
#[ntest::timeout(20000)]
fn test_hung_handler_does_not_block_exit() {
    let mut calls = 0;
    let handler = handler::boxed(move |conn: &mut Connection| {
        calls += 1;
        let data = conn.consume()?;
        if calls == 2 {
            // Se cuelga más allá del tiempo máximo de join
            thread::sleep(JOIN_TIMEOUT + Duration::from_secs(3));
        }
        Ok(Some(data))
    });
    let config = ServerConfig::default().with_requests_to_handle(3);
    let mut server = FixtureServer::with_handler(config, handler).unwrap();
    let addr = server.local_addr();

    let start = Instant::now();
    server
        .scope(|addr| {
            let mut sock1 = TcpStream::connect(addr).unwrap();
            sock1.write_all(b"before the hang").unwrap();
            drop(sock1);

            let mut sock2 = TcpStream::connect(addr).unwrap();
            sock2.write_all(b"hangs").unwrap();
            drop(sock2);
            thread::sleep(Duration::from_millis(300));
        })
        .unwrap();
    let teardown = start.elapsed();

    assert!(
        teardown < JOIN_TIMEOUT + Duration::from_millis(300) + ACCEPT_POLL_INTERVAL * 50,
        "teardown took {:?}",
        teardown
    );
    // Lo que llegó antes del cuelgue se conserva
    assert_eq!(server.handler_results(), &[b"before the hang".to_vec()]);
    // La quota no se completó, pero el puerto ya no acepta conexiones
    assert!(TcpStream::connect(addr).is_err());
}

#[test]
#[ntest::timeout(10000)]
fn test_close_gate_is_released_on_normal_exit() {
    let gate = CloseGate::new();
    let config = ServerConfig::default().with_wait_to_close_event(gate.clone());
    let mut server = FixtureServer::basic_response_server(config).unwrap();

    server.scope(|_| assert!(!gate.is_set())).unwrap();

    assert!(gate.is_set());
}
