//! # Servidor de Prueba
//! src/server/fixture.rs
//!
//! Ciclo de vida:
//!
//! 1. [`FixtureServer::new`] hace bind (sin listen). La dirección ya se
//!    conoce, pero un cliente que conecte ahora es rechazado.
//! 2. [`FixtureServer::enter`] hace listen y lanza el thread de servicio.
//!    Retorna un [`ActiveServer`] sin esperar a ningún cliente.
//! 3. Al soltar el [`ActiveServer`] (fin de scope, `?`, panic) se activa el
//!    flag de stop, se libera la compuerta y se espera al thread con un
//!    tiempo máximo. Después se cierra el listener aunque el thread siga
//!    colgado, así que nadie conecta una vez que el scope retornó. Los
//!    resultados quedan en el [`FixtureServer`].
//!
//! El thread de servicio atiende una conexión a la vez, en orden de
//! llegada, hasta completar la quota. Al aceptar la última conexión cierra
//! el listener, así que un intento extra recibe "connection refused".
//!
//! ## Ejemplo
//!
//! ```no_run
//! use fixture_server::{FixtureServer, ServerConfig};
//! use std::io::Write;
//! use std::net::TcpStream;
//!
//! let mut server = FixtureServer::new(ServerConfig::default())?;
//! server.scope(|addr| {
//!     let mut client = TcpStream::connect(addr).unwrap();
//!     client.write_all(b"hello").unwrap();
//! })?;
//! assert_eq!(server.handler_results()[0], b"hello");
//! # Ok::<(), fixture_server::FixtureError>(())
//! ```

use super::connection::Connection;
use super::handler::{self, Handler};
use crate::config::{ServerConfig, ACCEPT_POLL_INTERVAL, JOIN_TIMEOUT};
use crate::error::FixtureError;
use crate::gate::CloseGate;
use socket2::{Domain, Protocol, SockRef, Socket, Type};
use std::any::Any;
use std::io;
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream, ToSocketAddrs};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, info, info_span, warn};

/// Estado del servidor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    /// Socket con bind, sin listen
    Bound,
    /// Thread de servicio corriendo
    Active,
    /// Ya corrió; no se puede reusar
    Terminated,
}

/// Fallo de un handler (error retornado o panic)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandlerFailure {
    /// Índice de la conexión (orden de aceptación)
    pub index: usize,
    pub message: String,
}

/// Lo que el thread de servicio envía por cada conexión atendida
#[derive(Debug)]
struct ConnectionRecord {
    index: usize,
    outcome: Result<Vec<u8>, String>,
}

/// Servidor TCP de prueba con ciclo de vida acotado
pub struct FixtureServer {
    config: ServerConfig,
    handler: Option<Handler>,
    socket: Option<Socket>,
    local_addr: SocketAddr,
    state: Lifecycle,
    handler_results: Vec<Vec<u8>>,
    handler_errors: Vec<HandlerFailure>,
}

impl FixtureServer {
    /// Servidor con el handler por defecto (respuesta HTTP mínima)
    pub fn new(config: ServerConfig) -> Result<Self, FixtureError> {
        let handler = handler::basic_response(config.wait_to_close_event.clone());
        Self::with_handler(config, handler)
    }

    /// Servidor con un handler propio
    pub fn with_handler(config: ServerConfig, handler: Handler) -> Result<Self, FixtureError> {
        config.validate()?;
        let (socket, local_addr) = bind_socket(&config)?;

        info!(addr = %local_addr, quota = config.requests_to_handle, "fixture server bound");

        Ok(Self {
            config,
            handler: Some(handler),
            socket: Some(socket),
            local_addr,
            state: Lifecycle::Bound,
            handler_results: Vec::new(),
            handler_errors: Vec::new(),
        })
    }

    /// Responde `HTTP/1.1 200 OK` vacío a cada conexión
    pub fn basic_response_server(config: ServerConfig) -> Result<Self, FixtureError> {
        Self::new(config)
    }

    /// Responde `text` tal cual a cada conexión
    pub fn text_response_server(
        text: impl Into<Vec<u8>>,
        config: ServerConfig,
    ) -> Result<Self, FixtureError> {
        let handler = handler::text_response(text.into(), config.wait_to_close_event.clone());
        Self::with_handler(config, handler)
    }

    /// Hace listen y lanza el thread de servicio
    ///
    /// No bloquea esperando clientes. Falla con [`FixtureError::NotReusable`]
    /// si el servidor ya corrió.
    pub fn enter(&mut self) -> Result<ActiveServer<'_>, FixtureError> {
        let (socket, handler) = match (self.state, self.socket.take(), self.handler.take()) {
            (Lifecycle::Bound, Some(socket), Some(handler)) => (socket, handler),
            _ => return Err(FixtureError::NotReusable),
        };
        // Desde acá, pase lo que pase, el servidor no vuelve a Bound
        self.state = Lifecycle::Terminated;

        let backlog = i32::try_from(self.config.requests_to_handle).unwrap_or(i32::MAX);
        socket.listen(backlog).map_err(FixtureError::Listen)?;
        socket.set_nonblocking(true).map_err(FixtureError::Listen)?;
        // Segundo descriptor del mismo socket: el teardown lo cierra aunque
        // el thread de servicio no termine
        let listen_socket = socket.try_clone().map_err(FixtureError::Listen)?;
        let listener: TcpListener = socket.into();

        let stop = Arc::new(AtomicBool::new(false));
        let (sender, records) = mpsc::channel();
        let serve = ServeLoop {
            listener,
            handler,
            quota: self.config.requests_to_handle,
            request_timeout: self.config.request_timeout,
            stop: Arc::clone(&stop),
            records: sender,
        };

        // El thread hereda el span del caller para que sus logs queden asociados
        let span = info_span!("fixture_server", addr = %self.local_addr);
        let handle = thread::Builder::new()
            .name("fixture-server".to_string())
            .spawn(move || span.in_scope(|| serve.run()))
            .map_err(FixtureError::Spawn)?;

        self.state = Lifecycle::Active;
        info!(addr = %self.local_addr, "fixture server listening");

        Ok(ActiveServer {
            gate: self.config.wait_to_close_event.clone(),
            server: self,
            stop,
            listen_socket: Some(listen_socket),
            handle: Some(handle),
            records,
        })
    }

    /// Corre `body` dentro del ciclo de vida del servidor
    ///
    /// El teardown corre siempre. Si `body` hace panic, el panic sigue su
    /// curso después de la limpieza; si retorna un `Err` propio, se
    /// devuelve tal cual dentro del `Ok`.
    pub fn scope<F, T>(&mut self, body: F) -> Result<T, FixtureError>
    where
        F: FnOnce(SocketAddr) -> T,
    {
        let active = self.enter()?;
        let out = body(active.local_addr());
        active.close();
        Ok(out)
    }

    /// Dirección real (con el puerto elegido por el sistema)
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// `(host, port)` tal como se configuró el host
    pub fn address(&self) -> (String, u16) {
        (self.config.host.clone(), self.local_addr.port())
    }

    /// Bytes registrados por conexión, en orden de aceptación
    pub fn handler_results(&self) -> &[Vec<u8>] {
        &self.handler_results
    }

    /// Handlers que fallaron (su entrada en los resultados queda vacía)
    pub fn handler_errors(&self) -> &[HandlerFailure] {
        &self.handler_errors
    }

    pub fn state(&self) -> Lifecycle {
        self.state
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    fn absorb(&mut self, record: ConnectionRecord) {
        match record.outcome {
            Ok(bytes) => {
                debug!(index = record.index, bytes = bytes.len(), "handler result recorded");
                self.handler_results.push(bytes);
            }
            Err(message) => {
                self.handler_results.push(Vec::new());
                self.handler_errors.push(HandlerFailure {
                    index: record.index,
                    message,
                });
            }
        }
    }
}

impl std::fmt::Debug for FixtureServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FixtureServer")
            .field("local_addr", &self.local_addr)
            .field("state", &self.state)
            .field("requests_to_handle", &self.config.requests_to_handle)
            .field("handler_results", &self.handler_results.len())
            .finish()
    }
}

/// Servidor en ejecución; el teardown corre al soltarlo
pub struct ActiveServer<'a> {
    server: &'a mut FixtureServer,
    stop: Arc<AtomicBool>,
    gate: Option<CloseGate>,
    listen_socket: Option<Socket>,
    handle: Option<JoinHandle<()>>,
    records: Receiver<ConnectionRecord>,
}

impl ActiveServer<'_> {
    pub fn local_addr(&self) -> SocketAddr {
        self.server.local_addr
    }

    /// `(host, port)` para conectar clientes
    pub fn address(&self) -> (String, u16) {
        self.server.address()
    }

    /// Espera a que el thread de servicio complete la quota
    ///
    /// Retorna `true` si terminó antes de `timeout`.
    pub fn wait_for_quota(&self, timeout: Duration) -> bool {
        match &self.handle {
            Some(handle) => wait_finished(handle, timeout),
            None => true,
        }
    }

    /// Teardown explícito (equivalente a soltar el guard)
    pub fn close(self) {}

    fn teardown(&mut self) {
        self.stop.store(true, Ordering::SeqCst);

        // Nadie sigue reteniendo conexiones una vez que el scope terminó
        if let Some(gate) = &self.gate {
            gate.set();
        }

        // El join va antes del cierre: lo que ya está en el backlog se atiende
        let finished = match &self.handle {
            Some(handle) => wait_finished(handle, JOIN_TIMEOUT),
            None => true,
        };

        if let Some(socket) = self.listen_socket.take() {
            shutdown_listener(SockRef::from(&socket));
        }

        if let Some(handle) = self.handle.take() {
            if !finished {
                // El thread queda suelto, pero ya no puede aceptar conexiones
                warn!(timeout = ?JOIN_TIMEOUT, "fixture serve thread did not finish in time");
            } else if handle.join().is_err() {
                warn!("fixture serve thread panicked");
            }
        }

        for record in self.records.try_iter() {
            self.server.absorb(record);
        }

        self.server.state = Lifecycle::Terminated;
        info!(
            addr = %self.server.local_addr,
            handled = self.server.handler_results.len(),
            failed = self.server.handler_errors.len(),
            "fixture server terminated"
        );
    }
}

impl Drop for ActiveServer<'_> {
    fn drop(&mut self) {
        if thread::panicking() {
            debug!("tearing down fixture server while unwinding");
        }
        self.teardown();
    }
}

/// Polling de `is_finished` con tiempo máximo
fn wait_finished(handle: &JoinHandle<()>, timeout: Duration) -> bool {
    let start = Instant::now();
    while !handle.is_finished() {
        if start.elapsed() >= timeout {
            return false;
        }
        thread::sleep(ACCEPT_POLL_INTERVAL);
    }
    true
}

/// Deja de escuchar en todos los descriptores del socket
///
/// Soltar un descriptor no alcanza: mientras quede otro abierto el socket
/// sigue en LISTEN. Un error acá (socket ya cerrado) no importa.
fn shutdown_listener(socket: SockRef<'_>) {
    if let Err(e) = socket.shutdown(Shutdown::Both) {
        debug!(error = %e, "listener already shut down");
    }
}

/// Resuelve `host:port` y hace bind sin listen
fn bind_socket(config: &ServerConfig) -> Result<(Socket, SocketAddr), FixtureError> {
    let address = config.address();
    let bind_error = |source: io::Error| FixtureError::Bind {
        addr: address.clone(),
        source,
    };

    let addr = address
        .to_socket_addrs()
        .map_err(bind_error)?
        .next()
        .ok_or_else(|| FixtureError::Resolve {
            addr: address.clone(),
        })?;

    let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))
        .map_err(bind_error)?;
    socket.bind(&addr.into()).map_err(bind_error)?;

    let local_addr = socket
        .local_addr()
        .map_err(bind_error)?
        .as_socket()
        .ok_or_else(|| FixtureError::Resolve {
            addr: address.clone(),
        })?;

    Ok((socket, local_addr))
}

/// Estado del thread de servicio
struct ServeLoop {
    listener: TcpListener,
    handler: Handler,
    quota: usize,
    request_timeout: Duration,
    stop: Arc<AtomicBool>,
    records: Sender<ConnectionRecord>,
}

impl ServeLoop {
    fn run(self) {
        let ServeLoop {
            listener,
            mut handler,
            quota,
            request_timeout,
            stop,
            records,
        } = self;
        let mut listener = Some(listener);

        for index in 0..quota {
            let accepted = match listener.as_ref() {
                Some(l) => accept_next(l, &stop),
                None => None,
            };
            let Some((stream, peer)) = accepted else {
                break;
            };

            if index + 1 == quota {
                // Quota completa: conexiones nuevas son rechazadas desde ya
                if let Some(l) = listener.take() {
                    shutdown_listener(SockRef::from(&l));
                }
                debug!(quota, "quota reached, listener closed");
            }

            debug!(index, peer = %peer, "connection accepted");
            let outcome = handle_connection(stream, peer, request_timeout, &mut handler);
            if let Err(message) = &outcome {
                warn!(index, peer = %peer, error = %message, "handler failed");
            }

            if records.send(ConnectionRecord { index, outcome }).is_err() {
                break;
            }
        }

        if let Some(l) = listener.take() {
            shutdown_listener(SockRef::from(&l));
        }
        debug!("serve loop finished");
    }
}

/// Acepta la próxima conexión haciendo polling del listener no bloqueante
///
/// Después del stop sigue aceptando lo que ya esté en el backlog; retorna
/// `None` cuando no queda nada pendiente o si `accept` falla.
fn accept_next(listener: &TcpListener, stop: &AtomicBool) -> Option<(TcpStream, SocketAddr)> {
    loop {
        match listener.accept() {
            Ok((stream, peer)) => {
                // En algunos sistemas el socket aceptado hereda O_NONBLOCK
                if let Err(e) = stream.set_nonblocking(false) {
                    warn!(peer = %peer, error = %e, "could not make accepted stream blocking");
                    return None;
                }
                return Some((stream, peer));
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                if stop.load(Ordering::SeqCst) {
                    return None;
                }
                thread::sleep(ACCEPT_POLL_INTERVAL);
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            // Tras el stop, el teardown puede haber cerrado el listener
            Err(e) if stop.load(Ordering::SeqCst) => {
                debug!(error = %e, "accept stopped after teardown");
                return None;
            }
            Err(e) => {
                warn!(error = %e, "accept failed, stopping serve loop");
                return None;
            }
        }
    }
}

/// Corre el handler sobre una conexión y decide qué se registra
fn handle_connection(
    stream: TcpStream,
    peer: SocketAddr,
    request_timeout: Duration,
    handler: &mut Handler,
) -> Result<Vec<u8>, String> {
    let mut conn = Connection::new(stream, peer, request_timeout).map_err(|e| e.to_string())?;

    let outcome = panic::catch_unwind(AssertUnwindSafe(|| handler(&mut conn)));
    conn.close();

    match outcome {
        Ok(Ok(Some(bytes))) => Ok(bytes),
        Ok(Ok(None)) => Ok(conn.into_received()),
        Ok(Err(e)) => Err(e.to_string()),
        Err(payload) => Err(panic_message(payload.as_ref())),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        format!("handler panicked: {}", message)
    } else if let Some(message) = payload.downcast_ref::<String>() {
        format!("handler panicked: {}", message)
    } else {
        "handler panicked".to_string()
    }
}
