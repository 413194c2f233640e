//! # Conexión Aceptada
//! src/server/connection.rs
//!
//! Envoltura sobre el `TcpStream` aceptado que se le pasa al handler.
//! Todo lo que se lee a través de ella queda registrado, así un handler
//! que no retorna nada igual deja constancia de lo que mandó el cliente.
//!
//! Las lecturas están acotadas por el `request_timeout` del servidor. Un
//! timeout no es un error: [`Connection::recv`] y [`Connection::consume`]
//! lo reportan como "no llegaron datos" (bytes vacíos).

use std::io::{self, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream};
use std::time::Duration;
use tracing::trace;

/// Tamaño de cada lectura al consumir el contenido del socket
const CHUNK_SIZE: usize = 65536;

/// Conexión entregada al handler
#[derive(Debug)]
pub struct Connection {
    stream: TcpStream,
    peer: SocketAddr,
    request_timeout: Duration,

    /// Todo lo leído hasta ahora, en orden
    received: Vec<u8>,
}

impl Connection {
    /// Envuelve un stream aceptado y le aplica el timeout de lectura
    pub fn new(stream: TcpStream, peer: SocketAddr, request_timeout: Duration) -> io::Result<Self> {
        stream.set_read_timeout(Some(request_timeout))?;
        Ok(Self {
            stream,
            peer,
            request_timeout,
            received: Vec::new(),
        })
    }

    /// Lee hasta `max` bytes
    ///
    /// Si no llega nada dentro del timeout retorna un vector vacío.
    /// También retorna vacío si el cliente cerró la conexión.
    pub fn recv(&mut self, max: usize) -> io::Result<Vec<u8>> {
        let mut buffer = vec![0u8; max];
        match self.read(&mut buffer) {
            Ok(n) => {
                buffer.truncate(n);
                Ok(buffer)
            }
            Err(e) if is_timeout(&e) => Ok(Vec::new()),
            Err(e) => Err(e),
        }
    }

    /// Consume todo lo que el cliente mande usando el timeout del servidor
    pub fn consume(&mut self) -> io::Result<Vec<u8>> {
        self.consume_with_timeout(self.request_timeout)
    }

    /// Lee en bloques hasta que pase `timeout` sin datos, el cliente
    /// cierre o resetee la conexión
    ///
    /// Retorna solo lo leído en esta llamada.
    pub fn consume_with_timeout(&mut self, timeout: Duration) -> io::Result<Vec<u8>> {
        self.stream.set_read_timeout(Some(timeout))?;

        let mut content = Vec::new();
        let mut chunk = vec![0u8; CHUNK_SIZE];
        let outcome = loop {
            match self.read(&mut chunk) {
                Ok(0) => break Ok(()),
                Ok(n) => content.extend_from_slice(&chunk[..n]),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) if is_timeout(&e) || is_peer_gone(&e) => break Ok(()),
                Err(e) => break Err(e),
            }
        };

        self.stream.set_read_timeout(Some(self.request_timeout))?;
        outcome?;

        trace!(peer = %self.peer, bytes = content.len(), "content consumed");
        Ok(content)
    }

    /// Escribe todos los bytes y hace flush
    pub fn send_all(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.stream.write_all(bytes)?;
        self.stream.flush()
    }

    /// Todo lo leído a través de esta conexión
    pub fn received(&self) -> &[u8] {
        &self.received
    }

    pub(crate) fn into_received(self) -> Vec<u8> {
        self.received
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    /// Acceso al stream subyacente (para opciones de socket)
    pub fn stream(&self) -> &TcpStream {
        &self.stream
    }

    /// Cierra ambas direcciones ignorando errores (el peer puede ya no estar)
    pub(crate) fn close(&self) {
        let _ = self.stream.shutdown(Shutdown::Both);
    }
}

impl Read for Connection {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.stream.read(buf)?;
        self.received.extend_from_slice(&buf[..n]);
        Ok(n)
    }
}

impl Write for Connection {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.stream.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.stream.flush()
    }
}

/// Un read con timeout vencido aparece como `WouldBlock` en Unix y
/// `TimedOut` en Windows
fn is_timeout(e: &io::Error) -> bool {
    matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut)
}

fn is_peer_gone(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::ConnectionReset | io::ErrorKind::ConnectionAborted
    )
}
