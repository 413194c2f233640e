//! # Handlers de Conexión
//! src/server/handler.rs
//!
//! Un handler recibe la conexión aceptada, hace su propio I/O y
//! opcionalmente retorna los bytes que quiere dejar registrados. Si retorna
//! `None`, el servidor registra lo que se haya leído a través de la conexión.
//!
//! Handlers incluidos:
//! - [`text_response`]: consume el request y responde bytes fijos tal cual
//! - [`basic_response`]: igual, con la respuesta HTTP mínima `200 OK`

use super::connection::Connection;
use crate::config::WAIT_EVENT_TIMEOUT;
use crate::gate::CloseGate;
use crate::http::{Response, StatusCode};
use std::io;
use tracing::debug;

/// Resultado de un handler: bytes a registrar (o `None` para usar lo leído)
pub type HandlerResult = io::Result<Option<Vec<u8>>>;

/// Handler de conexión
///
/// Corre en el thread de servicio, una conexión a la vez.
pub type Handler = Box<dyn FnMut(&mut Connection) -> HandlerResult + Send + 'static>;

/// Empaqueta un closure como [`Handler`]
pub fn boxed<F>(handler: F) -> Handler
where
    F: FnMut(&mut Connection) -> HandlerResult + Send + 'static,
{
    Box::new(handler)
}

/// Consume el request y envía `response` sin modificar
///
/// Después de responder, si hay compuerta, retiene la conexión abierta
/// hasta que se active (como máximo [`WAIT_EVENT_TIMEOUT`]).
/// Retorna lo consumido.
pub fn text_response(response: Vec<u8>, gate: Option<CloseGate>) -> Handler {
    boxed(move |conn: &mut Connection| {
        let content = conn.consume()?;

        // Lo capturado importa más que la respuesta: el peer pudo haberse ido
        if let Err(e) = conn.send_all(&response) {
            debug!(peer = %conn.peer_addr(), error = %e, "could not send response");
        }

        if let Some(gate) = &gate {
            if !gate.wait_timeout(WAIT_EVENT_TIMEOUT) {
                debug!(peer = %conn.peer_addr(), "close gate not set, closing anyway");
            }
        }

        Ok(Some(content))
    })
}

/// Handler por defecto: responde `HTTP/1.1 200 OK` con `Content-Length: 0`
pub fn basic_response(gate: Option<CloseGate>) -> Handler {
    text_response(Response::minimal(StatusCode::Ok).to_bytes(), gate)
}
