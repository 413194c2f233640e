//! # Errores del Fixture
//! src/error.rs
//!
//! Solo estos errores llegan al caller. Los fallos dentro de un handler,
//! los timeouts de lectura y los errores de `accept` se absorben en el
//! loop de servicio y quedan registrados en los resultados o en el log.

use std::io;
use thiserror::Error;

/// Errores que puede devolver el servidor de prueba
#[derive(Debug, Error)]
pub enum FixtureError {
    /// Configuración inválida (quota o timeout en cero)
    #[error("invalid fixture configuration: {0}")]
    InvalidConfig(String),

    /// El host configurado no resolvió a ninguna dirección
    #[error("could not resolve address {addr}")]
    Resolve { addr: String },

    /// El puerto no está disponible
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },

    /// Falló `listen()` al entrar al scope
    #[error("failed to listen on bound socket: {0}")]
    Listen(#[source] io::Error),

    /// No se pudo lanzar el thread de servicio
    #[error("failed to spawn serve thread: {0}")]
    Spawn(#[source] io::Error),

    /// El servidor ya fue usado; no se puede volver a entrar
    #[error("fixture server already ran and cannot be reused")]
    NotReusable,
}
