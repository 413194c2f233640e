//! # Módulo del Servidor de Prueba
//! src/server/mod.rs
//!
//! Este módulo implementa el fixture TCP:
//! 1. Hace bind en un puerto (efímero por defecto)
//! 2. Acepta hasta N conexiones en un thread dedicado
//! 3. Pasa cada conexión al handler y registra lo recibido
//! 4. Termina siempre en tiempo acotado al salir del scope

pub mod connection;
pub mod fixture;
pub mod handler;
pub mod report;

// Re-exportar para facilitar el uso
pub use connection::Connection;
pub use fixture::{ActiveServer, FixtureServer, HandlerFailure, Lifecycle};
pub use handler::{Handler, HandlerResult};
pub use report::FixtureReport;
