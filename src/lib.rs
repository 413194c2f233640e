//! # Fixture Server
//! src/lib.rs
//!
//! Servidor TCP mínimo y determinista para usar como fixture en tests:
//! levanta un socket real, corre un handler por conexión y captura los
//! bytes que mandó cada cliente. Su única promesa fuerte es que el thread
//! de servicio siempre termina en tiempo acotado, haya o no conexiones, y
//! aunque el test haga panic dentro del scope.
//!
//! ## Arquitectura
//!
//! - `config`: configuración programática y argumentos CLI
//! - `server`: fixture, conexión, handlers y reporte
//! - `http`: respuesta HTTP mínima y lectura de requests capturados
//! - `gate`: compuerta para retener una conexión abierta
//! - `error`: errores que llegan al caller
//!
//! ## Ejemplo de uso
//!
//! ```no_run
//! use fixture_server::{FixtureServer, ServerConfig};
//!
//! let mut server = FixtureServer::basic_response_server(
//!     ServerConfig::default().with_requests_to_handle(2),
//! )?;
//! server.scope(|addr| {
//!     // conectar clientes a `addr`
//! })?;
//! println!("{:?}", server.handler_results());
//! # Ok::<(), fixture_server::FixtureError>(())
//! ```

pub mod config;
pub mod error;
pub mod gate;
pub mod http;
pub mod server;

pub use config::ServerConfig;
pub use error::FixtureError;
pub use gate::CloseGate;
pub use server::{ActiveServer, Connection, FixtureReport, FixtureServer, Handler, HandlerFailure};
