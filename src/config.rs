//! # Configuración del Fixture
//! src/config.rs
//!
//! Dos caras de la misma configuración:
//!
//! - [`ServerConfig`]: la que arman los tests en código.
//! - [`CliArgs`]: argumentos del binario `fixture_server`, con soporte de
//!   variables de entorno.
//!
//! ## Ejemplos de uso
//!
//! ### En un test
//! ```
//! use fixture_server::config::ServerConfig;
//! use std::time::Duration;
//!
//! let config = ServerConfig::default()
//!     .with_requests_to_handle(5)
//!     .with_request_timeout(Duration::from_secs(1));
//! assert!(config.validate().is_ok());
//! ```
//!
//! ### CLI
//! ```bash
//! ./fixture_server --requests 3 --request-timeout-ms 1000
//! FIXTURE_PORT=9000 ./fixture_server
//! ```

use crate::error::FixtureError;
use crate::gate::CloseGate;
use crate::http::{Response, StatusCode};
use clap::Parser;
use std::time::Duration;

/// Host por defecto (IPv4 explícito para no depender de cómo resuelve `localhost`)
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Timeout por defecto de cada lectura del handler
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_millis(500);

/// Máximo que un handler retiene la conexión esperando la compuerta
pub const WAIT_EVENT_TIMEOUT: Duration = Duration::from_secs(5);

/// Máximo que espera el teardown a que termine el thread de servicio
pub const JOIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Intervalo entre intentos de `accept` no bloqueantes
pub const ACCEPT_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Configuración del servidor de prueba
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Host donde se hace bind
    pub host: String,

    /// Puerto (0 = efímero, lo elige el sistema operativo)
    pub port: u16,

    /// Cantidad de conexiones a atender antes de cerrar el listener
    pub requests_to_handle: usize,

    /// Timeout de cada lectura dentro del handler
    pub request_timeout: Duration,

    /// Compuerta opcional que retiene la conexión hasta ser activada
    pub wait_to_close_event: Option<CloseGate>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: 0,
            requests_to_handle: 1,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            wait_to_close_event: None,
        }
    }
}

impl ServerConfig {
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_requests_to_handle(mut self, requests: usize) -> Self {
        self.requests_to_handle = requests;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Compuerta que retiene cada conexión abierta hasta que se active
    ///
    /// El teardown la activa siempre al cerrar el scope, también en una
    /// salida normal: después de `scope` la compuerta queda con
    /// `is_set() == true` aunque el caller no la haya tocado.
    pub fn with_wait_to_close_event(mut self, gate: CloseGate) -> Self {
        self.wait_to_close_event = Some(gate);
        self
    }

    /// Obtiene la dirección completa para bind (host:port)
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Valida la configuración
    ///
    /// Un timeout en cero no es válido para `set_read_timeout`, y una
    /// quota en cero dejaría un servidor que nunca acepta nada.
    pub fn validate(&self) -> Result<(), FixtureError> {
        if self.requests_to_handle == 0 {
            return Err(FixtureError::InvalidConfig(
                "requests_to_handle must be >= 1".to_string(),
            ));
        }
        if self.request_timeout.is_zero() {
            return Err(FixtureError::InvalidConfig(
                "request_timeout must be > 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// Argumentos del binario `fixture_server`
#[derive(Debug, Clone, Parser)]
#[command(name = "fixture_server")]
#[command(about = "Servidor TCP de prueba: atiende N conexiones y reporta lo recibido")]
#[command(version = "0.1.0")]
pub struct CliArgs {
    /// Host/IP en el que escucha
    #[arg(long, default_value = DEFAULT_HOST, env = "FIXTURE_HOST")]
    pub host: String,

    /// Puerto en el que escucha (0 = efímero)
    #[arg(short, long, default_value = "0", env = "FIXTURE_PORT")]
    pub port: u16,

    /// Conexiones a atender antes de cerrar
    #[arg(short = 'n', long = "requests", default_value = "1", env = "FIXTURE_REQUESTS")]
    pub requests_to_handle: usize,

    /// Timeout de lectura por conexión en milisegundos
    #[arg(long = "request-timeout-ms", default_value = "500", env = "FIXTURE_REQUEST_TIMEOUT_MS")]
    pub request_timeout_ms: u64,

    /// Código de estado de la respuesta mínima generada
    #[arg(long, default_value = "200")]
    pub status: u16,

    /// Respuesta cruda que se envía tal cual (reemplaza a `--status`)
    #[arg(long)]
    pub response: Option<String>,

    /// Tiempo máximo sirviendo antes de cerrar aunque no se llegue a la quota
    #[arg(long = "serve-timeout-secs", default_value = "60")]
    pub serve_timeout_secs: u64,
}

impl CliArgs {
    /// Convierte los argumentos en la configuración del servidor
    pub fn server_config(&self) -> ServerConfig {
        ServerConfig::default()
            .with_host(self.host.clone())
            .with_port(self.port)
            .with_requests_to_handle(self.requests_to_handle)
            .with_request_timeout(Duration::from_millis(self.request_timeout_ms))
    }

    /// Bytes que el servidor enviará a cada conexión
    pub fn response_bytes(&self) -> Result<Vec<u8>, FixtureError> {
        if let Some(raw) = &self.response {
            return Ok(raw.as_bytes().to_vec());
        }

        let status = StatusCode::from_u16(self.status).ok_or_else(|| {
            FixtureError::InvalidConfig(format!("unsupported status code: {}", self.status))
        })?;
        Ok(Response::minimal(status).to_bytes())
    }

    pub fn serve_timeout(&self) -> Duration {
        Duration::from_secs(self.serve_timeout_secs)
    }
}
