//! # Reporte de Resultados
//! src/server/report.rs
//!
//! Resumen serializable de un servidor que ya terminó. Lo imprime el
//! binario al cerrar; en tests es más cómodo mirar `handler_results`.

use super::fixture::FixtureServer;
use crate::http::RequestHead;
use serde::Serialize;

/// Resumen de una corrida del fixture
#[derive(Debug, Clone, Serialize)]
pub struct FixtureReport {
    /// `host:port` donde escuchó
    pub address: String,

    /// Quota configurada
    pub requests_to_handle: usize,

    /// Una entrada por conexión atendida
    pub results: Vec<ResultEntry>,

    /// Handlers que fallaron
    pub errors: Vec<ErrorEntry>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ResultEntry {
    pub index: usize,
    pub len: usize,

    /// Contenido como texto (UTF-8 con reemplazo)
    pub text: String,

    /// Request line si el contenido es un request HTTP
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_line: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorEntry {
    pub index: usize,
    pub message: String,
}

impl FixtureReport {
    pub fn from_server(server: &FixtureServer) -> Self {
        let results = server
            .handler_results()
            .iter()
            .enumerate()
            .map(|(index, bytes)| ResultEntry {
                index,
                len: bytes.len(),
                text: String::from_utf8_lossy(bytes).into_owned(),
                request_line: RequestHead::parse(bytes).ok().map(|head| head.request_line()),
            })
            .collect();

        let errors = server
            .handler_errors()
            .iter()
            .map(|failure| ErrorEntry {
                index: failure.index,
                message: failure.message.clone(),
            })
            .collect();

        Self {
            address: server.local_addr().to_string(),
            requests_to_handle: server.config().requests_to_handle,
            results,
            errors,
        }
    }

    /// JSON con indentación
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServerConfig;
    use std::io::Write;
    use std::net::TcpStream;

    #[test]
    fn test_report_from_finished_server() {
        let config = ServerConfig::default().with_requests_to_handle(2);
        let mut server = FixtureServer::new(config).unwrap();

        server
            .scope(|addr| {
                let mut http = TcpStream::connect(addr).unwrap();
                http.write_all(b"GET /ping HTTP/1.1\r\nHost: x\r\n\r\n").unwrap();
                drop(http);

                let mut raw = TcpStream::connect(addr).unwrap();
                raw.write_all(b"bananadine").unwrap();
            })
            .unwrap();

        let report = FixtureReport::from_server(&server);
        assert_eq!(report.requests_to_handle, 2);
        assert_eq!(report.results.len(), 2);
        assert_eq!(report.results[0].request_line.as_deref(), Some("GET /ping HTTP/1.1"));
        assert_eq!(report.results[1].text, "bananadine");
        assert_eq!(report.results[1].len, 10);
        assert!(report.results[1].request_line.is_none());
        assert!(report.errors.is_empty());

        let json: serde_json::Value = serde_json::from_str(&report.to_json().unwrap()).unwrap();
        assert_eq!(json["results"][1]["text"], "bananadine");
        assert!(json["results"][1].get("request_line").is_none());
        assert_eq!(json["address"], server.local_addr().to_string());
    }
}
