//! # Cabecera de Requests Capturados
//! src/http/request.rs
//!
//! El fixture guarda bytes crudos. Cuando esos bytes son un request HTTP,
//! el reporte muestra su request line y headers para que sea fácil ver qué
//! mandó el cliente.
//!
//! ## Formato
//!
//! ```text
//! GET /path?query HTTP/1.1\r\n
//! Host: localhost:8080\r\n
//! \r\n
//! ```
//!
//! El método no se valida contra una lista: cualquier token sirve.

use thiserror::Error;

/// Request line + headers de un request HTTP/1.x
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestHead {
    method: String,
    target: String,
    version: String,
    headers: Vec<(String, String)>,
}

/// Errores que pueden ocurrir durante el parsing
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    /// Request vacío
    #[error("Empty request")]
    EmptyRequest,

    /// Falta la línea vacía que cierra los headers
    #[error("Incomplete HTTP request")]
    IncompleteRequest,

    /// Formato inválido de la request line
    #[error("Invalid request line format")]
    InvalidRequestLine,

    /// Versión HTTP que no es 1.0 ni 1.1
    #[error("Invalid HTTP version: {0}")]
    InvalidHttpVersion(String),

    /// Header malformado
    #[error("Invalid header: {0}")]
    InvalidHeader(String),
}

impl RequestHead {
    /// Parsea la cabecera de un request desde bytes
    ///
    /// # Ejemplo
    ///
    /// ```
    /// use fixture_server::http::RequestHead;
    ///
    /// let raw = b"GET /status HTTP/1.1\r\nHost: example\r\n\r\n";
    /// let head = RequestHead::parse(raw).unwrap();
    ///
    /// assert_eq!(head.method(), "GET");
    /// assert_eq!(head.target(), "/status");
    /// assert_eq!(head.header("host"), Some("example"));
    /// ```
    pub fn parse(buffer: &[u8]) -> Result<Self, ParseError> {
        let text = std::str::from_utf8(buffer).map_err(|_| ParseError::InvalidRequestLine)?;

        if text.trim().is_empty() {
            return Err(ParseError::EmptyRequest);
        }

        // Solo la parte antes del body
        let head = match text.find("\r\n\r\n") {
            Some(end) => &text[..end],
            None => return Err(ParseError::IncompleteRequest),
        };

        let mut lines = head.split("\r\n");
        let request_line = lines.next().ok_or(ParseError::IncompleteRequest)?;
        let (method, target, version) = Self::parse_request_line(request_line)?;
        let headers = Self::parse_headers(lines)?;

        Ok(RequestHead {
            method,
            target,
            version,
            headers,
        })
    }

    /// Formato: `METHOD TARGET HTTP/1.x`
    fn parse_request_line(line: &str) -> Result<(String, String, String), ParseError> {
        let parts: Vec<&str> = line.split_whitespace().collect();

        // Debe tener exactamente 3 partes: METHOD TARGET VERSION
        if parts.len() != 3 {
            return Err(ParseError::InvalidRequestLine);
        }

        let version = parts[2].to_string();
        if version != "HTTP/1.0" && version != "HTTP/1.1" {
            return Err(ParseError::InvalidHttpVersion(version));
        }

        Ok((parts[0].to_string(), parts[1].to_string(), version))
    }

    fn parse_headers<'a>(
        lines: impl Iterator<Item = &'a str>,
    ) -> Result<Vec<(String, String)>, ParseError> {
        let mut headers = Vec::new();

        for line in lines {
            match line.find(':') {
                Some(colon_pos) => {
                    let name = line[..colon_pos].trim().to_string();
                    let value = line[colon_pos + 1..].trim().to_string();
                    headers.push((name, value));
                }
                None => return Err(ParseError::InvalidHeader(line.to_string())),
            }
        }

        Ok(headers)
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    /// Primera línea reconstruida: `GET / HTTP/1.1`
    pub fn request_line(&self) -> String {
        format!("{} {} {}", self.method, self.target, self.version)
    }

    /// Busca un header sin distinguir mayúsculas
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(existing, _)| existing.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }
}
