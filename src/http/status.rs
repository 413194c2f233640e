//! # Códigos de Estado HTTP
//!
//! Los códigos que el fixture sabe generar en su respuesta mínima.
//! Alcanza con los que usan los tests y el flag `--status` del binario.

/// Representa los códigos de estado HTTP que soporta el fixture
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusCode {
    /// 200 OK - La petición fue exitosa
    Ok = 200,

    /// 204 No Content - Petición exitosa sin contenido en el body
    NoContent = 204,

    /// 400 Bad Request
    BadRequest = 400,

    /// 404 Not Found
    NotFound = 404,

    /// 500 Internal Server Error
    InternalServerError = 500,

    /// 503 Service Unavailable
    ServiceUnavailable = 503,
}

impl StatusCode {
    /// Convierte el código a su valor numérico
    ///
    /// # Ejemplo
    /// ```
    /// use fixture_server::http::StatusCode;
    /// assert_eq!(StatusCode::Ok.as_u16(), 200);
    /// ```
    pub fn as_u16(&self) -> u16 {
        *self as u16
    }

    /// Busca el código a partir de su valor numérico
    ///
    /// # Ejemplo
    /// ```
    /// use fixture_server::http::StatusCode;
    /// assert_eq!(StatusCode::from_u16(404), Some(StatusCode::NotFound));
    /// assert_eq!(StatusCode::from_u16(299), None);
    /// ```
    pub fn from_u16(code: u16) -> Option<Self> {
        match code {
            200 => Some(StatusCode::Ok),
            204 => Some(StatusCode::NoContent),
            400 => Some(StatusCode::BadRequest),
            404 => Some(StatusCode::NotFound),
            500 => Some(StatusCode::InternalServerError),
            503 => Some(StatusCode::ServiceUnavailable),
            _ => None,
        }
    }

    /// Retorna el texto de razón (reason phrase) asociado al código
    pub fn reason_phrase(&self) -> &'static str {
        match self {
            StatusCode::Ok => "OK",
            StatusCode::NoContent => "No Content",
            StatusCode::BadRequest => "Bad Request",
            StatusCode::NotFound => "Not Found",
            StatusCode::InternalServerError => "Internal Server Error",
            StatusCode::ServiceUnavailable => "Service Unavailable",
        }
    }
}

impl std::fmt::Display for StatusCode {
    /// Formato: "200 OK"
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.as_u16(), self.reason_phrase())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_u16_matches_as_u16() {
        for status in [
            StatusCode::Ok,
            StatusCode::NoContent,
            StatusCode::BadRequest,
            StatusCode::NotFound,
            StatusCode::InternalServerError,
            StatusCode::ServiceUnavailable,
        ] {
            assert_eq!(StatusCode::from_u16(status.as_u16()), Some(status));
        }
        assert_eq!(StatusCode::from_u16(418), None);
    }

    #[test]
    fn test_display() {
        assert_eq!(StatusCode::Ok.to_string(), "200 OK");
        assert_eq!(StatusCode::NotFound.to_string(), "404 Not Found");
        assert_eq!(StatusCode::ServiceUnavailable.to_string(), "503 Service Unavailable");
    }
}
