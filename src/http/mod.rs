//! # Módulo HTTP
//!
//! Lo justo de HTTP/1.1 para el fixture:
//!
//! - Construcción de la respuesta mínima que envía el handler básico
//! - Manejo de status codes
//! - Lectura de la cabecera de un request capturado (para el reporte)
//!
//! El fixture en sí es agnóstico del protocolo: cualquier handler puede
//! hablar bytes crudos. Este módulo solo existe para el caso HTTP.
//!
//! ### Formato de la respuesta mínima
//!
//! ```text
//! HTTP/1.1 200 OK\r\n
//! Content-Length: 0\r\n
//! \r\n
//! ```

pub mod request;   // Cabecera de requests capturados
pub mod response;  // Construcción de HTTP responses
pub mod status;    // Códigos de estado HTTP

pub use request::RequestHead;
pub use response::Response;
pub use status::StatusCode;
