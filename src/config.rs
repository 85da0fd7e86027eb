//! Runtime settings for the server loop and the dispatcher.
//!
//! Both structs derive [`serde::Deserialize`] with per-field defaults, so an
//! embedding process can load them from whatever format it already uses and
//! omit any key it does not care about.

use serde::Deserialize;

/// Settings for [`Server`](crate::server::Server).
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address the listener binds to.
    pub bind_addr: String,
    /// Largest complete request (headers plus body) buffered before answering 413.
    pub max_request_size: usize,
    /// Initial read buffer capacity per connection.
    pub read_buffer_size: usize,
    /// Settings for the dispatcher built by
    /// [`Server::dispatcher`](crate::server::Server::dispatcher).
    pub dispatch: DispatchConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:8080".to_owned(),
            max_request_size: 8 * 1024 * 1024,
            read_buffer_size: 4096,
            dispatch: DispatchConfig::default(),
        }
    }
}

/// Settings for [`Dispatcher`](crate::dispatch::Dispatcher).
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// When set, `400 Bad Request` bodies name the binding failure kind.
    /// Off by default; the kind is always logged.
    pub expose_binding_errors: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.bind_addr, "127.0.0.1:8080");
        assert_eq!(config.max_request_size, 8 * 1024 * 1024);
        assert_eq!(config.read_buffer_size, 4096);
        assert!(!config.dispatch.expose_binding_errors);
    }

    #[test]
    fn partial_document_keeps_defaults() {
        let config: ServerConfig = serde_json::from_str(
            r#"{"bind_addr":"0.0.0.0:80","dispatch":{"expose_binding_errors":true}}"#,
        )
        .unwrap();
        assert_eq!(config.bind_addr, "0.0.0.0:80");
        assert_eq!(config.read_buffer_size, 4096);
        assert!(config.dispatch.expose_binding_errors);
    }
}
