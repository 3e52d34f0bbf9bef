//! Server configuration.
//!
//! [`ServerConfig`] gathers every tunable of a connection: pool size, buffer
//! and chunk sizes, upload limit and the liveness timers. Values are checked
//! once by [`ServerConfig::validate`] before a server is built.

use std::time::Duration;

use thiserror::Error;

use crate::codec::{DEFAULT_MAX_PAYLOAD, DEFAULT_SEND_CHUNK};

/// Port the server listens on when none is given.
pub const DEFAULT_PORT: u16 = 2018;

/// Errors reported by [`ServerConfig::validate`].
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// A size or count that must be positive was zero.
    #[error("{field} must be greater than zero")]
    Zero {
        /// Name of the offending setting.
        field: &'static str,
    },
    /// Download chunks would not fit a peer's receive buffer.
    #[error("download chunk of {chunk} bytes exceeds the maximum payload of {max_payload}")]
    ChunkTooLarge {
        /// Configured download chunk.
        chunk: usize,
        /// Configured maximum payload.
        max_payload: usize,
    },
    /// The liveness window would expire before the first keepalive.
    #[error("liveness window {window:?} must be longer than the keepalive interval {keepalive:?}")]
    WindowTooShort {
        /// Configured liveness window.
        window: Duration,
        /// Configured keepalive interval.
        keepalive: Duration,
    },
}

/// Keepalive and liveness timers.
///
/// The window is a multiple of the keepalive interval by default, so the
/// pair is configured together.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LivenessConfig {
    /// Interval between keepalive probes.
    pub keepalive: Duration,
    /// Silence after which an established connection is torn down.
    pub window: Duration,
    /// Silence allowed before the first packet of a connection.
    pub handshake: Duration,
}

impl LivenessConfig {
    /// Ratio between the default liveness window and keepalive interval.
    pub const WINDOW_FACTOR: u32 = 400;

    /// Default handshake window.
    pub const HANDSHAKE: Duration = Duration::from_secs(60);

    /// Derive the window from a keepalive interval.
    ///
    /// # Examples
    ///
    /// ```
    /// use std::time::Duration;
    ///
    /// use filewire::config::LivenessConfig;
    ///
    /// let liveness = LivenessConfig::from_keepalive(Duration::from_millis(250));
    /// assert_eq!(liveness.window, Duration::from_secs(100));
    /// ```
    #[must_use]
    pub fn from_keepalive(keepalive: Duration) -> Self {
        Self {
            keepalive,
            window: keepalive.saturating_mul(Self::WINDOW_FACTOR),
            handshake: Self::HANDSHAKE,
        }
    }
}

impl Default for LivenessConfig {
    fn default() -> Self { Self::from_keepalive(Duration::from_secs(1)) }
}

/// Connection and resource limits for a [`FileServer`](crate::server::FileServer).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ServerConfig {
    /// Concurrent connections; also the pool capacity.
    pub max_clients: usize,
    /// Largest payload accepted in one inbound frame.
    pub max_payload: usize,
    /// File bytes carried by each download `File` packet.
    pub download_chunk: usize,
    /// Largest slice handed to a single socket write.
    pub send_chunk: usize,
    /// Size of the socket read buffer.
    pub read_buffer: usize,
    /// Largest file accepted by an upload.
    pub max_upload: usize,
    /// Keepalive and liveness timers.
    pub liveness: LivenessConfig,
    /// Time allowed for the farewell frame when tearing a connection down.
    pub linger: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            max_clients: 64,
            max_payload: DEFAULT_MAX_PAYLOAD,
            download_chunk: DEFAULT_MAX_PAYLOAD,
            send_chunk: DEFAULT_SEND_CHUNK,
            read_buffer: DEFAULT_SEND_CHUNK,
            max_upload: 256 * 1024 * 1024,
            liveness: LivenessConfig::default(),
            linger: Duration::from_secs(1),
        }
    }
}

impl ServerConfig {
    /// Check the configuration for values the server cannot work with.
    ///
    /// # Errors
    ///
    /// Returns the first [`ConfigError`] found.
    ///
    /// # Examples
    ///
    /// ```
    /// use filewire::config::{ConfigError, ServerConfig};
    ///
    /// let config = ServerConfig {
    ///     max_clients: 0,
    ///     ..ServerConfig::default()
    /// };
    /// assert_eq!(
    ///     config.validate(),
    ///     Err(ConfigError::Zero {
    ///         field: "max_clients"
    ///     })
    /// );
    /// ```
    pub fn validate(&self) -> Result<(), ConfigError> {
        let positive = [
            ("max_clients", self.max_clients),
            ("max_payload", self.max_payload),
            ("download_chunk", self.download_chunk),
            ("send_chunk", self.send_chunk),
            ("read_buffer", self.read_buffer),
        ];
        if let Some(&(field, _)) = positive.iter().find(|(_, value)| *value == 0) {
            return Err(ConfigError::Zero { field });
        }
        if self.liveness.keepalive.is_zero() {
            return Err(ConfigError::Zero {
                field: "liveness.keepalive",
            });
        }
        if self.download_chunk > self.max_payload {
            return Err(ConfigError::ChunkTooLarge {
                chunk: self.download_chunk,
                max_payload: self.max_payload,
            });
        }
        if self.liveness.window <= self.liveness.keepalive {
            return Err(ConfigError::WindowTooShort {
                window: self.liveness.window,
                keepalive: self.liveness.keepalive,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = ServerConfig::default();
        assert_eq!(config.validate(), Ok(()));
        assert_eq!(config.liveness.window, Duration::from_secs(400));
        assert_eq!(config.liveness.handshake, Duration::from_secs(60));
    }

    #[rstest]
    #[case::payload(ServerConfig { max_payload: 0, ..ServerConfig::default() }, "max_payload")]
    #[case::send(ServerConfig { send_chunk: 0, ..ServerConfig::default() }, "send_chunk")]
    #[case::read(ServerConfig { read_buffer: 0, ..ServerConfig::default() }, "read_buffer")]
    fn zero_values_are_rejected(#[case] config: ServerConfig, #[case] field: &'static str) {
        assert_eq!(config.validate(), Err(ConfigError::Zero { field }));
    }

    #[test]
    fn oversized_download_chunk_is_rejected() {
        let config = ServerConfig {
            max_payload: 10,
            download_chunk: 11,
            ..ServerConfig::default()
        };
        assert_eq!(
            config.validate(),
            Err(ConfigError::ChunkTooLarge {
                chunk: 11,
                max_payload: 10
            })
        );
    }

    #[test]
    fn window_must_exceed_keepalive() {
        let config = ServerConfig {
            liveness: LivenessConfig {
                keepalive: Duration::from_secs(2),
                window: Duration::from_secs(2),
                handshake: Duration::from_secs(1),
            },
            ..ServerConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::WindowTooShort { .. })
        ));
    }
}
