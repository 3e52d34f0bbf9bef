//! Enumerations carried in packet headers and payloads.
//!
//! Each enum maps one-to-one onto a wire byte. Bytes outside the known range
//! are preserved in an `Other` variant so a decoded header always encodes
//! back to the same bytes.

use std::fmt;

macro_rules! wire_enum {
    (
        $(#[$meta:meta])*
        $vis:vis enum $name:ident {
            $($(#[$vmeta:meta])* $variant:ident = $value:literal,)+
        }
    ) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
        $vis enum $name {
            $($(#[$vmeta])* $variant,)+
            /// A byte value with no assigned meaning.
            Other(u8),
        }

        impl $name {
            /// Every known variant in wire order.
            pub const KNOWN: &'static [$name] = &[$($name::$variant,)+];

            /// Interpret a wire byte.
            #[must_use]
            pub const fn from_byte(byte: u8) -> Self {
                match byte {
                    $($value => $name::$variant,)+
                    other => $name::Other(other),
                }
            }

            /// Return the wire byte for this value.
            #[must_use]
            pub const fn as_byte(self) -> u8 {
                match self {
                    $($name::$variant => $value,)+
                    $name::Other(other) => other,
                }
            }

            /// Report whether the value is one of the assigned variants.
            #[must_use]
            pub const fn is_known(self) -> bool { !matches!(self, $name::Other(_)) }
        }

        impl From<u8> for $name {
            fn from(byte: u8) -> Self { Self::from_byte(byte) }
        }

        impl From<$name> for u8 {
            fn from(value: $name) -> Self { value.as_byte() }
        }
    };
}

wire_enum! {
    /// Purpose of a packet, stored in header byte 3.
    pub enum RequestType {
        /// Describes a file: size, owner and name. Opens an upload.
        FileInfo = 0,
        /// Asks the server to allocate a new user id.
        IdRequest = 1,
        /// Carries a freshly allocated user id.
        Id = 2,
        HealthRecord = 3,
        Story = 4,
        Manager = 5,
        Update = 6,
        NewUser = 7,
        /// One chunk of file contents.
        File = 8,
        /// Asks the server to stream a file back.
        FileRequest = 9,
        /// Reports a failed request: `[request type, error code]`.
        Error = 10,
        /// Tears the connection down. Payload is a single error code.
        Suspend = 11,
        /// Keepalive probe.
        ConnectionCheck = 12,
        /// Acknowledges a completed upload.
        FileSaveDone = 13,
    }
}

wire_enum! {
    /// Storage area a file belongs to, stored in header byte 8.
    pub enum FileKind {
        /// Shared downloadable content under the Dlc root.
        Dlc = 0,
        /// Per-user files under `UserRoot/<user id>`.
        User = 1,
        /// The packet does not refer to a file.
        None = 2,
    }
}

wire_enum! {
    /// Failure reasons reported in `Error` and `Suspend` payloads.
    pub enum ErrorCode {
        Success = 0,
        SocketClosed = 1,
        FileNotFound = 2,
        ArgumentError = 3,
        EmptyFile = 4,
        InvalidPacket = 5,
        NoMoreId = 6,
        ConnectionCheckFailed = 7,
        ManualShutdown = 8,
        Unknown = 9,
    }
}

impl RequestType {
    /// Report whether this type opens a new logical operation.
    #[must_use]
    pub const fn starts_operation(self) -> bool {
        matches!(
            self,
            RequestType::FileRequest | RequestType::FileInfo | RequestType::IdRequest
        )
    }
}

impl fmt::Display for RequestType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestType::Other(byte) => write!(f, "Other({byte:#04x})"),
            known => write!(f, "{known:?}"),
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorCode::Other(byte) => write!(f, "Other({byte:#04x})"),
            known => write!(f, "{known:?}"),
        }
    }
}
