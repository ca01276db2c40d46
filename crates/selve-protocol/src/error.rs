//! Protocol error types.

use thiserror::Error;

/// Errors raised while decoding inbound frames.
///
/// Every variant keeps the offending bytes so the caller can log them; the
/// codec has already discarded the frame by the time the error is seen.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Frame body is not a well-formed envelope.
    #[error("malformed frame: {reason}")]
    Malformed {
        /// What was wrong with the frame.
        reason: String,
        /// Raw frame bytes.
        raw: Vec<u8>,
    },

    /// Frame grew past the maximum size without closing.
    #[error("frame too long: maximum {max} bytes, got {actual}")]
    FrameTooLong {
        /// Maximum allowed length.
        max: usize,
        /// Number of bytes discarded.
        actual: usize,
        /// Leading bytes of the discarded frame.
        raw: Vec<u8>,
    },

    /// Method name not in the catalog.
    #[error("unknown method name: {name}")]
    UnknownMethod {
        /// The name as received.
        name: String,
        /// Raw frame bytes.
        raw: Vec<u8>,
    },

    /// Value element with a type tag this codec does not support.
    #[error("unsupported value type <{tag}>")]
    UnsupportedValueType {
        /// The element tag.
        tag: String,
        /// Raw frame bytes.
        raw: Vec<u8>,
    },

    /// Frame text is not valid UTF-8.
    #[error("invalid UTF-8 in frame")]
    InvalidUtf8 {
        /// Raw frame bytes.
        raw: Vec<u8>,
    },
}

impl ProtocolError {
    /// Raw bytes of the frame that failed to decode.
    pub fn raw(&self) -> &[u8] {
        match self {
            ProtocolError::Malformed { raw, .. }
            | ProtocolError::FrameTooLong { raw, .. }
            | ProtocolError::UnknownMethod { raw, .. }
            | ProtocolError::UnsupportedValueType { raw, .. }
            | ProtocolError::InvalidUtf8 { raw } => raw,
        }
    }

    /// Short label for metrics and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            ProtocolError::Malformed { .. } => "malformed",
            ProtocolError::FrameTooLong { .. } => "too_long",
            ProtocolError::UnknownMethod { .. } => "unknown_method",
            ProtocolError::UnsupportedValueType { .. } => "unsupported_type",
            ProtocolError::InvalidUtf8 { .. } => "invalid_utf8",
        }
    }
}

/// A caller-constructed call cannot be put on the wire.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EncodingError {
    /// Integer does not fit the gateway's signed 32-bit int.
    #[error("integer {0} out of range for <int>")]
    IntOutOfRange(i64),

    /// Enum ordinal unknown to this codec.
    #[error("unknown {enum_name} ordinal {value}")]
    UnknownEnumOrdinal {
        /// Name of the enum type.
        enum_name: &'static str,
        /// The rejected ordinal.
        value: i64,
    },

    /// Entity id outside the id space of its kind.
    #[error("id {id} out of range (max {max})")]
    IdOutOfRange {
        /// The rejected id.
        id: u8,
        /// Highest valid id.
        max: u8,
    },

    /// Percentage or angle outside its scale.
    #[error("value {value} exceeds scale {max}")]
    ScaleOutOfRange {
        /// The rejected value.
        value: u32,
        /// Scale maximum.
        max: u32,
    },
}

/// A decoded response does not carry the values its layout requires.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PayloadError {
    /// A positional return value is missing.
    #[error("{method}: missing {kind} return value #{index}")]
    Missing {
        /// Method whose layout was being read.
        method: &'static str,
        /// Value type class (int, string, base64).
        kind: &'static str,
        /// Position within that type class.
        index: usize,
    },

    /// Integer does not map to a known enum member.
    #[error("invalid {enum_name} value {value}")]
    InvalidEnum {
        /// Name of the enum type.
        enum_name: &'static str,
        /// The rejected value.
        value: i64,
    },

    /// Base64 blob could not be decoded.
    #[error("invalid base64 payload: {0}")]
    InvalidBase64(String),

    /// Payload was decoded against the wrong method.
    #[error("expected response to {expected}, got {actual}")]
    WrongMethod {
        /// Expected method name.
        expected: &'static str,
        /// Received method name.
        actual: &'static str,
    },
}

/// Fault codes reported by the gateway in `<fault>` responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FaultCode {
    UnknownError,
    MethodNotSupported,
    MethodNotReachable,
    ParameterCount,
    ParameterOrder,
    ExecutionFailed,
    ParameterOutOfRange,
    SyntaxError,
    MethodTooLong,
    IdNotUsed,
    IdAlreadyExists,
    AddressInUse,
    NoMemberAvailable,
    DutyCycleReached,
    BootloaderMethodNotSupported,
    BootloaderWrongFile,
    BootloaderChecksum,
    BootloaderSyntax,
    /// Code not in the documented table.
    Other(i32),
}

impl FaultCode {
    /// Human-readable description used by the gateway documentation.
    pub fn message(&self) -> &'static str {
        match self {
            FaultCode::UnknownError => "Unknown Error",
            FaultCode::MethodNotSupported => "Method not supported",
            FaultCode::MethodNotReachable => "Method not reachable",
            FaultCode::ParameterCount => "Parameter count",
            FaultCode::ParameterOrder => "Parameter order",
            FaultCode::ExecutionFailed => "Execution failed",
            FaultCode::ParameterOutOfRange => "Parameter out of range",
            FaultCode::SyntaxError => "Syntax error",
            FaultCode::MethodTooLong => "Method length too large",
            FaultCode::IdNotUsed => "ID is not used",
            FaultCode::IdAlreadyExists => "ID already exists",
            FaultCode::AddressInUse => "Address is already used",
            FaultCode::NoMemberAvailable => "No member available",
            FaultCode::DutyCycleReached => "Duty Cycle is reached",
            FaultCode::BootloaderMethodNotSupported => "Bootl: Method not supported",
            FaultCode::BootloaderWrongFile => "Bootl: Wrong file",
            FaultCode::BootloaderChecksum => "Bootl: Checksum error",
            FaultCode::BootloaderSyntax => "Bootl: Syntax error",
            FaultCode::Other(_) => "Undocumented fault",
        }
    }
}

impl std::fmt::Display for FaultCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.message(), i32::from(*self))
    }
}

impl From<i32> for FaultCode {
    fn from(code: i32) -> Self {
        use crate::constants::*;
        match code {
            FAULT_UNKNOWN_ERROR => FaultCode::UnknownError,
            FAULT_METHOD_NOT_SUPPORTED => FaultCode::MethodNotSupported,
            FAULT_METHOD_NOT_REACHABLE => FaultCode::MethodNotReachable,
            FAULT_PARAMETER_COUNT => FaultCode::ParameterCount,
            FAULT_PARAMETER_ORDER => FaultCode::ParameterOrder,
            FAULT_EXECUTION_FAILED => FaultCode::ExecutionFailed,
            FAULT_PARAMETER_OUT_OF_RANGE => FaultCode::ParameterOutOfRange,
            FAULT_SYNTAX_ERROR => FaultCode::SyntaxError,
            FAULT_METHOD_TOO_LONG => FaultCode::MethodTooLong,
            FAULT_ID_NOT_USED => FaultCode::IdNotUsed,
            FAULT_ID_EXISTS => FaultCode::IdAlreadyExists,
            FAULT_ADDRESS_IN_USE => FaultCode::AddressInUse,
            FAULT_NO_MEMBER => FaultCode::NoMemberAvailable,
            FAULT_DUTY_CYCLE_REACHED => FaultCode::DutyCycleReached,
            FAULT_BOOTLOADER_NOT_SUPPORTED => FaultCode::BootloaderMethodNotSupported,
            FAULT_BOOTLOADER_WRONG_FILE => FaultCode::BootloaderWrongFile,
            FAULT_BOOTLOADER_CHECKSUM => FaultCode::BootloaderChecksum,
            FAULT_BOOTLOADER_SYNTAX => FaultCode::BootloaderSyntax,
            _ => FaultCode::Other(code),
        }
    }
}

impl From<FaultCode> for i32 {
    fn from(code: FaultCode) -> Self {
        use crate::constants::*;
        match code {
            FaultCode::UnknownError => FAULT_UNKNOWN_ERROR,
            FaultCode::MethodNotSupported => FAULT_METHOD_NOT_SUPPORTED,
            FaultCode::MethodNotReachable => FAULT_METHOD_NOT_REACHABLE,
            FaultCode::ParameterCount => FAULT_PARAMETER_COUNT,
            FaultCode::ParameterOrder => FAULT_PARAMETER_ORDER,
            FaultCode::ExecutionFailed => FAULT_EXECUTION_FAILED,
            FaultCode::ParameterOutOfRange => FAULT_PARAMETER_OUT_OF_RANGE,
            FaultCode::SyntaxError => FAULT_SYNTAX_ERROR,
            FaultCode::MethodTooLong => FAULT_METHOD_TOO_LONG,
            FaultCode::IdNotUsed => FAULT_ID_NOT_USED,
            FaultCode::IdAlreadyExists => FAULT_ID_EXISTS,
            FaultCode::AddressInUse => FAULT_ADDRESS_IN_USE,
            FaultCode::NoMemberAvailable => FAULT_NO_MEMBER,
            FaultCode::DutyCycleReached => FAULT_DUTY_CYCLE_REACHED,
            FaultCode::BootloaderMethodNotSupported => FAULT_BOOTLOADER_NOT_SUPPORTED,
            FaultCode::BootloaderWrongFile => FAULT_BOOTLOADER_WRONG_FILE,
            FaultCode::BootloaderChecksum => FAULT_BOOTLOADER_CHECKSUM,
            FaultCode::BootloaderSyntax => FAULT_BOOTLOADER_SYNTAX,
            FaultCode::Other(code) => code,
        }
    }
}
