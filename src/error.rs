use std::{borrow::Cow, fmt::Display};

/// The error type of the crate.
#[derive(Debug)]
pub enum Error {
    /// Invalid 7z signature found in file header.
    BadSignature([u8; 6]),
    /// Unsupported 7z format version.
    UnsupportedVersion {
        /// Major version number.
        major: u8,
        /// Minor version number.
        minor: u8,
    },
    /// Checksum verification failed during decompression.
    ChecksumVerificationFailed,
    /// Next header CRC mismatch.
    NextHeaderCrcMismatch,
    /// IO error with optional context message.
    Io(std::io::Error, Cow<'static, str>),
    /// Error opening file.
    FileOpen(std::io::Error, String),
    /// Other error with description.
    Other(Cow<'static, str>),
    /// Bad terminated streams info.
    BadTerminatedStreamsInfo(u8),
    /// Bad terminated unpack info.
    BadTerminatedUnpackInfo,
    /// Bad terminated pack info.
    BadTerminatedPackInfo(u8),
    /// Bad terminated sub streams info.
    BadTerminatedSubStreamsInfo,
    /// Bad terminated header.
    BadTerminatedHeader(u8),
    /// External compression method not supported.
    ExternalUnsupported,
    /// Unsupported compression method.
    UnsupportedCompressionMethod(String),
    /// Password required for encrypted archive.
    PasswordRequired,
    /// Feature or operation not supported.
    Unsupported(Cow<'static, str>),
    /// Possibly bad password for encrypted content.
    MaybeBadPassword(std::io::Error),
    /// File not found.
    FileNotFound,
    /// A folder's coder graph is not one of the recognised pipeline shapes,
    /// or names a method ID outside the closed registry.
    UnsupportedTopology(Cow<'static, str>),
    /// Internal consistency failure during folder decode: a size mismatch,
    /// an alignment violation, or a coder that terminated before consuming
    /// or producing the expected number of bytes.
    DataError(Cow<'static, str>),
    /// CRC-32 verification of a folder's plaintext failed.
    ChecksumError,
    /// A configured memory limit was exceeded, or an allocation failed.
    OutOfMemory {
        /// Maximum allowed memory in KB.
        max_kb: usize,
        /// Actual required memory in KB.
        actual_kb: usize,
    },
    /// The decryption key was wrong: either no password was supplied where
    /// one is required, or every padding-tolerance retry failed.
    WrongPassword,
    /// A streaming decode operation was invoked while the state machine was
    /// in the wrong phase (e.g. `begin` called while already `Active`).
    InvalidState(Cow<'static, str>),
}

impl From<std::io::Error> for Error {
    fn from(value: std::io::Error) -> Self {
        Self::io(value)
    }
}

impl Error {
    #[inline]
    pub(crate) fn other<S: Into<Cow<'static, str>>>(s: S) -> Self {
        Self::Other(s.into())
    }

    #[inline]
    pub(crate) fn unsupported<S: Into<Cow<'static, str>>>(s: S) -> Self {
        Self::Unsupported(s.into())
    }

    #[inline]
    pub(crate) fn io(e: std::io::Error) -> Self {
        Self::io_msg(e, "")
    }

    #[inline]
    pub(crate) fn io_msg(e: std::io::Error, msg: impl Into<Cow<'static, str>>) -> Self {
        Self::Io(e, msg.into())
    }

    pub(crate) fn bad_password(e: std::io::Error, encryped: bool) -> Self {
        if encryped {
            Self::MaybeBadPassword(e)
        } else {
            Self::io(e)
        }
    }

    #[cfg(not(target_arch = "wasm32"))]
    #[inline]
    pub(crate) fn file_open(e: std::io::Error, filename: impl Into<Cow<'static, str>>) -> Self {
        Self::Io(e, filename.into())
    }

    pub(crate) fn maybe_bad_password(self, encryped: bool) -> Self {
        if !encryped {
            return self;
        }
        match self {
            Self::Io(e, s) if s.is_empty() => Self::MaybeBadPassword(e),
            _ => self,
        }
    }

    pub(crate) fn unsupported_topology<S: Into<Cow<'static, str>>>(s: S) -> Self {
        Self::UnsupportedTopology(s.into())
    }

    pub(crate) fn data<S: Into<Cow<'static, str>>>(s: S) -> Self {
        Self::DataError(s.into())
    }

    pub(crate) fn invalid_state<S: Into<Cow<'static, str>>>(s: S) -> Self {
        Self::InvalidState(s.into())
    }

    pub(crate) fn out_of_memory(max_kb: usize, actual_kb: usize) -> Self {
        Self::OutOfMemory { max_kb, actual_kb }
    }

    /// Maps an error that occurred while decoding the downstream coder of an
    /// AES-protected stage to `WrongPassword`, unless it is one of the kinds
    /// that are attributable to something other than the key.
    pub(crate) fn into_wrong_password_unless_attributable(self) -> Self {
        if self.is_unexpected_eof() {
            return self;
        }
        match &self {
            Self::Unsupported(_) | Self::UnsupportedTopology(_) | Self::OutOfMemory { .. } => self,
            _ => Self::WrongPassword,
        }
    }

    pub(crate) fn is_unexpected_eof(&self) -> bool {
        matches!(
            self,
            Self::Io(e, _) | Self::MaybeBadPassword(e)
                if e.kind() == std::io::ErrorKind::UnexpectedEof
        )
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Debug::fmt(&self, f)
    }
}

impl std::error::Error for Error {}
