use thiserror::Error;

/// A length could not be represented by the RouterOS length prefix.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EncodeError {
    /// The word is longer than the largest length a prefix can carry (`u32::MAX`).
    #[error("word length {0} does not fit in a 32-bit length prefix")]
    TooLong(usize),
}

/// Errors raised while reading a length prefix or a word from a byte buffer.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// The buffer ends before the prefix or the word it announces.
    ///
    /// This is not a failure of the stream: the caller has to wait for more bytes.
    #[error("need {needed} more byte(s)")]
    Incomplete {
        /// How many more bytes are required at minimum.
        needed: usize,
    },
    /// The first byte of the prefix uses the reserved `0xF8..=0xFF` control pattern.
    #[error("reserved length control byte {0:#04x}")]
    Reserved(u8),
}

/// The byte stream fed into an [`Unpacker`](crate::unpacker::Unpacker) is malformed.
///
/// The stream cannot be resynchronised; the connection it came from should be torn down.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum UnpackError {
    /// A word length prefix starts with a reserved control byte.
    #[error("malformed length prefix {byte:#04x} at offset {offset}")]
    Malformed {
        /// The offending prefix byte.
        byte: u8,
        /// Offset of the byte from the start of the unread buffer.
        offset: usize,
    },
}

/// A decoded sentence does not satisfy the reply structure.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// The sentence carries no words at all.
    #[error("empty sentence")]
    Empty,
}

/// A list of words could not be serialised into a sentence.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PackError {
    /// A sentence needs at least its leading command word.
    #[error("a sentence needs at least one word")]
    Empty,
    /// One of the words is too long to be framed.
    #[error("word {index}: {source}")]
    Word {
        /// Position of the word in the sentence.
        index: usize,
        /// Why the word could not be framed.
        source: EncodeError,
    },
    /// A zero-length word would terminate the sentence early.
    #[error("word {0} is empty")]
    EmptyWord(usize),
}

/// The login challenge sent by the device is unusable.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ChallengeError {
    /// The `ret` attribute is not valid hexadecimal.
    #[error("invalid challenge: {0}")]
    Hex(#[from] hex::FromHexError),
}

/// A command could not be built.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CommandError {
    /// The command path must start with `/`.
    #[error("command path {0:?} must start with '/'")]
    Path(String),
}

/// Every error the protocol core can surface to its driver.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProtocolError {
    /// See [`PackError`].
    #[error("pack error: {0}")]
    Pack(#[from] PackError),
    /// See [`UnpackError`].
    #[error("unpack error: {0}")]
    Unpack(#[from] UnpackError),
    /// See [`ParseError`].
    #[error("parse error: {0}")]
    Parse(#[from] ParseError),
    /// See [`ChallengeError`].
    #[error("challenge error: {0}")]
    Challenge(#[from] ChallengeError),
}
