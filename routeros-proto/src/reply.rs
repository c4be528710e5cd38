use std::fmt::{self, Display, Formatter};

use hashbrown::HashMap;

use crate::error::ParseError;
use crate::sentence::{Sentence, Word};

const TAG_PREFIX: &str = ".tag=";

/// The kind of a reply sentence, derived from its first word.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReplyType {
    /// `!done`: the command completed.
    Done,
    /// `!re`: one (partial or streamed) result of the command.
    Reply,
    /// `!trap`: the command failed.
    Trap,
    /// `!fatal`: the device is closing the session.
    Fatal,
    /// Anything else, including a first word that is not a reply marker.
    Unknown,
}

impl ReplyType {
    /// Terminal replies end the exchange for their tag.
    pub fn is_terminal(self) -> bool {
        matches!(self, ReplyType::Done | ReplyType::Trap | ReplyType::Fatal)
    }
}

impl From<&[u8]> for ReplyType {
    fn from(word: &[u8]) -> Self {
        match word {
            b"!done" => ReplyType::Done,
            b"!re" => ReplyType::Reply,
            b"!trap" => ReplyType::Trap,
            b"!fatal" => ReplyType::Fatal,
            _ => ReplyType::Unknown,
        }
    }
}

impl Display for ReplyType {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            ReplyType::Done => write!(f, "!done"),
            ReplyType::Reply => write!(f, "!re"),
            ReplyType::Trap => write!(f, "!trap"),
            ReplyType::Fatal => write!(f, "!fatal"),
            ReplyType::Unknown => write!(f, "unknown"),
        }
    }
}

/// A classified reply sentence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedReply {
    /// Kind of the reply.
    pub reply_type: ReplyType,
    /// Value of the `.tag=` word, if the sentence has one.
    pub tag: Option<String>,
    /// `key=value` words. The first occurrence of a key wins.
    pub attributes: HashMap<String, String>,
    /// Words that are neither the marker, the tag nor an attribute, such as a `!fatal` reason.
    pub words: Vec<String>,
}

impl ParsedReply {
    /// Value of attribute `key`.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(String::as_str)
    }

    /// The tag, as a string slice.
    pub fn tag(&self) -> Option<&str> {
        self.tag.as_deref()
    }

    /// See [`ReplyType::is_terminal`].
    pub fn is_terminal(&self) -> bool {
        self.reply_type.is_terminal()
    }

    /// Human readable error text: the `message` attribute of a `!trap`, or the reason word of a `!fatal`.
    pub fn message(&self) -> Option<&str> {
        self.get("message")
            .or_else(|| self.words.first().map(String::as_str))
    }
}

impl Display for ParsedReply {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {{ tag: {:?}, attributes: {:?} }}",
            self.reply_type, self.tag, self.attributes
        )
    }
}

impl TryFrom<&Sentence> for ParsedReply {
    type Error = ParseError;

    fn try_from(sentence: &Sentence) -> Result<Self, Self::Error> {
        parse_sentence(sentence.words())
    }
}

/// Classifies a decoded sentence.
///
/// The first word sets the [`ReplyType`]. Among the remaining words a `.tag=` word sets the
/// tag, a word containing `=` becomes an attribute (a leading `=` is dropped, then the first
/// `=` splits key from value) and anything else is kept in [`ParsedReply::words`].
///
/// Words are decoded lossily: RouterOS does not guarantee UTF-8.
///
/// # Errors
///
/// Returns [`ParseError::Empty`] for a sentence without words.
///
/// # Examples
///
/// ```
/// use routeros_proto::reply::{parse_sentence, ReplyType};
///
/// let reply = parse_sentence(&[b"!done".to_vec(), b".tag=x".to_vec(), b"=ret=abc123".to_vec()]).unwrap();
/// assert_eq!(reply.reply_type, ReplyType::Done);
/// assert_eq!(reply.tag(), Some("x"));
/// assert_eq!(reply.get("ret"), Some("abc123"));
/// ```
pub fn parse_sentence(words: &[Word]) -> Result<ParsedReply, ParseError> {
    let (first, rest) = words.split_first().ok_or(ParseError::Empty)?;

    let mut reply = ParsedReply {
        reply_type: ReplyType::from(first.as_slice()),
        tag: None,
        attributes: HashMap::new(),
        words: Vec::new(),
    };

    for word in rest {
        let word = String::from_utf8_lossy(word);

        if let Some(tag) = word.strip_prefix(TAG_PREFIX) {
            reply.tag.get_or_insert_with(|| tag.to_string());
            continue;
        }

        let body = word.strip_prefix('=').unwrap_or(&word[..]);
        match body.split_once('=') {
            Some((key, value)) if !key.is_empty() => {
                reply
                    .attributes
                    .entry(key.to_string())
                    .or_insert_with(|| value.to_string());
            }
            _ => reply.words.push(word.to_string()),
        }
    }

    Ok(reply)
}
