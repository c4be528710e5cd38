use std::fmt::{self, Display, Formatter, Write};

use crate::codec::{write_length, write_word};
use crate::error::PackError;

/// A single protocol word, as raw bytes.
///
/// The codec is agnostic to what a word means (`/path`, `!done`, `=key=value`, `.tag=x`, ...).
pub type Word = Vec<u8>;

/// A decoded sentence: the ordered, non-terminated list of its words.
///
/// Reply markers such as `!done` are ordinary words at this layer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Sentence {
    words: Vec<Word>,
}

impl Sentence {
    /// Creates a sentence from its words.
    pub fn new(words: Vec<Word>) -> Self {
        Self { words }
    }

    /// Words of the sentence, in wire order.
    pub fn words(&self) -> &[Word] {
        &self.words
    }

    /// Consumes the sentence, returning its words.
    pub fn into_words(self) -> Vec<Word> {
        self.words
    }

    /// Number of words in the sentence.
    pub fn len(&self) -> usize {
        self.words.len()
    }

    /// `true` if the sentence has no words.
    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }
}

impl<W: Into<Word>> FromIterator<W> for Sentence {
    fn from_iter<T: IntoIterator<Item = W>>(iter: T) -> Self {
        Self::new(iter.into_iter().map(Into::into).collect())
    }
}

impl Display for Sentence {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        for (i, word) in self.words.iter().enumerate() {
            if i > 0 {
                f.write_char(' ')?;
            }
            for byte in word {
                if byte.is_ascii() && !byte.is_ascii_control() {
                    f.write_char(*byte as char)?
                } else {
                    write!(f, "\\x{byte:02x}")?
                }
            }
        }
        Ok(())
    }
}

/// Serialises `words` into a transmittable sentence.
///
/// Each word is framed with its length prefix and the sentence is closed with the
/// zero-length terminator word.
///
/// # Errors
///
/// - [`PackError::Empty`] if `words` is empty: the leading command word is mandatory.
/// - [`PackError::EmptyWord`] if a word is empty, since it would read as the terminator.
/// - [`PackError::Word`] if a word is too long to be framed.
///
/// # Examples
///
/// ```
/// use routeros_proto::sentence::pack;
///
/// let data = pack(["/login", ".tag=initial_login"]).unwrap();
/// assert_eq!(data[0], 6);
/// assert_eq!(data.last(), Some(&0));
/// ```
pub fn pack<I, W>(words: I) -> Result<Vec<u8>, PackError>
where
    I: IntoIterator<Item = W>,
    W: AsRef<[u8]>,
{
    let mut buf = Vec::new();
    let mut count = 0;

    for (index, word) in words.into_iter().enumerate() {
        let word = word.as_ref();
        if word.is_empty() {
            return Err(PackError::EmptyWord(index));
        }
        write_word(&mut buf, word).map_err(|source| PackError::Word { index, source })?;
        count += 1;
    }

    if count == 0 {
        return Err(PackError::Empty);
    }

    // Terminate the sentence
    write_length(&mut buf, 0).map_err(|source| PackError::Word {
        index: count,
        source,
    })?;
    Ok(buf)
}
