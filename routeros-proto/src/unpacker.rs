use tracing::trace;

use crate::codec::decode_word;
use crate::error::{DecodeError, UnpackError};
use crate::sentence::Sentence;

/// Unread bytes are compacted once at least this many have been consumed.
const COMPACT_THRESHOLD: usize = 4096;

/// Incremental sentence decoder for a byte stream.
///
/// Bytes are pushed in with [`feed`](Self::feed) as they arrive, in chunks of any size.
/// [`sentences`](Self::sentences) then yields every sentence that is complete so far.
/// A sentence that is only partially buffered is left untouched until more bytes arrive,
/// so feeding and draining can be interleaved indefinitely.
///
/// # Examples
///
/// ```
/// use routeros_proto::{sentence::pack, unpacker::Unpacker};
///
/// let data = pack(["!done", ".tag=1"]).unwrap();
/// let mut unpacker = Unpacker::new();
///
/// unpacker.feed(&data[..3]);
/// assert_eq!(unpacker.sentences().count(), 0);
///
/// unpacker.feed(&data[3..]);
/// let sentence = unpacker.sentences().next().unwrap().unwrap();
/// assert_eq!(sentence.words(), [b"!done".to_vec(), b".tag=1".to_vec()]);
/// ```
#[derive(Debug, Default)]
pub struct Unpacker {
    buf: Vec<u8>,
    /// Start of the first sentence not yet yielded.
    pos: usize,
}

impl Unpacker {
    /// Creates an empty unpacker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a chunk of received bytes. Never parses, never fails.
    pub fn feed(&mut self, chunk: &[u8]) {
        if self.pos == self.buf.len() {
            self.buf.clear();
            self.pos = 0;
        } else if self.pos >= COMPACT_THRESHOLD {
            self.buf.drain(..self.pos);
            self.pos = 0;
        }
        self.buf.extend_from_slice(chunk);
    }

    /// Number of buffered bytes that do not form a complete sentence yet.
    pub fn pending(&self) -> usize {
        self.buf.len() - self.pos
    }

    /// Drops every buffered byte.
    pub fn clear(&mut self) {
        self.buf.clear();
        self.pos = 0;
    }

    /// Returns an iterator over the complete sentences buffered so far.
    ///
    /// The iterator ends as soon as the buffer runs out mid-sentence. It can be created
    /// again after more bytes are fed to continue where the previous one stopped.
    pub fn sentences(&mut self) -> Sentences<'_> {
        Sentences { unpacker: self }
    }

    /// Decodes the next complete sentence, if any.
    ///
    /// On [`DecodeError::Incomplete`] the cursor is left at the start of the sentence.
    fn next_sentence(&mut self) -> Result<Option<Sentence>, UnpackError> {
        let mut cursor = self.pos;
        let mut words = Vec::new();

        loop {
            match decode_word(&self.buf[cursor..]) {
                Ok((word, consumed)) => {
                    cursor += consumed;
                    if word.is_empty() {
                        break;
                    }
                    words.push(word.to_vec());
                }
                Err(DecodeError::Incomplete { needed }) => {
                    trace!(pending = self.pending(), needed, "partial sentence buffered");
                    return Ok(None);
                }
                Err(DecodeError::Reserved(byte)) => {
                    return Err(UnpackError::Malformed {
                        byte,
                        offset: cursor - self.pos,
                    });
                }
            }
        }

        self.pos = cursor;
        Ok(Some(Sentence::new(words)))
    }
}

/// Draining iterator returned by [`Unpacker::sentences`].
#[derive(Debug)]
pub struct Sentences<'a> {
    unpacker: &'a mut Unpacker,
}

impl Iterator for Sentences<'_> {
    type Item = Result<Sentence, UnpackError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.unpacker.next_sentence().transpose()
    }
}
