//! Chunked AES-256-GCM content streams.
//!
//! File contents are encrypted as an ordered sequence of independently
//! authenticated chunks so that arbitrarily large files can be processed
//! with bounded memory:
//!
//! ```text
//! [12-byte stream nonce]
//! [12-byte chunk nonce][GCM ciphertext of up to 32 KiB plaintext + 16-byte tag]
//! [12-byte chunk nonce][GCM ciphertext ...]
//! ...
//! ```
//!
//! Every chunk carries the stream nonce, its own index and a final-chunk
//! marker as associated data, which pins each chunk to its position within
//! its stream: chunks cannot be reordered, dropped from the middle, spliced
//! between streams, or cut off at the end without failing authentication.
//! An empty file still produces one (empty) chunk so that truncating a
//! stream to just its header is detectable.
//!
//! Plaintext may optionally be run through raw deflate before encryption.
//! A SHA-256 digest of the original plaintext is computed on the way in and
//! reported in the [`StreamSummary`] for storage alongside the metadata.

use std::io::{Read, Write};

use aes_gcm::{
    Aes256Gcm, Key, Nonce,
    aead::{Aead, KeyInit, Payload},
};
use flate2::Compression;
use ring::digest;
use ring::rand::{SecureRandom, SystemRandom};
use thiserror::Error;

use super::keys::AccountKey;

/// Plaintext bytes per chunk.
pub const CHUNK_SIZE: usize = 32 * 1024;

const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;

/// On-disk size of a full chunk.
const ENCRYPTED_CHUNK_LEN: usize = NONCE_LEN + CHUNK_SIZE + TAG_LEN;

/// Errors from stream encryption and decryption.
#[derive(Error, Debug)]
pub enum StreamError {
    #[error("stream I/O failed")]
    Io(#[from] std::io::Error),

    /// A chunk failed GCM authentication. Wrong key, bit rot, or a chunk
    /// moved from its original position.
    #[error("chunk {chunk} failed authentication")]
    AuthenticationFailed { chunk: u64 },

    /// A chunk is too short to contain a nonce and tag.
    #[error("chunk {chunk} is truncated ({len} bytes)")]
    TruncatedChunk { chunk: u64, len: usize },

    /// The stream ended before a complete stream nonce was read.
    #[error("stream is missing its header")]
    MissingHeader,

    /// Sealing a chunk failed unexpectedly.
    #[error("chunk encryption failed")]
    EncryptionFailed,

    /// The system RNG failed to produce a nonce.
    #[error("random generator failure")]
    Rng,
}

/// What an encryption pass learned about the plaintext it consumed.
#[derive(Debug, Clone)]
pub struct StreamSummary {
    /// Plaintext length in bytes (before compression).
    pub bytes: u64,
    /// Lowercase hex SHA-256 of the plaintext.
    pub digest: String,
    /// Whether deflate was applied before encryption.
    pub compressed: bool,
}

/// Encrypt a reader into a writer under the account content key.
///
/// When `compress` is set the plaintext is deflated before encryption; the
/// returned summary's byte count and digest always describe the original
/// plaintext, not the compressed form.
pub fn encrypt_stream<R: Read, W: Write>(
    key: &AccountKey,
    reader: R,
    mut writer: W,
    compress: bool,
) -> Result<StreamSummary, StreamError> {
    let rng = SystemRandom::new();
    let mut stream_nonce = [0u8; NONCE_LEN];
    rng.fill(&mut stream_nonce).map_err(|_| StreamError::Rng)?;
    writer.write_all(&stream_nonce)?;

    let mut digest_reader = DigestReader::new(reader);
    let summary = if compress {
        let deflated = flate2::read::DeflateEncoder::new(&mut digest_reader, Compression::default());
        encrypt_chunks(key, &stream_nonce, deflated, &mut writer)?;
        digest_reader.finish(true)
    } else {
        encrypt_chunks(key, &stream_nonce, &mut digest_reader, &mut writer)?;
        digest_reader.finish(false)
    };
    writer.flush()?;
    Ok(summary)
}

fn encrypt_chunks<R: Read, W: Write>(
    key: &AccountKey,
    stream_nonce: &[u8; NONCE_LEN],
    mut reader: R,
    writer: &mut W,
) -> Result<(), StreamError> {
    let rng = SystemRandom::new();
    let mut current = vec![0u8; CHUNK_SIZE];
    let mut next = vec![0u8; CHUNK_SIZE];
    let mut chunk_index: u64 = 0;

    // One chunk of lookahead: a chunk is only sealed once it is known
    // whether more plaintext follows, so the final chunk (including the
    // empty chunk 0 of an empty file) carries the terminal marker.
    let mut current_len = read_full(&mut reader, &mut current)?;
    loop {
        let next_len = if current_len < CHUNK_SIZE {
            0
        } else {
            read_full(&mut reader, &mut next)?
        };
        let last = next_len == 0;

        let mut chunk_nonce = [0u8; NONCE_LEN];
        rng.fill(&mut chunk_nonce).map_err(|_| StreamError::Rng)?;

        let aad = chunk_aad(stream_nonce, chunk_index, last);
        let ciphertext = key.with_content_key(|k| {
            let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(k));
            cipher
                .encrypt(
                    Nonce::from_slice(&chunk_nonce),
                    Payload { msg: &current[..current_len], aad: &aad },
                )
                .map_err(|_| StreamError::EncryptionFailed)
        })?;

        writer.write_all(&chunk_nonce)?;
        writer.write_all(&ciphertext)?;
        chunk_index += 1;

        if last {
            break;
        }
        std::mem::swap(&mut current, &mut next);
        current_len = next_len;
    }
    Ok(())
}

/// Decrypt a stream into a writer, returning the plaintext byte count.
///
/// `compressed` must match the flag recorded at upload time; it selects
/// whether the decrypted bytes are inflated before reaching the writer.
pub fn decrypt_stream<R: Read, W: Write>(
    key: &AccountKey,
    mut reader: R,
    writer: W,
    compressed: bool,
) -> Result<u64, StreamError> {
    let mut stream_nonce = [0u8; NONCE_LEN];
    if read_full(&mut reader, &mut stream_nonce)? != NONCE_LEN {
        return Err(StreamError::MissingHeader);
    }

    let mut counter = CountingWriter::new(writer);
    if compressed {
        let mut inflater = flate2::write::DeflateDecoder::new(&mut counter);
        decrypt_chunks(key, &stream_nonce, reader, &mut inflater)?;
        inflater.finish()?;
    } else {
        decrypt_chunks(key, &stream_nonce, reader, &mut counter)?;
    }
    counter.inner.flush()?;
    Ok(counter.written)
}

fn decrypt_chunks<R: Read, W: Write>(
    key: &AccountKey,
    stream_nonce: &[u8; NONCE_LEN],
    mut reader: R,
    writer: &mut W,
) -> Result<(), StreamError> {
    let mut current = vec![0u8; ENCRYPTED_CHUNK_LEN];
    let mut next = vec![0u8; ENCRYPTED_CHUNK_LEN];
    let mut chunk_index: u64 = 0;

    let mut current_len = read_full(&mut reader, &mut current)?;
    if current_len == 0 {
        // A valid stream carries at least the empty chunk 0.
        return Err(StreamError::TruncatedChunk { chunk: 0, len: 0 });
    }
    loop {
        if current_len < NONCE_LEN + TAG_LEN {
            return Err(StreamError::TruncatedChunk { chunk: chunk_index, len: current_len });
        }
        // Mirrors the encrypt-side lookahead: whether the stream ends here
        // decides the expected terminal marker. A stream cut off at a chunk
        // boundary claims an inner chunk as final and fails its tag.
        let next_len = if current_len < ENCRYPTED_CHUNK_LEN {
            0
        } else {
            read_full(&mut reader, &mut next)?
        };
        let last = next_len == 0;

        let (chunk_nonce, ciphertext) = current[..current_len].split_at(NONCE_LEN);
        let aad = chunk_aad(stream_nonce, chunk_index, last);
        let plaintext = key.with_content_key(|k| {
            let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(k));
            cipher
                .decrypt(
                    Nonce::from_slice(chunk_nonce),
                    Payload { msg: ciphertext, aad: &aad },
                )
                .map_err(|_| StreamError::AuthenticationFailed { chunk: chunk_index })
        })?;

        writer.write_all(&plaintext)?;
        chunk_index += 1;

        if last {
            break;
        }
        std::mem::swap(&mut current, &mut next);
        current_len = next_len;
    }
    Ok(())
}

fn chunk_aad(
    stream_nonce: &[u8; NONCE_LEN],
    chunk_index: u64,
    last: bool,
) -> [u8; NONCE_LEN + 9] {
    let mut aad = [0u8; NONCE_LEN + 9];
    aad[..NONCE_LEN].copy_from_slice(stream_nonce);
    aad[NONCE_LEN..NONCE_LEN + 8].copy_from_slice(&chunk_index.to_be_bytes());
    aad[NONCE_LEN + 8] = u8::from(last);
    aad
}

/// Read until the buffer is full or the reader is exhausted.
fn read_full<R: Read>(reader: &mut R, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

/// Tee that hashes and counts everything read through it.
struct DigestReader<R> {
    inner: R,
    ctx: digest::Context,
    bytes: u64,
}

impl<R: Read> DigestReader<R> {
    fn new(inner: R) -> Self {
        DigestReader {
            inner,
            ctx: digest::Context::new(&digest::SHA256),
            bytes: 0,
        }
    }

    fn finish(self, compressed: bool) -> StreamSummary {
        StreamSummary {
            bytes: self.bytes,
            digest: hex::encode(self.ctx.finish().as_ref()),
            compressed,
        }
    }
}

impl<R: Read> Read for DigestReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.ctx.update(&buf[..n]);
        self.bytes += n as u64;
        Ok(n)
    }
}

struct CountingWriter<W> {
    inner: W,
    written: u64,
}

impl<W: Write> CountingWriter<W> {
    fn new(inner: W) -> Self {
        CountingWriter { inner, written: 0 }
    }
}

impl<W: Write> Write for CountingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.written += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.inner.flush()
    }
}
