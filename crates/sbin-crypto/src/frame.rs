//! Plaintext framing of a [`Secret`] before encryption.
//!
//! Frame format (binary, all lengths u32 little-endian):
//! ```text
//! [4: message_len][message UTF-8]
//! [4: attachment_count]
//! attachment_count × (
//!     [4: filename_len][filename UTF-8]
//!     [4: mime_len][mime UTF-8]
//!     [4: content_len][content]
//! )
//! ```
//!
//! The frame is only ever stored encrypted, so it carries no magic or version
//! of its own; the envelope header versions it.

use zeroize::Zeroizing;

use crate::error::{CryptoError, CryptoResult};
use crate::secret::{Attachment, Secret};
use crate::wire::Reader;

const LEN_SIZE: usize = 4;

/// Smallest possible encoded attachment: three empty length-prefixed fields.
const MIN_ATTACHMENT_SIZE: usize = 3 * LEN_SIZE;

/// Number of bytes `encode_frame` will produce for `secret`.
///
/// Saturates instead of overflowing so oversized input is still caught by
/// the size limit.
pub fn encoded_len(secret: &Secret) -> usize {
    let attachments = secret.attachments.iter().fold(0usize, |acc, a| {
        acc.saturating_add(MIN_ATTACHMENT_SIZE)
            .saturating_add(a.filename.len())
            .saturating_add(a.mime_type.len())
            .saturating_add(a.content.len())
    });
    (2 * LEN_SIZE)
        .saturating_add(secret.message.len())
        .saturating_add(attachments)
}

/// Serialize a secret into its frame.
pub fn encode_frame(secret: &Secret) -> CryptoResult<Zeroizing<Vec<u8>>> {
    let mut out = Zeroizing::new(Vec::with_capacity(encoded_len(secret)));

    put_field(&mut out, secret.message.as_bytes())?;
    put_len(&mut out, secret.attachments.len())?;
    for attachment in &secret.attachments {
        put_field(&mut out, attachment.filename.as_bytes())?;
        put_field(&mut out, attachment.mime_type.as_bytes())?;
        put_field(&mut out, &attachment.content)?;
    }

    Ok(out)
}

/// Parse a frame back into a secret.
///
/// Every declared length is checked against the bytes that remain, so
/// crafted input can neither read past the buffer nor force a large
/// allocation.
pub fn decode_frame(frame: &[u8]) -> CryptoResult<Secret> {
    let mut r = Reader::new(frame);

    let message = utf8_field(&mut r, "message")?;

    let count = r
        .u32_le()
        .ok_or_else(|| malformed("truncated attachment count"))? as usize;
    if count > r.remaining() / MIN_ATTACHMENT_SIZE {
        return Err(malformed(format!(
            "attachment count {count} exceeds remaining {} bytes",
            r.remaining()
        )));
    }

    let mut attachments = Vec::with_capacity(count);
    for _ in 0..count {
        let filename = utf8_field(&mut r, "attachment filename")?;
        let mime_type = utf8_field(&mut r, "attachment mime type")?;
        let content = field(&mut r, "attachment content")?.to_vec();
        attachments.push(Attachment {
            filename,
            mime_type,
            content,
        });
    }

    if !r.is_empty() {
        return Err(malformed(format!(
            "{} trailing bytes after last attachment",
            r.remaining()
        )));
    }

    Ok(Secret {
        message,
        attachments,
    })
}

fn put_len(out: &mut Vec<u8>, len: usize) -> CryptoResult<()> {
    let len = u32::try_from(len).map_err(|_| CryptoError::SizeLimitExceeded {
        size: len,
        max: u32::MAX as usize,
    })?;
    out.extend_from_slice(&len.to_le_bytes());
    Ok(())
}

fn put_field(out: &mut Vec<u8>, bytes: &[u8]) -> CryptoResult<()> {
    put_len(out, bytes.len())?;
    out.extend_from_slice(bytes);
    Ok(())
}

fn field<'a>(r: &mut Reader<'a>, what: &str) -> CryptoResult<&'a [u8]> {
    let len = r
        .u32_le()
        .ok_or_else(|| malformed(format!("truncated {what} length")))? as usize;
    r.take(len).ok_or_else(|| {
        malformed(format!(
            "{what} length {len} exceeds remaining {} bytes",
            r.remaining()
        ))
    })
}

fn utf8_field(r: &mut Reader<'_>, what: &str) -> CryptoResult<String> {
    let bytes = field(r, what)?;
    String::from_utf8(bytes.to_vec()).map_err(|_| malformed(format!("{what} is not UTF-8")))
}

fn malformed(msg: impl Into<String>) -> CryptoError {
    CryptoError::MalformedEnvelope(msg.into())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Secret {
        let mut secret = Secret::new("Hello, world!");
        secret.add_attachment("README.md", "text/markdown", b"# readme\n".to_vec());
        secret.add_attachment("empty.bin", "", Vec::new());
        secret
    }

    #[test]
    fn test_frame_layout() {
        let secret = Secret::new("hi").with_attachment(Attachment::new("a", "t/p", b"xyz".to_vec()));
        let frame = encode_frame(&secret).unwrap();

        let expected: Vec<u8> = [
            &2u32.to_le_bytes()[..],
            b"hi",
            &1u32.to_le_bytes(),
            &1u32.to_le_bytes(),
            b"a",
            &3u32.to_le_bytes(),
            b"t/p",
            &3u32.to_le_bytes(),
            b"xyz",
        ]
        .concat();
        assert_eq!(frame.as_slice(), expected.as_slice());
    }

    #[test]
    fn test_encoded_len_matches_encoding() {
        let secret = sample();
        assert_eq!(encoded_len(&secret), encode_frame(&secret).unwrap().len());
        assert_eq!(encoded_len(&Secret::default()), 8);
    }

    #[test]
    fn test_roundtrip_with_empty_attachment() {
        let secret = sample();
        let decoded = decode_frame(&encode_frame(&secret).unwrap()).unwrap();
        assert_eq!(decoded, secret);
        assert!(decoded.attachments[1].content.is_empty());
    }

    #[test]
    fn test_length_exceeding_buffer_is_malformed() {
        let mut frame = encode_frame(&sample()).unwrap().to_vec();
        // claim a message far longer than the buffer
        frame[..4].copy_from_slice(&u32::MAX.to_le_bytes());
        assert!(matches!(
            decode_frame(&frame),
            Err(CryptoError::MalformedEnvelope(_))
        ));
    }

    #[test]
    fn test_inflated_attachment_count_is_malformed() {
        let mut frame = Vec::new();
        frame.extend_from_slice(&0u32.to_le_bytes());
        frame.extend_from_slice(&1_000_000u32.to_le_bytes());
        frame.extend_from_slice(&[0u8; 12]);

        let err = decode_frame(&frame).unwrap_err();
        assert!(err.to_string().contains("attachment count"));
    }

    #[test]
    fn test_truncated_frame_is_malformed() {
        let frame = encode_frame(&sample()).unwrap();
        for cut in 0..frame.len() {
            assert!(
                matches!(
                    decode_frame(&frame[..cut]),
                    Err(CryptoError::MalformedEnvelope(_))
                ),
                "prefix of {cut} bytes must not decode"
            );
        }
    }

    #[test]
    fn test_trailing_bytes_are_malformed() {
        let mut frame = encode_frame(&sample()).unwrap().to_vec();
        frame.push(0);
        assert!(decode_frame(&frame).is_err());
    }

    #[test]
    fn test_invalid_utf8_filename() {
        let mut frame = Vec::new();
        frame.extend_from_slice(&0u32.to_le_bytes());
        frame.extend_from_slice(&1u32.to_le_bytes());
        frame.extend_from_slice(&2u32.to_le_bytes());
        frame.extend_from_slice(&[0xFF, 0xFE]);
        frame.extend_from_slice(&0u32.to_le_bytes());
        frame.extend_from_slice(&0u32.to_le_bytes());

        let err = decode_frame(&frame).unwrap_err();
        assert!(err.to_string().contains("filename is not UTF-8"));
    }
}
