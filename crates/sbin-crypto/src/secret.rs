//! Plaintext secret: a message plus ordered attachments.

use zeroize::{Zeroize, ZeroizeOnDrop};

/// A file attached to a secret. Attachments are positional, not keyed.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct Attachment {
    pub filename: String,
    pub mime_type: String,
    pub content: Vec<u8>,
}

impl Attachment {
    pub fn new(
        filename: impl Into<String>,
        mime_type: impl Into<String>,
        content: impl Into<Vec<u8>>,
    ) -> Self {
        Self {
            filename: filename.into(),
            mime_type: mime_type.into(),
            content: content.into(),
        }
    }
}

impl std::fmt::Debug for Attachment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Attachment")
            .field("filename", &self.filename)
            .field("mime_type", &self.mime_type)
            .field("content_len", &self.content.len())
            .finish()
    }
}

/// The plaintext that gets sealed into an envelope.
///
/// Zeroized on drop; `Debug` prints sizes only.
#[derive(Clone, Default, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct Secret {
    pub message: String,
    pub attachments: Vec<Attachment>,
}

impl Secret {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            attachments: Vec::new(),
        }
    }

    /// Append an attachment, keeping insertion order.
    pub fn add_attachment(
        &mut self,
        filename: impl Into<String>,
        mime_type: impl Into<String>,
        content: impl Into<Vec<u8>>,
    ) {
        self.attachments
            .push(Attachment::new(filename, mime_type, content));
    }

    pub fn with_attachment(mut self, attachment: Attachment) -> Self {
        self.attachments.push(attachment);
        self
    }

    /// Sum of attachment content sizes.
    pub fn attachment_bytes(&self) -> usize {
        self.attachments.iter().map(|a| a.content.len()).sum()
    }
}

impl std::fmt::Debug for Secret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Secret")
            .field("message_len", &self.message.len())
            .field("attachments", &self.attachments)
            .finish()
    }
}
