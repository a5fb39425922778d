//! Split outgoing text and attachments into provider-sized parts.
//!
//! Lengths are measured in the unit the provider bills in ([`LengthUnit`]), splits
//! only happen on grapheme cluster boundaries, and no character is ever dropped:
//! concatenating the text of the parts gives back the input.

use crate::msg::Attachment;
use unicode_segmentation::UnicodeSegmentation;

/// How far back from the end of a window a whitespace cut may sit.
const MAX_WHITESPACE_BACKOFF: usize = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LengthUnit {
    /// Unicode scalar values.
    Chars,
    /// UTF-8 bytes.
    Bytes,
}

impl LengthUnit {
    pub fn measure(self, s: &str) -> usize {
        match self {
            Self::Chars => s.chars().count(),
            Self::Bytes => s.len(),
        }
    }
}

/// How attachments are carried by the parts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttachmentPolicy {
    /// Attachment URLs are appended to the text, one per line, before splitting.
    InlineUrls,
    /// All attachments ride on the first part.
    FirstPart,
    /// Each attachment becomes its own part with no text, after the text parts.
    OwnParts,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Part {
    pub text: String,
    pub attachments: Vec<Attachment>,
}

impl Part {
    fn text(text: String) -> Self {
        Self {
            text,
            attachments: Vec::new(),
        }
    }
}

/// Text followed by attachment URLs, newline separated.
pub fn text_and_attachment_urls(text: &str, attachments: &[Attachment]) -> String {
    let mut out = text.to_string();
    for a in attachments {
        if !out.is_empty() {
            out.push('\n');
        }
        out.push_str(&a.url);
    }
    out
}

/// Split a message into ordered parts whose text fits `max_len` units. `max_len == 0` disables splitting.
pub fn split(
    text: &str,
    attachments: &[Attachment],
    max_len: usize,
    unit: LengthUnit,
    policy: AttachmentPolicy,
) -> Vec<Part> {
    match policy {
        AttachmentPolicy::InlineUrls => {
            let combined = text_and_attachment_urls(text, attachments);
            split_text(&combined, max_len, unit)
                .into_iter()
                .map(Part::text)
                .collect()
        }
        AttachmentPolicy::FirstPart => {
            let mut parts: Vec<Part> = split_text(text, max_len, unit)
                .into_iter()
                .map(Part::text)
                .collect();
            if !attachments.is_empty() {
                match parts.first_mut() {
                    Some(first) => first.attachments = attachments.to_vec(),
                    None => parts.push(Part {
                        text: String::new(),
                        attachments: attachments.to_vec(),
                    }),
                }
            }
            parts
        }
        AttachmentPolicy::OwnParts => {
            let mut parts: Vec<Part> = split_text(text, max_len, unit)
                .into_iter()
                .map(Part::text)
                .collect();
            parts.extend(attachments.iter().map(|a| Part {
                text: String::new(),
                attachments: vec![a.clone()],
            }));
            parts
        }
    }
}

/// Split text into chunks of at most `max_len` units.
/// Prefers to cut right after whitespace, but only when it sits in the last
/// few units of the window; otherwise the window is filled.
pub fn split_text(text: &str, max_len: usize, unit: LengthUnit) -> Vec<String> {
    if text.is_empty() {
        return Vec::new();
    }
    if max_len == 0 || unit.measure(text) <= max_len {
        return vec![text.to_string()];
    }

    let mut parts = Vec::new();
    let mut remaining = text;
    while !remaining.is_empty() {
        if unit.measure(remaining) <= max_len {
            parts.push(remaining.to_string());
            break;
        }

        let mut used = 0;
        let mut fit = 0;
        let mut after_space = None;
        for (idx, g) in remaining.grapheme_indices(true) {
            let len = unit.measure(g);
            if used + len > max_len {
                break;
            }
            used += len;
            fit = idx + g.len();
            if g.chars().all(char::is_whitespace) {
                after_space = Some((fit, used));
            }
        }
        let after_space = after_space
            .filter(|&(_, at)| used - at <= MAX_WHITESPACE_BACKOFF)
            .map(|(offset, _)| offset);

        // a single grapheme wider than the limit still has to go somewhere
        let split_at = if fit == 0 {
            remaining
                .graphemes(true)
                .next()
                .map(str::len)
                .unwrap_or(remaining.len())
        } else {
            after_space.unwrap_or(fit)
        };

        let (head, tail) = remaining.split_at(split_at);
        parts.push(head.to_string());
        remaining = tail;
    }
    parts
}
