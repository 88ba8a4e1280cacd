//! Outgoing image filtering against vendor limits.
//!
//! Vendors reject whole requests over a single oversized image. Before
//! building a payload, adapters run the history through
//! [`sanitize_attachments`] with their [`ImageLimits`], forward the
//! filtered copy, and log the returned note.
//!
//! Removal passes run in a fixed order and each only sees images the
//! earlier passes kept: bytes, then dimension, then the stricter
//! many-image dimension cap, then the image-count cap (earliest images
//! go first).

use std::io::Cursor;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use image::ImageReader;
use tracing::debug;

use crate::chat::{ContentBlock, Message};

/// A stricter dimension cap that applies once a request carries many
/// images.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ManyImageLimit {
    /// The cap applies when more than this many images remain.
    pub threshold: usize,
    /// Maximum width or height, in pixels.
    pub max_dimension: u32,
}

/// One vendor's image limits. Every limit is optional.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ImageLimits {
    /// Maximum decoded size of one image.
    pub max_bytes: Option<usize>,
    /// Maximum width or height, in pixels.
    pub max_dimension: Option<u32>,
    /// Stricter dimension cap for image-heavy requests.
    pub many_image_limit: Option<ManyImageLimit>,
    /// Maximum number of images per request.
    pub max_images: Option<usize>,
    /// Prefix for the note, e.g. `"Anthropic"`.
    pub provider_label: String,
}

impl ImageLimits {
    fn measures_dimensions(&self) -> bool {
        self.max_dimension.is_some() || self.many_image_limit.is_some()
    }
}

/// Filtered messages plus a human-readable summary of what was removed.
#[derive(Debug, Clone, PartialEq)]
pub struct SanitizedAttachments {
    /// A filtered copy of the input.
    pub messages: Vec<Message>,
    /// `None` when nothing was removed.
    pub note: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Reason {
    Bytes,
    Dimension,
    Many,
    MaxImages,
}

#[derive(Debug)]
struct ImageEntry {
    message: usize,
    block: usize,
    bytes: usize,
    dimensions: Option<(u32, u32)>,
    removed: Option<Reason>,
}

impl ImageEntry {
    fn exceeds(&self, max: u32) -> bool {
        self.dimensions.is_some_and(|(w, h)| w.max(h) > max)
    }
}

/// Decoded size of a base64 payload, computed from its length.
fn decoded_len(data: &str) -> usize {
    let trimmed = data.trim_end_matches('=');
    let len = trimmed.bytes().filter(|b| !b.is_ascii_whitespace()).count();
    len * 3 / 4
}

fn measure(data: &str) -> Option<(u32, u32)> {
    let bytes = STANDARD.decode(data.trim()).ok()?;
    let reader = ImageReader::new(Cursor::new(bytes)).with_guessed_format().ok()?;
    reader.into_dimensions().ok()
}

/// Filters images in `messages` against `limits`.
///
/// The input is never mutated. Images whose dimensions cannot be measured
/// are kept unless they fail the byte check. A message that loses all of
/// its blocks is dropped.
pub fn sanitize_attachments(messages: &[Message], limits: &ImageLimits) -> SanitizedAttachments {
    let measure_dims = limits.measures_dimensions();
    let mut entries = Vec::new();
    for (mi, message) in messages.iter().enumerate() {
        for (bi, block) in message.content().iter().enumerate() {
            if let ContentBlock::Image(image) = block {
                let dimensions = if measure_dims {
                    let dims = measure(&image.data);
                    if dims.is_none() {
                        debug!(mime = %image.mime_type, "could not measure image dimensions");
                    }
                    dims
                } else {
                    None
                };
                entries.push(ImageEntry {
                    message: mi,
                    block: bi,
                    bytes: decoded_len(&image.data),
                    dimensions,
                    removed: None,
                });
            }
        }
    }

    if let Some(max) = limits.max_bytes {
        for entry in entries.iter_mut().filter(|e| e.bytes > max) {
            entry.removed = Some(Reason::Bytes);
        }
    }
    if let Some(max) = limits.max_dimension {
        for entry in entries.iter_mut().filter(|e| e.removed.is_none() && e.exceeds(max)) {
            entry.removed = Some(Reason::Dimension);
        }
    }
    if let Some(many) = limits.many_image_limit {
        let kept = entries.iter().filter(|e| e.removed.is_none()).count();
        if kept > many.threshold {
            for entry in entries
                .iter_mut()
                .filter(|e| e.removed.is_none() && e.exceeds(many.max_dimension))
            {
                entry.removed = Some(Reason::Many);
            }
        }
    }
    if let Some(max) = limits.max_images {
        let kept = entries.iter().filter(|e| e.removed.is_none()).count();
        let surplus = kept.saturating_sub(max);
        for entry in entries.iter_mut().filter(|e| e.removed.is_none()).take(surplus) {
            entry.removed = Some(Reason::MaxImages);
        }
    }

    let removed: Vec<&ImageEntry> = entries.iter().filter(|e| e.removed.is_some()).collect();
    if removed.is_empty() {
        return SanitizedAttachments {
            messages: messages.to_vec(),
            note: None,
        };
    }

    let mut out = Vec::with_capacity(messages.len());
    for (mi, message) in messages.iter().enumerate() {
        let drop: Vec<usize> = removed
            .iter()
            .filter(|e| e.message == mi)
            .map(|e| e.block)
            .collect();
        if drop.is_empty() {
            out.push(message.clone());
            continue;
        }
        let mut message = message.clone();
        let content = message.content_mut();
        let mut bi = 0;
        content.retain(|_| {
            let keep = !drop.contains(&bi);
            bi += 1;
            keep
        });
        if !content.is_empty() {
            out.push(message);
        }
    }

    SanitizedAttachments {
        messages: out,
        note: Some(build_note(&entries, limits)),
    }
}

fn plural(n: usize) -> String {
    if n == 1 {
        "1 image".to_owned()
    } else {
        format!("{n} images")
    }
}

fn build_note(entries: &[ImageEntry], limits: &ImageLimits) -> String {
    let count = |reason: Reason| entries.iter().filter(|e| e.removed == Some(reason)).count();
    let mut clauses = Vec::new();

    let n = count(Reason::Bytes);
    if n > 0 {
        clauses.push(format!("omitted {} over size limit", plural(n)));
    }
    let n = count(Reason::Dimension);
    if n > 0 {
        let max = limits.max_dimension.unwrap_or_default();
        clauses.push(format!("omitted {} over {max}px dimension limit", plural(n)));
    }
    let n = count(Reason::Many);
    if n > 0 {
        let (threshold, max) = limits
            .many_image_limit
            .map_or((0, 0), |m| (m.threshold, m.max_dimension));
        clauses.push(format!(
            "omitted {} over {max}px limit for requests with more than {threshold} images",
            plural(n)
        ));
    }
    let n = count(Reason::MaxImages);
    if n > 0 {
        let max = limits.max_images.unwrap_or_default();
        clauses.push(format!("omitted {} beyond the {max}-image limit", plural(n)));
    }

    format!("{}: {}", limits.provider_label, clauses.join("; "))
}
