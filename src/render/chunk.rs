//! Size-bounded splitting of reply text
//!
//! Lengths are counted in UTF-16 code units, the unit Telegram measures
//! messages in. Lines are packed greedily; a line that is too long on its own
//! is split at single spaces, dropping the boundary space. A lone word longer
//! than the limit is cut on a char boundary at the limit.

/// Length of `text` as the transport counts it
pub fn message_len(text: &str) -> usize {
    text.encode_utf16().count()
}

/// Split `text` into ordered chunks of at most `limit` units
pub fn split(text: &str, limit: usize) -> Vec<String> {
    let limit = limit.max(1);
    let mut chunks = Vec::new();
    let mut packer = Packer::new('\n', limit);

    for line in text.split('\n') {
        if packer.try_append(line) {
            continue;
        }
        packer.flush_into(&mut chunks);

        if message_len(line) <= limit {
            packer.start(line.to_string());
            continue;
        }

        let mut pieces = split_words(line, limit);
        let last = pieces.pop().unwrap_or_default();
        for piece in pieces {
            push_chunk(&mut chunks, piece);
        }
        packer.start(last);
    }

    packer.flush_into(&mut chunks);
    chunks
}

/// Split one line at spaces so that joining the pieces with " " restores it
fn split_words(line: &str, limit: usize) -> Vec<String> {
    let mut pieces = Vec::new();
    let mut packer = Packer::new(' ', limit);

    for word in line.split(' ') {
        if packer.try_append(word) {
            continue;
        }
        if let Some(piece) = packer.take() {
            pieces.push(piece);
        }

        if message_len(word) <= limit {
            packer.start(word.to_string());
        } else {
            let mut parts = hard_split(word, limit);
            let last = parts.pop().unwrap_or_default();
            pieces.extend(parts);
            packer.start(last);
        }
    }

    if let Some(piece) = packer.take() {
        pieces.push(piece);
    }
    pieces
}

/// Cut a word into pieces of at most `limit` units without splitting a char.
/// A char wider than the limit still gets a piece of its own.
fn hard_split(word: &str, limit: usize) -> Vec<String> {
    let mut parts = Vec::new();
    let mut part = String::new();
    let mut part_len = 0;

    for c in word.chars() {
        let width = c.len_utf16();
        if part_len + width > limit && !part.is_empty() {
            parts.push(std::mem::take(&mut part));
            part_len = 0;
        }
        part.push(c);
        part_len += width;
    }
    if !part.is_empty() {
        parts.push(part);
    }
    parts
}

fn push_chunk(chunks: &mut Vec<String>, chunk: String) {
    if !chunk.trim().is_empty() {
        chunks.push(chunk);
    }
}

/// Greedy accumulator joining segments with a one-char separator
struct Packer {
    separator: char,
    limit: usize,
    current: Option<(String, usize)>,
}

impl Packer {
    fn new(separator: char, limit: usize) -> Self {
        Self {
            separator,
            limit,
            current: None,
        }
    }

    /// Append if the result still fits; leaves the packer unchanged otherwise
    fn try_append(&mut self, segment: &str) -> bool {
        let segment_len = message_len(segment);
        if let Some((text, len)) = &mut self.current {
            if *len + 1 + segment_len > self.limit {
                return false;
            }
            text.push(self.separator);
            text.push_str(segment);
            *len += 1 + segment_len;
            return true;
        }
        if segment_len > self.limit {
            return false;
        }
        self.current = Some((segment.to_string(), segment_len));
        true
    }

    fn start(&mut self, segment: String) {
        let len = message_len(&segment);
        self.current = Some((segment, len));
    }

    fn take(&mut self) -> Option<String> {
        self.current.take().map(|(text, _)| text)
    }

    fn flush_into(&mut self, chunks: &mut Vec<String>) {
        if let Some(text) = self.take() {
            push_chunk(chunks, text);
        }
    }
}
