// ============================================================
// Layer 4 — Sentence Preprocessor
// ============================================================
// Normalises one corpus line before tokenisation.
//
// Crawled parallel corpora (IWSLT, OPUS, ...) carry:
//   - Non-breaking / zero-width spaces and byte order marks
//   - HTML entities left over from subtitle extraction
//   - Tabs, stray control characters and runs of spaces
//
// Cleaning steps (applied in order):
//   1. Map Unicode whitespace variants and control chars to ' '
//   2. Decode the handful of HTML entities that show up in practice
//   3. Collapse runs of spaces and trim
//   4. Optionally lowercase (the word-level tokenizer is cased)
//
// Reference: Rust Book §8 (Strings in Rust)

const HTML_ENTITIES: [(&str, &str); 6] = [
    ("&amp;",  "&"),
    ("&quot;", "\""),
    ("&apos;", "'"),
    ("&#39;",  "'"),
    ("&lt;",   "<"),
    ("&gt;",   ">"),
];

pub struct Preprocessor {
    lowercase: bool,
}

impl Preprocessor {
    pub fn new() -> Self {
        Self { lowercase: false }
    }

    pub fn with_lowercase(mut self, lowercase: bool) -> Self {
        self.lowercase = lowercase;
        self
    }

    /// Clean a single sentence.
    pub fn clean(&self, text: &str) -> String {
        // ── Step 1: Normalise individual characters ───────────────────────────
        let mapped: String = text
            .chars()
            .map(|c| match c {
                '\t' | '\u{00A0}' | '\u{200B}' | '\u{FEFF}' => ' ',
                c if c.is_control() => ' ',
                c => c,
            })
            .collect();

        // ── Step 2: Decode HTML entities ──────────────────────────────────────
        let mut decoded = mapped;
        for (entity, plain) in HTML_ENTITIES {
            if decoded.contains(entity) {
                decoded = decoded.replace(entity, plain);
            }
        }

        // ── Step 3: Collapse whitespace ───────────────────────────────────────
        let collapsed = decoded.split_whitespace().collect::<Vec<_>>().join(" ");

        // ── Step 4: Case ──────────────────────────────────────────────────────
        if self.lowercase {
            collapsed.to_lowercase()
        } else {
            collapsed
        }
    }
}

impl Default for Preprocessor {
    fn default() -> Self {
        Self::new()
    }
}
