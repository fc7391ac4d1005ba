//! Code Block Isolation
//!
//! Embedded code blocks (`<?php ... ?>`, `<?= ... ?>`, `<? ... ?>`) are swapped for
//! opaque placeholder tokens before markup-level transformations run, and swapped
//! back afterwards. A repair only restores the blocks currently set on the
//! isolator; tokens of any other block stay in the text untouched.

use uuid::Uuid;

use crate::error::ViewError;

const OPEN: &str = "<?";
const CLOSE: &str = "?>";

/// One code block lifted out of a template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedBlock {
    pub token: String,
    pub code: String,
}

/// A piece of template source: literal markup or a complete code block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Segment<'a> {
    Text(&'a str),
    Code(&'a str),
}

/// Split `source` into markup and code blocks.
///
/// String literals and `/* */` comments inside a block are honoured, so a `?>`
/// (or `<?`) inside them neither closes nor opens anything.
pub fn split(source: &str) -> Result<Vec<Segment<'_>>, ViewError> {
    let mut segments = vec![];
    let mut cursor = 0;

    while let Some(found) = source[cursor..].find(OPEN) {
        let start = cursor + found;
        let end = block_end(source, start)?;

        if start > cursor {
            segments.push(Segment::Text(&source[cursor..start]));
        }
        segments.push(Segment::Code(&source[start..end]));
        cursor = end;
    }

    if cursor < source.len() {
        segments.push(Segment::Text(&source[cursor..]));
    }

    Ok(segments)
}

/// Returns the byte offset just past the `?>` closing the block opened at `start`.
fn block_end(source: &str, start: usize) -> Result<usize, ViewError> {
    let bytes = source.as_bytes();
    let mut i = start + OPEN.len();

    while i < bytes.len() {
        match bytes[i] {
            b'?' if bytes.get(i + 1) == Some(&b'>') => return Ok(i + CLOSE.len()),
            quote @ (b'\'' | b'"') => {
                i = string_end(bytes, i, quote)
                    .ok_or_else(|| ViewError::malformed(start, "unterminated string literal in code block"))?;
            }
            b'/' if bytes.get(i + 1) == Some(&b'*') => {
                let close = source[i + 2..]
                    .find("*/")
                    .ok_or_else(|| ViewError::malformed(start, "unterminated comment in code block"))?;
                i += 2 + close + 2;
            }
            b'/' if bytes.get(i + 1) == Some(&b'/') => i = line_comment_end(source, i),
            b'#' => i = line_comment_end(source, i),
            _ => i += 1,
        }
    }

    Err(ViewError::malformed(start, "unterminated code block, missing `?>`"))
}

fn string_end(bytes: &[u8], open: usize, quote: u8) -> Option<usize> {
    let mut i = open + 1;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => i += 2,
            b if b == quote => return Some(i + 1),
            _ => i += 1,
        }
    }
    None
}

// Line comments stop at a newline or right before `?>`.
fn line_comment_end(source: &str, from: usize) -> usize {
    let rest = &source[from..];
    let newline = rest.find('\n').map(|n| n + 1);
    let close = rest.find(CLOSE);
    let len = match (newline, close) {
        (Some(n), Some(c)) => n.min(c),
        (Some(n), None) => n,
        (None, Some(c)) => c,
        (None, None) => rest.len(),
    };
    from + len
}

/// Swaps code blocks for placeholder tokens and back.
#[derive(Debug, Clone)]
pub struct Isolator {
    nonce: String,
    counter: usize,
    blocks: Vec<ExtractedBlock>,
}

impl Isolator {
    pub fn new() -> Self {
        Self::with_nonce(fresh_nonce())
    }

    pub fn with_nonce(nonce: impl Into<String>) -> Self {
        Self {
            nonce: nonce.into(),
            counter: 0,
            blocks: vec![],
        }
    }

    /// Replace every code block in `source` with a placeholder token.
    ///
    /// Extracted blocks are appended to the active set. On error nothing is kept.
    pub fn isolate(&mut self, source: &str) -> Result<String, ViewError> {
        let segments = split(source)?;

        while source.contains(&self.prefix()) {
            self.nonce = fresh_nonce();
        }

        let mut isolated = String::with_capacity(source.len());
        for segment in segments {
            match segment {
                Segment::Text(text) => isolated.push_str(text),
                Segment::Code(code) => {
                    let token = self.next_token();
                    isolated.push_str(&token);
                    self.blocks.push(ExtractedBlock {
                        token,
                        code: code.to_string(),
                    });
                }
            }
        }

        Ok(isolated)
    }

    /// Restore tokens of the active block set. Other tokens are left as they are.
    pub fn repair(&self, source: &str) -> String {
        self.blocks
            .iter()
            .fold(source.to_string(), |acc, block| {
                if acc.contains(&block.token) {
                    acc.replace(&block.token, &block.code)
                } else {
                    acc
                }
            })
    }

    pub fn blocks(&self) -> &[ExtractedBlock] {
        &self.blocks
    }

    /// Replace the active block set used by [`repair`](Self::repair).
    pub fn set_blocks(&mut self, blocks: Vec<ExtractedBlock>) -> &mut Self {
        self.blocks = blocks;
        self
    }

    pub fn take_blocks(&mut self) -> Vec<ExtractedBlock> {
        std::mem::take(&mut self.blocks)
    }

    fn prefix(&self) -> String {
        format!("__vf{}_", self.nonce)
    }

    fn next_token(&mut self) -> String {
        self.counter += 1;
        format!("{}{}__", self.prefix(), self.counter)
    }
}

impl Default for Isolator {
    fn default() -> Self {
        Self::new()
    }
}

fn fresh_nonce() -> String {
    Uuid::new_v4().simple().to_string()[..12].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_isolate_then_repair_is_identity() {
        let sources = [
            "",
            "<p>plain markup</p>",
            "<p>Hello <?= p('%s unit|%s units', 10) ?></p>",
            "<?php echo 1; ?><?php echo 2; ?>",
            "a <? $x = \"?>\"; ?> b <?php /* ?> */ echo $x ?> c",
        ];

        for source in sources {
            let mut isolator = Isolator::new();
            let isolated = isolator.isolate(source).unwrap();
            assert_eq!(isolator.repair(&isolated), source);
        }
    }

    #[test]
    fn test_isolated_text_has_no_code() {
        let mut isolator = Isolator::new();
        let isolated = isolator
            .isolate("<div><?php echo 'a'; ?></div><?= $b ?>")
            .unwrap();

        assert!(!isolated.contains("<?"));
        assert_eq!(isolator.blocks().len(), 2);
        assert_eq!(isolator.blocks()[0].code, "<?php echo 'a'; ?>");
        assert_eq!(isolator.blocks()[1].code, "<?= $b ?>");
    }

    #[test]
    fn test_close_marker_inside_string_is_not_a_terminator() {
        let source = r#"<?php echo '<?php ?>', "x\"?>"; ?>tail"#;
        let segments = split(source).unwrap();
        assert_eq!(
            segments,
            vec![
                Segment::Code(r#"<?php echo '<?php ?>', "x\"?>"; ?>"#),
                Segment::Text("tail"),
            ]
        );
    }

    #[test]
    fn test_line_comment_ends_before_close() {
        let segments = split("<?php // note ?>after").unwrap();
        assert_eq!(
            segments,
            vec![Segment::Code("<?php // note ?>"), Segment::Text("after")]
        );
    }

    #[test]
    fn test_subset_repair_leaves_excluded_tokens() {
        let mut isolator = Isolator::new();
        let isolated = isolator.isolate("<?= $a ?>|<?= $b ?>").unwrap();
        let blocks = isolator.take_blocks();
        let excluded = blocks[1].token.clone();

        isolator.set_blocks(vec![blocks[0].clone()]);
        let repaired = isolator.repair(&isolated);

        assert_eq!(repaired, format!("<?= $a ?>|{}", excluded));
    }

    #[test]
    fn test_unterminated_block_is_malformed() {
        let mut isolator = Isolator::new();
        let err = isolator.isolate("ok <?php echo 1;").unwrap_err();
        assert!(matches!(err, ViewError::MalformedSource { offset: 3, .. }));
        assert!(isolator.blocks().is_empty());
    }

    #[test]
    fn test_unterminated_string_is_malformed() {
        let err = split("<?php echo 'open ?>").unwrap_err();
        assert!(err.to_string().contains("unterminated string"));
    }

    #[test]
    fn test_nonce_rotates_when_source_contains_prefix() {
        let mut isolator = Isolator::with_nonce("fixed");
        let source = "__vffixed_1__ <?= 1 ?>";
        let isolated = isolator.isolate(source).unwrap();

        let token = &isolator.blocks()[0].token;
        assert!(!token.starts_with("__vffixed_"));
        assert!(isolated.starts_with("__vffixed_1__ "));
        assert_eq!(isolator.repair(&isolated), source);
    }

    #[test]
    fn test_tokens_unique_across_calls() {
        let mut isolator = Isolator::new();
        isolator.isolate("<?= 1 ?>").unwrap();
        isolator.isolate("<?= 2 ?>").unwrap();
        let blocks = isolator.blocks();
        assert_ne!(blocks[0].token, blocks[1].token);
    }
}
