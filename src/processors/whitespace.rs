//! Whitespace Processor - collapses markup whitespace, never touches code

use crate::context::CompileContext;
use crate::error::ViewError;
use crate::isolator::Isolator;

use super::Processor;

#[derive(Debug, Clone, Copy, Default)]
pub struct WhitespaceProcessor;

impl WhitespaceProcessor {
    pub fn new() -> Self {
        Self
    }
}

impl Processor for WhitespaceProcessor {
    fn name(&self) -> &'static str {
        "whitespace"
    }

    fn process(&self, source: &str, _ctx: &mut CompileContext) -> Result<String, ViewError> {
        let mut isolator = Isolator::new();
        let isolated = isolator.isolate(source)?;
        Ok(isolator.repair(&collapse(&isolated)))
    }
}

/// Each whitespace run becomes one newline if it contained one, else one space.
fn collapse(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut run: Option<bool> = None;

    for c in text.chars() {
        if c.is_whitespace() {
            let newline = run.unwrap_or(false) || c == '\n';
            run = Some(newline);
            continue;
        }
        if let Some(newline) = run.take() {
            out.push(if newline { '\n' } else { ' ' });
        }
        out.push(c);
    }

    if let Some(newline) = run {
        out.push(if newline { '\n' } else { ' ' });
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collapse_runs() {
        assert_eq!(collapse("<p>  a \t b</p>\n\n  <i>"), "<p> a b</p>\n<i>");
        assert_eq!(collapse("   "), " ");
    }

    #[test]
    fn test_code_is_untouched() {
        let source = "<div>\n   <?php echo 'a    b'; ?>   </div>";
        let mut isolator = Isolator::new();
        let isolated = isolator.isolate(source).unwrap();
        let out = isolator.repair(&collapse(&isolated));
        assert_eq!(out, "<div>\n<?php echo 'a    b'; ?> </div>");
    }
}
