//! Line and column lookup for byte positions in the source text.

/// A table of line-start offsets, built once per source text and consulted
/// whenever a byte position needs to be rendered as a line/column pair.
///
/// Positions everywhere else in this crate are plain byte offsets; lines and
/// columns exist only for human consumption, so they are derived on demand
/// rather than carried around.
#[derive(Debug, Clone)]
pub struct LineMap {
    line_starts: Vec<usize>,
}

impl LineMap {
    /// Scan `source` and record where each line begins.
    pub fn new(source: &str) -> Self {
        let mut line_starts = vec![0];
        for (i, b) in source.bytes().enumerate() {
            if b == b'\n' {
                line_starts.push(i + 1);
            }
        }
        LineMap { line_starts }
    }

    /// Convert a byte offset to a 1-based `(line, column)` pair.
    ///
    /// The column counts characters, not bytes, so multibyte characters
    /// earlier on the line don't inflate it. Offsets past the end of `source`
    /// are clamped.
    pub fn line_col(&self, source: &str, offset: usize) -> (usize, usize) {
        let offset = offset.min(source.len());
        let line = self
            .line_starts
            .binary_search(&offset)
            .unwrap_or_else(|i| i - 1);
        let line_start = self.line_starts[line];
        let column = source[line_start..offset].chars().count();
        (line + 1, column + 1)
    }

    /// Number of lines in the source.
    pub fn line_count(&self) -> usize {
        self.line_starts.len()
    }
}

/// Render a position the way error messages do, e.g. `line 4 column 8`.
pub(crate) fn describe(source: &str, offset: usize) -> (usize, usize) {
    LineMap::new(source).line_col(source, offset)
}
