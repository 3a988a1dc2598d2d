//! Line-oriented reader for the human-editable geometry files.
//!
//! Objects are written one per line as `name = value[, value]; ...` groups,
//! so parsing reduces to collecting the comma-separated values after each
//! `=` in order.

use std::path::{Path, PathBuf};
use std::str::{FromStr, Lines};

use crate::error::{Result, UcamError};

/// Walks the non-blank lines of an ASCII file, keeping track of line numbers
/// for error messages.
pub struct AsciiCursor<'a> {
    lines: Lines<'a>,
    line_no: usize,
}

impl<'a> AsciiCursor<'a> {
    pub fn new(text: &'a str) -> Self {
        Self {
            lines: text.lines(),
            line_no: 0,
        }
    }

    /// Next line containing anything other than whitespace.
    pub fn next_line(&mut self) -> Result<&'a str> {
        for line in self.lines.by_ref() {
            self.line_no += 1;
            if !line.trim().is_empty() {
                return Ok(line);
            }
        }
        Err(UcamError::Parse(format!(
            "unexpected end of input after line {}",
            self.line_no
        )))
    }

    /// Read a `Number of <plural> = N` line.
    pub fn read_count(&mut self, plural: &str) -> Result<usize> {
        let line = self.next_line()?;
        let expected = format!("Number of {plural}");
        let (label, value) = line.split_once('=').ok_or_else(|| self.error(line))?;
        if !label.trim().eq_ignore_ascii_case(&expected) {
            return Err(UcamError::Parse(format!(
                "line {}: expected \"{expected} = N\", found \"{}\"",
                self.line_no,
                line.trim()
            )));
        }
        value.trim().parse().map_err(|_| self.error(line))
    }

    /// Consume a `<Name> <number>:` label line. The numbering is not checked
    /// so that hand-edited files may reorder blocks.
    pub fn read_label(&mut self) -> Result<()> {
        let line = self.next_line()?;
        if !line.trim_end().ends_with(':') {
            return Err(UcamError::Parse(format!(
                "line {}: expected a label ending in ':', found \"{}\"",
                self.line_no,
                line.trim()
            )));
        }
        Ok(())
    }

    pub fn line_no(&self) -> usize {
        self.line_no
    }

    fn error(&self, line: &str) -> UcamError {
        UcamError::Parse(format!("line {}: cannot parse \"{}\"", self.line_no, line.trim()))
    }
}

/// All values of an `a,b = 1, 2; c = 3` line, in order.
pub fn assigned_values(line: &str) -> Vec<&str> {
    line.split(';')
        .filter_map(|group| group.split_once('=').map(|(_, v)| v))
        .flat_map(|values| values.split(','))
        .map(str::trim)
        .collect()
}

/// Parse exactly `N` assigned values of one type.
pub fn parse_values<T: FromStr, const N: usize>(line: &str) -> Result<[T; N]> {
    let values = assigned_values(line);
    if values.len() != N {
        return Err(UcamError::Parse(format!(
            "expected {N} values, found {} in \"{}\"",
            values.len(),
            line.trim()
        )));
    }
    let mut parsed = Vec::with_capacity(N);
    for v in values {
        parsed.push(parse_field(v)?);
    }
    parsed
        .try_into()
        .map_err(|_| UcamError::Parse(format!("expected {N} values in \"{}\"", line.trim())))
}

pub fn parse_field<T: FromStr>(s: &str) -> Result<T> {
    s.trim()
        .parse()
        .map_err(|_| UcamError::Parse(format!("invalid value \"{}\"", s.trim())))
}

/// Append `ext` unless the path already ends with it.
pub fn with_extension(path: &Path, ext: &str) -> PathBuf {
    let name = path.as_os_str().to_string_lossy();
    if name.ends_with(ext) {
        path.to_path_buf()
    } else {
        PathBuf::from(format!("{name}{ext}"))
    }
}
