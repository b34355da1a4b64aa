use std::iter::Peekable;
use std::str::Chars;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct Location {
    line: u32,
    offset: usize,
}

#[derive(Clone)]
struct LocationTracking<I> {
    iter: I,
    line: u32,
    offset: usize,
}

impl<I> Iterator for LocationTracking<I>
where
    I: Iterator<Item = char>,
{
    type Item = (Location, <I as Iterator>::Item);

    #[inline]
    fn next(&mut self) -> Option<(Location, <I as Iterator>::Item)> {
        self.iter.next().map(|a| {
            let ret = (
                Location {
                    line: self.line,
                    offset: self.offset,
                },
                a,
            );
            self.offset += a.len_utf8();
            if a == '\n' {
                self.line += 1;
            }
            ret
        })
    }
}

/// A `#include "path"` directive found by the scanner
#[derive(PartialEq, Eq, Debug, Clone)]
pub struct IncludeDirective {
    /// Path between the quotes, with line continuations removed
    pub path: String,

    /// Line on which the directive starts
    pub line: usize,

    /// Directive text exactly as written in the input
    pub raw: String,
}

#[derive(PartialEq, Eq, Debug, Clone)]
pub enum Segment {
    /// Source text as written, and the same code with comments blanked out
    Text { text: String, code: String },
    Include(IncludeDirective),
    /// `#include` that could not be parsed; kept verbatim
    Malformed { raw: String, line: usize },
}

/// Splits shader source into text and include directives.
// Inspired by JayKickliter/monkey
pub struct Scanner<'a> {
    input: &'a str,
    input_iter: Peekable<LocationTracking<Chars<'a>>>,
    segments: Vec<Segment>,
    current_text: String,
    text_start: usize,
}

impl<'a> Scanner<'a> {
    pub fn new(input: &'a str) -> Scanner<'a> {
        Scanner {
            input,
            input_iter: LocationTracking {
                iter: input.chars(),
                line: 1,
                offset: 0,
            }
            .peekable(),
            segments: Vec::new(),
            current_text: String::new(),
            text_start: 0,
        }
    }

    pub fn into_segments(mut self) -> Vec<Segment> {
        self.process_input();
        self.segments
    }

    fn read_char(&mut self) -> Option<(Location, char)> {
        self.input_iter.next()
    }

    fn peek_char(&mut self) -> Option<&(Location, char)> {
        self.input_iter.peek()
    }

    fn current_offset(&mut self) -> usize {
        let end = self.input.len();
        self.peek_char().map(|&(loc, _)| loc.offset).unwrap_or(end)
    }

    fn skip_whitespace_until_eol(&mut self) {
        while let Some(&(_, c)) = self.peek_char() {
            if c == '\n' {
                break;
            } else if c.is_whitespace() {
                let _ = self.read_char();
            } else if c == '\\' {
                let mut peek_next = self.input_iter.clone();
                let _ = peek_next.next();
                if let Some(&(_, '\n')) = peek_next.peek() {
                    let _ = self.read_char();
                    let _ = self.read_char();
                } else {
                    break;
                }
            } else if c == '/' {
                let mut next_peek = self.input_iter.clone();
                let _ = next_peek.next();

                if let Some(&(_, '*')) = next_peek.peek() {
                    // Block comment. Skip it.
                    let _ = self.read_char();
                    let _ = self.read_char();

                    self.input_iter = Self::skip_block_comment(self.input_iter.clone()).1;
                } else {
                    break;
                }
            } else {
                break;
            }
        }
    }

    fn read_string(&mut self, right_delim: char) -> Option<String> {
        let mut s = String::new();

        while let Some(&(_, c)) = self.peek_char() {
            if c == '\n' {
                break;
            } else if c == '\\' {
                let _ = self.read_char();
                let _ = self.read_char();
            } else if c == right_delim {
                let _ = self.read_char();
                return Some(s);
            } else {
                s.push(c);
                let _ = self.read_char();
            }
        }

        None
    }

    fn skip_block_comment(
        mut it: Peekable<LocationTracking<Chars<'a>>>,
    ) -> (String, Peekable<LocationTracking<Chars<'a>>>) {
        let mut s = String::new();

        while let Some((_, c)) = it.next() {
            if c == '*' {
                s.push(' ');
                if let Some(&(_, '/')) = it.peek() {
                    let _ = it.next();
                    s.push(' ');
                    break;
                }
            } else if c == '\n' {
                s.push('\n');
            } else {
                s.push(' ');
            }
        }

        (s, it)
    }

    fn skip_line(&mut self) {
        while let Some((_, c)) = self.read_char() {
            if c == '\n' {
                self.current_text.push('\n');
                break;
            } else if c == '\\' {
                if let Some((_, '\n')) = self.read_char() {
                    self.current_text.push('\n');
                }
            }
        }
    }

    fn peek_preprocessor_ident(
        &mut self,
    ) -> Option<(String, Peekable<LocationTracking<Chars<'a>>>)> {
        let mut token = String::new();
        let mut it = self.input_iter.clone();

        while let Some(&(_, c)) = it.peek() {
            if '\n' == c || '\r' == c {
                break;
            } else if c.is_alphabetic() {
                let _ = it.next();
                token.push(c);
            } else if c.is_whitespace() {
                if !token.is_empty() {
                    // Already found some chars, and this ends the identifier
                    break;
                } else {
                    let _ = it.next();
                }
            } else if '\\' == c {
                let _ = it.next();
                let next = it.next();

                if let Some((_, '\n')) = next {
                    // Continue scanning on next line
                    continue;
                } else if let (Some((_, '\r')), Some(&(_, '\n'))) = (next, it.peek()) {
                    // ditto, but Windows-special
                    let _ = it.next();
                    continue;
                } else {
                    // Unrecognized escape sequence. Abort.
                    return None;
                }
            } else if '/' == c {
                if !token.is_empty() {
                    break;
                }

                let mut next_peek = it.clone();
                let _ = next_peek.next();

                if let Some(&(_, '*')) = next_peek.peek() {
                    // Block comment. Skip it.
                    let _ = it.next();
                    let _ = it.next();

                    it = Self::skip_block_comment(it).1;
                } else {
                    break;
                }
            } else {
                break;
            }
        }

        Some((token, it))
    }

    fn flush_current_text(&mut self, end: usize) {
        if end > self.text_start {
            self.segments.push(Segment::Text {
                text: self.input[self.text_start..end].to_string(),
                code: std::mem::take(&mut self.current_text),
            });
        }
        self.current_text.clear();
    }

    /// Called with the iterator positioned right after the `include` keyword.
    fn scan_include(&mut self, start: Location) {
        self.skip_whitespace_until_eol();

        let path = match self.peek_char() {
            Some(&(_, '"')) => {
                let _ = self.read_char();
                self.read_string('"')
            }
            Some(&(_, '<')) => {
                // System includes have no meaning for GLSL bundling; leave them be.
                let _ = self.read_char();
                let _ = self.read_string('>');
                let end = self.current_offset();
                self.current_text.push_str(&self.input[start.offset..end]);
                return;
            }
            _ => None,
        };

        let end = self.current_offset();
        let raw = self.input[start.offset..end].to_string();
        let line = start.line as usize;

        self.flush_current_text(start.offset);
        self.text_start = end;
        self.segments.push(match path {
            Some(path) => Segment::Include(IncludeDirective { path, line, raw }),
            None => Segment::Malformed { raw, line },
        });
    }

    fn process_input(&mut self) {
        while let Some((c_loc, c)) = self.read_char() {
            match c {
                '/' => {
                    let next = self.peek_char();

                    if let Some(&(_, '*')) = next {
                        let _ = self.read_char();
                        self.current_text.push_str("  ");
                        let (white, it) = Self::skip_block_comment(self.input_iter.clone());

                        self.input_iter = it;
                        self.current_text.push_str(&white);
                    } else if let Some(&(_, '/')) = next {
                        let _ = self.read_char();
                        self.skip_line();
                    } else {
                        self.current_text.push(c);
                    }
                }
                '#' => match self.peek_preprocessor_ident() {
                    Some((ident, it)) if ident == "include" => {
                        self.input_iter = it;
                        self.scan_include(c_loc);
                    }
                    _ => self.current_text.push(c),
                },
                _ => {
                    self.current_text.push(c);
                }
            }
        }

        self.flush_current_text(self.input.len());
    }
}

/// Code with comments blanked, dropping include directives.
pub fn strip_directives(segments: &[Segment]) -> String {
    segments
        .iter()
        .filter_map(|segment| match segment {
            Segment::Text { code, .. } => Some(code.as_str()),
            _ => None,
        })
        .collect()
}
