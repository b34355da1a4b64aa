//! Text passes applied to the finished bundle. None of these know anything
//! about the language beyond comments, directives and a fixed set of punctuation.

use lazy_static::lazy_static;
use regex::Regex;

/// Which cosmetic passes to run on the bundled text
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BundleOptions {
    pub strip_comments: bool,

    /// Drop blank lines and join code lines, keeping preprocessor directives on lines of their own
    pub collapse_newlines: bool,

    /// Remove blanks around operators and punctuation, squeeze the rest
    pub normalize_spaces: bool,
}

impl Default for BundleOptions {
    fn default() -> Self {
        BundleOptions {
            strip_comments: true,
            collapse_newlines: true,
            normalize_spaces: true,
        }
    }
}

impl BundleOptions {
    /// Leaves the bundle exactly as the walker produced it.
    pub fn raw() -> Self {
        BundleOptions {
            strip_comments: false,
            collapse_newlines: false,
            normalize_spaces: false,
        }
    }
}

lazy_static! {
    static ref BLOCK_COMMENT_RE: Regex = Regex::new(r"(?s)/\*.*?\*/").unwrap();
    static ref LINE_COMMENT_RE: Regex = Regex::new(r"//[^\n]*").unwrap();
    static ref PUNCTUATION_RE: Regex = Regex::new(r"[ \t]*([,.(){};:+\-*/=])[ \t]*").unwrap();
    static ref BLANKS_RE: Regex = Regex::new(r"[ \t]+").unwrap();
}

fn is_directive(line: &str) -> bool {
    line.trim_start().starts_with('#')
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

pub fn remove_comments(source: &str) -> String {
    let source = BLOCK_COMMENT_RE.replace_all(source, "");
    LINE_COMMENT_RE.replace_all(&source, "").into_owned()
}

pub fn remove_newlines(source: &str) -> String {
    let lines: Vec<&str> = source.lines().filter(|l| !l.trim().is_empty()).collect();
    let mut out = String::with_capacity(source.len());

    for (i, line) in lines.iter().enumerate() {
        if i > 0 {
            let next_is_directive = lines.get(i + 1).map_or(false, |l| is_directive(l));
            if is_directive(line) || is_directive(lines[i - 1]) || next_is_directive {
                out.push('\n');
            } else {
                // Joining `float` and `x;` must not produce `floatx;`
                let joins_words = lines[i - 1].chars().last().map_or(false, is_word_char)
                    && line.chars().next().map_or(false, is_word_char);
                if joins_words {
                    out.push(' ');
                }
            }
        }
        out.push_str(line);
    }

    out
}

/// Drops blanks around punctuation unless that would fuse two signs, as in `a - -b`.
fn squeeze_punctuation(line: &str) -> String {
    let is_sign = |c: char| c == '+' || c == '-';
    let mut out = String::with_capacity(line.len());
    let mut last = 0;
    for caps in PUNCTUATION_RE.captures_iter(line) {
        let (whole, mark) = match (caps.get(0), caps.get(1)) {
            (Some(whole), Some(mark)) => (whole, mark),
            _ => continue,
        };
        out.push_str(&line[last..whole.start()]);

        let sign = mark.as_str().starts_with(is_sign);
        if sign && whole.start() < mark.start() && out.ends_with(is_sign) {
            out.push(' ');
        }
        out.push_str(mark.as_str());
        if sign && mark.end() < whole.end() && line[whole.end()..].starts_with(is_sign) {
            out.push(' ');
        }
        last = whole.end();
    }
    out.push_str(&line[last..]);
    out
}

pub fn normalize_spaces(source: &str) -> String {
    source
        .split('\n')
        .map(|line| {
            if is_directive(line) {
                line.to_string()
            } else {
                let line = squeeze_punctuation(line);
                BLANKS_RE.replace_all(line.trim(), " ").into_owned()
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Runs the passes enabled in `options`, in order.
pub fn apply(source: &str, options: &BundleOptions) -> String {
    let mut source = source.to_string();
    if options.strip_comments {
        source = remove_comments(&source);
    }
    if options.collapse_newlines {
        source = remove_newlines(&source);
    }
    if options.normalize_spaces {
        source = normalize_spaces(&source);
    }
    source
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn comments() {
        assert_eq!(remove_comments("a /* b\n c */ d // e\nf"), "a  d \nf");
    }

    #[test]
    fn newlines_around_directives() {
        assert_eq!(
            remove_newlines("#version 330\n\nfloat a;\n\n  float b;\nvoid main()\n{\n}\n#define X 1\nint c;"),
            "#version 330\nfloat a;  float b;void main(){\n}\n#define X 1\nint c;"
        );
    }

    #[test]
    fn newlines_keep_words_apart() {
        assert_eq!(remove_newlines("uniform float\nuTime;"), "uniform float uTime;");
    }

    #[test]
    fn spaces() {
        assert_eq!(
            normalize_spaces("  float  x = a + b * ( c - d ) ;\n#define  A  ( 1 + 2 )"),
            "float x=a+b*(c-d);\n#define  A  ( 1 + 2 )"
        );
    }

    #[test]
    fn spaces_keep_signs_apart() {
        assert_eq!(normalize_spaces("float y = a - -b + c;"), "float y=a- -b+c;");
        assert_eq!(normalize_spaces("int i = j++ + +k;"), "int i=j++ +k;");
        assert_eq!(normalize_spaces("x = - 1;"), "x=-1;");
    }

    #[test]
    fn raw_options_change_nothing() {
        let text = "/* c */\n\nfloat  x ;\n";
        assert_eq!(apply(text, &BundleOptions::raw()), text);
    }

    #[test]
    fn full_pipeline() {
        let text = "#version 330\n// header\nfloat f ( float x ) {\n    return x * 2.0 ; /* twice */\n}\n\nvoid main() { f(1.0); }\n";
        assert_eq!(
            apply(text, &BundleOptions::default()),
            "#version 330\nfloat f(float x){return x*2.0;}void main(){f(1.0);}"
        );
    }
}
