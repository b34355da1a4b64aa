//! Wraps bytes in a C header so a bundled shader can be compiled into a program.

use std::path::Path;

/// How the payload is written into the header
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "cli", derive(clap::ValueEnum))]
pub enum EmbedMode {
    /// A single escaped string literal
    Text,

    /// Hex bytes, NUL-terminated
    Binary,
}

impl Default for EmbedMode {
    fn default() -> Self {
        EmbedMode::Binary
    }
}

const BYTES_PER_ROW: usize = 16;

/// `my-shader.frag` becomes `MY_SHADER_FRAG`.
pub fn to_identifier(name: &str) -> String {
    name.to_uppercase().replace('.', "_").replace('-', "_")
}

/// Identifier derived from the file name of `path`.
pub fn identifier_for_path(path: &Path) -> String {
    let name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string_lossy().into_owned());
    to_identifier(&name)
}

pub fn escape_c_string(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '\\' => escaped.push_str("\\\\"),
            '"' => escaped.push_str("\\\""),
            '\n' => escaped.push_str("\\n"),
            '\r' => escaped.push_str("\\r"),
            '\t' => escaped.push_str("\\t"),
            _ => escaped.push(c),
        }
    }
    escaped
}

fn text_array(out: &mut String, text: &str, identifier: &str) {
    out.push_str(&format!(
        "static const char {}[] = \"{}\";\n\n",
        identifier,
        escape_c_string(text)
    ));
    out.push_str(&format!("#define {}_SIZE {}\n\n", identifier, text.len()));
}

fn binary_array(out: &mut String, data: &[u8], identifier: &str) {
    let mut data = data.to_vec();
    if data.last() != Some(&0) {
        data.push(0);
    }
    let size = data.len() - 1;

    out.push_str(&format!("static const unsigned char {}[] =\n{{\n", identifier));

    let rows = data.chunks(BYTES_PER_ROW).count();
    for (i, row) in data.chunks(BYTES_PER_ROW).enumerate() {
        let hex: Vec<String> = row.iter().map(|byte| format!("0x{:02X}", byte)).collect();
        out.push_str("    ");
        out.push_str(&hex.join(", "));
        if i + 1 < rows {
            out.push(',');
        }
        out.push('\n');
    }

    out.push_str("};\n\n");
    out.push_str(&format!("#define {}_SIZE {}\n\n", identifier, size));
}

/// Renders a header declaring `data` under the identifier derived from `name`.
///
/// Text mode falls back to a byte array when `data` isn't valid UTF-8.
pub fn header(data: &[u8], name: &str, mode: EmbedMode) -> String {
    let identifier = to_identifier(name);
    let guard = format!("{}_H", identifier);

    let mut out = String::new();
    out.push_str(&format!("#ifndef {}\n#define {}\n\n", guard, guard));
    out.push_str("#ifdef __cplusplus\nextern \"C\" {\n#endif\n\n");

    match mode {
        EmbedMode::Text => match std::str::from_utf8(data) {
            Ok(text) => text_array(&mut out, text, &identifier),
            Err(err) => {
                tracing::warn!(
                    "{} is not valid UTF-8 ({}); writing it as a byte array",
                    name,
                    err
                );
                binary_array(&mut out, data, &identifier);
            }
        },
        EmbedMode::Binary => binary_array(&mut out, data, &identifier),
    }

    out.push_str("#ifdef __cplusplus\n}\n#endif\n\n");
    out.push_str(&format!("#endif // {}\n", guard));
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identifiers() {
        assert_eq!(to_identifier("my-shader.frag"), "MY_SHADER_FRAG");
        assert_eq!(
            identifier_for_path(Path::new("shaders/blur.glsl")),
            "BLUR_GLSL"
        );
    }

    #[test]
    fn escaping() {
        assert_eq!(
            escape_c_string("a\"b\\c\nd\te\r"),
            "a\\\"b\\\\c\\nd\\te\\r"
        );
    }

    #[test]
    fn text_header() {
        let header = header(b"void main(){}\n", "blit.frag", EmbedMode::Text);
        assert!(header.starts_with("#ifndef BLIT_FRAG_H\n#define BLIT_FRAG_H\n"));
        assert!(header.contains("static const char BLIT_FRAG[] = \"void main(){}\\n\";\n"));
        assert!(header.contains("#define BLIT_FRAG_SIZE 14\n"));
        assert!(header.ends_with("#endif // BLIT_FRAG_H\n"));
    }

    #[test]
    fn binary_header_rows_and_size() {
        let data: Vec<u8> = (1..=17).collect();
        let header = header(&data, "blob", EmbedMode::Binary);
        assert!(header.contains(
            "static const unsigned char BLOB[] =\n{\n    \
             0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08, 0x09, 0x0A, 0x0B, 0x0C, 0x0D, 0x0E, 0x0F, 0x10,\n    \
             0x11, 0x00\n};\n"
        ));
        assert!(header.contains("#define BLOB_SIZE 17\n"));
    }

    #[test]
    fn existing_terminator_is_not_counted() {
        let header = header(b"ab\0", "x", EmbedMode::Binary);
        assert!(header.contains("    0x61, 0x62, 0x00\n"));
        assert!(header.contains("#define X_SIZE 2\n"));
    }

    #[test]
    fn invalid_utf8_falls_back_to_bytes() {
        let header = header(&[0xff, 0xfe], "bad", EmbedMode::Text);
        assert!(header.contains("static const unsigned char BAD[]"));
        assert!(header.contains("0xFF, 0xFE, 0x00"));
        assert!(header.contains("#define BAD_SIZE 2\n"));
    }
}
