//! Line-ending detection, canonicalization and restoration
//!
//! The pipeline works on LF-only text. The dominant style of the input is
//! recorded up front and put back once the outermost call is finished.

/// A line-ending style
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EolStyle {
    /// `\r\n`
    CrLf,
    /// `\r`
    Cr,
    /// `\n`
    Lf,
}

impl EolStyle {
    /// The line ending of the host platform
    pub fn native() -> Self {
        if cfg!(windows) {
            EolStyle::CrLf
        } else {
            EolStyle::Lf
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            EolStyle::CrLf => "\r\n",
            EolStyle::Cr => "\r",
            EolStyle::Lf => "\n",
        }
    }
}

/// Detect the line-ending style of `text`
///
/// Exactly one style present wins. Text with no line breaks, or with a mix of
/// styles, falls back to [`EolStyle::native`], so mixed input loses its mixture.
pub fn detect(text: &str) -> EolStyle {
    let bytes = text.as_bytes();
    let (mut crlf, mut cr, mut lf) = (false, false, false);

    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'\r' if bytes.get(i + 1) == Some(&b'\n') => {
                crlf = true;
                i += 1;
            }
            b'\r' => cr = true,
            b'\n' => lf = true,
            _ => {}
        }
        i += 1;
    }

    match (crlf, cr, lf) {
        (true, false, false) => EolStyle::CrLf,
        (false, true, false) => EolStyle::Cr,
        (false, false, true) => EolStyle::Lf,
        _ => EolStyle::native(),
    }
}

/// Rewrite every CRLF and lone CR to LF
pub fn normalize(text: &str) -> String {
    normalize_with_indent(text, "")
}

/// Rewrite every line ending to LF followed by `indent`
///
/// Used when splicing included content into an indented call site.
pub fn normalize_with_indent(text: &str, indent: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\r' => {
                if chars.peek() == Some(&'\n') {
                    chars.next();
                }
                out.push('\n');
                out.push_str(indent);
            }
            '\n' => {
                out.push('\n');
                out.push_str(indent);
            }
            other => out.push(other),
        }
    }
    out
}

/// Turn LF-normalized text back into `style`
pub fn restore(text: &str, style: EolStyle) -> String {
    match style {
        EolStyle::Lf => text.to_string(),
        other => text.replace('\n', other.as_str()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_single_styles() {
        assert_eq!(detect("a\r\nb\r\n"), EolStyle::CrLf);
        assert_eq!(detect("a\rb\r"), EolStyle::Cr);
        assert_eq!(detect("a\nb\n"), EolStyle::Lf);
    }

    #[test]
    fn test_detect_leading_lf() {
        assert_eq!(detect("\nabc"), EolStyle::Lf);
    }

    #[test]
    fn test_detect_mixed_falls_back_to_native() {
        assert_eq!(detect("a\r\nb\nc"), EolStyle::native());
        assert_eq!(detect("a\rb\nc"), EolStyle::native());
    }

    #[test]
    fn test_detect_empty_falls_back_to_native() {
        assert_eq!(detect(""), EolStyle::native());
        assert_eq!(detect("no breaks"), EolStyle::native());
    }

    #[test]
    fn test_normalize() {
        assert_eq!(normalize("a\r\nb\rc\nd"), "a\nb\nc\nd");
    }

    #[test]
    fn test_normalize_with_indent() {
        assert_eq!(normalize_with_indent("a\r\nb\nc", "  "), "a\n  b\n  c");
    }

    #[test]
    fn test_restore() {
        assert_eq!(restore("a\nb\n", EolStyle::CrLf), "a\r\nb\r\n");
        assert_eq!(restore("a\nb\n", EolStyle::Cr), "a\rb\r");
        assert_eq!(restore("a\nb\n", EolStyle::Lf), "a\nb\n");
    }
}
