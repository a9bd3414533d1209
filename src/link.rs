use crate::textline::Line;
use crate::types::Point;

/// Sinks for the two annotation kinds. They are separate capabilities so a
/// pass that only resolves one kind receives only that one.
pub(crate) trait WebLinkSink {
    /// `rect` is `[llx, lly, urx, ury]` in device space.
    fn web_link(&mut self, rect: [f32; 4], url: &str);
}

pub(crate) trait DocLinkSink {
    fn doc_link(&mut self, rect: [f32; 4], page: usize, target: Point);
}

const SCHEMES: [&str; 13] = [
    "http://",
    "https://",
    "ftp://",
    "mailto:",
    "news:",
    "nntp:",
    "telnet:",
    "rlogin:",
    "tn3270:",
    "wais://",
    "gopher://",
    "file://",
    "prospero:",
];

fn is_url_char(ch: char) -> bool {
    ch.is_ascii_alphanumeric() || ".-_/~:@%?&=+#".contains(ch)
}

fn scheme_prefix(token: &str) -> Option<&'static str> {
    // Earliest (longest applicable) declared prefix wins.
    SCHEMES.iter().copied().find(|scheme| {
        token.len() > scheme.len()
            && token[..scheme.len()].eq_ignore_ascii_case(scheme)
    })
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct UrlMatch {
    /// Byte range of the matched text within the line.
    pub start: usize,
    pub end: usize,
    /// Full URL including the (possibly inferred) scheme.
    pub url: String,
}

/// Finds URLs in plain text. Tokens with an explicit scheme are taken
/// verbatim; schemeless tokens are classified as mail addresses (exactly one
/// `@`) or host names (at least two dots and enough substance around them).
pub(crate) fn find_urls(text: &str) -> Vec<UrlMatch> {
    let mut out = Vec::new();
    let bytes = text.as_bytes();
    let mut index = 0;
    while index < bytes.len() {
        let rest = &text[index..];
        let Some(offset) = rest.find(is_url_char) else {
            break;
        };
        let start = index + offset;
        let token_len = text[start..]
            .find(|c| !is_url_char(c))
            .unwrap_or(text.len() - start);
        let mut end = start + token_len;
        index = end;

        // Trailing punctuation belongs to the sentence, not the URL.
        let mut token = &text[start..end];
        while token.ends_with('.') || token.ends_with('@') {
            token = &token[..token.len() - 1];
            end -= 1;
        }
        if token.is_empty() {
            continue;
        }

        if let Some(scheme) = scheme_prefix(token) {
            if token.len() > scheme.len() {
                out.push(UrlMatch {
                    start,
                    end,
                    url: token.to_string(),
                });
            }
            continue;
        }

        let ats = token.matches('@').count();
        let dots = token.matches('.').count();
        if ats == 1 {
            out.push(UrlMatch {
                start,
                end,
                url: format!("mailto:{}", token),
            });
        } else if ats == 0 && dots >= 2 && token.len() > 2 * dots + 1 {
            let scheme = if token.starts_with("ftp.") {
                "ftp://"
            } else {
                "http://"
            };
            out.push(UrlMatch {
                start,
                end,
                url: format!("{}{}", scheme, token),
            });
        }
    }
    out
}

/// Scans one reconstructed line and reports each URL with the device-space
/// rectangle covering its characters.
pub(crate) fn scan_line(line: &Line, sink: &mut dyn WebLinkSink) {
    for found in find_urls(&line.text) {
        let covered: Vec<_> = line
            .chars
            .iter()
            .filter(|c| c.offset >= found.start && c.offset < found.end)
            .collect();
        let Some(first) = covered.first() else {
            continue;
        };
        let last = covered.last().unwrap();
        let rect = [
            first.x,
            line.bounds.bottom,
            last.x + last.width,
            line.bounds.top,
        ];
        sink.web_link(rect, &found.url);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fonts::FontDescriptor;
    use crate::textline::CharPos;
    use crate::types::Rect;

    fn urls(text: &str) -> Vec<String> {
        find_urls(text).into_iter().map(|m| m.url).collect()
    }

    #[test]
    fn explicit_scheme_is_taken_verbatim() {
        assert_eq!(
            urls("see https://example.com/a?b=c for details"),
            vec!["https://example.com/a?b=c"]
        );
    }

    #[test]
    fn bare_scheme_without_remainder_is_rejected() {
        assert!(urls("the http:// prefix alone").is_empty());
    }

    #[test]
    fn host_name_gains_http_scheme() {
        assert_eq!(urls("visit www.example.com today"), vec!["http://www.example.com"]);
    }

    #[test]
    fn ftp_host_gains_ftp_scheme() {
        assert_eq!(urls("ftp.example.org has it"), vec!["ftp://ftp.example.org"]);
    }

    #[test]
    fn mail_address_gains_mailto() {
        assert_eq!(urls("write to user@example.com."), vec!["mailto:user@example.com"]);
    }

    #[test]
    fn dotless_mail_address_is_linked() {
        assert_eq!(urls("ping root@localhost now"), vec!["mailto:root@localhost"]);
    }

    #[test]
    fn trailing_dot_is_trimmed() {
        let found = find_urls("at www.example.com.");
        assert_eq!(found[0].url, "http://www.example.com");
        assert_eq!(&"at www.example.com."[found[0].start..found[0].end], "www.example.com");
    }

    #[test]
    fn too_little_substance_is_rejected() {
        assert!(urls("version 1.2.3").is_empty());
        assert!(urls("a.b").is_empty());
        assert!(urls("e.g. example").is_empty());
    }

    #[test]
    fn multiple_ats_are_rejected() {
        assert!(urls("a@b@c.com").is_empty());
    }

    #[test]
    fn several_urls_in_one_line() {
        assert_eq!(
            urls("www.aaa.com and user@bbb.org"),
            vec!["http://www.aaa.com", "mailto:user@bbb.org"]
        );
    }

    struct Collect(Vec<(Vec<i32>, String)>);

    impl WebLinkSink for Collect {
        fn web_link(&mut self, rect: [f32; 4], url: &str) {
            self.0
                .push((rect.iter().map(|v| *v as i32).collect(), url.to_string()));
        }
    }

    #[test]
    fn scan_line_reports_character_rect() {
        let text = "go www.example.com now";
        let chars: Vec<CharPos> = text
            .char_indices()
            .map(|(offset, _)| CharPos {
                offset,
                x: offset as f32 * 10.0,
                width: 10.0,
            })
            .collect();
        let line = Line {
            text: text.to_string(),
            chars,
            baseline: 100.0,
            font: FontDescriptor::default(),
            bounds: Rect {
                left: 0.0,
                top: 109.0,
                right: 220.0,
                bottom: 97.0,
            },
        };
        let mut sink = Collect(Vec::new());
        scan_line(&line, &mut sink);
        assert_eq!(sink.0.len(), 1);
        let (rect, url) = &sink.0[0];
        assert_eq!(url, "http://www.example.com");
        // "www.example.com" spans bytes 3..18.
        assert_eq!(rect[0], 30);
        assert_eq!(rect[2], 180);
    }
}
