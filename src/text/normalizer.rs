//! Raw article text cleanup
//!
//! Turns scraped article bodies (markup, character references, mis-decoded
//! bytes, contact details, boilerplate) into plain text suitable for chunking.

use crate::error::{FeedsenseError, Result};
use regex::{Captures, Regex};

/// Common UTF-8 sequences that were decoded as Windows-1252/Latin-1.
/// Longer sequences must come before their prefixes.
const MOJIBAKE: &[(&str, &str)] = &[
    ("â€™", "\u{2019}"),
    ("â€˜", "\u{2018}"),
    ("â€œ", "\u{201C}"),
    ("â€\u{9d}", "\u{201D}"),
    ("â€”", "\u{2014}"),
    ("â€“", "\u{2013}"),
    ("â€¦", "\u{2026}"),
    ("â€¢", "\u{2022}"),
    ("Ã©", "é"),
    ("Ã¨", "è"),
    ("Ãª", "ê"),
    ("Ã¡", "á"),
    ("Ã ", "à"),
    ("Ã¢", "â"),
    ("Ã­", "í"),
    ("Ã³", "ó"),
    ("Ã´", "ô"),
    ("Ãº", "ú"),
    ("Ã±", "ñ"),
    ("Ã§", "ç"),
    ("Ã¼", "ü"),
    ("Ã¶", "ö"),
    ("Ã¤", "ä"),
    ("Ã\u{9f}", "ß"),
    ("Â©", "©"),
    ("Â®", "®"),
    ("Â°", "°"),
    ("Â\u{a0}", " "),
    ("Â ", " "),
    ("\u{feff}", ""),
    ("\u{200b}", ""),
    ("\u{a0}", " "),
];

/// Named character references we decode; unknown names are left untouched
fn named_entity(name: &str) -> Option<&'static str> {
    let decoded = match name {
        "amp" => "&",
        "lt" => "<",
        "gt" => ">",
        "quot" => "\"",
        "apos" => "'",
        "nbsp" => " ",
        "mdash" => "\u{2014}",
        "ndash" => "\u{2013}",
        "hellip" => "\u{2026}",
        "lsquo" => "\u{2018}",
        "rsquo" => "\u{2019}",
        "ldquo" => "\u{201C}",
        "rdquo" => "\u{201D}",
        "laquo" => "\u{00AB}",
        "raquo" => "\u{00BB}",
        "bull" => "\u{2022}",
        "middot" => "\u{00B7}",
        "copy" => "\u{00A9}",
        "reg" => "\u{00AE}",
        "trade" => "\u{2122}",
        "deg" => "\u{00B0}",
        "euro" => "\u{20AC}",
        "pound" => "\u{00A3}",
        "yen" => "\u{00A5}",
        "cent" => "\u{00A2}",
        "eacute" => "é",
        "egrave" => "è",
        "aacute" => "á",
        "agrave" => "à",
        "iacute" => "í",
        "oacute" => "ó",
        "uacute" => "ú",
        "ntilde" => "ñ",
        "ccedil" => "ç",
        "uuml" => "ü",
        "ouml" => "ö",
        "auml" => "ä",
        "szlig" => "ß",
        _ => return None,
    };
    Some(decoded)
}

/// Text normalizer holding its compiled patterns
pub struct TextNormalizer {
    script_block: Regex,
    style_block: Regex,
    comment: Regex,
    block_tag: Regex,
    any_tag: Regex,
    entity: Regex,
    email: Regex,
    phone: Regex,
    repeated_punctuation: Regex,
    ellipsis: Regex,
    separator_run: Regex,
    boilerplate: Vec<Regex>,
    boilerplate_line: Regex,
    inline_space: Regex,
    blank_lines: Regex,
}

impl TextNormalizer {
    /// Compile the normalizer's pattern set
    pub fn new() -> Result<Self> {
        let compile = |pattern: &str| {
            Regex::new(pattern).map_err(|e| {
                FeedsenseError::Processing(format!("Invalid normalizer pattern {}: {}", pattern, e))
            })
        };

        let boilerplate = [
            r"(?i)\b(?:subscribe|sign up)\b[^.!?\n]{0,60}\bnewsletters?\b[.!]?",
            r"(?i)\bsubscribe (?:now|today|here)\b[.!]?",
            r"(?i)(?:©|\(c\)|\bcopyright\b)\s*(?:\d{4}\s*)?[^\n]{0,80}?\ball rights reserved\b\.?",
            r"(?i)\ball rights reserved\b\.?",
            r"(?i)\bclick here to [^.!\n]{0,60}[.!]?",
            r"(?i)\bfollow us on [^.!\n]{0,60}[.!]?",
            r"\bADVERTISEMENT\b",
        ]
        .iter()
        .map(|p| compile(*p))
        .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            script_block: compile(r"(?is)<script\b[^>]*>.*?</script\s*>")?,
            style_block: compile(r"(?is)<style\b[^>]*>.*?</style\s*>")?,
            comment: compile(r"(?s)<!--.*?-->")?,
            block_tag: compile(
                r"(?i)</?(?:p|div|br|hr|li|ul|ol|h[1-6]|section|article|blockquote|tr|table|header|footer|figure|figcaption)\b[^<>]*>",
            )?,
            any_tag: compile(r"</?[a-zA-Z][^<>]*>")?,
            entity: compile(r"&(#[0-9]{1,7}|#[xX][0-9a-fA-F]{1,6}|[a-zA-Z][a-zA-Z0-9]{1,31});")?,
            email: compile(r"[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}")?,
            phone: compile(
                r"(?:\+\d{1,3}[\s.-]?)?(?:\(\d{3}\)\s?|\b\d{3}[\s.-]?)\d{3}[\s.-]?\d{4}\b",
            )?,
            repeated_punctuation: compile(r"([!?,;:])([!?,;:]*)")?,
            ellipsis: compile(r"\.{4,}")?,
            separator_run: compile(r"[*=_~#]{3,}")?,
            boilerplate,
            boilerplate_line: compile(
                r"(?im)^[ \t]*(?:advertisement|sponsored content|sponsored|ad|read more|share this article)[ \t]*:?[ \t]*$",
            )?,
            inline_space: compile(r"[ \t\x0B\x0C]+")?,
            blank_lines: compile(r"\n{3,}")?,
        })
    }

    /// Normalize raw article text into plain text
    ///
    /// Empty input yields an empty string. The result is a fixed point:
    /// normalizing it again returns it unchanged.
    pub fn normalize(&self, raw: &str) -> String {
        if raw.trim().is_empty() {
            return String::new();
        }

        // Passes only decode, remove or collapse text, so this converges
        let mut current = self.normalize_pass(raw);
        loop {
            let next = self.normalize_pass(&current);
            if next == current {
                return current;
            }
            current = next;
        }
    }

    fn normalize_pass(&self, raw: &str) -> String {
        let text = raw.replace("\r\n", "\n").replace('\r', "\n");
        let text = self.fix_mojibake(&text);
        let text = self.decode_entities(&text);
        let text = self.strip_markup(&text);
        let text = self.email.replace_all(&text, "[EMAIL]");
        let text = self.phone.replace_all(&text, "[PHONE]");
        let text = self.strip_boilerplate(&text);
        let text = self.collapse_punctuation(&text);
        self.collapse_whitespace(&text)
    }

    fn fix_mojibake(&self, text: &str) -> String {
        MOJIBAKE
            .iter()
            .fold(text.to_string(), |acc, (bad, good)| {
                if acc.contains(bad) {
                    acc.replace(bad, good)
                } else {
                    acc
                }
            })
    }

    /// Decode named and numeric references until none are left to decode
    ///
    /// Every decoded reference is shorter than its source, so the loop ends.
    fn decode_entities(&self, text: &str) -> String {
        let mut current = text.to_string();
        loop {
            let next = self
                .entity
                .replace_all(&current, |caps: &Captures| decode_reference(&caps[1], &caps[0]))
                .into_owned();
            if next == current {
                return current;
            }
            current = next;
        }
    }

    fn strip_markup(&self, text: &str) -> String {
        let text = self.script_block.replace_all(text, "");
        let text = self.style_block.replace_all(&text, "");
        let text = self.comment.replace_all(&text, "");
        let mut current = self.block_tag.replace_all(&text, "\n\n").into_owned();

        // Removing a tag can expose another one, e.g. "<<b>p>"
        loop {
            let next = self.any_tag.replace_all(&current, "").into_owned();
            if next == current {
                return next;
            }
            current = next;
        }
    }

    fn strip_boilerplate(&self, text: &str) -> String {
        let text = self.boilerplate_line.replace_all(text, "").into_owned();
        self.boilerplate
            .iter()
            .fold(text, |acc, re| re.replace_all(&acc, "").into_owned())
    }

    fn collapse_punctuation(&self, text: &str) -> String {
        let text = self.separator_run.replace_all(text, "");
        let text = self.ellipsis.replace_all(&text, "...");
        self.repeated_punctuation
            .replace_all(&text, |caps: &Captures| {
                // Keep "?!" style interrobangs, drop the rest of the run
                let first = &caps[1];
                match caps[2].chars().last() {
                    Some(last) if matches!(first, "!" | "?") && matches!(last, '!' | '?') => {
                        if first.starts_with(last) {
                            first.to_string()
                        } else {
                            format!("{}{}", first, last)
                        }
                    }
                    _ => first.to_string(),
                }
            })
            .into_owned()
    }

    fn collapse_whitespace(&self, text: &str) -> String {
        let text = self.inline_space.replace_all(text, " ");
        let lines: Vec<&str> = text.lines().map(str::trim).collect();
        let joined = lines.join("\n");
        self.blank_lines
            .replace_all(&joined, "\n\n")
            .trim()
            .to_string()
    }
}

/// Decode one character reference body (`#123`, `#x1F`, `amp`)
fn decode_reference(body: &str, original: &str) -> String {
    let code = if let Some(hex) = body
        .strip_prefix("#x")
        .or_else(|| body.strip_prefix("#X"))
    {
        u32::from_str_radix(hex, 16).ok()
    } else if let Some(dec) = body.strip_prefix('#') {
        dec.parse::<u32>().ok()
    } else {
        return named_entity(body)
            .map(str::to_string)
            .unwrap_or_else(|| original.to_string());
    };

    match code.and_then(char::from_u32) {
        Some('\u{a0}') => " ".to_string(),
        Some(c) if !c.is_control() || c == '\n' || c == '\t' => c.to_string(),
        _ => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn normalizer() -> TextNormalizer {
        TextNormalizer::new().unwrap()
    }

    #[test]
    fn test_strips_simple_markup() {
        let n = normalizer();
        assert_eq!(
            n.normalize("<p>AI breakthroughs in 2024</p>"),
            "AI breakthroughs in 2024"
        );
    }

    #[test]
    fn test_empty_input() {
        let n = normalizer();
        assert_eq!(n.normalize(""), "");
        assert_eq!(n.normalize("   \n\t "), "");
        assert_eq!(n.normalize("<div></div>"), "");
    }

    #[test]
    fn test_block_tags_become_paragraphs() {
        let n = normalizer();
        let out = n.normalize("<h1>Title</h1><p>First <b>bold</b> para.</p><p>Second para.</p>");
        assert_eq!(out, "Title\n\nFirst bold para.\n\nSecond para.");
    }

    #[test]
    fn test_script_and_style_removed() {
        let n = normalizer();
        let out = n.normalize("<style>p{color:red}</style>Text<script>alert('x')</script> here");
        assert_eq!(out, "Text here");
    }

    #[test]
    fn test_decodes_entities() {
        let n = normalizer();
        assert_eq!(
            n.normalize("Tom &amp; Jerry &#8212; &quot;classic&quot; &#x41;"),
            "Tom & Jerry \u{2014} \"classic\" A"
        );
        // Double-escaped input converges
        assert_eq!(n.normalize("R&amp;amp;D"), "R&D");
        // Unknown names survive
        assert_eq!(n.normalize("&bogus; stays"), "&bogus; stays");
    }

    #[test]
    fn test_fixes_mojibake() {
        let n = normalizer();
        assert_eq!(
            n.normalize("Itâ€™s a cafÃ© story"),
            "It\u{2019}s a café story"
        );
    }

    #[test]
    fn test_redacts_contacts() {
        let n = normalizer();
        let out = n.normalize("Contact jane.doe@example.com or call (555) 123-4567 today.");
        assert_eq!(out, "Contact [EMAIL] or call [PHONE] today.");

        let out = n.normalize("Call +1 555 123 4567 now");
        assert_eq!(out, "Call [PHONE] now");

        // Years and short numbers are not phone numbers
        assert_eq!(n.normalize("In 2024 there were 300 cases"), "In 2024 there were 300 cases");
    }

    #[test]
    fn test_collapses_punctuation() {
        let n = normalizer();
        assert_eq!(n.normalize("Wow!!! Really???"), "Wow! Really?");
        assert_eq!(n.normalize("Wait....."), "Wait...");
        assert_eq!(n.normalize("What?!"), "What?!");
        assert_eq!(n.normalize("Top\n=====\nStory"), "Top\n\nStory");
    }

    #[test]
    fn test_strips_boilerplate() {
        let n = normalizer();
        let raw = "Markets rallied on Monday.\n\nADVERTISEMENT\n\nSubscribe to our daily newsletter!\n\nCopyright 2024 Example News. All rights reserved.";
        assert_eq!(n.normalize(raw), "Markets rallied on Monday.");

        // The word alone in running text is kept
        assert_eq!(
            n.normalize("The copyright lawsuit continues."),
            "The copyright lawsuit continues."
        );
    }

    #[test]
    fn test_collapses_whitespace() {
        let n = normalizer();
        assert_eq!(
            n.normalize("  one   two\t\tthree \n\n\n\n four  "),
            "one two three\n\nfour"
        );
    }

    #[test]
    fn test_idempotent() {
        let n = normalizer();
        let samples = [
            "<p>AI breakthroughs in 2024</p>",
            "&lt;b&gt;escaped&lt;/b&gt; markup &amp;amp; more!!!",
            "Itâ€™s   here....\n\n\n\nEmail me: a@b.co",
            "<div>Para one.</div>\r\n<div>Para two?? Yes!!</div>",
            "plain text that is already clean.",
        ];
        for raw in samples {
            let once = n.normalize(raw);
            assert_eq!(n.normalize(&once), once, "not idempotent for {:?}", raw);
        }
    }

    #[test]
    fn test_deeply_escaped_entities_converge() {
        let n = normalizer();
        let raw = format!("R&{}D", "amp;".repeat(20));
        let once = n.normalize(&raw);
        assert_eq!(once, "R&D");
        assert_eq!(n.normalize(&once), once);
    }
}
