use regex::Regex;

/// Markers the service is asked to use in its reply.
///
/// All three are matched case-insensitively.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseMarkers {
    /// Prefix echoed before the front text, e.g. `FRONT:`.
    pub front_prefix: String,
    /// Opening tag marker, e.g. `<tags>`.
    pub tag_open: String,
    /// Closing tag marker, e.g. `</tags>`.
    pub tag_close: String,
}

impl Default for ResponseMarkers {
    fn default() -> Self {
        Self {
            front_prefix: "FRONT:".to_string(),
            tag_open: "<tags>".to_string(),
            tag_close: "</tags>".to_string(),
        }
    }
}

/// One reply line reduced to the echoed front text and the raw tag text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedAnnotation {
    /// Trimmed front text as echoed by the service.
    pub front_key: String,
    /// Text between the tag markers, untouched. Empty when the line had no
    /// complete marker pair.
    pub tag_text: String,
}

/// Extracts [`ParsedAnnotation`]s from raw reply text.
#[derive(Debug, Clone)]
pub struct ResponseParser {
    front_prefix: Regex,
    tag_open: Regex,
    tag_pair: Regex,
}

impl ResponseParser {
    /// Compiles matchers for `markers`.
    ///
    /// # Errors
    ///
    /// Returns a regex error if a marker is too large to compile.
    pub fn new(markers: &ResponseMarkers) -> Result<Self, regex::Error> {
        let prefix = regex::escape(&markers.front_prefix);
        let open = regex::escape(&markers.tag_open);
        let close = regex::escape(&markers.tag_close);

        Ok(Self {
            front_prefix: Regex::new(&format!("(?i){prefix}"))?,
            tag_open: Regex::new(&format!("(?i){open}"))?,
            tag_pair: Regex::new(&format!("(?i){open}(.*?){close}"))?,
        })
    }

    /// Parses every line of `raw`, in order.
    ///
    /// Lines without the front prefix are dropped. A line with the prefix
    /// but no tag markers still yields an entry with empty `tag_text`: the
    /// service answered for that card, it just had nothing to add.
    pub fn parse(&self, raw: &str) -> Vec<ParsedAnnotation> {
        raw.lines().filter_map(|line| self.parse_line(line)).collect()
    }

    fn parse_line(&self, line: &str) -> Option<ParsedAnnotation> {
        let head = match self.tag_open.find(line) {
            Some(open) => &line[..open.start()],
            None => line,
        };

        let prefix = self.front_prefix.find(head)?;
        let front_key = head[prefix.end()..].trim().to_string();

        let tag_text = self
            .tag_pair
            .captures(line)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().to_string())
            .unwrap_or_default();

        Some(ParsedAnnotation {
            front_key,
            tag_text,
        })
    }
}
