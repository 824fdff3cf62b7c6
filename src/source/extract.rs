//! Profile document extraction
//!
//! Turns a raw profile document (a JSON payload or an HTML page) into
//! [`ProfileFields`]. Several independent sources are consulted in
//! priority order and each field keeps the first value found:
//!
//! 1. Structured search over a JSON payload
//! 2. JSON blocks embedded in `<script>` tags
//! 3. Human readable summaries ("1.2K Followers, 300 Following, 40 Posts")
//! 4. Key pattern regexes over the raw text
//! 5. The generic preview image (`og:image`)
//!
//! Field names and patterns live in [`ExtractionRules`] so they can be
//! replaced without touching the control flow above.

use lazy_static::lazy_static;
use regex::Regex;
use scraper::{Html, Selector};
use serde_json::{Map, Value};

/// Minimum length of an image reference that counts as "found"
const MIN_USABLE_IMAGE_LEN: usize = 10;

/// Fractional digits honored by [`parse_count`]
const MAX_FRACTION_DIGITS: usize = 9;

// =============================================================================
// Extracted fields
// =============================================================================

/// Profile fields recovered from one document
///
/// `None` means "not found" so that later sources can fill the gap.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProfileFields {
    pub full_name: Option<String>,
    pub image_url: Option<String>,
    pub follower_count: Option<u64>,
    pub following_count: Option<u64>,
    pub post_count: Option<u64>,
    pub biography: Option<String>,
    pub is_private: Option<bool>,
    pub is_verified: Option<bool>,
}

impl ProfileFields {
    pub fn followers(&self) -> u64 {
        self.follower_count.unwrap_or(0)
    }

    pub fn following(&self) -> u64 {
        self.following_count.unwrap_or(0)
    }

    pub fn posts(&self) -> u64 {
        self.post_count.unwrap_or(0)
    }

    /// Whether a real image reference was found
    pub fn has_image(&self) -> bool {
        self.image_url
            .as_deref()
            .is_some_and(|url| url.trim().len() > MIN_USABLE_IMAGE_LEN)
    }

    /// A document yielded usable data if it has followers or an image
    pub fn is_usable(&self) -> bool {
        self.followers() > 0 || self.has_image()
    }

    /// Fill every missing field from `other`; present fields win
    pub fn fill_missing(&mut self, other: ProfileFields) {
        fn keep<T>(slot: &mut Option<T>, candidate: Option<T>) {
            if slot.is_none() {
                *slot = candidate;
            }
        }

        keep(&mut self.full_name, other.full_name);
        keep(&mut self.image_url, other.image_url);
        keep(&mut self.follower_count, other.follower_count);
        keep(&mut self.following_count, other.following_count);
        keep(&mut self.post_count, other.post_count);
        keep(&mut self.biography, other.biography);
        keep(&mut self.is_private, other.is_private);
        keep(&mut self.is_verified, other.is_verified);
    }

    fn is_complete(&self) -> bool {
        self.full_name.is_some()
            && self.image_url.is_some()
            && self.follower_count.is_some()
            && self.following_count.is_some()
            && self.post_count.is_some()
            && self.biography.is_some()
            && self.is_private.is_some()
            && self.is_verified.is_some()
    }
}

// =============================================================================
// Rules
// =============================================================================

lazy_static! {
    static ref SUMMARY_RE: Regex =
        Regex::new(r"(?i)(\d[\d,]*(?:\.\d+)?)\s*([km])?\s+(followers?|following|posts?)\b")
            .expect("summary regex is valid");
    static ref TITLE_NAME_RE: Regex =
        Regex::new(r"^\s*(.+?)\s*\(@([A-Za-z0-9._]+)\)").expect("title regex is valid");
    static ref FOLLOWER_PATTERNS: Vec<Regex> = compile(&[
        r#""edge_followed_by"\s*:\s*\{\s*"count"\s*:\s*(\d+)"#,
        r#""follower_count"\s*:\s*"?(\d+)"#,
        r#""followers_count"\s*:\s*"?(\d+)"#,
    ]);
    static ref FOLLOWING_PATTERNS: Vec<Regex> = compile(&[
        r#""edge_follow"\s*:\s*\{\s*"count"\s*:\s*(\d+)"#,
        r#""following_count"\s*:\s*"?(\d+)"#,
        r#""friends_count"\s*:\s*"?(\d+)"#,
    ]);
    static ref POST_PATTERNS: Vec<Regex> = compile(&[
        r#""edge_owner_to_timeline_media"\s*:\s*\{\s*"count"\s*:\s*(\d+)"#,
        r#""media_count"\s*:\s*"?(\d+)"#,
        r#""post_count"\s*:\s*"?(\d+)"#,
    ]);
    static ref BIOGRAPHY_PATTERNS: Vec<Regex> =
        compile(&[r#""biography"\s*:\s*"((?:[^"\\]|\\.)*)""#]);
    static ref FULL_NAME_PATTERNS: Vec<Regex> =
        compile(&[r#""full_name"\s*:\s*"((?:[^"\\]|\\.)*)""#]);
    static ref IMAGE_PATTERNS: Vec<Regex> = compile(&[
        r#""profile_pic_url_hd"\s*:\s*"((?:[^"\\]|\\.)*)""#,
        r#""profile_pic_url"\s*:\s*"((?:[^"\\]|\\.)*)""#,
    ]);
    static ref VERIFIED_PATTERNS: Vec<Regex> =
        compile(&[r#""is_verified"\s*:\s*(true|false)"#]);
    static ref PRIVATE_PATTERNS: Vec<Regex> = compile(&[r#""is_private"\s*:\s*(true|false)"#]);
}

fn compile(patterns: &[&str]) -> Vec<Regex> {
    patterns
        .iter()
        .map(|pattern| Regex::new(pattern).expect("fallback regex is valid"))
        .collect()
}

fn keys(names: &[&str]) -> Vec<String> {
    names.iter().map(|name| name.to_string()).collect()
}

/// Regexes run directly against the raw document text
///
/// Each list is tried in order and the first capture wins.
#[derive(Debug, Clone)]
pub struct FallbackPatterns {
    pub followers: Vec<Regex>,
    pub following: Vec<Regex>,
    pub posts: Vec<Regex>,
    pub biography: Vec<Regex>,
    pub full_name: Vec<Regex>,
    pub image: Vec<Regex>,
    pub verified: Vec<Regex>,
    pub private: Vec<Regex>,
}

impl Default for FallbackPatterns {
    fn default() -> Self {
        Self {
            followers: FOLLOWER_PATTERNS.clone(),
            following: FOLLOWING_PATTERNS.clone(),
            posts: POST_PATTERNS.clone(),
            biography: BIOGRAPHY_PATTERNS.clone(),
            full_name: FULL_NAME_PATTERNS.clone(),
            image: IMAGE_PATTERNS.clone(),
            verified: VERIFIED_PATTERNS.clone(),
            private: PRIVATE_PATTERNS.clone(),
        }
    }
}

/// Replaceable description of where profile data hides in a document
#[derive(Debug, Clone)]
pub struct ExtractionRules {
    /// Maximum nesting depth visited by the JSON search
    pub max_depth: usize,
    /// Keys whose string value identifies the profile owner
    pub identity_keys: Vec<String>,
    pub follower_keys: Vec<String>,
    pub following_keys: Vec<String>,
    pub post_keys: Vec<String>,
    pub name_keys: Vec<String>,
    pub image_keys: Vec<String>,
    pub biography_keys: Vec<String>,
    pub private_keys: Vec<String>,
    pub verified_keys: Vec<String>,
    /// Meta tags holding a human readable count summary
    pub summary_selectors: Vec<String>,
    /// Meta tags holding a generic preview image
    pub preview_image_selectors: Vec<String>,
    /// Meta tags holding a "Name (@handle)" title
    pub title_selectors: Vec<String>,
    pub fallback: FallbackPatterns,
}

impl Default for ExtractionRules {
    fn default() -> Self {
        Self {
            max_depth: 12,
            identity_keys: keys(&["username", "handle", "screen_name"]),
            follower_keys: keys(&[
                "edge_followed_by",
                "follower_count",
                "followers_count",
                "followers",
            ]),
            following_keys: keys(&[
                "edge_follow",
                "following_count",
                "friends_count",
                "following",
            ]),
            post_keys: keys(&[
                "edge_owner_to_timeline_media",
                "media_count",
                "post_count",
                "posts",
            ]),
            name_keys: keys(&["full_name", "display_name", "name"]),
            image_keys: keys(&[
                "profile_pic_url_hd",
                "profile_pic_url",
                "profile_image_url",
                "avatar_url",
            ]),
            biography_keys: keys(&["biography", "bio", "description"]),
            private_keys: keys(&["is_private", "protected"]),
            verified_keys: keys(&["is_verified", "verified"]),
            summary_selectors: keys(&[
                r#"meta[name="description"]"#,
                r#"meta[property="og:description"]"#,
                r#"meta[name="twitter:description"]"#,
            ]),
            preview_image_selectors: keys(&[
                r#"meta[property="og:image"]"#,
                r#"meta[name="twitter:image"]"#,
            ]),
            title_selectors: keys(&[r#"meta[property="og:title"]"#]),
            fallback: FallbackPatterns::default(),
        }
    }
}

// =============================================================================
// Extractor
// =============================================================================

/// Stateless document parser
#[derive(Debug, Clone, Default)]
pub struct Extractor {
    rules: ExtractionRules,
}

impl Extractor {
    pub fn new(rules: ExtractionRules) -> Self {
        Self { rules }
    }

    /// Extract profile fields from a raw document
    ///
    /// # Arguments
    /// * `document` - Response body (JSON or HTML)
    /// * `handle` - Normalized handle the document was requested for
    ///
    /// # Returns
    /// The merged fields, or `None` when neither followers nor a usable
    /// image could be recovered
    pub fn extract(&self, document: &str, handle: &str) -> Option<ProfileFields> {
        let mut fields = ProfileFields::default();
        let mut preview_image = None;

        match serde_json::from_str::<Value>(document.trim()) {
            Ok(payload) => {
                if let Some(found) = self.search_json(&payload, handle) {
                    tracing::debug!(handle = %handle, "Profile found in JSON payload");
                    fields.fill_missing(found);
                }
            }
            Err(_) => {
                let html = Html::parse_document(document);
                if let Some(found) = self.scan_scripts(&html, handle) {
                    tracing::debug!(handle = %handle, "Profile found in embedded script JSON");
                    fields.fill_missing(found);
                }
                if !fields.is_complete() {
                    fields.fill_missing(self.parse_meta(&html, document, handle));
                }
                preview_image = self.preview_image(&html);
            }
        }

        if !fields.is_complete() {
            fields.fill_missing(self.apply_fallback_patterns(document));
        }

        // The generic preview image only stands in when nothing better exists
        if !fields.has_image() && preview_image.is_some() {
            fields.image_url = preview_image;
        }

        if !fields.has_image() {
            fields.image_url = None;
        }

        if fields.is_usable() {
            Some(fields)
        } else {
            tracing::debug!(handle = %handle, "Document yielded no usable profile data");
            None
        }
    }

    // -------------------------------------------------------------------------
    // 1. Structured JSON search
    // -------------------------------------------------------------------------

    /// Find the profile node in a parsed JSON graph
    ///
    /// Prefers a node whose identity equals `handle`; otherwise the first
    /// node carrying an identity key and a count key wins.
    pub fn search_json(&self, payload: &Value, handle: &str) -> Option<ProfileFields> {
        let mut first = None;
        let node = self.walk(payload, handle, 0, &mut first).or(first)?;
        Some(self.fields_from_node(node))
    }

    fn walk<'a>(
        &self,
        value: &'a Value,
        handle: &str,
        depth: usize,
        first: &mut Option<&'a Map<String, Value>>,
    ) -> Option<&'a Map<String, Value>> {
        if depth > self.rules.max_depth {
            return None;
        }

        match value {
            Value::Object(map) => {
                if self.is_profile_node(map) {
                    if self.identity_matches(map, handle) {
                        return Some(map);
                    }
                    if first.is_none() {
                        *first = Some(map);
                    }
                }
                for child in map.values() {
                    if let Some(found) = self.walk(child, handle, depth + 1, first) {
                        return Some(found);
                    }
                }
                None
            }
            Value::Array(items) => {
                for item in items {
                    if let Some(found) = self.walk(item, handle, depth + 1, first) {
                        return Some(found);
                    }
                }
                None
            }
            _ => None,
        }
    }

    fn is_profile_node(&self, map: &Map<String, Value>) -> bool {
        let has_identity = self
            .rules
            .identity_keys
            .iter()
            .any(|key| map.get(key).is_some_and(Value::is_string));
        let has_count = self
            .rules
            .follower_keys
            .iter()
            .chain(&self.rules.following_keys)
            .chain(&self.rules.post_keys)
            .any(|key| map.get(key).and_then(json_count).is_some());
        has_identity && has_count
    }

    fn identity_matches(&self, map: &Map<String, Value>, handle: &str) -> bool {
        self.rules.identity_keys.iter().any(|key| {
            map.get(key)
                .and_then(Value::as_str)
                .is_some_and(|identity| identity.trim_start_matches('@').eq_ignore_ascii_case(handle))
        })
    }

    fn fields_from_node(&self, map: &Map<String, Value>) -> ProfileFields {
        let first_count =
            |keys: &[String]| keys.iter().find_map(|key| map.get(key).and_then(json_count));
        let first_text = |keys: &[String]| {
            keys.iter().find_map(|key| {
                map.get(key)
                    .and_then(Value::as_str)
                    .map(str::trim)
                    .filter(|text| !text.is_empty())
                    .map(str::to_string)
            })
        };
        let first_flag =
            |keys: &[String]| keys.iter().find_map(|key| map.get(key).and_then(Value::as_bool));

        ProfileFields {
            full_name: first_text(&self.rules.name_keys),
            image_url: first_text(&self.rules.image_keys),
            follower_count: first_count(&self.rules.follower_keys),
            following_count: first_count(&self.rules.following_keys),
            post_count: first_count(&self.rules.post_keys),
            biography: self.rules.biography_keys.iter().find_map(|key| {
                map.get(key).and_then(Value::as_str).map(str::to_string)
            }),
            is_private: first_flag(&self.rules.private_keys),
            is_verified: first_flag(&self.rules.verified_keys),
        }
    }

    // -------------------------------------------------------------------------
    // 2. Embedded script JSON
    // -------------------------------------------------------------------------

    fn scan_scripts(&self, html: &Html, handle: &str) -> Option<ProfileFields> {
        let selector = Selector::parse("script").ok()?;
        let mut partial: Option<ProfileFields> = None;

        for script in html.select(&selector) {
            let text: String = script.text().collect();
            let Some(candidate) = json_candidate(&text) else {
                continue;
            };
            let Ok(payload) = serde_json::from_str::<Value>(candidate) else {
                continue;
            };
            let Some(found) = self.search_json(&payload, handle) else {
                continue;
            };

            if found.followers() > 0 {
                let mut found = found;
                if let Some(earlier) = partial {
                    found.fill_missing(earlier);
                }
                return Some(found);
            }
            match partial.as_mut() {
                Some(existing) => existing.fill_missing(found),
                None => partial = Some(found),
            }
        }

        partial
    }

    // -------------------------------------------------------------------------
    // 3. Meta tags: summary text and title
    // -------------------------------------------------------------------------

    fn parse_meta(&self, html: &Html, document: &str, handle: &str) -> ProfileFields {
        let mut fields = ProfileFields::default();

        for content in meta_contents(html, &self.rules.summary_selectors) {
            fields.fill_missing(parse_summary_counts(&content));
        }
        if !document.contains('<') {
            fields.fill_missing(parse_summary_counts(document));
        }

        if fields.full_name.is_none() {
            fields.full_name = meta_contents(html, &self.rules.title_selectors)
                .iter()
                .find_map(|title| name_from_title(title, handle));
        }

        fields
    }

    // -------------------------------------------------------------------------
    // 5. Preview image, last resort
    // -------------------------------------------------------------------------

    fn preview_image(&self, html: &Html) -> Option<String> {
        meta_contents(html, &self.rules.preview_image_selectors)
            .into_iter()
            .map(|content| content.trim().to_string())
            .find(|content| !content.is_empty())
    }

    // -------------------------------------------------------------------------
    // 4. Key pattern fallbacks
    // -------------------------------------------------------------------------

    fn apply_fallback_patterns(&self, document: &str) -> ProfileFields {
        let text = html_escape::decode_html_entities(document);
        let patterns = &self.rules.fallback;

        let first_capture = |regexes: &[Regex]| {
            regexes.iter().find_map(|re| {
                re.captures(&text)
                    .and_then(|caps| caps.get(1))
                    .map(|m| m.as_str().to_string())
            })
        };
        let count = |regexes: &[Regex]| first_capture(regexes).and_then(|raw| parse_count(&raw));
        let text_field = |regexes: &[Regex]| {
            first_capture(regexes)
                .map(|raw| unescape_json_fragment(&raw))
                .filter(|value| !value.trim().is_empty())
        };
        let flag = |regexes: &[Regex]| first_capture(regexes).map(|raw| raw == "true");

        ProfileFields {
            full_name: text_field(&patterns.full_name),
            image_url: text_field(&patterns.image),
            follower_count: count(&patterns.followers),
            following_count: count(&patterns.following),
            post_count: count(&patterns.posts),
            biography: first_capture(&patterns.biography).map(|raw| unescape_json_fragment(&raw)),
            is_private: flag(&patterns.private),
            is_verified: flag(&patterns.verified),
        }
    }
}

// =============================================================================
// Helpers
// =============================================================================

/// Read a count from a JSON value: numbers, numeric strings or `{"count": n}`
fn json_count(value: &Value) -> Option<u64> {
    match value {
        Value::Number(number) => number
            .as_u64()
            .or_else(|| number.as_f64().filter(|f| *f >= 0.0).map(|f| f.floor() as u64)),
        Value::String(text) => parse_count(text),
        Value::Object(map) => map.get("count").and_then(json_count),
        _ => None,
    }
}

/// The JSON literal inside a script body, if any
///
/// Handles bare payloads (`{...}`) and assignments such as
/// `window._sharedData = {...};`.
fn json_candidate(script: &str) -> Option<&str> {
    let trimmed = script.trim().trim_end_matches(';').trim_end();
    if trimmed.starts_with('{') || trimmed.starts_with('[') {
        return Some(trimmed);
    }
    let start = trimmed.find('{')?;
    let end = trimmed.rfind('}')?;
    (end > start).then(|| &trimmed[start..=end])
}

fn meta_contents(html: &Html, selectors: &[String]) -> Vec<String> {
    selectors
        .iter()
        .filter_map(|raw| Selector::parse(raw).ok())
        .flat_map(|selector| {
            html.select(&selector)
                .filter_map(|element| element.value().attr("content"))
                .map(|content| html_escape::decode_html_entities(content).into_owned())
                .collect::<Vec<_>>()
        })
        .collect()
}

fn name_from_title(title: &str, handle: &str) -> Option<String> {
    let caps = TITLE_NAME_RE.captures(title)?;
    if !caps[2].eq_ignore_ascii_case(handle) {
        return None;
    }
    let name = caps[1].trim();
    (!name.is_empty()).then(|| name.to_string())
}

/// Parse a human readable count such as `1.2K`, `2M`, `10,500` or `950`
///
/// Thousands separators are stripped, `K`/`M` multiply by 1,000 and
/// 1,000,000, and any fractional remainder is floored.
pub fn parse_count(text: &str) -> Option<u64> {
    let cleaned: String = text
        .trim()
        .chars()
        .filter(|c| *c != ',' && !c.is_whitespace())
        .collect();

    let (number, multiplier) = match cleaned.chars().last()? {
        'k' | 'K' => (&cleaned[..cleaned.len() - 1], 1_000u128),
        'm' | 'M' => (&cleaned[..cleaned.len() - 1], 1_000_000u128),
        _ => (cleaned.as_str(), 1u128),
    };

    let (whole, fraction) = number.split_once('.').unwrap_or((number, ""));
    if whole.is_empty() || !whole.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    if !fraction.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }

    let whole: u128 = whole.parse().ok()?;
    let fraction = &fraction[..fraction.len().min(MAX_FRACTION_DIGITS)];
    let fractional_part = if fraction.is_empty() {
        0
    } else {
        let digits: u128 = fraction.parse().ok()?;
        digits * multiplier / 10u128.pow(fraction.len() as u32)
    };

    let total = whole.checked_mul(multiplier)?.checked_add(fractional_part)?;
    u64::try_from(total).ok()
}

/// Parse "`<number><suffix> <Label>`" triples for followers, following and posts
///
/// The first occurrence of each label wins.
pub fn parse_summary_counts(text: &str) -> ProfileFields {
    let mut fields = ProfileFields::default();

    for caps in SUMMARY_RE.captures_iter(text) {
        let raw = match caps.get(2) {
            Some(suffix) => format!("{}{}", &caps[1], suffix.as_str()),
            None => caps[1].to_string(),
        };
        let Some(count) = parse_count(&raw) else {
            continue;
        };

        let label = caps[3].to_ascii_lowercase();
        let slot = if label == "following" {
            &mut fields.following_count
        } else if label.starts_with("follower") {
            &mut fields.follower_count
        } else {
            &mut fields.post_count
        };
        if slot.is_none() {
            *slot = Some(count);
        }
    }

    fields
}

/// Decode a JSON-escaped string fragment (`\n`, `\"`, `&`, ...)
pub fn unescape_json_fragment(raw: &str) -> String {
    serde_json::from_str::<String>(&format!("\"{raw}\"")).unwrap_or_else(|_| {
        raw.replace("\\n", "\n")
            .replace("\\\"", "\"")
            .replace("\\/", "/")
            .replace("\\u0026", "&")
            .replace("\\\\", "\\")
    })
}
