/// The pluggable collaborators behind each role's "do the work" step. These
/// are the opaque ABC-parsing/vector-index/HTTP-fetch libraries kept out of
/// scope as external dependencies; the defaults here are real enough to run
/// the whole pipeline end-to-end but are explicitly stand-ins, not the
/// production libraries.

use std::error::Error as _;

use async_trait::async_trait;

use crawl_protocol::messages::{ErrorKind, FetchOutcome, ParseOutcome, ParsedTune};

#[async_trait]
pub trait FetchBackend: Send + Sync {
    async fn fetch(&self, url: &str) -> FetchOutcome;
}

pub trait ParseBackend: Send + Sync {
    fn parse(&self, document: &str) -> ParseOutcome;
}

pub trait IndexBackend: Send + Sync {
    fn index(&self, pitches: &str) -> Result<Vec<i32>, String>;
}

/// Real HTTP fetch with link extraction, built on the same `reqwest` +
/// `scraper` pairing the teacher's retrieval pack uses for this job.
pub struct ReqwestFetchBackend {
    client: reqwest::Client,
}

impl ReqwestFetchBackend {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::builder()
                .user_agent("abc-crawl-worker/0.1")
                .timeout(std::time::Duration::from_secs(20))
                .build()
                .expect("reqwest client config is static and known-valid"),
        }
    }
}

impl Default for ReqwestFetchBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl FetchBackend for ReqwestFetchBackend {
    async fn fetch(&self, url: &str) -> FetchOutcome {
        let response = match self.client.get(url).send().await {
            Ok(resp) => resp,
            Err(e) if e.is_timeout() => {
                return FetchOutcome::Error { kind: ErrorKind::Timeout, detail: e.to_string() }
            }
            Err(e) if e.is_connect() && looks_like_dns_failure(&e) => {
                return FetchOutcome::Error { kind: ErrorKind::DnsPermanent, detail: e.to_string() }
            }
            Err(e) => return FetchOutcome::Error { kind: ErrorKind::Transient, detail: e.to_string() },
        };

        let http_status = response.status().as_u16();
        let mime_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("application/octet-stream")
            .to_string();

        if !response.status().is_success() {
            let kind = if response.status().is_client_error() {
                ErrorKind::Terminal
            } else {
                ErrorKind::Transient
            };
            return FetchOutcome::Error { kind, detail: format!("http {http_status}") };
        }

        let body = match response.text().await {
            Ok(b) => b,
            Err(e) => return FetchOutcome::Error { kind: ErrorKind::Transient, detail: e.to_string() },
        };
        let size_bytes = body.len() as u64;
        let links = extract_links(url, &body, &mime_type);

        FetchOutcome::Success { http_status, mime_type, size_bytes, body, links }
    }
}

fn looks_like_dns_failure(err: &reqwest::Error) -> bool {
    err.source().map(|s| s.to_string().contains("dns error") || s.to_string().contains("failed to lookup address")).unwrap_or(false)
}

fn extract_links(base: &str, body: &str, mime_type: &str) -> Vec<String> {
    if !mime_type.contains("html") {
        return Vec::new();
    }
    let Ok(base_url) = url::Url::parse(base) else { return Vec::new() };
    let document = scraper::Html::parse_document(body);
    let Ok(selector) = scraper::Selector::parse("a[href]") else { return Vec::new() };
    document
        .select(&selector)
        .filter_map(|el| el.value().attr("href"))
        .filter_map(|href| base_url.join(href).ok())
        .filter(|u| u.scheme() == "http" || u.scheme() == "https")
        .map(|u| u.to_string())
        .collect()
}

/// Splits an ABC document on `X:` tune headers and pulls the handful of
/// fields the index step needs. Not a conformant ABC parser — it reads the
/// `T:`/`C:`/`K:`/`R:` header lines and treats the rest of each tune's block
/// as its body, extracting a pitch-letter sequence good enough to compute a
/// semitone-interval fingerprint from.
pub struct SimpleAbcParseBackend;

impl ParseBackend for SimpleAbcParseBackend {
    fn parse(&self, document: &str) -> ParseOutcome {
        let blocks = split_tunes(document);
        if blocks.is_empty() {
            return ParseOutcome::Error {
                kind: ErrorKind::ParseFailure,
                detail: "no X: tune header found".to_string(),
            };
        }

        let tunes = blocks.into_iter().map(|block| parse_one_tune(&block)).collect();
        ParseOutcome::Success { tunes }
    }
}

fn split_tunes(document: &str) -> Vec<String> {
    let mut blocks = Vec::new();
    let mut current = String::new();
    for line in document.lines() {
        if line.starts_with("X:") && !current.trim().is_empty() {
            blocks.push(std::mem::take(&mut current));
        }
        current.push_str(line);
        current.push('\n');
    }
    if !current.trim().is_empty() {
        blocks.push(current);
    }
    blocks
}

fn parse_one_tune(block: &str) -> ParsedTune {
    let mut title = String::new();
    let mut composer = String::new();
    let mut key = String::new();
    let mut rhythm = String::new();
    let mut body_lines = Vec::new();

    for line in block.lines() {
        if let Some(rest) = line.strip_prefix("T:") {
            if title.is_empty() {
                title = rest.trim().to_string();
            }
        } else if let Some(rest) = line.strip_prefix("C:") {
            composer = rest.trim().to_string();
        } else if let Some(rest) = line.strip_prefix("K:") {
            key = rest.trim().to_string();
        } else if let Some(rest) = line.strip_prefix("R:") {
            rhythm = rest.trim().to_string();
        } else if !line.starts_with("X:") && !line.contains(':') {
            body_lines.push(line);
        } else if line.len() > 1 && line.as_bytes()[1] != b':' {
            body_lines.push(line);
        }
    }

    let tune_body = body_lines.join("\n");
    let pitches = extract_pitch_sequence(&tune_body);

    ParsedTune { title, composer, key, rhythm, tune_body, pitches }
}

/// Reads the letters A-G (with `,`/`'` octave marks folded into MIDI-ish
/// note numbers relative to middle C) out of an ABC body line, ignoring
/// bar lines, decorations, and lyrics — good enough to feed a
/// semitone-interval index.
fn extract_pitch_sequence(body: &str) -> String {
    const BASE: [(u8, i32); 7] =
        [(b'C', 0), (b'D', 2), (b'E', 4), (b'F', 5), (b'G', 7), (b'A', 9), (b'B', 11)];

    let mut pitches = Vec::new();
    let mut chars = body.chars().peekable();
    while let Some(c) = chars.next() {
        let upper = c.to_ascii_uppercase();
        let Some(&(_, semitone)) = BASE.iter().find(|(letter, _)| *letter == upper as u8) else {
            continue;
        };
        let octave_shift = if c.is_ascii_lowercase() { 12 } else { 0 };
        let mut shift = 0i32;
        while let Some(&next) = chars.peek() {
            match next {
                '\'' => {
                    shift += 12;
                    chars.next();
                }
                ',' => {
                    shift -= 12;
                    chars.next();
                }
                _ => break,
            }
        }
        pitches.push((60 + semitone + octave_shift + shift).to_string());
    }
    pitches.join(",")
}

/// Semitone-delta fingerprint: the sequence of intervals between
/// consecutive pitches, transposition-invariant by construction.
pub struct SemitoneIndexBackend;

impl IndexBackend for SemitoneIndexBackend {
    fn index(&self, pitches: &str) -> Result<Vec<i32>, String> {
        let notes: Result<Vec<i32>, _> =
            pitches.split(',').filter(|s| !s.is_empty()).map(|s| s.parse::<i32>()).collect();
        let notes = notes.map_err(|e| format!("malformed pitch sequence: {e}"))?;
        if notes.len() < 2 {
            return Ok(Vec::new());
        }
        Ok(notes.windows(2).map(|pair| pair[1] - pair[0]).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extract_pitch_sequence_reads_letters_and_octave_marks() {
        let pitches = extract_pitch_sequence("CDE c' G,");
        assert_eq!(pitches, "60,62,64,84,67");
    }

    #[test]
    fn parse_one_tune_reads_headers_and_body() {
        let tune = parse_one_tune("X:1\nT:The Reel\nK:Gmaj\nR:Reel\nCDE FGA|\n");
        assert_eq!(tune.title, "The Reel");
        assert_eq!(tune.key, "Gmaj");
        assert_eq!(tune.rhythm, "Reel");
        assert!(!tune.pitches.is_empty());
    }

    #[test]
    fn split_tunes_separates_on_repeated_x_headers() {
        let doc = "X:1\nT:A\nK:C\nCDE|\nX:2\nT:B\nK:D\nDEF|\n";
        assert_eq!(split_tunes(doc).len(), 2);
    }

    #[test]
    fn parse_rejects_a_document_with_no_tune_header() {
        let backend = SimpleAbcParseBackend;
        let outcome = backend.parse("just some html, not abc at all");
        assert!(matches!(outcome, ParseOutcome::Error { kind: ErrorKind::ParseFailure, .. }));
    }

    #[test]
    fn index_computes_semitone_deltas() {
        let backend = SemitoneIndexBackend;
        let intervals = backend.index("60,62,64").unwrap();
        assert_eq!(intervals, vec![2, 2]);
    }

    #[test]
    fn index_of_a_single_note_has_no_intervals() {
        let backend = SemitoneIndexBackend;
        assert_eq!(backend.index("60").unwrap(), Vec::<i32>::new());
    }

    #[test]
    fn index_rejects_malformed_pitches() {
        let backend = SemitoneIndexBackend;
        assert!(backend.index("60,not-a-number").is_err());
    }
}
