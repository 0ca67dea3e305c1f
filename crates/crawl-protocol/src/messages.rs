/// Closed message set for the worker <-> Dispatcher socket protocol.
///
/// Every message is internally tagged on `type` and carries a protocol
/// version `v`. A peer that sees an unrecognized tag, or any `v` other than
/// [`crate::PROTOCOL_VERSION`], must close the connection — there is no
/// forward-compatibility story here, by design.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// The three worker roles. A connection carries exactly one, declared in
/// its first `HELLO`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerRole {
    Fetcher,
    Parser,
    Indexer,
}

impl WorkerRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkerRole::Fetcher => "fetcher",
            WorkerRole::Parser => "parser",
            WorkerRole::Indexer => "indexer",
        }
    }
}

impl std::str::FromStr for WorkerRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "fetcher" => Ok(WorkerRole::Fetcher),
            "parser" => Ok(WorkerRole::Parser),
            "indexer" => Ok(WorkerRole::Indexer),
            other => Err(format!("unknown worker role: {other}")),
        }
    }
}

/// Messages a worker sends to the Dispatcher.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    Hello { v: u8, role: WorkerRole, id: String },
    Request { v: u8 },
    Result { v: u8, assignment_id: u64, outcome: Outcome },
    Ping { v: u8 },
}

/// Messages the Dispatcher sends to a worker.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    Assign { v: u8, assignment_id: u64, payload: AssignmentPayload },
    Idle { v: u8, backoff_ms: u64 },
    Shutdown { v: u8 },
}

/// The work handed to a worker in an `ASSIGN`, one variant per role.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AssignmentPayload {
    Fetch { url_id: i64, url: String },
    Parse { url_id: i64, document: String },
    Index { tunebook_id: i64, tunes: Vec<TuneForIndex> },
}

/// A tune row handed to the Indexer so it can compute an interval vector.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TuneForIndex {
    pub tune_id: i64,
    pub pitches: String,
}

/// The result a worker reports back for an assignment, one variant per role.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Outcome {
    Fetch(FetchOutcome),
    Parse(ParseOutcome),
    Index(IndexOutcome),
}

/// Error kinds a worker can report; drives the Dispatcher's retry ladder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Request timed out. Tracked separately from other transient failures
    /// because a consecutive-timeout streak on one host disables it.
    Timeout,
    /// Connection refused/reset, 5xx — retryable, doesn't count toward the
    /// timeout-disable streak.
    Transient,
    /// NXDOMAIN or otherwise permanent DNS resolution failure.
    DnsPermanent,
    /// 4xx response — terminal for this URL, never retried.
    Terminal,
    /// Malformed/empty document where ABC content was expected.
    ParseFailure,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum FetchOutcome {
    Success {
        http_status: u16,
        mime_type: String,
        size_bytes: u64,
        body: String,
        links: Vec<String>,
    },
    Error {
        kind: ErrorKind,
        detail: String,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParsedTune {
    pub title: String,
    pub composer: String,
    pub key: String,
    pub rhythm: String,
    pub tune_body: String,
    pub pitches: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ParseOutcome {
    Success { tunes: Vec<ParsedTune> },
    Error { kind: ErrorKind, detail: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum IndexOutcome {
    /// Tune id -> computed interval vector (comma-joined on the wire by
    /// the caller; kept as a typed vector here).
    Success { intervals_by_tune: HashMap<i64, Vec<i32>> },
    Error { kind: ErrorKind, detail: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::PROTOCOL_VERSION;

    #[test]
    fn hello_roundtrips_through_json() {
        let msg = ClientMessage::Hello {
            v: PROTOCOL_VERSION,
            role: WorkerRole::Fetcher,
            id: "fetcher-1".to_string(),
        };
        let json = serde_json::to_string(&msg).unwrap();
        let back: ClientMessage = serde_json::from_str(&json).unwrap();
        match back {
            ClientMessage::Hello { role, id, .. } => {
                assert_eq!(role, WorkerRole::Fetcher);
                assert_eq!(id, "fetcher-1");
            }
            _ => panic!("wrong variant"),
        }
    }

    #[test]
    fn assign_fetch_roundtrips() {
        let msg = ServerMessage::Assign {
            v: PROTOCOL_VERSION,
            assignment_id: 42,
            payload: AssignmentPayload::Fetch {
                url_id: 7,
                url: "http://h1/x.abc".to_string(),
            },
        };
        let json = serde_json::to_string(&msg).unwrap();
        let back: ServerMessage = serde_json::from_str(&json).unwrap();
        match back {
            ServerMessage::Assign { assignment_id, payload, .. } => {
                assert_eq!(assignment_id, 42);
                match payload {
                    AssignmentPayload::Fetch { url_id, url } => {
                        assert_eq!(url_id, 7);
                        assert_eq!(url, "http://h1/x.abc");
                    }
                    _ => panic!("wrong payload"),
                }
            }
            _ => panic!("wrong variant"),
        }
    }

    #[test]
    fn unknown_tag_fails_to_parse() {
        let raw = r#"{"type":"teleport","v":1}"#;
        let result: Result<ClientMessage, _> = serde_json::from_str(raw);
        assert!(result.is_err());
    }
}
