//! Turn stream protocol
//!
//! One ordered sequence of frames per turn: `start`, then any mix of raw
//! answer `text` and typed `data` events, then a terminal `finish`. Every frame
//! carries the turn id and a sequence number so the client can apply each
//! frame exactly once.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::OrchestrationError;
use crate::models::SearchResults;
use crate::ticker::Ticker;
use crate::Result;

// ===== Event Payloads =====

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusData {
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TickerData {
    pub symbol: Ticker,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FollowupData {
    pub questions: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorData {
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
}

/// Typed event carried by a `data` frame
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    Status(StatusData),
    Sources(SearchResults),
    Ticker(TickerData),
    Followup(FollowupData),
    Error(ErrorData),
}

impl StreamEvent {
    pub fn status(message: impl Into<String>) -> Self {
        Self::Status(StatusData {
            message: message.into(),
        })
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Status(_) => "status",
            Self::Sources(_) => "sources",
            Self::Ticker(_) => "ticker",
            Self::Followup(_) => "followup",
            Self::Error(_) => "error",
        }
    }

    /// Persistent events survive into the turn snapshot.
    pub fn is_persistent(&self) -> bool {
        matches!(self, Self::Sources(_) | Self::Ticker(_) | Self::Followup(_))
    }

    fn payload(&self) -> Result<Value> {
        let value = match self {
            Self::Status(d) => serde_json::to_value(d)?,
            Self::Sources(d) => serde_json::to_value(d)?,
            Self::Ticker(d) => serde_json::to_value(d)?,
            Self::Followup(d) => serde_json::to_value(d)?,
            Self::Error(d) => serde_json::to_value(d)?,
        };
        Ok(value)
    }

    fn from_payload(kind: &str, data: Value) -> Result<Self> {
        let event = match kind {
            "status" => Self::Status(serde_json::from_value(data)?),
            "sources" => Self::Sources(serde_json::from_value(data)?),
            "ticker" => Self::Ticker(serde_json::from_value(data)?),
            "followup" => Self::Followup(serde_json::from_value(data)?),
            "error" => Self::Error(serde_json::from_value(data)?),
            other => {
                return Err(OrchestrationError::Protocol(format!(
                    "unknown event type: {}",
                    other
                )))
            }
        };
        Ok(event)
    }
}

// ===== Frames =====

#[derive(Debug, Clone, PartialEq)]
pub enum FrameBody {
    Start,
    Text(String),
    Data { id: String, event: StreamEvent },
    Finish,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub seq: u64,
    pub turn: Uuid,
    pub body: FrameBody,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
enum FrameKind {
    Start,
    Text,
    Data,
    Finish,
}

/// Flat NDJSON shape of a frame
#[derive(Debug, Serialize, Deserialize)]
struct WireFrame {
    seq: u64,
    turn: Uuid,
    frame: FrameKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    event_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    transient: Option<bool>,
}

impl Frame {
    /// Encode as one NDJSON line, newline included.
    pub fn to_ndjson(&self) -> Result<String> {
        let mut wire = WireFrame {
            seq: self.seq,
            turn: self.turn,
            frame: FrameKind::Start,
            text: None,
            event_type: None,
            id: None,
            data: None,
            transient: None,
        };

        match &self.body {
            FrameBody::Start => {}
            FrameBody::Text(text) => {
                wire.frame = FrameKind::Text;
                wire.text = Some(text.clone());
            }
            FrameBody::Data { id, event } => {
                wire.frame = FrameKind::Data;
                wire.event_type = Some(event.kind().to_string());
                wire.id = Some(id.clone());
                wire.data = Some(event.payload()?);
                wire.transient = Some(!event.is_persistent());
            }
            FrameBody::Finish => wire.frame = FrameKind::Finish,
        }

        let mut line = serde_json::to_string(&wire)?;
        line.push('\n');
        Ok(line)
    }

    pub fn from_ndjson(line: &str) -> Result<Self> {
        let wire: WireFrame = serde_json::from_str(line.trim())?;

        let body = match wire.frame {
            FrameKind::Start => FrameBody::Start,
            FrameKind::Finish => FrameBody::Finish,
            FrameKind::Text => FrameBody::Text(wire.text.unwrap_or_default()),
            FrameKind::Data => {
                let kind = wire.event_type.ok_or_else(|| {
                    OrchestrationError::Protocol("data frame without type".to_string())
                })?;
                let event = StreamEvent::from_payload(&kind, wire.data.unwrap_or(Value::Null))?;
                FrameBody::Data {
                    id: wire.id.unwrap_or_default(),
                    event,
                }
            }
        };

        Ok(Self {
            seq: wire.seq,
            turn: wire.turn,
            body,
        })
    }
}

// ===== Writer =====

/// Single serialized writer for one turn's frame sequence.
///
/// A failed send means the receiving side went away; callers treat it as a
/// cancelled turn and stop producing. Once the cancellation token fires no
/// further frame is written.
pub struct EventWriter {
    tx: mpsc::Sender<Frame>,
    turn: Uuid,
    next_seq: u64,
    id_counters: HashMap<&'static str, u32>,
    cancel: CancellationToken,
}

impl EventWriter {
    pub fn new(tx: mpsc::Sender<Frame>, turn: Uuid) -> Self {
        Self {
            tx,
            turn,
            next_seq: 0,
            id_counters: HashMap::new(),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn turn(&self) -> Uuid {
        self.turn
    }

    /// Frames written so far
    pub fn written(&self) -> u64 {
        self.next_seq
    }

    pub async fn start(&mut self) -> Result<()> {
        self.send(FrameBody::Start).await
    }

    pub async fn text(&mut self, delta: impl Into<String>) -> Result<()> {
        self.send(FrameBody::Text(delta.into())).await
    }

    pub async fn event(&mut self, event: StreamEvent) -> Result<()> {
        let kind = event.kind();
        let counter = self.id_counters.entry(kind).or_insert(0);
        *counter += 1;
        let id = format!("{}-{}", kind, counter);
        self.send(FrameBody::Data { id, event }).await
    }

    pub async fn finish(&mut self) -> Result<()> {
        self.send(FrameBody::Finish).await
    }

    async fn send(&mut self, body: FrameBody) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(OrchestrationError::Cancelled);
        }
        let frame = Frame {
            seq: self.next_seq,
            turn: self.turn,
            body,
        };

        // a full channel must not hold a frame past cancellation
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return Err(OrchestrationError::Cancelled),
            sent = self.tx.send(frame) => sent.map_err(|_| OrchestrationError::Cancelled)?,
        }
        self.next_seq += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Source;
    use tokio_test::{assert_err, assert_ok};

    #[tokio::test]
    async fn test_writer_sequences_and_ids() {
        let (tx, mut rx) = mpsc::channel(16);
        let turn = Uuid::new_v4();
        let mut writer = EventWriter::new(tx, turn);

        writer.start().await.unwrap();
        writer.event(StreamEvent::status("one")).await.unwrap();
        writer.event(StreamEvent::status("two")).await.unwrap();
        writer.text("Paris").await.unwrap();
        writer.finish().await.unwrap();
        assert_eq!(writer.written(), 5);
        drop(writer);

        let mut frames = Vec::new();
        while let Some(f) = rx.recv().await {
            frames.push(f);
        }

        let seqs: Vec<u64> = frames.iter().map(|f| f.seq).collect();
        assert_eq!(seqs, vec![0, 1, 2, 3, 4]);
        assert!(frames.iter().all(|f| f.turn == turn));
        assert_eq!(frames[0].body, FrameBody::Start);
        match &frames[2].body {
            FrameBody::Data { id, .. } => assert_eq!(id, "status-2"),
            other => panic!("unexpected frame {:?}", other),
        }
        assert_eq!(frames[4].body, FrameBody::Finish);
    }

    #[tokio::test]
    async fn test_closed_channel_is_cancellation() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let mut writer = EventWriter::new(tx, Uuid::new_v4());

        let err = assert_err!(writer.start().await);
        assert!(matches!(err, OrchestrationError::Cancelled));
        assert_eq!(writer.written(), 0);
    }

    #[tokio::test]
    async fn test_nothing_written_after_cancel() {
        let (tx, mut rx) = mpsc::channel(4);
        let cancel = CancellationToken::new();
        let mut writer = EventWriter::new(tx, Uuid::new_v4()).with_cancellation(cancel.clone());

        assert_ok!(writer.start().await);
        cancel.cancel();
        assert_err!(writer.text("late").await);
        drop(writer);

        assert_eq!(rx.recv().await.map(|f| f.body), Some(FrameBody::Start));
        assert!(rx.recv().await.is_none());
    }

    #[test]
    fn test_data_frame_wire_shape() {
        let frame = Frame {
            seq: 3,
            turn: Uuid::nil(),
            body: FrameBody::Data {
                id: "sources-1".into(),
                event: StreamEvent::Sources(SearchResults {
                    sources: vec![Source {
                        url: "https://example.com".into(),
                        title: "Example".into(),
                        ..Default::default()
                    }],
                    ..Default::default()
                }),
            },
        };

        let line = frame.to_ndjson().unwrap();
        assert!(line.ends_with('\n'));

        let value: Value = serde_json::from_str(&line).unwrap();
        assert_eq!(value["frame"], "data");
        assert_eq!(value["type"], "sources");
        assert_eq!(value["transient"], false);
        assert_eq!(value["data"]["sources"][0]["url"], "https://example.com");
        assert!(value["data"]["newsResults"].as_array().unwrap().is_empty());
        assert!(value["data"]["imageResults"].as_array().unwrap().is_empty());

        assert_eq!(Frame::from_ndjson(&line).unwrap(), frame);
    }

    #[test]
    fn test_error_payload_uses_status_code_key() {
        let frame = Frame {
            seq: 1,
            turn: Uuid::nil(),
            body: FrameBody::Data {
                id: "error-1".into(),
                event: StreamEvent::Error(ErrorData {
                    error: "Rate Limit Reached".into(),
                    suggestion: None,
                    status_code: Some(429),
                }),
            },
        };

        let value: Value = serde_json::from_str(&frame.to_ndjson().unwrap()).unwrap();
        assert_eq!(value["transient"], true);
        assert_eq!(value["data"]["statusCode"], 429);
        assert!(value["data"].get("suggestion").is_none());
    }

    #[test]
    fn test_unknown_event_type_rejected() {
        let line = format!(
            r#"{{"seq":0,"turn":"{}","frame":"data","type":"weather","id":"w-1","data":{{}}}}"#,
            Uuid::nil()
        );
        let err = Frame::from_ndjson(&line).unwrap_err();
        assert!(matches!(err, OrchestrationError::Protocol(_)));
    }

    #[test]
    fn test_invalid_ticker_rejected_on_decode() {
        let line = format!(
            r#"{{"seq":0,"turn":"{}","frame":"data","type":"ticker","id":"ticker-1","data":{{"symbol":"LSE:VOD"}}}}"#,
            Uuid::nil()
        );
        assert!(Frame::from_ndjson(&line).is_err());
    }
}
