//! Wire protocol with the recognition service.
//!
//! Events are JSON objects, one per line, tagged by a `type` field. Any
//! inbound event arriving mid-session counts as a frame acknowledgement
//! for the backpressure budget; `frame_processed` is the explicit backstop
//! for frames that produced no face-specific events.

use serde::{Deserialize, Serialize};

/// Outbound messages.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    StartRecognition {
        intakes: Vec<String>,
        courses: Vec<String>,
    },
    ProcessFrame {
        /// Base64-encoded JPEG at processing resolution.
        image: String,
        /// Capture time, milliseconds since the Unix epoch.
        timestamp: u64,
    },
    StopRecognition,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AckStatus {
    Success,
    Error,
}

/// Inbound events. The `name` field always has the form
/// `<displayName>_<studentId>`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    Ack {
        status: AckStatus,
        #[serde(default)]
        message: Option<String>,
    },
    Recognition {
        name: String,
        similarity: f32,
        #[serde(rename = "box")]
        bbox: [f32; 4],
        /// Cohort of the matched student, when the service reports it.
        #[serde(default)]
        intake: Option<String>,
        #[serde(default)]
        course: Option<String>,
    },
    BelowThresholdMatch {
        name: String,
        similarity: f32,
        #[serde(rename = "box")]
        bbox: [f32; 4],
        #[serde(default)]
        threshold: Option<f32>,
    },
    UnrecognizedFace {
        #[serde(rename = "box")]
        bbox: [f32; 4],
        #[serde(default)]
        error: Option<String>,
    },
    /// Informational only; carries no identity.
    FaceDetected {
        #[serde(rename = "box", default)]
        bbox: Option<[f32; 4]>,
    },
    /// Explicit acknowledgement for a frame with no face payload.
    FrameProcessed,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recognition_event_decodes() {
        let line = r#"{"type":"recognition","name":"John_S2001","similarity":0.9,"box":[10,10,40,40],"intake":"Intake 40","course":"Computer Science"}"#;
        let ev: ServerEvent = serde_json::from_str(line).unwrap();
        match ev {
            ServerEvent::Recognition {
                name,
                similarity,
                bbox,
                intake,
                course,
            } => {
                assert_eq!(name, "John_S2001");
                assert!((similarity - 0.9).abs() < 1e-6);
                assert_eq!(bbox, [10.0, 10.0, 40.0, 40.0]);
                assert_eq!(intake.as_deref(), Some("Intake 40"));
                assert_eq!(course.as_deref(), Some("Computer Science"));
            }
            other => panic!("wrong variant: {other:?}"),
        }
    }

    #[test]
    fn test_below_threshold_without_threshold_field() {
        let line = r#"{"type":"below_threshold_match","name":"Ana_S1","similarity":0.6,"box":[0,0,10,10]}"#;
        let ev: ServerEvent = serde_json::from_str(line).unwrap();
        assert!(matches!(
            ev,
            ServerEvent::BelowThresholdMatch { threshold: None, .. }
        ));
    }

    #[test]
    fn test_frame_processed_and_face_detected() {
        assert!(matches!(
            serde_json::from_str(r#"{"type":"frame_processed"}"#).unwrap(),
            ServerEvent::FrameProcessed
        ));
        assert!(matches!(
            serde_json::from_str(r#"{"type":"face_detected"}"#).unwrap(),
            ServerEvent::FaceDetected { bbox: None }
        ));
    }

    #[test]
    fn test_ack_statuses() {
        let ok: ServerEvent =
            serde_json::from_str(r#"{"type":"ack","status":"success"}"#).unwrap();
        assert!(matches!(
            ok,
            ServerEvent::Ack {
                status: AckStatus::Success,
                message: None
            }
        ));
        let err: ServerEvent =
            serde_json::from_str(r#"{"type":"ack","status":"error","message":"no embeddings"}"#)
                .unwrap();
        assert!(matches!(err, ServerEvent::Ack { status: AckStatus::Error, .. }));
    }

    #[test]
    fn test_unknown_event_type_is_an_error() {
        assert!(serde_json::from_str::<ServerEvent>(r#"{"type":"mystery"}"#).is_err());
    }

    #[test]
    fn test_client_message_tags() {
        let msg = ClientMessage::StartRecognition {
            intakes: vec!["Intake 40".into()],
            courses: vec!["Computer Science".into()],
        };
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains(r#""type":"start_recognition""#));

        let stop = serde_json::to_string(&ClientMessage::StopRecognition).unwrap();
        assert_eq!(stop, r#"{"type":"stop_recognition"}"#);
    }
}
