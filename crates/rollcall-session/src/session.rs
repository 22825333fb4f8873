//! The session actor — single owner of all mutable attendance state.
//!
//! All state mutation happens on one task: commands from the host, inbound
//! recognition events, sampled frames and the render tick are folded into
//! the tracker and ledger through explicit messages, so the render path
//! never waits on network I/O and no locking is needed around the tier
//! maps.

use crate::budget::FrameBudget;
use crate::config::SessionConfig;
use crate::sampler::{start_sampling, EncodedFrame, SamplerConfig, SamplerHandle};
use crate::transport::{Connection, ConnectionError};
use crate::wire::{AckStatus, ClientMessage, ServerEvent};
use base64::prelude::BASE64_STANDARD;
use base64::Engine as _;
use chrono::Utc;
use rollcall_core::{
    parse_label, AttendanceEntry, AttendanceLedger, CentroidMatcher, EligibilityFilter,
    Observation, Track, Tracker,
};
use rollcall_video::{RgbFrame, VideoProvider};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::MissedTickBehavior;

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("a session is already running")]
    AlreadyRunning,
    #[error("connection error: {0}")]
    Connection(#[from] ConnectionError),
    #[error("recognition service rejected the session: {0}")]
    StartRejected(String),
    #[error("video acquisition failed: {0}")]
    Acquisition(#[from] rollcall_video::AcquisitionError),
    #[error("session task exited")]
    ChannelClosed,
}

/// Session lifecycle. Exactly one session is active at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Starting,
    Running,
    Stopping,
}

#[derive(Debug, Clone)]
pub struct SessionStatus {
    pub state: SessionState,
    pub attendance_count: usize,
    /// Most recent unsolicited failure (e.g. mid-session connection loss).
    pub last_error: Option<String>,
}

enum SessionCommand {
    Start {
        intakes: Vec<String>,
        courses: Vec<String>,
        reply: oneshot::Sender<Result<(), SessionError>>,
    },
    Stop {
        reply: oneshot::Sender<()>,
    },
    Roll {
        reply: oneshot::Sender<Vec<AttendanceEntry>>,
    },
    Summary {
        reply: oneshot::Sender<HashMap<String, usize>>,
    },
    Status {
        reply: oneshot::Sender<SessionStatus>,
    },
}

/// Clone-safe handle to the session actor.
#[derive(Clone)]
pub struct SessionHandle {
    tx: mpsc::Sender<SessionCommand>,
    tracks: watch::Receiver<Vec<Track>>,
    preview: watch::Receiver<Option<RgbFrame>>,
}

impl SessionHandle {
    /// Start a session for the given cohorts. Fails if one is already
    /// running, the service is unreachable, or the camera cannot be
    /// acquired. All of these are recoverable and the caller may retry.
    pub async fn start(
        &self,
        intakes: Vec<String>,
        courses: Vec<String>,
    ) -> Result<(), SessionError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(SessionCommand::Start {
                intakes,
                courses,
                reply,
            })
            .await
            .map_err(|_| SessionError::ChannelClosed)?;
        rx.await.map_err(|_| SessionError::ChannelClosed)?
    }

    /// Stop the active session. Idempotent; a no-op when already idle.
    pub async fn stop(&self) -> Result<(), SessionError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(SessionCommand::Stop { reply })
            .await
            .map_err(|_| SessionError::ChannelClosed)?;
        rx.await.map_err(|_| SessionError::ChannelClosed)
    }

    /// Chronological attendance roll for the current/most recent session.
    pub async fn attendance_roll(&self) -> Result<Vec<AttendanceEntry>, SessionError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(SessionCommand::Roll { reply })
            .await
            .map_err(|_| SessionError::ChannelClosed)?;
        rx.await.map_err(|_| SessionError::ChannelClosed)
    }

    /// Derived cohort-key → present-count mapping.
    pub async fn summary(&self) -> Result<HashMap<String, usize>, SessionError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(SessionCommand::Summary { reply })
            .await
            .map_err(|_| SessionError::ChannelClosed)?;
        rx.await.map_err(|_| SessionError::ChannelClosed)
    }

    pub async fn status(&self) -> Result<SessionStatus, SessionError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(SessionCommand::Status { reply })
            .await
            .map_err(|_| SessionError::ChannelClosed)?;
        rx.await.map_err(|_| SessionError::ChannelClosed)
    }

    /// Latest tracker snapshot, refreshed on every render tick.
    pub fn tracks(&self) -> watch::Receiver<Vec<Track>> {
        self.tracks.clone()
    }

    /// Latest full-resolution capture, for preview/overlay painting.
    pub fn preview(&self) -> watch::Receiver<Option<RgbFrame>> {
        self.preview.clone()
    }
}

/// Spawn the session actor.
pub fn spawn_session(cfg: SessionConfig, provider: Arc<dyn VideoProvider>) -> SessionHandle {
    let (cmd_tx, cmd_rx) = mpsc::channel(16);
    let (tracks_tx, tracks_rx) = watch::channel(Vec::new());
    let (preview_tx, preview_rx) = watch::channel(None);

    let runner = Runner {
        tracker: Tracker::new(
            Box::new(CentroidMatcher {
                radius_px: cfg.match_radius_px,
            }),
            cfg.track_ttl,
        ),
        ledger: AttendanceLedger::new(EligibilityFilter::new(Vec::new(), Vec::new())),
        state: SessionState::Idle,
        last_error: None,
        budget: Arc::new(FrameBudget::new(cfg.max_pending)),
        conn: None,
        events_rx: None,
        frames_rx: None,
        sampler: None,
        tracks_tx,
        preview_tx: Arc::new(preview_tx),
        provider,
        cfg,
    };

    tokio::spawn(runner.run(cmd_rx));

    SessionHandle {
        tx: cmd_tx,
        tracks: tracks_rx,
        preview: preview_rx,
    }
}

struct Runner {
    cfg: SessionConfig,
    provider: Arc<dyn VideoProvider>,
    state: SessionState,
    last_error: Option<String>,
    tracker: Tracker,
    ledger: AttendanceLedger,
    budget: Arc<FrameBudget>,
    conn: Option<Connection>,
    events_rx: Option<mpsc::Receiver<ServerEvent>>,
    frames_rx: Option<mpsc::Receiver<EncodedFrame>>,
    sampler: Option<SamplerHandle>,
    tracks_tx: watch::Sender<Vec<Track>>,
    preview_tx: Arc<watch::Sender<Option<RgbFrame>>>,
}

enum Step {
    Command(Option<SessionCommand>),
    Render,
    Frame(Option<EncodedFrame>),
    Event(Option<ServerEvent>),
}

impl Runner {
    async fn run(mut self, mut cmd_rx: mpsc::Receiver<SessionCommand>) {
        let mut render = tokio::time::interval(self.cfg.render_interval);
        render.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            let step = tokio::select! {
                cmd = cmd_rx.recv() => Step::Command(cmd),
                _ = render.tick() => Step::Render,
                frame = recv_opt(&mut self.frames_rx) => Step::Frame(frame),
                event = recv_opt(&mut self.events_rx) => Step::Event(event),
            };

            match step {
                Step::Command(Some(cmd)) => self.handle_command(cmd).await,
                // All handles dropped: shut the session down.
                Step::Command(None) => break,
                Step::Render => {
                    self.tracker.sweep(Instant::now());
                    let _ = self.tracks_tx.send(self.tracker.snapshot());
                }
                Step::Frame(Some(frame)) => self.forward_frame(frame).await,
                Step::Frame(None) => self.frames_rx = None,
                Step::Event(Some(event)) => self.handle_event(event),
                Step::Event(None) => self.on_connection_lost().await,
            }
        }

        self.teardown(false).await;
        tracing::debug!("session actor exiting");
    }

    async fn handle_command(&mut self, cmd: SessionCommand) {
        match cmd {
            SessionCommand::Start {
                intakes,
                courses,
                reply,
            } => {
                let result = if self.state != SessionState::Idle {
                    Err(SessionError::AlreadyRunning)
                } else {
                    self.state = SessionState::Starting;
                    match self.do_start(intakes, courses).await {
                        Ok(()) => {
                            self.state = SessionState::Running;
                            self.last_error = None;
                            tracing::info!("session running");
                            Ok(())
                        }
                        Err(e) => {
                            tracing::warn!(error = %e, "session start failed");
                            self.teardown(false).await;
                            Err(e)
                        }
                    }
                };
                let _ = reply.send(result);
            }
            SessionCommand::Stop { reply } => {
                // Idempotent: stopping an idle session is a no-op.
                if self.state != SessionState::Idle {
                    self.state = SessionState::Stopping;
                    self.teardown(true).await;
                    tracing::info!("session stopped");
                }
                let _ = reply.send(());
            }
            SessionCommand::Roll { reply } => {
                let _ = reply.send(self.ledger.roll().to_vec());
            }
            SessionCommand::Summary { reply } => {
                let _ = reply.send(self.ledger.summary().clone());
            }
            SessionCommand::Status { reply } => {
                let _ = reply.send(SessionStatus {
                    state: self.state,
                    attendance_count: self.ledger.len(),
                    last_error: self.last_error.clone(),
                });
            }
        }
    }

    /// Connect, handshake, acquire video, spawn the sampler.
    async fn do_start(
        &mut self,
        intakes: Vec<String>,
        courses: Vec<String>,
    ) -> Result<(), SessionError> {
        let (conn, mut events_rx) =
            Connection::connect(&self.cfg.endpoint, self.cfg.connect_timeout).await?;

        conn.send(ClientMessage::StartRecognition {
            intakes: intakes.clone(),
            courses: courses.clone(),
        })
        .await?;

        // The first ack resolves the handshake; other events arriving this
        // early are meaningless and dropped.
        let ack = tokio::time::timeout(self.cfg.connect_timeout, async {
            loop {
                match events_rx.recv().await {
                    Some(ServerEvent::Ack { status, message }) => break Some((status, message)),
                    Some(other) => {
                        tracing::debug!(event = ?other, "event before handshake ack; ignored")
                    }
                    None => break None,
                }
            }
        })
        .await
        .map_err(|_| ConnectionError::Timeout(self.cfg.connect_timeout))?;

        match ack {
            Some((AckStatus::Success, _)) => {}
            Some((AckStatus::Error, message)) => {
                return Err(SessionError::StartRejected(
                    message.unwrap_or_else(|| "unknown error".to_string()),
                ));
            }
            None => return Err(SessionError::Connection(ConnectionError::Closed)),
        }

        let source = self.provider.acquire(&self.cfg.constraints)?;
        let (frames_tx, frames_rx) = mpsc::channel(4);

        self.budget = Arc::new(FrameBudget::new(self.cfg.max_pending));
        self.tracker.clear();
        self.ledger = AttendanceLedger::new(EligibilityFilter::new(intakes, courses));
        self.sampler = Some(start_sampling(
            source,
            SamplerConfig {
                interval: self.cfg.sample_interval,
                frame_skip: self.cfg.frame_skip,
                processing_width: self.cfg.processing_width,
                jpeg_quality: self.cfg.jpeg_quality,
            },
            self.budget.clone(),
            frames_tx,
            self.preview_tx.clone(),
        ));
        self.conn = Some(conn);
        self.events_rx = Some(events_rx);
        self.frames_rx = Some(frames_rx);
        Ok(())
    }

    /// Ship a sampled frame to the recognition service.
    async fn forward_frame(&mut self, frame: EncodedFrame) {
        let Some(conn) = self.conn.as_ref() else {
            return;
        };
        let msg = ClientMessage::ProcessFrame {
            image: BASE64_STANDARD.encode(&frame.jpeg),
            timestamp: frame.timestamp_ms,
        };
        if conn.send(msg).await.is_err() {
            self.on_connection_lost().await;
        }
    }

    /// Fold one inbound event into tracker and ledger. Handlers are
    /// order-independent: events may arrive out of send order.
    fn handle_event(&mut self, event: ServerEvent) {
        // Every inbound event settles one in-flight frame; the budget
        // saturates at zero when a frame produced several events.
        self.budget.release();
        let now = Instant::now();

        match event {
            ServerEvent::Recognition {
                name,
                similarity,
                bbox,
                intake,
                course,
            } => {
                let Some((display, student_id)) = parse_label(&name) else {
                    tracing::warn!(%name, "unparseable recognition label; treating as unrecognized");
                    self.tracker
                        .observe(Observation::Unrecognized { bbox: bbox.into() }, now);
                    return;
                };

                if similarity < self.cfg.similarity_gate {
                    self.tracker.observe(
                        Observation::BelowThreshold {
                            label: display.to_string(),
                            similarity,
                            bbox: bbox.into(),
                        },
                        now,
                    );
                    return;
                }

                self.tracker.observe(
                    Observation::Recognized {
                        student_id: student_id.to_string(),
                        label: display.to_string(),
                        similarity,
                        bbox: bbox.into(),
                    },
                    now,
                );

                match (intake, course) {
                    (Some(intake), Some(course)) => {
                        self.ledger.record_if_eligible(
                            student_id,
                            display,
                            &intake,
                            &course,
                            Utc::now(),
                        );
                    }
                    _ => tracing::debug!(
                        student_id,
                        "recognition event without cohort fields; not recorded"
                    ),
                }
            }
            ServerEvent::BelowThresholdMatch {
                name,
                similarity,
                bbox,
                ..
            } => {
                let display = parse_label(&name).map(|(d, _)| d).unwrap_or(&name);
                self.tracker.observe(
                    Observation::BelowThreshold {
                        label: display.to_string(),
                        similarity,
                        bbox: bbox.into(),
                    },
                    now,
                );
            }
            ServerEvent::UnrecognizedFace { bbox, error } => {
                if let Some(error) = error {
                    tracing::debug!(%error, "unrecognized face");
                }
                self.tracker
                    .observe(Observation::Unrecognized { bbox: bbox.into() }, now);
            }
            ServerEvent::FaceDetected { .. } => {
                tracing::trace!("face detected (informational)");
            }
            ServerEvent::FrameProcessed => {}
            ServerEvent::Ack { status, message } => {
                tracing::debug!(?status, ?message, "mid-session ack");
            }
        }
    }

    /// Mid-session connection loss: recoverable. The session stops and a
    /// new one may be started.
    async fn on_connection_lost(&mut self) {
        if self.state != SessionState::Running && self.state != SessionState::Starting {
            return;
        }
        tracing::error!("connection to recognition service lost; stopping session");
        self.last_error = Some("connection to recognition service lost".to_string());
        self.teardown(false).await;
    }

    /// Stop sampling, release the connection and the video source, clear
    /// tracker state. One atomic user-facing operation; safe to repeat.
    async fn teardown(&mut self, notify_service: bool) {
        if let Some(mut sampler) = self.sampler.take() {
            sampler.stop();
        }
        self.frames_rx = None;

        if let Some(conn) = self.conn.take() {
            if notify_service {
                let _ = conn.send(ClientMessage::StopRecognition).await;
                conn.shutdown().await;
            }
            // Otherwise Drop aborts the tasks immediately.
        }
        self.events_rx = None;

        self.tracker.clear();
        let _ = self.tracks_tx.send(Vec::new());
        let _ = self.preview_tx.send(None);
        self.state = SessionState::Idle;
    }
}

/// Receive from an optional channel; pends forever when absent so the
/// select arm stays quiet while no session is running.
async fn recv_opt<T>(rx: &mut Option<mpsc::Receiver<T>>) -> Option<T> {
    match rx {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}
