use std::collections::{HashMap, VecDeque};

use imghash::ImageHash;
use tokio::sync::{mpsc, oneshot};
use tokio_stream::wrappers::BroadcastStream;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::Configuration;
use crate::advisor::ModeSwitchAdvisor;
use crate::dedup::Deduplicator;
use crate::error::CaptureError;
use crate::progress::ProgressBroadcaster;
use crate::types::{
    CanonicalCandidate, DetectedObject, ModeSwitchAdvisory, ProgressEvent, ProgressStatus,
};

use super::state::{CaptureMode, CaptureSession, SessionState};

/// What one settled vision call contributed to the session.
pub enum AnalysisOutcome {
    /// Parsed detections, each with the perceptual fingerprint of its
    /// bounding-box crop when one was computable.
    Detections {
        objects: Vec<(DetectedObject, Option<ImageHash>)>,
        skipped: u32,
    },
    /// Retries exhausted; the keyframe contributes nothing.
    Failed,
}

/// The frozen result of a session: deduplicated candidates, every advisory
/// surfaced along the way, and the degradation counters.
#[derive(Debug, Clone)]
pub struct FinalizedSession {
    pub session_id: Uuid,
    pub state: SessionState,
    pub candidates: Vec<CanonicalCandidate>,
    pub advisories: Vec<ModeSwitchAdvisory>,
    pub skipped_keyframes: u32,
    pub skipped_objects: u32,
}

enum SessionCommand {
    Open {
        room_id: String,
        mode: CaptureMode,
        responder: oneshot::Sender<Uuid>,
    },
    RecordIngest {
        id: Uuid,
        mode: CaptureMode,
        responder: oneshot::Sender<Result<u32, CaptureError>>,
    },
    RecordKeyframe {
        id: Uuid,
        responder: oneshot::Sender<Result<(), CaptureError>>,
    },
    BeginAnalyses {
        id: Uuid,
        count: u32,
        responder: oneshot::Sender<Result<(), CaptureError>>,
    },
    SettleAnalysis {
        id: Uuid,
        keyframe: Uuid,
        outcome: AnalysisOutcome,
        responder: Option<oneshot::Sender<Vec<DetectedObject>>>,
    },
    Finalize {
        id: Uuid,
        responder: oneshot::Sender<Result<FinalizedSession, CaptureError>>,
    },
    Fail {
        id: Uuid,
        reason: String,
    },
    Subscribe {
        id: Uuid,
        responder: oneshot::Sender<Option<BroadcastStream<ProgressEvent>>>,
    },
    Snapshot {
        id: Uuid,
        responder: oneshot::Sender<Option<CaptureSession>>,
    },
}

struct SessionEntry {
    session: CaptureSession,
    dedup: Deduplicator,
    advisor: ModeSwitchAdvisor,
    advisories: Vec<ModeSwitchAdvisory>,
    dispatched: u32,
    settled: u32,
    parked: Vec<oneshot::Sender<Result<FinalizedSession, CaptureError>>>,
}

impl SessionEntry {
    fn new(session: CaptureSession, config: &Configuration) -> Self {
        Self {
            session,
            dedup: Deduplicator::new(config),
            advisor: ModeSwitchAdvisor::new(config),
            advisories: Vec::new(),
            dispatched: 0,
            settled: 0,
            parked: Vec::new(),
        }
    }

    /// Coarse fraction for progress events; exact totals are unknowable
    /// while media is still arriving.
    fn fraction(&self) -> f32 {
        if self.dispatched == 0 {
            0.05
        } else {
            0.1 + 0.8 * self.settled as f32 / self.dispatched as f32
        }
    }

    /// Consumes the working state, leaving only the frozen snapshot and
    /// the lifecycle record.
    fn finish(self) -> (CaptureSession, FinalizedSession) {
        let frozen = FinalizedSession {
            session_id: self.session.id,
            state: self.session.state,
            candidates: self.dedup.into_candidates(),
            advisories: self.advisories,
            skipped_keyframes: self.session.skipped_keyframes,
            skipped_objects: self.session.skipped_objects,
        };
        (self.session, frozen)
    }
}

/// What survives a terminal transition: the deduplicator, advisor state
/// and progress channel are reclaimed, the snapshot stays retrievable.
struct ArchivedSession {
    session: CaptureSession,
    frozen: FinalizedSession,
}

/// Owns every live session and serializes all mutation through one
/// command loop — single-writer discipline per session id, no shared
/// locking across sessions' feeding tasks.
pub struct SessionManager {
    _task: tokio::task::JoinHandle<()>,
}

impl SessionManager {
    pub fn new(config: Configuration) -> (Self, SessionManagerHandle) {
        let (tx, mut rx) = mpsc::channel::<SessionCommand>(256);
        let task = tokio::spawn(async move {
            let mut state = ManagerState {
                progress: ProgressBroadcaster::new(config.progress_backlog),
                sessions: HashMap::new(),
                archive: HashMap::new(),
                archive_order: VecDeque::new(),
                config,
            };
            while let Some(command) = rx.recv().await {
                state.handle(command);
            }
            debug!("session manager loop ended");
        });
        (Self { _task: task }, SessionManagerHandle { command_tx: tx })
    }
}

struct ManagerState {
    config: Configuration,
    sessions: HashMap<Uuid, SessionEntry>,
    archive: HashMap<Uuid, ArchivedSession>,
    archive_order: VecDeque<Uuid>,
    progress: ProgressBroadcaster,
}

impl ManagerState {
    fn handle(&mut self, command: SessionCommand) {
        match command {
            SessionCommand::Open {
                room_id,
                mode,
                responder,
            } => {
                let session = CaptureSession::new(room_id, mode);
                let id = session.id;
                info!(session = %id, ?mode, "capture session started");
                self.sessions
                    .insert(id, SessionEntry::new(session, &self.config));
                self.progress.register(id);
                self.progress.publish(
                    id,
                    ProgressStatus::Running,
                    0.0,
                    "Session started",
                    0,
                );
                let _ = responder.send(id);
            }
            SessionCommand::RecordIngest {
                id,
                mode,
                responder,
            } => {
                let Some(entry) = self.sessions.get_mut(&id) else {
                    let _ = responder.send(Err(self.gone(id)));
                    return;
                };
                if entry.session.mode != mode {
                    let _ = responder.send(Err(CaptureError::WrongMode(entry.session.mode)));
                    return;
                }
                let result = entry.session.record_ingest();
                if result.is_ok() {
                    self.progress.publish(
                        id,
                        ProgressStatus::Running,
                        entry.fraction(),
                        "Ingesting media",
                        entry.session.candidate_count,
                    );
                }
                let _ = responder.send(result);
            }
            SessionCommand::RecordKeyframe { id, responder } => {
                let Some(entry) = self.sessions.get_mut(&id) else {
                    let _ = responder.send(Err(self.gone(id)));
                    return;
                };
                let result = entry.session.record_keyframe();
                if result.is_ok() {
                    self.progress.publish(
                        id,
                        ProgressStatus::Running,
                        entry.fraction(),
                        format!("Keyframe {} accepted", entry.session.frame_count),
                        entry.session.candidate_count,
                    );
                }
                let _ = responder.send(result);
            }
            SessionCommand::BeginAnalyses {
                id,
                count,
                responder,
            } => {
                let Some(entry) = self.sessions.get_mut(&id) else {
                    let _ = responder.send(Err(self.gone(id)));
                    return;
                };
                let result = entry.session.begin_analyses(count);
                if result.is_ok() {
                    entry.dispatched += count;
                    self.progress.publish(
                        id,
                        ProgressStatus::Running,
                        entry.fraction(),
                        format!("Analyzing {count} frames"),
                        entry.session.candidate_count,
                    );
                }
                let _ = responder.send(result);
            }
            SessionCommand::SettleAnalysis {
                id,
                keyframe,
                outcome,
                responder,
            } => {
                let contributions = self.settle(id, keyframe, outcome);
                if let Some(responder) = responder {
                    let _ = responder.send(contributions);
                }
                self.maybe_finish(id);
            }
            SessionCommand::Finalize { id, responder } => {
                if let Some(archived) = self.archive.get(&id) {
                    let _ = responder.send(Ok(archived.frozen.clone()));
                    return;
                }
                let Some(entry) = self.sessions.get_mut(&id) else {
                    let _ = responder.send(Err(CaptureError::SessionNotFound(id)));
                    return;
                };
                if let Err(e) = entry.session.begin_finalize() {
                    let _ = responder.send(Err(e));
                    return;
                }
                self.progress.publish(
                    id,
                    ProgressStatus::Running,
                    0.9,
                    "Finalizing, draining outstanding analyses",
                    entry.session.candidate_count,
                );
                entry.parked.push(responder);
                self.maybe_finish(id);
            }
            SessionCommand::Fail { id, reason } => {
                let Some(mut entry) = self.sessions.remove(&id) else {
                    return;
                };
                if entry.session.fail().is_err() {
                    warn!(session = %id, "ignoring fail on terminal session");
                    self.sessions.insert(id, entry);
                    return;
                }
                let parked: Vec<_> = entry.parked.drain(..).collect();
                let (session, frozen) = entry.finish();
                self.progress.publish(
                    id,
                    ProgressStatus::Error,
                    1.0,
                    format!("Session failed: {reason}"),
                    frozen.candidates.len(),
                );
                self.progress.remove(id);
                // A failed session still hands back whatever it gathered;
                // analyses that settle from here on contribute nothing and
                // publish nothing.
                for responder in parked {
                    let _ = responder.send(Ok(frozen.clone()));
                }
                self.archive_session(id, session, frozen);
            }
            SessionCommand::Subscribe { id, responder } => {
                let _ = responder.send(self.progress.subscribe(id));
            }
            SessionCommand::Snapshot { id, responder } => {
                let snapshot = self
                    .sessions
                    .get(&id)
                    .map(|e| e.session.clone())
                    .or_else(|| self.archive.get(&id).map(|a| a.session.clone()));
                let _ = responder.send(snapshot);
            }
        }
    }

    fn settle(
        &mut self,
        id: Uuid,
        keyframe: Uuid,
        outcome: AnalysisOutcome,
    ) -> Vec<DetectedObject> {
        let Some(entry) = self.sessions.get_mut(&id) else {
            return Vec::new();
        };
        entry.session.settle_analysis();
        entry.settled += 1;

        match outcome {
            AnalysisOutcome::Failed => {
                entry.session.skipped_keyframes += 1;
                debug!(session = %id, %keyframe, "keyframe degraded to empty contribution");
                self.progress.publish(
                    id,
                    ProgressStatus::Running,
                    entry.fraction(),
                    "One frame could not be analyzed, continuing with partial results",
                    entry.session.candidate_count,
                );
                Vec::new()
            }
            AnalysisOutcome::Detections { objects, skipped } => {
                entry.session.skipped_objects += skipped;
                let mut contributions = Vec::with_capacity(objects.len());
                for (object, fingerprint) in objects {
                    contributions.push(object.clone());
                    let name = object.name.clone();
                    let merge = entry.dedup.absorb(object, fingerprint);
                    entry.session.candidate_count = entry.dedup.len();
                    let message = if merge.merged {
                        format!("Merged another sighting of \"{name}\"")
                    } else {
                        format!("Identified \"{name}\"")
                    };
                    self.progress.publish(
                        id,
                        ProgressStatus::Running,
                        entry.fraction(),
                        message,
                        entry.session.candidate_count,
                    );

                    if let Some(candidate) = entry.dedup.candidate(merge.candidate_id).cloned() {
                        for advisory in entry.advisor.review(&candidate) {
                            self.progress.publish(
                                id,
                                ProgressStatus::Running,
                                entry.fraction(),
                                advisory.message.clone(),
                                entry.session.candidate_count,
                            );
                            entry.advisories.push(advisory);
                        }
                    }
                }
                self.progress.publish(
                    id,
                    ProgressStatus::Running,
                    entry.fraction(),
                    format!(
                        "Analyzed frame {}/{}, {} items so far",
                        entry.settled, entry.dispatched, entry.session.candidate_count
                    ),
                    entry.session.candidate_count,
                );
                contributions
            }
        }
    }

    /// Completes finalization once the last in-flight analysis settles,
    /// then reclaims the entry and its progress channel.
    fn maybe_finish(&mut self, id: Uuid) {
        let ready = self
            .sessions
            .get(&id)
            .map(|e| e.session.state == SessionState::Finalizing && e.session.in_flight == 0)
            .unwrap_or(false);
        if !ready {
            return;
        }
        let Some(mut entry) = self.sessions.remove(&id) else {
            return;
        };
        if entry.session.complete().is_err() {
            return;
        }
        let parked: Vec<_> = entry.parked.drain(..).collect();
        let (session, frozen) = entry.finish();
        info!(
            session = %id,
            candidates = frozen.candidates.len(),
            "session completed"
        );
        self.progress.publish(
            id,
            ProgressStatus::Done,
            1.0,
            format!("Done! Identified {} unique items", frozen.candidates.len()),
            frozen.candidates.len(),
        );
        self.progress.remove(id);
        for responder in parked {
            let _ = responder.send(Ok(frozen.clone()));
        }
        self.archive_session(id, session, frozen);
    }

    /// Missing sessions split two ways: finished ones report the state
    /// they finished in, unknown ids report not-found.
    fn gone(&self, id: Uuid) -> CaptureError {
        match self.archive.get(&id) {
            Some(archived) => CaptureError::InvalidState(archived.session.state),
            None => CaptureError::SessionNotFound(id),
        }
    }

    fn archive_session(&mut self, id: Uuid, session: CaptureSession, frozen: FinalizedSession) {
        if self.config.archive_capacity == 0 {
            return;
        }
        while self.archive_order.len() >= self.config.archive_capacity {
            if let Some(oldest) = self.archive_order.pop_front() {
                self.archive.remove(&oldest);
            }
        }
        self.archive_order.push_back(id);
        self.archive.insert(id, ArchivedSession { session, frozen });
    }
}

/// Cloneable front door to the manager task. Channel failures mean the
/// manager task itself died, which is unrecoverable.
#[derive(Clone)]
pub struct SessionManagerHandle {
    command_tx: mpsc::Sender<SessionCommand>,
}

impl SessionManagerHandle {
    async fn send(&self, command: SessionCommand) {
        self.command_tx
            .send(command)
            .await
            .expect("session manager task died");
    }

    pub async fn open(&self, room_id: String, mode: CaptureMode) -> Uuid {
        let (responder, rx) = oneshot::channel();
        self.send(SessionCommand::Open {
            room_id,
            mode,
            responder,
        })
        .await;
        rx.await.expect("session manager task died")
    }

    /// Returns the media count prior to this ingestion. `mode` names the
    /// ingestion path; it must match the mode the session opened with.
    pub async fn record_ingest(&self, id: Uuid, mode: CaptureMode) -> Result<u32, CaptureError> {
        let (responder, rx) = oneshot::channel();
        self.send(SessionCommand::RecordIngest {
            id,
            mode,
            responder,
        })
        .await;
        rx.await.expect("session manager task died")
    }

    pub async fn record_keyframe(&self, id: Uuid) -> Result<(), CaptureError> {
        let (responder, rx) = oneshot::channel();
        self.send(SessionCommand::RecordKeyframe { id, responder }).await;
        rx.await.expect("session manager task died")
    }

    pub async fn begin_analyses(&self, id: Uuid, count: u32) -> Result<(), CaptureError> {
        let (responder, rx) = oneshot::channel();
        self.send(SessionCommand::BeginAnalyses {
            id,
            count,
            responder,
        })
        .await;
        rx.await.expect("session manager task died")
    }

    pub async fn settle_analysis(&self, id: Uuid, keyframe: Uuid, outcome: AnalysisOutcome) {
        self.send(SessionCommand::SettleAnalysis {
            id,
            keyframe,
            outcome,
            responder: None,
        })
        .await;
    }

    /// Settle and get back this call's own contributions, for the
    /// synchronous image/scan paths that display them immediately.
    pub async fn settle_analysis_returning(
        &self,
        id: Uuid,
        keyframe: Uuid,
        outcome: AnalysisOutcome,
    ) -> Vec<DetectedObject> {
        let (responder, rx) = oneshot::channel();
        self.send(SessionCommand::SettleAnalysis {
            id,
            keyframe,
            outcome,
            responder: Some(responder),
        })
        .await;
        rx.await.expect("session manager task died")
    }

    /// Blocks until the in-flight analysis count reaches zero, then
    /// returns the frozen candidate list.
    pub async fn finalize(&self, id: Uuid) -> Result<FinalizedSession, CaptureError> {
        let (responder, rx) = oneshot::channel();
        self.send(SessionCommand::Finalize { id, responder }).await;
        rx.await.expect("session manager task died")
    }

    pub async fn fail(&self, id: Uuid, reason: String) {
        self.send(SessionCommand::Fail { id, reason }).await;
    }

    pub async fn subscribe(
        &self,
        id: Uuid,
    ) -> Result<BroadcastStream<ProgressEvent>, CaptureError> {
        let (responder, rx) = oneshot::channel();
        self.send(SessionCommand::Subscribe { id, responder }).await;
        rx.await
            .expect("session manager task died")
            .ok_or(CaptureError::SessionNotFound(id))
    }

    pub async fn snapshot(&self, id: Uuid) -> Result<CaptureSession, CaptureError> {
        let (responder, rx) = oneshot::channel();
        self.send(SessionCommand::Snapshot { id, responder }).await;
        rx.await
            .expect("session manager task died")
            .ok_or(CaptureError::SessionNotFound(id))
    }
}
