//! Media-player service.
//!
//! The playback surface a remote-control peer interrogates: current track
//! metadata and play/pause state. Transitions are published on the
//! endpoint event feed.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::context::{EndpointEvent, PlatformContext};
use crate::error::HarnessResult;
use crate::services::{RpcService, TeardownError, TeardownGuard};

/// Current track metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Track {
    /// Track title.
    pub title: String,
    /// Track artist.
    pub artist: String,
    /// Track length in milliseconds.
    pub duration_ms: u64,
}

/// Media-player service.
pub struct MediaPlayer {
    inner: Arc<PlayerInner>,
}

struct PlayerInner {
    ctx: Arc<PlatformContext>,
    track: Mutex<Option<Track>>,
    playing: AtomicBool,
    guard: TeardownGuard,
}

impl MediaPlayer {
    /// Creates the media-player service over the given platform context.
    pub fn new(ctx: Arc<PlatformContext>) -> HarnessResult<Self> {
        Ok(Self {
            inner: Arc::new(PlayerInner {
                ctx,
                track: Mutex::new(None),
                playing: AtomicBool::new(false),
                guard: TeardownGuard::new(),
            }),
        })
    }

    fn routes(&self) -> Router {
        Router::new()
            .route("/MediaPlayer/SetTrack", post(set_track))
            .route("/MediaPlayer/Play", post(play))
            .route("/MediaPlayer/Pause", post(pause))
            .route("/MediaPlayer/GetState", post(get_state))
            .with_state(Arc::clone(&self.inner))
    }
}

impl RpcService for MediaPlayer {
    fn name(&self) -> &'static str {
        "MediaPlayer"
    }

    fn register(&self, app: Router) -> Router {
        app.merge(self.routes())
    }

    fn deinit(&self) -> Result<(), TeardownError> {
        if !self.inner.guard.first_call() {
            return Ok(());
        }
        *self.inner.track.lock() = None;
        self.inner.playing.store(false, Ordering::SeqCst);
        log::info!("[MediaPlayer] Deinitialized");
        Ok(())
    }
}

async fn set_track(
    State(player): State<Arc<PlayerInner>>,
    Json(track): Json<Track>,
) -> Json<Value> {
    log::info!("[MediaPlayer] Track set: {} - {}", track.artist, track.title);
    *player.track.lock() = Some(track);
    Json(json!({ "ok": true }))
}

async fn play(State(player): State<Arc<PlayerInner>>) -> Json<Value> {
    set_playing(&player, true)
}

async fn pause(State(player): State<Arc<PlayerInner>>) -> Json<Value> {
    set_playing(&player, false)
}

fn set_playing(player: &PlayerInner, playing: bool) -> Json<Value> {
    player.playing.store(playing, Ordering::SeqCst);
    player.ctx.emit(EndpointEvent::Playback { playing });
    Json(json!({ "playing": playing }))
}

async fn get_state(State(player): State<Arc<PlayerInner>>) -> Json<Value> {
    let track = player.track.lock().clone();
    Json(json!({
        "playing": player.playing.load(Ordering::SeqCst),
        "track": track,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::StaticAdapter;

    #[tokio::test]
    async fn play_pause_and_track_state() {
        let ctx = Arc::new(PlatformContext::new(StaticAdapter::arc(
            "AA:BB:CC:DD:EE:FF",
            "harness-0",
            [],
        )));
        let player = MediaPlayer::new(ctx).unwrap();
        let inner = || Arc::clone(&player.inner);

        set_track(
            State(inner()),
            Json(Track {
                title: "Test Tone".into(),
                artist: "Harness".into(),
                duration_ms: 30_000,
            }),
        )
        .await;
        play(State(inner())).await;

        let Json(state) = get_state(State(inner())).await;
        assert_eq!(state["playing"], true);
        assert_eq!(state["track"]["title"], "Test Tone");

        pause(State(inner())).await;
        let Json(state) = get_state(State(inner())).await;
        assert_eq!(state["playing"], false);
    }
}
