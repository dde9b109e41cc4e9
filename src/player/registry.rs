//! Process-wide player table
//!
//! Players are addressed by [`PlayerId`] from the binding layer. A stale id
//! simply misses the table and yields [`BridgeError::UnknownPlayer`]; nothing
//! is ever dereferenced through a freed instance.

use crate::decoder::DecoderBackend;
use crate::internal_error;
use crate::player::{PlaybackState, PlayerId, PlayerInstance};
use crate::utils::config::{Config, PlayerDefaults};
use crate::utils::error::{BridgeError, Result};
use log::{debug, info};
use once_cell::sync::OnceCell;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Largest id handed out, so ids stay representable as a positive `i32` across the C ABI
const MAX_PLAYER_ID: u32 = i32::MAX as u32;

/// Table of live players
pub struct PlayerRegistry {
    backend: Arc<dyn DecoderBackend>,
    defaults: PlayerDefaults,
    drain_warn: Duration,
    players: RwLock<HashMap<PlayerId, Arc<PlayerInstance>>>,
    next_id: AtomicU32,

    /// Players paused by `pause_all`, resumed by `resume_all`
    background_paused: Mutex<Vec<PlayerId>>,
}

impl PlayerRegistry {
    /// Create a registry with default player settings
    pub fn new(backend: Arc<dyn DecoderBackend>) -> Self {
        Self::with_config(backend, &Config::default())
    }

    /// Create a registry applying `config` to every new player
    pub fn with_config(backend: Arc<dyn DecoderBackend>, config: &Config) -> Self {
        info!("Player registry using {} decoder", backend.name());
        Self {
            backend,
            defaults: config.player.clone(),
            drain_warn: Duration::from_millis(config.general.drain_warn_ms),
            players: RwLock::new(HashMap::new()),
            next_id: AtomicU32::new(1),
            background_paused: Mutex::new(Vec::new()),
        }
    }

    /// Create a player in `Idle`
    pub fn create(&self) -> Result<PlayerId> {
        let raw = self
            .next_id
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |id| {
                (id <= MAX_PLAYER_ID).then_some(id + 1)
            })
            .map_err(|_| internal_error!("player ids exhausted"))?;

        let id = PlayerId::from_raw(raw);
        let player = Arc::new(PlayerInstance::new(
            id,
            Arc::clone(&self.backend),
            &self.defaults,
            self.drain_warn,
        ));
        self.players.write().insert(id, player);

        info!("Created player {}", id);
        Ok(id)
    }

    /// Release a player
    ///
    /// Stops playback, closes the decoder session and frees every frame
    /// reference before returning. Releasing an unknown or already released
    /// id is a no-op.
    pub fn release(&self, id: PlayerId) -> Result<()> {
        // Remove under the write lock, tear down outside it
        let removed = self.players.write().remove(&id);
        match removed {
            Some(player) => {
                player.release();
                self.background_paused.lock().retain(|paused| *paused != id);
                info!("Released player {}", id);
            }
            None => debug!("Release of unknown player {} ignored", id),
        }
        Ok(())
    }

    /// Look up a live player
    pub fn player(&self, id: PlayerId) -> Result<Arc<PlayerInstance>> {
        self.players
            .read()
            .get(&id)
            .cloned()
            .ok_or(BridgeError::UnknownPlayer(id))
    }

    pub fn contains(&self, id: PlayerId) -> bool {
        self.players.read().contains_key(&id)
    }

    /// Number of live players
    pub fn len(&self) -> usize {
        self.players.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.players.read().is_empty()
    }

    /// Ids of live players in creation order
    pub fn ids(&self) -> Vec<PlayerId> {
        let mut ids: Vec<_> = self.players.read().keys().copied().collect();
        ids.sort();
        ids
    }

    /// Pause every playing player, remembering which ones were playing
    ///
    /// Used when the host application moves to the background.
    pub fn pause_all(&self) -> Result<usize> {
        let mut paused = Vec::new();
        for player in self.snapshot() {
            if player.state() == PlaybackState::Playing {
                player.pause()?;
                paused.push(player.id());
            }
        }

        let count = paused.len();
        self.background_paused.lock().extend(paused);
        info!("Paused {} player(s) for background", count);
        Ok(count)
    }

    /// Resume exactly the players paused by [`pause_all`](Self::pause_all)
    ///
    /// Players released or stopped in the meantime are skipped.
    pub fn resume_all(&self) -> Result<usize> {
        let ids = std::mem::take(&mut *self.background_paused.lock());
        let mut resumed = 0;
        for id in ids {
            let Ok(player) = self.player(id) else {
                continue;
            };
            if player.state() == PlaybackState::Paused {
                player.play()?;
                resumed += 1;
            }
        }

        info!("Resumed {} player(s) from background", resumed);
        Ok(resumed)
    }

    /// Release every player
    pub fn release_all(&self) {
        let players: Vec<_> = self.players.write().drain().collect();
        for (id, player) in players {
            player.release();
            debug!("Released player {}", id);
        }
        self.background_paused.lock().clear();
    }

    fn snapshot(&self) -> Vec<Arc<PlayerInstance>> {
        let mut players: Vec<_> = self.players.read().values().cloned().collect();
        players.sort_by_key(|player| player.id());
        players
    }
}

impl Drop for PlayerRegistry {
    fn drop(&mut self) {
        self.release_all();
    }
}

static GLOBAL: OnceCell<PlayerRegistry> = OnceCell::new();

/// Install the process-wide registry used by the C ABI
///
/// Fails if one is already installed.
pub fn install_global(registry: PlayerRegistry) -> Result<&'static PlayerRegistry> {
    GLOBAL
        .set(registry)
        .map_err(|_| internal_error!("global player registry already installed"))?;
    GLOBAL
        .get()
        .ok_or_else(|| internal_error!("global player registry missing after install"))
}

/// Process-wide registry, if installed
pub fn global() -> Option<&'static PlayerRegistry> {
    GLOBAL.get()
}

/// Process-wide registry, or [`BridgeError::NotInitialized`] before
/// [`install_global`]
pub fn installed() -> Result<&'static PlayerRegistry> {
    GLOBAL.get().ok_or(BridgeError::NotInitialized)
}
