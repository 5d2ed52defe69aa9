//! Cooldown module
//!
//! A ledger of per-character action cooldowns. The ledger answers "may
//! this action run yet" and records when one finishes; it never schedules
//! anything itself.
//!
//! Actions hold their window in two phases: `reserve` claims the slot
//! during validation, and `start` on the returned handle arms the clock
//! once the action has fully completed. A handle dropped before `start`
//! releases the claim, so a rejected or aborted action leaves no trace.

use std::time::{Duration, Instant};

use dashmap::DashMap;
use uuid::Uuid;

use crate::config::GameConfig;
use crate::error::GameError;

/// Kinds of actions with independent cooldown clocks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionKind {
    Move,
    Equip,
}

/// Cooldown windows per action kind
#[derive(Debug, Clone, Copy)]
pub struct CooldownWindows {
    pub move_window: Duration,
    pub equip_window: Duration,
}

impl CooldownWindows {
    pub fn from_config(config: &GameConfig) -> Self {
        Self {
            move_window: Duration::from_millis(config.move_cooldown_ms),
            equip_window: Duration::from_millis(config.equip_cooldown_ms),
        }
    }

    fn window_for(&self, kind: ActionKind) -> Duration {
        match kind {
            ActionKind::Move => self.move_window,
            ActionKind::Equip => self.equip_window,
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum CooldownState {
    /// Claimed by an in-flight action; the clock has not started
    Pending,
    /// Cooling down until the deadline
    Until(Instant),
}

/// The cooldown ledger
pub struct CooldownLedger {
    entries: DashMap<(Uuid, ActionKind), CooldownState>,
    windows: CooldownWindows,
}

impl CooldownLedger {
    pub fn new(windows: CooldownWindows) -> Self {
        Self {
            entries: DashMap::new(),
            windows,
        }
    }

    /// Time left on a cooldown. Absent, expired, and pending entries all
    /// read as no restriction; expired entries are dropped on the way out.
    pub fn remaining(&self, user_id: Uuid, kind: ActionKind) -> Option<Duration> {
        let key = (user_id, kind);
        let state = self.entries.get(&key).map(|e| *e.value())?;
        match state {
            CooldownState::Pending => None,
            CooldownState::Until(deadline) => {
                let now = Instant::now();
                if now >= deadline {
                    self.entries.remove(&key);
                    None
                } else {
                    Some(deadline - now)
                }
            }
        }
    }

    /// Claim the cooldown slot for an action about to run. Fails when the
    /// previous window has not elapsed or another action already holds the
    /// claim.
    #[must_use = "dropping the handle releases the claim; call start() when the action completes"]
    pub fn reserve(
        &self,
        user_id: Uuid,
        kind: ActionKind,
    ) -> std::result::Result<CooldownHandle<'_>, GameError> {
        let key = (user_id, kind);
        let now = Instant::now();

        let blocked = match self.entries.get(&key).map(|e| *e.value()) {
            None => false,
            Some(CooldownState::Pending) => true,
            Some(CooldownState::Until(deadline)) => now < deadline,
        };
        if blocked {
            return Err(GameError::ActionTooSoon);
        }

        self.entries.insert(key, CooldownState::Pending);
        Ok(CooldownHandle {
            ledger: self,
            key,
            armed: true,
        })
    }

    /// Number of live entries, counting pending claims
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn start_key(&self, key: (Uuid, ActionKind)) {
        let deadline = Instant::now() + self.windows.window_for(key.1);
        self.entries.insert(key, CooldownState::Until(deadline));
    }

    fn release_key(&self, key: (Uuid, ActionKind)) {
        // Only an un-started claim is removed; a racing start already
        // replaced the state with a deadline.
        if let Some(entry) = self.entries.get(&key) {
            if matches!(*entry.value(), CooldownState::Pending) {
                drop(entry);
                self.entries.remove(&key);
            }
        }
    }
}

/// A claimed cooldown slot for one in-flight action
pub struct CooldownHandle<'a> {
    ledger: &'a CooldownLedger,
    key: (Uuid, ActionKind),
    armed: bool,
}

impl CooldownHandle<'_> {
    /// The action completed; start the clock now.
    pub fn start(mut self) {
        self.armed = false;
        self.ledger.start_key(self.key);
    }

    /// Give the claim back without starting the clock.
    pub fn release(self) {
        // Drop does the work
    }
}

impl Drop for CooldownHandle<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.ledger.release_key(self.key);
        }
    }
}
