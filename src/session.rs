use crate::cache::TtlCache;
use crate::config::Settings;
use crate::model::{Event, User};
use crate::refresh::PollSession;
use crate::screen::Command;
use crate::screens::events::EventScope;
use crate::screens::networks::NetworkInventory;
use crate::screens::vm_detail::VmDetail;
use crate::source::DataSource;
use std::sync::Arc;
use tracing::debug;

/// Key for the user directory cache: the whole directory.
pub const ALL_USERS: &str = "*";

/// Process-wide memo of slow queries, keyed by the logical query.
#[derive(Debug, Clone)]
pub struct Caches {
    pub events: TtlCache<EventScope, Arc<Vec<Event>>>,
    pub vm_details: TtlCache<String, Arc<VmDetail>>,
    pub networks: TtlCache<(), Arc<NetworkInventory>>,
    pub users: TtlCache<String, Arc<Vec<User>>>,
}

impl Caches {
    pub fn new(settings: &Settings) -> Self {
        Self {
            events: TtlCache::new(settings.cache_ttl),
            vm_details: TtlCache::new(settings.cache_ttl),
            networks: TtlCache::new(settings.cache_ttl),
            users: TtlCache::new(settings.cache_ttl),
        }
    }
}

/// Everything a screen needs from the outside world, handed to its constructor.
#[derive(Clone)]
pub struct Session {
    source: Arc<dyn DataSource>,
    caches: Caches,
    settings: Arc<Settings>,
    engine: String,
}

impl Session {
    pub fn new(source: Arc<dyn DataSource>, settings: Settings, engine: impl Into<String>) -> Self {
        Self {
            caches: Caches::new(&settings),
            source,
            settings: Arc::new(settings),
            engine: engine.into(),
        }
    }

    pub fn source(&self) -> Arc<dyn DataSource> {
        Arc::clone(&self.source)
    }

    pub fn caches(&self) -> &Caches {
        &self.caches
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn engine(&self) -> &str {
        &self.engine
    }

    pub fn vm_status_poll<T>(&self, class: &'static str) -> PollSession<T> {
        PollSession::new(class, self.settings.vm_status, self.settings.call_timeout)
    }

    pub fn host_stats_poll<T>(&self, class: &'static str) -> PollSession<T> {
        PollSession::new(class, self.settings.host_stats, self.settings.call_timeout)
    }

    pub fn inventory_poll<T>(&self, class: &'static str) -> PollSession<T> {
        PollSession::new(class, self.settings.inventory, self.settings.call_timeout)
    }

    pub fn events_poll<T>(&self, class: &'static str) -> PollSession<T> {
        PollSession::new(class, self.settings.events, self.settings.call_timeout)
    }

    /// Drops cached answers a successful command has made stale.
    pub fn invalidate_after(&self, command: &Command) {
        match command {
            Command::Provision { .. } => {
                debug!("invalidating user directory cache");
                self.caches.users.invalidate_all();
            }
            Command::Power { targets, .. } => {
                for target in targets {
                    self.caches.vm_details.invalidate(&target.id);
                }
            }
            Command::Migrate { vm, .. } => {
                self.caches.vm_details.invalidate(&vm.id);
                self.caches.networks.invalidate_all();
            }
        }
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("engine", &self.engine)
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
pub fn test_session(source: Arc<crate::source::fake::FakeSource>) -> Session {
    Session::new(source, Settings::default(), "engine.test")
}
