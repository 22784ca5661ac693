use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use crate::cache::{CacheService, MokaCacheService};
use crate::config::{ConfigManager, StackdConfig};
use crate::error::Result;
use crate::events::EventPublisher;
use crate::orchestration::health_rollup::HealthRollup;
use crate::providers::DriverRegistry;
use crate::salt::SaltClient;
use crate::state_machine::ActivityStateMachine;
use crate::store::StackStore;

/// Shared system dependencies and configuration
///
/// This serves as a dependency injection container providing access to:
/// - Configuration manager
/// - Entity store (activity, hosts, metadata, history)
/// - Cloud driver registry
/// - Salt client
/// - TTL cache
/// - Event publisher and the activity state machine built on it
pub struct SystemContext {
    /// System instance ID
    pub system_id: Uuid,

    /// Configuration manager with environment-aware loading
    pub config_manager: Arc<ConfigManager>,

    pub store: Arc<dyn StackStore>,

    /// Cloud account slug -> driver
    pub drivers: Arc<DriverRegistry>,

    pub salt: Arc<dyn SaltClient>,

    pub cache: Arc<dyn CacheService>,

    pub event_publisher: EventPublisher,

    pub state_machine: ActivityStateMachine,

    pub health: HealthRollup,
}

impl std::fmt::Debug for SystemContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SystemContext")
            .field("system_id", &self.system_id)
            .field("config_manager", &"Arc<ConfigManager>")
            .field("store", &self.store)
            .field("drivers", &self.drivers.accounts())
            .field("salt", &"Arc<dyn SaltClient>")
            .field("cache", &self.cache.provider_name())
            .field(
                "event_subscribers",
                &self.event_publisher.subscriber_count(),
            )
            .finish()
    }
}

impl SystemContext {
    /// Create SystemContext with environment-aware configuration loading
    pub fn new(
        store: Arc<dyn StackStore>,
        drivers: Arc<DriverRegistry>,
        salt: Arc<dyn SaltClient>,
    ) -> Result<Self> {
        info!("🔧 Initializing SystemContext with auto-detected environment configuration");
        let config_manager = ConfigManager::load()?;
        Ok(Self::from_config(config_manager, store, drivers, salt))
    }

    /// Create SystemContext from an already loaded configuration manager.
    ///
    /// The cache is a moka TTL cache sized from the `cache` section.
    pub fn from_config(
        config_manager: Arc<ConfigManager>,
        store: Arc<dyn StackStore>,
        drivers: Arc<DriverRegistry>,
        salt: Arc<dyn SaltClient>,
    ) -> Self {
        let cache: Arc<dyn CacheService> =
            Arc::new(MokaCacheService::from_config(&config_manager.config().cache));
        Self::with_cache(config_manager, store, drivers, salt, cache)
    }

    pub fn with_cache(
        config_manager: Arc<ConfigManager>,
        store: Arc<dyn StackStore>,
        drivers: Arc<DriverRegistry>,
        salt: Arc<dyn SaltClient>,
        cache: Arc<dyn CacheService>,
    ) -> Self {
        let config = config_manager.config();
        let event_publisher = EventPublisher::new(config.events.channel_capacity);
        let state_machine = ActivityStateMachine::new(store.clone(), event_publisher.clone());
        let health = HealthRollup::new(store.clone(), cache.clone(), config.cache.default_ttl());
        let system_id = Uuid::new_v4();

        info!(
            system_id = %system_id,
            environment = %config_manager.environment(),
            cache = cache.provider_name(),
            accounts = drivers.accounts().len(),
            "✅ SystemContext ready"
        );

        Self {
            system_id,
            config_manager,
            store,
            drivers,
            salt,
            cache,
            event_publisher,
            state_machine,
            health,
        }
    }

    pub fn config(&self) -> &StackdConfig {
        self.config_manager.config()
    }
}
