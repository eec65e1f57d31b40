use std::sync::Arc;

use axum::{routing::get, Router};
use tracing::info;

use appointment_cell::router::appointment_routes;
use appointment_cell::{AppointmentState, HttpBillingClient};
use doctor_cell::router::doctor_routes;
use doctor_cell::DoctorState;
use notification_cell::router::notification_routes;
use notification_cell::{NotificationHub, NotificationState};
use shared_config::{AppConfig, StorageBackend};
use shared_database::{InMemoryStore, SchedulingStore, SupabaseClient, SupabaseStore};
use waiting_queue_cell::router::waiting_queue_routes;
use waiting_queue_cell::WaitingQueueState;

/// Everything the cells share: one store, one live hub.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub store: Arc<dyn SchedulingStore>,
    pub hub: NotificationHub,
}

impl AppState {
    pub fn from_config(config: Arc<AppConfig>) -> Self {
        let store: Arc<dyn SchedulingStore> = match config.storage_backend {
            StorageBackend::Supabase => {
                info!("Using Supabase storage at {}", config.supabase_url);
                Arc::new(SupabaseStore::new(Arc::new(SupabaseClient::new(&config))))
            }
            StorageBackend::Memory => {
                info!("Using in-memory storage");
                Arc::new(InMemoryStore::new())
            }
        };
        Self::with_store(config, store)
    }

    pub fn with_store(config: Arc<AppConfig>, store: Arc<dyn SchedulingStore>) -> Self {
        let hub = NotificationHub::new(config.notification_channel_capacity);
        Self { config, store, hub }
    }

    fn notifications(&self) -> NotificationState {
        NotificationState {
            config: self.config.clone(),
            store: self.store.clone(),
            hub: self.hub.clone(),
        }
    }

    fn appointments(&self) -> AppointmentState {
        AppointmentState {
            config: self.config.clone(),
            store: self.store.clone(),
            dispatcher: self.notifications().dispatcher(),
            billing: HttpBillingClient::from_config(&self.config),
        }
    }
}

pub fn create_router(state: AppState) -> Router {
    let doctor_state = DoctorState {
        config: state.config.clone(),
        store: state.store.clone(),
    };
    let queue_state = WaitingQueueState {
        config: state.config.clone(),
        appointments: state.appointments(),
    };

    Router::new()
        .route("/", get(|| async { "Hospital scheduling API is running!" }))
        .nest("/doctor", doctor_routes(doctor_state))
        .nest("/appointment", appointment_routes(state.appointments()))
        .nest("/waiting-queue", waiting_queue_routes(queue_state))
        .merge(notification_routes(state.notifications()))
}
