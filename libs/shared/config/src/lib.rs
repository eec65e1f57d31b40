use std::env;
use std::str::FromStr;

use chrono::{FixedOffset, Offset, Utc};
use tracing::warn;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageBackend {
    Memory,
    Supabase,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub supabase_url: String,
    pub supabase_anon_key: String,
    pub supabase_service_role_key: String,
    pub supabase_jwt_secret: String,
    pub storage_backend: StorageBackend,
    pub billing_service_url: String,
    pub clinic_utc_offset_minutes: i32,
    pub appointment_slot_minutes: i64,
    pub waiting_queue_ttl_hours: i64,
    pub notification_channel_capacity: usize,
    pub server_port: u16,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let supabase_url = env::var("SUPABASE_URL")
            .unwrap_or_else(|_| {
                warn!("SUPABASE_URL not set, using empty value");
                String::new()
            });

        let storage_backend = match env::var("STORAGE_BACKEND").as_deref() {
            Ok("supabase") => StorageBackend::Supabase,
            Ok("memory") => StorageBackend::Memory,
            Ok(other) => {
                warn!("Unknown STORAGE_BACKEND '{}', falling back to memory", other);
                StorageBackend::Memory
            }
            Err(_) if !supabase_url.is_empty() => StorageBackend::Supabase,
            Err(_) => {
                warn!("STORAGE_BACKEND not set and Supabase unconfigured, using in-memory store");
                StorageBackend::Memory
            }
        };

        let config = Self {
            supabase_url,
            supabase_anon_key: env::var("SUPABASE_ANON_PUBLIC_KEY")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_ANON_PUBLIC_KEY not set, using empty value");
                    String::new()
                }),
            supabase_service_role_key: env::var("SUPABASE_SERVICE_ROLE_KEY")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_SERVICE_ROLE_KEY not set, using empty value");
                    String::new()
                }),
            supabase_jwt_secret: env::var("SUPABASE_JWT_SECRET")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_JWT_SECRET not set, using empty value");
                    String::new()
                }),
            storage_backend,
            billing_service_url: env::var("BILLING_SERVICE_URL")
                .unwrap_or_else(|_| {
                    warn!("BILLING_SERVICE_URL not set, bill generation disabled");
                    String::new()
                }),
            clinic_utc_offset_minutes: parse_or("CLINIC_UTC_OFFSET_MINUTES", 0),
            appointment_slot_minutes: parse_or("APPOINTMENT_SLOT_MINUTES", 30),
            waiting_queue_ttl_hours: parse_or("WAITING_QUEUE_TTL_HOURS", 168),
            notification_channel_capacity: parse_or("NOTIFICATION_CHANNEL_CAPACITY", 100),
            server_port: parse_or("SERVER_PORT", 3000),
        };

        if !config.is_configured() {
            warn!("Application not fully configured - missing environment variables");
        }

        config
    }

    pub fn is_configured(&self) -> bool {
        match self.storage_backend {
            StorageBackend::Memory => !self.supabase_jwt_secret.is_empty(),
            StorageBackend::Supabase => {
                !self.supabase_url.is_empty()
                    && !self.supabase_anon_key.is_empty()
                    && !self.supabase_jwt_secret.is_empty()
            }
        }
    }

    pub fn is_billing_configured(&self) -> bool {
        !self.billing_service_url.is_empty()
    }

    /// Wall-clock offset of the clinic. Out-of-range values fall back to UTC.
    pub fn clinic_offset(&self) -> FixedOffset {
        FixedOffset::east_opt(self.clinic_utc_offset_minutes * 60).unwrap_or_else(|| {
            warn!(
                "CLINIC_UTC_OFFSET_MINUTES {} out of range, using UTC",
                self.clinic_utc_offset_minutes
            );
            Utc.fix()
        })
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            supabase_url: String::new(),
            supabase_anon_key: String::new(),
            supabase_service_role_key: String::new(),
            supabase_jwt_secret: String::new(),
            storage_backend: StorageBackend::Memory,
            billing_service_url: String::new(),
            clinic_utc_offset_minutes: 0,
            appointment_slot_minutes: 30,
            waiting_queue_ttl_hours: 168,
            notification_channel_capacity: 100,
            server_port: 3000,
        }
    }
}

fn parse_or<T>(key: &str, default: T) -> T
where
    T: FromStr + Copy + std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw.parse().unwrap_or_else(|_| {
            warn!("{} has invalid value '{}', using default {}", key, raw, default);
            default
        }),
        Err(_) => default,
    }
}
