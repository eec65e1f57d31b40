// libs/appointment-cell/src/services/billing.rs
use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Client;
use thiserror::Error;
use tracing::{debug, error, info};

use shared_config::AppConfig;
use shared_models::scheduling::Appointment;

use crate::models::{Invoice, InvoiceRequest};

#[derive(Error, Debug)]
pub enum BillingError {
    #[error("billing service is not configured")]
    NotConfigured,

    #[error("billing request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("billing service responded {status}: {body}")]
    Rejected { status: u16, body: String },
}

/// External billing collaborator.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait BillingClient: Send + Sync {
    async fn generate_bill(&self, appointment: &Appointment) -> Result<Invoice, BillingError>;
}

/// Posts invoices to `{BILLING_SERVICE_URL}/invoices`.
pub struct HttpBillingClient {
    client: Client,
    base_url: String,
}

impl HttpBillingClient {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            client: Client::new(),
            base_url: config.billing_service_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn from_config(config: &Arc<AppConfig>) -> Arc<dyn BillingClient> {
        Arc::new(Self::new(config))
    }
}

#[async_trait]
impl BillingClient for HttpBillingClient {
    async fn generate_bill(&self, appointment: &Appointment) -> Result<Invoice, BillingError> {
        if self.base_url.is_empty() {
            return Err(BillingError::NotConfigured);
        }

        let url = format!("{}/invoices", self.base_url);
        debug!("Requesting invoice for appointment {} from {}", appointment.id, url);

        let body = InvoiceRequest {
            appointment_id: appointment.id,
            patient_id: appointment.patient_id,
            doctor_id: appointment.doctor_id,
            appointment_date: appointment.appointment_date,
            is_follow_up: appointment.is_follow_up,
        };

        let response = self.client.post(&url).json(&body).send().await?;
        let status = response.status();

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!("Billing service error ({}): {}", status, body);
            return Err(BillingError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        let invoice: Invoice = response.json().await?;
        info!("Invoice {} generated for appointment {}", invoice.id, appointment.id);
        Ok(invoice)
    }
}
