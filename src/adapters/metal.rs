//! Equinix Metal device provisioning.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::collaborators::{Provisioner, ResourceHandle};
use crate::config::ProvisioningConfig;
use crate::error::{BenchError, Result};
use crate::polling::{PollError, PollPolicy};

const AUTH_HEADER: &str = "X-Auth-Token";

#[derive(Debug, Serialize)]
struct CreateDevice<'a> {
    hostname: &'a str,
    plan: &'a str,
    metro: &'a str,
    operating_system: &'a str,
}

#[derive(Debug, Deserialize)]
struct Device {
    id: String,
    state: String,
    #[serde(default)]
    ip_addresses: Vec<IpAddress>,
}

#[derive(Debug, Deserialize)]
struct IpAddress {
    address: String,
}

/// Provisions bare-metal hosts through the Equinix Metal REST API.
pub struct MetalProvisioner {
    client: reqwest::Client,
    api_url: String,
    token: String,
    plan: String,
    metro: String,
    operating_system: String,
    poll: PollPolicy,
}

impl std::fmt::Debug for MetalProvisioner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetalProvisioner")
            .field("api_url", &self.api_url)
            .field("plan", &self.plan)
            .field("metro", &self.metro)
            .field("operating_system", &self.operating_system)
            .field("poll", &self.poll)
            .finish_non_exhaustive()
    }
}

impl MetalProvisioner {
    pub fn new(api_url: impl Into<String>, token: impl Into<String>) -> Self {
        let defaults = ProvisioningConfig::default();
        let poll = defaults.poll_policy();
        Self {
            client: reqwest::Client::new(),
            api_url: api_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
            plan: defaults.plan,
            metro: defaults.metro,
            operating_system: defaults.operating_system,
            poll,
        }
    }

    /// Builds a provisioner from configuration. Only the token is required here;
    /// the project is chosen per [`provision`](Provisioner::provision) call.
    pub fn from_config(config: &ProvisioningConfig) -> Result<Self> {
        let token = config
            .token
            .as_deref()
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| BenchError::Config {
                message: "provisioning.token is not set".to_string(),
            })?;
        Ok(Self {
            plan: config.plan.clone(),
            metro: config.metro.clone(),
            operating_system: config.operating_system.clone(),
            poll: config.poll_policy(),
            ..Self::new(&config.api_url, token)
        })
    }

    pub fn with_poll_policy(mut self, poll: PollPolicy) -> Self {
        self.poll = poll;
        self
    }

    async fn create_device(&self, project_id: &str, hostname: &str) -> Result<Device> {
        let url = format!("{}/projects/{project_id}/devices", self.api_url);
        let body = CreateDevice {
            hostname,
            plan: &self.plan,
            metro: &self.metro,
            operating_system: &self.operating_system,
        };
        let response = self
            .client
            .post(&url)
            .header(AUTH_HEADER, &self.token)
            .json(&body)
            .send()
            .await
            .map_err(provisioning_error)?;
        parse_device(response).await
    }

    async fn get_device(&self, device_id: &str) -> Result<Device> {
        let url = format!("{}/devices/{device_id}", self.api_url);
        let response = self
            .client
            .get(&url)
            .header(AUTH_HEADER, &self.token)
            .send()
            .await
            .map_err(provisioning_error)?;
        parse_device(response).await
    }

    async fn probe_active(&self, device_id: &str) -> Result<Option<Device>> {
        let device = self.get_device(device_id).await?;
        tracing::debug!(device = device_id, state = %device.state, "Polled device");
        match device.state.as_str() {
            "active" => Ok(Some(device)),
            "failed" => Err(BenchError::Provisioning {
                message: format!("device {device_id} entered state 'failed'"),
            }),
            _ => Ok(None),
        }
    }

    async fn wait_active(&self, device_id: &str) -> Result<Device> {
        let outcome = self.poll.wait_until(|| self.probe_active(device_id)).await;

        match outcome {
            Ok(device) => Ok(device),
            Err(PollError::Probe(e)) => Err(e),
            Err(PollError::TimedOut { attempts, elapsed }) => Err(BenchError::Provisioning {
                message: format!(
                    "device {device_id} not active after {}s ({attempts} polls)",
                    elapsed.as_secs()
                ),
            }),
        }
    }
}

#[async_trait]
impl Provisioner for MetalProvisioner {
    async fn provision(&self, project_id: &str, hostname: &str) -> Result<ResourceHandle> {
        let created = self.create_device(project_id, hostname).await?;
        tracing::info!(device = %created.id, hostname, "Device requested");

        let device = match self.wait_active(&created.id).await {
            Ok(device) => device,
            Err(e) => {
                // Delete devices that never became active.
                if let Err(release_err) = self.release(&created.id).await {
                    tracing::warn!(
                        device = %created.id,
                        error = %release_err,
                        "Could not delete device after failed provisioning"
                    );
                }
                return Err(e);
            },
        };

        let address = device
            .ip_addresses
            .first()
            .map(|ip| ip.address.clone())
            .ok_or_else(|| BenchError::Provisioning {
                message: format!("device {} is active but has no IP address", device.id),
            })?;

        Ok(ResourceHandle {
            provider_id: device.id,
            network_address: address,
        })
    }

    async fn release(&self, provider_id: &str) -> Result<()> {
        let url = format!("{}/devices/{provider_id}", self.api_url);
        let response = self
            .client
            .delete(&url)
            .header(AUTH_HEADER, &self.token)
            .send()
            .await
            .map_err(provisioning_error)?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            tracing::info!(device = provider_id, "Device already deleted");
            return Ok(());
        }
        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(BenchError::Provisioning {
                message: format!("deleting device {provider_id} failed ({status}): {error_text}"),
            });
        }
        Ok(())
    }
}

async fn parse_device(response: reqwest::Response) -> Result<Device> {
    if !response.status().is_success() {
        let status = response.status();
        let error_text = response.text().await.unwrap_or_default();
        return Err(BenchError::Provisioning {
            message: format!("Metal API returned {status}: {error_text}"),
        });
    }
    response.json::<Device>().await.map_err(provisioning_error)
}

fn provisioning_error(e: reqwest::Error) -> BenchError {
    BenchError::Provisioning {
        message: e.to_string(),
    }
}
