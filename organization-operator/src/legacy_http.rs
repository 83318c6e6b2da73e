//! HTTP client for the legacy companyd and credentiald services

use std::time::Duration;

use async_trait::async_trait;
use organization_core::{Credential, DirectoryError, EntryFields, LegacyDirectory};
use reqwest::{Client, Response, StatusCode};
use tracing::debug;

pub struct HttpLegacyDirectory {
    client: Client,
    companyd: String,
    credentiald: String,
}

impl HttpLegacyDirectory {
    pub fn new(
        companyd: impl Into<String>,
        credentiald: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            companyd: companyd.into().trim_end_matches('/').to_string(),
            credentiald: credentiald.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn company_url(&self, id: &str) -> String {
        format!("{}/v1/companies/{id}/", self.companyd)
    }

    pub fn credentials_url(&self, organization: &str) -> String {
        format!("{}/v4/organizations/{organization}/credentials/", self.credentiald)
    }
}

fn transport(err: &reqwest::Error) -> DirectoryError {
    DirectoryError::Transport(err.to_string())
}

async fn unexpected(response: Response) -> DirectoryError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    DirectoryError::Transport(format!("unexpected status {status}: {}", body.trim()))
}

#[async_trait]
impl LegacyDirectory for HttpLegacyDirectory {
    async fn create_entry(&self, id: &str, fields: &EntryFields) -> Result<(), DirectoryError> {
        let url = self.company_url(id);
        debug!(%url, "creating company");
        let response = self
            .client
            .post(&url)
            .json(fields)
            .send()
            .await
            .map_err(|err| transport(&err))?;

        match response.status() {
            status if status.is_success() => Ok(()),
            StatusCode::CONFLICT => Err(DirectoryError::AlreadyExists(id.to_string())),
            _ => Err(unexpected(response).await),
        }
    }

    async fn delete_entry(&self, id: &str) -> Result<(), DirectoryError> {
        let url = self.company_url(id);
        debug!(%url, "deleting company");
        let response = self
            .client
            .delete(&url)
            .send()
            .await
            .map_err(|err| transport(&err))?;

        match response.status() {
            status if status.is_success() => Ok(()),
            StatusCode::NOT_FOUND => Err(DirectoryError::NotFound(id.to_string())),
            _ => Err(unexpected(response).await),
        }
    }

    async fn list_credentials(&self, organization: &str) -> Result<Vec<Credential>, DirectoryError> {
        let url = self.credentials_url(organization);
        debug!(%url, "listing credentials");
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|err| transport(&err))?;

        match response.status() {
            // credentiald answers 404 for organizations it never saw
            StatusCode::NOT_FOUND => Ok(Vec::new()),
            status if status.is_success() => response
                .json::<Vec<Credential>>()
                .await
                .map_err(|err| transport(&err)),
            _ => Err(unexpected(response).await),
        }
    }
}
