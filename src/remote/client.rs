//! Async PostgREST client
//!
//! Thin wrapper over `reqwest` that knows the `/rest/v1/<table>` layout,
//! the `apikey` + bearer header pair and PostgREST filter syntax. Callers
//! get typed rows back; every non-success status becomes
//! `GameError::PersistenceUnavailable`.

use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::core::error::{GameError, Result};

/// Async client for one PostgREST project
#[derive(Debug, Clone)]
pub struct PostgrestClient {
    client: Client,
    base_url: String,
    api_key: String,
}

/// `column=eq.value` filter value
pub fn eq(value: impl ToString) -> String {
    format!("eq.{}", value.to_string())
}

/// `column=in.(a,b)` filter value
pub fn in_list(values: &[&str]) -> String {
    format!("in.({})", values.join(","))
}

impl PostgrestClient {
    /// Create a client with explicit configuration
    pub fn new(base_url: &str, api_key: &str) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        }
    }

    fn endpoint(&self, table: &str) -> String {
        format!("{}/rest/v1/{}", self.base_url, table)
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .header("apikey", &self.api_key)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("content-type", "application/json")
    }

    /// `GET /rest/v1/<table>?<query>` decoded as rows
    pub async fn select<T: DeserializeOwned>(
        &self,
        table: &str,
        query: &[(&str, String)],
    ) -> Result<Vec<T>> {
        let request = self.client.get(self.endpoint(table)).query(query);
        let response = self.authorized(request).send().await?;
        let response = Self::check(table, response).await?;
        Ok(response.json().await?)
    }

    /// `POST /rest/v1/<table>` without reading the inserted rows back
    pub async fn insert<B: Serialize + ?Sized>(&self, table: &str, rows: &B) -> Result<()> {
        let request = self
            .client
            .post(self.endpoint(table))
            .header("Prefer", "return=minimal")
            .json(rows);
        let response = self.authorized(request).send().await?;
        Self::check(table, response).await?;
        Ok(())
    }

    /// `PATCH /rest/v1/<table>?<filter>`
    pub async fn update<B: Serialize + ?Sized>(
        &self,
        table: &str,
        filter: &[(&str, String)],
        body: &B,
    ) -> Result<()> {
        let request = self
            .client
            .patch(self.endpoint(table))
            .query(filter)
            .header("Prefer", "return=minimal")
            .json(body);
        let response = self.authorized(request).send().await?;
        Self::check(table, response).await?;
        Ok(())
    }

    async fn check(table: &str, response: Response) -> Result<Response> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status();
        let error_text = response.text().await.unwrap_or_default();
        Err(GameError::unavailable(
            "postgrest",
            format!("{} on {}: {}", status, table, error_text),
        ))
    }
}
