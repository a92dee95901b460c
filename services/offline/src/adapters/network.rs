//! services/offline/src/adapters/network.rs
//!
//! This module contains the upstream network adapter, which implements the
//! `NetworkClient` port with `reqwest`.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::time::Duration;
use reqwest::multipart::{Form, Part};
use story_offline_core::domain::{FormField, HttpRequest, HttpResponse};
use story_offline_core::ports::{NetworkClient, PortError, PortResult};

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// An adapter that implements the `NetworkClient` port using `reqwest`.
#[derive(Clone)]
pub struct ReqwestNetworkClient {
    client: reqwest::Client,
}

impl ReqwestNetworkClient {
    /// Creates a new `ReqwestNetworkClient`.
    ///
    /// The overall timeout only bounds hung connections; the router applies its
    /// own, shorter race for network-first requests.
    pub fn new(request_timeout: Duration) -> PortResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| PortError::Unexpected(e.to_string()))?;
        Ok(Self { client })
    }
}

fn multipart_form(fields: &[FormField]) -> PortResult<Form> {
    fields.iter().try_fold(Form::new(), |form, field| match field {
        FormField::Text { name, value } => Ok(form.text(name.clone(), value.clone())),
        FormField::File {
            name,
            file_name,
            content_type,
            bytes,
        } => {
            let part = Part::bytes(bytes.to_vec())
                .file_name(file_name.clone())
                .mime_str(content_type)
                .map_err(|e| PortError::Validation(format!("Invalid content type for {}: {}", name, e)))?;
            Ok(form.part(name.clone(), part))
        }
    })
}

//=========================================================================================
// `NetworkClient` Trait Implementation
//=========================================================================================

#[async_trait]
impl NetworkClient for ReqwestNetworkClient {
    async fn fetch(&self, request: &HttpRequest) -> PortResult<HttpResponse> {
        let method = reqwest::Method::from_bytes(request.method.as_bytes())
            .map_err(|e| PortError::Validation(format!("Invalid method: {}", e)))?;

        let mut builder = self.client.request(method, request.url.clone());
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if !request.form.is_empty() {
            builder = builder.multipart(multipart_form(&request.form)?);
        } else if !request.body.is_empty() {
            builder = builder.body(request.body.clone());
        }

        let response = builder
            .send()
            .await
            .map_err(|e| PortError::Connectivity(e.to_string()))?;

        let status = response.status().as_u16();
        let headers: BTreeMap<String, String> = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();

        // A connection dropped mid-body is still a connectivity failure.
        let body = response
            .bytes()
            .await
            .map_err(|e| PortError::Connectivity(e.to_string()))?;

        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }
}
