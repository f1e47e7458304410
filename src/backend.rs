//! Client side of the imaging REST API.
//!
//! The viewer only needs three calls from the backend: a processed 2D slice,
//! a downsampled volume buffer and the upload endpoint that registers new
//! studies. [`ImagingBackend`] is the seam the fetch controller, the volume
//! loader and the study registry are generic over; [`HttpBackend`] is the
//! production implementation over `reqwest`.

use crate::config::ViewerConfig;
use crate::error::{ImagingError, Result};
use crate::slice_cache::SliceRequest;
use crate::study::StudyId;

use log::debug;
use reqwest::header::AUTHORIZATION;
use reqwest::multipart::{Form, Part};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::future::Future;

/// Body of `POST /imaging/process/`
#[derive(Clone, Debug, Default, Deserialize)]
pub struct ProcessResponse {
    #[serde(default)]
    pub success: bool,
    pub image: Option<String>,
    pub total_slices: Option<u32>,
    pub current_slice: Option<u32>,
    pub error: Option<String>,
}

/// Body of `POST /imaging/volume-data/`
#[derive(Clone, Debug, Default, Deserialize)]
pub struct VolumeResponse {
    #[serde(default)]
    pub success: bool,
    pub data: Option<String>,
    /// (depth, height, width)
    pub dimensions: Option<[usize; 3]>,
    pub spacing: Option<[f64; 3]>,
    pub error: Option<String>,
}

/// Body of `POST /imaging/upload/`
#[derive(Clone, Debug, Deserialize)]
pub struct UploadResponse {
    pub id: StudyId,
    #[serde(default)]
    pub file: Option<String>,
}

#[derive(Serialize)]
struct VolumeRequest {
    file_id: StudyId,
    target_size: u32,
}

#[derive(Deserialize)]
struct ErrorBody {
    error: Option<String>,
    detail: Option<String>,
}

pub trait ImagingBackend: Send + Sync + 'static {
    fn process_slice(
        &self,
        request: &SliceRequest,
    ) -> impl Future<Output = Result<ProcessResponse>> + Send;

    fn volume_data(
        &self,
        study: StudyId,
        target_size: u32,
    ) -> impl Future<Output = Result<VolumeResponse>> + Send;

    fn upload(
        &self,
        file_name: &str,
        bytes: Vec<u8>,
    ) -> impl Future<Output = Result<UploadResponse>> + Send;
}

pub struct HttpBackend {
    client: reqwest::Client,
    base_url: String,
    authorization: Option<String>,
}

impl HttpBackend {
    pub fn new(config: &ViewerConfig) -> Result<Self> {
        config.validate()?;
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()?;
        let authorization = config
            .auth_token
            .as_ref()
            .map(|token| format!("{} {token}", config.auth_scheme));

        Ok(Self {
            client,
            base_url: config.api_base_url.trim_end_matches('/').to_string(),
            authorization,
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{path}", self.base_url)
    }

    fn post(&self, path: &str) -> reqwest::RequestBuilder {
        let builder = self.client.post(self.endpoint(path));
        match &self.authorization {
            Some(value) => builder.header(AUTHORIZATION, value),
            None => builder,
        }
    }

    async fn read_json<T: DeserializeOwned>(response: reqwest::Response) -> Result<T> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ErrorBody>(&body)
                .ok()
                .and_then(|b| b.error.or(b.detail))
                .unwrap_or(body);
            return Err(ImagingError::Status {
                status: status.as_u16(),
                message,
            });
        }
        Ok(response.json::<T>().await?)
    }
}

impl ImagingBackend for HttpBackend {
    async fn process_slice(&self, request: &SliceRequest) -> Result<ProcessResponse> {
        debug!(
            "POST imaging/process study={} plane={} slice={}",
            request.study, request.plane, request.slice_index
        );
        let response = self.post("imaging/process/").json(request).send().await?;
        Self::read_json(response).await
    }

    async fn volume_data(&self, study: StudyId, target_size: u32) -> Result<VolumeResponse> {
        debug!("POST imaging/volume-data study={study} target_size={target_size}");
        let body = VolumeRequest {
            file_id: study,
            target_size,
        };
        let response = self.post("imaging/volume-data/").json(&body).send().await?;
        Self::read_json(response).await
    }

    async fn upload(&self, file_name: &str, bytes: Vec<u8>) -> Result<UploadResponse> {
        debug!("POST imaging/upload file={file_name} ({} bytes)", bytes.len());
        let part = Part::bytes(bytes).file_name(file_name.to_string());
        let form = Form::new().part("file", part);
        let response = self.post("imaging/upload/").multipart(form).send().await?;
        Self::read_json(response).await
    }
}
