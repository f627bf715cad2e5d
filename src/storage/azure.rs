use super::{BlobUploader, blob_name};
use crate::config::{
    STORAGE_CONNECTION_NAME, STORAGE_CONTAINER_KEY, STORAGE_PREFIX_KEY, Settings,
};
use crate::error::BackupError;
use async_trait::async_trait;
use azure_core::error::ErrorKind as AzureErrorKind;
use azure_core::request_options::IfMatchCondition;
use azure_core::{HttpClient, RetryOptions, TransportOptions};
use azure_storage::{CloudLocation, ConnectionString};
use azure_storage_blobs::prelude::{ClientBuilder, ContainerClient};
use chrono::Local;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};
use url::Url;

pub const DUMP_CONTENT_TYPE: &str = "text/plain; charset=utf-8";

const CONTAINER_EXISTS: &str = "ContainerAlreadyExists";
const PUBLIC_ENDPOINT_SUFFIX: &str = "core.windows.net";

/// Uploads dumps as block blobs to Azure Blob Storage (or a compatible
/// emulator). Storage settings are read from [`Settings`] on every upload.
#[derive(Clone)]
pub struct AzureBlobUploader {
    http: Arc<dyn HttpClient>,
    settings: Arc<Settings>,
}

impl AzureBlobUploader {
    pub fn new(settings: Arc<Settings>) -> Result<Self, BackupError> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("dbvault/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(600))
            .build()?;
        Ok(Self {
            http: Arc::new(client),
            settings,
        })
    }

    /// Client for `container` on the account described by a storage
    /// connection string.
    pub fn container_client(
        &self,
        connection_string: &str,
        container: &str,
    ) -> Result<ContainerClient, BackupError> {
        let parsed = ConnectionString::new(connection_string)
            .map_err(|e| BackupError::InvalidStorageAccount(e.to_string()))?;

        let builder = if parsed.use_development_storage == Some(true) {
            ClientBuilder::emulator()
        } else {
            let credentials = parsed
                .storage_credentials()
                .map_err(|e| BackupError::InvalidStorageAccount(e.to_string()))?;
            ClientBuilder::with_location(cloud_location(&parsed)?, credentials)
        };

        Ok(builder
            .retry(RetryOptions::none())
            .transport(TransportOptions::new(self.http.clone()))
            .container_client(container))
    }

    /// Create the container unless it already exists.
    pub async fn ensure_container(&self, container: &ContainerClient) -> Result<(), BackupError> {
        match container.create().await {
            Ok(_) => {
                info!(container = container.container_name(), "storage container created");
                Ok(())
            }
            Err(err) if error_code(&err) == Some(CONTAINER_EXISTS) => {
                debug!(container = container.container_name(), "storage container already exists");
                Ok(())
            }
            Err(err) => Err(storage_error(err)),
        }
    }

    /// Write `sql` as a new block blob. An existing blob with the same name
    /// is never overwritten.
    pub async fn put_blob(
        &self,
        container: &ContainerClient,
        blob: &str,
        sql: &str,
    ) -> Result<(), BackupError> {
        container
            .blob_client(blob)
            .put_block_blob(sql.to_owned())
            .content_type(DUMP_CONTENT_TYPE)
            .if_match(IfMatchCondition::NotMatch("*".to_string()))
            .await
            .map_err(storage_error)?;
        Ok(())
    }
}

#[async_trait]
impl BlobUploader for AzureBlobUploader {
    async fn upload(&self, database: &str, sql: &str) -> Result<String, BackupError> {
        let connection_string = self
            .settings
            .require_connection_string(STORAGE_CONNECTION_NAME)?;
        let container_name = self.settings.require(STORAGE_CONTAINER_KEY)?;
        let prefix = self.settings.require(STORAGE_PREFIX_KEY)?;

        let container = self.container_client(connection_string, container_name)?;
        self.ensure_container(&container).await?;

        let blob = blob_name(prefix, database, Local::now().naive_local());
        self.put_blob(&container, &blob, sql).await?;

        debug!(container = container_name, blob = %blob, bytes = sql.len(), "dump uploaded");
        Ok(blob)
    }
}

/// Where the blob service lives: an explicit `BlobEndpoint`, otherwise the
/// account's endpoint under `EndpointSuffix`.
fn cloud_location(parsed: &ConnectionString<'_>) -> Result<CloudLocation, BackupError> {
    if let Some(endpoint) = parsed.blob_endpoint {
        let account = match parsed.account_name {
            Some(name) => name.to_string(),
            None => Url::parse(endpoint)?
                .host_str()
                .and_then(|host| host.split('.').next())
                .unwrap_or_default()
                .to_string(),
        };
        return Ok(CloudLocation::Custom {
            account,
            uri: endpoint.trim_end_matches('/').to_string(),
        });
    }

    let account = parsed
        .account_name
        .ok_or_else(|| {
            BackupError::InvalidStorageAccount("AccountName or BlobEndpoint is required".into())
        })?
        .to_string();
    Ok(match parsed.endpoint_suffix {
        Some(suffix) if suffix != PUBLIC_ENDPOINT_SUFFIX => CloudLocation::Custom {
            uri: format!("https://{account}.blob.{suffix}"),
            account,
        },
        _ => CloudLocation::Public { account },
    })
}

fn error_code(err: &azure_core::Error) -> Option<&str> {
    match err.kind() {
        AzureErrorKind::HttpResponse { error_code, .. } => error_code.as_deref(),
        _ => None,
    }
}

fn storage_error(err: azure_core::Error) -> BackupError {
    match err.kind() {
        AzureErrorKind::HttpResponse { status, error_code } => BackupError::Storage {
            status: u16::from(*status),
            message: error_code
                .clone()
                .unwrap_or_else(|| "unexpected response".to_string()),
        },
        _ => BackupError::Azure(err),
    }
}
