use crate::errors::ServiceError;
use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::time::Duration;
use uuid::Uuid;

/// Product data served by the external catalog.
#[derive(Debug, Clone, Deserialize)]
pub struct ProductInfo {
    pub name: String,
    pub unit_price: Decimal,
    pub active: bool,
}

/// Catalog lookup contract. Implemented by the catalog subsystem; this
/// crate only consumes prices, availability flags, and names.
#[async_trait]
pub trait Catalog: Send + Sync {
    async fn product(&self, product_id: Uuid) -> Result<Option<ProductInfo>, ServiceError>;
}

/// Thin HTTP client over the catalog service.
pub struct HttpCatalog {
    client: reqwest::Client,
    base_url: String,
}

impl HttpCatalog {
    pub fn new(base_url: String, timeout: Duration) -> Result<Self, ServiceError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ServiceError::InternalError(format!("catalog client: {}", e)))?;
        Ok(Self { client, base_url })
    }
}

#[async_trait]
impl Catalog for HttpCatalog {
    async fn product(&self, product_id: Uuid) -> Result<Option<ProductInfo>, ServiceError> {
        let url = format!("{}/v1/products/{}", self.base_url, product_id);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| ServiceError::InternalError(format!("catalog lookup: {}", e)))?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let response = response
            .error_for_status()
            .map_err(|e| ServiceError::InternalError(format!("catalog lookup: {}", e)))?;
        let info: ProductInfo = response
            .json()
            .await
            .map_err(|e| ServiceError::InternalError(format!("catalog decode: {}", e)))?;
        Ok(Some(info))
    }
}
