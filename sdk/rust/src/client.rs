//! HTTP client for the Vibe Store server.

use std::future::Future;
use std::time::Duration;

use reqwest::Client as HttpClient;
use serde::Deserialize;

use crate::cache::EntitlementSource;
use crate::error::{Result, StoreError, StoreErrorCode, map_status_to_error_code};
use crate::types::{
    AppProduct, CheckoutRequest, CheckoutResult, EntitlementSnapshot, Ownership, PlanProduct,
};

/// Default request timeout. Checkout creation waits on the payment processor.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);

/// What the `Storefront` needs from the server beyond entitlement reads.
pub trait StoreBackend: EntitlementSource {
    /// Bearer token for subsequent calls; `None` on sign-out.
    fn set_access_token(&mut self, token: Option<String>);

    fn create_checkout(
        &self,
        request: &CheckoutRequest,
    ) -> impl Future<Output = Result<CheckoutResult>> + Send;

    /// Precise durable ownership check for one app.
    fn check_owned(&self, app_id: &str) -> impl Future<Output = Result<bool>> + Send;
}

/// Vibe Store API client.
///
/// # Example
/// ```rust,no_run
/// use vibe_store_sdk::{StoreBackend, StoreClient};
///
/// # async fn run() -> vibe_store_sdk::Result<()> {
/// let mut client = StoreClient::new("https://store.example.com")?;
/// client.set_access_token(Some("user-access-token".into()));
/// let owned = client.ownership("vs_app_0123456789abcdef0123456789abcdef").await?;
/// println!("owned: {}", owned.owned);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct StoreClient {
    base_url: String,
    http: HttpClient,
    access_token: Option<String>,
}

impl StoreClient {
    pub fn new(base_url: &str) -> Result<Self> {
        Self::with_timeout(base_url, DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(base_url: &str, timeout: Duration) -> Result<Self> {
        if base_url.is_empty() {
            return Err(StoreError::validation("base_url is required"));
        }
        let http = HttpClient::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| StoreError::network(e.to_string()))?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http,
            access_token: None,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn has_access_token(&self) -> bool {
        self.access_token.is_some()
    }

    /// `GET /entitlements` for the token's user.
    pub async fn entitlements(&self) -> Result<EntitlementSnapshot> {
        self.get_with_auth("/entitlements").await
    }

    /// `GET /entitlements/{app_id}`
    pub async fn ownership(&self, app_id: &str) -> Result<Ownership> {
        self.get_with_auth(&format!("/entitlements/{}", urlencoding::encode(app_id)))
            .await
    }

    /// `POST /checkout`
    pub async fn checkout(&self, request: &CheckoutRequest) -> Result<CheckoutResult> {
        let token = self.token()?;
        let response = self
            .http
            .post(format!("{}/checkout", self.base_url))
            .bearer_auth(token)
            .json(request)
            .send()
            .await?;
        handle_response(response).await
    }

    /// `GET /apps/{app_id}` (no auth)
    pub async fn app(&self, app_id: &str) -> Result<AppProduct> {
        let response = self
            .http
            .get(format!("{}/apps/{}", self.base_url, urlencoding::encode(app_id)))
            .send()
            .await?;
        handle_response(response).await
    }

    /// `GET /plans` (no auth)
    pub async fn plans(&self) -> Result<Vec<PlanProduct>> {
        let response = self
            .http
            .get(format!("{}/plans", self.base_url))
            .send()
            .await?;
        handle_response(response).await
    }

    fn token(&self) -> Result<&str> {
        self.access_token
            .as_deref()
            .ok_or_else(StoreError::no_session)
    }

    async fn get_with_auth<T: for<'de> Deserialize<'de>>(&self, path: &str) -> Result<T> {
        let token = self.token()?;
        let response = self
            .http
            .get(format!("{}{}", self.base_url, path))
            .bearer_auth(token)
            .send()
            .await?;
        handle_response(response).await
    }
}

impl std::fmt::Debug for StoreClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreClient")
            .field("base_url", &self.base_url)
            .field("access_token", &self.access_token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl EntitlementSource for StoreClient {
    /// The server answers for the token's user; the cache checks it matches.
    async fn fetch_entitlements(&self, _user_id: &str) -> Result<EntitlementSnapshot> {
        self.entitlements().await
    }
}

impl StoreBackend for StoreClient {
    fn set_access_token(&mut self, token: Option<String>) {
        self.access_token = token;
    }

    async fn create_checkout(&self, request: &CheckoutRequest) -> Result<CheckoutResult> {
        self.checkout(request).await
    }

    async fn check_owned(&self, app_id: &str) -> Result<bool> {
        Ok(self.ownership(app_id).await?.owned)
    }
}

/// Error body rendered by the server: `{error, details?, retriable?}`.
#[derive(Deserialize)]
struct ErrorResponse {
    error: Option<String>,
    details: Option<String>,
    #[serde(default)]
    retriable: bool,
}

/// Turn a non-2xx response into a `StoreError`, parse the body otherwise.
pub(crate) async fn handle_response<T: for<'de> Deserialize<'de>>(
    response: reqwest::Response,
) -> Result<T> {
    let status = response.status().as_u16();

    if !response.status().is_success() {
        let body: ErrorResponse = response.json().await.unwrap_or(ErrorResponse {
            error: None,
            details: None,
            retriable: false,
        });
        return Err(error_from_body(status, body));
    }

    response.json().await.map_err(Into::into)
}

fn error_from_body(status: u16, body: ErrorResponse) -> StoreError {
    let message = match (&body.error, &body.details) {
        (Some(err), Some(details)) => format!("{}: {}", err, details),
        (Some(err), None) => err.clone(),
        (None, Some(details)) => details.clone(),
        (None, None) => format!("Request failed: {}", status),
    };
    let code = if body.retriable {
        StoreErrorCode::Unavailable
    } else {
        map_status_to_error_code(status)
    };
    StoreError::with_status(code, message, status)
}
