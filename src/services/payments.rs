use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;

use crate::config::Config;
use crate::error::{AppError, Result};
use crate::models::PaymentProduct;
use crate::utils::path;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CheckoutItem {
    pub title: &'static str,
    pub quantity: u32,
    pub unit_price: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckoutPreference {
    pub init_point: String,
    pub preference_id: String,
}

pub fn checkout_item(product: PaymentProduct) -> CheckoutItem {
    let (title, unit_price) = match product {
        PaymentProduct::Palpites => ("Secret Picks (1 day)", 4.90),
        PaymentProduct::Vip => ("VIP Access (7 days)", 18.90),
        PaymentProduct::Gps => ("GPS do Dinheiro", 97.00),
    };
    CheckoutItem { title, quantity: 1, unit_price }
}

/// Where the buyer lands after an approved payment; the query flag tells the
/// front-end which product to unlock.
pub fn success_url(product: PaymentProduct, site_url: &str) -> String {
    let flag = match product {
        PaymentProduct::Palpites => "liberado=1",
        PaymentProduct::Vip => "vip=1",
        PaymentProduct::Gps => "gps=1",
    };
    format!("{}/?{}", site_url.trim_end_matches('/'), flag)
}

/// Checkout preference body: Brazilian site, boleto excluded, immediate
/// redirect on approval.
pub fn preference_payload(product: PaymentProduct, site_url: &str) -> Value {
    let site = site_url.trim_end_matches('/');
    json!({
        "site_id": "MLB",
        "items": [checkout_item(product)],
        "payment_methods": {
            "excluded_payment_types": [{ "id": "ticket" }]
        },
        "back_urls": {
            "success": success_url(product, site),
            "failure": format!("{}/?payment=failed", site),
            "pending": format!("{}/?payment=pending", site)
        },
        "auto_return": "approved",
        "binary_mode": true
    })
}

/// Preference id of an approved payment notification, if the body is one.
/// Anything unreadable is ignored.
pub fn approved_preference(body: &[u8]) -> Option<String> {
    let event: Value = serde_json::from_slice(body).ok()?;
    let approved = path(&event, &["data", "status"]).and_then(|s| s.as_str()) == Some("approved");
    if !approved {
        return None;
    }
    path(&event, &["data", "preference_id"])
        .and_then(|id| id.as_str())
        .filter(|id| !id.is_empty())
        .map(str::to_string)
}

pub struct PaymentGateway {
    client: Client,
    base_url: String,
    access_token: Option<String>,
    site_url: String,
}

impl PaymentGateway {
    pub fn new(config: &Config) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.upstream_timeout_secs))
            .build()?;

        Ok(Self {
            client,
            base_url: config.mp_base_url.trim_end_matches('/').to_string(),
            access_token: config.mp_access_token.clone(),
            site_url: config.site_url.clone(),
        })
    }

    pub async fn create_preference(&self, product: PaymentProduct) -> Result<CheckoutPreference> {
        let token = self
            .access_token
            .as_deref()
            .ok_or_else(|| AppError::Config("MP_ACCESS_TOKEN not set".to_string()))?;

        let response = self
            .client
            .post(format!("{}/checkout/preferences", self.base_url))
            .bearer_auth(token)
            .json(&preference_payload(product, &self.site_url))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            tracing::error!("Payment provider returned {}: {}", status, body);
            return Err(AppError::Upstream("Payment provider request failed.".to_string()));
        }

        let created: Value = response.json().await?;
        let field = |name: &str| created.get(name).and_then(|v| v.as_str()).map(str::to_string);
        match (field("init_point"), field("id")) {
            (Some(init_point), Some(preference_id)) => {
                tracing::info!("Checkout preference {} created for {}", preference_id, product.as_str());
                Ok(CheckoutPreference { init_point, preference_id })
            }
            _ => Err(AppError::Upstream("Payment provider response is missing the preference id.".to_string())),
        }
    }
}
