//! Client for the public APIs behind the fact, color and horoscope commands.

use crate::config::ResourcesConfig;
use crate::error::ResourceError;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::collections::BTreeMap;
use tracing::{debug, instrument};

/// What a number fact is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FactKind {
    Number,
    Math,
    Year,
    /// `month/day`
    Date,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Rgb {
    pub red: u8,
    pub green: u8,
    pub blue: u8,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Hsv {
    pub hue: u16,
    pub saturation: u8,
    pub value: u8,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Color {
    pub title: String,
    pub hex: String,
    pub rgb: Rgb,
    pub hsv: Hsv,
    #[serde(rename = "imageUrl")]
    pub image_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Horoscope {
    pub sunsign: String,
    pub horoscope: String,
    /// `YYYY-MM-DD`
    pub date: String,
    #[serde(default)]
    pub meta: BTreeMap<String, serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct ApiMessage {
    message: Option<String>,
}

/// Resource API client.
#[derive(Clone)]
pub struct ResourceClient {
    client: Client,
    numbers_url: String,
    colors_url: String,
    horoscope_url: String,
}

impl ResourceClient {
    pub fn new(config: &ResourcesConfig) -> Result<Self, ResourceError> {
        let client = Client::builder().timeout(config.request_timeout).build()?;

        Ok(Self {
            client,
            numbers_url: config.numbers_api_url.trim_end_matches('/').to_string(),
            colors_url: config.colors_api_url.trim_end_matches('/').to_string(),
            horoscope_url: config.horoscope_api_url.trim_end_matches('/').to_string(),
        })
    }

    /// A fact about a number, year or date. `value` must already be valid
    /// for `kind`.
    #[instrument(skip(self))]
    pub async fn number_fact(&self, kind: FactKind, value: &str) -> Result<String, ResourceError> {
        let url = match kind {
            FactKind::Number => format!("{}/{}", self.numbers_url, value),
            FactKind::Math => format!("{}/{}/math", self.numbers_url, value),
            FactKind::Year => format!("{}/{}/year", self.numbers_url, value),
            FactKind::Date => format!("{}/{}/date", self.numbers_url, value),
        };

        let response = self.client.get(url).send().await?;
        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(ResourceError::NotFound);
        }
        if !status.is_success() {
            return Err(self.extract_error(response).await);
        }
        Ok(response.text().await?)
    }

    #[instrument(skip(self))]
    pub async fn color_by_hex(&self, hex: &str) -> Result<Color, ResourceError> {
        let url = format!("{}/color/{}", self.colors_url, hex.to_uppercase());
        self.first_color(&url, &[]).await
    }

    #[instrument(skip(self))]
    pub async fn search_colors(&self, keywords: &str) -> Result<Color, ResourceError> {
        let url = format!("{}/colors", self.colors_url);
        self.first_color(&url, &[("keywords", keywords), ("numResults", "1")])
            .await
    }

    #[instrument(skip(self))]
    pub async fn random_color(&self) -> Result<Color, ResourceError> {
        let url = format!("{}/colors/random", self.colors_url);
        self.first_color(&url, &[("numResults", "1")]).await
    }

    async fn first_color(&self, url: &str, query: &[(&str, &str)]) -> Result<Color, ResourceError> {
        let response = self
            .client
            .get(url)
            .query(query)
            .query(&[("format", "json")])
            .send()
            .await?;

        let colors: Vec<Color> = self.handle_response(response).await?;
        colors.into_iter().next().ok_or(ResourceError::NotFound)
    }

    /// `day` is one of `today`, `tomorrow` or `yesterday`.
    #[instrument(skip(self))]
    pub async fn horoscope(&self, sign: &str, day: &str) -> Result<Horoscope, ResourceError> {
        let url = format!(
            "{}/horoscope/{}/{}",
            self.horoscope_url,
            urlencoding::encode(sign),
            day
        );
        let response = self.client.get(url).send().await?;

        match response.status() {
            StatusCode::NOT_FOUND | StatusCode::SERVICE_UNAVAILABLE => Err(ResourceError::NotFound),
            StatusCode::BAD_REQUEST => {
                let body: ApiMessage = self.decode(response).await?;
                Err(ResourceError::BadRequest(body.message.unwrap_or_default()))
            }
            _ => self.handle_response(response).await,
        }
    }

    #[instrument(skip(self))]
    pub async fn sun_signs(&self) -> Result<Vec<String>, ResourceError> {
        let url = format!("{}/sunsigns", self.horoscope_url);
        let response = self.client.get(url).send().await?;
        self.handle_response(response).await
    }

    async fn decode<T: DeserializeOwned>(&self, response: reqwest::Response) -> Result<T, ResourceError> {
        let body = response.text().await?;
        debug!("Response body: {}", body.chars().take(200).collect::<String>());
        serde_json::from_str(&body).map_err(ResourceError::from)
    }

    async fn handle_response<T: DeserializeOwned>(
        &self,
        response: reqwest::Response,
    ) -> Result<T, ResourceError> {
        if response.status().is_success() {
            self.decode(response).await
        } else {
            Err(self.extract_error(response).await)
        }
    }

    async fn extract_error(&self, response: reqwest::Response) -> ResourceError {
        let status = response.status();
        let message = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".into());
        ResourceError::Api {
            status: status.as_u16(),
            message,
        }
    }
}
