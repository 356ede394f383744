//! Scrape a single Prometheus-compatible endpoint

use chrono::Utc;
use color_eyre::eyre::{bail, Context, Report};
use reqwest::{StatusCode, Url};
use tracing::{debug, info};

use crate::config::{BasicAuth, Endpoint};
use crate::exposition;
use crate::sample::{extract_all, Sample};
use crate::tls::ClientMaterial;

/// A client for one exporter, built once from the resolved endpoint configuration.
pub struct Element {
    /// the prometheus-exporting endpoint to query
    url: Url,
    client: reqwest::Client,
    basic_auth: Option<BasicAuth>,
}

impl TryFrom<&Endpoint> for Element {
    type Error = Report;
    fn try_from(value: &Endpoint) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl Element {
    /// Loads any client TLS material up front, so a bad certificate path fails before the
    /// request is made.
    pub fn new(endpoint: &Endpoint) -> Result<Self, Report> {
        let url = Url::parse(&endpoint.url)
            .wrap_err_with(|| format!("invalid url {:?}", endpoint.url))?;

        let mut builder = reqwest::Client::builder().timeout(endpoint.timeout);
        if let Some(tls) = &endpoint.client_tls {
            builder = ClientMaterial::load(tls)?.apply(builder);
        }
        if endpoint.insecure_skip_verify {
            // also skips the hostname check
            builder = builder.danger_accept_invalid_certs(true);
        }

        Ok(Self {
            url,
            client: builder.build().wrap_err("building HTTP client")?,
            basic_auth: endpoint.basic_auth.clone(),
        })
    }

    /// Fetch and parse the exposition. Families that cannot be converted to samples are
    /// skipped; a malformed body fails the whole scrape.
    pub async fn scrape(&self) -> Result<Vec<Sample>, Report> {
        let body = self.collect_exposition().await?;
        let scrape_time = Utc::now();
        let families = exposition::parse(&body).wrap_err("Parsing prometheus metrics")?;
        let samples = extract_all(&families, scrape_time);
        info!(
            url = %self.url,
            families = families.len(),
            samples = samples.len(),
            "scraped"
        );
        Ok(samples)
    }

    async fn collect_exposition(&self) -> Result<String, Report> {
        let mut request = self.client.get(self.url.clone());
        if let Some(BasicAuth { user, password }) = &self.basic_auth {
            request = request.basic_auth(user, Some(password));
        }

        debug!(url = %self.url, "requesting metrics");
        let response = request
            .send()
            .await
            .wrap_err("Network request to get prometheus metrics endpoint")?;
        let status = response.status();
        debug!(%status, "response");
        if status != StatusCode::OK {
            bail!(
                "exporter returned non OK HTTP response status: {}",
                status
            );
        }

        response
            .text()
            .await
            .wrap_err("Reading response from prometheus metrics endpoint")
    }
}
