//! HTTP client for a FHIR-style patient directory.

use std::time::Duration;

use chrono::NaiveDate;
use moka::sync::Cache;
use reqwest::blocking::Client;
use reqwest::StatusCode;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use uuid::Uuid;

use super::{DirectoryError, SubjectDirectory, SubjectRecord};
use crate::sanitize::redact_url;

/// Identifier system carrying the Polish national id number.
pub const PESEL_SYSTEM: &str = "http://hl7.org/fhir/sid/pesel";
const TOKEN_HEADER: &str = "x-api-token";
const CACHE_CAPACITY: u64 = 10_000;

#[derive(Debug, Deserialize)]
struct FhirPatient {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    identifier: Vec<FhirIdentifier>,
    #[serde(default)]
    name: Vec<FhirName>,
    #[serde(default, rename = "birthDate")]
    birth_date: Option<String>,
    #[serde(default)]
    gender: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FhirIdentifier {
    #[serde(default)]
    system: Option<String>,
    #[serde(default)]
    value: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FhirName {
    #[serde(default)]
    family: Option<String>,
    #[serde(default)]
    given: Vec<String>,
}

/// Looks subjects up at `GET {base_url}/api/patients/{guid}`.
pub struct HttpDirectory {
    client: Client,
    base_url: String,
    token: Option<SecretString>,
    cache: Option<Cache<Uuid, SubjectRecord>>,
}

impl HttpDirectory {
    /// `cache_ttl` of zero disables caching.
    pub fn new(
        base_url: impl Into<String>,
        token: Option<SecretString>,
        timeout: Duration,
        cache_ttl: Duration,
    ) -> Result<Self, DirectoryError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| DirectoryError::Unavailable(format!("Failed to build client: {}", e)))?;
        let cache = (!cache_ttl.is_zero()).then(|| {
            Cache::builder()
                .max_capacity(CACHE_CAPACITY)
                .time_to_live(cache_ttl)
                .build()
        });

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token,
            cache,
        })
    }

    fn fetch(&self, reference: &Uuid) -> Result<Option<SubjectRecord>, DirectoryError> {
        let url = format!("{}/api/patients/{}", self.base_url, reference);
        let mut request = self.client.get(&url);
        if let Some(token) = &self.token {
            request = request.header(TOKEN_HEADER, token.expose_secret());
        }

        let response = request.send().map_err(|e| {
            log::error!(
                "Error communicating with subject directory at {}: {}",
                redact_url(&self.base_url),
                e
            );
            DirectoryError::Unavailable(e.without_url().to_string())
        })?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            log::error!("Subject directory answered {} for {}", status, reference);
            return Err(DirectoryError::Unavailable(format!(
                "directory returned status {}",
                status
            )));
        }

        let body = response
            .text()
            .map_err(|e| DirectoryError::Unavailable(e.without_url().to_string()))?;
        let patient: FhirPatient = serde_json::from_str(&body).map_err(|e| {
            log::error!("Unparsable subject directory response: {}", e);
            DirectoryError::InvalidResponse(e.to_string())
        })?;

        parse_fhir_patient(patient, reference).map(Some)
    }
}

impl SubjectDirectory for HttpDirectory {
    fn get_by_reference(&self, reference: &Uuid) -> Result<Option<SubjectRecord>, DirectoryError> {
        if let Some(hit) = self.cache.as_ref().and_then(|c| c.get(reference)) {
            return Ok(Some(hit));
        }

        let record = self.fetch(reference)?;
        if let (Some(cache), Some(record)) = (&self.cache, &record) {
            cache.insert(*reference, record.clone());
        }
        Ok(record)
    }
}

fn parse_fhir_patient(
    patient: FhirPatient,
    requested: &Uuid,
) -> Result<SubjectRecord, DirectoryError> {
    let guid = match patient.id.as_deref() {
        Some(id) => Uuid::parse_str(id)
            .map_err(|_| DirectoryError::InvalidResponse(format!("invalid patient id '{}'", id)))?,
        None => *requested,
    };

    let pesel = patient
        .identifier
        .into_iter()
        .find(|i| i.system.as_deref() == Some(PESEL_SYSTEM))
        .and_then(|i| i.value);

    let (first_name, last_name) = match patient.name.into_iter().next() {
        Some(name) => (name.given.into_iter().next(), name.family),
        None => (None, None),
    };

    let birth_date = patient
        .birth_date
        .map(|s| {
            NaiveDate::parse_from_str(&s, "%Y-%m-%d")
                .map_err(|_| DirectoryError::InvalidResponse(format!("invalid birthDate '{}'", s)))
        })
        .transpose()?;

    Ok(SubjectRecord {
        guid,
        pesel,
        first_name,
        last_name,
        birth_date,
        gender: patient.gender,
    })
}
