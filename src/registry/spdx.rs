use std::collections::HashMap;
use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::ACCEPT;
use reqwest::Url;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::{debug, info};

use super::{LicenseDetails, LicenseRegistry};
use crate::config::RegistryConfig;
use crate::error::{NoticeError, Result};

#[derive(Debug, Deserialize)]
struct LicenseList {
    licenses: Vec<LicenseEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LicenseEntry {
    license_id: String,
    details_url: String,
}

#[derive(Debug, Deserialize)]
struct ExceptionList {
    exceptions: Vec<ExceptionEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ExceptionEntry {
    license_exception_id: String,
    /// Relative location of the JSON detail record, e.g. `./Classpath-exception-2.0.json`.
    reference: String,
}

/// Detail record for either a license or an exception; the two use different field names.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DetailRecord {
    license_id: Option<String>,
    license_exception_id: Option<String>,
    name: Option<String>,
    license_text: Option<String>,
    license_exception_text: Option<String>,
    license_text_html: Option<String>,
    exception_text_html: Option<String>,
}

impl DetailRecord {
    fn into_details(self, requested: &str) -> Result<LicenseDetails> {
        let id = self
            .license_id
            .or(self.license_exception_id)
            .unwrap_or_else(|| requested.to_string());
        let text = self
            .license_text
            .or(self.license_exception_text)
            .ok_or_else(|| {
                NoticeError::Registry(format!("detail record for '{}' has no license text", id))
            })?;
        Ok(LicenseDetails {
            name: self.name.unwrap_or_else(|| id.clone()),
            id,
            text,
            text_html: self.license_text_html.or(self.exception_text_html),
        })
    }
}

/// Blocking client for the SPDX license list.
///
/// The license and exception catalogs are each fetched on first use and kept
/// for the lifetime of the client; detail records are fetched per lookup.
pub struct SpdxRegistry {
    client: Client,
    license_list_url: String,
    exception_list_url: String,
    licenses: Option<HashMap<String, Url>>,
    exceptions: Option<HashMap<String, Url>>,
}

impl SpdxRegistry {
    pub fn new(config: &RegistryConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| NoticeError::Registry(format!("cannot build HTTP client: {}", e)))?;

        Ok(SpdxRegistry {
            client,
            license_list_url: config.license_list_url.clone(),
            exception_list_url: config.exception_list_url.clone(),
            licenses: None,
            exceptions: None,
        })
    }

    fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T> {
        let transport = |source| NoticeError::Transport {
            url: url.to_string(),
            source,
        };
        let response = self
            .client
            .get(url)
            .header(ACCEPT, "application/json")
            .send()
            .and_then(|r| r.error_for_status())
            .map_err(transport)?;
        response.json::<T>().map_err(transport)
    }

    fn license_location(&mut self, id: &str) -> Result<Option<Url>> {
        if self.licenses.is_none() {
            let base = parse_url(&self.license_list_url)?;
            let list: LicenseList = self.get_json(&self.license_list_url)?;
            info!(count = list.licenses.len(), "fetched SPDX license list");

            let mut catalog = HashMap::with_capacity(list.licenses.len());
            for entry in list.licenses {
                catalog.insert(entry.license_id, join_url(&base, &entry.details_url)?);
            }
            self.licenses = Some(catalog);
        }
        Ok(self.licenses.as_ref().and_then(|c| c.get(id)).cloned())
    }

    fn exception_location(&mut self, id: &str) -> Result<Option<Url>> {
        if self.exceptions.is_none() {
            let base = parse_url(&self.exception_list_url)?;
            let list: ExceptionList = self.get_json(&self.exception_list_url)?;
            info!(count = list.exceptions.len(), "fetched SPDX exception list");

            let mut catalog = HashMap::with_capacity(list.exceptions.len());
            for entry in list.exceptions {
                catalog.insert(entry.license_exception_id, join_url(&base, &entry.reference)?);
            }
            self.exceptions = Some(catalog);
        }
        Ok(self.exceptions.as_ref().and_then(|c| c.get(id)).cloned())
    }
}

impl LicenseRegistry for SpdxRegistry {
    fn resolve(&mut self, id: &str) -> Result<Option<LicenseDetails>> {
        let location = match self.license_location(id)? {
            Some(url) => url,
            None => match self.exception_location(id)? {
                Some(url) => url,
                None => {
                    debug!(license = id, "not in the SPDX license or exception list");
                    return Ok(None);
                }
            },
        };

        debug!(license = id, url = %location, "fetching license details");
        let record: DetailRecord = self.get_json(location.as_str())?;
        record.into_details(id).map(Some)
    }
}

fn parse_url(url: &str) -> Result<Url> {
    Url::parse(url).map_err(|e| NoticeError::Registry(format!("invalid registry URL '{}': {}", url, e)))
}

/// Resolve a catalog-supplied location, which may be absolute or relative to the catalog.
fn join_url(base: &Url, location: &str) -> Result<Url> {
    base.join(location).map_err(|e| {
        NoticeError::Registry(format!("invalid detail location '{}': {}", location, e))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::{Matcher, Server, ServerGuard};

    const LICENSES: &str = r#"{
        "licenseListVersion": "3.21",
        "licenses": [
            {"licenseId": "MIT", "name": "MIT License", "detailsUrl": "./MIT.json"},
            {"licenseId": "Apache-2.0", "name": "Apache License 2.0", "detailsUrl": "./Apache-2.0.json"}
        ]
    }"#;

    const EXCEPTIONS: &str = r#"{
        "exceptions": [
            {"licenseExceptionId": "Classpath-exception-2.0", "reference": "./Classpath-exception-2.0.json"}
        ]
    }"#;

    fn registry_for(server: &ServerGuard) -> SpdxRegistry {
        let config = RegistryConfig {
            license_list_url: format!("{}/licenses.json", server.url()),
            exception_list_url: format!("{}/exceptions.json", server.url()),
            ..RegistryConfig::default()
        };
        SpdxRegistry::new(&config).unwrap()
    }

    #[test]
    fn test_resolve_license_fetches_catalog_once() {
        let mut server = Server::new();
        let catalog = server
            .mock("GET", "/licenses.json")
            .with_header("content-type", "application/json")
            .with_body(LICENSES)
            .expect(1)
            .create();
        let mit = server
            .mock("GET", "/MIT.json")
            .with_body(r#"{"licenseId": "MIT", "name": "MIT License", "licenseText": "Permission is hereby granted"}"#)
            .create();
        let apache = server
            .mock("GET", "/Apache-2.0.json")
            .with_body(r#"{"licenseId": "Apache-2.0", "name": "Apache License 2.0", "licenseText": "TERMS AND CONDITIONS", "licenseTextHtml": "<p>TERMS</p>"}"#)
            .create();

        let mut registry = registry_for(&server);
        let details = registry.resolve("MIT").unwrap().unwrap();
        assert_eq!(details.id, "MIT");
        assert_eq!(details.name, "MIT License");
        assert_eq!(details.text, "Permission is hereby granted");
        assert_eq!(details.text_html, None);

        let details = registry.resolve("Apache-2.0").unwrap().unwrap();
        assert_eq!(details.text_html.as_deref(), Some("<p>TERMS</p>"));

        catalog.assert();
        mit.assert();
        apache.assert();
    }

    #[test]
    fn test_resolve_exception() {
        let mut server = Server::new();
        server.mock("GET", "/licenses.json").with_body(LICENSES).create();
        let exceptions = server
            .mock("GET", "/exceptions.json")
            .with_body(EXCEPTIONS)
            .expect(1)
            .create();
        server
            .mock("GET", "/Classpath-exception-2.0.json")
            .with_body(r#"{"licenseExceptionId": "Classpath-exception-2.0", "name": "Classpath exception 2.0", "licenseExceptionText": "Linking this library statically", "exceptionTextHtml": "<p>Linking</p>"}"#)
            .create();

        let mut registry = registry_for(&server);
        let details = registry.resolve("Classpath-exception-2.0").unwrap().unwrap();
        assert_eq!(details.id, "Classpath-exception-2.0");
        assert_eq!(details.text, "Linking this library statically");
        assert_eq!(details.text_html.as_deref(), Some("<p>Linking</p>"));

        // unknown identifiers reuse both cached catalogs
        assert_eq!(registry.resolve("LicenseRef-custom").unwrap(), None);
        exceptions.assert();
    }

    #[test]
    fn test_absolute_details_url() {
        let mut server = Server::new();
        let body = format!(
            r#"{{"licenses": [{{"licenseId": "MIT", "detailsUrl": "{}/details/MIT.json"}}]}}"#,
            server.url()
        );
        server.mock("GET", "/licenses.json").with_body(body).create();
        let detail = server
            .mock("GET", "/details/MIT.json")
            .match_header("accept", Matcher::Any)
            .with_body(r#"{"licenseId": "MIT", "name": "MIT License", "licenseText": "text"}"#)
            .create();

        let mut registry = registry_for(&server);
        assert!(registry.resolve("MIT").unwrap().is_some());
        detail.assert();
    }

    #[test]
    fn test_catalog_failure_is_transport_error() {
        let mut server = Server::new();
        server.mock("GET", "/licenses.json").with_status(500).create();

        let mut registry = registry_for(&server);
        let err = registry.resolve("MIT").unwrap_err();
        assert!(matches!(err, NoticeError::Transport { .. }), "{:?}", err);
    }

    #[test]
    fn test_unparseable_catalog_is_transport_error() {
        let mut server = Server::new();
        server.mock("GET", "/licenses.json").with_body("not json").create();

        let mut registry = registry_for(&server);
        assert!(matches!(
            registry.resolve("MIT"),
            Err(NoticeError::Transport { .. })
        ));
    }

    #[test]
    fn test_detail_without_text_is_registry_error() {
        let mut server = Server::new();
        server.mock("GET", "/licenses.json").with_body(LICENSES).create();
        server
            .mock("GET", "/MIT.json")
            .with_body(r#"{"licenseId": "MIT", "name": "MIT License"}"#)
            .create();

        let mut registry = registry_for(&server);
        assert!(matches!(
            registry.resolve("MIT"),
            Err(NoticeError::Registry(_))
        ));
    }
}
