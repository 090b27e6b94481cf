//! Allow-listed HTTP client shared by the source adapters and LLM backends.

use reqwest::{Client, ClientBuilder};
use std::collections::HashSet;
use std::time::Duration;
use url::Url;

use crate::error::BlattError;

/// Hosts every Blatt deployment needs to reach.
const DEFAULT_DOMAINS: &[&str] = &[
    "api.semanticscholar.org", // Semantic Scholar graph API
    "export.arxiv.org",        // arXiv Atom feed
    "api.crossref.org",        // CrossRef works
    "doi.org",                 // DOI resolver
    "api.anthropic.com",       // Anthropic LLMs
    "api.openai.com",          // OpenAI LLMs
    "localhost",               // Ollama local
    "127.0.0.1",               // Localhost alt
];

/// An HTTP client that only issues requests to approved domains.
#[derive(Debug, Clone)]
pub struct SandboxClient {
    client: Client,
    allowlist: HashSet<String>,
}

impl SandboxClient {
    /// Client with the default allowlist and a 30 s request timeout.
    pub fn new() -> Result<Self, BlattError> {
        Self::with_options(Duration::from_secs(30), None)
    }

    /// Client with a custom request timeout and optional User-Agent.
    pub fn with_options(timeout: Duration, user_agent: Option<&str>) -> Result<Self, BlattError> {
        let allowlist = DEFAULT_DOMAINS.iter().map(|d| d.to_string()).collect();

        let mut builder = ClientBuilder::new().timeout(timeout);
        if let Some(ua) = user_agent {
            builder = builder.user_agent(ua.to_string());
        }
        let client = builder
            .build()
            .map_err(|e| BlattError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self { client, allowlist })
    }

    /// Appends an exact hostname to the allowlist.
    pub fn allow_domain(&mut self, domain: &str) {
        self.allowlist.insert(domain.to_string());
    }

    /// Whether a URL is permitted. Subdomains of allowed hosts pass too.
    pub fn is_allowed(&self, url: &str) -> bool {
        let Ok(parsed) = Url::parse(url) else { return false };
        let Some(host) = parsed.host_str() else { return false };
        self.allowlist
            .iter()
            .any(|allowed| host == allowed || host.ends_with(&format!(".{}", allowed)))
    }

    pub fn get(&self, url: &str) -> Result<reqwest::RequestBuilder, BlattError> {
        self.check(url)?;
        Ok(self.client.get(url))
    }

    pub fn post(&self, url: &str) -> Result<reqwest::RequestBuilder, BlattError> {
        self.check(url)?;
        Ok(self.client.post(url))
    }

    fn check(&self, url: &str) -> Result<(), BlattError> {
        if self.is_allowed(url) {
            Ok(())
        } else {
            Err(BlattError::Security(format!(
                "Network capabilities capped: domain not in allowlist for URL {}",
                url
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_hosts_allowed() {
        let client = SandboxClient::new().unwrap();
        assert!(client.is_allowed("https://api.semanticscholar.org/graph/v1/paper/search"));
        assert!(client.is_allowed("http://export.arxiv.org/api/query"));
        assert!(client.is_allowed("http://localhost:11434/v1/chat/completions"));
    }

    #[test]
    fn test_unknown_host_rejected() {
        let client = SandboxClient::new().unwrap();
        assert!(!client.is_allowed("https://evil.example.com/"));
        assert!(!client.is_allowed("not a url"));
        assert!(client.get("https://evil.example.com/").is_err());
    }

    #[test]
    fn test_allow_domain_admits_subdomains() {
        let mut client = SandboxClient::new().unwrap();
        client.allow_domain("example.org");
        assert!(client.is_allowed("https://api.example.org/v1"));
        assert!(!client.is_allowed("https://example.org.attacker.net/"));
    }
}
