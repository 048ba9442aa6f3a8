use async_trait::async_trait;
use pkiwarden_types::{CaClient, CaError, CertData, IssueArgs, Signature, SignatureArgs};
use reqwest::{RequestBuilder, Response};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tracing::{debug, instrument, trace};

use crate::{config::VaultConfig, error::VaultError};

const TOKEN_HEADER: &str = "X-Vault-Token";

#[derive(Deserialize)]
struct Envelope<T> {
    data: T,
}

#[derive(Deserialize)]
struct IssuedData {
    certificate: String,
    #[serde(default)]
    private_key: Option<String>,
    #[serde(default)]
    issuing_ca: Option<String>,
    #[serde(default)]
    ca_chain: Option<Vec<String>>,
    #[serde(default)]
    serial_number: Option<String>,
}

impl IssuedData {
    fn ca_data(&self) -> Option<Vec<u8>> {
        match &self.ca_chain {
            Some(chain) if !chain.is_empty() => Some(chain.join("\n").into_bytes()),
            _ => self.issuing_ca.clone().map(String::into_bytes),
        }
    }
}

#[derive(Deserialize)]
struct AcmeSecret {
    certificate: String,
    #[serde(default)]
    private_key: Option<String>,
    #[serde(default)]
    issuer: Option<String>,
}

#[derive(Serialize)]
struct CertificateRequest<'a> {
    common_name: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    ttl: Option<&'a str>,
    #[serde(skip_serializing_if = "String::is_empty")]
    ip_sans: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    alt_names: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    csr: Option<&'a str>,
}

impl<'a> CertificateRequest<'a> {
    fn new(args: &'a IssueArgs, csr: Option<&'a str>) -> Self {
        Self {
            common_name: &args.common_name,
            ttl: args.ttl.as_deref(),
            ip_sans: args.ip_sans.join(","),
            alt_names: args.alt_names.join(","),
            csr,
        }
    }
}

#[derive(Serialize)]
struct RevokeRequest<'a> {
    serial_number: &'a str,
}

#[derive(Serialize)]
struct TidyRequest {
    tidy_cert_store: bool,
    tidy_revoked_certs: bool,
}

pub struct VaultClient {
    http: reqwest::Client,
    config: VaultConfig,
}

impl VaultClient {
    pub fn new(config: VaultConfig) -> Result<Self, VaultError> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()?;
        Ok(Self { http, config })
    }

    fn url(&self, path: &str) -> String {
        format!(
            "{}/v1/{}",
            self.config.address.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    fn pki_path(&self, endpoint: &str) -> String {
        format!("{}/{}", self.config.mount.trim_matches('/'), endpoint)
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response, VaultError> {
        let response = request
            .header(TOKEN_HEADER, &self.config.token)
            .send()
            .await?;
        let status = response.status();
        trace!("vault responded with {}", status);
        if status.is_success() {
            return Ok(response);
        }
        let message = response
            .json::<ErrorBody>()
            .await
            .map(|b| b.errors.join("; "))
            .unwrap_or_else(|_| status.to_string());
        Err(VaultError::Status {
            status: status.as_u16(),
            message,
        })
    }

    async fn post<B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<Response, VaultError> {
        self.send(self.http.post(self.url(path)).json(body)).await
    }

    async fn post_json<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, VaultError> {
        let bytes = self.post(path, body).await?.bytes().await?;
        decode(&bytes)
    }

    async fn get_bytes(&self, path: &str) -> Result<Vec<u8>, VaultError> {
        Ok(self
            .send(self.http.get(self.url(path)))
            .await?
            .bytes()
            .await?
            .to_vec())
    }
}

#[derive(Deserialize)]
struct ErrorBody {
    #[serde(default)]
    errors: Vec<String>,
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, VaultError> {
    serde_json::from_slice(bytes).map_err(|e| VaultError::DecodeError(e.to_string()))
}

fn non_empty(value: Option<String>) -> Option<Vec<u8>> {
    value.filter(|v| !v.is_empty()).map(String::into_bytes)
}

#[async_trait]
impl CaClient for VaultClient {
    #[instrument(name = "vault::issue", skip_all, fields(common_name = %args.common_name))]
    async fn issue(&self, args: &IssueArgs) -> Result<CertData, CaError> {
        debug!("requesting certificate");
        let path = self.pki_path(&format!("issue/{}", self.config.role));
        let issued: Envelope<IssuedData> = self
            .post_json(&path, &CertificateRequest::new(args, None))
            .await?;
        let ca_data = issued.data.ca_data();
        Ok(CertData {
            certificate: issued.data.certificate.into_bytes(),
            private_key: non_empty(issued.data.private_key),
            ca_data,
        })
    }

    #[instrument(name = "vault::sign", skip_all, fields(common_name = %args.common_name))]
    async fn sign(&self, csr: &[u8], args: &SignatureArgs) -> Result<Signature, CaError> {
        let csr = std::str::from_utf8(csr)
            .map_err(|_| VaultError::DecodeError("csr is not valid PEM text".into()))?;
        let path = self.pki_path(&format!("sign/{}", self.config.role));
        let signed: Envelope<IssuedData> = self
            .post_json(&path, &CertificateRequest::new(args, Some(csr)))
            .await?;
        let ca_data = signed.data.ca_data();
        let serial = signed
            .data
            .serial_number
            .filter(|s| !s.is_empty())
            .ok_or(VaultError::MissingField("serial_number"))?;
        Ok(Signature {
            certificate: signed.data.certificate.into_bytes(),
            ca_data,
            serial,
        })
    }

    #[instrument(name = "vault::revoke", skip(self))]
    async fn revoke(&self, serial: &str) -> Result<(), CaError> {
        self.post(
            &self.pki_path("revoke"),
            &RevokeRequest {
                serial_number: serial,
            },
        )
        .await?;
        Ok(())
    }

    #[instrument(name = "vault::tidy", skip(self))]
    async fn tidy(&self) -> Result<(), CaError> {
        self.post(
            &self.pki_path("tidy"),
            &TidyRequest {
                tidy_cert_store: true,
                tidy_revoked_certs: true,
            },
        )
        .await?;
        Ok(())
    }

    #[instrument(name = "vault::read_acme", skip(self))]
    async fn read_acme(&self, common_name: &str) -> Result<CertData, CaError> {
        let path = format!(
            "{}/data/{}/{}",
            self.config.kv_mount.trim_matches('/'),
            self.config.acme_prefix.trim_matches('/'),
            common_name
        );
        let bytes = self.get_bytes(&path).await?;
        let secret: Envelope<Envelope<AcmeSecret>> = decode(&bytes)?;
        let secret = secret.data.data;
        if secret.certificate.is_empty() {
            return Err(VaultError::MissingField("certificate").into());
        }
        Ok(CertData {
            certificate: secret.certificate.into_bytes(),
            private_key: non_empty(secret.private_key),
            ca_data: non_empty(secret.issuer),
        })
    }

    async fn fetch_ca_chain(&self) -> Result<Vec<u8>, CaError> {
        Ok(self.get_bytes(&self.pki_path("ca_chain")).await?)
    }

    async fn fetch_ca(&self, binary: bool) -> Result<Vec<u8>, CaError> {
        let endpoint = if binary { "ca" } else { "ca/pem" };
        Ok(self.get_bytes(&self.pki_path(endpoint)).await?)
    }

    async fn fetch_crl(&self, binary: bool) -> Result<Vec<u8>, CaError> {
        let endpoint = if binary { "crl" } else { "crl/pem" };
        Ok(self.get_bytes(&self.pki_path(endpoint)).await?)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use wiremock::{
        matchers::{body_json, body_partial_json, header, method, path},
        Mock, MockServer, ResponseTemplate,
    };

    use super::*;

    fn client(server: &MockServer) -> VaultClient {
        VaultClient::new(VaultConfig::new(server.uri(), "s.token", "web")).unwrap()
    }

    fn issue_args() -> IssueArgs {
        IssueArgs {
            common_name: "example.com".into(),
            ttl: Some("48h".into()),
            ip_sans: vec!["10.0.0.1".into()],
            alt_names: vec!["a.example.com".into(), "b.example.com".into()],
        }
    }

    #[tokio::test]
    async fn issue_sends_request_and_joins_chain() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/pki/issue/web"))
            .and(header("X-Vault-Token", "s.token"))
            .and(body_json(json!({
                "common_name": "example.com",
                "ttl": "48h",
                "ip_sans": "10.0.0.1",
                "alt_names": "a.example.com,b.example.com",
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": {
                    "certificate": "CERT",
                    "private_key": "KEY",
                    "issuing_ca": "ISSUER",
                    "ca_chain": ["INTERMEDIATE", "ROOT"],
                    "serial_number": "1a:2b",
                }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let data = client(&server).issue(&issue_args()).await.unwrap();
        assert_eq!(data.certificate, b"CERT");
        assert_eq!(data.private_key.as_deref(), Some(&b"KEY"[..]));
        assert_eq!(data.ca_data.as_deref(), Some(&b"INTERMEDIATE\nROOT"[..]));
    }

    #[tokio::test]
    async fn sign_falls_back_to_issuing_ca() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/pki/sign/web"))
            .and(body_partial_json(json!({ "csr": "CSR", "common_name": "example.com" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": {
                    "certificate": "CERT",
                    "issuing_ca": "ISSUER",
                    "serial_number": "1a:2b",
                }
            })))
            .mount(&server)
            .await;

        let signature = client(&server)
            .sign(b"CSR", &IssueArgs::new("example.com"))
            .await
            .unwrap();
        assert_eq!(signature.serial, "1a:2b");
        assert_eq!(signature.ca_data.as_deref(), Some(&b"ISSUER"[..]));
    }

    #[tokio::test]
    async fn client_errors_are_permanent() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/pki/revoke"))
            .respond_with(
                ResponseTemplate::new(400).set_body_json(json!({ "errors": ["unknown serial"] })),
            )
            .mount(&server)
            .await;

        let err = client(&server).revoke("ff").await.unwrap_err();
        assert!(err.is_permanent());
        assert!(err.to_string().contains("unknown serial"));
    }

    #[tokio::test]
    async fn rate_limit_and_server_errors_are_retryable() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/pki/tidy"))
            .respond_with(ResponseTemplate::new(429))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v1/pki/ca_chain"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let client = client(&server);
        assert!(!client.tidy().await.unwrap_err().is_permanent());
        assert!(!client.fetch_ca_chain().await.unwrap_err().is_permanent());
    }

    #[tokio::test]
    async fn unreachable_server_is_retryable() {
        let client = VaultClient::new(VaultConfig::new("http://127.0.0.1:1", "t", "web")).unwrap();
        assert!(!client.fetch_ca(true).await.unwrap_err().is_permanent());
    }

    #[tokio::test]
    async fn read_acme_reads_kv_secret() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/secret/data/acme/example.com"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": {
                    "data": {
                        "certificate": "CERT",
                        "private_key": "KEY",
                        "issuer": "",
                    },
                    "metadata": { "version": 3 }
                }
            })))
            .mount(&server)
            .await;

        let data = client(&server).read_acme("example.com").await.unwrap();
        assert_eq!(data.certificate, b"CERT");
        assert_eq!(data.private_key.as_deref(), Some(&b"KEY"[..]));
        assert!(data.ca_data.is_none());
    }

    #[tokio::test]
    async fn malformed_response_is_permanent() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/pki/issue/web"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>"))
            .mount(&server)
            .await;

        let err = client(&server).issue(&issue_args()).await.unwrap_err();
        assert!(err.is_permanent());
    }

    #[tokio::test]
    async fn fetches_raw_blobs() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/pki/crl/pem"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"CRL".to_vec()))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v1/pki/ca"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![0x30, 0x82]))
            .mount(&server)
            .await;

        let client = client(&server);
        assert_eq!(client.fetch_crl(false).await.unwrap(), b"CRL");
        assert_eq!(client.fetch_ca(true).await.unwrap(), vec![0x30, 0x82]);
    }
}
