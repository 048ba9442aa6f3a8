use std::{
    collections::{HashMap, VecDeque},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex,
    },
};

use async_trait::async_trait;
use pkiwarden_types::{CaClient, CaError, CertData, IssueArgs, Signature, SignatureArgs};
use rcgen::{BasicConstraints, CertificateParams, DistinguishedName, DnType, IsCa};
use time::{Duration, OffsetDateTime};

use crate::{error::StorageError, slot::StorageSlot};

#[derive(Default)]
struct MemoryInner {
    data: Mutex<Option<Vec<u8>>>,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
}

/// Shared in-memory slot; clones observe the same data.
#[derive(Clone, Default)]
pub(crate) struct MemorySlot {
    inner: Arc<MemoryInner>,
}

impl MemorySlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_data(data: &[u8]) -> Self {
        let slot = Self::new();
        *slot.inner.data.lock().unwrap() = Some(data.to_vec());
        slot
    }

    pub fn contents(&self) -> Option<Vec<u8>> {
        self.inner.data.lock().unwrap().clone()
    }

    pub fn fail_reads(&self, fail: bool) {
        self.inner.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn fail_writes(&self, fail: bool) {
        self.inner.fail_writes.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl StorageSlot for MemorySlot {
    async fn read(&self) -> Result<Vec<u8>, StorageError> {
        if self.inner.fail_reads.load(Ordering::SeqCst) {
            return Err(StorageError::Other("injected read failure".into()));
        }
        self.contents().ok_or(StorageError::NotFound)
    }

    async fn can_read(&self) -> Result<(), StorageError> {
        self.read().await.map(|_| ())
    }

    async fn write(&self, data: &[u8]) -> Result<(), StorageError> {
        if self.inner.fail_writes.load(Ordering::SeqCst) {
            return Err(StorageError::Other("injected write failure".into()));
        }
        *self.inner.data.lock().unwrap() = Some(data.to_vec());
        Ok(())
    }

    async fn can_write(&self) -> Result<(), StorageError> {
        Ok(())
    }

    fn describe(&self) -> String {
        "memory".into()
    }
}

type Script<T> = Mutex<VecDeque<Result<T, CaError>>>;

/// Scripted CA. Each operation pops its next response; an exhausted script
/// answers with a permanent error.
#[derive(Default)]
pub(crate) struct MockCaClient {
    pub issue: Script<CertData>,
    pub sign: Script<Signature>,
    pub revoke: Script<()>,
    pub tidy: Script<()>,
    pub read_acme: Script<CertData>,
    pub ca_chain: Script<Vec<u8>>,
    pub ca: Script<Vec<u8>>,
    pub crl: Script<Vec<u8>>,
    calls: Mutex<HashMap<&'static str, usize>>,
}

impl MockCaClient {
    pub fn push<T>(script: &Script<T>, response: Result<T, CaError>) {
        script.lock().unwrap().push_back(response);
    }

    pub fn calls(&self, operation: &str) -> usize {
        self.calls.lock().unwrap().get(operation).copied().unwrap_or(0)
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().values().sum()
    }

    fn next<T>(&self, operation: &'static str, script: &Script<T>) -> Result<T, CaError> {
        *self.calls.lock().unwrap().entry(operation).or_default() += 1;
        script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(CaError::permanent("no scripted response")))
    }
}

#[async_trait]
impl CaClient for MockCaClient {
    async fn issue(&self, _args: &IssueArgs) -> Result<CertData, CaError> {
        self.next("issue", &self.issue)
    }

    async fn sign(&self, _csr: &[u8], _args: &SignatureArgs) -> Result<Signature, CaError> {
        self.next("sign", &self.sign)
    }

    async fn revoke(&self, _serial: &str) -> Result<(), CaError> {
        self.next("revoke", &self.revoke)
    }

    async fn tidy(&self) -> Result<(), CaError> {
        self.next("tidy", &self.tidy)
    }

    async fn read_acme(&self, _common_name: &str) -> Result<CertData, CaError> {
        self.next("read_acme", &self.read_acme)
    }

    async fn fetch_ca_chain(&self) -> Result<Vec<u8>, CaError> {
        self.next("fetch_ca_chain", &self.ca_chain)
    }

    async fn fetch_ca(&self, _binary: bool) -> Result<Vec<u8>, CaError> {
        self.next("fetch_ca", &self.ca)
    }

    async fn fetch_crl(&self, _binary: bool) -> Result<Vec<u8>, CaError> {
        self.next("fetch_crl", &self.crl)
    }
}

/// Throwaway CA able to sign leaf certificates.
pub(crate) struct Fixture {
    ca: rcgen::Certificate,
    pub ca_pem: String,
}

pub(crate) struct Leaf {
    pub cert_pem: String,
    pub cert_der: Vec<u8>,
    pub key_pem: String,
}

impl Leaf {
    pub fn bundle(&self, fixture: &Fixture) -> CertData {
        CertData::new(self.cert_pem.as_bytes())
            .with_ca_data(fixture.ca_pem.as_bytes())
            .with_private_key(self.key_pem.as_bytes())
    }
}

impl Fixture {
    pub fn new() -> Self {
        let now = OffsetDateTime::now_utc();
        let mut params = CertificateParams::new(Vec::<String>::new());
        params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
        let mut dn = DistinguishedName::new();
        dn.push(DnType::CommonName, "pkiwarden test ca");
        params.distinguished_name = dn;
        params.not_before = now - Duration::days(365);
        params.not_after = now + Duration::days(3650);
        let ca = rcgen::Certificate::from_params(params).unwrap();
        let ca_pem = ca.serialize_pem().unwrap();
        Self { ca, ca_pem }
    }

    /// Leaf valid from `now + from` days to `now + to` days.
    pub fn leaf_valid_for_days(&self, from: i64, to: i64) -> Leaf {
        let now = OffsetDateTime::now_utc();
        let mut params = CertificateParams::new(vec!["example.com".to_string()]);
        let mut dn = DistinguishedName::new();
        dn.push(DnType::CommonName, "example.com");
        params.distinguished_name = dn;
        params.not_before = now + Duration::days(from);
        params.not_after = now + Duration::days(to);
        let cert = rcgen::Certificate::from_params(params).unwrap();
        let cert_pem = cert.serialize_pem_with_signer(&self.ca).unwrap();
        let cert_der = pem::parse(&cert_pem).unwrap().into_contents();
        Leaf {
            cert_pem,
            cert_der,
            key_pem: cert.serialize_private_key_pem(),
        }
    }
}
