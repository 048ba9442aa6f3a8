use std::time::Duration;

use pkiwarden_core::{
    sink::{CaSink, CertSink, CrlSink, CsrSink, KeyPairSink, MultiKeyPairSink, Slot},
    slot::FileSlot,
    IssueStatus, PkiError, PkiService,
};
use pkiwarden_types::CaClient;
use tokio::time;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, trace, warn, Instrument};

use crate::{
    args::Command,
    config::{expand_path, Config, Destination},
    error::CliError,
};

const KEY_MODE: u32 = 0o600;
const PUBLIC_MODE: u32 = 0o644;

fn slot(path: &str, mode: u32) -> Result<Slot, CliError> {
    Ok(Box::new(FileSlot::new(expand_path(path)?).with_mode(mode)))
}

fn optional_slot(path: Option<&String>, mode: u32) -> Result<Option<Slot>, CliError> {
    path.map(|p| slot(p, mode)).transpose()
}

fn keypair_sink(destination: &Destination) -> Result<KeyPairSink, CliError> {
    Ok(KeyPairSink::new(
        optional_slot(destination.cert.as_ref(), PUBLIC_MODE)?,
        optional_slot(destination.ca.as_ref(), PUBLIC_MODE)?,
        Some(slot(&destination.key, KEY_MODE)?),
    )?)
}

/// One destination is used as is, several are written together.
pub fn cert_sink(destinations: &[Destination]) -> Result<Box<dyn CertSink>, CliError> {
    match destinations {
        [] => Err(CliError::MissingSection("destinations")),
        [single] => {
            let sink = keypair_sink(single)?;
            debug!("destination: {}", sink.describe());
            Ok(Box::new(sink))
        }
        many => {
            let sinks = many
                .iter()
                .map(keypair_sink)
                .collect::<Result<Vec<_>, _>>()?;
            for sink in &sinks {
                debug!("destination: {}", sink.describe());
            }
            Ok(Box::new(MultiKeyPairSink::new(sinks)?))
        }
    }
}

pub struct Runner<C> {
    conf: Config,
    pki: PkiService<C>,
    cancel: CancellationToken,
}

impl<C: CaClient> Runner<C> {
    pub fn new(conf: Config, pki: PkiService<C>, cancel: CancellationToken) -> Self {
        Self { conf, pki, cancel }
    }

    #[instrument(name = "command", skip(self))]
    pub async fn run(&self, command: &Command) -> Result<(), CliError> {
        match command {
            Command::Issue => {
                let sink = cert_sink(&self.conf.destinations)?;
                sink.can_write().await?;
                let result = self
                    .pki
                    .issue(&self.cancel, sink.as_ref(), &self.conf.certificate.issue_args())
                    .await?;
                match result.status {
                    IssueStatus::Issued => info!(
                        "certificate {} issued",
                        result
                            .issued_cert
                            .as_ref()
                            .map(|c| c.serial())
                            .unwrap_or_default()
                    ),
                    _ => info!("certificate is up to date"),
                }
            }
            Command::ReadAcme => {
                let sink = cert_sink(&self.conf.destinations)?;
                sink.can_write().await?;
                let result = self
                    .pki
                    .read_acme(&self.cancel, sink.as_ref(), &self.conf.certificate.common_name)
                    .await?;
                info!("acme certificate stored ({:?})", result.status);
            }
            Command::Verify => {
                let sink = cert_sink(&self.conf.destinations)?;
                let cert = sink.read_cert().await?;
                self.pki.verify(&self.cancel, &cert).await?;
                info!("certificate {} ({}) is valid", cert.serial(), cert.subject());
            }
            Command::Sign => {
                let csr = self
                    .conf
                    .csr
                    .as_ref()
                    .ok_or(CliError::MissingSection("csr"))?;
                let sink = CsrSink::new(
                    slot(&csr.csr, PUBLIC_MODE)?,
                    slot(&csr.cert, PUBLIC_MODE)?,
                    optional_slot(csr.ca.as_ref(), PUBLIC_MODE)?,
                );
                sink.can_read().await?;
                sink.can_write().await?;
                self.pki
                    .sign(&self.cancel, &sink, &self.conf.certificate.issue_args())
                    .await?;
            }
            Command::Revoke { serial } => self.pki.revoke(&self.cancel, serial).await?,
            Command::Tidy => self.pki.tidy(&self.cancel).await?,
            Command::FetchCa { der } => {
                let sink = CaSink::new(optional_slot(self.conf.ca_output.as_ref(), PUBLIC_MODE)?);
                self.pki.fetch_ca(&self.cancel, &sink, *der).await?;
            }
            Command::FetchCrl { der } => {
                let sink = CrlSink::new(optional_slot(self.conf.crl_output.as_ref(), PUBLIC_MODE)?);
                self.pki.fetch_crl(&self.cancel, &sink, *der).await?;
            }
        }
        Ok(())
    }

    /// Runs `command` now and then on every tick until canceled. Failed runs
    /// are logged and retried on the next tick.
    pub async fn run_daemon(&self, command: &Command) -> Result<(), CliError> {
        let period = Duration::from_secs(self.conf.daemon.interval.max(1));
        info!("daemon started, interval {:?}", period);
        let mut interval = time::interval(period);
        interval.set_missed_tick_behavior(time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    info!("daemon stopped");
                    return Ok(());
                }
                _ = interval.tick() => {
                    trace!("daemon tick");
                    match self.run(command).in_current_span().await {
                        Ok(()) => {}
                        Err(CliError::PkiError(PkiError::Canceled)) => {
                            warn!("run canceled");
                        }
                        Err(e) => error!("run failed: {}", e),
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn destination(cert: Option<&str>, key: &str) -> Destination {
        Destination {
            cert: cert.map(String::from),
            ca: None,
            key: key.into(),
        }
    }

    #[tokio::test]
    async fn builds_single_and_multi_sinks() {
        let dir = tempfile::tempdir().unwrap();
        let key = dir.path().join("a.pem");
        let key = key.to_str().unwrap();

        let single = cert_sink(&[destination(None, key)]).unwrap();
        single.can_write().await.unwrap();

        let cert = dir.path().join("b.crt");
        let many = cert_sink(&[
            destination(None, key),
            destination(cert.to_str(), &format!("{}.key", key)),
        ])
        .unwrap();
        many.can_write().await.unwrap();
        assert!(many.read_cert().await.is_err());
    }

    #[test]
    fn requires_a_destination() {
        assert!(matches!(
            cert_sink(&[]),
            Err(CliError::MissingSection("destinations"))
        ));
    }
}
