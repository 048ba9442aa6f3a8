use std::{
    env,
    io::{self, IsTerminal},
};

use error::CliError;
use pkiwarden_core::PkiService;
use pkiwarden_vault::VaultClient;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, span, trace, warn, Instrument, Level};
use tracing_subscriber::{
    filter::{LevelFilter, Targets},
    prelude::__tracing_subscriber_SubscriberExt,
    util::SubscriberInitExt,
    Layer,
};
use validator::Validate;

use crate::{args::Args, command::Runner, config::Config};
mod args;
mod command;
mod config;
mod error;

#[tokio::main]
async fn main() -> Result<(), CliError> {
    // stdout carries fetched CA and CRL data, logs go to stderr
    let (stderr, _stderr_guard) = tracing_appender::non_blocking(io::stderr());

    let cmd = tracing_subscriber::fmt::layer()
        .with_ansi(io::stderr().is_terminal())
        .compact()
        .with_writer(stderr)
        .with_filter(
            env::var("RUST_LOG")
                .ok()
                .and_then(|e| e.parse::<Targets>().ok())
                .unwrap_or(Targets::new().with_default(LevelFilter::INFO)),
        );

    tracing_subscriber::registry().with(cmd).init();
    let span = span!(Level::TRACE, "main");
    let _guard = span.enter();
    let args = Args::parse(env::args())?;
    let conf = Config::load(args.config_path.clone())?;
    trace!("config successfully read");
    conf.validate()?;
    trace!("config successfully validated");
    debug!("config: {:?}", &conf);

    let client = VaultClient::new(conf.vault.client_config()?)?;
    let pki = PkiService::new(client, conf.renewal.strategy()?).with_retry(conf.retry.config());
    drop(_guard);

    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("interrupt received, shutting down");
                cancel.cancel();
            }
        }
    });

    let daemon = args.daemon && args.command.is_repeatable();
    if args.daemon && !daemon {
        span.in_scope(|| warn!("--daemon ignored for {:?}", args.command));
    }
    let runner = Runner::new(conf, pki, cancel);
    if daemon {
        runner.run_daemon(&args.command).instrument(span).await
    } else {
        runner.run(&args.command).instrument(span).await
    }
}
