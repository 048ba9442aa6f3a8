use tracing::{debug, instrument, trace};

use crate::error::CliError;

use std::process;

static HELP: &str = include_str!("../main.help.arg");

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Issue,
    Sign,
    Revoke { serial: String },
    Tidy,
    ReadAcme,
    Verify,
    FetchCa { der: bool },
    FetchCrl { der: bool },
}

impl Command {
    fn new(arg: &str) -> Result<Self, CliError> {
        match arg {
            "issue" => Ok(Self::Issue),
            "sign" => Ok(Self::Sign),
            "revoke" => Ok(Self::Revoke {
                serial: String::new(),
            }),
            "tidy" => Ok(Self::Tidy),
            "read-acme" => Ok(Self::ReadAcme),
            "verify" => Ok(Self::Verify),
            "fetch-ca" => Ok(Self::FetchCa { der: false }),
            "fetch-crl" => Ok(Self::FetchCrl { der: false }),
            _ => Err(CliError::CommandNotFound),
        }
    }

    /// Commands that make sense to repeat on an interval.
    pub fn is_repeatable(&self) -> bool {
        matches!(self, Self::Issue | Self::ReadAcme)
    }
}

#[derive(Debug)]
pub struct Args {
    pub config_path: Option<String>,
    pub daemon: bool,
    pub command: Command,
}

impl Args {
    #[instrument(name = "args::parse", skip(raw))]
    pub fn parse(
        raw: impl IntoIterator<Item = impl Into<std::ffi::OsString>>,
    ) -> Result<Self, CliError> {
        trace!("parsing args");
        let raw = clap_lex::RawArgs::new(raw);
        let mut cursor = raw.cursor();
        raw.next(&mut cursor);
        let mut config_path = None;
        let mut daemon = false;
        let command_arg = loop {
            let Some(arg) = raw.next(&mut cursor) else {
                print!("{}", HELP);
                process::exit(0x0);
            };
            if let Some((long, value)) = arg.to_long() {
                match long {
                    Ok("config") => {
                        config_path = Some(
                            value
                                .ok_or(CliError::RequiredValue("config"))?
                                .to_str()
                                .ok_or(CliError::Encoding)?
                                .to_owned(),
                        );
                        debug!("config path: {:?}", config_path);
                        continue;
                    }
                    Ok("daemon") => {
                        daemon = true;
                        continue;
                    }
                    Ok("help") => {
                        print!("{}", HELP);
                        process::exit(0x0);
                    }
                    Ok("version") => {
                        println!("pkiwarden {}", env!("CARGO_PKG_VERSION"));
                        process::exit(0x0);
                    }
                    _ => return Err(CliError::CommandNotFound),
                }
            } else if let Some(mut shorts) = arg.to_short() {
                while let Some(short) = shorts.next_flag() {
                    match short {
                        Ok('c') => {
                            config_path = if let Some(v) = shorts.next_value_os() {
                                v.to_str().map(|s| s.to_string())
                            } else if let Some(v) = raw.next_os(&mut cursor) {
                                v.to_str()
                                    .filter(|v| !v.is_empty() && v.find('-') != Some(0))
                                    .map(|v| v.to_string())
                            } else {
                                return Err(CliError::RequiredValue("config"));
                            };
                            debug!("config path: {:?}", config_path);
                        }
                        Ok('h') => {
                            print!("{}", HELP);
                            process::exit(0x0);
                        }
                        _ => return Err(CliError::CommandNotFound),
                    }
                }
                continue;
            }

            break arg;
        };

        let mut command = Command::new(command_arg.to_value().or(Err(CliError::Encoding))?)?;
        while let Some(arg) = raw.next(&mut cursor) {
            let Some((long, value)) = arg.to_long() else {
                return Err(CliError::CommandNotFound);
            };
            match (&mut command, long) {
                (_, Ok("daemon")) => daemon = true,
                (_, Ok("help")) => {
                    print!("{}", HELP);
                    process::exit(0x0);
                }
                (Command::Revoke { serial }, Ok("serial")) => {
                    let v = match value {
                        Some(v) => v.to_os_string(),
                        None => raw
                            .next_os(&mut cursor)
                            .ok_or(CliError::RequiredValue("serial"))?
                            .to_os_string(),
                    };
                    *serial = v.to_str().ok_or(CliError::Encoding)?.to_owned();
                }
                (Command::FetchCa { der } | Command::FetchCrl { der }, Ok("der")) => *der = true,
                _ => return Err(CliError::CommandNotFound),
            }
        }

        if let Command::Revoke { serial } = &command {
            if serial.is_empty() {
                return Err(CliError::RequiredValue("serial"));
            }
        }
        trace!("args successfully parsed");
        Ok(Self {
            config_path,
            daemon,
            command,
        })
    }
}
