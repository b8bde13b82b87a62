use std::path::{Path, PathBuf};
use std::time::Duration;

use base64::Engine;
use clap::Parser;
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::tls::DEFAULT_CIPHERS;

/// command line surface; every flag can also come from the environment
#[derive(Parser, Debug, Clone)]
#[command(
    name = "droopy",
    version,
    about = "Easy file receiving over HTTP",
    after_help = "Example:\n    droopy -m \"Hi, this is Bob. You can send me a file.\" -p avatar.png"
)]
pub struct Args {
    /// port number to host droopy upon
    #[arg(env = "DROOPY_PORT", default_value_t = 8000)]
    pub port: u16,

    /// address to bind; empty binds every interface
    #[arg(long, env = "DROOPY_HOST", default_value = "")]
    pub host: String,

    /// set the directory to upload files to
    #[arg(short, long, env = "DROOPY_DIRECTORY", default_value = ".")]
    pub directory: PathBuf,

    /// set the message
    #[arg(short, long, env = "DROOPY_MESSAGE", default_value = "")]
    pub message: String,

    /// set the picture
    #[arg(short, long, env = "DROOPY_PICTURE")]
    pub picture: Option<PathBuf>,

    /// provide download links
    #[arg(long = "publish-files", visible_alias = "dl", env = "DROOPY_PUBLISH_FILES")]
    pub publish_files: bool,

    /// set the authentication credentials, in form USER:PASS
    #[arg(short, long, env = "DROOPY_AUTH")]
    pub auth: Option<String>,

    /// set up https using the certificate file (PEM with certificate and key)
    #[arg(long, env = "DROOPY_SSL")]
    pub ssl: Option<PathBuf>,

    /// comma-separated TLS cipher suites to allow
    #[arg(long, env = "DROOPY_CIPHERS", value_delimiter = ',')]
    pub ciphers: Vec<String>,

    /// set the file permissions (octal value)
    #[arg(long, env = "DROOPY_CHMOD")]
    pub chmod: Option<String>,

    /// idle socket timeout in seconds
    #[arg(long, env = "DROOPY_TIMEOUT", default_value_t = 180)]
    pub timeout: u64,

    /// multipart field carrying the files
    #[arg(long, env = "DROOPY_FIELD", default_value = "upfile")]
    pub field: String,

    /// reject request bodies larger than this many bytes
    #[arg(long, env = "DROOPY_MAX_UPLOAD_SIZE")]
    pub max_upload_size: Option<usize>,

    /// json file with extra or replacement translations
    #[arg(long, env = "DROOPY_TRANSLATIONS")]
    pub translations: Option<PathBuf>,

    /// command run after each stored file, with its path as last argument
    #[arg(long, env = "DROOPY_INDEX_COMMAND")]
    pub index_command: Option<String>,

    /// keep embedded main.js script tags in uploaded html
    #[arg(long, env = "DROOPY_NO_STRIP_SCRIPTS")]
    pub no_strip_scripts: bool,

    /// temp files older than this many seconds are swept
    #[arg(long, env = "DROOPY_TEMP_MAX_AGE", default_value_t = 3600)]
    pub temp_max_age: u64,

    /// seconds between temp sweeps
    #[arg(long, env = "DROOPY_SWEEP_INTERVAL", default_value_t = 600)]
    pub sweep_interval: u64,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("authentication credentials must be specified as USER:PASSWORD")]
    InvalidAuth,
    #[error("invalid octal value passed to chmod option: '{0}'")]
    InvalidMode(String),
    #[error("PEM file not found: '{0}'")]
    CertificateNotFound(String),
    #[error("multipart field name must not be empty")]
    EmptyField,
    #[error("cannot resolve path {path}: {source}")]
    Resolve {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Clone)]
pub struct TlsSettings {
    pub cert_path: PathBuf,
    pub ciphers: Vec<String>,
}

/// resolved server configuration, immutable once the server starts
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    /// absolute destination directory
    pub directory: PathBuf,
    pub picture: Option<PathBuf>,
    pub message: String,
    pub file_mode: Option<u32>,
    pub publish_files: bool,
    /// raw `USER:PASS`
    pub auth: Option<String>,
    pub tls: Option<TlsSettings>,
    pub timeout: Duration,
    pub field: String,
    pub max_upload_size: Option<usize>,
    pub translations: Option<PathBuf>,
    pub index_command: Option<String>,
    pub strip_scripts: bool,
    pub temp_max_age: Duration,
    pub sweep_interval: Duration,
}

impl Config {
    /// validate parsed arguments into a configuration
    pub fn from_args(args: Args) -> Result<Self, ConfigError> {
        let auth = match args.auth.filter(|a| !a.is_empty()) {
            Some(auth) if !auth.contains(':') => return Err(ConfigError::InvalidAuth),
            other => other,
        };

        let file_mode = args
            .chmod
            .map(|raw| parse_mode(&raw).ok_or(ConfigError::InvalidMode(raw)))
            .transpose()?;

        let tls = match args.ssl.filter(|p| !p.as_os_str().is_empty()) {
            Some(path) => {
                if !path.is_file() {
                    return Err(ConfigError::CertificateNotFound(path.display().to_string()));
                }
                let ciphers = if args.ciphers.is_empty() {
                    DEFAULT_CIPHERS.iter().map(|c| c.to_string()).collect()
                } else {
                    args.ciphers
                };
                Some(TlsSettings {
                    cert_path: absolute(&path)?,
                    ciphers,
                })
            }
            None => None,
        };

        let picture = match args.picture.filter(|p| !p.as_os_str().is_empty()) {
            Some(path) if path.exists() => Some(absolute(&path)?),
            Some(path) => {
                tracing::warn!("Picture not found: '{}'", path.display());
                None
            }
            None => None,
        };

        if args.field.is_empty() {
            return Err(ConfigError::EmptyField);
        }

        Ok(Self {
            host: args.host,
            port: args.port,
            directory: absolute(&args.directory)?,
            picture,
            message: args.message,
            file_mode,
            publish_files: args.publish_files,
            auth,
            tls,
            timeout: Duration::from_secs(args.timeout.max(1)),
            field: args.field,
            max_upload_size: args.max_upload_size,
            translations: args.translations,
            index_command: args.index_command.filter(|c| !c.trim().is_empty()),
            strip_scripts: !args.no_strip_scripts,
            temp_max_age: Duration::from_secs(args.temp_max_age),
            sweep_interval: Duration::from_secs(args.sweep_interval.max(1)),
        })
    }

    /// the exact `Authorization` value a client must send
    pub fn expected_authorization(&self) -> Option<String> {
        self.auth.as_ref().map(|auth| {
            format!(
                "Basic {}",
                base64::engine::general_purpose::STANDARD.encode(auth.as_bytes())
            )
        })
    }

    pub fn bind_host(&self) -> &str {
        if self.host.is_empty() {
            "0.0.0.0"
        } else {
            &self.host
        }
    }

    pub fn scheme(&self) -> &'static str {
        if self.tls.is_some() {
            "https"
        } else {
            "http"
        }
    }

    // hash a credential header using sha256
    pub fn hash_credential(value: &[u8]) -> [u8; 32] {
        let mut hasher = Sha256::new();
        hasher.update(value);
        hasher.finalize().into()
    }
}

fn parse_mode(raw: &str) -> Option<u32> {
    let digits = raw.trim();
    let digits = digits
        .strip_prefix("0o")
        .or_else(|| digits.strip_prefix("0O"))
        .unwrap_or(digits);
    u32::from_str_radix(digits, 8).ok().filter(|m| *m <= 0o7777)
}

fn absolute(path: &Path) -> Result<PathBuf, ConfigError> {
    std::path::absolute(path).map_err(|source| ConfigError::Resolve {
        path: path.display().to_string(),
        source,
    })
}
