//! The portable connection-string representation of a bucket endpoint.
//!
//! Grammar:
//!
//! ```text
//! storage[s]://<host>[:<port>]:<bucket>?access=<id>&secret=<secret>[&path_prefix=<p>][&ssl=True][&CA_cert_path=<path>]
//! ```
//!
//! Encoding uses a fixed field order; decoding accepts query fields in any
//! order and ignores keys it does not know. The `s` suffix on the scheme
//! signals TLS.

use crate::error::{Error, Result};
use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, CONTROLS};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Characters escaped in query values. The separators of the grammar
/// (`&`, `=`, `?`, `#`) and `%` itself must never appear raw.
const QUERY_ESCAPE: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'&')
    .add(b'=')
    .add(b'?')
    .add(b'#')
    .add(b'%');

/// A storage endpoint plus the bucket and credentials needed to reach it.
///
/// Built once when a bucket fixture is created and immutable thereafter.
/// `encode`/`decode` round-trip every field that was set and omit every
/// optional field that was not.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionDescriptor {
    pub host: String,
    pub port: Option<u16>,
    pub bucket: String,
    /// Access key id.
    pub access: String,
    /// Access key secret.
    pub secret: String,
    pub path_prefix: Option<String>,
    pub use_tls: bool,
    pub ca_cert_path: Option<PathBuf>,
}

impl ConnectionDescriptor {
    /// The scheme this descriptor encodes with.
    pub fn scheme(&self) -> &'static str {
        if self.use_tls {
            "storages"
        } else {
            "storage"
        }
    }

    /// Serialize into the connection-string form.
    pub fn encode(&self) -> String {
        let mut out = format!("{}://{}", self.scheme(), self.host);
        if let Some(port) = self.port {
            out.push_str(&format!(":{port}"));
        }
        out.push(':');
        out.push_str(&self.bucket);
        out.push_str(&format!(
            "?access={}&secret={}",
            escape(&self.access),
            escape(&self.secret)
        ));
        if let Some(prefix) = &self.path_prefix {
            out.push_str(&format!("&path_prefix={}", escape(prefix)));
        }
        if self.use_tls {
            out.push_str("&ssl=True");
        }
        if let Some(ca) = &self.ca_cert_path {
            out.push_str(&format!(
                "&CA_cert_path={}",
                escape(&ca.display().to_string())
            ));
        }
        out
    }

    /// Parse a connection string back into a descriptor.
    ///
    /// Fails with [`Error::MalformedDescriptor`] when the scheme, host,
    /// bucket, access id or secret are missing or unparsable.
    pub fn decode(input: &str) -> Result<Self> {
        let (scheme, rest) = input
            .split_once("://")
            .ok_or_else(|| malformed("missing scheme separator"))?;
        let scheme_tls = match scheme {
            "storage" => false,
            "storages" => true,
            other => return Err(malformed(&format!("unsupported scheme: {other}"))),
        };

        // access/secret are mandatory, so a query section always exists.
        let (authority, query) = rest
            .split_once('?')
            .ok_or_else(|| malformed("missing query section"))?;

        let segments: Vec<&str> = authority.split(':').collect();
        let (host, port, bucket) = match segments[..] {
            [host, bucket] => (host, None, bucket),
            [host, port, bucket] => {
                let port = port
                    .parse::<u16>()
                    .map_err(|_| malformed(&format!("invalid port: {port}")))?;
                (host, Some(port), bucket)
            }
            _ => return Err(malformed("authority must be host[:port]:bucket")),
        };
        if host.is_empty() {
            return Err(malformed("empty host"));
        }
        if bucket.is_empty() {
            return Err(malformed("empty bucket"));
        }

        let mut access = None;
        let mut secret = None;
        let mut path_prefix = None;
        let mut ssl_param = false;
        let mut ca_cert_path = None;

        for pair in query.split('&').filter(|p| !p.is_empty()) {
            let (key, value) = pair
                .split_once('=')
                .ok_or_else(|| malformed(&format!("query field without a value: {pair}")))?;
            let value = unescape(value)?;
            match key {
                "access" => access = Some(value),
                "secret" => secret = Some(value),
                "path_prefix" => path_prefix = Some(value),
                "ssl" => ssl_param = value.eq_ignore_ascii_case("true"),
                "CA_cert_path" => ca_cert_path = Some(PathBuf::from(value)),
                // Unknown keys are tolerated so newer encoders stay readable.
                _ => {}
            }
        }

        Ok(Self {
            host: host.to_string(),
            port,
            bucket: bucket.to_string(),
            access: access.ok_or_else(|| malformed("missing access field"))?,
            secret: secret.ok_or_else(|| malformed("missing secret field"))?,
            path_prefix,
            use_tls: scheme_tls || ssl_param,
            ca_cert_path,
        })
    }
}

impl fmt::Display for ConnectionDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}

impl FromStr for ConnectionDescriptor {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::decode(s)
    }
}

fn escape(value: &str) -> String {
    utf8_percent_encode(value, QUERY_ESCAPE).to_string()
}

fn unescape(value: &str) -> Result<String> {
    Ok(percent_decode_str(value)
        .decode_utf8()
        .map_err(|_| malformed("query value is not valid UTF-8"))?
        .into_owned())
}

fn malformed(message: &str) -> Error {
    Error::MalformedDescriptor(message.to_string())
}
