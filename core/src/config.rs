/*
 * config.rs
 * Copyright (C) 2026 Chris Burdess
 *
 * This file is part of Postiglione, a networking toolkit.
 *
 * Postiglione is free software: you can redistribute it and/or modify
 * it under the terms of the GNU General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * Postiglione is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 * GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License
 * along with Postiglione.  If not, see <http://www.gnu.org/licenses/>.
 */

//! HTTP client configuration: remote endpoint, TLS, timeouts and buffer sizes.
//!
//! Stored as XML in ~/.postiglione/http-client.xml:
//! `<http-client><host>..</host><port>..</port><tls>true</tls>...</http-client>`.
//! All XML read/write uses the quick_xml parser/writer; no regex or hand parsing.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::reader::Reader;
use quick_xml::writer::Writer;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);
pub const DEFAULT_SCRATCH_SIZE: usize = 4096;
pub const DEFAULT_MAX_HEADER_BYTES: usize = 64 * 1024;
pub const DEFAULT_USER_AGENT: &str = concat!("Postiglione/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("XML parse error: {0}")]
    Xml(String),
    #[error("invalid value {value:?} for <{element}>")]
    InvalidValue { element: String, value: String },
    #[error("no <host> configured")]
    MissingHost,
}

/// Settings of one `HttpClient`: the single remote endpoint it talks to and how.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpClientConfig {
    pub host: String,
    pub port: u16,
    pub use_tls: bool,
    /// Host header value when it differs from `host`.
    pub virtual_host: Option<String>,
    pub user_agent: String,
    /// Upper bound for every transfer; a request timeout can only shorten it.
    pub default_timeout: Duration,
    /// Recorded intent only; requests are still sent one at a time.
    pub pipelining: bool,
    pub scratch_size: usize,
    pub max_header_bytes: usize,
}

impl HttpClientConfig {
    /// Config for `host:port`; TLS is on by default for port 443.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            use_tls: port == 443,
            virtual_host: None,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            default_timeout: DEFAULT_TIMEOUT,
            pipelining: false,
            scratch_size: DEFAULT_SCRATCH_SIZE,
            max_header_bytes: DEFAULT_MAX_HEADER_BYTES,
        }
    }

    pub fn tls(mut self, use_tls: bool) -> Self {
        self.use_tls = use_tls;
        self
    }

    pub fn virtual_host(mut self, virtual_host: impl Into<String>) -> Self {
        self.virtual_host = Some(virtual_host.into());
        self
    }

    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    pub fn default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    pub fn pipelining(mut self, pipelining: bool) -> Self {
        self.pipelining = pipelining;
        self
    }

    pub fn scratch_size(mut self, size: usize) -> Self {
        self.scratch_size = size.max(1);
        self
    }

    pub fn max_header_bytes(mut self, max: usize) -> Self {
        self.max_header_bytes = max;
        self
    }

    /// Host header value: the virtual host if set, else host, with the port when it is not the
    /// scheme default.
    pub fn host_header(&self) -> String {
        if let Some(vhost) = &self.virtual_host {
            return vhost.clone();
        }
        let default_port = if self.use_tls { 443 } else { 80 };
        let host = if self.host.contains(':') && !self.host.starts_with('[') {
            format!("[{}]", self.host)
        } else {
            self.host.clone()
        };
        if self.port == default_port {
            host
        } else {
            format!("{}:{}", host, self.port)
        }
    }

    /// Parse the XML form. Unknown elements are ignored; `<host>` is required.
    pub fn from_xml_str(content: &str) -> Result<Self, ConfigError> {
        let mut reader = Reader::from_str(content);
        reader.config_mut().trim_text(true);
        let mut buf = Vec::new();
        let mut config = HttpClientConfig::new("", 80);
        let mut tls: Option<bool> = None;
        let mut element_name = String::new();

        loop {
            match reader.read_event_into(&mut buf) {
                Err(e) => return Err(ConfigError::Xml(e.to_string())),
                Ok(Event::Eof) => break,
                Ok(Event::Start(e)) => {
                    element_name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                }
                Ok(Event::Text(e)) => {
                    if element_name.is_empty() {
                        continue;
                    }
                    let text = e
                        .unescape()
                        .map_err(|e| ConfigError::Xml(e.to_string()))?
                        .trim()
                        .to_string();
                    match element_name.as_str() {
                        "host" => config.host = text,
                        "port" => config.port = parse_value(&element_name, &text)?,
                        "tls" => tls = Some(parse_value(&element_name, &text)?),
                        "virtual-host" => config.virtual_host = Some(text),
                        "user-agent" => config.user_agent = text,
                        "timeout-ms" => {
                            config.default_timeout = Duration::from_millis(parse_value(&element_name, &text)?)
                        }
                        "pipelining" => config.pipelining = parse_value(&element_name, &text)?,
                        "scratch-size" => config.scratch_size = parse_value::<usize>(&element_name, &text)?.max(1),
                        "max-header-bytes" => config.max_header_bytes = parse_value(&element_name, &text)?,
                        _ => {}
                    }
                    element_name.clear();
                }
                Ok(Event::End(_)) => element_name.clear(),
                _ => {}
            }
            buf.clear();
        }
        if config.host.is_empty() {
            return Err(ConfigError::MissingHost);
        }
        config.use_tls = tls.unwrap_or(config.port == 443);
        Ok(config)
    }

    /// Serialize to XML (UTF-8, with declaration).
    pub fn to_xml(&self) -> Result<Vec<u8>, ConfigError> {
        let mut out = Vec::new();
        let mut writer = Writer::new_with_indent(&mut out, b' ', 2);
        writer
            .write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))
            .map_err(xml_error)?;
        writer
            .write_event(Event::Start(BytesStart::new("http-client")))
            .map_err(xml_error)?;
        let port = self.port.to_string();
        let tls = self.use_tls.to_string();
        let timeout = self.default_timeout.as_millis().to_string();
        let pipelining = self.pipelining.to_string();
        let scratch = self.scratch_size.to_string();
        let max_header = self.max_header_bytes.to_string();
        let mut elements: Vec<(&str, &str)> = vec![
            ("host", self.host.as_str()),
            ("port", port.as_str()),
            ("tls", tls.as_str()),
        ];
        if let Some(vhost) = &self.virtual_host {
            elements.push(("virtual-host", vhost.as_str()));
        }
        elements.extend([
            ("user-agent", self.user_agent.as_str()),
            ("timeout-ms", timeout.as_str()),
            ("pipelining", pipelining.as_str()),
            ("scratch-size", scratch.as_str()),
            ("max-header-bytes", max_header.as_str()),
        ]);
        for (name, value) in elements {
            writer
                .write_event(Event::Start(BytesStart::new(name)))
                .map_err(xml_error)?;
            writer
                .write_event(Event::Text(BytesText::new(value)))
                .map_err(xml_error)?;
            writer
                .write_event(Event::End(BytesEnd::new(name)))
                .map_err(xml_error)?;
        }
        writer
            .write_event(Event::End(BytesEnd::new("http-client")))
            .map_err(xml_error)?;
        Ok(out)
    }
}

fn xml_error(e: impl std::fmt::Display) -> ConfigError {
    ConfigError::Xml(e.to_string())
}

fn parse_value<T: std::str::FromStr>(element: &str, text: &str) -> Result<T, ConfigError> {
    text.parse().map_err(|_| ConfigError::InvalidValue {
        element: element.to_string(),
        value: text.to_string(),
    })
}

/// Default config directory: ~/.postiglione.
pub fn default_config_dir() -> Option<PathBuf> {
    std::env::var_os("HOME").map(PathBuf::from).map(|h| h.join(".postiglione"))
}

/// Default HTTP client config path: ~/.postiglione/http-client.xml.
pub fn default_config_path() -> Option<PathBuf> {
    default_config_dir().map(|d| d.join("http-client.xml"))
}

pub fn load_config(path: &Path) -> Result<HttpClientConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    HttpClientConfig::from_xml_str(&content)
}

/// Write the config, creating the parent directory if needed.
pub fn save_config(path: &Path, config: &HttpClientConfig) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, config.to_xml()?)?;
    Ok(())
}
