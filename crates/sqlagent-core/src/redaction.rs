use serde::{Deserialize, Serialize};

const MASK: &str = "***";

/// Connection metadata with secrets removed, safe for logs and artifacts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedactedConnection {
    pub engine: Option<String>,
    pub user: Option<String>,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub database: Option<String>,
    pub redacted: String,
}

/// Mask passwords and credential-like query parameters in a connection string.
pub fn redact_connection_string(conn: &str) -> RedactedConnection {
    let (body, query) = match conn.split_once('?') {
        Some((body, query)) => (body, Some(query)),
        None => (conn, None),
    };

    let mut meta = RedactedConnection {
        engine: None,
        user: None,
        host: None,
        port: None,
        database: None,
        redacted: String::new(),
    };

    let redacted_body = match body.split_once("://") {
        Some((scheme, remainder)) => {
            meta.engine = Some(scheme.split('+').next().unwrap_or(scheme).to_string());
            let remainder = redact_authority(remainder, &mut meta);
            format!("{scheme}://{remainder}")
        }
        None => {
            if let Some((scheme, path)) = body.split_once(':') {
                meta.engine = Some(scheme.to_string());
                if !path.is_empty() {
                    meta.database = Some(path.to_string());
                }
            }
            body.to_string()
        }
    };

    meta.redacted = match query {
        Some(query) => format!("{redacted_body}?{}", redact_query(query)),
        None => redacted_body,
    };
    meta
}

/// Splits `user:pass@host:port/db`, masking the password and filling `meta`.
/// Credentials end at the last `@`, so a password may contain `/` or `@`.
fn redact_authority(remainder: &str, meta: &mut RedactedConnection) -> String {
    let (credentials, rest) = match remainder.rfind('@') {
        Some(idx) if !remainder.starts_with('/') => {
            (Some(&remainder[..idx]), &remainder[idx + 1..])
        }
        _ => (None, remainder),
    };

    let (host_port, path) = match rest.split_once('/') {
        Some((host_port, path)) => (host_port, Some(path)),
        None => (rest, None),
    };

    if let Some(path) = path.filter(|path| !path.is_empty()) {
        meta.database = Some(path.to_string());
    }

    if !host_port.is_empty() {
        match host_port.rsplit_once(':') {
            Some((host, port)) => {
                meta.host = Some(host.to_string());
                meta.port = port.parse().ok();
            }
            None => meta.host = Some(host_port.to_string()),
        }
    }

    let credentials = credentials.map(|credentials| match credentials.split_once(':') {
        Some((user, _password)) => {
            meta.user = Some(user.to_string());
            format!("{user}:{MASK}@")
        }
        None => {
            meta.user = Some(credentials.to_string());
            format!("{credentials}@")
        }
    });

    let mut out = credentials.unwrap_or_default();
    out.push_str(host_port);
    if let Some(path) = path {
        out.push('/');
        out.push_str(path);
    }
    out
}

fn redact_query(query: &str) -> String {
    query
        .split('&')
        .map(|pair| match pair.split_once('=') {
            Some((key, _)) if is_sensitive_key(key) => format!("{key}={MASK}"),
            _ => pair.to_string(),
        })
        .collect::<Vec<_>>()
        .join("&")
}

fn is_sensitive_key(key: &str) -> bool {
    matches!(
        key.to_ascii_lowercase().as_str(),
        "password" | "pass" | "token" | "api_key" | "apikey"
    )
}
