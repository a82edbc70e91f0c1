//! Host environment inheritance
//!
//! Builds may inherit proxy, locale and timezone variables from the host,
//! plus explicitly requested custom variables (exact names or `*`/`?`
//! patterns). Session-specific variables are always stripped.

use crate::declaration::Declaration;
use std::collections::BTreeMap;

const PROXY_VARS: &[&str] = &[
    "http_proxy",
    "https_proxy",
    "ftp_proxy",
    "socks_proxy",
    "HTTP_PROXY",
    "HTTPS_PROXY",
    "FTP_PROXY",
    "SOCKS_PROXY",
    "no_proxy",
    "NO_PROXY",
    "all_proxy",
    "ALL_PROXY",
];

const LOCALE_VARS: &[&str] = &[
    "LANG",
    "LANGUAGE",
    "LC_ALL",
    "LC_CTYPE",
    "LC_NUMERIC",
    "LC_TIME",
    "LC_COLLATE",
    "LC_MONETARY",
    "LC_MESSAGES",
    "LC_PAPER",
    "LC_NAME",
    "LC_ADDRESS",
    "LC_TELEPHONE",
    "LC_MEASUREMENT",
    "LC_IDENTIFICATION",
];

const TIMEZONE_VARS: &[&str] = &["TZ", "TIMEZONE"];

/// Variables that must never leak into a build
const ALWAYS_EXCLUDED: &[&str] = &[
    "PATH",
    "HOME",
    "USER",
    "USERNAME",
    "LOGNAME",
    "SHELL",
    "PWD",
    "OLDPWD",
    "SHLVL",
    "_",
    "PS1",
    "PS2",
    "PS4",
    "SSH_AUTH_SOCK",
    "SSH_AGENT_PID",
    "DISPLAY",
    "XAUTHORITY",
    "TERM",
    "TERMINFO",
    "COLUMNS",
    "LINES",
    "XDG_RUNTIME_DIR",
    "XDG_SESSION_ID",
    "XDG_SESSION_TYPE",
    "DBUS_SESSION_BUS_ADDRESS",
    "DESKTOP_SESSION",
];

/// Environment inheritance policy derived from a declaration
#[derive(Debug, Clone)]
pub struct EnvInheritance {
    enabled: bool,
    proxy: bool,
    locale: bool,
    timezone: bool,
    custom: Vec<String>,
    exclude: Vec<String>,
}

impl EnvInheritance {
    pub fn from_declaration(declaration: &Declaration) -> Self {
        Self {
            enabled: declaration.inherit_env,
            proxy: declaration.inherit_proxy,
            locale: declaration.inherit_locale,
            timezone: declaration.inherit_timezone,
            custom: declaration.inherit_custom_env.clone(),
            exclude: declaration.exclude_env.clone(),
        }
    }

    /// Extract the inherited variables from the process environment
    pub fn extract(&self) -> BTreeMap<String, String> {
        self.extract_from(std::env::vars())
    }

    fn extract_from(
        &self,
        env: impl IntoIterator<Item = (String, String)>,
    ) -> BTreeMap<String, String> {
        if !self.enabled {
            return BTreeMap::new();
        }

        let all: Vec<(String, String)> = env.into_iter().collect();
        let mut selected = BTreeMap::new();

        let mut take_set = |vars: &[&str]| {
            for (k, v) in &all {
                if vars.contains(&k.as_str()) {
                    selected.insert(k.clone(), v.clone());
                }
            }
        };
        if self.proxy {
            take_set(PROXY_VARS);
        }
        if self.locale {
            take_set(LOCALE_VARS);
        }
        if self.timezone {
            take_set(TIMEZONE_VARS);
        }

        for pattern in &self.custom {
            if pattern.contains('*') || pattern.contains('?') {
                for (k, v) in &all {
                    if glob_match(pattern, k) {
                        selected.insert(k.clone(), v.clone());
                    }
                }
            } else if let Some((k, v)) = all.iter().find(|(k, _)| k == pattern) {
                selected.insert(k.clone(), v.clone());
            }
        }

        selected.retain(|k, _| {
            !ALWAYS_EXCLUDED.contains(&k.as_str()) && !self.exclude.iter().any(|e| e == k)
        });
        selected
    }
}

/// Match a `*`/`?` pattern against a whole string
fn glob_match(pattern: &str, s: &str) -> bool {
    fn inner(p: &[u8], s: &[u8]) -> bool {
        match (p.first(), s.first()) {
            (None, None) => true,
            (Some(b'*'), _) => inner(&p[1..], s) || (!s.is_empty() && inner(p, &s[1..])),
            (Some(b'?'), Some(_)) => inner(&p[1..], &s[1..]),
            (Some(a), Some(b)) if a == b => inner(&p[1..], &s[1..]),
            _ => false,
        }
    }
    inner(pattern.as_bytes(), s.as_bytes())
}
