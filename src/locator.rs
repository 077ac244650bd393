use url::Url;

use crate::error::CompatError;

/// Parsed connection target, derived once from the locator string.
#[derive(Debug, Clone, PartialEq)]
pub enum Target {
    /// Remote SQL service reachable over the stream protocol.
    Remote {
        /// Endpoint with the scheme already remapped to `ws`/`wss` and the
        /// query/fragment stripped.
        endpoint: Url,
        /// Bearer credential from the `jwt` query parameter.
        auth_token: Option<String>,
    },
    /// Local file target, delegated wholesale to the embedded engine.
    Local {
        /// Path portion of the locator; `:memory:` or empty means an
        /// in-memory database.
        path: String,
    },
}

impl Target {
    /// Parse and validate a locator.
    ///
    /// # Errors
    ///
    /// Returns `CompatError::Argument` for malformed locators, unknown query
    /// parameters, embedded basic-auth credentials, fragments, or
    /// unsupported schemes.
    pub fn parse(locator: &str) -> Result<Target, CompatError> {
        // Local targets skip URL validation entirely; the whole locator is
        // the local engine's to interpret.
        if let Some(rest) = locator.strip_prefix("file:") {
            let path = rest.trim_start_matches("//");
            let path = path.split(['?', '#']).next().unwrap_or_default();
            return Ok(Target::Local {
                path: path.to_owned(),
            });
        }

        let url = Url::parse(locator)
            .map_err(|e| CompatError::Argument(format!("invalid locator {locator:?}: {e}")))?;

        let mut auth_token = None;
        for (key, value) in url.query_pairs() {
            if key == "jwt" {
                auth_token = Some(value.into_owned());
            } else {
                return Err(CompatError::Argument(format!(
                    "unknown URL query argument {key:?}"
                )));
            }
        }

        let scheme = match url.scheme() {
            "libsql" | "http" | "ws" => "ws",
            "libsqls" | "https" | "wss" => "wss",
            other => {
                return Err(CompatError::Argument(format!(
                    "unsupported URL scheme {other:?}"
                )));
            }
        };

        if !url.username().is_empty() || url.password().is_some() {
            return Err(CompatError::Argument(
                "the stream protocol does not support basic authentication, \
                 use a jwt query parameter instead"
                    .to_owned(),
            ));
        }
        if url.fragment().is_some() {
            return Err(CompatError::Argument(
                "URL fragments are not supported".to_owned(),
            ));
        }

        let host = url
            .host_str()
            .ok_or_else(|| CompatError::Argument(format!("locator {locator:?} has no host")))?;
        let endpoint = match url.port() {
            Some(port) => format!("{scheme}://{host}:{port}{}", url.path()),
            None => format!("{scheme}://{host}{}", url.path()),
        };
        let endpoint = Url::parse(&endpoint)
            .map_err(|e| CompatError::Argument(format!("invalid locator {locator:?}: {e}")))?;

        Ok(Target::Remote {
            endpoint,
            auth_token,
        })
    }
}
