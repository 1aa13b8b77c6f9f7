//! `${VAR}` placeholder interpolation for server descriptors.
//!
//! Only connection fields are interpolated: the HTTP URL and credentials,
//! and the process command, arguments, environment values and working
//! directory. Names and tool lists are taken literally. Interpolation is a
//! pure string substitution and never fails; an unset variable without a
//! `:-default` becomes the empty string.

use super::types::{AuthConfig, ServerDescriptor, TransportConfig};

/// Replace `${VAR}` and `${VAR:-default}` using the process environment.
pub fn interpolate(input: &str) -> String {
    interpolate_with(input, |name| std::env::var(name).ok())
}

/// Replace placeholders using an arbitrary variable lookup.
///
/// An unterminated `${` is copied through unchanged.
pub fn interpolate_with<F>(input: &str, lookup: F) -> String
where
    F: Fn(&str) -> Option<String>,
{
    let mut result = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(start) = rest.find("${") {
        result.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        match after.find('}') {
            Some(end) => {
                result.push_str(&resolve_var_expr(&after[..end], &lookup));
                rest = &after[end + 1..];
            }
            None => {
                result.push_str(&rest[start..]);
                rest = "";
            }
        }
    }

    result.push_str(rest);
    result
}

/// Resolve a variable expression like `VAR` or `VAR:-default`.
fn resolve_var_expr<F>(expr: &str, lookup: &F) -> String
where
    F: Fn(&str) -> Option<String>,
{
    match expr.split_once(":-") {
        Some((name, default)) => lookup(name.trim()).unwrap_or_else(|| default.to_string()),
        None => lookup(expr.trim()).unwrap_or_default(),
    }
}

/// Return a copy of `descriptor` with every connection field interpolated.
pub fn interpolate_descriptor(descriptor: &ServerDescriptor) -> ServerDescriptor {
    interpolate_descriptor_with(descriptor, |name| std::env::var(name).ok())
}

pub fn interpolate_descriptor_with<F>(descriptor: &ServerDescriptor, lookup: F) -> ServerDescriptor
where
    F: Fn(&str) -> Option<String>,
{
    let sub = |s: &str| interpolate_with(s, &lookup);
    let mut out = descriptor.clone();

    match &mut out.transport {
        TransportConfig::Http(http) => {
            http.url = sub(&http.url);
            http.auth = match &http.auth {
                AuthConfig::None => AuthConfig::None,
                AuthConfig::Bearer { token } => AuthConfig::Bearer { token: sub(token) },
                AuthConfig::Basic { username, password } => AuthConfig::Basic {
                    username: sub(username),
                    password: sub(password),
                },
            };
        }
        TransportConfig::Process(process) => {
            process.command = sub(&process.command);
            process.args = process.args.iter().map(|a| sub(a)).collect();
            for value in process.env.values_mut() {
                *value = sub(value);
            }
            process.cwd = process.cwd.as_deref().map(sub);
        }
    }

    out
}

// ─── Tests ───────────────────────────────────────────────────────────────────
