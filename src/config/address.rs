use thiserror::Error;

// -----------------------------------------------------------------------------
// ----- Constants -------------------------------------------------------------

pub const DEFAULT_FTP_PORT: u16 = 21;

const FTP_SCHEME: &str = "ftp://";

// Service names accepted in place of a numeric port.
const FTP_SERVICES: &[(&str, u16)] = &[("ftp", 21), ("ftp-data", 20), ("ftps", 990)];

// -----------------------------------------------------------------------------
// ----- Address: Exported -----------------------------------------------------

/// Turns a user-supplied address into `host:port`.
///
/// Strips an `ftp://` prefix, rejects any other scheme, appends the default
/// port when none is given and checks an explicit one is a usable service
/// port. Runs before any network I/O.
pub fn normalize_address(raw: &str) -> Result<String, AddressError> {
    let trimmed = raw.trim();

    let rest = match trimmed.strip_prefix(FTP_SCHEME) {
        Some(rest) => rest,
        None if trimmed.contains("://") => {
            return Err(AddressError::UnsupportedScheme {
                address: trimmed.to_string(),
            });
        }
        None => trimmed,
    };
    let rest = rest.trim_end_matches('/');

    let (host, port) = split_host_port(rest).map_err(|reason| AddressError::Invalid {
        address: trimmed.to_string(),
        reason,
    })?;

    let port = match port {
        None => DEFAULT_FTP_PORT,
        Some(port) => parse_port(port)?,
    };

    Ok(join_host_port(host, port))
}

// -----------------------------------------------------------------------------
// ----- Address: Private helpers ----------------------------------------------

fn split_host_port(addr: &str) -> Result<(&str, Option<&str>), &'static str> {
    if addr.is_empty() {
        return Err("missing host");
    }

    let (host, port) = if let Some(bracketed) = addr.strip_prefix('[') {
        let end = bracketed.find(']').ok_or("missing ']' in address")?;
        let host = &bracketed[..end];
        match &bracketed[end + 1..] {
            "" => (host, None),
            tail => match tail.strip_prefix(':') {
                Some(port) => (host, Some(port)),
                None => return Err("unexpected characters after ']'"),
            },
        }
    } else {
        match addr.matches(':').count() {
            0 => (addr, None),
            1 => {
                let (host, port) = addr.split_once(':').ok_or("malformed address")?;
                (host, Some(port))
            }
            _ => return Err("too many colons in address"),
        }
    };

    if host.is_empty() {
        return Err("missing host");
    }
    if host.contains('/') {
        return Err("address must not contain a path");
    }

    Ok((host, port))
}

fn parse_port(port: &str) -> Result<u16, AddressError> {
    let invalid = || AddressError::InvalidPort {
        port: port.to_string(),
    };

    if port.is_empty() {
        return Err(invalid());
    }

    if port.bytes().all(|b| b.is_ascii_digit()) {
        return match port.parse::<u16>() {
            Ok(0) | Err(_) => Err(invalid()),
            Ok(n) => Ok(n),
        };
    }

    FTP_SERVICES
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case(port))
        .map(|(_, n)| *n)
        .ok_or_else(invalid)
}

fn join_host_port(host: &str, port: u16) -> String {
    if host.contains(':') {
        format!("[{host}]:{port}")
    } else {
        format!("{host}:{port}")
    }
}

// -----------------------------------------------------------------------------
// ----- Errors ----------------------------------------------------------------

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AddressError {
    #[error("unsupported protocol prefix in '{address}', only ftp:// is allowed")]
    UnsupportedScheme { address: String },

    #[error("invalid address format '{address}': {reason}")]
    Invalid {
        address: String,
        reason: &'static str,
    },

    #[error("invalid port number '{port}'")]
    InvalidPort { port: String },
}

// -----------------------------------------------------------------------------
// ----- Tests -----------------------------------------------------------------


// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
