use crate::error::MqError;
use crate::socket::types::SocketType;

/// Transport scheme of a parsed endpoint URI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum Scheme {
  Inproc,
  /// Internal rendezvous namespace; behaves like inproc with its own keys.
  Sys,
  Tcp,
  Ipc,
  Pgm,
  Epgm,
}

/// A parsed endpoint: scheme, address part, and the original URI string
/// (used as the registry key and in error messages).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) struct Endpoint {
  pub scheme: Scheme,
  pub address: String,
  pub uri: String,
}

/// Splits `scheme://address` and validates both parts are present.
pub(crate) fn parse_endpoint(endpoint_str: &str) -> Result<Endpoint, MqError> {
  let invalid = || MqError::InvalidEndpoint(endpoint_str.to_string());

  let Some(separator_pos) = endpoint_str.find("://") else {
    return Err(invalid());
  };
  let scheme_str = &endpoint_str[..separator_pos];
  let address = &endpoint_str[separator_pos + 3..];
  if scheme_str.is_empty() || address.is_empty() || address.contains('\0') {
    return Err(invalid());
  }

  let scheme = match scheme_str {
    "inproc" => Scheme::Inproc,
    "sys" => Scheme::Sys,
    "tcp" => Scheme::Tcp,
    "ipc" => Scheme::Ipc,
    "pgm" => Scheme::Pgm,
    "epgm" => Scheme::Epgm,
    _ => return Err(MqError::UnsupportedTransport(endpoint_str.to_string())),
  };
  Ok(Endpoint {
    scheme,
    address: address.to_string(),
    uri: endpoint_str.to_string(),
  })
}

/// Checks scheme availability and scheme/socket-type compatibility.
///
/// Multicast carries no return channel, so only the pub/sub family may use
/// it; that check runs before availability so the incompatibility is
/// reported even though no multicast engine is compiled into this build.
pub(crate) fn check_protocol(endpoint: &Endpoint, socket_type: SocketType) -> Result<(), MqError> {
  match endpoint.scheme {
    Scheme::Inproc | Scheme::Sys | Scheme::Tcp => Ok(()),
    Scheme::Ipc => {
      #[cfg(windows)]
      {
        return Err(MqError::UnsupportedTransport(endpoint.uri.clone()));
      }
      #[cfg(not(windows))]
      Ok(())
    }
    Scheme::Pgm | Scheme::Epgm => {
      if !matches!(
        socket_type,
        SocketType::Pub | SocketType::Sub | SocketType::XPub | SocketType::XSub
      ) {
        return Err(MqError::IncompatibleTransport(endpoint.uri.clone()));
      }
      // No multicast build option exists in this build.
      Err(MqError::UnsupportedTransport(endpoint.uri.clone()))
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn parses_known_schemes() {
    assert_eq!(parse_endpoint("inproc://svc").unwrap().scheme, Scheme::Inproc);
    assert_eq!(parse_endpoint("sys://log").unwrap().scheme, Scheme::Sys);
    assert_eq!(parse_endpoint("tcp://127.0.0.1:5555").unwrap().scheme, Scheme::Tcp);
    let ep = parse_endpoint("ipc:///tmp/sock").unwrap();
    assert_eq!(ep.scheme, Scheme::Ipc);
    assert_eq!(ep.address, "/tmp/sock");
  }

  #[test]
  fn rejects_malformed_uris() {
    assert!(matches!(parse_endpoint("no-scheme"), Err(MqError::InvalidEndpoint(_))));
    assert!(matches!(parse_endpoint("://addr"), Err(MqError::InvalidEndpoint(_))));
    assert!(matches!(parse_endpoint("inproc://"), Err(MqError::InvalidEndpoint(_))));
  }

  #[test]
  fn rejects_unknown_schemes() {
    assert!(matches!(
      parse_endpoint("quic://host:1"),
      Err(MqError::UnsupportedTransport(_))
    ));
  }

  #[test]
  fn multicast_incompatibility_reported_before_availability() {
    let ep = parse_endpoint("pgm://eth0;239.0.0.1:7500").unwrap();
    assert!(matches!(
      check_protocol(&ep, SocketType::Req),
      Err(MqError::IncompatibleTransport(_))
    ));
    assert!(matches!(
      check_protocol(&ep, SocketType::Pub),
      Err(MqError::UnsupportedTransport(_))
    ));
  }
}
