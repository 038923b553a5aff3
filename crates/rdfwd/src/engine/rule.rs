//! Colon-delimited association rule grammar.
//!
//! Both `associate_remote` and `associate_local` share the same tokenizer:
//! a 3-token rule omits the bind address (defaulting it to `"localhost"`);
//! a 4-token rule gives it explicitly.

use rdfwd_proto::ForwardError;

/// A parsed `bind_address:port:host:host_port` (or `port:host:host_port`)
/// rule string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rule {
    pub bind_address: String,
    pub port: u16,
    pub host: String,
    pub host_port: u16,
}

impl Rule {
    pub fn parse(rule: &str) -> Result<Self, ForwardError> {
        let tokens: Vec<&str> = rule.split(':').collect();
        let (bind_address, port, host, host_port) = match tokens.as_slice() {
            [port, host, host_port] => ("localhost", *port, *host, *host_port),
            [bind_address, port, host, host_port] => (*bind_address, *port, *host, *host_port),
            _ => {
                return Err(ForwardError::MalformedRule(format!(
                    "expected 3 or 4 colon-separated tokens, got '{rule}'"
                )))
            }
        };

        let port: u16 = port
            .parse()
            .map_err(|_| ForwardError::MalformedRule(format!("non-numeric port '{port}'")))?;
        let host_port: u16 = host_port.parse().map_err(|_| {
            ForwardError::MalformedRule(format!("non-numeric host port '{host_port}'"))
        })?;

        Ok(Self {
            bind_address: bind_address.to_string(),
            port,
            host: host.to_string(),
            host_port,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn three_token_defaults_bind_address() {
        let rule = Rule::parse("5000:echo.host:9000").unwrap();
        assert_eq!(rule.bind_address, "localhost");
        assert_eq!(rule.port, 5000);
        assert_eq!(rule.host, "echo.host");
        assert_eq!(rule.host_port, 9000);
    }

    #[test]
    fn four_token_keeps_bind_address() {
        let rule = Rule::parse("0.0.0.0:5000:a:80").unwrap();
        assert_eq!(rule.bind_address, "0.0.0.0");
        assert_eq!(rule.port, 5000);
        assert_eq!(rule.host, "a");
        assert_eq!(rule.host_port, 80);
    }

    #[test]
    fn rejects_wrong_token_count() {
        assert!(Rule::parse("5000:echo.host").is_err());
        assert!(Rule::parse("a:b:c:d:e").is_err());
    }

    #[test]
    fn rejects_non_numeric_port() {
        assert!(Rule::parse("abc:echo.host:9000").is_err());
        assert!(Rule::parse("5000:echo.host:xyz").is_err());
    }
}
