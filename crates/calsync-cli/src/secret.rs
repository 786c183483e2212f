//! Indirect secrets in `config.toml`.
//!
//! | value            | resolves to                               |
//! |------------------|-------------------------------------------|
//! | `pass::work/ews` | first line of `pass show work/ews`        |
//! | `env::EWS_PASS`  | the `EWS_PASS` environment variable       |
//! | `base64::c2Vj`   | the decoded UTF-8 text                    |
//! | anything else    | the value itself                          |

use std::process::Command;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;

#[derive(Debug, PartialEq, Eq)]
enum Source<'a> {
    Pass(&'a str),
    Env(&'a str),
    Base64(&'a str),
    Literal(&'a str),
}

impl<'a> Source<'a> {
    fn parse(value: &'a str) -> Self {
        if let Some(entry) = value.strip_prefix("pass::") {
            Self::Pass(entry)
        } else if let Some(name) = value.strip_prefix("env::") {
            Self::Env(name)
        } else if let Some(data) = value.strip_prefix("base64::") {
            Self::Base64(data)
        } else {
            Self::Literal(value)
        }
    }
}

/// Returns the secret a config value points at.
pub fn resolve(value: &str) -> Result<String, String> {
    match Source::parse(value) {
        Source::Pass(entry) => from_pass(entry),
        Source::Env(name) => {
            std::env::var(name).map_err(|_| format!("environment variable {} is not set", name))
        }
        Source::Base64(data) => {
            let bytes = STANDARD
                .decode(data.trim())
                .map_err(|e| format!("invalid base64 secret: {}", e))?;
            String::from_utf8(bytes).map_err(|_| "base64 secret is not UTF-8 text".to_string())
        }
        Source::Literal(text) => Ok(text.to_owned()),
    }
}

fn from_pass(entry: &str) -> Result<String, String> {
    let output = Command::new("pass")
        .args(["show", entry])
        .output()
        .map_err(|e| format!("cannot run pass for {}: {}", entry, e))?;

    if !output.status.success() {
        return Err(format!(
            "pass show {} exited with {}: {}",
            entry,
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        ));
    }

    String::from_utf8_lossy(&output.stdout)
        .lines()
        .next()
        .map(str::to_owned)
        .ok_or_else(|| format!("pass entry {} is empty", entry))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefixes() {
        assert_eq!(Source::parse("pass::work/ews"), Source::Pass("work/ews"));
        assert_eq!(Source::parse("env::EWS_PASS"), Source::Env("EWS_PASS"));
        assert_eq!(Source::parse("base64::c2Vj"), Source::Base64("c2Vj"));
        assert_eq!(Source::parse("pass:work"), Source::Literal("pass:work"));
        assert_eq!(Source::parse("ENV::X"), Source::Literal("ENV::X"));
    }

    #[test]
    fn literals_are_kept() {
        assert_eq!(resolve("hunter2").unwrap(), "hunter2");
        assert_eq!(resolve("").unwrap(), "");
        assert_eq!(resolve("CORP\\jdoe").unwrap(), "CORP\\jdoe");
    }

    #[test]
    fn environment_lookup() {
        unsafe {
            std::env::set_var("CALSYNC_SECRET_TEST_VALUE", "from-env");
        }
        assert_eq!(resolve("env::CALSYNC_SECRET_TEST_VALUE").unwrap(), "from-env");
        unsafe {
            std::env::remove_var("CALSYNC_SECRET_TEST_VALUE");
        }

        let err = resolve("env::CALSYNC_SECRET_TEST_UNSET").unwrap_err();
        assert!(err.contains("is not set"));
    }

    #[test]
    fn base64_decoding() {
        assert_eq!(resolve("base64::aHVudGVyMg==").unwrap(), "hunter2");
        assert_eq!(resolve("base64:: aHVudGVyMg==\n").unwrap(), "hunter2");
        assert!(resolve("base64::***").unwrap_err().contains("invalid base64"));
        // 0xff 0xfe
        assert!(resolve("base64:://4=").unwrap_err().contains("UTF-8"));
    }

    #[test]
    fn unknown_pass_entry_fails() {
        assert!(resolve("pass::calsync/test/entry/that/does/not/exist").is_err());
    }
}
