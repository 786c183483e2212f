//! Basic (RFC 7617), Digest (RFC 7616, MD5) and NTLMv2 authentication for
//! EWS.
//!
//! Kerberos through `Negotiate` is not offered. Servers that announce it
//! usually announce `NTLM` as well.

use std::collections::HashMap;
use std::fmt::Write as _;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use ntlmclient::{Credentials, Flags, Message, NegotiateMessage};
use rand::Rng;

use crate::error::{ProviderError, ProviderResult};

/// Workstation name sent in NTLM messages.
const WORKSTATION: &str = "calsync";

/// How requests to the EWS endpoint are authenticated.
#[derive(Debug, Clone)]
pub enum AuthScheme {
    /// Before the first 401.
    None,
    Basic,
    Digest(DigestAuth),
    Ntlm(NtlmAuth),
}

impl AuthScheme {
    /// Chooses from the `WWW-Authenticate` values of a 401: Digest, then
    /// NTLM, then Basic.
    ///
    /// On failure the error lists the scheme names the server offered.
    pub fn from_challenges<'a>(
        challenges: impl IntoIterator<Item = &'a str>,
    ) -> Result<Self, Vec<String>> {
        let mut offered: Vec<String> = Vec::new();
        let mut digest = None;

        for challenge in challenges {
            let name = scheme_name(challenge);
            if name.is_empty() {
                continue;
            }
            if digest.is_none() && name.eq_ignore_ascii_case("digest") {
                digest = DigestAuth::parse(challenge);
            }
            offered.push(name.to_string());
        }

        if let Some(digest) = digest {
            Ok(Self::Digest(digest))
        } else if offered.iter().any(|n| n.eq_ignore_ascii_case("ntlm")) {
            Ok(Self::Ntlm(NtlmAuth::default()))
        } else if offered.iter().any(|n| n.eq_ignore_ascii_case("basic")) {
            Ok(Self::Basic)
        } else {
            Err(offered)
        }
    }

    /// The `Authorization` value for the next request, or `None` before
    /// negotiation. NTLM only sends a header during the handshake, as the
    /// connection stays authenticated afterwards.
    pub fn authorization(
        &mut self,
        method: &str,
        uri: &str,
        username: &str,
        password: &str,
    ) -> Option<String> {
        match self {
            Self::None => None,
            Self::Basic => Some(basic_auth(username, password)),
            Self::Digest(digest) => Some(digest.authorize(method, uri, username, password)),
            Self::Ntlm(ntlm) => ntlm.pending.take(),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Basic => "basic",
            Self::Digest(_) => "digest",
            Self::Ntlm(_) => "ntlm",
        }
    }
}

fn scheme_name(challenge: &str) -> &str {
    challenge
        .split_whitespace()
        .next()
        .unwrap_or_default()
        .trim_end_matches(',')
}

/// Server parameters of a Digest challenge plus the running nonce count.
#[derive(Debug, Clone)]
pub struct DigestAuth {
    pub realm: String,
    pub nonce: String,
    pub opaque: Option<String>,
    /// `qop=auth` offered. Without it the RFC 2069 response is used.
    pub qop_auth: bool,
    pub algorithm: String,
    nonce_count: u32,
}

impl DigestAuth {
    /// Reads a `Digest realm="..", nonce=".."` challenge.
    pub fn parse(challenge: &str) -> Option<Self> {
        let (name, rest) = challenge.trim().split_once(char::is_whitespace)?;
        if !name.eq_ignore_ascii_case("digest") {
            return None;
        }

        let mut params = parse_auth_params(rest);
        let qop_auth = params
            .get("qop")
            .is_some_and(|qop| qop.split(',').map(str::trim).any(|q| q == "auth"));

        Some(Self {
            realm: params.remove("realm")?,
            nonce: params.remove("nonce")?,
            opaque: params.remove("opaque"),
            qop_auth,
            algorithm: params.remove("algorithm").unwrap_or_else(|| "MD5".to_string()),
            nonce_count: 0,
        })
    }

    /// Answers the challenge for one request, bumping the nonce count.
    pub fn authorize(&mut self, method: &str, uri: &str, username: &str, password: &str) -> String {
        self.nonce_count += 1;
        let nc = format!("{:08x}", self.nonce_count);
        let cnonce = client_nonce();

        let ha1 = md5_hex(&format!("{}:{}:{}", username, self.realm, password));
        let ha2 = md5_hex(&format!("{}:{}", method, uri));
        let response = if self.qop_auth {
            let parts: [&str; 6] = [&ha1, &self.nonce, &nc, &cnonce, "auth", &ha2];
            md5_hex(&parts.join(":"))
        } else {
            let parts: [&str; 3] = [&ha1, &self.nonce, &ha2];
            md5_hex(&parts.join(":"))
        };

        let mut header = format!(
            "Digest username=\"{}\", realm=\"{}\", nonce=\"{}\", uri=\"{}\", response=\"{}\", algorithm={}",
            quote(username),
            quote(&self.realm),
            self.nonce,
            uri,
            response,
            self.algorithm
        );
        if self.qop_auth {
            let _ = write!(header, ", qop=auth, nc={}, cnonce=\"{}\"", nc, cnonce);
        }
        if let Some(opaque) = &self.opaque {
            let _ = write!(header, ", opaque=\"{}\"", opaque);
        }
        header
    }
}

/// Client side of the NTLM handshake.
///
/// The negotiate message gets a 401 carrying the server challenge, and the
/// authenticate message built from it completes the handshake on the same
/// connection.
#[derive(Debug, Clone, Default)]
pub struct NtlmAuth {
    /// Header for the next request.
    pending: Option<String>,
}

impl NtlmAuth {
    /// Queues the negotiate message that opens the handshake.
    pub fn negotiate(&mut self) -> ProviderResult<()> {
        let message = Message::Negotiate(NegotiateMessage {
            flags: Flags::NEGOTIATE_UNICODE
                | Flags::REQUEST_TARGET
                | Flags::NEGOTIATE_NTLM
                | Flags::NEGOTIATE_WORKSTATION_SUPPLIED,
            supplied_domain: String::new(),
            supplied_workstation: WORKSTATION.to_owned(),
            os_version: Default::default(),
        });
        let bytes = message.to_bytes().map_err(|e| {
            ProviderError::internal(format!("failed to encode NTLM negotiate message: {:?}", e))
        })?;
        self.pending = Some(format!("NTLM {}", STANDARD.encode(bytes)));
        Ok(())
    }

    /// Answers the server challenge found in the `WWW-Authenticate` values
    /// of a 401 and queues the authenticate message.
    ///
    /// A `DOMAIN\user` username is split into its parts. Any other form is
    /// sent with an empty domain.
    pub fn answer<'a>(
        &mut self,
        challenges: impl IntoIterator<Item = &'a str>,
        username: &str,
        password: &str,
    ) -> ProviderResult<()> {
        let token = challenges
            .into_iter()
            .find_map(|c| {
                let (name, token) = c.trim().split_once(' ')?;
                name.eq_ignore_ascii_case("ntlm").then(|| token.trim())
            })
            .ok_or_else(|| {
                ProviderError::authentication("Exchange did not answer the NTLM negotiate message")
            })?;

        let bytes = STANDARD.decode(token).map_err(|e| {
            ProviderError::invalid_response(format!("NTLM challenge is not base64: {}", e))
        })?;
        let challenge = match Message::try_from(bytes.as_slice()) {
            Ok(Message::Challenge(challenge)) => challenge,
            Ok(_) => {
                return Err(ProviderError::invalid_response(
                    "expected an NTLM challenge message",
                ));
            }
            Err(e) => {
                return Err(ProviderError::invalid_response(format!(
                    "malformed NTLM challenge: {:?}",
                    e
                )));
            }
        };

        let target_info: Vec<u8> = challenge
            .target_information
            .iter()
            .flat_map(|entry| entry.to_bytes())
            .collect();
        let (domain, user) = split_account(username);
        let credentials = Credentials {
            username: user.to_owned(),
            password: password.to_owned(),
            domain: domain.to_owned(),
        };
        let response = ntlmclient::respond_challenge_ntlm_v2(
            challenge.challenge,
            &target_info,
            ntlmclient::get_ntlm_time(),
            &credentials,
        );

        let message = response.to_message(
            &credentials,
            WORKSTATION,
            Flags::NEGOTIATE_UNICODE | Flags::NEGOTIATE_NTLM,
        );
        let bytes = message.to_bytes().map_err(|e| {
            ProviderError::internal(format!("failed to encode NTLM authenticate message: {:?}", e))
        })?;
        self.pending = Some(format!("NTLM {}", STANDARD.encode(bytes)));
        Ok(())
    }
}

fn split_account(username: &str) -> (&str, &str) {
    username.split_once('\\').unwrap_or(("", username))
}

pub fn basic_auth(username: &str, password: &str) -> String {
    format!("Basic {}", STANDARD.encode(format!("{}:{}", username, password)))
}

/// Splits `key=value, key="quoted \"value\""` into a map with lowercase keys.
fn parse_auth_params(input: &str) -> HashMap<String, String> {
    let mut params = HashMap::new();
    let mut rest = input.trim_start();

    while let Some((key, after)) = rest.split_once('=') {
        let key = key.trim_matches(|c: char| c == ',' || c.is_whitespace());
        if key.is_empty() {
            break;
        }
        let (value, tail) = match after.strip_prefix('"') {
            Some(quoted) => take_quoted(quoted),
            None => {
                let end = after.find(',').unwrap_or(after.len());
                (after[..end].trim().to_string(), &after[end..])
            }
        };
        params.insert(key.to_ascii_lowercase(), value);
        rest = tail.trim_start_matches(|c: char| c == ',' || c.is_whitespace());
    }

    params
}

/// Reads a quoted-string body up to its closing quote.
fn take_quoted(input: &str) -> (String, &str) {
    let mut value = String::new();
    let mut chars = input.char_indices();
    while let Some((i, c)) = chars.next() {
        match c {
            '\\' => {
                if let Some((_, escaped)) = chars.next() {
                    value.push(escaped);
                }
            }
            '"' => return (value, &input[i + 1..]),
            _ => value.push(c),
        }
    }
    (value, "")
}

fn quote(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

fn client_nonce() -> String {
    let bytes: [u8; 8] = rand::rng().random();
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

fn md5_hex(input: &str) -> String {
    format!("{:x}", md5::compute(input.as_bytes()))
}
