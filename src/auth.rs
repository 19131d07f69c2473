//! Credential digests and the authentication handshakes.
use Error::AuthenticationError;
use Result;

use bson::{self, Bson};
use bson::spec::BinarySubtype;
use connection::Connection;
use connstring::AuthMechanism;
use common::WireVersion;
use data_encoding::BASE64;
use hex;
use hmac::{Hmac, Mac};
use md5::{Digest, Md5};
use pbkdf2::pbkdf2_hmac;
use rand::{self, RngCore};
use sha1::Sha1;

/// Bytes of entropy behind the client nonce.
const NONCE_LENGTH: usize = 18;
/// SCRAM derives a 20-byte salted password from the credential digest.
const SALTED_PASSWORD_LENGTH: usize = 20;

/// Computes the MongoDB credential digest:
/// `lowercase(hex(MD5("<user>:mongo:<password>")))`.
pub fn make_digest(username: &str, password: &str) -> String {
    let mut md5 = Md5::new();
    md5.update(username.as_bytes());
    md5.update(b":mongo:");
    md5.update(password.as_bytes());
    hex::encode(md5.finalize())
}

/// The first half of a SCRAM-SHA-1 exchange: nonce generation and the
/// client-first message. Consumed by `update` once the server answers.
pub struct ScramSha1 {
    nonce: String,
    client_first_bare: Option<String>,
}

/// The second half of the exchange, carrying the secrets needed to verify
/// the server's signature.
pub struct ScramFinal {
    salted_password: [u8; SALTED_PASSWORD_LENGTH],
    auth_message: String,
}

impl ScramSha1 {
    pub fn new() -> ScramSha1 {
        let mut bytes = [0u8; NONCE_LENGTH];
        rand::thread_rng().fill_bytes(&mut bytes);
        ScramSha1::with_nonce(BASE64.encode(&bytes))
    }

    fn with_nonce(nonce: String) -> ScramSha1 {
        ScramSha1 {
            nonce: nonce,
            client_first_bare: None,
        }
    }

    /// Builds the client-first message, `n,,n=<escaped user>,r=<nonce>`.
    pub fn initial_request(&mut self, username: &str) -> String {
        let bare = format!("n={},r={}", escape_username(username), self.nonce);
        let message = format!("n,,{}", bare);
        self.client_first_bare = Some(bare);
        message
    }

    /// Digests the server-first message and produces the client-final
    /// message carrying the proof.
    pub fn update(self, password_digest: &str, server_first: &str) -> Result<(ScramFinal, String)> {
        let bare = self.client_first_bare.ok_or_else(|| {
            AuthenticationError("SCRAM update issued before the initial request".to_owned())
        })?;

        let mut server_nonce = None;
        let mut salt = None;
        let mut iterations = None;
        for part in server_first.split(',') {
            if part.starts_with("r=") {
                server_nonce = Some(part[2..].to_owned());
            } else if part.starts_with("s=") {
                salt = Some(BASE64.decode(part[2..].as_bytes()).map_err(|_| {
                    AuthenticationError("server salt is not valid base64".to_owned())
                })?);
            } else if part.starts_with("i=") {
                iterations = Some(part[2..].parse::<u32>().map_err(|_| {
                    AuthenticationError("server iteration count is not a number".to_owned())
                })?);
            }
        }
        let server_nonce = server_nonce.ok_or_else(|| {
            AuthenticationError("server-first message is missing the nonce".to_owned())
        })?;
        let salt = salt.ok_or_else(|| {
            AuthenticationError("server-first message is missing the salt".to_owned())
        })?;
        let iterations = iterations.ok_or_else(|| {
            AuthenticationError("server-first message is missing the iteration count".to_owned())
        })?;

        if !server_nonce.starts_with(&self.nonce) {
            return Err(AuthenticationError(
                "server nonce does not extend the client nonce".to_owned(),
            ));
        }

        let mut salted_password = [0u8; SALTED_PASSWORD_LENGTH];
        pbkdf2_hmac::<Sha1>(
            password_digest.as_bytes(),
            &salt,
            iterations,
            &mut salted_password,
        );

        let without_proof = format!("c=biws,r={}", server_nonce);
        let auth_message = format!("{},{},{}", bare, server_first, without_proof);

        let client_key = hmac_sha1(&salted_password, b"Client Key")?;
        let stored_key = sha1(&client_key);
        let client_signature = hmac_sha1(&stored_key, auth_message.as_bytes())?;
        let proof: Vec<u8> = client_key
            .iter()
            .zip(client_signature.iter())
            .map(|(key, sig)| key ^ sig)
            .collect();

        let client_final = format!("{},p={}", without_proof, BASE64.encode(&proof));
        let state = ScramFinal {
            salted_password: salted_password,
            auth_message: auth_message,
        };
        Ok((state, client_final))
    }
}

impl ScramFinal {
    /// Verifies the server-final message against the expected signature.
    pub fn finalize(self, server_final: &str) -> Result<()> {
        if server_final.starts_with("e=") {
            return Err(AuthenticationError(
                format!("server rejected authentication: {}", &server_final[2..]),
            ));
        }
        if !server_final.starts_with("v=") {
            return Err(AuthenticationError(
                "server-final message carries no verifier".to_owned(),
            ));
        }

        let server_key = hmac_sha1(&self.salted_password, b"Server Key")?;
        let server_signature = hmac_sha1(&server_key, self.auth_message.as_bytes())?;
        if &server_final[2..] != BASE64.encode(&server_signature) {
            return Err(AuthenticationError(
                "server signature mismatch; the server may not hold the credentials it claims"
                    .to_owned(),
            ));
        }
        Ok(())
    }
}

/// Authenticates a freshly handshaken connection, picking the mechanism from
/// the settings and the server capabilities.
pub fn authenticate(conn: &mut Connection) -> Result<()> {
    match select_mechanism(conn)? {
        AuthMechanism::None => Ok(()),
        AuthMechanism::ScramSha1 => scram_sha1_authenticate(conn),
        AuthMechanism::MongoDbCr => mongodb_cr_authenticate(conn),
        AuthMechanism::MongoDbX509 => x509_authenticate(conn),
    }
}

fn select_mechanism(conn: &Connection) -> Result<AuthMechanism> {
    let wire_version = conn.description().max_wire_version;
    let config = conn.config();

    match config.auth_mechanism {
        AuthMechanism::None => {
            if config.ssl_pem_key_file.is_some() && wire_version >= WireVersion::V26 {
                Ok(AuthMechanism::MongoDbX509)
            } else if config.digest.is_some() {
                if wire_version >= WireVersion::V30 {
                    Ok(AuthMechanism::ScramSha1)
                } else {
                    Ok(AuthMechanism::MongoDbCr)
                }
            } else {
                Ok(AuthMechanism::None)
            }
        }
        AuthMechanism::ScramSha1 => {
            if wire_version < WireVersion::V30 {
                Err(AuthenticationError(
                    "the server does not support SCRAM-SHA-1".to_owned(),
                ))
            } else {
                Ok(AuthMechanism::ScramSha1)
            }
        }
        AuthMechanism::MongoDbX509 => {
            if wire_version < WireVersion::V26 {
                Err(AuthenticationError(
                    "the server does not support MONGODB-X509".to_owned(),
                ))
            } else {
                Ok(AuthMechanism::MongoDbX509)
            }
        }
        AuthMechanism::MongoDbCr => Ok(AuthMechanism::MongoDbCr),
    }
}

fn credentials(conn: &Connection) -> Result<(String, String, String)> {
    let config = conn.config();
    let username = config.username.clone().ok_or_else(|| {
        AuthenticationError("no username configured".to_owned())
    })?;
    let digest = config.digest.clone().ok_or_else(|| {
        AuthenticationError("no password configured".to_owned())
    })?;
    let auth_db = config.auth_database().to_owned();
    Ok((username, digest, auth_db))
}

fn scram_sha1_authenticate(conn: &mut Connection) -> Result<()> {
    let (username, digest, auth_db) = credentials(conn)?;

    let mut scram = ScramSha1::new();
    let client_first = scram.initial_request(&username);
    let start = doc! {
        "saslStart": 1,
        "mechanism": "SCRAM-SHA-1",
        "payload": Bson::Binary(BinarySubtype::Generic, client_first.into_bytes())
    };
    let reply = conn.run_command_checked(&auth_db, start)
        .map_err(auth_failure)?;
    let conversation_id = reply
        .get("conversationId")
        .cloned()
        .unwrap_or(Bson::I32(1));
    let server_first = binary_payload(&reply)?;

    let (state, client_final) = scram.update(&digest, &server_first)?;
    let next = doc! {
        "saslContinue": 1,
        "conversationId": conversation_id.clone(),
        "payload": Bson::Binary(BinarySubtype::Generic, client_final.into_bytes())
    };
    let reply = conn.run_command_checked(&auth_db, next).map_err(auth_failure)?;
    state.finalize(&binary_payload(&reply)?)?;

    // Some servers need one empty round before they flag the conversation done.
    if !conversation_done(&reply) {
        let finish = doc! {
            "saslContinue": 1,
            "conversationId": conversation_id,
            "payload": Bson::Binary(BinarySubtype::Generic, Vec::new())
        };
        let reply = conn.run_command_checked(&auth_db, finish).map_err(auth_failure)?;
        if !conversation_done(&reply) {
            return Err(AuthenticationError(
                "server did not complete the SCRAM conversation".to_owned(),
            ));
        }
    }
    Ok(())
}

fn mongodb_cr_authenticate(conn: &mut Connection) -> Result<()> {
    let (username, digest, auth_db) = credentials(conn)?;

    let reply = conn.run_command_checked(&auth_db, doc! { "getnonce": 1 })
        .map_err(auth_failure)?;
    let nonce = match reply.get("nonce") {
        Some(&Bson::String(ref nonce)) => nonce.clone(),
        _ => {
            return Err(AuthenticationError(
                "getnonce reply carries no nonce".to_owned(),
            ))
        }
    };

    let command = doc! {
        "authenticate": 1,
        "user": username.clone(),
        "nonce": nonce.clone(),
        "key": mongodb_cr_key(&nonce, &username, &digest)
    };
    conn.run_command_checked(&auth_db, command)
        .map_err(auth_failure)?;
    Ok(())
}

fn x509_authenticate(conn: &mut Connection) -> Result<()> {
    if !conn.is_ssl() {
        return Err(AuthenticationError(
            "MONGODB-X509 requires a TLS connection".to_owned(),
        ));
    }
    let mut command = doc! {
        "authenticate": 1,
        "mechanism": "MONGODB-X509"
    };
    if let Some(ref username) = conn.config().username.clone() {
        command.insert("user", username.clone());
    }
    conn.run_command_checked("$external", command)
        .map_err(auth_failure)?;
    Ok(())
}

/// The MONGODB-CR proof: `md5hex(nonce + user + digest)`.
fn mongodb_cr_key(nonce: &str, username: &str, digest: &str) -> String {
    let mut md5 = Md5::new();
    md5.update(nonce.as_bytes());
    md5.update(username.as_bytes());
    md5.update(digest.as_bytes());
    hex::encode(md5.finalize())
}

fn escape_username(username: &str) -> String {
    username.replace("=", "=3D").replace(",", "=2C")
}

fn auth_failure(err: ::Error) -> ::Error {
    AuthenticationError(format!("{}", err))
}

fn binary_payload(reply: &bson::Document) -> Result<String> {
    match reply.get("payload") {
        Some(&Bson::Binary(_, ref bytes)) => {
            String::from_utf8(bytes.clone()).map_err(|_| {
                AuthenticationError("authentication payload is not UTF-8".to_owned())
            })
        }
        _ => Err(AuthenticationError(
            "authentication reply carries no payload".to_owned(),
        )),
    }
}

fn conversation_done(reply: &bson::Document) -> bool {
    match reply.get("done") {
        Some(&Bson::Boolean(done)) => done,
        _ => false,
    }
}

fn hmac_sha1(key: &[u8], data: &[u8]) -> Result<Vec<u8>> {
    let mut mac = Hmac::<Sha1>::new_from_slice(key)
        .map_err(|_| AuthenticationError("invalid HMAC key".to_owned()))?;
    mac.update(data);
    Ok(mac.finalize().into_bytes().to_vec())
}

fn sha1(data: &[u8]) -> Vec<u8> {
    let mut hasher = Sha1::new();
    hasher.update(data);
    hasher.finalize().to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn digest_matches_known_value() {
        let digest = make_digest("fred", "foobar");
        assert_eq!(digest, "8d15e819089d6e18c601608332c72311");
        assert_eq!(digest.len(), 32);
        assert!(digest.bytes().all(|b| b.is_ascii_hexdigit() && !b.is_ascii_uppercase()));
    }

    #[test]
    fn username_escaping() {
        assert_eq!(escape_username("a=b,c"), "a=3Db=2Cc");
    }

    #[test]
    fn mongodb_cr_key_matches_known_value() {
        let digest = make_digest("fred", "foobar");
        let key = mongodb_cr_key("2375531c32080ae8", "fred", &digest);
        assert_eq!(key, "5ac1a2bffc1019a77c5c717e4249eba7");
    }

    // The RFC 5802 example exchange, with the password standing in for the
    // credential digest.
    #[test]
    fn scram_exchange_vector() {
        let mut scram = ScramSha1::with_nonce("fyko+d2lbbFgONRv9qkxdawL".to_owned());
        let first = scram.initial_request("user");
        assert_eq!(first, "n,,n=user,r=fyko+d2lbbFgONRv9qkxdawL");

        let server_first =
            "r=fyko+d2lbbFgONRv9qkxdawL3rfcNHYJY1ZVvWVs7j,s=QSXCR+Q6sek8bf92,i=4096";
        let (state, client_final) = scram.update("pencil", server_first).unwrap();
        assert_eq!(
            client_final,
            "c=biws,r=fyko+d2lbbFgONRv9qkxdawL3rfcNHYJY1ZVvWVs7j,p=v0X8v3Bz2T0CJGbJQyF0X+HI4Ts="
        );

        state.finalize("v=rmF9pqV8S7suAoZWja4dJRkFsKQ=").unwrap();
    }

    #[test]
    fn scram_rejects_truncated_server_nonce() {
        let mut scram = ScramSha1::with_nonce("fyko+d2lbbFgONRv9qkxdawL".to_owned());
        scram.initial_request("user");
        let err = scram.update("pencil", "r=bogus,s=QSXCR+Q6sek8bf92,i=4096");
        assert!(err.is_err());
    }

    #[test]
    fn scram_rejects_malformed_server_first() {
        let mut scram = ScramSha1::with_nonce("abc".to_owned());
        scram.initial_request("user");
        assert!(scram.update("pencil", "garbage").is_err());

        let mut scram = ScramSha1::with_nonce("abc".to_owned());
        scram.initial_request("user");
        assert!(scram.update("pencil", "r=abcdef,s=###,i=4096").is_err());

        let mut scram = ScramSha1::with_nonce("abc".to_owned());
        scram.initial_request("user");
        assert!(scram.update("pencil", "r=abcdef,s=QSXCR+Q6sek8bf92,i=lots").is_err());
    }

    #[test]
    fn scram_rejects_bad_server_signature() {
        let mut scram = ScramSha1::with_nonce("fyko+d2lbbFgONRv9qkxdawL".to_owned());
        scram.initial_request("user");
        let server_first =
            "r=fyko+d2lbbFgONRv9qkxdawL3rfcNHYJY1ZVvWVs7j,s=QSXCR+Q6sek8bf92,i=4096";
        let (state, _) = scram.update("pencil", server_first).unwrap();
        assert!(state.finalize("v=AAAAAAAAAAAAAAAAAAAAAAAAAAA=").is_err());
    }

    #[test]
    fn scram_surfaces_server_error() {
        let mut scram = ScramSha1::with_nonce("fyko+d2lbbFgONRv9qkxdawL".to_owned());
        scram.initial_request("user");
        let server_first =
            "r=fyko+d2lbbFgONRv9qkxdawL3rfcNHYJY1ZVvWVs7j,s=QSXCR+Q6sek8bf92,i=4096";
        let (state, _) = scram.update("pencil", server_first).unwrap();
        assert!(state.finalize("e=other-error").is_err());
    }
}
