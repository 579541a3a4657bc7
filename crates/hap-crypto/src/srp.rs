//! Server side SRP-6a for HomeKit pair-setup.
//!
//! Uses 3072-bit prime (RFC 5054), generator g=5, SHA-512. Apart from `k`,
//! every hash input is the minimal big-endian encoding of its integer.

use hap_core::error::CryptoError;
use num_bigint::{BigUint, RandBigInt};
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::{Digest, Sha512};
use subtle::ConstantTimeEq;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// N size in bytes (3072 bits = 384 bytes).
const N_BYTES: usize = 384;

/// Salt length generated for new sessions.
pub const SALT_LEN: usize = 16;

/// RFC 5054 3072-bit prime N as hex string.
const RFC5054_N_3072: &str = concat!(
    "FFFFFFFFFFFFFFFFC90FDAA22168C234C4C6628B80DC1CD129024E08",
    "8A67CC74020BBEA63B139B22514A08798E3404DDEF9519B3CD3A431B",
    "302B0A6DF25F14374FE1356D6D51C245E485B576625E7EC6F44C42E9",
    "A637ED6B0BFF5CB6F406B7EDEE386BFB5A899FA5AE9F24117C4B1FE6",
    "49286651ECE45B3DC2007CB8A163BF0598DA48361C55D39A69163FA8",
    "FD24CF5F83655D23DCA3AD961C62F356208552BB9ED529077096966D",
    "670C354E4ABC9804F1746C08CA18217C32905E462E36CE3BE39E772C",
    "180E86039B2783A2EC07A28FB5C55DF06F4C52C9DE2BCBF695581718",
    "3995497CEA956AE515D2261898FA051015728E5A8AAAC42DAD33170D",
    "04507A33A85521ABDF1CBA64ECFB850458DBEF0A8AEA71575D060C7D",
    "B3970F85A6E1E4C7ABF5AE8CDB0933D71E8C94E04A25619DCEE3D226",
    "1AD2EE6BF12FFA06D98A0864D87602733EC86A64521F2B18177B200C",
    "BBE117577A615D6C770988C0BAD946E208E24FA074E5AB3143DB5BFC",
    "E0FD108E4B82D120A93AD2CAFFFFFFFFFFFFFFFF"
);

/// SRP-6a group parameters.
#[derive(Debug, Clone)]
pub struct SrpParams {
    /// Prime modulus N.
    pub n: BigUint,
    /// Generator g (always 5).
    pub g: BigUint,
}

impl Default for SrpParams {
    fn default() -> Self {
        // Digits are a compile-time constant, a parse failure cannot happen.
        let n = BigUint::parse_bytes(RFC5054_N_3072.as_bytes(), 16).unwrap_or_default();
        let g = BigUint::from(5u32);
        Self { n, g }
    }
}

/// Values fixed once the client public key is known.
#[derive(Zeroize, ZeroizeOnDrop)]
struct KeyExchange {
    #[zeroize(skip)]
    scrambling: BigUint,
    #[zeroize(skip)]
    premaster_secret: BigUint,
    session_key: Vec<u8>,
    client_proof: Vec<u8>,
    server_proof: Vec<u8>,
}

/// Lifecycle of one server session.
enum SrpState {
    Initialized,
    KeyExchanged(KeyExchange),
}

/// Server side SRP state machine.
///
/// B is available right after construction. Proofs and the session key
/// only exist once [`SrpServer::compute_session_key`] has accepted a client
/// public key.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct SrpServer {
    #[zeroize(skip)]
    params: SrpParams,
    username: Vec<u8>,
    salt: Vec<u8>,
    private_key: Vec<u8>,
    #[zeroize(skip)]
    verifier: BigUint,
    #[zeroize(skip)]
    public_key: BigUint,
    #[zeroize(skip)]
    state: SrpState,
}

impl SrpServer {
    /// Start a session with a random salt and private key.
    ///
    /// For HomeKit the username is "Pair-Setup" and the password is the
    /// setup code.
    pub fn new(username: &[u8], password: &[u8]) -> Self {
        let mut salt = [0u8; SALT_LEN];
        OsRng.fill_bytes(&mut salt);

        let b = OsRng.gen_biguint(256);

        Self::with_salt_and_key(username, password, &salt, &b.to_bytes_be())
    }

    /// Start a session with caller supplied salt and private key.
    pub fn with_salt_and_key(
        username: &[u8],
        password: &[u8],
        salt: &[u8],
        private_key: &[u8],
    ) -> Self {
        let params = SrpParams::default();

        let k = compute_k(&params);
        let x = compute_x(salt, username, password);
        let verifier = params.g.modpow(&x, &params.n);

        // B = (k*v + g^b) mod N
        let b = BigUint::from_bytes_be(private_key);
        let public_key = (&k * &verifier + params.g.modpow(&b, &params.n)) % &params.n;

        Self {
            params,
            username: username.to_vec(),
            salt: salt.to_vec(),
            private_key: private_key.to_vec(),
            verifier,
            public_key,
            state: SrpState::Initialized,
        }
    }

    pub fn salt(&self) -> &[u8] {
        &self.salt
    }

    /// Server public key B.
    pub fn public_key(&self) -> Vec<u8> {
        self.public_key.to_bytes_be()
    }

    /// Password verifier v.
    pub fn verifier(&self) -> Vec<u8> {
        self.verifier.to_bytes_be()
    }

    pub fn is_key_exchanged(&self) -> bool {
        matches!(self.state, SrpState::KeyExchanged(_))
    }

    /// Accept the client public key A and derive S, K, M1 and M2.
    pub fn compute_session_key(&mut self, client_public_key: &[u8]) -> Result<(), CryptoError> {
        if self.is_key_exchanged() {
            return Err(CryptoError::KeyDerivation(
                "SRP key exchange already completed".to_string(),
            ));
        }

        let a = BigUint::from_bytes_be(client_public_key);

        if &a % &self.params.n == BigUint::ZERO {
            return Err(CryptoError::KeyDerivation(
                "Invalid client public key: A mod N = 0".to_string(),
            ));
        }

        let a_bytes = a.to_bytes_be();
        let b_bytes = self.public_key.to_bytes_be();

        // u = H(A || B)
        let scrambling = BigUint::from_bytes_be(&sha512(&[&a_bytes, &b_bytes]));

        // S = (A * v^u mod N)^b mod N
        let b = BigUint::from_bytes_be(&self.private_key);
        let v_u = self.verifier.modpow(&scrambling, &self.params.n);
        let premaster_secret = ((&a * v_u) % &self.params.n).modpow(&b, &self.params.n);

        // K = H(S)
        let session_key = sha512(&[&premaster_secret.to_bytes_be()]);

        let client_proof = compute_m1(
            &self.params,
            &self.username,
            &self.salt,
            &a_bytes,
            &b_bytes,
            &session_key,
        );

        // M2 = H(A || M1 || K)
        let server_proof = sha512(&[&a_bytes, &client_proof, &session_key]);

        self.state = SrpState::KeyExchanged(KeyExchange {
            scrambling,
            premaster_secret,
            session_key,
            client_proof,
            server_proof,
        });

        Ok(())
    }

    /// Check a client proof M1 in constant time.
    ///
    /// Always false before key exchange.
    pub fn verify_proof(&self, client_proof: &[u8]) -> bool {
        match &self.state {
            SrpState::KeyExchanged(exchange) => exchange.client_proof.ct_eq(client_proof).into(),
            SrpState::Initialized => false,
        }
    }

    /// Session key K.
    pub fn session_key(&self) -> Option<&[u8]> {
        self.exchange().map(|e| e.session_key.as_slice())
    }

    /// Expected client proof M1.
    pub fn client_proof(&self) -> Option<&[u8]> {
        self.exchange().map(|e| e.client_proof.as_slice())
    }

    /// Server proof M2.
    pub fn server_proof(&self) -> Option<&[u8]> {
        self.exchange().map(|e| e.server_proof.as_slice())
    }

    /// Scrambling parameter u.
    pub fn scrambling_parameter(&self) -> Option<Vec<u8>> {
        self.exchange().map(|e| e.scrambling.to_bytes_be())
    }

    /// Premaster secret S.
    pub fn premaster_secret(&self) -> Option<Vec<u8>> {
        self.exchange().map(|e| e.premaster_secret.to_bytes_be())
    }

    fn exchange(&self) -> Option<&KeyExchange> {
        match &self.state {
            SrpState::KeyExchanged(exchange) => Some(exchange),
            SrpState::Initialized => None,
        }
    }
}

impl std::fmt::Debug for SrpServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SrpServer")
            .field("username", &String::from_utf8_lossy(&self.username))
            .field("key_exchanged", &self.is_key_exchanged())
            .finish_non_exhaustive()
    }
}

fn sha512(parts: &[&[u8]]) -> Vec<u8> {
    let mut hasher = Sha512::new();
    for part in parts {
        hasher.update(part);
    }
    hasher.finalize().to_vec()
}

/// Compute k = H(N || PAD(g))
fn compute_k(params: &SrpParams) -> BigUint {
    BigUint::from_bytes_be(&sha512(&[&params.n.to_bytes_be(), &pad_to_n(&params.g)]))
}

/// Compute x = H(salt || H(identity || ":" || password))
fn compute_x(salt: &[u8], identity: &[u8], password: &[u8]) -> BigUint {
    let inner = sha512(&[identity, b":", password]);
    BigUint::from_bytes_be(&sha512(&[salt, &inner]))
}

/// Compute M1 = H(H(g) XOR H(N) || H(I) || salt || A || B || K)
fn compute_m1(
    params: &SrpParams,
    identity: &[u8],
    salt: &[u8],
    a: &[u8],
    b: &[u8],
    k: &[u8],
) -> Vec<u8> {
    let h_g = sha512(&[&params.g.to_bytes_be()]);
    let h_n = sha512(&[&params.n.to_bytes_be()]);

    let xor: Vec<u8> = h_g.iter().zip(h_n.iter()).map(|(g, n)| g ^ n).collect();
    let h_i = sha512(&[identity]);

    sha512(&[&xor, &h_i, salt, a, b, k])
}

/// Pad BigUint to N_BYTES with leading zeros.
fn pad_to_n(n: &BigUint) -> Vec<u8> {
    let bytes = n.to_bytes_be();
    if bytes.len() >= N_BYTES {
        return bytes;
    }
    let mut padded = vec![0u8; N_BYTES - bytes.len()];
    padded.extend_from_slice(&bytes);
    padded
}
