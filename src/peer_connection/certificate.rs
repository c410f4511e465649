use std::time::{SystemTime, UNIX_EPOCH};

use rcgen::{CertificateParams, KeyPair, RcgenError};
use sha2::{Digest, Sha256};

use crate::dtls_transport::dtls_fingerprint::RTCDtlsFingerprint;
use crate::error::{Error, Result};
use crate::math_rand_alpha;

/// Certificate represents a x509Cert used to authenticate WebRTC communications.
#[derive(Clone, Debug)]
pub struct RTCCertificate {
    pub(crate) certificate: Vec<u8>,
    pub(crate) stats_id: String,

    pem: String,
    expires: SystemTime,
}

/// Equals determines if two certificates are identical by comparing only certificate
impl PartialEq for RTCCertificate {
    fn eq(&self, other: &Self) -> bool {
        self.certificate == other.certificate
    }
}

impl RTCCertificate {
    /// from_params generates a new x509 compliant Certificate to be used
    /// by DTLS for encrypting data sent over the wire. This method differs from
    /// generate_certificate by allowing to specify a template x509.Certificate
    /// to be used in order to define certificate parameters.
    pub fn from_params(mut params: CertificateParams) -> Result<Self> {
        let key_pair = if let Some(key_pair) = params.key_pair.take() {
            if !key_pair.is_compatible(params.alg) {
                return Err(RcgenError::CertificateKeyPairMismatch.into());
            }
            key_pair
        } else {
            KeyPair::generate(params.alg)?
        };
        params.key_pair = Some(key_pair);

        let expires = params.not_after.into();

        let x509_cert = rcgen::Certificate::from_params(params)?;
        let certificate = x509_cert.serialize_der()?;

        Ok(RTCCertificate {
            certificate,
            stats_id: format!(
                "certificate-{}",
                SystemTime::now()
                    .duration_since(UNIX_EPOCH)
                    .map_or(0, |d| d.as_nanos())
            ),
            pem: x509_cert.serialize_pem()?,
            expires,
        })
    }

    /// from_key_pair causes the creation of an X.509 certificate and
    /// corresponding private key.
    pub fn from_key_pair(key_pair: KeyPair) -> Result<Self> {
        let mut params = CertificateParams::new(vec![math_rand_alpha(16)]);

        if key_pair.is_compatible(&rcgen::PKCS_ED25519) {
            params.alg = &rcgen::PKCS_ED25519;
        } else if key_pair.is_compatible(&rcgen::PKCS_ECDSA_P256_SHA256) {
            params.alg = &rcgen::PKCS_ECDSA_P256_SHA256;
        } else {
            return Err(Error::new("Unsupported key_pair".to_owned()));
        }
        params.key_pair = Some(key_pair);

        RTCCertificate::from_params(params)
    }

    /// Constructs a `RTCCertificate` from an existing DER-encoded certificate.
    ///
    /// Use this method when you have a persistent certificate (i.e. you don't
    /// want to generate a new one for each DTLS connection).
    pub fn from_existing(certificate: Vec<u8>, pem: &str, expires: SystemTime) -> Self {
        Self {
            certificate,
            stats_id: format!(
                "certificate-{}",
                SystemTime::now()
                    .duration_since(UNIX_EPOCH)
                    .map_or(0, |d| d.as_nanos())
            ),
            pem: pem.to_owned(),
            expires,
        }
    }

    /// expires returns the timestamp after which this certificate is no longer valid.
    pub fn expires(&self) -> SystemTime {
        self.expires
    }

    /// pem returns the certificate encoded as two PEM blocks: one for the X509
    /// certificate and the other for the private key.
    pub fn pem(&self) -> &str {
        &self.pem
    }

    /// get_fingerprints returns the certificate fingerprint, computed with the
    /// digest algorithm used in the certificate signature.
    pub fn get_fingerprints(&self) -> Result<Vec<RTCDtlsFingerprint>> {
        let mut h = Sha256::new();
        h.update(&self.certificate);
        let hashed = h.finalize();
        let values: Vec<String> = hashed.iter().map(|x| format!("{x:02x}")).collect();

        Ok(vec![RTCDtlsFingerprint {
            algorithm: "sha-256".to_owned(),
            value: values.join(":"),
        }])
    }
}
