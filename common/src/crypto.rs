// Copyright (C) 2024 Nicola Dardanis <nicdard@gmail.com>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//
use std::fmt;

use base64::{engine::general_purpose, Engine as _};
use rand::rngs::OsRng;
use rcgen::{
    CertificateParams, DistinguishedName, DnType, KeyPair, RemoteKeyPair, SignatureAlgorithm,
    PKCS_RSA_SHA256,
};
use rsa::{
    pkcs1::{EncodeRsaPrivateKey, EncodeRsaPublicKey},
    pkcs1v15::SigningKey,
    signature::{SignatureEncoding, Signer},
    RsaPrivateKey,
};
use sha2::Sha256;

use crate::config::SubjectSettings;
use crate::error::{Error, Result};

/// The smallest RSA modulus the key generator accepts.
pub const MIN_KEY_BITS: usize = 512;
/// The largest RSA modulus the key generator accepts.
pub const MAX_KEY_BITS: usize = 8192;
/// PEM label of a PKCS#1 RSA private key.
pub const RSA_PRIVATE_KEY_LABEL: &str = "RSA PRIVATE KEY";
/// PEM label of a PKCS#10 certificate signing request.
pub const CERTIFICATE_REQUEST_LABEL: &str = "CERTIFICATE REQUEST";

/// Generate a fresh RSA private key of `bits` bits using the OS random source.
/// The key is validated before being returned.
pub fn generate_private_key(bits: usize) -> Result<RsaPrivateKey> {
    check_key_size(bits)?;
    let private_key = RsaPrivateKey::new(&mut OsRng, bits)?;
    private_key.validate()?;
    log::debug!("Generated a `{}` bits RSA private key.", bits);
    Ok(private_key)
}

/// Check that `bits` is within [`MIN_KEY_BITS`, `MAX_KEY_BITS`].
pub fn check_key_size(bits: usize) -> Result<()> {
    if (MIN_KEY_BITS..=MAX_KEY_BITS).contains(&bits) {
        Ok(())
    } else {
        Err(Error::KeySize(bits))
    }
}

/// Encode the private key in PKCS#1 ASN.1 DER and wrap it in a `RSA PRIVATE KEY` PEM block.
pub fn encode_private_key_to_pem(private_key: &RsaPrivateKey) -> Result<Vec<u8>> {
    let der = private_key
        .to_pkcs1_der()
        .map_err(|e| Error::KeyEncoding(e.to_string()))?;
    let block = pem::Pem::new(RSA_PRIVATE_KEY_LABEL, der.as_bytes());
    let encoded = pem::encode_config(
        &block,
        pem::EncodeConfig::new().set_line_ending(pem::LineEnding::LF),
    );
    Ok(encoded.into_bytes())
}

/// The distinguished name a certificate request is made for.
/// The common name is mandatory, every other attribute is optional.
/// Values are taken verbatim: no escaping nor RFC 4514 validation is performed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subject {
    common_name: String,
    country: Option<String>,
    state: Option<String>,
    locality: Option<String>,
    organization: Option<String>,
    organizational_unit: Option<String>,
}

impl Subject {
    pub fn new(common_name: impl Into<String>) -> Self {
        Subject {
            common_name: common_name.into(),
            country: None,
            state: None,
            locality: None,
            organization: None,
            organizational_unit: None,
        }
    }

    /// Build the subject for `common_name`, filling the optional attributes from the settings.
    pub fn from_settings(common_name: impl Into<String>, settings: &SubjectSettings) -> Self {
        Subject {
            common_name: common_name.into(),
            country: settings.country.clone(),
            state: settings.state.clone(),
            locality: settings.locality.clone(),
            organization: settings.organization.clone(),
            organizational_unit: settings.organizational_unit.clone(),
        }
    }

    /// Add the country (C) attribute.
    pub fn with_country(mut self, country: impl Into<String>) -> Self {
        self.country = Some(country.into());
        self
    }

    /// Add the state or province (ST) attribute.
    pub fn with_state(mut self, state: impl Into<String>) -> Self {
        self.state = Some(state.into());
        self
    }

    /// Add the locality (L) attribute.
    pub fn with_locality(mut self, locality: impl Into<String>) -> Self {
        self.locality = Some(locality.into());
        self
    }

    /// Add the organization (O) attribute.
    pub fn with_organization(mut self, organization: impl Into<String>) -> Self {
        self.organization = Some(organization.into());
        self
    }

    /// Add the organizational unit (OU) attribute.
    pub fn with_organizational_unit(mut self, organizational_unit: impl Into<String>) -> Self {
        self.organizational_unit = Some(organizational_unit.into());
        self
    }

    pub fn common_name(&self) -> &str {
        &self.common_name
    }

    /// The attributes in the order they appear in the encoded name, the common name last.
    fn attributes(&self) -> Vec<(DnType, &str, &'static str)> {
        let optional = [
            (DnType::CountryName, &self.country, "C"),
            (DnType::StateOrProvinceName, &self.state, "ST"),
            (DnType::LocalityName, &self.locality, "L"),
            (DnType::OrganizationName, &self.organization, "O"),
            (DnType::OrganizationalUnitName, &self.organizational_unit, "OU"),
        ];
        let mut attributes: Vec<_> = optional
            .into_iter()
            .filter_map(|(ty, value, short)| value.as_deref().map(|v| (ty, v, short)))
            .collect();
        attributes.push((DnType::CommonName, self.common_name.as_str(), "CN"));
        attributes
    }

    fn to_distinguished_name(&self) -> DistinguishedName {
        let mut dn = DistinguishedName::new();
        for (ty, value, _) in self.attributes() {
            dn.push(ty, value);
        }
        dn
    }
}

/// OpenSSL one-line form, e.g. `/O=Company Ltd/CN=acme`.
impl fmt::Display for Subject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (_, value, short) in self.attributes() {
            write!(f, "/{}={}", short, value)?;
        }
        Ok(())
    }
}

/// Signs with the `rsa` crate on behalf of rcgen, so that every key size the generator
/// accepts can sign its own request.
struct RsaSigner {
    public_key_der: Vec<u8>,
    signing_key: SigningKey<Sha256>,
}

impl RsaSigner {
    fn new(private_key: &RsaPrivateKey) -> Result<Self> {
        // rcgen wraps the raw PKCS#1 public key in the SubjectPublicKeyInfo itself.
        let public_key_der = private_key
            .to_public_key()
            .to_pkcs1_der()
            .map_err(|e| Error::KeyEncoding(e.to_string()))?
            .as_bytes()
            .to_vec();
        Ok(RsaSigner {
            public_key_der,
            signing_key: SigningKey::<Sha256>::new(private_key.clone()),
        })
    }
}

impl RemoteKeyPair for RsaSigner {
    fn public_key(&self) -> &[u8] {
        &self.public_key_der
    }

    fn sign(&self, msg: &[u8]) -> std::result::Result<Vec<u8>, rcgen::Error> {
        self.signing_key
            .try_sign(msg)
            .map(|signature| signature.to_vec())
            .map_err(|e| {
                log::error!("RSA signing failed: `{}`", e);
                rcgen::Error::RemoteKeyError
            })
    }

    fn algorithm(&self) -> &'static SignatureAlgorithm {
        &PKCS_RSA_SHA256
    }
}

/// Create a certificate signing request for the given subject, signed with SHA-256-with-RSA
/// by the private key. Returns the request as a `CERTIFICATE REQUEST` PEM block.
pub fn mk_certificate_request(subject: &Subject, private_key: &RsaPrivateKey) -> Result<Vec<u8>> {
    let key_pair = KeyPair::from_remote(Box::new(RsaSigner::new(private_key)?))?;

    let mut params = CertificateParams::default();
    params.distinguished_name = subject.to_distinguished_name();
    let certificate_request = params.serialize_request(&key_pair)?;
    log::debug!("Certificate signing request created for `{}`.", subject);
    Ok(certificate_request.pem()?.into_bytes())
}

/// Standard, padded base64 without line breaks.
pub fn encode64(data: &[u8]) -> String {
    general_purpose::STANDARD.encode(data)
}
