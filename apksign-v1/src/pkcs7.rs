// Copyright 2024 Google LLC
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! PKCS#7 `SignedData` wrapping of a signer's `.SF` file, i.e. the contents
//! of `META-INF/<NAME>.RSA`.

use apksign_common::{ApkSignError, DigestAlgorithm, Result};
use rasn::types::Integer::Primitive;
use rasn::types::Oid;
use rasn::{Decode, Encode};
use rasn_cms::algorithms::RSA;
use rasn_cms::pkcs7_compat::{EncapsulatedContentInfo, SignedData};
use rasn_cms::{
    AlgorithmIdentifier, Certificate, CertificateChoices, ContentInfo, IssuerAndSerialNumber,
    SignerIdentifier, SignerInfo
};
use rsa::{Pkcs1v15Sign, RsaPrivateKey};

const OID_SHA1: &Oid = rasn::types::Oid::ISO_IDENTIFIED_ORGANIZATION_OIW_SECSIG_ALGORITHM_SHA1;
const OID_SHA256: &Oid =
    rasn::types::Oid::JOINT_ISO_ITU_T_COUNTRY_US_ORGANIZATION_GOV_CSOR_NIST_ALGORITHMS_HASH_SHA256;
const OID_PKCS7_DATA: &Oid = rasn::types::Oid::ISO_MEMBER_BODY_US_RSADSI_PKCS7_DATA;
const OID_PKCS7_SIGNED_DATA: &Oid = rasn::types::Oid::ISO_MEMBER_BODY_US_RSADSI_PKCS7_SIGNED_DATA;

fn digest_oid(algorithm: DigestAlgorithm) -> &'static Oid {
    match algorithm {
        DigestAlgorithm::Sha1 => OID_SHA1,
        DigestAlgorithm::Sha256 => OID_SHA256
    }
}

/// Signs `signature_file_bytes` (a signer's `.SF` contents) and wraps the
/// signature, the signer's certificate, and the digest algorithm identifiers
/// in a DER-encoded PKCS#7 `SignedData`, itself wrapped in a `ContentInfo`.
pub fn build_pkcs7(
    signature_digest_algorithm: DigestAlgorithm,
    signature_file_bytes: &str,
    private_key: &RsaPrivateKey,
    certificate_der: &[u8]
) -> Result<Vec<u8>> {
    let digest = signature_digest_algorithm.digest(signature_file_bytes);
    let signature = match signature_digest_algorithm {
        DigestAlgorithm::Sha1 => {
            let padding = Pkcs1v15Sign::new::<sha1::Sha1>();
            private_key.sign(padding, &digest)?
        }
        DigestAlgorithm::Sha256 => {
            let padding = Pkcs1v15Sign::new::<sha2::Sha256>();
            private_key.sign(padding, &digest)?
        }
    };

    let cert = Certificate::decode(&mut rasn::der::de::Decoder::new(
        certificate_der,
        rasn::der::de::DecoderOptions::der()
    ))
    .map_err(|e| ApkSignError::Crypto(format!("certificate did not decode as DER: {e:?}")))?;

    let oid = digest_oid(signature_digest_algorithm);

    let signer_info = SignerInfo {
        version: Primitive(1),
        sid: SignerIdentifier::IssuerAndSerialNumber(IssuerAndSerialNumber {
            issuer: cert.tbs_certificate.issuer.clone(),
            serial_number: cert.tbs_certificate.serial_number.clone()
        }),
        digest_algorithm: AlgorithmIdentifier { algorithm: oid.into(), parameters: None },
        signed_attrs: None,
        signature_algorithm: AlgorithmIdentifier { algorithm: RSA.into(), parameters: None },
        signature: signature.into(),
        unsigned_attrs: None
    };

    let signed_data = SignedData {
        version: Primitive(1),
        digest_algorithms: vec![AlgorithmIdentifier { algorithm: oid.into(), parameters: None }].into(),
        encap_content_info: EncapsulatedContentInfo { content_type: OID_PKCS7_DATA.into(), content: None },
        certificates: Some(vec![CertificateChoices::Certificate(Box::new(cert))].into()),
        crls: None,
        signer_infos: vec![signer_info].into()
    };

    let mut inner_encoder = rasn::der::enc::Encoder::new(rasn::der::enc::EncoderOptions::der());
    signed_data.encode(&mut inner_encoder)?;
    let inner_vec = inner_encoder.output();

    let wrapper = ContentInfo { content_type: OID_PKCS7_SIGNED_DATA.into(), content: rasn::types::Any::new(inner_vec) };

    let mut outer_encoder = rasn::der::enc::Encoder::new(rasn::der::enc::EncoderOptions::der());
    wrapper.encode(&mut outer_encoder)?;

    Ok(outer_encoder.output())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rsa::pkcs8::{EncodePrivateKey, LineEnding};
    use rsa::RsaPublicKey;

    fn test_key_and_cert() -> (RsaPrivateKey, Vec<u8>) {
        let private_key = RsaPrivateKey::new(&mut rand::thread_rng(), 1024).unwrap();
        let public_key = RsaPublicKey::from(&private_key);
        let private_key_pem = private_key.to_pkcs8_pem(LineEnding::LF).unwrap().to_string();
        let key_pair = rcgen::KeyPair::from_pem(&private_key_pem).unwrap();
        let mut distinguished_name = rcgen::DistinguishedName::new();
        distinguished_name.push(rcgen::DnType::CommonName, "apksign-v1 tests");
        let mut params = rcgen::CertificateParams::new(vec![]).unwrap();
        params.distinguished_name = distinguished_name;
        let cert = params.self_signed(&key_pair).unwrap();
        let _ = public_key;
        (private_key, cert.der().to_vec())
    }

    #[test]
    fn builds_a_der_content_info_envelope() {
        let (key, cert) = test_key_and_cert();
        let der = build_pkcs7(DigestAlgorithm::Sha256, "Signature-Version: 1.0\r\n\r\n", &key, &cert).unwrap();
        // A DER SEQUENCE starts with tag 0x30.
        assert_eq!(der[0], 0x30);
    }

    #[test]
    fn rejects_a_certificate_that_is_not_valid_der() {
        let (key, _) = test_key_and_cert();
        let result = build_pkcs7(DigestAlgorithm::Sha256, "Signature-Version: 1.0\r\n\r\n", &key, b"not a certificate");
        assert!(result.is_err());
    }
}
