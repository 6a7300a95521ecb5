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

//! Computes the APK Signature Scheme v2 block over a final ZIP layout: the
//! entries region, central directory, and end-of-central-directory, with
//! optional pre-block padding for 4 KiB alignment.

use std::io::{Cursor, Seek, SeekFrom, Write};

use apksign_common::Result;
use apksign_v2::{
    build_signature_scheme_v2_block, wrap_signing_block, V2SignerInput, APK_SIGNING_BLOCK_MAGIC, SIGNATURE_SCHEME_V2_BLOCK_ID
};
use byteorder::{LittleEndian, WriteBytesExt};
use deku::DekuContainerWrite;

use crate::signer_set::SignerSet;

const ALIGNMENT: u64 = 4096;

/// The result of `emit_v2`: the serialized envelope plus how much zero
/// padding the driver must insert before it.
pub struct V2Artifact {
    pub block_bytes: Vec<u8>,
    pub padding_before: u32
}

pub struct V2Pipeline {
    pending: bool
}

impl V2Pipeline {
    pub fn new() -> V2Pipeline {
        V2Pipeline { pending: true }
    }

    pub fn is_pending(&self) -> bool {
        self.pending
    }

    pub fn invalidate(&mut self) {
        self.pending = true;
    }

    /// `entries_region`, `central_directory`, `eocd`: the three ZIP sections
    /// as the driver currently has them laid out (i.e. before this block is
    /// inserted). `supports_padding`: whether the driver's ZIP writer can
    /// honor `padding_before` zero bytes ahead of the signing block.
    pub fn emit(
        &mut self,
        signer_set: &SignerSet,
        entries_region: &[u8],
        central_directory: &[u8],
        eocd: &[u8],
        supports_padding: bool
    ) -> Result<V2Artifact> {
        let signer_inputs: Vec<V2SignerInput> = signer_set
            .signers
            .iter()
            .map(|signer| V2SignerInput {
                private_key: &signer.config.private_key,
                public_key_der: rsa_public_key_der(signer)?,
                certificate_der: signer.config.cert_chain[0].clone(),
                algorithms: signer_set.v2_algorithms_for(signer)
            })
            .collect::<Result<_>>()?;

        // Dry-run: learn the block's own serialized length before computing
        // the hash that covers it (the hash covers the entries region and
        // the central directory, whose offset shifts once the block and any
        // padding are spliced in).
        let dry_run_hash = [0u8; 32];
        let dry_run_bytes = build_signature_scheme_v2_block(dry_run_hash, &signer_inputs)?;
        let dry_run_envelope = wrap_signing_block(vec![(SIGNATURE_SCHEME_V2_BLOCK_ID, dry_run_bytes)])?;
        let dry_run_envelope_len = dry_run_envelope.to_bytes()?.len() as u64;

        let padding_before = if supports_padding {
            let unaligned_end = entries_region.len() as u64 + dry_run_envelope_len;
            let remainder = unaligned_end % ALIGNMENT;
            if remainder == 0 { 0 } else { ALIGNMENT - remainder }
        } else {
            0
        };

        let new_cd_start = entries_region.len() as u64 + padding_before + dry_run_envelope_len;
        let patched_eocd = patch_central_directory_offset(eocd, new_cd_start)?;

        let mut padded_entries_region = entries_region.to_vec();
        padded_entries_region.resize(padded_entries_region.len() + padding_before as usize, 0);

        let real_hash =
            apksign_v2::compute_top_level_hash(&padded_entries_region, central_directory, &patched_eocd)?;
        let real_bytes = build_signature_scheme_v2_block(real_hash, &signer_inputs)?;
        let envelope = wrap_signing_block(vec![(SIGNATURE_SCHEME_V2_BLOCK_ID, real_bytes)])?;
        let block_bytes = envelope.to_bytes()?;

        // Calling emit successfully is this pipeline's acknowledgement: the
        // driver is handed a self-contained, already-hashed block and there
        // is no further state the engine could independently verify once
        // the driver finishes writing the final ZIP (unlike v1, which keeps
        // buffer requests open to check the bytes actually written back).
        self.pending = false;
        Ok(V2Artifact { block_bytes, padding_before: padding_before as u32 })
    }
}

impl Default for V2Pipeline {
    fn default() -> Self {
        V2Pipeline::new()
    }
}

fn rsa_public_key_der(signer: &crate::signer_set::V1SignerConfig) -> Result<Vec<u8>> {
    use rsa::pkcs8::EncodePublicKey;
    Ok(signer.config.public_key.to_public_key_der()?.as_ref().to_vec())
}

/// Copies `eocd` and overwrites the little-endian u32 central-directory
/// offset at its fixed byte 16, leaving everything else untouched.
fn patch_central_directory_offset(eocd: &[u8], new_cd_start: u64) -> Result<Vec<u8>> {
    let mut patched = eocd.to_vec();
    let mut cursor = Cursor::new(&mut patched);
    cursor.seek(SeekFrom::Start(16))?;
    cursor.write_u32::<LittleEndian>(new_cd_start as u32)?;
    Ok(patched)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signer_config::SignerConfig;
    use crate::signer_set::SignerSet;

    fn signer_set() -> SignerSet {
        SignerSet::new(vec![SignerConfig::generate_for_testing("alias").unwrap()], 24).unwrap()
    }

    fn fake_eocd(cd_start: u32) -> Vec<u8> {
        let mut eocd = vec![0x50, 0x4B, 0x05, 0x06];
        eocd.extend(std::iter::repeat(0).take(12)); // disk numbers / entry counts, unused here
        eocd.extend(cd_start.to_le_bytes());
        eocd.extend(0u16.to_le_bytes()); // comment length
        eocd
    }

    #[test]
    fn patch_central_directory_offset_only_touches_the_one_field() {
        let eocd = fake_eocd(1000);
        let patched = patch_central_directory_offset(&eocd, 2000).unwrap();
        assert_eq!(&patched[0..16], &eocd[0..16]);
        assert_eq!(u32::from_le_bytes(patched[16..20].try_into().unwrap()), 2000);
        assert_eq!(&patched[20..], &eocd[20..]);
    }

    #[test]
    fn emit_produces_a_16_byte_magic_terminated_block() {
        let mut pipeline = V2Pipeline::new();
        let entries_region = b"pretend zip entries".to_vec();
        let central_directory = b"pretend central directory".to_vec();
        let eocd = fake_eocd(entries_region.len() as u32);

        let artifact = pipeline.emit(&signer_set(), &entries_region, &central_directory, &eocd, true).unwrap();
        assert!(artifact.block_bytes.ends_with(APK_SIGNING_BLOCK_MAGIC));
        assert!(!pipeline.is_pending());
    }

    #[test]
    fn without_padding_support_padding_before_is_always_zero() {
        let mut pipeline = V2Pipeline::new();
        let entries_region = b"x".to_vec();
        let central_directory = b"y".to_vec();
        let eocd = fake_eocd(entries_region.len() as u32);

        let artifact = pipeline.emit(&signer_set(), &entries_region, &central_directory, &eocd, false).unwrap();
        assert_eq!(artifact.padding_before, 0);
    }

    #[test]
    fn invalidate_reasserts_pending() {
        let mut pipeline = V2Pipeline::new();
        let entries_region = b"x".to_vec();
        let central_directory = b"y".to_vec();
        let eocd = fake_eocd(entries_region.len() as u32);
        pipeline.emit(&signer_set(), &entries_region, &central_directory, &eocd, false).unwrap();
        assert!(!pipeline.is_pending());

        pipeline.invalidate();
        assert!(pipeline.is_pending());
    }
}
