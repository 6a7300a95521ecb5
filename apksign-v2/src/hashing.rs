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

use apksign_common::Result;
use sha2::{Digest, Sha256};

use crate::types::Sha256Hash;

pub const BYTES_IN_1MB: u32 = 1024 * 1024;
pub const FIRST_LEVEL_CHUNK_MAGIC: &[u8] = &[0xa5];
pub const SECOND_LEVEL_CHUNK_MAGIC: &[u8] = &[0x5a];

/// Computes the APK Signature Scheme v2/v3 top-level content digest over the
/// three ZIP sections (entries region, central directory, end-of-central
/// directory). The caller is responsible for having already patched the
/// EOCD's central-directory-offset field to account for the signing block
/// before calling this a second time with the real hash.
pub fn compute_top_level_hash(
    entries_region: &[u8],
    central_directory: &[u8],
    eocd: &[u8]
) -> Result<Sha256Hash> {
    let mut first_level_hashes = vec![];
    // Chunk 1: APK contents before the central directory.
    first_level_hashes.extend(hash_chunk(entries_region));
    // Chunk 3: Central directory. (Chunk 2 is the APK Signing Block itself,
    // which is never hashed.)
    first_level_hashes.extend(hash_chunk(central_directory));
    // Chunk 4: End of Central Directory record.
    first_level_hashes.extend(hash_chunk(eocd));

    let mut hasher = Sha256::new();
    hasher.update(SECOND_LEVEL_CHUNK_MAGIC);
    hasher.update((first_level_hashes.len() as u32).to_le_bytes());
    for hash in &first_level_hashes {
        hasher.update(hash);
    }
    Ok(hasher.finalize_reset().into())
}

fn hash_chunk(chunk: &[u8]) -> Vec<Sha256Hash> {
    let mut hasher = Sha256::new();
    let mut chunk_hashes = vec![];
    let mut pos = 0;

    while pos < chunk.len() {
        // Each chunk is 1MB OR whatever's left in the buffer.
        let end = (pos + BYTES_IN_1MB as usize).min(chunk.len());
        let chunk_size = end - pos;
        hasher.update(FIRST_LEVEL_CHUNK_MAGIC);
        hasher.update((chunk_size as u32).to_le_bytes());
        hasher.update(&chunk[pos..end]);
        chunk_hashes.push(hasher.finalize_reset().into());
        pos = end;
    }

    chunk_hashes
}
