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
use deku::prelude::*;

pub const APK_SIGNING_BLOCK_MAGIC: &[u8; 16] = b"APK Sig Block 42";

#[derive(Debug, PartialEq, DekuWrite, Clone)]
pub struct ApkSigningBlock {
    // Size of this structure MINUS this field!
    // This field appears twice; the "minus" only applies to the first one.
    // If the structure is 128 bytes, this reads 120, NOT 112.
    pub size_of_self_not_counted: u64,
    pub pairs: SigningBlockPairs,
    pub size_of_self_counted: u64,
    pub magic: [u8; 16]
}

// This is in its own block so its size can be determined before serialising
// its parent.
#[derive(Debug, PartialEq, DekuWrite, Clone)]
pub struct SigningBlockPairs {
    pub pairs: Vec<U64LengthPrefixed<SigningBlockIdValuePair>>
}

#[derive(Debug, PartialEq, DekuWrite, Clone)]
pub struct SigningBlockIdValuePair {
    pub id: u32,
    pub value: Vec<u8>
}

// Outer APK Signing Block structures use u64 lengths.
#[derive(Debug, PartialEq, DekuWrite, Clone)]
pub struct U64LengthPrefixed<T: DekuWriter> {
    pub length: u64,
    pub value: T
}

fn len_pfx_u64<T: DekuWriter + Clone>(thing: T) -> U64LengthPrefixed<T>
where
    crate::types::RawWrapper<T>: DekuContainerWrite
{
    let wrap = crate::types::RawWrapper {
        value: thing.clone()
    };
    U64LengthPrefixed {
        length: wrap.to_bytes().unwrap().len() as u64,
        value: thing
    }
}

/// Wraps a set of (id, value) TLV pairs in the generic APK Signing Block
/// envelope: magic, size-of-block prefixes, and the length-prefixed pair
/// list, per the APK Signing Block format.
pub fn wrap_signing_block(pairs: Vec<(u32, Vec<u8>)>) -> Result<ApkSigningBlock> {
    let pairs = SigningBlockPairs {
        pairs: pairs
            .into_iter()
            .map(|(id, value)| len_pfx_u64(SigningBlockIdValuePair { id, value }))
            .collect()
    };

    let pairs_length = pairs.to_bytes()?.len();
    // Plus size_of_self_counted plus magic.
    let block_size = (pairs_length + 8 + 16) as u64;

    Ok(ApkSigningBlock {
        size_of_self_not_counted: block_size,
        pairs,
        size_of_self_counted: block_size,
        magic: *APK_SIGNING_BLOCK_MAGIC
    })
}
