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

//! Observer handles handed to the driver so it can stream an output entry's
//! uncompressed bytes into the engine without the engine owning ZIP I/O.
//!
//! Each request is single-shot and guarded by a [Mutex] sufficient for one
//! writer (the driver, streaming bytes) and one reader (the engine, once
//! done) without torn reads.

use std::sync::{Arc, Mutex};

use apksign_common::{ApkSignError, DigestAlgorithm, Result};
use sha1::Sha1;
use sha2::{Digest as _, Sha256};

/// A handle the driver writes entry bytes into. Exactly one of three shapes.
///
/// `Buffer`/`Digest` wrap an `Arc` rather than an owned value: the engine
/// keeps its own clone of the same handle so it can read the result once the
/// driver marks it done, per the single-writer/single-reader discipline
/// these requests are built for.
pub enum InspectionRequest {
    Buffer(Arc<BufferRequest>),
    Digest(Arc<DigestRequest>),
    FanOut(FanOutRequest)
}

impl InspectionRequest {
    pub fn write(&self, bytes: &[u8]) -> Result<()> {
        match self {
            InspectionRequest::Buffer(r) => r.write(bytes),
            InspectionRequest::Digest(r) => r.write(bytes),
            InspectionRequest::FanOut(r) => r.write(bytes)
        }
    }

    pub fn mark_done(&self) -> Result<()> {
        match self {
            InspectionRequest::Buffer(r) => r.mark_done(),
            InspectionRequest::Digest(r) => r.mark_done(),
            InspectionRequest::FanOut(r) => r.mark_done()
        }
    }

    pub fn is_done(&self) -> bool {
        match self {
            InspectionRequest::Buffer(r) => r.is_done(),
            InspectionRequest::Digest(r) => r.is_done(),
            InspectionRequest::FanOut(r) => r.is_done()
        }
    }
}

enum BufferState {
    Open(Vec<u8>),
    Done(Vec<u8>),
    Taken
}

/// Buffers written bytes into an expanding `Vec<u8>`; exposes a snapshot via
/// [BufferRequest::take_bytes] once done.
pub struct BufferRequest {
    state: Mutex<BufferState>
}

impl BufferRequest {
    pub fn new() -> BufferRequest {
        BufferRequest { state: Mutex::new(BufferState::Open(Vec::new())) }
    }

    pub fn write(&self, bytes: &[u8]) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        match &mut *state {
            BufferState::Open(buf) => {
                buf.extend_from_slice(bytes);
                Ok(())
            }
            _ => Err(ApkSignError::StateViolation("wrote to a buffer request after it was marked done".to_string()))
        }
    }

    pub fn mark_done(&self) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        match std::mem::replace(&mut *state, BufferState::Taken) {
            BufferState::Open(buf) => {
                *state = BufferState::Done(buf);
                Ok(())
            }
            other => {
                *state = other;
                Err(ApkSignError::StateViolation("buffer request already marked done".to_string()))
            }
        }
    }

    pub fn is_done(&self) -> bool {
        matches!(&*self.state.lock().unwrap(), BufferState::Done(_))
    }

    /// Clones the buffered bytes without consuming the request, so it can be
    /// compared against repeatedly (e.g. across several `emit_v1` calls).
    /// Fails with `StateViolation` if not yet done.
    pub fn peek_bytes(&self) -> Result<Vec<u8>> {
        match &*self.state.lock().unwrap() {
            BufferState::Done(buf) => Ok(buf.clone()),
            _ => Err(ApkSignError::StateViolation("buffer request read before it was marked done".to_string()))
        }
    }

    /// Takes ownership of the buffered bytes. Fails with `StateViolation` if
    /// not yet done, or if already taken.
    pub fn take_bytes(&self) -> Result<Vec<u8>> {
        let mut state = self.state.lock().unwrap();
        match std::mem::replace(&mut *state, BufferState::Taken) {
            BufferState::Done(buf) => Ok(buf),
            other => {
                let was_open = matches!(other, BufferState::Open(_));
                *state = other;
                Err(ApkSignError::StateViolation(if was_open {
                    "buffer request read before it was marked done".to_string()
                } else {
                    "buffer request already taken".to_string()
                }))
            }
        }
    }
}

enum Hasher {
    Sha1(Box<Sha1>),
    Sha256(Box<Sha256>)
}

impl Hasher {
    fn new(algorithm: DigestAlgorithm) -> Hasher {
        match algorithm {
            DigestAlgorithm::Sha1 => Hasher::Sha1(Box::default()),
            DigestAlgorithm::Sha256 => Hasher::Sha256(Box::default())
        }
    }

    fn update(&mut self, bytes: &[u8]) {
        match self {
            Hasher::Sha1(h) => h.update(bytes),
            Hasher::Sha256(h) => h.update(bytes)
        }
    }

    fn finalize(self) -> Vec<u8> {
        match self {
            Hasher::Sha1(h) => h.finalize().to_vec(),
            Hasher::Sha256(h) => h.finalize().to_vec()
        }
    }
}

enum DigestState {
    Open(Hasher),
    Done(Vec<u8>),
    Taken
}

/// Feeds a rolling hasher under the content-digest algorithm; exposes the
/// final digest via [DigestRequest::take_digest] once done, then drops the
/// hasher.
pub struct DigestRequest {
    state: Mutex<DigestState>
}

impl DigestRequest {
    pub fn new(algorithm: DigestAlgorithm) -> DigestRequest {
        DigestRequest { state: Mutex::new(DigestState::Open(Hasher::new(algorithm))) }
    }

    pub fn write(&self, bytes: &[u8]) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        match &mut *state {
            DigestState::Open(hasher) => {
                hasher.update(bytes);
                Ok(())
            }
            _ => Err(ApkSignError::StateViolation("wrote to a digest request after it was marked done".to_string()))
        }
    }

    pub fn mark_done(&self) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        match std::mem::replace(&mut *state, DigestState::Taken) {
            DigestState::Open(hasher) => {
                *state = DigestState::Done(hasher.finalize());
                Ok(())
            }
            other => {
                *state = other;
                Err(ApkSignError::StateViolation("digest request already marked done".to_string()))
            }
        }
    }

    pub fn is_done(&self) -> bool {
        matches!(&*self.state.lock().unwrap(), DigestState::Done(_))
    }

    pub fn take_digest(&self) -> Result<Vec<u8>> {
        let mut state = self.state.lock().unwrap();
        match std::mem::replace(&mut *state, DigestState::Taken) {
            DigestState::Done(digest) => Ok(digest),
            other => {
                let was_open = matches!(other, DigestState::Open(_));
                *state = other;
                Err(ApkSignError::StateViolation(if was_open {
                    "digest request read before it was marked done".to_string()
                } else {
                    "digest request already taken".to_string()
                }))
            }
        }
    }
}

/// Tees writes to two or more child requests so the driver only has to
/// stream an entry's bytes once even when the engine needs several views of
/// them (e.g. a digest and a cached buffer, for the input manifest).
pub struct FanOutRequest {
    children: Vec<Arc<InspectionRequest>>
}

impl FanOutRequest {
    pub fn new(children: Vec<Arc<InspectionRequest>>) -> Result<FanOutRequest> {
        if children.len() < 2 {
            return Err(ApkSignError::InvalidConfig("a fan-out request needs at least 2 children".to_string()));
        }
        Ok(FanOutRequest { children })
    }

    pub fn write(&self, bytes: &[u8]) -> Result<()> {
        for child in &self.children {
            child.write(bytes)?;
        }
        Ok(())
    }

    pub fn mark_done(&self) -> Result<()> {
        for child in &self.children {
            child.mark_done()?;
        }
        Ok(())
    }

    pub fn is_done(&self) -> bool {
        self.children.iter().all(|c| c.is_done())
    }
}
