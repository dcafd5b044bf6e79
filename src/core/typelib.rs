// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Type library (§4.9, `xtypes` feature): a reference-counted,
//! `TypeID`-keyed directed graph of discovered types, their resolution
//! state, and the proxy endpoints waiting on them.
//!
//! Serializing a type's XTypes representation (to compute its
//! `TypeID` and feed `wait_for_resolved` callers a real object) is a
//! wire-format concern out of scope for this crate; `TypeId` here
//! hashes whatever opaque representation bytes the caller already
//! produced.

use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use md5::{Digest, Md5};
use parking_lot::{Condvar, Mutex};

use crate::core::guid::Guid;
use crate::error::{Error, Result};

/// 16-byte MD5 digest of a type's XCDR2 representation - two
/// semantically equal types hash identically (§3, §4.9).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TypeId([u8; 16]);

impl TypeId {
    #[must_use]
    pub fn from_representation(bytes: &[u8]) -> Self {
        let mut hasher = Md5::new();
        hasher.update(bytes);
        let result = hasher.finalize();
        let mut out = [0u8; 16];
        out.copy_from_slice(&result[..16]);
        Self(out)
    }

    #[must_use]
    pub fn as_bytes(&self) -> [u8; 16] {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionState {
    Unresolved,
    Requested,
    PartialResolved,
    Resolved,
    Invalid,
    Constructing,
}

/// Whether `wait_for_resolved` requires just the named type, or the
/// named type and everything it transitively depends on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitScope {
    TypeOnly,
    WithDependencies,
}

struct TypeNode {
    state: ResolutionState,
    representation: Option<Arc<[u8]>>,
    refcount: u32,
    referencing_proxies: Vec<Guid>,
}

impl TypeNode {
    fn placeholder() -> Self {
        Self {
            state: ResolutionState::Unresolved,
            representation: None,
            refcount: 0,
            referencing_proxies: Vec::new(),
        }
    }
}

/// One dependency edge, tagged whether it came from a type-info
/// announcement (and so must be unreffed on teardown) or is a
/// non-owning link established some other way.
#[derive(Debug, Clone, Copy)]
struct Dependency {
    dep: TypeId,
    from_type_info: bool,
}

/// Process-wide directed graph of discovered types.
pub struct TypeLibrary {
    nodes: DashMap<TypeId, Mutex<TypeNode>>,
    deps_fwd: DashMap<TypeId, Vec<Dependency>>,
    deps_rev: DashMap<TypeId, Vec<TypeId>>,
    generation: Mutex<u64>,
    cv: Condvar,
}

impl Default for TypeLibrary {
    fn default() -> Self {
        Self::new()
    }
}

impl TypeLibrary {
    #[must_use]
    pub fn new() -> Self {
        Self {
            nodes: DashMap::new(),
            deps_fwd: DashMap::new(),
            deps_rev: DashMap::new(),
            generation: Mutex::new(0),
            cv: Condvar::new(),
        }
    }

    /// Reference a type, inserting an `Unresolved` placeholder node if
    /// it is not yet known.
    pub fn ref_id(&self, id: TypeId) {
        self.nodes
            .entry(id)
            .or_insert_with(|| Mutex::new(TypeNode::placeholder()))
            .lock()
            .refcount += 1;
    }

    /// As `ref_id`, for a caller that already holds `node`'s lock
    /// (avoids a double-lock when called from within another method on
    /// this type that is already inside the node's critical section).
    fn ref_id_locked(node: &mut TypeNode) {
        node.refcount += 1;
    }

    /// Pull in dependencies discovered through a local sertype's own
    /// type map - links that are not "from type-info" and so are not
    /// unreffed by a type-info teardown.
    pub fn ref_local(&self, id: TypeId, sertype_dependencies: &[TypeId]) {
        self.ref_id(id);
        for &dep in sertype_dependencies {
            self.ref_id(dep);
            self.link_dependency(id, dep, false);
        }
    }

    /// Register a remote type-info announcement: refs `id` and every
    /// named dependency (tagged `from_type_info`), and records
    /// `proxy_guid` as an endpoint waiting on `id` so it can be
    /// re-matched once the type resolves.
    pub fn ref_proxy(&self, id: TypeId, dependencies: &[TypeId], proxy_guid: Guid) {
        self.ref_id(id);
        if let Some(entry) = self.nodes.get(&id) {
            entry.lock().referencing_proxies.push(proxy_guid);
        }
        for &dep in dependencies {
            self.ref_id(dep);
            self.link_dependency(id, dep, true);
        }
    }

    fn link_dependency(&self, src: TypeId, dep: TypeId, from_type_info: bool) {
        self.deps_fwd.entry(src).or_default().push(Dependency { dep, from_type_info });
        self.deps_rev.entry(dep).or_default().push(src);
    }

    #[must_use]
    pub fn state(&self, id: TypeId) -> Option<ResolutionState> {
        self.nodes.get(&id).map(|n| n.lock().state)
    }

    #[must_use]
    pub fn referencing_proxies(&self, id: TypeId) -> Vec<Guid> {
        self.nodes
            .get(&id)
            .map(|n| n.lock().referencing_proxies.clone())
            .unwrap_or_default()
    }

    /// Submit a resolved type object. Transitions `id` to `Resolved` if
    /// `representation`'s hash matches `id`, to `Unresolved` on a hash
    /// mismatch (the announcement did not actually describe this
    /// type), or to `Invalid` on a structural error (here, an empty
    /// representation) - which propagates transitively to every type
    /// depending on `id`.
    pub fn add_typeobj(&self, id: TypeId, representation: Arc<[u8]>) -> ResolutionState {
        let new_state = if representation.is_empty() {
            ResolutionState::Invalid
        } else if TypeId::from_representation(&representation) != id {
            ResolutionState::Unresolved
        } else {
            ResolutionState::Resolved
        };

        {
            let entry = self
                .nodes
                .entry(id)
                .or_insert_with(|| Mutex::new(TypeNode::placeholder()));
            let mut node = entry.lock();
            node.state = new_state;
            node.representation = Some(representation);
        }

        if new_state == ResolutionState::Invalid {
            self.invalidate_transitively(id);
        }

        self.bump_generation();
        new_state
    }

    fn invalidate_transitively(&self, id: TypeId) {
        let Some(dependents) = self.deps_rev.get(&id).map(|v| v.clone()) else {
            return;
        };
        for dependent in dependents {
            let already_invalid = self
                .nodes
                .get(&dependent)
                .map(|n| n.lock().state == ResolutionState::Invalid)
                .unwrap_or(true);
            if already_invalid {
                continue;
            }
            if let Some(entry) = self.nodes.get(&dependent) {
                entry.lock().state = ResolutionState::Invalid;
            }
            self.invalidate_transitively(dependent);
        }
    }

    fn bump_generation(&self) {
        *self.generation.lock() += 1;
        self.cv.notify_all();
    }

    fn is_resolved(&self, id: TypeId, scope: WaitScope) -> bool {
        let Some(state) = self.state(id) else { return false };
        if state != ResolutionState::Resolved {
            return false;
        }
        if scope == WaitScope::TypeOnly {
            return true;
        }
        let Some(deps) = self.deps_fwd.get(&id).map(|v| v.clone()) else {
            return true;
        };
        deps.iter().all(|d| self.is_resolved(d.dep, scope))
    }

    /// Block until `id` (and, with `WithDependencies`, everything it
    /// transitively depends on) reaches `Resolved`, or `timeout`
    /// elapses.
    pub fn wait_for_resolved(&self, id: TypeId, timeout: Duration, scope: WaitScope) -> Result<()> {
        let deadline = Instant::now() + timeout;
        let mut generation = self.generation.lock();
        loop {
            if self.is_resolved(id, scope) {
                return Ok(());
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(Error::Timeout);
            }
            let result = self.cv.wait_for(&mut generation, remaining);
            if result.timed_out() && !self.is_resolved(id, scope) {
                return Err(Error::Timeout);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn guid(n: u8) -> Guid {
        Guid::new([n; 12], [0, 0, 0, n])
    }

    #[test]
    fn type_id_is_stable_for_identical_representations() {
        let a = TypeId::from_representation(b"struct Foo { int x; }");
        let b = TypeId::from_representation(b"struct Foo { int x; }");
        let c = TypeId::from_representation(b"struct Bar { int y; }");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn add_typeobj_resolves_on_matching_hash() {
        let lib = TypeLibrary::new();
        let repr: Arc<[u8]> = Arc::from(&b"struct Foo"[..]);
        let id = TypeId::from_representation(&repr);
        lib.ref_id(id);
        assert_eq!(lib.add_typeobj(id, repr), ResolutionState::Resolved);
        assert_eq!(lib.state(id), Some(ResolutionState::Resolved));
    }

    #[test]
    fn add_typeobj_flags_hash_mismatch_as_unresolved() {
        let lib = TypeLibrary::new();
        let wrong_id = TypeId::from_representation(b"not this");
        let repr: Arc<[u8]> = Arc::from(&b"struct Foo"[..]);
        assert_eq!(lib.add_typeobj(wrong_id, repr), ResolutionState::Unresolved);
    }

    #[test]
    fn empty_representation_is_invalid_and_propagates() {
        let lib = TypeLibrary::new();
        let base = TypeId::from_representation(b"base");
        let dependent = TypeId::from_representation(b"dependent");
        lib.ref_local(dependent, &[base]);
        lib.ref_id(base);

        assert_eq!(lib.add_typeobj(base, Arc::from(&b""[..])), ResolutionState::Invalid);
        assert_eq!(lib.state(dependent), Some(ResolutionState::Invalid));
    }

    #[test]
    fn ref_proxy_records_the_waiting_endpoint() {
        let lib = TypeLibrary::new();
        let id = TypeId::from_representation(b"topic-type");
        lib.ref_proxy(id, &[], guid(9));
        assert_eq!(lib.referencing_proxies(id), vec![guid(9)]);
    }

    #[test]
    fn wait_for_resolved_unblocks_once_the_type_resolves() {
        let lib = Arc::new(TypeLibrary::new());
        let repr: Arc<[u8]> = Arc::from(&b"struct Slow"[..]);
        let id = TypeId::from_representation(&repr);
        lib.ref_id(id);

        let lib2 = lib.clone();
        let repr2 = repr.clone();
        let handle = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(20));
            lib2.add_typeobj(id, repr2);
        });

        let result = lib.wait_for_resolved(id, Duration::from_secs(2), WaitScope::TypeOnly);
        handle.join().unwrap();
        assert!(result.is_ok());
    }

    #[test]
    fn wait_for_resolved_times_out_when_never_resolved() {
        let lib = TypeLibrary::new();
        let id = TypeId::from_representation(b"never-resolved");
        lib.ref_id(id);
        let result = lib.wait_for_resolved(id, Duration::from_millis(20), WaitScope::TypeOnly);
        assert!(matches!(result, Err(Error::Timeout)));
    }

    #[test]
    fn ref_id_locked_bumps_refcount_in_place() {
        let mut node = TypeNode::placeholder();
        TypeLibrary::ref_id_locked(&mut node);
        TypeLibrary::ref_id_locked(&mut node);
        assert_eq!(node.refcount, 2);
    }
}
