// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use std::fmt;
use testcov_metadata::{Fingerprint, sanitize_name};

/// The stable identity of one test case.
///
/// Identities are derived purely from names, so two processes (or two listeners in the same
/// process) always agree on the identity of a given test.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct TestIdentity {
    qualified_name: String,
    fingerprint: Fingerprint,
}

impl TestIdentity {
    /// Creates an identity from a container (class, module or suite) name and a case name.
    ///
    /// The qualified name is `<container>.<case>`, with every maximal run of characters outside
    /// `[A-Za-z0-9._-]` replaced by a single `-`.
    pub fn new(container: &str, case: &str) -> Self {
        Self::from_qualified(&format!("{container}.{case}"))
    }

    /// Creates an identity from an already-joined name, which is sanitized.
    pub fn from_qualified(name: &str) -> Self {
        let qualified_name = sanitize_name(name);
        let fingerprint = Fingerprint::of(&qualified_name);
        Self {
            qualified_name,
            fingerprint,
        }
    }

    /// The sanitized qualified name.
    #[inline]
    pub fn qualified_name(&self) -> &str {
        &self.qualified_name
    }

    /// The fingerprint of the qualified name.
    #[inline]
    pub fn fingerprint(&self) -> Fingerprint {
        self.fingerprint
    }
}

impl fmt::Display for TestIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.qualified_name)
    }
}
