//! Identity linking
//!
//! Merges credentials from independently completed provider flows into one
//! session identity and answers which providers an endpoint still lacks.

use crate::model::{Credential, Identity, Provider};

/// Providers an endpoint needs linked before it may run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequiredProviders(pub Vec<Provider>);

impl RequiredProviders {
    pub fn google() -> Self {
        Self::of(&[Provider::Google])
    }

    pub fn clio() -> Self {
        Self::of(&[Provider::Clio])
    }

    /// Every known provider; what the billing feature needs
    pub fn both() -> Self {
        Self::of(&Provider::ALL)
    }

    pub fn of(providers: &[Provider]) -> Self {
        Self(providers.to_vec())
    }

    pub fn iter(&self) -> impl Iterator<Item = Provider> + '_ {
        self.0.iter().copied()
    }
}

/// Where a session stands relative to an endpoint's requirement
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkState {
    /// No identity, or one with no providers at all
    Unauthenticated,
    /// Identity present but missing at least one required provider
    PartiallyLinked { missing: Vec<Provider> },
    /// Every required provider has a credential
    Linked,
}

/// Return `identity` with `credential` set at `provider`.
///
/// Entries for other providers are carried over untouched; an existing entry
/// for the same provider is replaced by the newer credential.
#[must_use]
pub fn merge(identity: Identity, provider: Provider, credential: Credential) -> Identity {
    let mut merged = identity;
    merged.providers.insert(provider, credential);
    merged
}

pub fn has_provider(identity: &Identity, provider: Provider) -> bool {
    identity.providers.contains_key(&provider)
}

/// Required providers that have no credential yet, in requirement order
pub fn missing_providers(identity: &Identity, required: &RequiredProviders) -> Vec<Provider> {
    required
        .iter()
        .filter(|provider| !has_provider(identity, *provider))
        .collect()
}

pub fn is_fully_linked(identity: &Identity, required: &RequiredProviders) -> bool {
    missing_providers(identity, required).is_empty()
}

pub fn classify(identity: Option<&Identity>, required: &RequiredProviders) -> LinkState {
    let Some(identity) = identity.filter(|identity| !identity.is_empty()) else {
        return LinkState::Unauthenticated;
    };

    let missing = missing_providers(identity, required);
    if missing.is_empty() {
        LinkState::Linked
    } else {
        LinkState::PartiallyLinked { missing }
    }
}
