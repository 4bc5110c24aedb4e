//! Priority-ordered, immutable list of fallback candidates

use std::sync::Arc;

use anyhow::{Result, anyhow};

use super::family::{FamilyDetector, ProviderSpec};

/// Fallback candidates in priority order (index 0 = preferred).
///
/// Cloning is cheap and every clone sees the same list.
#[derive(Debug, Clone)]
pub struct ProviderRegistry {
    providers: Arc<[ProviderSpec]>,
}

impl ProviderRegistry {
    /// Create a registry; an empty chain is rejected
    pub fn new(providers: Vec<ProviderSpec>) -> Result<Self> {
        if providers.is_empty() {
            return Err(anyhow!("ProviderRegistry requires at least one provider"));
        }
        Ok(Self {
            providers: providers.into(),
        })
    }

    /// Create a registry from bare identifiers, detecting each family
    pub fn from_identifiers<I, S>(identifiers: I, detector: &FamilyDetector) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(
            identifiers
                .into_iter()
                .map(|id| ProviderSpec::detected(id, detector))
                .collect(),
        )
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ProviderSpec> {
        self.providers.iter()
    }

    /// The most preferred candidate
    pub fn primary(&self) -> &ProviderSpec {
        &self.providers[0]
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    /// Always false; kept for API symmetry with `len`
    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    pub fn as_slice(&self) -> &[ProviderSpec] {
        &self.providers
    }
}

impl<'a> IntoIterator for &'a ProviderRegistry {
    type Item = &'a ProviderSpec;
    type IntoIter = std::slice::Iter<'a, ProviderSpec>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::family::ProviderFamily;

    #[test]
    fn test_empty_registry_rejected() {
        assert!(ProviderRegistry::new(vec![]).is_err());
        let ids: Vec<String> = vec![];
        assert!(ProviderRegistry::from_identifiers(ids, &FamilyDetector::default()).is_err());
    }

    #[test]
    fn test_order_preserved() {
        let registry = ProviderRegistry::from_identifiers(
            [
                "anthropic.claude-3-5-sonnet-20240620-v1:0",
                "meta.llama3",
                "amazon.titan-text-express-v1",
            ],
            &FamilyDetector::default(),
        )
        .unwrap();

        let families: Vec<ProviderFamily> = registry.iter().map(|p| p.family).collect();
        assert_eq!(
            families,
            vec![
                ProviderFamily::AnthropicMessages,
                ProviderFamily::Unsupported,
                ProviderFamily::TitanText,
            ]
        );
        assert_eq!(
            registry.primary().identifier,
            "anthropic.claude-3-5-sonnet-20240620-v1:0"
        );
        assert_eq!(registry.len(), 3);
        assert!(!registry.is_empty());
    }

    #[test]
    fn test_clones_share_storage() {
        let registry =
            ProviderRegistry::new(vec![ProviderSpec::new("m1", ProviderFamily::NovaText)]).unwrap();
        let clone = registry.clone();
        assert!(std::ptr::eq(registry.as_slice(), clone.as_slice()));
    }
}
