//! Chain resolver (C3): the local forwarding chain and sub-chain
//! derivation for a given target.

use crate::error::{NcError, Result};
use crate::model::{Element, ElementId};

#[derive(Debug, Clone)]
pub struct Chain {
    elements: Vec<Element>,
}

impl Chain {
    /// Locates *self* (the element whose `instance` matches
    /// `local_instance`), then walks `next.first` repeatedly, stopping
    /// at a missing successor, an empty `next`, or after
    /// `anonymizers.len()` hops (cycle defense per the Design Notes).
    pub fn build(anonymizers: &[Element], local_instance: &str) -> Result<Self> {
        let self_elem = anonymizers
            .iter()
            .find(|e| e.instance == local_instance)
            .ok_or_else(|| NcError::NoSelf(local_instance.to_string()))?;

        let mut elements = vec![self_elem.clone()];
        let cap = anonymizers.len();
        let mut cursor = self_elem.next.first().cloned();

        while let Some(next_id) = cursor {
            if elements.len() >= cap {
                break;
            }
            let Some(found) = anonymizers.iter().find(|e| e.id == next_id) else {
                break;
            };
            elements.push(found.clone());
            cursor = found.next.first().cloned();
        }

        Ok(Self { elements })
    }

    pub fn elements(&self) -> &[Element] {
        &self.elements
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    /// `chain.take_while(x != target)` — the prefix preceding `target`.
    /// If `target` is off-chain, the whole chain is returned.
    pub fn forwarding_chain(&self, target: &ElementId) -> Vec<Element> {
        self.elements
            .iter()
            .take_while(|e| &e.id != target)
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Kind;

    fn anon(id: &str, instance: &str, next: Vec<&str>) -> Element {
        Element {
            id: ElementId(id.into()),
            name: id.into(),
            kind: Kind::Anonymizer,
            cookie: format!("cookie-{id}"),
            key: [3u8; 32],
            address: Some("10.0.0.1".into()),
            port: Some(9000),
            instance: instance.into(),
            next: next.into_iter().map(|s| ElementId(s.into())).collect(),
        }
    }

    #[test]
    fn chain_starts_with_self_and_follows_next() {
        let elems = vec![
            anon("self", "local", vec!["h1"]),
            anon("h1", "remote1", vec!["h2"]),
            anon("h2", "remote2", vec![]),
        ];
        let chain = Chain::build(&elems, "local").unwrap();
        let ids: Vec<_> = chain.elements().iter().map(|e| e.id.0.clone()).collect();
        assert_eq!(ids, vec!["self", "h1", "h2"]);
    }

    #[test]
    fn missing_self_is_an_error() {
        let elems = vec![anon("a", "other", vec![])];
        let err = Chain::build(&elems, "local").unwrap_err();
        assert!(matches!(err, NcError::NoSelf(_)));
    }

    #[test]
    fn chain_stops_at_missing_successor() {
        let elems = vec![anon("self", "local", vec!["ghost"])];
        let chain = Chain::build(&elems, "local").unwrap();
        assert_eq!(chain.len(), 1);
    }

    #[test]
    fn cycles_are_capped_at_registry_size() {
        let elems = vec![
            anon("self", "local", vec!["h1"]),
            anon("h1", "r1", vec!["self"]),
        ];
        let chain = Chain::build(&elems, "local").unwrap();
        assert!(chain.len() <= elems.len());
    }

    #[test]
    fn forwarding_chain_is_prefix_before_target() {
        let elems = vec![
            anon("self", "local", vec!["h1"]),
            anon("h1", "r1", vec!["h2"]),
            anon("h2", "r2", vec![]),
        ];
        let chain = Chain::build(&elems, "local").unwrap();
        let prefix = chain.forwarding_chain(&ElementId("h2".into()));
        let ids: Vec<_> = prefix.iter().map(|e| e.id.0.clone()).collect();
        assert_eq!(ids, vec!["self", "h1"]);
    }

    #[test]
    fn forwarding_chain_off_chain_target_returns_whole_chain() {
        let elems = vec![anon("self", "local", vec!["h1"]), anon("h1", "r1", vec![])];
        let chain = Chain::build(&elems, "local").unwrap();
        let prefix = chain.forwarding_chain(&ElementId("nowhere".into()));
        assert_eq!(prefix.len(), chain.len());
    }
}
