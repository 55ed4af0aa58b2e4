//! Element registry view (C2): an immutable, per-controller snapshot of
//! the anonymizer and injector fleets.

use crate::error::{NcError, Result};
use crate::model::{Element, ElementId};

#[derive(Debug, Clone)]
pub struct Registry {
    pub anonymizers: Vec<Element>,
    pub injectors: Vec<Element>,
}

impl Registry {
    pub fn new(anonymizers: Vec<Element>, injectors: Vec<Element>) -> Self {
        Self {
            anonymizers,
            injectors,
        }
    }

    /// Extracts the cookie value (token after the last `=`) and searches
    /// anonymizers then injectors; first match wins.
    pub fn bind_by_cookie(&self, cookie_header: &str) -> Result<&Element> {
        let token = cookie_token(cookie_header);

        self.anonymizers
            .iter()
            .find(|e| e.cookie == token)
            .or_else(|| self.injectors.iter().find(|e| e.cookie == token))
            .ok_or(NcError::InvalidCookie)
    }

    /// Linear search over anonymizers by id.
    pub fn find_by_id(&self, id: &ElementId) -> Result<&Element> {
        self.anonymizers
            .iter()
            .find(|e| &e.id == id)
            .ok_or_else(|| NcError::UnknownAnon(id.to_string()))
    }
}

/// Parses `Cookie: ID=<token>` style headers down to the raw token,
/// shared between the registry lookup and the HTTP layer.
pub fn cookie_token(raw: &str) -> &str {
    raw.rsplit('=').next().unwrap_or(raw).trim()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Kind;

    fn elem(id: &str, cookie: &str, kind: Kind) -> Element {
        Element {
            id: ElementId(id.into()),
            name: id.into(),
            kind,
            cookie: cookie.into(),
            key: [1u8; 32],
            address: None,
            port: None,
            instance: "inst".into(),
            next: vec![],
        }
    }

    #[test]
    fn anonymizer_wins_on_cookie_collision() {
        let anon = elem("a1", "shared", Kind::Anonymizer);
        let inj = elem("i1", "shared", Kind::Injector);
        let reg = Registry::new(vec![anon], vec![inj]);
        let bound = reg.bind_by_cookie("ID=shared").unwrap();
        assert_eq!(bound.kind, Kind::Anonymizer);
    }

    #[test]
    fn unknown_cookie_is_invalid() {
        let reg = Registry::new(vec![], vec![]);
        let err = reg.bind_by_cookie("ID=nope").unwrap_err();
        assert!(matches!(err, NcError::InvalidCookie));
    }

    #[test]
    fn cookie_token_takes_text_after_last_equals() {
        assert_eq!(cookie_token("ID=abc=def"), "def");
        assert_eq!(cookie_token("ID=abc"), "abc");
    }

    #[test]
    fn find_by_id_unknown() {
        let reg = Registry::new(vec![], vec![]);
        let err = reg.find_by_id(&ElementId("ghost".into())).unwrap_err();
        assert!(matches!(err, NcError::UnknownAnon(_)));
    }
}
